//! Client request and response model: the opcode set the commit processor
//! orders, and the response shape pushed to the session response queue.

use jute::Buffer;

/// ZooKeeper protocol operation codes.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    OpCreate = 1,
    OpDelete = 2,
    OpExists = 3,
    OpGetData = 4,
    OpSetData = 5,
    OpGetChildren = 8,
}

/// Client-visible error codes, ZooKeeper numbering.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeeperError {
    Ok = 0,
    ConnectionLoss = -4,
    OperationTimeout = -7,
    NoNode = -101,
    NoAuth = -102,
    BadVersion = -103,
    NodeExists = -110,
    SessionExpired = -112,
}

/// Result code reported by the consensus layer for a failed replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftResultCode {
    Cancelled,
    Timeout,
    NotLeader,
    Failed,
}

#[derive(Debug, Clone)]
pub enum RequestOp {
    Create {
        path: String,
        data: Buffer,
        ephemeral: bool,
    },
    SetData {
        path: String,
        data: Buffer,
        version: i32,
    },
    Delete {
        path: String,
        version: i32,
    },
    GetData {
        path: String,
    },
    Exists {
        path: String,
    },
    GetChildren {
        path: String,
    },
}

impl RequestOp {
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            RequestOp::GetData { .. } | RequestOp::Exists { .. } | RequestOp::GetChildren { .. }
        )
    }

    pub fn opcode(&self) -> OpCode {
        match self {
            RequestOp::Create { .. } => OpCode::OpCreate,
            RequestOp::SetData { .. } => OpCode::OpSetData,
            RequestOp::Delete { .. } => OpCode::OpDelete,
            RequestOp::GetData { .. } => OpCode::OpGetData,
            RequestOp::Exists { .. } => OpCode::OpExists,
            RequestOp::GetChildren { .. } => OpCode::OpGetChildren,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeeperRequest {
    pub xid: i64,
    pub op: RequestOp,
}

impl KeeperRequest {
    pub fn make_response(&self) -> Response {
        Response {
            xid: self.xid,
            zxid: 0,
            error: KeeperError::Ok,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub xid: i64,
    pub zxid: i64,
    pub error: KeeperError,
}

/// A request tagged with the session that submitted it.
#[derive(Debug, Clone)]
pub struct RequestForSession {
    pub session_id: i64,
    pub request: KeeperRequest,
}

#[derive(Debug, Clone)]
pub struct ResponseForSession {
    pub session_id: i64,
    pub response: Response,
}
