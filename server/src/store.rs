//! In-memory state of the coordination service: the flat node table driven
//! by the commit processor, plus the session, auth, ephemeral and ACL tables
//! persisted by the snapshot layer.
//!
//! Lock order: the session mutex is taken before the auth mutex; the
//! ephemerals mutex is leaf-only.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

use jute::{Deserializer, JuteDeserialize, JuteError, JuteSerialize, Serializer};
use parking_lot::Mutex;

use crate::queue::ResponsesQueue;
use crate::request::{KeeperError, KeeperRequest, RequestOp, ResponseForSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    pub perms: u32,
    pub scheme: String,
    pub id: String,
}

impl JuteSerialize for Acl {
    fn serialize(&self, out: &mut Serializer) {
        out.write_u32(self.perms);
        out.write_str(&self.scheme);
        out.write_str(&self.id);
    }
}

impl JuteDeserialize for Acl {
    fn deserialize(input: &mut Deserializer) -> Result<Self, JuteError> {
        Ok(Acl {
            perms: input.read_u32()?,
            scheme: input.read_string()?,
            id: input.read_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthId {
    pub scheme: String,
    pub id: String,
}

impl JuteSerialize for AuthId {
    fn serialize(&self, out: &mut Serializer) {
        out.write_str(&self.scheme);
        out.write_str(&self.id);
    }
}

impl JuteDeserialize for AuthId {
    fn deserialize(input: &mut Deserializer) -> Result<Self, JuteError> {
        Ok(AuthId {
            scheme: input.read_string()?,
            id: input.read_string()?,
        })
    }
}

pub type AclMapping = HashMap<u64, Vec<Acl>>;
pub type SessionAndTimeout = HashMap<i64, i64>;
pub type SessionAndAuth = HashMap<i64, Vec<AuthId>>;
pub type Ephemerals = HashMap<i64, HashSet<String>>;
pub type StringMap = HashMap<String, String>;
pub type IntMap = HashMap<String, u64>;

/// Read-coherent copy of the session tables, taken under the composite
/// session-then-auth lock so the pair is mutually consistent.
pub struct SessionsSnapshot {
    pub session_and_timeout: SessionAndTimeout,
    pub session_and_auth: SessionAndAuth,
    pub next_session_id: i64,
}

#[derive(Debug, Clone)]
pub struct DataNode {
    pub data: Vec<u8>,
    pub version: i32,
    pub ephemeral_owner: i64,
}

struct SessionState {
    session_and_timeout: SessionAndTimeout,
    session_id_counter: i64,
}

pub struct KeeperStore {
    data: Mutex<HashMap<String, DataNode>>,
    zxid: AtomicI64,
    sessions: Mutex<SessionState>,
    auth: Mutex<SessionAndAuth>,
    ephemerals: Mutex<Ephemerals>,
    acls: Mutex<AclMapping>,
    string_map: Mutex<StringMap>,
    int_map: Mutex<IntMap>,
}

impl KeeperStore {
    pub fn new() -> Self {
        KeeperStore {
            data: Mutex::new(HashMap::new()),
            zxid: AtomicI64::new(0),
            sessions: Mutex::new(SessionState {
                session_and_timeout: HashMap::new(),
                session_id_counter: 1,
            }),
            auth: Mutex::new(HashMap::new()),
            ephemerals: Mutex::new(HashMap::new()),
            acls: Mutex::new(HashMap::new()),
            string_map: Mutex::new(HashMap::new()),
            int_map: Mutex::new(HashMap::new()),
        }
    }

    pub fn zxid(&self) -> i64 {
        self.zxid.load(Ordering::SeqCst)
    }

    fn next_zxid(&self) -> i64 {
        self.zxid.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn add_session(&self, session_id: i64, timeout_ms: i64) {
        let mut s = self.sessions.lock();
        s.session_and_timeout.insert(session_id, timeout_ms);
        if session_id >= s.session_id_counter {
            s.session_id_counter = session_id + 1;
        }
    }

    pub fn set_session_auth(&self, session_id: i64, auth_ids: Vec<AuthId>) {
        self.auth.lock().insert(session_id, auth_ids);
    }

    pub fn set_next_session_id(&self, next: i64) {
        self.sessions.lock().session_id_counter = next;
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().session_and_timeout.len()
    }

    /// Session then auth, consistently with every other taker of the pair.
    pub fn sessions_snapshot(&self) -> SessionsSnapshot {
        let sessions = self.sessions.lock();
        let auth = self.auth.lock();
        SessionsSnapshot {
            session_and_timeout: sessions.session_and_timeout.clone(),
            session_and_auth: auth.clone(),
            next_session_id: sessions.session_id_counter,
        }
    }

    pub fn add_ephemeral(&self, session_id: i64, path: String) {
        self.ephemerals
            .lock()
            .entry(session_id)
            .or_default()
            .insert(path);
    }

    pub fn install_ephemerals(&self, session_id: i64, paths: Vec<String>) {
        let mut eph = self.ephemerals.lock();
        eph.entry(session_id).or_default().extend(paths);
    }

    /// Runs `f` with the ephemerals mutex held for the whole call.
    pub fn with_ephemerals<R>(&self, f: impl FnOnce(&Ephemerals) -> R) -> R {
        let eph = self.ephemerals.lock();
        f(&eph)
    }

    pub fn ephemerals_snapshot(&self) -> Ephemerals {
        self.ephemerals.lock().clone()
    }

    pub fn set_acl(&self, id: u64, acls: Vec<Acl>) {
        self.acls.lock().insert(id, acls);
    }

    pub fn acl_map_snapshot(&self) -> AclMapping {
        self.acls.lock().clone()
    }

    pub fn set_string_entry(&self, key: String, value: String) {
        self.string_map.lock().insert(key, value);
    }

    pub fn string_map_snapshot(&self) -> StringMap {
        self.string_map.lock().clone()
    }

    pub fn set_int_entry(&self, key: String, value: u64) {
        self.int_map.lock().insert(key, value);
    }

    pub fn int_map_snapshot(&self) -> IntMap {
        self.int_map.lock().clone()
    }

    pub fn node(&self, path: &str) -> Option<DataNode> {
        self.data.lock().get(path).cloned()
    }

    /// Apply a request against the store and push its response.
    pub fn process_request(
        &self,
        responses: &ResponsesQueue,
        request: &KeeperRequest,
        session_id: i64,
    ) {
        let mut response = request.make_response();
        match &request.op {
            RequestOp::Create {
                path,
                data,
                ephemeral,
            } => {
                let mut nodes = self.data.lock();
                if nodes.contains_key(path) {
                    response.error = KeeperError::NodeExists;
                    response.zxid = self.zxid();
                } else {
                    let owner = if *ephemeral { session_id } else { 0 };
                    nodes.insert(
                        path.clone(),
                        DataNode {
                            data: data.clone(),
                            version: 0,
                            ephemeral_owner: owner,
                        },
                    );
                    drop(nodes);
                    if *ephemeral {
                        self.add_ephemeral(session_id, path.clone());
                    }
                    response.zxid = self.next_zxid();
                }
            }

            RequestOp::SetData {
                path,
                data,
                version,
            } => {
                let mut nodes = self.data.lock();
                match nodes.get_mut(path) {
                    None => {
                        response.error = KeeperError::NoNode;
                        response.zxid = self.zxid();
                    }
                    Some(node) if *version != -1 && *version != node.version => {
                        response.error = KeeperError::BadVersion;
                        response.zxid = self.zxid();
                    }
                    Some(node) => {
                        node.data = data.clone();
                        node.version += 1;
                        response.zxid = self.next_zxid();
                    }
                }
            }

            RequestOp::Delete { path, version } => {
                let mut nodes = self.data.lock();
                match nodes.get(path).map(|n| (n.version, n.ephemeral_owner)) {
                    None => {
                        response.error = KeeperError::NoNode;
                        response.zxid = self.zxid();
                    }
                    Some((node_version, _)) if *version != -1 && *version != node_version => {
                        response.error = KeeperError::BadVersion;
                        response.zxid = self.zxid();
                    }
                    Some((_, owner)) => {
                        nodes.remove(path);
                        drop(nodes);
                        if owner != 0 {
                            let mut eph = self.ephemerals.lock();
                            if let Some(paths) = eph.get_mut(&owner) {
                                paths.remove(path);
                                if paths.is_empty() {
                                    eph.remove(&owner);
                                }
                            }
                        }
                        response.zxid = self.next_zxid();
                    }
                }
            }

            RequestOp::GetData { path } | RequestOp::GetChildren { path } => {
                if !self.data.lock().contains_key(path) {
                    response.error = KeeperError::NoNode;
                }
                response.zxid = self.zxid();
            }

            RequestOp::Exists { path } => {
                if !self.data.lock().contains_key(path) {
                    response.error = KeeperError::NoNode;
                }
                response.zxid = self.zxid();
            }
        }

        responses.push(ResponseForSession {
            session_id,
            response,
        });
    }
}

impl Default for KeeperStore {
    fn default() -> Self {
        KeeperStore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{RequestForSession, Response};

    fn apply(store: &KeeperStore, responses: &ResponsesQueue, req: RequestForSession) -> Response {
        store.process_request(responses, &req.request, req.session_id);
        responses
            .try_pop()
            .expect("response must be pushed")
            .response
    }

    #[test]
    fn create_then_get() {
        let store = KeeperStore::new();
        let responses = ResponsesQueue::new();

        let r = apply(
            &store,
            &responses,
            RequestForSession {
                session_id: 1,
                request: KeeperRequest {
                    xid: 1,
                    op: RequestOp::Create {
                        path: "/a".to_string(),
                        data: b"v".to_vec(),
                        ephemeral: false,
                    },
                },
            },
        );
        assert_eq!(r.error, KeeperError::Ok);
        assert_eq!(r.zxid, 1);

        let r = apply(
            &store,
            &responses,
            RequestForSession {
                session_id: 1,
                request: KeeperRequest {
                    xid: 2,
                    op: RequestOp::GetData {
                        path: "/a".to_string(),
                    },
                },
            },
        );
        assert_eq!(r.error, KeeperError::Ok);
        assert_eq!(r.zxid, 1);
    }

    #[test]
    fn create_existing_node_fails() {
        let store = KeeperStore::new();
        let responses = ResponsesQueue::new();
        let create = |xid| RequestForSession {
            session_id: 1,
            request: KeeperRequest {
                xid,
                op: RequestOp::Create {
                    path: "/dup".to_string(),
                    data: vec![],
                    ephemeral: false,
                },
            },
        };

        assert_eq!(apply(&store, &responses, create(1)).error, KeeperError::Ok);
        assert_eq!(
            apply(&store, &responses, create(2)).error,
            KeeperError::NodeExists
        );
    }

    #[test]
    fn set_data_checks_version() {
        let store = KeeperStore::new();
        let responses = ResponsesQueue::new();
        apply(
            &store,
            &responses,
            RequestForSession {
                session_id: 1,
                request: KeeperRequest {
                    xid: 1,
                    op: RequestOp::Create {
                        path: "/v".to_string(),
                        data: vec![],
                        ephemeral: false,
                    },
                },
            },
        );

        let set = |xid, version| RequestForSession {
            session_id: 1,
            request: KeeperRequest {
                xid,
                op: RequestOp::SetData {
                    path: "/v".to_string(),
                    data: b"new".to_vec(),
                    version,
                },
            },
        };

        assert_eq!(
            apply(&store, &responses, set(2, 5)).error,
            KeeperError::BadVersion
        );
        assert_eq!(apply(&store, &responses, set(3, 0)).error, KeeperError::Ok);
        assert_eq!(store.node("/v").map(|n| n.version), Some(1));
    }

    #[test]
    fn ephemeral_create_and_delete_track_owner() {
        let store = KeeperStore::new();
        let responses = ResponsesQueue::new();
        apply(
            &store,
            &responses,
            RequestForSession {
                session_id: 7,
                request: KeeperRequest {
                    xid: 1,
                    op: RequestOp::Create {
                        path: "/eph".to_string(),
                        data: vec![],
                        ephemeral: true,
                    },
                },
            },
        );
        assert!(store.ephemerals_snapshot()[&7].contains("/eph"));

        apply(
            &store,
            &responses,
            RequestForSession {
                session_id: 7,
                request: KeeperRequest {
                    xid: 2,
                    op: RequestOp::Delete {
                        path: "/eph".to_string(),
                        version: -1,
                    },
                },
            },
        );
        assert!(store.ephemerals_snapshot().is_empty());
    }

    #[test]
    fn sessions_snapshot_is_consistent_pair() {
        let store = KeeperStore::new();
        store.add_session(42, 30000);
        store.set_session_auth(
            42,
            vec![AuthId {
                scheme: "digest".to_string(),
                id: "user:hash".to_string(),
            }],
        );

        let snap = store.sessions_snapshot();
        assert_eq!(snap.session_and_timeout[&42], 30000);
        assert_eq!(snap.session_and_auth[&42].len(), 1);
        assert_eq!(snap.next_session_id, 43);
    }
}
