#[derive(thiserror::Error, Debug)]
pub enum JuteError {
    #[error("unexpected eof: need {need} bytes, {remaining} remaining")]
    UnexpectedEof { need: usize, remaining: usize },

    #[error("invalid length prefix: {0}")]
    InvalidLength(i32),

    #[error("invalid utf-8 string: {0}")]
    InvalidString(#[from] std::string::FromUtf8Error),

    #[error("invalid bool byte: {0:#04x}")]
    InvalidBool(u8),

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}
