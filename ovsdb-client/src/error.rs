#[derive(Debug, thiserror::Error)]
pub enum OvsdbError {
    #[error("not connected to OVSDB")]
    NotConnected,

    #[error("disconnected before a reply arrived")]
    Disconnected,

    #[error("OVSDB server error: {0}")]
    Server(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OvsdbError>;
