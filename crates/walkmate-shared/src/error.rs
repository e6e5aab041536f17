use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("STOMP frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected destination: {0}")]
    Destination(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame is missing its NUL terminator")]
    Unterminated,

    #[error("Unknown STOMP command: {0}")]
    UnknownCommand(String),

    #[error("Malformed header line: {0}")]
    MalformedHeader(String),

    #[error("Invalid header escape sequence: \\{0}")]
    InvalidEscape(char),

    #[error("Frame has no header/body separator")]
    MissingSeparator,
}
