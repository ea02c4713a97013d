use std::{fmt, io, panic::Location, path::PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong. See [`Error`] for where.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Value has no bencode representation.
    #[error("can't bencode a {0}")]
    Encoding(&'static str),
    /// Unrecognised leading tag byte.
    #[error("unexpected type {} in bencode data", tag(.0))]
    Format(u8),
    /// Tag was fine, but the body was not (bad digits, bad UTF-8).
    #[error("malformed bencode data: {0}")]
    Malformed(String),
    #[error("unexpected end of bencode data")]
    Eof,
    #[error(transparent)]
    Network(io::Error),
    #[error("bad json/bencode argument {0}")]
    Argument(String),
    #[error(transparent)]
    Json(serde_json::Error),
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("{command}: {reason}")]
    InvalidArguments { command: &'static str, reason: String },
    /// Keepalive marker vanished while waiting on the socket: the owning host is gone.
    #[error("keepalive file {} no longer exists", .0.display())]
    Detached(PathBuf),
}

fn tag(byte: &u8) -> char {
    char::from(*byte)
}

/// Error kind plus the source location that raised it.
///
/// Constructors and `From` impls are `#[track_caller]`, so an error produced by `?`
/// points at the `?` that converted it.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    location: &'static Location<'static>,
}

impl Error {
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: Location::caller(),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, ErrorKind::Eof)
    }

    pub fn is_network(&self) -> bool {
        matches!(self.kind, ErrorKind::Network(_))
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.kind, ErrorKind::Detached(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

impl From<ErrorKind> for Error {
    #[track_caller]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<io::Error> for Error {
    #[track_caller]
    fn from(inner: io::Error) -> Self {
        Self::new(ErrorKind::Network(inner))
    }
}

impl From<serde_json::Error> for Error {
    #[track_caller]
    fn from(inner: serde_json::Error) -> Self {
        Self::new(ErrorKind::Json(inner))
    }
}
