use thiserror::Error;

/// Errors surfaced by the command methods.
///
/// Display strings mirror the wire-level messages of the real server where
/// one exists, so assertions written against a live server keep passing
/// against the emulation.
#[derive(Error, Debug)]
pub enum KvError {
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    /// Legacy uppercase arity message used by HMSET and odd-length MSET.
    #[error("ERR wrong number of arguments for {0}")]
    WrongArityLegacy(&'static str),

    #[error("ERR syntax error")]
    Syntax,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR value is not a valid float")]
    NotFloat,

    #[error("ERR index out of range")]
    OutOfRange,

    #[error("ERR invalid cursor")]
    InvalidCursor,

    #[error("ERR invalid DB index")]
    InvalidDbIndex,

    #[error("ERR Target key name is busy.")]
    BusyKey,

    #[error("ERR DUMP payload version or checksum are wrong")]
    BadPayload,

    #[error("ERR source and destination objects are the same")]
    SameDatabase,

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("storage encoding error: {0}")]
    Encoding(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KvError>;
