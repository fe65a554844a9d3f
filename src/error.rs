//! Main Crate Error

use crate::common::Id;

#[derive(thiserror::Error, Debug)]
/// Kdmlookup crate error enum.
pub enum Error {
    /// Id is not [crate::common::ID_SIZE] bytes long.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// Id string is not valid hex.
    #[error("Invalid Id encoding: {0}")]
    InvalidIdEncoding(String),

    /// A configuration value is out of its accepted range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The lookup didn't produce a result before its deadline.
    #[error("Lookup for {0:?} timed out")]
    LookupTimeout(Id),

    /// Every lookup worker exited before a result was produced,
    /// usually because the transport panicked.
    #[error("Lookup workers exited before producing a result")]
    WorkerPoolClosed,

    /// Failed to find any contacts close to the target, usually means the
    /// routing table is empty.
    #[error("Failed to find any contacts close to {0:?}")]
    NoClosestContacts(Id),

    /// There is no node at this index in the [crate::Testnet].
    #[error("No node at index {0} in the testnet")]
    UnknownNode(usize),

    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),
}

/// Alias for `Result<T, Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
