//! Error taxonomy for the store and the remote clients.
//!
//! The store side never panics and never leaks a substrate error type:
//! failures are logged where they happen and reported as [`StoreError`].
//! The remote side ([`RemoteError`]) is what callers display to the user, so
//! every variant carries a human-readable message and connectivity failures
//! are kept distinct from upstream API failures.

use thiserror::Error;

/// Failure of a ConversationStore operation. Reads never produce these
/// (a corrupt or missing blob degrades to an empty or default value); only
/// writes and snapshot imports do.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The supplied document is not a well-formed snapshot. Nothing was
    /// written.
    #[error("invalid snapshot: {0}")]
    Validation(String),

    /// The underlying substrate rejected the write (already logged).
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Failure of a completion or admin request. One of these per call; the
/// caller is responsible for display and for not persisting a failed turn.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Bad input caught before any network traffic (e.g. an empty admin
    /// code).
    #[error("{0}")]
    Validation(String),

    /// The endpoint could not be reached at the transport level.
    #[error("could not reach the assistant service: {0}")]
    Connectivity(String),

    /// The endpoint answered with a non-success status. `message` is the
    /// parsed error body when one exists, otherwise a generic
    /// "request failed with status N".
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// Success status, but the body did not match the expected shape.
    #[error("unexpected response from the assistant service: {0}")]
    MalformedResponse(String),

    /// A protected call was rejected with 401, or the local token was
    /// already expired. The local token has been cleared by the time this
    /// surfaces.
    #[error("admin session has expired; sign in again")]
    AuthExpired,

    /// A protected call was rejected with 403. The token is kept.
    #[error("this admin token does not permit that action")]
    Permission,
}
