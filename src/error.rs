//! Typed errors the dispatcher and its collaborators need to distinguish.
//!
//! `anyhow` (used at the binary boundary in `main.rs`) can't express "was this
//! a truncated packet or an unknown message kind?" without downcasting, so the
//! library-internal surface uses these `thiserror` enums instead.

use std::io;

/// Errors from unpacking a wire message (§4.1, §7 taxonomy item 1).
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("truncated packet: needed {needed} more byte(s)")]
    Truncated { needed: usize },

    #[error("malformed field: {0}")]
    Malformed(String),

    #[error("unknown message kind {0}")]
    UnknownKind(u32),
}

/// Errors verifying a capability ticket (§4.2, §7 taxonomy item 2).
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("ticket could not be parsed: {0}")]
    Malformed(#[from] CodecError),

    #[error("ticket hash length {found} does not match configured length {expected}")]
    HashLenMismatch { expected: usize, found: usize },

    #[error("ticket expired: issued at {issued}, now {now}, timeout {timeout}s")]
    Expired { issued: u32, now: u32, timeout: u64 },

    #[error("ticket tag does not match recomputed hash")]
    TagMismatch,
}

/// Errors from a single file transfer (§4.5, §7 taxonomy items 4-5).
///
/// `LocalIo`/`PeerIo` are kept distinct so the dispatcher can bucket a
/// failed transfer into the right counter (§7: "local I/O error" vs "peer
/// I/O error" are separate taxonomy entries).
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("local storage I/O failed: {0}")]
    LocalIo(#[from] io::Error),

    #[error("peer I/O failed: {0}")]
    PeerIo(io::Error),

    #[error("peer closed the connection before the transfer completed")]
    PeerClosed,

    #[error("a receive-transfer for {0:?} is already active")]
    AlreadyActive(String),

    #[error("transfer was cancelled")]
    Cancelled,
}

/// Fatal startup errors (§7 taxonomy item 6) — the only errors that should
/// terminate the process.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to bind overlay socket on {addr}: {source}")]
    OverlayBind { addr: String, source: io::Error },

    #[error("failed to bind control socket on {addr}: {source}")]
    ControlBind { addr: String, source: io::Error },

    #[error("failed to read configuration at {path}: {source}")]
    ConfigRead { path: String, source: io::Error },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("storage root {path} is not a directory")]
    StorageRoot { path: String },
}
