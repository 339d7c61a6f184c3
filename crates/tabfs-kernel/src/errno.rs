//! Error types for the engine and the browser-capability layer.
//!
//! Every route handler returns `FsResult<Reply>`. A handler that wants a
//! specific POSIX errno on the wire returns the matching `FsError` variant;
//! anything else that goes wrong is reported as `EIO`. The dispatcher owns
//! `ETIMEDOUT` — handlers never raise it themselves.

use thiserror::Error;

/// Errno values as they appear in error replies.
///
/// These are pinned by the wire protocol (the host adapter negates them into
/// FUSE return codes), not taken from the local libc.
pub const EPERM: i32 = 1;
pub const ENOENT: i32 = 2;
pub const EINTR: i32 = 4;
pub const EIO: i32 = 5;
pub const ENOTSUP: i32 = 45;
pub const ETIMEDOUT: i32 = 110;

/// A filesystem-level failure with a fixed errno encoding.
#[derive(Debug, Clone, Error)]
pub enum FsError {
    /// `EPERM` — the entry exists but refuses the operation.
    #[error("operation not permitted")]
    PermissionDenied,

    /// `ENOENT` — no route matched, or a wildcard segment named an unknown
    /// identifier (tab, input, script, eval entry).
    #[error("no such file or directory")]
    NotFound,

    /// `EINTR` — the operation was interrupted before completing.
    #[error("interrupted")]
    Interrupted,

    /// `EIO` — catch-all for browser-layer and internal failures.
    #[error("i/o error: {0}")]
    Io(String),

    /// `ENOTSUP` — AppleDouble companions, writes into computed files,
    /// operations the matched route does not define.
    #[error("operation not supported")]
    NotSupported,

    /// `ETIMEDOUT` — generated by the dispatcher when the 1-second request
    /// timer fires.
    #[error("request timed out")]
    TimedOut,
}

impl FsError {
    /// A generic `EIO` with context for the log line.
    pub fn io(msg: impl Into<String>) -> Self {
        FsError::Io(msg.into())
    }

    /// The errno carried in the error reply.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::PermissionDenied => EPERM,
            FsError::NotFound => ENOENT,
            FsError::Interrupted => EINTR,
            FsError::Io(_) => EIO,
            FsError::NotSupported => ENOTSUP,
            FsError::TimedOut => ETIMEDOUT,
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

/// Failure from a browser capability.
///
/// Concrete adapters translate their API's error reporting into these; the
/// engine only distinguishes "the identifier does not exist", "another
/// debugger holds the tab", and "something else".
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    /// The named tab, window, or extension does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Another debugger is already attached to the tab.
    #[error("debugger already attached to tab {0}")]
    DebuggerConflict(i64),

    /// Any other API failure, verbatim.
    #[error("browser api error: {0}")]
    Api(String),
}

impl From<BrowserError> for FsError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::NotFound(_) => FsError::NotFound,
            other => FsError::Io(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for FsError {
    fn from(err: serde_json::Error) -> Self {
        FsError::Io(format!("json: {err}"))
    }
}

pub type BrowserResult<T> = Result<T, BrowserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_values_match_wire_protocol() {
        assert_eq!(FsError::PermissionDenied.errno(), 1);
        assert_eq!(FsError::NotFound.errno(), 2);
        assert_eq!(FsError::Interrupted.errno(), 4);
        assert_eq!(FsError::io("x").errno(), 5);
        assert_eq!(FsError::NotSupported.errno(), 45);
        assert_eq!(FsError::TimedOut.errno(), 110);
    }

    #[test]
    fn test_browser_error_translation() {
        assert_eq!(
            FsError::from(BrowserError::NotFound("tab 9".into())).errno(),
            ENOENT
        );
        assert_eq!(
            FsError::from(BrowserError::Api("quota".into())).errno(),
            EIO
        );
        assert_eq!(FsError::from(BrowserError::DebuggerConflict(3)).errno(), EIO);
    }
}
