//! Process exit status
//!
//! Scripts rely on these values. Library errors are classified by
//! [`ocli_core::Error::exit_code`]; this module only names the statuses the
//! binary can end with.

/// Status the `ocli` process exits with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Failure with no more specific status, including failed verification
    GeneralError = 1,

    /// Bad arguments, malformed identifiers, missing or invalid settings
    UsageError = 2,

    /// Node unreachable, timed out or unavailable; retrying may help
    NetworkError = 3,

    /// Session negotiation failed or the node denied access
    AuthError = 4,

    /// Object is missing or has been removed
    NotFound = 5,

    /// Object already exists or the payload length disagreed with its header
    Conflict = 6,

    /// Interrupted by a signal or canceled
    Interrupted = 130,
}

impl ExitCode {
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Status for a failed library call
    pub fn from_error(err: &ocli_core::Error) -> Self {
        match err.exit_code() {
            2 => Self::UsageError,
            3 => Self::NetworkError,
            4 => Self::AuthError,
            5 => Self::NotFound,
            6 => Self::Conflict,
            130 => Self::Interrupted,
            _ => Self::GeneralError,
        }
    }
}
