//! Machine-readable error codes shared by every appid crate.
//!
//! Each error enum in the workspace implements [`ErrorCode`] so that
//! callers can branch on a stable code rather than on display text.
//!
//! # Example
//!
//! ```
//! use appid_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum StoreError {
//!     Locked,
//!     Corrupted,
//! }
//!
//! impl ErrorCode for StoreError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Locked => "STORE_LOCKED",
//!             Self::Corrupted => "STORE_CORRUPTED",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Locked)
//!     }
//! }
//!
//! assert_eq!(StoreError::Locked.code(), "STORE_LOCKED");
//! assert!(!StoreError::Corrupted.is_recoverable());
//! ```

/// Stable code and retry hint attached to an error.
///
/// # Code Format
///
/// - UPPER_SNAKE_CASE
/// - Prefixed with the owning module (`AGENT_`, `TRAMPOLINE_`, `IDENTITY_`, ...)
/// - Never renamed once published
///
/// An error is recoverable when repeating the same call later may succeed
/// (the agent was not started yet, a name was freed by a concurrent
/// destroy). Malformed input and programming errors are not.
pub trait ErrorCode {
    /// Returns the machine-readable code.
    fn code(&self) -> &'static str;

    /// Returns whether retrying may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that `err` carries a well-formed code with the given prefix.
///
/// # Panics
///
/// Panics when the code is empty, misses the prefix or is not
/// UPPER_SNAKE_CASE.
///
/// # Example
///
/// ```
/// use appid_types::{assert_error_code, ErrorCode};
///
/// struct Busy;
///
/// impl ErrorCode for Busy {
///     fn code(&self) -> &'static str { "POOL_BUSY" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&Busy, "POOL_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Runs [`assert_error_code`] on every element.
///
/// Error modules keep an `all_variants()` helper in their tests and feed
/// it here.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && !s.contains("__")
        && s
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
