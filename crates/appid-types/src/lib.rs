//! Core types for the application identity party graph.
//!
//! This crate holds what every layer agrees on and nothing else:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  appid-types    : FullName, NameParts, ErrorCode  ◄── HERE
//! ├──────────────────────────────────────────────────────┤
//! │  appid-runtime  : agent, trampoline, lifecycle,      │
//! │                   party graph, configuration         │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use appid_types::FullName;
//!
//! let root = FullName::parse("Acme/$Hub").unwrap();
//! assert_eq!(root.environment_name(), "#Dev");
//! assert_eq!(root, FullName::parse("ACME/$hub/#dev").unwrap());
//! ```

mod error;
pub mod name;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use name::{FullName, NameError, NameParts};
