//! Built-in collection types.
//!
//! - [`list`]: growable array with reference semantics
//! - [`dict`]: flat entry buffer, in-place update and copy-on-insert
//! - [`set`]: the creel, an immutable membership buffer
//! - [`bytes`]: growable byte buffer with big-endian accessors

pub mod bytes;
pub mod dict;
pub mod list;
pub mod set;
