//! Haver runtime library.
//!
//! This crate provides the runtime support that compiled Haver programs
//! call into. It is compiled as both:
//!
//! - A static library (`libhaver_rt.a`) for linking into Haver binaries
//! - A Rust library (`lib`) for unit testing
//!
//! ## Modules
//!
//! - [`value`]: the dynamic value model, constructors, truthiness, display
//! - [`ops`]: arithmetic, comparison and conversion
//! - [`collections`]: list, dict, creel (set) and bytes
//! - [`error`] / [`panic`] / [`hurl`]: fatal errors and the catchable
//!   hurl stack
//! - [`record`]: `{ok, value}` / `{ok, error, code}` result records
//! - [`sync`]: threads, mutexes, condvars, atomics and channels behind
//!   integer handles ([`handle`])
//! - [`reactor`]: event loops with socket watches and timers
//! - [`net`]: IPv4 sockets and DNS lookup
//! - [`ext`]: the extension service (JSON, regex, TLS, ...)
//! - [`gc`]: the allocator boundary
//! - [`runtime`] / [`config`] / [`env`]: process-wide context, settings
//!   and program startup
//!
//! ## Error idioms
//!
//! Type errors, bad indices and division by zero print an "Och!" message
//! and exit with status 1. Conversion failures, missing keys, bad handles
//! and most domain errors hurl a value that `protect` catches. Socket and
//! TLS operations return result records instead of failing.

pub mod collections;
pub mod config;
pub mod env;
pub mod error;
pub mod ext;
pub mod gc;
pub mod handle;
pub mod hurl;
pub mod net;
pub mod ops;
pub mod panic;
pub mod reactor;
pub mod record;
pub mod runtime;
pub mod sync;
pub mod value;

// Re-export the pieces most callers need.
pub use error::{RuntimeError, Severity};
pub use ext::{ExtResult, ExtensionService, NativeExtensions};
pub use gc::{ArenaCollector, Collector, SystemCollector};
pub use hurl::{hurl, protect};
pub use runtime::{init, init_with, install_collector, install_extensions, teardown};
pub use value::{
    make_bool, make_class, make_closure, make_float, make_function, make_instance, make_int,
    make_list, make_nil, make_range, make_string, truthy, type_of, Value,
};
