//! Concurrency primitives exposed to programs through integer handles.
//!
//! Threads are OS threads. Mutexes, condvars, atomics and channels block
//! the calling OS thread; nothing here yields cooperatively. Every
//! resource lives in a typed table in the runtime context (see
//! [`crate::handle`]), and every entry point resolves its handle there
//! before touching the resource. Table locks are released before any
//! operation that may block.

pub mod atomic;
pub mod chan;
pub mod condvar;
pub mod mutex;
pub mod thread;

pub use atomic::ScriptAtomic;
pub use chan::Channel;
pub use condvar::ScriptCondvar;
pub use mutex::ScriptMutex;
pub use thread::ThreadState;
