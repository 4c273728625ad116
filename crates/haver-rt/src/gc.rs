//! Allocator boundary.
//!
//! The runtime never assumes a particular memory manager. It talks to
//! whatever [`Collector`] is installed in the runtime context:
//!
//! - [`SystemCollector`]: the default. Forwards to the global allocator and
//!   ignores thread lifecycle hooks.
//! - [`ArenaCollector`]: page-based bump arena that never frees. Tracks how
//!   many threads are registered and how many string bytes were copied,
//!   which is what a tracing collector needs to know to scan stacks.
//!
//! Spawned runtime threads call [`Collector::register_thread`] before
//! running user code and [`Collector::unregister_thread`] after, so a
//! tracing implementation can find every live stack.

use std::alloc::{self, Layout};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Default page size: 64 KiB.
const PAGE_SIZE: usize = 64 * 1024;

/// The memory manager the runtime allocates through.
pub trait Collector: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Allocate `size` zeroed bytes aligned to `align`. Returns null when
    /// the request cannot be satisfied.
    fn allocate(&self, size: usize, align: usize) -> *mut u8;

    /// Resize a block previously returned by `allocate` on this collector.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this collector with the given `old_size` and
    /// `align`, and must not be used after this call.
    unsafe fn reallocate(&self, ptr: *mut u8, old_size: usize, new_size: usize, align: usize)
        -> *mut u8;

    /// Copy `s` into storage owned by the collector.
    fn duplicate_string(&self, s: &str) -> Arc<str>;

    /// Called on a runtime thread before it runs any user code.
    fn register_thread(&self);

    /// Called on a runtime thread after its user code has returned.
    fn unregister_thread(&self);
}

fn layout(size: usize, align: usize) -> Option<Layout> {
    Layout::from_size_align(size.max(1), align.max(1)).ok()
}

// ---------------------------------------------------------------------------
// SystemCollector
// ---------------------------------------------------------------------------

/// No-op collector over the global allocator.
#[derive(Debug, Default)]
pub struct SystemCollector;

impl Collector for SystemCollector {
    fn name(&self) -> &'static str {
        "system"
    }

    fn allocate(&self, size: usize, align: usize) -> *mut u8 {
        match layout(size, align) {
            Some(layout) => unsafe { alloc::alloc_zeroed(layout) },
            None => ptr::null_mut(),
        }
    }

    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> *mut u8 {
        if ptr.is_null() {
            return self.allocate(new_size, align);
        }
        match layout(old_size, align) {
            Some(old) => alloc::realloc(ptr, old, new_size.max(1)),
            None => ptr::null_mut(),
        }
    }

    fn duplicate_string(&self, s: &str) -> Arc<str> {
        Arc::from(s)
    }

    fn register_thread(&self) {}

    fn unregister_thread(&self) {}
}

// ---------------------------------------------------------------------------
// ArenaCollector
// ---------------------------------------------------------------------------

/// Bump allocator state. Pages are never freed or resized, so every
/// pointer handed out stays valid for the arena's lifetime.
struct Arena {
    pages: Vec<Vec<u8>>,
    /// Offset into the current (last) page.
    offset: usize,
    bytes_allocated: usize,
}

impl Arena {
    fn new() -> Self {
        Arena {
            pages: vec![vec![0u8; PAGE_SIZE]],
            offset: 0,
            bytes_allocated: 0,
        }
    }

    /// Bump-allocate `size` bytes with the given alignment.
    fn alloc(&mut self, size: usize, align: usize) -> *mut u8 {
        let align = align.max(1);
        if !align.is_power_of_two() {
            return ptr::null_mut();
        }
        self.bytes_allocated += size;

        let current = self.pages.last_mut().map(|page| {
            let base = page.as_ptr() as usize;
            let aligned = (base + self.offset + align - 1) & !(align - 1);
            (page, aligned - base)
        });
        if let Some((page, start)) = current {
            if start + size <= page.len() {
                self.offset = start + size;
                return page[start..].as_mut_ptr();
            }
        }

        // Oversized requests get a page of their own.
        let page_size = if size + align > PAGE_SIZE {
            size + align
        } else {
            PAGE_SIZE
        };
        let mut page = vec![0u8; page_size];
        let base = page.as_ptr() as usize;
        let start = ((base + align - 1) & !(align - 1)) - base;
        let ptr = page[start..].as_mut_ptr();
        self.offset = start + size;
        self.pages.push(page);
        ptr
    }
}

/// Usage counters reported by [`ArenaCollector::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub pages: usize,
    pub bytes_allocated: usize,
    pub string_bytes: usize,
    pub threads: usize,
}

/// Page-based bump arena. Memory is reclaimed only when the collector
/// itself is dropped.
pub struct ArenaCollector {
    arena: Mutex<Arena>,
    string_bytes: AtomicUsize,
    threads: AtomicUsize,
}

impl ArenaCollector {
    pub fn new() -> Self {
        ArenaCollector {
            arena: Mutex::new(Arena::new()),
            string_bytes: AtomicUsize::new(0),
            threads: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> ArenaStats {
        let arena = self.arena.lock();
        ArenaStats {
            pages: arena.pages.len(),
            bytes_allocated: arena.bytes_allocated,
            string_bytes: self.string_bytes.load(Ordering::Relaxed),
            threads: self.threads.load(Ordering::Relaxed),
        }
    }
}

impl Default for ArenaCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for ArenaCollector {
    fn name(&self) -> &'static str {
        "arena"
    }

    fn allocate(&self, size: usize, align: usize) -> *mut u8 {
        self.arena.lock().alloc(size, align)
    }

    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> *mut u8 {
        let fresh = self.allocate(new_size, align);
        if !ptr.is_null() && !fresh.is_null() {
            ptr::copy_nonoverlapping(ptr, fresh, old_size.min(new_size));
        }
        fresh
    }

    fn duplicate_string(&self, s: &str) -> Arc<str> {
        self.string_bytes.fetch_add(s.len(), Ordering::Relaxed);
        Arc::from(s)
    }

    fn register_thread(&self) {
        let live = self.threads.fetch_add(1, Ordering::Relaxed) + 1;
        log::trace!("arena: thread registered ({live} live)");
    }

    fn unregister_thread(&self) {
        let live = self.threads.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        log::trace!("arena: thread unregistered ({live} live)");
    }
}

// ---------------------------------------------------------------------------
// C ABI
// ---------------------------------------------------------------------------

/// Allocate `size` zeroed bytes from the installed collector.
#[no_mangle]
pub extern "C" fn haver_gc_alloc(size: u64, align: u64) -> *mut u8 {
    crate::runtime::collector().allocate(size as usize, align as usize)
}

/// Resize a block obtained from [`haver_gc_alloc`].
///
/// # Safety
///
/// `ptr` must have been returned by `haver_gc_alloc` (or this function)
/// with `old_size` and `align`.
#[no_mangle]
pub unsafe extern "C" fn haver_gc_realloc(
    ptr: *mut u8,
    old_size: u64,
    new_size: u64,
    align: u64,
) -> *mut u8 {
    crate::runtime::collector().reallocate(
        ptr,
        old_size as usize,
        new_size as usize,
        align as usize,
    )
}
