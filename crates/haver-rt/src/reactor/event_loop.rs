//! One reactor instance: socket watches, timers, and the poll step.

use std::io;
use std::time::{Duration, Instant};

use crate::value::{make_string, Value};

use super::timer::{now_ms, Timer};

/// Interest in one file descriptor. A nil callback means no interest in
/// that direction.
#[derive(Debug, Clone)]
pub struct Watch {
    pub fd: i32,
    pub on_read: Value,
    pub on_write: Value,
}

/// A ready notification produced by [`EventLoop::poll`]. The loop never
/// runs callbacks itself; the caller dispatches them.
#[derive(Debug, Clone)]
pub enum Event {
    Read { fd: i32, callback: Value },
    Write { fd: i32, callback: Value },
    Timer { id: i64, callback: Value },
    Stop,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Read { .. } => "read",
            Event::Write { .. } => "write",
            Event::Timer { .. } => "timer",
            Event::Stop => "stop",
        }
    }

    /// The dict handed to programs: `kind`, plus `sock` or `id`, plus
    /// `callback` when one is set.
    pub fn to_value(&self) -> Value {
        use crate::collections::dict;

        let mut d = dict::set(
            &dict::empty(),
            &make_string("kind"),
            &make_string(self.kind()),
        );
        let callback = match self {
            Event::Read { fd, callback } | Event::Write { fd, callback } => {
                d = dict::set(&d, &make_string("sock"), &Value::Int(i64::from(*fd)));
                Some(callback)
            }
            Event::Timer { id, callback } => {
                d = dict::set(&d, &make_string("id"), &Value::Int(*id));
                Some(callback)
            }
            Event::Stop => None,
        };
        if let Some(callback) = callback.filter(|cb| !cb.is_nil()) {
            d = dict::set(&d, &make_string("callback"), callback);
        }
        d
    }
}

#[derive(Debug)]
pub struct EventLoop {
    watches: Vec<Watch>,
    timers: Vec<Timer>,
    next_timer_id: i64,
    stopped: bool,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        EventLoop {
            watches: Vec::new(),
            timers: Vec::new(),
            next_timer_id: 1,
            stopped: false,
        }
    }

    fn watch_entry(&mut self, fd: i32) -> &mut Watch {
        match self.watches.iter().position(|w| w.fd == fd) {
            Some(i) => &mut self.watches[i],
            None => {
                self.watches.push(Watch {
                    fd,
                    on_read: Value::Nil,
                    on_write: Value::Nil,
                });
                let last = self.watches.len() - 1;
                &mut self.watches[last]
            }
        }
    }

    pub fn watch_read(&mut self, fd: i32, callback: Value) {
        self.watch_entry(fd).on_read = callback;
    }

    pub fn watch_write(&mut self, fd: i32, callback: Value) {
        self.watch_entry(fd).on_write = callback;
    }

    /// Forget `fd` entirely. Returns whether it was watched.
    pub fn unwatch(&mut self, fd: i32) -> bool {
        match self.watches.iter().position(|w| w.fd == fd) {
            Some(i) => {
                self.watches.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    fn add_timer(&mut self, delay_ms: i64, interval: i64, callback: Value) -> i64 {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        self.timers.push(Timer {
            id,
            due: now_ms().saturating_add(delay_ms),
            interval,
            callback,
            cancelled: false,
        });
        id
    }

    /// One-shot timer firing `delay_ms` from now.
    pub fn timer_after(&mut self, delay_ms: i64, callback: Value) -> i64 {
        self.add_timer(delay_ms, 0, callback)
    }

    /// Repeating timer, first firing one interval from now.
    pub fn timer_every(&mut self, interval_ms: i64, callback: Value) -> i64 {
        self.add_timer(interval_ms, interval_ms, callback)
    }

    /// Cancel a pending timer. Returns whether it was pending.
    pub fn timer_cancel(&mut self, id: i64) -> bool {
        match self.timers.iter_mut().find(|t| t.id == id && !t.cancelled) {
            Some(timer) => {
                timer.cancelled = true;
                true
            }
            None => false,
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.iter().filter(|t| !t.cancelled).count()
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn next_deadline(&self) -> Option<i64> {
        self.timers
            .iter()
            .filter(|t| !t.cancelled)
            .map(|t| t.due)
            .min()
    }

    /// Wait for readiness or the next timer deadline and return the batch
    /// of ready events.
    ///
    /// `timeout_ms` of `None`, or a negative value, waits without limit
    /// (still capped by the earliest timer). A wait interrupted by a signal
    /// resumes for the time that is left.
    pub fn poll(&mut self, timeout_ms: Option<i64>) -> io::Result<Vec<Event>> {
        if self.stopped {
            return Ok(vec![Event::Stop]);
        }

        let mut wait = timeout_ms.filter(|t| *t >= 0).unwrap_or(-1);
        if let Some(due) = self.next_deadline() {
            let until = (due - now_ms()).max(0);
            wait = if wait < 0 { until } else { wait.min(until) };
        }

        let mut fds: Vec<libc::pollfd> = self
            .watches
            .iter()
            .map(|w| {
                let mut events = 0;
                if !w.on_read.is_nil() {
                    events |= libc::POLLIN;
                }
                if !w.on_write.is_nil() {
                    events |= libc::POLLOUT;
                }
                libc::pollfd {
                    fd: w.fd,
                    events,
                    revents: 0,
                }
            })
            .collect();

        log::trace!("poll: {} fds, wait {wait}ms", fds.len());
        if wait != 0 || !fds.is_empty() {
            poll_fds(&mut fds, wait)?;
        }

        let mut events = Vec::new();
        for (pfd, watch) in fds.iter().zip(self.watches.iter()) {
            let readable = pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0;
            let writable = pfd.revents & (libc::POLLOUT | libc::POLLERR) != 0;
            if readable && !watch.on_read.is_nil() {
                events.push(Event::Read {
                    fd: watch.fd,
                    callback: watch.on_read.clone(),
                });
            }
            if writable && !watch.on_write.is_nil() {
                events.push(Event::Write {
                    fd: watch.fd,
                    callback: watch.on_write.clone(),
                });
            }
        }

        let now = now_ms();
        for timer in self.timers.iter_mut() {
            if timer.is_due(now) {
                events.push(Event::Timer {
                    id: timer.id,
                    callback: timer.callback.clone(),
                });
                timer.rearm(now);
            }
        }
        self.timers.retain(|t| !t.cancelled);

        Ok(events)
    }
}

/// `poll(2)` over `fds`, retrying on EINTR until `wait_ms` has elapsed.
fn poll_fds(fds: &mut [libc::pollfd], wait_ms: i64) -> io::Result<()> {
    let deadline = u64::try_from(wait_ms)
        .ok()
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let mut remaining = wait_ms;
    loop {
        let timeout = remaining.clamp(-1, i64::from(libc::c_int::MAX)) as libc::c_int;
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
        if rc >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
        if let Some(deadline) = deadline {
            let left = deadline.saturating_duration_since(Instant::now());
            remaining = i64::try_from(left.as_millis()).unwrap_or(i64::MAX);
        }
        log::trace!("poll interrupted; {remaining}ms left");
    }
}
