//! User-visible notifications.
//!
//! The service layer reports outcomes through a [`NotificationSink`]. The
//! [`Dispatcher`] is the default sink: a short, time-ordered queue whose
//! entries expire after a fixed lifetime.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(3);
pub const DEFAULT_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Info => "Info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Receives user-facing messages. Fire-and-forget: implementations must not
/// block for long and never report failure back to the caller.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub severity: Severity,
    pub posted_at: Instant,
    pub expires_at: Instant,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity.title(), self.message)
    }
}

#[derive(Debug, Default)]
struct Queue {
    entries: VecDeque<Notification>,
    next_id: u64,
}

#[derive(Debug)]
pub struct Dispatcher {
    queue: Mutex<Queue>,
    capacity: usize,
    lifetime: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, DEFAULT_LIFETIME)
    }

    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn with_limits(capacity: usize, lifetime: Duration) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            capacity: capacity.max(1),
            lifetime,
        }
    }

    /// Process-wide dispatcher, created on first use.
    pub fn global() -> Arc<Dispatcher> {
        static GLOBAL: OnceLock<Arc<Dispatcher>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Dispatcher::new())))
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    // A panic while holding the lock leaves the queue intact, so keep using it.
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a message posted at `now` and return its id. When the queue is
    /// full the oldest entry is dropped.
    pub fn post_at(&self, message: impl Into<String>, severity: Severity, now: Instant) -> u64 {
        let mut queue = self.lock();
        queue.next_id += 1;
        let id = queue.next_id;
        let entry = Notification {
            id,
            message: message.into(),
            severity,
            posted_at: now,
            expires_at: now + self.lifetime,
        };
        let pos = queue.entries.partition_point(|n| n.posted_at <= now);
        queue.entries.insert(pos, entry);
        while queue.entries.len() > self.capacity {
            if let Some(evicted) = queue.entries.pop_front() {
                debug!(id = evicted.id, "notification evicted");
            }
        }
        id
    }

    pub fn post(&self, message: impl Into<String>, severity: Severity) -> u64 {
        self.post_at(message, severity, Instant::now())
    }

    /// Remove one entry early. Returns false if it already expired or was
    /// never queued.
    pub fn dismiss(&self, id: u64) -> bool {
        let mut queue = self.lock();
        match queue.entries.iter().position(|n| n.id == id) {
            Some(pos) => {
                queue.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Remove and return every entry whose expiry is at or before `now`.
    pub fn expire(&self, now: Instant) -> Vec<Notification> {
        let mut queue = self.lock();
        let (expired, kept): (Vec<_>, Vec<_>) = queue
            .entries
            .drain(..)
            .partition(|n| n.expires_at <= now);
        queue.entries = kept.into();
        expired
    }

    /// Snapshot of the queue, oldest first.
    #[must_use]
    pub fn active(&self) -> Vec<Notification> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Remove and return everything, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        self.lock().entries.drain(..).collect()
    }

    /// Start a task that expires entries every `tick`. The task ends once the
    /// dispatcher itself is dropped.
    pub fn spawn_expiry(self: &Arc<Self>, tick: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                let Some(dispatcher) = weak.upgrade() else {
                    break;
                };
                let expired = dispatcher.expire(Instant::now());
                if !expired.is_empty() {
                    debug!(count = expired.len(), "notifications expired");
                }
            }
        })
    }
}

impl NotificationSink for Dispatcher {
    fn notify(&self, message: &str, severity: Severity) {
        self.post(message, severity);
    }
}
