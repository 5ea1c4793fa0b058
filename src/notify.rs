//! Cross-thread notification relay.
//!
//! Provider threads never touch page or navigation state. Everything they
//! report is turned into a [`Notify`] message and posted onto a single FIFO
//! channel that the consumer (UI) thread drains:
//!
//! - **Pooled tasks**: integer-tagged events (size changed, current index
//!   changed, gesture echoes) reuse boxed [`NotifyTask`]s from a small
//!   lock-free free-list instead of allocating per event.
//!
//! - **Page events**: per-page progress and results. These carry a ticket
//!   (index + generation) and, on success, the decoded image. Images are never
//!   stored in pooled tasks so a recycled task can never alias a page buffer.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use crossbeam_queue::ArrayQueue;
use parking_lot::RwLock;

use crate::image_decode::PageImage;
use crate::page::Progress;
use crate::provider::Ticket;

/// Free-list capacity for pooled notifications.
pub const NOTIFY_POOL_CAPACITY: usize = 3;

/// Tag of a pooled notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyKey {
    LayoutMode,
    Size,
    CurrentIndex,
    TapSliderArea,
    TapMenuArea,
    LongPressPage,
    /// Content at `value` went stale and should be requested again.
    PageChanged,
}

/// Reusable integer-tagged message.
#[derive(Debug)]
pub struct NotifyTask {
    key: NotifyKey,
    value: i64,
}

impl NotifyTask {
    fn new() -> Self {
        Self {
            key: NotifyKey::Size,
            value: 0,
        }
    }

    pub fn set_data(&mut self, key: NotifyKey, value: i64) {
        self.key = key;
        self.value = value;
    }

    pub fn key(&self) -> NotifyKey {
        self.key
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

/// Bounded free-list of [`NotifyTask`]s.
///
/// The pool is a cache, not a limit: `acquire` allocates when it is empty and
/// `release` drops the task when the pool is already full.
pub struct NotifyTaskPool {
    free: ArrayQueue<Box<NotifyTask>>,
}

impl NotifyTaskPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: ArrayQueue::new(capacity.max(1)),
        }
    }

    pub fn acquire(&self) -> Box<NotifyTask> {
        self.free.pop().unwrap_or_else(|| Box::new(NotifyTask::new()))
    }

    pub fn release(&self, task: Box<NotifyTask>) {
        // Full pool: let the extra task go.
        let _ = self.free.push(task);
    }

    /// Number of idle tasks ready for reuse.
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }
}

impl Default for NotifyTaskPool {
    fn default() -> Self {
        Self::new(NOTIFY_POOL_CAPACITY)
    }
}

/// Per-page provider report, marshalled onto the consumer thread.
#[derive(Debug)]
pub enum PageEvent {
    Wait(Ticket),
    Percent(Ticket, Progress),
    Succeed(Ticket, PageImage),
    Failed(Ticket, String),
}

impl PageEvent {
    pub fn ticket(&self) -> Ticket {
        match self {
            PageEvent::Wait(t)
            | PageEvent::Percent(t, _)
            | PageEvent::Succeed(t, _)
            | PageEvent::Failed(t, _) => *t,
        }
    }
}

/// A message on the relay channel.
#[derive(Debug)]
pub enum Notify {
    Task(Box<NotifyTask>),
    Page(PageEvent),
}

type Waker = Box<dyn Fn() + Send + Sync>;

/// Producer half of the relay. Cheap to clone; usable from any thread.
#[derive(Clone)]
pub struct RelaySender {
    tx: Sender<Notify>,
    pool: Arc<NotifyTaskPool>,
    waker: Arc<RwLock<Option<Waker>>>,
}

impl RelaySender {
    /// Post an integer-tagged event using a pooled task.
    pub fn post_task(&self, key: NotifyKey, value: i64) {
        let mut task = self.pool.acquire();
        task.set_data(key, value);
        self.post(Notify::Task(task));
    }

    pub fn post_page(&self, event: PageEvent) {
        self.post(Notify::Page(event));
    }

    pub fn post(&self, message: Notify) {
        if let Err(err) = self.tx.send(message) {
            // Consumer gone: recycle what we can and drop the rest.
            if let Notify::Task(task) = err.into_inner() {
                self.pool.release(task);
            }
            return;
        }
        if let Some(wake) = self.waker.read().as_ref() {
            wake();
        }
    }
}

/// Consumer half of the relay, owned by the UI thread.
pub struct Relay {
    rx: Receiver<Notify>,
    sender: RelaySender,
}

impl Relay {
    pub fn new() -> Self {
        Self::with_pool(NotifyTaskPool::default())
    }

    pub fn with_pool(pool: NotifyTaskPool) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            rx,
            sender: RelaySender {
                tx,
                pool: Arc::new(pool),
                waker: Arc::new(RwLock::new(None)),
            },
        }
    }

    pub fn sender(&self) -> RelaySender {
        self.sender.clone()
    }

    pub fn pool(&self) -> &NotifyTaskPool {
        &self.sender.pool
    }

    /// Install a callback run after every post, e.g. to request a repaint.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.sender.waker.write() = Some(Box::new(waker));
    }

    /// Take the next message without blocking.
    pub fn try_next(&self) -> Option<Notify> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Return a task to the pool once it has been fully applied.
    pub fn recycle(&self, task: Box<NotifyTask>) {
        self.sender.pool.release(task);
    }

    /// Messages waiting to be applied.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}
