//! Leg timers
//!
//! A leg runs at most one timer of each [`TimerKind`]:
//!
//! - **Expire**: bounds the wait for an ACK after a final 2xx, and the wait
//!   for call control's answer after a late-offer 2xx
//! - **Credit**: hard limit on the connected session duration
//! - **Keepalive**: interval between in-dialog OPTIONS probes
//! - **Linger**: how long a disconnected leg stays around to absorb
//!   retransmitted BYEs before it is declared dead
//!
//! Scheduling is abstracted behind [`TimerScheduler`] so tests can fire
//! timers by hand. [`TokioTimerScheduler`] is the runtime implementation.
//!
//! ```text
//! LegContext::start_timer(kind)
//!        │  generation = n
//!        ▼
//! TimerScheduler::schedule(after, fire) ──▶ TimerHandle
//!        │
//!        ▼ (after elapses)
//! CallLeg::timer_fired(kind, n) ── stale generation? ──▶ ignored
//! ```
//!
//! Each arming gets a fresh generation number, so a firing that raced with a
//! cancel or a re-arm is recognised and dropped.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::errors::{LegError, LegResult};

/// The timers a leg owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Expire,
    Credit,
    Keepalive,
    Linger,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerKind::Expire => "expire",
            TimerKind::Credit => "credit",
            TimerKind::Keepalive => "keepalive",
            TimerKind::Linger => "linger",
        };
        f.write_str(name)
    }
}

/// A scheduled timer that can be cancelled
pub trait TimerHandle: Send + Sync {
    /// Stop the timer. Cancelling an already fired timer is a no-op.
    fn cancel(&self);
}

/// Runs a future once a delay has elapsed
pub trait TimerScheduler: Send + Sync {
    fn schedule(&self, after: Duration, fire: BoxFuture<'static, ()>) -> Box<dyn TimerHandle>;
}

/// [`TimerScheduler`] backed by tokio tasks
#[derive(Debug, Clone)]
pub struct TokioTimerScheduler {
    runtime: Handle,
}

impl TokioTimerScheduler {
    /// Scheduler bound to the runtime of the calling task
    pub fn current() -> LegResult<Self> {
        Handle::try_current()
            .map(|runtime| Self { runtime })
            .map_err(|e| LegError::config(format!("Timer scheduler needs a tokio runtime: {}", e)))
    }

    pub fn from_handle(runtime: Handle) -> Self {
        Self { runtime }
    }
}

struct TokioTimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle for TokioTimerHandle {
    fn cancel(&self) {
        self.task.abort();
    }
}

impl TimerScheduler for TokioTimerScheduler {
    fn schedule(&self, after: Duration, fire: BoxFuture<'static, ()>) -> Box<dyn TimerHandle> {
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            fire.await;
        });
        Box::new(TokioTimerHandle { task })
    }
}

struct ArmedTimer {
    generation: u64,
    handle: Box<dyn TimerHandle>,
}

/// Per-leg timer slots
#[derive(Default)]
pub struct LegTimers {
    expire: Option<ArmedTimer>,
    credit: Option<ArmedTimer>,
    keepalive: Option<ArmedTimer>,
    linger: Option<ArmedTimer>,
    next_generation: u64,
}

impl fmt::Debug for LegTimers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegTimers")
            .field("expire", &self.expire.is_some())
            .field("credit", &self.credit.is_some())
            .field("keepalive", &self.keepalive.is_some())
            .field("linger", &self.linger.is_some())
            .finish()
    }
}

impl LegTimers {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<ArmedTimer> {
        match kind {
            TimerKind::Expire => &mut self.expire,
            TimerKind::Credit => &mut self.credit,
            TimerKind::Keepalive => &mut self.keepalive,
            TimerKind::Linger => &mut self.linger,
        }
    }

    /// Reserve the generation number for the next arming
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Store a freshly scheduled timer, cancelling whatever occupied the slot
    pub fn arm(&mut self, kind: TimerKind, generation: u64, handle: Box<dyn TimerHandle>) {
        if let Some(previous) = self.slot(kind).replace(ArmedTimer { generation, handle }) {
            trace!("replacing {} timer generation {}", kind, previous.generation);
            previous.handle.cancel();
        }
    }

    /// Cancel a timer; returns whether one was armed
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.slot(kind).take() {
            Some(armed) => {
                armed.handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for kind in [
            TimerKind::Expire,
            TimerKind::Credit,
            TimerKind::Keepalive,
            TimerKind::Linger,
        ] {
            self.cancel(kind);
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Expire => self.expire.is_some(),
            TimerKind::Credit => self.credit.is_some(),
            TimerKind::Keepalive => self.keepalive.is_some(),
            TimerKind::Linger => self.linger.is_some(),
        }
    }

    /// Clear the slot if `generation` is the one currently armed.
    ///
    /// Returns `false` for stale firings, leaving the slot untouched.
    pub fn take_if_current(&mut self, kind: TimerKind, generation: u64) -> bool {
        let slot = self.slot(kind);
        if slot.as_ref().is_some_and(|armed| armed.generation == generation) {
            *slot = None;
            true
        } else {
            false
        }
    }
}
