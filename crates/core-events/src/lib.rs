//! Event types and channel helpers for the pager's main loop.
//!
//! The main loop is single-threaded and event-driven: keyboard and resize
//! events arrive from the input task, while the background loops (empty-page
//! refresh, last-line tracker, follower) push their notifications into the
//! same bounded channel. One channel, one consumer; producers park on
//! backpressure rather than dropping events.

use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

/// Capacity of the main event channel. A single producer burst (key
/// auto-repeat, refill notifications) stays far below this; the bound exists
/// to keep a stalled consumer from buffering unbounded input.
pub const EVENT_CHANNEL_CAP: usize = 1024;

/// Top-level event enum consumed by the central event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Key(KeyEvent),
    /// Terminal resize (columns, rows).
    Resize(u16, u16),
    /// The empty-page loop asks for another fill attempt.
    Refresh,
    /// The follower observed tail growth; the viewport should refill.
    Refill,
    /// A new last-known line number for the status bar (0-based).
    StatusUpdate(u64),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub mods: KeyModifiers,
}

impl KeyEvent {
    pub fn plain(code: KeyCode) -> Self {
        Self {
            code,
            mods: KeyModifiers::empty(),
        }
    }

    pub fn ctrl(code: KeyCode) -> Self {
        Self {
            code,
            mods: KeyModifiers::CTRL,
        }
    }
}

/// Normalized logical keys the pager reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Esc,
    Backspace,
    Tab,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Delete,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct KeyModifiers: u8 {
        const CTRL = 0b0000_0001;
        const ALT  = 0b0000_0010;
        const SHIFT= 0b0000_0100;
    }
}

/// Trait implemented by any async event producer. Implementors hold their
/// configuration and spawn one background task that pushes [`Event`]s into
/// the shared channel; they must stop when the channel closes or their own
/// stop condition fires, and must not busy-loop.
pub trait AsyncEventSource: Send + 'static {
    /// Stable identifier used for logging.
    fn name(&self) -> &'static str;
    /// Consume self and spawn the background task.
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()>;
}

/// Registry of event sources, spawned together once the main channel exists
/// and joined on shutdown after the last sender clone is dropped.
#[derive(Default)]
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn AsyncEventSource>>,
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: AsyncEventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    /// Spawn all registered sources, returning their JoinHandles. Each
    /// source receives its own sender clone; the registry keeps none, so
    /// dropping the caller's sender closes the channel for all of them.
    pub fn spawn_all(&mut self, tx: &Sender<Event>) -> Vec<JoinHandle<()>> {
        let mut out = Vec::with_capacity(self.sources.len());
        for src in self.sources.drain(..) {
            tracing::info!(target: "runtime.events", source = src.name(), "spawning event source");
            out.push(src.spawn(tx.clone()));
        }
        out
    }
}

pub type EventResult<T> = anyhow::Result<T>;
