//! The sliding window between the fetcher and the renderer.
//!
//! [`ViewBuffer`] keeps a contiguous run of surfaced lines centered around
//! the displayed position and refills itself from the fetcher on demand.
//! The background loops in [`loops`] watch for growth and emptiness and
//! nudge the main loop through events.

mod buffer;
pub mod loops;

pub use buffer::{FillResult, ViewBuffer};

use std::sync::Arc;

/// The viewport shared between the main loop and the background loops.
pub type SharedViewBuffer = Arc<tokio::sync::Mutex<ViewBuffer>>;
