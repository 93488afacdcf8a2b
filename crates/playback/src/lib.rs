//! Shortcraft Playback
//!
//! Real-time side of the editor:
//! - **Clock:** logical playhead advanced by host frame ticks
//! - **Audio sync:** one audio sink kept in step with the playhead
//! - **Preview:** cached composited frames for the clip under the playhead
//! - **Session:** the three driven together, one call per host frame

pub mod audio_sync;
pub mod clock;
pub mod preview;
pub mod session;

pub use audio_sync::{AudioSink, AudioSyncController, AudioTarget, NullSink, SinkError, SyncAction};
pub use clock::PlaybackClock;
pub use preview::PreviewRenderer;
pub use session::{PlaybackSession, TickOutput};
