//! Shortcraft Render Engine
//!
//! Turns a clip timeline into pixels and, offline, into a finished MP4.
//!
//! # Pipeline Architecture
//!
//! ```text
//! images ──── ImageAssets ──┐
//!                           ├── Compositor (one frame per clip)
//! settings + subtitles ─────┘          │
//!                                      ▼
//!                               VideoEncoder (H.264) ──┐
//!                                                      ├── Mp4Muxer ──► video/mp4
//! clip audio ── decode ── assemble ── AudioEncoder ────┘
//!                                      (AAC)
//! ```
//!
//! The compositor is shared with interactive preview; everything from the
//! encoders on runs only during export.

pub mod assets;
pub mod audio;
pub mod bitstream;
pub mod canvas;
pub mod compositor;
pub mod encoder;
pub mod export;
pub mod ffmpeg;
pub mod mux;
pub mod pipeline;
pub mod text;

pub use assets::ImageAssets;
pub use compositor::{ClipImage, Compositor, FrameRequest};
pub use encoder::{EncoderBackend, Muxer};
pub use export::{ExportArtifact, Exporter};
pub use ffmpeg::FfmpegBackend;
pub use mux::Mp4Muxer;
pub use pipeline::{ExportProgress, ProgressCallback, RenderError, RenderResult, RenderState};
pub use text::{BlockRasterizer, RustTypeRasterizer, TextRasterizer};
