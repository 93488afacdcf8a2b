//! Shortcraft Project Model
//!
//! Defines the core data contracts for a short-form video project:
//! - **Media:** the arena of ingested image and audio files
//! - **Timeline:** ordered clips, automatic clip synthesis, playback position resolution
//! - **Settings:** aspect ratio, guidelines, and per-role text styling
//! - **Styled text:** the `[color]` / `[bg_opacity]` tag grammar
//! - **Project:** the local session file and the storage backend's short document

pub mod clip;
pub mod media;
pub mod project;
pub mod settings;
pub mod styled_text;
pub mod subtitle;
pub mod timeline;

pub use clip::*;
pub use media::*;
pub use project::*;
pub use settings::*;
pub use styled_text::*;
pub use subtitle::*;
pub use timeline::*;
