//! Clip timeline manager.
//!
//! Owns the media library and the ordered clip list. Clip order is array
//! position; durations and start times are always derived, never stored.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clip::{Clip, ClipId, ClipSpan, ResolvedPosition, FALLBACK_CLIP_DURATION_SECS};
use crate::media::{LoadState, MediaFile, MediaId, MediaKind, MediaLibrary};
use crate::subtitle::derive_subtitle;

/// Ordered clips plus the media they reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipTimeline {
    library: MediaLibrary,
    clips: Vec<Clip>,
    #[serde(skip)]
    selected: Option<ClipId>,
    next_clip_id: u64,
}

impl ClipTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn library(&self) -> &MediaLibrary {
        &self.library
    }

    /// Mutable access for load/probe results. Ingestion goes through
    /// [`ClipTimeline::add_media_files`] so synthesis runs.
    pub fn library_mut(&mut self) -> &mut MediaLibrary {
        &mut self.library
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn position_of(&self, id: ClipId) -> Option<usize> {
        self.clips.iter().position(|c| c.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn selected(&self) -> Option<ClipId> {
        self.selected
    }

    /// Audio file attached to a clip, if it resolves.
    pub fn clip_audio(&self, clip: &Clip) -> Option<&MediaFile> {
        clip.audio.and_then(|id| self.library.get_kind(id, MediaKind::Audio))
    }

    /// Image file attached to a clip, if it resolves.
    pub fn clip_image(&self, clip: &Clip) -> Option<&MediaFile> {
        clip.image.and_then(|id| self.library.get_kind(id, MediaKind::Image))
    }

    /// Ingest files and synthesize clips for any audio left unmatched.
    pub fn add_media_files<P: AsRef<Path>>(
        &mut self,
        paths: impl IntoIterator<Item = P>,
        kind: MediaKind,
    ) -> Vec<MediaId> {
        let ids = self.library.add_files(paths, kind);
        tracing::debug!(count = ids.len(), ?kind, "Ingested media files");
        self.synthesize();
        ids
    }

    /// Create one clip per audio file not used by any clip, in library
    /// order, pairing each with the next image not used by any clip.
    ///
    /// Running it again without new audio creates nothing.
    pub fn synthesize(&mut self) -> Vec<ClipId> {
        let used_images: HashSet<MediaId> = self.clips.iter().filter_map(|c| c.image).collect();
        let used_audios: HashSet<MediaId> = self.clips.iter().filter_map(|c| c.audio).collect();

        let available_images: Vec<MediaId> = self
            .library
            .images()
            .map(|f| f.id)
            .filter(|id| !used_images.contains(id))
            .collect();
        let unmatched: Vec<(MediaId, String)> = self
            .library
            .audios()
            .filter(|f| !used_audios.contains(&f.id))
            .map(|f| (f.id, derive_subtitle(&f.name)))
            .collect();

        let mut created = Vec::with_capacity(unmatched.len());
        for (index, (audio, subtitle)) in unmatched.into_iter().enumerate() {
            let id = self.allocate_id();
            let image = available_images.get(index).copied();
            tracing::debug!(clip = %id, %audio, image = ?image, "Synthesized clip");
            self.clips.push(Clip {
                id,
                image,
                audio: Some(audio),
                subtitle,
            });
            created.push(id);
        }
        created
    }

    /// Append an empty clip.
    pub fn add_clip(&mut self) -> ClipId {
        let id = self.allocate_id();
        self.clips.push(Clip {
            id,
            image: None,
            audio: None,
            subtitle: String::new(),
        });
        id
    }

    fn allocate_id(&mut self) -> ClipId {
        let id = ClipId(self.next_clip_id);
        self.next_clip_id += 1;
        id
    }

    fn clip_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id == id)
    }

    /// Point a clip at a different image. `None`, or an id that does not
    /// resolve to an image, clears it.
    pub fn reassign_image(&mut self, clip: ClipId, image: Option<MediaId>) -> bool {
        let image = image.filter(|id| self.library.get_kind(*id, MediaKind::Image).is_some());
        match self.clip_mut(clip) {
            Some(c) => {
                c.image = image;
                true
            }
            None => false,
        }
    }

    /// Assign a staged library image to a clip. Only images that finished
    /// loading are accepted.
    pub fn assign_staged_image(&mut self, clip: ClipId, image: MediaId) -> bool {
        let loaded = self
            .library
            .get_kind(image, MediaKind::Image)
            .is_some_and(|f| f.state == LoadState::Loaded);
        if !loaded {
            tracing::warn!(clip = %clip, %image, "Staged image not assigned: not loaded");
            return false;
        }
        self.reassign_image(clip, Some(image))
    }

    /// Point a clip at a different audio file.
    ///
    /// Ids that do not resolve to audio leave the clip untouched; audio can
    /// be changed but never unset. The subtitle follows the new audio only
    /// if it was empty or still equal to the old audio's derived subtitle.
    pub fn reassign_audio(&mut self, clip: ClipId, audio: MediaId) -> bool {
        let Some(new_audio) = self.library.get_kind(audio, MediaKind::Audio) else {
            return false;
        };
        let new_subtitle = derive_subtitle(&new_audio.name);

        let Some(current) = self.clip(clip) else {
            return false;
        };
        let old_subtitle = self.clip_audio(current).map(|f| derive_subtitle(&f.name));
        let replace = current.subtitle.is_empty()
            || old_subtitle.is_some_and(|old| old == current.subtitle);

        if let Some(c) = self.clip_mut(clip) {
            c.audio = Some(audio);
            if replace {
                c.subtitle = new_subtitle;
            }
        }
        true
    }

    pub fn set_subtitle(&mut self, clip: ClipId, subtitle: impl Into<String>) -> bool {
        match self.clip_mut(clip) {
            Some(c) => {
                c.subtitle = subtitle.into();
                true
            }
            None => false,
        }
    }

    /// Move the clip at index `from` to index `to`.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if from >= self.clips.len() || to >= self.clips.len() {
            return false;
        }
        let clip = self.clips.remove(from);
        self.clips.insert(to, clip);
        true
    }

    /// Delete a clip. Media stays in the library.
    pub fn remove(&mut self, clip: ClipId) -> Option<Clip> {
        let index = self.position_of(clip)?;
        if self.selected == Some(clip) {
            self.selected = None;
        }
        Some(self.clips.remove(index))
    }

    /// Select a clip, returning its start time on the timeline.
    pub fn select(&mut self, clip: ClipId) -> Option<f64> {
        let span = self.span_of(clip)?;
        self.selected = Some(clip);
        Some(span.start_secs)
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Effective duration: the audio's decoded duration, else the fallback.
    pub fn clip_duration(&self, clip: &Clip) -> f64 {
        self.clip_audio(clip)
            .and_then(|f| f.duration_secs)
            .unwrap_or(FALLBACK_CLIP_DURATION_SECS)
    }

    pub fn total_duration(&self) -> f64 {
        self.clips.iter().map(|c| self.clip_duration(c)).sum()
    }

    /// Start time and duration of every clip, in order.
    pub fn spans(&self) -> Vec<ClipSpan> {
        let mut start = 0.0;
        self.clips
            .iter()
            .enumerate()
            .map(|(index, clip)| {
                let duration = self.clip_duration(clip);
                let span = ClipSpan {
                    index,
                    clip_id: clip.id,
                    start_secs: start,
                    duration_secs: duration,
                };
                start += duration;
                span
            })
            .collect()
    }

    pub fn span_of(&self, clip: ClipId) -> Option<ClipSpan> {
        self.spans().into_iter().find(|s| s.clip_id == clip)
    }

    /// Find the clip playing at `position` seconds.
    ///
    /// Positions at or past the end resolve to the last clip at its full
    /// duration. Returns `None` only when there are no clips.
    pub fn resolve(&self, position: f64) -> Option<ResolvedPosition> {
        let spans = self.spans();
        let last = *spans.last()?;
        let position = if position.is_nan() { 0.0 } else { position.max(0.0) };

        if position >= last.end_secs() {
            return Some(ResolvedPosition {
                span: last,
                offset_secs: last.duration_secs,
            });
        }

        spans
            .into_iter()
            .find(|s| position < s.end_secs())
            .map(|span| ResolvedPosition {
                span,
                offset_secs: position - span.start_secs,
            })
    }

    /// True when at least one clip carries audio that resolves.
    pub fn has_audio(&self) -> bool {
        self.clips.iter().any(|c| self.clip_audio(c).is_some())
    }
}
