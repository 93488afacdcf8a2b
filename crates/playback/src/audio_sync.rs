//! Keeps a single audio sink in step with the playback clock.

use std::path::{Path, PathBuf};

use shortcraft_common::config::PlaybackDefaults;
use shortcraft_project_model::{ClipTimeline, ResolvedPosition};

/// Failure reported by an audio sink when asked to play.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// A newer request (pause, new source) interrupted this one.
    #[error("Play request superseded")]
    Superseded,

    #[error("Audio sink failed: {0}")]
    Failed(String),
}

/// A single-source audio output.
pub trait AudioSink: Send {
    /// Currently loaded source, if any.
    fn source(&self) -> Option<&Path>;

    /// Load a new source. Playback position and metadata reset.
    fn set_source(&mut self, source: &Path);

    fn position_secs(&self) -> f64;

    fn seek(&mut self, secs: f64);

    /// Whether the source's metadata (duration, seekability) is known.
    fn has_metadata(&self) -> bool;

    fn is_paused(&self) -> bool;

    fn play(&mut self) -> Result<(), SinkError>;

    fn pause(&mut self);
}

/// What the sink should be playing right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioTarget<'a> {
    pub source: &'a Path,
    pub offset_secs: f64,
}

/// Audio target for a resolved playhead; `None` when the clip has no audio.
pub fn audio_target<'a>(
    timeline: &'a ClipTimeline,
    resolved: Option<&ResolvedPosition>,
) -> Option<AudioTarget<'a>> {
    let resolved = resolved?;
    let clip = timeline.clip(resolved.span.clip_id)?;
    let file = timeline.clip_audio(clip)?;
    Some(AudioTarget {
        source: &file.path,
        offset_secs: resolved.offset_secs,
    })
}

/// What one sync step did to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Nothing to change.
    Idle,
    Paused,
    /// A new source was loaded; seeking and playing wait for the next step.
    Retargeted,
    Synced { seeked: bool, started: bool },
}

/// Owns the sink and applies the sync rules on every step.
#[derive(Debug)]
pub struct AudioSyncController<S> {
    sink: S,
    drift_tolerance_secs: f64,
}

impl<S: AudioSink> AudioSyncController<S> {
    pub fn new(sink: S, drift_tolerance_secs: f64) -> Self {
        Self {
            sink,
            drift_tolerance_secs,
        }
    }

    pub fn from_config(sink: S, config: &PlaybackDefaults) -> Self {
        Self::new(sink, config.drift_tolerance_secs)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Reconcile the sink with the playback state.
    pub fn sync(&mut self, playing: bool, target: Option<AudioTarget<'_>>) -> SyncAction {
        let target = match (playing, target) {
            (true, Some(target)) => target,
            _ => return self.pause_if_playing(),
        };

        if self.sink.source() != Some(target.source) {
            tracing::debug!(source = %target.source.display(), "Retargeting audio sink");
            self.sink.set_source(target.source);
            return SyncAction::Retargeted;
        }

        let drift = (self.sink.position_secs() - target.offset_secs).abs();
        let seeked = drift > self.drift_tolerance_secs && self.sink.has_metadata();
        if seeked {
            tracing::debug!(drift, offset = target.offset_secs, "Correcting audio drift");
            self.sink.seek(target.offset_secs);
        }

        let mut started = false;
        if self.sink.is_paused() {
            match self.sink.play() {
                Ok(()) => started = true,
                Err(SinkError::Superseded) => {
                    tracing::debug!("Play request superseded");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Unexpected audio play failure");
                }
            }
        }
        SyncAction::Synced { seeked, started }
    }

    fn pause_if_playing(&mut self) -> SyncAction {
        if self.sink.is_paused() {
            SyncAction::Idle
        } else {
            self.sink.pause();
            SyncAction::Paused
        }
    }
}

/// Sink that records calls without producing sound.
#[derive(Debug, Default, Clone)]
pub struct NullSink {
    source: Option<PathBuf>,
    position_secs: f64,
    paused: bool,
    metadata: bool,
    /// Error to return from the next `play` call.
    pub fail_next_play: Option<fn() -> SinkError>,
    pub plays: usize,
    pub seeks: usize,
}

impl NullSink {
    pub fn new() -> Self {
        Self {
            paused: true,
            ..Self::default()
        }
    }

    /// Pretend metadata finished loading.
    pub fn load_metadata(&mut self) {
        self.metadata = true;
    }

    /// Let the sink's own position run, as real output would.
    pub fn advance(&mut self, secs: f64) {
        if !self.paused {
            self.position_secs += secs;
        }
    }
}

impl AudioSink for NullSink {
    fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn set_source(&mut self, source: &Path) {
        self.source = Some(source.to_path_buf());
        self.position_secs = 0.0;
        self.metadata = false;
        self.paused = true;
    }

    fn position_secs(&self) -> f64 {
        self.position_secs
    }

    fn seek(&mut self, secs: f64) {
        self.position_secs = secs;
        self.seeks += 1;
    }

    fn has_metadata(&self) -> bool {
        self.metadata
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn play(&mut self) -> Result<(), SinkError> {
        if let Some(make_error) = self.fail_next_play.take() {
            return Err(make_error());
        }
        self.paused = false;
        self.plays += 1;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(source: &Path, offset_secs: f64) -> Option<AudioTarget<'_>> {
        Some(AudioTarget {
            source,
            offset_secs,
        })
    }

    fn controller() -> AudioSyncController<NullSink> {
        AudioSyncController::new(NullSink::new(), 0.25)
    }

    #[test]
    fn test_retarget_returns_before_playing() {
        let mut sync = controller();
        let intro = Path::new("intro.wav");
        assert_eq!(sync.sync(true, target(intro, 1.0)), SyncAction::Retargeted);
        assert!(sync.sink().is_paused());
        assert_eq!(sync.sink().seeks, 0);

        // Metadata not loaded yet: play without seeking.
        assert_eq!(
            sync.sync(true, target(intro, 1.0)),
            SyncAction::Synced {
                seeked: false,
                started: true
            }
        );
    }

    #[test]
    fn test_seek_only_past_tolerance() {
        let mut sync = controller();
        let intro = Path::new("intro.wav");
        sync.sync(true, target(intro, 0.0));
        sync.sink_mut().load_metadata();
        sync.sync(true, target(intro, 0.0));

        sync.sink_mut().advance(1.0);
        assert_eq!(
            sync.sync(true, target(intro, 1.2)),
            SyncAction::Synced {
                seeked: false,
                started: false
            }
        );
        assert_eq!(
            sync.sync(true, target(intro, 1.3)),
            SyncAction::Synced {
                seeked: true,
                started: false
            }
        );
        assert_eq!(sync.sink().position_secs(), 1.3);
    }

    #[test]
    fn test_pause_when_stopped_or_silent() {
        let mut sync = controller();
        let intro = Path::new("intro.wav");
        sync.sync(true, target(intro, 0.0));
        sync.sync(true, target(intro, 0.0));
        assert!(!sync.sink().is_paused());

        assert_eq!(sync.sync(true, None), SyncAction::Paused);
        assert_eq!(sync.sync(true, None), SyncAction::Idle);

        sync.sync(true, target(intro, 0.0));
        assert_eq!(sync.sync(false, target(intro, 0.0)), SyncAction::Paused);
    }

    #[test]
    fn test_play_rejections_are_swallowed() {
        let mut sync = controller();
        let intro = Path::new("intro.wav");
        sync.sync(true, target(intro, 0.0));

        sync.sink_mut().fail_next_play = Some(|| SinkError::Superseded);
        assert_eq!(
            sync.sync(true, target(intro, 0.0)),
            SyncAction::Synced {
                seeked: false,
                started: false
            }
        );

        sync.sink_mut().fail_next_play = Some(|| SinkError::Failed("device lost".into()));
        sync.sync(true, target(intro, 0.0));
        assert!(sync.sink().is_paused());

        // Next step tries again.
        sync.sync(true, target(intro, 0.0));
        assert_eq!(sync.sink().plays, 1);
    }

    #[test]
    fn test_switching_clips_retargets() {
        let mut sync = controller();
        sync.sync(true, target(Path::new("intro.wav"), 0.0));
        sync.sync(true, target(Path::new("intro.wav"), 0.0));
        assert_eq!(
            sync.sync(true, target(Path::new("outro.wav"), 0.0)),
            SyncAction::Retargeted
        );
        assert_eq!(sync.sink().source(), Some(Path::new("outro.wav")));
    }
}
