//! Logical playback position driven by host frame ticks.

use std::time::Duration;

use shortcraft_project_model::{ClipTimeline, ResolvedPosition};

/// Playback position accumulator.
///
/// The host calls [`PlaybackClock::tick`] once per display frame with a
/// monotonic timestamp. The first tick after construction only records the
/// timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackClock {
    position_secs: f64,
    playing: bool,
    last_tick: Option<Duration>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> f64 {
        self.position_secs
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Advance by the wall time since the previous tick while playing.
    ///
    /// Reaching `total_secs` stops playback with the position clamped to
    /// exactly the total. Returns the new position.
    pub fn tick(&mut self, now: Duration, total_secs: f64) -> f64 {
        let delta = self
            .last_tick
            .map(|last| now.saturating_sub(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        if self.playing {
            let next = self.position_secs + delta;
            if next >= total_secs {
                self.playing = false;
                self.position_secs = total_secs.max(0.0);
                tracing::debug!(position = self.position_secs, "Playback reached the end");
            } else {
                self.position_secs = next;
            }
        }
        self.position_secs
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Toggle play/pause. Starting from the end restarts from zero.
    pub fn toggle_play(&mut self, total_secs: f64) -> bool {
        if self.playing {
            self.playing = false;
        } else {
            if self.position_secs >= total_secs {
                self.position_secs = 0.0;
            }
            self.playing = true;
        }
        self.playing
    }

    /// Jump to `position`, clamped into `[0, total_secs]`.
    pub fn seek(&mut self, position: f64, total_secs: f64) -> f64 {
        let position = if position.is_nan() { 0.0 } else { position };
        self.position_secs = position.clamp(0.0, total_secs.max(0.0));
        self.position_secs
    }

    /// Pull the position back inside a timeline that shrank.
    pub fn clamp_to(&mut self, total_secs: f64) {
        if self.position_secs > total_secs {
            self.position_secs = total_secs.max(0.0);
        }
    }

    /// The clip under the playhead.
    pub fn resolve(&self, timeline: &ClipTimeline) -> Option<ResolvedPosition> {
        timeline.resolve(self.position_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_tick_only_records() {
        let mut clock = PlaybackClock::new();
        clock.play();
        assert_eq!(clock.tick(ms(5_000), 10.0), 0.0);
        assert!((clock.tick(ms(5_500), 10.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_paused_clock_holds_position() {
        let mut clock = PlaybackClock::new();
        clock.tick(ms(0), 10.0);
        clock.tick(ms(1_000), 10.0);
        assert_eq!(clock.position(), 0.0);

        // Time spent paused is not replayed on resume.
        clock.play();
        assert!((clock.tick(ms(1_100), 10.0) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_end_clamps_and_stops() {
        let mut clock = PlaybackClock::new();
        clock.tick(ms(0), 5.0);
        clock.play();
        clock.tick(ms(4_900), 5.0);
        assert!(clock.is_playing());
        assert_eq!(clock.tick(ms(5_300), 5.0), 5.0);
        assert!(!clock.is_playing());
    }

    #[test]
    fn test_toggle_at_end_restarts() {
        let mut clock = PlaybackClock::new();
        clock.seek(5.0, 5.0);
        assert!(clock.toggle_play(5.0));
        assert_eq!(clock.position(), 0.0);
        assert!(!clock.toggle_play(5.0));
    }

    #[test]
    fn test_seek_clamps() {
        let mut clock = PlaybackClock::new();
        assert_eq!(clock.seek(-3.0, 5.0), 0.0);
        assert_eq!(clock.seek(9.0, 5.0), 5.0);
        assert_eq!(clock.seek(f64::NAN, 5.0), 0.0);
        clock.seek(4.0, 5.0);
        clock.clamp_to(2.5);
        assert_eq!(clock.position(), 2.5);
    }

    #[test]
    fn test_empty_timeline_stops_immediately() {
        let mut clock = PlaybackClock::new();
        clock.tick(ms(0), 0.0);
        clock.play();
        assert_eq!(clock.tick(ms(16), 0.0), 0.0);
        assert!(!clock.is_playing());
    }

    proptest! {
        #[test]
        fn prop_position_stays_in_range(steps in proptest::collection::vec(0u64..200, 1..100), total in 0.0f64..10.0) {
            let mut clock = PlaybackClock::new();
            clock.play();
            let mut now = 0;
            for step in steps {
                now += step;
                let position = clock.tick(ms(now), total);
                prop_assert!(position >= 0.0 && position <= total);
            }
        }
    }
}
