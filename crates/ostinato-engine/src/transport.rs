//! Host time information fed into the VM each block.

/// Host playback state, numbered the way scripts observe `play_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    Error = 0,
    #[default]
    Playing = 1,
    Paused = 2,
    Recording = 5,
    RecordingPaused = 6,
}

/// Position and tempo snapshot provided by the host before each cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeInfo {
    /// Tempo in beats per minute.
    pub tempo: f64,
    pub playback_state: PlaybackState,
    /// Position in seconds.
    pub time_position: f64,
    /// Position in quarter notes.
    pub beat_position: f64,
    /// Time signature as a fraction.
    pub time_signature: (u32, u32),
}

impl Default for TimeInfo {
    fn default() -> Self {
        TimeInfo {
            tempo: 120.0,
            playback_state: PlaybackState::Playing,
            time_position: 0.0,
            beat_position: 0.0,
            time_signature: (4, 4),
        }
    }
}
