use serde::{Deserialize, Serialize};

/// VAD thresholds and audio buffering rules.
///
/// Frames are 512 samples of PCM-16 at 16 kHz, i.e. 32 ms per frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Probability above which a frame counts as speech.
    #[serde(default = "d_speech_threshold")]
    pub speech_threshold: f32,
    /// Consecutive speech frames required to fire speech onset (2 = 64 ms).
    #[serde(default = "d_barge_in_frames")]
    pub barge_in_frames: u32,
    /// Consecutive silence frames required to fire turn end (40 = 1.28 s).
    #[serde(default = "d_silence_frames")]
    pub silence_frames_for_turn_end: u32,
    /// Turns with less buffered audio than this are dropped (200 ms).
    #[serde(default = "d_min_buffer_bytes")]
    pub min_buffer_bytes: usize,
    /// How long after TTS ends before frames reach the VAD again.
    #[serde(default = "d_tts_grace_ms")]
    pub tts_grace_ms: u64,
    /// Speech onset within this window after TTS ends counts as barge-in
    /// (the client may still be playing buffered audio).
    #[serde(default = "d_barge_in_window_ms")]
    pub barge_in_window_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            speech_threshold: d_speech_threshold(),
            barge_in_frames: d_barge_in_frames(),
            silence_frames_for_turn_end: d_silence_frames(),
            min_buffer_bytes: d_min_buffer_bytes(),
            tts_grace_ms: d_tts_grace_ms(),
            barge_in_window_ms: d_barge_in_window_ms(),
        }
    }
}

fn d_speech_threshold() -> f32 {
    0.5
}

fn d_barge_in_frames() -> u32 {
    2
}

fn d_silence_frames() -> u32 {
    40
}

fn d_min_buffer_bytes() -> usize {
    6400
}

fn d_tts_grace_ms() -> u64 {
    500
}

fn d_barge_in_window_ms() -> u64 {
    2000
}
