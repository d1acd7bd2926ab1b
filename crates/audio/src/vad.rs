//! Voice-activity streamer for barge-in and end-of-turn detection.
//!
//! Raw PCM-16 LE mono 16 kHz audio is chunked into 512-sample (32 ms)
//! windows; each window gets a speech probability from the injected model.
//! Edge events are *returned* rather than delivered through stored
//! callbacks, so the owning session task awaits its own async reactions and
//! the streamer never blocks.
//!
//! The production model's weights are heavy to load; implement
//! [`VadModelSource`] over a shared copy loaded once at process start and
//! hand each session its own [`VadModel`] instance (per-session recurrent
//! state, shared read-only weights).

use voco_domain::config::AudioConfig;

pub const SAMPLE_RATE: u32 = 16_000;
/// 32 ms at 16 kHz.
pub const CHUNK_SAMPLES: usize = 512;
/// int16 → 2 bytes per sample.
pub const CHUNK_BYTES: usize = CHUNK_SAMPLES * 2;

/// Per-window speech scorer with recurrent state.
pub trait VadModel: Send + Sync {
    /// Speech probability in [0, 1] for one 512-sample window.
    fn predict(&mut self, frame: &[f32]) -> f32;

    /// Clear recurrent state for a new turn.
    fn reset(&mut self);
}

/// Factory handing out per-session model instances over shared weights.
pub trait VadModelSource: Send + Sync {
    fn instantiate(&self) -> Box<dyn VadModel>;
}

/// Edge events produced by the streamer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// ≥ `barge_in_frames` consecutive speech windows; fires once per turn.
    SpeechOnset,
    /// ≥ `silence_frames_for_turn_end` consecutive silence windows while
    /// speaking; fires exactly once per speech run.
    TurnEnd,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streamer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct VadStreamer {
    model: Box<dyn VadModel>,
    speech_threshold: f32,
    barge_in_frames: u32,
    silence_frames_for_turn_end: u32,

    buffer: Vec<u8>,
    speech_frames: u32,
    silence_frames: u32,
    is_speaking: bool,
    barge_in_fired: bool,
}

impl VadStreamer {
    pub fn new(model: Box<dyn VadModel>, config: &AudioConfig) -> Self {
        Self {
            model,
            speech_threshold: config.speech_threshold,
            barge_in_frames: config.barge_in_frames,
            silence_frames_for_turn_end: config.silence_frames_for_turn_end,
            buffer: Vec::new(),
            speech_frames: 0,
            silence_frames: 0,
            is_speaking: false,
            barge_in_fired: false,
        }
    }

    /// Append raw PCM bytes and run VAD on every complete window extractable
    /// from the buffer. Returns edge events in the order they fired.
    pub fn process_chunk(&mut self, raw: &[u8]) -> Vec<VadEvent> {
        self.buffer.extend_from_slice(raw);
        let mut events = Vec::new();

        while self.buffer.len() >= CHUNK_BYTES {
            let frame_bytes: Vec<u8> = self.buffer.drain(..CHUNK_BYTES).collect();
            let samples = pcm_to_f32(&frame_bytes);
            let prob = self.model.predict(&samples);

            if prob >= self.speech_threshold {
                self.speech_frames += 1;
                self.silence_frames = 0;

                if !self.is_speaking && self.speech_frames >= self.barge_in_frames {
                    self.is_speaking = true;
                    if !self.barge_in_fired {
                        self.barge_in_fired = true;
                        events.push(VadEvent::SpeechOnset);
                    }
                }
            } else {
                self.silence_frames += 1;
                self.speech_frames = 0;

                if self.is_speaking && self.silence_frames >= self.silence_frames_for_turn_end {
                    self.is_speaking = false;
                    events.push(VadEvent::TurnEnd);
                    self.reset_turn_state();
                }
            }
        }

        events
    }

    /// Reset all streaming state, including the model's recurrent state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.reset_turn_state();
        self.model.reset();
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    fn reset_turn_state(&mut self) {
        self.speech_frames = 0;
        self.silence_frames = 0;
        self.is_speaking = false;
        self.barge_in_fired = false;
    }
}

/// Convert PCM-16 LE bytes to f32 samples in [-1, 1].
fn pcm_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Energy fallback model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// RMS-energy scorer used when no ML model is wired in (dev mode, tests).
///
/// Maps frame RMS through a soft knee so quiet room noise scores near 0 and
/// direct speech scores near 1. Stateless, so `reset` is a no-op.
pub struct EnergyVad {
    /// RMS at which the score crosses 0.5.
    pub knee: f32,
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self { knee: 0.02 }
    }
}

impl VadModel for EnergyVad {
    fn predict(&mut self, frame: &[f32]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let mean_sq: f32 = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        let rms = mean_sq.sqrt();
        (rms / (rms + self.knee)).clamp(0.0, 1.0)
    }

    fn reset(&mut self) {}
}

impl VadModelSource for EnergyVad {
    fn instantiate(&self) -> Box<dyn VadModel> {
        Box::new(EnergyVad { knee: self.knee })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a scripted probability sequence, one value per window.
    struct ScriptedModel {
        probs: std::collections::VecDeque<f32>,
        resets: u32,
    }

    impl ScriptedModel {
        fn new(probs: &[f32]) -> Self {
            Self {
                probs: probs.iter().copied().collect(),
                resets: 0,
            }
        }
    }

    impl VadModel for ScriptedModel {
        fn predict(&mut self, _frame: &[f32]) -> f32 {
            self.probs.pop_front().unwrap_or(0.0)
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn config(silence_frames: u32) -> AudioConfig {
        AudioConfig {
            silence_frames_for_turn_end: silence_frames,
            ..AudioConfig::default()
        }
    }

    fn frames(n: usize) -> Vec<u8> {
        vec![0u8; CHUNK_BYTES * n]
    }

    fn streamer(probs: &[f32], silence_frames: u32) -> VadStreamer {
        VadStreamer::new(Box::new(ScriptedModel::new(probs)), &config(silence_frames))
    }

    #[test]
    fn onset_fires_once_after_barge_in_frames() {
        // One speech frame is not enough; the second fires onset.
        let mut vad = streamer(&[0.9, 0.9, 0.9, 0.9], 40);
        let events = vad.process_chunk(&frames(1));
        assert!(events.is_empty());
        let events = vad.process_chunk(&frames(3));
        assert_eq!(events, vec![VadEvent::SpeechOnset]);
        assert!(vad.is_speaking());
    }

    #[test]
    fn turn_end_fires_exactly_once_per_run() {
        // 2 speech frames, 3 silence frames with threshold 3, then more silence.
        let mut probs = vec![0.9, 0.9];
        probs.extend(std::iter::repeat(0.1).take(6));
        let mut vad = streamer(&probs, 3);
        let events = vad.process_chunk(&frames(8));
        let turn_ends = events.iter().filter(|e| **e == VadEvent::TurnEnd).count();
        assert_eq!(turn_ends, 1);
        assert!(!vad.is_speaking());
    }

    #[test]
    fn silence_without_speech_never_fires_turn_end() {
        let mut vad = streamer(&[0.1; 50], 3);
        assert!(vad.process_chunk(&frames(50)).is_empty());
    }

    #[test]
    fn configurable_silence_frames() {
        // With threshold 5, four silence frames keep the turn open.
        let mut probs = vec![0.9, 0.9];
        probs.extend(std::iter::repeat(0.1).take(4));
        let mut vad = streamer(&probs, 5);
        let events = vad.process_chunk(&frames(6));
        assert_eq!(events, vec![VadEvent::SpeechOnset]);
        assert!(vad.is_speaking());
    }

    #[test]
    fn interleaved_speech_resets_silence_count() {
        // speech, silence x2, speech again, silence x3 (threshold 3)
        let probs = vec![0.9, 0.9, 0.1, 0.1, 0.9, 0.1, 0.1, 0.1];
        let mut vad = streamer(&probs, 3);
        let events = vad.process_chunk(&frames(8));
        assert_eq!(events, vec![VadEvent::SpeechOnset, VadEvent::TurnEnd]);
    }

    #[test]
    fn second_turn_fires_fresh_onset() {
        let mut probs = vec![0.9, 0.9];
        probs.extend(std::iter::repeat(0.1).take(3));
        probs.extend([0.9, 0.9]);
        let mut vad = streamer(&probs, 3);
        let events = vad.process_chunk(&frames(7));
        assert_eq!(
            events,
            vec![VadEvent::SpeechOnset, VadEvent::TurnEnd, VadEvent::SpeechOnset]
        );
    }

    #[test]
    fn partial_frames_are_buffered() {
        let mut vad = streamer(&[0.9, 0.9], 40);
        // Half a window: no inference yet.
        assert!(vad.process_chunk(&vec![0u8; CHUNK_BYTES / 2]).is_empty());
        // Remaining half plus one more full window completes two windows.
        let events = vad.process_chunk(&vec![0u8; CHUNK_BYTES / 2 + CHUNK_BYTES]);
        assert_eq!(events, vec![VadEvent::SpeechOnset]);
    }

    #[test]
    fn reset_clears_state_and_model() {
        let mut vad = VadStreamer::new(
            Box::new(ScriptedModel::new(&[0.9, 0.9])),
            &config(40),
        );
        vad.process_chunk(&frames(2));
        assert!(vad.is_speaking());
        vad.reset();
        assert!(!vad.is_speaking());
        assert!(vad.buffer.is_empty());
    }

    #[test]
    fn pcm_conversion_range() {
        let bytes = [0x00, 0x80, 0xFF, 0x7F]; // i16::MIN, i16::MAX
        let samples = pcm_to_f32(&bytes);
        assert!((samples[0] + 1.0).abs() < 1e-4);
        assert!((samples[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn energy_vad_scores_loud_frames_higher() {
        let mut model = EnergyVad::default();
        let quiet = vec![0.001f32; CHUNK_SAMPLES];
        let loud = vec![0.5f32; CHUNK_SAMPLES];
        assert!(model.predict(&quiet) < 0.5);
        assert!(model.predict(&loud) > 0.9);
    }
}
