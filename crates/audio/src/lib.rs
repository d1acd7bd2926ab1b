//! Audio pipeline: voice-activity detection, speech-to-text, text-to-speech.

pub mod stt;
pub mod tts;
pub mod vad;

pub use stt::{DeepgramStt, SpeechToText};
pub use tts::{CartesiaTts, TextToSpeech};
pub use vad::{EnergyVad, VadEvent, VadModel, VadModelSource, VadStreamer};
