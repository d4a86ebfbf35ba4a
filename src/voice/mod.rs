//! Voice processing module
//!
//! Handles microphone capture, WAV encoding of finished utterances, playback of
//! synthesized speech and the fallback speech synthesizer.

mod capture;
mod encoder;
mod playback;
mod speech;
mod stream_thread;

pub use capture::{
    AudioChunk, CAPTURE_BLOCK_SIZE, CaptureBuffer, CapturePipeline, CpalInput, InputDevice,
    InputStream,
};
pub use encoder::{BITS_PER_SAMPLE, Utterance, WAV_HEADER_LEN, sample_to_pcm16, samples_to_wav};
pub use playback::{
    CpalOutput, Mixer, OutputDevice, OutputStream, PLAYBACK_SAMPLE_RATE, PlaybackEngine,
    SpeechArbiter, decode_base64_audio, decode_pcm16,
};
pub use speech::{CommandSpeech, SilentSpeech, SpeechSynthesizer};
