//! Audio playback to speakers
//!
//! One persistent output stream renders every scheduled speech source through a single
//! gain stage. Sources remove themselves once fully rendered.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use base64::Engine as _;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::speech::SpeechSynthesizer;
use super::stream_thread::StreamThread;
use crate::{Error, Result};

/// Sample rate of backend-synthesized speech (24kHz mono 16-bit PCM)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Tracks whether an assistant utterance is currently being voiced
///
/// Backend speech marks the arbiter busy for as long as any source is playing; the
/// fallback speech path consults it before starting so the two never overlap.
#[derive(Debug, Default)]
pub struct SpeechArbiter {
    voicing: AtomicBool,
}

impl SpeechArbiter {
    /// Create an idle arbiter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an assistant utterance as being voiced
    pub fn begin(&self) {
        self.voicing.store(true, Ordering::Release);
    }

    /// Mark voicing as finished
    pub fn release(&self) {
        self.voicing.store(false, Ordering::Release);
    }

    /// Whether an assistant utterance is being voiced right now
    #[must_use]
    pub fn is_voicing(&self) -> bool {
        self.voicing.load(Ordering::Acquire)
    }
}

struct ScheduledSource {
    samples: Arc<[f32]>,
    position: usize,
}

/// Mixes scheduled sources through a gain stage for the output callback
pub struct Mixer {
    sources: Mutex<Vec<ScheduledSource>>,
    gain: AtomicU32,
    arbiter: Arc<SpeechArbiter>,
}

impl Mixer {
    /// Create a mixer with the given initial gain
    #[must_use]
    pub fn new(gain: f32, arbiter: Arc<SpeechArbiter>) -> Self {
        Self {
            sources: Mutex::new(Vec::new()),
            gain: AtomicU32::new(gain.to_bits()),
            arbiter,
        }
    }

    /// Set the gain applied to all sources
    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Release);
    }

    /// Current gain
    #[must_use]
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Acquire))
    }

    /// Schedule a buffer to start playing immediately
    pub fn schedule(&self, samples: Vec<f32>) {
        if samples.is_empty() {
            return;
        }
        self.lock_sources().push(ScheduledSource {
            samples: Arc::from(samples),
            position: 0,
        });
        self.arbiter.begin();
    }

    /// Stop and forget every scheduled source; returns how many were stopped
    pub fn stop_all(&self) -> usize {
        let stopped = {
            let mut sources = self.lock_sources();
            let count = sources.len();
            sources.clear();
            count
        };
        self.arbiter.release();
        stopped
    }

    /// Number of sources still playing
    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.lock_sources().len()
    }

    /// Render interleaved output frames; called from the audio callback
    ///
    /// Never blocks: renders silence if the source list is momentarily held elsewhere.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        let channels = channels.max(1);

        let mut sources = match self.sources.try_lock() {
            Ok(sources) => sources,
            Err(TryLockError::WouldBlock) => return,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        if sources.is_empty() {
            return;
        }

        let gain = self.gain();
        for frame in out.chunks_mut(channels) {
            let mut mixed = 0.0;
            for source in sources.iter_mut() {
                if let Some(sample) = source.samples.get(source.position) {
                    mixed += sample;
                    source.position += 1;
                }
            }
            frame.fill((mixed * gain).clamp(-1.0, 1.0));
        }

        sources.retain(|source| source.position < source.samples.len());
        if sources.is_empty() {
            self.arbiter.release();
            tracing::debug!("playback complete");
        }
    }

    fn lock_sources(&self) -> MutexGuard<'_, Vec<ScheduledSource>> {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("gain", &self.gain())
            .field("active_sources", &self.active_sources())
            .finish_non_exhaustive()
    }
}

/// A sink for rendered assistant audio
pub trait OutputDevice: Send + Sync {
    /// Open an output stream that pulls frames from `mixer`
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be opened
    fn open(&self, sample_rate: u32, mixer: Arc<Mixer>) -> Result<Box<dyn OutputStream>>;
}

/// A live output stream
pub trait OutputStream: Send {
    /// Close the stream and release the device
    fn close(self: Box<Self>);
}

/// Plays audio to the default output device through cpal
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutput;

impl OutputDevice for CpalOutput {
    fn open(&self, sample_rate: u32, mixer: Arc<Mixer>) -> Result<Box<dyn OutputStream>> {
        let (thread, ()) = StreamThread::spawn("audio-playback", move || {
            start_playback(sample_rate, mixer).map(|stream| (stream, ()))
        })?;
        Ok(Box::new(CpalOutputStream { thread }))
    }
}

/// Build and start the output stream; runs on the stream's own thread
fn start_playback(sample_rate: u32, mixer: Arc<Mixer>) -> Result<Stream> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();
    let channels = usize::from(config.channels);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "audio playback initialized"
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                mixer.render(data, channels);
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(stream)
}

struct CpalOutputStream {
    thread: StreamThread,
}

impl OutputStream for CpalOutputStream {
    fn close(self: Box<Self>) {
        drop(self.thread);
        tracing::debug!("audio playback stopped");
    }
}

/// Output side of the session: gain-controlled speech playback plus fallback speech
pub struct PlaybackEngine {
    device: Box<dyn OutputDevice>,
    speech: Box<dyn SpeechSynthesizer>,
    mixer: Arc<Mixer>,
    arbiter: Arc<SpeechArbiter>,
    stream: Mutex<Option<Box<dyn OutputStream>>>,
    volume: AtomicU32,
    output_muted: AtomicBool,
}

impl PlaybackEngine {
    /// Create an engine; no device is opened until playback is needed
    #[must_use]
    pub fn new(
        device: Box<dyn OutputDevice>,
        speech: Box<dyn SpeechSynthesizer>,
        volume: f32,
    ) -> Self {
        let volume = clamp_volume(volume);
        let arbiter = Arc::new(SpeechArbiter::new());
        Self {
            device,
            speech,
            mixer: Arc::new(Mixer::new(volume, Arc::clone(&arbiter))),
            arbiter,
            stream: Mutex::new(None),
            volume: AtomicU32::new(volume.to_bits()),
            output_muted: AtomicBool::new(false),
        }
    }

    /// Open the output graph if it isn't open yet
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be opened
    pub fn open(&self) -> Result<()> {
        let mut slot = self.lock_stream();
        if slot.is_none() {
            self.apply_gain();
            *slot = Some(
                self.device
                    .open(PLAYBACK_SAMPLE_RATE, Arc::clone(&self.mixer))?,
            );
        }
        Ok(())
    }

    /// Stop every source, silence fallback speech and close the output graph
    ///
    /// Returns whether an output stream was closed.
    pub fn close(&self) -> bool {
        let stopped = self.mixer.stop_all();
        self.speech.cancel();
        let stream = self.lock_stream().take();
        let closed = match stream {
            Some(stream) => {
                stream.close();
                true
            }
            None => false,
        };
        if stopped > 0 || closed {
            tracing::debug!(stopped, closed, "playback torn down");
        }
        closed
    }

    /// Whether the output graph is open
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock_stream().is_some()
    }

    /// Set assistant output volume, clamped to `[0, 1]`; returns the applied value
    pub fn set_volume(&self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        self.volume.store(volume.to_bits(), Ordering::Release);
        self.apply_gain();
        volume
    }

    /// Current output volume
    #[must_use]
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Acquire))
    }

    /// Mute or unmute assistant output
    pub fn set_output_muted(&self, muted: bool) {
        self.output_muted.store(muted, Ordering::Release);
        self.apply_gain();
        if muted {
            self.speech.cancel();
        }
    }

    /// Whether assistant output is muted
    #[must_use]
    pub fn is_output_muted(&self) -> bool {
        self.output_muted.load(Ordering::Acquire)
    }

    /// Gain currently applied by the output graph
    #[must_use]
    pub fn gain(&self) -> f32 {
        self.mixer.gain()
    }

    /// Decode synthesized speech and schedule it through the gain stage
    ///
    /// # Errors
    ///
    /// Returns [`Error::AudioDecode`] for malformed payloads, or an audio error if the
    /// output graph cannot be opened
    pub fn play_pcm(&self, bytes: &[u8]) -> Result<()> {
        let samples = decode_pcm16(bytes)?;
        self.open()?;
        tracing::debug!(samples = samples.len(), "scheduling synthesized speech");
        self.mixer.schedule(samples);
        Ok(())
    }

    /// Speak text through the platform synthesizer unless output is muted or an
    /// assistant utterance is already being voiced; returns whether speech started
    pub fn speak_fallback(&self, text: &str) -> bool {
        if text.trim().is_empty() || self.is_output_muted() || self.arbiter.is_voicing() {
            return false;
        }
        self.speech.speak(text, self.volume());
        true
    }

    /// Cancel any ongoing fallback speech
    pub fn cancel_speech(&self) {
        self.speech.cancel();
    }

    /// Whether an assistant utterance is being voiced
    #[must_use]
    pub fn is_voicing(&self) -> bool {
        self.arbiter.is_voicing()
    }

    /// Whether any assistant audio (synthesized or fallback) is still playing
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.arbiter.is_voicing() || self.speech.is_speaking()
    }

    /// Number of speech sources still playing
    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.mixer.active_sources()
    }

    /// Mixer feeding the output stream
    #[must_use]
    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    fn apply_gain(&self) {
        let gain = if self.is_output_muted() {
            0.0
        } else {
            self.volume()
        };
        self.mixer.set_gain(gain);
    }

    fn lock_stream(&self) -> MutexGuard<'_, Option<Box<dyn OutputStream>>> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("open", &self.is_open())
            .field("volume", &self.volume())
            .field("output_muted", &self.is_output_muted())
            .field("mixer", &self.mixer)
            .finish_non_exhaustive()
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Decode little-endian 16-bit mono PCM into f32 samples
///
/// # Errors
///
/// Returns [`Error::AudioDecode`] if the payload is empty or has a dangling byte
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.is_empty() {
        return Err(Error::AudioDecode("empty speech payload".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(Error::AudioDecode(format!(
            "speech payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}

/// Decode a base64 speech payload, accepting an optional `data:` URL prefix
///
/// # Errors
///
/// Returns [`Error::AudioDecode`] if the text is not valid base64
pub fn decode_base64_audio(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    let encoded = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Error::AudioDecode(format!("invalid base64 speech payload: {e}")))
}
