//! Audio capture from microphone

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};

use super::stream_thread::StreamThread;
use crate::{Error, Result};

/// Samples per block requested from the capture device
pub const CAPTURE_BLOCK_SIZE: u32 = 4096;

/// An immutable block of captured mono samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    samples: Arc<[f32]>,
}

impl AudioChunk {
    /// Copy a block of samples into a new chunk
    #[must_use]
    pub fn new(samples: &[f32]) -> Self {
        Self {
            samples: Arc::from(samples),
        }
    }

    /// Samples held by this chunk
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of samples in this chunk
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the chunk holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// In-flight buffer shared between the audio callback and the session
///
/// The audio callback calls [`CaptureBuffer::push_block`]; the session drains it with
/// [`CaptureBuffer::take_chunks`] exactly once per utterance.
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    chunks: Mutex<Vec<AudioChunk>>,
    muted: AtomicBool,
}

impl CaptureBuffer {
    /// Create an empty, unmuted buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a copy of one captured block unless the microphone is muted
    ///
    /// Never blocks: if the buffer is momentarily held by the session the block is dropped.
    /// Returns whether the block was appended.
    pub fn push_block(&self, block: &[f32]) -> bool {
        if block.is_empty() || self.muted.load(Ordering::Acquire) {
            return false;
        }

        let mut chunks = match self.chunks.try_lock() {
            Ok(chunks) => chunks,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                tracing::trace!(samples = block.len(), "capture buffer busy, dropping block");
                return false;
            }
        };
        chunks.push(AudioChunk::new(block));
        true
    }

    /// Gate buffering of new blocks
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Release);
    }

    /// Whether new blocks are currently discarded
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// Take every buffered chunk in capture order, leaving the buffer empty
    #[must_use]
    pub fn take_chunks(&self) -> Vec<AudioChunk> {
        std::mem::take(&mut *self.lock_chunks())
    }

    /// Discard every buffered chunk
    pub fn clear(&self) {
        self.lock_chunks().clear();
    }

    /// Number of buffered chunks
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.lock_chunks().len()
    }

    fn lock_chunks(&self) -> MutexGuard<'_, Vec<AudioChunk>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A source of microphone audio
pub trait InputDevice: Send + Sync {
    /// Acquire the microphone and start delivering blocks into `sink`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Permission`] if the microphone is denied or unsupported
    fn open(&self, preferred_rate: u32, sink: Arc<CaptureBuffer>) -> Result<Box<dyn InputStream>>;
}

/// A live microphone stream; dropping it via [`InputStream::close`] releases the device
pub trait InputStream: Send {
    /// Actual capture sample rate
    fn sample_rate(&self) -> u32;

    /// Enable or disable the underlying track without releasing it
    fn set_enabled(&mut self, enabled: bool);

    /// Release the microphone
    fn close(self: Box<Self>);
}

/// Captures audio from the default input device through cpal
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalInput;

impl InputDevice for CpalInput {
    fn open(&self, preferred_rate: u32, sink: Arc<CaptureBuffer>) -> Result<Box<dyn InputStream>> {
        let (thread, sample_rate) = StreamThread::spawn("audio-capture", move || {
            start_capture(preferred_rate, sink)
        })?;

        tracing::debug!("audio capture started");
        Ok(Box::new(CpalInputStream {
            thread,
            sample_rate,
        }))
    }
}

/// Build and start the capture stream; runs on the stream's own thread
fn start_capture(preferred_rate: u32, sink: Arc<CaptureBuffer>) -> Result<(Stream, u32)> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Permission("no input device available".to_string()))?;

    let config = select_input_config(&device, preferred_rate)?;
    let sample_rate = config.sample_rate.0;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels = config.channels,
        "audio capture initialized"
    );

    let fixed = StreamConfig {
        buffer_size: BufferSize::Fixed(CAPTURE_BLOCK_SIZE),
        ..config.clone()
    };

    let stream = match build_capture_stream(&device, &fixed, Arc::clone(&sink)) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(error = %e, "fixed block size rejected, using device default");
            build_capture_stream(&device, &config, sink)?
        }
    };

    stream
        .play()
        .map_err(|e| Error::Permission(e.to_string()))?;
    Ok((stream, sample_rate))
}

/// Pick a mono config at the preferred rate, falling back to the device default
fn select_input_config(device: &cpal::Device, preferred_rate: u32) -> Result<StreamConfig> {
    let preferred = device
        .supported_input_configs()
        .map_err(|e| Error::Permission(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(preferred_rate)
                && c.max_sample_rate() >= SampleRate(preferred_rate)
        });

    if let Some(supported) = preferred {
        return Ok(supported.with_sample_rate(SampleRate(preferred_rate)).config());
    }

    device
        .default_input_config()
        .map(|supported| supported.config())
        .map_err(|e| Error::Permission(format!("no suitable audio config found: {e}")))
}

fn build_capture_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sink: Arc<CaptureBuffer>,
) -> Result<Stream> {
    let channels = config.channels;
    // Scratch space sized once so the callback does not allocate in steady state
    let mut mono: Vec<f32> = Vec::with_capacity(CAPTURE_BLOCK_SIZE as usize);

    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if channels <= 1 {
                    sink.push_block(data);
                } else {
                    downmix_into(&mut mono, data, channels);
                    sink.push_block(&mono);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Permission(e.to_string()))
}

/// Average interleaved frames into `mono`, reusing its allocation
fn downmix_into(mono: &mut Vec<f32>, data: &[f32], channels: u16) {
    let scale = f32::from(channels.max(1));
    mono.clear();
    mono.extend(
        data.chunks(usize::from(channels.max(1)))
            .map(|frame| frame.iter().sum::<f32>() / scale),
    );
}

struct CpalInputStream {
    thread: StreamThread,
    sample_rate: u32,
}

impl InputStream for CpalInputStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.thread.set_playing(enabled);
    }

    fn close(self: Box<Self>) {
        drop(self.thread);
        tracing::debug!("audio capture stopped");
    }
}

/// Owns the microphone stream and the per-utterance chunk buffer
pub struct CapturePipeline {
    device: Box<dyn InputDevice>,
    preferred_rate: u32,
    buffer: Arc<CaptureBuffer>,
    stream: Mutex<Option<Box<dyn InputStream>>>,
    sample_rate: AtomicU32,
}

impl CapturePipeline {
    /// Create a pipeline over an input device
    #[must_use]
    pub fn new(device: Box<dyn InputDevice>, preferred_rate: u32) -> Self {
        Self {
            device,
            preferred_rate,
            buffer: Arc::new(CaptureBuffer::new()),
            stream: Mutex::new(None),
            sample_rate: AtomicU32::new(preferred_rate),
        }
    }

    /// Acquire the microphone; a second call while open is a no-op
    ///
    /// # Errors
    ///
    /// Returns [`Error::Permission`] if the microphone cannot be acquired
    pub fn open(&self) -> Result<u32> {
        let mut slot = self.lock_stream();
        if let Some(stream) = slot.as_ref() {
            return Ok(stream.sample_rate());
        }

        self.buffer.clear();
        let mut stream = self
            .device
            .open(self.preferred_rate, Arc::clone(&self.buffer))?;
        if self.buffer.is_muted() {
            stream.set_enabled(false);
        }

        let rate = stream.sample_rate();
        self.sample_rate.store(rate, Ordering::Release);
        *slot = Some(stream);
        Ok(rate)
    }

    /// Release the microphone; returns whether a stream was released
    pub fn close(&self) -> bool {
        let stream = self.lock_stream().take();
        match stream {
            Some(stream) => {
                stream.close();
                true
            }
            None => false,
        }
    }

    /// Gate buffering and toggle the hardware track to match
    pub fn set_muted(&self, muted: bool) {
        self.buffer.set_muted(muted);
        if let Some(stream) = self.lock_stream().as_mut() {
            stream.set_enabled(!muted);
        }
    }

    /// Whether capture is currently muted
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.buffer.is_muted()
    }

    /// Whether the microphone is currently held
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock_stream().is_some()
    }

    /// Sample rate of the most recently opened stream
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    /// Drain the chunks captured so far
    #[must_use]
    pub fn take_chunks(&self) -> Vec<AudioChunk> {
        self.buffer.take_chunks()
    }

    /// Discard captured chunks without encoding them
    pub fn discard(&self) {
        self.buffer.clear();
    }

    fn lock_stream(&self) -> MutexGuard<'_, Option<Box<dyn InputStream>>> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("preferred_rate", &self.preferred_rate)
            .field("open", &self.is_open())
            .field("muted", &self.is_muted())
            .finish_non_exhaustive()
    }
}
