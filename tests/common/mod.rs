//! Shared test utilities
//!
//! Hardware-free stand-ins for the microphone, speaker, speech synthesizer and backend.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use estimate_voice::backend::{ChatRequest, ChatResponse, VoiceRequest, VoiceResponse};
use estimate_voice::config::SessionConfig;
use estimate_voice::voice::{
    CaptureBuffer, CapturePipeline, InputDevice, InputStream, Mixer, OutputDevice, OutputStream,
    PlaybackEngine, SpeechSynthesizer,
};
use estimate_voice::{Backend, Error, Result, SessionController, ToolRegistry};

/// Capture rate reported by the fake microphone
pub const TEST_SAMPLE_RATE: u32 = 16_000;

/// What the fake microphone did
#[derive(Default)]
pub struct InputProbe {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub enabled: AtomicBool,
    pub deny: AtomicBool,
    /// Blocks delivered as soon as the microphone opens
    pub initial_blocks: Mutex<Vec<Vec<f32>>>,
    sink: Mutex<Option<Arc<CaptureBuffer>>>,
}

impl InputProbe {
    /// Deliver one block through the live callback path
    pub fn feed(&self, block: &[f32]) -> bool {
        self.sink
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|sink| sink.push_block(block))
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct FakeInput(pub Arc<InputProbe>);

impl InputDevice for FakeInput {
    fn open(&self, _preferred_rate: u32, sink: Arc<CaptureBuffer>) -> Result<Box<dyn InputStream>> {
        if self.0.deny.load(Ordering::SeqCst) {
            return Err(Error::Permission("Permission denied".to_string()));
        }
        self.0.opens.fetch_add(1, Ordering::SeqCst);
        self.0.enabled.store(true, Ordering::SeqCst);
        for block in self.0.initial_blocks.lock().unwrap().iter() {
            sink.push_block(block);
        }
        *self.0.sink.lock().unwrap() = Some(sink);
        Ok(Box::new(FakeInputStream(Arc::clone(&self.0))))
    }
}

struct FakeInputStream(Arc<InputProbe>);

impl InputStream for FakeInputStream {
    fn sample_rate(&self) -> u32 {
        TEST_SAMPLE_RATE
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.0.enabled.store(enabled, Ordering::SeqCst);
    }

    fn close(self: Box<Self>) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        *self.0.sink.lock().unwrap() = None;
    }
}

/// What the fake speaker did
#[derive(Default)]
pub struct OutputProbe {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
}

impl OutputProbe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct FakeOutput(pub Arc<OutputProbe>);

impl OutputDevice for FakeOutput {
    fn open(&self, _sample_rate: u32, _mixer: Arc<Mixer>) -> Result<Box<dyn OutputStream>> {
        self.0.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeOutputStream(Arc::clone(&self.0))))
    }
}

struct FakeOutputStream(Arc<OutputProbe>);

impl OutputStream for FakeOutputStream {
    fn close(self: Box<Self>) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records what the fallback synthesizer was asked to say
#[derive(Default)]
pub struct SpeechProbe {
    pub spoken: Mutex<Vec<String>>,
    pub cancels: AtomicUsize,
}

impl SpeechProbe {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

pub struct FakeSpeech(pub Arc<SpeechProbe>);

impl SpeechSynthesizer for FakeSpeech {
    fn speak(&self, text: &str, _volume: f32) {
        self.0.spoken.lock().unwrap().push(text.to_string());
    }

    fn cancel(&self) {
        self.0.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Backend answering from scripted queues; an empty queue yields an empty response
#[derive(Default)]
pub struct FakeBackend {
    pub voice_replies: Mutex<VecDeque<Result<VoiceResponse>>>,
    pub chat_replies: Mutex<VecDeque<Result<ChatResponse>>>,
    pub speech: Mutex<Option<Vec<u8>>>,
    pub delay: Option<Duration>,
    pub voice_uploads: Mutex<Vec<(Vec<u8>, VoiceRequest)>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub speech_fetches: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every voice and chat reply
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn voice_reply(self, reply: Result<VoiceResponse>) -> Self {
        self.voice_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn chat_reply(self, reply: Result<ChatResponse>) -> Self {
        self.chat_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn speech_bytes(self, bytes: Vec<u8>) -> Self {
        *self.speech.lock().unwrap() = Some(bytes);
        self
    }

    pub fn voice_calls(&self) -> usize {
        self.voice_uploads.lock().unwrap().len()
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_requests.lock().unwrap().len()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn send_voice(&self, audio: Vec<u8>, request: &VoiceRequest) -> Result<VoiceResponse> {
        self.voice_uploads
            .lock()
            .unwrap()
            .push((audio, request.clone()));
        self.pause().await;
        let next = self.voice_replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(VoiceResponse::default()))
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.chat_requests.lock().unwrap().push(request.clone());
        self.pause().await;
        let next = self.chat_replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ChatResponse::default()))
    }

    async fn fetch_speech(&self, reference: &str) -> Result<Vec<u8>> {
        self.speech_fetches
            .lock()
            .unwrap()
            .push(reference.to_string());
        self.speech
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Backend("no speech scripted".to_string()))
    }
}

/// A session wired to fakes, plus handles for inspecting them
pub struct Harness {
    pub session: SessionController,
    pub input: Arc<InputProbe>,
    pub output: Arc<OutputProbe>,
    pub speech: Arc<SpeechProbe>,
    pub backend: Arc<FakeBackend>,
}

impl Harness {
    pub fn new(backend: FakeBackend, registry: ToolRegistry) -> Self {
        Self::with_input(InputProbe::default(), backend, registry)
    }

    pub fn with_input(input: InputProbe, backend: FakeBackend, registry: ToolRegistry) -> Self {
        let input = Arc::new(input);
        let output = Arc::new(OutputProbe::default());
        let speech = Arc::new(SpeechProbe::default());
        let backend = Arc::new(backend);

        let capture = CapturePipeline::new(Box::new(FakeInput(Arc::clone(&input))), TEST_SAMPLE_RATE);
        let playback = PlaybackEngine::new(
            Box::new(FakeOutput(Arc::clone(&output))),
            Box::new(FakeSpeech(Arc::clone(&speech))),
            1.0,
        );
        let session = SessionController::new(
            SessionConfig::default(),
            capture,
            playback,
            Arc::clone(&backend) as Arc<dyn Backend>,
            registry,
        );

        Self {
            session,
            input,
            output,
            speech,
            backend,
        }
    }
}

/// A microphone that delivers `blocks` blocks of `len` quiet samples on open
pub fn talking_input(blocks: usize, len: usize) -> InputProbe {
    let probe = InputProbe::default();
    *probe.initial_blocks.lock().unwrap() = vec![vec![0.1; len]; blocks];
    probe
}

/// Little-endian 16-bit PCM for `samples` samples of a constant level
pub fn pcm_bytes(samples: usize) -> Vec<u8> {
    std::iter::repeat_n(8192_i16, samples)
        .flat_map(i16::to_le_bytes)
        .collect()
}
