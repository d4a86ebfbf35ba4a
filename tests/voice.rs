//! Voice pipeline integration tests
//!
//! Tests capture, encoding and playback without requiring audio hardware

use std::io::Cursor;
use std::sync::Arc;

use estimate_voice::voice::{
    AudioChunk, BITS_PER_SAMPLE, CapturePipeline, PLAYBACK_SAMPLE_RATE, PlaybackEngine,
    Utterance, WAV_HEADER_LEN, decode_base64_audio,
};

mod common;

use common::{FakeInput, FakeOutput, FakeSpeech, InputProbe, OutputProbe, SpeechProbe, pcm_bytes};

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

fn engine() -> (PlaybackEngine, Arc<OutputProbe>, Arc<SpeechProbe>) {
    let output = Arc::new(OutputProbe::default());
    let speech = Arc::new(SpeechProbe::default());
    let engine = PlaybackEngine::new(
        Box::new(FakeOutput(Arc::clone(&output))),
        Box::new(FakeSpeech(Arc::clone(&speech))),
        1.0,
    );
    (engine, output, speech)
}

#[test]
fn test_one_second_of_silence_encodes_to_canonical_wav() {
    let chunks: Vec<AudioChunk> = (0..4).map(|_| AudioChunk::new(&[0.0; 4000])).collect();
    let utterance = Utterance::from_chunks(&chunks, 16_000).unwrap();
    assert_eq!(utterance.duration().as_millis(), 1000);

    let wav = utterance.to_wav().unwrap();
    assert_eq!(wav.len(), WAV_HEADER_LEN + 16_000 * 2);
    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");

    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(spec.bits_per_sample, BITS_PER_SAMPLE);
    assert_eq!(reader.len(), 16_000);
}

#[test]
fn test_header_lengths_match_payload() {
    for len in [1_usize, 7, 4096, 10_001] {
        let utterance = Utterance::from_chunks(&[AudioChunk::new(&vec![0.25; len])], 22_050).unwrap();
        let wav = utterance.to_wav().unwrap();

        let field = |at: usize| u32::from_le_bytes([wav[at], wav[at + 1], wav[at + 2], wav[at + 3]]);
        let data_len = field(40);
        assert_eq!(data_len as usize, len * 2);
        assert_eq!(field(4), 36 + data_len);
        assert_eq!(field(24), 22_050);
        assert_eq!(field(28), 22_050 * 2);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(wav.len(), WAV_HEADER_LEN + len * 2);
    }
}

#[test]
fn test_chunks_merge_in_capture_order() {
    let chunks = [
        AudioChunk::new(&[0.5, 0.5]),
        AudioChunk::new(&[-0.5]),
        AudioChunk::new(&[1.0, -1.0]),
    ];
    let utterance = Utterance::from_chunks(&chunks, 48_000).unwrap();
    assert_eq!(utterance.samples(), &[0.5, 0.5, -0.5, 1.0, -1.0]);

    let wav = utterance.to_wav().unwrap();
    let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    assert_eq!(reader.spec().sample_rate, 48_000);
    let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(samples, [16383, 16383, -16384, 32767, -32768]);
}

#[test]
fn test_sine_wave_survives_encoding() {
    let samples = generate_sine_samples(440.0, 0.25, 16_000, 0.5);
    let utterance = Utterance::from_chunks(&[AudioChunk::new(&samples)], 16_000).unwrap();

    let mut reader = hound::WavReader::new(Cursor::new(utterance.to_wav().unwrap())).unwrap();
    let decoded: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();

    assert_eq!(decoded.len(), samples.len());
    let peak = decoded.iter().map(|s| s.unsigned_abs()).max().unwrap();
    assert!((16_000..=16_400).contains(&peak));
}

#[test]
fn test_empty_capture_has_no_utterance() {
    assert!(Utterance::from_chunks(&[], 16_000).is_none());
}

#[test]
fn test_pipeline_reopen_starts_a_fresh_utterance() {
    let probe = Arc::new(common::talking_input(2, 100));
    let pipeline = CapturePipeline::new(Box::new(FakeInput(Arc::clone(&probe))), 16_000);

    assert_eq!(pipeline.open().unwrap(), common::TEST_SAMPLE_RATE);
    assert_eq!(pipeline.open().unwrap(), common::TEST_SAMPLE_RATE);
    assert_eq!(probe.opens(), 1);
    assert!(probe.feed(&[0.3; 100]));
    assert!(pipeline.close());
    assert!(!pipeline.close());
    assert!(!probe.feed(&[0.3; 100]));
    assert_eq!(pipeline.take_chunks().len(), 3);

    pipeline.open().unwrap();
    pipeline.discard();
    assert!(pipeline.take_chunks().is_empty());
    assert!(pipeline.close());
    assert_eq!(probe.closes(), 2);
}

#[test]
fn test_denied_microphone_is_a_permission_error() {
    let probe = InputProbe::default();
    probe.deny.store(true, std::sync::atomic::Ordering::SeqCst);
    let pipeline = CapturePipeline::new(Box::new(FakeInput(Arc::new(probe))), 16_000);

    let err = pipeline.open().unwrap_err();
    assert!(matches!(err, estimate_voice::Error::Permission(_)));
    assert!(!pipeline.is_open());
}

#[test]
fn test_speech_plays_through_gain_and_finishes() {
    let (engine, output, _) = engine();
    engine.set_volume(0.5);

    engine.play_pcm(&pcm_bytes(480)).unwrap();
    assert_eq!(output.opens(), 1);
    assert!(engine.is_voicing());

    let mut out = vec![0.0_f32; 480 * 2];
    engine.mixer().render(&mut out, 2);
    // 8192 / 32768 = 0.25, halved by the gain stage, copied to both channels
    assert!(out.iter().all(|s| (s - 0.125).abs() < 1e-6));
    assert!(!engine.is_voicing());
    assert_eq!(engine.active_sources(), 0);

    engine.mixer().render(&mut out, 2);
    assert!(out.iter().all(|s| s.abs() < f32::EPSILON));
}

#[test]
fn test_mute_silences_without_losing_volume() {
    let (engine, _, speech) = engine();
    engine.set_volume(0.6);
    engine.set_output_muted(true);

    engine.play_pcm(&pcm_bytes(16)).unwrap();
    let mut out = [1.0_f32; 16];
    engine.mixer().render(&mut out, 1);
    assert!(out.iter().all(|s| s.abs() < f32::EPSILON));

    assert!(!engine.speak_fallback("hello"));
    assert!(speech.spoken().is_empty());

    engine.set_output_muted(false);
    assert!((engine.gain() - 0.6).abs() < f32::EPSILON);
}

#[test]
fn test_fallback_speech_yields_to_synthesized_speech() {
    let (engine, _, speech) = engine();

    engine.play_pcm(&pcm_bytes(PLAYBACK_SAMPLE_RATE as usize / 10)).unwrap();
    assert!(!engine.speak_fallback("second voice"));

    assert!(engine.close());
    assert!(!engine.is_voicing());
    assert!(engine.speak_fallback("now it may speak"));
    assert_eq!(speech.spoken(), ["now it may speak"]);
}

#[test]
fn test_malformed_speech_is_rejected() {
    let (engine, output, _) = engine();

    assert!(engine.play_pcm(&[]).is_err());
    assert!(engine.play_pcm(&[1, 2, 3]).is_err());
    assert_eq!(output.opens(), 0);
    assert!(decode_base64_audio("%%%").is_err());
}
