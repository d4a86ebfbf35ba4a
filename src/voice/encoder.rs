//! Utterance assembly and WAV encoding

use std::io::Cursor;
use std::time::Duration;

use super::capture::AudioChunk;
use crate::{Error, Result};

/// Bytes in a canonical PCM WAV header
pub const WAV_HEADER_LEN: usize = 44;

/// Bits per encoded sample
pub const BITS_PER_SAMPLE: u16 = 16;

/// One captured voice turn, merged into a contiguous mono sample array
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Utterance {
    /// Merge captured chunks in order; `None` when nothing was captured
    #[must_use]
    pub fn from_chunks(chunks: &[AudioChunk], sample_rate: u32) -> Option<Self> {
        if chunks.is_empty() {
            return None;
        }

        let total = chunks.iter().map(AudioChunk::len).sum();
        let mut samples = Vec::with_capacity(total);
        for chunk in chunks {
            samples.extend_from_slice(chunk.samples());
        }

        Some(Self {
            samples,
            sample_rate,
        })
    }

    /// Merged samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Capture sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of the recording
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Encode as 16-bit mono linear PCM in a RIFF/WAVE container
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        samples_to_wav(&self.samples, self.sample_rate)
    }
}

/// Convert one float sample to signed 16-bit PCM
///
/// Clamps to `[-1, 1]`; negative values scale by 32768, positive by 32767.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn sample_to_pcm16(sample: f32) -> i16 {
    let s = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Convert f32 samples to WAV bytes for the voice backend
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample_to_pcm16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    let wav = cursor.into_inner();
    tracing::debug!(
        samples = samples.len(),
        sample_rate,
        bytes = wav.len(),
        "encoded utterance"
    );
    Ok(wav)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
    }

    #[test]
    fn pcm16_scaling_is_asymmetric_and_clamped() {
        assert_eq!(sample_to_pcm16(0.0), 0);
        assert_eq!(sample_to_pcm16(1.0), 32767);
        assert_eq!(sample_to_pcm16(-1.0), -32768);
        assert_eq!(sample_to_pcm16(2.5), 32767);
        assert_eq!(sample_to_pcm16(-7.0), -32768);
        assert_eq!(sample_to_pcm16(0.5), 16383);
        assert_eq!(sample_to_pcm16(-0.5), -16384);
        assert_eq!(sample_to_pcm16(f32::NAN), 0);
    }

    #[test]
    fn chunks_merge_in_capture_order() {
        let chunks = vec![AudioChunk::new(&[0.1, 0.2]), AudioChunk::new(&[0.3])];
        let utterance = Utterance::from_chunks(&chunks, 16_000).unwrap();
        assert_eq!(utterance.samples(), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn no_chunks_no_utterance() {
        assert!(Utterance::from_chunks(&[], 16_000).is_none());
    }

    #[test]
    fn header_matches_canonical_layout() {
        let samples = [0.0_f32, 0.25, -0.25, 1.0, -1.0];
        let wav = samples_to_wav(&samples, 22_050).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32_at(&wav, 16), 16);
        assert_eq!(u16_at(&wav, 20), 1);
        assert_eq!(u16_at(&wav, 22), 1);
        assert_eq!(u32_at(&wav, 24), 22_050);
        assert_eq!(u32_at(&wav, 28), 22_050 * 2);
        assert_eq!(u16_at(&wav, 32), 2);
        assert_eq!(u16_at(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");

        let data_len = u32_at(&wav, 40);
        assert_eq!(data_len as usize, samples.len() * 2);
        assert_eq!(u32_at(&wav, 4), 36 + data_len);
        assert_eq!(wav.len(), WAV_HEADER_LEN + data_len as usize);

        assert_eq!(i16::from_le_bytes([wav[44 + 6], wav[44 + 7]]), 32767);
        assert_eq!(i16::from_le_bytes([wav[44 + 8], wav[44 + 9]]), -32768);
    }

    #[test]
    fn duration_follows_sample_rate() {
        let chunks = vec![AudioChunk::new(&[0.0; 8000])];
        let utterance = Utterance::from_chunks(&chunks, 16_000).unwrap();
        assert_eq!(utterance.duration(), Duration::from_millis(500));
    }
}
