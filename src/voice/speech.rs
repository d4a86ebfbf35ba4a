//! Fallback speech through a platform synthesizer program
//!
//! Used when the backend returns a reply without synthesized audio. Each new utterance
//! replaces the previous one.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, PoisonError};

/// Speaks text without blocking the caller
pub trait SpeechSynthesizer: Send + Sync {
    /// Start speaking `text` at `volume` (0.0 to 1.0), cancelling any prior utterance
    fn speak(&self, text: &str, volume: f32);

    /// Stop any ongoing utterance
    fn cancel(&self);

    /// Whether an utterance is still being spoken
    fn is_speaking(&self) -> bool {
        false
    }
}

/// Synthesizer that never makes a sound
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSpeech;

impl SpeechSynthesizer for SilentSpeech {
    fn speak(&self, text: &str, _volume: f32) {
        tracing::debug!(chars = text.len(), "speech synthesizer unavailable, skipping");
    }

    fn cancel(&self) {}
}

/// Supported synthesizer programs, in detection order
const KNOWN_PROGRAMS: [&str; 3] = ["espeak-ng", "espeak", "say"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Espeak,
    Say,
    Plain,
}

/// Speaks through `espeak-ng`, `espeak`, `say`, or a configured program
#[derive(Debug)]
pub struct CommandSpeech {
    program: PathBuf,
    flavor: Flavor,
    language: String,
    child: Mutex<Option<Child>>,
}

impl CommandSpeech {
    /// Locate a synthesizer program on `PATH`
    ///
    /// Uses `program` if given, otherwise the first known program found.
    #[must_use]
    pub fn detect(program: Option<&str>, language: &str) -> Option<Self> {
        let (name, path) = match program {
            Some(name) => (name, which::which(name).ok()?),
            None => KNOWN_PROGRAMS
                .iter()
                .find_map(|name| which::which(name).ok().map(|path| (*name, path)))?,
        };

        let stem = std::path::Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name);
        let flavor = match stem {
            "espeak-ng" | "espeak" => Flavor::Espeak,
            "say" => Flavor::Say,
            _ => Flavor::Plain,
        };

        tracing::debug!(program = %path.display(), "speech synthesizer found");
        Some(Self {
            program: path,
            flavor,
            language: language.to_string(),
            child: Mutex::new(None),
        })
    }

    /// Detect a synthesizer, falling back to silence when none is installed
    #[must_use]
    pub fn detect_or_silent(program: Option<&str>, language: &str) -> Box<dyn SpeechSynthesizer> {
        match Self::detect(program, language) {
            Some(speech) => Box::new(speech),
            None => {
                tracing::warn!("no speech synthesizer found, fallback speech disabled");
                Box::new(SilentSpeech)
            }
        }
    }

    fn args(&self, text: &str, volume: f32) -> Vec<String> {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        match self.flavor {
            Flavor::Espeak => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let amplitude = (volume * 100.0).round() as u32;
                vec![
                    "-v".to_string(),
                    self.language.to_lowercase(),
                    "-a".to_string(),
                    amplitude.to_string(),
                    "--".to_string(),
                    text.to_string(),
                ]
            }
            Flavor::Say => vec![format!("[[volm {volume:.2}]] {text}")],
            Flavor::Plain => vec![text.to_string()],
        }
    }
}

impl SpeechSynthesizer for CommandSpeech {
    fn speak(&self, text: &str, volume: f32) {
        self.cancel();

        let spawned = Command::new(&self.program)
            .args(self.args(text, volume))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(child) => {
                *self.child.lock().unwrap_or_else(PoisonError::into_inner) = Some(child);
            }
            Err(e) => {
                tracing::warn!(program = %self.program.display(), error = %e, "failed to start speech");
            }
        }
    }

    fn cancel(&self) {
        let previous = self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut child) = previous {
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.kill();
                tracing::debug!("speech cancelled");
            }
            let _ = child.wait();
        }
    }

    fn is_speaking(&self) -> bool {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }
}

impl Drop for CommandSpeech {
    fn drop(&mut self) {
        self.cancel();
    }
}
