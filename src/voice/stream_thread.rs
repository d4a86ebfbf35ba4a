//! Dedicated threads owning cpal streams
//!
//! A cpal stream may not leave the thread that built it, so each live stream is
//! parked on its own thread and driven over a channel. The handle is `Send`.

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::Stream;
use cpal::traits::StreamTrait;

use crate::{Error, Result};

enum Command {
    Play,
    Pause,
}

/// Handle to a stream running on its own thread; dropping it stops the stream
pub struct StreamThread {
    commands: Option<mpsc::Sender<Command>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Build a stream on a new thread and wait until it is running
    ///
    /// `build` returns the started stream plus whatever the caller needs back from it.
    pub fn spawn<T, F>(name: &str, build: F) -> Result<(Self, T)>
    where
        F: FnOnce() -> Result<(Stream, T)> + Send + 'static,
        T: Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (commands, command_rx) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok((stream, info)) => {
                        if ready_tx.send(Ok(info)).is_err() {
                            return;
                        }
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Runs until every sender is gone
                for command in command_rx {
                    let result = match command {
                        Command::Play => stream.play().map_err(|e| e.to_string()),
                        Command::Pause => stream.pause().map_err(|e| e.to_string()),
                    };
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "failed to toggle audio stream");
                    }
                }
                drop(stream);
            })
            .map_err(|e| Error::Audio(format!("failed to spawn audio thread: {e}")))?;

        let mut thread = Self {
            commands: Some(commands),
            handle: Some(handle),
        };
        match ready_rx.recv() {
            Ok(Ok(info)) => Ok((thread, info)),
            Ok(Err(e)) => {
                thread.stop();
                Err(e)
            }
            Err(_) => {
                thread.stop();
                Err(Error::Audio(
                    "audio thread exited before the stream started".to_string(),
                ))
            }
        }
    }

    /// Resume or pause the stream without releasing the device
    pub fn set_playing(&self, playing: bool) {
        let command = if playing { Command::Play } else { Command::Pause };
        let delivered = self
            .commands
            .as_ref()
            .is_some_and(|commands| commands.send(command).is_ok());
        if !delivered {
            tracing::warn!("audio thread is gone, stream not toggled");
        }
    }

    fn stop(&mut self) {
        drop(self.commands.take());
        if self.handle.take().is_some_and(|handle| handle.join().is_err()) {
            tracing::error!("audio thread panicked");
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}
