//! Audio output device and the per-clip signalling between controller and
//! device

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use tokio::sync::{Notify, oneshot};

use super::error::PlaybackError;

/// How a clip stopped playing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipEnd {
    Completed,
    Stopped,
    Failed(String),
}

struct ClipShared {
    stop: AtomicBool,
    ended: AtomicBool,
    wake: Notify,
}

/// Shared stop/ended flags for one clip
#[derive(Clone)]
pub struct ClipControl(Arc<ClipShared>);

impl ClipControl {
    fn new() -> Self {
        Self(Arc::new(ClipShared {
            stop: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            wake: Notify::new(),
        }))
    }

    pub fn request_stop(&self) {
        self.0.stop.store(true, Ordering::SeqCst);
        self.0.wake.notify_one();
    }

    pub fn stop_requested(&self) -> bool {
        self.0.stop.load(Ordering::SeqCst)
    }

    pub fn has_ended(&self) -> bool {
        self.0.ended.load(Ordering::SeqCst)
    }

    /// Neither stopped nor finished
    pub fn is_live(&self) -> bool {
        !self.stop_requested() && !self.has_ended()
    }

    /// Resolves once a stop has been requested
    pub async fn stopped(&self) {
        while !self.stop_requested() {
            self.0.wake.notified().await;
        }
    }
}

/// Handed to the output with each clip; the output reports the end through
/// it exactly once.
pub struct ClipSignal {
    control: ClipControl,
    done: Option<oneshot::Sender<ClipEnd>>,
}

impl ClipSignal {
    pub(crate) fn new() -> (Self, oneshot::Receiver<ClipEnd>) {
        let (tx, rx) = oneshot::channel();
        let signal = Self {
            control: ClipControl::new(),
            done: Some(tx),
        };
        (signal, rx)
    }

    pub fn control(&self) -> &ClipControl {
        &self.control
    }

    pub fn finish(mut self, end: ClipEnd) {
        self.control.0.ended.store(true, Ordering::SeqCst);
        if let Some(done) = self.done.take() {
            let _ = done.send(end);
        }
    }
}

impl Drop for ClipSignal {
    fn drop(&mut self) {
        // A dropped signal reads as a failed clip on the receiving side
        self.control.0.ended.store(true, Ordering::SeqCst);
    }
}

/// Something that can play encoded audio clips
pub trait AudioOutput: Send + Sync {
    /// Begin playback and return without waiting for the clip to end
    fn play(&self, audio: Vec<u8>, volume: f32, signal: ClipSignal) -> Result<(), PlaybackError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Rodio
// ─────────────────────────────────────────────────────────────────────────────

const POLL_INTERVAL: Duration = Duration::from_millis(20);

struct PlayRequest {
    audio: Vec<u8>,
    volume: f32,
    signal: ClipSignal,
}

/// Plays clips through the default output device.
///
/// rodio's `OutputStream` is not `Send`, so the device lives on a dedicated
/// thread that opens it on first use and keeps it for every later clip.
pub struct RodioOutput {
    requests: std_mpsc::Sender<PlayRequest>,
}

impl RodioOutput {
    pub fn spawn() -> Result<Self, PlaybackError> {
        let (tx, rx) = std_mpsc::channel();
        thread::Builder::new()
            .name("chronicle-audio".to_string())
            .spawn(move || output_thread(rx))
            .map_err(|e| PlaybackError::Output(e.to_string()))?;
        Ok(Self { requests: tx })
    }
}

impl AudioOutput for RodioOutput {
    fn play(&self, audio: Vec<u8>, volume: f32, signal: ClipSignal) -> Result<(), PlaybackError> {
        self.requests
            .send(PlayRequest {
                audio,
                volume,
                signal,
            })
            .map_err(|_| PlaybackError::OutputClosed)
    }
}

fn output_thread(requests: std_mpsc::Receiver<PlayRequest>) {
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

    let mut device: Option<(OutputStream, OutputStreamHandle)> = None;

    while let Ok(PlayRequest {
        audio,
        volume,
        signal,
    }) = requests.recv()
    {
        if signal.control().stop_requested() {
            signal.finish(ClipEnd::Stopped);
            continue;
        }

        if device.is_none() {
            match OutputStream::try_default() {
                Ok(opened) => device = Some(opened),
                Err(e) => {
                    tracing::warn!(error = %e, "No audio output device");
                    signal.finish(ClipEnd::Failed(PlaybackError::NoDevice(e.to_string()).to_string()));
                    continue;
                }
            }
        }
        let Some((_, handle)) = device.as_ref() else {
            continue;
        };

        let source = match Decoder::new(Cursor::new(audio)) {
            Ok(source) => source,
            Err(e) => {
                signal.finish(ClipEnd::Failed(PlaybackError::Decode(e.to_string()).to_string()));
                continue;
            }
        };
        let sink = match Sink::try_new(handle) {
            Ok(sink) => sink,
            Err(e) => {
                // Reopen the device for the next clip
                device = None;
                signal.finish(ClipEnd::Failed(PlaybackError::Output(e.to_string()).to_string()));
                continue;
            }
        };

        sink.set_volume(volume);
        sink.append(source);

        loop {
            if signal.control().stop_requested() {
                sink.stop();
                signal.finish(ClipEnd::Stopped);
                break;
            }
            if sink.empty() {
                signal.finish(ClipEnd::Completed);
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    tracing::debug!("Audio output thread exiting");
}
