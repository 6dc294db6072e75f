use std::sync::Arc;

use tokio::sync::oneshot;

use super::error::PlaybackError;
use super::output::{AudioOutput, ClipControl, ClipEnd, ClipSignal};

/// Completion handle for one started clip
pub struct PlaybackTicket {
    id: u64,
    done: oneshot::Receiver<ClipEnd>,
    end: Option<ClipEnd>,
}

impl PlaybackTicket {
    /// Wait for the clip to end. Cancel safe; may be awaited again after it
    /// resolved.
    pub async fn finished(&mut self) -> ClipEnd {
        if let Some(end) = &self.end {
            return end.clone();
        }
        let end = (&mut self.done)
            .await
            .unwrap_or_else(|_| ClipEnd::Failed("audio output dropped the clip".to_string()));
        self.end = Some(end.clone());
        end
    }
}

struct Playing {
    id: u64,
    control: ClipControl,
}

/// Owns the single "currently playing" clip.
///
/// Idle -> start -> Playing -> (clip end | stop) -> Idle. Starting while
/// a clip plays stops that clip first.
pub struct PlaybackController {
    output: Arc<dyn AudioOutput>,
    volume: f32,
    current: Option<Playing>,
    next_id: u64,
}

impl PlaybackController {
    pub fn new(output: Arc<dyn AudioOutput>, volume_percent: u8) -> Self {
        let mut controller = Self {
            output,
            volume: 1.0,
            current: None,
            next_id: 0,
        };
        controller.set_volume(volume_percent);
        controller
    }

    /// Volume for clips started from now on (0-100)
    pub fn set_volume(&mut self, percent: u8) {
        self.volume = f32::from(percent.min(100)) / 100.0;
    }

    pub fn start(&mut self, audio: Vec<u8>) -> Result<PlaybackTicket, PlaybackError> {
        self.stop();

        let (signal, done) = ClipSignal::new();
        let control = signal.control().clone();
        self.next_id += 1;
        let id = self.next_id;

        self.output.play(audio, self.volume, signal)?;
        self.current = Some(Playing { id, control });
        tracing::debug!(clip = id, "Playback started");

        Ok(PlaybackTicket {
            id,
            done,
            end: None,
        })
    }

    /// Stop the current clip. Returns whether anything was playing.
    pub fn stop(&mut self) -> bool {
        match self.current.take() {
            Some(playing) => {
                let was_live = playing.control.is_live();
                playing.control.request_stop();
                if was_live {
                    tracing::debug!(clip = playing.id, "Playback stopped");
                }
                was_live
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|playing| playing.control.is_live())
    }

    /// Release the clip a finished ticket belongs to
    pub fn settle(&mut self, ticket: &PlaybackTicket) {
        if self.current.as_ref().is_some_and(|p| p.id == ticket.id) {
            self.current = None;
        }
    }
}
