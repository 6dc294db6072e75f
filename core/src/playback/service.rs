//! Narration service: one task owning playback state, driven by commands
//!
//! Every state change (individual narration, "play all", voice, entries)
//! goes through the command channel, so at most one of the two modes is ever
//! active and at most one clip plays.

use std::time::Duration;

use chronicle_types::{TimelineEntry, Voice};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::controller::PlaybackController;
use super::output::ClipEnd;
use super::sequencer::SequenceReport;
use super::view::TimelineView;
use crate::speech::{ResolvedAudio, SpeechError, SpeechRequest, SpeechSource};

/// Commands accepted by the narration service
#[derive(Debug)]
pub enum NarrationCommand {
    /// Narrate one entry; toggles off if that entry is already speaking
    Speak(usize),
    /// Start "play all", or stop it when it is running
    PlayAll,
    Stop,
    SetVoice(Voice),
    ReplaceEntries(Vec<TimelineEntry>),
    Status(oneshot::Sender<NarrationStatus>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationMode {
    Idle,
    Single { index: usize },
    Sequence { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationStatus {
    pub mode: NarrationMode,
    pub voice: Voice,
    pub playing: bool,
    pub entries: usize,
    pub last_sequence: Option<SequenceReport>,
}

/// Result of narrating one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Played,
    Skipped { reason: String },
}

#[derive(Debug, Error)]
#[error("narration service has stopped")]
pub struct NarrationClosed;

/// Cloneable sender side of the narration service
#[derive(Clone)]
pub struct NarrationHandle {
    tx: mpsc::Sender<NarrationCommand>,
}

impl NarrationHandle {
    async fn send(&self, command: NarrationCommand) -> Result<(), NarrationClosed> {
        self.tx.send(command).await.map_err(|_| NarrationClosed)
    }

    pub async fn speak(&self, index: usize) -> Result<(), NarrationClosed> {
        self.send(NarrationCommand::Speak(index)).await
    }

    pub async fn play_all(&self) -> Result<(), NarrationClosed> {
        self.send(NarrationCommand::PlayAll).await
    }

    pub async fn stop(&self) -> Result<(), NarrationClosed> {
        self.send(NarrationCommand::Stop).await
    }

    pub async fn set_voice(&self, voice: Voice) -> Result<(), NarrationClosed> {
        self.send(NarrationCommand::SetVoice(voice)).await
    }

    pub async fn replace_entries(&self, entries: Vec<TimelineEntry>) -> Result<(), NarrationClosed> {
        self.send(NarrationCommand::ReplaceEntries(entries)).await
    }

    pub async fn status(&self) -> Result<NarrationStatus, NarrationClosed> {
        let (tx, rx) = oneshot::channel();
        self.send(NarrationCommand::Status(tx)).await?;
        rx.await.map_err(|_| NarrationClosed)
    }

    pub async fn shutdown(&self) -> Result<(), NarrationClosed> {
        self.send(NarrationCommand::Shutdown).await
    }
}

/// Create a new narration channel
pub fn create_narration_channel() -> (NarrationHandle, mpsc::Receiver<NarrationCommand>) {
    let (tx, rx) = mpsc::channel(64);
    (NarrationHandle { tx }, rx)
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// How a narration (or a pause inside a sequence) ended
pub(super) enum Flow {
    Done(EntryOutcome),
    Stopped,
    /// Cancelled by a command that must run next
    Interrupted(NarrationCommand),
}

/// What to do with a command that arrives mid-narration
pub(super) enum Intercept {
    Ignore,
    /// Voice changed: replay the current entry
    Restart,
    Leave(Flow),
}

/// What the run loop does after handling a command
pub(super) enum Next {
    Wait,
    Run(NarrationCommand),
    Exit,
}

type Resolution = (u64, Result<ResolvedAudio, SpeechError>);

pub struct NarrationService<V: TimelineView> {
    pub(super) commands: mpsc::Receiver<NarrationCommand>,
    pub(super) source: SpeechSource,
    pub(super) player: PlaybackController,
    pub(super) view: V,
    pub(super) entries: Vec<TimelineEntry>,
    pub(super) voice: Voice,
    pub(super) mode: NarrationMode,
    pub(super) settle_delay: Duration,
    pub(super) inter_item_delay: Duration,
    pub(super) last_sequence: Option<SequenceReport>,
    /// Tag of the newest resolution request; older results are discarded
    generation: u64,
    resolutions_tx: mpsc::UnboundedSender<Resolution>,
    pub(super) resolutions: mpsc::UnboundedReceiver<Resolution>,
}

impl<V: TimelineView> NarrationService<V> {
    pub fn new(
        commands: mpsc::Receiver<NarrationCommand>,
        source: SpeechSource,
        player: PlaybackController,
        mut view: V,
        entries: Vec<TimelineEntry>,
    ) -> Self {
        let (resolutions_tx, resolutions) = mpsc::unbounded_channel();
        view.entries_replaced(&entries);
        Self {
            commands,
            source,
            player,
            view,
            entries,
            voice: Voice::Nova,
            mode: NarrationMode::Idle,
            settle_delay: Duration::from_millis(500),
            inter_item_delay: Duration::from_millis(1000),
            last_sequence: None,
            generation: 0,
            resolutions_tx,
            resolutions,
        }
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voice = voice;
        self
    }

    /// Pause after scrolling an entry into view, and between entries
    pub fn with_delays(mut self, settle: Duration, inter_item: Duration) -> Self {
        self.settle_delay = settle;
        self.inter_item_delay = inter_item;
        self
    }

    /// Run the service until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        tracing::debug!(entries = self.entries.len(), voice = %self.voice, "Narration service started");
        let mut pending: Option<NarrationCommand> = None;

        loop {
            let command = match pending.take() {
                Some(command) => command,
                None => tokio::select! {
                    command = self.commands.recv() => match command {
                        Some(command) => command,
                        None => break,
                    },
                    Some((token, _)) = self.resolutions.recv() => {
                        tracing::debug!(token, "Discarding stale narration audio");
                        continue;
                    }
                },
            };

            match self.dispatch(command).await {
                Next::Wait => {}
                Next::Run(command) => pending = Some(command),
                Next::Exit => break,
            }
        }

        self.player.stop();
        tracing::debug!("Narration service stopped");
    }

    async fn dispatch(&mut self, command: NarrationCommand) -> Next {
        match command {
            NarrationCommand::Speak(index) => self.speak_single(index).await,
            NarrationCommand::PlayAll => self.play_all().await,
            NarrationCommand::Stop => {
                self.player.stop();
                Next::Wait
            }
            NarrationCommand::SetVoice(voice) => {
                self.change_voice(voice);
                Next::Wait
            }
            NarrationCommand::ReplaceEntries(entries) => {
                tracing::info!(entries = entries.len(), "Narration entries replaced");
                self.view.entries_replaced(&entries);
                self.entries = entries;
                Next::Wait
            }
            NarrationCommand::Status(reply) => {
                let _ = reply.send(self.status());
                Next::Wait
            }
            NarrationCommand::Shutdown => Next::Exit,
        }
    }

    pub(super) fn status(&self) -> NarrationStatus {
        NarrationStatus {
            mode: self.mode,
            voice: self.voice,
            playing: self.player.is_active(),
            entries: self.entries.len(),
            last_sequence: self.last_sequence.clone(),
        }
    }

    /// Returns whether the voice actually changed
    fn change_voice(&mut self, voice: Voice) -> bool {
        if voice == self.voice {
            return false;
        }
        tracing::info!(from = %self.voice, to = %voice, "Narration voice changed");
        self.voice = voice;
        true
    }

    async fn speak_single(&mut self, index: usize) -> Next {
        if index >= self.entries.len() {
            tracing::warn!(index, entries = self.entries.len(), "No timeline entry to narrate");
            return Next::Wait;
        }

        self.mode = NarrationMode::Single { index };
        self.view.expand(index);
        let flow = self.narrate(index).await;
        self.mode = NarrationMode::Idle;

        match flow {
            Flow::Done(_) | Flow::Stopped => Next::Wait,
            Flow::Interrupted(command) => Next::Run(command),
        }
    }

    /// Decide what a command received mid-narration does. `speaking` is the
    /// entry currently being read, if any.
    pub(super) fn intercept(
        &mut self,
        command: Option<NarrationCommand>,
        speaking: Option<usize>,
    ) -> Intercept {
        let Some(command) = command else {
            return Intercept::Leave(Flow::Interrupted(NarrationCommand::Shutdown));
        };

        match command {
            NarrationCommand::Status(reply) => {
                let _ = reply.send(self.status());
                Intercept::Ignore
            }
            NarrationCommand::SetVoice(voice) => {
                if self.change_voice(voice) {
                    Intercept::Restart
                } else {
                    Intercept::Ignore
                }
            }
            NarrationCommand::Stop => Intercept::Leave(Flow::Stopped),
            NarrationCommand::Speak(index) if Some(index) == speaking => {
                Intercept::Leave(Flow::Stopped)
            }
            NarrationCommand::PlayAll if matches!(self.mode, NarrationMode::Sequence { .. }) => {
                Intercept::Leave(Flow::Stopped)
            }
            other => Intercept::Leave(Flow::Interrupted(other)),
        }
    }

    fn request_audio(&mut self, request: SpeechRequest) -> u64 {
        self.generation += 1;
        let token = self.generation;
        let source = self.source.clone();
        let results = self.resolutions_tx.clone();

        // Detached: an abandoned request still finishes and fills the cache
        tokio::spawn(async move {
            let result = source.resolve(&request).await;
            let _ = results.send((token, result));
        });
        token
    }

    /// Resolve and play one entry, reacting to commands while doing so
    pub(super) async fn narrate(&mut self, index: usize) -> Flow {
        'attempt: loop {
            let Some(entry) = self.entries.get(index) else {
                return Flow::Done(EntryOutcome::Skipped {
                    reason: format!("no entry at index {}", index),
                });
            };
            let request = SpeechRequest::for_entry(entry, self.voice);
            let entry_id = request.entry_id.clone();
            let token = self.request_audio(request);
            self.view.set_speaking(index, true);

            let resolved = loop {
                tokio::select! {
                    Some((received, result)) = self.resolutions.recv() => {
                        if received == token {
                            break result;
                        }
                        tracing::debug!(token = received, "Discarding stale narration audio");
                    }
                    command = self.commands.recv() => match self.intercept(command, Some(index)) {
                        Intercept::Ignore => {}
                        Intercept::Restart => {
                            self.view.set_speaking(index, false);
                            continue 'attempt;
                        }
                        Intercept::Leave(flow) => {
                            self.view.set_speaking(index, false);
                            return flow;
                        }
                    },
                }
            };

            let audio = match resolved {
                Ok(resolved) => {
                    tracing::debug!(entry_id = %entry_id, origin = ?resolved.origin, "Narration audio ready");
                    resolved.audio
                }
                Err(e) => return self.skip(index, &entry_id, e.to_string()),
            };

            let mut ticket = match self.player.start(audio) {
                Ok(ticket) => ticket,
                Err(e) => return self.skip(index, &entry_id, e.to_string()),
            };

            let end = loop {
                tokio::select! {
                    end = ticket.finished() => break end,
                    command = self.commands.recv() => match self.intercept(command, Some(index)) {
                        Intercept::Ignore => {}
                        Intercept::Restart => {
                            self.player.stop();
                            self.view.set_speaking(index, false);
                            continue 'attempt;
                        }
                        Intercept::Leave(flow) => {
                            self.player.stop();
                            self.view.set_speaking(index, false);
                            return flow;
                        }
                    },
                }
            };
            self.player.settle(&ticket);

            return match end {
                ClipEnd::Completed => {
                    self.view.set_speaking(index, false);
                    Flow::Done(EntryOutcome::Played)
                }
                ClipEnd::Stopped => self.skip(index, &entry_id, "playback stopped".to_string()),
                ClipEnd::Failed(reason) => self.skip(index, &entry_id, reason),
            };
        }
    }

    fn skip(&mut self, index: usize, entry_id: &str, reason: String) -> Flow {
        tracing::warn!(entry_id, error = %reason, "Narration failed");
        self.view.set_speaking(index, false);
        self.view.narration_failed(index, &reason);
        Flow::Done(EntryOutcome::Skipped { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, ViewEvent, entries};

    #[tokio::test(start_paused = true)]
    async fn speak_expands_and_plays_one_entry() {
        let harness = Harness::start(entries(&["A", "B", "C"]));

        harness.handle.speak(1).await.unwrap();
        harness.wait_idle().await;

        assert_eq!(harness.clips(), vec![harness.clip(1, Voice::Nova)]);
        let events = harness.view_events();
        assert_eq!(events[0], ViewEvent::Expand(1));
        assert!(events.contains(&ViewEvent::Speaking(1, true)));
        assert_eq!(events.last(), Some(&ViewEvent::Speaking(1, false)));
    }

    #[tokio::test(start_paused = true)]
    async fn speaking_the_same_entry_again_toggles_it_off() {
        let harness = Harness::start(entries(&["A", "B"]));

        harness.handle.speak(0).await.unwrap();
        harness.sleep_ms(700).await;
        assert!(harness.handle.status().await.unwrap().playing);

        harness.handle.speak(0).await.unwrap();
        let status = harness.handle.status().await.unwrap();
        assert_eq!(status.mode, NarrationMode::Idle);
        assert!(!status.playing);
        assert_eq!(harness.clips().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn speaking_another_entry_switches_over() {
        let harness = Harness::start(entries(&["A", "B"]));

        harness.handle.speak(0).await.unwrap();
        harness.sleep_ms(500).await;
        harness.handle.speak(1).await.unwrap();
        harness.wait_idle().await;

        assert_eq!(
            harness.clips(),
            vec![harness.clip(0, Voice::Nova), harness.clip(1, Voice::Nova)]
        );
        assert_eq!(harness.output.max_overlap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_resolution_never_plays_but_is_cached() {
        let harness = Harness::with_synth_delay(entries(&["A", "B"]), Duration::from_secs(3));

        harness.handle.speak(0).await.unwrap();
        harness.sleep_ms(1000).await;
        harness.handle.stop().await.unwrap();
        harness.sleep_ms(500).await;
        harness.handle.speak(1).await.unwrap();
        harness.wait_idle().await;

        assert_eq!(harness.clips(), vec![harness.clip(1, Voice::Nova)]);
        assert_eq!(harness.synth.calls(), 2);
        let cached = harness
            .cache
            .get(&harness.entries[0].narration_text(), Voice::Nova)
            .await
            .unwrap();
        assert_eq!(cached, Some(harness.clip(0, Voice::Nova).into_bytes()));
    }

    #[tokio::test(start_paused = true)]
    async fn voice_change_restarts_individual_narration() {
        let harness = Harness::start(entries(&["A"]));

        harness.handle.speak(0).await.unwrap();
        harness.sleep_ms(1000).await;
        harness.handle.set_voice(Voice::Fable).await.unwrap();
        harness.wait_idle().await;

        assert_eq!(
            harness.clips(),
            vec![harness.clip(0, Voice::Nova), harness.clip(0, Voice::Fable)]
        );
        assert_eq!(harness.handle.status().await.unwrap().voice, Voice::Fable);
    }

    #[tokio::test(start_paused = true)]
    async fn voice_change_while_resolving_plays_only_the_new_voice() {
        let harness = Harness::with_synth_delay(entries(&["A", "B"]), Duration::from_secs(1));

        harness.handle.speak(0).await.unwrap();
        harness.sleep_ms(300).await;
        assert!(harness.clips().is_empty());
        harness.handle.set_voice(Voice::Fable).await.unwrap();

        // nova resolves at 1.0s and is dropped, fable resolves at 1.3s
        harness.sleep_ms(1700).await;
        let status = harness.handle.status().await.unwrap();
        assert_eq!(status.mode, NarrationMode::Single { index: 0 });
        assert!(status.playing);

        harness.wait_idle().await;
        assert_eq!(harness.clips(), vec![harness.clip(0, Voice::Fable)]);
        assert_eq!(harness.synth.calls(), 2);
        assert_eq!(harness.view_events().first(), Some(&ViewEvent::Expand(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_resolution_is_reported_to_the_view() {
        let harness = Harness::failing(entries(&["A", "B"]), &[1]);

        harness.handle.speak(1).await.unwrap();
        harness.wait_idle().await;

        assert!(harness.clips().is_empty());
        assert!(
            harness
                .view_events()
                .iter()
                .any(|e| matches!(e, ViewEvent::Failed(1, _)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_and_replaced_entries() {
        let harness = Harness::start(entries(&["A"]));

        harness.handle.speak(5).await.unwrap();
        assert_eq!(harness.handle.status().await.unwrap().mode, NarrationMode::Idle);

        harness
            .handle
            .replace_entries(entries(&["X", "Y", "Z"]))
            .await
            .unwrap();
        assert_eq!(harness.handle.status().await.unwrap().entries, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_playback_and_closes_the_handle() {
        let harness = Harness::start(entries(&["A"]));

        harness.handle.speak(0).await.unwrap();
        harness.sleep_ms(700).await;
        harness.handle.shutdown().await.unwrap();
        harness.sleep_ms(10).await;

        assert!(harness.handle.status().await.is_err());
        assert_eq!(harness.output.live_clips(), 0);
    }
}
