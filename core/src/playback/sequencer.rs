//! "Play all": ordered narration of every entry with auto-advance

use std::time::Duration;

use super::service::{EntryOutcome, Flow, Intercept, NarrationMode, NarrationService, Next};
use super::view::TimelineView;

/// One narrated entry in a sequence run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceStep {
    pub index: usize,
    pub entry_id: String,
    pub outcome: EntryOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEnd {
    /// Every entry was visited
    Finished,
    Stopped,
    /// Cancelled by another narration command
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub steps: Vec<SequenceStep>,
    pub end: SequenceEnd,
}

impl SequenceReport {
    pub fn played(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == EntryOutcome::Played)
            .count()
    }
}

impl<V: TimelineView> NarrationService<V> {
    pub(super) async fn play_all(&mut self) -> Next {
        // Individual narration always finished or was cancelled before this
        // command was dispatched, so nothing else is playing here.
        self.player.stop();

        let (report, next) = self.run_sequence().await;
        tracing::info!(
            steps = report.steps.len(),
            played = report.played(),
            end = ?report.end,
            "Play all ended"
        );
        self.last_sequence = Some(report);
        next
    }

    async fn run_sequence(&mut self) -> (SequenceReport, Next) {
        let mut steps = Vec::new();
        let mut end = SequenceEnd::Finished;
        let mut next = Next::Wait;
        let mut previous: Option<usize> = None;

        if self.entries.is_empty() {
            return (SequenceReport { steps, end }, next);
        }

        tracing::info!(entries = self.entries.len(), voice = %self.voice, "Play all started");
        self.view.sequence_changed(true);

        let mut index = 0;
        while index < self.entries.len() {
            self.mode = NarrationMode::Sequence { index };
            if let Some(prev) = previous {
                self.view.collapse(prev);
            }
            self.view.expand(index);
            self.view.scroll_into_view(index);
            previous = Some(index);

            let flow = match self.pause(self.settle_delay, index).await {
                Some(flow) => flow,
                None => self.narrate(index).await,
            };

            match flow {
                Flow::Done(outcome) => steps.push(SequenceStep {
                    index,
                    entry_id: self
                        .entries
                        .get(index)
                        .map(|e| e.id.clone())
                        .unwrap_or_default(),
                    outcome,
                }),
                Flow::Stopped => {
                    end = SequenceEnd::Stopped;
                    break;
                }
                Flow::Interrupted(command) => {
                    end = SequenceEnd::Interrupted;
                    next = Next::Run(command);
                    break;
                }
            }

            if index + 1 < self.entries.len() {
                match self.pause(self.inter_item_delay, index).await {
                    None | Some(Flow::Done(_)) => {}
                    Some(Flow::Stopped) => {
                        end = SequenceEnd::Stopped;
                        break;
                    }
                    Some(Flow::Interrupted(command)) => {
                        end = SequenceEnd::Interrupted;
                        next = Next::Run(command);
                        break;
                    }
                }
            }
            index += 1;
        }

        if let Some(last) = previous {
            self.view.collapse(last);
        }
        self.mode = NarrationMode::Idle;
        self.view.sequence_changed(false);

        (SequenceReport { steps, end }, next)
    }

    /// Wait while still answering commands. `Some` when a command ended the
    /// sequence.
    async fn pause(&mut self, duration: Duration, index: usize) -> Option<Flow> {
        if duration.is_zero() {
            return None;
        }
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return None,
                command = self.commands.recv() => match self.intercept(command, None) {
                    // a new voice applies to the entry about to be read
                    Intercept::Ignore | Intercept::Restart => {}
                    Intercept::Leave(flow) => return Some(flow),
                },
                Some((token, _)) = self.resolutions.recv() => {
                    tracing::debug!(token, index, "Discarding stale narration audio");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, ViewEvent, entries};
    use chronicle_types::Voice;

    async fn finished_report(harness: &Harness) -> SequenceReport {
        harness.wait_idle().await;
        harness
            .handle
            .status()
            .await
            .unwrap()
            .last_sequence
            .expect("sequence report")
    }

    #[tokio::test(start_paused = true)]
    async fn plays_every_entry_in_order() {
        let harness = Harness::start(entries(&["A", "B", "C"]));

        harness.handle.play_all().await.unwrap();
        let report = finished_report(&harness).await;

        assert_eq!(report.end, SequenceEnd::Finished);
        assert_eq!(report.played(), 3);
        assert_eq!(
            harness.clips(),
            (0..3).map(|i| harness.clip(i, Voice::Nova)).collect::<Vec<_>>()
        );
        assert_eq!(harness.output.max_overlap(), 1);

        let events = harness.view_events();
        assert_eq!(events.first(), Some(&ViewEvent::Sequence(true)));
        assert_eq!(events.last(), Some(&ViewEvent::Sequence(false)));
        assert!(events.contains(&ViewEvent::Collapse(0)));
        assert!(events.contains(&ViewEvent::Collapse(2)));
        assert!(events.contains(&ViewEvent::Scroll(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_entry_is_skipped_and_sequence_continues() {
        let harness = Harness::failing(entries(&["A", "B", "C"]), &[1]);

        harness.handle.play_all().await.unwrap();
        let report = finished_report(&harness).await;

        assert_eq!(
            harness.clips(),
            vec![harness.clip(0, Voice::Nova), harness.clip(2, Voice::Nova)]
        );
        assert_eq!(report.steps.len(), 3);
        assert!(matches!(report.steps[1].outcome, EntryOutcome::Skipped { .. }));
        assert_eq!(report.end, SequenceEnd::Finished);
        assert_eq!(
            harness.handle.status().await.unwrap().mode,
            NarrationMode::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_immediately() {
        let harness = Harness::start(entries(&["A", "B", "C"]));

        harness.handle.play_all().await.unwrap();
        // A plays 0.5-2.5s, B starts at 4.0s
        harness.sleep_ms(5000).await;
        harness.handle.stop().await.unwrap();

        let status = harness.handle.status().await.unwrap();
        assert_eq!(status.mode, NarrationMode::Idle);
        assert!(!status.playing);

        harness.sleep_ms(10_000).await;
        assert_eq!(
            harness.clips(),
            vec![harness.clip(0, Voice::Nova), harness.clip(1, Voice::Nova)]
        );
        let report = harness.handle.status().await.unwrap().last_sequence.unwrap();
        assert_eq!(report.end, SequenceEnd::Stopped);
        assert_eq!(report.steps.len(), 1);
        assert!(harness.view_events().contains(&ViewEvent::Collapse(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn play_all_again_toggles_it_off() {
        let harness = Harness::start(entries(&["A", "B"]));

        harness.handle.play_all().await.unwrap();
        harness.sleep_ms(1000).await;
        harness.handle.play_all().await.unwrap();

        let report = finished_report(&harness).await;
        assert_eq!(report.end, SequenceEnd::Stopped);
        assert_eq!(harness.clips().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn voice_change_restarts_the_current_entry() {
        let harness = Harness::start(entries(&["A", "B", "C"]));

        harness.handle.play_all().await.unwrap();
        // C plays from 7.5s
        harness.sleep_ms(8000).await;
        harness.handle.set_voice(Voice::Fable).await.unwrap();
        let report = finished_report(&harness).await;

        assert_eq!(
            harness.clips(),
            vec![
                harness.clip(0, Voice::Nova),
                harness.clip(1, Voice::Nova),
                harness.clip(2, Voice::Nova),
                harness.clip(2, Voice::Fable),
            ]
        );
        let indices: Vec<usize> = report.steps.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(report.end, SequenceEnd::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn individual_request_cancels_the_sequence() {
        let harness = Harness::start(entries(&["A", "B", "C"]));

        harness.handle.play_all().await.unwrap();
        harness.sleep_ms(1000).await;
        harness.handle.speak(2).await.unwrap();
        harness.wait_idle().await;

        assert_eq!(
            harness.clips(),
            vec![harness.clip(0, Voice::Nova), harness.clip(2, Voice::Nova)]
        );
        let status = harness.handle.status().await.unwrap();
        assert_eq!(status.last_sequence.unwrap().end, SequenceEnd::Interrupted);
        assert_eq!(harness.output.max_overlap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn play_all_stops_individual_narration_first() {
        let harness = Harness::start(entries(&["A", "B"]));

        harness.handle.speak(1).await.unwrap();
        harness.sleep_ms(500).await;
        harness.handle.play_all().await.unwrap();
        let report = finished_report(&harness).await;

        assert_eq!(
            harness.clips(),
            vec![
                harness.clip(1, Voice::Nova),
                harness.clip(0, Voice::Nova),
                harness.clip(1, Voice::Nova),
            ]
        );
        assert_eq!(report.played(), 2);
        assert_eq!(harness.output.max_overlap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn speak_during_settle_pause_cancels_before_anything_plays() {
        let harness = Harness::start(entries(&["A", "B", "C"]));

        harness.handle.play_all().await.unwrap();
        harness.sleep_ms(200).await;
        harness.handle.speak(2).await.unwrap();
        harness.wait_idle().await;

        assert_eq!(harness.clips(), vec![harness.clip(2, Voice::Nova)]);
        let report = harness.handle.status().await.unwrap().last_sequence.unwrap();
        assert_eq!(report.end, SequenceEnd::Interrupted);
        assert!(report.steps.is_empty());
        assert!(harness.view_events().contains(&ViewEvent::Collapse(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_inter_item_pause_ends_the_sequence() {
        let harness = Harness::start(entries(&["A", "B", "C"]));

        harness.handle.play_all().await.unwrap();
        // A ends at 2.5s, B would be scrolled to at 3.5s
        harness.sleep_ms(3000).await;
        harness.handle.stop().await.unwrap();
        harness.sleep_ms(10_000).await;

        assert_eq!(harness.clips(), vec![harness.clip(0, Voice::Nova)]);
        let report = harness.handle.status().await.unwrap().last_sequence.unwrap();
        assert_eq!(report.end, SequenceEnd::Stopped);
        assert_eq!(report.steps.len(), 1);
        assert!(!harness.view_events().contains(&ViewEvent::Expand(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn voice_change_during_pause_applies_to_the_next_entry() {
        let harness = Harness::start(entries(&["A", "B", "C"]));

        harness.handle.play_all().await.unwrap();
        harness.sleep_ms(3000).await;
        harness.handle.set_voice(Voice::Fable).await.unwrap();
        let report = finished_report(&harness).await;

        assert_eq!(
            harness.clips(),
            vec![
                harness.clip(0, Voice::Nova),
                harness.clip(1, Voice::Fable),
                harness.clip(2, Voice::Fable),
            ]
        );
        assert_eq!(report.end, SequenceEnd::Finished);
        assert_eq!(report.played(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_entries_interrupts_the_sequence() {
        let harness = Harness::start(entries(&["A", "B", "C"]));

        harness.handle.play_all().await.unwrap();
        harness.sleep_ms(1000).await;
        harness
            .handle
            .replace_entries(entries(&["X", "Y"]))
            .await
            .unwrap();
        harness.wait_idle().await;

        let status = harness.handle.status().await.unwrap();
        assert_eq!(status.entries, 2);
        assert_eq!(status.last_sequence.unwrap().end, SequenceEnd::Interrupted);
        assert_eq!(harness.clips(), vec![harness.clip(0, Voice::Nova)]);
        assert_eq!(harness.output.live_clips(), 0);

        harness.sleep_ms(10_000).await;
        assert_eq!(harness.clips().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_timeline_finishes_without_view_changes() {
        let harness = Harness::start(Vec::new());
        harness.handle.play_all().await.unwrap();
        let report = finished_report(&harness).await;
        assert!(report.steps.is_empty());
        assert!(harness.view_events().is_empty());
    }
}
