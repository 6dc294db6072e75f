//! Terminal rendering of narration progress

use chronicle_core::TimelineView;
use chronicle_types::TimelineEntry;

/// Prints narration transitions for the REPL. Entries are numbered from 1.
#[derive(Default)]
pub struct ConsoleView {
    entries: Vec<(String, String)>,
}

impl ConsoleView {
    fn label(&self, index: usize) -> String {
        match self.entries.get(index) {
            Some((heading, _)) => format!("{}. {}", index + 1, heading),
            None => format!("{}. <unknown entry>", index + 1),
        }
    }
}

impl TimelineView for ConsoleView {
    fn expand(&mut self, index: usize) {
        if let Some((_, details)) = self.entries.get(index) {
            println!("\n{}\n    {}", self.label(index), details);
        }
    }

    fn collapse(&mut self, index: usize) {
        tracing::debug!(index, "Collapsed entry");
    }

    fn scroll_into_view(&mut self, index: usize) {
        tracing::debug!(index, "Scrolled to entry");
    }

    fn set_speaking(&mut self, index: usize, speaking: bool) {
        if speaking {
            println!("  >> speaking {}", self.label(index));
        } else {
            println!("  -- finished {}", self.label(index));
        }
    }

    fn sequence_changed(&mut self, active: bool) {
        println!("{}", if active { "Play all started" } else { "Play all ended" });
    }

    fn narration_failed(&mut self, index: usize, reason: &str) {
        println!("  !! could not narrate {}: {}", self.label(index), reason);
    }

    fn entries_replaced(&mut self, entries: &[TimelineEntry]) {
        self.entries = entries
            .iter()
            .map(|e| (format!("{} {}", e.year, e.title), e.details.clone()))
            .collect();
    }
}
