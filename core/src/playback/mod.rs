//! Narration playback
//!
//! - **output**: the audio device (`RodioOutput`) and per-clip signalling
//! - **controller**: the single "currently playing" clip
//! - **service**: the command-driven narration task and its handle
//! - **sequencer**: "play all" across every entry
//! - **view**: callbacks into whatever renders the timeline

mod controller;
mod error;
mod output;
mod sequencer;
mod service;
mod view;

pub use controller::{PlaybackController, PlaybackTicket};
pub use error::PlaybackError;
pub use output::{AudioOutput, ClipControl, ClipEnd, ClipSignal, RodioOutput};
pub use sequencer::{SequenceEnd, SequenceReport, SequenceStep};
pub use service::{
    EntryOutcome, NarrationClosed, NarrationCommand, NarrationHandle, NarrationMode,
    NarrationService, NarrationStatus, create_narration_channel,
};
pub use view::TimelineView;
