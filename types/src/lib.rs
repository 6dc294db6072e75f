//! Shared timeline and configuration types for Chronicle
//!
//! This crate contains the serializable document model and the configuration
//! types shared between chronicle-core (persistence, narration) and the
//! chronicle CLI (server, REPL).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Icon assigned to entries created without one
pub const DEFAULT_ICON: &str = "fas fa-lightbulb";

pub const DEFAULT_TIMELINE_TITLE: &str = "The Road to AGI and Beyond";
pub const DEFAULT_TIMELINE_DESCRIPTION: &str = "An interactive timeline based on insights from the Artificial Intelligence Show podcast series and AI history.";

// ─────────────────────────────────────────────────────────────────────────────
// Timeline Document
// ─────────────────────────────────────────────────────────────────────────────

/// A "learn more" link rendered under an entry's details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnMoreLink {
    pub text: String,
    pub url: String,
}

/// One milestone on the timeline.
///
/// Every field defaults when missing so partially filled submissions can be
/// deserialized and then validated with a useful message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Unique identifier, `slug(year)-slug(title)` unless supplied
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub players_concepts: Vec<String>,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub learn_more_links: Vec<LearnMoreLink>,
}

impl TimelineEntry {
    /// Text read aloud for this entry. Also the text half of the audio cache key,
    /// so the format must stay byte-for-byte stable.
    pub fn narration_text(&self) -> String {
        let mut text = format!("{}: {}.", self.year, self.title);
        if !self.details.is_empty() {
            text.push(' ');
            text.push_str(&self.details);
        }
        if let Some(quote) = self.quote.as_deref().filter(|q| !q.is_empty()) {
            text.push_str(" Quote: ");
            text.push_str(quote);
        }
        text
    }

    /// Numeric sort key: every digit of the year concatenated ("1950s" -> 1950).
    pub fn year_key(&self) -> Option<u64> {
        let digits: String = self.year.chars().filter(char::is_ascii_digit).collect();
        digits.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "lastUpdated")]
    pub last_updated: NaiveDate,
}

impl Default for TimelineMetadata {
    fn default() -> Self {
        Self {
            title: DEFAULT_TIMELINE_TITLE.to_string(),
            description: DEFAULT_TIMELINE_DESCRIPTION.to_string(),
            last_updated: chrono::Local::now().date_naive(),
        }
    }
}

/// The whole timeline as stored by every persistence backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimelineDocument {
    pub timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pub metadata: TimelineMetadata,
}

impl TimelineDocument {
    pub fn entry(&self, id: &str) -> Option<&TimelineEntry> {
        self.timeline.iter().find(|e| e.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Voices
// ─────────────────────────────────────────────────────────────────────────────

/// Speaker preset understood by the synthesis provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    pub const ALL: [Voice; 6] = [
        Voice::Alloy,
        Voice::Echo,
        Voice::Fable,
        Voice::Onyx,
        Voice::Nova,
        Voice::Shimmer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a voice name is not one of the known presets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVoice(pub String);

impl fmt::Display for UnknownVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known: Vec<&str> = Voice::ALL.iter().map(Voice::as_str).collect();
        write!(f, "unknown voice '{}' (expected one of: {})", self.0, known.join(", "))
    }
}

impl std::error::Error for UnknownVoice {}

impl FromStr for Voice {
    type Err = UnknownVoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Voice::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| UnknownVoice(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Which persistence backend holds the timeline document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Pretty-printed JSON file, optionally committed to git
    #[default]
    File,
    /// HTTP key-value blob store
    Blob,
    /// SQLite table per entry
    Table,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: BackendKind,

    /// Path of the JSON document used by the file backend
    #[serde(default = "default_timeline_file")]
    pub timeline_file: String,

    /// Commit and push the document after every write (file backend)
    #[serde(default)]
    pub commit_changes: bool,
    #[serde(default = "default_git_remote")]
    pub git_remote: String,
    #[serde(default = "default_git_branch")]
    pub git_branch: String,

    /// Base URL of the blob store, e.g. `https://blobs.example.com/v1`
    #[serde(default)]
    pub blob_url: String,
    #[serde(default = "default_blob_namespace")]
    pub blob_namespace: String,
    #[serde(default = "default_blob_key")]
    pub blob_key: String,
    /// Bearer token for the blob store (overridden by `CHRONICLE_BLOB_TOKEN`)
    #[serde(default)]
    pub blob_token: String,

    /// SQLite database used by the table backend
    #[serde(default = "default_table_path")]
    pub table_path: String,
}

fn default_timeline_file() -> String {
    "data/timeline.json".to_string()
}
fn default_git_remote() -> String {
    "origin".to_string()
}
fn default_git_branch() -> String {
    "staging".to_string()
}
fn default_blob_namespace() -> String {
    "roadToAGI".to_string()
}
fn default_blob_key() -> String {
    "timeline-data.json".to_string()
}
fn default_table_path() -> String {
    "data/timeline.db".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            timeline_file: default_timeline_file(),
            commit_changes: false,
            git_remote: default_git_remote(),
            git_branch: default_git_branch(),
            blob_url: String::new(),
            blob_namespace: default_blob_namespace(),
            blob_key: default_blob_key(),
            blob_token: String::new(),
            table_path: default_table_path(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Speech Settings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSettings {
    /// Voice used by the narrator until changed at runtime
    #[serde(default = "default_narrator_voice")]
    pub voice: Voice,

    /// Voices rendered by `generate-audio`
    #[serde(default = "default_generated_voices")]
    pub generated_voices: Vec<Voice>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Provider key (overridden by `OPENAI_API_KEY`)
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,

    /// Synthesize through a running `chronicle serve` instead of calling the
    /// provider directly. Empty = direct.
    #[serde(default)]
    pub proxy_url: String,

    /// Directory or http(s) base URL holding `{voice}/{entry_id}.{ext}`
    #[serde(default = "default_asset_root")]
    pub asset_root: String,
    #[serde(default = "default_asset_extension")]
    pub asset_extension: String,

    /// Audio cache directory. Empty = platform cache dir.
    #[serde(default)]
    pub cache_dir: String,
    /// Maximum cached clips, 0 = unbounded
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    /// Maximum clip age in days, 0 = never expires
    #[serde(default = "default_cache_max_age_days")]
    pub cache_max_age_days: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause between provider requests while pre-generating audio
    #[serde(default = "default_generation_delay_ms")]
    pub generation_delay_ms: u64,
}

fn default_narrator_voice() -> Voice {
    Voice::Nova
}
fn default_generated_voices() -> Vec<Voice> {
    vec![Voice::Fable, Voice::Nova]
}
fn default_api_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "tts-1".to_string()
}
fn default_asset_root() -> String {
    "public/audio".to_string()
}
fn default_asset_extension() -> String {
    "mp3".to_string()
}
fn default_cache_max_entries() -> usize {
    500
}
fn default_cache_max_age_days() -> u32 {
    30
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_generation_delay_ms() -> u64 {
    1000
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            voice: default_narrator_voice(),
            generated_voices: default_generated_voices(),
            api_base_url: default_api_base_url(),
            api_key: String::new(),
            model: default_model(),
            proxy_url: String::new(),
            asset_root: default_asset_root(),
            asset_extension: default_asset_extension(),
            cache_dir: String::new(),
            cache_max_entries: default_cache_max_entries(),
            cache_max_age_days: default_cache_max_age_days(),
            request_timeout_secs: default_request_timeout_secs(),
            generation_delay_ms: default_generation_delay_ms(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Playback Settings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Volume level (0-100)
    #[serde(default = "default_volume")]
    pub volume: u8,

    /// Wait after scrolling an entry into view before narrating it
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Gap between the end of one entry and the next in "play all"
    #[serde(default = "default_inter_item_delay_ms")]
    pub inter_item_delay_ms: u64,
}

fn default_volume() -> u8 {
    80
}
fn default_settle_delay_ms() -> u64 {
    500
}
fn default_inter_item_delay_ms() -> u64 {
    1000
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            settle_delay_ms: default_settle_delay_ms(),
            inter_item_delay_ms: default_inter_item_delay_ms(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Settings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Shared editing password (overridden by `ADMIN_PASSWORD`).
    /// The default only exists for local development.
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
}

fn default_bind_address() -> String {
    "127.0.0.1:8888".to_string()
}
fn default_admin_password() -> String {
    "admin".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            admin_password: default_admin_password(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// App Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration file.
///
/// Note: Persistence methods (load/save) are provided by chronicle-core via the
/// `AppConfigExt` trait.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub speech: SpeechSettings,
    #[serde(default)]
    pub playback: PlaybackSettings,
    #[serde(default)]
    pub server: ServerSettings,
}
