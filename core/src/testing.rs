//! Fakes shared by the unit tests

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use chronicle_types::{TimelineEntry, Voice};
use tokio::net::TcpListener;

use crate::playback::{
    AudioOutput, ClipControl, ClipEnd, ClipSignal, NarrationHandle, NarrationMode,
    NarrationService, PlaybackController, PlaybackError, TimelineView, create_narration_channel,
};
use crate::speech::{
    AudioCache, CacheBounds, CacheError, MemoryAudioCache, SpeechError, SpeechSource,
    StaticAssets, Synthesizer,
};

// ─────────────────────────────────────────────────────────────────────────────
// Speech fakes
// ─────────────────────────────────────────────────────────────────────────────

/// Synthesizes `"{voice}:{text}"` as the audio bytes
#[derive(Default)]
pub struct FakeSynth {
    delay: Duration,
    failing: Vec<String>,
    calls: AtomicUsize,
}

impl FakeSynth {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn failing_on(texts: &[&str]) -> Self {
        Self {
            failing: texts.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for FakeSynth {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.iter().any(|t| t == text) {
            return Err(SpeechError::Synthesis {
                message: "synthesis unavailable".to_string(),
            });
        }
        Ok(format!("{}:{}", voice, text).into_bytes())
    }
}

#[derive(Default)]
pub struct FakeAssets {
    files: HashMap<(String, Voice), Vec<u8>>,
    calls: AtomicUsize,
}

impl FakeAssets {
    pub fn with(entry_id: &str, voice: Voice, audio: &[u8]) -> Self {
        let mut files = HashMap::new();
        files.insert((entry_id.to_string(), voice), audio.to_vec());
        Self {
            files,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StaticAssets for FakeAssets {
    async fn fetch(&self, entry_id: &str, voice: Voice) -> Result<Option<Vec<u8>>, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.files.get(&(entry_id.to_string(), voice)).cloned())
    }
}

/// Cache whose every operation fails
pub struct FailingCache;

impl FailingCache {
    fn error() -> CacheError {
        CacheError::Io {
            path: PathBuf::from("broken-cache"),
            source: std::io::Error::other("test cache is broken"),
        }
    }
}

#[async_trait]
impl AudioCache for FailingCache {
    async fn get(&self, _text: &str, _voice: Voice) -> Result<Option<Vec<u8>>, CacheError> {
        Err(Self::error())
    }

    async fn put(&self, _text: &str, _voice: Voice, _audio: &[u8]) -> Result<(), CacheError> {
        Err(Self::error())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Playback fakes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct OutputLog {
    clips: Vec<String>,
    volumes: Vec<f32>,
    controls: Vec<ClipControl>,
    max_overlap: usize,
}

/// Output whose clips all last `clip_len` of (virtual) time
pub struct FakeOutput {
    clip_len: Duration,
    reject: Option<Vec<u8>>,
    log: Mutex<OutputLog>,
}

impl FakeOutput {
    pub fn new(clip_len: Duration) -> Self {
        Self {
            clip_len,
            reject: None,
            log: Mutex::new(OutputLog::default()),
        }
    }

    /// Fail to decode this exact payload
    pub fn rejecting(mut self, audio: &str) -> Self {
        self.reject = Some(audio.as_bytes().to_vec());
        self
    }

    pub fn clips(&self) -> Vec<String> {
        self.log.lock().unwrap().clips.clone()
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.log.lock().unwrap().volumes.clone()
    }

    /// Most clips ever live at the same time
    pub fn max_overlap(&self) -> usize {
        self.log.lock().unwrap().max_overlap
    }

    pub fn live_clips(&self) -> usize {
        let log = self.log.lock().unwrap();
        log.controls.iter().filter(|c| c.is_live()).count()
    }
}

impl AudioOutput for FakeOutput {
    fn play(&self, audio: Vec<u8>, volume: f32, signal: ClipSignal) -> Result<(), PlaybackError> {
        if self.reject.as_deref() == Some(audio.as_slice()) {
            return Err(PlaybackError::Decode("unsupported format".to_string()));
        }

        {
            let mut log = self.log.lock().unwrap();
            let live = log.controls.iter().filter(|c| c.is_live()).count() + 1;
            log.max_overlap = log.max_overlap.max(live);
            log.clips.push(String::from_utf8_lossy(&audio).into_owned());
            log.volumes.push(volume);
            log.controls.push(signal.control().clone());
        }

        let clip_len = self.clip_len;
        tokio::spawn(async move {
            let control = signal.control().clone();
            tokio::select! {
                _ = tokio::time::sleep(clip_len) => signal.finish(ClipEnd::Completed),
                _ = control.stopped() => signal.finish(ClipEnd::Stopped),
            }
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Expand(usize),
    Collapse(usize),
    Scroll(usize),
    Speaking(usize, bool),
    Sequence(bool),
    Failed(usize, String),
}

#[derive(Clone, Default)]
pub struct RecordingView {
    events: Arc<Mutex<Vec<ViewEvent>>>,
}

impl RecordingView {
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: ViewEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl TimelineView for RecordingView {
    fn expand(&mut self, index: usize) {
        self.push(ViewEvent::Expand(index));
    }

    fn collapse(&mut self, index: usize) {
        self.push(ViewEvent::Collapse(index));
    }

    fn scroll_into_view(&mut self, index: usize) {
        self.push(ViewEvent::Scroll(index));
    }

    fn set_speaking(&mut self, index: usize, speaking: bool) {
        self.push(ViewEvent::Speaking(index, speaking));
    }

    fn sequence_changed(&mut self, active: bool) {
        self.push(ViewEvent::Sequence(active));
    }

    fn narration_failed(&mut self, index: usize, reason: &str) {
        self.push(ViewEvent::Failed(index, reason.to_string()));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Narration harness
// ─────────────────────────────────────────────────────────────────────────────

/// Timeline entries with predictable narration text, one per title
pub fn entries(titles: &[&str]) -> Vec<TimelineEntry> {
    titles
        .iter()
        .enumerate()
        .map(|(i, title)| TimelineEntry {
            id: format!("{}-{}", 1950 + i * 10, title.to_lowercase()),
            year: (1950 + i * 10).to_string(),
            title: title.to_string(),
            details: format!("About {}", title),
            ..Default::default()
        })
        .collect()
}

/// A running narration service over fakes: 2s clips, 500ms settle delay,
/// 1s between entries, narrator voice nova
pub struct Harness {
    pub handle: NarrationHandle,
    pub entries: Vec<TimelineEntry>,
    pub cache: Arc<MemoryAudioCache>,
    pub output: Arc<FakeOutput>,
    pub synth: Arc<FakeSynth>,
    view: RecordingView,
}

impl Harness {
    pub const CLIP_LEN: Duration = Duration::from_secs(2);

    pub fn start(entries: Vec<TimelineEntry>) -> Self {
        Self::build(entries, FakeSynth::default())
    }

    pub fn with_synth_delay(entries: Vec<TimelineEntry>, delay: Duration) -> Self {
        Self::build(entries, FakeSynth::with_delay(delay))
    }

    /// Synthesis fails for the entries at these indices
    pub fn failing(entries: Vec<TimelineEntry>, indices: &[usize]) -> Self {
        let texts: Vec<String> = indices
            .iter()
            .map(|&i| entries[i].narration_text())
            .collect();
        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        Self::build(entries, FakeSynth::failing_on(&texts))
    }

    fn build(entries: Vec<TimelineEntry>, synth: FakeSynth) -> Self {
        let cache = Arc::new(MemoryAudioCache::new(CacheBounds::default()));
        let synth = Arc::new(synth);
        let output = Arc::new(FakeOutput::new(Self::CLIP_LEN));
        let view = RecordingView::default();

        let source = SpeechSource::new(cache.clone(), Arc::new(FakeAssets::default()), synth.clone());
        let player = PlaybackController::new(output.clone(), 100);
        let (handle, commands) = create_narration_channel();
        let service = NarrationService::new(commands, source, player, view.clone(), entries.clone())
            .with_voice(Voice::Nova)
            .with_delays(Duration::from_millis(500), Duration::from_millis(1000));
        tokio::spawn(service.run());

        Self {
            handle,
            entries,
            cache,
            output,
            synth,
            view,
        }
    }

    /// Audio bytes (as text) the fake synthesizer produces for an entry
    pub fn clip(&self, index: usize, voice: Voice) -> String {
        format!("{}:{}", voice, self.entries[index].narration_text())
    }

    pub fn clips(&self) -> Vec<String> {
        self.output.clips()
    }

    pub fn view_events(&self) -> Vec<ViewEvent> {
        self.view.events()
    }

    pub async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    /// Poll until nothing is narrating
    pub async fn wait_idle(&self) {
        loop {
            let status = self.handle.status().await.unwrap();
            if status.mode == NarrationMode::Idle && !status.playing {
                return;
            }
            self.sleep_ms(50).await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP stub
// ─────────────────────────────────────────────────────────────────────────────

pub struct StubResponse {
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
}

impl StubResponse {
    pub fn new(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            content_type,
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Self::new(status, "text/plain", Vec::new())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

#[derive(Default)]
struct StubState {
    responses: Mutex<VecDeque<StubResponse>>,
    recorded: Mutex<Vec<RecordedRequest>>,
}

/// Local HTTP server answering every request with the next canned response
pub struct StubServer {
    pub url: String,
    state: Arc<StubState>,
}

impl StubServer {
    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.recorded.lock().unwrap().clone()
    }
}

async fn stub_respond(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.recorded.lock().unwrap().push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        headers,
        body: body.to_vec(),
    });
    match state.responses.lock().unwrap().pop_front() {
        Some(response) => (
            response.status,
            [(header::CONTENT_TYPE, response.content_type)],
            response.body,
        )
            .into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "no canned response left").into_response(),
    }
}

pub async fn stub_server(responses: Vec<StubResponse>) -> StubServer {
    let state = Arc::new(StubState {
        responses: Mutex::new(responses.into()),
        ..Default::default()
    });
    let router = Router::new()
        .fallback(stub_respond)
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    StubServer {
        url: format!("http://{}", addr),
        state,
    }
}
