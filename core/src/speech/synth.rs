//! Text-to-speech backends

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chronicle_types::{SpeechSettings, Voice};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::SpeechError;

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>, SpeechError>;
}

/// Build the configured synthesizer: a running chronicle server when
/// `proxy_url` is set, otherwise the provider API directly.
pub fn synthesizer(settings: &SpeechSettings) -> Result<Arc<dyn Synthesizer>, SpeechError> {
    if !settings.proxy_url.trim().is_empty() {
        return Ok(Arc::new(ProxySynthesizer::new(settings)?));
    }
    if settings.api_key.is_empty() {
        tracing::warn!("No speech API key configured; only cached and static audio will play");
        return Ok(Arc::new(Unconfigured));
    }
    Ok(Arc::new(OpenAiSynthesizer::new(settings)?))
}

fn build_client(timeout_secs: u64) -> Result<Client, SpeechError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(SpeechError::Request)
}

fn transport_error(err: reqwest::Error, timeout_secs: u64) -> SpeechError {
    if err.is_timeout() {
        SpeechError::Timeout { secs: timeout_secs }
    } else {
        SpeechError::Request(err)
    }
}

fn require_text(text: &str) -> Result<(), SpeechError> {
    if text.trim().is_empty() {
        return Err(SpeechError::EmptyText);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider API
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    voice: Voice,
    input: &'a str,
}

#[derive(Deserialize)]
struct ProviderError {
    error: ProviderErrorDetail,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

/// Calls `POST {base}/audio/speech` and returns the encoded audio as-is
pub struct OpenAiSynthesizer {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiSynthesizer {
    pub fn new(settings: &SpeechSettings) -> Result<Self, SpeechError> {
        if settings.api_key.is_empty() {
            return Err(SpeechError::MissingApiKey);
        }
        Ok(Self {
            client: build_client(settings.request_timeout_secs)?,
            endpoint: format!(
                "{}/audio/speech",
                settings.api_base_url.trim_end_matches('/')
            ),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            timeout_secs: settings.request_timeout_secs,
        })
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>, SpeechError> {
        require_text(text)?;
        tracing::debug!(%voice, chars = text.len(), "Requesting speech synthesis");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SpeechBody {
                model: &self.model,
                voice,
                input: text,
            })
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("provider answered {}", status));
            return Err(SpeechError::synthesis(message));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;
        Ok(audio.to_vec())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Proxy
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ProxyRequest<'a> {
    text: &'a str,
    voice: Voice,
}

#[derive(Deserialize)]
struct ProxyAudio {
    audio: String,
}

#[derive(Deserialize)]
struct ProxyError {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

/// Synthesizes through a chronicle server's `/api/speech` endpoint, which
/// answers with base64 audio
pub struct ProxySynthesizer {
    client: Client,
    endpoint: String,
    timeout_secs: u64,
}

impl ProxySynthesizer {
    pub fn new(settings: &SpeechSettings) -> Result<Self, SpeechError> {
        Ok(Self {
            client: build_client(settings.request_timeout_secs)?,
            endpoint: format!("{}/api/speech", settings.proxy_url.trim_end_matches('/')),
            timeout_secs: settings.request_timeout_secs,
        })
    }
}

#[async_trait]
impl Synthesizer for ProxySynthesizer {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>, SpeechError> {
        require_text(text)?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ProxyRequest { text, voice })
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !status.is_success() {
            let message = match serde_json::from_slice::<ProxyError>(&body) {
                Ok(ProxyError {
                    details: Some(details),
                    ..
                }) => details,
                Ok(ProxyError { error, .. }) => error,
                Err(_) => format!("speech proxy answered {}", status),
            };
            return Err(SpeechError::synthesis(message));
        }

        let payload: ProxyAudio = serde_json::from_slice(&body)
            .map_err(|e| SpeechError::synthesis(format!("malformed proxy response: {}", e)))?;
        Ok(STANDARD.decode(payload.audio)?)
    }
}

/// Stands in when neither an API key nor a proxy is configured
pub struct Unconfigured;

#[async_trait]
impl Synthesizer for Unconfigured {
    async fn synthesize(&self, _text: &str, _voice: Voice) -> Result<Vec<u8>, SpeechError> {
        Err(SpeechError::MissingApiKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubResponse, stub_server};

    fn settings(base: &str) -> SpeechSettings {
        SpeechSettings {
            api_base_url: base.to_string(),
            api_key: "sk-test".to_string(),
            request_timeout_secs: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn provider_request_carries_model_voice_and_key() {
        let server =
            stub_server(vec![StubResponse::new(200, "audio/mpeg", b"ID3audio".to_vec())]).await;
        let synth = OpenAiSynthesizer::new(&settings(&server.url)).unwrap();

        let audio = synth.synthesize("1956: Dartmouth.", Voice::Fable).await.unwrap();
        assert_eq!(audio, b"ID3audio");

        let requests = server.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/audio/speech");
        assert_eq!(
            requests[0].header("authorization").as_deref(),
            Some("Bearer sk-test")
        );
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "tts-1");
        assert_eq!(body["voice"], "fable");
        assert_eq!(body["input"], "1956: Dartmouth.");
    }

    #[tokio::test]
    async fn provider_error_message_is_surfaced() {
        let server = stub_server(vec![StubResponse::new(
            429,
            "application/json",
            br#"{"error":{"message":"Rate limit reached"}}"#.to_vec(),
        )])
        .await;
        let synth = OpenAiSynthesizer::new(&settings(&server.url)).unwrap();

        let err = synth.synthesize("text", Voice::Nova).await.unwrap_err();
        assert!(matches!(err, SpeechError::Synthesis { ref message } if message == "Rate limit reached"));
    }

    #[tokio::test]
    async fn empty_text_never_reaches_the_network() {
        let synth = OpenAiSynthesizer::new(&settings("http://127.0.0.1:9")).unwrap();
        assert!(matches!(
            synth.synthesize("   ", Voice::Nova).await,
            Err(SpeechError::EmptyText)
        ));
    }

    #[tokio::test]
    async fn proxy_decodes_base64_audio() {
        let encoded = STANDARD.encode(b"proxied");
        let server = stub_server(vec![StubResponse::new(
            200,
            "application/json",
            format!(r#"{{"audio":"{encoded}"}}"#).into_bytes(),
        )])
        .await;
        let synth = ProxySynthesizer::new(&SpeechSettings {
            proxy_url: server.url.clone(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(synth.synthesize("hello", Voice::Onyx).await.unwrap(), b"proxied");
        let requests = server.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/api/speech");
    }

    #[tokio::test]
    async fn proxy_error_prefers_details() {
        let server = stub_server(vec![StubResponse::new(
            500,
            "application/json",
            br#"{"error":"Failed to generate speech","details":"quota exceeded"}"#.to_vec(),
        )])
        .await;
        let synth = ProxySynthesizer::new(&SpeechSettings {
            proxy_url: server.url.clone(),
            ..Default::default()
        })
        .unwrap();

        let err = synth.synthesize("hello", Voice::Onyx).await.unwrap_err();
        assert_eq!(err.to_string(), "speech synthesis failed: quota exceeded");
    }

    #[tokio::test]
    async fn missing_key_without_proxy_is_unconfigured() {
        let synth = synthesizer(&SpeechSettings::default()).unwrap();
        assert!(matches!(
            synth.synthesize("hello", Voice::Nova).await,
            Err(SpeechError::MissingApiKey)
        ));
    }
}
