use std::path::Path;
use std::time::Duration;

use chronicle_core::config::AppConfig;
use chronicle_core::speech::{DirAssets, synthesizer};
use chronicle_core::{AppConfigExt, AudioGenerator};
use chronicle_types::{LearnMoreLink, TimelineDocument, TimelineEntry, Voice};

use crate::context::CliContext;
use crate::describe;

const MASK: &str = "********";

pub async fn list(ctx: &CliContext) -> Result<(), String> {
    let entries = ctx.entries().await?;
    print!("{}", format_entries(&entries));
    Ok(())
}

/// One line per entry, numbered from 1 in display order
pub fn format_entries(entries: &[TimelineEntry]) -> String {
    if entries.is_empty() {
        return "Timeline is empty\n".to_string();
    }
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{:>3}. {:<8} {}  [{}]\n", i + 1, e.year, e.title, e.id))
        .collect()
}

/// Print the stored document as pretty JSON on stdout
pub async fn export(ctx: &CliContext) -> Result<(), String> {
    let document = ctx.store.document().await.map_err(|e| describe(&e))?;
    let json = serde_json::to_string_pretty(&document).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

/// Replace the stored document with the one in `path`
pub async fn import(ctx: &CliContext, path: &Path, password: Option<String>) -> Result<(), String> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let document: TimelineDocument = serde_json::from_str(&raw)
        .map_err(|e| format!("{} is not a timeline document: {}", path.display(), e))?;

    let password = match password {
        Some(p) => p,
        None => ctx.default_password().await,
    };
    let saved = ctx
        .store
        .save(document, &password)
        .await
        .map_err(|e| describe(&e))?;

    println!(
        "Imported {} entries (last updated {})",
        saved.timeline.len(),
        saved.metadata.last_updated
    );
    Ok(())
}

pub async fn create_entry(
    ctx: &CliContext,
    entry: TimelineEntry,
    password: Option<String>,
) -> Result<(), String> {
    let password = match password {
        Some(p) => p,
        None => ctx.default_password().await,
    };
    let created = ctx
        .store
        .create_entry(entry, &password)
        .await
        .map_err(|e| describe(&e))?;
    println!("Created {}", created.id);
    Ok(())
}

/// Parse a `--link` argument of the form `text=url`
pub fn parse_link(arg: &str) -> Result<LearnMoreLink, String> {
    let (text, url) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected text=url, got '{arg}'"))?;
    let (text, url) = (text.trim(), url.trim());
    if text.is_empty() || url.is_empty() {
        return Err(format!("expected text=url, got '{arg}'"));
    }
    Ok(LearnMoreLink {
        text: text.to_string(),
        url: url.to_string(),
    })
}

/// Render static narration audio for every entry into the asset directory
pub async fn generate_audio(ctx: &CliContext, voices: Vec<Voice>) -> Result<(), String> {
    let config = ctx.config.read().await.clone();
    let speech = &config.speech;

    let root = speech.asset_root.trim();
    if root.is_empty() || root.starts_with("http://") || root.starts_with("https://") {
        return Err(format!(
            "speech.asset_root must be a local directory to generate audio (got '{root}')"
        ));
    }
    if speech.api_key.is_empty() && speech.proxy_url.trim().is_empty() {
        return Err("OPENAI_API_KEY is not set and no speech proxy is configured".to_string());
    }

    let voices = if voices.is_empty() {
        speech.generated_voices.clone()
    } else {
        voices
    };
    let synth = synthesizer(speech).map_err(|e| describe(&e))?;
    let entries = ctx.entries().await?;

    tracing::info!(
        entries = entries.len(),
        voices = ?voices,
        root,
        "Generating narration audio"
    );
    let generator = AudioGenerator::new(
        synth,
        DirAssets::new(root, &speech.asset_extension),
        voices,
    )
    .with_delay(Duration::from_millis(speech.generation_delay_ms));

    let report = generator
        .generate(&entries)
        .await
        .map_err(|e| describe(&e))?;
    println!(
        "Generated {} files, {} entries unchanged, {} errors",
        report.generated, report.unchanged, report.errors
    );
    Ok(())
}

/// Print the effective configuration with secrets masked, or only its path
pub fn show_config(config: &AppConfig, path_only: bool) -> Result<(), String> {
    if path_only {
        let path = AppConfig::config_path().ok_or("no configuration directory on this platform")?;
        println!("{}", path.display());
        return Ok(());
    }
    println!("{:#?}", masked(config));
    Ok(())
}

fn masked(config: &AppConfig) -> AppConfig {
    let mut shown = config.clone();
    for secret in [
        &mut shown.server.admin_password,
        &mut shown.speech.api_key,
        &mut shown.storage.blob_token,
    ] {
        if !secret.is_empty() {
            *secret = MASK.to_string();
        }
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::*;

    fn entry(year: &str, title: &str) -> TimelineEntry {
        TimelineEntry {
            year: year.to_string(),
            title: title.to_string(),
            details: format!("About {title}"),
            ..Default::default()
        }
    }

    #[test]
    fn entries_are_numbered_from_one() {
        let mut deep_blue = entry("1997", "Deep Blue");
        deep_blue.id = "1997-deep-blue".to_string();
        let text = format_entries(&[deep_blue]);
        assert!(text.starts_with("  1. 1997"));
        assert!(text.contains("Deep Blue  [1997-deep-blue]"));
        assert_eq!(format_entries(&[]), "Timeline is empty\n");
    }

    #[test]
    fn link_argument_splits_on_first_equals() {
        let link = parse_link("Paper=https://example.com/?a=b").unwrap();
        assert_eq!(link.text, "Paper");
        assert_eq!(link.url, "https://example.com/?a=b");
        assert!(parse_link("no separator").is_err());
        assert!(parse_link("=https://example.com").is_err());
    }

    #[test]
    fn secrets_are_masked() {
        let mut config = AppConfig::default();
        config.speech.api_key = "sk-live".to_string();
        let shown = masked(&config);
        assert_eq!(shown.speech.api_key, MASK);
        assert_eq!(shown.server.admin_password, MASK);
        assert_eq!(shown.storage.blob_token, "");
    }

    #[tokio::test]
    async fn import_replaces_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = file_context(dir.path());

        let mut document = TimelineDocument::default();
        document.timeline.push(entry("2012", "AlexNet"));
        document.timeline.push(entry("1950", "Turing Test"));
        let file = dir.path().join("import.json");
        std::fs::write(&file, serde_json::to_string(&document).unwrap()).unwrap();

        import(&ctx, &file, Some(PASSWORD.to_string())).await.unwrap();
        let ids: Vec<String> = ctx.entries().await.unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["1950-turing-test", "2012-alexnet"]);
    }

    #[tokio::test]
    async fn writes_with_a_wrong_password_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = file_context(dir.path());

        let err = create_entry(&ctx, entry("1956", "Dartmouth"), Some("guess".to_string()))
            .await
            .unwrap_err();
        assert!(err.contains("credential"));
        assert!(ctx.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_defaults_to_configured_password_and_detects_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = file_context(dir.path());

        create_entry(&ctx, entry("1956", "Dartmouth"), None).await.unwrap();
        let err = create_entry(&ctx, entry("1956", "Dartmouth"), None)
            .await
            .unwrap_err();
        assert!(err.contains("1956-dartmouth"));
    }

    #[tokio::test]
    async fn generation_needs_a_provider() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = file_context(dir.path());
        let err = generate_audio(&ctx, vec![Voice::Nova]).await.unwrap_err();
        assert!(err.contains("OPENAI_API_KEY"));
    }
}
