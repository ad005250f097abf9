use std::path::Path;

use anyhow::{Context, Result};

use shortsmith::captions::named_color_hex;
use shortsmith::{align, CaptionStyle, Config, Transcript, TranscriptWord};

pub fn cmd_align(
    config_path: Option<&Path>,
    transcript: &Path,
    delay: Option<f64>,
    color: &str,
    font: &str,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let content = std::fs::read_to_string(transcript)
        .with_context(|| format!("failed to read {}", transcript.display()))?;
    let words = parse_words(&content)
        .with_context(|| format!("invalid transcript in {}", transcript.display()))?;

    anyhow::ensure!(
        named_color_hex(color).is_some(),
        "unknown caption color '{color}'"
    );
    let style = CaptionStyle {
        color: color.to_string(),
        font: font.to_string(),
        ..Default::default()
    };

    let intervals = align(&words, delay.unwrap_or(config.captions.delay_secs), &style);
    println!("{}", serde_json::to_string_pretty(&intervals)?);
    Ok(())
}

/// Accept a full transcript object or a bare array of words
fn parse_words(content: &str) -> Result<Vec<TranscriptWord>> {
    if content.trim_start().starts_with('[') {
        Ok(serde_json::from_str(content)?)
    } else {
        let transcript: Transcript = serde_json::from_str(content)?;
        Ok(transcript.words)
    }
}
