//! Non-secret settings shared by the CLI and the desktop UI.
//!
//! Stored as `key=value` lines in `~/.feedback-backlog.conf`. The API key is
//! not a setting and is never written here.

use crate::prompts::SYSTEM_PROMPT;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    pub model: String,
    /// Groups analysed concurrently; 1 keeps calls strictly sequential
    pub workers: usize,
    /// System message sent with every completion request
    pub system_prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            workers: 1,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Settings {
    /// `~/.feedback-backlog.conf`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".feedback-backlog.conf"))
    }

    /// Load from `path`, falling back to defaults for a missing file or key.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = Self::default();
        if !path.exists() {
            return Ok(settings);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                log::warn!("Ignoring malformed settings line: {}", line);
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "base_url" if !value.is_empty() => settings.base_url = value.to_string(),
                "model" if !value.is_empty() => settings.model = value.to_string(),
                "system_prompt" if !value.is_empty() => {
                    settings.system_prompt = unescape_line(value)
                }
                "workers" => match value.parse::<usize>() {
                    Ok(n) if n > 0 => settings.workers = n,
                    _ => log::warn!("Ignoring invalid workers value '{}'", value),
                },
                other => log::debug!("Ignoring settings key '{}'", other),
            }
        }
        Ok(settings)
    }

    /// Load from [`Settings::default_path`], or defaults if there is none.
    pub fn load_default() -> Self {
        match Self::default_path() {
            Some(path) => Self::load(&path).unwrap_or_else(|e| {
                log::warn!("{:#}", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = format!(
            "base_url={}\nmodel={}\nworkers={}\nsystem_prompt={}\n",
            self.base_url,
            self.model,
            self.workers,
            escape_line(&self.system_prompt)
        );
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }
}

/// Fold a multi-line value onto one line (`\\` and `\n` escapes).
fn escape_line(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn unescape_line(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
