//! Widget configuration
//!
//! Values come from the process environment, falling back to defaults. The
//! API base URL is resolved from a runtime-injected value first, then a
//! default baked in at build time, then the local development server.

use crate::transport::sanitize_text;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const LOCAL_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 2000;
pub const DEFAULT_MIN_SELECTION_LENGTH: usize = 10;
pub const DEFAULT_MAX_SELECTION_LENGTH: usize = 500;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Base URL baked in at build time
const BUILD_API_URL: Option<&str> = option_env!("DOCS_CHAT_DEFAULT_API_URL");

/// Presentation visibility of the widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Hidden,
    /// Collapsed to its launcher button
    #[default]
    Minimized,
    Expanded,
}

impl Visibility {
    /// Launcher behavior: open when closed, collapse when open
    pub fn toggled(self) -> Self {
        match self {
            Visibility::Hidden | Visibility::Minimized => Visibility::Expanded,
            Visibility::Expanded => Visibility::Minimized,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Visibility::Hidden => "hidden",
            Visibility::Minimized => "minimized",
            Visibility::Expanded => "expanded",
        };
        f.write_str(name)
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hidden" => Ok(Visibility::Hidden),
            "minimized" => Ok(Visibility::Minimized),
            "expanded" => Ok(Visibility::Expanded),
            other => Err(format!("unknown visibility '{other}'")),
        }
    }
}

/// Configuration for the chat widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Base URL of the chat service, without a trailing slash
    pub api_url: String,
    /// Base URL of the documentation site, for resolving citation locators
    pub docs_url: Option<String>,
    pub max_message_length: usize,
    pub min_selection_length: usize,
    pub max_selection_length: usize,
    pub initial_visibility: Visibility,
    pub connect_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: resolve_api_url(None, BUILD_API_URL),
            docs_url: None,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            min_selection_length: DEFAULT_MIN_SELECTION_LENGTH,
            max_selection_length: DEFAULT_MAX_SELECTION_LENGTH,
            initial_visibility: Visibility::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_url: resolve_api_url(lookup("DOCS_CHAT_API_URL").as_deref(), BUILD_API_URL),
            docs_url: lookup("DOCS_CHAT_DOCS_URL").filter(|url| !url.trim().is_empty()),
            max_message_length: parse_or(
                &lookup,
                "DOCS_CHAT_MAX_MESSAGE_LENGTH",
                defaults.max_message_length,
            ),
            min_selection_length: parse_or(
                &lookup,
                "DOCS_CHAT_MIN_SELECTION",
                defaults.min_selection_length,
            ),
            max_selection_length: parse_or(
                &lookup,
                "DOCS_CHAT_MAX_SELECTION",
                defaults.max_selection_length,
            ),
            initial_visibility: parse_or(
                &lookup,
                "DOCS_CHAT_VISIBILITY",
                defaults.initial_visibility,
            ),
            connect_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DOCS_CHAT_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )),
        }
    }

    pub fn chat_endpoint(&self) -> String {
        format!("{}/api/chat", self.api_url)
    }

    pub fn health_endpoint(&self) -> String {
        format!("{}/api/health", self.api_url)
    }

    /// Accept a text selection as conversation context if its length is
    /// within the configured bounds
    pub fn accept_selection(&self, raw: &str) -> Option<String> {
        let text = sanitize_text(raw);
        let length = text.chars().count();
        (self.min_selection_length..=self.max_selection_length)
            .contains(&length)
            .then_some(text)
    }
}

/// Pick the first non-empty candidate URL, trimming trailing slashes
pub fn resolve_api_url(injected: Option<&str>, build_default: Option<&str>) -> String {
    [injected, build_default]
        .into_iter()
        .flatten()
        .map(|url| url.trim().trim_end_matches('/'))
        .find(|url| !url.is_empty())
        .unwrap_or(LOCAL_API_URL)
        .to_string()
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(
                key,
                value = %raw,
                default = %default,
                "Invalid configuration value, using default"
            );
            default
        }),
        None => default,
    }
}
