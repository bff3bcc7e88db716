//! Workflow configuration loaded from `rescue.toml`.
//!
//! [`WorkflowConfig`] holds every tunable of the engine and the notification
//! pipeline. Keys missing from the file fall back to defaults, and a missing
//! file means "all defaults". `RESCUE_WEBHOOK_URL` overrides the webhook
//! configured in the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::state_machine::TransitionRules;

pub const DEFAULT_CONFIG_FILE: &str = "rescue.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Optimistic-concurrency retries per command before `ConcurrentModification`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds between CAS retries.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Minimum trimmed length of a status-update note.
    #[serde(default = "default_min_note_length")]
    pub min_note_length: usize,

    /// Minimum number of photos attached to a status update.
    #[serde(default = "default_min_photos")]
    pub min_photos: usize,

    /// tracing filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Settings for the post-commit notification pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Delivery attempts per notification, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delivery_delay_ms")]
    pub base_delay_ms: u64,

    /// When set, notifications are POSTed here as JSON. Otherwise they are logged.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    5
}

fn default_min_note_length() -> usize {
    10
}

fn default_min_photos() -> usize {
    2
}

fn default_log_filter() -> String {
    "rescue_workflow=info".to_string()
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delivery_delay_ms() -> u64 {
    200
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_delivery_delay_ms(),
            webhook_url: None,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            min_note_length: default_min_note_length(),
            min_photos: default_min_photos(),
            log_filter: default_log_filter(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl WorkflowConfig {
    /// Loads `rescue.toml` from the working directory, or defaults if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Loads the configuration at `path`, or defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<WorkflowConfig>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var("RESCUE_WEBHOOK_URL")
            && !url.is_empty()
        {
            config.notifications.webhook_url = Some(url);
        }

        Ok(config)
    }

    pub fn transition_rules(&self) -> TransitionRules {
        TransitionRules {
            min_note_length: self.min_note_length,
            min_photos: self.min_photos,
        }
    }
}
