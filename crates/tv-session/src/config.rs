//! Configuration loading and parsing.
//!
//! Defines the player config schema and resolves defaults.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tv_bridge_types::ChannelEntry;

use crate::retry::RetryConfig;

/// Top-level player configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct PlayerConfig {
    /// Cold-storage retry settings.
    pub retry: Option<RetryOptions>,
    /// Capability switches for the input dispatcher.
    pub features: Option<FeatureOptions>,
    /// Channel directory entries.
    pub channels: Option<Vec<ChannelConfig>>,
}

/// Retry section from TOML.
#[derive(Debug, Deserialize)]
pub struct RetryOptions {
    /// Backoff base in milliseconds (default: 2000).
    pub base_delay_ms: Option<u64>,
    /// Backoff ceiling in milliseconds (default: 18000).
    pub max_delay_ms: Option<u64>,
    /// Retries after the initial attempt (default: 5).
    pub max_retries: Option<u32>,
    /// Per-attempt readiness window in milliseconds (default: 10000).
    pub metadata_timeout_ms: Option<u64>,
}

/// Feature section from TOML.
#[derive(Debug, Deserialize)]
pub struct FeatureOptions {
    /// Channel guide style: "directory" or "jump" (default: directory).
    pub guide_style: Option<String>,
    /// Enable timer-based long-press handling (default: false).
    pub long_press: Option<bool>,
    /// Require a second Back press to end the session (default: true).
    pub double_back_exit: Option<bool>,
}

/// Channel entry from TOML.
#[derive(Debug, Deserialize)]
pub struct ChannelConfig {
    /// Stable channel id.
    pub id: String,
    /// Channel number shown in the directory.
    pub number: Option<u32>,
    /// Display name (defaults to id).
    pub name: Option<String>,
}

/// Which channel guide variant the Up key opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuideStyle {
    /// Searchable channel directory.
    Directory,
    /// Numeric channel-jump with prefix auto-commit.
    NumericJump,
}

/// Capability switches distinguishing the UI variants served by one
/// controller.
#[derive(Clone, Copy, Debug)]
pub struct SessionFeatures {
    pub guide_style: GuideStyle,
    pub long_press: bool,
    pub double_back_exit: bool,
}

impl Default for SessionFeatures {
    fn default() -> Self {
        Self {
            guide_style: GuideStyle::Directory,
            long_press: false,
            double_back_exit: true,
        }
    }
}

impl PlayerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<PlayerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Resolve retry settings onto defaults.
pub(crate) fn retry_from_config(cfg: &PlayerConfig) -> RetryConfig {
    let defaults = RetryConfig::default();
    let Some(opts) = cfg.retry.as_ref() else {
        return defaults;
    };
    RetryConfig {
        base_delay_ms: opts.base_delay_ms.unwrap_or(defaults.base_delay_ms),
        max_delay_ms: opts.max_delay_ms.unwrap_or(defaults.max_delay_ms),
        max_retries: opts.max_retries.unwrap_or(defaults.max_retries),
        metadata_timeout_ms: opts
            .metadata_timeout_ms
            .unwrap_or(defaults.metadata_timeout_ms),
    }
}

/// Resolve feature switches onto defaults.
pub(crate) fn features_from_config(cfg: &PlayerConfig) -> Result<SessionFeatures> {
    let defaults = SessionFeatures::default();
    let Some(opts) = cfg.features.as_ref() else {
        return Ok(defaults);
    };
    let guide_style = match opts.guide_style.as_deref() {
        None => defaults.guide_style,
        Some("directory") => GuideStyle::Directory,
        Some("jump") => GuideStyle::NumericJump,
        Some(other) => bail!("unknown guide_style {other:?} (expected \"directory\" or \"jump\")"),
    };
    Ok(SessionFeatures {
        guide_style,
        long_press: opts.long_press.unwrap_or(defaults.long_press),
        double_back_exit: opts.double_back_exit.unwrap_or(defaults.double_back_exit),
    })
}

/// Build the channel directory from config entries.
pub(crate) fn channels_from_config(cfg: &PlayerConfig) -> Vec<ChannelEntry> {
    cfg.channels
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|c| ChannelEntry {
            id: c.id.clone(),
            number: c.number.unwrap_or(0),
            name: c.name.clone().unwrap_or_else(|| c.id.clone()),
            is_current: false,
        })
        .collect()
}
