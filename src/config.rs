use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::mapper::Locale;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(
        option_env!("MOODMIRROR_CONFIG_PATH").unwrap_or("/usr/local/etc/moodmirror/config.toml"),
    )
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path.
    pub camera: String,
    /// Directory holding the three model artifacts.
    pub model_dir: PathBuf,
    /// Delay between detection cycles.
    pub interval_ms: u64,
    /// Minimum detector confidence.
    pub score_threshold: f32,
    /// NMS overlap threshold.
    pub iou_threshold: f32,
    /// Consecutive failed cycles before the view shows a warning.
    pub failure_warn_threshold: u32,
    /// Caption language.
    pub locale: Locale,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: "/dev/video0".to_string(),
            model_dir: PathBuf::from("models"),
            interval_ms: 1000,
            score_threshold: 0.5,
            iou_threshold: 0.3,
            failure_warn_threshold: 5,
            locale: Locale::Pt,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.camera, "/dev/video0");
        assert_eq!(cfg.model_dir, PathBuf::from("models"));
        assert_eq!(cfg.interval_ms, 1000);
        assert_eq!(cfg.failure_warn_threshold, 5);
        assert_eq!(cfg.locale, Locale::Pt);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            camera = "/dev/video2"
            interval_ms = 250
            locale = "en"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.camera, "/dev/video2");
        assert_eq!(cfg.interval_ms, 250);
        assert_eq!(cfg.locale, Locale::En);
        assert_eq!(cfg.score_threshold, 0.5);
        assert_eq!(cfg.model_dir, PathBuf::from("models"));
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = Config::default();
        let raw = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.camera, cfg.camera);
        assert_eq!(parsed.locale, cfg.locale);
        assert_eq!(parsed.interval_ms, cfg.interval_ms);
    }
}
