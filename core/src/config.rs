use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use log::debug;
use serde::Deserialize;

use crate::error::{MediaError, Result};
use crate::media::{MediaKind, extract_video_id};
use crate::session::SessionOptions;
use crate::{DEFAULT_POLL_INTERVAL, DEFAULT_VOLUME};

/// Host widget configuration.
///
/// Mirrors the widget attributes (`type`, `src`, `video-id`, `autoplay`,
/// `volume`) and can also be read from JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    #[serde(alias = "type")]
    pub kind: MediaKind,
    #[serde(alias = "source")]
    pub src: Option<String>,
    #[serde(rename = "video-id", alias = "video_id")]
    pub video_id: Option<String>,
    pub autoplay: bool,
    pub volume: u8,
    pub poll_interval_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            kind: MediaKind::default(),
            src: None,
            video_id: None,
            autoplay: false,
            volume: DEFAULT_VOLUME,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl HostConfig {
    pub fn new(kind: MediaKind, source: impl Into<String>) -> Self {
        let mut config = Self {
            kind,
            ..Self::default()
        };
        if kind == MediaKind::Embedded {
            config.video_id = Some(source.into());
        } else {
            config.src = Some(source.into());
        }
        config
    }

    /// Build from attribute name/value pairs, in order.
    pub fn from_attributes<I, K, V>(attributes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (name, value) in attributes {
            config.set_attribute(name.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MediaError::InvalidConfig(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Apply one attribute. Returns whether the value changed.
    ///
    /// Unknown attributes are ignored.
    pub fn set_attribute(&mut self, name: &str, value: &str) -> Result<bool> {
        let before = self.clone();
        let value = value.trim();
        match name {
            "type" => self.kind = value.parse()?,
            "src" => self.src = non_empty(value),
            "video-id" => self.video_id = non_empty(value),
            "autoplay" => self.autoplay = parse_flag(value)?,
            "volume" => {
                let level: i64 = value
                    .parse()
                    .map_err(|_| MediaError::InvalidConfig(format!("volume '{}'", value)))?;
                self.volume = level.clamp(0, 100) as u8;
            }
            "poll-interval" => {
                self.poll_interval_ms = value
                    .parse()
                    .map_err(|_| MediaError::InvalidConfig(format!("poll-interval '{}'", value)))?;
            }
            other => debug!("Ignoring unknown attribute '{}'", other),
        }
        Ok(*self != before)
    }

    /// Source to bind for the configured kind. Embedded sources come from
    /// `video-id`, falling back to `src`, and are reduced to a bare id.
    pub fn source(&self) -> Result<String> {
        let raw = match self.kind {
            MediaKind::Embedded => self.video_id.as_deref().or(self.src.as_deref()),
            MediaKind::Audio | MediaKind::Video => self.src.as_deref(),
        };
        let source = raw.map(str::trim).filter(|s| !s.is_empty());
        match (self.kind, source) {
            (_, None) => Err(MediaError::SourceMissing),
            (MediaKind::Embedded, Some(id)) => Ok(extract_video_id(id)),
            (_, Some(url)) => Ok(url.to_string()),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            autoplay: self.autoplay,
            volume: self.volume.min(100),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Boolean attributes are on when present, unless spelled "false".
fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "" | "true" | "autoplay" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(MediaError::InvalidConfig(format!("flag '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_widget() {
        let config = HostConfig::default();
        assert_eq!(config.kind, MediaKind::Audio);
        assert_eq!(config.volume, 70);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.source(), Err(MediaError::SourceMissing));
    }

    #[test]
    fn attributes_build_an_embedded_config() {
        let config = HostConfig::from_attributes([
            ("type", "youtube"),
            ("video-id", "https://youtu.be/abc123"),
            ("autoplay", ""),
            ("volume", "140"),
        ])
        .unwrap();
        assert_eq!(config.kind, MediaKind::Embedded);
        assert_eq!(config.source().unwrap(), "abc123");
        assert!(config.autoplay);
        assert_eq!(config.volume, 100);
    }

    #[test]
    fn embedded_source_falls_back_to_src() {
        let config =
            HostConfig::from_attributes([("type", "youtube"), ("src", "abc123")]).unwrap();
        assert_eq!(config.source().unwrap(), "abc123");
    }

    #[test]
    fn invalid_attributes_are_reported() {
        assert_eq!(
            HostConfig::from_attributes([("type", "vinyl")]),
            Err(MediaError::UnknownKind("vinyl".to_string()))
        );
        assert!(matches!(
            HostConfig::from_attributes([("volume", "loud")]),
            Err(MediaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn set_attribute_reports_changes() {
        let mut config = HostConfig::new(MediaKind::Video, "a.mp4");
        assert!(config.set_attribute("src", "b.mp4").unwrap());
        assert!(!config.set_attribute("src", "b.mp4").unwrap());
        assert!(!config.set_attribute("data-theme", "dark").unwrap());
    }

    #[test]
    fn reads_json() {
        let config = HostConfig::from_json_str(
            r#"{ "kind": "video", "source": "clip.mp4", "autoplay": true, "poll_interval_ms": 250 }"#,
        )
        .unwrap();
        assert_eq!(config.kind, MediaKind::Video);
        assert_eq!(config.source().unwrap(), "clip.mp4");
        let options = config.session_options();
        assert!(options.autoplay);
        assert_eq!(options.volume, 70);
        assert_eq!(options.poll_interval, Duration::from_millis(250));
    }
}
