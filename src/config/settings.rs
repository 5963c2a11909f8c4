// * Engine Settings
// * JSON file with serde defaults, plus TRANSCRIPT_FLOW_* environment overrides

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::constants::{
    DEFAULT_BIND_ADDR, NAVIGATIONS_PER_SECOND, NAVIGATION_TIMEOUT_MS, POLL_INTERVAL_MS,
    SETTLE_DELAY_MS, SETTLE_TIMEOUT_MS, VIEWPORT_HEIGHT, VIEWPORT_WIDTH,
};
use crate::persistence::schema::SourceLink;

pub const ENV_BIND: &str = "TRANSCRIPT_FLOW_BIND";
pub const ENV_CHROME: &str = "TRANSCRIPT_FLOW_CHROME";
pub const ENV_STORE: &str = "TRANSCRIPT_FLOW_STORE";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime configuration for the ingestion engine and its HTTP surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub navigation_timeout_ms: u64,
    pub settle_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub navigations_per_second: u32,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Explicit Chrome binary; the bundled browser directory is probed when unset
    pub browser_executable: Option<PathBuf>,
    pub bind_addr: String,
    /// JSON snapshot of the record store, loaded at startup and saved after batches
    pub store_path: Option<PathBuf>,
    pub sources: Vec<SourceLink>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: NAVIGATION_TIMEOUT_MS,
            settle_timeout_ms: SETTLE_TIMEOUT_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            settle_delay_ms: SETTLE_DELAY_MS,
            navigations_per_second: NAVIGATIONS_PER_SECOND,
            headless: true,
            viewport_width: VIEWPORT_WIDTH,
            viewport_height: VIEWPORT_HEIGHT,
            browser_executable: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            store_path: None,
            sources: default_sources(),
        }
    }
}

impl EngineSettings {
    /// Loads settings from an optional JSON file, then applies environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!(path = %path.display(), "Loaded engine settings");
                Self::from_json(&raw)?
            }
            None => Self::default(),
        };

        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_json(raw: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(raw)?)
    }

    // * Lookup is injected so overrides can be exercised without touching process env
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(ENV_BIND).filter(|v| !v.trim().is_empty()) {
            self.bind_addr = bind;
        }
        if let Some(chrome) = lookup(ENV_CHROME).filter(|v| !v.trim().is_empty()) {
            self.browser_executable = Some(PathBuf::from(chrome));
        }
        if let Some(store) = lookup(ENV_STORE).filter(|v| !v.trim().is_empty()) {
            self.store_path = Some(PathBuf::from(store));
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Resolves the Chrome binary: explicit setting, then bundled browser, then system default
    pub fn resolve_browser_executable(&self) -> Option<PathBuf> {
        if let Some(path) = &self.browser_executable {
            return Some(path.clone());
        }

        let base = std::env::current_dir().ok()?;
        let bundled = bundled_browser_path(&base);
        if bundled.exists() {
            info!(path = %bundled.display(), "Using bundled browser");
            Some(bundled)
        } else {
            warn!(
                path = %bundled.display(),
                "Bundled browser not found, falling back to system default"
            );
            None
        }
    }
}

// * browsers/<os>/chrome-<os>/chrome[.exe] relative to the working directory
pub fn bundled_browser_path(base: &Path) -> PathBuf {
    if cfg!(windows) {
        base.join("browsers")
            .join("windows")
            .join("chrome-win")
            .join("chrome.exe")
    } else {
        base.join("browsers")
            .join("linux")
            .join("chrome-linux")
            .join("chrome")
    }
}

/// Result links seeded into an empty registry
pub fn default_sources() -> Vec<SourceLink> {
    [
        ("5th Sem (22-26)", "https://results.beup.ac.in/ResultsBTech5thSem2024_B2022Pub.aspx?Sem=V&RegNo={REG}"),
        ("4th Sem (22-26)", "https://results.beup.ac.in/ResultsBTech4thSem2024_B2022Pub.aspx?Sem=IV&RegNo={REG}"),
        ("3rd Sem (22-26)", "https://results.beup.ac.in/ResultsBTech3rdSem2023_B2022Pub.aspx?Sem=III&RegNo={REG}"),
        ("2nd Sem (22-26)", "https://results.beup.ac.in/ResultsBTech2ndSem2023_B2022Pub.aspx?Sem=II&RegNo={REG}"),
        ("1st Sem (22-26)", "https://results.beup.ac.in/ResultsBTech1stSem2022_B2022Pub.aspx?Sem=I&RegNo={REG}"),
        ("3rd Sem (23-27)", "https://beu-bih.ac.in/result-three?name=B.Tech.%203rd%20Semester%20Examination,%202024&semester=III&session=2024&regNo={REG}&exam_held=July%2F2025"),
        ("2nd Sem (23-27)", "https://results.beup.ac.in/ResultsBTech2ndSem2024_B2023Pub.aspx?Sem=II&RegNo={REG}"),
        ("1st Sem (23-27)", "https://results.beup.ac.in/ResultsBTech1stSem2023_B2023Pub.aspx?Sem=I&RegNo={REG}"),
        ("1st Sem (24-28)", "https://results.beup.ac.in/ResultsBTech1stSem2024_B2024Pub.aspx?Sem=I&RegNo={REG}"),
    ]
    .into_iter()
    .map(|(key, template)| SourceLink::new(key, template, true))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_constants() {
        let settings = EngineSettings::default();
        assert_eq!(settings.navigation_timeout(), Duration::from_millis(NAVIGATION_TIMEOUT_MS));
        assert_eq!(settings.poll_interval_ms, POLL_INTERVAL_MS);
        assert!(settings.headless);
        assert!(!settings.sources.is_empty());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings =
            EngineSettings::from_json(r#"{"navigation_timeout_ms": 1000, "sources": []}"#).unwrap();
        assert_eq!(settings.navigation_timeout_ms, 1000);
        assert_eq!(settings.settle_timeout_ms, SETTLE_TIMEOUT_MS);
        assert!(settings.sources.is_empty());
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(matches!(
            EngineSettings::from_json("{not json"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_BIND, "127.0.0.1:9999"),
            (ENV_CHROME, "/opt/chrome/chrome"),
            (ENV_STORE, ""),
        ]
        .into();

        let mut settings = EngineSettings::default();
        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.bind_addr, "127.0.0.1:9999");
        assert_eq!(
            settings.browser_executable,
            Some(PathBuf::from("/opt/chrome/chrome"))
        );
        // * Blank values do not override
        assert_eq!(settings.store_path, None);
    }

    #[test]
    fn test_explicit_executable_wins() {
        let settings = EngineSettings {
            browser_executable: Some(PathBuf::from("/usr/bin/chromium")),
            ..Default::default()
        };
        assert_eq!(
            settings.resolve_browser_executable(),
            Some(PathBuf::from("/usr/bin/chromium"))
        );
    }

    #[test]
    fn test_bundled_path_layout() {
        let path = bundled_browser_path(Path::new("/srv/app"));
        assert!(path.starts_with("/srv/app/browsers"));
    }

    #[test]
    fn test_default_sources_carry_token() {
        assert!(default_sources()
            .iter()
            .all(|link| link.url_template.contains("{REG}") && link.active));
    }
}
