// Runtime settings
// Loaded from ~/.config/livesheet/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default failure token written into diagnostics and printed on failure.
pub const DEFAULT_FAILURE_MARKER: &str = "[LIVESHEET-FAILURE]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Live session discovery
    /// Override for the discovery directory (platform state dir when unset)
    #[serde(rename = "discovery.dir", skip_serializing_if = "Option::is_none")]
    pub discovery_dir: Option<PathBuf>,

    /// Environment variable holding the session token
    #[serde(rename = "discovery.tokenEnv")]
    pub token_env: String,

    #[serde(rename = "discovery.connectTimeoutSecs")]
    pub connect_timeout_secs: u64,

    #[serde(rename = "discovery.ioTimeoutSecs")]
    pub io_timeout_secs: u64,

    // Table structure inference
    #[serde(rename = "inference.scanRows")]
    pub scan_rows: usize,

    #[serde(rename = "inference.scanCols")]
    pub scan_cols: usize,

    #[serde(rename = "inference.maxHeaderRows")]
    pub max_header_rows: usize,

    /// Share of textual cells above which a row counts as header-like
    #[serde(rename = "inference.headerTextRatio")]
    pub header_text_ratio: f64,

    /// Separator for flattened multi-row header labels
    #[serde(rename = "inference.separator")]
    pub separator: String,

    // Report sheets
    /// Delete earlier sheets published under the same hint
    #[serde(rename = "report.replacePrevious")]
    pub replace_previous: bool,

    #[serde(rename = "report.autofit")]
    pub autofit: bool,

    /// Title / generated-at banner above titled report blocks
    #[serde(rename = "report.banner")]
    pub banner: bool,

    // Diagnostics
    #[serde(rename = "diagnostics.marker")]
    pub failure_marker: String,

    /// Write recorded failures into a diagnostic sheet
    #[serde(rename = "diagnostics.materialize")]
    pub materialize_errors: bool,

    #[serde(rename = "diagnostics.sheetPrefix")]
    pub error_sheet_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            discovery_dir: None,
            token_env: "LIVESHEET_SESSION_TOKEN".to_string(),
            connect_timeout_secs: 5,
            io_timeout_secs: 30,
            scan_rows: 15,
            scan_cols: 20,
            max_header_rows: 3,
            header_text_ratio: 0.8,
            separator: " - ".to_string(),
            replace_previous: true,
            autofit: true,
            banner: true,
            failure_marker: DEFAULT_FAILURE_MARKER.to_string(),
            materialize_errors: true,
            error_sheet_prefix: "Error".to_string(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("livesheet");
        config_dir.join("settings.json")
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            let settings = Self::default();
            settings.create_default_file(&path);
            return settings;
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Error loading settings.json: {}", e);
                eprintln!("Using default settings");
                Self::default()
            }
        }
    }

    /// Load settings from an explicit file. Lines starting with `//` are ignored.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        Self::parse(&contents)
    }

    /// Parse settings JSON (with `//` comment lines).
    pub fn parse(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        let settings: Settings = serde_json::from_str(&cleaned).map_err(|e| e.to_string())?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), String> {
        if self.scan_rows == 0 {
            return Err("inference.scanRows must be at least 1".to_string());
        }
        if self.max_header_rows == 0 {
            return Err("inference.maxHeaderRows must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.header_text_ratio) {
            return Err("inference.headerTextRatio must be between 0 and 1".to_string());
        }
        if self.failure_marker.trim().is_empty() {
            return Err("diagnostics.marker must not be empty".to_string());
        }
        Ok(())
    }

    /// Session token from the configured environment variable
    pub fn session_token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }

    /// Save current settings to disk
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Create default settings file with comments
    fn create_default_file(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error creating config directory: {}", e);
                return;
            }
        }

        let default_config = r#"{
    // Live session discovery
    // "discovery.dir": "/path/to/sessions",
    "discovery.tokenEnv": "LIVESHEET_SESSION_TOKEN",
    "discovery.connectTimeoutSecs": 5,
    "discovery.ioTimeoutSecs": 30,

    // Table structure inference
    "inference.scanRows": 15,
    "inference.scanCols": 20,
    "inference.maxHeaderRows": 3,
    "inference.headerTextRatio": 0.8,
    "inference.separator": " - ",

    // Report sheets
    "report.replacePrevious": true,
    "report.autofit": true,
    "report.banner": true,

    // Diagnostics (the marker is what retry loops look for)
    "diagnostics.marker": "[LIVESHEET-FAILURE]",
    "diagnostics.materialize": true,
    "diagnostics.sheetPrefix": "Error"
}
"#;

        if let Err(e) = fs::write(path, default_config) {
            eprintln!("Error writing default settings.json: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_parses_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("livesheet").join("settings.json");
        Settings::default().create_default_file(&path);

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let settings = Settings::parse(
            r#"{
    // only override the separator
    "inference.separator": " / ",
    "report.autofit": false
}"#,
        )
        .unwrap();
        assert_eq!(settings.separator, " / ");
        assert!(!settings.autofit);
        assert_eq!(settings.scan_rows, 15);
        assert_eq!(settings.failure_marker, DEFAULT_FAILURE_MARKER);
    }

    #[test]
    fn invalid_ratio_is_rejected() {
        let err = Settings::parse(r#"{"inference.headerTextRatio": 1.5}"#).unwrap_err();
        assert!(err.contains("headerTextRatio"), "{err}");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.discovery_dir = Some(PathBuf::from("/tmp/sessions"));
        settings.max_header_rows = 2;
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }
}
