use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the analysis endpoint.
pub const ENDPOINT_ENV: &str = "ANALYZE_IMAGE_API_URL";

pub const DEFAULT_ENDPOINT: &str =
    "https://young-rapping-australia.mastra.cloud/api/agents/plate-reader-agent/generate";

pub const DEFAULT_INSTRUCTION: &str = "Return a json object with the list of : vegetables, meats, beans, fruits, others. Use the image to identify the items.";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("Invalid {name}: {value} (expected a factor in (0, 1])")]
    InvalidQuality { name: &'static str, value: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub endpoint: String,
    /// Sent as a Bearer token when non-empty.
    pub api_key: String,
    pub instruction: String,
    /// Compression factor applied when the photo is taken.
    pub capture_quality: f32,
    /// Compression factor applied again right before upload.
    pub compress_quality: f32,
    pub allows_editing: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            api_key: String::new(),
            instruction: DEFAULT_INSTRUCTION.into(),
            capture_quality: 0.5,
            compress_quality: 0.5,
            allows_editing: true,
        }
    }
}

/// Default location of the settings file: `<config dir>/plate-reader/settings.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("plate-reader").join("settings.toml"))
}

/// Map a compression factor in (0, 1] onto a JPEG quality in 1..=100.
pub fn jpeg_quality(factor: f32) -> u8 {
    (factor * 100.0).round().clamp(1.0, 100.0) as u8
}

impl Settings {
    /// Load settings from `path` (or the default location), then apply the
    /// endpoint override from the environment. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        let mut settings = match path {
            Some(ref p) if p.exists() => {
                let content = fs::read_to_string(p)?;
                let parsed: Settings = toml::from_str(&content)?;
                log::info!("Settings loaded from {}", p.display());
                parsed
            }
            _ => Self::default(),
        };
        settings.apply_endpoint_override(std::env::var(ENDPOINT_ENV).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Blank overrides are ignored.
    pub fn apply_endpoint_override(&mut self, value: Option<String>) {
        if let Some(endpoint) = value.filter(|v| !v.trim().is_empty()) {
            log::debug!("Endpoint overridden from {}", ENDPOINT_ENV);
            self.endpoint = endpoint.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let parsed =
            url::Url::parse(&self.endpoint).map_err(|e| SettingsError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SettingsError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        for (name, value) in [
            ("captureQuality", self.capture_quality),
            ("compressQuality", self.compress_quality),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(SettingsError::InvalidQuality { name, value });
            }
        }
        Ok(())
    }
}
