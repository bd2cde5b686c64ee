//! Signer configuration.
//!
//! Values come from [`SignerConfig::default`], a JSON file, environment variables, or the
//! `with_*` builders, in whatever combination the caller needs.

use compositor::CompositeOptions;
use directories::ProjectDirs;
use pdf_engine::LoadOptions;
use serde::{Deserialize, Serialize};
use signature_raster::{InkColor, TextStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use viewer_core::CoordinatorConfig;

const CONFIG_SCHEMA_VERSION: u32 = 1;
const CONFIG_FILE_NAME: &str = "config.json";

pub const ENV_DISPLAY_SCALE: &str = "PDF_SIGNER_DISPLAY_SCALE";
pub const ENV_MIN_BOX_PX: &str = "PDF_SIGNER_MIN_BOX_PX";
pub const ENV_RENDER_TIMEOUT_MS: &str = "PDF_SIGNER_RENDER_TIMEOUT_MS";
pub const ENV_OVERSAMPLE: &str = "PDF_SIGNER_OVERSAMPLE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("unable to resolve the configuration directory")]
    NoConfigDirectory,
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ConfigError {
    fn invalid(key: &str, value: impl ToString) -> Self {
        Self::InvalidValue { key: key.to_owned(), value: value.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Pixels per PDF point used when rendering pages and capturing placements.
    pub display_scale: f32,
    /// Selection boxes must be larger than this on both axes.
    pub min_box_px: f32,
    #[serde(rename = "render_timeout_ms", with = "duration_ms")]
    pub render_timeout: Duration,
    /// Supersampling factor for generated text images.
    pub oversample: u32,
    pub date_font_size: f32,
    /// Gap between a placement's bottom edge and its date stamp baseline, in points.
    pub date_offset: f32,
    pub ignore_encryption: bool,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            display_scale: doc_model::DEFAULT_DISPLAY_SCALE,
            min_box_px: viewer_core::DEFAULT_MIN_BOX_PX,
            render_timeout: viewer_core::DEFAULT_RENDER_TIMEOUT,
            oversample: signature_raster::DEFAULT_OVERSAMPLE,
            date_font_size: 8.0,
            date_offset: 12.0,
            ignore_encryption: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigEnvelope {
    version: u32,
    config: SignerConfig,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| ConfigError::invalid(key, value)),
        Err(_) => Ok(None),
    }
}

impl SignerConfig {
    pub fn with_display_scale(mut self, scale: f32) -> Self {
        self.display_scale = scale;
        self
    }

    pub fn with_min_box_px(mut self, px: f32) -> Self {
        self.min_box_px = px;
        self
    }

    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn with_oversample(mut self, factor: u32) -> Self {
        self.oversample = factor;
        self
    }

    pub fn with_ignore_encryption(mut self, ignore: bool) -> Self {
        self.ignore_encryption = ignore;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.display_scale.is_finite() || self.display_scale <= 0.0 {
            return Err(ConfigError::invalid("display_scale", self.display_scale));
        }
        if !self.min_box_px.is_finite() || self.min_box_px < 0.0 {
            return Err(ConfigError::invalid("min_box_px", self.min_box_px));
        }
        if self.render_timeout.is_zero() {
            return Err(ConfigError::invalid("render_timeout_ms", 0));
        }
        if self.oversample == 0 {
            return Err(ConfigError::invalid("oversample", 0));
        }
        if !self.date_font_size.is_finite() || self.date_font_size <= 0.0 {
            return Err(ConfigError::invalid("date_font_size", self.date_font_size));
        }
        if !self.date_offset.is_finite() {
            return Err(ConfigError::invalid("date_offset", self.date_offset));
        }
        Ok(())
    }

    /// Defaults overridden by any `PDF_SIGNER_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_env()
    }

    /// Applies `PDF_SIGNER_*` overrides on top of `self`.
    pub fn merge_env(mut self) -> Result<Self, ConfigError> {
        if let Some(scale) = parse_env::<f32>(ENV_DISPLAY_SCALE)? {
            self.display_scale = scale;
        }
        if let Some(px) = parse_env::<f32>(ENV_MIN_BOX_PX)? {
            self.min_box_px = px;
        }
        if let Some(ms) = parse_env::<u64>(ENV_RENDER_TIMEOUT_MS)? {
            self.render_timeout = Duration::from_millis(ms);
        }
        if let Some(factor) = parse_env::<u32>(ENV_OVERSAMPLE)? {
            self.oversample = factor;
        }

        self.validate()?;
        Ok(self)
    }

    /// `<platform config dir>/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs =
            ProjectDirs::from("dev", "PdfSigner", "pdf-signer").ok_or(ConfigError::NoConfigDirectory)?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Reads a saved config. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let envelope: ConfigEnvelope = serde_json::from_slice(&fs::read(path)?)?;
        if envelope.version != CONFIG_SCHEMA_VERSION {
            return Err(ConfigError::UnsupportedVersion(envelope.version));
        }

        envelope.config.validate()?;
        Ok(envelope.config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let envelope = ConfigEnvelope { version: CONFIG_SCHEMA_VERSION, config: self.clone() };
        fs::write(path, serde_json::to_vec_pretty(&envelope)?)?;
        Ok(())
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            display_scale: self.display_scale,
            min_box_px: self.min_box_px,
            render_timeout: self.render_timeout,
        }
    }

    pub fn composite_options(&self) -> CompositeOptions {
        CompositeOptions {
            date_font_size: self.date_font_size,
            date_offset: self.date_offset,
            ..CompositeOptions::default()
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions { ignore_encryption: self.ignore_encryption }
    }

    pub fn text_style(&self, font_size_pt: f32, ink: InkColor) -> TextStyle {
        TextStyle { font_size_pt, ink, oversample: self.oversample }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ALL_VARS: [&str; 4] = [ENV_DISPLAY_SCALE, ENV_MIN_BOX_PX, ENV_RENDER_TIMEOUT_MS, ENV_OVERSAMPLE];

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(names: &[&str]) -> Self {
            let vars = names.iter().map(|name| (name.to_string(), env::var(name).ok())).collect();
            for name in names {
                env::remove_var(name);
            }
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(value) => env::set_var(name, value),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn defaults_match_viewer_and_export_settings() {
        let config = SignerConfig::default();

        assert_eq!(config.display_scale, 1.5);
        assert_eq!(config.min_box_px, 5.0);
        assert_eq!(config.render_timeout, Duration::from_secs(15));
        assert_eq!(config.oversample, 4);
        assert!(config.ignore_encryption);
        assert!(config.validate().is_ok());

        let options = config.composite_options();
        assert_eq!((options.date_font_size, options.date_offset), (8.0, 12.0));
    }

    #[test]
    fn builders_override_fields() {
        let config = SignerConfig::default()
            .with_display_scale(2.0)
            .with_min_box_px(8.0)
            .with_render_timeout(Duration::from_secs(3))
            .with_oversample(2)
            .with_ignore_encryption(false);

        assert_eq!(config.coordinator_config().display_scale, 2.0);
        assert_eq!(config.coordinator_config().min_box_px, 8.0);
        assert_eq!(config.coordinator_config().render_timeout, Duration::from_secs(3));
        assert_eq!(config.text_style(12.0, InkColor::BLUE).oversample, 2);
        assert!(!config.load_options().ignore_encryption);
    }

    #[test]
    fn validation_rejects_nonsense() {
        assert!(SignerConfig::default().with_display_scale(0.0).validate().is_err());
        assert!(SignerConfig::default().with_display_scale(f32::NAN).validate().is_err());
        assert!(SignerConfig::default().with_oversample(0).validate().is_err());
        assert!(SignerConfig::default().with_render_timeout(Duration::ZERO).validate().is_err());
    }

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        let _guard = EnvGuard::new(&ALL_VARS);
        env::set_var(ENV_DISPLAY_SCALE, "2");
        env::set_var(ENV_RENDER_TIMEOUT_MS, "2500");
        env::set_var(ENV_OVERSAMPLE, "3");

        let config = SignerConfig::from_env().expect("valid env");
        assert_eq!(config.display_scale, 2.0);
        assert_eq!(config.render_timeout, Duration::from_millis(2500));
        assert_eq!(config.oversample, 3);
        assert_eq!(config.min_box_px, 5.0);
    }

    #[test]
    #[serial]
    fn from_env_rejects_invalid_values() {
        let _guard = EnvGuard::new(&ALL_VARS);
        env::set_var(ENV_MIN_BOX_PX, "wide");

        let err = SignerConfig::from_env().expect_err("invalid env");
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == ENV_MIN_BOX_PX));

        env::set_var(ENV_MIN_BOX_PX, "4");
        env::set_var(ENV_DISPLAY_SCALE, "-1");
        let err = SignerConfig::from_env().expect_err("negative scale");
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "display_scale"));
    }

    #[test]
    fn file_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("nested").join("config.json");
        let config = SignerConfig::default().with_display_scale(2.0).with_oversample(2);

        config.save(&path).expect("save should succeed");
        let saved = fs::read_to_string(&path).expect("file exists");
        assert!(saved.contains("\"render_timeout_ms\": 15000"));

        assert_eq!(SignerConfig::load(&path).expect("load should succeed"), config);
    }

    #[test]
    fn missing_file_yields_defaults_and_partial_files_fill_in() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let missing = temp.path().join("absent.json");
        assert_eq!(SignerConfig::load(&missing).expect("defaults"), SignerConfig::default());

        let partial = temp.path().join("partial.json");
        fs::write(&partial, r#"{"version":1,"config":{"display_scale":3.0}}"#).expect("write");
        let loaded = SignerConfig::load(&partial).expect("partial config loads");
        assert_eq!(loaded.display_scale, 3.0);
        assert_eq!(loaded.oversample, 4);
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"version":9,"config":{}}"#).expect("write");

        assert!(matches!(SignerConfig::load(&path), Err(ConfigError::UnsupportedVersion(9))));
    }
}
