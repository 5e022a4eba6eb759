//! Configuration types for the spectrometer pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("{name} directory does not exist: {path}")]
    DirectoryNotFound { name: &'static str, path: PathBuf },

    #[error("central wavelength must be a positive number, got {0}")]
    InvalidCentralWavelength(f64),

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Observation site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Latitude in degrees, north positive
    #[serde(default = "default_latitude")]
    pub latitude: f64,

    /// Longitude in degrees, east positive
    #[serde(default = "default_longitude")]
    pub longitude: f64,
}

fn default_latitude() -> f64 {
    28.48
}

fn default_longitude() -> f64 {
    -16.32
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
        }
    }
}

impl SiteConfig {
    /// Reject coordinates outside the valid geographic ranges.
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || self.latitude.abs() > 90.0 {
            return Err(ConfigError::InvalidLatitude(self.latitude));
        }
        if !self.longitude.is_finite() || self.longitude.abs() > 180.0 {
            return Err(ConfigError::InvalidLongitude(self.longitude));
        }
        Ok(())
    }
}

/// Directories used by the station monitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the dark reference spectra
    #[serde(default)]
    pub dark_dir: Option<PathBuf>,

    /// Directory the spectrometer software writes new spectra into
    #[serde(default)]
    pub measurements_dir: Option<PathBuf>,

    /// Directory receiving the .spe and .clb files
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// Layout of the raw spectrum files and of the generated outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumConfig {
    /// Metadata lines to skip before the wavelength/intensity pairs
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,

    /// Extension of spectrum files (without the dot)
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Declared central wavelength in nm
    #[serde(default)]
    pub central_wavelength_nm: Option<f64>,

    /// Scale factor written on the last .spe header line
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
}

fn default_header_lines() -> usize {
    13
}

fn default_extension() -> String {
    "txt".to_string()
}

fn default_scale_factor() -> f64 {
    1.0
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            header_lines: default_header_lines(),
            extension: default_extension(),
            central_wavelength_nm: None,
            scale_factor: default_scale_factor(),
        }
    }
}

/// Serial link to the attitude sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Delay after opening the port before reading
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Read timeout for one line
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            settle_ms: default_settle_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl SensorConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Polling behaviour of the measurement directory watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive polls a new file's size and mtime must stay unchanged
    /// before it is handed out. Zero hands files out as soon as they appear.
    #[serde(default = "default_stability_checks")]
    pub stability_checks: u32,

    /// Append-only log of handled file names, kept across restarts
    #[serde(default)]
    pub seen_log: Option<PathBuf>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_stability_checks() -> u32 {
    1
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stability_checks: default_stability_checks(),
            seen_log: None,
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Solar geometry options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolarConfig {
    /// Apply atmospheric refraction to the computed elevation
    #[serde(default = "default_refraction")]
    pub refraction: bool,
}

fn default_refraction() -> bool {
    true
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            refraction: default_refraction(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub spectrum: SpectrumConfig,

    #[serde(default)]
    pub sensor: SensorConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub solar: SolarConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Resolve and validate everything the station monitor needs.
    ///
    /// Runs once at startup so a misconfigured deployment fails before the
    /// dark baseline is computed.
    pub fn station_settings(&self) -> Result<StationSettings> {
        self.site.validate()?;

        let dark_dir = existing_dir("dark", "paths.dark_dir", self.paths.dark_dir.as_ref())?;
        let measurements_dir = existing_dir(
            "measurements",
            "paths.measurements_dir",
            self.paths.measurements_dir.as_ref(),
        )?;
        let output_dir =
            existing_dir("output", "paths.output_dir", self.paths.output_dir.as_ref())?;

        let central = self
            .spectrum
            .central_wavelength_nm
            .ok_or(ConfigError::Missing("spectrum.central_wavelength_nm"))?;
        if !central.is_finite() || central <= 0.0 {
            return Err(ConfigError::InvalidCentralWavelength(central));
        }

        if self.watcher.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        Ok(StationSettings {
            dark_dir,
            measurements_dir,
            output_dir,
            central_wavelength_nm: central,
        })
    }
}

fn existing_dir(name: &'static str, key: &'static str, path: Option<&PathBuf>) -> Result<PathBuf> {
    let path = path.ok_or(ConfigError::Missing(key))?;
    if !path.is_dir() {
        return Err(ConfigError::DirectoryNotFound {
            name,
            path: path.clone(),
        });
    }
    Ok(path.clone())
}

/// Validated station settings, produced by [`PipelineConfig::station_settings`].
#[derive(Debug, Clone)]
pub struct StationSettings {
    pub dark_dir: PathBuf,
    pub measurements_dir: PathBuf,
    pub output_dir: PathBuf,
    pub central_wavelength_nm: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_with_dirs(root: &Path) -> PipelineConfig {
        for name in ["dark", "meas", "out"] {
            std::fs::create_dir_all(root.join(name)).unwrap();
        }
        let mut config = PipelineConfig::default();
        config.paths.dark_dir = Some(root.join("dark"));
        config.paths.measurements_dir = Some(root.join("meas"));
        config.paths.output_dir = Some(root.join("out"));
        config.spectrum.central_wavelength_nm = Some(320.0);
        config
    }

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.spectrum.header_lines, 13);
        assert_eq!(config.spectrum.extension, "txt");
        assert_eq!(config.sensor.baud_rate, 115_200);
        assert_eq!(config.sensor.timeout(), Duration::from_secs(1));
        assert_eq!(config.watcher.poll_interval(), Duration::from_secs(1));
        assert!(config.solar.refraction);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "site:\n  latitude: 40.0\nsensor:\n  port: /dev/ttyACM0\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.site.latitude, 40.0);
        assert_eq!(config.site.longitude, -16.32);
        assert_eq!(config.sensor.port, "/dev/ttyACM0");
        assert_eq!(config.sensor.baud_rate, 115_200);
    }

    #[test]
    fn test_yaml_roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = PipelineConfig::default();
        config.spectrum.central_wavelength_nm = Some(310.5);
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.spectrum.central_wavelength_nm, Some(310.5));
    }

    #[test]
    fn test_station_settings_valid() {
        let dir = TempDir::new().unwrap();
        let config = config_with_dirs(dir.path());
        let settings = config.station_settings().unwrap();
        assert_eq!(settings.central_wavelength_nm, 320.0);
        assert_eq!(settings.output_dir, dir.path().join("out"));
    }

    #[test]
    fn test_station_settings_rejects_bad_latitude() {
        let dir = TempDir::new().unwrap();
        let mut config = config_with_dirs(dir.path());
        config.site.latitude = 91.0;
        assert!(matches!(
            config.station_settings(),
            Err(ConfigError::InvalidLatitude(_))
        ));
    }

    #[test]
    fn test_station_settings_rejects_missing_output_dir() {
        let dir = TempDir::new().unwrap();
        let mut config = config_with_dirs(dir.path());
        config.paths.output_dir = Some(dir.path().join("nope"));
        assert!(matches!(
            config.station_settings(),
            Err(ConfigError::DirectoryNotFound { name: "output", .. })
        ));
    }

    #[test]
    fn test_station_settings_requires_central_wavelength() {
        let dir = TempDir::new().unwrap();
        let mut config = config_with_dirs(dir.path());
        config.spectrum.central_wavelength_nm = None;
        assert!(matches!(
            config.station_settings(),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_station_settings_rejects_non_positive_central_wavelength() {
        let dir = TempDir::new().unwrap();
        let mut config = config_with_dirs(dir.path());
        config.spectrum.central_wavelength_nm = Some(0.0);
        match config.station_settings() {
            Err(ConfigError::InvalidCentralWavelength(v)) => assert_eq!(v, 0.0),
            _ => panic!("Expected InvalidCentralWavelength"),
        }
    }

    #[test]
    fn test_station_settings_rejects_zero_poll_interval() {
        let dir = TempDir::new().unwrap();
        let mut config = config_with_dirs(dir.path());
        config.watcher.poll_interval_ms = 0;
        assert!(matches!(
            config.station_settings(),
            Err(ConfigError::ZeroPollInterval)
        ));
    }
}
