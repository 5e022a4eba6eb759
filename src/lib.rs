//! Spectrometer data pipeline for solar radiation monitoring.
//!
//! This crate provides tools for:
//! - Averaging dark reference spectra into a dark baseline
//! - Watching a measurement directory for new spectrometer exports
//! - Reading instrument orientation from a serial attitude sensor
//! - Computing the solar zenith angle for a site and instant
//! - Writing dark-corrected `.spe` and `.clb` files
//! - Converting HITRAN cross sections to the wavelength-indexed `.xs` format
//!
//! # Example
//!
//! ```no_run
//! use spectro_pipeline::config::SpectrumConfig;
//! use spectro_pipeline::processors::dark::compute_dark_baseline;
//!
//! let dark = compute_dark_baseline("darks".as_ref(), &SpectrumConfig::default()).unwrap();
//! println!("{} samples from {} files", dark.len(), dark.num_files());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{PipelineConfig, SensorConfig, SiteConfig, SpectrumConfig, WatcherConfig};
pub use core::loaders::Spectrum;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
