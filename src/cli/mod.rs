//! Command-line interface for the spectrometer pipeline.

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Local};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::StationSettings;
use crate::processors::dark::{compute_dark_baseline, DarkBaseline};
use crate::processors::sensor::OrientationSample;
use crate::processors::solar::solar_position;
use crate::processors::spectrum::{process_spectrum_file, MeasurementMetadata, ProcessedOutputs};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "spectro-pipeline")]
#[command(about = "Spectrometer to .spe/.clb pipeline and HITRAN cross-section converter", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Station settings that can be given on the command line instead of the
/// config file.
#[derive(Args, Debug, Default)]
struct StationArgs {
    /// Directory with dark reference spectra
    #[arg(long)]
    dark_dir: Option<PathBuf>,
    /// Directory for the generated .spe and .clb files
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Site latitude in degrees (north positive)
    #[arg(long, allow_negative_numbers = true)]
    latitude: Option<f64>,
    /// Site longitude in degrees (east positive)
    #[arg(long, allow_negative_numbers = true)]
    longitude: Option<f64>,
    /// Central wavelength in nm
    #[arg(long)]
    central_wavelength: Option<f64>,
}

impl StationArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.dark_dir {
            config.paths.dark_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.paths.output_dir = Some(dir.clone());
        }
        if let Some(lat) = self.latitude {
            config.site.latitude = lat;
        }
        if let Some(lon) = self.longitude {
            config.site.longitude = lon;
        }
        if let Some(central) = self.central_wavelength {
            config.spectrum.central_wavelength_nm = Some(central);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the measurement directory and convert every new spectrum
    Watch {
        /// Directory the spectrometer software writes into
        #[arg(long)]
        measurements_dir: Option<PathBuf>,
        #[command(flatten)]
        station: StationArgs,
        /// Stop after this many new files
        #[arg(long)]
        max_files: Option<usize>,
    },

    /// Compute the dark baseline of a directory and report it
    Dark {
        /// Directory with dark reference spectra
        directory: PathBuf,
        /// Write the baseline as `index value` rows
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert a single spectrum with manually supplied angles
    Process {
        /// Raw spectrum file
        input: PathBuf,
        /// Instrument elevation in degrees
        #[arg(long, allow_negative_numbers = true)]
        elevation: f64,
        /// Instrument azimuth in degrees
        #[arg(long, allow_negative_numbers = true)]
        azimuth: f64,
        /// Measurement time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<String>,
        #[command(flatten)]
        station: StationArgs,
    },

    /// Convert a HITRAN cross-section file to .xs
    ConvertXs {
        /// HITRAN file (.xsc or .txt)
        input: PathBuf,
        /// Start of the wavenumber range (cm^-1)
        #[arg(long)]
        start: f64,
        /// End of the wavenumber range (cm^-1)
        #[arg(long)]
        end: f64,
        /// Molecule name, e.g. SO2
        #[arg(long)]
        molecule: String,
        /// File description, e.g. 298K
        #[arg(long)]
        description: String,
        /// Directory for the .xs file
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Write rows in ascending wavelength order
        #[arg(long)]
        ascending: bool,
    },

    /// Write the default configuration to a YAML file
    InitConfig {
        /// Destination YAML path
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            let head: String = value.chars().take(36).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", context, err);
    std::process::exit(1);
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // A config file that was asked for but cannot be read is fatal: the site
    // coordinates and directories in it are not safe to default.
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => fail(&format!("Failed to load config from {}", path.display()), e),
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Watch { measurements_dir, station, max_files } => {
            cmd_watch(config, measurements_dir, &station, max_files);
        }
        Commands::Dark { directory, output } => {
            cmd_dark(&directory, output.as_deref(), &config);
        }
        Commands::Process { input, elevation, azimuth, at, station } => {
            cmd_process(config, &input, elevation, azimuth, at.as_deref(), &station);
        }
        Commands::ConvertXs { input, start, end, molecule, description, output_dir, ascending } => {
            cmd_convert_xs(input, start, end, molecule, description, output_dir, ascending);
        }
        Commands::InitConfig { path } => {
            cmd_init_config(&path, &config);
        }
    }
}

fn load_dark(dir: &Path, config: &PipelineConfig) -> DarkBaseline {
    let spinner = create_spinner("Averaging dark spectra...");
    let result = compute_dark_baseline(dir, &config.spectrum);
    spinner.finish_and_clear();

    match result {
        Ok(dark) => {
            info!("Dark correction computed from {} files", dark.num_files());
            dark
        }
        Err(e) => fail("Dark baseline failed", e),
    }
}

fn resolve_settings(config: &PipelineConfig) -> StationSettings {
    match config.station_settings() {
        Ok(settings) => settings,
        Err(e) => fail("Invalid configuration", e),
    }
}

fn cmd_watch(
    mut config: PipelineConfig,
    measurements_dir: Option<PathBuf>,
    station_args: &StationArgs,
    max_files: Option<usize>,
) {
    use crate::processors::monitor::Station;
    use crate::processors::sensor::SerialOrientationReader;

    let start = Instant::now();

    station_args.apply(&mut config);
    if let Some(dir) = measurements_dir {
        config.paths.measurements_dir = Some(dir);
    }
    let settings = resolve_settings(&config);

    let dark = load_dark(&settings.dark_dir, &config);
    let sensor = SerialOrientationReader::new(config.sensor.clone());

    let mut station = match Station::new(&config, settings.clone(), dark, sensor) {
        Ok(s) => s,
        Err(e) => fail("Station startup failed", e),
    };

    println!("Waiting for new spectra in {}...", settings.measurements_dir.display());

    match station.run(Local::now, max_files) {
        Ok(summary) => {
            print_summary(
                "Watch Complete",
                &[
                    ("Measurements", settings.measurements_dir.display().to_string()),
                    ("Output directory", settings.output_dir.display().to_string()),
                    ("Processed", summary.processed.to_string()),
                    ("Skipped (sensor)", summary.skipped.to_string()),
                    ("Failed", summary.failed.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => fail("Watch loop stopped", e),
    }
}

fn cmd_dark(directory: &Path, output: Option<&Path>, config: &PipelineConfig) {
    use crate::core::writers::write_baseline;

    let start = Instant::now();

    let dark = load_dark(directory, config);
    if let Some(path) = output {
        match write_baseline(path, dark.intensities()) {
            Ok(()) => info!("Baseline written to {}", path.display()),
            Err(e) => fail("Could not write baseline", e),
        }
    }
    let values = dark.intensities();
    let mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    print_summary(
        "Dark Baseline",
        &[
            ("Directory", directory.display().to_string()),
            ("Files averaged", dark.num_files().to_string()),
            ("Samples", dark.len().to_string()),
            ("Min counts", format!("{:.2}", min)),
            ("Mean counts", format!("{:.2}", mean)),
            ("Max counts", format!("{:.2}", max)),
            (
                "Dump",
                output.map_or_else(|| "-".to_string(), |p| p.display().to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

/// Manual one-shot processing: everything the watch loop does for one file,
/// with the angles taken from the command line.
fn process_one(
    config: &PipelineConfig,
    input: &Path,
    orientation: OrientationSample,
    at: Option<&str>,
) -> anyhow::Result<(ProcessedOutputs, f64)> {
    let settings = config.station_settings().context("Invalid configuration")?;

    let time: DateTime<FixedOffset> = match at {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .with_context(|| format!("Invalid --at timestamp {:?}", text))?,
        None => Local::now().fixed_offset(),
    };

    let site = &config.site;
    let sun = solar_position(&time, site.latitude, site.longitude, config.solar.refraction)
        .context("Solar geometry failed")?;

    let dark = load_dark(&settings.dark_dir, config);
    let metadata =
        MeasurementMetadata::at(&time, settings.central_wavelength_nm, orientation, sun.zenith);

    let outputs =
        process_spectrum_file(input, &dark, &metadata, &settings.output_dir, &config.spectrum)
        .with_context(|| format!("Failed to process {}", input.display()))?;

    Ok((outputs, sun.zenith))
}

fn cmd_process(
    mut config: PipelineConfig,
    input: &Path,
    elevation: f64,
    azimuth: f64,
    at: Option<&str>,
    station_args: &StationArgs,
) {
    let start = Instant::now();

    station_args.apply(&mut config);
    if config.paths.measurements_dir.is_none() {
        config.paths.measurements_dir = Some(
            input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf(),
        );
    }

    let orientation = OrientationSample {
        elevation_deg: elevation,
        azimuth_deg: azimuth,
    };

    match process_one(&config, input, orientation, at) {
        Ok((outputs, zenith)) => {
            print_summary(
                "Spectrum Processed",
                &[
                    ("Input file", input.display().to_string()),
                    ("SPE file", outputs.spe_path.display().to_string()),
                    ("CLB file", outputs.clb_path.display().to_string()),
                    ("Points", outputs.points.to_string()),
                    ("Solar zenith", format!("{:.2}", zenith)),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_convert_xs(
    input: PathBuf,
    start_wn: f64,
    end_wn: f64,
    molecule: String,
    description: String,
    output_dir: PathBuf,
    ascending: bool,
) {
    use crate::processors::cross_section::{convert_file, SpectralRange, WavelengthOrder, XsRequest};

    let start = Instant::now();

    let range = match SpectralRange::new(start_wn, end_wn) {
        Ok(r) => r,
        Err(e) => fail("Invalid spectral range", e),
    };

    let request = XsRequest {
        input,
        range,
        molecule,
        description,
        output_dir,
        order: if ascending {
            WavelengthOrder::Ascending
        } else {
            WavelengthOrder::AsComputed
        },
    };

    match convert_file(&request) {
        Ok(outcome) => {
            print_summary(
                "Cross Section Converted",
                &[
                    ("Input file", request.input.display().to_string()),
                    ("Output file", outcome.output.display().to_string()),
                    ("Points", outcome.points.to_string()),
                    ("Range (cm^-1)", format!("{} - {}", start_wn, end_wn)),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => fail("Conversion failed", e),
    }
}

fn cmd_init_config(path: &Path, config: &PipelineConfig) {
    match config.to_yaml(path) {
        Ok(()) => println!("Configuration written to {}", path.display()),
        Err(e) => fail("Could not write configuration", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_convert_xs() {
        let cli = Cli::try_parse_from([
            "spectro-pipeline",
            "convert-xs",
            "so2.xsc",
            "--start",
            "1000",
            "--end",
            "2000",
            "--molecule",
            "SO2",
            "--description",
            "298K",
            "-o",
            "out",
        ])
        .unwrap();

        match cli.command {
            Commands::ConvertXs { start, end, ascending, .. } => {
                assert_eq!(start, 1000.0);
                assert_eq!(end, 2000.0);
                assert!(!ascending);
            }
            _ => panic!("Expected ConvertXs"),
        }
    }

    #[test]
    fn test_station_args_override_config() {
        let cli = Cli::try_parse_from([
            "spectro-pipeline",
            "-v",
            "watch",
            "--longitude",
            "-16.5",
            "--central-wavelength",
            "320",
            "--max-files",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);

        match cli.command {
            Commands::Watch { station, max_files, .. } => {
                let mut config = PipelineConfig::default();
                station.apply(&mut config);
                assert_eq!(config.site.longitude, -16.5);
                assert_eq!(config.site.latitude, 28.48);
                assert_eq!(config.spectrum.central_wavelength_nm, Some(320.0));
                assert_eq!(max_files, Some(2));
            }
            _ => panic!("Expected Watch"),
        }
    }
}
