//! The station monitor loop: wait for a spectrum, read the sensor, compute
//! the sun's position and write the output pair.

use std::io;

use chrono::{DateTime, TimeZone};
use log::{error, info, warn};
use thiserror::Error;

use super::dark::DarkBaseline;
use super::sensor::OrientationSource;
use super::solar::solar_position;
use super::spectrum::{process_spectrum_file, MeasurementMetadata, ProcessedOutputs};
use super::watcher::{FileWatcher, SeenFiles};
use crate::config::{PipelineConfig, StationSettings};

/// Errors that stop the monitor loop.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to initialise seen-file state: {0}")]
    SeenState(#[source] io::Error),

    #[error("measurement directory became unreadable: {0}")]
    Watch(#[source] io::Error),
}

/// What happened to one new file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Processed(ProcessedOutputs),
    /// No orientation sample; nothing written
    SkippedNoOrientation,
    /// Processing error; nothing or a partial set written
    Failed(String),
}

/// Counters reported when the loop returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MonitorSummary {
    pub fn handled(&self) -> usize {
        self.processed + self.skipped + self.failed
    }

    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Processed(_) => self.processed += 1,
            FileOutcome::SkippedNoOrientation => self.skipped += 1,
            FileOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Long-running station state. The dark baseline is fixed at construction.
pub struct Station<S: OrientationSource> {
    config: PipelineConfig,
    settings: StationSettings,
    dark: DarkBaseline,
    sensor: S,
    watcher: FileWatcher,
    seen: SeenFiles,
}

impl<S: OrientationSource> Station<S> {
    /// Build the station and seed the seen-file state.
    ///
    /// Without a seen log every spectrum already in the measurement directory
    /// counts as handled. With one, the log decides.
    pub fn new(
        config: &PipelineConfig,
        settings: StationSettings,
        dark: DarkBaseline,
        sensor: S,
    ) -> Result<Self, MonitorError> {
        let extension = config.spectrum.extension.as_str();
        let seen = match &config.watcher.seen_log {
            Some(log) => SeenFiles::open(log, &settings.measurements_dir, extension),
            None => SeenFiles::from_dir(&settings.measurements_dir, extension),
        }
        .map_err(MonitorError::SeenState)?;

        info!(
            "Watching {} ({} existing files ignored)",
            settings.measurements_dir.display(),
            seen.len()
        );

        let watcher = FileWatcher::new(&settings.measurements_dir, extension, &config.watcher);

        Ok(Self {
            config: config.clone(),
            settings,
            dark,
            sensor,
            watcher,
            seen,
        })
    }

    pub fn seen(&self) -> &SeenFiles {
        &self.seen
    }

    /// Process one new file stamped with `now`.
    ///
    /// Never returns an error: every failure is logged and reported in the
    /// outcome so the loop can carry on with the next file.
    pub fn handle_file<Tz: TimeZone>(&mut self, name: &str, now: &DateTime<Tz>) -> FileOutcome
    where
        Tz::Offset: std::fmt::Display,
    {
        info!("New file detected: {}", name);

        let orientation = match self.sensor.read_orientation() {
            Some(o) => o,
            None => {
                warn!("No sensor angles available, skipping {}", name);
                return FileOutcome::SkippedNoOrientation;
            }
        };

        let site = &self.config.site;
        let refraction = self.config.solar.refraction;
        let sun = match solar_position(now, site.latitude, site.longitude, refraction) {
            Ok(p) => p,
            Err(e) => {
                error!("Solar geometry failed for {}: {}", name, e);
                return FileOutcome::Failed(e.to_string());
            }
        };

        let metadata = MeasurementMetadata::at(
            now,
            self.settings.central_wavelength_nm,
            orientation,
            sun.zenith,
        );

        let input = self.settings.measurements_dir.join(name);
        match process_spectrum_file(
            &input,
            &self.dark,
            &metadata,
            &self.settings.output_dir,
            &self.config.spectrum,
        ) {
            Ok(outputs) => FileOutcome::Processed(outputs),
            Err(e) => {
                error!("Failed to process {}: {}", name, e);
                FileOutcome::Failed(e.to_string())
            }
        }
    }

    /// Run the loop.
    ///
    /// A file is marked seen before it is processed, so a skipped or failed
    /// file is never retried. `limit` stops the loop after that many files;
    /// `None` runs until the process is terminated.
    ///
    /// # Errors
    ///
    /// Returns an error only if the measurement directory cannot be listed.
    pub fn run<C, Tz>(
        &mut self,
        mut clock: C,
        limit: Option<usize>,
    ) -> Result<MonitorSummary, MonitorError>
    where
        C: FnMut() -> DateTime<Tz>,
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let mut summary = MonitorSummary::default();

        while limit.map_or(true, |max| summary.handled() < max) {
            let name = self
                .watcher
                .wait_for_new_file(&self.seen)
                .map_err(MonitorError::Watch)?;

            if let Err(e) = self.seen.mark_seen(&name) {
                warn!("Could not append {} to the seen log: {}", name, e);
            }

            let now = clock();
            let outcome = self.handle_file(&name, &now);
            summary.record(&outcome);
        }

        Ok(summary)
    }
}
