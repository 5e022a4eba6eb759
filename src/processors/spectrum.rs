//! Dark correction of a single spectrum and generation of its `.spe`/`.clb`
//! pair.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Timelike};
use log::info;
use thiserror::Error;

use super::dark::{DarkBaseline, DarkError};
use super::sensor::OrientationSample;
use crate::config::SpectrumConfig;
use crate::core::loaders::{load_spectrum, LoaderError};
use crate::core::writers::{write_clb, write_spe, RecordHeader, ViewingAngles, WriteError};

/// Errors that can occur while processing one spectrum file.
#[derive(Debug, Error)]
pub enum SpectrumError {
    #[error(transparent)]
    Load(#[from] LoaderError),

    #[error(transparent)]
    Dark(#[from] DarkError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Cannot derive an output name from {0}")]
    InvalidFileName(PathBuf),
}

/// Everything except the spectrum and dark baseline that goes into an output
/// record.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementMetadata {
    /// `dd/mm/YYYY`
    pub date: String,
    /// Local time of day in hours, seconds resolution
    pub fractional_hours: f64,
    pub central_wavelength_nm: f64,
    pub orientation: OrientationSample,
    pub solar_zenith_deg: f64,
}

impl MeasurementMetadata {
    /// Build metadata stamped with `time` as seen in its own time zone.
    pub fn at<Tz: TimeZone>(
        time: &DateTime<Tz>,
        central_wavelength_nm: f64,
        orientation: OrientationSample,
        solar_zenith_deg: f64,
    ) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            date: time.format("%d/%m/%Y").to_string(),
            fractional_hours: fractional_hours(time),
            central_wavelength_nm,
            orientation,
            solar_zenith_deg,
        }
    }
}

/// `hour + minute/60 + second/3600`; sub-second precision is dropped.
pub fn fractional_hours<Tz: TimeZone>(time: &DateTime<Tz>) -> f64 {
    f64::from(time.hour()) + f64::from(time.minute()) / 60.0 + f64::from(time.second()) / 3600.0
}

/// The two files written for one input spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedOutputs {
    pub spe_path: PathBuf,
    pub clb_path: PathBuf,
    /// Number of samples written
    pub points: usize,
}

/// Dark-correct `input` and write `<stem>.spe` and `<stem>.clb` into
/// `output_dir`.
///
/// # Arguments
///
/// * `input` - Raw spectrum file
/// * `dark` - Dark baseline, same sample count as the spectrum
/// * `metadata` - Time, angles and central wavelength for the headers
/// * `output_dir` - Destination directory; existing outputs are replaced
/// * `config` - Spectrum file layout and scale factor
///
/// # Errors
///
/// Returns an error if the spectrum cannot be read, its length differs from
/// the dark baseline, or an output cannot be written.
pub fn process_spectrum_file(
    input: &Path,
    dark: &DarkBaseline,
    metadata: &MeasurementMetadata,
    output_dir: &Path,
    config: &SpectrumConfig,
) -> Result<ProcessedOutputs, SpectrumError> {
    let spectrum = load_spectrum(input, config.header_lines)?;
    let stem = spectrum
        .stem()
        .ok_or_else(|| SpectrumError::InvalidFileName(input.to_path_buf()))?;
    let corrected = dark.subtract_from(&spectrum)?;

    let header = RecordHeader {
        stem: &stem,
        central_wavelength_nm: metadata.central_wavelength_nm,
        date: &metadata.date,
        fractional_hours: metadata.fractional_hours,
    };
    let angles = ViewingAngles {
        azimuth: metadata.orientation.azimuth_deg,
        elevation: metadata.orientation.elevation_deg,
        zenith: metadata.solar_zenith_deg,
    };

    let spe_path = output_dir.join(format!("{}.spe", stem));
    write_spe(
        &spe_path,
        &header,
        &angles,
        config.scale_factor,
        &spectrum.wavelengths,
        &corrected,
    )?;

    let clb_path = output_dir.join(format!("{}.clb", stem));
    write_clb(&clb_path, &header, &spectrum.wavelengths)?;

    info!(
        "Generated {} and {}",
        spe_path.display(),
        clb_path.display()
    );

    Ok(ProcessedOutputs {
        spe_path,
        clb_path,
        points: spectrum.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_raw(dir: &Path, name: &str, rows: &[(f64, f64)]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for i in 0..13 {
            writeln!(file, "meta {}", i).unwrap();
        }
        for (wl, counts) in rows {
            writeln!(file, "{} {}", wl, counts).unwrap();
        }
        path
    }

    fn metadata() -> MeasurementMetadata {
        MeasurementMetadata {
            date: "21/06/2024".to_string(),
            fractional_hours: 14.083333,
            central_wavelength_nm: 320.0,
            orientation: OrientationSample {
                elevation_deg: 10.5,
                azimuth_deg: 200.3,
            },
            solar_zenith_deg: 5.066,
        }
    }

    #[test]
    fn test_metadata_at() {
        let tz = FixedOffset::east_opt(3600).unwrap();
        let time = tz.with_ymd_and_hms(2024, 6, 21, 14, 5, 30).unwrap();
        let orientation = OrientationSample {
            elevation_deg: 1.0,
            azimuth_deg: 2.0,
        };

        let meta = MeasurementMetadata::at(&time, 320.0, orientation, 5.0);

        assert_eq!(meta.date, "21/06/2024");
        assert!((meta.fractional_hours - (14.0 + 5.0 / 60.0 + 30.0 / 3600.0)).abs() < 1e-12);
    }

    #[test]
    fn test_fractional_hours_uses_local_clock() {
        let utc = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        let local = utc.with_timezone(&FixedOffset::east_opt(2 * 3600).unwrap());
        assert_eq!(fractional_hours(&utc), 23.5);
        assert_eq!(fractional_hours(&local), 1.5);
    }

    #[test]
    fn test_process_spectrum_file() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_raw(
            temp_dir.path(),
            "USB2G_0042.txt",
            &[(300.001, 1000.0), (300.5, 1200.0), (301.0, 900.0)],
        );
        let out = temp_dir.path().join("out");
        fs::create_dir(&out).unwrap();
        let dark = DarkBaseline::from_intensities(vec![100.0, 100.4, 950.0], 2);

        let config = SpectrumConfig::default();
        let outputs = process_spectrum_file(&input, &dark, &metadata(), &out, &config).unwrap();

        assert_eq!(outputs.points, 3);
        assert_eq!(outputs.spe_path, out.join("USB2G_0042.spe"));

        let spe = fs::read_to_string(&outputs.spe_path).unwrap();
        assert_eq!(
            spe,
            "Measured spectrum\n\
             USB2G_0042\n\
             320.00\n\
             21/06/2024 14.083333\n\
             200.30 10.50 5.07\n\
             1.0\n\
             300.00 900\n\
             300.50 1100\n\
             301.00 -50\n"
        );

        let clb = fs::read_to_string(&outputs.clb_path).unwrap();
        assert_eq!(
            clb,
            "Instrumental calibration file\n\
             USB2G_0042\n\
             320.00\n\
             21/06/2024 14.083333\n\
             300.00\n\
             300.50\n\
             301.00\n"
        );
    }

    #[test]
    fn test_process_spectrum_file_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_raw(temp_dir.path(), "s.txt", &[(400.0, 10.0), (401.0, 12.5)]);
        let dark = DarkBaseline::from_intensities(vec![1.0, 2.0], 1);
        let config = SpectrumConfig::default();

        let out = temp_dir.path();
        let first = process_spectrum_file(&input, &dark, &metadata(), out, &config).unwrap();
        let spe_a = fs::read(&first.spe_path).unwrap();
        let clb_a = fs::read(&first.clb_path).unwrap();

        let second = process_spectrum_file(&input, &dark, &metadata(), out, &config).unwrap();
        assert_eq!(fs::read(&second.spe_path).unwrap(), spe_a);
        assert_eq!(fs::read(&second.clb_path).unwrap(), clb_a);
    }

    #[test]
    fn test_process_spectrum_file_length_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_raw(temp_dir.path(), "s.txt", &[(400.0, 10.0), (401.0, 12.5)]);
        let dark = DarkBaseline::from_intensities(vec![1.0, 2.0, 3.0], 1);

        let result = process_spectrum_file(
            &input,
            &dark,
            &metadata(),
            temp_dir.path(),
            &SpectrumConfig::default(),
        );

        assert!(matches!(
            result,
            Err(SpectrumError::Dark(DarkError::SpectrumLengthMismatch { .. }))
        ));
        assert!(!temp_dir.path().join("s.spe").exists());
        assert!(!temp_dir.path().join("s.clb").exists());
    }

    #[test]
    fn test_process_spectrum_file_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("broken.txt");
        fs::write(&input, "not a spectrum\n").unwrap();
        let dark = DarkBaseline::from_intensities(vec![1.0], 1);

        let result = process_spectrum_file(
            &input,
            &dark,
            &metadata(),
            temp_dir.path(),
            &SpectrumConfig::default(),
        );
        assert!(matches!(result, Err(SpectrumError::Load(_))));
    }
}
