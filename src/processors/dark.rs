//! Dark baseline computation.
//!
//! The baseline is the element-wise mean of every reference spectrum recorded
//! with the entrance optics covered. It is computed once at startup and then
//! only read.

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};
use thiserror::Error;

use crate::config::SpectrumConfig;
use crate::core::loaders::{load_spectrum, Spectrum};

/// Errors that can occur while building or applying the dark baseline.
#[derive(Debug, Error)]
pub enum DarkError {
    #[error("No dark files found in {dir}")]
    NoDarkFiles { dir: PathBuf },

    #[error("None of the {count} dark files in {dir} could be read")]
    NoValidSpectra { dir: PathBuf, count: usize },

    #[error("Dark file {path} has {found} samples, expected {expected}")]
    LengthMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Spectrum has {found} samples but the dark baseline has {expected}")]
    SpectrumLengthMismatch { expected: usize, found: usize },
}

/// Averaged dark signal, one value per wavelength index.
#[derive(Debug, Clone, PartialEq)]
pub struct DarkBaseline {
    intensities: Vec<f64>,
    num_files: usize,
}

impl DarkBaseline {
    /// Build a baseline from precomputed values.
    pub fn from_intensities(intensities: Vec<f64>, num_files: usize) -> Self {
        Self {
            intensities,
            num_files,
        }
    }

    #[inline]
    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }

    /// Number of reference files averaged into this baseline.
    #[inline]
    pub fn num_files(&self) -> usize {
        self.num_files
    }

    /// Subtract the baseline from a spectrum's intensities.
    ///
    /// Fails instead of truncating when the lengths differ.
    pub fn subtract_from(&self, spectrum: &Spectrum) -> Result<Vec<f64>, DarkError> {
        if spectrum.len() != self.len() {
            return Err(DarkError::SpectrumLengthMismatch {
                expected: self.len(),
                found: spectrum.len(),
            });
        }
        Ok(spectrum
            .intensities
            .iter()
            .zip(&self.intensities)
            .map(|(signal, dark)| signal - dark)
            .collect())
    }
}

/// List the files in `dir` whose extension matches, sorted by name.
pub fn find_spectrum_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
        })
        .collect();

    files.sort();
    files
}

/// Compute the dark baseline from every spectrum file in `dir`.
///
/// Unreadable files are logged and skipped. The first readable file fixes the
/// expected sample count; a later file of a different length aborts the
/// computation.
///
/// # Arguments
///
/// * `dir` - Directory holding the dark reference spectra
/// * `config` - Spectrum file layout (extension, header length)
///
/// # Errors
///
/// Returns [`DarkError::NoDarkFiles`] if the directory holds no matching
/// files, [`DarkError::NoValidSpectra`] if none of them can be read, and
/// [`DarkError::LengthMismatch`] if the spectra disagree in length.
pub fn compute_dark_baseline(
    dir: &Path,
    config: &SpectrumConfig,
) -> Result<DarkBaseline, DarkError> {
    let files = find_spectrum_files(dir, &config.extension);

    if files.is_empty() {
        error!("No dark files found in {}", dir.display());
        return Err(DarkError::NoDarkFiles {
            dir: dir.to_path_buf(),
        });
    }

    let mut sums: Vec<f64> = Vec::new();
    let mut used = 0usize;

    for path in &files {
        let spectrum = match load_spectrum(path, config.header_lines) {
            Ok(s) => s,
            Err(e) => {
                error!("Skipping dark file {}: {}", path.display(), e);
                continue;
            }
        };

        if used == 0 {
            sums = vec![0.0; spectrum.len()];
        } else if spectrum.len() != sums.len() {
            return Err(DarkError::LengthMismatch {
                path: path.clone(),
                expected: sums.len(),
                found: spectrum.len(),
            });
        }

        for (sum, value) in sums.iter_mut().zip(&spectrum.intensities) {
            *sum += value;
        }
        used += 1;
    }

    if used == 0 {
        return Err(DarkError::NoValidSpectra {
            dir: dir.to_path_buf(),
            count: files.len(),
        });
    }

    let n = used as f64;
    let intensities = sums.into_iter().map(|sum| sum / n).collect();

    info!(
        "Dark baseline computed from {} of {} files in {}",
        used,
        files.len(),
        dir.display()
    );

    Ok(DarkBaseline {
        intensities,
        num_files: used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn config() -> SpectrumConfig {
        SpectrumConfig {
            header_lines: 2,
            ..SpectrumConfig::default()
        }
    }

    fn create_spectrum(dir: &Path, name: &str, counts: &[f64]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        writeln!(file, "Data from dark capture").unwrap();
        writeln!(file, "Integration Time (sec): 1.0").unwrap();
        for (i, c) in counts.iter().enumerate() {
            writeln!(file, "{:.2} {}", 300.0 + i as f64 * 0.5, c).unwrap();
        }
        path
    }

    #[test]
    fn test_compute_dark_baseline_mean() {
        let temp_dir = TempDir::new().unwrap();
        create_spectrum(temp_dir.path(), "dark1.txt", &[10.0, 20.0, 30.0]);
        create_spectrum(temp_dir.path(), "dark2.txt", &[20.0, 40.0, 60.0]);
        create_spectrum(temp_dir.path(), "dark3.txt", &[30.0, 0.0, 30.0]);

        let baseline = compute_dark_baseline(temp_dir.path(), &config()).unwrap();

        assert_eq!(baseline.len(), 3);
        assert_eq!(baseline.num_files(), 3);
        assert_eq!(baseline.intensities(), &[20.0, 20.0, 40.0]);
    }

    #[test]
    fn test_compute_dark_baseline_ignores_other_extensions() {
        let temp_dir = TempDir::new().unwrap();
        create_spectrum(temp_dir.path(), "dark1.txt", &[10.0, 20.0]);
        create_spectrum(temp_dir.path(), "notes.csv", &[1000.0, 1000.0]);

        let baseline = compute_dark_baseline(temp_dir.path(), &config()).unwrap();
        assert_eq!(baseline.intensities(), &[10.0, 20.0]);
    }

    #[test]
    fn test_compute_dark_baseline_empty_dir() {
        let temp_dir = TempDir::new().unwrap();

        let result = compute_dark_baseline(temp_dir.path(), &config());
        assert!(matches!(result, Err(DarkError::NoDarkFiles { .. })));
    }

    #[test]
    fn test_compute_dark_baseline_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("no_such_dir");

        match compute_dark_baseline(&missing, &config()) {
            Err(DarkError::NoDarkFiles { dir }) => assert_eq!(dir, missing),
            _ => panic!("Expected NoDarkFiles"),
        }
    }

    #[test]
    fn test_compute_dark_baseline_skips_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        create_spectrum(temp_dir.path(), "dark1.txt", &[10.0, 20.0]);
        fs::write(temp_dir.path().join("dark2.txt"), "only\nheader\nnot numbers\n").unwrap();
        create_spectrum(temp_dir.path(), "dark3.txt", &[30.0, 40.0]);

        let baseline = compute_dark_baseline(temp_dir.path(), &config()).unwrap();
        assert_eq!(baseline.num_files(), 2);
        assert_eq!(baseline.intensities(), &[20.0, 30.0]);
    }

    #[test]
    fn test_compute_dark_baseline_all_malformed() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("dark1.txt"), "a\nb\n").unwrap();

        let result = compute_dark_baseline(temp_dir.path(), &config());
        assert!(matches!(
            result,
            Err(DarkError::NoValidSpectra { count: 1, .. })
        ));
    }

    #[test]
    fn test_compute_dark_baseline_length_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        create_spectrum(temp_dir.path(), "dark1.txt", &[10.0, 20.0, 30.0]);
        create_spectrum(temp_dir.path(), "dark2.txt", &[10.0, 20.0]);

        match compute_dark_baseline(temp_dir.path(), &config()) {
            Err(DarkError::LengthMismatch {
                expected, found, ..
            }) => {
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("Expected LengthMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_subtract_from() {
        let baseline = DarkBaseline::from_intensities(vec![1.0, 2.0, 3.0], 1);
        let spectrum = Spectrum::new(vec![300.0, 301.0, 302.0], vec![10.0, 10.0, 1.0]).unwrap();

        let corrected = baseline.subtract_from(&spectrum).unwrap();
        assert_eq!(corrected, vec![9.0, 8.0, -2.0]);
    }

    #[test]
    fn test_subtract_from_length_mismatch() {
        let baseline = DarkBaseline::from_intensities(vec![1.0, 2.0], 1);
        let spectrum = Spectrum::new(vec![300.0], vec![10.0]).unwrap();

        assert!(matches!(
            baseline.subtract_from(&spectrum),
            Err(DarkError::SpectrumLengthMismatch {
                expected: 2,
                found: 1
            })
        ));
    }
}
