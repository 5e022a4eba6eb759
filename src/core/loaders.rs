//! Data loaders for spectrometer text exports.
//!
//! Spectrum files start with a fixed block of metadata lines (13 for the
//! spectrometer software in use) followed by one `wavelength intensity` pair
//! per line, whitespace separated.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Marker some exports append after the last data row.
const END_OF_DATA_MARKER: &str = ">>>>>";

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Parse error in '{path}' at line {line}: {message}")]
    ParseError {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("wavelength/intensity length mismatch: {wavelengths} wavelengths, {intensities} intensities")]
    LengthMismatch {
        wavelengths: usize,
        intensities: usize,
    },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// A spectrum as exported by the spectrometer.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Wavelength of each sample in nm.
    pub wavelengths: Vec<f64>,
    /// Raw detector counts of each sample.
    pub intensities: Vec<f64>,
    /// Source file path.
    pub source_path: Option<PathBuf>,
}

impl Spectrum {
    /// Build a spectrum, checking both columns have the same length.
    pub fn new(wavelengths: Vec<f64>, intensities: Vec<f64>) -> Result<Self> {
        if wavelengths.len() != intensities.len() {
            return Err(LoaderError::LengthMismatch {
                wavelengths: wavelengths.len(),
                intensities: intensities.len(),
            });
        }
        Ok(Self {
            wavelengths,
            intensities,
            source_path: None,
        })
    }

    /// Returns the number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }

    /// File name without extension, as used for output names.
    pub fn stem(&self) -> Option<String> {
        self.source_path
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Load a spectrum from a text export.
///
/// # Arguments
///
/// * `path` - Path to the spectrum file
/// * `header_lines` - Number of leading metadata lines to skip
///
/// # Errors
///
/// Returns an error if the file cannot be read, a data row does not hold
/// exactly two numbers, or no data rows remain after the header.
pub fn load_spectrum<P: AsRef<Path>>(path: P, header_lines: usize) -> Result<Spectrum> {
    let path = path.as_ref();
    let io_err = |source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let reader = BufReader::new(file);

    let mut wavelengths = Vec::with_capacity(4096);
    let mut intensities = Vec::with_capacity(4096);

    for (idx, line) in reader.lines().enumerate().skip(header_lines) {
        let line = line.map_err(io_err)?;
        let stripped = line.trim();

        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        if stripped.starts_with(END_OF_DATA_MARKER) {
            break;
        }

        let (wavelength, intensity) =
            parse_pair(stripped).map_err(|message| LoaderError::ParseError {
                path: path.to_path_buf(),
                line: idx + 1,
                message,
            })?;

        wavelengths.push(wavelength);
        intensities.push(intensity);
    }

    if wavelengths.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(Spectrum {
        wavelengths,
        intensities,
        source_path: Some(path.to_path_buf()),
    })
}

fn parse_pair(line: &str) -> std::result::Result<(f64, f64), String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 2 {
        return Err(format!("expected 2 columns, found {}", fields.len()));
    }
    let wavelength = fields[0]
        .parse::<f64>()
        .map_err(|_| format!("invalid wavelength: {}", fields[0]))?;
    let intensity = fields[1]
        .parse::<f64>()
        .map_err(|_| format!("invalid intensity: {}", fields[1]))?;
    Ok((wavelength, intensity))
}
