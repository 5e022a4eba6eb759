//! HITRAN cross-section conversion to the wavelength-indexed `.xs` format.
//!
//! HITRAN `.xsc` files carry one header line followed by cross-section
//! values on an implicit, evenly spaced wavenumber grid. The grid bounds are
//! supplied by the caller; the converter rebuilds the grid, converts each
//! point to nm with `1e7 / wavenumber` and writes two columns.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use crate::core::writers::{write_xs, WriteError};

/// Accepted input extensions.
const INPUT_EXTENSIONS: [&str; 2] = ["xsc", "txt"];

/// Errors that can occur during cross-section conversion.
#[derive(Debug, Error)]
pub enum CrossSectionError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value {token:?} on line {line} of {path}")]
    Parse {
        path: PathBuf,
        line: usize,
        token: String,
    },

    #[error("Input file must be an existing .xsc or .txt file: {0}")]
    InvalidInput(PathBuf),

    #[error("Invalid spectral range: {0}")]
    InvalidRange(String),

    #[error("Output directory does not exist: {0}")]
    OutputDirMissing(PathBuf),

    #[error("{0} must not be empty")]
    EmptyName(&'static str),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Result type for cross-section operations.
pub type Result<T> = std::result::Result<T, CrossSectionError>;

/// Wavenumber bounds in cm⁻¹, `start < end`, both positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralRange {
    start: f64,
    end: f64,
}

impl SpectralRange {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        for (name, value) in [("start", start), ("end", end)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(CrossSectionError::InvalidRange(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if start >= end {
            return Err(CrossSectionError::InvalidRange(format!(
                "start ({}) must be less than end ({})",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }
}

/// Row order of the written file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WavelengthOrder {
    /// Input order, i.e. descending wavelength for an ascending wavenumber grid
    #[default]
    AsComputed,
    /// Ascending wavelength
    Ascending,
}

/// One converted sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossSectionPoint {
    pub wavelength_nm: f64,
    pub value: f64,
}

/// Read every value after the header line, flattened across lines.
pub fn read_cross_section_values(path: &Path) -> Result<Vec<f64>> {
    let read_err = |source| CrossSectionError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(read_err)?;
    let reader = BufReader::new(file);

    let mut values = Vec::new();
    for (idx, line) in reader.lines().enumerate().skip(1) {
        let line = line.map_err(read_err)?;
        for token in line.split_whitespace() {
            let value = token.parse::<f64>().map_err(|_| CrossSectionError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                token: token.to_string(),
            })?;
            values.push(value);
        }
    }

    Ok(values)
}

/// `n` evenly spaced points from `start` to `end`, both inclusive.
pub fn wavenumber_axis(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut axis: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
            axis[n - 1] = end;
            axis
        }
    }
}

/// Pair each value with the wavelength of its grid point.
pub fn convert(
    values: &[f64],
    range: &SpectralRange,
    order: WavelengthOrder,
) -> Vec<CrossSectionPoint> {
    let axis = wavenumber_axis(range.start, range.end, values.len());
    let mut points: Vec<CrossSectionPoint> = axis
        .iter()
        .zip(values)
        .map(|(wavenumber, value)| CrossSectionPoint {
            wavelength_nm: 1e7 / wavenumber,
            value: *value,
        })
        .collect();

    if order == WavelengthOrder::Ascending {
        points.reverse();
    }
    points
}

/// A fully specified conversion job.
#[derive(Debug, Clone)]
pub struct XsRequest {
    pub input: PathBuf,
    pub range: SpectralRange,
    /// Molecule name, e.g. `SO2`
    pub molecule: String,
    /// Free description, e.g. `298K`
    pub description: String,
    pub output_dir: PathBuf,
    pub order: WavelengthOrder,
}

impl XsRequest {
    /// Check the input file and output directory before any work is done.
    pub fn validate(&self) -> Result<()> {
        let extension_ok = self
            .input
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| INPUT_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
            .unwrap_or(false);
        if !self.input.is_file() || !extension_ok {
            return Err(CrossSectionError::InvalidInput(self.input.clone()));
        }
        if self.molecule.trim().is_empty() {
            return Err(CrossSectionError::EmptyName("molecule"));
        }
        if !self.output_dir.is_dir() {
            return Err(CrossSectionError::OutputDirMissing(self.output_dir.clone()));
        }
        Ok(())
    }

    /// `<output_dir>/<molecule>_<description>.xs`
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.xs", self.molecule, self.description))
    }
}

/// Summary of a finished conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct XsOutcome {
    pub output: PathBuf,
    pub points: usize,
}

/// Validate `request`, convert the input and write the `.xs` file.
pub fn convert_file(request: &XsRequest) -> Result<XsOutcome> {
    request.validate()?;

    let values = read_cross_section_values(&request.input)?;
    let points = convert(&values, &request.range, request.order);

    let wavelengths: Vec<f64> = points.iter().map(|p| p.wavelength_nm).collect();
    let column: Vec<f64> = points.iter().map(|p| p.value).collect();

    let output = request.output_path();
    write_xs(&output, &wavelengths, &column)?;

    info!("Cross-section file written: {} ({} points)", output.display(), points.len());

    Ok(XsOutcome {
        output,
        points: points.len(),
    })
}
