//! Data writers for the instrument text formats.
//!
//! This module renders the fixed-layout files consumed downstream:
//! - `.spe` measured spectrum (6 header lines, `wavelength counts` rows)
//! - `.clb` instrumental calibration (4 header lines, one wavelength per row)
//! - `.xs` cross section (comment header, two-space delimited scientific rows)
//!
//! Every file is written to a sibling `.tmp` path and renamed into place, so a
//! reader never observes a half-written file under the final name.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Header comment of `.xs` files.
pub const XS_HEADER: &str = "X=wavelengths (nm)  Y=Cross section (cm^2/molecule)";

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to move the finished file into place.
    #[error("failed to rename '{from}' to '{to}': {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    /// Mismatched column lengths.
    #[error("column length mismatch: {left} wavelengths, {right} values")]
    LengthMismatch { left: usize, right: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Header fields shared by `.spe` and `.clb` files.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader<'a> {
    /// Input file name without extension
    pub stem: &'a str,
    pub central_wavelength_nm: f64,
    /// Measurement date, `dd/mm/YYYY`
    pub date: &'a str,
    /// Measurement time as fractional hours of the day
    pub fractional_hours: f64,
}

/// Viewing geometry line of a `.spe` file, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewingAngles {
    pub azimuth: f64,
    pub elevation: f64,
    pub zenith: f64,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write through `render` into a temporary sibling, then rename over `path`.
fn write_atomically<F>(path: &Path, render: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let tmp = temp_path(path);
    let tmp_str = tmp.display().to_string();

    let file = File::create(&tmp).map_err(|e| WriteError::CreateFile {
        path: tmp_str.clone(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);

    let written = render(&mut writer).and_then(|_| writer.flush());
    drop(writer);
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(WriteError::WriteFile {
            path: tmp_str,
            source: e,
        });
    }

    fs::rename(&tmp, path).map_err(|e| WriteError::Rename {
        from: tmp_str,
        to: path.display().to_string(),
        source: e,
    })
}

fn write_record_header<W: Write>(
    w: &mut W,
    label: &str,
    header: &RecordHeader<'_>,
) -> std::io::Result<()> {
    writeln!(w, "{}", label)?;
    writeln!(w, "{}", header.stem)?;
    writeln!(w, "{:.2}", header.central_wavelength_nm)?;
    writeln!(w, "{} {:.6}", header.date, header.fractional_hours)
}

/// Format a detector count with zero decimals.
///
/// Ties round to even and negative zero prints as `0`.
pub fn format_count(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let rounded = value.round_ties_even();
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{:.0}", rounded)
    }
}

/// Format a number like C's `%.18e`: 18 mantissa decimals, signed exponent of
/// at least two digits.
pub fn format_scientific(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let raw = format!("{:.18e}", value);
    match raw.split_once('e') {
        Some((mantissa, exponent)) => {
            let exp: i32 = exponent.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => raw,
    }
}

/// Write a measured-spectrum (`.spe`) file.
///
/// # Arguments
///
/// * `path` - Output file path, overwritten if present
/// * `header` - Name, central wavelength and time fields
/// * `angles` - Azimuth, elevation and solar zenith angle
/// * `scale_factor` - Value of the sixth header line
/// * `wavelengths` / `counts` - Data columns, same length
///
/// # Errors
///
/// Returns an error if the columns differ in length or the file cannot be
/// written.
pub fn write_spe(
    path: &Path,
    header: &RecordHeader<'_>,
    angles: &ViewingAngles,
    scale_factor: f64,
    wavelengths: &[f64],
    counts: &[f64],
) -> Result<()> {
    if wavelengths.len() != counts.len() {
        return Err(WriteError::LengthMismatch {
            left: wavelengths.len(),
            right: counts.len(),
        });
    }

    write_atomically(path, |w| {
        write_record_header(w, "Measured spectrum", header)?;
        writeln!(
            w,
            "{:.2} {:.2} {:.2}",
            angles.azimuth, angles.elevation, angles.zenith
        )?;
        writeln!(w, "{:?}", scale_factor)?;
        for (wavelength, count) in wavelengths.iter().zip(counts) {
            writeln!(w, "{:.2} {}", wavelength, format_count(*count))?;
        }
        Ok(())
    })
}

/// Write an instrumental calibration (`.clb`) file.
pub fn write_clb(path: &Path, header: &RecordHeader<'_>, wavelengths: &[f64]) -> Result<()> {
    write_atomically(path, |w| {
        write_record_header(w, "Instrumental calibration file", header)?;
        for wavelength in wavelengths {
            writeln!(w, "{:.2}", wavelength)?;
        }
        Ok(())
    })
}

/// Write a cross-section (`.xs`) file: `# ` comment header, then
/// `wavelength  value` rows in `%.18e` notation.
pub fn write_xs(path: &Path, wavelengths: &[f64], values: &[f64]) -> Result<()> {
    if wavelengths.len() != values.len() {
        return Err(WriteError::LengthMismatch {
            left: wavelengths.len(),
            right: values.len(),
        });
    }

    write_atomically(path, |w| {
        writeln!(w, "# {}", XS_HEADER)?;
        for (wavelength, value) in wavelengths.iter().zip(values) {
            writeln!(
                w,
                "{}  {}",
                format_scientific(*wavelength),
                format_scientific(*value)
            )?;
        }
        Ok(())
    })
}

/// Dump a dark baseline as `index value` rows.
pub fn write_baseline(path: &Path, values: &[f64]) -> Result<()> {
    write_atomically(path, |w| {
        for (index, value) in values.iter().enumerate() {
            writeln!(w, "{} {:.6}", index, value)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn header() -> RecordHeader<'static> {
        RecordHeader {
            stem: "USB2G_0001",
            central_wavelength_nm: 320.0,
            date: "16/10/2026",
            fractional_hours: 12.5,
        }
    }

    #[test]
    fn test_write_spe_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("USB2G_0001.spe");
        let angles = ViewingAngles {
            azimuth: 200.3,
            elevation: 10.5,
            zenith: 35.129,
        };

        write_spe(&path, &header(), &angles, 1.0, &[300.123, 300.456], &[99.6, -0.2]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "Measured spectrum");
        assert_eq!(lines[1], "USB2G_0001");
        assert_eq!(lines[2], "320.00");
        assert_eq!(lines[3], "16/10/2026 12.500000");
        assert_eq!(lines[4], "200.30 10.50 35.13");
        assert_eq!(lines[5], "1.0");
        assert_eq!(lines[6], "300.12 100");
        assert_eq!(lines[7], "300.46 0");
        assert_eq!(lines.len(), 8);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_write_spe_length_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.spe");
        let angles = ViewingAngles {
            azimuth: 0.0,
            elevation: 0.0,
            zenith: 0.0,
        };

        let result = write_spe(&path, &header(), &angles, 1.0, &[1.0, 2.0], &[1.0]);

        match result.unwrap_err() {
            WriteError::LengthMismatch { left, right } => {
                assert_eq!(left, 2);
                assert_eq!(right, 1);
            }
            _ => panic!("Expected LengthMismatch error"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_write_clb_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("USB2G_0001.clb");

        write_clb(&path, &header(), &[300.0, 300.333]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Instrumental calibration file\nUSB2G_0001\n320.00\n16/10/2026 12.500000\n300.00\n300.33\n"
        );
    }

    #[test]
    fn test_write_overwrites_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.clb");
        fs::write(&path, "stale content that is longer than the new file\n".repeat(10)).unwrap();

        write_clb(&path, &header(), &[1.0]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 5);
    }

    #[test]
    fn test_write_xs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("SO2_298K.xs");

        write_xs(&path, &[10000.0, 5000.0], &[0.1, 2.5e-20]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "# X=wavelengths (nm)  Y=Cross section (cm^2/molecule)");
        assert_eq!(lines[1], "1.000000000000000000e+04  1.000000000000000056e-01");
        assert_eq!(lines[2], "5.000000000000000000e+03  2.499999999999999938e-20");
    }

    #[test]
    fn test_write_baseline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dark.txt");

        write_baseline(&path, &[100.25, 98.0]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "0 100.250000\n1 98.000000\n");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(1510.4), "1510");
        assert_eq!(format_count(2.5), "2");
        assert_eq!(format_count(3.5), "4");
        assert_eq!(format_count(-0.4), "0");
        assert_eq!(format_count(-12.6), "-13");
        assert_eq!(format_count(f64::NAN), "nan");
        assert_eq!(format_count(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_format_scientific() {
        assert_eq!(format_scientific(6666.666666666667), "6.666666666666666970e+03");
        assert_eq!(format_scientific(0.0), "0.000000000000000000e+00");
        assert_eq!(format_scientific(-1.5e-123), "-1.499999999999999921e-123");
        assert_eq!(format_scientific(-0.75), "-7.500000000000000000e-01");
        assert_eq!(format_scientific(f64::NAN), "nan");
    }
}
