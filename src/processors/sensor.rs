//! Attitude sensor access over a serial line.
//!
//! The sensor streams lines of comma-separated ASCII floats:
//! `elevation,azimuth,roll[,...]`. Every read opens the port, waits for the
//! device to settle, drops whatever was buffered and takes the next line.

use std::io::{BufRead, BufReader};
use std::thread;

use log::{debug, warn};
use thiserror::Error;

use crate::config::SensorConfig;

/// Errors that can occur while reading the attitude sensor.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to clear serial input buffer: {0}")]
    Clear(#[source] serialport::Error),

    #[error("timed out waiting for a sensor line")]
    Timeout,

    #[error("serial read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sensor line is not valid UTF-8")]
    Decode,

    #[error("sensor line has {found} fields, need at least 3: {line:?}")]
    TooFewFields { found: usize, line: String },

    #[error("invalid number in sensor line: {0:?}")]
    InvalidNumber(String),
}

/// Instrument orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
}

/// Anything that can report the instrument orientation for the current cycle.
///
/// `None` means the reading failed and the current file must be skipped.
pub trait OrientationSource {
    fn read_orientation(&mut self) -> Option<OrientationSample>;
}

/// Parse one sensor line into an orientation sample.
///
/// The third field (roll) must be numeric but is discarded.
pub fn parse_orientation_line(line: &str) -> Result<OrientationSample, SensorError> {
    let line = line.trim();
    let fields: Vec<&str> = line.split(',').collect();

    if fields.len() < 3 {
        return Err(SensorError::TooFewFields {
            found: if line.is_empty() { 0 } else { fields.len() },
            line: line.to_string(),
        });
    }

    let parse = |field: &str| {
        field
            .trim()
            .parse::<f64>()
            .map_err(|_| SensorError::InvalidNumber(field.to_string()))
    };

    let elevation_deg = parse(fields[0])?;
    let azimuth_deg = parse(fields[1])?;
    let _roll = parse(fields[2])?;

    Ok(OrientationSample {
        elevation_deg,
        azimuth_deg,
    })
}

/// Read one line from an already opened sensor stream and parse it.
pub fn read_orientation_from<R: BufRead>(reader: &mut R) -> Result<OrientationSample, SensorError> {
    let mut raw = Vec::with_capacity(64);
    let n = reader.read_until(b'\n', &mut raw).map_err(|e| match e.kind() {
        std::io::ErrorKind::TimedOut => SensorError::Timeout,
        _ => SensorError::Io(e),
    })?;
    if n == 0 {
        return Err(SensorError::Timeout);
    }

    let line = String::from_utf8(raw).map_err(|_| SensorError::Decode)?;
    debug!("sensor line: {:?}", line.trim_end());
    parse_orientation_line(&line)
}

/// Serial-attached attitude sensor. A fresh connection is made on every read.
#[derive(Debug, Clone)]
pub struct SerialOrientationReader {
    config: SensorConfig,
}

impl SerialOrientationReader {
    pub fn new(config: SensorConfig) -> Self {
        Self { config }
    }

    /// Open the port, settle, flush input and read one sample.
    pub fn try_read(&self) -> Result<OrientationSample, SensorError> {
        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .timeout(self.config.timeout())
            .open()
            .map_err(|e| SensorError::Open {
                port: self.config.port.clone(),
                source: e,
            })?;

        thread::sleep(self.config.settle());
        port.clear(serialport::ClearBuffer::Input)
            .map_err(SensorError::Clear)?;

        let mut reader = BufReader::new(port);
        read_orientation_from(&mut reader)
    }
}

impl OrientationSource for SerialOrientationReader {
    fn read_orientation(&mut self) -> Option<OrientationSample> {
        match self.try_read() {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!("Could not read attitude sensor on {}: {}", self.config.port, e);
                None
            }
        }
    }
}
