//! Data processing modules.

pub mod cross_section;
pub mod dark;
pub mod monitor;
pub mod sensor;
pub mod solar;
pub mod spectrum;
pub mod watcher;

// Re-export key types for convenience
pub use cross_section::{
    convert_file, CrossSectionError, SpectralRange, WavelengthOrder, XsOutcome, XsRequest,
};
pub use dark::{compute_dark_baseline, DarkBaseline, DarkError};
pub use monitor::{FileOutcome, MonitorError, MonitorSummary, Station};
pub use sensor::{OrientationSample, OrientationSource, SensorError, SerialOrientationReader};
pub use solar::{solar_position, solar_zenith_deg, SolarError, SolarPosition};
pub use spectrum::{process_spectrum_file, MeasurementMetadata, ProcessedOutputs, SpectrumError};
pub use watcher::{FileWatcher, SeenFiles};
