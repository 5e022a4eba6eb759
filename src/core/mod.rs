//! Core data types and I/O operations.

pub mod loaders;
pub mod writers;

pub use loaders::{load_spectrum, LoaderError, Spectrum};
pub use writers::{
    write_baseline, write_clb, write_spe, write_xs, RecordHeader, ViewingAngles, WriteError,
};
