//! Hardware layer: the spectrometer driver contract and its simulated implementation.

pub mod mock;
pub mod spectrometer;

pub use mock::MockSpectrometer;
pub use spectrometer::{SetType, SharedSpectrometer, Spectrometer};
