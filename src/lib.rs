//! Monochromator actuator plugin for the rust_daq acquisition host.
//!
//! This library contains the actuator contract between the host and its
//! plugins, the host-side polling loop, the monochromator plugin itself, and
//! the spectrometer driver contract with a simulated implementation. It is
//! used by the `daq_monochromator` command-line runner and by the tests.

pub mod actuator;
pub mod config;
pub mod daq_move;
pub mod error;
pub mod hardware;
pub mod parameter;
pub mod plugins;
pub mod units;

pub use actuator::{Actuator, DataActuator, InitStatus, StatusSink, ThreadCommand};
pub use daq_move::DaqMove;
pub use error::{AppResult, DaqError};
pub use plugins::DaqMoveMonochromator;
