//! Actuator plugins.
//!
//! Each plugin implements [`Actuator`](crate::actuator::Actuator) for one
//! family of devices and is driven by [`DaqMove`](crate::daq_move::DaqMove).

pub mod monochromator;

pub use monochromator::DaqMoveMonochromator;
