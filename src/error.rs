//! Custom error types for the monochromator plugin.
//!
//! This module defines the primary error type, `DaqError`, shared by the plugin,
//! the host polling loop, and the simulated spectrometer. Using the `thiserror`
//! crate, it gives every failure a stable variant so callers (and tests) can
//! match on it after it has travelled through an `anyhow::Error`.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps [`ConfigError`](crate::config::ConfigError), covering both
//!   figment load failures and rejected values.
//! - **`Instrument`**: Anything the driver reports, from a refused connection to
//!   a wavelength the grating cannot reach.
//! - **`OperationNotSupported`**: The plugin cannot perform the requested
//!   operation at all. The host must treat this as fatal for the current move.
//! - **`NotInitialized`**: A motion or settings call arrived before `initialize`.
//! - **`Parameter*`** / **`UnknownParameter`**: Rejections from the host
//!   settings tree.
//! - **`InvalidScaling`**: The axis scaling would send a non-finite position
//!   to the device.
//! - **`MoveTimeout`**: The host polling loop gave up waiting for the target.
//!
//! Capability traits return `anyhow::Result`, exactly like the hardware
//! capability traits they are modelled on; a `DaqError` converts into it with
//! `?` and can be recovered with `downcast_ref::<DaqError>()`.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors raised by the monochromator plugin and its host.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Failure reported by the spectrometer driver.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// The plugin does not implement the requested operation.
    #[error("Plugin does not support operation: {0}")]
    OperationNotSupported(String),

    /// A call that needs the controller arrived before `initialize`.
    #[error("Actuator is not initialized")]
    NotInitialized,

    /// A position could not be expressed in the requested unit.
    #[error("Cannot convert from '{from}' to '{to}'")]
    UnitMismatch {
        /// Unit the value carries.
        from: String,
        /// Unit that was requested.
        to: String,
    },

    /// No parameter with this name exists in the settings tree.
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// The value is not one of the allowed list options.
    #[error("Invalid choice '{value}' for parameter '{name}'")]
    ParameterInvalidChoice {
        /// Parameter name.
        name: String,
        /// Rejected value.
        value: String,
    },

    /// A list parameter was given no options to choose from.
    #[error("Parameter '{0}' needs at least one option")]
    ParameterNoChoices(String),

    /// The parameter cannot be written by the user.
    #[error("Parameter '{0}' is read-only")]
    ParameterReadOnly(String),

    /// The value has the wrong type for the parameter.
    #[error("Parameter '{name}' expects a {expected} value")]
    ParameterType {
        /// Parameter name.
        name: String,
        /// Expected value type.
        expected: &'static str,
    },

    /// Scaling settings that cannot map a position to the device.
    #[error("Scaling factor {scaling} cannot convert {value} to a device position")]
    InvalidScaling {
        /// Scaling factor in use.
        scaling: f64,
        /// Position being converted.
        value: f64,
    },

    /// The polling loop did not see the target reached in time.
    #[error("Move to {target} did not complete within {elapsed_ms} ms")]
    MoveTimeout {
        /// Requested target, in axis units.
        target: f64,
        /// Time spent polling.
        elapsed_ms: u128,
    },
}
