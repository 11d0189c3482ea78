//! Spectrometer driver contract
//!
//! The monochromator plugin never talks to a transport directly. It calls a
//! driver implementing [`Spectrometer`], which owns the physical link (serial,
//! USB, vendor SDK) and exposes the wavelength stage plus its two settings.
//!
//! # Contract
//! - Wavelengths are in nanometres, the device-native unit
//! - `set_wavelength` initiates motion and may return before it completes;
//!   the host polls `wavelength` until the target is reached
//! - `tau` is in seconds
//! - All methods take `&self`; implementations use interior mutability so a
//!   single driver can be shared by several actuators
//!
//! # Example
//!
//! ```rust,ignore
//! let driver: SharedSpectrometer = Arc::new(MockSpectrometer::new());
//! if driver.open_communication().await? {
//!     driver.set_wavelength(532.0, SetType::Absolute).await?;
//!     driver.set_wavelength(-2.0, SetType::Relative).await?;
//!     println!("now at {} nm", driver.wavelength().await?);
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// How `set_wavelength` interprets its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetType {
    /// Value is the target wavelength.
    #[default]
    Absolute,
    /// Value is added to the current wavelength.
    Relative,
}

impl SetType {
    /// Short name used in logs ("abs" / "rel").
    pub fn as_str(&self) -> &'static str {
        match self {
            SetType::Absolute => "abs",
            SetType::Relative => "rel",
        }
    }
}

/// Capability: monochromator wavelength stage with tau and grating settings.
#[async_trait]
pub trait Spectrometer: Send + Sync {
    /// Open the communication channel.
    ///
    /// # Returns
    /// - Ok(true) when the device answered
    /// - Ok(false) when the device is absent or refused the connection
    /// - Err on a transport failure
    async fn open_communication(&self) -> Result<bool>;

    /// Close the communication channel.
    async fn close_communication(&self) -> Result<()>;

    /// Current wavelength in nm (approximate while moving).
    async fn wavelength(&self) -> Result<f64>;

    /// Move the grating to a wavelength.
    async fn set_wavelength(&self, value: f64, set_type: SetType) -> Result<()>;

    /// Move to the mechanical reference wavelength.
    async fn find_reference(&self) -> Result<()>;

    /// Detector time constant in seconds.
    async fn tau(&self) -> Result<f64>;

    /// Set the detector time constant in seconds.
    async fn set_tau(&self, seconds: f64) -> Result<()>;

    /// Currently selected grating.
    async fn grating(&self) -> Result<String>;

    /// Select one of [`gratings`](Spectrometer::gratings).
    async fn set_grating(&self, grating: &str) -> Result<()>;

    /// Installed gratings.
    async fn gratings(&self) -> Result<Vec<String>>;
}

/// Driver handle shared between actuators controlling the same device.
pub type SharedSpectrometer = Arc<dyn Spectrometer>;
