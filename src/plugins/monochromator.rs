//! Monochromator wavelength actuator.
//!
//! Bridges the host's [`Actuator`] contract to a [`Spectrometer`] driver: one
//! host call, one driver call, with the host's bound and scaling helpers
//! applied on the way in and out. Positions are exchanged with the driver in
//! nanometres and converted to the axis unit for the host.
//!
//! Two settings belong to the plugin:
//!
//! | name      | title      | type  | host unit | driver unit |
//! |-----------|------------|-------|-----------|-------------|
//! | `tau`     | Tau (ms)   | float | ms        | s           |
//! | `grating` | Grating    | list  | -         | -           |
//!
//! # Example
//!
//! ```rust,ignore
//! let (status, mut rx) = StatusSink::channel();
//! let mut mono = DaqMoveMonochromator::with_mock(&config, status);
//! let init = mono.initialize(None).await?;
//! assert!(init.initialized);
//! mono.move_absolute(DataActuator::new(532.0, "nm")).await?;
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::actuator::{
    Actuator, ControllerHandle, DataActuator, InitStatus, MoveContext, StatusSink, ThreadCommand,
};
use crate::config::{MonochromatorConfig, PluginSettingsConfig};
use crate::error::DaqError;
use crate::hardware::{MockSpectrometer, SetType, SharedSpectrometer, Spectrometer};
use crate::parameter::{Parameter, ParameterValue};

/// Unit the spectrometer driver works in.
pub const DEVICE_UNITS: &str = "nm";

/// Setting name of the detector time constant.
pub const TAU: &str = "tau";

/// Setting name of the grating selection.
pub const GRATING: &str = "grating";

/// Builds the driver a master actuator owns.
pub type DriverFactory = Box<dyn Fn() -> SharedSpectrometer + Send + Sync>;

/// Actuator plugin for a monochromator wavelength stage.
pub struct DaqMoveMonochromator {
    ctx: MoveContext,
    factory: DriverFactory,
    controller: Option<ControllerHandle<dyn Spectrometer>>,
}

impl DaqMoveMonochromator {
    /// Create the plugin. `factory` is only called when no controller is shared.
    pub fn new(config: &MonochromatorConfig, status: StatusSink, factory: DriverFactory) -> Self {
        Self {
            ctx: MoveContext::new(Self::params(&config.settings), &config.axis, status),
            factory,
            controller: None,
        }
    }

    /// Create the plugin backed by the simulated spectrometer.
    pub fn with_mock(config: &MonochromatorConfig, status: StatusSink) -> Self {
        let driver_config = config.driver.clone();
        Self::new(
            config,
            status,
            Box::new(move || -> SharedSpectrometer {
                Arc::new(MockSpectrometer::from_config(&driver_config))
            }),
        )
    }

    /// Plugin parameters, before the common axis ones.
    pub fn params(settings: &PluginSettingsConfig) -> Vec<Parameter> {
        vec![
            Parameter::float(TAU, "Tau (ms)", settings.tau_ms).with_suffix("ms"),
            Parameter::list(
                GRATING,
                "Grating",
                settings.grating_choices.clone(),
                settings.grating.clone(),
            ),
        ]
    }

    /// Whether this actuator owns its controller.
    pub fn is_master(&self) -> bool {
        self.controller
            .as_ref()
            .map(ControllerHandle::owns_controller)
            .unwrap_or(self.ctx.is_master)
    }

    fn driver(&self) -> Result<&SharedSpectrometer, DaqError> {
        self.controller
            .as_ref()
            .map(ControllerHandle::driver)
            .ok_or(DaqError::NotInitialized)
    }

    /// Pull tau, the grating list and the active grating from the driver into
    /// the settings tree.
    async fn sync_settings_from_driver(&mut self) -> Result<()> {
        let driver = self.driver()?.clone();

        let tau_s = driver.tau().await?;
        self.ctx
            .settings
            .child(TAU)?
            .update(ParameterValue::Float(tau_s * 1000.0))?;

        let gratings = driver.gratings().await?;
        self.ctx.settings.set_limits(GRATING, gratings)?;
        let active = driver.grating().await?;
        self.ctx
            .settings
            .child(GRATING)?
            .update(ParameterValue::String(active))?;
        Ok(())
    }
}

#[async_trait]
impl Actuator for DaqMoveMonochromator {
    type Controller = dyn Spectrometer;

    fn context(&self) -> &MoveContext {
        &self.ctx
    }

    fn context_mut(&mut self) -> &mut MoveContext {
        &mut self.ctx
    }

    fn controller(&self) -> Option<SharedSpectrometer> {
        self.controller.as_ref().map(|c| c.driver().clone())
    }

    async fn initialize(&mut self, controller: Option<SharedSpectrometer>) -> Result<InitStatus> {
        // A previously owned channel is released before it is replaced.
        self.close().await?;

        let (handle, initialized) = match controller {
            None => {
                let driver = (self.factory)();
                let opened = driver.open_communication().await?;
                (ControllerHandle::Owned(driver), opened)
            }
            Some(shared) => (ControllerHandle::Borrowed(shared), true),
        };

        self.ctx.is_master = handle.owns_controller();
        self.controller = Some(handle);

        if !initialized {
            tracing::warn!("Monochromator: communication channel could not be opened");
            return Ok(InitStatus {
                info: "Monochromator communication could not be opened".to_string(),
                initialized: false,
            });
        }

        self.sync_settings_from_driver().await?;
        tracing::info!(
            "Monochromator initialized as {}",
            if self.ctx.is_master { "master" } else { "slave" }
        );

        Ok(InitStatus {
            info: "Monochromator initialized!!!".to_string(),
            initialized: true,
        })
    }

    async fn get_position(&mut self) -> Result<DataActuator> {
        let wavelength = self.driver()?.wavelength().await?;
        let pos = DataActuator::new(wavelength, DEVICE_UNITS).to_units(self.ctx.axis_unit())?;
        Ok(self.ctx.get_position_with_scaling(&pos)?)
    }

    async fn move_absolute(&mut self, target: DataActuator) -> Result<()> {
        let driver = self.driver()?.clone();

        let target = self.ctx.check_bound(&target)?;
        self.ctx.target_value = target.clone();
        let device = self.ctx.set_position_with_scaling(&target)?;

        tracing::debug!("Monochromator: absolute move to {}", device);
        driver
            .set_wavelength(device.value_in(DEVICE_UNITS)?, SetType::Absolute)
            .await?;
        self.ctx
            .emit_status(ThreadCommand::status("Moved Monochromator to set Wavelength!"));
        Ok(())
    }

    async fn move_relative(&mut self, delta: DataActuator) -> Result<()> {
        let driver = self.driver()?.clone();
        let unit = self.ctx.axis_unit().to_string();

        let current = self.ctx.current_position.value_in(&unit)?;
        let requested = DataActuator::new(current + delta.value_in(&unit)?, unit.clone());
        let bounded = self.ctx.check_bound(&requested)?;
        let delta = DataActuator::new(bounded.value - current, unit);
        self.ctx.target_value = bounded;

        let step = self.ctx.set_position_relative_with_scaling(&delta)?;
        tracing::debug!("Monochromator: relative move by {}", step);
        driver
            .set_wavelength(step.value_in(DEVICE_UNITS)?, SetType::Relative)
            .await?;
        self.ctx.emit_status(ThreadCommand::status("Did relative move!"));
        Ok(())
    }

    async fn move_home(&mut self) -> Result<()> {
        self.driver()?.find_reference().await?;
        self.ctx.emit_status(ThreadCommand::status(
            "Monochromator moved to Reference point of 600 nm",
        ));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        // The driver has no halt command.
        tracing::warn!("Monochromator: stop requested but motion cannot be halted");
        Err(DaqError::OperationNotSupported("stop_motion".to_string()).into())
    }

    async fn on_setting_changed(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        match name {
            TAU => {
                let ms = value.as_f64().ok_or_else(|| DaqError::ParameterType {
                    name: TAU.to_string(),
                    expected: "float",
                })?;
                self.driver()?.set_tau(ms / 1000.0).await?;
            }
            GRATING => {
                let grating = value.as_str().ok_or_else(|| DaqError::ParameterType {
                    name: GRATING.to_string(),
                    expected: "string",
                })?;
                self.driver()?.set_grating(grating).await?;
            }
            other => {
                tracing::trace!("Monochromator: ignoring setting '{}'", other);
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        match self.controller.take() {
            Some(ControllerHandle::Owned(driver)) => {
                driver.close_communication().await?;
                tracing::info!("Monochromator: communication closed");
            }
            Some(ControllerHandle::Borrowed(_)) => {
                tracing::debug!("Monochromator: releasing borrowed controller");
            }
            None => {}
        }
        Ok(())
    }
}
