//! Host/plugin boundary for single-axis actuators.
//!
//! The host (see [`crate::daq_move`]) drives every actuator plugin through the
//! [`Actuator`] trait and depends on nothing else. In the other direction the
//! plugin only sees a [`MoveContext`]: the host-owned settings tree, the bound
//! and scaling helpers, the position bookkeeping, and a [`StatusSink`] for
//! [`ThreadCommand`] notifications.
//!
//! # Architecture
//!
//! ```text
//! DaqMove (host polling loop)
//!   └─ A: Actuator
//!        ├─ MoveContext         (settings, bounds, scaling, status sink)
//!        └─ ControllerHandle<C> (Owned = master, Borrowed = slave)
//!             └─ Arc<C>         (device driver)
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::AxisConfig;
use crate::error::{AppResult, DaqError};
use crate::parameter::{common_parameters, names, Parameter, ParameterValue, SettingsTree};
use crate::units;

// =============================================================================
// DataActuator
// =============================================================================

/// A scalar position tagged with its unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataActuator {
    /// Numeric value in `units`.
    pub value: f64,
    /// Length unit of `value`.
    pub units: String,
}

impl DataActuator {
    /// New position.
    pub fn new(value: f64, units: impl Into<String>) -> Self {
        Self {
            value,
            units: units.into(),
        }
    }

    /// Value expressed in `units`.
    pub fn value_in(&self, units: &str) -> AppResult<f64> {
        units::convert(self.value, &self.units, units)
    }

    /// Same position re-expressed in `units`.
    pub fn to_units(&self, units: &str) -> AppResult<Self> {
        Ok(Self::new(self.value_in(units)?, units))
    }
}

impl fmt::Display for DataActuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.units)
    }
}

// =============================================================================
// Status notifications
// =============================================================================

/// Notification from an actuator (or its host loop) to the host UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadCommand {
    /// Free-form status line.
    UpdateStatus(String),
    /// Position read while polling.
    CurrentPosition(DataActuator),
    /// The target was reached.
    MoveDone(DataActuator),
    /// A target was clamped to the configured bounds.
    OutOfBounds {
        /// Requested value in axis units.
        requested: f64,
        /// Value actually used.
        clamped: f64,
    },
    /// Polling gave up; carries the last position seen.
    Timeout(DataActuator),
}

impl ThreadCommand {
    /// Status line helper.
    pub fn status(message: impl Into<String>) -> Self {
        ThreadCommand::UpdateStatus(message.into())
    }
}

/// Sending half of the host's status channel.
///
/// Emitting never blocks; if the host dropped its receiver the message is
/// discarded.
#[derive(Debug, Clone)]
pub struct StatusSink {
    tx: mpsc::UnboundedSender<ThreadCommand>,
}

impl StatusSink {
    /// Wrap an existing sender.
    pub fn new(tx: mpsc::UnboundedSender<ThreadCommand>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ThreadCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Send a notification to the host.
    pub fn emit(&self, command: ThreadCommand) {
        if let Err(err) = self.tx.send(command) {
            tracing::debug!("status receiver dropped, discarding {:?}", err.0);
        }
    }
}

// =============================================================================
// MoveContext
// =============================================================================

/// Host-owned state and helpers handed to an actuator plugin.
#[derive(Debug)]
pub struct MoveContext {
    /// Plugin parameters followed by the common axis parameters.
    pub settings: SettingsTree,
    /// Last position read by the host.
    pub current_position: DataActuator,
    /// Pending target of the current move.
    pub target_value: DataActuator,
    /// Whether this actuator owns its controller.
    pub is_master: bool,
    axis_unit: String,
    status: StatusSink,
}

impl MoveContext {
    /// Build a context from the plugin's own parameters and the axis configuration.
    pub fn new(plugin_params: Vec<Parameter>, axis: &AxisConfig, status: StatusSink) -> Self {
        let mut settings = SettingsTree::new(plugin_params);
        settings.extend(common_parameters(axis));

        Self {
            settings,
            current_position: DataActuator::new(0.0, axis.units.clone()),
            target_value: DataActuator::new(0.0, axis.units.clone()),
            is_master: true,
            axis_unit: axis.units.clone(),
            status,
        }
    }

    /// Unit of this axis; never changes after construction.
    pub fn axis_unit(&self) -> &str {
        &self.axis_unit
    }

    /// Convergence tolerance in axis units.
    pub fn epsilon(&self) -> AppResult<f64> {
        self.settings.f64_value(names::EPSILON)
    }

    /// Move timeout in seconds.
    pub fn timeout_s(&self) -> AppResult<f64> {
        self.settings.f64_value(names::TIMEOUT)
    }

    /// Send a notification to the host.
    pub fn emit_status(&self, command: ThreadCommand) {
        self.status.emit(command);
    }

    /// Express `value` in axis units and clamp it to the bounds, if enabled.
    pub fn check_bound(&self, value: &DataActuator) -> AppResult<DataActuator> {
        let requested = value.value_in(&self.axis_unit)?;
        let mut clamped = requested;

        if self.settings.bool_value(names::BOUNDS_ENABLED)? {
            let min = self.settings.f64_value(names::MIN_BOUND)?;
            let max = self.settings.f64_value(names::MAX_BOUND)?;
            clamped = requested.max(min).min(max);
            if clamped != requested {
                tracing::warn!(
                    "target {} {} outside bounds [{}, {}], clamped to {}",
                    requested,
                    self.axis_unit,
                    min,
                    max,
                    clamped
                );
                self.emit_status(ThreadCommand::OutOfBounds { requested, clamped });
            }
        }

        Ok(DataActuator::new(clamped, self.axis_unit.clone()))
    }

    fn scaling(&self) -> AppResult<Option<(f64, f64)>> {
        if !self.settings.bool_value(names::SCALING_ENABLED)? {
            return Ok(None);
        }
        Ok(Some((
            self.settings.f64_value(names::SCALING)?,
            self.settings.f64_value(names::OFFSET)?,
        )))
    }

    /// Apply `map` under the current scaling; the result must be finite.
    fn scaled(
        &self,
        value: &DataActuator,
        map: impl Fn(f64, f64, f64) -> f64,
    ) -> AppResult<DataActuator> {
        let raw = value.value_in(&self.axis_unit)?;
        let mapped = match self.scaling()? {
            Some((scaling, offset)) => {
                let mapped = map(raw, scaling, offset);
                if scaling == 0.0 || !mapped.is_finite() {
                    return Err(DaqError::InvalidScaling {
                        scaling,
                        value: raw,
                    });
                }
                mapped
            }
            None => raw,
        };
        Ok(DataActuator::new(mapped, self.axis_unit.clone()))
    }

    /// Display position to device position: `(value - offset) / scaling`.
    pub fn set_position_with_scaling(&self, value: &DataActuator) -> AppResult<DataActuator> {
        self.scaled(value, |raw, scaling, offset| (raw - offset) / scaling)
    }

    /// Display step to device step: `value / scaling` (offset does not apply).
    pub fn set_position_relative_with_scaling(
        &self,
        value: &DataActuator,
    ) -> AppResult<DataActuator> {
        self.scaled(value, |raw, scaling, _| raw / scaling)
    }

    /// Device position to display position: `value * scaling + offset`.
    pub fn get_position_with_scaling(&self, value: &DataActuator) -> AppResult<DataActuator> {
        self.scaled(value, |raw, scaling, offset| raw * scaling + offset)
    }
}

// =============================================================================
// ControllerHandle
// =============================================================================

/// A driver either owned by this actuator (master) or borrowed from another
/// actuator on the same device (slave).
///
/// Only the owner may close the communication channel.
pub enum ControllerHandle<C: ?Sized> {
    /// Opened and closed by this actuator.
    Owned(Arc<C>),
    /// Opened and closed by another actuator.
    Borrowed(Arc<C>),
}

impl<C: ?Sized> ControllerHandle<C> {
    /// The driver, regardless of ownership.
    pub fn driver(&self) -> &Arc<C> {
        match self {
            ControllerHandle::Owned(driver) | ControllerHandle::Borrowed(driver) => driver,
        }
    }

    /// True for the master role.
    pub fn owns_controller(&self) -> bool {
        matches!(self, ControllerHandle::Owned(_))
    }
}

impl<C: ?Sized> fmt::Debug for ControllerHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerHandle::Owned(_) => write!(f, "Owned(<controller>)"),
            ControllerHandle::Borrowed(_) => write!(f, "Borrowed(<controller>)"),
        }
    }
}

// =============================================================================
// Actuator trait
// =============================================================================

/// Outcome of [`Actuator::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitStatus {
    /// Message shown to the user.
    pub info: String,
    /// Whether the actuator is usable.
    pub initialized: bool,
}

/// Contract every single-axis actuator plugin implements for the host.
///
/// The host serializes calls on one actuator, so methods take `&mut self`.
/// Driver failures are returned unchanged.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Device driver type, shareable between actuators.
    type Controller: ?Sized + Send + Sync;

    /// Host-owned state.
    fn context(&self) -> &MoveContext;

    /// Host-owned state, mutably.
    fn context_mut(&mut self) -> &mut MoveContext;

    /// The driver in use, for handing to slave actuators.
    fn controller(&self) -> Option<Arc<Self::Controller>>;

    /// Open (master) or borrow (slave) the controller and sync settings from it.
    async fn initialize(&mut self, controller: Option<Arc<Self::Controller>>)
        -> Result<InitStatus>;

    /// Current position, after the host's scaling.
    async fn get_position(&mut self) -> Result<DataActuator>;

    /// Start an absolute move.
    async fn move_absolute(&mut self, target: DataActuator) -> Result<()>;

    /// Start a relative move from `current_position`.
    async fn move_relative(&mut self, delta: DataActuator) -> Result<()>;

    /// Move to the device reference.
    async fn move_home(&mut self) -> Result<()>;

    /// Halt motion.
    async fn stop(&mut self) -> Result<()>;

    /// Apply a settings change. Unknown names are ignored.
    async fn on_setting_changed(&mut self, name: &str, value: &ParameterValue) -> Result<()>;

    /// Extra readiness check the host ANDs with its epsilon test while polling.
    async fn reached_target_condition(&mut self) -> bool {
        true
    }

    /// Release the controller; only a master closes the channel.
    async fn close(&mut self) -> Result<()>;
}
