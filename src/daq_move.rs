//! Host-side control of a single actuator.
//!
//! `DaqMove` is what the acquisition framework holds for every axis. It owns
//! the plugin, serializes calls into it, and runs the polling loop that turns
//! "start a move" into "the move is done":
//!
//! ```text
//! move_abs(target)
//!   └─ plugin.move_absolute(target)
//!   └─ loop every poll_interval
//!        pos = plugin.get_position()        -> CurrentPosition
//!        |pos - target| < epsilon
//!          && plugin.reached_target_condition() -> MoveDone, return
//!        elapsed > timeout                  -> Timeout, Err(MoveTimeout)
//! ```
//!
//! `stop` failures are returned as-is: the host must treat an actuator that
//! cannot halt as fatal for the current move.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use crate::actuator::{Actuator, DataActuator, InitStatus, ThreadCommand};
use crate::config::AxisConfig;
use crate::error::DaqError;
use crate::parameter::ParameterValue;

/// Host wrapper around one actuator plugin.
pub struct DaqMove<A: Actuator> {
    title: String,
    actuator: A,
    poll_interval: Duration,
    initialized: bool,
}

impl<A: Actuator> DaqMove<A> {
    /// Wrap a plugin. Polling cadence comes from the axis configuration.
    pub fn new(title: impl Into<String>, actuator: A, axis: &AxisConfig) -> Self {
        Self {
            title: title.into(),
            actuator,
            poll_interval: Duration::from_millis(axis.poll_interval_ms.max(1)),
            initialized: false,
        }
    }

    /// Axis title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Whether `init` succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The wrapped plugin.
    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// The wrapped plugin, mutably.
    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    /// Driver of an initialized master, for sharing with slave axes.
    pub fn shared_controller(&self) -> Option<Arc<A::Controller>> {
        self.actuator.controller()
    }

    /// Initialize the plugin, as master (`None`) or slave of `controller`.
    #[tracing::instrument(skip(self, controller), fields(axis = %self.title))]
    pub async fn init(&mut self, controller: Option<Arc<A::Controller>>) -> Result<InitStatus> {
        let status = self.actuator.initialize(controller).await?;
        self.initialized = status.initialized;

        let ctx = self.actuator.context();
        ctx.emit_status(ThreadCommand::status(status.info.clone()));
        if status.initialized {
            tracing::info!("{}", status.info);
            self.get_position().await?;
        } else {
            tracing::warn!("{}", status.info);
        }
        Ok(status)
    }

    fn ensure_initialized(&self) -> Result<(), DaqError> {
        if self.initialized {
            Ok(())
        } else {
            Err(DaqError::NotInitialized)
        }
    }

    /// Read the position, record it as current, and report it.
    pub async fn get_position(&mut self) -> Result<DataActuator> {
        self.ensure_initialized()?;
        let pos = self.actuator.get_position().await?;
        let ctx = self.actuator.context_mut();
        ctx.current_position = pos.clone();
        ctx.emit_status(ThreadCommand::CurrentPosition(pos.clone()));
        Ok(pos)
    }

    /// Move to an absolute target (axis units) and wait until reached.
    #[tracing::instrument(skip(self), fields(axis = %self.title))]
    pub async fn move_abs(&mut self, target: f64) -> Result<DataActuator> {
        self.ensure_initialized()?;
        let unit = self.actuator.context().axis_unit().to_string();
        self.actuator
            .move_absolute(DataActuator::new(target, unit))
            .await?;
        self.poll_moving().await
    }

    /// Move by `delta` (axis units) from the current position and wait until reached.
    #[tracing::instrument(skip(self), fields(axis = %self.title))]
    pub async fn move_rel(&mut self, delta: f64) -> Result<DataActuator> {
        self.get_position().await?;
        let unit = self.actuator.context().axis_unit().to_string();
        self.actuator
            .move_relative(DataActuator::new(delta, unit))
            .await?;
        self.poll_moving().await
    }

    /// Send the axis to its reference and wait until the position settles.
    #[tracing::instrument(skip(self), fields(axis = %self.title))]
    pub async fn move_home(&mut self) -> Result<DataActuator> {
        self.ensure_initialized()?;
        self.actuator.move_home().await?;
        self.poll_settled().await
    }

    /// Ask the plugin to halt. Failure is fatal for the current move.
    pub async fn stop(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if let Err(err) = self.actuator.stop().await {
            tracing::error!(axis = %self.title, "stop failed, motion not halted: {:#}", err);
            return Err(err);
        }
        Ok(())
    }

    /// Change a setting in the tree, then let the plugin apply it.
    ///
    /// Before `init` the value is only stored.
    pub async fn set_setting(&mut self, name: &str, value: ParameterValue) -> Result<()> {
        let stored = self.actuator.context().settings.set_value(name, value)?;
        tracing::debug!(axis = %self.title, "setting {} = {}", name, stored);
        if self.initialized {
            self.actuator.on_setting_changed(name, &stored).await?;
        }
        Ok(())
    }

    /// Close the plugin.
    pub async fn quit(&mut self) -> Result<()> {
        self.actuator.close().await?;
        self.initialized = false;
        Ok(())
    }

    fn move_timeout(&self) -> Result<Duration> {
        let seconds = self.actuator.context().timeout_s()?;
        Ok(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO))
    }

    /// Poll until within epsilon of `target_value` and the plugin agrees.
    async fn poll_moving(&mut self) -> Result<DataActuator> {
        let target = self.actuator.context().target_value.clone();
        let epsilon = self.actuator.context().epsilon()?;
        let timeout = self.move_timeout()?;
        let target_value = target.value_in(self.actuator.context().axis_unit())?;

        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let pos = self.get_position().await?;
            let distance = (pos.value - target_value).abs();
            let epsilon_reached = distance < epsilon;

            if epsilon_reached && self.actuator.reached_target_condition().await {
                tracing::info!(axis = %self.title, "reached {}", pos);
                self.actuator
                    .context()
                    .emit_status(ThreadCommand::MoveDone(pos.clone()));
                return Ok(pos);
            }

            if start.elapsed() > timeout {
                return Err(self.timed_out(pos, target_value, start));
            }
        }
    }

    /// Poll until two consecutive reads agree within epsilon.
    async fn poll_settled(&mut self) -> Result<DataActuator> {
        let epsilon = self.actuator.context().epsilon()?;
        let timeout = self.move_timeout()?;

        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut previous = self.get_position().await?;

        loop {
            ticker.tick().await;
            let pos = self.get_position().await?;
            if (pos.value - previous.value).abs() < epsilon
                && self.actuator.reached_target_condition().await
            {
                self.actuator.context_mut().target_value = pos.clone();
                self.actuator
                    .context()
                    .emit_status(ThreadCommand::MoveDone(pos.clone()));
                return Ok(pos);
            }

            if start.elapsed() > timeout {
                let target = pos.value;
                return Err(self.timed_out(pos, target, start));
            }
            previous = pos;
        }
    }

    fn timed_out(&self, pos: DataActuator, target: f64, start: Instant) -> anyhow::Error {
        let elapsed_ms = start.elapsed().as_millis();
        tracing::warn!(
            axis = %self.title,
            "move to {} timed out after {} ms at {}",
            target,
            elapsed_ms,
            pos
        );
        self.actuator
            .context()
            .emit_status(ThreadCommand::Timeout(pos));
        DaqError::MoveTimeout { target, elapsed_ms }.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{MoveContext, StatusSink};
    use crate::parameter::{names, Parameter};
    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Actuator that reports whatever was last set, optionally never finishing.
    struct EchoActuator {
        ctx: MoveContext,
        position: f64,
        ready: bool,
        stuck: bool,
    }

    impl EchoActuator {
        fn new() -> (Self, UnboundedReceiver<ThreadCommand>) {
            let (sink, rx) = StatusSink::channel();
            let params = vec![Parameter::float("gain", "Gain", 1.0)];
            let actuator = Self {
                ctx: MoveContext::new(params, &AxisConfig::default(), sink),
                position: 0.0,
                ready: true,
                stuck: false,
            };
            (actuator, rx)
        }
    }

    #[async_trait]
    impl Actuator for EchoActuator {
        type Controller = ();

        fn context(&self) -> &MoveContext {
            &self.ctx
        }

        fn context_mut(&mut self) -> &mut MoveContext {
            &mut self.ctx
        }

        fn controller(&self) -> Option<Arc<()>> {
            None
        }

        async fn initialize(&mut self, _controller: Option<Arc<()>>) -> Result<InitStatus> {
            Ok(InitStatus {
                info: "echo ready".into(),
                initialized: true,
            })
        }

        async fn get_position(&mut self) -> Result<DataActuator> {
            Ok(DataActuator::new(self.position, "nm"))
        }

        async fn move_absolute(&mut self, target: DataActuator) -> Result<()> {
            let target = self.ctx.check_bound(&target)?;
            self.ctx.target_value = target.clone();
            if !self.stuck {
                self.position = target.value;
            }
            Ok(())
        }

        async fn move_relative(&mut self, delta: DataActuator) -> Result<()> {
            let target = DataActuator::new(self.ctx.current_position.value + delta.value, "nm");
            self.move_absolute(target).await
        }

        async fn move_home(&mut self) -> Result<()> {
            self.position = 0.0;
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            Err(DaqError::OperationNotSupported("stop_motion".into()).into())
        }

        async fn on_setting_changed(&mut self, _name: &str, _value: &ParameterValue) -> Result<()> {
            Ok(())
        }

        async fn reached_target_condition(&mut self) -> bool {
            self.ready
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    async fn started() -> (DaqMove<EchoActuator>, UnboundedReceiver<ThreadCommand>) {
        let (actuator, rx) = EchoActuator::new();
        let mut axis = DaqMove::new("echo", actuator, &AxisConfig::default());
        axis.init(None).await.unwrap();
        (axis, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ThreadCommand>) -> Vec<ThreadCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_abs_converges_and_reports_done() {
        let (mut axis, mut rx) = started().await;
        assert_eq!(axis.title(), "echo");
        drain(&mut rx);

        let pos = axis.move_abs(42.0).await.unwrap();
        assert_eq!(pos.value, 42.0);
        assert!(drain(&mut rx).contains(&ThreadCommand::MoveDone(DataActuator::new(42.0, "nm"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_rel_from_current_position() {
        let (mut axis, _rx) = started().await;
        axis.move_abs(10.0).await.unwrap();
        let pos = axis.move_rel(-4.0).await.unwrap();
        assert_eq!(pos.value, 6.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_target_never_reached() {
        let (mut axis, mut rx) = started().await;
        axis.actuator_mut().stuck = true;
        axis.set_setting(names::TIMEOUT, 1.0.into()).await.unwrap();

        let err = axis.move_abs(42.0).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DaqError>(),
            Some(DaqError::MoveTimeout { .. })
        ));
        assert!(drain(&mut rx)
            .iter()
            .any(|cmd| matches!(cmd, ThreadCommand::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_condition_gates_completion() {
        let (mut axis, _rx) = started().await;
        axis.actuator_mut().ready = false;
        axis.set_setting(names::TIMEOUT, 0.5.into()).await.unwrap();

        assert!(axis.move_abs(1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_motion_requires_init() {
        let (actuator, _rx) = EchoActuator::new();
        let mut axis = DaqMove::new("echo", actuator, &AxisConfig::default());
        let err = axis.move_abs(1.0).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DaqError>(),
            Some(DaqError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_stop_failure_is_returned() {
        let (mut axis, _rx) = started().await;
        let err = axis.stop().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DaqError>(),
            Some(DaqError::OperationNotSupported(_))
        ));
    }

    #[tokio::test]
    async fn test_set_setting_validates() {
        let (mut axis, _rx) = started().await;
        assert!(axis.set_setting("gain", "high".into()).await.is_err());
        assert!(axis.set_setting("nope", 1.0.into()).await.is_err());
        axis.set_setting("gain", 2.0.into()).await.unwrap();
        assert_eq!(axis.actuator().context().settings.f64_value("gain").unwrap(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_home_settles() {
        let (mut axis, _rx) = started().await;
        axis.move_abs(5.0).await.unwrap();
        let pos = axis.move_home().await.unwrap();
        assert_eq!(pos.value, 0.0);
    }
}
