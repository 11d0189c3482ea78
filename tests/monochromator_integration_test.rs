//! End-to-end tests of the monochromator plugin driven by the host loop.
//!
//! All tests run against `MockSpectrometer`; motion tests use paused tokio
//! time so the simulated slew completes instantly in wall-clock terms.

use daq_monochromator::config::MonochromatorConfig;
use daq_monochromator::hardware::{MockSpectrometer, SharedSpectrometer, Spectrometer};
use daq_monochromator::parameter::names;
use daq_monochromator::plugins::monochromator::{GRATING, TAU};
use daq_monochromator::{
    Actuator, DaqError, DaqMove, DaqMoveMonochromator, DataActuator, StatusSink, ThreadCommand,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_test::{assert_err, assert_ok};
use tracing_test::traced_test;

struct Axis {
    axis: DaqMove<DaqMoveMonochromator>,
    rx: UnboundedReceiver<ThreadCommand>,
}

/// Axis whose master factory hands out `mock`.
fn axis_with(config: &MonochromatorConfig, mock: Arc<MockSpectrometer>) -> Axis {
    let (status, rx) = StatusSink::channel();
    let plugin = DaqMoveMonochromator::new(
        config,
        status,
        Box::new(move || mock.clone() as SharedSpectrometer),
    );
    Axis {
        axis: DaqMove::new("monochromator", plugin, &config.axis),
        rx,
    }
}

fn drain(rx: &mut UnboundedReceiver<ThreadCommand>) -> Vec<ThreadCommand> {
    let mut out = Vec::new();
    while let Ok(cmd) = rx.try_recv() {
        out.push(cmd);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn move_abs_converges_within_epsilon() {
    let config = MonochromatorConfig::default();
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { mut axis, mut rx } = axis_with(&config, mock);
    assert!(axis.init(None).await.unwrap().initialized);

    for target in [532.0, 1064.0, 400.5, 780.25] {
        let pos = axis.move_abs(target).await.unwrap();
        assert!((pos.value - target).abs() < config.axis.epsilon, "{} vs {}", pos, target);
    }

    let done: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|c| matches!(c, ThreadCommand::MoveDone(_)))
        .collect();
    assert_eq!(done.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn move_abs_converges_with_scaling() {
    let config = MonochromatorConfig::default();
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { mut axis, .. } = axis_with(&config, mock.clone());
    axis.init(None).await.unwrap();

    axis.set_setting(names::SCALING_ENABLED, true.into()).await.unwrap();
    axis.set_setting(names::SCALING, 0.5.into()).await.unwrap();
    axis.set_setting(names::OFFSET, 100.0.into()).await.unwrap();

    // displayed 400 -> device (400 - 100) / 0.5 = 600
    let pos = axis.move_abs(400.0).await.unwrap();
    assert!((pos.value - 400.0).abs() < 0.1);
    assert!((mock.wavelength().await.unwrap() - 600.0).abs() < 0.2);
}

#[tokio::test(start_paused = true)]
async fn move_rel_target_is_clamped_sum() {
    let mut config = MonochromatorConfig::default();
    config.axis.bounds.enabled = true;
    config.axis.bounds.min = 450.0;
    config.axis.bounds.max = 650.0;
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { mut axis, .. } = axis_with(&config, mock);
    axis.init(None).await.unwrap();

    for delta in [20.0, -500.0, 1000.0, -75.5, 0.0] {
        let start = axis.get_position().await.unwrap().value;
        let expected = (start + delta).clamp(450.0, 650.0);

        let pos = axis.move_rel(delta).await.unwrap();
        let target = axis.actuator().context().target_value.value;
        assert_eq!(target, expected, "delta {}", delta);
        assert!((pos.value - expected).abs() < 0.1);
    }
}

#[tokio::test]
async fn zero_scaling_fails_instead_of_moving() {
    let config = MonochromatorConfig::default();
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { mut axis, .. } = axis_with(&config, mock.clone());
    axis.init(None).await.unwrap();

    axis.set_setting(names::SCALING_ENABLED, true.into()).await.unwrap();
    axis.set_setting(names::SCALING, 0.0.into()).await.unwrap();

    let err = axis.move_abs(500.0).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DaqError>(),
        Some(DaqError::InvalidScaling { .. })
    ));
    assert_eq!(mock.calls().moves(), 0);
    assert!(mock.wavelength().await.unwrap().is_finite());
}

#[tokio::test]
async fn reinit_then_quit_closes_every_opened_channel() {
    let config = MonochromatorConfig::default();
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { mut axis, .. } = axis_with(&config, mock.clone());

    assert!(axis.init(None).await.unwrap().initialized);
    assert!(axis.init(None).await.unwrap().initialized);
    assert_ok!(axis.quit().await);

    assert_eq!(mock.calls().opens(), 2);
    assert_eq!(mock.calls().closes(), 2);
    assert!(!mock.is_open().await);
}

#[tokio::test]
async fn failed_open_reports_failure_without_reading_settings() {
    let config = MonochromatorConfig::default();
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver).refusing_connection());
    let Axis { mut axis, mut rx } = axis_with(&config, mock.clone());

    let status = axis.init(None).await.unwrap();
    assert!(!status.initialized);
    assert!(!axis.is_initialized());
    assert_eq!(mock.calls().opens(), 1);
    assert_eq!(mock.calls().setting_reads(), 0);
    assert_eq!(mock.calls().reads(), 0);
    assert_eq!(drain(&mut rx), vec![ThreadCommand::UpdateStatus(status.info)]);
}

#[tokio::test]
async fn shared_controller_never_opened_by_slave() {
    let config = MonochromatorConfig::default();
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { axis: mut master, .. } = axis_with(&config, mock.clone());
    assert!(master.init(None).await.unwrap().initialized);
    assert_eq!(mock.calls().opens(), 1);

    let shared = master.shared_controller().unwrap();
    let unused = Arc::new(MockSpectrometer::new());
    let Axis { axis: mut slave, .. } = axis_with(&config, unused.clone());

    let status = slave.init(Some(shared)).await.unwrap();
    assert!(status.initialized);
    assert!(!slave.actuator().is_master());
    assert_eq!(mock.calls().opens(), 1);
    assert_eq!(unused.calls().opens(), 0);
}

#[tokio::test]
async fn only_the_master_closes_the_shared_channel() {
    let config = MonochromatorConfig::default();
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { axis: mut master, .. } = axis_with(&config, mock.clone());
    master.init(None).await.unwrap();

    let Axis { axis: mut slave, .. } = axis_with(&config, Arc::new(MockSpectrometer::new()));
    slave.init(master.shared_controller()).await.unwrap();

    assert_ok!(slave.quit().await);
    assert_eq!(mock.calls().closes(), 0);
    assert!(mock.is_open().await);

    assert_ok!(master.quit().await);
    assert_eq!(mock.calls().closes(), 1);
    assert!(!mock.is_open().await);
}

#[tokio::test]
async fn tau_setting_reaches_driver_in_seconds() {
    let config = MonochromatorConfig::default();
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { mut axis, .. } = axis_with(&config, mock.clone());
    axis.init(None).await.unwrap();

    for ms in [1.0, 250.0, 1234.0, 0.5] {
        axis.set_setting(TAU, ms.into()).await.unwrap();
        assert_eq!(mock.tau().await.unwrap(), ms / 1000.0);
    }
}

#[tokio::test]
async fn initialize_pulls_tau_and_gratings() {
    let mut config = MonochromatorConfig::default();
    config.driver.tau_s = 0.05;
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { mut axis, .. } = axis_with(&config, mock);
    axis.init(None).await.unwrap();

    let settings = &axis.actuator().context().settings;
    assert_eq!(settings.f64_value(TAU).unwrap(), 50.0);
    assert_eq!(settings.child(GRATING).unwrap().limits(), ["G300", "G1200"]);

    // Options not reported by the driver are now rejected
    assert_err!(axis.set_setting(GRATING, "a".into()).await);
    assert_ok!(axis.set_setting(GRATING, "G1200".into()).await);
}

#[tokio::test]
#[traced_test]
async fn stop_always_fails() {
    let config = MonochromatorConfig::default();
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { mut axis, .. } = axis_with(&config, mock);
    axis.init(None).await.unwrap();

    for _ in 0..3 {
        let err = axis.stop().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DaqError>(),
            Some(DaqError::OperationNotSupported(_))
        ));
    }
    assert!(logs_contain("motion cannot be halted"));
}

#[tokio::test(start_paused = true)]
async fn move_home_lands_on_reference() {
    let config = MonochromatorConfig::default();
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { mut axis, mut rx } = axis_with(&config, mock);
    axis.init(None).await.unwrap();
    drain(&mut rx);

    let pos = axis.move_home().await.unwrap();
    assert!((pos.value - 600.0).abs() < 0.1);
    assert!(drain(&mut rx).contains(&ThreadCommand::UpdateStatus(
        "Monochromator moved to Reference point of 600 nm".to_string()
    )));
}

#[tokio::test(start_paused = true)]
async fn micrometre_axis_converts_driver_nanometres() {
    let mut config = MonochromatorConfig::default();
    config.axis.units = "um".to_string();
    config.axis.epsilon = 0.0001;
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { mut axis, .. } = axis_with(&config, mock.clone());
    axis.init(None).await.unwrap();

    let pos = axis.move_abs(0.7).await.unwrap();
    assert_eq!(pos.units, "um");
    assert!((mock.wavelength().await.unwrap() - 700.0).abs() < 0.1);
}

#[tokio::test]
async fn out_of_range_driver_error_propagates() {
    let config = MonochromatorConfig::default();
    let mock = Arc::new(MockSpectrometer::from_config(&config.driver));
    let Axis { mut axis, .. } = axis_with(&config, mock);
    axis.init(None).await.unwrap();

    let err = axis.move_abs(5000.0).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DaqError>(),
        Some(DaqError::Instrument(_))
    ));
}

#[tokio::test]
async fn plugin_position_is_scaled_from_driver() {
    let config = MonochromatorConfig::default();
    let (status, _rx) = StatusSink::channel();
    let mut plugin = DaqMoveMonochromator::with_mock(&config, status);
    plugin.initialize(None).await.unwrap();

    assert_eq!(
        plugin.get_position().await.unwrap(),
        DataActuator::new(config.driver.initial_wavelength_nm, "nm")
    );
}
