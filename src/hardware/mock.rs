//! Mock Hardware Implementations
//!
//! Provides a simulated monochromator for running the plugin without a device.
//! All timing uses `tokio::time`, so tests can run under paused time.
//!
//! # Performance Characteristics
//!
//! - MockSpectrometer: configurable slew rate (default 100 nm/sec), position
//!   interpolated linearly between the start and the target of a move

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::config::DriverConfig;
use crate::error::DaqError;
use crate::hardware::spectrometer::{SetType, Spectrometer};

// =============================================================================
// MockSpectrometer - Simulated Monochromator
// =============================================================================

#[derive(Debug)]
struct MotionState {
    open: bool,
    from: f64,
    target: f64,
    started: Instant,
    tau: f64,
    grating: String,
}

/// Call counters, for asserting what the plugin did to the driver.
#[derive(Debug, Default)]
pub struct CallCounts {
    opens: AtomicUsize,
    closes: AtomicUsize,
    reads: AtomicUsize,
    moves: AtomicUsize,
    references: AtomicUsize,
    setting_reads: AtomicUsize,
}

impl CallCounts {
    /// `open_communication` calls.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// `close_communication` calls.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// `wavelength` calls.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// `set_wavelength` calls.
    pub fn moves(&self) -> usize {
        self.moves.load(Ordering::SeqCst)
    }

    /// `find_reference` calls.
    pub fn references(&self) -> usize {
        self.references.load(Ordering::SeqCst)
    }

    /// `tau`, `grating` and `gratings` calls.
    pub fn setting_reads(&self) -> usize {
        self.setting_reads.load(Ordering::SeqCst)
    }
}

/// Mock monochromator with a finite slew rate
///
/// Simulates a grating monochromator with:
/// - Linear slew at `speed_nm_per_s` (0 = instantaneous)
/// - Reference position at 600 nm
/// - Reachable range 0 - 2000 nm
/// - Switchable gratings and a detector time constant
///
/// # Example
///
/// ```rust,ignore
/// let mono = MockSpectrometer::new();
/// mono.open_communication().await?;
/// mono.set_wavelength(700.0, SetType::Absolute).await?;
/// tokio::time::sleep(Duration::from_secs(2)).await;
/// assert_eq!(mono.wavelength().await?, 700.0);
/// ```
#[derive(Debug)]
pub struct MockSpectrometer {
    state: RwLock<MotionState>,
    speed_nm_per_s: f64,
    reference_nm: f64,
    range_nm: (f64, f64),
    gratings: Vec<String>,
    refuse_open: bool,
    calls: CallCounts,
}

impl MockSpectrometer {
    /// Create a mock with the default driver configuration
    pub fn new() -> Self {
        Self::from_config(&DriverConfig::default())
    }

    /// Create a mock from a driver configuration section
    pub fn from_config(config: &DriverConfig) -> Self {
        Self {
            state: RwLock::new(MotionState {
                open: false,
                from: config.initial_wavelength_nm,
                target: config.initial_wavelength_nm,
                started: Instant::now(),
                tau: config.tau_s,
                grating: config.gratings.first().cloned().unwrap_or_default(),
            }),
            speed_nm_per_s: config.speed_nm_per_s,
            reference_nm: config.reference_wavelength_nm,
            range_nm: (config.min_wavelength_nm, config.max_wavelength_nm),
            gratings: config.gratings.clone(),
            refuse_open: false,
            calls: CallCounts::default(),
        }
    }

    /// Override the slew rate in nm/s
    pub fn with_speed(mut self, speed_nm_per_s: f64) -> Self {
        self.speed_nm_per_s = speed_nm_per_s;
        self
    }

    /// Make `open_communication` report that the device is absent
    pub fn refusing_connection(mut self) -> Self {
        self.refuse_open = true;
        self
    }

    /// Call counters
    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    /// Whether the communication channel is open
    pub async fn is_open(&self) -> bool {
        self.state.read().await.open
    }

    /// Whether the last move has finished
    pub async fn is_idle(&self) -> bool {
        let state = self.state.read().await;
        self.position_of(&state) == state.target
    }

    fn position_of(&self, state: &MotionState) -> f64 {
        let distance = state.target - state.from;
        if self.speed_nm_per_s <= 0.0 || distance == 0.0 {
            return state.target;
        }

        let travelled = self.speed_nm_per_s * state.started.elapsed().as_secs_f64();
        if travelled >= distance.abs() {
            state.target
        } else {
            state.from + travelled.copysign(distance)
        }
    }

    fn ensure_open(state: &MotionState) -> Result<()> {
        if state.open {
            Ok(())
        } else {
            Err(DaqError::Instrument("MockSpectrometer: communication not open".into()).into())
        }
    }

    async fn start_move(&self, target: f64) -> Result<()> {
        let (min, max) = self.range_nm;
        if !(min..=max).contains(&target) {
            return Err(DaqError::Instrument(format!(
                "MockSpectrometer: {:.3} nm outside reachable range {:.1}-{:.1} nm",
                target, min, max
            ))
            .into());
        }

        let mut state = self.state.write().await;
        Self::ensure_open(&state)?;
        let current = self.position_of(&state);
        tracing::debug!(
            "MockSpectrometer: slewing from {:.3} nm to {:.3} nm",
            current,
            target
        );
        state.from = current;
        state.target = target;
        state.started = Instant::now();
        Ok(())
    }
}

impl Default for MockSpectrometer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Spectrometer for MockSpectrometer {
    async fn open_communication(&self) -> Result<bool> {
        self.calls.opens.fetch_add(1, Ordering::SeqCst);
        if self.refuse_open {
            tracing::warn!("MockSpectrometer: refusing connection");
            return Ok(false);
        }

        self.state.write().await.open = true;
        tracing::info!("MockSpectrometer: communication open");
        Ok(true)
    }

    async fn close_communication(&self) -> Result<()> {
        self.calls.closes.fetch_add(1, Ordering::SeqCst);
        self.state.write().await.open = false;
        tracing::info!("MockSpectrometer: communication closed");
        Ok(())
    }

    async fn wavelength(&self) -> Result<f64> {
        self.calls.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        Self::ensure_open(&state)?;
        Ok(self.position_of(&state))
    }

    async fn set_wavelength(&self, value: f64, set_type: SetType) -> Result<()> {
        self.calls.moves.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            "MockSpectrometer: {} move, value {:.3} nm",
            set_type.as_str(),
            value
        );
        let target = match set_type {
            SetType::Absolute => value,
            SetType::Relative => {
                let state = self.state.read().await;
                Self::ensure_open(&state)?;
                self.position_of(&state) + value
            }
        };
        self.start_move(target).await
    }

    async fn find_reference(&self) -> Result<()> {
        self.calls.references.fetch_add(1, Ordering::SeqCst);
        self.start_move(self.reference_nm).await
    }

    async fn tau(&self) -> Result<f64> {
        self.calls.setting_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.read().await.tau)
    }

    async fn set_tau(&self, seconds: f64) -> Result<()> {
        if seconds.is_nan() || seconds < 0.0 {
            return Err(anyhow!("MockSpectrometer: invalid time constant {}", seconds));
        }
        self.state.write().await.tau = seconds;
        tracing::debug!("MockSpectrometer: tau = {} s", seconds);
        Ok(())
    }

    async fn grating(&self) -> Result<String> {
        self.calls.setting_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.read().await.grating.clone())
    }

    async fn set_grating(&self, grating: &str) -> Result<()> {
        if !self.gratings.iter().any(|g| g == grating) {
            return Err(DaqError::Instrument(format!(
                "MockSpectrometer: unknown grating '{}'",
                grating
            ))
            .into());
        }
        self.state.write().await.grating = grating.to_string();
        tracing::debug!("MockSpectrometer: grating = {}", grating);
        Ok(())
    }

    async fn gratings(&self) -> Result<Vec<String>> {
        self.calls.setting_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.gratings.clone())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    async fn opened(mono: MockSpectrometer) -> MockSpectrometer {
        assert!(mono.open_communication().await.unwrap());
        mono
    }

    #[tokio::test]
    async fn test_requires_open_channel() {
        let mono = MockSpectrometer::new();
        assert!(mono.wavelength().await.is_err());
        assert!(mono.set_wavelength(600.0, SetType::Absolute).await.is_err());
    }

    #[tokio::test]
    async fn test_refusing_connection() {
        let mono = MockSpectrometer::new().refusing_connection();
        assert!(!mono.open_communication().await.unwrap());
        assert!(!mono.is_open().await);
        assert_eq!(mono.calls().opens(), 1);
    }

    #[tokio::test]
    async fn test_instant_absolute_move() {
        let mono = opened(MockSpectrometer::new().with_speed(0.0)).await;
        mono.set_wavelength(532.0, SetType::Absolute).await.unwrap();
        assert_eq!(mono.wavelength().await.unwrap(), 532.0);
    }

    #[tokio::test]
    async fn test_instant_relative_move() {
        let mono = opened(MockSpectrometer::new().with_speed(0.0)).await;
        mono.set_wavelength(10.0, SetType::Relative).await.unwrap();
        mono.set_wavelength(-3.0, SetType::Relative).await.unwrap();
        assert_eq!(mono.wavelength().await.unwrap(), 507.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slew_takes_time() {
        let mono = opened(MockSpectrometer::new().with_speed(100.0)).await;
        mono.set_wavelength(700.0, SetType::Absolute).await.unwrap();

        sleep(Duration::from_secs(1)).await;
        let midway = mono.wavelength().await.unwrap();
        assert!((midway - 600.0).abs() < 1e-6, "midway = {}", midway);
        assert!(!mono.is_idle().await);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(mono.wavelength().await.unwrap(), 700.0);
        assert!(mono.is_idle().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_reference() {
        let mono = opened(MockSpectrometer::new()).await;
        mono.find_reference().await.unwrap();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(mono.wavelength().await.unwrap(), 600.0);
        assert_eq!(mono.calls().references(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_rejected() {
        let mono = opened(MockSpectrometer::new()).await;
        let err = mono
            .set_wavelength(5000.0, SetType::Absolute)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DaqError>(),
            Some(DaqError::Instrument(_))
        ));
    }

    #[tokio::test]
    async fn test_grating_selection() {
        let mono = MockSpectrometer::new();
        assert_eq!(mono.gratings().await.unwrap(), vec!["G300", "G1200"]);
        mono.set_grating("G1200").await.unwrap();
        assert_eq!(mono.grating().await.unwrap(), "G1200");
        assert!(mono.set_grating("G9000").await.is_err());
    }

    #[tokio::test]
    async fn test_tau_roundtrip_and_validation() {
        let mono = MockSpectrometer::new();
        mono.set_tau(0.25).await.unwrap();
        assert_eq!(mono.tau().await.unwrap(), 0.25);
        assert!(mono.set_tau(-1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_close_drops_channel() {
        let mono = opened(MockSpectrometer::new()).await;
        mono.close_communication().await.unwrap();
        assert!(!mono.is_open().await);
        assert_eq!(mono.calls().closes(), 1);
    }
}
