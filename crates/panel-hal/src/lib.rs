//! Leaf I/O collaborators for the status panel.
//!
//! The controller only talks to hardware through the traits in this crate:
//! [`Gpio`]/[`PinHandle`] for buttons and the indicator LED, [`Display`] for
//! the 128×64 monochrome panel, [`Sensor`] for the humidity/temperature sensor
//! and [`SystemStats`] for the host figures shown on the info pages.
//!
//! [`sim`] provides in-memory implementations used by tests and by the
//! `--simulate` run mode. The Linux backends live in [`rpi`], [`oled`],
//! [`iio`] and [`host`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

mod frame;
#[cfg(unix)]
pub mod host;
pub mod iio;
#[cfg(target_os = "linux")]
pub mod oled;
pub mod sim;
#[cfg(target_os = "linux")]
pub mod rpi;

pub use frame::{Frame, HEIGHT, WIDTH};

/// Errors surfaced by hardware collaborators.
#[derive(Debug, Error)]
pub enum HalError {
    /// The requested pin name does not map to a GPIO line.
    #[error("unknown pin name: {0}")]
    UnknownPin(String),

    /// A GPIO operation failed on an acquired line.
    #[error("gpio {pin}: {source}")]
    Gpio {
        pin: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The handle was used after `release()`.
    #[error("pin {0} has been released")]
    Released(String),

    /// The display rejected a frame.
    #[error("display: {0}")]
    Display(String),

    /// The sensor did not produce a reading.
    #[error("sensor: {0}")]
    Sensor(String),

    /// The operation was abandoned because shutdown was requested.
    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    None,
    Rising,
    Falling,
    Both,
}

/// Resolves pin names (for example `GPIO17`) into live handles.
pub trait Gpio: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<dyn PinHandle>, HalError>;
}

/// One acquired GPIO line.
///
/// All methods take `&self` so a handle can be shared between its owner and
/// the thread blocking on [`PinHandle::wait_for_edge`].
pub trait PinHandle: Send + Sync {
    fn name(&self) -> &str;
    fn configure_as_input(&self, pull: Pull, edge: Edge) -> Result<(), HalError>;
    fn configure_as_output(&self, initial: Level) -> Result<(), HalError>;
    /// Blocks until an edge is seen (`Ok(true)`) or `timeout` elapses (`Ok(false)`).
    fn wait_for_edge(&self, timeout: Duration) -> Result<bool, HalError>;
    fn read(&self) -> Result<Level, HalError>;
    fn write(&self, level: Level) -> Result<(), HalError>;
    fn release(&self) -> Result<(), HalError>;
}

impl fmt::Debug for dyn PinHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PinHandle").field(&self.name()).finish()
    }
}

/// Blits a full frame onto the physical panel.
pub trait Display: Send {
    fn draw(&mut self, frame: &Frame) -> Result<(), HalError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorKind {
    #[default]
    Dht11,
    Dht22,
}

impl FromStr for SensorKind {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DHT11" => Ok(Self::Dht11),
            "DHT22" | "AM2302" => Ok(Self::Dht22),
            other => Err(HalError::Sensor(format!("unsupported sensor type {other}"))),
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dht11 => f.write_str("DHT11"),
            Self::Dht22 => f.write_str("DHT22"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub humidity: f64,
    pub temperature_c: f64,
}

pub trait Sensor: Send + Sync {
    /// `interrupted` is polled while waiting between attempts; once it
    /// returns true the read gives up with [`HalError::Interrupted`].
    fn read_humidity_temperature(
        &self,
        pin: &str,
        kind: SensorKind,
        retries: u32,
        interrupted: &dyn Fn() -> bool,
    ) -> Result<Reading, HalError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub hostname: String,
    pub address: String,
}

/// Sizes are in GiB.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MemoryUsage {
    pub total: f64,
    pub used: f64,
    pub percent: f64,
}

/// Sizes are in GiB.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiskUsage {
    pub total: f64,
    pub free: f64,
    pub used: f64,
    pub percent: f64,
}

/// Host figures for the info pages. Implementations swallow their own read
/// errors and report zeroed values, the pages are informational only.
pub trait SystemStats: Send + Sync {
    fn network(&self) -> NetworkIdentity;
    fn cpu_usage(&self) -> f64;
    fn cpu_temperature(&self) -> f64;
    fn memory(&self) -> MemoryUsage;
    fn disk(&self) -> DiskUsage;
}

/// Maps `GPIO17`, `gpio17`, `BCM17` or a bare `17` to a line number.
pub fn parse_pin_number(name: &str) -> Result<u64, HalError> {
    let trimmed = name.trim();
    let upper = trimmed.to_ascii_uppercase();
    let digits = upper
        .strip_prefix("GPIO")
        .or_else(|| upper.strip_prefix("BCM"))
        .unwrap_or(&upper);
    digits
        .parse()
        .map_err(|_| HalError::UnknownPin(trimmed.to_string()))
}
