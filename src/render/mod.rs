//! Page rendering. Turns a page index plus the current snapshot into the
//! frames the scheduler hands to the display.

use std::sync::Arc;

use panel_hal::{Frame, HalError, Sensor, SystemStats};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ConfigSnapshot;

pub mod pages;
pub mod text;

/// Attempts the sensor driver gets before a read is reported as failed.
pub const SENSOR_RETRIES: u32 = 11;
const BOOT_STEPS: u32 = 10;

#[derive(Debug)]
pub enum PageView {
    /// Boot splash frames; empty when the logo is disabled.
    Boot(Vec<Frame>),
    /// Nothing to show on this page.
    Skip,
    Frame(Frame),
    /// Paginated error, one frame per screen.
    Error(Vec<Frame>),
}

pub struct Renderer {
    sensor: Arc<dyn Sensor>,
    stats: Arc<dyn SystemStats>,
}

impl Renderer {
    pub fn new(sensor: Arc<dyn Sensor>, stats: Arc<dyn SystemStats>) -> Self {
        Self { sensor, stats }
    }

    /// `cancel` cuts short the waits inside slow reads; an interrupted read
    /// renders as [`PageView::Skip`].
    pub fn render(
        &self,
        page: u32,
        config: &ConfigSnapshot,
        cancel: &CancellationToken,
    ) -> PageView {
        match page {
            0 if config.show_logo => {
                PageView::Boot(pages::boot(&self.stats.network().hostname, BOOT_STEPS))
            }
            0 => PageView::Boot(Vec::new()),
            1 if !config.show_sensor => PageView::Skip,
            1 => match self.sensor.read_humidity_temperature(
                &config.sensor_pin,
                config.sensor_kind(),
                SENSOR_RETRIES,
                &|| cancel.is_cancelled(),
            ) {
                Ok(reading) => PageView::Frame(pages::sensor(&reading)),
                Err(HalError::Interrupted) => {
                    debug!("sensor read interrupted");
                    PageView::Skip
                }
                Err(err) => {
                    warn!(pin = %config.sensor_pin, error = %err, "sensor read failed");
                    PageView::Error(pages::error_screens(&err.to_string()))
                }
            },
            2 => PageView::Frame(pages::network(&self.stats.network())),
            3 => PageView::Frame(pages::cpu_usage(self.stats.cpu_usage())),
            4 => PageView::Frame(pages::cpu_temperature(self.stats.cpu_temperature())),
            5 => PageView::Frame(pages::memory(&self.stats.memory())),
            6 => PageView::Frame(pages::disk(&self.stats.disk())),
            _ => PageView::Skip,
        }
    }
}
