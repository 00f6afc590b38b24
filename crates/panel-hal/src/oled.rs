//! SSD1306 128×64 OLED on a Linux I2C bus.

use std::path::Path;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use linux_embedded_hal::I2cdev;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::{I2CDisplayInterface, Ssd1306};
use tracing::info;

use crate::{Display, Frame, HalError};

type Panel =
    Ssd1306<I2CInterface<I2cdev>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

pub struct Ssd1306Display {
    panel: Panel,
}

impl Ssd1306Display {
    /// Opens `bus` (for example `/dev/i2c-1`) and initialises the panel at
    /// `address` (usually `0x3C`).
    pub fn open(bus: &Path, address: u8) -> Result<Self, HalError> {
        let i2c = I2cdev::new(bus).map_err(|err| {
            HalError::Display(format!("failed to open {}: {err}", bus.display()))
        })?;
        let interface = I2CDisplayInterface::new_custom_address(i2c, address);
        let mut panel = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        panel
            .init()
            .map_err(|err| HalError::Display(format!("panel init failed: {err:?}")))?;
        info!(bus = %bus.display(), address = format_args!("{address:#04x}"), "ssd1306 ready");
        Ok(Self { panel })
    }
}

impl Display for Ssd1306Display {
    fn draw(&mut self, frame: &Frame) -> Result<(), HalError> {
        self.panel.clear_buffer();
        self.panel
            .draw_iter(frame.lit().map(|point| Pixel(point, BinaryColor::On)))
            .map_err(|err| HalError::Display(format!("{err:?}")))?;
        self.panel
            .flush()
            .map_err(|err| HalError::Display(format!("flush failed: {err:?}")))
    }
}

impl Drop for Ssd1306Display {
    fn drop(&mut self) {
        self.panel.clear_buffer();
        let _ = self.panel.flush();
    }
}
