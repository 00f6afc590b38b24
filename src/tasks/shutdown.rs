//! Farewell sequence run once the scheduler has stopped.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use panel_hal::{Display, Frame};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::render::pages;
use crate::tasks::buttons::InputController;

#[derive(Debug, Clone, Copy)]
pub struct FarewellTiming {
    /// How long the "Bye" screen stays up before the waves.
    pub hold: Duration,
    pub wave: Duration,
}

impl Default for FarewellTiming {
    fn default() -> Self {
        Self {
            hold: Duration::from_secs(1),
            wave: Duration::from_millis(500),
        }
    }
}

pub struct ShutdownCoordinator {
    inputs: Arc<Mutex<InputController>>,
    timing: FarewellTiming,
}

impl ShutdownCoordinator {
    pub fn new(inputs: Arc<Mutex<InputController>>, timing: FarewellTiming) -> Self {
        Self { inputs, timing }
    }

    /// Plays the farewell to completion and clears the panel, then stops the
    /// watchers, turns the LED off and releases every pin.
    pub async fn run(self, mut display: Box<dyn Display>) -> Result<()> {
        info!("shutting down");
        let timing = self.timing;
        let played =
            tokio::task::spawn_blocking(move || play_farewell(display.as_mut(), timing)).await;
        if let Err(err) = played {
            warn!(error = %err, "farewell animation panicked");
        }
        self.inputs.lock().await.shutdown().await?;
        info!("pins released");
        Ok(())
    }
}

/// Draw failures are logged and skipped; the sequence always runs to the end.
pub fn play_farewell(display: &mut dyn Display, timing: FarewellTiming) {
    let frames = pages::farewell();
    for (idx, frame) in frames.iter().enumerate() {
        draw_logged(display, frame);
        thread::sleep(if idx == 0 { timing.hold } else { timing.wave });
    }
    draw_logged(display, &Frame::new());
}

fn draw_logged(display: &mut dyn Display, frame: &Frame) {
    if let Err(err) = display.draw(frame) {
        warn!(error = %err, "farewell frame not drawn");
    }
}
