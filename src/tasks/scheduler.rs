//! The render loop. Runs on a blocking thread: render the current page, hand
//! the frames to the panel, sleep for the tick interval, advance.

use std::sync::Arc;
use std::time::Duration;

use panel_hal::{Display, Frame};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ConfigStore;
use crate::error::{Error, Result};
use crate::navigator::Navigator;
use crate::render::{PageView, Renderer};
use crate::tasks::clock::sleep_or_cancel;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerTiming {
    pub boot_frame: Duration,
    /// Hold after the last boot frame.
    pub boot_hold: Duration,
    /// Time each error screen stays up before the next one.
    pub error_screen: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            boot_frame: Duration::from_millis(100),
            boot_hold: Duration::from_secs(2),
            error_screen: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stopped,
}

pub struct Scheduler {
    display: Box<dyn Display>,
    renderer: Renderer,
    navigator: Arc<Navigator>,
    store: Arc<ConfigStore>,
    timing: SchedulerTiming,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        display: Box<dyn Display>,
        renderer: Renderer,
        navigator: Arc<Navigator>,
        store: Arc<ConfigStore>,
        timing: SchedulerTiming,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            display,
            renderer,
            navigator,
            store,
            timing,
            cancel,
        }
    }

    /// Runs one iteration. A frame that has started drawing is always
    /// finished; only the sleeps between frames give way to cancellation.
    pub fn tick(&mut self) -> Result<Tick> {
        if self.cancel.is_cancelled() {
            return Ok(Tick::Stopped);
        }
        let page = if self.navigator.is_booting() {
            0
        } else {
            self.navigator.current_page()
        };
        let config = self.store.snapshot();

        let view = self.renderer.render(page, &config, &self.cancel);
        if self.cancel.is_cancelled() {
            return Ok(Tick::Stopped);
        }
        match view {
            PageView::Boot(frames) => {
                let shown = !frames.is_empty();
                for frame in &frames {
                    self.draw(frame)?;
                    if !sleep_or_cancel(&self.cancel, self.timing.boot_frame) {
                        return Ok(Tick::Stopped);
                    }
                }
                if shown && !sleep_or_cancel(&self.cancel, self.timing.boot_hold) {
                    return Ok(Tick::Stopped);
                }
                self.navigator.finish_boot();
                info!(page = self.navigator.current_page(), "boot finished");
                return Ok(Tick::Continue);
            }
            PageView::Skip => {
                self.navigator.skip_page();
                return Ok(Tick::Continue);
            }
            PageView::Frame(frame) => self.draw(&frame)?,
            PageView::Error(screens) => {
                for (idx, screen) in screens.iter().enumerate() {
                    self.draw(screen)?;
                    let more = idx + 1 < screens.len();
                    if more && !sleep_or_cancel(&self.cancel, self.timing.error_screen) {
                        return Ok(Tick::Stopped);
                    }
                }
            }
        }

        let interval = self.navigator.tick_interval();
        debug!(page, interval = %humantime::format_duration(interval), "page shown");
        if !sleep_or_cancel(&self.cancel, interval) {
            return Ok(Tick::Stopped);
        }
        self.navigator.advance_if_autoplay();
        Ok(Tick::Continue)
    }

    /// Ticks until cancelled, then hands the display back for the farewell.
    pub fn run(mut self) -> Result<Box<dyn Display>> {
        info!("scheduler started");
        while self.tick()? == Tick::Continue {}
        info!("scheduler stopped");
        Ok(self.display)
    }

    fn draw(&mut self, frame: &Frame) -> Result<()> {
        self.display.draw(frame).map_err(Error::Display)
    }
}
