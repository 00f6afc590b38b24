//! Button watchers.
//!
//! One blocking watcher per button waits for falling edges on its pin, lets
//! the line settle, confirms the level and applies a single navigator
//! transition per accepted press. [`InputController`] owns the watcher
//! generation that is currently running and swaps it out around a rebind.

use std::sync::Arc;
use std::time::{Duration, Instant};

use panel_hal::{Level, PinHandle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bindings::{BindingManager, PinSet};
use crate::config::ConfigSnapshot;
use crate::error::{Error, Result};
use crate::events::{BUTTON_ROLES, PinRole};
use crate::navigator::Navigator;
use crate::tasks::clock::sleep_or_cancel;

/// How long the controller waits for a watcher generation to exit.
pub const STOP_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct WatcherTiming {
    /// Delay between an edge and the level check.
    pub settle: Duration,
    /// Minimum gap between two accepted presses on one button.
    pub quiet: Duration,
    /// Extra sleep after an accepted press; edges queued meanwhile are dropped.
    pub cooldown: Duration,
    /// Upper bound on one edge wait, so a stop request is seen promptly.
    pub poll: Duration,
}

impl Default for WatcherTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(50),
            quiet: Duration::from_millis(200),
            cooldown: Duration::from_millis(200),
            poll: Duration::from_millis(250),
        }
    }
}

/// Navigator operation bound to a button.
pub type Transition = fn(&Navigator);

/// Maps a button role to the transition it triggers. The LED has none.
pub fn transition_for(role: PinRole) -> Option<Transition> {
    let transition: Transition = match role {
        PinRole::ButtonPrev => |nav: &Navigator| {
            nav.go_to_previous();
        },
        PinRole::ButtonNext => |nav: &Navigator| {
            nav.go_to_next();
        },
        PinRole::ButtonJump => |nav: &Navigator| {
            nav.jump_to_configured();
        },
        PinRole::ButtonToggle => |nav: &Navigator| {
            nav.toggle_autoplay();
        },
        PinRole::LedIndicator => return None,
    };
    Some(transition)
}

/// Remembers the last accepted press of one button.
#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_accepted: None,
        }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.quiet {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

pub struct ButtonWatcher {
    role: PinRole,
    pin: Arc<dyn PinHandle>,
    transition: Transition,
    navigator: Arc<Navigator>,
    debouncer: Debouncer,
    timing: WatcherTiming,
}

impl ButtonWatcher {
    pub fn new(
        role: PinRole,
        pin: Arc<dyn PinHandle>,
        transition: Transition,
        navigator: Arc<Navigator>,
        timing: WatcherTiming,
    ) -> Self {
        Self {
            role,
            pin,
            transition,
            navigator,
            debouncer: Debouncer::new(timing.quiet),
            timing,
        }
    }

    /// Runs until `stop` is cancelled. Blocks the calling thread.
    pub fn run(mut self, stop: CancellationToken) {
        debug!(role = %self.role, pin = self.pin.name(), "button watcher started");
        while !stop.is_cancelled() {
            match self.pin.wait_for_edge(self.timing.poll) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    warn!(role = %self.role, pin = self.pin.name(), error = %err, "edge wait failed");
                    if !sleep_or_cancel(&stop, self.timing.poll) {
                        break;
                    }
                    continue;
                }
            }

            if !sleep_or_cancel(&stop, self.timing.settle) {
                break;
            }
            match self.pin.read() {
                Ok(Level::Low) => {}
                Ok(Level::High) => {
                    trace!(role = %self.role, "edge without press");
                    continue;
                }
                Err(err) => {
                    warn!(role = %self.role, pin = self.pin.name(), error = %err, "button read failed");
                    continue;
                }
            }
            if !self.debouncer.accept(Instant::now()) {
                trace!(role = %self.role, "press debounced");
                continue;
            }

            (self.transition)(&self.navigator);
            info!(role = %self.role, page = self.navigator.current_page(), "button press");

            if !sleep_or_cancel(&stop, self.timing.cooldown) {
                break;
            }
            self.drain_bounces();
        }
        debug!(role = %self.role, pin = self.pin.name(), "button watcher stopped");
    }

    fn drain_bounces(&self) {
        let mut dropped = 0usize;
        while let Ok(true) = self.pin.wait_for_edge(Duration::ZERO) {
            dropped += 1;
        }
        if dropped > 0 {
            trace!(role = %self.role, dropped, "bounce edges dropped");
        }
    }
}

struct Generation {
    stop: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Starts, stops and restarts the four button watchers.
pub struct InputController {
    bindings: Arc<BindingManager>,
    navigator: Arc<Navigator>,
    timing: WatcherTiming,
    shutdown: CancellationToken,
    running: Option<Generation>,
    generation: u64,
}

impl InputController {
    pub fn new(
        bindings: Arc<BindingManager>,
        navigator: Arc<Navigator>,
        timing: WatcherTiming,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            bindings,
            navigator,
            timing,
            shutdown,
            running: None,
            generation: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawns one watcher per button of `pins` on the blocking pool. Must be
    /// called from within a tokio runtime.
    pub fn start(&mut self, pins: &PinSet) {
        let stop = self.shutdown.child_token();
        let mut handles = Vec::with_capacity(BUTTON_ROLES.len());
        for (role, pin) in BUTTON_ROLES.into_iter().zip(pins.buttons.iter()) {
            let Some(transition) = transition_for(role) else {
                continue;
            };
            let watcher = ButtonWatcher::new(
                role,
                pin.clone(),
                transition,
                self.navigator.clone(),
                self.timing,
            );
            let stop = stop.clone();
            handles.push(tokio::task::spawn_blocking(move || watcher.run(stop)));
        }
        self.generation += 1;
        info!(generation = self.generation, "button watchers started");
        self.running = Some(Generation { stop, handles });
    }

    /// Signals the running watchers to stop and waits for all of them.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(Generation { stop, handles }) = self.running.take() else {
            return Ok(());
        };
        stop.cancel();
        let deadline = tokio::time::Instant::now() + STOP_DEADLINE;
        for handle in handles {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "button watcher panicked"),
                Err(_) => return Err(Error::WatcherStop(STOP_DEADLINE)),
            }
        }
        info!(generation = self.generation, "button watchers stopped");
        Ok(())
    }

    /// Stop every watcher, swap the pin set, start fresh watchers.
    pub async fn rebind(&mut self, config: &ConfigSnapshot) -> Result<()> {
        self.stop().await?;
        let pins = self.bindings.rebind(config)?;
        self.navigator.sync_indicator();
        self.start(&pins);
        Ok(())
    }

    /// Stops the watchers, turns the LED off and releases every pin.
    pub async fn shutdown(&mut self) -> Result<()> {
        let stopped = self.stop().await;
        self.bindings.release_all();
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presses_inside_quiet_period_are_rejected() {
        let mut debouncer = Debouncer::new(Duration::from_millis(200));
        let t0 = Instant::now();
        assert!(debouncer.accept(t0));
        assert!(!debouncer.accept(t0 + Duration::from_millis(120)));
        assert!(!debouncer.accept(t0 + Duration::from_millis(199)));
        assert!(debouncer.accept(t0 + Duration::from_millis(200)));
        assert!(!debouncer.accept(t0 + Duration::from_millis(250)));
    }

    #[test]
    fn every_button_has_a_transition_and_the_led_has_none() {
        for role in BUTTON_ROLES {
            assert!(transition_for(role).is_some(), "{role}");
        }
        assert!(transition_for(PinRole::LedIndicator).is_none());
    }
}
