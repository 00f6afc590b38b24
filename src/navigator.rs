//! Page-index state machine shared by the scheduler and the button watchers.
//!
//! Every transition takes the state lock for the duration of the mutation
//! only. The indicator LED is driven while the lock is still held, so no
//! observer can see `autoplay` and the LED disagree.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::bindings::Indicator;
use crate::config::{ConfigSnapshot, LAST_PAGE};
use crate::events::PageChange;

/// Tick interval while autoplay is off, so the next render after a manual
/// navigation happens promptly.
pub const PAUSED_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeState {
    /// Starts at the configured page (0 when unset); `1..=last_page` once
    /// boot has finished.
    pub current_page: u32,
    pub last_page: u32,
    pub autoplay: bool,
    pub tick_interval: Duration,
    pub base_tick_interval: Duration,
    pub jump_page: u32,
    /// Set until the boot view has been shown, whatever the starting page.
    pub booting: bool,
}

pub struct Navigator {
    state: Mutex<RuntimeState>,
    indicator: Indicator,
}

impl Navigator {
    pub fn new(config: &ConfigSnapshot, indicator: Indicator) -> Self {
        let state = RuntimeState {
            current_page: config.base_page.min(LAST_PAGE),
            last_page: LAST_PAGE,
            autoplay: config.autoplay,
            tick_interval: config.tick_interval,
            base_tick_interval: config.tick_interval,
            jump_page: config.jump_page.clamp(1, LAST_PAGE),
            booting: true,
        };
        Self {
            state: Mutex::new(state),
            indicator,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RuntimeState {
        *self.lock()
    }

    pub fn current_page(&self) -> u32 {
        self.lock().current_page
    }

    pub fn tick_interval(&self) -> Duration {
        self.lock().tick_interval
    }

    pub fn go_to_previous(&self) -> PageChange {
        let mut state = self.lock();
        let from = state.current_page;
        state.current_page = if from <= 1 { state.last_page } else { from - 1 };
        self.pause_locked(&mut state);
        self.changed("previous", from, state.current_page)
    }

    pub fn go_to_next(&self) -> PageChange {
        let mut state = self.lock();
        let from = state.current_page;
        state.current_page = if from >= state.last_page { 1 } else { from + 1 };
        self.pause_locked(&mut state);
        self.changed("next", from, state.current_page)
    }

    /// Out-of-range pages are clamped into `1..=last_page`.
    pub fn jump_to(&self, page: u32) -> PageChange {
        let mut state = self.lock();
        let from = state.current_page;
        state.current_page = page.clamp(1, state.last_page);
        self.pause_locked(&mut state);
        self.changed("jump", from, state.current_page)
    }

    pub fn jump_to_configured(&self) -> PageChange {
        let page = self.lock().jump_page;
        self.jump_to(page)
    }

    /// Returns the new autoplay value.
    pub fn toggle_autoplay(&self) -> bool {
        let mut state = self.lock();
        if state.autoplay {
            self.pause_locked(&mut state);
        } else {
            state.autoplay = true;
            state.tick_interval = state.base_tick_interval;
            self.indicator.set(true);
        }
        info!(
            autoplay = state.autoplay,
            tick = %humantime::format_duration(state.tick_interval),
            "autoplay toggled"
        );
        state.autoplay
    }

    pub fn pause(&self) {
        let mut state = self.lock();
        self.pause_locked(&mut state);
    }

    /// Advances one page with wraparound when autoplay is on.
    pub fn advance_if_autoplay(&self) -> Option<PageChange> {
        let mut state = self.lock();
        if !state.autoplay {
            return None;
        }
        let from = state.current_page;
        state.current_page = wrap_next(from, state.last_page);
        debug!(from, to = state.current_page, "autoplay advance");
        Some(PageChange {
            from,
            to: state.current_page,
        })
    }

    /// Moves past a page that has nothing to show, regardless of autoplay.
    pub fn skip_page(&self) -> PageChange {
        let mut state = self.lock();
        let from = state.current_page;
        state.current_page = wrap_next(from, state.last_page);
        debug!(from, to = state.current_page, "page skipped");
        PageChange {
            from,
            to: state.current_page,
        }
    }

    pub fn is_booting(&self) -> bool {
        self.lock().booting
    }

    /// Ends the boot phase and lands on the starting page, or page 1 when
    /// none was configured. Later transitions never return to page 0.
    pub fn finish_boot(&self) {
        let mut state = self.lock();
        state.booting = false;
        if state.current_page == 0 {
            state.current_page = 1;
        }
    }

    /// Recomputes the config-derived fields after a reload. The current page
    /// is left where it is.
    pub fn apply_config(&self, config: &ConfigSnapshot) {
        let mut state = self.lock();
        state.autoplay = config.autoplay;
        state.base_tick_interval = config.tick_interval;
        state.tick_interval = config.tick_interval;
        state.jump_page = config.jump_page.clamp(1, state.last_page);
        self.indicator.set(state.autoplay);
        info!(
            autoplay = state.autoplay,
            tick = %humantime::format_duration(state.tick_interval),
            jump_page = state.jump_page,
            "runtime state refreshed from config"
        );
    }

    /// Drives the LED to match `autoplay`, used after the LED pin is rebound.
    pub fn sync_indicator(&self) {
        let state = self.lock();
        self.indicator.set(state.autoplay);
    }

    fn pause_locked(&self, state: &mut RuntimeState) {
        state.autoplay = false;
        state.tick_interval = PAUSED_TICK;
        self.indicator.set(false);
    }

    fn changed(&self, action: &'static str, from: u32, to: u32) -> PageChange {
        info!(action, from, to, "page changed");
        PageChange { from, to }
    }
}

fn wrap_next(page: u32, last: u32) -> u32 {
    if page >= last { 1 } else { page + 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::BindingManager;
    use crate::config::parse_env;
    use panel_hal::Level;
    use panel_hal::sim::SimGpio;

    fn navigator(text: &str) -> Navigator {
        let config = ConfigSnapshot::from_map(&parse_env(text).unwrap());
        Navigator::new(&config, Indicator::default())
    }

    #[test]
    fn next_and_previous_wrap_at_both_ends() {
        let nav = navigator("DEFAULT_PAGE=6\n");
        assert_eq!(nav.go_to_next(), PageChange { from: 6, to: 1 });
        assert_eq!(nav.go_to_previous(), PageChange { from: 1, to: 6 });

        for _ in 0..20 {
            nav.go_to_next();
            let page = nav.current_page();
            assert!((1..=LAST_PAGE).contains(&page), "page {page} out of range");
        }
        for _ in 0..20 {
            nav.go_to_previous();
            let page = nav.current_page();
            assert!((1..=LAST_PAGE).contains(&page), "page {page} out of range");
        }
    }

    #[test]
    fn jump_clamps_out_of_range_pages() {
        let nav = navigator("");
        assert_eq!(nav.jump_to(0).to, 1);
        assert_eq!(nav.jump_to(99).to, LAST_PAGE);
        assert_eq!(nav.jump_to(3).to, 3);
        assert_eq!(nav.jump_to_configured().to, 4);
    }

    #[test]
    fn manual_navigation_pauses_and_toggle_restores_base_tick() {
        let nav = navigator("ON_LOOP=true\nSLEEP_TIME=7\nDEFAULT_PAGE=3\n");
        assert!(nav.state().autoplay);

        nav.go_to_next();
        let state = nav.state();
        assert!(!state.autoplay);
        assert_eq!(state.tick_interval, PAUSED_TICK);

        assert!(nav.toggle_autoplay());
        assert_eq!(nav.tick_interval(), Duration::from_secs(7));

        assert!(!nav.toggle_autoplay());
        assert_eq!(nav.tick_interval(), PAUSED_TICK);
    }

    #[test]
    fn pause_is_idempotent() {
        let nav = navigator("ON_LOOP=true\n");
        nav.pause();
        let first = nav.state();
        nav.pause();
        assert_eq!(nav.state(), first);
        assert!(!first.autoplay);
    }

    #[test]
    fn advance_only_moves_with_autoplay() {
        let nav = navigator("DEFAULT_PAGE=6\n");
        assert_eq!(nav.advance_if_autoplay(), None);
        assert_eq!(nav.current_page(), 6);

        nav.toggle_autoplay();
        assert_eq!(nav.advance_if_autoplay(), Some(PageChange { from: 6, to: 1 }));
    }

    #[test]
    fn boot_page_is_left_once() {
        let nav = navigator("");
        assert_eq!(nav.current_page(), 0);
        assert!(nav.is_booting());
        nav.finish_boot();
        assert!(!nav.is_booting());
        assert_eq!(nav.current_page(), 1);
        nav.go_to_previous();
        nav.go_to_next();
        nav.finish_boot();
        assert_eq!(nav.current_page(), 1);
    }

    #[test]
    fn boot_keeps_a_configured_starting_page() {
        let nav = navigator("DEFAULT_PAGE=2\n");
        assert!(nav.is_booting());
        assert_eq!(nav.current_page(), 2);
        nav.finish_boot();
        assert!(!nav.is_booting());
        assert_eq!(nav.current_page(), 2);
    }

    #[test]
    fn apply_config_keeps_page_and_refreshes_timing() {
        let nav = navigator("DEFAULT_PAGE=2\n");
        let next = ConfigSnapshot::from_map(
            &parse_env("DEFAULT_PAGE=5\nON_LOOP=true\nSLEEP_TIME=9\nBUTTON_PAGE=6\n").unwrap(),
        );
        nav.apply_config(&next);
        let state = nav.state();
        assert_eq!(state.current_page, 2);
        assert!(state.autoplay);
        assert_eq!(state.tick_interval, Duration::from_secs(9));
        assert_eq!(state.base_tick_interval, Duration::from_secs(9));
        assert_eq!(state.jump_page, 6);
    }

    #[test]
    fn indicator_follows_autoplay() {
        let gpio = SimGpio::new();
        let bindings = BindingManager::new(gpio.clone());
        let config = ConfigSnapshot::from_map(&parse_env("ON_LOOP=true\n").unwrap());
        bindings.rebind(&config).unwrap();
        let nav = Navigator::new(&config, bindings.indicator());
        nav.sync_indicator();

        let led = gpio.pin("GPIO26");
        assert_eq!(led.level(), Level::High);
        nav.go_to_next();
        assert_eq!(led.level(), Level::Low);
        nav.toggle_autoplay();
        assert_eq!(led.level(), Level::High);
    }
}
