#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use panel_hal::sim::SimGpio;
use status_panel::bindings::BindingManager;
use status_panel::config::{ConfigSnapshot, parse_env};
use status_panel::navigator::Navigator;

pub fn snapshot(text: &str) -> ConfigSnapshot {
    ConfigSnapshot::from_map(&parse_env(text).expect("valid settings"))
}

/// Simulated GPIO, bound to `config`, with a navigator driving its LED.
pub fn bound(config: &ConfigSnapshot) -> (Arc<SimGpio>, Arc<BindingManager>, Arc<Navigator>) {
    let gpio = SimGpio::new();
    let bindings = Arc::new(BindingManager::new(gpio.clone()));
    bindings.rebind(config).expect("bind default pins");
    let navigator = Arc::new(Navigator::new(config, bindings.indicator()));
    navigator.sync_indicator();
    (gpio, bindings, navigator)
}

/// Polls `cond` every 10ms until it holds or `timeout` runs out.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}
