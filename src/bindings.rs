//! Input binding manager: turns the pin names of a [`ConfigSnapshot`] into
//! live handles for the four buttons and the indicator LED.
//!
//! Handles are only ever replaced as a complete set. A rebind acquires the
//! whole new set before any of it is published, and a failed acquisition
//! releases whatever part of the new set was already taken.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use panel_hal::{Edge, Gpio, HalError, Level, PinHandle, Pull};
use tracing::{debug, info, warn};

use crate::config::ConfigSnapshot;
use crate::error::{Error, Result};
use crate::events::{BUTTON_ROLES, PinRole};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared slot for the LED handle. The binding manager swaps the handle; the
/// navigator drives its level.
#[derive(Clone, Default)]
pub struct Indicator {
    pin: Arc<Mutex<Option<Arc<dyn PinHandle>>>>,
}

impl Indicator {
    pub fn set(&self, on: bool) {
        let level = if on { Level::High } else { Level::Low };
        if let Some(pin) = lock(&self.pin).as_ref() {
            if let Err(err) = pin.write(level) {
                warn!(pin = pin.name(), ?level, error = %err, "failed to drive indicator");
            }
        }
    }

    fn swap(&self, next: Option<Arc<dyn PinHandle>>) -> Option<Arc<dyn PinHandle>> {
        std::mem::replace(&mut *lock(&self.pin), next)
    }
}

/// One complete set of acquired handles.
#[derive(Clone)]
pub struct PinSet {
    pub buttons: [Arc<dyn PinHandle>; 4],
    pub led: Arc<dyn PinHandle>,
}

impl PinSet {
    pub fn names(&self) -> BoundNames {
        BoundNames {
            buttons: self.buttons.clone().map(|pin| pin.name().to_string()),
            led: self.led.name().to_string(),
        }
    }

    fn release(&self) {
        let handles = BUTTON_ROLES
            .iter()
            .zip(&self.buttons)
            .chain(std::iter::once((&PinRole::LedIndicator, &self.led)));
        for (role, pin) in handles {
            match pin.release() {
                Ok(()) => debug!(%role, pin = pin.name(), "released pin"),
                Err(err) => warn!(%role, pin = pin.name(), error = %err, "failed to release pin"),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundNames {
    pub buttons: [String; 4],
    pub led: String,
}

pub struct BindingManager {
    gpio: Arc<dyn Gpio>,
    indicator: Indicator,
    current: Mutex<Option<PinSet>>,
}

impl BindingManager {
    pub fn new(gpio: Arc<dyn Gpio>) -> Self {
        Self {
            gpio,
            indicator: Indicator::default(),
            current: Mutex::new(None),
        }
    }

    pub fn indicator(&self) -> Indicator {
        self.indicator.clone()
    }

    pub fn current(&self) -> Option<PinSet> {
        lock(&self.current).clone()
    }

    pub fn bound_names(&self) -> Option<BoundNames> {
        lock(&self.current).as_ref().map(PinSet::names)
    }

    /// Releases the current set (if any) and acquires the set named by
    /// `config`. Callers must have stopped every user of the old handles.
    pub fn rebind(&self, config: &ConfigSnapshot) -> Result<PinSet> {
        let mut current = lock(&self.current);
        if let Some(old) = current.take() {
            self.indicator.set(false);
            self.indicator.swap(None);
            old.release();
        }
        let set = self.acquire(config)?;
        self.indicator.swap(Some(set.led.clone()));
        info!(
            buttons = ?set.names().buttons,
            led = set.led.name(),
            "pins bound"
        );
        *current = Some(set.clone());
        Ok(set)
    }

    /// Drives the LED low and releases every handle.
    pub fn release_all(&self) {
        let mut current = lock(&self.current);
        self.indicator.set(false);
        self.indicator.swap(None);
        if let Some(set) = current.take() {
            set.release();
            info!("all pins released");
        }
    }

    fn acquire(&self, config: &ConfigSnapshot) -> Result<PinSet> {
        let mut taken = Vec::with_capacity(5);
        let result = self.acquire_into(config, &mut taken);
        if result.is_err() {
            for pin in &taken {
                if let Err(err) = pin.release() {
                    warn!(pin = pin.name(), error = %err, "failed to release pin after aborted bind");
                }
            }
        }
        result
    }

    fn acquire_into(
        &self,
        config: &ConfigSnapshot,
        taken: &mut Vec<Arc<dyn PinHandle>>,
    ) -> Result<PinSet> {
        let buttons = [
            self.open_button(config, 0, taken)?,
            self.open_button(config, 1, taken)?,
            self.open_button(config, 2, taken)?,
            self.open_button(config, 3, taken)?,
        ];
        let led = self.open(PinRole::LedIndicator, &config.led_pin, taken)?;
        led.configure_as_output(Level::Low)
            .map_err(|source| bind_error(PinRole::LedIndicator, &config.led_pin, source))?;
        Ok(PinSet { buttons, led })
    }

    fn open_button(
        &self,
        config: &ConfigSnapshot,
        idx: usize,
        taken: &mut Vec<Arc<dyn PinHandle>>,
    ) -> Result<Arc<dyn PinHandle>> {
        let role = BUTTON_ROLES[idx];
        let name = &config.button_pins[idx];
        let pin = self.open(role, name, taken)?;
        pin.configure_as_input(Pull::Up, Edge::Falling)
            .map_err(|source| bind_error(role, name, source))?;
        Ok(pin)
    }

    fn open(
        &self,
        role: PinRole,
        name: &str,
        taken: &mut Vec<Arc<dyn PinHandle>>,
    ) -> Result<Arc<dyn PinHandle>> {
        let pin = self
            .gpio
            .resolve(name)
            .map_err(|source| bind_error(role, name, source))?;
        taken.push(pin.clone());
        debug!(%role, pin = name, "acquired pin");
        Ok(pin)
    }
}

fn bind_error(role: PinRole, pin: &str, source: HalError) -> Error {
    Error::Bind {
        role,
        pin: pin.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_env;
    use panel_hal::sim::{PinMode, SimGpio};

    fn config(text: &str) -> ConfigSnapshot {
        ConfigSnapshot::from_map(&parse_env(text).unwrap())
    }

    #[test]
    fn binds_buttons_as_pulled_up_inputs_and_led_as_output() {
        let gpio = SimGpio::new();
        let manager = BindingManager::new(gpio.clone());
        manager.rebind(&ConfigSnapshot::default()).unwrap();

        assert_eq!(
            gpio.pin("GPIO17").mode(),
            Some(PinMode::Input(Pull::Up, Edge::Falling))
        );
        assert_eq!(gpio.pin("GPIO26").mode(), Some(PinMode::Output));
        assert_eq!(gpio.pin("GPIO26").writes(), vec![Level::Low]);

        manager.indicator().set(true);
        assert_eq!(gpio.pin("GPIO26").level(), Level::High);
    }

    #[test]
    fn rebind_replaces_every_handle() {
        let gpio = SimGpio::new();
        let manager = BindingManager::new(gpio.clone());
        manager.rebind(&ConfigSnapshot::default()).unwrap();
        manager
            .rebind(&config(
                "GPIO_BUTTON1=GPIO5\nGPIO_BUTTON2=GPIO6\nGPIO_BUTTON3=GPIO13\nGPIO_BUTTON4=GPIO19\nGPIO_LED1=GPIO21\n",
            ))
            .unwrap();

        let names = manager.bound_names().unwrap();
        assert_eq!(names.buttons, ["GPIO5", "GPIO6", "GPIO13", "GPIO19"]);
        assert_eq!(names.led, "GPIO21");
        for old in ["GPIO17", "GPIO27", "GPIO22", "GPIO23", "GPIO26"] {
            assert!(gpio.pin(old).is_released(), "{old} still held");
        }

        manager.indicator().set(true);
        assert_eq!(gpio.pin("GPIO21").level(), Level::High);
        assert_eq!(gpio.pin("GPIO26").writes().last(), Some(&Level::Low));
    }

    #[test]
    fn failed_acquisition_releases_partial_set() {
        let gpio = SimGpio::new();
        gpio.reject("GPIO99");
        let manager = BindingManager::new(gpio.clone());
        let err = manager
            .rebind(&config("GPIO_BUTTON3=GPIO99\n"))
            .err()
            .expect("unknown pin must fail");
        assert!(matches!(
            err,
            Error::Bind { role: PinRole::ButtonJump, ref pin, .. } if pin == "GPIO99"
        ));
        assert!(gpio.pin("GPIO17").is_released());
        assert!(gpio.pin("GPIO27").is_released());
        assert!(manager.bound_names().is_none());
    }

    #[test]
    fn aborted_bind_keeps_releasing_after_a_cleanup_error() {
        let gpio = SimGpio::new();
        gpio.reject("GPIO99");
        gpio.pin("GPIO17").fail_release();
        let manager = BindingManager::new(gpio.clone());
        let err = manager
            .rebind(&config("GPIO_LED1=GPIO99\n"))
            .err()
            .expect("unknown pin must fail");
        assert!(matches!(
            err,
            Error::Bind { role: PinRole::LedIndicator, .. }
        ));
        for name in ["GPIO17", "GPIO27", "GPIO22", "GPIO23"] {
            assert_eq!(gpio.pin(name).release_count(), 1, "{name} not released");
        }
    }

    #[test]
    fn release_all_turns_led_off() {
        let gpio = SimGpio::new();
        let manager = BindingManager::new(gpio.clone());
        manager.rebind(&ConfigSnapshot::default()).unwrap();
        manager.indicator().set(true);
        manager.release_all();

        let led = gpio.pin("GPIO26");
        assert_eq!(led.writes().last(), Some(&Level::Low));
        assert!(led.is_released());
        assert!(manager.current().is_none());
    }
}
