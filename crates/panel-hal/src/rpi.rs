//! Raspberry Pi GPIO through `rppal`, which can set the internal bias of a
//! line as well as wait for edges on it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rppal::gpio::{self, InputPin, OutputPin, Pin, Trigger};
use tracing::{debug, warn};

use crate::{Edge, Gpio, HalError, Level, PinHandle, Pull, parse_pin_number};

pub struct RpiGpio {
    gpio: gpio::Gpio,
}

impl RpiGpio {
    pub fn open() -> Result<Self, HalError> {
        let gpio = gpio::Gpio::new().map_err(|err| gpio_error("gpiochip", err))?;
        Ok(Self { gpio })
    }
}

impl Gpio for RpiGpio {
    fn resolve(&self, name: &str) -> Result<Arc<dyn PinHandle>, HalError> {
        let number = u8::try_from(parse_pin_number(name)?)
            .map_err(|_| HalError::UnknownPin(name.to_string()))?;
        let pin = self.gpio.get(number).map_err(|err| gpio_error(name, err))?;
        debug!(pin = name, number, "acquired gpio line");
        Ok(Arc::new(RpiPin {
            name: name.to_string(),
            line: Mutex::new(Line::Idle(pin)),
        }))
    }
}

enum Line {
    Idle(Pin),
    Input(InputPin),
    Output(OutputPin),
    Released,
}

pub struct RpiPin {
    name: String,
    line: Mutex<Line>,
}

impl RpiPin {
    fn line(&self) -> MutexGuard<'_, Line> {
        self.line.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A line is configured once, straight after it is acquired.
    fn take_pin(&self, line: &mut Line) -> Result<Pin, HalError> {
        match std::mem::replace(line, Line::Released) {
            Line::Idle(pin) => Ok(pin),
            Line::Released => Err(HalError::Released(self.name.clone())),
            configured => {
                *line = configured;
                Err(HalError::Gpio {
                    pin: self.name.clone(),
                    source: "line is already configured".into(),
                })
            }
        }
    }
}

fn gpio_error(pin: &str, err: gpio::Error) -> HalError {
    HalError::Gpio {
        pin: pin.to_string(),
        source: Box::new(err),
    }
}

impl PinHandle for RpiPin {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure_as_input(&self, pull: Pull, edge: Edge) -> Result<(), HalError> {
        let mut line = self.line();
        let pin = self.take_pin(&mut line)?;
        let mut input = match pull {
            Pull::Up => pin.into_input_pullup(),
            Pull::Down => pin.into_input_pulldown(),
            Pull::None => pin.into_input(),
        };
        let trigger = match edge {
            Edge::None => None,
            Edge::Rising => Some(Trigger::RisingEdge),
            Edge::Falling => Some(Trigger::FallingEdge),
            Edge::Both => Some(Trigger::Both),
        };
        if let Some(trigger) = trigger {
            input
                .set_interrupt(trigger, None)
                .map_err(|err| gpio_error(&self.name, err))?;
        }
        debug!(pin = %self.name, ?pull, ?edge, "configured as input");
        *line = Line::Input(input);
        Ok(())
    }

    fn configure_as_output(&self, initial: Level) -> Result<(), HalError> {
        let mut line = self.line();
        let pin = self.take_pin(&mut line)?;
        let output = match initial {
            Level::Low => pin.into_output_low(),
            Level::High => pin.into_output_high(),
        };
        *line = Line::Output(output);
        Ok(())
    }

    fn wait_for_edge(&self, timeout: Duration) -> Result<bool, HalError> {
        let mut line = self.line();
        match &mut *line {
            Line::Input(pin) => pin
                .poll_interrupt(false, Some(timeout))
                .map(|event| event.is_some())
                .map_err(|err| gpio_error(&self.name, err)),
            Line::Released => Err(HalError::Released(self.name.clone())),
            _ => Ok(false),
        }
    }

    fn read(&self) -> Result<Level, HalError> {
        let level = match &*self.line() {
            Line::Idle(pin) => pin.read(),
            Line::Input(pin) => pin.read(),
            Line::Output(pin) => {
                if pin.is_set_high() {
                    gpio::Level::High
                } else {
                    gpio::Level::Low
                }
            }
            Line::Released => return Err(HalError::Released(self.name.clone())),
        };
        Ok(match level {
            gpio::Level::Low => Level::Low,
            gpio::Level::High => Level::High,
        })
    }

    fn write(&self, level: Level) -> Result<(), HalError> {
        match &mut *self.line() {
            Line::Output(pin) => {
                match level {
                    Level::Low => pin.set_low(),
                    Level::High => pin.set_high(),
                }
                Ok(())
            }
            Line::Released => Err(HalError::Released(self.name.clone())),
            _ => Err(HalError::Gpio {
                pin: self.name.clone(),
                source: "line is not configured as an output".into(),
            }),
        }
    }

    fn release(&self) -> Result<(), HalError> {
        let mut line = self.line();
        if let Line::Input(pin) = &mut *line {
            if let Err(err) = pin.clear_interrupt() {
                warn!(pin = %self.name, error = %err, "failed to clear edge detection");
            }
        }
        // Dropping the rppal handle resets the line and frees it.
        *line = Line::Released;
        Ok(())
    }
}
