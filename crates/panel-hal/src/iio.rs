//! DHT11/DHT22 through the kernel `dht11` IIO driver.
//!
//! Enable it with `dtoverlay=dht11,gpiopin=<pin>`. The driver exposes
//! milli-degrees and milli-percent under `/sys/bus/iio/devices/iio:deviceN`.
//! Reads fail with `EIO` fairly often on these sensors, hence the retries.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::{HalError, Reading, Sensor, SensorKind};

const DRIVER_NAME: &str = "dht11";
const PAUSE_SLICE: Duration = Duration::from_millis(20);

pub struct IioSensor {
    root: PathBuf,
    retry_delay: Duration,
}

impl IioSensor {
    pub fn new() -> Self {
        Self::with_root("/sys/bus/iio/devices")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retry_delay: Duration::from_secs(2),
        }
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn find_device(&self) -> Result<PathBuf, HalError> {
        let mut devices = fs::read_dir(&self.root)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                fs::read_to_string(path.join("name"))
                    .map(|name| name.trim() == DRIVER_NAME)
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        devices.sort();
        devices.into_iter().next().ok_or_else(|| {
            HalError::Sensor(format!(
                "no {DRIVER_NAME} device under {}",
                self.root.display()
            ))
        })
    }

    fn read_once(device: &Path) -> io::Result<Reading> {
        let temperature = read_milli(&device.join("in_temp_input"))?;
        let humidity = read_milli(&device.join("in_humidityrelative_input"))?;
        Ok(Reading {
            humidity,
            temperature_c: temperature,
        })
    }
}

impl Default for IioSensor {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleeps for `delay` unless `interrupted` fires first. Returns false when
/// interrupted.
fn pause(delay: Duration, interrupted: &dyn Fn() -> bool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if interrupted() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(PAUSE_SLICE));
    }
}

fn read_milli(path: &Path) -> io::Result<f64> {
    let raw = fs::read_to_string(path)?;
    raw.trim()
        .parse::<f64>()
        .map(|value| value / 1000.0)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

impl Sensor for IioSensor {
    fn read_humidity_temperature(
        &self,
        pin: &str,
        kind: SensorKind,
        retries: u32,
        interrupted: &dyn Fn() -> bool,
    ) -> Result<Reading, HalError> {
        let device = self.find_device()?;
        debug!(device = %device.display(), pin, %kind, "reading humidity sensor");
        let attempts = retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match Self::read_once(&device) {
                Ok(reading) => return Ok(reading),
                Err(err) => {
                    debug!(attempt, error = %err, "sensor read failed");
                    last_error = Some(err);
                }
            }
            if attempt < attempts && !pause(self.retry_delay, interrupted) {
                debug!(attempt, "sensor retries abandoned");
                return Err(HalError::Interrupted);
            }
        }
        let err = last_error.map_or_else(|| "no attempts made".to_string(), |e| e.to_string());
        warn!(pin, %kind, attempts, "sensor gave no reading");
        Err(HalError::Sensor(format!(
            "{kind} read failed after {attempts} attempts: {err}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_device(root: &Path, name: &str, temp: &str, humidity: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("name"), "dht11\n").unwrap();
        fs::write(dir.join("in_temp_input"), temp).unwrap();
        fs::write(dir.join("in_humidityrelative_input"), humidity).unwrap();
        dir
    }

    #[test]
    fn reads_milli_units() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("iio:device0")).unwrap();
        fs::write(root.path().join("iio:device0/name"), "mcp3008\n").unwrap();
        fake_device(root.path(), "iio:device1", "23500\n", "41000\n");

        let sensor = IioSensor::with_root(root.path()).retry_delay(Duration::ZERO);
        let reading = sensor
            .read_humidity_temperature("4", SensorKind::Dht22, 3, &|| false)
            .unwrap();
        assert!((reading.temperature_c - 23.5).abs() < f64::EPSILON);
        assert!((reading.humidity - 41.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reports_error_after_retries() {
        let root = tempfile::tempdir().unwrap();
        fake_device(root.path(), "iio:device0", "garbage", "41000");

        let sensor = IioSensor::with_root(root.path()).retry_delay(Duration::ZERO);
        let err = sensor
            .read_humidity_temperature("4", SensorKind::Dht11, 2, &|| false)
            .unwrap_err();
        assert!(err.to_string().contains("after 2 attempts"), "{err}");
    }

    #[test]
    fn retry_wait_gives_way_to_interruption() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let root = tempfile::tempdir().unwrap();
        fake_device(root.path(), "iio:device0", "garbage", "41000");
        let sensor = IioSensor::with_root(root.path());
        let stop = Arc::new(AtomicBool::new(false));
        let trigger = {
            let stop = stop.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                stop.store(true, Ordering::SeqCst);
            })
        };

        let start = Instant::now();
        let interrupted = || stop.load(Ordering::SeqCst);
        let result = sensor.read_humidity_temperature("4", SensorKind::Dht11, 11, &interrupted);
        trigger.join().unwrap();
        assert!(matches!(result, Err(HalError::Interrupted)));
        assert!(start.elapsed() < Duration::from_secs(1), "{:?}", start.elapsed());
    }

    #[test]
    fn missing_device_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let sensor = IioSensor::with_root(root.path());
        assert!(matches!(
            sensor.read_humidity_temperature("4", SensorKind::Dht11, 1, &|| false),
            Err(HalError::Sensor(_))
        ));
    }
}
