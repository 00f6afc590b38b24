//! Settings file handling.
//!
//! The settings file is a dotenv-style flat mapping (`KEY=VALUE` per line).
//! It is parsed into an immutable [`ConfigSnapshot`]; [`ConfigStore`] hands
//! out shared snapshots and swaps in a whole new one on reload, so readers
//! never observe a mix of old and new fields.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use panel_hal::SensorKind;
use tracing::warn;

use crate::error::{Error, Result};

/// Number of content pages (sensor, network, CPU load, CPU temperature,
/// memory, disk). Page 0 is the one-time boot splash.
pub const LAST_PAGE: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub show_logo: bool,
    pub show_sensor: bool,
    pub sensor_type: String,
    pub sensor_pin: String,
    pub autoplay: bool,
    pub base_page: u32,
    pub tick_interval: Duration,
    /// `GPIO_BUTTON1..4`: previous, next, jump, toggle autoplay.
    pub button_pins: [String; 4],
    pub jump_page: u32,
    pub led_pin: String,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::from_map(&BTreeMap::new())
    }
}

impl ConfigSnapshot {
    /// Builds a snapshot, substituting defaults for unset or unusable values.
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).map(String::as_str).unwrap_or("");
        let pin = |key: &str, default: &str| {
            let value = get(key);
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };

        Self {
            show_logo: parse_flag(get("SHOW_LOGO")),
            show_sensor: parse_flag(get("SHOW_DHT")),
            sensor_type: pin("DHT_TYPE", "DHT11"),
            sensor_pin: pin("DHT_PIN", "4"),
            autoplay: parse_flag(get("ON_LOOP")),
            base_page: default_page(get("DEFAULT_PAGE")),
            tick_interval: sleep_time(get("SLEEP_TIME")),
            button_pins: [
                pin("GPIO_BUTTON1", "GPIO17"),
                pin("GPIO_BUTTON2", "GPIO27"),
                pin("GPIO_BUTTON3", "GPIO22"),
                pin("GPIO_BUTTON4", "GPIO23"),
            ],
            jump_page: button_page(get("BUTTON_PAGE")),
            led_pin: pin("GPIO_LED1", "GPIO26"),
        }
    }

    /// Reads and parses `path`. Any failure is returned to the caller.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let map = parse_env(&contents)?;
        Ok(Self::from_map(&map))
    }

    /// Like [`ConfigSnapshot::load`], but falls back to the defaults when the
    /// file is missing or malformed. Used once at startup.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "using default configuration");
                Self::default()
            }
        }
    }

    pub fn sensor_kind(&self) -> SensorKind {
        self.sensor_type.parse().unwrap_or_else(|_| {
            warn!(sensor_type = %self.sensor_type, "unknown sensor type; assuming DHT11");
            SensorKind::Dht11
        })
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

fn default_page(value: &str) -> u32 {
    match value.parse::<i64>() {
        Ok(page) if page > 0 => page.min(i64::from(LAST_PAGE)) as u32,
        Ok(_) => 0,
        Err(_) if value.is_empty() => 0,
        Err(err) => {
            warn!(value, error = %err, "DEFAULT_PAGE is not a number");
            0
        }
    }
}

fn sleep_time(value: &str) -> Duration {
    const DEFAULT: Duration = Duration::from_secs(3);
    match value.parse::<i64>() {
        Ok(secs) if secs > 0 => Duration::from_secs(secs as u64),
        Ok(secs) => {
            warn!(secs, "SLEEP_TIME must be positive");
            DEFAULT
        }
        Err(_) if value.is_empty() => DEFAULT,
        Err(err) => {
            warn!(value, error = %err, "SLEEP_TIME is not a number");
            DEFAULT
        }
    }
}

fn button_page(value: &str) -> u32 {
    match value.parse::<i64>() {
        Ok(page) if page > i64::from(LAST_PAGE) => LAST_PAGE,
        Ok(page) if page <= 0 => 1,
        Ok(page) => page as u32,
        Err(_) => 4,
    }
}

/// Parses dotenv-style text: `KEY=VALUE` lines, `#` comments, an optional
/// `export ` prefix, quoted values and trailing comments.
pub fn parse_env(contents: &str) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for item in dotenvy::from_read_iter(contents.as_bytes()) {
        let (key, value) = item.map_err(|err| syntax_error(contents, err))?;
        map.insert(key, value);
    }
    Ok(map)
}

fn syntax_error(contents: &str, err: dotenvy::Error) -> Error {
    match err {
        dotenvy::Error::LineParse(content, _) => {
            let needle = content.trim();
            let line = contents
                .lines()
                .position(|line| !needle.is_empty() && line.contains(needle))
                .map_or(0, |idx| idx + 1);
            Error::ConfigSyntax { line, content }
        }
        other => Error::ConfigSyntax {
            line: 0,
            content: other.to_string(),
        },
    }
}

/// Holds the current snapshot. Reloads replace it wholesale.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs `next` and returns the snapshot it replaced.
    pub fn replace(&self, next: ConfigSnapshot) -> Arc<ConfigSnapshot> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, Arc::new(next))
    }
}
