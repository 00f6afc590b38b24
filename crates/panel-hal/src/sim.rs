//! In-memory collaborators.
//!
//! Used by the test-suite and by `status-panel --simulate`. Pins keep their
//! level and a queue of pending edges; the display keeps the most recent
//! frames it was asked to draw.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::trace;

use crate::{
    DiskUsage, Display, Edge, Frame, Gpio, HalError, Level, MemoryUsage, NetworkIdentity,
    PinHandle, Pull, Reading, Sensor, SensorKind, SystemStats,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input(Pull, Edge),
    Output,
}

/// A GPIO line backed by memory. Idles high, like a pulled-up button.
pub struct SimPin {
    name: String,
    level: Mutex<Level>,
    mode: Mutex<Option<PinMode>>,
    writes: Mutex<Vec<Level>>,
    edges_tx: Sender<()>,
    edges_rx: Receiver<()>,
    released: AtomicBool,
    releases: AtomicUsize,
    read_failures: AtomicUsize,
    release_fails: AtomicBool,
}

impl SimPin {
    fn new(name: &str) -> Self {
        let (edges_tx, edges_rx) = unbounded();
        Self {
            name: name.to_string(),
            level: Mutex::new(Level::High),
            mode: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            edges_tx,
            edges_rx,
            released: AtomicBool::new(false),
            releases: AtomicUsize::new(0),
            read_failures: AtomicUsize::new(0),
            release_fails: AtomicBool::new(false),
        }
    }

    /// Pulls the line low and queues a falling edge.
    pub fn press(&self) {
        *lock(&self.level) = Level::Low;
        let _ = self.edges_tx.send(());
    }

    /// Lets the line return high without queuing an edge.
    pub fn lift(&self) {
        *lock(&self.level) = Level::High;
    }

    /// Queues an edge without changing the level, like electrical noise.
    pub fn glitch(&self) {
        let _ = self.edges_tx.send(());
    }

    /// Makes the next `count` reads fail.
    pub fn fail_reads(&self, count: usize) {
        self.read_failures.store(count, Ordering::SeqCst);
    }

    /// Makes the next `release()` report an error. The line is still freed.
    pub fn fail_release(&self) {
        self.release_fails.store(true, Ordering::SeqCst);
    }

    pub fn level(&self) -> Level {
        *lock(&self.level)
    }

    pub fn mode(&self) -> Option<PinMode> {
        *lock(&self.mode)
    }

    pub fn writes(&self) -> Vec<Level> {
        lock(&self.writes).clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<(), HalError> {
        if self.is_released() {
            return Err(HalError::Released(self.name.clone()));
        }
        Ok(())
    }
}

impl PinHandle for SimPin {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure_as_input(&self, pull: Pull, edge: Edge) -> Result<(), HalError> {
        self.ensure_live()?;
        *lock(&self.mode) = Some(PinMode::Input(pull, edge));
        Ok(())
    }

    fn configure_as_output(&self, initial: Level) -> Result<(), HalError> {
        self.ensure_live()?;
        *lock(&self.mode) = Some(PinMode::Output);
        *lock(&self.level) = initial;
        lock(&self.writes).push(initial);
        Ok(())
    }

    fn wait_for_edge(&self, timeout: Duration) -> Result<bool, HalError> {
        self.ensure_live()?;
        match self.edges_rx.recv_timeout(timeout) {
            Ok(()) => Ok(true),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(false),
        }
    }

    fn read(&self) -> Result<Level, HalError> {
        self.ensure_live()?;
        let pending = self.read_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.read_failures.store(pending - 1, Ordering::SeqCst);
            return Err(HalError::Gpio {
                pin: self.name.clone(),
                source: "simulated read failure".into(),
            });
        }
        Ok(self.level())
    }

    fn write(&self, level: Level) -> Result<(), HalError> {
        self.ensure_live()?;
        *lock(&self.level) = level;
        lock(&self.writes).push(level);
        Ok(())
    }

    fn release(&self) -> Result<(), HalError> {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        *lock(&self.mode) = None;
        if self.release_fails.swap(false, Ordering::SeqCst) {
            return Err(HalError::Gpio {
                pin: self.name.clone(),
                source: "simulated release failure".into(),
            });
        }
        Ok(())
    }
}

/// A pin registry. Resolving a name returns the same [`SimPin`] every time so
/// tests can drive lines that the controller holds.
#[derive(Default)]
pub struct SimGpio {
    pins: Mutex<HashMap<String, Arc<SimPin>>>,
    resolved: Mutex<Vec<String>>,
    unknown: Mutex<HashSet<String>>,
}

impl SimGpio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pin(&self, name: &str) -> Arc<SimPin> {
        lock(&self.pins)
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SimPin::new(name)))
            .clone()
    }

    /// Makes `resolve(name)` fail from now on.
    pub fn reject(&self, name: &str) {
        lock(&self.unknown).insert(name.to_string());
    }

    /// Every name resolved so far, in order.
    pub fn resolved(&self) -> Vec<String> {
        lock(&self.resolved).clone()
    }
}

impl Gpio for SimGpio {
    fn resolve(&self, name: &str) -> Result<Arc<dyn PinHandle>, HalError> {
        if lock(&self.unknown).contains(name) {
            return Err(HalError::UnknownPin(name.to_string()));
        }
        let pin = self.pin(name);
        pin.released.store(false, Ordering::SeqCst);
        while pin.edges_rx.try_recv().is_ok() {}
        lock(&self.resolved).push(name.to_string());
        Ok(pin)
    }
}

/// Keeps the last `keep` frames it was asked to draw.
#[derive(Clone)]
pub struct SimDisplay {
    frames: Arc<Mutex<VecDeque<Frame>>>,
    drawn: Arc<AtomicUsize>,
    keep: usize,
    fail: Arc<AtomicBool>,
}

impl SimDisplay {
    pub fn new(keep: usize) -> Self {
        Self {
            frames: Arc::new(Mutex::new(VecDeque::with_capacity(keep))),
            drawn: Arc::new(AtomicUsize::new(0)),
            keep,
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn frames(&self) -> Vec<Frame> {
        lock(&self.frames).iter().cloned().collect()
    }

    pub fn last(&self) -> Option<Frame> {
        lock(&self.frames).back().cloned()
    }

    /// Total frames drawn, including ones no longer kept.
    pub fn drawn(&self) -> usize {
        self.drawn.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

impl Display for SimDisplay {
    fn draw(&mut self, frame: &Frame) -> Result<(), HalError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HalError::Display("simulated bus failure".to_string()));
        }
        let n = self.drawn.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(frame = n, lit = frame.lit_pixels(), "simulated draw");
        let mut frames = lock(&self.frames);
        if frames.len() == self.keep {
            frames.pop_front();
        }
        if self.keep > 0 {
            frames.push_back(frame.clone());
        }
        Ok(())
    }
}

/// Returns a fixed reading, or a fixed error message.
pub struct SimSensor {
    result: Mutex<Result<Reading, String>>,
    reads: AtomicUsize,
}

impl SimSensor {
    pub fn reading(humidity: f64, temperature_c: f64) -> Self {
        Self {
            result: Mutex::new(Ok(Reading {
                humidity,
                temperature_c,
            })),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            result: Mutex::new(Err(message.into())),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Sensor for SimSensor {
    fn read_humidity_temperature(
        &self,
        _pin: &str,
        _kind: SensorKind,
        _retries: u32,
        _interrupted: &dyn Fn() -> bool,
    ) -> Result<Reading, HalError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        lock(&self.result).clone().map_err(HalError::Sensor)
    }
}

/// Fixed host figures.
#[derive(Debug, Clone)]
pub struct SimStats {
    pub network: NetworkIdentity,
    pub cpu_usage: f64,
    pub cpu_temperature: f64,
    pub memory: MemoryUsage,
    pub disk: DiskUsage,
}

impl Default for SimStats {
    fn default() -> Self {
        Self {
            network: NetworkIdentity {
                hostname: "raspberrypi".to_string(),
                address: "192.168.1.42".to_string(),
            },
            cpu_usage: 12.5,
            cpu_temperature: 48.3,
            memory: MemoryUsage {
                total: 4.0,
                used: 1.25,
                percent: 31.25,
            },
            disk: DiskUsage {
                total: 29.1,
                free: 21.6,
                used: 7.5,
                percent: 25.8,
            },
        }
    }
}

impl SystemStats for SimStats {
    fn network(&self) -> NetworkIdentity {
        self.network.clone()
    }

    fn cpu_usage(&self) -> f64 {
        self.cpu_usage
    }

    fn cpu_temperature(&self) -> f64 {
        self.cpu_temperature
    }

    fn memory(&self) -> MemoryUsage {
        self.memory
    }

    fn disk(&self) -> DiskUsage {
        self.disk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_queues_edge_and_pulls_low() {
        let gpio = SimGpio::new();
        let handle = gpio.resolve("GPIO17").unwrap();
        let pin = gpio.pin("GPIO17");
        assert!(!handle.wait_for_edge(Duration::from_millis(1)).unwrap());
        pin.press();
        assert!(handle.wait_for_edge(Duration::from_millis(1)).unwrap());
        assert_eq!(handle.read().unwrap(), Level::Low);
        pin.lift();
        assert_eq!(handle.read().unwrap(), Level::High);
    }

    #[test]
    fn released_handles_refuse_io_until_resolved_again() {
        let gpio = SimGpio::new();
        let handle = gpio.resolve("GPIO26").unwrap();
        handle.release().unwrap();
        handle.release().unwrap();
        assert!(matches!(handle.read(), Err(HalError::Released(_))));
        assert_eq!(gpio.pin("GPIO26").release_count(), 1);

        let again = gpio.resolve("GPIO26").unwrap();
        assert!(again.write(Level::High).is_ok());
        assert_eq!(gpio.resolved(), vec!["GPIO26", "GPIO26"]);
    }

    #[test]
    fn rejected_names_fail_to_resolve() {
        let gpio = SimGpio::new();
        gpio.reject("GPIO99");
        assert!(matches!(
            gpio.resolve("GPIO99"),
            Err(HalError::UnknownPin(name)) if name == "GPIO99"
        ));
    }

    #[test]
    fn display_keeps_only_recent_frames() {
        let mut display = SimDisplay::new(2);
        let mut frame = Frame::new();
        for x in 0..3 {
            frame.set(x, 0, true);
            display.draw(&frame).unwrap();
        }
        assert_eq!(display.drawn(), 3);
        let kept = display.frames();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].lit_pixels(), 3);

        display.set_failing(true);
        assert!(display.draw(&frame).is_err());
    }
}
