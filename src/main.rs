//! Binary entrypoint for the status panel.
//!
//! Wires the hardware backends to the library tasks and owns the process
//! lifecycle: signals, fatal errors and the exit status.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use panel_hal::sim::{SimDisplay, SimGpio, SimSensor, SimStats};
use panel_hal::{Display, Gpio, Sensor, SystemStats};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use status_panel::bindings::BindingManager;
use status_panel::config::{ConfigSnapshot, ConfigStore};
use status_panel::navigator::Navigator;
use status_panel::render::Renderer;
use status_panel::tasks::buttons::{InputController, WatcherTiming};
use status_panel::tasks::config_watch::{self, ReloadTargets, ReloadTiming};
use status_panel::tasks::scheduler::{Scheduler, SchedulerTiming};
use status_panel::tasks::shutdown::{FarewellTiming, ShutdownCoordinator};

#[derive(Debug, Parser)]
#[command(
    name = "status-panel",
    version,
    about = "Status pages on a small OLED with button navigation"
)]
struct Cli {
    /// Path to the dotenv-style settings file
    #[arg(short, long, value_name = "FILE", default_value = ".env")]
    config: PathBuf,

    /// Run against in-memory hardware; type 1-4 + Enter to press a button, q to quit
    #[arg(long)]
    simulate: bool,

    /// I2C bus the panel is attached to
    #[arg(long, value_name = "DEV", default_value = "/dev/i2c-1")]
    i2c_bus: PathBuf,

    /// I2C address of the panel
    #[arg(long, value_name = "ADDR", default_value = "0x3C", value_parser = parse_address)]
    i2c_address: u8,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn parse_address(value: &str) -> Result<u8, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"));
    match digits {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    }
    .map_err(|err| format!("invalid I2C address {value:?}: {err}"))
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("status_panel={level}").parse()?)
        .add_directive(format!("panel_hal={level}").parse()?)
        .add_directive("notify=warn".parse()?);
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
    Ok(())
}

struct Backends {
    gpio: Arc<dyn Gpio>,
    display: Box<dyn Display>,
    sensor: Arc<dyn Sensor>,
    stats: Arc<dyn SystemStats>,
    sim: Option<Arc<SimGpio>>,
}

impl Backends {
    fn simulated() -> Self {
        let gpio = SimGpio::new();
        Self {
            gpio: gpio.clone(),
            display: Box::new(SimDisplay::new(1)),
            sensor: Arc::new(SimSensor::reading(45.0, 23.5)),
            stats: Arc::new(SimStats::default()),
            sim: Some(gpio),
        }
    }

    #[cfg(target_os = "linux")]
    fn hardware(cli: &Cli) -> Result<Self> {
        use panel_hal::host::HostStats;
        use panel_hal::iio::IioSensor;
        use panel_hal::oled::Ssd1306Display;
        use panel_hal::rpi::RpiGpio;

        let display = Ssd1306Display::open(&cli.i2c_bus, cli.i2c_address).with_context(|| {
            format!(
                "opening display at {} address {:#04x}",
                cli.i2c_bus.display(),
                cli.i2c_address
            )
        })?;
        Ok(Self {
            gpio: Arc::new(RpiGpio::open().context("opening gpio")?),
            display: Box::new(display),
            sensor: Arc::new(IioSensor::new()),
            stats: Arc::new(HostStats::new()),
            sim: None,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn hardware(_cli: &Cli) -> Result<Self> {
        Err(anyhow!("hardware backends need Linux; run with --simulate"))
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = try_main().await {
        error!(error = ?err, "status-panel exited with error");
        std::process::exit(1);
    }
}

async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config = ConfigSnapshot::load_or_default(&cli.config);
    info!(path = %cli.config.display(), ?config, "settings loaded");
    let store = Arc::new(ConfigStore::new(config.clone()));

    let backends = if cli.simulate {
        info!("running with simulated hardware");
        Backends::simulated()
    } else {
        Backends::hardware(&cli)?
    };

    let shutdown = CancellationToken::new();
    let bindings = Arc::new(BindingManager::new(backends.gpio.clone()));
    let navigator = Arc::new(Navigator::new(&config, bindings.indicator()));
    let pins = bindings.rebind(&config).context("binding pins")?;
    navigator.sync_indicator();

    let mut controller = InputController::new(
        bindings.clone(),
        navigator.clone(),
        WatcherTiming::default(),
        shutdown.clone(),
    );
    controller.start(&pins);
    let inputs = Arc::new(Mutex::new(controller));

    #[cfg(unix)]
    {
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = wait_for_termination().await {
                warn!("signal handler failed: {err}");
                return;
            }
            cancel.cancel();
        });
    }
    #[cfg(not(unix))]
    {
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    if let Some(gpio) = backends.sim.clone() {
        spawn_simulated_presses(gpio, store.clone(), shutdown.clone());
    }

    let mut tasks = JoinSet::new();
    tasks.spawn({
        let path = cli.config.clone();
        let targets = ReloadTargets {
            store: store.clone(),
            navigator: navigator.clone(),
            inputs: inputs.clone(),
        };
        let cancel = shutdown.clone();
        async move {
            config_watch::run(path, targets, ReloadTiming::default(), cancel)
                .await
                .context("config watcher failed")
        }
    });

    let scheduler = Scheduler::new(
        backends.display,
        Renderer::new(backends.sensor, backends.stats),
        navigator.clone(),
        store.clone(),
        SchedulerTiming::default(),
        shutdown.clone(),
    );
    let mut scheduler_task = tokio::task::spawn_blocking(move || scheduler.run());

    let outcome = loop {
        tokio::select! {
            res = &mut scheduler_task => {
                break res
                    .context("scheduler panicked")
                    .and_then(|run| run.context("scheduler failed"));
            }
            Some(res) = tasks.join_next() => match res {
                Ok(Ok(())) => debug!("background task finished"),
                Ok(Err(err)) => {
                    shutdown.cancel();
                    let _ = scheduler_task.await;
                    break Err(err);
                }
                Err(err) => {
                    shutdown.cancel();
                    let _ = scheduler_task.await;
                    break Err(anyhow!("background task panicked: {err}"));
                }
            }
        }
    };

    let display = match outcome {
        Ok(display) => display,
        Err(err) => {
            shutdown.cancel();
            if let Err(release) = inputs.lock().await.shutdown().await {
                warn!(error = %release, "pins not released cleanly");
            }
            return Err(err);
        }
    };

    ShutdownCoordinator::new(inputs, FarewellTiming::default())
        .run(display)
        .await
        .context("shutdown failed")?;

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("task error during shutdown: {e:?}"),
            Err(e) => warn!("join error: {e}"),
        }
    }
    info!("bye");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
    };
    info!(signal = name, "termination requested");
    Ok(())
}

/// Maps stdin lines `1`..`4` to presses on the buttons bound by the current
/// settings. `q` or end of input requests shutdown.
fn spawn_simulated_presses(gpio: Arc<SimGpio>, store: Arc<ConfigStore>, cancel: CancellationToken) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("stdin read failed: {err}");
                    break;
                }
            };
            let input = line.trim();
            if input.eq_ignore_ascii_case("q") {
                break;
            }
            let Some(idx) = input
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=4).contains(n))
            else {
                warn!(input, "expected 1-4 or q");
                continue;
            };
            let name = store.snapshot().button_pins[idx - 1].clone();
            let pin = gpio.pin(&name);
            pin.press();
            thread::sleep(Duration::from_millis(100));
            pin.lift();
        }
        info!("simulated input closed; initiating shutdown");
        cancel.cancel();
    });
}
