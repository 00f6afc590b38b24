mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{bound, snapshot, wait_until};
use panel_hal::Level;
use panel_hal::sim::{SimDisplay, SimSensor, SimStats};
use status_panel::config::ConfigStore;
use status_panel::render::Renderer;
use status_panel::tasks::buttons::{InputController, WatcherTiming};
use status_panel::tasks::scheduler::{Scheduler, SchedulerTiming};
use status_panel::tasks::shutdown::{FarewellTiming, ShutdownCoordinator};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn termination_mid_tick_plays_farewell_then_releases_pins() {
    let mut config = snapshot("ON_LOOP=true\nDEFAULT_PAGE=4\n");
    config.tick_interval = Duration::from_secs(10);
    let (gpio, bindings, navigator) = bound(&config);
    assert_eq!(gpio.pin("GPIO26").level(), Level::High);

    let shutdown = CancellationToken::new();
    let mut inputs = InputController::new(
        bindings.clone(),
        navigator.clone(),
        WatcherTiming::default(),
        shutdown.clone(),
    );
    inputs.start(&bindings.current().unwrap());
    let inputs = Arc::new(Mutex::new(inputs));

    let display = SimDisplay::new(16);
    let scheduler = Scheduler::new(
        Box::new(display.clone()),
        Renderer::new(
            Arc::new(SimSensor::reading(40.0, 21.0)),
            Arc::new(SimStats::default()),
        ),
        navigator.clone(),
        Arc::new(ConfigStore::new(config.clone())),
        SchedulerTiming::default(),
        shutdown.clone(),
    );
    let task = tokio::task::spawn_blocking(move || scheduler.run());

    assert!(wait_until(Duration::from_secs(2), || display.drawn() == 1));
    shutdown.cancel();
    let panel = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("scheduler noticed cancellation")
        .unwrap()
        .unwrap();
    assert_eq!(display.drawn(), 1, "page frame interrupted or redrawn");
    assert_eq!(navigator.current_page(), 4);

    let timing = FarewellTiming {
        hold: Duration::from_millis(40),
        wave: Duration::from_millis(20),
    };
    let start = Instant::now();
    ShutdownCoordinator::new(inputs.clone(), timing)
        .run(panel)
        .await
        .unwrap();
    assert!(start.elapsed() >= Duration::from_millis(100));

    // page, "Bye", three waves, blank
    assert_eq!(display.drawn(), 6);
    let frames = display.frames();
    assert!(frames[1].lit_pixels() < frames[4].lit_pixels());
    assert!(display.last().unwrap().is_blank());

    let led = gpio.pin("GPIO26");
    assert_eq!(led.level(), Level::Low);
    for name in ["GPIO17", "GPIO27", "GPIO22", "GPIO23", "GPIO26"] {
        assert!(gpio.pin(name).is_released(), "{name} still held");
    }
    assert!(!inputs.lock().await.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn farewell_completes_even_when_the_panel_fails() {
    let config = snapshot("");
    let (gpio, bindings, navigator) = bound(&config);
    let shutdown = CancellationToken::new();
    let inputs = Arc::new(Mutex::new(InputController::new(
        bindings,
        navigator,
        WatcherTiming::default(),
        shutdown.clone(),
    )));

    let display = SimDisplay::new(4);
    display.set_failing(true);
    let timing = FarewellTiming {
        hold: Duration::from_millis(5),
        wave: Duration::from_millis(5),
    };
    ShutdownCoordinator::new(inputs, timing)
        .run(Box::new(display.clone()))
        .await
        .unwrap();

    assert_eq!(display.drawn(), 0);
    assert!(gpio.pin("GPIO26").is_released());
}
