//! Hot reload of the settings file.
//!
//! notify delivers change events on its own thread; they are bridged into a
//! tokio channel and filtered down to writes of the settings file. Bursts
//! within the dedup window collapse into one reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ConfigSnapshot, ConfigStore};
use crate::error::Result;
use crate::navigator::Navigator;
use crate::tasks::buttons::InputController;

#[derive(Debug, Clone, Copy)]
pub struct ReloadTiming {
    /// Writes closer together than this trigger one reload.
    pub dedup: Duration,
    /// Wait before reading the file so the writer can finish.
    pub settle: Duration,
}

impl Default for ReloadTiming {
    fn default() -> Self {
        Self {
            dedup: Duration::from_millis(1000),
            settle: Duration::from_millis(500),
        }
    }
}

/// Admits a write notification unless one was admitted within `window`.
#[derive(Debug)]
pub struct ReloadGate {
    window: Duration,
    last: Option<Instant>,
}

impl ReloadGate {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// New snapshot installed and pins rebound.
    Applied,
    /// The file could not be read or parsed; nothing changed.
    Kept,
}

/// A notify result stamped with the moment notify delivered it.
pub type WatchEvent = (Instant, notify::Result<Event>);

/// Everything a reload touches.
#[derive(Clone)]
pub struct ReloadTargets {
    pub store: Arc<ConfigStore>,
    pub navigator: Arc<Navigator>,
    pub inputs: Arc<Mutex<InputController>>,
}

/// Re-reads `path` and applies it: swap the snapshot, refresh the runtime
/// fields derived from it, then stop, rebind and restart the button
/// watchers. Returns an error only when the rebind fails.
pub async fn reload(path: &Path, targets: &ReloadTargets) -> Result<ReloadOutcome> {
    let next = match ConfigSnapshot::load(path) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "reload failed; keeping previous settings");
            return Ok(ReloadOutcome::Kept);
        }
    };

    let mut inputs = targets.inputs.lock().await;
    let previous = targets.store.replace(next.clone());
    if *previous == next {
        debug!("settings unchanged; rebinding anyway");
    }
    targets.navigator.apply_config(&next);
    inputs.rebind(&next).await?;
    info!(path = %path.display(), config = ?next, "settings reloaded");
    Ok(ReloadOutcome::Applied)
}

#[instrument(skip(path, targets, cancel), fields(path = %path.display()))]
pub async fn run(
    path: PathBuf,
    targets: ReloadTargets,
    timing: ReloadTiming,
    cancel: CancellationToken,
) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    // Bridge notify callback -> async channel
    let (watch_tx, watch_rx) = mpsc::channel::<WatchEvent>(64);
    let mut watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send((Instant::now(), res));
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!(dir = %dir.display(), "watching settings file");

    let result = follow(&path, watch_rx, &targets, timing, &cancel).await;
    drop(watcher);
    result
}

/// Consumes stamped notifications and reloads on writes to `path`. The dedup
/// window is measured on delivery stamps, so events that queued up behind a
/// slow reload still count against the write that triggered it.
pub async fn follow(
    path: &Path,
    mut events: mpsc::Receiver<WatchEvent>,
    targets: &ReloadTargets,
    timing: ReloadTiming,
    cancel: &CancellationToken,
) -> Result<()> {
    let Some(file_name) = path.file_name().map(OsString::from) else {
        warn!("settings path has no file name; hot reload disabled");
        cancel.cancelled().await;
        return Ok(());
    };

    let mut gate = ReloadGate::new(timing.dedup);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting config watcher");
                break;
            }

            received = events.recv() => match received {
                Some((delivered, Ok(event))) => {
                    if !is_write(&event.kind) || !touches(&event, &file_name) {
                        continue;
                    }
                    if !gate.admit(delivered) {
                        debug!(kind = ?event.kind, "duplicate write notification dropped");
                        continue;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(timing.settle) => {}
                    }
                    reload(path, targets).await?;
                }
                Some((_, Err(err))) => error!("watch error: {err}"),
                None => {
                    warn!("notification channel closed; hot reload stopped");
                    cancel.cancelled().await;
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Content changes, creation and renames onto the file. Metadata-only
/// changes (chmod, touch) do not count.
fn is_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(
                ModifyKind::Any
                    | ModifyKind::Data(_)
                    | ModifyKind::Name(RenameMode::To | RenameMode::Both)
            )
    )
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    #[test]
    fn writes_within_window_collapse() {
        let mut gate = ReloadGate::new(Duration::from_millis(1000));
        let t0 = Instant::now();
        assert!(gate.admit(t0));
        assert!(!gate.admit(t0 + Duration::from_millis(10)));
        assert!(!gate.admit(t0 + Duration::from_millis(999)));
        assert!(gate.admit(t0 + Duration::from_millis(1000)));
    }

    #[test]
    fn only_writes_to_the_settings_file_count() {
        let name = OsString::from(".env");
        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/etc/panel/.env"));
        assert!(is_write(&write.kind) && touches(&write, &name));

        let other = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/panel/.env.swp"));
        assert!(!touches(&other, &name));

        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/etc/panel/.env"));
        assert!(!is_write(&removed.kind));
    }

    #[test]
    fn metadata_changes_are_not_writes() {
        for kind in [
            MetadataKind::Permissions,
            MetadataKind::AccessTime,
            MetadataKind::WriteTime,
            MetadataKind::Any,
        ] {
            assert!(!is_write(&EventKind::Modify(ModifyKind::Metadata(kind))), "{kind:?}");
        }
        assert!(is_write(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_write(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(!is_write(&EventKind::Modify(ModifyKind::Name(RenameMode::From))));
    }
}
