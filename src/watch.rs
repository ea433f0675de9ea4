//! Continuous mode: re-sweep whenever the source directory changes.
//!
//! Filesystem events only ever raise a flag. A single loop waits for the flag,
//! lets a short settle window pass, clears it and sweeps. Events arriving while
//! a sweep runs set the flag again, so a burst of any size turns into at most
//! one follow-up sweep, and two sweeps never run at the same time.

use notify::{Event, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct SignalState {
    pending: bool,
    closed: bool,
}

/// Single-slot "sweep again" flag shared between event sources and the sweep loop.
#[derive(Debug, Default)]
pub struct SweepSignal {
    state: Mutex<SignalState>,
    changed: Condvar,
}

impl SweepSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Requests a sweep. Requests made before the next sweep starts collapse into one.
    pub fn notify(&self) {
        let mut state = self.lock();
        state.pending = true;
        self.changed.notify_all();
    }

    /// Stops the loop once the sweep in progress (if any) has finished.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Blocks until a sweep is pending or the signal is closed.
    ///
    /// Returns `false` once closed.
    pub fn wait(&self) -> bool {
        let mut state = self.lock();
        loop {
            if state.closed {
                return false;
            }
            if state.pending {
                return true;
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Sleeps for `duration`, waking early if the signal is closed.
    fn settle(&self, duration: Duration) {
        let state = self.lock();
        let _ = self
            .changed
            .wait_timeout_while(state, duration, |state| !state.closed)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }

    /// Clears the pending flag, returning whether it was set.
    fn take(&self) -> bool {
        std::mem::take(&mut self.lock().pending)
    }
}

/// Runs `sweep` each time `signal` fires until it is closed. Returns the number of sweeps.
///
/// After waking, the loop waits `settle` before clearing the flag so that the
/// rest of an event burst lands in the same sweep.
pub fn run_coalescing<F>(signal: &SweepSignal, settle: Duration, mut sweep: F) -> usize
where
    F: FnMut(),
{
    let mut sweeps = 0;
    while signal.wait() {
        if !settle.is_zero() {
            signal.settle(settle);
        }
        if signal.is_closed() {
            break;
        }
        if signal.take() {
            sweep();
            sweeps += 1;
        }
    }
    sweeps
}

/// Where change notifications come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchBackend {
    /// The platform's native notification API.
    Native,
    /// Periodic directory scans, for filesystems without native events.
    Poll(Duration),
}

/// Errors that prevent watch mode from starting.
#[derive(Debug)]
pub enum WatchError {
    /// The watcher could not be created.
    InitFailed(notify::Error),
    /// The source directory could not be watched.
    WatchFailed { path: PathBuf, source: notify::Error },
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InitFailed(e) => write!(f, "Failed to create file system watcher: {}", e),
            Self::WatchFailed { path, source } => {
                write!(f, "Failed to watch {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InitFailed(e) => Some(e),
            Self::WatchFailed { source, .. } => Some(source),
        }
    }
}

enum ActiveWatcher {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

/// Turns filesystem events in the source directory into sweep requests.
pub struct ChangeTrigger {
    _watcher: ActiveWatcher,
    signal: Arc<SweepSignal>,
}

impl ChangeTrigger {
    /// Starts watching the top level of `source_dir`.
    ///
    /// Every event counts as "something changed"; event kinds and paths are
    /// not inspected because the sweep does its own filtering.
    pub fn start(source_dir: &Path, backend: WatchBackend) -> Result<Self, WatchError> {
        let signal = Arc::new(SweepSignal::new());
        let handler_signal = Arc::clone(&signal);
        let handler = move |result: notify::Result<Event>| match result {
            Ok(event) => {
                tracing::trace!(kind = ?event.kind, paths = ?event.paths, "change event");
                handler_signal.notify();
            }
            Err(err) => tracing::error!("File watcher error: {}", err),
        };

        let watch_err = |source| WatchError::WatchFailed {
            path: source_dir.to_path_buf(),
            source,
        };

        let watcher = match backend {
            WatchBackend::Native => {
                let mut watcher = notify::recommended_watcher(handler).map_err(WatchError::InitFailed)?;
                watcher
                    .watch(source_dir, RecursiveMode::NonRecursive)
                    .map_err(watch_err)?;
                ActiveWatcher::Native(watcher)
            }
            WatchBackend::Poll(interval) => {
                let config = notify::Config::default().with_poll_interval(interval);
                let mut watcher = PollWatcher::new(handler, config).map_err(WatchError::InitFailed)?;
                watcher
                    .watch(source_dir, RecursiveMode::NonRecursive)
                    .map_err(watch_err)?;
                ActiveWatcher::Poll(watcher)
            }
        };

        tracing::info!(source = %source_dir.display(), ?backend, "watching for changes");
        Ok(Self {
            _watcher: watcher,
            signal,
        })
    }

    /// Handle for requesting sweeps or shutting the loop down from elsewhere.
    pub fn signal(&self) -> Arc<SweepSignal> {
        Arc::clone(&self.signal)
    }

    /// Sweeps once right away, then again after every change, until the signal is closed.
    pub fn run<F>(&self, settle: Duration, sweep: F) -> usize
    where
        F: FnMut(),
    {
        self.signal.notify();
        run_coalescing(&self.signal, settle, sweep)
    }
}
