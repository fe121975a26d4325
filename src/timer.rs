//! Periodic worker threads with owned, cancel-on-drop handles.
//!
//! Every periodic activity (registry sync, live inference) runs on its own
//! worker thread. The first tick runs immediately; later ticks run at a fixed
//! rate without catch-up bursts. A tick always runs to completion; the handle
//! only prevents the next one.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Shared cancellation flag, visible to the running tick.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct PeriodicTask {
    name: String,
    period: Duration,
    live: Option<Arc<AtomicUsize>>,
}

impl PeriodicTask {
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            live: None,
        }
    }

    /// Count this worker in `counter` from spawn until its thread has
    /// dropped the tick closure.
    pub fn track_live(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.live = Some(counter);
        self
    }

    pub fn spawn<F>(self, mut tick: F) -> Result<PeriodicHandle>
    where
        F: FnMut(&CancelToken) + Send + 'static,
    {
        if self.period.is_zero() {
            return Err(anyhow!("{}: period must be greater than zero", self.name));
        }
        let token = CancelToken::new();
        let (wake_tx, wake_rx) = mpsc::channel::<()>();
        if let Some(live) = &self.live {
            live.fetch_add(1, Ordering::SeqCst);
        }

        let thread_token = token.clone();
        let period = self.period;
        let live = self.live.clone();
        let spawned = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let mut next = Instant::now();
                loop {
                    if thread_token.is_cancelled() {
                        break;
                    }
                    tick(&thread_token);

                    next += period;
                    let now = Instant::now();
                    if next < now {
                        next = now;
                    }
                    match wake_rx.recv_timeout(next - now) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                drop(tick);
                if let Some(live) = live {
                    live.fetch_sub(1, Ordering::SeqCst);
                }
            });

        let join = match spawned {
            Ok(join) => join,
            Err(e) => {
                if let Some(live) = &self.live {
                    live.fetch_sub(1, Ordering::SeqCst);
                }
                return Err(anyhow!("failed to spawn {} worker: {}", self.name, e));
            }
        };
        log::debug!("{} worker started (period {:?})", self.name, self.period);

        Ok(PeriodicHandle {
            name: self.name,
            token,
            wake: Some(wake_tx),
            join: Some(join),
        })
    }
}

/// Owned handle to a periodic worker. Dropping it stops the worker.
#[derive(Debug)]
pub struct PeriodicHandle {
    name: String,
    token: CancelToken,
    wake: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl PeriodicHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prevent further ticks without waiting for the worker to exit.
    pub fn cancel(&mut self) {
        self.token.cancel();
        self.wake.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Cancel and wait for the worker thread to exit.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.cancel();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("{} worker thread panicked", self.name))?;
            log::debug!("{} worker stopped", self.name);
        }
        Ok(())
    }
}

impl Drop for PeriodicHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("{}", e);
        }
    }
}
