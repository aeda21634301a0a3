//! Named background loops that run a tick, then wait their interval.

use std::fmt;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::logging::Logger;
use crate::shutdown::StopToken;

#[derive(Debug)]
pub enum SchedulerError {
    Spawn { name: &'static str, source: io::Error },
    JoinFailed { name: &'static str },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { name, source } => write!(f, "failed to spawn '{name}' loop: {source}"),
            Self::JoinFailed { name } => write!(f, "'{name}' loop thread join failed"),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// A loop thread bound to a shared [`StopToken`]. The interval closure is
/// re-evaluated after every tick so live settings take effect immediately.
pub struct PollingLoop {
    name: &'static str,
    worker: Option<JoinHandle<()>>,
}

impl PollingLoop {
    pub fn spawn<I, F>(
        name: &'static str,
        startup_delay: Duration,
        interval: I,
        stop: StopToken,
        logger: Arc<Logger>,
        mut tick: F,
    ) -> Result<Self, SchedulerError>
    where
        I: Fn() -> Duration + Send + 'static,
        F: FnMut() + Send + 'static,
    {
        let worker = thread::Builder::new()
            .name(format!("farmhand-{name}"))
            .spawn(move || {
                if stop.sleep(startup_delay) {
                    return;
                }
                logger.debug(Some(name), "loop started");
                loop {
                    if catch_unwind(AssertUnwindSafe(&mut tick)).is_err() {
                        logger.error(Some(name), "loop tick panicked; continuing");
                    }
                    if stop.sleep(interval()) {
                        break;
                    }
                }
                logger.debug(Some(name), "loop stopped");
            })
            .map_err(|source| SchedulerError::Spawn { name, source })?;

        Ok(Self {
            name,
            worker: Some(worker),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Waits for the thread to exit. Only returns once the shared token has
    /// been stopped.
    pub fn join(mut self) -> Result<(), SchedulerError> {
        match self.worker.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SchedulerError::JoinFailed { name: self.name }),
            None => Ok(()),
        }
    }
}
