//! The poll loop.
//!
//! [`Monitor`] drives one cycle at a time: scan, feed the snapshot to the
//! debounce engine, record the resulting events, sleep. It owns the scan
//! source for its whole lifetime and releases it on every exit path.
//!
//! Scan failures are fail-stop: [`Monitor::step`] reports them as
//! [`StepOutcome::ScanFailed`] and [`Monitor::run`] ends the loop. The
//! process is expected to be restarted by its supervisor.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::bluetooth::{BluetoothError, ScanSource};
use crate::debounce::DebounceEngine;
use crate::error::Result;
use crate::sink::EventSink;
use crate::types::PresenceStatus;

/// Default delay between scan cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Delay after each completed cycle.
    pub poll_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Result of a single cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The scan succeeded and its events were recorded.
    Completed {
        /// FOUND events emitted.
        found: usize,
        /// LOST events emitted.
        lost: usize,
    },
    /// The scan failed; the loop must stop.
    ScanFailed(BluetoothError),
}

/// Why [`Monitor::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The shutdown signal fired.
    Shutdown,
    /// A scan failed.
    ScanFailed(BluetoothError),
}

impl ExitReason {
    /// Returns `true` if the loop ended because of an error.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::ScanFailed(_))
    }
}

/// Drives scan cycles and owns the scan source.
pub struct Monitor<S, E> {
    source: S,
    sink: E,
    engine: DebounceEngine,
    settings: MonitorSettings,
    cycles: u64,
}

impl<S, E> Monitor<S, E>
where
    S: ScanSource,
    E: EventSink,
{
    /// Create a monitor. The source is started by [`Monitor::run`].
    pub const fn new(source: S, sink: E, engine: DebounceEngine, settings: MonitorSettings) -> Self {
        Self {
            source,
            sink,
            engine,
            settings,
            cycles: 0,
        }
    }

    /// The scan source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// The event sink.
    pub const fn sink(&self) -> &E {
        &self.sink
    }

    /// The debounce engine and its registry.
    pub const fn engine(&self) -> &DebounceEngine {
        &self.engine
    }

    /// Number of completed cycles.
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Start the source, poll until `shutdown` resolves or a scan fails,
    /// then stop the source.
    ///
    /// Shutdown is honoured while scanning and while sleeping. A scan that
    /// is interrupted leaves the registry untouched.
    ///
    /// # Errors
    ///
    /// Returns an error only if the source cannot be started. Scan failures
    /// are reported as [`ExitReason::ScanFailed`].
    pub async fn run<F>(&mut self, shutdown: F) -> Result<ExitReason>
    where
        F: Future<Output = ()>,
    {
        self.source.start().await?;
        info!(
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            not_detected_limit = self.engine.policy().not_detected_limit.get(),
            "Presence monitor started"
        );

        let reason = self.poll(shutdown).await;

        if let Err(err) = self.source.stop().await {
            warn!(error = %err, "Failed to release scan source");
        }
        info!(cycles = self.cycles, ?reason, "Presence monitor stopped");

        Ok(reason)
    }

    async fn poll<F>(&mut self, shutdown: F) -> ExitReason
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let outcome = tokio::select! {
                biased;
                () = &mut shutdown => return ExitReason::Shutdown,
                outcome = self.step() => outcome,
            };

            if let StepOutcome::ScanFailed(err) = outcome {
                error!("An error occurred: {err}");
                return ExitReason::ScanFailed(err);
            }

            tokio::select! {
                biased;
                () = &mut shutdown => return ExitReason::Shutdown,
                () = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    /// Run one cycle: scan, debounce, record.
    ///
    /// The only suspension point is the scan itself.
    pub async fn step(&mut self) -> StepOutcome {
        let snapshot = match self.source.scan().await {
            Ok(snapshot) => snapshot,
            Err(err) => return StepOutcome::ScanFailed(err),
        };

        self.cycles += 1;
        let events = self.engine.cycle(&snapshot, Utc::now());

        let (mut found, mut lost) = (0, 0);
        for event in &events {
            if let Err(err) = self.sink.record(event) {
                error!(address = %event.address, error = %err, "Failed to record presence event");
            }
            match event.status {
                PresenceStatus::Found => found += 1,
                PresenceStatus::Lost => lost += 1,
            }
            info!("{} {}", event.status, event.address);
        }

        debug!(
            cycle = self.cycles,
            observed = snapshot.len(),
            tracked = self.engine.registry().len(),
            found,
            lost,
            "Scan cycle complete"
        );

        StepOutcome::Completed { found, lost }
    }
}
