//! Completion poller
//!
//! A cooperative, fixed-interval loop that lives outside the workers. Each
//! tick drains queued progress into the sink and checks whether every worker
//! has finished; the tick that observes completion collects the terminal
//! values and drains one last time so nothing emitted just before teardown is
//! lost. The sink therefore never waits on remote work.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::fanout::scheduler::{RunHandle, TerminalValue};
use crate::fanout::sink::ProgressSink;

/// Completion poller options
#[derive(Debug, Clone)]
pub struct Options {
    /// Tick interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(150),
        }
    }
}

/// Run one tick: forward queued events, and return the terminal values if the
/// run has completed. A run whose values were already handed out completes
/// with none.
pub fn tick<T, K>(handle: &mut RunHandle<T>, sink: &mut K) -> Option<Vec<T>>
where
    T: TerminalValue,
    K: ProgressSink + ?Sized,
{
    for event in handle.try_drain() {
        sink.on_event(event);
    }

    if !handle.is_complete() {
        return None;
    }

    let results = handle.collect().unwrap_or_default();
    for event in handle.try_drain() {
        sink.on_event(event);
    }
    Some(results)
}

/// Tick until the run completes
pub async fn run_until_complete<T, K, S, F>(
    options: &Options,
    handle: &mut RunHandle<T>,
    sink: &mut K,
    sleep_fn: S,
) -> Vec<T>
where
    T: TerminalValue,
    K: ProgressSink + ?Sized,
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let mut ticks: u64 = 0;
    loop {
        sleep_fn(options.interval).await;
        ticks += 1;

        if let Some(results) = tick(handle, sink) {
            debug!("Run completed after {} ticks", ticks);
            return results;
        }
    }
}
