//! # Live Monitor Loop
//!
//! Feeds JSON-lines sensor events into a [`MachineMonitor`].
//!
//! Each line is one event:
//!
//! ```json
//! {"channel":"enter","value":true,"timestamp":1700000000000}
//! ```
//!
//! Lines that fail to parse, including ones that are not valid UTF-8, are
//! dropped like any other malformed event. A read error counts as a lost
//! connection: the loop reopens the source up to `reconnect_attempts` times
//! in a row, skipping lines it already consumed, while the monitor keeps its
//! rate windows. End of input or a shutdown signal ends the loop normally.

use linetrack_core::{CycleStore, LineError, MachineMonitor, MonitorConfig, MonitorUpdate, SensorEvent};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;

/// Reader handed out by an [`EventStream`].
pub type EventReader = Box<dyn AsyncBufRead + Unpin + Send>;

// =============================================================================
// EVENT SOURCE
// =============================================================================

/// Something the monitor can open, and reopen after a lost connection.
pub trait EventStream: std::fmt::Display {
    /// Whether reopening starts over from the first line.
    fn replays_on_reopen(&self) -> bool;

    /// Open a fresh reader.
    fn open(&mut self) -> impl Future<Output = Result<EventReader, LineError>>;
}

/// Where sensor events come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    /// Standard input.
    Stdin,
    /// A JSON-lines file.
    File(PathBuf),
}

impl EventStream for EventSource {
    fn replays_on_reopen(&self) -> bool {
        matches!(self, Self::File(_))
    }

    async fn open(&mut self) -> Result<EventReader, LineError> {
        match self {
            Self::Stdin => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
            Self::File(path) => {
                let file = tokio::fs::File::open(&*path).await.map_err(|e| {
                    LineError::ConnectionError(format!("open {}: {}", path.display(), e))
                })?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdin => write!(f, "stdin"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Counters for one monitoring session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    /// Lines read from the source.
    pub lines: u64,
    /// Lines that were not valid JSON events.
    pub unparsable: u64,
    /// Updates produced by triggers.
    pub updates: u64,
    /// Cycles appended to the store.
    pub cycles_recorded: u64,
    /// Times the source was reopened after a failure.
    pub reconnects: u32,
}

enum PumpOutcome {
    EndOfInput,
    Shutdown,
    Disconnected(LineError),
}

// =============================================================================
// MONITOR LOOP
// =============================================================================

/// Run the monitor until the source ends, `shutdown` flips to `true`, or
/// reconnecting fails more than `reconnect_attempts` times in a row.
///
/// A reopen that yields at least one new line starts a fresh budget.
pub async fn run_monitor<E, S, F>(
    monitor: &mut MachineMonitor,
    store: &mut S,
    source: &mut E,
    config: &MonitorConfig,
    mut shutdown: watch::Receiver<bool>,
    mut on_update: F,
) -> Result<MonitorStats, LineError>
where
    E: EventStream,
    S: CycleStore,
    F: FnMut(&MonitorUpdate),
{
    let mut stats = MonitorStats::default();
    let mut failures = 0u32;

    tracing::info!(stage = %monitor.stage_id(), %source, "monitoring started");

    loop {
        let reader = match source.open().await {
            Ok(reader) => reader,
            Err(e) => {
                failures += 1;
                if failures > config.reconnect_attempts {
                    return Err(e);
                }
                tracing::warn!(attempt = failures, error = %e, "event source unavailable, retrying");
                tokio::time::sleep(Duration::from_millis(config.reconnect_delay_ms)).await;
                continue;
            }
        };

        let consumed_before = stats.lines;
        let skip = if source.replays_on_reopen() { stats.lines } else { 0 };
        match pump(reader, skip, monitor, store, &mut shutdown, &mut stats, &mut on_update).await? {
            PumpOutcome::EndOfInput => {
                tracing::info!(lines = stats.lines, "event source ended");
                break;
            }
            PumpOutcome::Shutdown => {
                tracing::info!(lines = stats.lines, "monitoring stopped");
                break;
            }
            PumpOutcome::Disconnected(e) => {
                if stats.lines > consumed_before {
                    failures = 0;
                }
                failures += 1;
                if failures > config.reconnect_attempts {
                    return Err(e);
                }
                stats.reconnects += 1;
                tokio::time::sleep(Duration::from_millis(config.reconnect_delay_ms)).await;
            }
        }
    }

    Ok(stats)
}

async fn pump<S, F>(
    mut reader: EventReader,
    mut skip: u64,
    monitor: &mut MachineMonitor,
    store: &mut S,
    shutdown: &mut watch::Receiver<bool>,
    stats: &mut MonitorStats,
    on_update: &mut F,
) -> Result<PumpOutcome, LineError>
where
    S: CycleStore,
    F: FnMut(&MonitorUpdate),
{
    // Bytes of the current line; survives a cancelled read.
    let mut line = Vec::new();

    loop {
        if *shutdown.borrow() {
            return Ok(PumpOutcome::Shutdown);
        }

        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut line) => read,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(PumpOutcome::Shutdown);
                }
                continue;
            }
        };

        match read {
            Ok(0) => return Ok(PumpOutcome::EndOfInput),
            Ok(_) => {}
            Err(e) => {
                let err = monitor.on_disconnect(&e.to_string());
                return Ok(PumpOutcome::Disconnected(err));
            }
        }

        // Lines consumed before a reconnect are not replayed.
        if skip > 0 {
            skip -= 1;
            line.clear();
            continue;
        }
        stats.lines += 1;

        if line.iter().all(u8::is_ascii_whitespace) {
            line.clear();
            continue;
        }
        let parsed: Result<SensorEvent, _> = serde_json::from_slice(&line);
        line.clear();
        let event = match parsed {
            Ok(event) => event,
            Err(e) => {
                stats.unparsable += 1;
                tracing::debug!(error = %e, "dropping unparsable event line");
                continue;
            }
        };

        if let Some(update) = monitor.on_event(&event, store)? {
            stats.updates += 1;
            if update.recorded.is_some() {
                stats.cycles_recorded += 1;
            }
            on_update(&update);
        }
    }
}

/// One-line text rendering of an update.
#[must_use]
pub fn format_update(update: &MonitorUpdate) -> String {
    let rate = |value: Option<f64>| value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}/s"));
    let percent = update
        .input_percent
        .map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}%"));
    let mut line = format!(
        "stage {} {:?} @{}: input {} ({}), output {}",
        update.stage_id,
        update.channel,
        update.timestamp,
        rate(update.input_rate),
        percent,
        rate(update.output_rate)
    );
    if let Some(id) = update.recorded {
        line.push_str(&format!(", cycle #{}", id.0));
    }
    line
}

/// Shutdown channel that flips when Ctrl-C is received.
pub fn ctrl_c_shutdown() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            let _ = tx.send(true);
        }
    });
    rx
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use linetrack_core::{RecordId, SensorChannel, StageId};

    #[test]
    fn update_line_mentions_rates_and_cycle() {
        let update = MonitorUpdate {
            stage_id: StageId(0),
            channel: SensorChannel::Exit,
            timestamp: 400,
            input_rate: Some(10.0),
            output_rate: None,
            input_percent: Some(50.0),
            recorded: Some(RecordId(7)),
        };
        let line = format_update(&update);
        assert_eq!(
            line,
            "stage 0 Exit @400: input 10.0000/s (50.0000%), output n/a, cycle #7"
        );
    }

    #[test]
    fn source_display() {
        assert_eq!(EventSource::Stdin.to_string(), "stdin");
        assert_eq!(EventSource::File(PathBuf::from("events.jsonl")).to_string(), "events.jsonl");
    }
}
