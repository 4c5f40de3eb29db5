//! The line pipeline: a receiver unit feeding a FIFO queue drained by a
//! single router/decoder unit.
//!
//! The queue carries raw text lines only. The router is the queue's one
//! consumer: it parses every line, and decodes the ones carrying a battery
//! identifier in-process, so each line is handled exactly once and arrival
//! order is preserved end to end.
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use battgw_can::{GatewayFrame, Telemetry, telemetry};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// How long a queue pop may block before re-checking the stop flag
const QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Advisory stop signal; observed between blocking waits, never preemptive
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Single-assignment barrier marking the first battery frame on the wire.
///
/// Opens once, stays open, and releases every waiter.
#[derive(Clone, Debug, Default)]
pub struct DecodeLatch(Arc<(Mutex<bool>, Condvar)>);

impl DecodeLatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the latch. Idempotent; returns whether this call opened it.
    pub fn open(&self) -> bool {
        let (lock, condvar) = &*self.0;
        let mut open = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let transitioned = !*open;
        *open = true;
        condvar.notify_all();
        transitioned
    }

    /// Block until the latch opens
    pub fn wait(&self) {
        let (lock, condvar) = &*self.0;
        let mut open = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open {
            open = condvar.wait(open).unwrap_or_else(PoisonError::into_inner);
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        let (lock, _) = &*self.0;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A successfully decoded battery frame
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryEvent {
    pub frame: GatewayFrame,
    pub telemetry: Telemetry,
}

/// Spawn the receiver unit: read lines from the gateway stream and push them
/// onto the queue.
///
/// Runs until the stream ends, the stop flag is raised, or the queue closes.
/// Callers should put a read timeout on the underlying socket; a timed-out
/// read loops back to re-check the stop flag.
pub fn spawn_receiver<R>(reader: R, lines: Sender<String>, stop: StopFlag) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    std::thread::spawn(move || receive_lines(reader, &lines, &stop))
}

fn receive_lines<R: BufRead>(mut reader: R, lines: &Sender<String>, stop: &StopFlag) {
    let mut buf = String::new();
    while !stop.is_raised() {
        match reader.read_line(&mut buf) {
            Ok(0) => {
                tracing::info!("Gateway closed the connection");
                break;
            }
            Ok(_) => {
                let line = buf.trim();
                if !line.is_empty() {
                    tracing::debug!("Received raw line: {line}");
                    if lines.send(line.to_string()).is_err() {
                        // Nobody is draining the queue anymore
                        break;
                    }
                }
                buf.clear();
            }
            // A timed-out read leaves any partial line in buf for the next pass
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                tracing::error!("Error receiving from the gateway: {e}");
                break;
            }
        }
    }
}

/// Spawn the router unit: the queue's single consumer.
///
/// Each line is parsed, and frames carrying a battery identifier open the
/// latch and are decoded in-process, with successful records emitted on
/// `events`. Malformed lines, foreign identifiers, and undecodable payloads
/// are logged and dropped. A raised stop flag takes effect only once the
/// queue has been drained.
pub fn spawn_router(
    lines: Receiver<String>,
    events: Sender<TelemetryEvent>,
    stop: StopFlag,
    latch: DecodeLatch,
) -> JoinHandle<()> {
    std::thread::spawn(move || route_lines(&lines, &events, &stop, &latch))
}

fn route_lines(
    lines: &Receiver<String>,
    events: &Sender<TelemetryEvent>,
    stop: &StopFlag,
    latch: &DecodeLatch,
) {
    loop {
        let line = match lines.recv_timeout(QUEUE_POLL_INTERVAL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                if stop.is_raised() {
                    break;
                }
                continue;
            }
            // Disconnected only fires once the queue is also empty
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let frame = match GatewayFrame::parse(&line) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to parse line: {e}");
                continue;
            }
        };
        tracing::debug!("Parsed frame: {frame:?}");

        if !telemetry::is_battery_id(frame.canid) {
            tracing::debug!("Ignoring frame from {:#010X}", frame.canid);
            continue;
        }
        if latch.open() {
            tracing::info!("First battery frame seen, telemetry decoding started");
        }

        match telemetry::decode(frame.canid, &frame.data) {
            Ok(Telemetry::Unhandled { canid }) => {
                tracing::debug!("No decode rule for {canid:#010X}");
            }
            Ok(telemetry) => {
                tracing::info!("Decoded telemetry: {telemetry:?}");
                if events.send(TelemetryEvent { frame, telemetry }).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!("Failed to decode frame: {e}"),
        }
    }
}
