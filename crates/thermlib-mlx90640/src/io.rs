//! IO task types and implementation for the MLX90640 driver.
//!
//! One tokio task per open session owns the transport exclusively. It drives
//! the connection state machine (open with retry, send pending commands,
//! receive and decode frames, shut down) and is the only code that touches
//! the transport.
//!
//! The device handle and the IO task share a [`Shared`] block: the session
//! fields sit behind a single mutex (never held across an `.await`), a
//! `wake` notification pulls the task out of its poll wait when the handle
//! changes state, and a `state_changed` notification lets the handle wait
//! for the task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Notify, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use thermlib_core::error::Error;
use thermlib_core::events::{DeviceEvent, DropReason};
use thermlib_core::transport::{Connector, Transport};
use thermlib_core::types::{ConnectionState, SensorGeometry, ThermalFrame};

use crate::colorize::{self, ColorScalar};
use crate::commands::CommandFrame;
use crate::packet;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Timing and layout configuration of the IO task.
#[derive(Debug, Clone)]
pub(crate) struct IoConfig {
    pub geometry: SensorGeometry,
    /// Receive timeout while idle in `Ready`, and retry delay while `Opening`.
    pub poll_interval: Duration,
    /// Timeout that ends a burst of fragmented reads.
    pub coalesce_timeout: Duration,
}

/// Session fields guarded by [`Shared::session`].
#[derive(Debug)]
pub(crate) struct Session {
    pub state: ConnectionState,
    pub port: String,
    pub baud_rate: u32,
    pub pending: Option<CommandFrame>,
    pub color_scalar: ColorScalar,
}

/// Snapshot of the driver's diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Frames decoded and colorized.
    pub frames_decoded: u64,
    /// Buffers discarded for bad length or header.
    pub frames_malformed: u64,
    /// Decoded frames discarded because the consumer was behind.
    pub frames_overrun: u64,
    /// Failed transport open attempts.
    pub open_failures: u64,
    /// Failed command writes.
    pub write_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    frames_decoded: AtomicU64,
    frames_malformed: AtomicU64,
    frames_overrun: AtomicU64,
    open_failures: AtomicU64,
    write_failures: AtomicU64,
}

impl StatsCounters {
    pub fn snapshot(&self) -> DeviceStats {
        DeviceStats {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            frames_overrun: self.frames_overrun.load(Ordering::Relaxed),
            open_failures: self.open_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// State shared between the device handle and its IO task.
#[derive(Debug)]
pub(crate) struct Shared {
    session: Mutex<Session>,
    /// Wakes the IO task after the handle changed the session.
    pub wake: Notify,
    /// Signalled by every state transition.
    pub state_changed: Notify,
    pub stats: StatsCounters,
    pub event_tx: broadcast::Sender<DeviceEvent>,
}

impl Shared {
    pub fn new(color_scalar: ColorScalar, event_tx: broadcast::Sender<DeviceEvent>) -> Self {
        Shared {
            session: Mutex::new(Session {
                state: ConnectionState::Idle,
                port: String::new(),
                baud_rate: 0,
                pending: None,
                color_scalar,
            }),
            wake: Notify::new(),
            state_changed: Notify::new(),
            stats: StatsCounters::default(),
            event_tx,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Session> {
        // Session fields are plain values; a panic mid-update cannot leave
        // them inconsistent, so recover from poisoning.
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Move `session` to `to`, notify waiters and emit `StateChanged`.
    pub fn transition(&self, session: &mut Session, to: ConnectionState) {
        let from = session.state;
        if from == to {
            return;
        }
        debug_assert!(
            from.can_transition_to(to),
            "illegal state transition {from} -> {to}"
        );
        debug!(%from, %to, "state transition");
        session.state = to;
        self.state_changed.notify_waiters();
        self.emit(DeviceEvent::StateChanged { from, to });
    }

    pub fn emit(&self, event: DeviceEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

/// Handle to a running IO task, held by the device.
pub(crate) struct IoTask {
    pub cancel: CancellationToken,
    pub handle: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Frame pipeline
// ---------------------------------------------------------------------------

/// Reusable decode/colorize buffers for one session.
///
/// The temperature grid and pixel buffer are overwritten in place for every
/// packet; each published [`ThermalFrame`] gets its own copy.
pub(crate) struct FramePipeline {
    geometry: SensorGeometry,
    grid: Vec<f32>,
    pixels: Vec<u8>,
    sequence: u64,
}

impl FramePipeline {
    pub fn new(geometry: SensorGeometry) -> Self {
        FramePipeline {
            geometry,
            grid: vec![0.0; geometry.pixel_count()],
            pixels: vec![0; geometry.rgb_len()],
            sequence: 0,
        }
    }

    /// Turn one received buffer into a frame, or say why it was dropped.
    pub fn process(
        &mut self,
        buf: &[u8],
        scalar: &ColorScalar,
    ) -> std::result::Result<ThermalFrame, DropReason> {
        packet::validate(buf, self.geometry)?;
        let fields = packet::decode_into(buf, &mut self.grid).map_err(|_| DropReason::BadLength)?;
        packet::correct_ambient(&mut self.grid, fields.ambient);
        let extrema = colorize::colorize(&self.grid, self.geometry.cols, scalar, &mut self.pixels);

        self.sequence += 1;
        Ok(ThermalFrame {
            sequence: self.sequence,
            geometry: self.geometry,
            pixels: Bytes::copy_from_slice(&self.pixels),
            temperatures: self.grid.clone(),
            ambient: fields.ambient,
            hottest: extrema.hottest,
            coldest: extrema.coldest,
        })
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task for a session whose state is already `Opening`.
pub(crate) fn spawn_io_task(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    frame_tx: mpsc::Sender<ThermalFrame>,
    config: IoConfig,
) -> IoTask {
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(io_loop(shared, connector, frame_tx, config, cancel.clone()));
    IoTask { cancel, handle }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

/// Upper bound on one coalesced read, in packets.
const MAX_BUFFERED_PACKETS: usize = 4;

/// What the loop does next, decided under the session lock.
enum Step {
    Terminate,
    Open { port: String, baud_rate: u32 },
    Send(Option<CommandFrame>),
    Receive,
}

async fn io_loop(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    frame_tx: mpsc::Sender<ThermalFrame>,
    config: IoConfig,
    cancel: CancellationToken,
) {
    let mut transport: Option<Box<dyn Transport>> = None;
    let mut pipeline = FramePipeline::new(config.geometry);
    let max_buf = packet::packet_len(config.geometry) * MAX_BUFFERED_PACKETS;
    let mut chunk = vec![0u8; packet::packet_len(config.geometry).max(256)];
    let mut rx_buf: Vec<u8> = Vec::with_capacity(max_buf);
    let mut open_attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            debug!("IO task cancelled");
            break;
        }

        let step = {
            let mut session = shared.lock();
            match session.state {
                ConnectionState::Opening => Step::Open {
                    port: session.port.clone(),
                    baud_rate: session.baud_rate,
                },
                ConnectionState::Sending => Step::Send(session.pending.take()),
                ConnectionState::Ready => Step::Receive,
                ConnectionState::Terminating
                | ConnectionState::Idle
                | ConnectionState::Closed => Step::Terminate,
            }
        };

        match step {
            Step::Terminate => break,

            Step::Open { port, baud_rate } => {
                if port.is_empty() {
                    idle_wait(&shared, &cancel, config.poll_interval).await;
                    continue;
                }
                if let Some(mut stale) = transport.take() {
                    let _ = stale.close().await;
                }
                match connector.connect(&port, baud_rate).await {
                    Ok(opened) => {
                        transport = Some(opened);
                        open_attempts = 0;
                        let mut session = shared.lock();
                        // A close may have raced the connect; the next pass
                        // then closes the fresh transport.
                        if session.state == ConnectionState::Opening {
                            shared.transition(&mut session, ConnectionState::Ready);
                            drop(session);
                            shared.emit(DeviceEvent::Connected { port });
                        }
                    }
                    Err(e) => {
                        open_attempts = open_attempts.saturating_add(1);
                        StatsCounters::bump(&shared.stats.open_failures);
                        debug!(port = %port, baud_rate, attempt = open_attempts, error = %e, "open failed, retrying");
                        shared.emit(DeviceEvent::OpenRetry {
                            attempt: open_attempts,
                        });
                        idle_wait(&shared, &cancel, config.poll_interval).await;
                    }
                }
            }

            Step::Send(command) => {
                if let (Some(command), Some(t)) = (command, transport.as_mut()) {
                    match t.send(&command).await {
                        Ok(()) => {
                            tracing::trace!(command = ?command, "command sent");
                            shared.emit(DeviceEvent::CommandSent { command });
                        }
                        Err(e) => {
                            StatsCounters::bump(&shared.stats.write_failures);
                            tracing::warn!(command = ?command, error = %e, "command write failed");
                        }
                    }
                }
                let mut session = shared.lock();
                if session.state == ConnectionState::Sending {
                    shared.transition(&mut session, ConnectionState::Ready);
                }
            }

            Step::Receive => {
                let Some(t) = transport.as_mut() else {
                    idle_wait(&shared, &cancel, config.poll_interval).await;
                    continue;
                };

                let first = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = shared.wake.notified() => continue,
                    result = t.receive(&mut chunk, config.poll_interval) => result,
                };

                match first {
                    Ok(n) => {
                        rx_buf.clear();
                        rx_buf.extend_from_slice(&chunk[..n]);
                        coalesce(&mut **t, &mut chunk, &mut rx_buf, max_buf, config.coalesce_timeout)
                            .await;
                        publish(&shared, &mut pipeline, &frame_tx, &rx_buf);
                    }
                    Err(Error::Timeout) => {}
                    Err(e) => {
                        debug!(error = %e, "receive failed");
                        idle_wait(&shared, &cancel, config.poll_interval).await;
                    }
                }
            }
        }
    }

    if let Some(mut t) = transport.take() {
        let _ = t.close().await;
    }
    let mut session = shared.lock();
    if session.state == ConnectionState::Terminating {
        shared.transition(&mut session, ConnectionState::Closed);
    } else {
        // Cancelled by the handle being dropped.
        session.state = ConnectionState::Closed;
        shared.state_changed.notify_waiters();
    }
    drop(session);
    shared.emit(DeviceEvent::Disconnected);
    debug!("IO task exited");
}

/// Sleep for `interval`, returning early on a wake-up or cancellation.
async fn idle_wait(shared: &Shared, cancel: &CancellationToken, interval: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = shared.wake.notified() => {}
        _ = tokio::time::sleep(interval) => {}
    }
}

/// Append reads to `rx_buf` until the line goes quiet for `timeout`.
async fn coalesce(
    transport: &mut dyn Transport,
    chunk: &mut [u8],
    rx_buf: &mut Vec<u8>,
    max_buf: usize,
    timeout: Duration,
) {
    loop {
        match transport.receive(chunk, timeout).await {
            Ok(n) => {
                rx_buf.extend_from_slice(&chunk[..n]);
                if rx_buf.len() > max_buf {
                    tracing::warn!(len = rx_buf.len(), "receive buffer overflow, resyncing");
                    return;
                }
            }
            Err(Error::Timeout) => return,
            Err(e) => {
                debug!(error = %e, "receive failed mid-burst");
                return;
            }
        }
    }
}

/// Decode `buf` and hand the frame to the consumer, or record the drop.
fn publish(
    shared: &Shared,
    pipeline: &mut FramePipeline,
    frame_tx: &mpsc::Sender<ThermalFrame>,
    buf: &[u8],
) {
    // Read after the burst so a setter during the receive wait applies.
    let scalar = shared.lock().color_scalar;
    let frame = match pipeline.process(buf, &scalar) {
        Ok(frame) => frame,
        Err(reason) => {
            StatsCounters::bump(&shared.stats.frames_malformed);
            debug!(len = buf.len(), %reason, "dropping buffer");
            shared.emit(DeviceEvent::FrameDropped {
                reason,
                len: buf.len(),
            });
            return;
        }
    };

    StatsCounters::bump(&shared.stats.frames_decoded);
    let sequence = frame.sequence;
    match frame_tx.try_send(frame) {
        Ok(()) => tracing::trace!(sequence, "frame published"),
        Err(mpsc::error::TrySendError::Full(_)) => {
            StatsCounters::bump(&shared.stats.frames_overrun);
            debug!(sequence, "consumer behind, dropping frame");
            shared.emit(DeviceEvent::FrameDropped {
                reason: DropReason::Overrun,
                len: buf.len(),
            });
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::trace!(sequence, "no frame consumer");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
