//! Mlx90640 -- the device handle for an MLX90640 serial thermal camera.
//!
//! The handle owns the session shared with the IO task (see [`crate::io`])
//! and the task's join handle. All operations are cheap: they update the
//! session under its lock, wake the IO task, and (for `open` and `close`)
//! wait for the task to react. The transport itself is never touched here.
//!
//! Decoded frames are delivered on the [`FrameReceiver`] returned by the
//! builder. The channel holds a single frame; if the consumer has not taken
//! it when the next one is ready, the new frame is dropped and counted in
//! [`DeviceStats::frames_overrun`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use thermlib_core::events::DeviceEvent;
use thermlib_core::transport::Connector;
use thermlib_core::types::{ConnectionState, SensorGeometry, ThermalFrame};

use crate::colorize::ColorScalar;
use crate::commands::{
    CommandFrame, Emissivity, Frequency, Mode, cmd_set_emissivity, cmd_set_frequency,
    cmd_set_mode,
};
use crate::io::{IoConfig, IoTask, Shared, spawn_io_task};

pub use crate::io::DeviceStats;

/// Receiving end of the frame channel.
pub type FrameReceiver = mpsc::Receiver<ThermalFrame>;

/// Handle to one MLX90640 serial module.
///
/// Construct with [`Mlx90640Builder`](crate::builder::Mlx90640Builder).
/// Dropping the handle stops the IO task without closing gracefully; call
/// [`close`](Mlx90640::close) first to release the port cleanly.
pub struct Mlx90640 {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    frame_tx: mpsc::Sender<ThermalFrame>,
    config: IoConfig,
    open_timeout: Duration,
    task: Mutex<Option<IoTask>>,
}

impl Mlx90640 {
    pub(crate) fn new(
        connector: Box<dyn Connector>,
        config: IoConfig,
        open_timeout: Duration,
        color_scalar: ColorScalar,
        event_capacity: usize,
    ) -> (Self, FrameReceiver) {
        let (event_tx, _) = broadcast::channel(event_capacity);
        let (frame_tx, frame_rx) = mpsc::channel(1);
        let device = Mlx90640 {
            shared: Arc::new(Shared::new(color_scalar, event_tx)),
            connector: Arc::from(connector),
            frame_tx,
            config,
            open_timeout,
            task: Mutex::new(None),
        };
        (device, frame_rx)
    }

    /// Start a session on `path` at `baud_rate`.
    ///
    /// Returns `false` for an empty path or zero baud rate, and `true`
    /// immediately if a session is already active. Otherwise spawns the IO
    /// task and waits up to the open timeout for the port to open. A `false`
    /// return after a valid request only means the port is not open yet: the
    /// IO task keeps retrying until [`close`](Mlx90640::close).
    pub async fn open(&self, path: &str, baud_rate: u32) -> bool {
        if path.is_empty() || baud_rate == 0 {
            warn!(port = %path, baud_rate, "open rejected: empty port or zero baud rate");
            return false;
        }

        {
            let mut session = self.shared.lock();
            if session.state.is_active() {
                debug!(state = %session.state, "open ignored: session already active");
                return true;
            }
            session.port = path.to_string();
            session.baud_rate = baud_rate;
            session.pending = None;
            self.shared.transition(&mut session, ConnectionState::Opening);
        }

        // The task of a previous session has already set Closed; reap it.
        let previous = self.task_slot().take();
        if let Some(previous) = previous {
            if let Err(e) = previous.handle.await {
                warn!(error = %e, "previous IO task ended abnormally");
            }
        }

        info!(port = %path, baud_rate, "opening MLX90640");
        let task = spawn_io_task(
            Arc::clone(&self.shared),
            Arc::clone(&self.connector),
            self.frame_tx.clone(),
            self.config.clone(),
        );
        *self.task_slot() = Some(task);

        let deadline = Instant::now() + self.open_timeout;
        let state = self
            .wait_while(ConnectionState::Opening, Some(deadline))
            .await;
        let connected = matches!(state, ConnectionState::Ready | ConnectionState::Sending);
        if !connected {
            info!(port = %path, %state, "port not open yet, retrying in background");
        }
        connected
    }

    /// End the session and wait for the IO task to exit.
    ///
    /// No-op when the device was never opened or is already closed.
    pub async fn close(&self) {
        {
            let mut session = self.shared.lock();
            match session.state {
                ConnectionState::Idle | ConnectionState::Closed => return,
                ConnectionState::Terminating => {}
                _ => {
                    info!(port = %session.port, "closing MLX90640");
                    self.shared
                        .transition(&mut session, ConnectionState::Terminating);
                }
            }
        }
        self.shared.wake.notify_one();

        let task = self.task_slot().take();
        match task {
            Some(task) => {
                if let Err(e) = task.handle.await {
                    warn!(error = %e, "IO task ended abnormally");
                    let mut session = self.shared.lock();
                    if session.state != ConnectionState::Closed {
                        self.shared
                            .transition(&mut session, ConnectionState::Closed);
                    }
                }
            }
            // Another close() is awaiting the task.
            None => {
                self.wait_while(ConnectionState::Terminating, None).await;
            }
        }
    }

    /// Set the sensor refresh rate. Accepted only while `Ready`.
    pub fn set_frequency(&self, frequency: Frequency) -> bool {
        self.submit(cmd_set_frequency(frequency))
    }

    /// Set the acquisition mode. Accepted only while `Ready`.
    pub fn set_mode(&self, mode: Mode) -> bool {
        self.submit(cmd_set_mode(mode))
    }

    /// Set the target emissivity. Accepted only while `Ready`.
    pub fn set_emissivity(&self, emissivity: Emissivity) -> bool {
        self.submit(cmd_set_emissivity(emissivity))
    }

    /// Change the false-color gains, effective from the next frame.
    pub fn set_color_scalar(&self, scalar: ColorScalar) {
        self.shared.lock().color_scalar = scalar;
    }

    pub fn color_scalar(&self) -> ColorScalar {
        self.shared.lock().color_scalar
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Geometry the decoder expects.
    pub fn geometry(&self) -> SensorGeometry {
        self.config.geometry
    }

    /// Snapshot of the diagnostic counters.
    pub fn stats(&self) -> DeviceStats {
        self.shared.stats.snapshot()
    }

    /// Subscribe to device events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.shared.event_tx.subscribe()
    }

    fn submit(&self, command: CommandFrame) -> bool {
        {
            let mut session = self.shared.lock();
            if session.state != ConnectionState::Ready {
                debug!(state = %session.state, command = ?command, "command ignored: not ready");
                return false;
            }
            session.pending = Some(command);
            self.shared.transition(&mut session, ConnectionState::Sending);
        }
        self.shared.wake.notify_one();
        true
    }

    /// Wait until the state differs from `state` or `deadline` passes, and
    /// return the state seen last.
    async fn wait_while(
        &self,
        state: ConnectionState,
        deadline: Option<Instant>,
    ) -> ConnectionState {
        loop {
            let notified = self.shared.state_changed.notified();
            tokio::pin!(notified);
            // Register before checking so a transition in between is seen.
            notified.as_mut().enable();

            let current = self.shared.state();
            if current != state {
                return current;
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return self.shared.state();
                    }
                }
                None => notified.await,
            }
        }
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<IoTask>> {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Mlx90640 {
    fn drop(&mut self) {
        let slot = self
            .task
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(task) = slot.take() {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use thermlib_core::events::DropReason;
    use thermlib_test_harness::{MockConnector, MockLink};

    use super::*;
    use crate::builder::Mlx90640Builder;
    use crate::packet::encode_packet;

    const SMALL: SensorGeometry = SensorGeometry::new(2, 2);
    const PORT: &str = "/dev/ttyUSB0";
    const BAUD: u32 = 460_800;

    fn builder() -> Mlx90640Builder {
        Mlx90640Builder::new()
            .geometry(SMALL)
            .open_timeout(Duration::from_millis(500))
            .poll_interval(Duration::from_millis(10))
            .coalesce_timeout(Duration::from_millis(5))
    }

    fn device(connector: MockConnector) -> (Mlx90640, FrameReceiver) {
        builder().build_with_connector(Box::new(connector)).unwrap()
    }

    /// Poll `check` until it holds or two seconds pass.
    async fn eventually(mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !check() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn next_frame(rx: &mut FrameReceiver) -> ThermalFrame {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("frame channel closed")
    }

    // -----------------------------------------------------------------------
    // open / close
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn open_rejects_empty_path_and_zero_baud() {
        let link = MockLink::new();
        let connector = MockConnector::new(link.clone());
        let attempts = connector.attempts();
        let (dev, _rx) = device(connector);

        assert!(!dev.open("", BAUD).await);
        assert!(!dev.open(PORT, 0).await);
        assert_eq!(dev.state(), ConnectionState::Idle);
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn open_reaches_ready() {
        let link = MockLink::new();
        let (dev, _rx) = device(MockConnector::new(link.clone()));

        assert!(dev.open(PORT, BAUD).await);
        assert_eq!(dev.state(), ConnectionState::Ready);
        assert_eq!(link.opened(), vec![(PORT.to_string(), BAUD)]);
        assert!(link.is_connected());

        dev.close().await;
        assert_eq!(dev.state(), ConnectionState::Closed);
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn second_open_does_not_restart() {
        let link = MockLink::new();
        let connector = MockConnector::new(link.clone());
        let attempts = connector.attempts();
        let (dev, _rx) = device(connector);

        assert!(dev.open(PORT, BAUD).await);
        assert!(dev.open("/dev/ttyUSB1", 115_200).await);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(link.opened(), vec![(PORT.to_string(), BAUD)]);

        dev.close().await;
    }

    #[tokio::test]
    async fn close_before_open_is_noop() {
        let link = MockLink::new();
        let (dev, _rx) = device(MockConnector::new(link.clone()));

        dev.close().await;
        assert_eq!(dev.state(), ConnectionState::Idle);
        assert_eq!(link.close_count(), 0);
    }

    #[tokio::test]
    async fn close_twice_is_safe() {
        let link = MockLink::new();
        let (dev, _rx) = device(MockConnector::new(link.clone()));

        assert!(dev.open(PORT, BAUD).await);
        dev.close().await;
        dev.close().await;
        assert_eq!(dev.state(), ConnectionState::Closed);
        assert_eq!(link.close_count(), 1);
    }

    #[tokio::test]
    async fn reopen_after_close() {
        let link = MockLink::new();
        let (dev, _rx) = device(MockConnector::new(link.clone()));

        assert!(dev.open(PORT, BAUD).await);
        dev.close().await;
        assert!(dev.open(PORT, 115_200).await);
        assert_eq!(dev.state(), ConnectionState::Ready);
        assert_eq!(link.opened().len(), 2);
        assert_eq!(link.opened()[1].1, 115_200);

        dev.close().await;
        assert_eq!(link.close_count(), 2);
    }

    #[tokio::test]
    async fn open_retries_until_port_appears() {
        let link = MockLink::new();
        let connector = MockConnector::new(link.clone()).fail_first(3);
        let attempts = connector.attempts();
        let (dev, _rx) = device(connector);

        assert!(dev.open(PORT, BAUD).await);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(dev.stats().open_failures, 3);

        dev.close().await;
    }

    #[tokio::test]
    async fn open_times_out_but_keeps_retrying() {
        let link = MockLink::new();
        let connector = MockConnector::new(link.clone()).fail_first(u32::MAX);
        let attempts = connector.attempts();
        let (dev, _rx) = builder()
            .open_timeout(Duration::from_millis(50))
            .build_with_connector(Box::new(connector))
            .unwrap();

        assert!(!dev.open(PORT, BAUD).await);
        assert_eq!(dev.state(), ConnectionState::Opening);

        let seen = attempts.load(Ordering::SeqCst);
        eventually(|| attempts.load(Ordering::SeqCst) > seen).await;

        dev.close().await;
        assert_eq!(dev.state(), ConnectionState::Closed);
        let after_close = attempts.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), after_close);
    }

    #[tokio::test]
    async fn drop_stops_io_task() {
        let link = MockLink::new();
        let connector = MockConnector::new(link.clone()).fail_first(u32::MAX);
        let attempts = connector.attempts();
        let (dev, _rx) = builder()
            .open_timeout(Duration::from_millis(20))
            .build_with_connector(Box::new(connector))
            .unwrap();

        assert!(!dev.open(PORT, BAUD).await);
        drop(dev);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_drop = attempts.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), after_drop);
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn set_frequency_writes_exact_bytes() {
        let link = MockLink::new();
        let (dev, _rx) = device(MockConnector::new(link.clone()));
        assert!(dev.open(PORT, BAUD).await);

        assert!(dev.set_frequency(Frequency::Hz8));
        eventually(|| dev.state() == ConnectionState::Ready).await;
        assert_eq!(link.sent_data(), vec![vec![0xA5, 0x25, 0x01, 0xCB]]);

        dev.close().await;
    }

    #[tokio::test]
    async fn setters_write_in_order() {
        let link = MockLink::new();
        let (dev, _rx) = device(MockConnector::new(link.clone()));
        assert!(dev.open(PORT, BAUD).await);

        assert!(dev.set_mode(Mode::Request));
        eventually(|| dev.state() == ConnectionState::Ready).await;
        assert!(dev.set_emissivity(Emissivity::new(0.95).unwrap()));
        eventually(|| dev.state() == ConnectionState::Ready).await;

        assert_eq!(
            link.sent_data(),
            vec![vec![0xA5, 0x35, 0x02, 0xDC], vec![0xA5, 0x45, 95, 0xDC]]
        );
        dev.close().await;
    }

    #[tokio::test]
    async fn setters_ignored_when_not_ready() {
        let link = MockLink::new();
        let (dev, _rx) = device(MockConnector::new(link.clone()));

        assert!(!dev.set_frequency(Frequency::Hz4));
        assert!(!dev.set_mode(Mode::Push));
        assert_eq!(dev.state(), ConnectionState::Idle);

        assert!(dev.open(PORT, BAUD).await);
        dev.close().await;
        assert!(!dev.set_frequency(Frequency::Hz2));
        assert!(link.sent_data().is_empty());
    }

    #[tokio::test]
    async fn setters_ignored_while_opening() {
        let link = MockLink::new();
        let (dev, _rx) = builder()
            .open_timeout(Duration::from_millis(30))
            .build_with_connector(Box::new(MockConnector::new(link.clone()).fail_first(u32::MAX)))
            .unwrap();

        assert!(!dev.open(PORT, BAUD).await);
        assert_eq!(dev.state(), ConnectionState::Opening);
        assert!(!dev.set_frequency(Frequency::Hz8));
        assert!(!dev.set_mode(Mode::Request));
        assert!(!dev.set_emissivity(Emissivity::new(0.5).unwrap()));
        assert_eq!(dev.state(), ConnectionState::Opening);

        dev.close().await;
        assert!(link.sent_data().is_empty());
    }

    #[tokio::test]
    async fn second_setter_while_sending_is_rejected() {
        let link = MockLink::new();
        let (dev, _rx) = device(MockConnector::new(link.clone()));
        assert!(dev.open(PORT, BAUD).await);

        // The IO task cannot run between these calls on this runtime.
        assert!(dev.set_frequency(Frequency::Hz8));
        assert_eq!(dev.state(), ConnectionState::Sending);
        assert!(!dev.set_frequency(Frequency::Hz2));

        eventually(|| dev.state() == ConnectionState::Ready).await;
        assert_eq!(link.sent_data(), vec![vec![0xA5, 0x25, 0x01, 0xCB]]);
        dev.close().await;
    }

    #[tokio::test]
    async fn write_failure_returns_to_ready() {
        let link = MockLink::new();
        link.set_fail_writes(true);
        let (dev, _rx) = device(MockConnector::new(link.clone()));
        assert!(dev.open(PORT, BAUD).await);

        assert!(dev.set_frequency(Frequency::Hz8));
        eventually(|| dev.state() == ConnectionState::Ready).await;
        assert_eq!(dev.stats().write_failures, 1);

        link.set_fail_writes(false);
        assert!(dev.set_frequency(Frequency::Hz4));
        eventually(|| dev.state() == ConnectionState::Ready).await;
        assert_eq!(link.sent_data().len(), 2);
        assert_eq!(dev.stats().write_failures, 1);

        dev.close().await;
    }

    // -----------------------------------------------------------------------
    // Frames
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn decodes_scenario_frame() {
        let link = MockLink::new();
        let (dev, mut rx) = device(MockConnector::new(link.clone()));
        assert!(dev.open(PORT, BAUD).await);

        link.push_burst(&encode_packet(SMALL, &[100, 200, 300, 400], 150));
        let frame = next_frame(&mut rx).await;

        assert_eq!(frame.geometry, SMALL);
        assert_eq!((frame.hottest.row, frame.hottest.col), (1, 1));
        assert_eq!((frame.coldest.row, frame.coldest.col), (0, 0));
        assert_eq!(&frame.pixels[9..12], &[204, 25, 25]);
        assert_eq!(&frame.pixels[0..3], &[0, 0, 0]);
        assert_eq!(dev.stats().frames_decoded, 1);

        dev.close().await;
    }

    #[tokio::test]
    async fn coalesces_fragmented_packet() {
        let link = MockLink::new();
        let (dev, mut rx) = builder()
            .geometry(SensorGeometry::MLX90640)
            .build_with_connector(Box::new(MockConnector::new(link.clone())))
            .unwrap();
        assert!(dev.open(PORT, BAUD).await);

        let codes: Vec<u16> = (0..768).map(|i| 2000 + i as u16).collect();
        let packet = encode_packet(SensorGeometry::MLX90640, &codes, 2500);
        link.push_fragmented(&packet, 100);
        link.push_gap();

        let frame = next_frame(&mut rx).await;
        assert_eq!(frame.temperatures.len(), 768);
        assert_eq!(frame.pixels.len(), 768 * 3);
        assert_eq!((frame.hottest.row, frame.hottest.col), (23, 31));
        assert_eq!((frame.coldest.row, frame.coldest.col), (0, 0));
        assert_eq!(dev.stats().frames_malformed, 0);

        dev.close().await;
    }

    #[tokio::test]
    async fn malformed_buffers_are_dropped() {
        let link = MockLink::new();
        let (dev, mut rx) = device(MockConnector::new(link.clone()));
        let mut events = dev.subscribe();
        assert!(dev.open(PORT, BAUD).await);

        let good = encode_packet(SMALL, &[1, 2, 3, 4], 2500);
        let mut bad_header = good.clone();
        bad_header[0] = 0x00;
        link.push_burst(&good[..10]);
        link.push_burst(&bad_header);
        link.push_burst(&good);

        let frame = next_frame(&mut rx).await;
        assert_eq!(frame.sequence, 1);
        assert_eq!(dev.stats().frames_malformed, 2);

        let mut reasons = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let DeviceEvent::FrameDropped { reason, len } = event {
                reasons.push((reason, len));
            }
        }
        assert_eq!(
            reasons,
            vec![(DropReason::BadLength, 10), (DropReason::BadHeader, 16)]
        );

        dev.close().await;
    }

    #[tokio::test]
    async fn slow_consumer_overruns_are_counted() {
        let link = MockLink::new();
        let (dev, mut rx) = device(MockConnector::new(link.clone()));
        assert!(dev.open(PORT, BAUD).await);

        for base in [10u16, 20, 30] {
            link.push_burst(&encode_packet(SMALL, &[base, base + 1, base + 2, base + 3], 2500));
        }
        eventually(|| dev.stats().frames_decoded == 3).await;

        let stats = dev.stats();
        assert_eq!(stats.frames_overrun, 2);
        let frame = next_frame(&mut rx).await;
        assert_eq!(frame.sequence, 1);

        dev.close().await;
    }

    #[tokio::test]
    async fn uniform_frame_renders_black() {
        let link = MockLink::new();
        let (dev, mut rx) = device(MockConnector::new(link.clone()));
        assert!(dev.open(PORT, BAUD).await);

        link.push_burst(&encode_packet(SMALL, &[2500; 4], 2500));
        let frame = next_frame(&mut rx).await;
        assert!(frame.pixels.iter().all(|&p| p == 0));

        dev.close().await;
    }

    #[tokio::test]
    async fn color_scalar_applies_to_next_frame() {
        let link = MockLink::new();
        let (dev, mut rx) = device(MockConnector::new(link.clone()));
        assert!(dev.open(PORT, BAUD).await);

        dev.set_color_scalar(ColorScalar::GRAY);
        assert_eq!(dev.color_scalar(), ColorScalar::GRAY);
        link.push_burst(&encode_packet(SMALL, &[100, 200, 300, 400], 150));
        let frame = next_frame(&mut rx).await;
        assert_eq!(&frame.pixels[9..12], &[255, 255, 255]);

        dev.close().await;
    }

    #[tokio::test]
    async fn color_scalar_set_during_receive_wait_applies() {
        let link = MockLink::new();
        let (dev, mut rx) = builder()
            .poll_interval(Duration::from_millis(100))
            .build_with_connector(Box::new(MockConnector::new(link.clone())))
            .unwrap();
        assert!(dev.open(PORT, BAUD).await);

        // Let the IO task block in its idle receive before changing gains.
        tokio::time::sleep(Duration::from_millis(20)).await;
        dev.set_color_scalar(ColorScalar::GRAY);
        tokio::time::sleep(Duration::from_millis(20)).await;

        link.push_burst(&encode_packet(SMALL, &[100, 200, 300, 400], 150));
        let frame = next_frame(&mut rx).await;
        assert_eq!(&frame.pixels[9..12], &[255, 255, 255]);

        dev.set_color_scalar(ColorScalar::default());
        tokio::time::sleep(Duration::from_millis(20)).await;
        link.push_burst(&encode_packet(SMALL, &[100, 200, 300, 400], 150));
        let frame = next_frame(&mut rx).await;
        assert_eq!(&frame.pixels[9..12], &[204, 25, 25]);

        dev.close().await;
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn session_event_sequence() {
        let link = MockLink::new();
        let (dev, _rx) = device(MockConnector::new(link.clone()).fail_first(1));
        let mut events = dev.subscribe();

        assert!(dev.open(PORT, BAUD).await);
        assert!(dev.set_frequency(Frequency::Hz2));
        eventually(|| dev.state() == ConnectionState::Ready).await;
        dev.close().await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }

        let transitions: Vec<(ConnectionState, ConnectionState)> = seen
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect();
        use ConnectionState::*;
        assert_eq!(
            transitions,
            vec![
                (Idle, Opening),
                (Opening, Ready),
                (Ready, Sending),
                (Sending, Ready),
                (Ready, Terminating),
                (Terminating, Closed),
            ]
        );

        assert!(seen.iter().any(|e| matches!(e, DeviceEvent::OpenRetry { attempt: 1 })));
        assert!(seen.iter().any(|e| matches!(e, DeviceEvent::Connected { port } if port == PORT)));
        assert!(seen.iter().any(
            |e| matches!(e, DeviceEvent::CommandSent { command } if *command == [0xA5, 0x25, 0x03, 0xCD])
        ));
        assert!(matches!(seen.last(), Some(DeviceEvent::Disconnected)));
    }
}
