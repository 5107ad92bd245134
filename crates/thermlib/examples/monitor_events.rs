//! Monitor device events.
//!
//! Subscribes to the driver's event stream and prints every event for 60
//! seconds. Frames are drained and discarded. Unplug and replug the adapter
//! or feed the port garbage to see retries and dropped buffers.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p thermlib --example monitor_events
//! ```

use std::time::Duration;

use thermlib::DeviceEvent;
use thermlib::mlx90640::Mlx90640Builder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let serial_port = "/dev/ttyUSB0";

    let (camera, mut frames) = Mlx90640Builder::new().build()?;
    let mut events = camera.subscribe();

    let connected = camera.open(serial_port, thermlib::BAUD_RATE_460800).await;
    println!(
        "{} {}",
        serial_port,
        if connected { "open" } else { "not open yet, retrying" }
    );

    tokio::spawn(async move { while frames.recv().await.is_some() {} });

    let start = tokio::time::Instant::now();
    let deadline = start + Duration::from_secs(60);

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) => {
                let elapsed = start.elapsed();
                let timestamp = format!("{:>6}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis());
                match event {
                    DeviceEvent::StateChanged { from, to } => {
                        println!("{} StateChanged  {} -> {}", timestamp, from, to);
                    }
                    DeviceEvent::Connected { port } => {
                        println!("{} Connected     {}", timestamp, port);
                    }
                    DeviceEvent::OpenRetry { attempt } => {
                        println!("{} OpenRetry     attempt {}", timestamp, attempt);
                    }
                    DeviceEvent::CommandSent { command } => {
                        println!("{} CommandSent   {:02X?}", timestamp, command);
                    }
                    DeviceEvent::FrameDropped { reason, len } => {
                        println!("{} FrameDropped  {} ({} bytes)", timestamp, reason, len);
                    }
                    DeviceEvent::Disconnected => {
                        println!("{} Disconnected", timestamp);
                        break;
                    }
                }
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                println!("(missed {} events due to lag)", n);
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => break,
            Err(_) => break,
        }
    }

    camera.close().await;
    let stats = camera.stats();
    println!("\n{:?}", stats);
    Ok(())
}
