//! Stream frames from an MLX90640 module.
//!
//! Opens the camera, switches it to 4 Hz, and prints the hottest and
//! coldest pixel of each frame for 30 seconds.
//!
//! # Requirements
//!
//! - An MLX90640 serial module on a USB-serial adapter
//! - Serial port path adjusted for your system
//!
//! # Usage
//!
//! ```sh
//! cargo run -p thermlib --example stream_frames
//! ```

use std::time::Duration;

use thermlib::mlx90640::{Emissivity, Frequency, Mlx90640Builder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let serial_port = "/dev/ttyUSB0";

    println!("Opening MLX90640 on {}...", serial_port);

    let (camera, mut frames) = Mlx90640Builder::new()
        .open_timeout(Duration::from_secs(2))
        .build()?;

    if !camera.open(serial_port, thermlib::BAUD_RATE_460800).await {
        camera.close().await;
        anyhow::bail!("no response from {serial_port}");
    }

    camera.set_frequency(Frequency::Hz4);
    // One command at a time; wait for the first to go out.
    tokio::time::sleep(Duration::from_millis(100)).await;
    camera.set_emissivity(Emissivity::new(0.95)?);

    println!("{:>6}  {:>16}  {:>16}  {:>8}", "Frame", "Hottest", "Coldest", "Ambient");
    println!("{:-<6}  {:-<16}  {:-<16}  {:-<8}", "", "", "", "");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, frames.recv()).await {
            Ok(Some(frame)) => {
                println!(
                    "{:>6}  {:>6.1} C ({:>2},{:>2})  {:>6.1} C ({:>2},{:>2})  {:>6.1} C",
                    frame.sequence,
                    frame.hottest.celsius(),
                    frame.hottest.row,
                    frame.hottest.col,
                    frame.coldest.celsius(),
                    frame.coldest.row,
                    frame.coldest.col,
                    frame.ambient_celsius(),
                );
            }
            Ok(None) | Err(_) => break,
        }
    }

    let stats = camera.stats();
    camera.close().await;
    println!(
        "\n{} frames decoded, {} malformed, {} dropped by overrun",
        stats.frames_decoded, stats.frames_malformed, stats.frames_overrun
    );
    Ok(())
}
