// thermlib test application -- CLI tool for exercising the MLX90640 driver
// against real hardware or a simulated sensor on a mock serial line.
//
// Usage:
//   thermlib-test-app list
//   thermlib-test-app stream --port /dev/ttyUSB0 --frames 20
//   thermlib-test-app stream --port /dev/ttyUSB0 --frequency 4 --emissivity 0.95
//   thermlib-test-app --mock stream --frames 10 --mode push
//
// Logging is controlled with RUST_LOG, e.g. RUST_LOG=thermlib_mlx90640=debug.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use thermlib::mlx90640::packet::encode_packet;
use thermlib::mlx90640::{Emissivity, Frequency, Mlx90640, Mlx90640Builder, Mode};
use thermlib::{BAUD_RATE_460800, Connector, SensorGeometry, ThermalFrame};
use thermlib_test_harness::{MockConnector, MockLink};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// thermlib test application -- streams frames from an MLX90640 module.
#[derive(Parser)]
#[command(name = "thermlib-test-app", version, about)]
struct Cli {
    /// Use a simulated sensor on a mock serial line instead of a real port.
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports that can be opened.
    List,

    /// Open the camera and print per-frame extrema.
    Stream {
        /// Serial port path (e.g. /dev/ttyUSB0, COM3). Required unless --mock.
        #[arg(long)]
        port: Option<String>,

        /// Baud rate.
        #[arg(long, default_value_t = BAUD_RATE_460800)]
        baud: u32,

        /// Stop after this many frames (0 = until Ctrl-C).
        #[arg(long, default_value_t = 10)]
        frames: u64,

        /// Refresh rate to set: 8, 4 or 2 (Hz).
        #[arg(long)]
        frequency: Option<Frequency>,

        /// Acquisition mode to set: push or request.
        #[arg(long)]
        mode: Option<Mode>,

        /// Emissivity to set, 0.01 to 1.0.
        #[arg(long)]
        emissivity: Option<Emissivity>,

        /// How long to wait for the port to open, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        open_timeout_ms: u64,
    },
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_list() -> Result<()> {
    let ports = thermlib::available_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No usable serial ports found.");
        return Ok(());
    }
    println!("Serial ports:");
    for port in ports {
        println!("  {port}");
    }
    Ok(())
}

struct StreamOptions {
    port: String,
    baud: u32,
    frames: u64,
    frequency: Option<Frequency>,
    mode: Option<Mode>,
    emissivity: Option<Emissivity>,
}

async fn cmd_stream(
    camera: &Mlx90640,
    frames: &mut thermlib::mlx90640::FrameReceiver,
    opts: &StreamOptions,
) -> Result<()> {
    println!("Opening {} at {} baud...", opts.port, opts.baud);
    if !camera.open(&opts.port, opts.baud).await {
        bail!(
            "{} did not open within the timeout (state: {})",
            opts.port,
            camera.state()
        );
    }
    println!("Connected ({} sensor).\n", camera.geometry());

    if let Some(frequency) = opts.frequency {
        apply(camera, "frequency", frequency.to_string(), |c| {
            c.set_frequency(frequency)
        })
        .await?;
    }
    if let Some(mode) = opts.mode {
        apply(camera, "mode", mode.to_string(), |c| c.set_mode(mode)).await?;
    }
    if let Some(emissivity) = opts.emissivity {
        apply(camera, "emissivity", format!("{:.2}", emissivity.value()), |c| {
            c.set_emissivity(emissivity)
        })
        .await?;
    }

    println!(
        "{:>6}  {:>9}  {:>18}  {:>18}  {:>8}",
        "Frame", "Elapsed", "Hottest", "Coldest", "Ambient"
    );
    println!("{:-<6}  {:-<9}  {:-<18}  {:-<18}  {:-<8}", "", "", "", "", "");

    let start = Instant::now();
    let mut received = 0u64;
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                received += 1;
                print_frame(&frame, start.elapsed());
                if opts.frames != 0 && received >= opts.frames {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted.");
                break;
            }
        }
    }

    let stats = camera.stats();
    println!(
        "\n{} frames received; decoded {}, malformed {}, overrun {}, open failures {}, write failures {}",
        received,
        stats.frames_decoded,
        stats.frames_malformed,
        stats.frames_overrun,
        stats.open_failures,
        stats.write_failures,
    );
    Ok(())
}

/// Submit one setting and wait for the IO task to write it.
async fn apply(
    camera: &Mlx90640,
    name: &str,
    value: String,
    set: impl FnOnce(&Mlx90640) -> bool,
) -> Result<()> {
    if !set(camera) {
        bail!("{name} not accepted in state {}", camera.state());
    }
    let deadline = Instant::now() + Duration::from_secs(1);
    while camera.state() != thermlib::ConnectionState::Ready {
        if Instant::now() >= deadline {
            bail!("{name} command still pending after 1s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    println!("Set {name} to {value}");
    Ok(())
}

fn print_frame(frame: &ThermalFrame, elapsed: Duration) {
    println!(
        "{:>6}  {:>8.3}s  {:>7.2} C ({:>2},{:>2})  {:>7.2} C ({:>2},{:>2})  {:>6.2} C",
        frame.sequence,
        elapsed.as_secs_f64(),
        frame.hottest.celsius(),
        frame.hottest.row,
        frame.hottest.col,
        frame.coldest.celsius(),
        frame.coldest.row,
        frame.coldest.col,
        frame.ambient_celsius(),
    );
}

// ---------------------------------------------------------------------------
// Simulated sensor
// ---------------------------------------------------------------------------

/// Start a task that feeds synthetic packets into `link`: a room at 25 C
/// with a 35 C spot moving across the array.
fn spawn_simulator(link: MockLink, geometry: SensorGeometry, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut step = 0usize;
        loop {
            ticker.tick().await;
            let spot = step % geometry.pixel_count();
            let codes: Vec<u16> = (0..geometry.pixel_count())
                .map(|i| {
                    let ripple = ((i * 7 + step) % 50) as u16;
                    if i == spot { 3500 } else { 2500 + ripple }
                })
                .collect();
            let packet = encode_packet(geometry, &codes, 2600);
            // Split like a USB-serial adapter would deliver it.
            link.push_fragmented(&packet, 512);
            link.push_gap();
            step += 1;
        }
    });
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::List => {
            if cli.mock {
                println!("Serial ports:\n  mock0");
                return Ok(());
            }
            cmd_list()
        }
        Command::Stream {
            port,
            baud,
            frames,
            frequency,
            mode,
            emissivity,
            open_timeout_ms,
        } => {
            let builder =
                Mlx90640Builder::new().open_timeout(Duration::from_millis(open_timeout_ms));

            let (port, connector): (String, Option<Box<dyn Connector>>) = if cli.mock {
                let link = MockLink::new();
                let rate = frequency.map_or(8, |f| f.hz());
                spawn_simulator(
                    link.clone(),
                    SensorGeometry::MLX90640,
                    Duration::from_millis(1000 / u64::from(rate)),
                );
                let connector: Box<dyn Connector> = Box::new(MockConnector::new(link));
                (port.unwrap_or_else(|| "mock0".to_string()), Some(connector))
            } else {
                let Some(port) = port else {
                    bail!("--port is required unless --mock is used");
                };
                (port, None)
            };

            let (camera, mut frame_rx) = match connector {
                Some(connector) => builder.build_with_connector(connector)?,
                None => builder.build()?,
            };

            let opts = StreamOptions {
                port,
                baud,
                frames,
                frequency,
                mode,
                emissivity,
            };
            let result = cmd_stream(&camera, &mut frame_rx, &opts).await;
            camera.close().await;
            result
        }
    }
}
