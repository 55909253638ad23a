//! CLI application for controlling Govee lights.
//!
//! Run with: cargo run --example govee_cli -- --help
//! Set `RUST_LOG=debug` to see the datagrams exchanged with the device.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use govee_lan_rs::{Coordinator, DeviceClient, ProtocolConfig, discover_devices};

#[derive(Parser)]
#[command(name = "govee-cli")]
#[command(about = "Control Govee smart lights over the LAN API", long_about = None)]
struct Cli {
    /// IP address of the Govee light (not required for discover command)
    #[arg(short, long, global = true)]
    ip: Option<Ipv4Addr>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover all Govee lights on the network
    Discover {
        /// Discovery timeout in seconds
        #[arg(short, long, default_value = "3")]
        timeout: u64,
    },

    /// Query the current state of the light
    Status,

    /// Turn the light on
    On,

    /// Turn the light off
    Off,

    /// Set brightness (clamped to 1-100)
    Brightness { level: i64 },

    /// Set RGB color (each channel clamped to 0-255)
    Color { red: i64, green: i64, blue: i64 },

    /// Set color temperature in Kelvin (clamped to 2000-9000)
    Temperature { kelvin: i64 },

    /// Print diagnostics, including a live status probe
    Diagnostics,

    /// Poll the light and print every state change
    Watch {
        /// Poll interval in seconds (at least 1)
        #[arg(short = 'n', long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    if let Commands::Discover { timeout } = cli.command {
        println!("Discovering Govee lights (timeout: {}s)...", timeout);
        let devices = discover_devices(Duration::from_secs(timeout)).await?;
        if devices.is_empty() {
            println!("No lights found. Make sure the LAN API is enabled in the Govee app.");
        } else {
            println!("\nFound {} light(s):", devices.len());
            for device in devices {
                println!("  {:30}  id: {}", device.display_name(), device.device_id);
            }
        }
        return Ok(());
    }

    let ip = cli
        .ip
        .ok_or("IP address is required for this command. Use --ip <IP>")?;

    match cli.command {
        Commands::Discover { .. } => unreachable!(),

        Commands::Status => {
            let client = DeviceClient::new(ip);
            let state = client.get_device_state().await?;
            println!("Light at {}:", ip);
            println!("  Power: {}", if state.on() { "ON" } else { "OFF" });
            println!("  Brightness: {}%", state.brightness().value());
            println!("  Mode: {}", state.color_mode());
            match state.color_temp() {
                Some(kelvin) => println!("  Temperature: {}K", kelvin),
                None => {
                    let color = state.color();
                    println!(
                        "  Color: RGB({}, {}, {})",
                        color.red(),
                        color.green(),
                        color.blue()
                    );
                }
            }
        }

        Commands::On => {
            DeviceClient::new(ip).turn_on().await?;
            println!("Sent ON to {}", ip);
        }

        Commands::Off => {
            DeviceClient::new(ip).turn_off().await?;
            println!("Sent OFF to {}", ip);
        }

        Commands::Brightness { level } => {
            let sent = DeviceClient::new(ip).set_brightness(level).await?;
            println!("Sent brightness {}% to {}", sent.value(), ip);
        }

        Commands::Color { red, green, blue } => {
            let sent = DeviceClient::new(ip).set_color(red, green, blue).await?;
            println!("Sent color {} to {}", sent, ip);
        }

        Commands::Temperature { kelvin } => {
            let sent = DeviceClient::new(ip).set_color_temp(kelvin).await?;
            println!("Sent temperature {}K to {}", sent.kelvin(), ip);
        }

        Commands::Diagnostics => {
            let diag = DeviceClient::new(ip).diagnostics().await;
            println!("{}", serde_json::to_string_pretty(&diag)?);
        }

        Commands::Watch { interval } => {
            let config = ProtocolConfig {
                poll_interval: Duration::from_secs(interval),
                ..ProtocolConfig::default()
            };
            let coordinator = Coordinator::new(Arc::new(DeviceClient::with_config(ip, config)));
            coordinator.subscribe(move |state| {
                println!(
                    "[{}] on={} brightness={} color={} temp={:?}",
                    ip,
                    state.on(),
                    state.brightness().value(),
                    state.color(),
                    state.color_temp()
                );
            });
            coordinator.start();
            println!("Watching {} (Press Ctrl+C to stop)\n", ip);

            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                println!("status queries: {}", coordinator.status_support());
            }
        }
    }

    Ok(())
}
