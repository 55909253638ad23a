//! Discover all Govee lights on the network and turn them on in warm white.
//!
//! Run with: cargo run --example discover_and_turn_on

use std::time::Duration;

use govee_lan_rs::discover_devices;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("Discovering Govee lights on the network...");

    let devices = discover_devices(Duration::from_secs(3)).await?;

    if devices.is_empty() {
        println!("No lights found on the network.");
        return Ok(());
    }

    println!("Found {} light(s):", devices.len());
    for device in &devices {
        println!("  - {} ({})", device.display_name(), device.device_id);
    }

    println!("\nTurning all lights on...");
    for device in devices {
        let name = device.display_name();
        let client = device.into_client();
        let result = async {
            client.turn_on().await?;
            client.set_color_temp(2700).await?;
            client.set_brightness(60).await
        }
        .await;

        match result {
            Ok(_) => println!("  ✓ {}", name),
            Err(e) => eprintln!("  ✗ {}: {}", name, e),
        }
    }

    println!("\nDone!");
    Ok(())
}
