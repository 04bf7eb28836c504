//! Discover all Yeelight lights on the network and toggle them.
//!
//! This example demonstrates:
//! - Running one discovery cycle and waiting for it to finish
//! - Sharing controllers through a registry
//! - Waiting for a light's state before toggling it
//!
//! Run with: cargo run --example discover_and_toggle

use std::time::Duration;

use futures::StreamExt;
use yeelight_rs::{ControllerRegistry, Discovery, DiscoveryConfig, DiscoveryState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Discovering Yeelight lights on the network...");

    let discovery = Discovery::new(DiscoveryConfig::default().with_receive_timeout(Duration::from_secs(3)));
    let mut states = discovery.state();
    discovery.discover();

    // Skip the replayed state from before the cycle started
    states.next().await;
    let devices = loop {
        match states.next().await {
            Some(DiscoveryState::Finished(devices)) => break devices,
            Some(DiscoveryState::Failed) => return Err("discovery failed".into()),
            Some(_) => continue,
            None => return Err("discovery stopped".into()),
        }
    };

    if devices.is_empty() {
        println!("No lights found on the network.");
        return Ok(());
    }

    println!("Found {} light(s):", devices.len());
    for device in &devices {
        println!("  - {device}");
    }

    println!("\nToggling all lights...");

    let registry = ControllerRegistry::new();
    for device in devices {
        let light = registry.controller(&device.address());
        light.attach();
        let result = match light.wait_for_state(Duration::from_secs(5)).await {
            Ok(_) => light.toggle().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => println!("  ✓ Toggled {}", device.id),
            Err(e) => eprintln!("  ✗ Failed to toggle {}: {}", device.id, e),
        }
        light.detach();
    }

    println!("\nDone!");
    Ok(())
}
