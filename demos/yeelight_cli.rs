//! CLI application for controlling Yeelight lights.
//!
//! This example demonstrates a command-line interface covering discovery,
//! every light command, and live state monitoring.
//!
//! Run with: cargo run --example yeelight_cli -- --help

use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use yeelight_rs::{
    Address, ControllerRegistry, DeviceController, Discovery, DiscoveryConfig, DiscoveryState,
    PowerMode,
};

#[derive(Parser)]
#[command(name = "yeelight-cli")]
#[command(about = "Control Yeelight smart lights from the command line", long_about = None)]
struct Cli {
    /// Address of the light as host[:port] (not required for discover command)
    #[arg(short, long, global = true)]
    address: Option<Address>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover all Yeelight lights on the network
    Discover {
        /// Seconds to wait for further responses (default: 3)
        #[arg(short, long, default_value = "3")]
        timeout: u64,
    },

    /// Get the current state of the light
    Status,

    /// Turn the light on
    On,

    /// Turn the light off
    Off,

    /// Toggle the light on/off
    Toggle,

    /// Set a color by hue and saturation
    Color {
        /// Hue (0-359)
        #[arg(value_parser = clap::value_parser!(u16).range(0..=359))]
        hue: u16,
        /// Saturation (0-100)
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        saturation: u8,
    },

    /// Set color temperature in Kelvin (1700-6500)
    Temperature {
        /// Temperature in Kelvin (1700-6500)
        #[arg(value_parser = clap::value_parser!(u16).range(1700..=6500))]
        kelvin: u16,
    },

    /// Print state changes until interrupted
    Watch,

    /// Get detailed diagnostics
    Diagnostics,
}

const STATE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Discover { timeout } = cli.command {
        return discover(timeout).await;
    }

    let Some(address) = cli.address else {
        eprintln!("Error: --address is required for this command");
        std::process::exit(1);
    };

    let registry = ControllerRegistry::new();
    let light = registry.controller(&address);
    light.attach();
    light.wait_for_state(STATE_TIMEOUT).await?;

    let result = run(&light, cli.command).await;
    light.detach();
    result
}

async fn discover(timeout: u64) -> Result<(), Box<dyn std::error::Error>> {
    println!("Discovering Yeelight lights on the network (timeout: {timeout}s)...");

    let discovery =
        Discovery::new(DiscoveryConfig::default().with_receive_timeout(Duration::from_secs(timeout)));
    let mut states = discovery.state();
    discovery.discover();
    states.next().await;

    while let Some(state) = states.next().await {
        match state {
            DiscoveryState::Finished(devices) if devices.is_empty() => {
                println!("No lights found on the network.");
                break;
            }
            DiscoveryState::Finished(devices) => {
                println!("\nFound {} light(s):", devices.len());
                for device in devices {
                    println!("  ID: {:20}  Address: {}", device.id, device.address());
                }
                break;
            }
            DiscoveryState::Failed => {
                eprintln!("Error during discovery, see logs");
                break;
            }
            DiscoveryState::Discovering | DiscoveryState::Discovered(_) => {}
        }
    }
    Ok(())
}

async fn run(light: &DeviceController, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Discover { .. } => unreachable!("handled before connecting"),
        Commands::Status => println!("{:?}", light.current_device_state()),
        Commands::On => light.set_power(PowerMode::On).await?,
        Commands::Off => light.set_power(PowerMode::Off).await?,
        Commands::Toggle => light.toggle().await?,
        Commands::Color { hue, saturation } => light.set_color(hue, saturation).await?,
        Commands::Temperature { kelvin } => light.set_temperature(kelvin).await?,
        Commands::Watch => {
            println!("Watching {} (Ctrl+C to stop)...", light.address());
            let mut connection = light.connection_state();
            let mut device = light.device_state();
            loop {
                tokio::select! {
                    Some(state) = connection.next() => println!("connection: {state}"),
                    Some(state) = device.next() => println!("device: {state:?}"),
                    else => break,
                }
            }
        }
        Commands::Diagnostics => {
            let diagnostics = light.diagnostics().await?;
            println!("{}", serde_json::to_string_pretty(&diagnostics)?);
        }
    }
    Ok(())
}
