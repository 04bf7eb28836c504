//! # yeelight_rs
//!
//! An async Rust library for controlling Yeelight smart lights over the LAN protocol.
//!
//! This crate provides a **runtime-agnostic** async API to find Yeelight bulbs on your
//! local network and control them over a persistent TCP connection. It supports
//! toggling, power, HSV colors and color temperature, and keeps an up-to-date view of
//! each light's state from the notifications the bulb pushes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use yeelight_rs::{Address, ControllerRegistry};
//!
//! // Works with any async runtime!
//! async fn control_light() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ControllerRegistry::new();
//!     let address: Address = "192.168.1.100:55443".parse()?;
//!
//!     // Every caller for this address shares one connection
//!     let light = registry.controller(&address);
//!     light.attach();
//!
//!     let state = light.wait_for_state(Duration::from_secs(5)).await?;
//!     println!("light is on: {:?}", state.is_enabled());
//!
//!     // Set the light to blue
//!     light.set_color(240, 100).await?;
//!     light.detach();
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Runtime Agnostic**: Works with tokio, async-std, or smol async runtimes
//! - **Shared Connections**: One reference-counted connection per light via [`ControllerRegistry`]
//! - **Commands**: Toggle, [`PowerMode`], [`HueSaturation`] colors and [`Kelvin`] temperatures
//! - **Live State**: [`ConnectionState`] and [`DeviceState`] streams through [`Subscription`]
//! - **Discovery**: Find bulbs on your network with [`Discovery`]
//! - **Diagnostics**: Per-light [`MessageHistory`] of commands, results and pushes
//!
//! ## Communication
//!
//! Commands travel as CRLF-terminated JSON over TCP (port 55443 by default). Bulbs are
//! found with an SSDP-style search multicast to `239.255.255.250:1982`. The bulbs must
//! be on the same local network and have "LAN Control" enabled.
//!
//! ## Runtime Selection
//!
//! This library is runtime-agnostic. Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! yeelight-rs = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! yeelight-rs = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! yeelight-rs = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```
//!
//! ## Feature Flags
//!
//! - `runtime-tokio` (default): Use the tokio async runtime
//! - `runtime-async-std`: Use the async-std runtime
//! - `runtime-smol`: Use the smol runtime

mod address;
mod aggregator;
mod config;
mod controller;
mod discovery;
mod errors;
mod history;
mod observable;
mod packet;
mod registry;
pub mod runtime;
mod status;
mod transport;
mod types;

// Re-export public API
pub use address::Address;
pub use config::{ControllerConfig, DiscoveryConfig};
pub use controller::DeviceController;
pub use discovery::{Device, Discovery, DiscoveryState, parse_response};
pub use errors::Error;
pub use history::{HistoryEntry, HistorySummary, MessageHistory, MessageType};
pub use observable::Subscription;
pub use packet::{
    FrameDecoder, IncomingPacket, Method, OutgoingPacket, PropsPacket, Property, ResultPacket,
};
pub use registry::ControllerRegistry;
pub use status::{ConnectionState, DeviceState};
pub use types::{Color, HueSaturation, Kelvin, PowerMode};
