//! Serlink Core - routing and bridging for camera serializer/deserializer links
//!
//! This crate models the control plane of a GMSL-style camera link: sensor
//! streams enter a serializer, travel over a serial link, and fan out of a
//! deserializer onto CSI-2 output PHYs. Everything hardware-specific sits
//! behind ops traits, so the same logic drives real register maps and the
//! in-memory simulator alike.
//!
//! # Core Abstractions
//!
//! ## Topology
//!
//! - [`Component`] - One node of a chip's internal topology with sink/source
//!   pads and per-pad enabled-stream masks
//! - [`ComponentGraph`] - Arena of components plus the static pad links
//!   wiring them together
//! - [`Route`] - A (sink pad, stream) to (source pad, stream) mapping inside
//!   a component
//! - [`Restrictions`] - Per-component routing constraints (one-to-one,
//!   no N-to-1, no stream mixing)
//!
//! ## Formats & Remapping
//!
//! - [`PixelFormat`] / [`DataType`] - Abstract formats and their CSI-2 bus
//!   codes; pixel formats expand to three remap entries (payload plus frame
//!   markers), embedded data to one
//! - [`Remap`] / [`build_pipe_remaps`] - Bounded per-pipe (data type, virtual
//!   channel) rewrite tables
//!
//! ## Stream Lifecycle
//!
//! - [`enable_streams`] / [`disable_streams`] - Idempotent mask propagation
//!   across the graph; hardware fires exactly once on a component's
//!   first-enable/last-disable transition, with a balanced unwind on failure
//!
//! ## Remote Device Bridging
//!
//! - [`I2cBus`] - The I2C side channel to remote devices
//! - [`Deserializer::bridge_attach`] - Discover, reset, and readdress the
//!   remote serializer on one link, recording the alias translation only
//!   once the handshake completes
//! - [`Serializer::attach_xlate`] - The bounded alias table on the far side
//!
//! ## Orchestrators & Backends
//!
//! - [`Deserializer`] / [`Serializer`] - Own one chip's state; every
//!   mutating operation takes `&mut self`, which is the device-wide lock
//! - [`DesOps`] / [`SerOps`] - Hardware operations a backend implements
//! - [`SimDes`] / [`SimSer`] / [`SimBus`] - In-memory backends with call
//!   recording and failure injection
//!
//! # Example
//!
//! ```rust
//! use serlink_core::{
//!     ChannelSetup, DesCaps, DesConfig, Deserializer, PixelFormat, SimBus, SimDes,
//! };
//!
//! let config = DesConfig {
//!     channels: vec![ChannelSetup {
//!         format: Some(PixelFormat::Raw10),
//!         ..ChannelSetup::default()
//!     }],
//!     ..DesConfig::default()
//! };
//! let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &config)?;
//! des.init()?;
//!
//! let mut bus = SimBus::new();
//! bus.add_device(0x40);
//! des.bridge_attach(&mut bus, 0, 0x40, 0x1a)?;
//! assert_eq!(des.bridge_lookup(0x1a), Some(0x40));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod atr;
pub mod component;
pub mod des;
pub mod error;
pub mod format;
pub mod graph;
pub mod hw;
pub mod remap;
pub mod routing;
pub mod ser;
pub mod sim;
pub mod streams;

pub use atr::{BridgePhase, I2cBus, I2cXlate};
pub use component::{Component, ComponentId, ComponentKind, CrossbarKind, StreamMask};
pub use des::{
    Channel, ChannelSetup, DesConfig, Deserializer, Link, LinkSetup, PhySetup, PipeSetup,
};
pub use error::{BridgeError, HwError, RoutingError};
pub use format::{DataType, FormatInfo, PixelFormat};
pub use graph::{ComponentGraph, PadLink};
pub use hw::{DesCaps, DesOps, Phy, PhyConfig, Pipe, SerCaps, SerOps};
pub use remap::{Remap, RemapSource, build_pipe_remaps};
pub use routing::{Restrictions, Route, init_routing, validate_routes};
pub use ser::{SerChannel, SerChannelSetup, SerConfig, SerPipe, SerPipeSetup, Serializer};
pub use sim::{SimBus, SimDes, SimSer};
pub use streams::{HwToggle, disable_streams, enable_streams};
