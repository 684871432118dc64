//! Board topology descriptions for serlink camera links.
//!
//! This crate defines the TOML file format that describes one camera link
//! board: the serial links and their remote addresses, the deserializer
//! pipes and output PHYs, the video channels flowing through them, and
//! optionally the serializer boards on the far ends. A parsed [`Topology`]
//! validates its structural invariants and converts into the typed
//! configurations `serlink-core` consumes.
//!
//! # Example
//!
//! ```rust,no_run
//! use serlink_config::{Topology, validate};
//!
//! let topology = Topology::load("bench.toml").unwrap();
//! validate(&topology).unwrap();
//! let des_config = topology.to_des_config();
//! ```

mod error;
mod topology;

/// Topology validation.
pub mod validation;

pub use error::ConfigError;
pub use topology::{
    ChannelDesc, LinkDesc, PhyDesc, PipeDesc, SerChannelDesc, SerPipeDesc, SerializerDesc,
    Topology,
};
pub use validation::{ValidationError, validate};
