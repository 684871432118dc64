//! Topology file format and operations.

use serde::{Deserialize, Serialize};
use std::path::Path;

use serlink_core::{
    ChannelSetup, DesConfig, LinkSetup, PhyConfig, PhySetup, PipeSetup, PixelFormat,
    SerChannelSetup, SerConfig, SerPipeSetup,
};

use crate::error::ConfigError;

/// Board topology description.
///
/// Topologies are stored as TOML files describing the deserializer side of a
/// camera link board and, optionally, the serializers on the far ends.
///
/// # TOML Format
///
/// ```toml
/// name = "dual-camera"
///
/// [[links]]
/// enabled = true
/// remote_power_up = 0x40
/// remote_alias = 0x1a
///
/// [[pipes]]
/// link = 0
///
/// [[channels]]
/// pipe = 0
/// phy = 0
/// src_vc = 0
/// dst_vc = 0
/// format = "raw10"
///
/// [[phys]]
/// enabled = true
/// data_lanes = 4
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Topology {
    /// Name of the board.
    pub name: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Serial links, by index.
    #[serde(default)]
    pub links: Vec<LinkDesc>,

    /// Deserializer pipes, by index.
    #[serde(default)]
    pub pipes: Vec<PipeDesc>,

    /// Video channels.
    #[serde(default)]
    pub channels: Vec<ChannelDesc>,

    /// Output PHYs, by index.
    #[serde(default)]
    pub phys: Vec<PhyDesc>,

    /// Serializer boards on the far ends, by link index.
    #[serde(default)]
    pub serializers: Vec<SerializerDesc>,
}

/// One serial link of the topology.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkDesc {
    /// Whether the link is populated.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tunnel mode.
    #[serde(default)]
    pub tunnel_mode: bool,

    /// Factory power-up address of the remote serializer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_power_up: Option<u8>,

    /// Alias address to move the remote serializer to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_alias: Option<u8>,
}

/// One deserializer pipe.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipeDesc {
    /// Source link; defaults per chip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<usize>,

    /// Link stream id; defaults per chip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<u32>,
}

/// One video channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelDesc {
    /// Pipe carrying the channel; defaults per chip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipe: Option<usize>,

    /// Destination PHY; defaults per chip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phy: Option<usize>,

    /// Virtual channel on the link side.
    #[serde(default)]
    pub src_vc: u8,

    /// Virtual channel on the output side; defaults per chip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_vc: Option<u8>,

    /// Pixel format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<PixelFormat>,
}

/// One output PHY.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhyDesc {
    /// Whether the PHY is wired up.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of data lanes.
    #[serde(default = "default_data_lanes")]
    pub data_lanes: u8,

    /// Link frequency in Hz; 0 selects the chip default.
    #[serde(default)]
    pub link_frequency: u64,
}

/// One serializer board on the far end of a link.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SerializerDesc {
    /// Sensor streams entering the serializer.
    #[serde(default)]
    pub channels: Vec<SerChannelDesc>,

    /// Serializer pipes, by index.
    #[serde(default)]
    pub pipes: Vec<SerPipeDesc>,
}

/// One sensor stream on a serializer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SerChannelDesc {
    /// Input PHY; defaults per chip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phy: Option<usize>,

    /// Virtual channel.
    #[serde(default)]
    pub vc: u8,

    /// Pixel format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<PixelFormat>,
}

/// One serializer pipe.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SerPipeDesc {
    /// Input PHY; defaults per chip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phy: Option<usize>,

    /// Stream id; defaults per chip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn default_data_lanes() -> u8 {
    4
}

impl Topology {
    /// Creates an empty topology.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Loads a topology from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let topology: Topology = toml::from_str(&content)?;
        Ok(topology)
    }

    /// Saves the topology to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Converts the deserializer side into a core configuration.
    pub fn to_des_config(&self) -> DesConfig {
        DesConfig {
            links: self
                .links
                .iter()
                .map(|l| LinkSetup {
                    enabled: l.enabled,
                    tunnel_mode: l.tunnel_mode,
                })
                .collect(),
            pipes: self
                .pipes
                .iter()
                .map(|p| PipeSetup {
                    link_id: p.link,
                    stream_id: p.stream_id,
                })
                .collect(),
            channels: self
                .channels
                .iter()
                .map(|c| ChannelSetup {
                    pipe_id: c.pipe,
                    phy_id: c.phy,
                    src_vc: c.src_vc,
                    dst_vc: c.dst_vc,
                    format: c.format,
                })
                .collect(),
            phys: self
                .phys
                .iter()
                .map(|p| PhySetup {
                    enabled: p.enabled,
                    config: PhyConfig {
                        num_data_lanes: p.data_lanes,
                        link_frequency: p.link_frequency,
                        ..PhyConfig::default()
                    },
                })
                .collect(),
        }
    }

    /// Converts one serializer section into a core configuration.
    pub fn to_ser_config(&self, link: usize) -> Option<SerConfig> {
        self.serializers.get(link).map(|s| SerConfig {
            pipes: s
                .pipes
                .iter()
                .map(|p| SerPipeSetup {
                    phy_id: p.phy,
                    stream_id: p.stream_id,
                })
                .collect(),
            channels: s
                .channels
                .iter()
                .map(|c| SerChannelSetup {
                    phy_id: c.phy,
                    vc: c.vc,
                    format: c.format,
                })
                .collect(),
            num_enabled_phys: None,
        })
    }
}
