//! Hardware operation traits.
//!
//! The orchestrators never touch registers directly; every chip-level effect
//! goes through [`DesOps`] or [`SerOps`]. A real backend would sit on a
//! register map; the in-memory backends in [`crate::sim`] implement the same
//! traits for tests and simulated bring-up.

use crate::atr::{I2cBus, I2cXlate};
use crate::error::HwError;
use crate::format::DataType;
use crate::remap::Remap;

/// Per-PHY bus configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhyConfig {
    /// Number of data lanes.
    pub num_data_lanes: u8,
    /// Whether the clock lane sits in the middle of the lane block.
    pub clock_lane_first: bool,
    /// Link frequency in Hz; 0 selects the chip default.
    pub link_frequency: u64,
    /// Alternate memory-map packing for 8-bit formats.
    pub alt_mem_map8: bool,
    /// Alternate memory-map packing for 10/12-bit formats.
    pub alt_mem_map10: bool,
    /// Alternate memory-map packing for 12-bit formats.
    pub alt_mem_map12: bool,
}

/// One deserializer PHY.
#[derive(Clone, Copy, Debug, Default)]
pub struct Phy {
    /// PHY index.
    pub index: usize,
    /// Bus configuration.
    pub config: PhyConfig,
    /// Whether the PHY is populated on the board.
    pub enabled: bool,
    /// Whether any stream currently drives the PHY.
    pub active: bool,
}

/// One deserializer video pipe.
#[derive(Clone, Debug, Default)]
pub struct Pipe {
    /// Pipe index.
    pub index: usize,
    /// Destination PHY.
    pub phy_id: usize,
    /// Source link.
    pub link_id: usize,
    /// Stream id selected on the link.
    pub stream_id: u32,
    /// Committed remap table.
    pub remaps: Vec<Remap>,
    /// 8-bit pixel-doubling.
    pub dbl8: bool,
    /// 10-bit pixel-doubling.
    pub dbl10: bool,
    /// 12-bit pixel-doubling.
    pub dbl12: bool,
    /// Whether the pipe is in use.
    pub enabled: bool,
}

/// Deserializer chip capabilities.
#[derive(Clone, Copy, Debug)]
pub struct DesCaps {
    /// Number of output PHYs.
    pub num_phys: usize,
    /// Number of video pipes.
    pub num_pipes: usize,
    /// Number of serial links.
    pub num_links: usize,
    /// Hardware remap-table size per pipe.
    pub max_remaps_per_pipe: usize,
    /// Whether links can run in tunnel mode.
    pub supports_tunnel_mode: bool,
    /// Whether pipes can be re-pointed at a different link.
    pub supports_pipe_link_remap: bool,
    /// Whether pipes can select a link stream id other than their index.
    pub supports_pipe_stream_autoselect: bool,
    /// Whether bound serializers need the TX-id fixup after readdress.
    pub needs_peer_tx_id_fixup: bool,
}

impl Default for DesCaps {
    fn default() -> Self {
        Self {
            num_phys: 4,
            num_pipes: 4,
            num_links: 2,
            max_remaps_per_pipe: 16,
            supports_tunnel_mode: false,
            supports_pipe_link_remap: true,
            supports_pipe_stream_autoselect: true,
            needs_peer_tx_id_fixup: false,
        }
    }
}

/// Serializer chip capabilities.
#[derive(Clone, Copy, Debug)]
pub struct SerCaps {
    /// Number of input PHYs.
    pub num_phys: usize,
    /// Number of video pipes.
    pub num_pipes: usize,
    /// Data-type filter slots per pipe.
    pub num_dts_per_pipe: usize,
    /// Address-translation table slots.
    pub num_i2c_xlates: usize,
    /// Whether the link can run in tunnel mode.
    pub supports_tunnel_mode: bool,
}

impl Default for SerCaps {
    fn default() -> Self {
        Self {
            num_phys: 2,
            num_pipes: 2,
            num_dts_per_pipe: 2,
            num_i2c_xlates: 2,
            supports_tunnel_mode: false,
        }
    }
}

/// Chip operations of a deserializer backend.
///
/// Every method is synchronous and returns [`HwError`] on bus failure; the
/// orchestrator decides what to roll back.
pub trait DesOps {
    /// Chip capabilities.
    fn caps(&self) -> &DesCaps;

    /// One-time chip initialization.
    fn init(&mut self) -> Result<(), HwError>;

    /// Hook after links are selected during bring-up.
    fn post_init(&mut self) -> Result<(), HwError>;

    /// Chip-wide output enable.
    fn set_enable(&mut self, enable: bool) -> Result<(), HwError>;

    /// Programs one PHY's bus configuration.
    fn init_phy(&mut self, phy: &Phy) -> Result<(), HwError>;

    /// Powers one PHY up or down.
    fn set_phy_enable(&mut self, phy: usize, enable: bool) -> Result<(), HwError>;

    /// Programs one pipe's static configuration.
    fn init_pipe(&mut self, pipe: &Pipe) -> Result<(), HwError>;

    /// Starts or stops one pipe.
    fn set_pipe_enable(&mut self, pipe: usize, enable: bool) -> Result<(), HwError>;

    /// Selects the link stream id a pipe listens to.
    fn set_pipe_stream_id(&mut self, pipe: usize, stream_id: u32) -> Result<(), HwError>;

    /// Points a pipe at a link.
    fn set_pipe_link(&mut self, pipe: usize, link: usize) -> Result<(), HwError>;

    /// Points a pipe at a destination PHY (tunnel mode).
    fn set_pipe_phy(&mut self, pipe: usize, phy: usize) -> Result<(), HwError>;

    /// Pushes a pipe's remap table.
    fn set_pipe_remaps(&mut self, pipe: usize, remaps: &[Remap]) -> Result<(), HwError>;

    /// Enables exactly the links in `mask` (bit *n* = link *n*).
    fn select_links(&mut self, mask: u32) -> Result<(), HwError>;

    /// Chip-specific fixup applied to a freshly readdressed remote serializer.
    fn fix_peer_tx_ids(&mut self, bus: &mut dyn I2cBus, addr: u8) -> Result<(), HwError> {
        let _ = (bus, addr);
        Ok(())
    }

    /// Debug register read.
    fn reg_read(&mut self, reg: u16) -> Result<u8, HwError>;

    /// Debug register write.
    fn reg_write(&mut self, reg: u16, val: u8) -> Result<(), HwError>;
}

/// Chip operations of a serializer backend.
pub trait SerOps {
    /// Chip capabilities.
    fn caps(&self) -> &SerCaps;

    /// One-time chip initialization.
    fn init(&mut self) -> Result<(), HwError>;

    /// Hook after bring-up completes.
    fn post_init(&mut self) -> Result<(), HwError>;

    /// Chip-wide output enable.
    fn set_enable(&mut self, enable: bool) -> Result<(), HwError>;

    /// Programs one input PHY's bus configuration.
    fn init_phy(&mut self, phy: &Phy) -> Result<(), HwError>;

    /// Marks one input PHY as carrying traffic.
    fn set_phy_active(&mut self, phy: usize, active: bool) -> Result<(), HwError>;

    /// Programs one pipe's static configuration.
    fn init_pipe(&mut self, pipe: usize) -> Result<(), HwError>;

    /// Starts or stops one pipe.
    fn set_pipe_enable(&mut self, pipe: usize, enable: bool) -> Result<(), HwError>;

    /// Sets the stream id a pipe transmits under.
    fn set_pipe_stream_id(&mut self, pipe: usize, stream_id: u32) -> Result<(), HwError>;

    /// Pushes a pipe's virtual-channel mask.
    fn set_pipe_vcs(&mut self, pipe: usize, vcs: u16) -> Result<(), HwError>;

    /// Pushes a pipe's data-type filter list.
    fn set_pipe_dts(&mut self, pipe: usize, dts: &[DataType]) -> Result<(), HwError>;

    /// Pushes the whole address-translation table.
    fn init_i2c_xlates(&mut self, xlates: &[I2cXlate]) -> Result<(), HwError>;

    /// Debug register read.
    fn reg_read(&mut self, reg: u16) -> Result<u8, HwError>;

    /// Debug register write.
    fn reg_write(&mut self, reg: u16, val: u8) -> Result<(), HwError>;
}
