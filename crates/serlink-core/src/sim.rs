//! In-memory hardware backends.
//!
//! [`SimDes`] and [`SimSer`] implement the hardware-ops traits against plain
//! state: every call is recorded by name, any operation can be made to fail,
//! and the pushed tables are inspectable afterwards. [`SimBus`] models the
//! I2C side channel with remote devices that physically move between
//! addresses on reset and readdress, which is what the bridge handshake needs
//! to exercise. The CLI's simulated bring-up runs on the same backends.

use std::collections::{HashMap, HashSet};

use crate::atr::{ADDR_REG, I2cBus, I2cXlate, RESET_MASK, RESET_REG};
use crate::error::HwError;
use crate::format::DataType;
use crate::hw::{DesCaps, DesOps, Phy, Pipe, SerCaps, SerOps};
use crate::remap::Remap;

/// Simulated deserializer chip.
#[derive(Debug)]
pub struct SimDes {
    caps: DesCaps,
    calls: Vec<String>,
    failures: HashSet<&'static str>,
    /// Remap tables as last pushed, per pipe.
    pub remaps: Vec<Vec<Remap>>,
    /// Link-selection mask as last pushed.
    pub link_mask: u32,
    /// Pipe enable states.
    pub pipe_enabled: Vec<bool>,
    /// PHY enable states.
    pub phy_enabled: Vec<bool>,
    /// Pipe-to-link assignments as pushed.
    pub pipe_links: Vec<usize>,
    /// Pipe stream ids as pushed.
    pub pipe_stream_ids: Vec<u32>,
    /// Pipe-to-PHY assignments as pushed (tunnel mode).
    pub pipe_phys: Vec<usize>,
    /// Chip-wide enable.
    pub enabled: bool,
    regs: HashMap<u16, u8>,
}

impl SimDes {
    /// Creates a simulated chip with the given capabilities.
    pub fn new(caps: DesCaps) -> Self {
        Self {
            calls: Vec::new(),
            failures: HashSet::new(),
            remaps: vec![Vec::new(); caps.num_pipes],
            link_mask: 0,
            pipe_enabled: vec![false; caps.num_pipes],
            phy_enabled: vec![false; caps.num_phys],
            pipe_links: vec![0; caps.num_pipes],
            pipe_stream_ids: vec![0; caps.num_pipes],
            pipe_phys: vec![0; caps.num_pipes],
            enabled: false,
            regs: HashMap::new(),
            caps,
        }
    }

    /// Makes every future call of `op` fail.
    pub fn fail_on(&mut self, op: &'static str) {
        self.failures.insert(op);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    /// Calls recorded so far, in order.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Number of recorded calls of `op`.
    pub fn count_calls(&self, op: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| c.split('(').next() == Some(op))
            .count()
    }

    fn record(&mut self, op: &'static str, args: String) -> Result<(), HwError> {
        self.calls.push(format!("{op}({args})"));
        if self.failures.contains(op) {
            return Err(HwError::op(op, "injected failure"));
        }
        Ok(())
    }
}

impl DesOps for SimDes {
    fn caps(&self) -> &DesCaps {
        &self.caps
    }

    fn init(&mut self) -> Result<(), HwError> {
        self.record("init", String::new())
    }

    fn post_init(&mut self) -> Result<(), HwError> {
        self.record("post_init", String::new())
    }

    fn set_enable(&mut self, enable: bool) -> Result<(), HwError> {
        self.record("set_enable", format!("{enable}"))?;
        self.enabled = enable;
        Ok(())
    }

    fn init_phy(&mut self, phy: &Phy) -> Result<(), HwError> {
        self.record("init_phy", format!("{}", phy.index))
    }

    fn set_phy_enable(&mut self, phy: usize, enable: bool) -> Result<(), HwError> {
        self.record("set_phy_enable", format!("{phy}, {enable}"))?;
        if let Some(slot) = self.phy_enabled.get_mut(phy) {
            *slot = enable;
        }
        Ok(())
    }

    fn init_pipe(&mut self, pipe: &Pipe) -> Result<(), HwError> {
        self.record("init_pipe", format!("{}", pipe.index))
    }

    fn set_pipe_enable(&mut self, pipe: usize, enable: bool) -> Result<(), HwError> {
        self.record("set_pipe_enable", format!("{pipe}, {enable}"))?;
        if let Some(slot) = self.pipe_enabled.get_mut(pipe) {
            *slot = enable;
        }
        Ok(())
    }

    fn set_pipe_stream_id(&mut self, pipe: usize, stream_id: u32) -> Result<(), HwError> {
        self.record("set_pipe_stream_id", format!("{pipe}, {stream_id}"))?;
        if let Some(slot) = self.pipe_stream_ids.get_mut(pipe) {
            *slot = stream_id;
        }
        Ok(())
    }

    fn set_pipe_link(&mut self, pipe: usize, link: usize) -> Result<(), HwError> {
        self.record("set_pipe_link", format!("{pipe}, {link}"))?;
        if let Some(slot) = self.pipe_links.get_mut(pipe) {
            *slot = link;
        }
        Ok(())
    }

    fn set_pipe_phy(&mut self, pipe: usize, phy: usize) -> Result<(), HwError> {
        self.record("set_pipe_phy", format!("{pipe}, {phy}"))?;
        if let Some(slot) = self.pipe_phys.get_mut(pipe) {
            *slot = phy;
        }
        Ok(())
    }

    fn set_pipe_remaps(&mut self, pipe: usize, remaps: &[Remap]) -> Result<(), HwError> {
        self.record("set_pipe_remaps", format!("{pipe}, {}", remaps.len()))?;
        if let Some(slot) = self.remaps.get_mut(pipe) {
            *slot = remaps.to_vec();
        }
        Ok(())
    }

    fn select_links(&mut self, mask: u32) -> Result<(), HwError> {
        self.record("select_links", format!("0b{mask:b}"))?;
        self.link_mask = mask;
        Ok(())
    }

    fn fix_peer_tx_ids(&mut self, bus: &mut dyn I2cBus, addr: u8) -> Result<(), HwError> {
        self.record("fix_peer_tx_ids", format!("0x{addr:02x}"))?;
        if !self.caps.needs_peer_tx_id_fixup {
            return Ok(());
        }
        // Stream-id registers that power up with stale values on some parts.
        for reg in [0x7b, 0x83, 0x8b, 0x93, 0xa3, 0xab] {
            bus.write(addr, reg, 0)?;
        }
        Ok(())
    }

    fn reg_read(&mut self, reg: u16) -> Result<u8, HwError> {
        self.record("reg_read", format!("0x{reg:04x}"))?;
        Ok(self.regs.get(&reg).copied().unwrap_or(0))
    }

    fn reg_write(&mut self, reg: u16, val: u8) -> Result<(), HwError> {
        self.record("reg_write", format!("0x{reg:04x}, 0x{val:02x}"))?;
        self.regs.insert(reg, val);
        Ok(())
    }
}

/// Simulated serializer chip.
#[derive(Debug)]
pub struct SimSer {
    caps: SerCaps,
    calls: Vec<String>,
    failures: HashSet<&'static str>,
    /// Translation table as last pushed.
    pub xlates: Vec<I2cXlate>,
    /// Per-pipe virtual-channel masks as pushed.
    pub pipe_vcs: Vec<u16>,
    /// Per-pipe data-type filter lists as pushed.
    pub pipe_dts: Vec<Vec<DataType>>,
    /// Input-PHY active states.
    pub phy_active: Vec<bool>,
    /// Pipe enable states.
    pub pipe_enabled: Vec<bool>,
    /// Chip-wide enable.
    pub enabled: bool,
    regs: HashMap<u16, u8>,
}

impl SimSer {
    /// Creates a simulated chip with the given capabilities.
    pub fn new(caps: SerCaps) -> Self {
        Self {
            calls: Vec::new(),
            failures: HashSet::new(),
            xlates: Vec::new(),
            pipe_vcs: vec![0; caps.num_pipes],
            pipe_dts: vec![Vec::new(); caps.num_pipes],
            phy_active: vec![false; caps.num_phys],
            pipe_enabled: vec![false; caps.num_pipes],
            enabled: false,
            regs: HashMap::new(),
            caps,
        }
    }

    /// Makes every future call of `op` fail.
    pub fn fail_on(&mut self, op: &'static str) {
        self.failures.insert(op);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    /// Calls recorded so far, in order.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Number of recorded calls of `op`.
    pub fn count_calls(&self, op: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| c.split('(').next() == Some(op))
            .count()
    }

    fn record(&mut self, op: &'static str, args: String) -> Result<(), HwError> {
        self.calls.push(format!("{op}({args})"));
        if self.failures.contains(op) {
            return Err(HwError::op(op, "injected failure"));
        }
        Ok(())
    }
}

impl SerOps for SimSer {
    fn caps(&self) -> &SerCaps {
        &self.caps
    }

    fn init(&mut self) -> Result<(), HwError> {
        self.record("init", String::new())
    }

    fn post_init(&mut self) -> Result<(), HwError> {
        self.record("post_init", String::new())
    }

    fn set_enable(&mut self, enable: bool) -> Result<(), HwError> {
        self.record("set_enable", format!("{enable}"))?;
        self.enabled = enable;
        Ok(())
    }

    fn init_phy(&mut self, phy: &Phy) -> Result<(), HwError> {
        self.record("init_phy", format!("{}", phy.index))
    }

    fn set_phy_active(&mut self, phy: usize, active: bool) -> Result<(), HwError> {
        self.record("set_phy_active", format!("{phy}, {active}"))?;
        if let Some(slot) = self.phy_active.get_mut(phy) {
            *slot = active;
        }
        Ok(())
    }

    fn init_pipe(&mut self, pipe: usize) -> Result<(), HwError> {
        self.record("init_pipe", format!("{pipe}"))
    }

    fn set_pipe_enable(&mut self, pipe: usize, enable: bool) -> Result<(), HwError> {
        self.record("set_pipe_enable", format!("{pipe}, {enable}"))?;
        if let Some(slot) = self.pipe_enabled.get_mut(pipe) {
            *slot = enable;
        }
        Ok(())
    }

    fn set_pipe_stream_id(&mut self, pipe: usize, stream_id: u32) -> Result<(), HwError> {
        self.record("set_pipe_stream_id", format!("{pipe}, {stream_id}"))
    }

    fn set_pipe_vcs(&mut self, pipe: usize, vcs: u16) -> Result<(), HwError> {
        self.record("set_pipe_vcs", format!("{pipe}, 0b{vcs:b}"))?;
        if let Some(slot) = self.pipe_vcs.get_mut(pipe) {
            *slot = vcs;
        }
        Ok(())
    }

    fn set_pipe_dts(&mut self, pipe: usize, dts: &[DataType]) -> Result<(), HwError> {
        self.record("set_pipe_dts", format!("{pipe}, {}", dts.len()))?;
        if let Some(slot) = self.pipe_dts.get_mut(pipe) {
            *slot = dts.to_vec();
        }
        Ok(())
    }

    fn init_i2c_xlates(&mut self, xlates: &[I2cXlate]) -> Result<(), HwError> {
        self.record("init_i2c_xlates", format!("{}", xlates.len()))?;
        self.xlates = xlates.to_vec();
        Ok(())
    }

    fn reg_read(&mut self, reg: u16) -> Result<u8, HwError> {
        self.record("reg_read", format!("0x{reg:04x}"))?;
        Ok(self.regs.get(&reg).copied().unwrap_or(0))
    }

    fn reg_write(&mut self, reg: u16, val: u8) -> Result<(), HwError> {
        self.record("reg_write", format!("0x{reg:04x}, 0x{val:02x}"))?;
        self.regs.insert(reg, val);
        Ok(())
    }
}

#[derive(Debug)]
struct SimDevice {
    power_up: u8,
    regs: HashMap<u16, u8>,
}

/// Simulated I2C side channel with movable remote devices.
///
/// A device answers only at its current address. Writing the reset bit sends
/// it back to its power-up address; writing a shifted address to the address
/// register moves it there. Both model what a real remote serializer does.
#[derive(Debug, Default)]
pub struct SimBus {
    devices: HashMap<u8, SimDevice>,
    /// Total simulated sleep time.
    pub slept_ms: u64,
    /// Every (addr, reg, val) write, in order.
    pub writes: Vec<(u8, u16, u8)>,
}

impl SimBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a remote device sitting at its power-up address.
    pub fn add_device(&mut self, power_up: u8) {
        self.devices.insert(
            power_up,
            SimDevice {
                power_up,
                regs: HashMap::new(),
            },
        );
    }

    /// Removes the device at `addr`, if any.
    pub fn remove_device(&mut self, addr: u8) {
        self.devices.remove(&addr);
    }

    /// Whether a device currently answers at `addr`.
    pub fn has_device_at(&self, addr: u8) -> bool {
        self.devices.contains_key(&addr)
    }

    fn move_device(&mut self, from: u8, to: u8) {
        if from == to {
            return;
        }
        if let Some(dev) = self.devices.remove(&from) {
            self.devices.insert(to, dev);
        }
    }
}

impl I2cBus for SimBus {
    fn read(&mut self, addr: u8, reg: u16) -> Result<u8, HwError> {
        match self.devices.get(&addr) {
            Some(dev) => Ok(dev.regs.get(&reg).copied().unwrap_or(0)),
            None => Err(HwError::Nak { addr }),
        }
    }

    fn write(&mut self, addr: u8, reg: u16, val: u8) -> Result<(), HwError> {
        if !self.devices.contains_key(&addr) {
            return Err(HwError::Nak { addr });
        }
        self.writes.push((addr, reg, val));
        if reg == RESET_REG && val & RESET_MASK != 0 {
            let power_up = match self.devices.get_mut(&addr) {
                Some(dev) => {
                    dev.regs.clear();
                    dev.power_up
                }
                None => return Ok(()),
            };
            self.move_device(addr, power_up);
            return Ok(());
        }
        if let Some(dev) = self.devices.get_mut(&addr) {
            dev.regs.insert(reg, val);
        }
        if reg == ADDR_REG {
            self.move_device(addr, val >> 1);
        }
        Ok(())
    }

    fn sleep_ms(&mut self, ms: u64) {
        self.slept_ms += ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atr;

    #[test]
    fn des_records_calls_and_injects_failures() {
        let mut des = SimDes::new(DesCaps::default());
        des.set_pipe_stream_id(1, 3).unwrap();
        assert_eq!(des.pipe_stream_ids[1], 3);
        des.fail_on("select_links");
        assert!(des.select_links(0b11).is_err());
        assert_eq!(des.count_calls("select_links"), 1);
        des.clear_failures();
        des.select_links(0b01).unwrap();
        assert_eq!(des.link_mask, 0b01);
    }

    #[test]
    fn bus_device_moves_on_readdress_and_returns_on_reset() {
        let mut bus = SimBus::new();
        bus.add_device(0x40);
        assert!(atr::probe(&mut bus, 0x40).unwrap());
        assert!(!atr::probe(&mut bus, 0x1a).unwrap());

        atr::change_address(&mut bus, 0x40, 0x1a).unwrap();
        assert!(!bus.has_device_at(0x40));
        assert!(bus.has_device_at(0x1a));

        atr::reset_device(&mut bus, 0x1a).unwrap();
        assert!(bus.has_device_at(0x40));
        assert!(!bus.has_device_at(0x1a));
        assert_eq!(bus.slept_ms, atr::RESET_SETTLE_MS);
    }

    #[test]
    fn ser_tracks_pushed_tables() {
        let mut ser = SimSer::new(SerCaps::default());
        ser.set_pipe_vcs(0, 0b0101).unwrap();
        assert_eq!(ser.pipe_vcs[0], 0b0101);
        ser.init_i2c_xlates(&[I2cXlate {
            src: 0x1a,
            dst: 0x40,
        }])
        .unwrap();
        assert_eq!(ser.xlates.len(), 1);
    }
}
