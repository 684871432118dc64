//! I2C address-translation primitives and the remote-device handshake.
//!
//! A deserializer proxies I2C traffic to serializers on the far end of each
//! link. Because every serializer powers up at the same factory address, the
//! bridge discovers each remote one link at a time, resets it, moves it to a
//! per-link alias address, and records the alias-to-physical translation.
//! The helpers here drive one remote device over an [`I2cBus`]; the phase
//! machine and bookkeeping live in the orchestrators.

use tracing::{debug, warn};

use crate::error::{BridgeError, HwError};

/// Register probed to detect a remote device.
pub const PROBE_REG: u16 = 0x0000;
/// Register holding the remote device's own address; writing `addr << 1`
/// moves the device.
pub const ADDR_REG: u16 = 0x0000;
/// Register carrying the soft-reset bit.
pub const RESET_REG: u16 = 0x0010;
/// Soft-reset bit within [`RESET_REG`].
pub const RESET_MASK: u8 = 0x80;
/// Settle time after asserting reset.
pub const RESET_SETTLE_MS: u64 = 50;
/// Probe rounds before discovery gives up.
pub const PROBE_ATTEMPTS: u32 = 10;
/// Delay between probe rounds.
pub const PROBE_BACKOFF_MS: u64 = 100;

/// Synchronous I2C side-channel the bridge drives.
///
/// A NAK from an absent device surfaces as [`HwError::Nak`]; during discovery
/// that is an expected outcome, not a failure.
pub trait I2cBus {
    /// Reads one register of the device at `addr`.
    fn read(&mut self, addr: u8, reg: u16) -> Result<u8, HwError>;

    /// Writes one register of the device at `addr`.
    fn write(&mut self, addr: u8, reg: u16, val: u8) -> Result<(), HwError>;

    /// Read-modify-writes the masked bits of one register.
    fn update_bits(&mut self, addr: u8, reg: u16, mask: u8, val: u8) -> Result<(), HwError> {
        let cur = self.read(addr, reg)?;
        self.write(addr, reg, (cur & !mask) | (val & mask))
    }

    /// Blocks for at least `ms` milliseconds.
    fn sleep_ms(&mut self, ms: u64);
}

/// Lifecycle of one link's remote-device binding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BridgePhase {
    /// No remote device bound.
    #[default]
    Unbound,
    /// Probing the link for a remote device.
    Discovering,
    /// Remote found; soft reset issued, waiting for it to come back.
    Resetting,
    /// Remote moved to its alias address.
    Readdressed,
    /// Handshake complete; translation recorded.
    Bound,
    /// Handshake failed after the remote was found; manual recovery needed.
    Failed,
}

/// One alias-to-physical address translation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct I2cXlate {
    /// Alias address seen by the host.
    pub src: u8,
    /// Physical address of the remote device.
    pub dst: u8,
}

/// Checks whether a device answers at `addr`.
///
/// A NAK means no device; any other bus failure propagates.
pub fn probe(bus: &mut dyn I2cBus, addr: u8) -> Result<bool, HwError> {
    match bus.read(addr, PROBE_REG) {
        Ok(_) => Ok(true),
        Err(HwError::Nak { .. }) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Waits for a device to answer at any of `addrs`, with bounded retries.
///
/// Returns the address that answered. After [`PROBE_ATTEMPTS`] rounds with
/// [`PROBE_BACKOFF_MS`] between them, gives up with
/// [`BridgeError::DeviceNotFound`] naming both probed addresses.
pub fn wait_for_device(bus: &mut dyn I2cBus, addrs: &[u8]) -> Result<u8, BridgeError> {
    for attempt in 0..PROBE_ATTEMPTS {
        for &addr in addrs {
            if probe(bus, addr)? {
                debug!(addr = format_args!("0x{addr:02x}"), attempt, "remote device found");
                return Ok(addr);
            }
        }
        // No point sleeping once the last round has failed.
        if attempt + 1 < PROBE_ATTEMPTS {
            bus.sleep_ms(PROBE_BACKOFF_MS);
        }
    }
    warn!(?addrs, attempts = PROBE_ATTEMPTS, "no remote device answered");
    Err(BridgeError::DeviceNotFound {
        power_up: addrs.first().copied().unwrap_or(0),
        target: addrs.get(1).copied().unwrap_or(0),
        attempts: PROBE_ATTEMPTS,
    })
}

/// Soft-resets the device at `addr` and waits out the settle time.
pub fn reset_device(bus: &mut dyn I2cBus, addr: u8) -> Result<(), HwError> {
    debug!(addr = format_args!("0x{addr:02x}"), "resetting remote device");
    bus.update_bits(addr, RESET_REG, RESET_MASK, RESET_MASK)?;
    bus.sleep_ms(RESET_SETTLE_MS);
    Ok(())
}

/// Moves the device at `cur` to address `new`.
pub fn change_address(bus: &mut dyn I2cBus, cur: u8, new: u8) -> Result<(), HwError> {
    debug!(
        from = format_args!("0x{cur:02x}"),
        to = format_args!("0x{new:02x}"),
        "readdressing remote device"
    );
    bus.write(cur, ADDR_REG, new << 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bus with a single device that appears after a fixed number of reads.
    struct LateBus {
        addr: u8,
        reads_until_present: u32,
        slept_ms: u64,
        writes: Vec<(u8, u16, u8)>,
    }

    impl I2cBus for LateBus {
        fn read(&mut self, addr: u8, _reg: u16) -> Result<u8, HwError> {
            if addr == self.addr && self.reads_until_present == 0 {
                return Ok(0);
            }
            self.reads_until_present = self.reads_until_present.saturating_sub(1);
            Err(HwError::Nak { addr })
        }

        fn write(&mut self, addr: u8, reg: u16, val: u8) -> Result<(), HwError> {
            self.writes.push((addr, reg, val));
            Ok(())
        }

        fn sleep_ms(&mut self, ms: u64) {
            self.slept_ms += ms;
        }
    }

    #[test]
    fn wait_finds_a_slow_device() {
        let mut bus = LateBus {
            addr: 0x40,
            reads_until_present: 3,
            slept_ms: 0,
            writes: Vec::new(),
        };
        let found = wait_for_device(&mut bus, &[0x40, 0x1a]).unwrap();
        assert_eq!(found, 0x40);
        assert!(bus.slept_ms >= PROBE_BACKOFF_MS);
    }

    #[test]
    fn wait_gives_up_after_the_retry_budget() {
        let mut bus = LateBus {
            addr: 0x40,
            reads_until_present: u32::MAX,
            slept_ms: 0,
            writes: Vec::new(),
        };
        let err = wait_for_device(&mut bus, &[0x40, 0x1a]).unwrap_err();
        match err {
            BridgeError::DeviceNotFound {
                power_up,
                target,
                attempts,
            } => {
                assert_eq!(power_up, 0x40);
                assert_eq!(target, 0x1a);
                assert_eq!(attempts, PROBE_ATTEMPTS);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Backoff runs between rounds, not after the last one.
        assert_eq!(
            bus.slept_ms,
            u64::from(PROBE_ATTEMPTS - 1) * PROBE_BACKOFF_MS
        );
    }

    #[test]
    fn readdress_writes_the_shifted_address() {
        let mut bus = LateBus {
            addr: 0x40,
            reads_until_present: 0,
            slept_ms: 0,
            writes: Vec::new(),
        };
        change_address(&mut bus, 0x40, 0x1a).unwrap();
        assert_eq!(bus.writes, vec![(0x40, ADDR_REG, 0x1a << 1)]);
    }

    #[test]
    fn reset_sets_the_bit_and_settles() {
        let mut bus = LateBus {
            addr: 0x40,
            reads_until_present: 0,
            slept_ms: 0,
            writes: Vec::new(),
        };
        reset_device(&mut bus, 0x40).unwrap();
        assert_eq!(bus.writes, vec![(0x40, RESET_REG, RESET_MASK)]);
        assert_eq!(bus.slept_ms, RESET_SETTLE_MS);
    }
}
