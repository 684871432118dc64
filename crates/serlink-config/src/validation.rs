//! Topology validation.
//!
//! Structural checks that do not need chip capabilities: virtual-channel
//! ranges, I2C address ranges, duplicate channel definitions, and attach
//! address pairs. Capability-dependent checks (index ranges, table bounds)
//! happen when the converted configuration is handed to the core crate.

use thiserror::Error;

use crate::topology::Topology;

/// Virtual channels available on the serial bus.
const NUM_VCS: u8 = 4;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Virtual channel out of range.
    #[error("channel {channel}: virtual channel {vc} out of range (0..{NUM_VCS})")]
    VcOutOfRange {
        /// Index of the offending channel.
        channel: usize,
        /// The out-of-range virtual channel.
        vc: u8,
    },

    /// Two channels share a pipe and link-side virtual channel.
    #[error("channels {first} and {second} both use src_vc {vc} on pipe {pipe}")]
    DuplicateChannel {
        /// First channel of the pair.
        first: usize,
        /// Second channel of the pair.
        second: usize,
        /// Shared pipe index.
        pipe: usize,
        /// Shared link-side virtual channel.
        vc: u8,
    },

    /// A serializer-side virtual channel is out of range.
    #[error(
        "serializer {serializer} channel {channel}: virtual channel {vc} out of range (0..{NUM_VCS})"
    )]
    SerVcOutOfRange {
        /// Index of the serializer section.
        serializer: usize,
        /// Index of the offending channel within it.
        channel: usize,
        /// The out-of-range virtual channel.
        vc: u8,
    },

    /// An I2C address does not fit in 7 bits or is reserved.
    #[error("link {link}: I2C address 0x{addr:02x} is not a valid 7-bit address")]
    BadAddress {
        /// Index of the offending link.
        link: usize,
        /// The invalid address.
        addr: u8,
    },

    /// A link names only one half of an attach address pair.
    #[error("link {link}: remote_power_up and remote_alias must be given together")]
    IncompleteAttachPair {
        /// Index of the offending link.
        link: usize,
    },
}

fn check_addr(link: usize, addr: u8) -> Result<(), ValidationError> {
    // 0x00-0x07 and 0x78-0x7f are reserved by the bus spec.
    if !(0x08..=0x77).contains(&addr) {
        return Err(ValidationError::BadAddress { link, addr });
    }
    Ok(())
}

/// Validates a topology's structural invariants.
pub fn validate(topology: &Topology) -> Result<(), ValidationError> {
    for (i, channel) in topology.channels.iter().enumerate() {
        if channel.src_vc >= NUM_VCS {
            return Err(ValidationError::VcOutOfRange {
                channel: i,
                vc: channel.src_vc,
            });
        }
        if let Some(dst_vc) = channel.dst_vc {
            if dst_vc >= NUM_VCS {
                return Err(ValidationError::VcOutOfRange {
                    channel: i,
                    vc: dst_vc,
                });
            }
        }
    }

    // Channels without an explicit pipe get a per-chip default later and
    // cannot collide here.
    for (i, a) in topology.channels.iter().enumerate() {
        let Some(pipe) = a.pipe else { continue };
        for (j, b) in topology.channels.iter().enumerate().skip(i + 1) {
            if b.pipe == Some(pipe) && a.src_vc == b.src_vc {
                return Err(ValidationError::DuplicateChannel {
                    first: i,
                    second: j,
                    pipe,
                    vc: a.src_vc,
                });
            }
        }
    }

    for (s, ser) in topology.serializers.iter().enumerate() {
        for (i, channel) in ser.channels.iter().enumerate() {
            if channel.vc >= NUM_VCS {
                return Err(ValidationError::SerVcOutOfRange {
                    serializer: s,
                    channel: i,
                    vc: channel.vc,
                });
            }
        }
    }

    for (i, link) in topology.links.iter().enumerate() {
        match (link.remote_power_up, link.remote_alias) {
            (Some(power_up), Some(alias)) => {
                check_addr(i, power_up)?;
                check_addr(i, alias)?;
            }
            (None, None) => {}
            _ => return Err(ValidationError::IncompleteAttachPair { link: i }),
        }
    }

    Ok(())
}
