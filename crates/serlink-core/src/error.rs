//! Error types for routing, remap, and bridge operations.

use thiserror::Error;

use crate::component::ComponentId;

/// Errors from hardware register or bus access.
///
/// These are propagated verbatim: they abort the in-progress operation but are
/// never fatal to the device as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HwError {
    /// The device did not acknowledge a transfer at the given address.
    #[error("no acknowledge from device at 0x{addr:02x}")]
    Nak {
        /// 7-bit device address that failed to respond.
        addr: u8,
    },
    /// A chip operation failed.
    #[error("hardware op '{op}' failed: {reason}")]
    Op {
        /// Name of the failed operation.
        op: &'static str,
        /// Backend-specific failure description.
        reason: String,
    },
}

impl HwError {
    /// Creates an operation-failure error.
    pub fn op(op: &'static str, reason: impl Into<String>) -> Self {
        HwError::Op {
            op,
            reason: reason.into(),
        }
    }
}

/// Errors from routing, remap computation, and stream enable propagation.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// A topology restriction was violated. The previous route set is
    /// unchanged; the caller may retry with a corrected set.
    #[error("invalid routing: {0}")]
    Invalid(String),

    /// The remap table a route set requires exceeds the hardware capacity.
    /// The old table is retained; the caller must reduce streams per pipe.
    #[error("pipe {pipe} needs {required} remap entries, hardware supports {max}")]
    TooManyRemaps {
        /// Pipe whose table overflowed.
        pipe: usize,
        /// Entries the active routes require.
        required: usize,
        /// Hardware limit per pipe.
        max: usize,
    },

    /// A stream enable/disable was requested on a (pad, stream) with no
    /// active route. Propagation never silently drops a stream.
    #[error("component {component} has no active route for pad {pad} stream {stream}")]
    RouteNotFound {
        /// Component the request was made on.
        component: ComponentId,
        /// Requested pad index.
        pad: u32,
        /// Requested stream index.
        stream: u32,
    },

    /// Routing cannot change while streams are enabled on the component.
    #[error("component {0} has enabled streams, routing is busy")]
    Busy(ComponentId),

    /// A referenced component does not exist.
    #[error("unknown component {0}")]
    UnknownComponent(ComponentId),

    /// A hardware operation failed mid-commit; in-memory state was rolled
    /// back to match the hardware.
    #[error(transparent)]
    Hw(#[from] HwError),
}

/// Errors from the I2C address-translation bridge handshake.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The referenced link does not exist or is not enabled.
    #[error("link {0} does not exist or is disabled")]
    UnknownLink(usize),

    /// Discovery exhausted its retry budget without a response. The link is
    /// left unbound; a later attach may retry.
    #[error(
        "no device found at 0x{power_up:02x} or 0x{target:02x} after {attempts} probe attempts"
    )]
    DeviceNotFound {
        /// Factory power-up address probed.
        power_up: u8,
        /// Previously-assigned address probed.
        target: u8,
        /// Number of probe rounds performed.
        attempts: u32,
    },

    /// The device did not reappear at its power-up address after reset.
    #[error("device did not return to 0x{power_up:02x} after reset")]
    ResetLost {
        /// Expected post-reset address.
        power_up: u8,
    },

    /// The link already has a bound translation; detach first.
    #[error("link {0} already has a bound device")]
    AlreadyBound(usize),

    /// The alias translation table is full.
    #[error("i2c translation table is full ({0} entries)")]
    XlateTableFull(usize),

    /// A bus or chip operation failed during the handshake.
    #[error(transparent)]
    Hw(#[from] HwError),
}
