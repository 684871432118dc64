//! Pipe remap-table computation.
//!
//! Each deserializer pipe owns a hardware table of (data type, virtual
//! channel) rewrite entries. The table is rebuilt from the channels routed
//! through the pipe: an embedded-data channel contributes one entry, a pixel
//! channel contributes three (the payload plus the frame-start and frame-end
//! marker packets, which must follow the payload to its destination virtual
//! channel). The table is bounded; computation fails before any hardware call
//! when the bound would be exceeded.

use crate::error::RoutingError;
use crate::format::{DataType, PixelFormat};

/// One hardware remap entry: rewrite (from_dt, from_vc) to (to_dt, to_vc) and
/// steer the packet to `phy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Remap {
    /// Data type matched on the link side.
    pub from_dt: DataType,
    /// Virtual channel matched on the link side.
    pub from_vc: u8,
    /// Data type emitted on the output side.
    pub to_dt: DataType,
    /// Virtual channel emitted on the output side.
    pub to_vc: u8,
    /// Destination PHY index.
    pub phy: usize,
}

/// One channel's contribution to a pipe's remap table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemapSource {
    /// Pixel format of the channel.
    pub format: PixelFormat,
    /// Virtual channel on the link side.
    pub src_vc: u8,
    /// Virtual channel on the output side.
    pub dst_vc: u8,
    /// Destination PHY index.
    pub phy: usize,
}

fn push_unique(table: &mut Vec<Remap>, entry: Remap) {
    if !table.contains(&entry) {
        table.push(entry);
    }
}

/// Builds the remap table for one pipe from the channels routed through it.
///
/// Identical entries requested by multiple channels are coalesced. The
/// resulting table must stay strictly below `max` entries or
/// [`RoutingError::TooManyRemaps`] is returned and no table is produced.
pub fn build_pipe_remaps(
    pipe: usize,
    sources: &[RemapSource],
    max: usize,
) -> Result<Vec<Remap>, RoutingError> {
    let mut table = Vec::new();
    for src in sources {
        let payload = src.format.data_type();
        push_unique(
            &mut table,
            Remap {
                from_dt: payload,
                from_vc: src.src_vc,
                to_dt: payload,
                to_vc: src.dst_vc,
                phy: src.phy,
            },
        );
        if src.format.is_embedded() {
            continue;
        }
        // Frame markers travel with the payload.
        for marker in [DataType::FrameStart, DataType::FrameEnd] {
            push_unique(
                &mut table,
                Remap {
                    from_dt: marker,
                    from_vc: src.src_vc,
                    to_dt: marker,
                    to_vc: src.dst_vc,
                    phy: src.phy,
                },
            );
        }
    }
    if table.len() >= max {
        return Err(RoutingError::TooManyRemaps {
            pipe,
            required: table.len(),
            max,
        });
    }
    Ok(table)
}
