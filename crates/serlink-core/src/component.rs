//! Component and pad model.
//!
//! A component is one node of a chip's internal topology: a PHY, a pipe, a
//! link, or a crossbar between two of those groups. Each component exposes a
//! contiguous run of sink pads and a contiguous run of source pads, and tracks
//! a per-pad bitmask of currently-enabled logical streams. Crossbar components
//! additionally own a route list describing how sink streams map to source
//! streams; see [`crate::routing`].

use core::fmt;
use core::ops::Range;

use crate::routing::{Restrictions, Route};

/// Bitmask of logical streams on one pad.
pub type StreamMask = u64;

/// Identifier of a component inside a [`crate::graph::ComponentGraph`].
///
/// Ids are assigned sequentially at graph-build time and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

/// The hardware object a component fronts.
///
/// The variant decides which hardware enable/disable call fires on the
/// component's first-enable/last-disable transition; crossbars are pure
/// routing fabric with no hardware of their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentKind {
    /// A physical lane interface, by PHY index.
    Phy(usize),
    /// A stream-remapping pipe, by pipe index.
    Pipe(usize),
    /// A serialized channel, by link index.
    Link(usize),
    /// A routing crossbar between two pad groups.
    Crossbar(CrossbarKind),
}

/// Which of a chip's crossbars a component is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrossbarKind {
    /// Deserializer: link streams in, pipes out.
    LinkPipe,
    /// Deserializer: pipes in, PHYs out.
    PipePhy,
    /// Serializer: PHYs in, pipes out.
    PhyPipe,
    /// Serializer: pipes in, link out.
    PipeLink,
}

/// One node of the chip topology.
#[derive(Debug)]
pub struct Component {
    /// Human-readable name, used in status dumps and errors.
    pub name: String,
    /// Instance index within its kind (e.g. pipe 2).
    pub index: u32,
    /// Hardware object this component fronts.
    pub kind: ComponentKind,

    num_sink_pads: u32,
    num_source_pads: u32,
    sink_pads_start: u32,
    source_pads_start: u32,

    /// Per-pad enabled-stream masks, indexed by absolute pad number.
    pads_enabled_streams: Vec<StreamMask>,

    /// Topology restrictions enforced when routing this component.
    pub restrictions: Restrictions,

    /// Active route list (crossbars only; empty otherwise until routed).
    pub routes: Vec<Route>,
}

impl Component {
    /// Creates a component with source pads numbered before sink pads.
    pub fn new(
        kind: ComponentKind,
        name: impl Into<String>,
        index: u32,
        num_sink_pads: u32,
        num_source_pads: u32,
        restrictions: Restrictions,
    ) -> Self {
        Self::with_pad_order(
            kind,
            name,
            index,
            num_sink_pads,
            num_source_pads,
            restrictions,
            false,
        )
    }

    /// Creates a component, choosing whether sink pads are numbered first.
    pub fn with_pad_order(
        kind: ComponentKind,
        name: impl Into<String>,
        index: u32,
        num_sink_pads: u32,
        num_source_pads: u32,
        restrictions: Restrictions,
        sink_pads_first: bool,
    ) -> Self {
        let (sink_pads_start, source_pads_start) = if sink_pads_first {
            (0, num_sink_pads)
        } else {
            (num_source_pads, 0)
        };
        let num_pads = (num_sink_pads + num_source_pads) as usize;
        Self {
            name: name.into(),
            index,
            kind,
            num_sink_pads,
            num_source_pads,
            sink_pads_start,
            source_pads_start,
            pads_enabled_streams: vec![0; num_pads],
            restrictions,
            routes: Vec::new(),
        }
    }

    /// Total number of pads.
    #[inline]
    pub fn num_pads(&self) -> u32 {
        self.num_sink_pads + self.num_source_pads
    }

    /// Absolute pad numbers of the sink pads.
    #[inline]
    pub fn sink_pads(&self) -> Range<u32> {
        self.sink_pads_start..self.sink_pads_start + self.num_sink_pads
    }

    /// Absolute pad numbers of the source pads.
    #[inline]
    pub fn source_pads(&self) -> Range<u32> {
        self.source_pads_start..self.source_pads_start + self.num_source_pads
    }

    /// Whether `pad` is a sink pad.
    #[inline]
    pub fn is_sink_pad(&self, pad: u32) -> bool {
        self.sink_pads().contains(&pad)
    }

    /// Whether `pad` is a source pad.
    #[inline]
    pub fn is_source_pad(&self, pad: u32) -> bool {
        self.source_pads().contains(&pad)
    }

    /// Absolute pad number of the `n`-th sink pad.
    #[inline]
    pub fn sink_pad(&self, n: u32) -> u32 {
        debug_assert!(n < self.num_sink_pads);
        self.sink_pads_start + n
    }

    /// Absolute pad number of the `n`-th source pad.
    #[inline]
    pub fn source_pad(&self, n: u32) -> u32 {
        debug_assert!(n < self.num_source_pads);
        self.source_pads_start + n
    }

    /// Currently-enabled stream mask on a pad.
    #[inline]
    pub fn enabled_streams(&self, pad: u32) -> StreamMask {
        self.pads_enabled_streams
            .get(pad as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Unions (`enable`) or removes (`!enable`) `mask` on a pad.
    ///
    /// Returns the pad's resulting mask.
    pub fn set_enabled_streams(&mut self, pad: u32, mask: StreamMask, enable: bool) -> StreamMask {
        let Some(slot) = self.pads_enabled_streams.get_mut(pad as usize) else {
            return 0;
        };
        if enable {
            *slot |= mask;
        } else {
            *slot &= !mask;
        }
        *slot
    }

    /// Whether any stream is enabled on any pad.
    pub fn any_enabled(&self) -> bool {
        self.pads_enabled_streams.iter().any(|&m| m != 0)
    }

    /// Active route whose source endpoint is (`pad`, `stream`), if any.
    pub fn route_from_source(&self, pad: u32, stream: u32) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.active && r.source_pad == pad && r.source_stream == stream)
    }

    /// Active route whose sink endpoint is (`pad`, `stream`), if any.
    pub fn route_from_sink(&self, pad: u32, stream: u32) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.active && r.sink_pad == pad && r.sink_stream == stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Restrictions;

    fn xbar(sinks: u32, sources: u32) -> Component {
        Component::new(
            ComponentKind::Crossbar(CrossbarKind::LinkPipe),
            "xbar",
            0,
            sinks,
            sources,
            Restrictions::default(),
        )
    }

    #[test]
    fn source_pads_come_first_by_default() {
        let comp = xbar(2, 3);
        assert_eq!(comp.source_pads(), 0..3);
        assert_eq!(comp.sink_pads(), 3..5);
        assert!(comp.is_source_pad(0));
        assert!(comp.is_sink_pad(4));
        assert!(!comp.is_sink_pad(2));
    }

    #[test]
    fn sink_pads_first_flips_the_ranges() {
        let comp = Component::with_pad_order(
            ComponentKind::Link(0),
            "link",
            0,
            1,
            4,
            Restrictions::default(),
            true,
        );
        assert_eq!(comp.sink_pads(), 0..1);
        assert_eq!(comp.source_pads(), 1..5);
    }

    #[test]
    fn enabled_stream_masks_union_and_clear() {
        let mut comp = xbar(1, 1);
        assert_eq!(comp.set_enabled_streams(0, 0b01, true), 0b01);
        assert_eq!(comp.set_enabled_streams(0, 0b10, true), 0b11);
        assert!(comp.any_enabled());
        assert_eq!(comp.set_enabled_streams(0, 0b01, false), 0b10);
        assert_eq!(comp.set_enabled_streams(0, 0b10, false), 0);
        assert!(!comp.any_enabled());
    }

    #[test]
    fn out_of_range_pad_reads_as_empty() {
        let mut comp = xbar(1, 1);
        assert_eq!(comp.enabled_streams(9), 0);
        assert_eq!(comp.set_enabled_streams(9, 0b1, true), 0);
    }
}
