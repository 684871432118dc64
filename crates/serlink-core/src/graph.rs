//! Component graph: arena of components plus static pad links.
//!
//! The graph owns every component of one chip and the fixed wiring between
//! their pads. Components are addressed by [`ComponentId`]; pad links always
//! run from a source pad of one component to a sink pad of another, matching
//! the direction of data flow.

use tracing::debug;

use crate::component::{Component, ComponentId};
use crate::error::RoutingError;

/// Static connection between a source pad and a sink pad of two components.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PadLink {
    /// Upstream endpoint (data producer side).
    pub source: (ComponentId, u32),
    /// Downstream endpoint (data consumer side).
    pub sink: (ComponentId, u32),
}

/// Arena of components and the pad links wiring them together.
#[derive(Debug, Default)]
pub struct ComponentGraph {
    components: Vec<Component>,
    pad_links: Vec<PadLink>,
}

impl ComponentGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component and returns its id.
    pub fn add(&mut self, component: Component) -> ComponentId {
        let id = ComponentId(self.components.len() as u32);
        debug!(id = %id, name = %component.name, "adding component");
        self.components.push(component);
        id
    }

    /// Connects a source pad to a sink pad.
    ///
    /// Pad directions are checked against both components.
    pub fn connect(
        &mut self,
        source: ComponentId,
        source_pad: u32,
        sink: ComponentId,
        sink_pad: u32,
    ) -> Result<(), RoutingError> {
        let src = self
            .component(source)
            .ok_or(RoutingError::UnknownComponent(source))?;
        let snk = self
            .component(sink)
            .ok_or(RoutingError::UnknownComponent(sink))?;
        if !src.is_source_pad(source_pad) {
            return Err(RoutingError::Invalid(format!(
                "{}: pad {} is not a source pad",
                src.name, source_pad
            )));
        }
        if !snk.is_sink_pad(sink_pad) {
            return Err(RoutingError::Invalid(format!(
                "{}: pad {} is not a sink pad",
                snk.name, sink_pad
            )));
        }
        debug!(
            source = %src.name,
            source_pad,
            sink = %snk.name,
            sink_pad,
            "connecting pads"
        );
        self.pad_links.push(PadLink {
            source: (source, source_pad),
            sink: (sink, sink_pad),
        });
        Ok(())
    }

    /// Looks up a component.
    #[inline]
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.0 as usize)
    }

    /// Looks up a component mutably.
    #[inline]
    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(id.0 as usize)
    }

    /// Number of components.
    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the graph holds no components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Iterates over all components with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &Component)> {
        self.components
            .iter()
            .enumerate()
            .map(|(i, c)| (ComponentId(i as u32), c))
    }

    /// Upstream endpoint wired to a sink pad, if any.
    ///
    /// Sink pads at the chip boundary have no upstream endpoint; that is not
    /// an error.
    pub fn remote_source(&self, sink: ComponentId, sink_pad: u32) -> Option<(ComponentId, u32)> {
        self.pad_links
            .iter()
            .find(|l| l.sink == (sink, sink_pad))
            .map(|l| l.source)
    }

    /// Downstream endpoint wired to a source pad, if any.
    pub fn remote_sink(&self, source: ComponentId, source_pad: u32) -> Option<(ComponentId, u32)> {
        self.pad_links
            .iter()
            .find(|l| l.source == (source, source_pad))
            .map(|l| l.sink)
    }
}
