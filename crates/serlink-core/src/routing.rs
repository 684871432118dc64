//! Route model and routing validation.
//!
//! Every component carries a route list mapping (sink pad, sink stream)
//! endpoints to (source pad, source stream) endpoints. Non-crossbar components
//! get a fixed identity routing at build time; crossbar components accept
//! caller-supplied route sets, which are validated here before any state
//! changes hands.

use crate::component::Component;
use crate::error::RoutingError;

/// One stream route through a component.
///
/// Insertion order within a component's route list is priority order: the
/// first match wins on lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    /// Absolute sink pad number.
    pub sink_pad: u32,
    /// Stream index on the sink pad.
    pub sink_stream: u32,
    /// Absolute source pad number.
    pub source_pad: u32,
    /// Stream index on the source pad.
    pub source_stream: u32,
    /// Inactive routes are kept in the list but never matched.
    pub active: bool,
}

impl Route {
    /// Creates an active route.
    pub fn new(sink_pad: u32, sink_stream: u32, source_pad: u32, source_stream: u32) -> Self {
        Self {
            sink_pad,
            sink_stream,
            source_pad,
            source_stream,
            active: true,
        }
    }
}

/// Topology restrictions a component imposes on its route set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Restrictions {
    /// Sink pad *i* may only route to source pad *i*.
    pub one_to_one_only: bool,
    /// At most one sink stream may feed each source pad.
    pub no_n_to_1: bool,
    /// All streams routed to one source pad must share a stream kind.
    pub no_stream_mix: bool,
}

/// Builds the deterministic identity routing for a component.
///
/// One active route per sink pad: relative sink pad *i* maps to relative
/// source pad *i mod num_source_pads*, stream 0 on both ends. Components with
/// no source pads get an empty route list.
pub fn init_routing(component: &mut Component) {
    let num_sources = component.source_pads().len() as u32;
    component.routes.clear();
    if num_sources == 0 {
        return;
    }
    for (i, sink_pad) in component.sink_pads().enumerate() {
        let source_pad = component.source_pad(i as u32 % num_sources);
        component.routes.push(Route::new(sink_pad, 0, source_pad, 0));
    }
}

/// Validates a candidate route set against a component's pads and
/// restrictions.
///
/// `stream_kind_of` maps a sink endpoint to an opaque kind token; when the
/// component forbids stream mixing, every active route targeting the same
/// source pad must report the same kind. Returns without mutating anything;
/// the caller commits the set only on `Ok`.
pub fn validate_routes(
    component: &Component,
    candidate: &[Route],
    mut stream_kind_of: impl FnMut(u32, u32) -> u64,
) -> Result<(), RoutingError> {
    let active = || candidate.iter().filter(|r| r.active);

    for route in active() {
        if !component.is_sink_pad(route.sink_pad) {
            return Err(RoutingError::Invalid(format!(
                "{}: pad {} is not a sink pad",
                component.name, route.sink_pad
            )));
        }
        if !component.is_source_pad(route.source_pad) {
            return Err(RoutingError::Invalid(format!(
                "{}: pad {} is not a source pad",
                component.name, route.source_pad
            )));
        }
        if route.sink_stream >= 64 || route.source_stream >= 64 {
            return Err(RoutingError::Invalid(format!(
                "{}: stream index out of range on route {} -> {}",
                component.name, route.sink_pad, route.source_pad
            )));
        }
    }

    for (i, route) in active().enumerate() {
        for other in active().skip(i + 1) {
            if route.sink_pad == other.sink_pad && route.sink_stream == other.sink_stream {
                return Err(RoutingError::Invalid(format!(
                    "{}: sink pad {} stream {} routed more than once",
                    component.name, route.sink_pad, route.sink_stream
                )));
            }
            if route.source_pad == other.source_pad && route.source_stream == other.source_stream {
                return Err(RoutingError::Invalid(format!(
                    "{}: source pad {} stream {} fed by more than one route",
                    component.name, route.source_pad, route.source_stream
                )));
            }
        }
    }

    if component.restrictions.one_to_one_only {
        for route in active() {
            let sink_rel = route.sink_pad - component.sink_pads().start;
            let source_rel = route.source_pad - component.source_pads().start;
            if sink_rel != source_rel {
                return Err(RoutingError::Invalid(format!(
                    "{}: sink pad {} may only route to its matching source pad",
                    component.name, route.sink_pad
                )));
            }
        }
    }

    if component.restrictions.no_n_to_1 {
        for (i, route) in active().enumerate() {
            for other in active().skip(i + 1) {
                if route.source_pad == other.source_pad && route.sink_pad != other.sink_pad {
                    return Err(RoutingError::Invalid(format!(
                        "{}: source pad {} fed from multiple sink pads",
                        component.name, route.source_pad
                    )));
                }
            }
        }
    }

    if component.restrictions.no_stream_mix {
        for (i, route) in active().enumerate() {
            let kind = stream_kind_of(route.sink_pad, route.sink_stream);
            for other in active().skip(i + 1) {
                if route.source_pad != other.source_pad {
                    continue;
                }
                if stream_kind_of(other.sink_pad, other.sink_stream) != kind {
                    return Err(RoutingError::Invalid(format!(
                        "{}: source pad {} mixes stream kinds",
                        component.name, route.source_pad
                    )));
                }
            }
        }
    }

    Ok(())
}
