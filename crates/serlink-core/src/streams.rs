//! Stream enable/disable propagation across the component graph.
//!
//! Enabling streams on a component's source pad unions the mask on that pad,
//! fires the owning hardware enable exactly once when the component goes from
//! idle to active, translates the streams to the component's sink pads, and
//! recurses upstream through the pad links. Disabling walks the same path in
//! reverse. Crossbar components translate through their active route lists;
//! all other components pass streams straight through pad *i* to pad *i*.
//!
//! On a failure partway through an enable, everything already done is undone
//! before the error returns, so masks and hardware transitions stay balanced.

use tracing::debug;

use crate::component::{Component, ComponentId, ComponentKind, StreamMask};
use crate::error::{HwError, RoutingError};
use crate::graph::ComponentGraph;

/// Hardware transitions fired by stream propagation.
///
/// `toggle` is called exactly once when a component's aggregate enabled mask
/// goes empty to non-empty (`enable == true`) or back (`enable == false`).
/// Crossbar kinds are never passed here.
pub trait HwToggle {
    /// Enables or disables the hardware behind one component.
    fn toggle(&mut self, kind: ComponentKind, enable: bool) -> Result<(), HwError>;
}

fn translate_to_sink(
    comp: &Component,
    id: ComponentId,
    source_pad: u32,
    stream: u32,
) -> Result<(u32, u32), RoutingError> {
    if matches!(comp.kind, ComponentKind::Crossbar(_)) {
        let route =
            comp.route_from_source(source_pad, stream)
                .ok_or(RoutingError::RouteNotFound {
                    component: id,
                    pad: source_pad,
                    stream,
                })?;
        return Ok((route.sink_pad, route.sink_stream));
    }
    // Pass-through components carry every stream on matching pad indices.
    let rel = source_pad - comp.source_pads().start;
    if rel < comp.sink_pads().len() as u32 {
        Ok((comp.sink_pads().start + rel, stream))
    } else {
        Err(RoutingError::RouteNotFound {
            component: id,
            pad: source_pad,
            stream,
        })
    }
}

fn sink_masks_for(
    comp: &Component,
    id: ComponentId,
    source_pad: u32,
    bits: StreamMask,
) -> Result<Vec<(u32, StreamMask)>, RoutingError> {
    let mut masks: Vec<(u32, StreamMask)> = Vec::new();
    for stream in 0..StreamMask::BITS {
        if bits & (1 << stream) == 0 {
            continue;
        }
        let (sink_pad, sink_stream) = translate_to_sink(comp, id, source_pad, stream)?;
        match masks.iter_mut().find(|(p, _)| *p == sink_pad) {
            Some((_, m)) => *m |= 1 << sink_stream,
            None => masks.push((sink_pad, 1 << sink_stream)),
        }
    }
    Ok(masks)
}

/// Enables `mask` on a component's source pad and propagates upstream.
///
/// Already-enabled bits are ignored, so repeated calls are idempotent. On any
/// failure the masks and hardware transitions applied so far are reverted and
/// the error returns with the graph in its prior state.
pub fn enable_streams(
    graph: &mut ComponentGraph,
    id: ComponentId,
    source_pad: u32,
    mask: StreamMask,
    hw: &mut dyn HwToggle,
) -> Result<(), RoutingError> {
    let comp = graph
        .component(id)
        .ok_or(RoutingError::UnknownComponent(id))?;
    let new_bits = mask & !comp.enabled_streams(source_pad);
    if new_bits == 0 {
        return Ok(());
    }
    let kind = comp.kind;
    let name = comp.name.clone();
    let was_active = comp.any_enabled();
    let sink_masks = sink_masks_for(comp, id, source_pad, new_bits)?;

    debug!(component = %name, source_pad, mask = new_bits, "enabling streams");

    let comp = graph
        .component_mut(id)
        .ok_or(RoutingError::UnknownComponent(id))?;
    comp.set_enabled_streams(source_pad, new_bits, true);
    for &(sink_pad, sink_mask) in &sink_masks {
        comp.set_enabled_streams(sink_pad, sink_mask, true);
    }

    let mut undo_local = |graph: &mut ComponentGraph| {
        if let Some(comp) = graph.component_mut(id) {
            comp.set_enabled_streams(source_pad, new_bits, false);
            for &(sink_pad, sink_mask) in &sink_masks {
                comp.set_enabled_streams(sink_pad, sink_mask, false);
            }
        }
    };

    let toggled = !was_active && !matches!(kind, ComponentKind::Crossbar(_));
    if toggled {
        if let Err(err) = hw.toggle(kind, true) {
            undo_local(graph);
            return Err(err.into());
        }
    }

    for (done, &(sink_pad, sink_mask)) in sink_masks.iter().enumerate() {
        let Some((up_id, up_pad)) = graph.remote_source(id, sink_pad) else {
            continue;
        };
        if let Err(err) = enable_streams(graph, up_id, up_pad, sink_mask, hw) {
            // Unwind the upstream enables that already succeeded.
            for &(prev_pad, prev_mask) in &sink_masks[..done] {
                if let Some((prev_id, prev_up_pad)) = graph.remote_source(id, prev_pad) {
                    let _ = disable_streams(graph, prev_id, prev_up_pad, prev_mask, hw);
                }
            }
            undo_local(graph);
            if toggled {
                let _ = hw.toggle(kind, false);
            }
            return Err(err);
        }
    }

    Ok(())
}

/// Disables `mask` on a component's source pad and propagates upstream.
///
/// Bits that are not enabled are ignored. Hardware disable failures do not
/// stop the walk; the first error is returned after the propagation finishes,
/// leaving the masks fully cleared either way.
pub fn disable_streams(
    graph: &mut ComponentGraph,
    id: ComponentId,
    source_pad: u32,
    mask: StreamMask,
    hw: &mut dyn HwToggle,
) -> Result<(), RoutingError> {
    let comp = graph
        .component(id)
        .ok_or(RoutingError::UnknownComponent(id))?;
    let bits = mask & comp.enabled_streams(source_pad);
    if bits == 0 {
        return Ok(());
    }
    let kind = comp.kind;
    let name = comp.name.clone();
    let sink_masks = sink_masks_for(comp, id, source_pad, bits)?;

    debug!(component = %name, source_pad, mask = bits, "disabling streams");

    let mut first_err: Option<RoutingError> = None;

    for &(sink_pad, sink_mask) in &sink_masks {
        if let Some((up_id, up_pad)) = graph.remote_source(id, sink_pad) {
            if let Err(err) = disable_streams(graph, up_id, up_pad, sink_mask, hw) {
                first_err.get_or_insert(err);
            }
        }
    }

    let comp = graph
        .component_mut(id)
        .ok_or(RoutingError::UnknownComponent(id))?;
    comp.set_enabled_streams(source_pad, bits, false);
    for &(sink_pad, sink_mask) in &sink_masks {
        comp.set_enabled_streams(sink_pad, sink_mask, false);
    }
    let now_idle = !comp.any_enabled();

    if now_idle && !matches!(kind, ComponentKind::Crossbar(_)) {
        if let Err(err) = hw.toggle(kind, false) {
            first_err.get_or_insert(err.into());
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
