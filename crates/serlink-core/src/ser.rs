//! Serializer orchestrator.
//!
//! The mirror of [`crate::des::Deserializer`] for the camera side of a link:
//! sensor streams enter on input PHYs, are filtered into pipes by virtual
//! channel and data type, and leave on the single serial link. The
//! serializer also owns the bounded alias translation table its deserializer
//! programs during the attach handshake.

use std::fmt::Write as _;

use tracing::{debug, info, warn};

use crate::atr::I2cXlate;
use crate::component::{Component, ComponentId, ComponentKind, CrossbarKind, StreamMask};
use crate::error::{BridgeError, HwError, RoutingError};
use crate::format::{DataType, PixelFormat};
use crate::graph::ComponentGraph;
use crate::hw::{Phy, SerCaps, SerOps};
use crate::routing::{self, Restrictions, Route};
use crate::streams::{self, HwToggle};

/// One serializer video pipe.
#[derive(Clone, Debug)]
pub struct SerPipe {
    /// Pipe index.
    pub index: usize,
    /// Input PHY feeding the pipe.
    pub phy_id: usize,
    /// Stream id the pipe transmits under.
    pub stream_id: u32,
    /// Virtual-channel mask as committed.
    pub vcs: u16,
    /// Data-type filter list as committed.
    pub dts: Vec<DataType>,
    /// Whether the pipe is in use.
    pub enabled: bool,
}

/// One sensor stream entering an input PHY.
#[derive(Clone, Debug)]
pub struct SerChannel {
    /// Channel index.
    pub index: usize,
    /// Input PHY the stream arrives on.
    pub phy_id: usize,
    /// Virtual channel of the stream.
    pub vc: u8,
    /// Pixel format; channels without one are ignored by the filters.
    pub format: Option<PixelFormat>,
    /// Inactive channels are ignored.
    pub active: bool,
}

/// Per-pipe board configuration; `None` fields take chip defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerPipeSetup {
    /// Input PHY override.
    pub phy_id: Option<usize>,
    /// Stream id override.
    pub stream_id: Option<u32>,
}

/// Per-channel board configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerChannelSetup {
    /// Input PHY override.
    pub phy_id: Option<usize>,
    /// Virtual channel.
    pub vc: u8,
    /// Pixel format.
    pub format: Option<PixelFormat>,
}

/// Board-level configuration of one serializer.
#[derive(Clone, Debug, Default)]
pub struct SerConfig {
    /// Pipes, by index; missing entries take defaults.
    pub pipes: Vec<SerPipeSetup>,
    /// Sensor streams.
    pub channels: Vec<SerChannelSetup>,
    /// Number of populated input PHYs; defaults to all.
    pub num_enabled_phys: Option<usize>,
}

/// Orchestrator for one serializer chip.
#[derive(Debug)]
pub struct Serializer<O: SerOps> {
    ops: O,
    caps: SerCaps,
    graph: ComponentGraph,
    phy_pipe_xbar: ComponentId,
    pipe_link_xbar: ComponentId,
    link_id: ComponentId,
    phys: Vec<Phy>,
    pipes: Vec<SerPipe>,
    channels: Vec<SerChannel>,
    xlates: Vec<I2cXlate>,
    active_components: usize,
}

struct SerToggle<'a> {
    ops: &'a mut dyn SerOps,
    active: &'a mut usize,
}

impl HwToggle for SerToggle<'_> {
    fn toggle(&mut self, kind: ComponentKind, enable: bool) -> Result<(), HwError> {
        if enable && *self.active == 0 {
            self.ops.set_enable(true)?;
        }
        let res = match kind {
            ComponentKind::Phy(i) => self.ops.set_phy_active(i, enable),
            ComponentKind::Pipe(i) => self.ops.set_pipe_enable(i, enable),
            ComponentKind::Link(_) | ComponentKind::Crossbar(_) => Ok(()),
        };
        if let Err(err) = res {
            if enable && *self.active == 0 {
                let _ = self.ops.set_enable(false);
            }
            return Err(err);
        }
        if enable {
            *self.active += 1;
        } else {
            *self.active = self.active.saturating_sub(1);
            if *self.active == 0 {
                self.ops.set_enable(false)?;
            }
        }
        Ok(())
    }
}

impl<O: SerOps> Serializer<O> {
    /// Builds a serializer from a board configuration and a backend.
    pub fn new(ops: O, config: &SerConfig) -> Result<Self, RoutingError> {
        let caps = *ops.caps();

        if config.pipes.len() > caps.num_pipes {
            return Err(RoutingError::Invalid(format!(
                "{} pipes configured, chip has {}",
                config.pipes.len(),
                caps.num_pipes
            )));
        }
        let num_enabled_phys = config.num_enabled_phys.unwrap_or(caps.num_phys);
        if num_enabled_phys > caps.num_phys {
            return Err(RoutingError::Invalid(format!(
                "{num_enabled_phys} phys configured, chip has {}",
                caps.num_phys
            )));
        }

        let pipes: Vec<SerPipe> = (0..caps.num_pipes)
            .map(|i| {
                let setup = config.pipes.get(i).copied().unwrap_or_default();
                let phy_id = setup.phy_id.unwrap_or(i % caps.num_phys);
                if phy_id >= caps.num_phys {
                    return Err(RoutingError::Invalid(format!(
                        "pipe {i}: phy {phy_id} out of range"
                    )));
                }
                Ok(SerPipe {
                    index: i,
                    phy_id,
                    stream_id: setup.stream_id.unwrap_or(i as u32),
                    vcs: 0,
                    dts: Vec::new(),
                    enabled: false,
                })
            })
            .collect::<Result<_, _>>()?;

        let channels: Vec<SerChannel> = config
            .channels
            .iter()
            .enumerate()
            .map(|(i, setup)| {
                let phy_id = setup.phy_id.unwrap_or(i % caps.num_phys);
                if phy_id >= caps.num_phys {
                    return Err(RoutingError::Invalid(format!(
                        "channel {i}: phy {phy_id} out of range"
                    )));
                }
                // The vc mask is 16 bits wide.
                if setup.vc >= 16 {
                    return Err(RoutingError::Invalid(format!(
                        "channel {i}: virtual channel {} out of range",
                        setup.vc
                    )));
                }
                Ok(SerChannel {
                    index: i,
                    phy_id,
                    vc: setup.vc,
                    format: setup.format,
                    active: true,
                })
            })
            .collect::<Result<_, _>>()?;

        let mut pipes = pipes;
        for channel in &channels {
            for pipe in pipes.iter_mut().filter(|p| p.phy_id == channel.phy_id) {
                pipe.enabled = true;
            }
        }

        let phys: Vec<Phy> = (0..caps.num_phys)
            .map(|i| Phy {
                index: i,
                config: crate::hw::PhyConfig::default(),
                enabled: i < num_enabled_phys,
                active: false,
            })
            .collect();

        let mut graph = ComponentGraph::new();
        let phy_ids: Vec<ComponentId> = (0..caps.num_phys)
            .map(|i| {
                graph.add(Component::new(
                    ComponentKind::Phy(i),
                    format!("phy-{i}"),
                    i as u32,
                    1,
                    1,
                    Restrictions::default(),
                ))
            })
            .collect();

        let mut phy_pipe = Component::new(
            ComponentKind::Crossbar(CrossbarKind::PhyPipe),
            "phy-pipe-xbar",
            0,
            caps.num_phys as u32,
            caps.num_pipes as u32,
            Restrictions {
                one_to_one_only: false,
                no_n_to_1: true,
                no_stream_mix: true,
            },
        );
        routing::init_routing(&mut phy_pipe);
        let phy_pipe_xbar = graph.add(phy_pipe);

        let pipe_ids: Vec<ComponentId> = (0..caps.num_pipes)
            .map(|i| {
                graph.add(Component::new(
                    ComponentKind::Pipe(i),
                    format!("pipe-{i}"),
                    i as u32,
                    1,
                    1,
                    Restrictions::default(),
                ))
            })
            .collect();

        let mut pipe_link = Component::new(
            ComponentKind::Crossbar(CrossbarKind::PipeLink),
            "pipe-link-xbar",
            0,
            caps.num_pipes as u32,
            1,
            Restrictions::default(),
        );
        // Each pipe gets its own stream on the link.
        pipe_link.routes = (0..caps.num_pipes as u32)
            .map(|i| Route::new(1 + i, 0, 0, i))
            .collect();
        let pipe_link_xbar = graph.add(pipe_link);

        let link_id = graph.add(Component::new(
            ComponentKind::Link(0),
            "link-0",
            0,
            1,
            1,
            Restrictions::default(),
        ));

        let pp_sink_base = caps.num_pipes as u32;
        for (i, &phy) in phy_ids.iter().enumerate() {
            graph.connect(phy, 0, phy_pipe_xbar, pp_sink_base + i as u32)?;
        }
        // pipe-link xbar: source pad 0, sink pads 1..=num_pipes.
        for (i, &pipe) in pipe_ids.iter().enumerate() {
            graph.connect(phy_pipe_xbar, i as u32, pipe, 1)?;
            graph.connect(pipe, 0, pipe_link_xbar, 1 + i as u32)?;
        }
        graph.connect(pipe_link_xbar, 0, link_id, 1)?;

        Ok(Self {
            ops,
            caps,
            graph,
            phy_pipe_xbar,
            pipe_link_xbar,
            link_id,
            phys,
            pipes,
            channels,
            xlates: Vec::new(),
            active_components: 0,
        })
    }

    /// Chip capabilities.
    pub fn caps(&self) -> &SerCaps {
        &self.caps
    }

    /// The backend, for inspection.
    pub fn ops(&self) -> &O {
        &self.ops
    }

    /// The backend, mutably.
    pub fn ops_mut(&mut self) -> &mut O {
        &mut self.ops
    }

    /// Current pipe state.
    pub fn pipes(&self) -> &[SerPipe] {
        &self.pipes
    }

    /// Current channel state.
    pub fn channels(&self) -> &[SerChannel] {
        &self.channels
    }

    /// The component graph (read-only).
    pub fn graph(&self) -> &ComponentGraph {
        &self.graph
    }

    /// Runs the bring-up sequence.
    pub fn init(&mut self) -> Result<(), RoutingError> {
        info!("initializing serializer");
        self.ops.init()?;
        for phy in &self.phys {
            if phy.enabled {
                self.ops.init_phy(phy)?;
            }
        }
        for i in 0..self.pipes.len() {
            if !self.pipes[i].enabled {
                continue;
            }
            self.ops.init_pipe(i)?;
            self.ops.set_pipe_stream_id(i, self.pipes[i].stream_id)?;
            self.update_pipe_streams(i)?;
        }
        self.ops.post_init()?;
        Ok(())
    }

    /// Recomputes and pushes one pipe's virtual-channel mask and data-type
    /// filter list from the channels arriving on its input PHY.
    ///
    /// The filter list is deduplicated and bounded by the chip's slot count.
    /// If the data-type push fails after the mask went out, the previous mask
    /// is re-pushed so the hardware stays consistent.
    pub fn update_pipe_streams(&mut self, pipe: usize) -> Result<(), RoutingError> {
        let Some(entry) = self.pipes.get(pipe) else {
            return Err(RoutingError::Invalid(format!("pipe {pipe} out of range")));
        };
        let phy = entry.phy_id;

        let mut vcs: u16 = 0;
        let mut dts: Vec<DataType> = Vec::new();
        for channel in self
            .channels
            .iter()
            .filter(|c| c.active && c.phy_id == phy)
        {
            vcs |= 1 << channel.vc;
            if let Some(format) = channel.format {
                let dt = format.data_type();
                if !dts.contains(&dt) {
                    dts.push(dt);
                }
            }
        }
        if dts.len() > self.caps.num_dts_per_pipe {
            return Err(RoutingError::Invalid(format!(
                "pipe {pipe}: {} data types, chip filters {}",
                dts.len(),
                self.caps.num_dts_per_pipe
            )));
        }

        let old_vcs = self.pipes[pipe].vcs;
        self.ops.set_pipe_vcs(pipe, vcs)?;
        if let Err(err) = self.ops.set_pipe_dts(pipe, &dts) {
            warn!(pipe, %err, "data-type push failed, restoring vc mask");
            if let Err(err) = self.ops.set_pipe_vcs(pipe, old_vcs) {
                warn!(pipe, %err, "vc mask restore failed");
            }
            return Err(err.into());
        }
        let entry = &mut self.pipes[pipe];
        entry.vcs = vcs;
        entry.dts = dts;
        debug!(pipe, vcs, "pipe stream filters committed");
        Ok(())
    }

    /// Applies a route set to one of the chip's crossbars.
    ///
    /// On the PHY/pipe crossbar this re-points pipes at input PHYs and
    /// recomputes their filters; on the pipe/link crossbar it reassigns the
    /// stream ids pipes transmit under. Both refuse while streams are
    /// enabled and roll back on failure.
    pub fn set_routing(
        &mut self,
        xbar: CrossbarKind,
        routes: Vec<Route>,
    ) -> Result<(), RoutingError> {
        let id = match xbar {
            CrossbarKind::PhyPipe => self.phy_pipe_xbar,
            CrossbarKind::PipeLink => self.pipe_link_xbar,
            CrossbarKind::LinkPipe | CrossbarKind::PipePhy => {
                return Err(RoutingError::Invalid(
                    "deserializer crossbar on a serializer".into(),
                ));
            }
        };
        let comp = self
            .graph
            .component(id)
            .ok_or(RoutingError::UnknownComponent(id))?;
        if comp.any_enabled() {
            return Err(RoutingError::Busy(id));
        }
        routing::validate_routes(comp, &routes, |sink_pad, _| u64::from(sink_pad))?;

        match xbar {
            CrossbarKind::PhyPipe => self.commit_phy_pipe_routing(id, routes),
            CrossbarKind::PipeLink => self.commit_pipe_link_routing(id, routes),
            _ => unreachable!(),
        }
    }

    fn commit_phy_pipe_routing(
        &mut self,
        id: ComponentId,
        routes: Vec<Route>,
    ) -> Result<(), RoutingError> {
        let comp = self
            .graph
            .component(id)
            .ok_or(RoutingError::UnknownComponent(id))?;
        let sink_base = comp.sink_pads().start;
        let source_base = comp.source_pads().start;

        let old_pipes = self.pipes.clone();
        let mut touched: Vec<usize> = Vec::new();
        for route in routes.iter().filter(|r| r.active) {
            let phy = (route.sink_pad - sink_base) as usize;
            let pipe = (route.source_pad - source_base) as usize;
            self.pipes[pipe].phy_id = phy;
            if !touched.contains(&pipe) {
                touched.push(pipe);
            }
        }

        for (done, &pipe) in touched.iter().enumerate() {
            if let Err(err) = self.update_pipe_streams(pipe) {
                for &prev in &touched[..done] {
                    let old = &old_pipes[prev];
                    if let Err(err) = self.ops.set_pipe_vcs(prev, old.vcs) {
                        warn!(pipe = prev, %err, "rollback of vc mask failed");
                    }
                    if let Err(err) = self.ops.set_pipe_dts(prev, &old.dts) {
                        warn!(pipe = prev, %err, "rollback of data types failed");
                    }
                }
                self.pipes = old_pipes;
                return Err(err);
            }
        }

        let comp = self
            .graph
            .component_mut(id)
            .ok_or(RoutingError::UnknownComponent(id))?;
        comp.routes = routes;
        debug!(routes = comp.routes.len(), "phy/pipe routing committed");
        Ok(())
    }

    fn commit_pipe_link_routing(
        &mut self,
        id: ComponentId,
        routes: Vec<Route>,
    ) -> Result<(), RoutingError> {
        let comp = self
            .graph
            .component(id)
            .ok_or(RoutingError::UnknownComponent(id))?;
        let sink_base = comp.sink_pads().start;

        let old_pipes = self.pipes.clone();
        let mut assignments: Vec<(usize, u32)> = Vec::new();
        for route in routes.iter().filter(|r| r.active) {
            let pipe = (route.sink_pad - sink_base) as usize;
            assignments.push((pipe, route.source_stream));
        }

        for (done, &(pipe, stream_id)) in assignments.iter().enumerate() {
            if self.pipes[pipe].stream_id == stream_id {
                continue;
            }
            if let Err(err) = self.ops.set_pipe_stream_id(pipe, stream_id) {
                for &(prev, _) in &assignments[..done] {
                    if let Err(err) = self
                        .ops
                        .set_pipe_stream_id(prev, old_pipes[prev].stream_id)
                    {
                        warn!(pipe = prev, %err, "rollback of stream id failed");
                    }
                }
                self.pipes = old_pipes;
                return Err(err.into());
            }
            self.pipes[pipe].stream_id = stream_id;
        }

        let comp = self
            .graph
            .component_mut(id)
            .ok_or(RoutingError::UnknownComponent(id))?;
        comp.routes = routes;
        debug!(routes = comp.routes.len(), "pipe/link routing committed");
        Ok(())
    }

    /// Enables streams on the link's output pad and propagates back to the
    /// input PHYs.
    pub fn enable_link_streams(&mut self, mask: StreamMask) -> Result<(), RoutingError> {
        let mut toggle = SerToggle {
            ops: &mut self.ops,
            active: &mut self.active_components,
        };
        streams::enable_streams(&mut self.graph, self.link_id, 0, mask, &mut toggle)
    }

    /// Disables streams on the link's output pad.
    pub fn disable_link_streams(&mut self, mask: StreamMask) -> Result<(), RoutingError> {
        let mut toggle = SerToggle {
            ops: &mut self.ops,
            active: &mut self.active_components,
        };
        streams::disable_streams(&mut self.graph, self.link_id, 0, mask, &mut toggle)
    }

    /// Adds an alias translation and re-pushes the whole table.
    ///
    /// The table is bounded by the chip's slot count; a duplicate alias is
    /// refused. On a push failure the entry is not kept.
    pub fn attach_xlate(&mut self, alias: u8, physical: u8) -> Result<(), BridgeError> {
        if let Some(pos) = self.xlates.iter().position(|x| x.src == alias) {
            return Err(BridgeError::AlreadyBound(pos));
        }
        if self.xlates.len() >= self.caps.num_i2c_xlates {
            return Err(BridgeError::XlateTableFull(self.caps.num_i2c_xlates));
        }
        self.xlates.push(I2cXlate {
            src: alias,
            dst: physical,
        });
        if let Err(err) = self.ops.init_i2c_xlates(&self.xlates) {
            self.xlates.pop();
            return Err(err.into());
        }
        debug!(
            alias = format_args!("0x{alias:02x}"),
            physical = format_args!("0x{physical:02x}"),
            "alias translation added"
        );
        Ok(())
    }

    /// Removes the translation for a physical address, compacts the table,
    /// and re-pushes it. Removing an absent address is a no-op.
    pub fn detach_xlate(&mut self, physical: u8) -> Result<(), BridgeError> {
        let before = self.xlates.len();
        let old = self.xlates.clone();
        self.xlates.retain(|x| x.dst != physical);
        if self.xlates.len() == before {
            return Ok(());
        }
        if let Err(err) = self.ops.init_i2c_xlates(&self.xlates) {
            self.xlates = old;
            return Err(err.into());
        }
        Ok(())
    }

    /// Resolves an alias to its physical address.
    pub fn xlate_lookup(&self, alias: u8) -> Option<u8> {
        self.xlates.iter().find(|x| x.src == alias).map(|x| x.dst)
    }

    /// Current translation table.
    pub fn xlates(&self) -> &[I2cXlate] {
        &self.xlates
    }

    /// Debug register read.
    pub fn reg_read(&mut self, reg: u16) -> Result<u8, HwError> {
        self.ops.reg_read(reg)
    }

    /// Debug register write.
    pub fn reg_write(&mut self, reg: u16, val: u8) -> Result<(), HwError> {
        self.ops.reg_write(reg, val)
    }

    /// Human-readable state dump.
    pub fn status(&self) -> String {
        let mut out = String::new();
        for pipe in &self.pipes {
            let _ = writeln!(
                out,
                "pipe {}: enabled={} phy={} stream_id={} vcs=0b{:b} dts={}",
                pipe.index,
                pipe.enabled,
                pipe.phy_id,
                pipe.stream_id,
                pipe.vcs,
                pipe.dts.len(),
            );
        }
        for channel in &self.channels {
            let _ = writeln!(
                out,
                "channel {}: phy={} vc={} format={:?}",
                channel.index, channel.phy_id, channel.vc, channel.format,
            );
        }
        for xlate in &self.xlates {
            let _ = writeln!(out, "xlate 0x{:02x} -> 0x{:02x}", xlate.src, xlate.dst);
        }
        out
    }
}
