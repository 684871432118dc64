//! Deserializer orchestrator.
//!
//! [`Deserializer`] owns the component graph of one deserializer chip, the
//! pipe/PHY/link/channel state behind it, and a [`DesOps`] backend. It
//! sequences bring-up, applies crossbar route sets with full rollback,
//! recomputes pipe remap tables, propagates stream enables, and runs the
//! remote-device attach handshake.
//!
//! All mutating operations take `&mut self`; exclusive access to the value is
//! the device-wide lock.

use std::fmt::Write as _;

use tracing::{debug, info, warn};

use crate::atr::{self, BridgePhase, I2cBus, I2cXlate};
use crate::component::{Component, ComponentId, ComponentKind, CrossbarKind, StreamMask};
use crate::error::{BridgeError, HwError, RoutingError};
use crate::format::PixelFormat;
use crate::graph::ComponentGraph;
use crate::hw::{DesCaps, DesOps, Phy, PhyConfig, Pipe};
use crate::remap::{self, RemapSource};
use crate::routing::{self, Restrictions, Route};
use crate::streams::{self, HwToggle};

/// One serial link of a deserializer.
#[derive(Clone, Debug)]
pub struct Link {
    /// Link index.
    pub index: usize,
    /// Whether the link is populated on the board.
    pub enabled: bool,
    /// Tunnel mode forwards the whole stream without per-packet remapping.
    pub tunnel_mode: bool,
    /// Remote-device handshake phase.
    pub phase: BridgePhase,
    /// Bound alias translation, if any.
    pub xlate: Option<I2cXlate>,
}

/// One video channel as described by the board topology.
#[derive(Clone, Debug)]
pub struct Channel {
    /// Channel index.
    pub index: usize,
    /// Pipe carrying the channel.
    pub pipe_id: usize,
    /// Destination PHY.
    pub phy_id: usize,
    /// Virtual channel on the link side.
    pub src_vc: u8,
    /// Virtual channel on the output side.
    pub dst_vc: u8,
    /// Pixel format; channels without a format contribute no remap entries.
    pub format: Option<PixelFormat>,
    /// Inactive channels are ignored by remap computation.
    pub active: bool,
}

/// Per-link board configuration.
#[derive(Clone, Copy, Debug)]
pub struct LinkSetup {
    /// Whether the link is populated.
    pub enabled: bool,
    /// Tunnel mode.
    pub tunnel_mode: bool,
}

impl Default for LinkSetup {
    fn default() -> Self {
        Self {
            enabled: true,
            tunnel_mode: false,
        }
    }
}

/// Per-pipe board configuration; `None` fields take chip defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipeSetup {
    /// Source link override.
    pub link_id: Option<usize>,
    /// Link stream id override.
    pub stream_id: Option<u32>,
}

/// Per-channel board configuration; `None` fields take chip defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChannelSetup {
    /// Pipe override.
    pub pipe_id: Option<usize>,
    /// Destination PHY override.
    pub phy_id: Option<usize>,
    /// Link-side virtual channel.
    pub src_vc: u8,
    /// Output virtual channel override.
    pub dst_vc: Option<u8>,
    /// Pixel format.
    pub format: Option<PixelFormat>,
}

/// Per-PHY board configuration.
#[derive(Clone, Copy, Debug)]
pub struct PhySetup {
    /// Whether the PHY is wired up on the board.
    pub enabled: bool,
    /// Bus configuration.
    pub config: PhyConfig,
}

impl Default for PhySetup {
    fn default() -> Self {
        Self {
            enabled: true,
            config: PhyConfig::default(),
        }
    }
}

/// Board-level configuration of one deserializer.
#[derive(Clone, Debug, Default)]
pub struct DesConfig {
    /// Links, by index; missing entries default to enabled.
    pub links: Vec<LinkSetup>,
    /// Pipes, by index; missing entries take defaults.
    pub pipes: Vec<PipeSetup>,
    /// Channels; at most one per (pipe, src_vc).
    pub channels: Vec<ChannelSetup>,
    /// PHYs, by index; missing entries default to enabled.
    pub phys: Vec<PhySetup>,
}

/// Orchestrator for one deserializer chip.
pub struct Deserializer<O: DesOps> {
    ops: O,
    caps: DesCaps,
    graph: ComponentGraph,
    phy_ids: Vec<ComponentId>,
    link_pipe_xbar: ComponentId,
    pipe_phy_xbar: ComponentId,
    phys: Vec<Phy>,
    pipes: Vec<Pipe>,
    links: Vec<Link>,
    channels: Vec<Channel>,
    /// Components with at least one enabled stream; drives chip-wide enable.
    active_components: usize,
}

struct DesToggle<'a> {
    ops: &'a mut dyn DesOps,
    active: &'a mut usize,
}

impl HwToggle for DesToggle<'_> {
    fn toggle(&mut self, kind: ComponentKind, enable: bool) -> Result<(), HwError> {
        if enable && *self.active == 0 {
            self.ops.set_enable(true)?;
        }
        let res = match kind {
            ComponentKind::Phy(i) => self.ops.set_phy_enable(i, enable),
            ComponentKind::Pipe(i) => self.ops.set_pipe_enable(i, enable),
            // Link selection is configuration-driven; nothing to do per stream.
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

impl<O: DesOps> Deserializer<O> {
    /// Builds a deserializer from a board configuration and a backend.
    ///
    /// Arena sizes come from the backend's capabilities; configuration
    /// entries beyond them, or references to out-of-range ids, are rejected.
    pub fn new(ops: O, config: &DesConfig) -> Result<Self, RoutingError> {
        let caps = *ops.caps();

        if config.links.len() > caps.num_links {
            return Err(RoutingError::Invalid(format!(
                "{} links configured, chip has {}",
                config.links.len(),
                caps.num_links
            )));
        }
        if config.pipes.len() > caps.num_pipes {
            return Err(RoutingError::Invalid(format!(
                "{} pipes configured, chip has {}",
                config.pipes.len(),
                caps.num_pipes
            )));
        }
        if config.phys.len() > caps.num_phys {
            return Err(RoutingError::Invalid(format!(
                "{} phys configured, chip has {}",
                config.phys.len(),
                caps.num_phys
            )));
        }

        let links: Vec<Link> = (0..caps.num_links)
            .map(|i| {
                let setup = config.links.get(i).copied().unwrap_or_default();
                if setup.tunnel_mode && !caps.supports_tunnel_mode {
                    return Err(RoutingError::Invalid(format!(
                        "link {i}: tunnel mode not supported by this chip"
                    )));
                }
                Ok(Link {
                    index: i,
                    enabled: setup.enabled,
                    tunnel_mode: setup.tunnel_mode,
                    phase: BridgePhase::Unbound,
                    xlate: None,
                })
            })
            .collect::<Result<_, _>>()?;

        let pipes: Vec<Pipe> = (0..caps.num_pipes)
            .map(|i| {
                let setup = config.pipes.get(i).copied().unwrap_or_default();
                let link_id = setup.link_id.unwrap_or(i % caps.num_links);
                if link_id >= caps.num_links {
                    return Err(RoutingError::Invalid(format!(
                        "pipe {i}: link {link_id} out of range"
                    )));
                }
                Ok(Pipe {
                    index: i,
                    phy_id: i % caps.num_phys,
                    link_id,
                    stream_id: setup.stream_id.unwrap_or(i as u32),
                    remaps: Vec::new(),
                    dbl8: false,
                    dbl10: false,
                    dbl12: false,
                    enabled: false,
                })
            })
            .collect::<Result<_, _>>()?;

        let mut pipes = pipes;
        let channels: Vec<Channel> = config
            .channels
            .iter()
            .enumerate()
            .map(|(i, setup)| {
                let pipe_id = setup.pipe_id.unwrap_or(i % caps.num_pipes);
                if pipe_id >= caps.num_pipes {
                    return Err(RoutingError::Invalid(format!(
                        "channel {i}: pipe {pipe_id} out of range"
                    )));
                }
                let phy_id = setup.phy_id.unwrap_or(pipe_id % caps.num_phys);
                if phy_id >= caps.num_phys {
                    return Err(RoutingError::Invalid(format!(
                        "channel {i}: phy {phy_id} out of range"
                    )));
                }
                Ok(Channel {
                    index: i,
                    pipe_id,
                    phy_id,
                    src_vc: setup.src_vc,
                    dst_vc: setup.dst_vc.unwrap_or((i % 4) as u8),
                    format: setup.format,
                    active: true,
                })
            })
            .collect::<Result<_, _>>()?;
        for channel in &channels {
            pipes[channel.pipe_id].enabled = true;
        }

        let phys: Vec<Phy> = (0..caps.num_phys)
            .map(|i| {
                let setup = config.phys.get(i).copied().unwrap_or_default();
                Phy {
                    index: i,
                    config: setup.config,
                    enabled: setup.enabled,
                    active: false,
                }
            })
            .collect();

        let mut graph = ComponentGraph::new();

        let link_ids: Vec<ComponentId> = (0..caps.num_links)
            .map(|i| {
                graph.add(Component::new(
                    ComponentKind::Link(i),
                    format!("link-{i}"),
                    i as u32,
                    1,
                    1,
                    Restrictions::default(),
                ))
            })
            .collect();

        let mut link_pipe = Component::new(
            ComponentKind::Crossbar(CrossbarKind::LinkPipe),
            "link-pipe-xbar",
            0,
            caps.num_links as u32,
            caps.num_pipes as u32,
            Restrictions {
                one_to_one_only: false,
                no_n_to_1: true,
                no_stream_mix: true,
            },
        );
        routing::init_routing(&mut link_pipe);
        let link_pipe_xbar = graph.add(link_pipe);

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

        let mut pipe_phy = Component::new(
            ComponentKind::Crossbar(CrossbarKind::PipePhy),
            "pipe-phy-xbar",
            0,
            caps.num_pipes as u32,
            caps.num_phys as u32,
            Restrictions::default(),
        );
        routing::init_routing(&mut pipe_phy);
        let pipe_phy_xbar = graph.add(pipe_phy);

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

        // Wire the chain: link -> link/pipe xbar -> pipe -> pipe/phy xbar -> phy.
        let lp_sink_base = caps.num_pipes as u32;
        for (i, &link) in link_ids.iter().enumerate() {
            graph.connect(link, 0, link_pipe_xbar, lp_sink_base + i as u32)?;
        }
        let pp_sink_base = caps.num_phys as u32;
        for (i, &pipe) in pipe_ids.iter().enumerate() {
            graph.connect(link_pipe_xbar, i as u32, pipe, 1)?;
            graph.connect(pipe, 0, pipe_phy_xbar, pp_sink_base + i as u32)?;
        }
        for (i, &phy) in phy_ids.iter().enumerate() {
            graph.connect(pipe_phy_xbar, i as u32, phy, 1)?;
        }

        Ok(Self {
            ops,
            caps,
            graph,
            phy_ids,
            link_pipe_xbar,
            pipe_phy_xbar,
            phys,
            pipes,
            links,
            channels,
            active_components: 0,
        })
    }

    /// Chip capabilities.
    pub fn caps(&self) -> &DesCaps {
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
    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    /// Current link state.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Current channel state.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// The component graph (read-only).
    pub fn graph(&self) -> &ComponentGraph {
        &self.graph
    }

    /// Bitmask of enabled links.
    fn enabled_link_mask(&self) -> u32 {
        self.links
            .iter()
            .filter(|l| l.enabled)
            .fold(0, |mask, l| mask | (1 << l.index))
    }

    /// Runs the bring-up sequence.
    ///
    /// Chip init, PHY and pipe programming, remap tables, link selection,
    /// then the chip's post-init hook. Streams stay disabled.
    pub fn init(&mut self) -> Result<(), RoutingError> {
        info!("initializing deserializer");
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
            self.ops.init_pipe(&self.pipes[i])?;
            self.ops.set_pipe_stream_id(i, self.pipes[i].stream_id)?;
            if self.caps.supports_pipe_link_remap {
                self.ops.set_pipe_link(i, self.pipes[i].link_id)?;
            }
            self.recompute_pipe_remaps(i)?;
        }

        self.ops.select_links(self.enabled_link_mask())?;
        self.ops.post_init()?;
        Ok(())
    }

    fn channels_of_pipe(&self, pipe: usize) -> Vec<RemapSource> {
        self.channels
            .iter()
            .filter(|c| c.active && c.pipe_id == pipe)
            .filter_map(|c| {
                c.format.map(|format| RemapSource {
                    format,
                    src_vc: c.src_vc,
                    dst_vc: c.dst_vc,
                    phy: c.phy_id,
                })
            })
            .collect()
    }

    /// Rebuilds and pushes one pipe's remap table.
    ///
    /// For a pipe behind a tunnel-mode link the table is skipped; instead all
    /// channels of the pipe must agree on one destination PHY, which is
    /// pushed whole. In-memory state is committed only after the hardware
    /// accepted the push; on a push failure the previous table is re-pushed.
    pub fn recompute_pipe_remaps(&mut self, pipe: usize) -> Result<(), RoutingError> {
        if pipe >= self.pipes.len() {
            return Err(RoutingError::Invalid(format!("pipe {pipe} out of range")));
        }

        if self.links[self.pipes[pipe].link_id].tunnel_mode {
            let mut phy = None;
            for c in self.channels.iter().filter(|c| c.active && c.pipe_id == pipe) {
                match phy {
                    None => phy = Some(c.phy_id),
                    Some(p) if p == c.phy_id => {}
                    Some(p) => {
                        return Err(RoutingError::Invalid(format!(
                            "pipe {pipe}: tunnel mode needs one phy, got {p} and {}",
                            c.phy_id
                        )));
                    }
                }
            }
            if let Some(phy) = phy {
                self.ops.set_pipe_phy(pipe, phy)?;
                self.pipes[pipe].phy_id = phy;
            }
            return Ok(());
        }

        let sources = self.channels_of_pipe(pipe);
        let table = remap::build_pipe_remaps(pipe, &sources, self.caps.max_remaps_per_pipe)?;
        debug!(pipe, entries = table.len(), "pushing remap table");
        if let Err(err) = self.ops.set_pipe_remaps(pipe, &table) {
            warn!(pipe, %err, "remap push failed, restoring previous table");
            let old = self.pipes[pipe].remaps.clone();
            if let Err(err) = self.ops.set_pipe_remaps(pipe, &old) {
                warn!(pipe, %err, "restore push failed");
            }
            return Err(err.into());
        }
        self.pipes[pipe].remaps = table;
        Ok(())
    }

    /// Sets or clears a channel's pixel format and rebuilds its pipe's remap
    /// table. On failure the channel keeps its previous format.
    pub fn set_channel_format(
        &mut self,
        channel: usize,
        format: Option<PixelFormat>,
    ) -> Result<(), RoutingError> {
        let old = match self.channels.get_mut(channel) {
            Some(c) => std::mem::replace(&mut c.format, format),
            None => {
                return Err(RoutingError::Invalid(format!(
                    "channel {channel} out of range"
                )));
            }
        };
        let pipe = self.channels[channel].pipe_id;
        if let Err(err) = self.recompute_pipe_remaps(pipe) {
            self.channels[channel].format = old;
            return Err(err);
        }
        Ok(())
    }

    fn xbar_id(&self, xbar: CrossbarKind) -> Result<ComponentId, RoutingError> {
        match xbar {
            CrossbarKind::LinkPipe => Ok(self.link_pipe_xbar),
            CrossbarKind::PipePhy => Ok(self.pipe_phy_xbar),
            CrossbarKind::PhyPipe | CrossbarKind::PipeLink => Err(RoutingError::Invalid(
                "serializer crossbar on a deserializer".into(),
            )),
        }
    }

    /// Applies a route set to one of the chip's crossbars.
    ///
    /// The set is validated first and rejected while any stream is enabled on
    /// the crossbar. Derived pipe assignments (source link, stream id,
    /// destination PHYs, remap tables) are pushed to the hardware; if any
    /// push fails, the routes, assignments, and previously pushed tables are
    /// all restored and the error returns.
    pub fn set_routing(
        &mut self,
        xbar: CrossbarKind,
        routes: Vec<Route>,
    ) -> Result<(), RoutingError> {
        let id = self.xbar_id(xbar)?;
        let comp = self
            .graph
            .component(id)
            .ok_or(RoutingError::UnknownComponent(id))?;
        if comp.any_enabled() {
            return Err(RoutingError::Busy(id));
        }
        // Streams from different upstream pads never mix on one output.
        routing::validate_routes(comp, &routes, |sink_pad, _| u64::from(sink_pad))?;

        match xbar {
            CrossbarKind::LinkPipe => self.commit_link_pipe_routing(routes),
            CrossbarKind::PipePhy => self.commit_pipe_phy_routing(routes),
            _ => unreachable!("rejected by xbar_id"),
        }
    }

    fn commit_link_pipe_routing(&mut self, routes: Vec<Route>) -> Result<(), RoutingError> {
        let comp = self
            .graph
            .component(self.link_pipe_xbar)
            .ok_or(RoutingError::UnknownComponent(self.link_pipe_xbar))?;
        let sink_base = comp.sink_pads().start;
        let source_base = comp.source_pads().start;

        // Derive (pipe, link, stream id) per active route and check the
        // chip's capabilities before touching anything.
        let mut assignments: Vec<(usize, usize, u32)> = Vec::new();
        for route in routes.iter().filter(|r| r.active) {
            let pipe = (route.source_pad - source_base) as usize;
            let link = (route.sink_pad - sink_base) as usize;
            let stream_id = route.sink_stream;
            if link != self.pipes[pipe].link_id && !self.caps.supports_pipe_link_remap {
                return Err(RoutingError::Invalid(format!(
                    "pipe {pipe}: chip cannot re-point a pipe at link {link}"
                )));
            }
            if stream_id != pipe as u32 && !self.caps.supports_pipe_stream_autoselect {
                return Err(RoutingError::Invalid(format!(
                    "pipe {pipe}: chip cannot select link stream {stream_id}"
                )));
            }
            assignments.push((pipe, link, stream_id));
        }

        let old_pipes = self.pipes.clone();
        for (done, &(pipe, link, stream_id)) in assignments.iter().enumerate() {
            let res = self
                .apply_pipe_link(pipe, link)
                .and_then(|()| self.apply_pipe_stream_id(pipe, stream_id));
            if let Err(err) = res {
                // Re-push the assignments that already went out.
                for &(prev, _, _) in &assignments[..done] {
                    let old = &old_pipes[prev];
                    if let Err(err) = self.apply_pipe_link(prev, old.link_id) {
                        warn!(pipe = prev, %err, "rollback of pipe link failed");
                    }
                    if let Err(err) = self.apply_pipe_stream_id(prev, old.stream_id) {
                        warn!(pipe = prev, %err, "rollback of pipe stream id failed");
                    }
                }
                self.pipes = old_pipes;
                return Err(err);
            }
        }

        let comp = self
            .graph
            .component_mut(self.link_pipe_xbar)
            .ok_or(RoutingError::UnknownComponent(self.link_pipe_xbar))?;
        comp.routes = routes;
        debug!(routes = comp.routes.len(), "link/pipe routing committed");
        Ok(())
    }

    fn apply_pipe_link(&mut self, pipe: usize, link: usize) -> Result<(), RoutingError> {
        if self.pipes[pipe].link_id != link {
            self.ops.set_pipe_link(pipe, link)?;
            self.pipes[pipe].link_id = link;
        }
        Ok(())
    }

    fn apply_pipe_stream_id(&mut self, pipe: usize, stream_id: u32) -> Result<(), RoutingError> {
        if self.pipes[pipe].stream_id != stream_id {
            self.ops.set_pipe_stream_id(pipe, stream_id)?;
            self.pipes[pipe].stream_id = stream_id;
        }
        Ok(())
    }

    fn commit_pipe_phy_routing(&mut self, routes: Vec<Route>) -> Result<(), RoutingError> {
        let comp = self
            .graph
            .component(self.pipe_phy_xbar)
            .ok_or(RoutingError::UnknownComponent(self.pipe_phy_xbar))?;
        let sink_base = comp.sink_pads().start;
        let source_base = comp.source_pads().start;

        let old_channels = self.channels.clone();
        let old_pipes = self.pipes.clone();

        // Route (pipe p, stream vc) -> (phy f, _) sends the channels of pipe
        // p whose output virtual channel is vc to phy f.
        let mut touched: Vec<usize> = Vec::new();
        for route in routes.iter().filter(|r| r.active) {
            let pipe = (route.sink_pad - sink_base) as usize;
            let phy = (route.source_pad - source_base) as usize;
            for channel in self
                .channels
                .iter_mut()
                .filter(|c| c.pipe_id == pipe && u32::from(c.dst_vc) == route.sink_stream)
            {
                channel.phy_id = phy;
            }
            if !touched.contains(&pipe) {
                touched.push(pipe);
            }
        }

        // Build every new table first so a capacity overflow mutates nothing.
        let mut tables: Vec<(usize, Vec<crate::remap::Remap>)> = Vec::new();
        for &pipe in &touched {
            if self.links[self.pipes[pipe].link_id].tunnel_mode {
                continue;
            }
            let sources = self.channels_of_pipe(pipe);
            match remap::build_pipe_remaps(pipe, &sources, self.caps.max_remaps_per_pipe) {
                Ok(table) => tables.push((pipe, table)),
                Err(err) => {
                    self.channels = old_channels;
                    return Err(err);
                }
            }
        }

        for (done, (pipe, table)) in tables.iter().enumerate() {
            if let Err(err) = self.ops.set_pipe_remaps(*pipe, table) {
                // Re-push the tables already replaced, then restore state.
                for (prev, _) in &tables[..done] {
                    if let Err(err) = self.ops.set_pipe_remaps(*prev, &old_pipes[*prev].remaps) {
                        warn!(pipe = prev, %err, "rollback of remap table failed");
                    }
                }
                self.channels = old_channels;
                self.pipes = old_pipes;
                return Err(err.into());
            }
        }
        for (pipe, table) in &tables {
            self.pipes[*pipe].remaps = table.clone();
        }

        // Tunnel-mode pipes push a whole-pipe phy instead of a table. A
        // failure here also has to take back the tables pushed above.
        let tunnel: Vec<usize> = touched
            .iter()
            .copied()
            .filter(|&p| self.links[self.pipes[p].link_id].tunnel_mode)
            .collect();
        for (done, &pipe) in tunnel.iter().enumerate() {
            if let Err(err) = self.recompute_pipe_remaps(pipe) {
                for &prev in &tunnel[..done] {
                    if let Err(err) = self.ops.set_pipe_phy(prev, old_pipes[prev].phy_id) {
                        warn!(pipe = prev, %err, "rollback of pipe phy failed");
                    }
                }
                for (prev, _) in &tables {
                    if let Err(err) = self.ops.set_pipe_remaps(*prev, &old_pipes[*prev].remaps) {
                        warn!(pipe = prev, %err, "rollback of remap table failed");
                    }
                }
                self.channels = old_channels;
                self.pipes = old_pipes;
                return Err(err);
            }
        }

        let comp = self
            .graph
            .component_mut(self.pipe_phy_xbar)
            .ok_or(RoutingError::UnknownComponent(self.pipe_phy_xbar))?;
        comp.routes = routes;
        debug!(routes = comp.routes.len(), "pipe/phy routing committed");
        Ok(())
    }

    /// Enables streams on a PHY's output pad and propagates upstream.
    pub fn enable_phy_streams(&mut self, phy: usize, mask: StreamMask) -> Result<(), RoutingError> {
        let id = *self
            .phy_ids
            .get(phy)
            .ok_or_else(|| RoutingError::Invalid(format!("phy {phy} out of range")))?;
        let mut toggle = DesToggle {
            ops: &mut self.ops,
            active: &mut self.active_components,
        };
        streams::enable_streams(&mut self.graph, id, 0, mask, &mut toggle)
    }

    /// Disables streams on a PHY's output pad and propagates upstream.
    pub fn disable_phy_streams(
        &mut self,
        phy: usize,
        mask: StreamMask,
    ) -> Result<(), RoutingError> {
        let id = *self
            .phy_ids
            .get(phy)
            .ok_or_else(|| RoutingError::Invalid(format!("phy {phy} out of range")))?;
        let mut toggle = DesToggle {
            ops: &mut self.ops,
            active: &mut self.active_components,
        };
        streams::disable_streams(&mut self.graph, id, 0, mask, &mut toggle)
    }

    /// Runs the remote-device attach handshake on one link.
    ///
    /// The remote is discovered at either its factory power-up address or the
    /// alias, soft-reset back to the power-up address, moved to the alias,
    /// and only then recorded as bound. A link that already holds a binding
    /// refuses with [`BridgeError::AlreadyBound`]; a failed discovery leaves
    /// the link unbound so a later attach can retry.
    pub fn bridge_attach(
        &mut self,
        bus: &mut dyn I2cBus,
        link: usize,
        power_up: u8,
        alias: u8,
    ) -> Result<(), BridgeError> {
        let enabled_mask = self.enabled_link_mask();
        {
            let entry = self
                .links
                .get(link)
                .ok_or(BridgeError::UnknownLink(link))?;
            if !entry.enabled {
                return Err(BridgeError::UnknownLink(link));
            }
            if entry.xlate.is_some() || entry.phase == BridgePhase::Bound {
                return Err(BridgeError::AlreadyBound(link));
            }
        }

        info!(
            link,
            power_up = format_args!("0x{power_up:02x}"),
            alias = format_args!("0x{alias:02x}"),
            "attaching remote device"
        );

        // Talk to this link only while the remote still has its factory
        // address; every unbound remote answers there.
        self.links[link].phase = BridgePhase::Discovering;
        if let Err(err) = self.ops.select_links(1 << link) {
            self.links[link].phase = BridgePhase::Unbound;
            return Err(err.into());
        }

        let result = self.handshake(bus, link, power_up, alias);

        if let Err(err) = self.ops.select_links(enabled_mask) {
            warn!(link, %err, "restoring link selection failed");
        }

        match result {
            Ok(()) => {
                self.links[link].phase = BridgePhase::Bound;
                self.links[link].xlate = Some(I2cXlate {
                    src: alias,
                    dst: power_up,
                });
                info!(link, "remote device bound");
                Ok(())
            }
            Err(err @ BridgeError::DeviceNotFound { .. }) => {
                // Nothing answered; the link is clean for a later retry.
                self.links[link].phase = BridgePhase::Unbound;
                Err(err)
            }
            Err(err) => {
                self.links[link].phase = BridgePhase::Failed;
                Err(err)
            }
        }
    }

    fn handshake(
        &mut self,
        bus: &mut dyn I2cBus,
        link: usize,
        power_up: u8,
        alias: u8,
    ) -> Result<(), BridgeError> {
        let found = atr::wait_for_device(bus, &[power_up, alias])?;

        // Reset whatever answered so the device sits at its power-up address
        // with clean state before it is moved.
        self.links[link].phase = BridgePhase::Resetting;
        atr::reset_device(bus, found)?;
        if atr::wait_for_device(bus, &[power_up]).is_err() {
            return Err(BridgeError::ResetLost { power_up });
        }

        atr::change_address(bus, power_up, alias)?;
        if !atr::probe(bus, alias)? {
            return Err(BridgeError::ResetLost { power_up: alias });
        }
        self.links[link].phase = BridgePhase::Readdressed;
        self.ops.fix_peer_tx_ids(bus, alias)?;
        Ok(())
    }

    /// Removes a link's bound translation.
    ///
    /// `addr` may be the alias or the physical address; if neither matches
    /// the current binding this is a no-op.
    pub fn bridge_detach(&mut self, link: usize, addr: u8) -> Result<(), BridgeError> {
        let entry = self
            .links
            .get_mut(link)
            .ok_or(BridgeError::UnknownLink(link))?;
        match entry.xlate {
            Some(xlate) if xlate.src == addr || xlate.dst == addr => {
                debug!(link, addr = format_args!("0x{addr:02x}"), "detaching remote device");
                entry.xlate = None;
                entry.phase = BridgePhase::Unbound;
            }
            _ => {}
        }
        Ok(())
    }

    /// Resolves an alias address to the bound physical address.
    pub fn bridge_lookup(&self, alias: u8) -> Option<u8> {
        self.links
            .iter()
            .find_map(|l| l.xlate.filter(|x| x.src == alias).map(|x| x.dst))
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
        for link in &self.links {
            let _ = writeln!(
                out,
                "link {}: enabled={} tunnel={} phase={:?} xlate={}",
                link.index,
                link.enabled,
                link.tunnel_mode,
                link.phase,
                link.xlate.map_or("none".to_string(), |x| format!(
                    "0x{:02x}->0x{:02x}",
                    x.src, x.dst
                )),
            );
        }
        for pipe in &self.pipes {
            let _ = writeln!(
                out,
                "pipe {}: enabled={} link={} stream_id={} phy={} remaps={}",
                pipe.index,
                pipe.enabled,
                pipe.link_id,
                pipe.stream_id,
                pipe.phy_id,
                pipe.remaps.len(),
            );
        }
        for channel in &self.channels {
            let _ = writeln!(
                out,
                "channel {}: pipe={} phy={} vc {}->{} format={:?}",
                channel.index,
                channel.pipe_id,
                channel.phy_id,
                channel.src_vc,
                channel.dst_vc,
                channel.format,
            );
        }
        for phy in &self.phys {
            let _ = writeln!(out, "phy {}: enabled={}", phy.index, phy.enabled);
        }
        out
    }
}
