//! End-to-end tests over the simulated backends.

use serlink_core::{
    BridgeError, BridgePhase, ChannelSetup, CrossbarKind, DesCaps, DesConfig, Deserializer,
    LinkSetup, PixelFormat, Route, RoutingError, SerCaps, SerChannelSetup, SerConfig, Serializer,
    SimBus, SimDes, SimSer, atr,
};

fn raw10_channel(pipe: usize, src_vc: u8, dst_vc: u8) -> ChannelSetup {
    ChannelSetup {
        pipe_id: Some(pipe),
        phy_id: None,
        src_vc,
        dst_vc: Some(dst_vc),
        format: Some(PixelFormat::Raw10),
    }
}

fn two_camera_config() -> DesConfig {
    DesConfig {
        channels: vec![
            raw10_channel(0, 0, 0),
            raw10_channel(0, 1, 1),
            ChannelSetup {
                pipe_id: Some(1),
                src_vc: 2,
                dst_vc: Some(2),
                format: Some(PixelFormat::Embedded),
                ..ChannelSetup::default()
            },
        ],
        ..DesConfig::default()
    }
}

#[test]
fn bring_up_programs_remaps_and_links() {
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &two_camera_config()).unwrap();
    des.init().unwrap();

    // Two RAW10 channels on pipe 0: 3 entries each. One embedded on pipe 1.
    assert_eq!(des.ops().remaps[0].len(), 6);
    assert_eq!(des.ops().remaps[1].len(), 1);
    assert_eq!(des.pipes()[0].remaps.len(), 6);
    // Both links enabled by default.
    assert_eq!(des.ops().link_mask, 0b11);
    assert_eq!(des.ops().count_calls("init"), 1);
    assert_eq!(des.ops().count_calls("post_init"), 1);
    // Only the two used pipes were programmed.
    assert_eq!(des.ops().count_calls("init_pipe"), 2);
}

#[test]
fn remap_capacity_overflow_fails_before_any_push() {
    let caps = DesCaps {
        max_remaps_per_pipe: 6,
        ..DesCaps::default()
    };
    let config = DesConfig {
        channels: vec![raw10_channel(0, 0, 0), raw10_channel(0, 1, 1)],
        ..DesConfig::default()
    };
    let mut des = Deserializer::new(SimDes::new(caps), &config).unwrap();
    let err = des.init().unwrap_err();
    assert!(matches!(
        err,
        RoutingError::TooManyRemaps {
            pipe: 0,
            required: 6,
            max: 6
        }
    ));
    assert_eq!(des.ops().count_calls("set_pipe_remaps"), 0);
}

#[test]
fn link_pipe_routing_commits_and_reassigns_pipes() {
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &two_camera_config()).unwrap();
    des.init().unwrap();

    // Sink pads (links) start at 4 with the default 4-pipe chip.
    let routes = vec![Route::new(4, 0, 0, 0), Route::new(4, 1, 1, 1)];
    des.set_routing(CrossbarKind::LinkPipe, routes).unwrap();

    // Pipe 1 moved from its default link 1 to link 0.
    assert_eq!(des.pipes()[1].link_id, 0);
    assert_eq!(des.pipes()[1].stream_id, 1);
    assert_eq!(des.ops().pipe_links[1], 0);
}

#[test]
fn invalid_routing_leaves_routes_untouched() {
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &two_camera_config()).unwrap();
    des.init().unwrap();

    let routes_of = |des: &Deserializer<SimDes>, name: &str| {
        des.graph()
            .iter()
            .find(|(_, c)| c.name == name)
            .map(|(_, c)| c.routes.clone())
            .unwrap()
    };
    let before = routes_of(&des, "link-pipe-xbar");

    // Two routes feeding the same source endpoint.
    let bad = vec![Route::new(4, 0, 0, 0), Route::new(5, 0, 0, 0)];
    let err = des.set_routing(CrossbarKind::LinkPipe, bad).unwrap_err();
    assert!(matches!(err, RoutingError::Invalid(_)));
    assert_eq!(routes_of(&des, "link-pipe-xbar"), before);
}

#[test]
fn routing_hw_failure_rolls_back_assignments() {
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &two_camera_config()).unwrap();
    des.init().unwrap();
    des.ops_mut().fail_on("set_pipe_stream_id");

    // Requires a stream-id change on pipe 0.
    let routes = vec![Route::new(4, 2, 0, 0)];
    let err = des.set_routing(CrossbarKind::LinkPipe, routes).unwrap_err();
    assert!(matches!(err, RoutingError::Hw(_)));
    assert_eq!(des.pipes()[0].stream_id, 0);
}

#[test]
fn routing_refused_while_streams_enabled() {
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &two_camera_config()).unwrap();
    des.init().unwrap();
    des.enable_phy_streams(0, 0b1).unwrap();

    let err = des
        .set_routing(CrossbarKind::LinkPipe, vec![Route::new(4, 0, 0, 0)])
        .unwrap_err();
    assert!(matches!(err, RoutingError::Busy(_)));
}

#[test]
fn remap_push_failure_keeps_the_old_format() {
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &two_camera_config()).unwrap();
    des.init().unwrap();
    des.ops_mut().fail_on("set_pipe_remaps");

    let err = des
        .set_channel_format(0, Some(PixelFormat::Raw12))
        .unwrap_err();
    assert!(matches!(err, RoutingError::Hw(_)));
    assert_eq!(des.channels()[0].format, Some(PixelFormat::Raw10));
    // The hardware still holds the table from bring-up.
    assert_eq!(des.ops().remaps[0].len(), 6);

    des.ops_mut().clear_failures();
    des.set_channel_format(0, Some(PixelFormat::Raw12)).unwrap();
    assert_eq!(des.channels()[0].format, Some(PixelFormat::Raw12));
}

#[test]
fn stream_enable_fires_hardware_once_and_balances() {
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &two_camera_config()).unwrap();
    des.init().unwrap();

    des.enable_phy_streams(0, 0b1).unwrap();
    des.enable_phy_streams(0, 0b1).unwrap();
    assert_eq!(des.ops().count_calls("set_phy_enable"), 1);
    assert_eq!(des.ops().count_calls("set_pipe_enable"), 1);
    assert_eq!(des.ops().count_calls("set_enable"), 1);
    assert!(des.ops().enabled);

    des.disable_phy_streams(0, 0b1).unwrap();
    des.disable_phy_streams(0, 0b1).unwrap();
    assert_eq!(des.ops().count_calls("set_phy_enable"), 2);
    assert_eq!(des.ops().count_calls("set_pipe_enable"), 2);
    assert_eq!(des.ops().count_calls("set_enable"), 2);
    assert!(!des.ops().enabled);
    assert!(!des.ops().phy_enabled[0]);
    assert!(!des.ops().pipe_enabled[0]);
}

#[test]
fn attach_binds_alias_to_power_up_address() {
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &two_camera_config()).unwrap();
    des.init().unwrap();
    let mut bus = SimBus::new();
    bus.add_device(0x40);

    des.bridge_attach(&mut bus, 0, 0x40, 0x1a).unwrap();
    assert_eq!(des.bridge_lookup(0x1a), Some(0x40));
    assert_eq!(des.links()[0].phase, BridgePhase::Bound);
    // The device physically moved to the alias.
    assert!(bus.has_device_at(0x1a));
    assert!(!bus.has_device_at(0x40));
    // Link selection went exclusive for the handshake, then came back.
    assert_eq!(des.ops().link_mask, 0b11);

    let err = des.bridge_attach(&mut bus, 0, 0x40, 0x1a).unwrap_err();
    assert!(matches!(err, BridgeError::AlreadyBound(0)));
}

#[test]
fn attach_gives_up_after_bounded_probing_and_can_retry() {
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &two_camera_config()).unwrap();
    des.init().unwrap();
    let mut bus = SimBus::new();

    let err = des.bridge_attach(&mut bus, 0, 0x40, 0x1a).unwrap_err();
    assert!(matches!(
        err,
        BridgeError::DeviceNotFound {
            power_up: 0x40,
            target: 0x1a,
            attempts: 10
        }
    ));
    assert_eq!(des.links()[0].phase, BridgePhase::Unbound);
    // Backoff runs between rounds, not after the last one.
    assert_eq!(
        bus.slept_ms,
        u64::from(atr::PROBE_ATTEMPTS - 1) * atr::PROBE_BACKOFF_MS
    );

    // The device shows up later; the same link attaches cleanly.
    bus.add_device(0x40);
    des.bridge_attach(&mut bus, 0, 0x40, 0x1a).unwrap();
    assert_eq!(des.links()[0].phase, BridgePhase::Bound);
}

#[test]
fn detach_clears_the_binding() {
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &two_camera_config()).unwrap();
    des.init().unwrap();
    let mut bus = SimBus::new();
    bus.add_device(0x40);
    des.bridge_attach(&mut bus, 0, 0x40, 0x1a).unwrap();

    des.bridge_detach(0, 0x1a).unwrap();
    assert_eq!(des.bridge_lookup(0x1a), None);
    assert_eq!(des.links()[0].phase, BridgePhase::Unbound);
    // Detaching an absent address is a no-op.
    des.bridge_detach(0, 0x1a).unwrap();
}

#[test]
fn attach_refused_on_unknown_or_disabled_link() {
    let config = DesConfig {
        links: vec![
            LinkSetup::default(),
            LinkSetup {
                enabled: false,
                tunnel_mode: false,
            },
        ],
        ..two_camera_config()
    };
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &config).unwrap();
    let mut bus = SimBus::new();
    bus.add_device(0x40);

    assert!(matches!(
        des.bridge_attach(&mut bus, 7, 0x40, 0x1a),
        Err(BridgeError::UnknownLink(7))
    ));
    assert!(matches!(
        des.bridge_attach(&mut bus, 1, 0x40, 0x1a),
        Err(BridgeError::UnknownLink(1))
    ));
}

#[test]
fn tunnel_mode_pushes_a_whole_pipe_phy() {
    let caps = DesCaps {
        supports_tunnel_mode: true,
        ..DesCaps::default()
    };
    let config = DesConfig {
        links: vec![LinkSetup {
            enabled: true,
            tunnel_mode: true,
        }],
        channels: vec![
            ChannelSetup {
                pipe_id: Some(0),
                phy_id: Some(1),
                src_vc: 0,
                dst_vc: Some(0),
                format: Some(PixelFormat::Raw10),
            },
            ChannelSetup {
                pipe_id: Some(0),
                phy_id: Some(1),
                src_vc: 1,
                dst_vc: Some(1),
                format: Some(PixelFormat::Embedded),
            },
        ],
        ..DesConfig::default()
    };
    let mut des = Deserializer::new(SimDes::new(caps), &config).unwrap();
    des.init().unwrap();
    assert_eq!(des.ops().count_calls("set_pipe_remaps"), 0);
    assert_eq!(des.ops().pipe_phys[0], 1);
}

#[test]
fn tunnel_mode_rejects_split_phys() {
    let caps = DesCaps {
        supports_tunnel_mode: true,
        ..DesCaps::default()
    };
    let config = DesConfig {
        links: vec![LinkSetup {
            enabled: true,
            tunnel_mode: true,
        }],
        channels: vec![
            ChannelSetup {
                pipe_id: Some(0),
                phy_id: Some(0),
                src_vc: 0,
                dst_vc: Some(0),
                format: Some(PixelFormat::Raw10),
            },
            ChannelSetup {
                pipe_id: Some(0),
                phy_id: Some(1),
                src_vc: 1,
                dst_vc: Some(1),
                format: Some(PixelFormat::Raw10),
            },
        ],
        ..DesConfig::default()
    };
    let mut des = Deserializer::new(SimDes::new(caps), &config).unwrap();
    assert!(matches!(des.init(), Err(RoutingError::Invalid(_))));
}

#[test]
fn pipe_phy_routing_moves_channels_and_rebuilds_tables() {
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &two_camera_config()).unwrap();
    des.init().unwrap();

    // Sink pads (pipes) start at 4 with the default 4-phy chip. Only the
    // dst_vc 0 channel of pipe 0 moves to phy 2.
    let routes = vec![Route::new(4, 0, 2, 0)];
    des.set_routing(CrossbarKind::PipePhy, routes).unwrap();

    assert_eq!(des.channels()[0].phy_id, 2);
    assert_eq!(des.channels()[1].phy_id, 0);
    let on_phy_2 = des.ops().remaps[0].iter().filter(|r| r.phy == 2).count();
    assert_eq!(on_phy_2, 3);
    assert_eq!(des.ops().remaps[0].len(), 6);
    assert_eq!(des.pipes()[0].remaps, des.ops().remaps[0]);
}

#[test]
fn pipe_phy_push_failure_restores_channels() {
    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &two_camera_config()).unwrap();
    des.init().unwrap();
    des.ops_mut().fail_on("set_pipe_remaps");

    let err = des
        .set_routing(CrossbarKind::PipePhy, vec![Route::new(4, 0, 2, 0)])
        .unwrap_err();
    assert!(matches!(err, RoutingError::Hw(_)));
    assert_eq!(des.channels()[0].phy_id, 0);
    // The hardware still holds the table from bring-up.
    assert!(des.ops().remaps[0].iter().all(|r| r.phy == 0));
}

#[test]
fn tunnel_failure_restores_already_pushed_tables() {
    let caps = DesCaps {
        supports_tunnel_mode: true,
        ..DesCaps::default()
    };
    // Link 0 tunnels, link 1 carries a remapped pipe.
    let config = DesConfig {
        links: vec![
            LinkSetup {
                enabled: true,
                tunnel_mode: true,
            },
            LinkSetup::default(),
        ],
        channels: vec![
            ChannelSetup {
                pipe_id: Some(0),
                phy_id: Some(1),
                src_vc: 0,
                dst_vc: Some(0),
                format: Some(PixelFormat::Raw10),
            },
            ChannelSetup {
                pipe_id: Some(1),
                phy_id: Some(1),
                src_vc: 0,
                dst_vc: Some(1),
                format: Some(PixelFormat::Raw10),
            },
        ],
        ..DesConfig::default()
    };
    let mut des = Deserializer::new(SimDes::new(caps), &config).unwrap();
    des.init().unwrap();
    assert_eq!(des.ops().pipe_phys[0], 1);

    // Pipe 1's table goes out first, then the tunnel pipe's phy write fails.
    des.ops_mut().fail_on("set_pipe_phy");
    let routes = vec![Route::new(5, 1, 2, 0), Route::new(4, 0, 3, 0)];
    let err = des.set_routing(CrossbarKind::PipePhy, routes).unwrap_err();
    assert!(matches!(err, RoutingError::Hw(_)));

    // Both sides agree on the pre-routing state again.
    assert_eq!(des.channels()[1].phy_id, 1);
    assert_eq!(des.pipes()[1].remaps[0].phy, 1);
    assert_eq!(des.ops().remaps[1][0].phy, 1);
    assert_eq!(des.ops().pipe_phys[0], 1);
}

#[test]
fn serializer_filters_follow_the_channels() {
    let config = SerConfig {
        channels: vec![
            SerChannelSetup {
                phy_id: Some(0),
                vc: 0,
                format: Some(PixelFormat::Raw10),
            },
            SerChannelSetup {
                phy_id: Some(0),
                vc: 1,
                format: Some(PixelFormat::Raw10),
            },
            SerChannelSetup {
                phy_id: Some(0),
                vc: 2,
                format: Some(PixelFormat::Embedded),
            },
        ],
        ..SerConfig::default()
    };
    let mut ser = Serializer::new(SimSer::new(SerCaps::default()), &config).unwrap();
    ser.init().unwrap();

    // Pipe 0 sits on phy 0: three virtual channels, two distinct data types.
    assert_eq!(ser.ops().pipe_vcs[0], 0b111);
    assert_eq!(ser.ops().pipe_dts[0].len(), 2);
    assert_eq!(ser.pipes()[0].dts.len(), 2);
}

#[test]
fn serializer_rejects_too_many_data_types() {
    let config = SerConfig {
        channels: vec![
            SerChannelSetup {
                phy_id: Some(0),
                vc: 0,
                format: Some(PixelFormat::Raw10),
            },
            SerChannelSetup {
                phy_id: Some(0),
                vc: 1,
                format: Some(PixelFormat::Raw12),
            },
            SerChannelSetup {
                phy_id: Some(0),
                vc: 2,
                format: Some(PixelFormat::Rgb888),
            },
        ],
        ..SerConfig::default()
    };
    // The default chip filters two data types per pipe.
    let mut ser = Serializer::new(SimSer::new(SerCaps::default()), &config).unwrap();
    assert!(matches!(ser.init(), Err(RoutingError::Invalid(_))));
}

#[test]
fn serializer_rejects_out_of_range_virtual_channels() {
    let config = SerConfig {
        channels: vec![SerChannelSetup {
            phy_id: Some(0),
            vc: 20,
            format: Some(PixelFormat::Raw10),
        }],
        ..SerConfig::default()
    };
    let err = Serializer::new(SimSer::new(SerCaps::default()), &config).unwrap_err();
    assert!(matches!(err, RoutingError::Invalid(_)));
}

#[test]
fn serializer_phy_pipe_routing_refilters_pipes() {
    let config = SerConfig {
        channels: vec![
            SerChannelSetup {
                phy_id: Some(0),
                vc: 0,
                format: Some(PixelFormat::Raw10),
            },
            SerChannelSetup {
                phy_id: Some(1),
                vc: 1,
                format: Some(PixelFormat::Embedded),
            },
        ],
        ..SerConfig::default()
    };
    let mut ser = Serializer::new(SimSer::new(SerCaps::default()), &config).unwrap();
    ser.init().unwrap();
    assert_eq!(ser.ops().pipe_vcs[0], 0b01);

    // Sink pads (phys) start at 2 with the default 2-pipe chip: feed pipe 0
    // from phy 1 instead.
    let routes = vec![Route::new(3, 0, 0, 0)];
    ser.set_routing(CrossbarKind::PhyPipe, routes).unwrap();

    assert_eq!(ser.pipes()[0].phy_id, 1);
    assert_eq!(ser.ops().pipe_vcs[0], 0b10);
    assert_eq!(ser.pipes()[0].dts, ser.ops().pipe_dts[0]);
}

#[test]
fn serializer_phy_pipe_failure_restores_assignments() {
    let config = SerConfig {
        channels: vec![SerChannelSetup {
            phy_id: Some(0),
            vc: 0,
            format: Some(PixelFormat::Raw10),
        }],
        ..SerConfig::default()
    };
    let mut ser = Serializer::new(SimSer::new(SerCaps::default()), &config).unwrap();
    ser.init().unwrap();
    ser.ops_mut().fail_on("set_pipe_vcs");

    let err = ser
        .set_routing(CrossbarKind::PhyPipe, vec![Route::new(3, 0, 0, 0)])
        .unwrap_err();
    assert!(matches!(err, RoutingError::Hw(_)));
    assert_eq!(ser.pipes()[0].phy_id, 0);
    assert_eq!(ser.ops().pipe_vcs[0], 0b01);
}

#[test]
fn serializer_pipe_link_routing_reassigns_stream_ids() {
    let config = SerConfig {
        channels: vec![SerChannelSetup {
            phy_id: Some(0),
            vc: 0,
            format: Some(PixelFormat::Raw10),
        }],
        ..SerConfig::default()
    };
    let mut ser = Serializer::new(SimSer::new(SerCaps::default()), &config).unwrap();
    ser.init().unwrap();

    // Sink pad 1 is pipe 0 on the pipe/link crossbar.
    let routes = vec![Route::new(1, 0, 0, 3)];
    ser.set_routing(CrossbarKind::PipeLink, routes).unwrap();
    assert_eq!(ser.pipes()[0].stream_id, 3);

    // Failures leave the old assignment in place.
    ser.ops_mut().fail_on("set_pipe_stream_id");
    let err = ser
        .set_routing(CrossbarKind::PipeLink, vec![Route::new(1, 0, 0, 5)])
        .unwrap_err();
    assert!(matches!(err, RoutingError::Hw(_)));
    assert_eq!(ser.pipes()[0].stream_id, 3);
}

#[test]
fn serializer_xlate_table_is_bounded_and_compacts() {
    let config = SerConfig::default();
    let mut ser = Serializer::new(SimSer::new(SerCaps::default()), &config).unwrap();

    ser.attach_xlate(0x1a, 0x40).unwrap();
    ser.attach_xlate(0x1b, 0x42).unwrap();
    assert_eq!(ser.xlate_lookup(0x1a), Some(0x40));

    // The default chip has two slots.
    assert!(matches!(
        ser.attach_xlate(0x1c, 0x44),
        Err(BridgeError::XlateTableFull(2))
    ));
    assert!(matches!(
        ser.attach_xlate(0x1a, 0x46),
        Err(BridgeError::AlreadyBound(0))
    ));

    ser.detach_xlate(0x40).unwrap();
    assert_eq!(ser.xlate_lookup(0x1a), None);
    assert_eq!(ser.xlates(), &[serlink_core::I2cXlate { src: 0x1b, dst: 0x42 }]);
    // Now there is room again.
    ser.attach_xlate(0x1c, 0x44).unwrap();
    assert_eq!(ser.ops().xlates.len(), 2);
}

#[test]
fn serializer_streams_toggle_phys_and_pipes() {
    let config = SerConfig {
        channels: vec![SerChannelSetup {
            phy_id: Some(0),
            vc: 0,
            format: Some(PixelFormat::Raw10),
        }],
        ..SerConfig::default()
    };
    let mut ser = Serializer::new(SimSer::new(SerCaps::default()), &config).unwrap();
    ser.init().unwrap();

    ser.enable_link_streams(0b1).unwrap();
    assert_eq!(ser.ops().count_calls("set_phy_active"), 1);
    assert_eq!(ser.ops().count_calls("set_pipe_enable"), 1);
    assert!(ser.ops().enabled);

    ser.disable_link_streams(0b1).unwrap();
    assert!(!ser.ops().enabled);
    assert!(!ser.ops().phy_active[0]);
}
