//! Property-based tests for routing validation, remap bounds, and stream
//! balance.

use proptest::prelude::*;

use serlink_core::{
    ChannelSetup, Component, ComponentKind, CrossbarKind, DesCaps, DesConfig, Deserializer,
    PixelFormat, Restrictions, Route, RoutingError, SimDes, validate_routes,
};

fn strict_xbar() -> Component {
    Component::new(
        ComponentKind::Crossbar(CrossbarKind::LinkPipe),
        "xbar",
        0,
        4,
        4,
        Restrictions {
            one_to_one_only: false,
            no_n_to_1: true,
            no_stream_mix: true,
        },
    )
}

proptest! {
    /// Any permutation of sink pads onto source pads is a valid route set,
    /// even under the strictest restrictions.
    #[test]
    fn permutation_route_sets_always_validate(perm in Just(vec![0u32, 1, 2, 3]).prop_shuffle()) {
        let comp = strict_xbar();
        let sink_base = comp.sink_pads().start;
        let routes: Vec<Route> = perm
            .iter()
            .enumerate()
            .map(|(i, &src)| Route::new(sink_base + i as u32, 0, src, 0))
            .collect();
        prop_assert!(validate_routes(&comp, &routes, |pad, _| u64::from(pad)).is_ok());
    }

    /// Duplicating any source endpoint always invalidates the set.
    #[test]
    fn duplicate_source_endpoints_always_fail(
        perm in Just(vec![0u32, 1, 2, 3]).prop_shuffle(),
        dup in 0usize..4,
        victim in 0usize..4,
    ) {
        prop_assume!(dup != victim);
        let comp = strict_xbar();
        let sink_base = comp.sink_pads().start;
        let mut routes: Vec<Route> = perm
            .iter()
            .enumerate()
            .map(|(i, &src)| Route::new(sink_base + i as u32, 0, src, 0))
            .collect();
        routes[victim].source_pad = routes[dup].source_pad;
        routes[victim].source_stream = routes[dup].source_stream;
        prop_assert!(validate_routes(&comp, &routes, |pad, _| u64::from(pad)).is_err());
    }

    /// Channel sets whose expansion exceeds the remap bound always fail with
    /// a typed error and never reach the hardware.
    #[test]
    fn over_capacity_channel_sets_never_touch_hardware(n in 6usize..13) {
        let channels: Vec<ChannelSetup> = (0..n)
            .map(|i| ChannelSetup {
                pipe_id: Some(0),
                phy_id: None,
                src_vc: i as u8,
                dst_vc: Some((i % 4) as u8),
                format: Some(PixelFormat::Raw10),
            })
            .collect();
        let config = DesConfig { channels, ..DesConfig::default() };
        let caps = DesCaps { max_remaps_per_pipe: 16, ..DesCaps::default() };
        let mut des = Deserializer::new(SimDes::new(caps), &config).unwrap();

        // 3 entries per channel, distinct link-side virtual channels.
        let err = des.init().unwrap_err();
        let is_expected_err = matches!(
            err,
            RoutingError::TooManyRemaps { pipe: 0, required, max: 16 } if required == 3 * n
        );
        prop_assert!(is_expected_err, "unexpected error: {:?}", err);
        prop_assert_eq!(des.ops().count_calls("set_pipe_remaps"), 0);
    }

    /// Any interleaving of enable/disable requests leaves the device idle
    /// and the hardware transitions balanced once everything is disabled.
    #[test]
    fn enable_disable_sequences_end_balanced(ops in prop::collection::vec(any::<bool>(), 0..24)) {
        let config = DesConfig {
            channels: vec![ChannelSetup {
                pipe_id: Some(0),
                src_vc: 0,
                dst_vc: Some(0),
                format: Some(PixelFormat::Raw10),
                ..ChannelSetup::default()
            }],
            ..DesConfig::default()
        };
        let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &config).unwrap();
        des.init().unwrap();

        for enable in ops {
            if enable {
                des.enable_phy_streams(0, 0b1).unwrap();
            } else {
                des.disable_phy_streams(0, 0b1).unwrap();
            }
        }
        des.disable_phy_streams(0, 0b1).unwrap();

        prop_assert!(!des.ops().enabled);
        prop_assert!(!des.ops().phy_enabled[0]);
        prop_assert!(!des.ops().pipe_enabled[0]);
        let on = des
            .ops()
            .calls()
            .iter()
            .filter(|c| c.as_str() == "set_enable(true)")
            .count();
        let off = des
            .ops()
            .calls()
            .iter()
            .filter(|c| c.as_str() == "set_enable(false)")
            .count();
        prop_assert_eq!(on, off);
    }
}
