//! Slider masks, visibility and curve behavior through the facade.

use crate::helpers::*;
use ostinato::prelude::*;
use ostinato::SliderShape;

#[test]
fn test_visibility_mutation_over_one_block() {
    let fixture = Fixture::new();
    let host = fixture.host_with(concat!(
        "desc:vis\nout_pin:output\n",
        "slider1:0<0,1,0.1>s1\n",
        "slider2:0<0,1,0.1>s2\n",
        "slider3:0<0,1,0.1>s3\n",
        "slider4:0<0,1,0.1>-s4\n",
        "slider5:0<0,1,0.1>-s5\n",
        "slider6:0<0,1,0.1>-s6\n",
        "slider7:0<0,1,0.1>-s7\n",
        "@block\n",
        "slider_show(1,0); slider_show(2,1); slider_show(3,-1);\n",
        "slider_show(4,0); slider_show(5,1); slider_show(6,-1);\n",
    ));

    assert_eq!(host.slider_visibility(0), 0b0000111);
    run_block(&host, TEST_BLOCK);
    assert_eq!(host.slider_visibility(0), 0b0110010);
}

#[test]
fn test_change_and_automation_masks_clear_on_fetch() {
    let fixture = Fixture::new();
    let host = fixture.host_with(concat!(
        "desc:masks\nout_pin:output\n",
        "slider1:0<0,1,0.1>s1\nslider2:0<0,1,0.1>s2\n",
        "@block\nsliderchange(slider1); slider_automate(slider2);\n",
    ));
    // discard the install-time flood
    host.fetch_slider_changes(0);

    for _ in 0..3 {
        run_block(&host, TEST_BLOCK);
        assert_eq!(host.fetch_slider_changes(0), 0b011);
        assert_eq!(host.fetch_slider_automations(0), 0b010);
        assert_eq!(host.fetch_slider_changes(0), 0);
        assert_eq!(host.fetch_slider_automations(0), 0);
    }
}

#[test]
fn test_touch_release_latches_undo_point() {
    let fixture = Fixture::new();
    let host = fixture.host_with(concat!(
        "desc:touch\nout_pin:output\n",
        "slider1:0<0,1,0.1>s1\nslider2:0<0,1,1>phase\n",
        "@block\n",
        "slider2 < 0.5 ? slider_automate(slider1, 1) : slider_automate(slider1, 0);\n",
    ));

    run_block(&host, TEST_BLOCK);
    assert_eq!(host.fetch_slider_touches(0), 0b1);

    host.set_slider_value(1, 1.0, false);
    run_block(&host, TEST_BLOCK);
    assert_eq!(host.fetch_slider_touches(0), 0);
    assert!(host.fetch_want_undopoint());
    assert!(!host.fetch_want_undopoint());
}

#[test]
fn test_host_write_transfers_to_block() {
    let fixture = Fixture::new();
    let host = fixture.host_with(concat!(
        "desc:xfer\nout_pin:output\nslider1:0<0,100,1>v\n",
        "@sample\nspl0 = slider1;\n",
    ));

    // several writes before one block: the last one wins
    host.set_slider_value(0, 10.0, false);
    host.set_slider_value(0, 20.0, false);
    host.set_slider_value(0, 64.0, false);

    let input = vec![0.0f32; 8];
    let mut output = vec![0.0f32; 8];
    let ins: [&[f32]; 1] = [&input];
    let mut outs: [&mut [f32]; 1] = [&mut output];
    host.process_float(&ins, &mut outs, 8);
    assert!(output.iter().all(|&s| s == 64.0));
}

#[test]
fn test_curve_lookup_through_info() {
    let fixture = Fixture::new();
    let host = fixture.host_with(concat!(
        "desc:curves\nout_pin:output\n",
        "slider1:1000<20,22050,1:log>Freq\n",
        "slider2:0<-12,12,0.1>Gain\n",
        "slider3:0<0,2,1{LP,BP,HP}>Mode\n",
        "@sample\nspl0=0;\n",
    ));

    let log = host.slider_curve(0).unwrap();
    assert_eq!(log.shape, SliderShape::Log);
    assert!((log.from_normalized(0.0) - 20.0).abs() < 1e-9);
    assert!((log.from_normalized(1.0) - 22050.0).abs() < 1e-6);
    // geometric center comes out at the halfway point
    assert!((log.from_normalized(0.5) - 664.08).abs() < 0.01);

    let linear = host.slider_curve(1).unwrap();
    assert_eq!(linear.from_normalized(0.5), 0.0);
    // the raw variant of a range spanning zero pins 0 at 0.5 too
    assert_eq!(linear.from_normalized_raw(0.5), 0.0);
    assert_eq!(linear.from_normalized_raw(0.25), -6.0);

    let info = host.info().unwrap();
    let mode = info.slider(2).unwrap();
    assert!(mode.is_enum);
    assert_eq!(mode.enum_names, vec!["LP", "BP", "HP"]);
}

#[test]
fn test_log_curve_degenerate_center_is_linear() {
    let fixture = Fixture::new();
    let host = fixture.host_with(concat!(
        "desc:degenerate\nout_pin:output\n",
        "slider1:0<-1000,1000,1:log>sym\n",
        "@sample\nspl0=0;\n",
    ));

    let curve = host.slider_curve(0).unwrap();
    for i in 0..=20 {
        let t = i as f64 * 0.05;
        let linear = curve.min + t * (curve.max - curve.min);
        assert!((curve.from_normalized(t) - linear).abs() < 1e-9);
    }
}

#[test]
fn test_slider_group_arithmetic() {
    use ostinato::{slider_group, slider_mask};
    for index in 0..256u32 {
        assert!(slider_group(index) < 4);
        assert_eq!(slider_mask(index).count_ones(), 1);
    }
    assert_eq!(slider_group(100), 1);
    assert_eq!(slider_mask(100), 1 << 36);
}

#[test]
fn test_high_slider_masks_route_to_their_group() {
    let fixture = Fixture::new();
    let host = fixture.host_with(concat!(
        "desc:high\nout_pin:output\n",
        "slider200:0<0,1,0.1>high\n",
        "@block\nsliderchange(slider200);\n",
    ));
    host.fetch_slider_changes(3);

    run_block(&host, TEST_BLOCK);
    assert_eq!(host.fetch_slider_changes(0), 0);
    assert_eq!(host.fetch_slider_changes(3), 1u64 << (199 % 64));
}
