//! Load/compile/install lifecycle through the host facade.

use crate::helpers::*;
use ostinato::prelude::*;
use ostinato::RetryLoadState;

#[test]
fn test_load_publishes_info() {
    let fixture = Fixture::new();
    let host = fixture.host_with(concat!(
        "desc:The Effect\n",
        "author:someone\n",
        "tags:delay stereo\n",
        "in_pin:L in\nin_pin:R in\nout_pin:L out\nout_pin:R out\n",
        "slider1:0.5<0,1,0.01>Mix\n",
        "@sample\nspl0 = spl0; spl1 = spl1;\n",
    ));

    assert!(host.is_loaded());
    let info = host.info().unwrap();
    assert_eq!(info.name, "The Effect");
    assert_eq!(info.author, "someone");
    assert_eq!(info.tags, vec!["delay", "stereo"]);
    assert_eq!(info.in_pins, vec!["L in", "R in"]);
    assert_eq!(info.out_pins, vec!["L out", "R out"]);
    assert_eq!(info.sliders.len(), 1);
    assert_eq!(info.sliders[0].name, "Mix");
}

#[test]
fn test_slider_alias_case_insensitivity() {
    // slider variables resolve case-insensitively: @init writes `foo`,
    // the slider is declared as `fOo`
    let fixture = Fixture::new();
    let host = fixture.host_with(
        "desc:alias\nout_pin:output\nslider1:fOo=1<1,3,0.1>the slider\n@init\nfoo=2;\n",
    );
    assert_eq!(host.slider_value(0), 2.0);
}

#[test]
fn test_import_diamond_loads_once() {
    let fixture = Fixture::new();
    fixture.write(
        "a.jsfx",
        "desc:a\nout_pin:output\nimport b.jsfx-inc\nimport c.jsfx-inc\n@init\ntotal = d_count;\n",
    );
    fixture.write("b.jsfx-inc", "import d.jsfx-inc\n@init\nb_seen = d_count;\n");
    fixture.write("c.jsfx-inc", "import d.jsfx-inc\n@init\nc_seen = d_count;\n");
    fixture.write("d.jsfx-inc", "@init\nd_count += 1;\n");

    let host = fixture.host();
    host.load(&fixture.root().join("a.jsfx"), None).unwrap();
    assert!(host.is_loaded());

    // D's @init ran exactly once, before B and C saw it
    let mut fx = Effect::new(Arc::new(
        Config::new().with_import_root(fixture.root()),
    ));
    fx.load_file(&fixture.root().join("a.jsfx"), LoadOptions::default())
        .unwrap();
    fx.compile(CompileOptions::default()).unwrap();
    fx.init();
    assert_eq!(fx.read_var("d_count"), 1.0);
    assert_eq!(fx.read_var("b_seen"), 1.0);
    assert_eq!(fx.read_var("c_seen"), 1.0);
    assert_eq!(fx.read_var("total"), 1.0);
}

#[test]
fn test_failed_load_without_state_stays_ok() {
    let fixture = Fixture::new();
    let host = fixture.host();
    let missing = fixture.root().join("nope.jsfx");

    assert!(host.load(&missing, None).is_err());
    assert!(!host.is_loaded());
    assert_eq!(host.retry_state(), RetryLoadState::Ok);
}

#[test]
fn test_failed_load_with_state_enters_retry() {
    let fixture = Fixture::new();
    let host = fixture.host();
    let missing = fixture.root().join("moved.jsfx");

    let held = FxState {
        sliders: vec![ostinato::SliderValue { index: 0, value: 2.5 }],
        data: Vec::new(),
    };
    assert!(host.load(&missing, Some(held)).is_err());
    assert_eq!(host.retry_state(), RetryLoadState::MustRetry);

    // pointing at a working file resumes with the held parameters
    let replacement = fixture.write(
        "found.jsfx",
        "desc:found\nout_pin:output\nslider1:0<0,10,0.5>Gain\n@sample\nspl0=0;\n",
    );
    host.retry_load(&replacement).unwrap();
    assert_eq!(host.retry_state(), RetryLoadState::Ok);
    assert!(host.is_loaded());
    assert_eq!(host.slider_value(0), 2.5);
}

#[test]
fn test_retry_failure_is_terminal() {
    let fixture = Fixture::new();
    let host = fixture.host();

    let held = FxState::default();
    assert!(host
        .load(&fixture.root().join("gone.jsfx"), Some(held))
        .is_err());
    assert_eq!(host.retry_state(), RetryLoadState::MustRetry);

    assert!(host.retry_load(&fixture.root().join("also-gone.jsfx")).is_err());
    assert_eq!(host.retry_state(), RetryLoadState::FailedRetry);
}

#[test]
fn test_hot_swap_floods_changed_masks() {
    let fixture = Fixture::new();
    let host = fixture.host_with(
        "desc:one\nout_pin:output\nslider1:1<0,10,1>A\n@sample\nspl0=0;\n",
    );
    // drain whatever the initial install flagged
    for group in 0..SLIDER_GROUPS as u8 {
        host.fetch_slider_changes(group);
    }

    let other = fixture.write(
        "other.jsfx",
        "desc:two\nout_pin:output\nslider2:5<0,10,1>B\n@sample\nspl0=0;\n",
    );
    host.load(&other, None).unwrap();

    // every group reads all-ones so the UI refreshes everything
    for group in 0..SLIDER_GROUPS as u8 {
        assert_eq!(host.fetch_slider_changes(group), u64::MAX);
        assert_eq!(host.fetch_slider_touches(group), 0);
    }
    assert_eq!(host.info().unwrap().name, "two");
}

#[test]
fn test_unload_clears_published_state() {
    let fixture = Fixture::new();
    let host = fixture.host_with("desc:x\nout_pin:output\n@sample\nspl0=0;\n");
    assert!(host.is_loaded());

    host.unload();
    assert!(!host.is_loaded());
    assert!(host.info().is_none());
    assert!(host.bank().is_none());
}

#[test]
fn test_process_passes_audio_through_loaded_gain() {
    let fixture = Fixture::new();
    let host = fixture.host_with(concat!(
        "desc:gain\nin_pin:L\nin_pin:R\nout_pin:L\nout_pin:R\n",
        "slider1:0.5<0,1,0.01>Gain\n",
        "@sample\nspl0 = spl0 * slider1; spl1 = spl1 * slider1;\n",
    ));

    let left = vec![1.0f32; TEST_BLOCK];
    let right = vec![-1.0f32; TEST_BLOCK];
    let (out_l, out_r) = run_stereo_block(&host, &left, &right);
    assert!(out_l.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    assert!(out_r.iter().all(|&s| (s + 0.5).abs() < 1e-6));
}
