//! RPL banks on disk and preset application.

use crate::helpers::*;
use ostinato::prelude::*;
use ostinato::{load_bank, save_bank, SliderValue};

fn sample_bank() -> Bank {
    let s1 = FxState {
        sliders: vec![
            SliderValue { index: 0, value: 0.25 },
            SliderValue { index: 1, value: 0.75 },
        ],
        data: vec![1, 2, 3, 4],
    };
    let s2 = FxState {
        sliders: vec![
            SliderValue { index: 0, value: 1.0 },
            SliderValue { index: 1, value: 0.0 },
        ],
        data: vec![9, 8, 7, 6, 5],
    };
    Bank::empty("X").add_preset("p1", s1).add_preset("p2", s2)
}

#[test]
fn test_bank_file_roundtrip() {
    let fixture = Fixture::new();
    let path = fixture.root().join("bank.rpl");
    let bank = sample_bank();

    save_bank(&path, &bank).unwrap();
    let again = load_bank(&path).unwrap();
    assert_eq!(bank, again);
}

#[test]
fn test_bank_discovered_next_to_effect() {
    let fixture = Fixture::new();
    let effect_path = fixture.write(
        "synth.jsfx",
        "desc:synth\nout_pin:output\nslider1:0<0,1,0.01>A\nslider2:0<0,1,0.01>B\n@sample\nspl0=0;\n",
    );
    save_bank(&fixture.root().join("synth.jsfx.rpl"), &sample_bank()).unwrap();

    let host = fixture.host();
    host.load(&effect_path, None).unwrap();

    let bank = host.bank().expect("bank should be discovered and published");
    assert_eq!(bank.name, "X");
    assert_eq!(bank.presets.len(), 2);
}

#[test]
fn test_apply_preset_sets_sliders() {
    let fixture = Fixture::new();
    let effect_path = fixture.write(
        "synth.jsfx",
        "desc:synth\nout_pin:output\nslider1:0<0,1,0.01>A\nslider2:0<0,1,0.01>B\n@sample\nspl0=0;\n",
    );
    save_bank(&fixture.root().join("synth.jsfx.rpl"), &sample_bank()).unwrap();

    let host = fixture.host();
    host.load(&effect_path, None).unwrap();

    assert!(host.apply_preset("p1"));
    assert_eq!(host.slider_value(0), 0.25);
    assert_eq!(host.slider_value(1), 0.75);

    assert!(host.apply_preset("p2"));
    assert_eq!(host.slider_value(0), 1.0);
    assert_eq!(host.slider_value(1), 0.0);

    assert!(!host.apply_preset("missing"));
}

#[test]
fn test_bank_primitives_through_host() {
    let fixture = Fixture::new();
    let host = fixture.host_with(
        "desc:x\nout_pin:output\nslider1:0<0,1,0.01>A\n@sample\nspl0=0;\n",
    );

    host.replace_bank(Bank::empty("mine"));
    let bank = host.bank().unwrap();
    assert_eq!(bank.preset_exists("init"), 0);

    let with_preset = bank.add_preset("init", host.save_state());
    assert_eq!(with_preset.preset_exists("init"), 1);
    host.replace_bank(with_preset);

    let renamed = host.bank().unwrap().rename_preset("init", "default");
    assert_eq!(renamed.preset_exists("init"), 0);
    assert_eq!(renamed.preset_exists("default"), 1);
    host.replace_bank(renamed);

    assert!(host.apply_preset("default"));
}

#[test]
fn test_replace_preset_keeps_index() {
    let bank = sample_bank();
    let replacement = FxState {
        sliders: vec![SliderValue { index: 0, value: 0.5 }],
        data: Vec::new(),
    };
    let updated = bank.add_preset("p1", replacement.clone());

    assert_eq!(updated.presets.len(), 2);
    assert_eq!(updated.preset_exists("p1"), 1);
    assert_eq!(updated.presets[0].state, replacement);
    // the original bank is untouched
    assert_eq!(bank.presets[0].state.sliders[0].value, 0.25);
}
