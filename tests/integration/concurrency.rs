//! Cross-thread behavior: slider transfer, worker hand-offs, install
//! under load.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::helpers::*;
use ostinato::prelude::*;

#[test]
fn test_message_thread_writes_reach_audio_thread() {
    let fixture = Fixture::new();
    let host = Arc::new(fixture.host_with(concat!(
        "desc:xfer\nout_pin:output\nslider1:0<0,1000,1>v\n",
        "@block\nlatest = slider1;\n",
    )));

    // "message thread": storms of parameter writes
    let writer_host = host.clone();
    let writer = thread::spawn(move || {
        for value in 1..=500u32 {
            writer_host.set_slider_value(0, value as f64, false);
        }
        500.0f64
    });

    // "audio thread": concurrent processing cycles
    let audio_host = host.clone();
    let audio = thread::spawn(move || {
        for _ in 0..50 {
            run_block(&audio_host, TEST_BLOCK);
            thread::sleep(Duration::from_micros(100));
        }
    });

    let final_value = writer.join().unwrap();
    audio.join().unwrap();

    // a write that returned before a later process call is visible to it
    run_block(&host, TEST_BLOCK);
    assert_eq!(host.slider_value(0), final_value);
}

#[test]
fn test_worker_forwards_slider_notifications() {
    let fixture = Fixture::new();
    let host = fixture.host_with(
        "desc:notify\nout_pin:output\nslider1:0<0,1,0.1>a\n@sample\nspl0=0;\n",
    );

    let seen = Arc::new(AtomicU64::new(0));
    let seen2 = seen.clone();
    host.set_slider_notify_callback(move |group, mask| {
        if group == 0 {
            seen2.fetch_or(mask, Ordering::SeqCst);
        }
    });

    host.post_slider_notification(0, 0b101);

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while seen.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(seen.load(Ordering::SeqCst), 0b101);
}

#[test]
fn test_parameter_name_invalidation_callback() {
    let fixture = Fixture::new();
    let host = fixture.host_with("desc:n\nout_pin:output\n@sample\nspl0=0;\n");

    let hits = Arc::new(AtomicU64::new(0));
    let hits2 = hits.clone();
    host.set_names_invalidated_callback(move || {
        hits2.fetch_add(1, Ordering::SeqCst);
    });

    host.invalidate_parameter_names();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while hits.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_install_while_audio_is_running() {
    let fixture = Fixture::new();
    let host = Arc::new(fixture.host_with(
        "desc:first\nout_pin:output\nslider1:1<0,10,1>a\n@sample\nspl0 = 0.25;\n",
    ));
    let other = fixture.write(
        "second.jsfx",
        "desc:second\nout_pin:output\nslider1:2<0,10,1>b\n@sample\nspl0 = 0.5;\n",
    );

    let audio_host = host.clone();
    let audio = thread::spawn(move || {
        for _ in 0..200 {
            run_block(&audio_host, 32);
        }
    });

    // swap the effect mid-stream; the installer suspends audio at a block
    // boundary, so no cycle sees a half-installed effect
    host.load(&other, None).unwrap();
    audio.join().unwrap();

    assert_eq!(host.info().unwrap().name, "second");
    let input = vec![0.0f32; 8];
    let mut output = vec![0.0f32; 8];
    let ins: [&[f32]; 1] = [&input];
    let mut outs: [&mut [f32]; 1] = [&mut output];
    host.process_float(&ins, &mut outs, 8);
    assert!(output.iter().all(|&s| s == 0.5));
}

#[test]
fn test_abandoned_wait_still_completes() {
    let fixture = Fixture::new();
    let host = Arc::new(fixture.host());
    let path = fixture.write(
        "late.jsfx",
        "desc:late\nout_pin:output\n@sample\nspl0=0;\n",
    );

    // fire-and-forget: the caller never waits, the worker still installs
    host.load_async(&path, None);

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !host.is_loaded() && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(host.is_loaded());
    assert_eq!(host.info().unwrap().name, "late");
}
