//! Test helpers and fixtures for ostinato integration tests.
//!
//! Effects are written to a scratch directory per test, loaded through
//! the host facade, and driven with manual cycles so the tests stay
//! deterministic without any audio hardware.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ostinato::prelude::*;
use ostinato::EffectHost;

/// Standard frame count for one manual cycle.
pub const TEST_BLOCK: usize = 64;

/// A scratch directory holding effect sources for one test.
pub struct Fixture {
    pub dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Fixture {
        Fixture {
            dir: tempfile::tempdir().expect("failed to create scratch dir"),
        }
    }

    /// Write a source file under the scratch root; parent directories are
    /// created on demand.
    pub fn write(&self, rel: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        std::fs::write(&path, text).expect("failed to write fixture file");
        path
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Build a host rooted at this fixture's directory.
    pub fn host(&self) -> EffectHost {
        let config = Arc::new(Config::new().with_import_root(self.dir.path()));
        EffectHost::new(config)
    }

    /// Write `text` as an effect file and load it into a fresh host.
    pub fn host_with(&self, text: &str) -> EffectHost {
        let path = self.write("effect.jsfx", text);
        let host = self.host();
        host.load(&path, None).expect("effect failed to load");
        host
    }
}

/// Run one processing cycle with silent mono input.
pub fn run_block(host: &EffectHost, frames: usize) {
    let input = vec![0.0f32; frames];
    let mut output = vec![0.0f32; frames];
    let ins: [&[f32]; 1] = [&input];
    let mut outs: [&mut [f32]; 1] = [&mut output];
    host.process_float(&ins, &mut outs, frames);
}

/// Run one stereo cycle over the given input, returning the output.
pub fn run_stereo_block(host: &EffectHost, left: &[f32], right: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let frames = left.len().min(right.len());
    let mut out_l = vec![0.0f32; frames];
    let mut out_r = vec![0.0f32; frames];
    let ins: [&[f32]; 2] = [left, right];
    {
        let mut outs: [&mut [f32]; 2] = [&mut out_l, &mut out_r];
        host.process_float(&ins, &mut outs, frames);
    }
    (out_l, out_r)
}
