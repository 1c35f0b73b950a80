//! Integration tests for the ostinato effect runtime.
//!
//! Test categories:
//! - Lifecycle: load/compile/install, retry machine, introspection
//! - Sliders: masks, visibility, curves, host write visibility
//! - Presets: RPL banks on disk, bank publication, preset application
//! - State: save/load round trips, undo history
//! - Concurrency: cross-thread slider transfer, worker hand-offs
//!
//! Run with:
//! ```bash
//! cargo test -p ostinato --test integration_tests
//! ```

mod helpers;
mod integration;

pub use integration::*;
