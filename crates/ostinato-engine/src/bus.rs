//! Atomic slider masks and value mirror shared across threads.
//!
//! 256 sliders shard into four 64-bit groups. "changed" and "automate"
//! are read-and-clear; "touch" and "visible" are last-write-wins
//! snapshots. The value mirror lets the host read slider values without
//! touching the VM.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use atomic_float::AtomicF64;

use crate::slider::MAX_SLIDERS;

/// Number of 64-slider groups.
pub const SLIDER_GROUPS: usize = MAX_SLIDERS / 64;

/// Group a slider index belongs to.
#[inline]
pub fn slider_group(index: u32) -> u8 {
    (index >> 6) as u8
}

/// Bit of a slider within its group word.
#[inline]
pub fn slider_mask(index: u32) -> u64 {
    1u64 << (index & 63)
}

/// Per-group atomic mask words, padded apart to keep writer threads off
/// each other's cache lines.
#[derive(Debug, Default)]
#[repr(align(64))]
struct GroupMasks {
    /// Host value writes awaiting application at the next block.
    pending: AtomicU64,
    /// Subset of `pending` that must trigger `@slider`.
    notify: AtomicU64,
    /// Script-side changes the host display should pick up.
    changed: AtomicU64,
    /// Sliders to forward to host automation.
    automate: AtomicU64,
    touch: AtomicU64,
    visible: AtomicU64,
}

/// The shared mask bus plus the slider value mirror.
///
/// `values` is the display mirror the audio thread republishes each
/// block; `staged` carries host writes until the block boundary applies
/// them, so a mirror refresh cannot clobber an in-flight write.
pub struct SliderBus {
    groups: [GroupMasks; SLIDER_GROUPS],
    values: Box<[AtomicF64]>,
    staged: Box<[AtomicF64]>,
    want_undo: AtomicBool,
}

impl Default for SliderBus {
    fn default() -> Self {
        SliderBus {
            groups: Default::default(),
            values: (0..MAX_SLIDERS).map(|_| AtomicF64::new(0.0)).collect(),
            staged: (0..MAX_SLIDERS).map(|_| AtomicF64::new(0.0)).collect(),
            want_undo: AtomicBool::new(false),
        }
    }
}

impl SliderBus {
    pub fn new() -> SliderBus {
        SliderBus::default()
    }

    #[inline]
    pub fn value(&self, index: u32) -> f64 {
        self.values[index as usize].load(Ordering::Acquire)
    }

    /// Refresh the display mirror (audio-thread side).
    #[inline]
    pub fn set_value(&self, index: u32, value: f64) {
        self.values[index as usize].store(value, Ordering::Release);
    }

    /// Stage a host-side value write for the next block boundary;
    /// `notify` additionally requests a `@slider` pass.
    pub fn post_host_write(&self, index: u32, value: f64, notify: bool) {
        self.staged[index as usize].store(value, Ordering::Release);
        self.values[index as usize].store(value, Ordering::Release);
        let group = &self.groups[slider_group(index) as usize];
        let bit = slider_mask(index);
        group.pending.fetch_or(bit, Ordering::AcqRel);
        if notify {
            group.notify.fetch_or(bit, Ordering::AcqRel);
        }
    }

    /// The staged value a pending write carries.
    #[inline]
    pub fn staged_value(&self, index: u32) -> f64 {
        self.staged[index as usize].load(Ordering::Acquire)
    }

    /// Take the pending and notify words for a group (read-and-clear).
    pub fn drain_pending(&self, group: u8) -> (u64, u64) {
        let g = &self.groups[group as usize];
        (
            g.pending.swap(0, Ordering::AcqRel),
            g.notify.swap(0, Ordering::AcqRel),
        )
    }

    pub fn mark_changed(&self, index: u32) {
        self.groups[slider_group(index) as usize]
            .changed
            .fetch_or(slider_mask(index), Ordering::AcqRel);
    }

    pub fn mark_automate(&self, index: u32) {
        let group = &self.groups[slider_group(index) as usize];
        let bit = slider_mask(index);
        group.automate.fetch_or(bit, Ordering::AcqRel);
        group.changed.fetch_or(bit, Ordering::AcqRel);
    }

    pub fn set_touch(&self, index: u32, touching: bool) {
        let group = &self.groups[slider_group(index) as usize];
        let bit = slider_mask(index);
        if touching {
            group.touch.fetch_or(bit, Ordering::AcqRel);
        } else {
            group.touch.fetch_and(!bit, Ordering::AcqRel);
            // a finished gesture is where hosts drop an undo point
            self.want_undo.store(true, Ordering::Release);
        }
    }

    /// Sliders whose values must be redisplayed (read-and-clear).
    pub fn fetch_changed(&self, group: u8) -> u64 {
        self.groups[group as usize].changed.swap(0, Ordering::AcqRel)
    }

    /// Sliders whose values must be written to host automation
    /// (read-and-clear).
    pub fn fetch_automate(&self, group: u8) -> u64 {
        self.groups[group as usize].automate.swap(0, Ordering::AcqRel)
    }

    /// Current touch snapshot.
    pub fn touches(&self, group: u8) -> u64 {
        self.groups[group as usize].touch.load(Ordering::Acquire)
    }

    pub fn set_visible(&self, index: u32, visible: bool) {
        let group = &self.groups[slider_group(index) as usize];
        let bit = slider_mask(index);
        if visible {
            group.visible.fetch_or(bit, Ordering::AcqRel);
        } else {
            group.visible.fetch_and(!bit, Ordering::AcqRel);
        }
    }

    pub fn toggle_visible(&self, index: u32) {
        self.groups[slider_group(index) as usize]
            .visible
            .fetch_xor(slider_mask(index), Ordering::AcqRel);
    }

    /// Current visibility snapshot.
    pub fn visibility(&self, group: u8) -> u64 {
        self.groups[group as usize].visible.load(Ordering::Acquire)
    }

    /// Replace a whole visibility word (used when (re)loading).
    pub fn set_visibility_word(&self, group: u8, word: u64) {
        self.groups[group as usize].visible.store(word, Ordering::Release);
    }

    /// Flood the changed masks so every slider gets refreshed, and clear
    /// any stale touches; used right after a hot swap.
    pub fn mark_all_changed(&self) {
        for group in &self.groups {
            group.changed.store(u64::MAX, Ordering::Release);
            group.touch.store(0, Ordering::Release);
        }
    }

    /// Whether a script asked for a manual undo point (read-and-clear).
    pub fn fetch_want_undopoint(&self) -> bool {
        self.want_undo.swap(false, Ordering::AcqRel)
    }
}

impl ostinato_vm::SliderHooks for SliderBus {
    fn show(&self, index: u32, mode: i32) {
        match mode {
            0 => self.set_visible(index, false),
            m if m < 0 => self.toggle_visible(index),
            _ => self.set_visible(index, true),
        }
    }

    fn changed(&self, index: u32) {
        self.mark_changed(index);
    }

    fn automate(&self, index: u32) {
        self.mark_automate(index);
    }

    fn touch(&self, index: u32, touching: bool) {
        self.set_touch(index, touching);
    }
}
