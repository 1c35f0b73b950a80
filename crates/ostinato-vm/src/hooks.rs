//! Host hook traits through which scripts reach the engine.

/// Slider-facing side effects raised by scripts.
///
/// Indices are 0-based slider ids. Implementations must be safe to call
/// from the audio thread: non-blocking, allocation-free.
pub trait SliderHooks: Send + Sync {
    /// `slider_show`: change visibility. `mode` is -1 (toggle), 0 (hide)
    /// or 1 (show).
    fn show(&self, index: u32, mode: i32);

    /// `sliderchange`: the script changed this slider's value and the host
    /// display should refresh.
    fn changed(&self, index: u32);

    /// `slider_automate`: the script wants this slider written to host
    /// automation. Implies `changed`.
    fn automate(&self, index: u32);

    /// Touch gesture publication; `touching == false` also requests an
    /// undo point.
    fn touch(&self, index: u32, touching: bool);
}

/// MIDI traffic between scripts and the engine's event queues.
pub trait MidiHooks: Send + Sync {
    /// Pop the next pending input event. Returns `(offset, data)`.
    fn recv(&self) -> Option<(u32, [u8; 3])>;

    /// Queue an output event.
    fn send(&self, offset: u32, data: [u8; 3]) -> bool;
}
