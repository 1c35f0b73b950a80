//! Bounded MIDI event queue.

use smallvec::SmallVec;

/// Default queue capacity in events.
pub const DEFAULT_MIDI_CAPACITY: usize = 1024;

/// One MIDI event within a processing cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiEvent {
    /// Bus the event belongs to.
    pub bus: u32,
    /// Frame offset within the cycle.
    pub offset: u32,
    /// Message bytes; short channel messages stay inline.
    pub data: SmallVec<[u8; 4]>,
}

impl MidiEvent {
    pub fn new(bus: u32, offset: u32, data: &[u8]) -> MidiEvent {
        MidiEvent {
            bus,
            offset,
            data: SmallVec::from_slice(data),
        }
    }

    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }
}

/// An ordered queue with a configurable event bound. When `extensible`,
/// the bound doubles instead of rejecting writes.
#[derive(Debug)]
pub struct MidiQueue {
    events: std::collections::VecDeque<MidiEvent>,
    capacity: usize,
    extensible: bool,
}

impl Default for MidiQueue {
    fn default() -> Self {
        MidiQueue::new(DEFAULT_MIDI_CAPACITY, false)
    }
}

impl MidiQueue {
    pub fn new(capacity: usize, extensible: bool) -> MidiQueue {
        MidiQueue {
            events: std::collections::VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
            extensible,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event; returns false when the queue is full and not
    /// extensible.
    pub fn send(&mut self, event: MidiEvent) -> bool {
        if self.events.len() >= self.capacity {
            if !self.extensible {
                return false;
            }
            self.capacity *= 2;
        }
        self.events.push_back(event);
        true
    }

    /// Pop the head event regardless of bus.
    pub fn receive(&mut self) -> Option<MidiEvent> {
        self.events.pop_front()
    }

    /// Pop the first event on `bus`, leaving the others in place.
    pub fn receive_from_bus(&mut self, bus: u32) -> Option<MidiEvent> {
        let at = self.events.iter().position(|e| e.bus == bus)?;
        self.events.remove(at)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
