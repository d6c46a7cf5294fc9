use std::collections::VecDeque;

use foundation::RequestGeneration;

/// Upload lifecycle milestones, kept for tracing and tests.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventKind {
    UploadStarted,
    UploadApplied,
    UploadFailed,
    /// A response arrived for a generation that is no longer current.
    UploadDiscarded,
    MeshBuilt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub generation: RequestGeneration,
    pub kind: EventKind,
    pub message: String,
}

/// Bounded trace: oldest events are dropped once `capacity` is reached.
#[derive(Debug)]
pub struct EventBus {
    events: VecDeque<Event>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(64)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn emit(&mut self, generation: RequestGeneration, kind: EventKind, message: impl Into<String>) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(Event {
            generation,
            kind,
            message: message.into(),
        });
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn drain(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_events_with_generation() {
        let mut bus = EventBus::new();
        bus.emit(RequestGeneration::new(2), EventKind::UploadStarted, "hello");
        assert_eq!(bus.len(), 1);
        let e = bus.events().next().unwrap();
        assert_eq!(e.generation.get(), 2);
        assert_eq!(e.kind, EventKind::UploadStarted);
    }

    #[test]
    fn drops_oldest_past_capacity() {
        let mut bus = EventBus::with_capacity(2);
        for n in 0..3 {
            bus.emit(RequestGeneration::new(n), EventKind::UploadApplied, "m");
        }
        let gens: Vec<u64> = bus.events().map(|e| e.generation.get()).collect();
        assert_eq!(gens, vec![1, 2]);
        assert_eq!(bus.count(EventKind::UploadApplied), 2);
    }

    #[test]
    fn drain_clears_events() {
        let mut bus = EventBus::new();
        bus.emit(RequestGeneration::default(), EventKind::UploadFailed, "m");
        let drained = bus.drain();
        assert_eq!(drained.len(), 1);
        assert!(bus.is_empty());
    }
}
