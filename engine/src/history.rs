use std::collections::VecDeque;

use sentinel_types::SensorEvent;

/// Most recent sequenced events, kept only for diagnostics. Oldest entries
/// fall off once `capacity` is reached; nothing is ever written to disk.
#[derive(Debug, Clone)]
pub struct RecentHistory {
    events: VecDeque<SensorEvent>,
    capacity: usize,
}

impl RecentHistory {
    pub fn new(capacity: usize) -> Self {
        Self { events: VecDeque::with_capacity(capacity.min(4096)), capacity }
    }

    pub fn record(&mut self, event: SensorEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<SensorEvent> {
        self.events.iter().copied().collect()
    }

    pub fn len(&self) -> usize { self.events.len() }
    pub fn is_empty(&self) -> bool { self.events.is_empty() }
}
