use std::collections::VecDeque;

use crate::model::LivePoint;

/// Bounded FIFO of chart samples; appending past capacity drops the oldest.
#[derive(Debug, Clone)]
pub struct LiveWindow {
    points: VecDeque<LivePoint>,
    capacity: usize,
}

impl LiveWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns the evicted sample, if any.
    pub fn push(&mut self, point: LivePoint) -> Option<LivePoint> {
        let evicted = if self.points.len() >= self.capacity {
            self.points.pop_front()
        } else {
            None
        };
        self.points.push_back(point);
        evicted
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&LivePoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LivePoint> {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<LivePoint> {
        self.points.iter().copied().collect()
    }
}
