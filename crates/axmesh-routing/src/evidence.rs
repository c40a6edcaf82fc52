//! Link evidence: class weights and the recent-observation window
//!
//! Every observation on a link becomes a weighted piece of evidence for the
//! forward direction, the reverse direction, or neither. The weights are
//! configuration; [`EvidenceWindow`] keeps the last few samples per link in
//! a fixed-size ring so bursts can be inspected without unbounded growth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use axmesh_core::FrameClass;

/// Evidence value of each frame class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceWeights {
    /// Data frames (I-frames, addressed UI with payload)
    pub data: f64,
    /// Routing broadcasts
    pub routing_broadcast: f64,
    /// Beacons and other unacknowledged UI traffic
    pub beacon: f64,
    /// Connection setup and teardown
    pub connection: f64,
    /// Reverse evidence from an ack with sequence progress
    pub ack_progress: f64,
    /// Reverse evidence from an ack without progress
    pub ack_no_progress: f64,
    /// Forward evidence from a duplicate or retry
    pub duplicate: f64,
}

impl Default for EvidenceWeights {
    fn default() -> Self {
        Self {
            data: 1.0,
            routing_broadcast: 0.8,
            beacon: 0.4,
            connection: 0.4,
            ack_progress: 0.3,
            ack_no_progress: 0.1,
            duplicate: 0.0,
        }
    }
}

/// Evidence derived from one observation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Evidence {
    /// Evidence for the forward direction, if any
    pub forward: Option<f64>,
    /// Evidence for the reverse direction, if any
    pub reverse: Option<f64>,
}

impl Evidence {
    /// Whether the observation carries no evidence at all
    pub fn is_empty(&self) -> bool {
        self.forward.is_none() && self.reverse.is_none()
    }
}

impl EvidenceWeights {
    /// Evidence carried by an observation of `class`
    ///
    /// A duplicate never earns forward credit; it counts at the duplicate
    /// weight. A repeated ack cannot show progress.
    pub fn evidence_for(&self, class: FrameClass, is_duplicate: bool) -> Evidence {
        let forward = |weight: f64| Evidence {
            forward: Some(if is_duplicate { self.duplicate } else { weight }),
            reverse: None,
        };

        match class {
            FrameClass::Data => forward(self.data),
            FrameClass::RoutingBroadcast => forward(self.routing_broadcast),
            FrameClass::Beacon => forward(self.beacon),
            FrameClass::Connection => forward(self.connection),
            FrameClass::Ack { progress } => Evidence {
                forward: None,
                reverse: Some(if progress && !is_duplicate {
                    self.ack_progress
                } else {
                    self.ack_no_progress
                }),
            },
            FrameClass::Unknown => Evidence::default(),
        }
    }

    /// All weights, for validation
    pub(crate) fn all(&self) -> [f64; 7] {
        [
            self.data,
            self.routing_broadcast,
            self.beacon,
            self.connection,
            self.ack_progress,
            self.ack_no_progress,
            self.duplicate,
        ]
    }
}

/// One observation as remembered by the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationSample {
    /// When the observation happened
    pub timestamp: DateTime<Utc>,
    /// Forward evidence it carried
    pub forward_weight: Option<f64>,
    /// Reverse evidence it carried
    pub reverse_weight: Option<f64>,
    /// Whether it was flagged as a duplicate
    pub is_duplicate: bool,
}

/// Fixed-capacity ring of recent observations
///
/// Writes overwrite the oldest slot once full. Expiry is lazy: the read
/// cursor only moves when [`advance`](Self::advance) is called.
#[derive(Debug, Clone)]
pub struct EvidenceWindow {
    slots: Vec<ObservationSample>,
    capacity: usize,
    /// Next slot to write
    head: usize,
    /// Live samples, ending just before `head`
    len: usize,
}

impl EvidenceWindow {
    /// Create an empty window holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity: capacity.max(1),
            head: 0,
            len: 0,
        }
    }

    /// Record a sample, overwriting the oldest if full
    pub fn push(&mut self, sample: ObservationSample) {
        if self.slots.len() < self.capacity {
            self.slots.push(sample);
        } else {
            self.slots[self.head] = sample;
        }
        self.head = (self.head + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
    }

    /// Drop samples older than `cutoff` from the front of the window
    pub fn advance(&mut self, cutoff: DateTime<Utc>) {
        while self.len > 0 && self.slots[self.oldest_index()].timestamp < cutoff {
            self.len -= 1;
        }
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &ObservationSample> + '_ {
        let start = self.oldest_index();
        (0..self.len).map(move |offset| &self.slots[(start + offset) % self.capacity])
    }

    /// Number of live samples
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window holds no samples
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fraction of live samples flagged as duplicates
    pub fn duplicate_fraction(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        let duplicates = self.iter().filter(|s| s.is_duplicate).count();
        duplicates as f64 / self.len as f64
    }

    fn oldest_index(&self) -> usize {
        (self.head + self.capacity - self.len) % self.capacity
    }
}
