//! Scheduler event catalog and the bounded history kept for diagnostics.
//!
//! Every transition start, completion, queue change and aggregate flip is
//! stamped with a monotonically increasing [`EventId`] and the sequencer uptime,
//! then stored in a fixed-size ring so the console can replay recent activity.

use core::fmt;
use core::time::Duration;

use heapless::{HistoryBuf, OldestOrdered};

use crate::circuit::{CircuitId, CircuitState, Direction};
use crate::status::write_duration;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Monotonic identifier assigned to every recorded event.
pub type EventId = u32;

/// Scheduler events shared by firmware and host targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    /// A circuit acquired a slot and its actuator started travelling.
    TransitionStarted {
        circuit: CircuitId,
        direction: Direction,
    },
    /// A circuit finished travelling and released its slot.
    TransitionCompleted {
        circuit: CircuitId,
        state: CircuitState,
    },
    /// A circuit joined the wait queue at `position`.
    Queued {
        circuit: CircuitId,
        direction: Direction,
        position: usize,
    },
    /// A queued circuit was commanded back to its resting state.
    Withdrawn { circuit: CircuitId },
    /// A moving circuit was commanded the other way.
    ReversalDeferred {
        circuit: CircuitId,
        direction: Direction,
    },
    /// The "any circuit open" flag changed.
    AggregateChanged { open: bool },
}

impl TelemetryEventKind {
    /// Circuit the event refers to, if any.
    pub const fn circuit(&self) -> Option<CircuitId> {
        match *self {
            TelemetryEventKind::TransitionStarted { circuit, .. }
            | TelemetryEventKind::TransitionCompleted { circuit, .. }
            | TelemetryEventKind::Queued { circuit, .. }
            | TelemetryEventKind::Withdrawn { circuit }
            | TelemetryEventKind::ReversalDeferred { circuit, .. } => Some(circuit),
            TelemetryEventKind::AggregateChanged { .. } => None,
        }
    }
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::TransitionStarted { circuit, direction } => {
                write!(f, "transition-started {circuit} {direction}")
            }
            TelemetryEventKind::TransitionCompleted { circuit, state } => {
                write!(f, "transition-completed {circuit} {state}")
            }
            TelemetryEventKind::Queued {
                circuit,
                direction,
                position,
            } => write!(f, "queued {circuit} {direction} position={position}"),
            TelemetryEventKind::Withdrawn { circuit } => write!(f, "withdrawn {circuit}"),
            TelemetryEventKind::ReversalDeferred { circuit, direction } => {
                write!(f, "reversal-deferred {circuit} {direction}")
            }
            TelemetryEventKind::AggregateChanged { open } => {
                write!(f, "aggregate {}", if *open { "open" } else { "closed" })
            }
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TelemetryRecord {
    pub id: EventId,
    /// Sequencer uptime when the event happened.
    pub uptime: Duration,
    pub event: TelemetryEventKind,
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] t=", self.id)?;
        write_duration(f, self.uptime)?;
        write!(f, " {}", self.event)
    }
}

/// Records scheduler events into a fixed-size ring buffer.
#[derive(Debug)]
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: HistoryBuf<TelemetryRecord, CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Stores `event` and returns the stamped record.
    pub fn record(&mut self, uptime: Duration, event: TelemetryEventKind) -> TelemetryRecord {
        let record = TelemetryRecord {
            id: self.next_event_id,
            uptime,
            event,
        };
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(record);
        record
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    /// Returns the last `count` records in chronological order.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &TelemetryRecord> + '_ {
        let skip = self.ring.len().saturating_sub(count);
        self.ring.oldest_ordered().skip(skip)
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Total number of events recorded, including evicted ones.
    pub const fn total_recorded(&self) -> EventId {
        self.next_event_id
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
