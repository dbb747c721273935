//! System-wide admission control for circuit transitions.
//!
//! The controller owns a fixed number of slots and a FIFO ring of circuits
//! waiting for one. It only tracks identifiers; driving circuits into and out
//! of their transition states is the sequencer's job, which keeps the slot
//! bookkeeping free of any actuator side effects.

use core::fmt;

use heapless::{Deque, Vec};

use crate::circuit::CircuitId;
use crate::config::ConfigError;

/// Result of a slot request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Admission {
    /// A slot was granted; the circuit may start moving now.
    Granted,
    /// Every slot is busy; the circuit waits at `position` (0 == next).
    Queued { position: usize },
    /// The circuit was already waiting; its entry keeps its place.
    AlreadyQueued { position: usize },
}

/// Contract violations reported by the admission controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AdmissionError {
    /// Identifier lies outside the controller's arena.
    UnknownCircuit(CircuitId),
    /// The circuit already holds a slot.
    SlotAlreadyHeld(CircuitId),
    /// Release requested for a circuit that holds no slot.
    NotHoldingSlot(CircuitId),
    /// Wait queue exhausted (only possible with out-of-range identifiers).
    QueueFull(CircuitId),
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::UnknownCircuit(id) => write!(f, "unknown circuit {id}"),
            AdmissionError::SlotAlreadyHeld(id) => write!(f, "circuit {id} already holds a slot"),
            AdmissionError::NotHoldingSlot(id) => write!(f, "circuit {id} holds no slot"),
            AdmissionError::QueueFull(id) => write!(f, "wait queue full while queueing {id}"),
        }
    }
}

/// Circuits granted a slot by a single release.
pub type Admitted<const N: usize> = Vec<CircuitId, N>;

/// Bounded slot pool with a FIFO wait queue for up to `N` circuits.
#[derive(Clone, Debug)]
pub struct AdmissionController<const N: usize> {
    capacity: usize,
    active: usize,
    holders: [bool; N],
    queue: Deque<CircuitId, N>,
}

impl<const N: usize> AdmissionController<N> {
    /// Creates a controller allowing `capacity` simultaneous transitions.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }

        Ok(Self {
            capacity,
            active: 0,
            holders: [false; N],
            queue: Deque::new(),
        })
    }

    /// Maximum number of simultaneous transitions.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    pub const fn active_count(&self) -> usize {
        self.active
    }

    /// Number of slots that could be granted right now.
    pub const fn available(&self) -> usize {
        self.capacity.saturating_sub(self.active)
    }

    /// Number of circuits waiting for a slot.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Waiting circuits, head of the queue first.
    pub fn queued(&self) -> impl Iterator<Item = CircuitId> + '_ {
        self.queue.iter().copied()
    }

    /// Returns `true` when `circuit` currently holds a slot.
    pub fn holds_slot(&self, circuit: CircuitId) -> bool {
        self.holders
            .get(circuit.as_index())
            .copied()
            .unwrap_or(false)
    }

    /// Position of `circuit` in the wait queue, if it is waiting.
    pub fn queue_position(&self, circuit: CircuitId) -> Option<usize> {
        self.queue.iter().position(|queued| *queued == circuit)
    }

    /// Returns `true` when `circuit` is waiting for a slot.
    pub fn is_queued(&self, circuit: CircuitId) -> bool {
        self.queue_position(circuit).is_some()
    }

    /// Grants a slot to `circuit` or appends it to the wait queue.
    ///
    /// A circuit that is already waiting keeps its place.
    pub fn request(&mut self, circuit: CircuitId) -> Result<Admission, AdmissionError> {
        let index = Self::check(circuit)?;
        if self.holders[index] {
            return Err(AdmissionError::SlotAlreadyHeld(circuit));
        }
        if let Some(position) = self.queue_position(circuit) {
            return Ok(Admission::AlreadyQueued { position });
        }
        if self.active < self.capacity {
            self.grant(index);
            return Ok(Admission::Granted);
        }

        let position = self.queue.len();
        self.queue
            .push_back(circuit)
            .map_err(AdmissionError::QueueFull)?;
        Ok(Admission::Queued { position })
    }

    /// Returns the slot held by `circuit` and admits waiting circuits in FIFO order.
    pub fn release(&mut self, circuit: CircuitId) -> Result<Admitted<N>, AdmissionError> {
        let index = Self::check(circuit)?;
        if !self.holders[index] {
            return Err(AdmissionError::NotHoldingSlot(circuit));
        }

        self.holders[index] = false;
        self.active -= 1;

        let mut admitted = Admitted::new();
        while let Some(next) = self.admit_next() {
            // At most N distinct circuits can be admitted at once.
            if admitted.push(next).is_err() {
                break;
            }
        }
        Ok(admitted)
    }

    /// Pops the head of the wait queue if a slot is free.
    pub fn admit_next(&mut self) -> Option<CircuitId> {
        if self.active >= self.capacity {
            return None;
        }

        let next = self.queue.pop_front()?;
        self.grant(next.as_index());
        Some(next)
    }

    /// Removes `circuit` from the wait queue, preserving the order of the rest.
    ///
    /// Returns `true` when an entry was removed.
    pub fn withdraw(&mut self, circuit: CircuitId) -> bool {
        let mut removed = false;
        for _ in 0..self.queue.len() {
            let Some(entry) = self.queue.pop_front() else {
                break;
            };
            if entry == circuit && !removed {
                removed = true;
            } else if self.queue.push_back(entry).is_err() {
                break;
            }
        }
        removed
    }

    fn check(circuit: CircuitId) -> Result<usize, AdmissionError> {
        let index = circuit.as_index();
        if index < N {
            Ok(index)
        } else {
            Err(AdmissionError::UnknownCircuit(circuit))
        }
    }

    fn grant(&mut self, index: usize) {
        self.holders[index] = true;
        self.active += 1;
    }
}
