#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The sequencer task publishes circuit states, slot usage and the aggregate
//! flag into lightweight atomics so the console task can render a
//! `StatusSnapshot` without touching the sequencer directly.

use core::time::Duration;

use portable_atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use valve_core::status::{CircuitSample, StatusSnapshot};
use valve_core::telemetry::TelemetryRecord;
use valve_core::{CircuitId, CircuitState, CircuitStatus, StatusSink};

use crate::valves::{BOARD_CIRCUITS, MAX_CIRCUITS, MAX_CONCURRENT};

/// Encoded [`CircuitState`] per circuit.
static CIRCUIT_STATES: [AtomicU8; MAX_CIRCUITS] = [const { AtomicU8::new(0) }; MAX_CIRCUITS];
/// Mirrors the published "any circuit open" flag.
static AGGREGATE_OPEN: AtomicBool = AtomicBool::new(false);
/// Slots currently held.
static ACTIVE_SLOTS: AtomicU8 = AtomicU8::new(0);
/// Circuits waiting for a slot.
static QUEUED: AtomicU8 = AtomicU8::new(0);
/// Sequencer uptime in milliseconds.
static UPTIME_MS: AtomicU32 = AtomicU32::new(0);

const fn encode_state(state: CircuitState) -> u8 {
    match state {
        CircuitState::Closed => 0,
        CircuitState::Open => 1,
        CircuitState::OpeningTransition => 2,
        CircuitState::ClosingTransition => 3,
    }
}

const fn decode_state(raw: u8) -> CircuitState {
    match raw {
        1 => CircuitState::Open,
        2 => CircuitState::OpeningTransition,
        3 => CircuitState::ClosingTransition,
        _ => CircuitState::Closed,
    }
}

fn saturate_u8(value: usize) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}

/// Records the latest state of a circuit.
pub fn record_circuit_state(circuit: CircuitId, state: CircuitState) {
    if let Some(slot) = CIRCUIT_STATES.get(circuit.as_index()) {
        slot.store(encode_state(state), Ordering::Relaxed);
    }
}

/// Returns the last recorded state of a circuit.
pub fn circuit_state(circuit: CircuitId) -> CircuitState {
    CIRCUIT_STATES
        .get(circuit.as_index())
        .map_or(CircuitState::Closed, |slot| {
            decode_state(slot.load(Ordering::Relaxed))
        })
}

/// Stores the "any circuit open" flag.
pub fn record_aggregate(open: bool) {
    AGGREGATE_OPEN.store(open, Ordering::Relaxed);
}

/// Stores slot usage and uptime after each sequencer operation.
pub fn record_slots(active: usize, queued: usize, uptime: Duration) {
    ACTIVE_SLOTS.store(saturate_u8(active), Ordering::Relaxed);
    QUEUED.store(saturate_u8(queued), Ordering::Relaxed);
    let millis = u32::try_from(uptime.as_millis()).unwrap_or(u32::MAX);
    UPTIME_MS.store(millis, Ordering::Relaxed);
}

/// Builds a [`StatusSnapshot`] using the stored values.
pub fn snapshot() -> StatusSnapshot<MAX_CIRCUITS> {
    let mut snapshot = StatusSnapshot::empty(MAX_CONCURRENT);
    snapshot.active = usize::from(ACTIVE_SLOTS.load(Ordering::Relaxed));
    snapshot.queued = usize::from(QUEUED.load(Ordering::Relaxed));
    snapshot.aggregate_open = AGGREGATE_OPEN.load(Ordering::Relaxed);
    snapshot.uptime = Duration::from_millis(u64::from(UPTIME_MS.load(Ordering::Relaxed)));

    for (index, config) in BOARD_CIRCUITS.iter().enumerate() {
        let Some(id) = CircuitId::from_index(index) else {
            break;
        };
        let sample = CircuitSample::new(id, config.key, config.name, circuit_state(id));
        if snapshot.circuits.push(sample).is_err() {
            break;
        }
    }
    snapshot
}

/// [`StatusSink`] that mirrors observables into the status atomics and logs them.
#[derive(Copy, Clone, Debug, Default)]
pub struct FirmwareStatusSink;

impl FirmwareStatusSink {
    pub const fn new() -> Self {
        Self
    }
}

impl StatusSink for FirmwareStatusSink {
    fn circuit_changed(&mut self, circuit: CircuitId, state: CircuitState) {
        record_circuit_state(circuit, state);
        log_circuit(circuit, state);
    }

    fn aggregate_changed(&mut self, open: bool) {
        record_aggregate(open);
        log_aggregate(open);
    }

    fn record(&mut self, record: &TelemetryRecord) {
        log_event(record);
    }
}

fn name_of(circuit: CircuitId) -> &'static str {
    BOARD_CIRCUITS
        .get(circuit.as_index())
        .map_or("?", |config| config.name)
}

#[cfg(target_os = "none")]
fn log_circuit(circuit: CircuitId, state: CircuitState) {
    let status = CircuitStatus::from_state(state);
    defmt::info!(
        "status: {} Status={} {} Moving={} ({})",
        name_of(circuit),
        status.open,
        name_of(circuit),
        status.moving,
        state.label()
    );
}

#[cfg(not(target_os = "none"))]
fn log_circuit(circuit: CircuitId, state: CircuitState) {
    let status = CircuitStatus::from_state(state);
    println!(
        "status: {} Status={} {} Moving={} ({})",
        name_of(circuit),
        status.open,
        name_of(circuit),
        status.moving,
        state
    );
}

#[cfg(target_os = "none")]
fn log_aggregate(open: bool) {
    defmt::info!("status: aggregate open={}", open);
}

#[cfg(not(target_os = "none"))]
fn log_aggregate(open: bool) {
    println!("status: aggregate open={open}");
}

#[cfg(target_os = "none")]
fn log_event(record: &TelemetryRecord) {
    defmt::debug!("telemetry: {}", defmt::Display2Format(record));
}

#[cfg(not(target_os = "none"))]
fn log_event(record: &TelemetryRecord) {
    println!("telemetry: {record}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_encoding_round_trips_every_state() {
        for state in [
            CircuitState::Closed,
            CircuitState::Open,
            CircuitState::OpeningTransition,
            CircuitState::ClosingTransition,
        ] {
            assert_eq!(decode_state(encode_state(state)), state);
        }
        assert_eq!(decode_state(0xff), CircuitState::Closed);
    }

    #[test]
    fn out_of_range_circuits_are_ignored() {
        let ghost = CircuitId::new(200);
        record_circuit_state(ghost, CircuitState::Open);
        assert_eq!(circuit_state(ghost), CircuitState::Closed);
    }

    #[test]
    fn snapshot_lists_every_board_circuit() {
        let snapshot = snapshot();
        assert_eq!(snapshot.circuits.len(), BOARD_CIRCUITS.len());
        assert_eq!(snapshot.capacity, MAX_CONCURRENT);
        assert_eq!(snapshot.circuits[0].key, "living");
        assert_eq!(snapshot.circuits[5].name, "Hallway");
    }

    #[test]
    fn saturating_counters() {
        assert_eq!(saturate_u8(3), 3);
        assert_eq!(saturate_u8(1_000), u8::MAX);
    }
}
