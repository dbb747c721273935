#![no_std]

// Shared logic for the valve sequencer.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Every collection is fixed-capacity so the scheduler
// never allocates once a `Sequencer` has been built.

pub mod admission;
pub mod circuit;
pub mod config;
pub mod console;
pub mod sequencer;
pub mod status;
pub mod telemetry;

pub use admission::{Admission, AdmissionController, AdmissionError};
pub use circuit::{
    ActuatorLevel, Circuit, CircuitId, CircuitState, CircuitStatus, Direction, OutputPolarity,
};
pub use config::{CircuitConfig, ConfigError, OutputRef, SequencerConfig};
pub use sequencer::{
    CommandOutcome, NoopStatusSink, NoopValveDriver, Sequencer, SequencerError, StatusSink,
    TickReport, ValveDriver,
};
