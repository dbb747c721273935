//! Board valve table and the sequencer wrapper owned by the sequencer task.
//!
//! The firmware drives one relay output per heating circuit. Console commands
//! reach the sequencer through a bounded Embassy channel and are applied
//! between ticks, so the core `Sequencer` never sees concurrent access.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::time::Duration;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use valve_core::config::DEFAULT_OPEN_TIME;
use valve_core::{
    CircuitConfig, CircuitId, CommandOutcome, ConfigError, Direction, OutputRef, Sequencer,
    SequencerConfig, SequencerError, TickReport, ValveDriver,
};

use crate::status::{self, FirmwareStatusSink};

#[cfg(target_os = "none")]
mod gpio;

#[cfg(target_os = "none")]
pub use gpio::GpioValveDriver;

/// Relay outputs available on the board.
pub const MAX_CIRCUITS: usize = 8;

/// Circuits allowed to travel at once (limited by the 24 V actuator supply).
pub const MAX_CONCURRENT: usize = 3;

/// Thermal actuator travel time.
pub const OPEN_TIME: Duration = DEFAULT_OPEN_TIME;

/// Period of the sequencer tick.
pub const TICK_PERIOD: Duration = Duration::from_millis(250);

/// Depth of the command queue between the console and the sequencer task.
pub const COMMAND_QUEUE_DEPTH: usize = 8;

/// Circuits wired on this board, in relay order.
pub const BOARD_CIRCUITS: [CircuitConfig; 6] = [
    CircuitConfig::new("living", "Living Room", OutputRef::new(0)),
    CircuitConfig::new("kitchen", "Kitchen", OutputRef::new(1)),
    CircuitConfig::new("bath", "Bathroom", OutputRef::new(2)),
    CircuitConfig::new("bedroom", "Bedroom", OutputRef::new(3)),
    CircuitConfig::new("office", "Office", OutputRef::new(4)),
    // Normally-open actuator.
    CircuitConfig::new("hall", "Hallway", OutputRef::new(5)).inverted(),
];

#[cfg(target_os = "none")]
type ValveMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type ValveMutex = NoopRawMutex;

/// Open/close request forwarded from the console.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ValveCommand {
    pub circuit: CircuitId,
    pub direction: Direction,
}

/// Queue used to hand commands to the sequencer task.
pub type CommandQueue = Channel<ValveMutex, ValveCommand, COMMAND_QUEUE_DEPTH>;

/// Convenience sender type alias for the valve command queue.
pub type CommandSender<'a> = Sender<'a, ValveMutex, ValveCommand, COMMAND_QUEUE_DEPTH>;

/// Convenience receiver type alias for the valve command queue.
pub type CommandReceiver<'a> = Receiver<'a, ValveMutex, ValveCommand, COMMAND_QUEUE_DEPTH>;

/// Sequencer configuration for this board.
pub const fn board_config() -> SequencerConfig<'static> {
    SequencerConfig::new(&BOARD_CIRCUITS)
        .with_max_concurrent(MAX_CONCURRENT)
        .with_open_time(OPEN_TIME)
}

/// Looks up a board circuit by key.
pub fn circuit_by_key(key: &str) -> Option<CircuitId> {
    BOARD_CIRCUITS
        .iter()
        .position(|circuit| circuit.key == key)
        .and_then(CircuitId::from_index)
}

/// Converts a core duration into an Embassy duration.
pub fn embassy_duration(duration: Duration) -> embassy_time::Duration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    embassy_time::Duration::from_micros(micros)
}

/// Sequencer plus the firmware status store.
pub struct ValveGroup<D: ValveDriver> {
    sequencer: Sequencer<D, FirmwareStatusSink, MAX_CIRCUITS>,
}

impl<D: ValveDriver> ValveGroup<D> {
    /// Builds the board sequencer, closing every circuit.
    pub fn new(driver: D) -> Result<Self, ConfigError> {
        let config = board_config();
        log_config(&config);

        let sequencer = Sequencer::new(&config, driver, FirmwareStatusSink::new())?;
        let group = Self { sequencer };
        group.publish_slots();
        Ok(group)
    }

    pub fn sequencer(&self) -> &Sequencer<D, FirmwareStatusSink, MAX_CIRCUITS> {
        &self.sequencer
    }

    /// Applies a console command.
    pub fn apply(&mut self, command: ValveCommand) -> Result<CommandOutcome, SequencerError> {
        let result = self.sequencer.command(command.circuit, command.direction);
        match result {
            Ok(outcome) => log_command(command, outcome),
            Err(error) => log_command_rejected(command, error),
        }
        self.publish_slots();
        result
    }

    /// Advances the sequencer by one tick period.
    pub fn tick(&mut self, period: Duration) -> Result<TickReport, SequencerError> {
        let result = self.sequencer.tick(period);
        if let Err(error) = result {
            log_tick_failed(error);
        }
        self.publish_slots();
        result
    }

    fn publish_slots(&self) {
        status::record_slots(
            self.sequencer.active_count(),
            self.sequencer.queue_len(),
            self.sequencer.uptime(),
        );
    }
}

fn key_of(circuit: CircuitId) -> &'static str {
    BOARD_CIRCUITS
        .get(circuit.as_index())
        .map_or("?", |config| config.key)
}

#[cfg(target_os = "none")]
fn log_config(config: &SequencerConfig<'_>) {
    defmt::info!(
        "valves: {} circuits, max_concurrent={} open_time={}s tick={}ms",
        config.circuits.len(),
        config.max_concurrent,
        config.open_time.as_secs(),
        u32::try_from(TICK_PERIOD.as_millis()).unwrap_or(u32::MAX)
    );
}

#[cfg(not(target_os = "none"))]
fn log_config(config: &SequencerConfig<'_>) {
    println!(
        "valves: {} circuits, max_concurrent={} open_time={}s tick={}ms",
        config.circuits.len(),
        config.max_concurrent,
        config.open_time.as_secs(),
        TICK_PERIOD.as_millis()
    );
}

#[cfg(target_os = "none")]
fn log_command(command: ValveCommand, outcome: CommandOutcome) {
    defmt::info!(
        "valves: {} {} -> {}",
        key_of(command.circuit),
        defmt::Display2Format(&command.direction),
        defmt::Display2Format(&outcome)
    );
}

#[cfg(not(target_os = "none"))]
fn log_command(command: ValveCommand, outcome: CommandOutcome) {
    println!(
        "valves: {} {} -> {}",
        key_of(command.circuit),
        command.direction,
        outcome
    );
}

#[cfg(target_os = "none")]
fn log_command_rejected(command: ValveCommand, error: SequencerError) {
    defmt::warn!(
        "valves: {} {} rejected: {}",
        command.circuit.as_index(),
        defmt::Display2Format(&command.direction),
        defmt::Display2Format(&error)
    );
}

#[cfg(not(target_os = "none"))]
fn log_command_rejected(command: ValveCommand, error: SequencerError) {
    println!(
        "valves: {} {} rejected: {}",
        command.circuit, command.direction, error
    );
}

#[cfg(target_os = "none")]
fn log_tick_failed(error: SequencerError) {
    defmt::error!("valves: tick failed: {}", defmt::Display2Format(&error));
}

#[cfg(not(target_os = "none"))]
fn log_tick_failed(error: SequencerError) {
    println!("valves: tick failed: {error}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use valve_core::{CircuitState, NoopValveDriver};

    #[test]
    fn board_table_is_valid() {
        assert!(BOARD_CIRCUITS.len() <= MAX_CIRCUITS);
        assert_eq!(
            board_config().validate(MAX_CIRCUITS, |output| output.index() < MAX_CIRCUITS),
            Ok(())
        );
        assert_eq!(circuit_by_key("bath"), Some(CircuitId::new(2)));
        assert_eq!(circuit_by_key("garage"), None);
    }

    #[test]
    fn tick_period_converts_to_embassy_units() {
        assert_eq!(
            embassy_duration(TICK_PERIOD),
            embassy_time::Duration::from_millis(250)
        );
    }

    #[test]
    fn group_applies_commands_and_ticks() {
        let mut group = ValveGroup::new(NoopValveDriver).expect("board config is valid");
        let bath = CircuitId::new(2);

        let outcome = group
            .apply(ValveCommand {
                circuit: bath,
                direction: Direction::Open,
            })
            .expect("known circuit");
        assert_eq!(outcome, CommandOutcome::Started);

        let ticks = OPEN_TIME.as_millis() / TICK_PERIOD.as_millis();
        for _ in 0..ticks {
            group.tick(TICK_PERIOD).expect("tick succeeds");
        }
        assert_eq!(
            group.sequencer().circuit(bath).map(|circuit| circuit.state()),
            Some(CircuitState::Open)
        );

        let unknown = group.apply(ValveCommand {
            circuit: CircuitId::new(7),
            direction: Direction::Open,
        });
        assert_eq!(
            unknown,
            Err(SequencerError::UnknownCircuit(CircuitId::new(7)))
        );
    }
}
