//! Circuit records and the per-circuit transition state machine.
//!
//! A circuit couples one actuator output with its command input and the two
//! observables derived from its state. Circuits never talk to the admission
//! controller themselves; the sequencer consults the [`Retarget`] decision a
//! circuit returns and acquires or releases slots on its behalf.

use core::fmt;
use core::time::Duration;

use crate::config::{CircuitConfig, OutputRef};

pub mod timer;

pub use timer::TransitionTimer;

/// Arena index identifying a configured circuit.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CircuitId(u8);

impl CircuitId {
    /// Wraps a raw arena index.
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Attempts to construct a [`CircuitId`] from a `usize` index.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index <= u8::MAX as usize {
            #[allow(clippy::cast_possible_truncation)]
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Deterministic index into the circuit arena.
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Logical target a circuit is commanded towards.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Open,
    Close,
}

impl Direction {
    /// Maps the boolean command input (`true` == open) onto a direction.
    pub const fn from_open(open: bool) -> Self {
        if open { Direction::Open } else { Direction::Close }
    }

    /// State the circuit rests in once travel in this direction completes.
    pub const fn resting_state(self) -> CircuitState {
        match self {
            Direction::Open => CircuitState::Open,
            Direction::Close => CircuitState::Closed,
        }
    }

    /// State the circuit occupies while travelling in this direction.
    pub const fn transition_state(self) -> CircuitState {
        match self {
            Direction::Open => CircuitState::OpeningTransition,
            Direction::Close => CircuitState::ClosingTransition,
        }
    }

    /// Returns the reverse direction.
    pub const fn opposite(self) -> Self {
        match self {
            Direction::Open => Direction::Close,
            Direction::Close => Direction::Open,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Open => "open",
            Direction::Close => "close",
        })
    }
}

/// Physical condition of a circuit as tracked by the sequencer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    OpeningTransition,
    ClosingTransition,
}

impl CircuitState {
    /// Returns `true` while the actuator is travelling (and holds a slot).
    pub const fn is_moving(self) -> bool {
        matches!(
            self,
            CircuitState::OpeningTransition | CircuitState::ClosingTransition
        )
    }

    /// Returns `true` only for the fully open resting state.
    pub const fn is_open(self) -> bool {
        matches!(self, CircuitState::Open)
    }

    /// Returns `true` for `Open` and `Closed`.
    pub const fn is_resting(self) -> bool {
        !self.is_moving()
    }

    /// Direction the circuit rests at or is heading towards.
    pub const fn direction(self) -> Direction {
        match self {
            CircuitState::Closed | CircuitState::ClosingTransition => Direction::Close,
            CircuitState::Open | CircuitState::OpeningTransition => Direction::Open,
        }
    }

    /// Resting state reached when the current transition (if any) finishes.
    pub const fn settled(self) -> Self {
        self.direction().resting_state()
    }

    /// Short lowercase label used by status output and logs.
    pub const fn label(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::OpeningTransition => "opening",
            CircuitState::ClosingTransition => "closing",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Physical level written to a binary actuator output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActuatorLevel {
    Low,
    High,
}

impl ActuatorLevel {
    /// Returns `true` for [`ActuatorLevel::High`].
    pub const fn is_high(self) -> bool {
        matches!(self, ActuatorLevel::High)
    }
}

/// Mapping from the logical "energized" flag to the physical output level.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OutputPolarity {
    #[default]
    ActiveHigh,
    ActiveLow,
}

impl OutputPolarity {
    /// Builds the polarity from the configuration `inverted` flag.
    pub const fn from_inverted(inverted: bool) -> Self {
        if inverted {
            OutputPolarity::ActiveLow
        } else {
            OutputPolarity::ActiveHigh
        }
    }

    /// Physical level for a logical energized flag.
    pub const fn apply(self, energized: bool) -> ActuatorLevel {
        match (self, energized) {
            (OutputPolarity::ActiveHigh, true) | (OutputPolarity::ActiveLow, false) => {
                ActuatorLevel::High
            }
            (OutputPolarity::ActiveHigh, false) | (OutputPolarity::ActiveLow, true) => {
                ActuatorLevel::Low
            }
        }
    }
}

/// Observable pair published for each circuit.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CircuitStatus {
    pub open: bool,
    pub moving: bool,
}

impl CircuitStatus {
    /// Status reported by a circuit at rest in the closed position.
    pub const CLOSED: Self = Self {
        open: false,
        moving: false,
    };

    /// Derives the observables from a circuit state.
    pub const fn from_state(state: CircuitState) -> Self {
        Self {
            open: state.is_open(),
            moving: state.is_moving(),
        }
    }
}

/// What the sequencer must do after a circuit accepted a new target.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Retarget {
    /// Target did not change.
    Unchanged,
    /// Circuit rests away from the new target and needs a slot.
    Admit,
    /// A queued request was reverted to the resting state and must leave the queue.
    Withdraw,
    /// Circuit is moving the other way; the new target applies after completion.
    Deferred,
    /// A deferred reversal was cancelled; the circuit keeps its current travel.
    Resumed,
}

/// One configured valve and its private transition state.
#[derive(Clone, Debug)]
pub struct Circuit {
    id: CircuitId,
    key: &'static str,
    name: &'static str,
    output: OutputRef,
    polarity: OutputPolarity,
    state: CircuitState,
    requested: Direction,
    timer: TransitionTimer,
}

impl Circuit {
    /// Creates a closed circuit from its configuration entry.
    pub(crate) fn from_config(id: CircuitId, config: &CircuitConfig) -> Self {
        Self {
            id,
            key: config.key,
            name: config.name,
            output: config.output,
            polarity: OutputPolarity::from_inverted(config.inverted),
            state: CircuitState::Closed,
            requested: Direction::Close,
            timer: TransitionTimer::idle(),
        }
    }

    pub const fn id(&self) -> CircuitId {
        self.id
    }

    /// Stable configuration key.
    pub const fn key(&self) -> &'static str {
        self.key
    }

    /// Human-readable display name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn output(&self) -> OutputRef {
        self.output
    }

    pub const fn polarity(&self) -> OutputPolarity {
        self.polarity
    }

    pub const fn state(&self) -> CircuitState {
        self.state
    }

    /// Last commanded target.
    pub const fn requested(&self) -> Direction {
        self.requested
    }

    /// Time spent in the active transition, if any.
    pub const fn elapsed(&self) -> Option<Duration> {
        self.timer.elapsed()
    }

    /// Time left in the active transition, if any.
    pub fn remaining(&self, open_time: Duration) -> Option<Duration> {
        self.timer.remaining(open_time)
    }

    /// Observables derived from the current state.
    pub const fn status(&self) -> CircuitStatus {
        CircuitStatus::from_state(self.state)
    }

    /// Returns `true` when the circuit rests away from its requested target.
    ///
    /// Outside of a sequencer operation this holds exactly for queued circuits.
    pub fn awaiting_admission(&self) -> bool {
        self.state.is_resting() && self.requested != self.state.direction()
    }

    /// Physical output level for the current state.
    ///
    /// The actuator is energized while opening and while open.
    pub const fn actuator_level(&self) -> ActuatorLevel {
        self.polarity
            .apply(matches!(self.state.direction(), Direction::Open))
    }

    pub(crate) fn retarget(&mut self, direction: Direction) -> Retarget {
        let previous = core::mem::replace(&mut self.requested, direction);
        let heading = self.state.direction();

        if previous == direction {
            return Retarget::Unchanged;
        }

        match (self.state.is_moving(), direction == heading) {
            (true, true) => Retarget::Resumed,
            (true, false) => Retarget::Deferred,
            (false, true) => Retarget::Withdraw,
            (false, false) => Retarget::Admit,
        }
    }

    /// Starts travel towards the requested target, returning the direction.
    ///
    /// Returns `None` when the circuit is already moving or rests at its target.
    pub(crate) fn begin_transition(&mut self) -> Option<Direction> {
        if !self.awaiting_admission() {
            return None;
        }

        self.state = self.requested.transition_state();
        self.timer.start();
        Some(self.requested)
    }

    /// Advances the transition timer, returning `true` once `open_time` is reached.
    pub(crate) fn advance(&mut self, period: Duration, open_time: Duration) -> bool {
        self.state.is_moving() && self.timer.advance(period, open_time)
    }

    /// Settles the circuit into the resting state of its current travel.
    pub(crate) fn complete_transition(&mut self) -> CircuitState {
        self.state = self.state.settled();
        self.timer.stop();
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: CircuitConfig = CircuitConfig::new("bath", "Bathroom", OutputRef::new(0));

    fn circuit() -> Circuit {
        Circuit::from_config(CircuitId::new(0), &CONFIG)
    }

    #[test]
    fn new_circuits_start_closed_and_idle() {
        let circuit = circuit();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.requested(), Direction::Close);
        assert_eq!(circuit.status(), CircuitStatus::CLOSED);
        assert!(circuit.elapsed().is_none());
        assert!(!circuit.awaiting_admission());
    }

    #[test]
    fn retarget_classifies_resting_commands() {
        let mut circuit = circuit();
        assert_eq!(circuit.retarget(Direction::Close), Retarget::Unchanged);
        assert_eq!(circuit.retarget(Direction::Open), Retarget::Admit);
        assert!(circuit.awaiting_admission());
        assert_eq!(circuit.retarget(Direction::Open), Retarget::Unchanged);
        assert_eq!(circuit.retarget(Direction::Close), Retarget::Withdraw);
        assert!(!circuit.awaiting_admission());
    }

    #[test]
    fn retarget_defers_reversal_while_moving() {
        let mut circuit = circuit();
        circuit.retarget(Direction::Open);
        assert_eq!(circuit.begin_transition(), Some(Direction::Open));
        assert_eq!(circuit.state(), CircuitState::OpeningTransition);

        assert_eq!(circuit.retarget(Direction::Close), Retarget::Deferred);
        assert_eq!(circuit.state(), CircuitState::OpeningTransition);
        assert_eq!(circuit.retarget(Direction::Open), Retarget::Resumed);
        assert_eq!(circuit.begin_transition(), None);
    }

    #[test]
    fn transition_completes_after_open_time() {
        let mut circuit = circuit();
        circuit.retarget(Direction::Open);
        circuit.begin_transition();

        let period = Duration::from_millis(500);
        let open_time = Duration::from_secs(1);
        assert!(!circuit.advance(period, open_time));
        assert!(circuit.advance(period, open_time));
        assert_eq!(circuit.complete_transition(), CircuitState::Open);
        assert_eq!(
            circuit.status(),
            CircuitStatus {
                open: true,
                moving: false
            }
        );
        assert!(circuit.elapsed().is_none());
    }

    #[test]
    fn actuator_level_follows_polarity() {
        let mut normal = circuit();
        let mut inverted = Circuit::from_config(CircuitId::new(1), &CONFIG.inverted());

        assert_eq!(normal.actuator_level(), ActuatorLevel::Low);
        assert_eq!(inverted.actuator_level(), ActuatorLevel::High);

        for circuit in [&mut normal, &mut inverted] {
            circuit.retarget(Direction::Open);
            circuit.begin_transition();
        }

        assert_eq!(normal.actuator_level(), ActuatorLevel::High);
        assert_eq!(inverted.actuator_level(), ActuatorLevel::Low);
    }

    #[test]
    fn circuit_id_rejects_out_of_range_indices() {
        assert_eq!(CircuitId::from_index(3), Some(CircuitId::new(3)));
        assert_eq!(CircuitId::from_index(256), None);
        assert_eq!(CircuitId::new(7).as_index(), 7);
    }
}
