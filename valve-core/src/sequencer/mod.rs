//! Admission-controlled transition scheduler.
//!
//! The [`Sequencer`] owns every circuit of a valve group, the admission
//! controller limiting how many of them travel at once, and the two seams to
//! the outside world: a [`ValveDriver`] that writes actuator outputs and a
//! [`StatusSink`] that receives the published observables.
//!
//! All mutation happens through [`Sequencer::command`], [`Sequencer::command_batch`]
//! and [`Sequencer::tick`], each of which runs to completion before returning,
//! so the slot count and the queue always agree with the circuit states between
//! calls.

use core::fmt;
use core::time::Duration;

use heapless::Vec;

use crate::admission::{Admission, AdmissionController, AdmissionError, Admitted};
use crate::circuit::{
    ActuatorLevel, Circuit, CircuitId, CircuitState, Direction, Retarget,
};
use crate::config::{ConfigError, OutputRef, SequencerConfig};
use crate::status::{AggregateStatus, CircuitSample, StatusSnapshot};
use crate::telemetry::{TelemetryEventKind, TelemetryRecord, TelemetryRecorder};

/// Writes physical levels to actuator outputs.
pub trait ValveDriver {
    /// Returns `true` when the driver owns `output`.
    fn resolves(&self, output: OutputRef) -> bool;

    /// Drives `output` to `level`.
    fn drive(&mut self, output: OutputRef, level: ActuatorLevel);
}

/// Driver that accepts every output and discards all writes.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopValveDriver;

impl ValveDriver for NoopValveDriver {
    fn resolves(&self, _output: OutputRef) -> bool {
        true
    }

    fn drive(&mut self, _output: OutputRef, _level: ActuatorLevel) {}
}

/// Receives published observables.
///
/// Notifications arrive only when a value changes.
pub trait StatusSink {
    /// A circuit moved to `state`. Use [`crate::CircuitStatus::from_state`]
    /// for the `open`/`moving` observables.
    fn circuit_changed(&mut self, circuit: CircuitId, state: CircuitState);

    /// The "any circuit open" flag changed.
    fn aggregate_changed(&mut self, open: bool);

    /// A scheduler event was recorded.
    fn record(&mut self, _record: &TelemetryRecord) {}
}

/// Sink that ignores every notification.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopStatusSink;

impl StatusSink for NoopStatusSink {
    fn circuit_changed(&mut self, _circuit: CircuitId, _state: CircuitState) {}

    fn aggregate_changed(&mut self, _open: bool) {}
}

/// How a single command affected its circuit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandOutcome {
    /// The circuit already targets the commanded direction.
    Ignored,
    /// A slot was granted and travel started.
    Started,
    /// Every slot is busy; the circuit waits at `position` (0 == next).
    Queued { position: usize },
    /// A queued request was cancelled.
    Withdrawn,
    /// The circuit is moving the other way; the reversal runs after completion.
    Deferred,
    /// A deferred reversal was cancelled; travel continues unchanged.
    Resumed,
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Ignored => f.write_str("no change"),
            CommandOutcome::Started => f.write_str("started"),
            CommandOutcome::Queued { position } => write!(f, "queued at position {position}"),
            CommandOutcome::Withdrawn => f.write_str("withdrawn from queue"),
            CommandOutcome::Deferred => f.write_str("reversal deferred"),
            CommandOutcome::Resumed => f.write_str("reversal cancelled"),
        }
    }
}

/// Work done by a single [`Sequencer::tick`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TickReport {
    /// Transitions that reached their resting state.
    pub completed: usize,
    /// Transitions started by freed slots or deferred reversals.
    pub started: usize,
}

/// Errors surfaced by sequencer operations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequencerError {
    /// No circuit with this identifier is configured.
    UnknownCircuit(CircuitId),
    /// The admission controller rejected a slot operation.
    Admission(AdmissionError),
}

impl From<AdmissionError> for SequencerError {
    fn from(error: AdmissionError) -> Self {
        SequencerError::Admission(error)
    }
}

impl fmt::Display for SequencerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerError::UnknownCircuit(id) => write!(f, "unknown circuit {id}"),
            SequencerError::Admission(error) => write!(f, "admission error: {error}"),
        }
    }
}

/// Scheduler for a group of up to `N` circuits.
pub struct Sequencer<D, S, const N: usize> {
    circuits: Vec<Circuit, N>,
    published: Vec<CircuitState, N>,
    admission: AdmissionController<N>,
    aggregate: AggregateStatus,
    telemetry: TelemetryRecorder,
    open_time: Duration,
    uptime: Duration,
    driver: D,
    sink: S,
}

impl<D, S, const N: usize> Sequencer<D, S, N>
where
    D: ValveDriver,
    S: StatusSink,
{
    /// Validates `config` and builds a sequencer with every circuit closed.
    ///
    /// Each output is driven to its closed level and the initial observables,
    /// including the aggregate flag, are published before this returns.
    pub fn new(config: &SequencerConfig<'_>, driver: D, sink: S) -> Result<Self, ConfigError> {
        config.validate(N, |output| driver.resolves(output))?;
        let admission = AdmissionController::new(config.max_concurrent)?;

        let too_many = ConfigError::TooManyCircuits {
            count: config.circuits.len(),
            capacity: N,
        };
        let mut circuits = Vec::new();
        let mut published = Vec::new();
        for (index, entry) in config.circuits.iter().enumerate() {
            let id = CircuitId::from_index(index).ok_or(too_many)?;
            circuits
                .push(Circuit::from_config(id, entry))
                .map_err(|_| too_many)?;
            published
                .push(CircuitState::Closed)
                .map_err(|_| too_many)?;
        }

        let mut sequencer = Self {
            circuits,
            published,
            admission,
            aggregate: AggregateStatus::new(),
            telemetry: TelemetryRecorder::new(),
            open_time: config.open_time,
            uptime: Duration::ZERO,
            driver,
            sink,
        };
        sequencer.publish_initial();
        Ok(sequencer)
    }

    /// All configured circuits in identifier order.
    pub fn circuits(&self) -> &[Circuit] {
        &self.circuits
    }

    pub fn circuit(&self, id: CircuitId) -> Option<&Circuit> {
        self.circuits.get(id.as_index())
    }

    /// Looks up a circuit by its configuration key.
    pub fn find(&self, key: &str) -> Option<CircuitId> {
        self.circuits
            .iter()
            .find(|circuit| circuit.key() == key)
            .map(Circuit::id)
    }

    /// Last published value of the "any circuit open" flag.
    pub fn aggregate_open(&self) -> bool {
        self.aggregate.is_open()
    }

    pub fn admission(&self) -> &AdmissionController<N> {
        &self.admission
    }

    /// Number of circuits currently travelling.
    pub fn active_count(&self) -> usize {
        self.admission.active_count()
    }

    /// Number of circuits waiting for a slot.
    pub fn queue_len(&self) -> usize {
        self.admission.queue_len()
    }

    pub const fn open_time(&self) -> Duration {
        self.open_time
    }

    /// Sum of every tick period fed to the sequencer.
    pub const fn uptime(&self) -> Duration {
        self.uptime
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Captures the state of every circuit plus the slot summary.
    pub fn snapshot(&self) -> StatusSnapshot<N> {
        let mut snapshot = StatusSnapshot::empty(self.admission.capacity());
        snapshot.active = self.admission.active_count();
        snapshot.queued = self.admission.queue_len();
        snapshot.aggregate_open = self.aggregate.is_open();
        snapshot.uptime = self.uptime;

        for circuit in &self.circuits {
            let mut sample =
                CircuitSample::new(circuit.id(), circuit.key(), circuit.name(), circuit.state());
            if circuit.state().is_moving() && circuit.requested() != circuit.state().direction() {
                sample.pending = Some(circuit.requested());
            }
            sample.remaining = circuit.remaining(self.open_time);
            sample.queue_position = self.admission.queue_position(circuit.id());
            // Capacity matches the circuit arena.
            let _ = snapshot.circuits.push(sample);
        }
        snapshot
    }

    /// Applies an open/close command to a single circuit.
    ///
    /// Repeating the current target is a no-op. A command against a moving
    /// circuit never interrupts travel: reversals wait for completion.
    pub fn command(
        &mut self,
        circuit: CircuitId,
        direction: Direction,
    ) -> Result<CommandOutcome, SequencerError> {
        let index = self.index(circuit)?;

        let outcome = match self.circuits[index].retarget(direction) {
            Retarget::Unchanged => CommandOutcome::Ignored,
            Retarget::Admit => self.request_transition(index)?,
            Retarget::Withdraw => {
                self.admission.withdraw(circuit);
                self.emit(TelemetryEventKind::Withdrawn { circuit });
                CommandOutcome::Withdrawn
            }
            Retarget::Deferred => {
                self.emit(TelemetryEventKind::ReversalDeferred { circuit, direction });
                CommandOutcome::Deferred
            }
            Retarget::Resumed => CommandOutcome::Resumed,
        };

        self.publish(index);
        self.refresh_aggregate();
        Ok(outcome)
    }

    /// Applies several commands as one operation.
    ///
    /// Every identifier is validated before anything changes. When a circuit
    /// appears more than once the last command wins; commands are then applied
    /// in ascending identifier order.
    pub fn command_batch<I>(
        &mut self,
        commands: I,
    ) -> Result<Vec<(CircuitId, CommandOutcome), N>, SequencerError>
    where
        I: IntoIterator<Item = (CircuitId, Direction)>,
    {
        let mut pending: [Option<Direction>; N] = [None; N];
        for (circuit, direction) in commands {
            let index = self.index(circuit)?;
            pending[index] = Some(direction);
        }

        let mut outcomes = Vec::new();
        for (index, direction) in pending.iter().enumerate() {
            let Some(direction) = *direction else {
                continue;
            };
            let circuit = self.circuits[index].id();
            let outcome = self.command(circuit, direction)?;
            let _ = outcomes.push((circuit, outcome));
        }
        Ok(outcomes)
    }

    /// Advances every travelling circuit by `period`.
    ///
    /// Completed circuits release their slots in identifier order. Circuits
    /// admitted during this tick start at zero elapsed time and are advanced
    /// from the next tick on.
    pub fn tick(&mut self, period: Duration) -> Result<TickReport, SequencerError> {
        self.uptime = self.uptime.saturating_add(period);

        let open_time = self.open_time;
        let mut finished: Vec<usize, N> = Vec::new();
        for (index, circuit) in self.circuits.iter_mut().enumerate() {
            if circuit.advance(period, open_time) {
                let _ = finished.push(index);
            }
        }

        let mut report = TickReport::default();
        for index in finished {
            report.completed += 1;
            report.started += self.complete_transition(index)?;
        }
        Ok(report)
    }

    fn index(&self, circuit: CircuitId) -> Result<usize, SequencerError> {
        let index = circuit.as_index();
        if index < self.circuits.len() {
            Ok(index)
        } else {
            Err(SequencerError::UnknownCircuit(circuit))
        }
    }

    fn request_transition(&mut self, index: usize) -> Result<CommandOutcome, SequencerError> {
        let circuit = self.circuits[index].id();
        let direction = self.circuits[index].requested();

        match self.admission.request(circuit)? {
            Admission::Granted => {
                let mut admitted = Admitted::<N>::new();
                let _ = admitted.push(circuit);
                self.start_transitions(admitted)?;
                Ok(CommandOutcome::Started)
            }
            Admission::Queued { position } | Admission::AlreadyQueued { position } => {
                self.emit(TelemetryEventKind::Queued {
                    circuit,
                    direction,
                    position,
                });
                Ok(CommandOutcome::Queued { position })
            }
        }
    }

    /// Starts travel for circuits that were just granted a slot.
    ///
    /// A granted circuit that no longer needs to move hands its slot straight
    /// back, which may admit further circuits.
    fn start_transitions(&mut self, mut admitted: Admitted<N>) -> Result<usize, SequencerError> {
        let mut started = 0;
        let mut cursor = 0;
        while let Some(&circuit) = admitted.get(cursor) {
            cursor += 1;
            let index = circuit.as_index();

            let Some(direction) = self.circuits[index].begin_transition() else {
                for next in self.admission.release(circuit)? {
                    let _ = admitted.push(next);
                }
                continue;
            };

            self.drive(index);
            self.emit(TelemetryEventKind::TransitionStarted { circuit, direction });
            self.publish(index);
            started += 1;
        }
        Ok(started)
    }

    fn complete_transition(&mut self, index: usize) -> Result<usize, SequencerError> {
        let circuit = self.circuits[index].id();
        let state = self.circuits[index].complete_transition();
        self.drive(index);
        self.emit(TelemetryEventKind::TransitionCompleted { circuit, state });

        let admitted = self.admission.release(circuit)?;
        let mut started = self.start_transitions(admitted)?;

        if self.circuits[index].awaiting_admission()
            && self.request_transition(index)? == CommandOutcome::Started
        {
            started += 1;
        }

        self.publish(index);
        self.refresh_aggregate();
        Ok(started)
    }

    fn drive(&mut self, index: usize) {
        let circuit = &self.circuits[index];
        self.driver.drive(circuit.output(), circuit.actuator_level());
    }

    fn emit(&mut self, event: TelemetryEventKind) {
        let record = self.telemetry.record(self.uptime, event);
        self.sink.record(&record);
    }

    fn publish(&mut self, index: usize) {
        let circuit = self.circuits[index].id();
        let state = self.circuits[index].state();
        if self.published[index] == state {
            return;
        }

        self.published[index] = state;
        self.sink.circuit_changed(circuit, state);
    }

    /// Recomputes the aggregate from what observers have already been told.
    fn refresh_aggregate(&mut self) {
        let states = self.published.iter().copied();
        if let Some(open) = self.aggregate.update(states) {
            self.emit(TelemetryEventKind::AggregateChanged { open });
            self.sink.aggregate_changed(open);
        }
    }

    fn publish_initial(&mut self) {
        for index in 0..self.circuits.len() {
            self.drive(index);
            let circuit = &self.circuits[index];
            self.published[index] = circuit.state();
            self.sink.circuit_changed(circuit.id(), circuit.state());
        }
        self.refresh_aggregate();
    }
}

impl<D, S, const N: usize> fmt::Debug for Sequencer<D, S, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("circuits", &self.circuits)
            .field("admission", &self.admission)
            .field("aggregate", &self.aggregate)
            .field("open_time", &self.open_time)
            .field("uptime", &self.uptime)
            .finish_non_exhaustive()
    }
}
