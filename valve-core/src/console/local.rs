use core::fmt;
use core::time::Duration;

use super::{Advance, CircuitRef, ConsoleError, Submission, ValveControl};
use crate::circuit::{CircuitId, Direction};
use crate::sequencer::{Sequencer, StatusSink, ValveDriver};
use crate::status::StatusFormatter;

/// Longest simulated span a single `tick` or `advance` may cover.
pub const MAX_SIMULATED_SPAN: Duration = Duration::from_secs(24 * 60 * 60);

/// Console control over a sequencer owned by the caller, with simulated time.
///
/// Every tick advances the sequencer by a fixed period, which lets the host
/// emulator and tests replay hours of valve travel instantly.
#[derive(Debug)]
pub struct LocalControl<D, S, const N: usize> {
    sequencer: Sequencer<D, S, N>,
    tick_period: Duration,
}

impl<D, S, const N: usize> LocalControl<D, S, N>
where
    D: ValveDriver,
    S: StatusSink,
{
    pub const fn new(sequencer: Sequencer<D, S, N>, tick_period: Duration) -> Self {
        Self {
            sequencer,
            tick_period,
        }
    }

    pub fn sequencer(&self) -> &Sequencer<D, S, N> {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut Sequencer<D, S, N> {
        &mut self.sequencer
    }

    pub const fn tick_period(&self) -> Duration {
        self.tick_period
    }

    /// Number of ticks needed to cover `duration`, rounded up.
    pub fn ticks_for(&self, duration: Duration) -> u32 {
        let period = self.tick_period.as_nanos().max(1);
        let ticks = duration.as_nanos().div_ceil(period);
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }

    /// Ticks allowed per command; always at least one.
    pub fn max_ticks(&self) -> u32 {
        self.ticks_for(MAX_SIMULATED_SPAN).max(1)
    }
}

impl<D, S, const N: usize> ValveControl for LocalControl<D, S, N>
where
    D: ValveDriver,
    S: StatusSink,
{
    fn resolve(&self, circuit: CircuitRef<'_>) -> Option<CircuitId> {
        match circuit {
            CircuitRef::Index(index) => CircuitId::from_index(index)
                .filter(|id| self.sequencer.circuit(*id).is_some()),
            CircuitRef::Key(key) => self.sequencer.find(key),
        }
    }

    fn key(&self, circuit: CircuitId) -> &'static str {
        self.sequencer
            .circuit(circuit)
            .map_or("?", |circuit| circuit.key())
    }

    fn submit(
        &mut self,
        circuit: CircuitId,
        direction: Direction,
    ) -> Result<Submission, ConsoleError> {
        let outcome = self.sequencer.command(circuit, direction)?;
        Ok(Submission::Applied(outcome))
    }

    fn write_status<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        let snapshot = self.sequencer.snapshot();
        StatusFormatter::new(&snapshot).write_all(out)
    }

    fn write_events<W: fmt::Write>(&self, count: usize, out: &mut W) -> Result<(), ConsoleError> {
        let telemetry = self.sequencer.telemetry();
        if telemetry.is_empty() {
            writeln!(out, "no events recorded")?;
        }
        for record in telemetry.recent(count) {
            writeln!(out, "{record}")?;
        }
        Ok(())
    }

    fn tick(&mut self, ticks: u32) -> Result<Advance, ConsoleError> {
        let limit = self.max_ticks();
        if ticks > limit {
            return Err(ConsoleError::TooManyTicks { limit });
        }
        let mut advance = Advance {
            ticks,
            ..Advance::default()
        };
        for _ in 0..ticks {
            let report = self.sequencer.tick(self.tick_period)?;
            advance.completed += report.completed;
            advance.started += report.started;
        }
        advance.uptime = self.sequencer.uptime();
        Ok(advance)
    }

    fn advance(&mut self, duration: Duration) -> Result<Advance, ConsoleError> {
        let ticks = self.ticks_for(duration);
        self.tick(ticks)
    }
}
