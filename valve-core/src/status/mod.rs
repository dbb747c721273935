//! Aggregate status publisher and the shared status surface.
//!
//! [`AggregateStatus`] derives the single "any circuit open" flag the sequencer
//! republishes after every circuit change. [`StatusSnapshot`] and
//! [`StatusFormatter`] keep the textual status output identical between the
//! firmware console and the host emulator.

use core::fmt;
use core::time::Duration;

use heapless::Vec;

use crate::circuit::{CircuitId, CircuitState, CircuitStatus, Direction};

/// Publish-on-change tracker for the "any circuit open" flag.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AggregateStatus {
    published: Option<bool>,
}

impl AggregateStatus {
    /// Tracker that has not published a value yet.
    pub const fn new() -> Self {
        Self { published: None }
    }

    /// Last published value (`false` before the first publish).
    pub fn is_open(&self) -> bool {
        self.published.unwrap_or(false)
    }

    /// Recomputes the flag from every circuit state.
    ///
    /// Returns the new value when it differs from the last published one.
    pub fn update<I>(&mut self, states: I) -> Option<bool>
    where
        I: IntoIterator<Item = CircuitState>,
    {
        let open = states.into_iter().any(CircuitState::is_open);
        if self.published == Some(open) {
            None
        } else {
            self.published = Some(open);
            Some(open)
        }
    }
}

/// Point-in-time view of a single circuit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CircuitSample {
    pub id: CircuitId,
    pub key: &'static str,
    pub name: &'static str,
    pub state: CircuitState,
    /// Pending target, when it differs from where the circuit is heading.
    pub pending: Option<Direction>,
    /// Time left in the active transition, when known.
    pub remaining: Option<Duration>,
    /// Position in the wait queue, when known.
    pub queue_position: Option<usize>,
}

impl CircuitSample {
    /// Creates a sample with no timing or queue details.
    pub const fn new(
        id: CircuitId,
        key: &'static str,
        name: &'static str,
        state: CircuitState,
    ) -> Self {
        Self {
            id,
            key,
            name,
            state,
            pending: None,
            remaining: None,
            queue_position: None,
        }
    }

    /// Observables derived from the sampled state.
    pub const fn status(&self) -> CircuitStatus {
        CircuitStatus::from_state(self.state)
    }
}

/// Status of a whole valve group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusSnapshot<const N: usize> {
    pub circuits: Vec<CircuitSample, N>,
    pub active: usize,
    pub capacity: usize,
    pub queued: usize,
    pub aggregate_open: bool,
    pub uptime: Duration,
}

impl<const N: usize> StatusSnapshot<N> {
    /// Snapshot with no circuits and no activity.
    pub const fn empty(capacity: usize) -> Self {
        Self {
            circuits: Vec::new(),
            active: 0,
            capacity,
            queued: 0,
            aggregate_open: false,
            uptime: Duration::ZERO,
        }
    }
}

/// Renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a, const N: usize> {
    snapshot: &'a StatusSnapshot<N>,
}

impl<'a, const N: usize> StatusFormatter<'a, N> {
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot<N>) -> Self {
        Self { snapshot }
    }

    /// Writes one line per circuit followed by the summary line.
    pub fn write_all<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        for sample in &self.snapshot.circuits {
            Self::write_circuit_line(writer, sample)?;
            writer.write_char('\n')?;
        }
        self.write_summary_line(writer)?;
        writer.write_char('\n')
    }

    /// Writes a circuit line, e.g.
    /// `#1 bath state=opening Bathroom Status=off Bathroom Moving=on remaining=2.5s`.
    pub fn write_circuit_line<W: fmt::Write>(
        writer: &mut W,
        sample: &CircuitSample,
    ) -> fmt::Result {
        let status = sample.status();
        write!(
            writer,
            "{} {} state={} {} Status={} {} Moving={}",
            sample.id,
            sample.key,
            sample.state,
            sample.name,
            on_off(status.open),
            sample.name,
            on_off(status.moving),
        )?;

        if let Some(pending) = sample.pending {
            write!(writer, " pending={pending}")?;
        }
        if let Some(position) = sample.queue_position {
            write!(writer, " queued={position}")?;
        }
        if let Some(remaining) = sample.remaining {
            writer.write_str(" remaining=")?;
            write_duration(writer, remaining)?;
        }
        Ok(())
    }

    /// Writes the summary line, e.g. `slots active=2/3 queued=1 aggregate=open uptime=12.0s`.
    pub fn write_summary_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "slots active={}/{} queued={} aggregate={} uptime=",
            self.snapshot.active,
            self.snapshot.capacity,
            self.snapshot.queued,
            if self.snapshot.aggregate_open {
                "open"
            } else {
                "closed"
            },
        )?;
        write_duration(writer, self.snapshot.uptime)
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

/// Writes a compact duration such as `1.5s`, `250ms` or `4m05s`.
pub fn write_duration<W: fmt::Write>(writer: &mut W, duration: Duration) -> fmt::Result {
    let millis = duration.as_millis();
    if millis >= 60_000 {
        let seconds = millis / 1_000;
        write!(writer, "{}m{:02}s", seconds / 60, seconds % 60)
    } else if millis >= 1_000 {
        write!(writer, "{}.{}s", millis / 1_000, (millis % 1_000) / 100)
    } else {
        write!(writer, "{millis}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::String;

    #[test]
    fn aggregate_publishes_only_on_change() {
        let mut aggregate = AggregateStatus::new();
        assert!(!aggregate.is_open());
        assert_eq!(aggregate.update([CircuitState::Closed]), Some(false));
        assert_eq!(aggregate.update([CircuitState::OpeningTransition]), None);
        assert_eq!(
            aggregate.update([CircuitState::Open, CircuitState::Closed]),
            Some(true)
        );
        assert_eq!(
            aggregate.update([CircuitState::Open, CircuitState::ClosingTransition]),
            None
        );
        assert_eq!(aggregate.update([CircuitState::ClosingTransition]), Some(false));
    }

    #[test]
    fn moving_does_not_count_as_open() {
        let mut aggregate = AggregateStatus::new();
        aggregate.update([
            CircuitState::OpeningTransition,
            CircuitState::ClosingTransition,
        ]);
        assert!(!aggregate.is_open());
    }

    #[test]
    fn formatter_renders_circuit_and_summary_lines() {
        let mut snapshot = StatusSnapshot::<2>::empty(2);
        let mut opening = CircuitSample::new(
            CircuitId::new(0),
            "bath",
            "Bathroom",
            CircuitState::OpeningTransition,
        );
        opening.remaining = Some(Duration::from_millis(2_500));
        opening.pending = Some(Direction::Close);
        snapshot.circuits.push(opening).unwrap();
        snapshot.active = 1;
        snapshot.uptime = Duration::from_secs(125);

        let mut out: String<256> = String::new();
        StatusFormatter::new(&snapshot).write_all(&mut out).unwrap();

        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some(
                "#0 bath state=opening Bathroom Status=off Bathroom Moving=on pending=close remaining=2.5s"
            )
        );
        assert_eq!(
            lines.next(),
            Some("slots active=1/2 queued=0 aggregate=closed uptime=2m05s")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn durations_pick_a_readable_unit() {
        let mut out: String<16> = String::new();
        write_duration(&mut out, Duration::from_millis(80)).unwrap();
        assert_eq!(out.as_str(), "80ms");
    }
}
