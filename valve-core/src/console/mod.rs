//! Operator console shared by the firmware USB port and the host emulator.
//!
//! Front ends feed complete lines into a [`ConsoleExecutor`], which parses
//! them with [`grammar::parse_command`] and dispatches to a [`ValveControl`]
//! implementation. Output is written as `\n`-terminated lines to any
//! [`core::fmt::Write`] sink; transports add their own line endings.

use core::fmt;
use core::time::Duration;

pub mod catalog;
pub mod grammar;
mod local;

pub use grammar::{CircuitRef, Command, ParseError, parse_command};
pub use local::LocalControl;

use crate::circuit::{CircuitId, Direction};
use crate::sequencer::{CommandOutcome, SequencerError};
use crate::status::write_duration;

/// Result of handing a command to a [`ValveControl`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Submission {
    /// The sequencer applied the command synchronously.
    Applied(CommandOutcome),
    /// The command was queued for the task owning the sequencer.
    Forwarded,
}

/// Aggregate result of advancing simulated time.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Advance {
    pub ticks: u32,
    pub completed: usize,
    pub started: usize,
    pub uptime: Duration,
}

/// Errors reported back to the operator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    Parse(ParseError),
    /// No circuit matches the index or key.
    UnknownCircuit,
    /// `help` was asked about a command that does not exist.
    UnknownTopic,
    /// The front end does not offer this command.
    Unsupported(&'static str),
    /// The command queue towards the sequencer is full.
    Busy,
    /// Simulated time requested in one command exceeds the allowed span.
    TooManyTicks { limit: u32 },
    Sequencer(SequencerError),
    /// Writing the response failed.
    Output,
}

impl From<ParseError> for ConsoleError {
    fn from(error: ParseError) -> Self {
        ConsoleError::Parse(error)
    }
}

impl From<SequencerError> for ConsoleError {
    fn from(error: SequencerError) -> Self {
        ConsoleError::Sequencer(error)
    }
}

impl From<fmt::Error> for ConsoleError {
    fn from(_: fmt::Error) -> Self {
        ConsoleError::Output
    }
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Parse(error) => write!(f, "{error}; try `help`"),
            ConsoleError::UnknownCircuit => f.write_str("unknown circuit"),
            ConsoleError::UnknownTopic => f.write_str("unknown help topic"),
            ConsoleError::Unsupported(command) => {
                write!(f, "`{command}` is not available on this console")
            }
            ConsoleError::Busy => f.write_str("command queue full, retry"),
            ConsoleError::TooManyTicks { limit } => {
                write!(f, "at most {limit} ticks per command")
            }
            ConsoleError::Sequencer(error) => write!(f, "{error}"),
            ConsoleError::Output => f.write_str("output buffer exhausted"),
        }
    }
}

/// Operations a console front end needs from the valve group.
pub trait ValveControl {
    /// Resolves an operator reference to a configured circuit.
    fn resolve(&self, circuit: CircuitRef<'_>) -> Option<CircuitId>;

    /// Configuration key used when echoing results.
    fn key(&self, circuit: CircuitId) -> &'static str;

    /// Requests that `circuit` moves towards `direction`.
    fn submit(
        &mut self,
        circuit: CircuitId,
        direction: Direction,
    ) -> Result<Submission, ConsoleError>;

    /// Writes the current status lines.
    fn write_status<W: fmt::Write>(&self, out: &mut W) -> fmt::Result;

    /// Writes the `count` most recent scheduler events.
    fn write_events<W: fmt::Write>(&self, _count: usize, _out: &mut W) -> Result<(), ConsoleError> {
        Err(ConsoleError::Unsupported("events"))
    }

    /// Runs `ticks` scheduler ticks.
    fn tick(&mut self, _ticks: u32) -> Result<Advance, ConsoleError> {
        Err(ConsoleError::Unsupported("tick"))
    }

    /// Runs enough ticks to cover `duration`.
    fn advance(&mut self, _duration: Duration) -> Result<Advance, ConsoleError> {
        Err(ConsoleError::Unsupported("advance"))
    }
}

/// Number of events replayed by `events` without an explicit count.
pub const DEFAULT_EVENT_COUNT: usize = 10;

/// Parses console lines and runs them against a [`ValveControl`].
#[derive(Debug)]
pub struct ConsoleExecutor<C> {
    control: C,
}

impl<C: ValveControl> ConsoleExecutor<C> {
    pub const fn new(control: C) -> Self {
        Self { control }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    pub fn into_inner(self) -> C {
        self.control
    }

    /// Executes a single line, writing its response to `out`.
    ///
    /// Blank lines are accepted and produce no output.
    pub fn execute<W: fmt::Write>(&mut self, line: &str, out: &mut W) -> Result<(), ConsoleError> {
        if line.trim().is_empty() {
            return Ok(());
        }

        match parse_command(line)? {
            Command::Set { circuit, direction } => {
                let id = self
                    .control
                    .resolve(circuit)
                    .ok_or(ConsoleError::UnknownCircuit)?;
                let key = self.control.key(id);
                match self.control.submit(id, direction)? {
                    Submission::Applied(outcome) => writeln!(out, "{key}: {direction} {outcome}")?,
                    Submission::Forwarded => writeln!(out, "{key}: {direction} requested")?,
                }
            }
            Command::Status => self.control.write_status(out)?,
            Command::Events(count) => self
                .control
                .write_events(count.unwrap_or(DEFAULT_EVENT_COUNT), out)?,
            Command::Tick(ticks) => {
                let advance = self.control.tick(ticks)?;
                write_advance(out, &advance)?;
            }
            Command::Advance(duration) => {
                let advance = self.control.advance(duration)?;
                write_advance(out, &advance)?;
            }
            Command::Help(topic) => write_help(out, topic)?,
        }
        Ok(())
    }
}

fn write_advance<W: fmt::Write>(out: &mut W, advance: &Advance) -> fmt::Result {
    write!(out, "advanced {} tick(s) to t=", advance.ticks)?;
    write_duration(out, advance.uptime)?;
    writeln!(
        out,
        ": {} completed, {} started",
        advance.completed, advance.started
    )
}

fn write_help<W: fmt::Write>(out: &mut W, topic: Option<&str>) -> Result<(), ConsoleError> {
    match topic {
        None => {
            for spec in catalog::COMMANDS {
                writeln!(out, "{:<20} {}", spec.usage, spec.summary)?;
            }
        }
        Some(name) => {
            let spec = catalog::find(name).ok_or(ConsoleError::UnknownTopic)?;
            writeln!(out, "usage: {}", spec.usage)?;
            writeln!(out, "  {}", spec.summary)?;
            if spec.simulated_only {
                writeln!(out, "  (simulated time only)")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::String;

    struct FixedControl {
        submitted: Option<(CircuitId, Direction)>,
    }

    impl ValveControl for FixedControl {
        fn resolve(&self, circuit: CircuitRef<'_>) -> Option<CircuitId> {
            match circuit {
                CircuitRef::Index(0) | CircuitRef::Key("porch") => Some(CircuitId::new(0)),
                _ => None,
            }
        }

        fn key(&self, _circuit: CircuitId) -> &'static str {
            "porch"
        }

        fn submit(
            &mut self,
            circuit: CircuitId,
            direction: Direction,
        ) -> Result<Submission, ConsoleError> {
            self.submitted = Some((circuit, direction));
            Ok(Submission::Forwarded)
        }

        fn write_status<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
            writeln!(out, "porch closed")
        }
    }

    fn executor() -> ConsoleExecutor<FixedControl> {
        ConsoleExecutor::new(FixedControl { submitted: None })
    }

    #[test]
    fn forwards_set_commands() {
        let mut executor = executor();
        let mut out: String<64> = String::new();
        executor.execute("open porch", &mut out).unwrap();
        assert_eq!(out.as_str(), "porch: open requested\n");
        assert_eq!(
            executor.control().submitted,
            Some((CircuitId::new(0), Direction::Open))
        );
    }

    #[test]
    fn reports_unknown_circuits_and_topics() {
        let mut executor = executor();
        let mut out: String<64> = String::new();
        assert_eq!(
            executor.execute("close 4", &mut out),
            Err(ConsoleError::UnknownCircuit)
        );
        assert_eq!(
            executor.execute("help reboot", &mut out),
            Err(ConsoleError::UnknownTopic)
        );
        assert!(out.is_empty());
    }

    #[test]
    fn simulated_commands_are_unsupported_by_default() {
        let mut executor = executor();
        let mut out: String<64> = String::new();
        assert_eq!(
            executor.execute("tick 3", &mut out),
            Err(ConsoleError::Unsupported("tick"))
        );
        assert_eq!(
            executor.execute("events", &mut out),
            Err(ConsoleError::Unsupported("events"))
        );
    }

    #[test]
    fn help_describes_a_single_command() {
        let mut executor = executor();
        let mut out: String<128> = String::new();
        executor.execute("help advance", &mut out).unwrap();
        assert!(out.starts_with("usage: advance <duration>\n"));
        assert!(out.ends_with("(simulated time only)\n"));
    }

    #[test]
    fn blank_lines_are_ignored() {
        let mut executor = executor();
        let mut out: String<16> = String::new();
        executor.execute("  \r\n", &mut out).unwrap();
        assert!(out.is_empty());
    }
}
