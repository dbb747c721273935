//! Operator console served over the USB CDC port.
//!
//! Bytes arriving from the host are assembled into bounded lines (with
//! backspace editing) and handed to the shared `valve-core` console executor.
//! Commands are forwarded to the sequencer task over the valve command queue;
//! status is rendered from the firmware status store.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt;
use core::str;

#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::channel::Channel;
use embassy_sync::channel::TrySendError;
#[cfg(target_os = "none")]
use embassy_sync::signal::Signal;
use heapless::{String, Vec};
use valve_core::console::{
    CircuitRef, ConsoleError, ConsoleExecutor, Submission, ValveControl,
};
use valve_core::status::StatusFormatter;
use valve_core::{CircuitId, Direction};

use crate::status;
use crate::valves::{BOARD_CIRCUITS, CommandSender, ValveCommand};

/// Maximum number of bytes accepted on a single console line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;

/// Size of a single USB transfer.
pub const FRAME_LEN: usize = 64;

/// Capacity of the buffered response to one line.
pub const MAX_RESPONSE_LEN: usize = 1024;

#[cfg(target_os = "none")]
const QUEUE_DEPTH: usize = 4;

const PROMPT: &str = "> ";

#[cfg(target_os = "none")]
type ConsoleMutex = ThreadModeRawMutex;

/// Raw bytes moved between the USB task and the console task.
pub type ConsoleFrame = Vec<u8, FRAME_LEN>;

/// Host → console bytes.
#[cfg(target_os = "none")]
pub static CONSOLE_RX_QUEUE: Channel<ConsoleMutex, ConsoleFrame, QUEUE_DEPTH> = Channel::new();
/// Console → host bytes.
#[cfg(target_os = "none")]
pub static CONSOLE_TX_QUEUE: Channel<ConsoleMutex, ConsoleFrame, QUEUE_DEPTH> = Channel::new();
/// Latest host attachment state reported by the USB task.
#[cfg(target_os = "none")]
pub static CONSOLE_LINK: Signal<ConsoleMutex, bool> = Signal::new();

/// Errors surfaced by the console session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// Encountered non-UTF-8 data in the assembled line buffer.
    InvalidUtf8,
    /// Input exceeded the maximum configured line length.
    LineOverflow,
    /// The command itself failed.
    Command(ConsoleError),
}

impl From<ConsoleError> for SessionError {
    fn from(error: ConsoleError) -> Self {
        Self::Command(error)
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidUtf8 => f.write_str("line is not valid UTF-8"),
            SessionError::LineOverflow => write!(f, "line longer than {MAX_LINE_LEN} bytes"),
            SessionError::Command(error) => write!(f, "{error}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LinkState {
    Disconnected,
    Connected,
}

/// Line assembly state for the USB console.
pub struct ConsoleSession<C> {
    executor: ConsoleExecutor<C>,
    buffer: Vec<u8, MAX_LINE_LEN>,
    overflowed: bool,
    link: LinkState,
}

impl<C: ValveControl> ConsoleSession<C> {
    pub fn new(control: C) -> Self {
        Self {
            executor: ConsoleExecutor::new(control),
            buffer: Vec::new(),
            overflowed: false,
            link: LinkState::Disconnected,
        }
    }

    /// Marks the host as attached and greets it.
    pub fn on_connect<W: fmt::Write>(&mut self, out: &mut W) -> fmt::Result {
        self.link = LinkState::Connected;
        self.reset_line();
        writeln!(out, "valve sequencer console; type `help`")?;
        out.write_str(PROMPT)
    }

    /// Marks the host as detached, dropping any partial line.
    pub fn on_disconnect(&mut self) {
        self.link = LinkState::Disconnected;
        self.reset_line();
    }

    /// Feeds a single byte into the session. A line terminator runs the line.
    pub fn ingest<W: fmt::Write>(&mut self, byte: u8, out: &mut W) -> Result<(), SessionError> {
        if self.link != LinkState::Connected {
            return Ok(());
        }

        match byte {
            b'\r' | b'\n' => self.process_line(out),
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(())
            }
            value => {
                if self.overflowed || self.buffer.push(value).is_err() {
                    self.overflowed = true;
                }
                Ok(())
            }
        }
    }

    fn process_line<W: fmt::Write>(&mut self, out: &mut W) -> Result<(), SessionError> {
        let result = if self.overflowed {
            Err(SessionError::LineOverflow)
        } else if self.buffer.is_empty() {
            return Ok(());
        } else {
            match str::from_utf8(self.buffer.as_slice()) {
                Ok(line) => self
                    .executor
                    .execute(line, out)
                    .map_err(SessionError::from),
                Err(_) => Err(SessionError::InvalidUtf8),
            }
        };
        self.reset_line();

        if let Err(error) = result {
            writeln!(out, "error: {error}").map_err(|_| ConsoleError::Output)?;
        }
        out.write_str(PROMPT).map_err(|_| ConsoleError::Output)?;
        result
    }

    fn reset_line(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }
}

/// [`ValveControl`] that forwards commands to the sequencer task.
pub struct ChannelControl<'a> {
    sender: CommandSender<'a>,
}

impl<'a> ChannelControl<'a> {
    pub fn new(sender: CommandSender<'a>) -> Self {
        Self { sender }
    }
}

impl ValveControl for ChannelControl<'_> {
    fn resolve(&self, circuit: CircuitRef<'_>) -> Option<CircuitId> {
        match circuit {
            CircuitRef::Index(index) if index < BOARD_CIRCUITS.len() => {
                CircuitId::from_index(index)
            }
            CircuitRef::Index(_) => None,
            CircuitRef::Key(key) => crate::valves::circuit_by_key(key),
        }
    }

    fn key(&self, circuit: CircuitId) -> &'static str {
        BOARD_CIRCUITS
            .get(circuit.as_index())
            .map_or("?", |config| config.key)
    }

    fn submit(
        &mut self,
        circuit: CircuitId,
        direction: Direction,
    ) -> Result<Submission, ConsoleError> {
        match self.sender.try_send(ValveCommand { circuit, direction }) {
            Ok(()) => Ok(Submission::Forwarded),
            Err(TrySendError::Full(_)) => Err(ConsoleError::Busy),
        }
    }

    fn write_status<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        let snapshot = status::snapshot();
        StatusFormatter::new(&snapshot).write_all(out)
    }
}

/// Buffered console response that expands `\n` to `\r\n` for terminals.
pub struct ConsoleOutput {
    text: String<MAX_RESPONSE_LEN>,
}

impl ConsoleOutput {
    pub const fn new() -> Self {
        Self {
            text: String::new(),
        }
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Splits the buffered text into USB-sized frames.
    pub fn frames(&self) -> impl Iterator<Item = ConsoleFrame> + '_ {
        self.text.as_bytes().chunks(FRAME_LEN).map(|chunk| {
            let mut frame = ConsoleFrame::new();
            // Chunks never exceed the frame capacity.
            let _ = frame.extend_from_slice(chunk);
            frame
        })
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for ConsoleOutput {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for (index, line) in s.split('\n').enumerate() {
            if index > 0 {
                self.text.push_str("\r\n").map_err(|_| fmt::Error)?;
            }
            self.text.push_str(line).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use core::fmt::Write as _;

    use super::*;
    use crate::valves::CommandQueue;

    fn run_line<C: ValveControl>(
        session: &mut ConsoleSession<C>,
        line: &[u8],
        out: &mut ConsoleOutput,
    ) -> Result<(), SessionError> {
        let mut result = Ok(());
        for byte in line {
            result = session.ingest(*byte, out);
        }
        result
    }

    #[test]
    fn commands_are_forwarded_to_the_sequencer_queue() {
        let queue = CommandQueue::new();
        let mut session = ConsoleSession::new(ChannelControl::new(queue.sender()));
        let mut out = ConsoleOutput::new();
        session.on_connect(&mut out).unwrap();
        out.clear();

        run_line(&mut session, b"open bath\r", &mut out).unwrap();
        assert_eq!(out.as_str(), "bath: open requested\r\n> ");
        assert_eq!(
            queue.try_receive().ok(),
            Some(ValveCommand {
                circuit: CircuitId::new(2),
                direction: Direction::Open
            })
        );
    }

    #[test]
    fn backspace_edits_the_pending_line() {
        let queue = CommandQueue::new();
        let mut session = ConsoleSession::new(ChannelControl::new(queue.sender()));
        let mut out = ConsoleOutput::new();
        session.on_connect(&mut out).unwrap();
        out.clear();

        run_line(&mut session, b"close 1x\x7f\n", &mut out).unwrap();
        assert_eq!(out.as_str(), "kitchen: close requested\r\n> ");
    }

    #[test]
    fn full_queue_reports_busy() {
        let queue = CommandQueue::new();
        let mut session = ConsoleSession::new(ChannelControl::new(queue.sender()));
        let mut out = ConsoleOutput::new();
        session.on_connect(&mut out).unwrap();

        for _ in 0..crate::valves::COMMAND_QUEUE_DEPTH {
            run_line(&mut session, b"open 0\n", &mut out).unwrap();
        }
        out.clear();
        let result = run_line(&mut session, b"open 0\n", &mut out);
        assert_eq!(result, Err(SessionError::Command(ConsoleError::Busy)));
        assert!(out.as_str().starts_with("error: command queue full"));
    }

    #[test]
    fn overflow_is_reported_once_the_line_ends() {
        let queue = CommandQueue::new();
        let mut session = ConsoleSession::new(ChannelControl::new(queue.sender()));
        let mut out = ConsoleOutput::new();
        session.on_connect(&mut out).unwrap();

        for _ in 0..=MAX_LINE_LEN {
            session.ingest(b'a', &mut out).unwrap();
        }
        let result = session.ingest(b'\n', &mut out);
        assert_eq!(result, Err(SessionError::LineOverflow));

        out.clear();
        run_line(&mut session, b"open 0\n", &mut out).unwrap();
        assert_eq!(out.as_str(), "living: open requested\r\n> ");
    }

    #[test]
    fn detached_link_drops_input() {
        let queue = CommandQueue::new();
        let mut session = ConsoleSession::new(ChannelControl::new(queue.sender()));
        let mut out = ConsoleOutput::new();

        run_line(&mut session, b"open 0\n", &mut out).unwrap();
        assert!(out.is_empty());
        assert!(queue.try_receive().is_err());

        session.on_connect(&mut out).unwrap();
        session.ingest(b'o', &mut out).unwrap();
        session.on_disconnect();
        session.on_connect(&mut out).unwrap();
        out.clear();
        run_line(&mut session, b"\n", &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn simulated_time_commands_are_unsupported() {
        let queue = CommandQueue::new();
        let mut session = ConsoleSession::new(ChannelControl::new(queue.sender()));
        let mut out = ConsoleOutput::new();
        session.on_connect(&mut out).unwrap();
        out.clear();

        let result = run_line(&mut session, b"tick 5\n", &mut out);
        assert_eq!(
            result,
            Err(SessionError::Command(ConsoleError::Unsupported("tick")))
        );
    }

    #[test]
    fn output_is_split_into_usb_frames() {
        let mut out = ConsoleOutput::new();
        for _ in 0..100 {
            out.write_char('x').unwrap();
        }
        let lengths: Vec<usize, 4> = out.frames().map(|frame| frame.len()).collect();
        assert_eq!(lengths.as_slice(), &[64, 36]);
    }
}
