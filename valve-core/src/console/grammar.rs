#![allow(clippy::module_name_repetitions)]

//! Parser for operator console lines.
//!
//! The grammar is small enough that `winnow` combinators run directly over the
//! input `&str`; keywords match case-insensitively and circuit references may
//! be either an arena index or a configuration key.

use core::fmt;
use core::num::ParseIntError;
use core::str::FromStr;
use core::time::Duration;

use winnow::ascii::{Caseless, digit1, space1};
use winnow::combinator::{alt, opt, preceded};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take_while;

use crate::circuit::Direction;
use crate::config::duration::duration;

/// Reference to a circuit as typed by the operator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CircuitRef<'a> {
    Index(usize),
    Key(&'a str),
}

impl fmt::Display for CircuitRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitRef::Index(index) => write!(f, "#{index}"),
            CircuitRef::Key(key) => f.write_str(key),
        }
    }
}

/// Parsed console command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command<'a> {
    /// `open <circuit>` / `close <circuit>`.
    Set {
        circuit: CircuitRef<'a>,
        direction: Direction,
    },
    /// `status`.
    Status,
    /// `events [count]`.
    Events(Option<usize>),
    /// `tick [count]`.
    Tick(u32),
    /// `advance <duration>`.
    Advance(Duration),
    /// `help [topic]`.
    Help(Option<&'a str>),
}

/// Syntax error with the byte offset where parsing stopped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ParseError {
    pub offset: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syntax error at column {}", self.offset + 1)
    }
}

/// Parses one console line (surrounding whitespace is ignored).
pub fn parse_command(line: &str) -> Result<Command<'_>, ParseError> {
    command.parse(line.trim()).map_err(|error| ParseError {
        offset: error.offset(),
    })
}

fn command<'a>(input: &mut &'a str) -> Result<Command<'a>, ContextError> {
    alt((
        preceded((Caseless("open"), space1), circuit_ref).map(|circuit| Command::Set {
            circuit,
            direction: Direction::Open,
        }),
        preceded((Caseless("close"), space1), circuit_ref).map(|circuit| Command::Set {
            circuit,
            direction: Direction::Close,
        }),
        Caseless("status").value(Command::Status),
        preceded(Caseless("events"), opt(preceded(space1, count::<usize>))).map(Command::Events),
        preceded(Caseless("tick"), opt(preceded(space1, count::<u32>)))
            .map(|ticks| Command::Tick(ticks.unwrap_or(1))),
        preceded((Caseless("advance"), space1), duration).map(Command::Advance),
        preceded(Caseless("help"), opt(preceded(space1, word))).map(Command::Help),
    ))
    .parse_next(input)
}

fn circuit_ref<'a>(input: &mut &'a str) -> Result<CircuitRef<'a>, ContextError> {
    word.map(|word: &'a str| match word.parse::<usize>() {
        Ok(index) => CircuitRef::Index(index),
        Err(_) => CircuitRef::Key(word),
    })
    .parse_next(input)
}

fn word<'a>(input: &mut &'a str) -> Result<&'a str, ContextError> {
    take_while(1.., is_word_char).parse_next(input)
}

fn count<T>(input: &mut &str) -> Result<T, ContextError>
where
    T: FromStr<Err = ParseIntError>,
{
    digit1.try_map(str::parse::<T>).parse_next(input)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_commands_by_key_and_index() {
        assert_eq!(
            parse_command("open kitchen"),
            Ok(Command::Set {
                circuit: CircuitRef::Key("kitchen"),
                direction: Direction::Open
            })
        );
        assert_eq!(
            parse_command("  CLOSE 2 \r\n"),
            Ok(Command::Set {
                circuit: CircuitRef::Index(2),
                direction: Direction::Close
            })
        );
        assert_eq!(
            parse_command("open 2nd-floor"),
            Ok(Command::Set {
                circuit: CircuitRef::Key("2nd-floor"),
                direction: Direction::Open
            })
        );
    }

    #[test]
    fn parses_optional_counts() {
        assert_eq!(parse_command("tick"), Ok(Command::Tick(1)));
        assert_eq!(parse_command("tick 25"), Ok(Command::Tick(25)));
        assert_eq!(parse_command("events"), Ok(Command::Events(None)));
        assert_eq!(parse_command("Events 4"), Ok(Command::Events(Some(4))));
    }

    #[test]
    fn parses_advance_with_duration_literal() {
        assert_eq!(
            parse_command("advance 90s"),
            Ok(Command::Advance(Duration::from_secs(90)))
        );
        assert_eq!(
            parse_command("advance 5min"),
            Ok(Command::Advance(Duration::from_secs(300)))
        );
    }

    #[test]
    fn parses_help_topics() {
        assert_eq!(parse_command("help"), Ok(Command::Help(None)));
        assert_eq!(parse_command("help open"), Ok(Command::Help(Some("open"))));
        assert_eq!(parse_command("status"), Ok(Command::Status));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_command("").is_err());
        assert!(parse_command("open").is_err());
        assert!(parse_command("closed kitchen").is_err());
        assert!(parse_command("status now").is_err());
        assert!(parse_command("advance 10").is_err());
        assert!(parse_command("tick -1").is_err());
    }
}
