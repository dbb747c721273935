//! Duration literals such as `500ms`, `30s`, `5min` or `1h`.

use core::fmt;
use core::time::Duration;

use winnow::ascii::digit1;
use winnow::combinator::alt;
use winnow::error::ContextError;
use winnow::prelude::*;

/// Errors reported while decoding a duration literal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DurationError {
    /// Input is not `<digits><unit>`.
    Syntax,
    /// Value does not fit in a millisecond count.
    Overflow,
}

impl fmt::Display for DurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationError::Syntax => f.write_str("expected <number><ms|s|min|h>"),
            DurationError::Overflow => f.write_str("duration out of range"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Unit {
    Millis,
    Seconds,
    Minutes,
    Hours,
}

impl Unit {
    const fn millis(self) -> u64 {
        match self {
            Unit::Millis => 1,
            Unit::Seconds => 1_000,
            Unit::Minutes => 60_000,
            Unit::Hours => 3_600_000,
        }
    }
}

/// Parses a duration literal with a mandatory unit suffix.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let (value, unit) = literal
        .parse(input.trim())
        .map_err(|_| DurationError::Syntax)?;

    value
        .checked_mul(unit.millis())
        .map(Duration::from_millis)
        .ok_or(DurationError::Overflow)
}

/// Parser for a single duration token, shared with the console grammar.
pub(crate) fn duration(input: &mut &str) -> Result<Duration, ContextError> {
    let (value, unit) = literal.parse_next(input)?;
    value
        .checked_mul(unit.millis())
        .map(Duration::from_millis)
        .ok_or_else(ContextError::new)
}

fn literal(input: &mut &str) -> Result<(u64, Unit), ContextError> {
    (digit1.try_map(str::parse::<u64>), unit).parse_next(input)
}

fn unit(input: &mut &str) -> Result<Unit, ContextError> {
    alt((
        "ms".value(Unit::Millis),
        "min".value(Unit::Minutes),
        "s".value(Unit::Seconds),
        "h".value(Unit::Hours),
    ))
    .parse_next(input)
}
