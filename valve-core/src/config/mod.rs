//! Static configuration consumed by the sequencer.
//!
//! Boards declare their circuits as `const` tables of [`CircuitConfig`]
//! entries; the host runtime wraps the table in a [`SequencerConfig`] together
//! with the system-wide concurrency cap and transition duration. Validation
//! happens once, when the sequencer is built, so a misconfigured valve group
//! never starts with partial state.

use core::fmt;
use core::time::Duration;

pub mod duration;

pub use duration::{DurationError, parse_duration};

/// Concurrency cap applied when the configuration does not override it.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;
/// Transition duration applied when the configuration does not override it.
pub const DEFAULT_OPEN_TIME: Duration = Duration::from_secs(5 * 60);

/// Handle to a binary actuator output owned by a [`ValveDriver`](crate::ValveDriver).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct OutputRef(u8);

impl OutputRef {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Driver-specific output index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "out{}", self.0)
    }
}

/// Configuration entry for a single circuit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CircuitConfig {
    /// Stable identifier, unique within a valve group.
    pub key: &'static str,
    /// Display name used for status output.
    pub name: &'static str,
    /// Actuator output driven for this circuit.
    pub output: OutputRef,
    /// Inverts the logical-to-physical output mapping.
    pub inverted: bool,
}

impl CircuitConfig {
    pub const fn new(key: &'static str, name: &'static str, output: OutputRef) -> Self {
        Self {
            key,
            name,
            output,
            inverted: false,
        }
    }

    /// Returns a copy with an active-low actuator output.
    #[must_use]
    pub const fn inverted(self) -> Self {
        Self {
            inverted: true,
            ..self
        }
    }
}

/// System-wide sequencer configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SequencerConfig<'a> {
    pub circuits: &'a [CircuitConfig],
    /// Maximum number of circuits allowed to transition at once.
    pub max_concurrent: usize,
    /// Travel time for both opening and closing.
    pub open_time: Duration,
}

impl<'a> SequencerConfig<'a> {
    /// Creates a configuration using the default concurrency cap and open time.
    pub const fn new(circuits: &'a [CircuitConfig]) -> Self {
        Self {
            circuits,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            open_time: DEFAULT_OPEN_TIME,
        }
    }

    #[must_use]
    pub const fn with_max_concurrent(self, max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            ..self
        }
    }

    #[must_use]
    pub const fn with_open_time(self, open_time: Duration) -> Self {
        Self { open_time, ..self }
    }

    /// Checks the configuration against an arena of `capacity` circuits.
    ///
    /// `resolves` reports whether the actuator driver owns a given output.
    pub fn validate<F>(&self, capacity: usize, resolves: F) -> Result<(), ConfigError>
    where
        F: Fn(OutputRef) -> bool,
    {
        if self.circuits.is_empty() {
            return Err(ConfigError::NoCircuits);
        }
        if self.circuits.len() > capacity {
            return Err(ConfigError::TooManyCircuits {
                count: self.circuits.len(),
                capacity,
            });
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        if self.open_time.is_zero() {
            return Err(ConfigError::InvalidOpenTime);
        }

        for (index, circuit) in self.circuits.iter().enumerate() {
            if self.circuits[..index]
                .iter()
                .any(|earlier| earlier.key == circuit.key)
            {
                return Err(ConfigError::DuplicateCircuit { key: circuit.key });
            }
            if !resolves(circuit.output) {
                return Err(ConfigError::UnresolvedOutput {
                    key: circuit.key,
                    output: circuit.output,
                });
            }
        }

        Ok(())
    }
}

/// Reasons a sequencer refuses to start.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// The circuit list is empty.
    NoCircuits,
    /// More circuits than the sequencer arena can hold.
    TooManyCircuits { count: usize, capacity: usize },
    /// `max_concurrent` must be at least one.
    InvalidCapacity,
    /// `open_time` must be non-zero.
    InvalidOpenTime,
    /// Two circuits share the same key.
    DuplicateCircuit { key: &'static str },
    /// The actuator driver does not own the referenced output.
    UnresolvedOutput {
        key: &'static str,
        output: OutputRef,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoCircuits => f.write_str("no circuits configured"),
            ConfigError::TooManyCircuits { count, capacity } => {
                write!(f, "{count} circuits configured, at most {capacity} supported")
            }
            ConfigError::InvalidCapacity => f.write_str("max_concurrent must be positive"),
            ConfigError::InvalidOpenTime => f.write_str("open_time must be positive"),
            ConfigError::DuplicateCircuit { key } => write!(f, "duplicate circuit `{key}`"),
            ConfigError::UnresolvedOutput { key, output } => {
                write!(f, "circuit `{key}` references unknown output {output}")
            }
        }
    }
}
