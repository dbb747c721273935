use std::fmt;
use std::time::Duration;

use valve_core::config::{DEFAULT_MAX_CONCURRENT, DEFAULT_OPEN_TIME, parse_duration};
use valve_core::console::{ConsoleExecutor, LocalControl};
use valve_core::telemetry::TelemetryRecord;
use valve_core::{
    ActuatorLevel, CircuitConfig, CircuitId, CircuitState, CircuitStatus, ConfigError, OutputRef,
    Sequencer, SequencerConfig, StatusSink, ValveDriver,
};

/// Upper bound on simulated circuits.
pub const MAX_CIRCUITS: usize = 8;

const DEFAULT_CIRCUITS: usize = 4;
const DEFAULT_TICK: Duration = Duration::from_secs(1);

pub const CIRCUITS: [CircuitConfig; MAX_CIRCUITS] = [
    CircuitConfig::new("living", "Living Room", OutputRef::new(0)),
    CircuitConfig::new("kitchen", "Kitchen", OutputRef::new(1)),
    CircuitConfig::new("bath", "Bathroom", OutputRef::new(2)),
    CircuitConfig::new("bedroom", "Bedroom", OutputRef::new(3)),
    CircuitConfig::new("office", "Office", OutputRef::new(4)),
    CircuitConfig::new("hall", "Hallway", OutputRef::new(5)).inverted(),
    CircuitConfig::new("nursery", "Nursery", OutputRef::new(6)),
    CircuitConfig::new("garage", "Garage", OutputRef::new(7)),
];

/// Command-line options for the emulator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EmulatorOptions {
    pub circuits: usize,
    pub max_concurrent: usize,
    pub open_time: Duration,
    pub tick: Duration,
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self {
            circuits: DEFAULT_CIRCUITS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            open_time: DEFAULT_OPEN_TIME,
            tick: DEFAULT_TICK,
        }
    }
}

impl EmulatorOptions {
    /// Parses `--flag value` and `--flag=value` pairs.
    pub fn from_args<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (arg, None),
            };
            let mut value = || {
                inline
                    .clone()
                    .or_else(|| args.next())
                    .ok_or_else(|| format!("Expected value after {flag}"))
            };

            match flag.as_str() {
                "--circuits" => options.circuits = parse_count(&flag, &value()?)?,
                "--max-concurrent" => options.max_concurrent = parse_count(&flag, &value()?)?,
                "--open-time" => options.open_time = parse_flag_duration(&flag, &value()?)?,
                "--tick" => options.tick = parse_flag_duration(&flag, &value()?)?,
                other => return Err(format!("Unknown option `{other}`")),
            }
        }

        if options.circuits == 0 || options.circuits > MAX_CIRCUITS {
            return Err(format!("--circuits must be between 1 and {MAX_CIRCUITS}"));
        }
        if options.tick.is_zero() {
            return Err("--tick must be greater than zero".to_string());
        }
        Ok(options)
    }

    fn sequencer_config(&self) -> SequencerConfig<'static> {
        SequencerConfig::new(&CIRCUITS[..self.circuits])
            .with_max_concurrent(self.max_concurrent)
            .with_open_time(self.open_time)
    }
}

fn parse_count(flag: &str, value: &str) -> Result<usize, String> {
    value
        .parse()
        .map_err(|_| format!("{flag} expects a number, got `{value}`"))
}

fn parse_flag_duration(flag: &str, value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|error| format!("{flag}: {error}"))
}

/// In-memory relay outputs.
#[derive(Debug)]
pub struct SimulatedValves {
    levels: Vec<ActuatorLevel>,
}

impl SimulatedValves {
    pub fn new(outputs: usize) -> Self {
        Self {
            levels: vec![ActuatorLevel::Low; outputs],
        }
    }

    #[cfg(test)]
    pub fn level(&self, output: OutputRef) -> Option<ActuatorLevel> {
        self.levels.get(output.index()).copied()
    }
}

impl ValveDriver for SimulatedValves {
    fn resolves(&self, output: OutputRef) -> bool {
        output.index() < self.levels.len()
    }

    fn drive(&mut self, output: OutputRef, level: ActuatorLevel) {
        if let Some(slot) = self.levels.get_mut(output.index()) {
            *slot = level;
        }
    }
}

/// Status sink collecting published changes until the next command prints them.
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

impl StatusSink for Transcript {
    fn circuit_changed(&mut self, circuit: CircuitId, state: CircuitState) {
        let name = CIRCUITS
            .get(circuit.as_index())
            .map_or("?", |config| config.name);
        let status = CircuitStatus::from_state(state);
        self.lines.push(format!(
            "  publish {name} Status={} {name} Moving={}",
            on_off(status.open),
            on_off(status.moving)
        ));
    }

    fn aggregate_changed(&mut self, open: bool) {
        self.lines
            .push(format!("  publish aggregate open={}", on_off(open)));
    }

    fn record(&mut self, record: &TelemetryRecord) {
        self.lines.push(format!("  event {record}"));
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

type Control = LocalControl<SimulatedValves, Transcript, MAX_CIRCUITS>;

/// Console session driving a simulated valve group with a manual clock.
pub struct EmulatorSession {
    executor: ConsoleExecutor<Control>,
    options: EmulatorOptions,
}

impl EmulatorSession {
    pub fn new(options: EmulatorOptions) -> Result<Self, ConfigError> {
        let sequencer = Sequencer::new(
            &options.sequencer_config(),
            SimulatedValves::new(options.circuits),
            Transcript::default(),
        )?;
        Ok(Self {
            executor: ConsoleExecutor::new(LocalControl::new(sequencer, options.tick)),
            options,
        })
    }

    pub fn options(&self) -> EmulatorOptions {
        self.options
    }

    pub fn control(&self) -> &Control {
        self.executor.control()
    }

    /// Lines published since the last call (startup output on first use).
    pub fn drain_transcript(&mut self) -> Vec<String> {
        self.executor.control_mut().sequencer_mut().sink_mut().take()
    }

    /// Runs one console line; the response comes first, then anything it published.
    pub fn execute(&mut self, line: &str) -> Vec<String> {
        let mut response = String::new();
        if let Err(error) = self.executor.execute(line, &mut response) {
            response.push_str(&format!("error: {error}\n"));
        }

        let mut lines: Vec<String> = response.lines().map(str::to_string).collect();
        lines.extend(self.drain_transcript());
        lines
    }
}

impl fmt::Display for EmulatorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} circuits, max_concurrent={}, open_time={}ms, tick={}ms",
            self.circuits,
            self.max_concurrent,
            self.open_time.as_millis(),
            self.tick.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| (*arg).to_string()).collect()
    }

    fn session() -> EmulatorSession {
        let options = EmulatorOptions::from_args(args(&[
            "--circuits",
            "3",
            "--max-concurrent=1",
            "--open-time",
            "2s",
            "--tick=1s",
        ]))
        .expect("valid options");
        let mut session = EmulatorSession::new(options).expect("valid configuration");
        session.drain_transcript();
        session
    }

    #[test]
    fn options_default_and_parse() {
        assert_eq!(
            EmulatorOptions::from_args(Vec::new()),
            Ok(EmulatorOptions::default())
        );

        let options = EmulatorOptions::from_args(args(&["--open-time=90s", "--circuits", "8"]))
            .expect("valid options");
        assert_eq!(options.open_time, Duration::from_secs(90));
        assert_eq!(options.circuits, 8);

        assert!(EmulatorOptions::from_args(args(&["--circuits", "9"])).is_err());
        assert!(EmulatorOptions::from_args(args(&["--tick", "0ms"])).is_err());
        assert!(EmulatorOptions::from_args(args(&["--tick"])).is_err());
        assert!(EmulatorOptions::from_args(args(&["--verbose"])).is_err());
    }

    #[test]
    fn startup_publishes_every_circuit_closed() {
        let options = EmulatorOptions::from_args(args(&["--circuits", "2"])).expect("valid");
        let mut session = EmulatorSession::new(options).expect("valid configuration");
        let startup = session.drain_transcript();
        assert_eq!(
            startup,
            vec![
                "  publish Living Room Status=off Living Room Moving=off".to_string(),
                "  publish Kitchen Status=off Kitchen Moving=off".to_string(),
                "  event [0] t=0ms aggregate closed".to_string(),
                "  publish aggregate open=off".to_string(),
            ]
        );
    }

    #[test]
    fn single_slot_serialises_transitions() {
        let mut session = session();

        let lines = session.execute("open living");
        assert_eq!(lines[0], "living: open started");
        assert!(lines.contains(&"  publish Living Room Status=off Living Room Moving=on".to_string()));

        let lines = session.execute("open kitchen");
        assert_eq!(lines[0], "kitchen: open queued at position 0");

        let lines = session.execute("advance 2s");
        assert_eq!(lines[0], "advanced 2 tick(s) to t=2.0s: 1 completed, 1 started");
        assert!(lines.contains(&"  publish aggregate open=on".to_string()));
        assert!(lines.contains(&"  publish Kitchen Status=off Kitchen Moving=on".to_string()));

        let control = session.control();
        assert_eq!(control.sequencer().active_count(), 1);
        assert_eq!(
            control.sequencer().driver().level(OutputRef::new(0)),
            Some(ActuatorLevel::High)
        );
    }

    #[test]
    fn errors_are_reported_inline() {
        let mut session = session();
        assert_eq!(session.execute("open garage"), vec!["error: unknown circuit"]);
        assert!(session.execute("shut 0")[0].starts_with("error: syntax error"));
        assert!(session.execute("").is_empty());
    }

    #[test]
    fn events_list_recent_records() {
        let mut session = session();
        session.execute("open bath");
        let lines = session.execute("events 1");
        assert_eq!(lines, vec!["[1] t=0ms transition-started #2 open"]);
    }
}
