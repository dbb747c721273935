use core::time::Duration;

use valve_core::console::{ConsoleError, ConsoleExecutor, LocalControl};
use valve_core::{
    CircuitConfig, NoopStatusSink, NoopValveDriver, OutputRef, Sequencer, SequencerConfig,
};

const CIRCUITS: [CircuitConfig; 3] = [
    CircuitConfig::new("kitchen", "Kitchen", OutputRef::new(0)),
    CircuitConfig::new("bath", "Bathroom", OutputRef::new(1)),
    CircuitConfig::new("hall", "Hallway", OutputRef::new(2)),
];

type Console = ConsoleExecutor<LocalControl<NoopValveDriver, NoopStatusSink, 4>>;

fn console() -> Console {
    let config = SequencerConfig::new(&CIRCUITS)
        .with_max_concurrent(2)
        .with_open_time(Duration::from_secs(1));
    let sequencer = Sequencer::new(&config, NoopValveDriver, NoopStatusSink)
        .expect("configuration should be valid");
    ConsoleExecutor::new(LocalControl::new(sequencer, Duration::from_millis(100)))
}

fn run(console: &mut Console, line: &str) -> String {
    let mut out = String::new();
    console
        .execute(line, &mut out)
        .unwrap_or_else(|error| panic!("`{line}` failed: {error}"));
    out
}

#[test]
fn scripted_session_matches_expected_transcript() {
    let mut console = console();

    assert_eq!(run(&mut console, "open kitchen"), "kitchen: open started\n");
    assert_eq!(run(&mut console, "open bath"), "bath: open started\n");
    assert_eq!(
        run(&mut console, "open 2"),
        "hall: open queued at position 0\n"
    );
    assert_eq!(run(&mut console, "open hall"), "hall: open no change\n");

    assert_eq!(
        run(&mut console, "advance 1s"),
        "advanced 10 tick(s) to t=1.0s: 2 completed, 1 started\n"
    );

    let status = run(&mut console, "status");
    let lines: Vec<&str> = status.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "#0 kitchen state=open Kitchen Status=on Kitchen Moving=off"
    );
    assert_eq!(
        lines[2],
        "#2 hall state=opening Hallway Status=off Hallway Moving=on remaining=1.0s"
    );
    assert_eq!(
        lines[3],
        "slots active=1/2 queued=0 aggregate=open uptime=1.0s"
    );

    assert_eq!(
        run(&mut console, "close kitchen"),
        "kitchen: close started\n"
    );
    assert_eq!(
        run(&mut console, "close hall"),
        "hall: close reversal deferred\n"
    );
}

#[test]
fn events_replay_recent_history() {
    let mut console = console();
    run(&mut console, "open bath");
    run(&mut console, "tick 10");

    let events = run(&mut console, "events 2");
    assert_eq!(
        events,
        "[2] t=1.0s transition-completed #1 open\n[3] t=1.0s aggregate open\n"
    );
}

#[test]
fn errors_are_reported_without_side_effects() {
    let mut console = console();
    let mut out = String::new();

    assert_eq!(
        console.execute("open cellar", &mut out),
        Err(ConsoleError::UnknownCircuit)
    );
    assert_eq!(
        console.execute("open 9", &mut out),
        Err(ConsoleError::UnknownCircuit)
    );
    assert!(matches!(
        console.execute("opn kitchen", &mut out),
        Err(ConsoleError::Parse(_))
    ));
    assert!(out.is_empty());
    assert_eq!(console.control().sequencer().active_count(), 0);
}
