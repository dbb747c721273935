//! Help catalog shared by every console front end.

/// Static help entry for a console command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
    /// Only available where time is simulated.
    pub simulated_only: bool,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "open",
        usage: "open <index|key>",
        summary: "request that a circuit opens",
        simulated_only: false,
    },
    CommandSpec {
        name: "close",
        usage: "close <index|key>",
        summary: "request that a circuit closes",
        simulated_only: false,
    },
    CommandSpec {
        name: "status",
        usage: "status",
        summary: "show circuit states, slot usage and the aggregate flag",
        simulated_only: false,
    },
    CommandSpec {
        name: "events",
        usage: "events [count]",
        summary: "replay recent scheduler events",
        simulated_only: true,
    },
    CommandSpec {
        name: "tick",
        usage: "tick [count]",
        summary: "advance the scheduler by whole tick periods",
        simulated_only: true,
    },
    CommandSpec {
        name: "advance",
        usage: "advance <duration>",
        summary: "advance the scheduler by a duration such as 500ms, 30s or 5min",
        simulated_only: true,
    },
    CommandSpec {
        name: "help",
        usage: "help [command]",
        summary: "list commands or describe one",
        simulated_only: false,
    },
];

/// Finds a command by name, ignoring ASCII case.
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}
