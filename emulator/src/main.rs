mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use session::{EmulatorOptions, EmulatorSession};

fn main() -> io::Result<()> {
    let options = EmulatorOptions::from_args(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!(
            "Usage: valve-emulator [--circuits <1-8>] [--max-concurrent <n>] \
             [--open-time <duration>] [--tick <duration>]"
        );
        process::exit(2);
    });

    let mut session = EmulatorSession::new(options).unwrap_or_else(|err| {
        eprintln!("invalid configuration: {err}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut line = String::new();

    writeln!(writer, "Valve sequencer emulator: {}", session.options())?;
    for entry in session.drain_transcript() {
        writeln!(writer, "{entry}")?;
    }
    writeln!(
        writer,
        "Type `help` for commands or `exit` to quit. Time only moves with `tick`/`advance`."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.execute(trimmed) {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}
