mod command;
mod session;
mod sim;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use sequencer_core::config::SequencerConfig;
use session::{Session, TranscriptLogger};

const USAGE: &str = "Usage: sequencer-emulator [--tick-ms <n>] [--hold-ms <n>] [--wake-ms <n>] \
                     [--idle-ms <n> | --no-idle] [--transcript <path>]";

#[derive(Debug)]
struct Options {
    config: SequencerConfig,
    transcript: Option<PathBuf>,
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let transcript = match options.transcript.as_deref() {
        Some(path) => Some(TranscriptLogger::create(
            path,
            "Power sequencer emulator interactive transcript",
        )?),
        None => None,
    };
    if let Some(logger) = transcript.as_ref() {
        eprintln!("Recording transcript to {}", logger.path().display());
    }

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.config, transcript)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Power sequencer emulator ready. Type `help` for commands or `exit` to quit."
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

        let response = session.handle_command(&line)?;
        for output in &response.lines {
            writeln!(writer, "{output}")?;
        }
        if response.close {
            break;
        }
    }

    Ok(())
}

fn parse_options(args: impl IntoIterator<Item = String>) -> Result<Options, String> {
    let mut config = SequencerConfig::new();
    let mut transcript = None;
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
            "--tick-ms" => config = config.with_tick_period(millis(&flag, &value()?)?),
            "--hold-ms" => config = config.with_hold_threshold(millis(&flag, &value()?)?),
            "--wake-ms" => config = config.with_wake_timeout(millis(&flag, &value()?)?),
            "--idle-ms" => config = config.with_idle_timeout(Some(millis(&flag, &value()?)?)),
            "--no-idle" => config = config.with_idle_timeout(None),
            "--transcript" => transcript = Some(PathBuf::from(value()?)),
            _ => return Err(format!("Unknown option `{flag}`")),
        }
    }

    config
        .validate()
        .map_err(|error| format!("Invalid configuration: {error}"))?;
    Ok(Options { config, transcript })
}

fn millis(flag: &str, value: &str) -> Result<Duration, String> {
    value
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| format!("{flag} expects whole milliseconds, got `{value}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn defaults_without_flags() {
        let options = parse_options(Vec::new()).expect("defaults are valid");
        assert_eq!(options.config, SequencerConfig::new());
        assert!(options.transcript.is_none());
    }

    #[test]
    fn accepts_separate_and_inline_values() {
        let options = parse_options(args(&[
            "--tick-ms",
            "2",
            "--hold-ms=100",
            "--no-idle",
            "--transcript=out.log",
        ]))
        .expect("flags are valid");
        assert_eq!(options.config.tick_period, Duration::from_millis(2));
        assert_eq!(options.config.hold_threshold, Duration::from_millis(100));
        assert_eq!(options.config.idle_timeout, None);
        assert_eq!(options.transcript, Some(PathBuf::from("out.log")));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_options(args(&["--hold-ms"])).is_err());
        assert!(parse_options(args(&["--wake-ms", "soon"])).is_err());
        assert!(parse_options(args(&["--frobnicate"])).is_err());
        assert!(parse_options(args(&["--tick-ms", "0"])).is_err());
    }
}
