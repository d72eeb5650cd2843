use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use sequencer_core::config::SequencerConfig;
use sequencer_core::registers::Register;
use sequencer_core::sequencer::PowerState;
use sequencer_core::sleep::SleepOutcome;

use crate::command::{self, Command};
use crate::sim::{Emulator, Snapshot};

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "press",
        "press <duration>          - hold the power button, e.g. `press 300ms`",
    ),
    (
        "host",
        "host on|off               - drive the host-running input",
    ),
    (
        "xfer",
        "xfer <addr> [data]        - run one register transaction",
    ),
    (
        "adc",
        "adc <channel> <value>     - set the level on an analog channel",
    ),
    (
        "wait",
        "wait <duration>           - let the controller run",
    ),
    (
        "status",
        "status                    - show sequencer state, inputs, and outputs",
    ),
    (
        "log",
        "log                       - list retained state transitions",
    ),
    (
        "help",
        "help [topic]              - show help for a command",
    ),
    ("exit", "exit                      - leave the emulator"),
];

/// Output of one REPL line.
#[derive(Debug, Default)]
pub struct Response {
    pub lines: Vec<String>,
    /// The user asked to leave.
    pub close: bool,
}

impl Response {
    fn lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            close: false,
        }
    }
}

pub struct Session {
    emulator: Emulator,
    transcript: Option<TranscriptLogger>,
    started_at: Instant,
}

impl Session {
    pub fn new(config: SequencerConfig, transcript: Option<TranscriptLogger>) -> io::Result<Self> {
        let emulator = Emulator::spawn(config)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error.to_string()))?;
        Ok(Self {
            emulator,
            transcript,
            started_at: Instant::now(),
        })
    }

    #[cfg(test)]
    pub fn emulator(&self) -> &Emulator {
        &self.emulator
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Response> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Response::default());
        }

        let elapsed = self.started_at.elapsed();
        self.append(elapsed, TranscriptRole::Host, trimmed)?;

        let mut response = match command::parse(trimmed) {
            Ok(command) => self.execute(command),
            Err(error) => Response::lines(vec![format!("ERR syntax {error}")]),
        };
        for record in self.emulator.drain_transitions() {
            response.lines.push(format!("  {record}"));
        }

        let elapsed = self.started_at.elapsed();
        for line in &response.lines {
            self.append(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(response)
    }

    fn execute(&mut self, command: Command<'_>) -> Response {
        match command {
            Command::Press(hold) => {
                self.emulator.press(hold);
                Response::lines(vec![format!("OK press {}", format_duration_short(hold))])
            }
            Command::Host(running) => {
                self.emulator.set_host(running);
                self.emulator.settle();
                let level = if running { "on" } else { "off" };
                Response::lines(vec![format!("OK host {level}")])
            }
            Command::Transfer { address, data } => Response::lines(vec![self.transfer(address, data)]),
            Command::Analog { channel, value } => {
                self.emulator.set_analog(channel, value);
                Response::lines(vec![format!("OK adc channel={channel} value={value:#06x}")])
            }
            Command::Wait(duration) => {
                thread::sleep(duration);
                Response::lines(vec![format!("OK wait {}", format_duration_short(duration))])
            }
            Command::Status => Response::lines(describe_status(&self.emulator.snapshot())),
            Command::Log => Response::lines(describe_history(&self.emulator.snapshot())),
            Command::Help(topic) => Response::lines(help_lines(topic)),
            Command::Exit => Response {
                lines: vec!["Session closed.".to_string()],
                close: true,
            },
        }
    }

    fn transfer(&self, address: u8, data: u8) -> String {
        let Some(reply) = self.emulator.transfer([address, data, 0]) else {
            return "ERR xfer controller stopped".to_string();
        };
        let value = u16::from_le_bytes([reply[1], reply[2]]);
        format!(
            "OK xfer {} tx=[{address:#04x} {data:#04x} 0x00] rx=[{:#04x} {:#04x} {:#04x}] value={value:#06x}",
            register_label(address),
            reply[0],
            reply[1],
            reply[2],
        )
    }

    fn append(&mut self, elapsed: Duration, role: TranscriptRole, line: &str) -> io::Result<()> {
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_line(elapsed, role, line),
            None => Ok(()),
        }
    }
}

/// Writes every exchanged line to a file, timestamped from session start.
pub struct TranscriptLogger {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl TranscriptLogger {
    pub fn create(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        };

        logger.write_header(header)?;
        Ok(logger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_header(&mut self, header: &str) -> io::Result<()> {
        writeln!(self.writer, "# {header}")?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

fn help_lines(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn register_label(address: u8) -> &'static str {
    match Register::decode(address) {
        Register::ChannelRequest => "channel-request",
        Register::ChannelMask => "channel-mask",
        Register::ToggleAux => "toggle-aux",
        Register::FirmwareIdentity => "identity",
        Register::SequencerState => "state",
        Register::Capability => "capability",
        Register::Result(_) => "result",
        Register::Reserved(_) => "reserved",
    }
}

fn state_label(state: Option<PowerState>) -> &'static str {
    state.map_or("<undecodable>", PowerState::name)
}

fn level_label(level: bool) -> &'static str {
    if level { "high" } else { "low" }
}

fn describe_status(snapshot: &Snapshot) -> Vec<String> {
    let mut lines = vec![
        format!(
            "state={} previous={} tick={}",
            state_label(snapshot.state),
            state_label(snapshot.previous),
            snapshot.ticks
        ),
        format!(
            "inputs: button={} host-running={}",
            snapshot.button, snapshot.host_running
        ),
        format!(
            "outputs: enable={} shutdown-request={} aux={}",
            level_label(snapshot.enable),
            level_label(snapshot.shutdown_request),
            if snapshot.aux_driven_low {
                "driven-low"
            } else {
                "released"
            }
        ),
    ];

    let mut adc = format!("adc: mask={:#010b}", snapshot.channel_mask);
    for (channel, value) in snapshot.results.iter().enumerate() {
        if snapshot.channel_mask & (1 << channel) != 0 {
            adc.push_str(&format!(" ch{channel}={value:#06x}"));
        }
    }
    lines.push(adc);

    let last_sleep = match snapshot.last_sleep {
        None => "never".to_string(),
        Some(SleepOutcome::Skipped) => "skipped".to_string(),
        Some(SleepOutcome::Woken { suspends }) => format!("woken after {suspends} suspend(s)"),
    };
    lines.push(format!(
        "power-downs={} last={last_sleep} transactions={} faults={} watchdog-expirations={}",
        snapshot.power_downs, snapshot.transactions, snapshot.faults, snapshot.watchdog_expirations
    ));
    lines
}

fn describe_history(snapshot: &Snapshot) -> Vec<String> {
    if snapshot.history.is_empty() {
        return vec!["no transitions recorded".to_string()];
    }
    let retained = snapshot.history.len();
    let mut lines = vec![format!(
        "{retained} of {} transitions retained",
        snapshot.transitions_total
    )];
    lines.extend(snapshot.history.iter().map(|record| format!("  {record}")));
    lines
}

fn format_duration_short(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let config = SequencerConfig::new()
            .with_tick_period(Duration::from_millis(1))
            .with_wake_timeout(Duration::from_secs(30))
            .with_idle_timeout(None);
        let session = Session::new(config, None).expect("session starts");
        assert!(
            session
                .emulator()
                .wait_for(Duration::from_secs(2), |snapshot| {
                    snapshot.state == Some(PowerState::Wait)
                })
        );
        // Boot transitions would otherwise trail the first response.
        let _ = session.emulator().drain_transitions();
        session
    }

    #[test]
    fn help_lists_every_topic() {
        let mut session = session();
        let response = session.handle_command("help").expect("help runs");
        assert_eq!(response.lines.len(), HELP_TOPICS.len() + 2);
        assert!(!response.close);

        let response = session.handle_command("help bogus").expect("help runs");
        assert!(response.lines[1].contains("xfer"));
    }

    #[test]
    fn syntax_errors_are_reported_not_fatal() {
        let mut session = session();
        let response = session.handle_command("xfer").expect("line handled");
        assert!(response.lines[0].starts_with("ERR syntax"));
    }

    #[test]
    fn identity_transfer_is_decoded() {
        let mut session = session();
        let response = session.handle_command("xfer 0x04").expect("xfer runs");
        let expected = u16::from_le_bytes([
            sequencer_core::config::FIRMWARE_MAJOR,
            sequencer_core::config::FIRMWARE_MINOR,
        ]);
        assert!(response.lines[0].starts_with("OK xfer identity"));
        assert!(response.lines[0].ends_with(&format!("value={expected:#06x}")));
    }

    #[test]
    fn exit_closes_the_session() {
        let mut session = session();
        let response = session.handle_command("quit").expect("exit runs");
        assert!(response.close);
    }

    #[test]
    fn transcript_records_both_directions() {
        let path = std::env::temp_dir().join(format!(
            "sequencer-emulator-transcript-{}.log",
            std::process::id()
        ));
        {
            let logger = TranscriptLogger::create(&path, "test transcript").expect("create");
            assert_eq!(logger.path(), path.as_path());
            let config = SequencerConfig::new().with_tick_period(Duration::from_millis(1));
            let mut session = Session::new(config, Some(logger)).expect("session starts");
            session.handle_command("help exit").expect("help runs");
        }

        let contents = fs::read_to_string(&path).expect("transcript written");
        let _ = fs::remove_file(&path);
        assert!(contents.starts_with("# test transcript"));
        assert!(contents.contains("HOST> help exit"));
        assert!(contents.contains("EMU < exit"));
    }

    #[test]
    fn status_reports_the_resting_state() {
        let mut session = session();
        let response = session.handle_command("status").expect("status runs");
        assert!(response.lines[0].starts_with("state=wait "));
        assert!(response.lines[2].contains("enable=low"));
    }
}
