use std::env;
use std::io;
use std::path::Path;
use std::time::Duration;

#[allow(dead_code)]
#[path = "../command.rs"]
mod command;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;
#[allow(dead_code)]
#[path = "../sim.rs"]
mod sim;

use sequencer_core::config::SequencerConfig;
use session::{Session, TranscriptLogger};

/// Scripted sessions, one transcript file each.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TranscriptProfile {
    PowerCycle,
    Registers,
    IdleDwell,
}

impl TranscriptProfile {
    fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::PowerCycle => "transcripts/emulator-power-cycle.log",
            TranscriptProfile::Registers => "transcripts/emulator-registers.log",
            TranscriptProfile::IdleDwell => "transcripts/emulator-idle-dwell.log",
        }
    }

    fn header(self) -> &'static str {
        match self {
            TranscriptProfile::PowerCycle => "Power sequencer emulator power-cycle transcript",
            TranscriptProfile::Registers => "Power sequencer emulator register transcript",
            TranscriptProfile::IdleDwell => "Power sequencer emulator idle-dwell transcript",
        }
    }

    fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("power-cycle") {
            Ok(Self::PowerCycle)
        } else if tag.eq_ignore_ascii_case("registers") {
            Ok(Self::Registers)
        } else if tag.eq_ignore_ascii_case("idle-dwell") {
            Ok(Self::IdleDwell)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

const ALL_PROFILES: [TranscriptProfile; 3] = [
    TranscriptProfile::PowerCycle,
    TranscriptProfile::Registers,
    TranscriptProfile::IdleDwell,
];

fn main() -> io::Result<()> {
    let mut selected = Vec::new();
    for tag in env::args().skip(1) {
        let profile = TranscriptProfile::from_tag(&tag)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        selected.push(profile);
    }
    if selected.is_empty() {
        selected.extend(ALL_PROFILES);
    }

    for profile in selected {
        record_profile(profile)?;
        println!("wrote {}", profile.log_path());
    }
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let config = match profile {
        TranscriptProfile::IdleDwell => {
            SequencerConfig::new().with_idle_timeout(Some(Duration::from_millis(400)))
        }
        TranscriptProfile::PowerCycle | TranscriptProfile::Registers => {
            SequencerConfig::new().with_idle_timeout(None)
        }
    };
    let transcript = TranscriptLogger::create(Path::new(profile.log_path()), profile.header())?;
    let mut session = Session::new(config, Some(transcript))?;
    let script: &[&str] = match profile {
        TranscriptProfile::PowerCycle => &[
            "status",
            "press 100ms",
            "status",
            "press 300ms",
            "host on",
            "status",
            "press 300ms",
            "host off",
            "wait 100ms",
            "status",
            "press 50ms",
            "log",
        ],
        TranscriptProfile::Registers => &[
            "xfer 0x04",
            "xfer 0x06",
            "xfer 0x05",
            "adc 0 0x155",
            "adc 2 0x2aa",
            "xfer 0x01 0x05",
            "wait 100ms",
            "xfer 0x02",
            "xfer 0x10",
            "xfer 0x11",
            "xfer 0x12",
            "xfer 0x03",
            "status",
            "xfer 0x03",
            "xfer 0x30",
            "help xfer",
        ],
        TranscriptProfile::IdleDwell => &[
            "press 300ms",
            "host on",
            "wait 600ms",
            "status",
            "xfer 0x05",
            "status",
            "host off",
            "wait 100ms",
            "status",
            "log",
        ],
    };

    for line in script {
        let _ = session.handle_command(line)?;
    }
    let _ = session.handle_command("exit")?;
    Ok(())
}
