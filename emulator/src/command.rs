//! Line grammar for the emulator REPL.
//!
//! ```text
//! press <duration>          hold the power button
//! host on|off               drive the host-running input
//! xfer <addr> [<data>]      one three-byte register transaction
//! adc <channel> <value>     set the level seen by an analog channel
//! wait <duration>           let the controller run
//! status | log | help [topic] | exit
//! ```
//!
//! Durations are integers with an optional `ms` or `s` suffix (default `ms`).
//! Byte and sample values accept decimal or `0x`-prefixed hex.

use core::fmt;
use core::time::Duration;

use sequencer_core::shared::CHANNEL_COUNT;
use winnow::ascii::{Caseless, dec_uint, hex_uint, space0, space1};
use winnow::combinator::{alt, cut_err, eof, opt, preceded, terminated};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::take_while;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Press(Duration),
    Host(bool),
    Transfer { address: u8, data: u8 },
    Analog { channel: u8, value: u16 },
    Wait(Duration),
    Status,
    Log,
    Help(Option<&'a str>),
    Exit,
}

/// Rejected input with the byte offset where parsing stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxError {
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "unexpected input at column {}", self.offset + 1)
        } else {
            write!(f, "{} at column {}", self.message, self.offset + 1)
        }
    }
}

/// Parses one REPL line.
pub fn parse(line: &str) -> Result<Command<'_>, SyntaxError> {
    delimited_command.parse(line).map_err(|error| SyntaxError {
        offset: error.offset(),
        message: error.inner().to_string(),
    })
}

fn delimited_command<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded(space0, terminated(command, (space0, eof))).parse_next(input)
}

fn command<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    alt((
        press, host, transfer, analog, wait, status, log, help, exit,
    ))
    .context(StrContext::Label("command"))
    .parse_next(input)
}

fn press<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded((Caseless("press"), space1), cut_err(duration))
        .map(Command::Press)
        .parse_next(input)
}

fn host<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded(
        (Caseless("host"), space1),
        cut_err(alt((Caseless("on").value(true), Caseless("off").value(false))))
            .context(StrContext::Expected(StrContextValue::Description("on or off"))),
    )
    .map(Command::Host)
    .parse_next(input)
}

fn transfer<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded(
        (Caseless("xfer"), space1),
        cut_err((byte, opt(preceded(space1, byte)))),
    )
    .map(|(address, data)| Command::Transfer {
        address,
        data: data.unwrap_or(0),
    })
    .parse_next(input)
}

fn analog<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded(
        (Caseless("adc"), space1),
        cut_err((channel, preceded(space1, sample))),
    )
    .map(|(channel, value)| Command::Analog { channel, value })
    .parse_next(input)
}

fn wait<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded((Caseless("wait"), space1), cut_err(duration))
        .map(Command::Wait)
        .parse_next(input)
}

fn status<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    Caseless("status").value(Command::Status).parse_next(input)
}

fn log<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    Caseless("log").value(Command::Log).parse_next(input)
}

fn help<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded(
        Caseless("help"),
        opt(preceded(
            space1,
            take_while(1.., |c: char| c.is_ascii_alphanumeric()),
        )),
    )
    .map(Command::Help)
    .parse_next(input)
}

fn exit<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    alt((Caseless("exit"), Caseless("quit")))
        .value(Command::Exit)
        .parse_next(input)
}

fn duration(input: &mut &str) -> ModalResult<Duration> {
    (
        dec_uint::<_, u64, _>,
        opt(alt((Caseless("ms").value(1u64), Caseless("s").value(1_000u64)))),
    )
        .map(|(count, unit)| Duration::from_millis(count.saturating_mul(unit.unwrap_or(1))))
        .context(StrContext::Expected(StrContextValue::Description(
            "duration such as 250ms or 2s",
        )))
        .parse_next(input)
}

fn byte(input: &mut &str) -> ModalResult<u8> {
    alt((preceded(alt(("0x", "0X")), hex_uint), dec_uint))
        .context(StrContext::Expected(StrContextValue::Description(
            "byte value (0-255 or 0x00-0xFF)",
        )))
        .parse_next(input)
}

fn sample(input: &mut &str) -> ModalResult<u16> {
    alt((preceded(alt(("0x", "0X")), hex_uint), dec_uint))
        .context(StrContext::Expected(StrContextValue::Description(
            "sample value (0-65535)",
        )))
        .parse_next(input)
}

fn channel(input: &mut &str) -> ModalResult<u8> {
    dec_uint
        .verify(|channel: &u8| usize::from(*channel) < CHANNEL_COUNT)
        .context(StrContext::Expected(StrContextValue::Description(
            "channel 0-7",
        )))
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_press_with_units() {
        assert_eq!(
            parse("press 250"),
            Ok(Command::Press(Duration::from_millis(250)))
        );
        assert_eq!(
            parse("PRESS 2s"),
            Ok(Command::Press(Duration::from_secs(2)))
        );
        assert_eq!(
            parse("  press 40ms  "),
            Ok(Command::Press(Duration::from_millis(40)))
        );
    }

    #[test]
    fn parses_host_levels() {
        assert_eq!(parse("host on"), Ok(Command::Host(true)));
        assert_eq!(parse("host OFF"), Ok(Command::Host(false)));
        assert!(parse("host maybe").is_err());
    }

    #[test]
    fn parses_transfers_in_hex_and_decimal() {
        assert_eq!(
            parse("xfer 0x01 0x15"),
            Ok(Command::Transfer {
                address: 0x01,
                data: 0x15
            })
        );
        assert_eq!(
            parse("xfer 4"),
            Ok(Command::Transfer {
                address: 4,
                data: 0
            })
        );
        assert!(parse("xfer 0x100").is_err());
        assert!(parse("xfer 256").is_err());
    }

    #[test]
    fn analog_channel_is_bounded() {
        assert_eq!(
            parse("adc 7 0x3FF"),
            Ok(Command::Analog {
                channel: 7,
                value: 0x3FF
            })
        );
        assert!(parse("adc 8 10").is_err());
        assert!(parse("adc 2").is_err());
    }

    #[test]
    fn parses_bare_keywords() {
        assert_eq!(parse("status"), Ok(Command::Status));
        assert_eq!(parse("log"), Ok(Command::Log));
        assert_eq!(parse("exit"), Ok(Command::Exit));
        assert_eq!(parse("quit"), Ok(Command::Exit));
        assert_eq!(parse("help"), Ok(Command::Help(None)));
        assert_eq!(parse("help xfer"), Ok(Command::Help(Some("xfer"))));
    }

    #[test]
    fn rejects_trailing_input() {
        assert!(parse("status now").is_err());
        assert!(parse("wait 10 20").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn error_points_at_the_offending_column() {
        let error = parse("press soon").expect_err("not a duration");
        assert_eq!(error.offset, "press ".len());
        assert!(error.to_string().contains("column 7"));
    }
}
