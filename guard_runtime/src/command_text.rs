use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

use crate::{CommandPayload, SpawnKind, TpsOverride};

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
    #[error("invalid float '{value}' for {context}: {source}")]
    InvalidFloat {
        value: String,
        context: &'static str,
        source: ParseFloatError,
    },
    #[error("invalid monitor action '{0}'")]
    InvalidMonitorAction(String),
    #[error("invalid test action '{0}'")]
    InvalidTestAction(String),
    #[error("invalid spawn kind '{0}'")]
    InvalidSpawnKind(String),
}

/// Parse one console line such as `monitor reset` or `spawn item 40 120 -8`.
///
/// A leading `/pp` or `pp` prefix is accepted so lines pasted from the game
/// chat parse the same as console input.
pub fn parse_command_line(input: &str) -> Result<CommandPayload, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace().peekable();
    if matches!(parts.peek(), Some(&"/pp") | Some(&"pp")) {
        parts.next();
    }
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    match verb.as_str() {
        "status" => Ok(CommandPayload::Status),
        "emergency" => Ok(CommandPayload::Emergency),
        "cleanup" => Ok(CommandPayload::Cleanup),
        "reload" => Ok(CommandPayload::Reload),
        "lazystats" | "lazydebug" => Ok(CommandPayload::LazyStats),
        "help" => Ok(CommandPayload::Help),
        "monitor" => {
            let action = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("monitor action"))?
                .to_ascii_lowercase();
            match action.as_str() {
                "reset" => Ok(CommandPayload::MonitorReset),
                other => Err(CommandParseError::InvalidMonitorAction(other.to_string())),
            }
        }
        "test" => {
            let action = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("test action"))?
                .to_ascii_lowercase();
            match action.as_str() {
                "tps" => {
                    let value_str = parts
                        .next()
                        .ok_or(CommandParseError::MissingArgument("tps value"))?;
                    let value = if value_str.eq_ignore_ascii_case("clear") {
                        TpsOverride::Clear
                    } else {
                        TpsOverride::Pin(parse_f64(value_str, "tps value")?)
                    };
                    Ok(CommandPayload::TestTps { value })
                }
                "notify" => Ok(CommandPayload::TestNotify),
                other => Err(CommandParseError::InvalidTestAction(other.to_string())),
            }
        }
        "spawn" => {
            let kind_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("kind"))?
                .to_ascii_lowercase();
            let kind = SpawnKind::from_keyword(&kind_str)
                .ok_or_else(|| CommandParseError::InvalidSpawnKind(kind_str.clone()))?;
            let count = parse_u32(parts.next().unwrap_or("1"), "spawn count")?;
            let x = parse_f64(parts.next().unwrap_or("0"), "spawn x")?;
            let z = parse_f64(parts.next().unwrap_or("0"), "spawn z")?;
            Ok(CommandPayload::Spawn { kind, count, x, z })
        }
        other => Err(CommandParseError::UnknownCommand(other.to_string())),
    }
}

fn parse_u32(value: &str, context: &'static str) -> Result<u32, CommandParseError> {
    value
        .parse::<u32>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_f64(value: &str, context: &'static str) -> Result<f64, CommandParseError> {
    value
        .parse::<f64>()
        .map_err(|source| CommandParseError::InvalidFloat {
            value: value.to_string(),
            context,
            source,
        })
}
