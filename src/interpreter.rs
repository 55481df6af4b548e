//! Command interpreter: parses the command file and drives the engine
//!
//! The command file opens with a mandatory `FLH/<m>` header naming the
//! index fan-out, followed by `INC:<k>` (insert every wine harvested in
//! year `k`) and `BUS=:<k>` (find every wine harvested in year `k`)
//! lines. The output file echoes the header, reports one count line per
//! command, and closes with the final index height.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::info;
use regex::Regex;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::engine::{Engine, EngineError};
use crate::source::{SourceCatalog, SourceError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command file is empty: missing FLH header")]
    MissingHeader,

    #[error("invalid header line: {0:?}")]
    InvalidHeader(String),

    #[error("invalid fan-out {0}: must be at least 2")]
    InvalidFanout(usize),

    #[error("unrecognized command: {0:?}")]
    UnknownCommand(String),

    #[error("invalid key in command {0:?}")]
    InvalidKey(String),
}

pub type CommandResult<T> = Result<T, CommandError>;

/// One line of the command file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `INC:<k>`: insert every wine with harvest year k
    Insert(i32),
    /// `BUS=:<k>`: find every wine with harvest year k
    Search(i32),
}

/// Parsed command file: the header fan-out plus the command sequence
#[derive(Debug, PartialEq, Eq)]
pub struct CommandScript {
    pub max_keys: usize,
    pub commands: Vec<Command>,
}

/// Parse the text of a command file
pub fn parse_script(text: &str) -> CommandResult<CommandScript> {
    let header_re = Regex::new(r"^FLH/(\d+)$").unwrap();
    let insert_re = Regex::new(r"^INC:(-?\d+)$").unwrap();
    let search_re = Regex::new(r"^BUS=:(-?\d+)$").unwrap();

    let mut lines = text.lines().map(str::trim_end);

    let header = lines.next().ok_or(CommandError::MissingHeader)?;
    let caps = header_re
        .captures(header)
        .ok_or_else(|| CommandError::InvalidHeader(header.to_string()))?;
    let max_keys: usize = caps[1]
        .parse()
        .map_err(|_| CommandError::InvalidHeader(header.to_string()))?;
    if max_keys < 2 {
        return Err(CommandError::InvalidFanout(max_keys));
    }

    let mut commands = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = insert_re.captures(line) {
            let key = caps[1]
                .parse()
                .map_err(|_| CommandError::InvalidKey(line.to_string()))?;
            commands.push(Command::Insert(key));
        } else if let Some(caps) = search_re.captures(line) {
            let key = caps[1]
                .parse()
                .map_err(|_| CommandError::InvalidKey(line.to_string()))?;
            commands.push(Command::Search(key));
        } else {
            return Err(CommandError::UnknownCommand(line.to_string()));
        }
    }

    Ok(CommandScript { max_keys, commands })
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Run one full session: parse the command file, open the engine and
/// source catalog, execute every command, write the output file, and
/// flush the engine
pub fn run_session(
    config: &EngineConfig,
    wine_data: &Path,
    commands_file: &Path,
    out_file: &Path,
) -> Result<(), SessionError> {
    let text = fs::read_to_string(commands_file)?;
    let script = parse_script(&text)?;

    let mut engine = Engine::open(config, script.max_keys)?;
    let mut source = SourceCatalog::build(wine_data, &config.source_catalog_path())?;

    let mut writer = BufWriter::new(File::create(out_file)?);
    let result = run_commands(&mut engine, &mut source, &script, &mut writer);
    writer.flush()?;
    result?;

    engine.flush()?;
    info!("session complete: {} command(s)", script.commands.len());
    Ok(())
}

/// Execute the script against an open engine, writing one output line
/// per command; a failed command writes no line
pub fn run_commands<W: Write>(
    engine: &mut Engine,
    source: &mut SourceCatalog,
    script: &CommandScript,
    out: &mut W,
) -> Result<(), SessionError> {
    writeln!(out, "FLH/{}", script.max_keys)?;

    for command in &script.commands {
        match *command {
            Command::Insert(year) => {
                let wines = source.lookup_by_harvest_year(year)?;
                for wine in &wines {
                    engine.insert(wine)?;
                }
                writeln!(out, "INC:{}/{}", year, wines.len())?;
            }
            Command::Search(year) => {
                let found = engine.search(year)?;
                writeln!(out, "BUS=:{}/{}", year, found.len())?;
            }
        }
    }

    writeln!(out, "H/{}", engine.height())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_and_commands() {
        let script = parse_script("FLH/3\nINC:2010\nBUS=:2010\n").unwrap();
        assert_eq!(script.max_keys, 3);
        assert_eq!(
            script.commands,
            vec![Command::Insert(2010), Command::Search(2010)]
        );
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let script = parse_script("FLH/4\n\nINC:1999\n\n\nBUS=:1999\n").unwrap();
        assert_eq!(script.commands.len(), 2);
    }

    #[test]
    fn test_parse_empty_file() {
        assert!(matches!(parse_script(""), Err(CommandError::MissingHeader)));
    }

    #[test]
    fn test_parse_bad_header() {
        assert!(matches!(
            parse_script("FLH-3\nINC:2010\n"),
            Err(CommandError::InvalidHeader(_))
        ));
        assert!(matches!(
            parse_script("INC:2010\n"),
            Err(CommandError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_parse_fanout_too_small() {
        assert!(matches!(
            parse_script("FLH/1\n"),
            Err(CommandError::InvalidFanout(1))
        ));
        assert!(parse_script("FLH/2\n").is_ok());
    }

    #[test]
    fn test_parse_unknown_command() {
        let err = parse_script("FLH/3\nDEL:2010\n").unwrap_err();
        match err {
            CommandError::UnknownCommand(line) => assert_eq!(line, "DEL:2010"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_non_integer_key() {
        assert!(matches!(
            parse_script("FLH/3\nINC:abc\n"),
            Err(CommandError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_parse_windows_line_endings() {
        let script = parse_script("FLH/3\r\nINC:2010\r\n").unwrap();
        assert_eq!(script.commands, vec![Command::Insert(2010)]);
    }
}
