//! Operator commands read line by line from stdin.

use std::path::PathBuf;
use thiserror::Error;

pub const HELP: &str = "commands: start | stop | add <image path> | status | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Enable recognition from the next frame on.
    Start,
    /// Disable recognition from the next frame on.
    Stop,
    /// Copy an image into the reference directory and register it.
    Add(PathBuf),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command: {0} ({HELP})")]
    Unknown(String),
    #[error("usage: add <image path>")]
    MissingPath,
}

impl Command {
    /// Parse one input line; blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Result<Self, ParseError>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "add" if rest.is_empty() => Err(ParseError::MissingPath),
            "add" => Ok(Command::Add(PathBuf::from(rest))),
            "status" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        };
        Some(command)
    }
}
