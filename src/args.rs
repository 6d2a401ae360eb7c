//! Command-line handling.
//!
//! A command is given either as pre-split tokens or as one string that is split
//! with POSIX word rules (quotes and backslash escapes honored, no globbing or
//! variable expansion).

use crate::error::ConfigError;

/// A command as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Already tokenized; element 0 is the executable.
    Tokens(Vec<String>),
    /// A single shell-like string to be word-split.
    Line(String),
}

impl CommandLine {
    /// Resolve into a validated argument vector.
    pub fn into_args(self) -> Result<Vec<String>, ConfigError> {
        let args = match self {
            CommandLine::Tokens(tokens) => tokens,
            CommandLine::Line(line) => tokenize(&line)?,
        };
        validate_args(&args)?;
        Ok(args)
    }
}

impl From<&str> for CommandLine {
    fn from(line: &str) -> Self {
        CommandLine::Line(line.to_string())
    }
}

impl From<String> for CommandLine {
    fn from(line: String) -> Self {
        CommandLine::Line(line)
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(tokens: Vec<String>) -> Self {
        CommandLine::Tokens(tokens)
    }
}

impl From<Vec<&str>> for CommandLine {
    fn from(tokens: Vec<&str>) -> Self {
        CommandLine::Tokens(tokens.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for CommandLine {
    fn from(tokens: &[&str]) -> Self {
        CommandLine::Tokens(tokens.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CommandLine {
    fn from(tokens: [&str; N]) -> Self {
        CommandLine::Tokens(tokens.iter().map(|s| s.to_string()).collect())
    }
}

/// Split a command line into words.
///
/// # Errors
///
/// - `Tokenize` on unbalanced quotes or a trailing backslash
/// - `EmptyCommand` if the line holds no words
pub fn tokenize(line: &str) -> Result<Vec<String>, ConfigError> {
    let words = shlex::split(line).ok_or_else(|| ConfigError::Tokenize {
        input: line.to_string(),
        reason: "unbalanced quotes or trailing escape",
    })?;
    if words.is_empty() {
        return Err(ConfigError::EmptyCommand);
    }
    Ok(words)
}

/// Check an argument vector can be handed to the OS.
pub fn validate_args(args: &[String]) -> Result<(), ConfigError> {
    if args.is_empty() {
        return Err(ConfigError::EmptyCommand);
    }
    if let Some(index) = args.iter().position(|a| a.contains('\0')) {
        return Err(ConfigError::ArgContainsNul { index });
    }
    Ok(())
}

/// Split a pipeline string on `|` characters that are not quoted or escaped.
///
/// The stages are returned untokenized.
pub fn split_pipeline(line: &str) -> Result<Vec<String>, ConfigError> {
    let mut stages = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (None, '|') => stages.push(std::mem::take(&mut current)),
            (None, '\'' | '"') => {
                quote = Some(ch);
                current.push(ch);
            }
            (Some(q), c) if c == q => {
                quote = None;
                current.push(ch);
            }
            // backslash escapes outside quotes and inside double quotes
            (None | Some('"'), '\\') => {
                current.push(ch);
                match chars.next() {
                    Some(next) => current.push(next),
                    None => {
                        return Err(ConfigError::Tokenize {
                            input: line.to_string(),
                            reason: "trailing escape",
                        })
                    }
                }
            }
            _ => current.push(ch),
        }
    }

    if quote.is_some() {
        return Err(ConfigError::Tokenize {
            input: line.to_string(),
            reason: "unbalanced quotes",
        });
    }
    stages.push(current);

    for (index, stage) in stages.iter().enumerate() {
        if stage.trim().is_empty() {
            return Err(ConfigError::EmptyPipelineStage { index });
        }
    }
    Ok(stages)
}
