use crate::error::ParseError;

pub const MAXARGS: usize = 128;

/// Represents a parsed command.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Command {
    /// Command and its arguments, with redirection tokens removed.
    pub argv: Vec<String>,
    /// Input redirection file, if any.
    pub infile: Option<String>,
    /// Output redirection file, if any.
    pub outfile: Option<String>,
    /// Append mode flag for output redirection.
    pub append: bool,
}

impl Command {
    /// Creates a new, empty command.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parses the input command line and returns the command along with a
/// background execution flag.
///
/// - Arguments are space-delimited; a leading `'` starts an argument that runs
///   up to the next `'`.
/// - A last token that is exactly `&` requests background execution and is
///   removed.
/// - `<`, `>` and `>>` consume the following token as a file name; both are
///   removed from `argv` (see [`split_redirections`]).
pub fn parse_command_line(cmdline: &str) -> Result<(Command, bool), ParseError> {
    let mut tokens = tokenize(cmdline);
    let bg = tokens.last().is_some_and(|t| t == "&");
    if bg {
        tokens.pop();
    }
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    if tokens.len() > MAXARGS - 1 {
        return Err(ParseError::TooManyArgs);
    }
    Ok((split_redirections(tokens)?, bg))
}

/// Splits the command line into argument tokens.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = input.trim_end_matches(&['\n', '\r'][..]);
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(quoted) = rest.strip_prefix('\'') {
            // An unterminated quote swallows the rest of the line.
            let end = quoted.find('\'').unwrap_or(quoted.len());
            tokens.push(quoted[..end].to_string());
            rest = quoted.get(end + 1..).unwrap_or("");
        } else {
            let end = rest.find(' ').unwrap_or(rest.len());
            tokens.push(rest[..end].to_string());
            rest = &rest[end..];
        }
    }
    tokens
}

/// Removes redirection operators and their file names from the argument
/// vector, recording the targets on the returned [`Command`].
pub fn split_redirections(tokens: Vec<String>) -> Result<Command, ParseError> {
    let mut cmd = Command::new();
    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        match token.as_str() {
            "<" => {
                let file = iter.next().ok_or(ParseError::MissingRedirectTarget(token))?;
                cmd.infile = Some(file);
            }
            ">" | ">>" => {
                cmd.append = token == ">>";
                let file = iter.next().ok_or(ParseError::MissingRedirectTarget(token))?;
                cmd.outfile = Some(file);
            }
            _ => cmd.argv.push(token),
        }
    }
    if cmd.argv.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(cmd)
}
