use crate::builtins::{handle_builtin, Builtin};
use crate::config::Config;
use crate::error::{ParseError, ShellError};
use crate::exec::{execute_command, report_launch_error};
use crate::jobs::JobControl;
use crate::parser::parse_command_line;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Global prompt string.
pub static PROMPT: &str = "tsh> ";

/// Where command lines come from: a line editor on a terminal, or plain stdin.
enum LineSource {
    Editor {
        editor: DefaultEditor,
        history: Option<PathBuf>,
    },
    Plain {
        emit_prompt: bool,
    },
}

impl LineSource {
    fn new(config: &Config) -> Result<Self, ShellError> {
        if !config.emit_prompt() || !io::stdin().is_terminal() {
            return Ok(LineSource::Plain {
                emit_prompt: config.emit_prompt(),
            });
        }
        let mut editor = DefaultEditor::new()?;
        let history = config.history_path();
        if let Some(path) = &history {
            if let Err(err) = editor.load_history(path) {
                debug!("no history loaded from {}: {}", path.display(), err);
            }
        }
        Ok(LineSource::Editor { editor, history })
    }

    /// Returns the next line, or `None` at end of input.
    fn read_line(&mut self) -> Result<Option<String>, ShellError> {
        match self {
            LineSource::Editor { editor, .. } => loop {
                match editor.readline(PROMPT) {
                    Ok(line) => {
                        if !line.trim().is_empty() {
                            let _ = editor.add_history_entry(line.as_str());
                        }
                        return Ok(Some(line));
                    }
                    // ctrl-c at the prompt only discards the line.
                    Err(ReadlineError::Interrupted) => continue,
                    Err(ReadlineError::Eof) => return Ok(None),
                    Err(err) => return Err(err.into()),
                }
            },
            LineSource::Plain { emit_prompt } => {
                if *emit_prompt {
                    print!("{}", PROMPT);
                    io::stdout().flush()?;
                }
                let mut cmdline = String::new();
                match io::stdin().lock().read_line(&mut cmdline)? {
                    0 => Ok(None),
                    _ => Ok(Some(cmdline)),
                }
            }
        }
    }

    fn save_history(&mut self) {
        if let LineSource::Editor {
            editor,
            history: Some(path),
        } = self
        {
            if let Err(err) = editor.save_history(path) {
                warn!("could not save history to {}: {}", path.display(), err);
            }
        }
    }
}

/// Evaluates one command line: builtins run immediately, anything else is
/// launched as a job. Returns false once `quit` has been read.
pub fn eval(cmdline: &str, ctl: &JobControl) -> bool {
    let cmdline = cmdline.trim_end_matches(&['\n', '\r'][..]);
    match parse_command_line(cmdline) {
        Ok((command, bg)) => {
            debug!("received command: {}", cmdline);
            match handle_builtin(&command, ctl) {
                Builtin::Quit => return false,
                Builtin::Handled => {}
                Builtin::External => {
                    if let Err(err) = execute_command(&command, bg, cmdline, ctl) {
                        report_launch_error(&err);
                    }
                }
            }
        }
        Err(ParseError::Empty) => {}
        Err(err) => println!("{}", err),
    }
    true
}

/// Runs the main shell loop: prints the prompt (if enabled), reads input and
/// evaluates commands until end of input or `quit`.
pub fn run_shell(config: &Config, ctl: &JobControl) -> Result<(), ShellError> {
    let mut input = LineSource::new(config)?;
    while let Some(cmdline) = input.read_line()? {
        let more = eval(&cmdline, ctl);
        io::stdout().flush()?;
        if !more {
            debug!("quit");
            break;
        }
    }
    input.save_history();
    Ok(())
}
