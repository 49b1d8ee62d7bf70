use clap::Parser;
use once_cell::sync::Lazy;
use std::path::PathBuf;

/// Default location of the interactive history file.
static DEFAULT_HISTORY: Lazy<Option<PathBuf>> =
    Lazy::new(|| dirs_next::home_dir().map(|home| home.join(".tsh_history")));

/// tsh - a tiny shell with job control
#[derive(Debug, Clone, Parser)]
#[command(name = "tsh", version, about)]
pub struct Config {
    /// Print additional diagnostic information
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not emit a command prompt (handy for automatic testing)
    #[arg(short = 'p', long = "no-prompt")]
    pub no_prompt: bool,

    /// History file used for interactive line editing
    #[arg(long, env = "TSH_HISTORY")]
    pub history: Option<PathBuf>,
}

impl Config {
    pub fn emit_prompt(&self) -> bool {
        !self.no_prompt
    }

    pub fn history_path(&self) -> Option<PathBuf> {
        self.history.clone().or_else(|| DEFAULT_HISTORY.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_flags() {
        let config = Config::try_parse_from(["tsh", "-v", "-p"]).unwrap();
        assert!(config.verbose);
        assert!(!config.emit_prompt());
    }

    #[test]
    fn test_defaults_and_history_override() {
        let config = Config::try_parse_from(["tsh", "--history", "/tmp/h"]).unwrap();
        assert!(!config.verbose);
        assert!(config.emit_prompt());
        assert_eq!(config.history_path(), Some(PathBuf::from("/tmp/h")));
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(Config::try_parse_from(["tsh", "-x"]).is_err());
    }
}
