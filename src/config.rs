use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const DEFAULT_GIT_BINARY: &str = "git";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    pub debug: Option<bool>,
    pub show_ignored: Option<bool>,
    /// Append every git command line to this file
    pub logfile: Option<PathBuf>,
    pub git_binary: Option<PathBuf>,
}

impl Config {
    pub fn load() -> color_eyre::eyre::Result<Self> {
        let config_path = Self::get_config_path();

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn get_config_path() -> PathBuf {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vgit")
            .join("config.json")
    }

    pub fn merge_with_args(&self, args: &Args) -> Self {
        Self {
            debug: if args.debug { Some(true) } else { self.debug },
            show_ignored: if args.show_ignored {
                Some(true)
            } else {
                self.show_ignored
            },
            logfile: args.logfile.clone().or_else(|| self.logfile.clone()),
            git_binary: args.git.clone().or_else(|| self.git_binary.clone()),
        }
    }

    /// Settings handed to each status view.
    pub fn view_config(&self) -> ViewConfig {
        ViewConfig {
            show_ignored: self.show_ignored.unwrap_or(false),
            logfile: self.logfile.clone(),
            git_binary: self
                .git_binary
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GIT_BINARY)),
        }
    }
}

/// Resolved per-view settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewConfig {
    /// List ignored entries instead of hiding them
    pub show_ignored: bool,
    pub logfile: Option<PathBuf>,
    pub git_binary: PathBuf,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            show_ignored: false,
            logfile: None,
            git_binary: PathBuf::from(DEFAULT_GIT_BINARY),
        }
    }
}

#[derive(Debug, Clone, clap::Parser)]
pub struct Args {
    #[arg(help = "Worktree to show (default: current directory)")]
    pub path: Option<PathBuf>,

    #[arg(short, long, help = "Print version information and exit")]
    pub version: bool,

    #[arg(short, long, help = "Enable debug logging")]
    pub debug: bool,

    #[arg(long, help = "List ignored files too")]
    pub show_ignored: bool,

    #[arg(long, help = "Append every git command line to this file")]
    pub logfile: Option<PathBuf>,

    #[arg(long, help = "Git binary to run (default: git)")]
    pub git: Option<PathBuf>,

    #[arg(long, help = "Print the git commands issued this session")]
    pub show_log: bool,
}
