//! This module defines the command line arguments Quill accepts.

use std::{io::IsTerminal, path::PathBuf};
use termcolor::ColorChoice;

use crate::{cmd, db::cmd::DbCommand};


#[derive(Debug, clap::Parser)]
#[clap(about = "Backend of the Quill blog platform.")]
pub(crate) struct Args {
    #[clap(subcommand)]
    pub(crate) cmd: Command,

    /// Whether to use colors when printing to the terminal.
    #[clap(long, global = true, value_enum, default_value_t = ColorOption::Auto)]
    pub(crate) color: ColorOption,
}

#[derive(Debug, clap::Subcommand)]
pub(crate) enum Command {
    /// Starts the backend HTTP server.
    Serve {
        #[clap(flatten)]
        shared: Shared,
    },

    /// Database operations.
    Db {
        #[clap(subcommand)]
        cmd: DbCommand,

        #[clap(flatten)]
        shared: Shared,
    },

    /// Checks config and DB connection to find problems in Quill's
    /// environment.
    ///
    /// Useful for updates as you can catch many errors early, without
    /// needing to restart the running Quill process. Exits with 0 if
    /// everything is Ok, and with 1 otherwise.
    Check {
        #[clap(flatten)]
        shared: Shared,
    },

    /// Outputs a template for the configuration file (which includes
    /// descriptions of all options).
    WriteConfig {
        /// Target file. If not specified, the template is written to stdout.
        target: Option<PathBuf>,
    },

    /// Exports the API as GraphQL schema.
    ExportApiSchema {
        #[clap(flatten)]
        args: cmd::export_api_schema::Args,
    },
}

#[derive(Debug, clap::Args)]
pub(crate) struct Shared {
    /// Path to the configuration file. If this is not specified, Quill will
    /// try opening `config.toml` or `/etc/quill/config.toml`.
    #[clap(short, long)]
    pub(crate) config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ColorOption {
    Auto,
    Always,
    Never,
}

impl Args {
    pub(crate) fn stdout_color(&self) -> ColorChoice {
        self.color.to_color_choice(std::io::stdout().is_terminal())
    }

    pub(crate) fn stderr_color(&self) -> ColorChoice {
        self.color.to_color_choice(std::io::stderr().is_terminal())
    }
}

impl ColorOption {
    /// Resolves the `auto` case: we never color output that does not go to a
    /// terminal.
    fn to_color_choice(self, is_terminal: bool) -> ColorChoice {
        match self {
            Self::Always => ColorChoice::Always,
            Self::Never => ColorChoice::Never,
            Self::Auto if is_terminal => ColorChoice::Auto,
            Self::Auto => ColorChoice::Never,
        }
    }
}
