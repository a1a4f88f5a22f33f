// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `buildcast`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "buildcast",
    version,
    about = "Run isolated build jobs, stream their logs live and publish the artifacts.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// A missing file is fine: the built-in defaults (`npm ci`, `npm run build`,
    /// upload `dist`) are used instead.
    #[arg(long, global = true, value_name = "PATH", default_value = "Buildcast.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BUILDCAST_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build a source tree, stream its logs and upload the output directory.
    Deploy {
        /// Local directory or git repository URL to build.
        #[arg(long, value_name = "DIR|URL")]
        source: String,

        /// Reuse an existing slug instead of generating a new one.
        #[arg(long, value_name = "SLUG")]
        slug: Option<String>,

        /// Print the planned job, but don't execute any commands.
        #[arg(long)]
        dry_run: bool,
    },

    /// Attach to a running deploy and print its log lines.
    Watch {
        /// Slug of the build to observe.
        #[arg(long, value_name = "SLUG")]
        slug: String,

        /// Observer listener address; defaults to `[relay].listen`.
        #[arg(long, value_name = "ADDR")]
        addr: Option<String>,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
