//! # Command-line interface
//!
//! Clap derive definitions for the `symfarm` binary. All the real work
//! lives behind the `link` subcommand; `completion` emits shell completion
//! scripts.
//!
//! The boolean options come in `--flag` / `--no-flag` pairs so the command
//! line can override the configuration file in either direction. When
//! neither flag of a pair is given, the config file (or built-in default)
//! wins.
//!
//! ## Examples
//!
//! ```bash
//! symfarm link ~/by-tags ~/music
//! symfarm link --relative-links --no-clean /srv/links /srv/music /mnt/usb
//! symfarm completion fish > ~/.config/fish/completions/symfarm.fish
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser)]
#[command(name = "symfarm")]
#[command(about = "Create a directory of symlinks based solely on music tags")]
#[command(version)]
pub struct Args {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Build or refresh a symlink farm from one or more music directories
    ///
    /// Scans the music directories for audio files, groups them into albums
    /// by their tags and creates one symlink per song under the link
    /// directory, named entirely from the tags. The music directories are
    /// never written to.
    Link {
        /// Directory where the symlinks will be created
        link_dir: PathBuf,

        /// Music source directories (each may also be a single file)
        #[arg(required = true)]
        music_dirs: Vec<PathBuf>,

        /// A config file to override default settings
        #[arg(short, long, env = "SYMFARM_CONF")]
        conf: Option<PathBuf>,

        /// Clean the link directory of broken links and empty directories
        #[arg(long, overrides_with = "no_clean")]
        clean: bool,
        /// Keep broken links and empty directories
        #[arg(long, overrides_with = "clean")]
        no_clean: bool,

        /// Rescan files that already have links pointing to them
        #[arg(long, overrides_with = "no_rescan_existing")]
        rescan_existing: bool,
        /// Skip files that already have links pointing to them
        #[arg(long, overrides_with = "rescan_existing")]
        no_rescan_existing: bool,

        /// Use relative paths for links instead of absolute
        #[arg(long, overrides_with = "no_relative_links")]
        relative_links: bool,
        /// Use absolute paths for links
        #[arg(long, overrides_with = "relative_links")]
        no_relative_links: bool,
    },

    /// Generate shell completions
    ///
    /// Usage: symfarm completion bash > ~/.local/share/bash-completion/completions/symfarm
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}
