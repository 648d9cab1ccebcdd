//! # symfarm - music symlink farm builder
//!
//! Scans music directories and builds a browsable tree of symlinks whose
//! names come entirely from the audio tags. The heavy lifting lives in the
//! library crate; this binary parses arguments, loads configuration and
//! kicks off the run.
//!
//! ## Usage
//!
//! ```bash
//! # Build the farm with the default layout
//! symfarm link ~/by-tags ~/music
//!
//! # Several sources, relative links, custom configuration
//! symfarm link --relative-links --conf farm.json /srv/links /srv/music /mnt/usb
//!
//! # Shell completions
//! symfarm completion bash > ~/.local/share/bash-completion/completions/symfarm
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser};
use env_logger::Env;
use log::debug;

use symfarm::{cli, completion, config, farm};

/// Resolve a `--flag` / `--no-flag` pair into an optional override.
fn flag(yes: bool, no: bool) -> Option<bool> {
    if yes {
        Some(true)
    } else if no {
        Some(false)
    } else {
        None
    }
}

/// Main entry point.
///
/// Initializes logging, parses command-line arguments, merges CLI options
/// over the loaded configuration and runs the requested command. Logging
/// defaults to info so the run summaries are visible; `RUST_LOG` overrides
/// it as usual:
/// - `RUST_LOG=debug symfarm link ...` - show per-file decisions
/// - `RUST_LOG=symfarm::scan=debug symfarm link ...` - module-specific
fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Link {
            link_dir,
            music_dirs,
            conf,
            clean,
            no_clean,
            rescan_existing,
            no_rescan_existing,
            relative_links,
            no_relative_links,
        } => {
            let mut config = config::load(conf.as_deref())?;
            if let Some(clean) = flag(clean, no_clean) {
                config.options.clean = clean;
            }
            if let Some(rescan) = flag(rescan_existing, no_rescan_existing) {
                config.options.rescan_existing = rescan;
            }
            if let Some(relative) = flag(relative_links, no_relative_links) {
                config.options.relative_links = relative;
            }
            debug!("effective options: {:?}", config.options);

            farm::make_symfarm(&config, &link_dir, &music_dirs)?;
        }
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(
                completion::shell_to_completion_shell(&shell),
                &mut cmd,
            );
        }
    }

    Ok(())
}
