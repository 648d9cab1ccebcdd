//! Create a directory of symlinks based solely on music tags.
//!
//! A music collection on disk is often organized by how the files arrived
//! (rips, purchases, downloads) rather than how you want to browse it.
//! symfarm scans one or more music directories, reads the audio tags, and
//! builds a farm of symlinks whose names are rendered entirely from those
//! tags. The source files are never modified or moved.
//!
//! Core modules:
//! - [`template`] - The path template engine (fields, format specs, inline
//!   regex substitution and match expansion)
//! - [`tags`] - Tag values, alias maps and fallback resolution
//! - [`overrides`] - Declarative rule/operation tag rewriting
//! - [`album`] - Album grouping
//! - [`naming`] - Album naming policy and link name generation
//!
//! ### Supporting Modules
//!
//! - [`scan`] - Music directory walking and tag scraping
//! - [`linker`] - Link directory maintenance and symlink creation
//! - [`farm`] - End-to-end pipeline orchestration
//! - [`config`] - Configuration defaults, file loading and merging
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use symfarm::{config, farm};
//!
//! let config = config::load(None)?;
//! let stats = farm::make_symfarm(
//!     &config,
//!     &PathBuf::from("/srv/links"),
//!     &[PathBuf::from("/srv/music")],
//! )?;
//! println!("created {} links", stats.created);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Templates
//!
//! Link names come from templates like
//! `{ALBUMARTIST}/{ALBUM} ({DATE:.4})/{TRACKNUMBER:0>2} - {TITLE}.{ext}`.
//! A field resolves through the tag alias map and the configured fallbacks,
//! then applies an optional format spec (fill/align/width/precision) or an
//! inline regex substitution (`{NAME:/PATTERN/REPLACEMENT/}`):
//!
//! ```
//! use symfarm::tags::{TagMap, TagSet, TagValue};
//! use symfarm::template;
//!
//! let mut tags = TagSet::new();
//! tags.insert("TRACKNUMBER".to_string(), TagValue::from("3/12"));
//! tags.insert("TITLE".to_string(), TagValue::from("S.O.S."));
//!
//! let name = template::render(
//!     "{TRACKNUMBER:0>2} - {TITLE}",
//!     &tags,
//!     &TagMap::new(),
//!     None,
//! )?;
//! assert_eq!(name, "03 - S.O.S.");
//! # Ok::<(), symfarm::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Template, tag and configuration failures are the structured
//! [`Error`](crate::error::Error) type; orchestration and the binary wrap
//! everything in `anyhow` for context-rich reporting. During a run,
//! per-song problems (unreadable files, failed override operations) are
//! logged and counted rather than aborting the whole farm; configuration
//! mistakes and naming failures abort.
//!
//! ## Testing
//!
//! Run tests with:
//! ```bash
//! cargo test
//! ```

pub mod album;
pub mod cli;
pub mod completion;
pub mod config;
pub mod error;
pub mod farm;
pub mod linker;
pub mod naming;
pub mod overrides;
pub mod scan;
pub mod tags;
pub mod template;

pub use error::{Error, Result};
