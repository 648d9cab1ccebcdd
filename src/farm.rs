//! # Farm building
//!
//! Ties the stages together: configuration validation, link directory
//! maintenance, scanning, album grouping, naming and link creation. The
//! pipeline stays lazy from scanning through link creation except for album
//! grouping, which has to see every song of an album before the album can
//! be named.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use path_absolutize::Absolutize;

use crate::album::group_by_album;
use crate::config::Config;
use crate::linker::{in_directory, make_links, process_linkdir, LinkStats};
use crate::naming::LinkNamer;
use crate::scan::Scanner;

/// Build or refresh the symlink farm at `link_dir` from `music_dirs`.
pub fn make_symfarm(config: &Config, link_dir: &Path, music_dirs: &[PathBuf]) -> Result<LinkStats> {
    config.validate().context("invalid configuration")?;
    let overrides = config.compile_overrides()?;
    let valid_files = config.compile_valid_files()?;
    let namer = LinkNamer::new(&config.structure, &config.tagmap, &config.fallbacks)?;

    let link_dir = link_dir.absolutize()?.into_owned();
    let music_dirs = prepare_music_dirs(music_dirs)?;
    if music_dirs
        .iter()
        .any(|dir| *dir == link_dir || in_directory(dir, &link_dir))
    {
        bail!(
            "Link directory '{}' must not be a subdirectory of any music dirs",
            link_dir.display()
        );
    }

    let existing = process_linkdir(
        &link_dir,
        &music_dirs,
        !config.options.rescan_existing,
        config.options.clean,
        config.options.relative_links,
    );

    let songs = music_dirs.iter().flat_map(|dir| {
        Scanner::new(
            dir,
            &valid_files,
            &overrides,
            &config.tagmap,
            &config.fallbacks,
            existing.as_ref(),
        )
    });
    let albums = group_by_album(songs, &config.tagmap);
    let stats = make_links(
        &link_dir,
        namer.links(albums),
        config.options.relative_links,
    )?;

    log::info!("Done!");
    Ok(stats)
}

/// Absolutize the music directories, dropping duplicates, directories that
/// do not exist, and directories nested inside another one on the list.
fn prepare_music_dirs(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut absolute: Vec<PathBuf> = Vec::new();
    for dir in dirs {
        let dir = dir.absolutize()?.into_owned();
        if !dir.exists() {
            warn!("Music directory '{}' does not exist, skipping", dir.display());
            continue;
        }
        if !absolute.contains(&dir) {
            absolute.push(dir);
        }
    }

    let mut kept: Vec<PathBuf> = Vec::new();
    for dir in &absolute {
        if let Some(parent) = absolute.iter().find(|other| in_directory(other, dir)) {
            debug!(
                "Removing directory '{}' (will be scanned as part of '{}')",
                dir.display(),
                parent.display()
            );
            continue;
        }
        kept.push(dir.clone());
    }
    Ok(kept)
}
