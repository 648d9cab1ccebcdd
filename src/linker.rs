//! # Link farming
//!
//! Owns every filesystem write the program makes: clearing out stale state
//! from the link directory ([`process_linkdir`]) and materializing planned
//! links ([`make_links`]). Containment checks are purely lexical; targets
//! are never resolved through symlinks, otherwise a link farm pointing into
//! another link farm could walk out of bounds.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use path_absolutize::Absolutize;
use walkdir::WalkDir;

use crate::naming::Link;

/// Outcome counters for one [`make_links`] run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub created: usize,
    pub updated: usize,
    pub existed: usize,
    pub ignored: usize,
    pub failed: usize,
}

/// The absolute target of a symlink and whether the stored target was
/// written as a relative path.
fn symlink_info(link_path: &Path) -> io::Result<(PathBuf, bool)> {
    let raw = fs::read_link(link_path)?;
    let was_relative = raw.is_relative();
    let parent = link_path.parent().unwrap_or_else(|| Path::new("/"));
    let absolute = parent.join(&raw).absolutize()?.into_owned();
    Ok((absolute, was_relative))
}

/// Lexical check that `path` lives strictly inside `directory`.
pub(crate) fn in_directory(directory: &Path, path: &Path) -> bool {
    match path.absolutize() {
        Ok(p) => p.as_ref() != directory && p.starts_with(directory),
        Err(_) => false,
    }
}

/// Walk the link directory bottom-up before scanning starts.
///
/// With `clean` set, broken symlinks are removed and directories that end
/// up empty are deleted on the way back out. With `collect_existing` set,
/// returns the set of absolute source paths already linked from here (only
/// counting links of the configured relative/absolute style that point
/// inside one of the music directories); those files can then be skipped
/// during scanning.
pub fn process_linkdir(
    link_dir: &Path,
    music_dirs: &[PathBuf],
    collect_existing: bool,
    clean: bool,
    relative_links: bool,
) -> Option<HashSet<PathBuf>> {
    if !collect_existing && !clean {
        return None;
    }

    info!("Processing existing symlinks in '{}'", link_dir.display());
    let mut exist = HashSet::new();
    let mut broken = 0usize;
    let mut empty = 0usize;

    for entry in WalkDir::new(link_dir).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Failed to read link directory entry: {e}");
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            // Bottom-up walk: children were already handled, so this only
            // succeeds once a directory has actually become empty.
            if clean && fs::remove_dir(path).is_ok() {
                empty += 1;
                debug!("Deleted empty directory: {}", path.display());
            }
            continue;
        }
        if !entry.file_type().is_symlink() {
            continue;
        }

        let Ok((target, was_relative)) = symlink_info(path) else {
            continue;
        };
        if !target.exists() {
            if clean && fs::remove_file(path).is_ok() {
                broken += 1;
                debug!("Deleted broken symlink: {}", path.display());
            }
        } else if collect_existing
            && was_relative == relative_links
            && music_dirs.iter().any(|dir| in_directory(dir, &target))
        {
            exist.insert(target);
        }
    }

    if clean {
        info!("Deleted {broken} broken symlinks and {empty} empty directories");
    }
    if collect_existing {
        info!("Found {} existing valid symlinks", exist.len());
        return Some(exist);
    }
    None
}

/// Materialize planned links under `link_dir`.
///
/// Skip descriptors count as ignored. A planned destination that escapes
/// the link directory, or any filesystem error while placing one link,
/// is logged and tallied as failed without stopping the run. An error
/// from the link planner itself is fatal.
pub fn make_links(
    link_dir: &Path,
    links: impl IntoIterator<Item = crate::error::Result<Link>>,
    relative_links: bool,
) -> Result<LinkStats> {
    let mut stats = LinkStats::default();

    for link in links {
        let link = link.context("failed to generate a link name")?;
        let Some(dest) = link.dest else {
            stats.ignored += 1;
            continue;
        };
        debug!("{} ---> {}", dest.display(), link.source.display());

        let link_path = link_dir.join(&dest);
        if !in_directory(link_dir, &link_path) {
            warn!(
                "Failed to symlink '{}' --> '{}': outside the link directory",
                link_path.display(),
                link.source.display()
            );
            stats.failed += 1;
            continue;
        }

        match place_link(&link_path, &link.source, relative_links) {
            Ok(Placement::Created) => stats.created += 1,
            Ok(Placement::Updated) => stats.updated += 1,
            Ok(Placement::Existed) => stats.existed += 1,
            Err(e) => {
                warn!(
                    "Failed to symlink '{}' --> '{}': {e}",
                    link_path.display(),
                    link.source.display()
                );
                stats.failed += 1;
            }
        }
    }

    info!(
        "Created {} new symlinks ({} updated, {} preexisting, {} ignored, {} failed)",
        stats.created, stats.updated, stats.existed, stats.ignored, stats.failed
    );
    Ok(stats)
}

enum Placement {
    Created,
    Updated,
    Existed,
}

fn place_link(link_path: &Path, source: &Path, relative: bool) -> io::Result<Placement> {
    if let Some(parent) = link_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut update = false;
    if fs::symlink_metadata(link_path).is_ok() {
        if let Ok((target, was_relative)) = symlink_info(link_path) {
            if target == source && was_relative == relative {
                return Ok(Placement::Existed);
            }
        }
        // Wrong target, wrong style, or not a symlink at all.
        fs::remove_file(link_path)?;
        update = true;
    }

    let target = if relative {
        relative_to(source, link_path.parent().unwrap_or_else(|| Path::new("/")))
    } else {
        source.to_path_buf()
    };
    create_symlink(&target, link_path)?;

    Ok(if update {
        Placement::Updated
    } else {
        Placement::Created
    })
}

/// Lexical relative path from `base` to `path`; both must be absolute.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path_components: Vec<Component> = path.components().collect();
    let base_components: Vec<Component> = base.components().collect();
    let common = path_components
        .iter()
        .zip(&base_components)
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..base_components.len() {
        result.push("..");
    }
    for component in &path_components[common..] {
        result.push(component);
    }
    result
}

#[cfg(unix)]
fn create_symlink(target: &Path, link_path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link_path)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link_path: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(dest: &str, source: &Path) -> crate::error::Result<Link> {
        Ok(Link {
            dest: Some(PathBuf::from(dest)),
            source: source.to_path_buf(),
        })
    }

    #[test]
    fn test_relative_paths_between_directories() {
        assert_eq!(
            relative_to(Path::new("/music/a/song.flac"), Path::new("/links/b")),
            Path::new("../../music/a/song.flac")
        );
        assert_eq!(
            relative_to(Path::new("/top/a/x"), Path::new("/top/a")),
            Path::new("x")
        );
        assert_eq!(
            relative_to(Path::new("/top/a"), Path::new("/top/b/c")),
            Path::new("../../a")
        );
    }

    #[test]
    fn test_directory_containment_is_lexical_and_strict() {
        let dir = Path::new("/links");
        assert!(in_directory(dir, Path::new("/links/a/b")));
        assert!(!in_directory(dir, Path::new("/links")));
        assert!(!in_directory(dir, Path::new("/music/a")));
        assert!(!in_directory(dir, Path::new("/links/../music")));
        assert!(!in_directory(dir, Path::new("/links/a/../../etc/passwd")));
    }

    #[test]
    fn test_links_are_created_updated_and_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let music = tmp.path().join("music");
        let links = tmp.path().join("links");
        fs::create_dir_all(&music).unwrap();
        let song_a = music.join("a.flac");
        let song_b = music.join("b.flac");
        fs::write(&song_a, b"a").unwrap();
        fs::write(&song_b, b"b").unwrap();

        let stats = make_links(&links, vec![link("X/one.flac", &song_a)], false).unwrap();
        assert_eq!(stats.created, 1);
        assert_eq!(fs::read_link(links.join("X/one.flac")).unwrap(), song_a);

        // Same plan again: nothing to do.
        let stats = make_links(&links, vec![link("X/one.flac", &song_a)], false).unwrap();
        assert_eq!(stats.existed, 1);
        assert_eq!(stats.created, 0);

        // Same destination, different source: replaced in place.
        let stats = make_links(&links, vec![link("X/one.flac", &song_b)], false).unwrap();
        assert_eq!(stats.updated, 1);
        assert_eq!(fs::read_link(links.join("X/one.flac")).unwrap(), song_b);
    }

    #[test]
    fn test_skip_descriptors_are_counted_not_written() {
        let tmp = tempfile::tempdir().unwrap();
        let links = tmp.path().join("links");
        let stats = make_links(
            &links,
            vec![Ok(Link {
                dest: None,
                source: PathBuf::from("/music/x.flac"),
            })],
            false,
        )
        .unwrap();
        assert_eq!(stats.ignored, 1);
        assert!(!links.exists());
    }

    #[test]
    fn test_escaping_destinations_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let links = tmp.path().join("links");
        fs::create_dir_all(&links).unwrap();
        let song = tmp.path().join("a.flac");
        fs::write(&song, b"a").unwrap();

        let stats = make_links(&links, vec![link("../escape.flac", &song)], false).unwrap();
        assert_eq!(stats.failed, 1);
        assert!(!tmp.path().join("escape.flac").exists());
    }

    #[test]
    fn test_relative_mode_writes_relative_targets() {
        let tmp = tempfile::tempdir().unwrap();
        let music = tmp.path().join("music");
        let links = tmp.path().join("links");
        fs::create_dir_all(&music).unwrap();
        let song = music.join("a.flac");
        fs::write(&song, b"a").unwrap();

        let stats = make_links(&links, vec![link("X/one.flac", &song)], true).unwrap();
        assert_eq!(stats.created, 1);
        let stored = fs::read_link(links.join("X/one.flac")).unwrap();
        assert!(stored.is_relative());
        assert_eq!(stored, Path::new("../../music/a.flac"));

        // Style change forces a rewrite even though the target is the same.
        let stats = make_links(&links, vec![link("X/one.flac", &song)], false).unwrap();
        assert_eq!(stats.updated, 1);
        assert_eq!(fs::read_link(links.join("X/one.flac")).unwrap(), song);
    }

    #[test]
    fn test_processing_cleans_broken_links_and_empty_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let music = tmp.path().join("music");
        let links = tmp.path().join("links");
        fs::create_dir_all(&music).unwrap();
        fs::create_dir_all(links.join("empty/nested")).unwrap();
        fs::create_dir_all(links.join("ok")).unwrap();

        let song = music.join("a.flac");
        fs::write(&song, b"a").unwrap();
        create_symlink(&song, &links.join("ok/good.flac")).unwrap();
        create_symlink(&music.join("gone.flac"), &links.join("ok/broken.flac")).unwrap();

        let music_dirs = vec![music.clone()];
        let existing = process_linkdir(&links, &music_dirs, true, true, false).unwrap();

        assert_eq!(existing.len(), 1);
        assert!(existing.contains(&song));
        assert!(!links.join("ok/broken.flac").exists());
        assert!(!links.join("empty").exists(), "empty tree is removed");
        assert!(links.join("ok/good.flac").exists());
    }

    #[test]
    fn test_processing_without_cleaning_keeps_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let music = tmp.path().join("music");
        let links = tmp.path().join("links");
        fs::create_dir_all(&music).unwrap();
        fs::create_dir_all(links.join("empty")).unwrap();
        create_symlink(&music.join("gone.flac"), &links.join("broken.flac")).unwrap();

        let music_dirs = vec![music.clone()];
        let existing = process_linkdir(&links, &music_dirs, true, false, false).unwrap();

        assert!(existing.is_empty());
        assert!(links.join("empty").exists());
        assert!(links.join("broken.flac").symlink_metadata().is_ok());
    }

    #[test]
    fn test_link_style_mismatches_are_not_collected() {
        let tmp = tempfile::tempdir().unwrap();
        let music = tmp.path().join("music");
        let links = tmp.path().join("links");
        fs::create_dir_all(&music).unwrap();
        fs::create_dir_all(&links).unwrap();
        let song = music.join("a.flac");
        fs::write(&song, b"a").unwrap();
        // Absolute link, but the run wants relative ones.
        create_symlink(&song, &links.join("a.flac")).unwrap();

        let music_dirs = vec![music.clone()];
        let existing = process_linkdir(&links, &music_dirs, true, false, true).unwrap();
        assert!(existing.is_empty());
    }

    #[test]
    fn test_disabled_processing_returns_nothing() {
        assert!(process_linkdir(Path::new("/nonexistent"), &[], false, false, false).is_none());
    }
}
