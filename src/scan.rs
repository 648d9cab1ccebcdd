//! # Music scanning
//!
//! Walks a music directory and lazily yields one [`TagSet`] per audio file.
//! Only file names that fully match a `valid_files` pattern are considered,
//! already-linked files are skipped when an existing-link set is supplied,
//! and every configured override is applied before a song is yielded.
//!
//! Tag reading goes through `lofty`, which parses metadata blocks without
//! decoding any audio. The primary tag block wins; remaining blocks only
//! fill in keys the primary block is missing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use lofty::{ItemKey, Probe, TaggedFileExt};
use log::{debug, info, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::overrides::Override;
use crate::tags::{Fallbacks, TagMap, TagSet, TagValue};

/// Lazy iterator over the songs found under one music directory.
pub struct Scanner<'a> {
    music_dir: PathBuf,
    walker: walkdir::IntoIter,
    valid_files: &'a [Regex],
    overrides: &'a [Override],
    tagmap: &'a TagMap,
    fallbacks: &'a Fallbacks,
    existing: Option<&'a HashSet<PathBuf>>,
    scraped: usize,
    linked: usize,
    ignored: usize,
    failed: usize,
    done: bool,
}

impl<'a> Scanner<'a> {
    /// Start scanning `music_dir` (which may itself be a single file).
    pub fn new(
        music_dir: &Path,
        valid_files: &'a [Regex],
        overrides: &'a [Override],
        tagmap: &'a TagMap,
        fallbacks: &'a Fallbacks,
        existing: Option<&'a HashSet<PathBuf>>,
    ) -> Scanner<'a> {
        info!("Scanning music files in '{}'", music_dir.display());
        Scanner {
            music_dir: music_dir.to_path_buf(),
            // Sorted so album grouping sees songs in a stable order between
            // runs regardless of filesystem enumeration order.
            walker: WalkDir::new(music_dir).sort_by_file_name().into_iter(),
            valid_files,
            overrides,
            tagmap,
            fallbacks,
            existing,
            scraped: 0,
            linked: 0,
            ignored: 0,
            failed: 0,
            done: false,
        }
    }

    fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        info!(
            "Found {} new songs ({} total files, {} already linked, {} non-music files ignored, {} failed)",
            self.scraped,
            self.scraped + self.linked + self.ignored + self.failed,
            self.linked,
            self.ignored,
            self.failed
        );
    }
}

impl Iterator for Scanner<'_> {
    type Item = TagSet;

    fn next(&mut self) -> Option<TagSet> {
        loop {
            let Some(entry) = self.walker.next() else {
                self.finish();
                return None;
            };
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read directory entry: {e}");
                    self.failed += 1;
                    continue;
                }
            };
            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            // Symlinks to directories are listed but never descended into.
            if file_type.is_symlink() && entry.path().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.valid_files.iter().any(|re| re.is_match(&name)) {
                self.ignored += 1;
                continue;
            }

            let path = entry.path();
            if let Some(existing) = self.existing {
                if existing.contains(path) {
                    self.linked += 1;
                    continue;
                }
            }

            let mut tags = match scrape_tags(path) {
                Ok(tags) => tags,
                Err(e) => {
                    warn!("Failed to parse tags from file: '{}': {e}", path.display());
                    self.failed += 1;
                    continue;
                }
            };
            add_synthetic_tags(&mut tags, path, &self.music_dir, &name);
            debug!("Scraped tags from file: '{}':\n{:?}", path.display(), tags);
            self.scraped += 1;

            for o in self.overrides {
                o.apply(&mut tags, self.tagmap, self.fallbacks);
            }

            return Some(tags);
        }
    }
}

/// Read all textual tag items from `path`, first bank wins per key.
/// Values are whitespace-trimmed; values left empty stay in the set as
/// explicit none entries.
fn scrape_tags(path: &Path) -> anyhow::Result<TagSet> {
    let tagged = Probe::open(path)?.read()?;
    let mut tags = TagSet::new();
    for tag in tagged.primary_tag().into_iter().chain(tagged.tags().iter()) {
        for item in tag.items() {
            let Some(name) = canonical_tag_name(item.key()) else {
                continue;
            };
            let Some(text) = item.value().text() else {
                continue;
            };
            let trimmed = text.trim();
            let value = if trimmed.is_empty() {
                TagValue::None
            } else {
                TagValue::Text(trimmed.to_string())
            };
            tags.entry(name).or_insert(value);
        }
    }
    Ok(tags)
}

/// Map a lofty item key onto the uppercase tag names used by templates and
/// overrides. Keys with no common vorbis-style name are dropped.
fn canonical_tag_name(key: &ItemKey) -> Option<String> {
    let name = match key {
        ItemKey::TrackTitle => "TITLE",
        ItemKey::TrackArtist => "ARTIST",
        ItemKey::AlbumTitle => "ALBUM",
        ItemKey::AlbumArtist => "ALBUMARTIST",
        ItemKey::RecordingDate => "DATE",
        ItemKey::Year => "YEAR",
        ItemKey::OriginalReleaseDate => "ORIGINALDATE",
        ItemKey::TrackNumber => "TRACKNUMBER",
        ItemKey::TrackTotal => "TRACKTOTAL",
        ItemKey::DiscNumber => "DISCNUMBER",
        ItemKey::DiscTotal => "DISCTOTAL",
        ItemKey::Genre => "GENRE",
        ItemKey::Composer => "COMPOSER",
        ItemKey::Comment => "COMMENT",
        ItemKey::FlagCompilation => "COMPILATION",
        ItemKey::Unknown(name) => return Some(name.to_uppercase()),
        _ => return None,
    };
    Some(name.to_string())
}

/// Inject the path-derived tags every song carries: `abspath`, `path`
/// (relative to the scanned directory, file name included), `filename`
/// (base name with extension) and `ext`.
fn add_synthetic_tags(tags: &mut TagSet, path: &Path, music_dir: &Path, name: &str) {
    // When the music dir is the file itself the relative path degenerates
    // to nothing; fall back to the base name.
    let relative = path
        .strip_prefix(music_dir)
        .ok()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());

    // "song.flac" -> "flac"; files without a dot get no extension at all.
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => TagValue::Text(ext.to_string()),
        None => TagValue::None,
    };

    tags.insert(
        "abspath".to_string(),
        TagValue::Text(path.to_string_lossy().into_owned()),
    );
    tags.insert("path".to_string(), TagValue::Text(relative));
    tags.insert("ext".to_string(), ext);
    tags.insert("filename".to_string(), TagValue::Text(name.to_string()));
}
