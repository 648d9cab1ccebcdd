//! # Link naming
//!
//! Turns grouped albums into planned symlinks. The naming policy is decided
//! per album from the untouched member tags, then each member's tags are
//! normalized to the first song's album identity and rendered through the
//! chosen templates.

use std::collections::HashMap;
use std::path::PathBuf;

use log::debug;

use crate::album::ALBUM_TAGS;
use crate::config::Structure;
use crate::error::{Error, Result};
use crate::tags::{all_same, resolve_consistent, resolve_plain, Fallbacks, TagMap, TagSet, TagValue};
use crate::template::{render, split_components, Template};

/// A planned symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Destination relative to the link directory; none means the song was
    /// deliberately skipped (a truthy `ignore` tag).
    pub dest: Option<PathBuf>,
    /// Absolute path of the music file the link will point at.
    pub source: PathBuf,
}

/// Character rewriting applied to every rendered path component.
#[derive(Debug, Clone, Default)]
pub struct CharMap {
    map: HashMap<char, Option<char>>,
}

impl CharMap {
    /// Build from the structure's paired find/replace strings plus the strip
    /// set. Unequal pair halves are a configuration error. A character in
    /// both tables is stripped.
    pub fn new(replace: &(String, String), strip: &str) -> Result<Self> {
        let find: Vec<char> = replace.0.chars().collect();
        let with: Vec<char> = replace.1.chars().collect();
        if find.len() != with.len() {
            return Err(Error::Config(format!(
                "character_replace halves differ in length ({} vs {})",
                find.len(),
                with.len()
            )));
        }
        let mut map = HashMap::new();
        for (f, w) in find.into_iter().zip(with) {
            map.insert(f, Some(w));
        }
        for c in strip.chars() {
            map.insert(c, None);
        }
        Ok(CharMap { map })
    }

    pub fn apply(&self, text: &str) -> String {
        text.chars()
            .filter_map(|c| match self.map.get(&c) {
                Some(Some(replacement)) => Some(*replacement),
                Some(None) => None,
                None => Some(c),
            })
            .collect()
    }
}

/// Naming decisions shared by every song of one album.
#[derive(Debug, Clone)]
struct AlbumPlan {
    /// First-song album identity (explicit nones included) written over
    /// every member before rendering.
    overwrite: Vec<(String, TagValue)>,
    path_template: String,
    file_template: String,
}

/// Renders albums into [`Link`]s.
pub struct LinkNamer<'a> {
    structure: &'a Structure,
    tagmap: &'a TagMap,
    fallbacks: &'a Fallbacks,
    charmap: CharMap,
}

impl<'a> LinkNamer<'a> {
    pub fn new(
        structure: &'a Structure,
        tagmap: &'a TagMap,
        fallbacks: &'a Fallbacks,
    ) -> Result<Self> {
        let charmap = CharMap::new(&structure.character_replace, &structure.character_strip)?;
        Ok(LinkNamer {
            structure,
            tagmap,
            fallbacks,
            charmap,
        })
    }

    /// Lazily name every song of every album, in order.
    pub fn links(&self, albums: Vec<Vec<TagSet>>) -> Links<'_, 'a> {
        Links {
            namer: self,
            albums: albums.into_iter(),
            plan: None,
            songs: Vec::new().into_iter(),
        }
    }

    /// Decide the album-wide naming policy from the untouched member tags.
    fn plan(&self, first: &TagSet, album: &[TagSet]) -> AlbumPlan {
        let albumartist = resolve_plain("ALBUMARTIST", first, self.tagmap);
        let album_title = resolve_plain("ALBUM", first, self.tagmap);
        let date = resolve_plain("DATE", first, self.tagmap);

        // An album of songs by different artists names files after each
        // song's own artist.
        let multiartist = !all_same(album.iter().map(|song| {
            resolve_plain("ARTIST", song, self.tagmap)
                .map(|v| v.to_string().to_lowercase())
                .unwrap_or_default()
        }));

        // Single-artist albums are never compilations. A multi-artist album
        // with an album artist is an anthology, and one without an album
        // title is just missing tags; only the rest read as compilations.
        // An explicit, consistent is_compilation tag beats the heuristic
        // either way.
        let (mut file_template, mut path_template) = if multiartist {
            let path = if albumartist.is_some() || album_title.is_none() {
                self.structure.path.clone()
            } else {
                self.structure.path_compilation.clone()
            };
            (self.structure.file_multiartist.clone(), path)
        } else {
            (self.structure.file.clone(), self.structure.path.clone())
        };
        if let Some(flag) = resolve_consistent("is_compilation", album, self.tagmap) {
            path_template = if flag.is_truthy() {
                self.structure.path_compilation.clone()
            } else {
                self.structure.path.clone()
            };
        }

        let multidisc = !all_same(
            album
                .iter()
                .map(|song| resolve_plain("DISCNUMBER", song, self.tagmap)),
        );
        if multidisc {
            file_template = format!("{}{}", self.structure.file_disc_prefix, file_template);
        }

        let overwrite = vec![
            (
                ALBUM_TAGS[0].to_string(),
                albumartist.unwrap_or(TagValue::None),
            ),
            (
                ALBUM_TAGS[1].to_string(),
                album_title.unwrap_or(TagValue::None),
            ),
            (ALBUM_TAGS[2].to_string(), date.unwrap_or(TagValue::None)),
        ];
        AlbumPlan {
            overwrite,
            path_template,
            file_template,
        }
    }

    /// Name a single song.
    fn emit(&self, mut song: TagSet, plan: &AlbumPlan) -> Result<Link> {
        let source = match song.get("abspath").and_then(TagValue::as_text) {
            Some(path) => PathBuf::from(path),
            None => return Err(Error::missing_key("abspath")),
        };

        if song.get("ignore").is_some_and(TagValue::is_truthy) {
            debug!("ignoring '{}'", source.display());
            return Ok(Link { dest: None, source });
        }

        // Normalize the member to the album identity, explicit nones
        // included so those fields still render (as nothing).
        for (tag, value) in &plan.overwrite {
            song.insert(tag.clone(), value.clone());
        }

        let mut file_template = plan.file_template.as_str();
        if song.get("preserve_filename").is_some_and(TagValue::is_truthy) {
            file_template = "{filename}";
        }

        let template = match song.get("path_template").and_then(TagValue::as_text) {
            Some(custom) => custom.to_string(),
            None => format!("{}/{}", plan.path_template, file_template),
        };

        // Surface syntax problems once, before any component renders.
        Template::parse(&template)?;

        let mut dest = PathBuf::new();
        for component in split_components(&template) {
            let rendered = render(&component, &song, self.tagmap, Some(self.fallbacks))?;
            let cleaned = self.charmap.apply(&rendered);
            if !cleaned.is_empty() {
                dest.push(cleaned);
            }
        }
        Ok(Link {
            dest: Some(dest),
            source,
        })
    }
}

/// Iterator over the planned links of a run. Yields an error for a song
/// whose template cannot be parsed or rendered; the caller decides whether
/// that is fatal.
pub struct Links<'n, 'a> {
    namer: &'n LinkNamer<'a>,
    albums: std::vec::IntoIter<Vec<TagSet>>,
    plan: Option<AlbumPlan>,
    songs: std::vec::IntoIter<TagSet>,
}

impl Iterator for Links<'_, '_> {
    type Item = Result<Link>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(song) = self.songs.next() {
                let plan = self.plan.as_ref()?;
                return Some(self.namer.emit(song, plan));
            }
            let album = self.albums.next()?;
            let Some(first) = album.first() else { continue };
            self.plan = Some(self.namer.plan(first, &album));
            self.songs = album.into_iter();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::path::Path;

    fn tags(pairs: &[(&str, &str)]) -> TagSet {
        let mut t: TagSet = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), TagValue::from(*v)))
            .collect();
        t.entry("abspath".to_string())
            .or_insert_with(|| TagValue::from("/music/file.flac"));
        t
    }

    fn collect_links(config: &Config, albums: Vec<Vec<TagSet>>) -> Vec<Link> {
        let namer = LinkNamer::new(&config.structure, &config.tagmap, &config.fallbacks).unwrap();
        namer
            .links(albums)
            .collect::<Result<Vec<_>>>()
            .expect("naming should succeed")
    }

    fn dests(links: &[Link]) -> Vec<String> {
        links
            .iter()
            .map(|l| {
                l.dest
                    .as_ref()
                    .map(|d| d.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect()
    }

    #[test]
    fn test_plain_album_layout() {
        let config = Config::default();
        let song = tags(&[
            ("ALBUMARTIST", "ABBA"),
            ("ALBUM", "Arrival"),
            ("DATE", "1976"),
            ("ARTIST", "ABBA"),
            ("TITLE", "S.O.S."),
            ("TRACKNUMBER", "3"),
            ("ext", "flac"),
        ]);
        let links = collect_links(&config, vec![vec![song]]);
        assert_eq!(
            dests(&links),
            vec!["ABBA/Arrival (1976)/03 - S.O.S..flac"]
        );
    }

    #[test]
    fn test_missing_albumartist_falls_back_to_artist() {
        let config = Config::default();
        let song = tags(&[
            ("ALBUM", "Arrival"),
            ("DATE", "1976"),
            ("ARTIST", "ABBA"),
            ("TITLE", "S.O.S."),
            ("TRACKNUMBER", "3"),
            ("ext", "flac"),
        ]);
        let links = collect_links(&config, vec![vec![song]]);
        // A single-artist album is never a compilation; the unset
        // ALBUMARTIST renders through its {ARTIST} fallback.
        assert_eq!(dests(&links), vec!["ABBA/Arrival (1976)/03 - S.O.S..flac"]);
    }

    #[test]
    fn test_multiartist_album_uses_the_multiartist_file_template() {
        let config = Config::default();
        let a = tags(&[
            ("ALBUM", "Now 5"),
            ("DATE", "2000"),
            ("ARTIST", "A"),
            ("TITLE", "One"),
            ("TRACKNUMBER", "1"),
            ("ext", "mp3"),
        ]);
        let b = tags(&[
            ("ALBUM", "Now 5"),
            ("DATE", "2000"),
            ("ARTIST", "B"),
            ("TITLE", "Two"),
            ("TRACKNUMBER", "2"),
            ("ext", "mp3"),
        ]);
        let links = collect_links(&config, vec![vec![a, b]]);
        assert_eq!(
            dests(&links),
            vec![
                "Compilations/Now 5 (2000)/01 - A - One.mp3",
                "Compilations/Now 5 (2000)/02 - B - Two.mp3",
            ]
        );
    }

    #[test]
    fn test_multiartist_without_an_album_title_is_not_a_compilation() {
        let config = Config::default();
        // Differing artists but no album title: just missing tags, so the
        // plain layout (with its fallbacks) applies.
        let a = tags(&[
            ("DATE", "1999"),
            ("ARTIST", "Alpha"),
            ("TITLE", "One"),
            ("TRACKNUMBER", "1"),
            ("ext", "flac"),
        ]);
        let b = tags(&[
            ("DATE", "1999"),
            ("ARTIST", "Beta"),
            ("TITLE", "Two"),
            ("TRACKNUMBER", "2"),
            ("ext", "flac"),
        ]);
        let links = collect_links(&config, vec![vec![a, b]]);
        assert_eq!(
            dests(&links),
            vec![
                "Alpha/Unknown Album (1999)/01 - Alpha - One.flac",
                "Beta/Unknown Album (1999)/02 - Beta - Two.flac",
            ]
        );
    }

    #[test]
    fn test_albumartist_makes_a_multiartist_album_an_anthology() {
        let config = Config::default();
        let a = tags(&[
            ("ALBUMARTIST", "Various"),
            ("ALBUM", "Hits"),
            ("DATE", "2000"),
            ("ARTIST", "Alpha"),
            ("TITLE", "One"),
            ("TRACKNUMBER", "1"),
            ("ext", "flac"),
        ]);
        let b = tags(&[
            ("ALBUMARTIST", "Various"),
            ("ALBUM", "Hits"),
            ("DATE", "2000"),
            ("ARTIST", "Beta"),
            ("TITLE", "Two"),
            ("TRACKNUMBER", "2"),
            ("ext", "flac"),
        ]);
        let links = collect_links(&config, vec![vec![a, b]]);
        // An album artist keeps the album out of Compilations; the file
        // names still credit each song's own artist.
        assert_eq!(
            dests(&links),
            vec![
                "Various/Hits (2000)/01 - Alpha - One.flac",
                "Various/Hits (2000)/02 - Beta - Two.flac",
            ]
        );
    }

    #[test]
    fn test_consistent_is_compilation_overrides_the_heuristic() {
        let config = Config::default();
        let mut a = tags(&[
            ("ALBUMARTIST", "Various"),
            ("ALBUM", "Mix"),
            ("DATE", "1999"),
            ("ARTIST", "A"),
            ("TITLE", "One"),
            ("TRACKNUMBER", "1"),
            ("ext", "mp3"),
        ]);
        a.insert("is_compilation".to_string(), TagValue::Bool(true));
        let links = collect_links(&config, vec![vec![a]]);
        assert_eq!(dests(&links), vec!["Compilations/Mix (1999)/01 - One.mp3"]);
    }

    #[test]
    fn test_is_compilation_false_forces_the_plain_layout() {
        let config = Config::default();
        // Multi-artist with no album artist normally reads as a compilation.
        let mut a = tags(&[
            ("ALBUM", "Mix"),
            ("DATE", "1999"),
            ("ARTIST", "A"),
            ("TITLE", "One"),
            ("TRACKNUMBER", "1"),
            ("ext", "mp3"),
        ]);
        a.insert("is_compilation".to_string(), TagValue::Bool(false));
        let mut b = tags(&[
            ("ALBUM", "Mix"),
            ("DATE", "1999"),
            ("ARTIST", "B"),
            ("TITLE", "Two"),
            ("TRACKNUMBER", "2"),
            ("ext", "mp3"),
        ]);
        b.insert("is_compilation".to_string(), TagValue::Bool(false));
        let links = collect_links(&config, vec![vec![a, b]]);
        // Plain layout; ALBUMARTIST renders per song through its {ARTIST}
        // fallback, and the multi-artist file template still applies.
        assert_eq!(
            dests(&links),
            vec!["A/Mix (1999)/01 - A - One.mp3", "B/Mix (1999)/02 - B - Two.mp3"]
        );
    }

    #[test]
    fn test_multidisc_albums_get_the_disc_prefix() {
        let config = Config::default();
        let a = tags(&[
            ("ALBUMARTIST", "X"),
            ("ALBUM", "Live"),
            ("DATE", "1980"),
            ("ARTIST", "X"),
            ("TITLE", "One"),
            ("TRACKNUMBER", "1"),
            ("DISCNUMBER", "1"),
            ("ext", "flac"),
        ]);
        let b = tags(&[
            ("ALBUMARTIST", "X"),
            ("ALBUM", "Live"),
            ("DATE", "1980"),
            ("ARTIST", "X"),
            ("TITLE", "Two"),
            ("TRACKNUMBER", "1"),
            ("DISCNUMBER", "2"),
            ("ext", "flac"),
        ]);
        let links = collect_links(&config, vec![vec![a, b]]);
        assert_eq!(
            dests(&links),
            vec![
                "X/Live (1980)/Disc 1/01 - One.flac",
                "X/Live (1980)/Disc 2/01 - Two.flac",
            ]
        );
    }

    #[test]
    fn test_single_disc_albums_do_not() {
        let config = Config::default();
        let a = tags(&[
            ("ALBUMARTIST", "X"),
            ("ALBUM", "Live"),
            ("DATE", "1980"),
            ("ARTIST", "X"),
            ("TITLE", "One"),
            ("TRACKNUMBER", "1"),
            ("DISCNUMBER", "1"),
            ("ext", "flac"),
        ]);
        let links = collect_links(&config, vec![vec![a]]);
        assert_eq!(dests(&links), vec!["X/Live (1980)/01 - One.flac"]);
    }

    #[test]
    fn test_album_identity_comes_from_the_first_song() {
        let config = Config::default();
        let a = tags(&[
            ("ALBUMARTIST", "X"),
            ("ALBUM", "Live"),
            ("DATE", "1980"),
            ("ARTIST", "X"),
            ("TITLE", "One"),
            ("TRACKNUMBER", "1"),
            ("ext", "flac"),
        ]);
        // Same identity after case folding, different raw spelling.
        let b = tags(&[
            ("ALBUMARTIST", "X"),
            ("ALBUM", "LIVE"),
            ("DATE", "1980"),
            ("ARTIST", "X"),
            ("TITLE", "Two"),
            ("TRACKNUMBER", "2"),
            ("ext", "flac"),
        ]);
        let links = collect_links(&config, vec![vec![a, b]]);
        assert_eq!(
            dests(&links),
            vec!["X/Live (1980)/01 - One.flac", "X/Live (1980)/02 - Two.flac"]
        );
    }

    #[test]
    fn test_ignored_songs_yield_a_skip_descriptor() {
        let config = Config::default();
        let mut song = tags(&[("TITLE", "x"), ("ext", "mp3")]);
        song.insert("ignore".to_string(), TagValue::Bool(true));
        let links = collect_links(&config, vec![vec![song]]);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].dest, None);
        assert_eq!(links[0].source, Path::new("/music/file.flac"));
    }

    #[test]
    fn test_preserve_filename_keeps_the_original_name() {
        let config = Config::default();
        let mut song = tags(&[
            ("ALBUMARTIST", "X"),
            ("ALBUM", "Y"),
            ("DATE", "2000"),
            ("TITLE", "ignored"),
            ("TRACKNUMBER", "9"),
            ("filename", "07 - kept name.mp3"),
            ("ext", "mp3"),
        ]);
        song.insert("preserve_filename".to_string(), TagValue::Bool(true));
        let links = collect_links(&config, vec![vec![song]]);
        assert_eq!(dests(&links), vec!["X/Y (2000)/07 - kept name.mp3"]);
    }

    #[test]
    fn test_path_template_replaces_the_whole_layout() {
        let config = Config::default();
        let mut song = tags(&[("TITLE", "Solo"), ("ext", "flac")]);
        song.insert(
            "path_template".to_string(),
            TagValue::from("Singles/{TITLE}.{ext}"),
        );
        let links = collect_links(&config, vec![vec![song]]);
        assert_eq!(dests(&links), vec!["Singles/Solo.flac"]);
    }

    #[test]
    fn test_unparsable_templates_fail_the_song() {
        let config = Config::default();
        let mut song = tags(&[("TITLE", "x")]);
        song.insert("path_template".to_string(), TagValue::from("{TITLE"));
        let namer = LinkNamer::new(&config.structure, &config.tagmap, &config.fallbacks).unwrap();
        let results: Vec<_> = namer.links(vec![vec![song]]).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::Parse { .. })));
    }

    #[test]
    fn test_rendered_components_are_sanitized() {
        let config = Config::default();
        let song = tags(&[
            ("ALBUMARTIST", "AC/DC"),
            ("ALBUM", "Who Made Who?"),
            ("DATE", "1986"),
            ("ARTIST", "AC/DC"),
            ("TITLE", "D.T."),
            ("TRACKNUMBER", "7"),
            ("ext", "flac"),
        ]);
        let links = collect_links(&config, vec![vec![song]]);
        assert_eq!(
            dests(&links),
            vec!["AC-DC/Who Made Who (1986)/07 - D.T..flac"]
        );
    }

    #[test]
    fn test_empty_components_are_dropped() {
        let config = Config::default();
        let mut song = tags(&[("TITLE", "x"), ("ext", "mp3")]);
        song.insert("GROUPING".to_string(), TagValue::None);
        song.insert(
            "path_template".to_string(),
            TagValue::from("{GROUPING}/{TITLE}.{ext}"),
        );
        let links = collect_links(&config, vec![vec![song]]);
        assert_eq!(dests(&links), vec!["x.mp3"]);
    }

    #[test]
    fn test_charmap_rejects_uneven_replace_pairs() {
        let err = CharMap::new(&("ab".to_string(), "x".to_string()), "").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_charmap_strip_wins_over_replace() {
        let map = CharMap::new(&("?".to_string(), "!".to_string()), "?").unwrap();
        assert_eq!(map.apply("a?b"), "ab");
    }
}
