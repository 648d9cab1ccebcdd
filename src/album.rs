//! # Album grouping
//!
//! Songs belong to the same album when their case-folded
//! `ALBUMARTIST`/`ALBUM`/`DATE` triple matches. Identity uses the alias
//! probe only: fallbacks would invent artificial differences (or worse,
//! artificial sameness) for songs that simply lack the tags.

use std::collections::HashMap;

use log::info;

use crate::tags::{resolve_plain, TagMap, TagSet};

/// The tags that define an album's identity, in identity-tuple order.
pub const ALBUM_TAGS: [&str; 3] = ["ALBUMARTIST", "ALBUM", "DATE"];

/// Case-insensitive identity triple for the album a song belongs to.
/// Unresolvable tags contribute an empty component.
pub fn album_id(tags: &TagSet, tagmap: &TagMap) -> (String, String, String) {
    let part = |tag| {
        resolve_plain(tag, tags, tagmap)
            .map(|value| value.to_string().to_lowercase())
            .unwrap_or_default()
    };
    (part("ALBUMARTIST"), part("ALBUM"), part("DATE"))
}

/// Drain `songs` into albums.
///
/// This is the one stage of the pipeline that has to collect everything:
/// an album's naming depends on all of its members. Albums keep the order
/// they were first encountered in, and songs keep their scan order within
/// each album.
pub fn group_by_album(songs: impl Iterator<Item = TagSet>, tagmap: &TagMap) -> Vec<Vec<TagSet>> {
    let mut index: HashMap<(String, String, String), usize> = HashMap::new();
    let mut albums: Vec<Vec<TagSet>> = Vec::new();
    let mut count = 0usize;
    for song in songs {
        count += 1;
        let id = album_id(&song, tagmap);
        match index.get(&id) {
            Some(&slot) => albums[slot].push(song),
            None => {
                index.insert(id, albums.len());
                albums.push(vec![song]);
            }
        }
    }
    info!("Grouped {} songs into {} albums", count, albums.len());
    albums
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagValue;

    fn tags(pairs: &[(&str, &str)]) -> TagSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), TagValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_identity_is_case_insensitive() {
        let a = tags(&[("ALBUMARTIST", "ABBA"), ("ALBUM", "Arrival"), ("DATE", "1976")]);
        let b = tags(&[("ALBUMARTIST", "abba"), ("ALBUM", "ARRIVAL"), ("DATE", "1976")]);
        let m = TagMap::new();
        assert_eq!(album_id(&a, &m), album_id(&b, &m));
    }

    #[test]
    fn test_date_distinguishes_reissues() {
        let a = tags(&[("ALBUM", "Greatest Hits"), ("DATE", "1981")]);
        let b = tags(&[("ALBUM", "Greatest Hits"), ("DATE", "2001")]);
        let m = TagMap::new();
        assert_ne!(album_id(&a, &m), album_id(&b, &m));
    }

    #[test]
    fn test_identity_resolves_through_the_tagmap() {
        let a = tags(&[("ALBUM", "X"), ("YEAR", "1999")]);
        let b = tags(&[("ALBUM", "X"), ("DATE", "1999")]);
        let mut m = TagMap::new();
        m.insert("DATE".to_string(), vec!["DATE".to_string(), "YEAR".to_string()]);
        assert_eq!(album_id(&a, &m), album_id(&b, &m));
    }

    #[test]
    fn test_grouping_preserves_first_seen_order() {
        let songs = vec![
            tags(&[("ALBUM", "B"), ("TITLE", "1")]),
            tags(&[("ALBUM", "A"), ("TITLE", "2")]),
            tags(&[("ALBUM", "B"), ("TITLE", "3")]),
        ];
        let albums = group_by_album(songs.into_iter(), &TagMap::new());
        assert_eq!(albums.len(), 2);
        assert_eq!(albums[0].len(), 2);
        assert_eq!(albums[0][1].get("TITLE"), Some(&TagValue::from("3")));
        assert_eq!(albums[1][0].get("TITLE"), Some(&TagValue::from("2")));
    }

    #[test]
    fn test_untagged_songs_group_together() {
        let songs = vec![tags(&[("TITLE", "a")]), tags(&[("TITLE", "b")])];
        let albums = group_by_album(songs.into_iter(), &TagMap::new());
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].len(), 2);
    }
}
