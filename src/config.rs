//! # Configuration
//!
//! Built-in defaults cover every setting; a JSON file (passed with `--conf`
//! or found at `$XDG_CONFIG_HOME/symfarm/config.json`) is merged over them
//! per top-level key. `options`, `structure`, `tagmap` and `fallbacks`
//! merge key-by-key so a file can adjust a single template; `valid_files`
//! and `overrides` replace the defaults wholesale. A `null` fallback clears
//! the built-in one for that tag.
//!
//! The format is JSON because override rules and operations need a real
//! `null` ("tag is absent" / "remove the tag") and the order of operation
//! keys is significant.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::naming::CharMap;
use crate::overrides::Override;
use crate::tags::{Fallback, Fallbacks, TagMap, TagValue};
use crate::template::Template;

/// Runtime toggles; the command line can override each one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Remove broken links and newly-empty directories before scanning.
    pub clean: bool,
    /// Re-scrape files that already have a link pointing at them.
    pub rescan_existing: bool,
    /// Write link targets relative to the link's parent directory.
    pub relative_links: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            clean: true,
            rescan_existing: false,
            relative_links: false,
        }
    }
}

/// The naming layout: path and file templates plus the character policy
/// applied to every rendered path component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    /// Album directory for attributed albums.
    pub path: String,
    /// Album directory for compilations.
    pub path_compilation: String,
    /// File name within the album directory.
    pub file: String,
    /// File name when the album's songs have differing artists.
    pub file_multiartist: String,
    /// Prepended to the file template for multi-disc albums.
    pub file_disc_prefix: String,
    /// Paired find/replace characters.
    pub character_replace: (String, String),
    /// Characters removed outright.
    pub character_strip: String,
}

impl Default for Structure {
    fn default() -> Self {
        Structure {
            path: "{ALBUMARTIST}/{ALBUM} ({DATE:.4})".to_string(),
            path_compilation: "Compilations/{ALBUM} ({DATE:.4})".to_string(),
            file: "{TRACKNUMBER:0>2} - {TITLE}.{ext}".to_string(),
            file_multiartist: "{TRACKNUMBER:0>2} - {ARTIST} - {TITLE}.{ext}".to_string(),
            file_disc_prefix: "Disc {DISCNUMBER}/".to_string(),
            character_replace: ("/\\".to_string(), "--".to_string()),
            character_strip: "<>:\"|?*".to_string(),
        }
    }
}

/// One override as written in the configuration file. Rule and operation
/// values keep their JSON types until [`Override::compile`] interprets them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverrideSpec {
    pub rules: Map<String, Value>,
    pub operations: Map<String, Value>,
}

/// The fully-merged runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub options: Options,
    /// Patterns a file name must fully match to be scanned.
    pub valid_files: Vec<String>,
    pub structure: Structure,
    pub tagmap: TagMap,
    pub fallbacks: Fallbacks,
    pub overrides: Vec<OverrideSpec>,
}

impl Default for Config {
    fn default() -> Self {
        let tagmap: TagMap = [
            (
                "ALBUMARTIST",
                vec!["ALBUMARTIST", "ALBUM ARTIST", "ALBUM_ARTIST"],
            ),
            ("DATE", vec!["DATE", "YEAR", "ORIGINALDATE"]),
            ("TRACKNUMBER", vec!["TRACKNUMBER", "TRACK"]),
            ("DISCNUMBER", vec!["DISCNUMBER", "DISC"]),
        ]
        .into_iter()
        .map(|(tag, aliases)| {
            (
                tag.to_string(),
                aliases.into_iter().map(String::from).collect(),
            )
        })
        .collect();

        let fallbacks: Fallbacks = [
            ("ALBUMARTIST", "{ARTIST}"),
            ("ARTIST", "Unknown Artist"),
            ("ALBUM", "Unknown Album"),
            ("TITLE", "{filename}"),
            ("DATE", "0000"),
            ("TRACKNUMBER", "00"),
            ("DISCNUMBER", "0"),
        ]
        .into_iter()
        .map(|(tag, tpl)| (tag.to_string(), Fallback::Template(tpl.to_string())))
        .collect();

        Config {
            options: Options::default(),
            valid_files: vec![
                r"(?i).+\.(flac|mp3|ogg|oga|opus|m4a|aac|wv|wav|aiff?|ape)".to_string(),
            ],
            structure: Structure::default(),
            tagmap,
            fallbacks,
            overrides: Vec::new(),
        }
    }
}

impl Config {
    /// Check everything that can be checked before touching any music:
    /// structure and fallback templates parse, the character tables pair
    /// up, override rules compile, and the file patterns are valid regexes.
    pub fn validate(&self) -> crate::error::Result<()> {
        for template in [
            &self.structure.path,
            &self.structure.path_compilation,
            &self.structure.file,
            &self.structure.file_multiartist,
            &self.structure.file_disc_prefix,
        ] {
            Template::parse(template)?;
        }
        CharMap::new(
            &self.structure.character_replace,
            &self.structure.character_strip,
        )?;
        for fallback in self.fallbacks.values() {
            if let Fallback::Template(template) = fallback {
                Template::parse(template)?;
            }
        }
        self.compile_overrides()?;
        self.compile_valid_files()?;
        Ok(())
    }

    /// Compile the override list in configuration order.
    pub fn compile_overrides(&self) -> crate::error::Result<Vec<Override>> {
        self.overrides
            .iter()
            .map(|spec| Override::compile(&spec.rules, &spec.operations))
            .collect()
    }

    /// Compile `valid_files` into full-match regexes.
    pub fn compile_valid_files(&self) -> crate::error::Result<Vec<Regex>> {
        self.valid_files
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                    Error::Config(format!("bad valid_files pattern '{pattern}': {e}"))
                })
            })
            .collect()
    }

    fn merge(&mut self, patch: ConfigPatch) {
        if let Some(options) = patch.options {
            if let Some(v) = options.clean {
                self.options.clean = v;
            }
            if let Some(v) = options.rescan_existing {
                self.options.rescan_existing = v;
            }
            if let Some(v) = options.relative_links {
                self.options.relative_links = v;
            }
        }
        if let Some(valid_files) = patch.valid_files {
            self.valid_files = valid_files;
        }
        if let Some(structure) = patch.structure {
            if let Some(v) = structure.path {
                self.structure.path = v;
            }
            if let Some(v) = structure.path_compilation {
                self.structure.path_compilation = v;
            }
            if let Some(v) = structure.file {
                self.structure.file = v;
            }
            if let Some(v) = structure.file_multiartist {
                self.structure.file_multiartist = v;
            }
            if let Some(v) = structure.file_disc_prefix {
                self.structure.file_disc_prefix = v;
            }
            if let Some(v) = structure.character_replace {
                self.structure.character_replace = v;
            }
            if let Some(v) = structure.character_strip {
                self.structure.character_strip = v;
            }
        }
        if let Some(tagmap) = patch.tagmap {
            self.tagmap.extend(tagmap);
        }
        if let Some(fallbacks) = patch.fallbacks {
            for (tag, value) in &fallbacks {
                match fallback_from_value(value) {
                    Some(fallback) => {
                        self.fallbacks.insert(tag.clone(), fallback);
                    }
                    None => {
                        self.fallbacks.remove(tag);
                    }
                }
            }
        }
        if let Some(overrides) = patch.overrides {
            self.overrides = overrides;
        }
    }
}

/// Partial configuration as read from a user file; everything is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigPatch {
    options: Option<OptionsPatch>,
    valid_files: Option<Vec<String>>,
    structure: Option<StructurePatch>,
    tagmap: Option<TagMap>,
    fallbacks: Option<Map<String, Value>>,
    overrides: Option<Vec<OverrideSpec>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OptionsPatch {
    clean: Option<bool>,
    rescan_existing: Option<bool>,
    relative_links: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StructurePatch {
    path: Option<String>,
    path_compilation: Option<String>,
    file: Option<String>,
    file_multiartist: Option<String>,
    file_disc_prefix: Option<String>,
    character_replace: Option<(String, String)>,
    character_strip: Option<String>,
}

fn fallback_from_value(value: &Value) -> Option<Fallback> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Fallback::Template(s.clone())),
        Value::Bool(b) => Some(Fallback::Literal(TagValue::Bool(*b))),
        other => Some(Fallback::Literal(TagValue::Text(other.to_string()))),
    }
}

/// Load the defaults, merged with `path` when given or with the default
/// config file when one exists.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();
    let file = match path {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    };
    let Some(file) = file else {
        debug!("using built-in configuration defaults");
        return Ok(config);
    };
    info!("loading configuration from '{}'", file.display());
    let raw = fs::read_to_string(&file)
        .with_context(|| format!("failed to read config file '{}'", file.display()))?;
    let patch: ConfigPatch = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file '{}'", file.display()))?;
    config.merge(patch);
    Ok(config)
}

/// `$XDG_CONFIG_HOME/symfarm/config.json` (or the platform equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("symfarm").join("config.json"))
}
