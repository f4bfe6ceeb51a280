//! Output ledger for cleaning stale files.
//!
//! Every generated file is recorded with the scope that produced it and the
//! SHA-256 of its bytes. A run that regenerates a set of scopes can then
//! delete the ledger paths in those scopes that it did not write this time:
//! an unpublished article drops out of the `article:{id}` scope, a renamed
//! slug leaves its old path behind in the same scope, and a tag that lost its
//! last article sheds its extra pagination files.
//!
//! ## Storage
//!
//! The ledger is a JSON file at `<output_dir>/.staticpress-ledger.json`. Keys
//! are sorted so two runs over unchanged content produce identical bytes.
//! A missing, corrupt, or version-mismatched ledger loads as empty.

use crate::types::ItemId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

/// Name of the ledger file within the output directory.
pub const LEDGER_FILENAME: &str = ".staticpress-ledger.json";

/// Bump to discard existing ledgers when the format changes.
const LEDGER_VERSION: u32 = 1;

/// The family of artifacts a generated file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Index,
    Article(ItemId),
    Page(ItemId),
    Tag(ItemId),
    TagsIndex,
    Feed,
    Sitemap,
    Search,
    Redirects,
    Uploads,
    Static,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index => f.write_str("index"),
            Self::Article(id) => write!(f, "article:{id}"),
            Self::Page(id) => write!(f, "page:{id}"),
            Self::Tag(id) => write!(f, "tag:{id}"),
            Self::TagsIndex => f.write_str("tags-index"),
            Self::Feed => f.write_str("feed"),
            Self::Sitemap => f.write_str("sitemap"),
            Self::Search => f.write_str("search"),
            Self::Redirects => f.write_str("redirects"),
            Self::Uploads => f.write_str("uploads"),
            Self::Static => f.write_str("static"),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_id = |raw: &str| raw.parse::<ItemId>().map_err(|_| format!("bad scope id in '{s}'"));
        match s.split_once(':') {
            Some(("article", id)) => Ok(Self::Article(parse_id(id)?)),
            Some(("page", id)) => Ok(Self::Page(parse_id(id)?)),
            Some(("tag", id)) => Ok(Self::Tag(parse_id(id)?)),
            Some(_) => Err(format!("unknown scope '{s}'")),
            None => match s {
                "index" => Ok(Self::Index),
                "tags-index" => Ok(Self::TagsIndex),
                "feed" => Ok(Self::Feed),
                "sitemap" => Ok(Self::Sitemap),
                "search" => Ok(Self::Search),
                "redirects" => Ok(Self::Redirects),
                "uploads" => Ok(Self::Uploads),
                "static" => Ok(Self::Static),
                other => Err(format!("unknown scope '{other}'")),
            },
        }
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A single generated file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub scope: Scope,
    pub digest: String,
}

/// On-disk record of generated output paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputLedger {
    pub version: u32,
    pub entries: BTreeMap<String, LedgerEntry>,
}

impl OutputLedger {
    /// Create an empty ledger (first run).
    pub fn empty() -> Self {
        Self {
            version: LEDGER_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Load from the output directory. Returns an empty ledger if the file
    /// doesn't exist or can't be parsed.
    pub fn load(output_dir: &Path) -> Self {
        let path = output_dir.join(LEDGER_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(ledger) if ledger.version == LEDGER_VERSION => ledger,
            _ => Self::empty(),
        }
    }

    /// Save to the output directory, skipping the write when unchanged.
    pub fn save(&self, output_dir: &Path) -> io::Result<()> {
        let path = output_dir.join(LEDGER_FILENAME);
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        if std::fs::read(&path).is_ok_and(|existing| existing == json.as_bytes()) {
            return Ok(());
        }
        std::fs::create_dir_all(output_dir)?;
        std::fs::write(path, json)
    }

    /// Record a generated path. A later record for the same path wins.
    pub fn record(&mut self, path: impl Into<String>, scope: Scope, digest: impl Into<String>) {
        self.entries.insert(
            path.into(),
            LedgerEntry {
                scope,
                digest: digest.into(),
            },
        );
    }

    pub fn remove(&mut self, path: &str) {
        self.entries.remove(path);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Paths recorded under any of the given scopes, sorted.
    pub fn paths_in_scopes(&self, scopes: &BTreeSet<Scope>) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| scopes.contains(&e.scope))
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Paths in `scopes` that are not in `written`: the stale set.
    pub fn stale_paths(&self, scopes: &BTreeSet<Scope>, written: &BTreeSet<String>) -> Vec<String> {
        self.paths_in_scopes(scopes)
            .into_iter()
            .filter(|p| !written.contains(p))
            .collect()
    }
}

/// SHA-256 of a byte slice as a hex string.
pub fn digest_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
