//! Tag sets and the two tag layers (resource-local and process-wide defaults).

use std::collections::{BTreeMap, BTreeSet};

use clap::Args;
use serde::{Deserialize, Serialize};

/// Keys under this prefix are owned by the remote system and never managed.
pub const SYSTEM_TAG_PREFIX: &str = "aws:";

/// Unordered string-to-string tag mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Overlay `local` on top of `self`; local values win on conflicting keys.
    pub fn merge(&self, local: &TagSet) -> TagSet {
        let mut merged = self.0.clone();
        merged.extend(local.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        TagSet(merged)
    }

    /// Drop entries whose key and value both match a default tag.
    pub fn without_defaults(&self, defaults: &TagSet) -> TagSet {
        self.0
            .iter()
            .filter(|(k, v)| defaults.get(k) != Some(v.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Removals and upserts that turn `self` into `new`.
    pub fn delta_to(&self, new: &TagSet) -> TagDelta {
        let remove = self
            .0
            .keys()
            .filter(|k| !new.0.contains_key(*k))
            .cloned()
            .collect();
        let upsert = new
            .0
            .iter()
            .filter(|(k, v)| self.get(k) != Some(v.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        TagDelta { remove, upsert }
    }

    /// Apply a delta in place.
    pub fn apply(&mut self, delta: &TagDelta) {
        for key in &delta.remove {
            self.0.remove(key);
        }
        for (k, v) in delta.upsert.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        TagSet(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Change to a resource's tags: keys to remove, pairs to add or overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDelta {
    pub remove: BTreeSet<String>,
    pub upsert: TagSet,
}

impl TagDelta {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.upsert.is_empty()
    }
}

/// Process-wide tag settings.
#[derive(Debug, Clone, Default, PartialEq, Args, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    /// Tag applied to every resource unless overridden locally (key=value, repeatable)
    #[arg(long = "default-tag", value_parser = parse_tag)]
    pub default_tags: Vec<(String, String)>,

    /// Tag key never managed or reported (repeatable)
    #[arg(long = "ignore-tag-key")]
    pub ignore_keys: Vec<String>,

    /// Tag key prefix never managed or reported (repeatable)
    #[arg(long = "ignore-tag-prefix")]
    pub ignore_prefixes: Vec<String>,
}

/// Local and effective tags as exposed in canonical state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagLayers {
    pub tags: TagSet,
    pub tags_all: TagSet,
}

impl TagConfig {
    pub fn defaults(&self) -> TagSet {
        self.default_tags.iter().cloned().collect()
    }

    /// Effective tags for a resource: defaults overlaid with its local tags.
    pub fn merge(&self, local: &TagSet) -> TagSet {
        self.defaults().merge(local)
    }

    pub fn is_ignored(&self, key: &str) -> bool {
        key.starts_with(SYSTEM_TAG_PREFIX)
            || self.ignore_keys.iter().any(|k| k == key)
            || self.ignore_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    /// Split remote tags into the local and effective layers.
    pub fn layers(&self, remote: &TagSet) -> TagLayers {
        let tags_all: TagSet = remote
            .iter()
            .filter(|(k, _)| !self.is_ignored(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let tags = tags_all.without_defaults(&self.defaults());
        TagLayers { tags, tags_all }
    }
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid tag `{raw}`: expected key=value"))?;
    if key.is_empty() {
        return Err(format!("invalid tag `{raw}`: empty key"));
    }
    Ok((key.to_string(), value.to_string()))
}
