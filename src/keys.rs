// Key codec — maps semantic key kinds plus identifiers to namespaced storage keys.
//
// Every persisted value lives under a key of the form
// `{site}:{kind}:{id1}:{id2}...`. The codec is pure: no state beyond the
// site name and the shape of that site's target ids. State keys can be
// parsed back into `(group, target)` so subscriptions can be enumerated by
// prefix scan without a separate index.

use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const SEPARATOR: char = ':';

/// The semantic kind of a storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Per-(group, target) subscription configuration.
    Config,
    /// Per-(group, target) subscription state; the enumerable record.
    State,
    /// Short-lived marker that a target was polled recently.
    Fresh,
    /// Site-specific extras (current snapshot, delivered notify message, ...).
    Extra(&'static str),
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Config => "concern_config",
            KeyKind::State => "concern_state",
            KeyKind::Fresh => "fresh",
            KeyKind::Extra(name) => name,
        }
    }
}

/// One identifier component of a key.
///
/// Targets on some sites are numeric (user ids, room ids) and on others
/// opaque strings (channel ids), so both are first-class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyId {
    Int(i64),
    Str(String),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Int(v) => write!(f, "{v}"),
            KeyId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for KeyId {
    fn from(v: i64) -> Self {
        KeyId::Int(v)
    }
}

impl From<&str> for KeyId {
    fn from(v: &str) -> Self {
        KeyId::Str(v.to_string())
    }
}

impl From<String> for KeyId {
    fn from(v: String) -> Self {
        KeyId::Str(v)
    }
}

/// How a site's target ids are parsed back out of a state key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetIdKind {
    Int,
    Str,
}

/// Builds and parses storage keys for a single site.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    site: String,
    id_kind: TargetIdKind,
}

impl KeyCodec {
    pub fn new(site: impl Into<String>, id_kind: TargetIdKind) -> Self {
        Self {
            site: site.into(),
            id_kind,
        }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn id_kind(&self) -> TargetIdKind {
        self.id_kind
    }

    /// Build the storage key for `kind` and the given identifiers.
    pub fn build(&self, kind: KeyKind, ids: &[KeyId]) -> String {
        let mut key = self.prefix(kind);
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                key.push(SEPARATOR);
            }
            key.push_str(&id.to_string());
        }
        key
    }

    /// Scan prefix covering every key of `kind` for this site.
    pub fn prefix(&self, kind: KeyKind) -> String {
        format!("{}{SEPARATOR}{}{SEPARATOR}", self.site, kind.as_str())
    }

    /// Inverse of `build(KeyKind::State, [group, target])`.
    ///
    /// The target segment captures the remainder of the key, so string ids
    /// containing the separator survive the round trip.
    pub fn parse_state_key(&self, key: &str) -> Result<(i64, KeyId)> {
        let rest = key
            .strip_prefix(&self.prefix(KeyKind::State))
            .with_context(|| format!("Not a {} state key: {key}", self.site))?;

        let (group, target) = rest
            .split_once(SEPARATOR)
            .with_context(|| format!("State key is missing a target id: {key}"))?;

        let group: i64 = group
            .parse()
            .with_context(|| format!("Invalid group id in state key: {key}"))?;

        let target = match self.id_kind {
            TargetIdKind::Int => KeyId::Int(
                target
                    .parse()
                    .with_context(|| format!("Invalid target id in state key: {key}"))?,
            ),
            TargetIdKind::Str => {
                if target.is_empty() {
                    anyhow::bail!("Empty target id in state key: {key}");
                }
                KeyId::Str(target.to_string())
            }
        };

        Ok((group, target))
    }
}
