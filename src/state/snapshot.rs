// Snapshot model — what a target looked like last time, and what it looks
// like now.
//
// Snapshots are persisted as JSON, so the per-diff "changed" flags are
// skipped on the wire; they only describe the most recent diff.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::card::RawCard;
use crate::keys::KeyId;

/// An external account, room or channel being watched on one site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub site: String,
    pub id: KeyId,
}

impl Target {
    pub fn new(site: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            site: site.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site, self.id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveStatus {
    #[default]
    Offline,
    Living,
    /// Scheduled or rebroadcasting; not live, not offline.
    Waiting,
}

impl LiveStatus {
    pub fn is_living(self) -> bool {
        self == LiveStatus::Living
    }
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LiveStatus::Offline => "offline",
            LiveStatus::Living => "living",
            LiveStatus::Waiting => "waiting",
        })
    }
}

/// Upstream content identifier.
///
/// Ids are opaque strings, but most sites hand out decimal integers that
/// outgrow i64 or arrive with different widths, so all-digit ids compare
/// numerically and everything else compares as text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<&str> {
        let s = self.0.as_str();
        (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())).then(|| s.trim_start_matches('0'))
    }
}

impl Ord for ContentId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            // Numeric ids sort before text ids so mixed sets stay totally ordered.
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialEq for ContentId {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ContentId {}

impl PartialOrd for ContentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Last-known state of a target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub name: String,
    pub status: LiveStatus,
    pub title: String,
    pub url: String,
    pub cover: String,
    /// Newest content item already accounted for.
    pub last_content_id: Option<ContentId>,
    pub last_timestamp: i64,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub status_changed: bool,
    #[serde(skip)]
    pub title_changed: bool,
}

impl Snapshot {
    /// The content cursor as a comparable pair.
    pub fn cursor(&self) -> Option<(i64, &ContentId)> {
        self.last_content_id
            .as_ref()
            .map(|id| (self.last_timestamp, id))
    }
}

/// One fetch result from a site adapter.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub name: String,
    pub status: LiveStatus,
    pub title: String,
    pub url: String,
    pub cover: String,
    /// Feed items, in any order.
    pub items: Vec<ContentItem>,
}

#[derive(Debug, Clone)]
pub struct ContentItem {
    pub id: ContentId,
    pub timestamp: i64,
    pub payload: ItemPayload,
}

impl ContentItem {
    pub fn card(raw: RawCard) -> Self {
        Self {
            id: ContentId::new(raw.desc.dynamic_id_str.clone()),
            timestamp: raw.desc.timestamp,
            payload: ItemPayload::Card(raw),
        }
    }

    pub fn compaction_key(&self) -> Option<String> {
        match &self.payload {
            ItemPayload::Card(raw) => raw.compaction_key(),
            ItemPayload::Post { .. } => None,
        }
    }
}

/// Site-specific body of a feed item.
#[derive(Debug, Clone)]
pub enum ItemPayload {
    /// A feed card in the upstream card format.
    Card(RawCard),
    /// A plain post from sites without cards.
    Post {
        title: String,
        text: String,
        url: String,
    },
}
