// Feed cards — upstream payloads, their canonical form, and the lazy wrapper
// the notify path carries around.
//
// Normalization involves nested JSON decoding that a compacted notification
// never needs, so CacheCard computes it on first use and keeps it.

pub mod canonical;
pub mod model;
pub mod normalize;

use std::sync::OnceLock;

pub use canonical::{Addon, Author, CanonicalCard, CardBody, CardKind, DefaultBlock, VoteChoice};
pub use model::RawCard;
pub use normalize::normalize;

pub const CODE_FORWARD: i32 = 1;
pub const CODE_IMAGE: i32 = 2;
pub const CODE_TEXT: i32 = 4;
pub const CODE_VIDEO: i32 = 8;
pub const CODE_POST: i32 = 64;
pub const CODE_MUSIC: i32 = 256;
pub const CODE_MISS: i32 = 1024;
pub const CODE_SKETCH: i32 = 2048;
pub const CODE_LIVE: i32 = 4200;
pub const CODE_MYLIST: i32 = 4300;
pub const CODE_COURSE: i32 = 4302;
pub const CODE_LIVE_V2: i32 = 4308;

pub const ADDON_GOODS: i32 = 1;
pub const ADDON_RELATED: i32 = 2;
pub const ADDON_VOTE: i32 = 3;
pub const ADDON_MATCH: i32 = 4;
pub const ADDON_VIDEO: i32 = 5;
pub const ADDON_RESERVE: i32 = 6;

pub const CARD_URL_BASE: &str = "https://www.bilibili.com/opus/";

/// A raw card plus its canonical form, computed at most once.
#[derive(Debug)]
pub struct CacheCard {
    raw: RawCard,
    canonical: OnceLock<CanonicalCard>,
}

impl CacheCard {
    pub fn new(raw: RawCard) -> Self {
        Self {
            raw,
            canonical: OnceLock::new(),
        }
    }

    pub fn raw(&self) -> &RawCard {
        &self.raw
    }

    pub fn id(&self) -> &str {
        &self.raw.desc.dynamic_id_str
    }

    pub fn timestamp(&self) -> i64 {
        self.raw.desc.timestamp
    }

    pub fn compaction_key(&self) -> Option<String> {
        self.raw.compaction_key()
    }

    /// The normalized card. The first call does the work.
    pub fn canonical(&self) -> &CanonicalCard {
        self.canonical.get_or_init(|| normalize(&self.raw))
    }

    /// Whether [`canonical`](Self::canonical) has run yet.
    pub fn is_normalized(&self) -> bool {
        self.canonical.get().is_some()
    }
}

impl From<RawCard> for CacheCard {
    fn from(raw: RawCard) -> Self {
        Self::new(raw)
    }
}
