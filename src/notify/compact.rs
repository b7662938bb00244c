// Compaction — collapse notifications about the same underlying item.
//
// When several watched authors repost or co-publish one item, each group
// gets the first copy in full. Later copies inside the window go out as a
// one-line reply to that first message. The first message's id is kept in
// the state store under (group, compaction key) and expires with the window.

use std::sync::Arc;
use std::time::Duration;

use super::event::{ContentSource, NotifyContent};
use crate::db::KvStore;
use crate::keys::{KeyCodec, KeyId, KeyKind, TargetIdKind};
use crate::state::{GroupId, SetOpts, StateStore, StoreError};

const NOTIFY_MSG: KeyKind = KeyKind::Extra("notify_msg");
const SUMMARY_CHARS: usize = 60;

#[derive(Clone)]
pub struct Compactor {
    kv: Arc<dyn KvStore>,
    window: Duration,
}

impl Compactor {
    pub fn new(kv: Arc<dyn KvStore>, window: Duration) -> Self {
        Self { kv, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn store(&self, site: &str) -> StateStore {
        StateStore::new(self.kv.clone(), KeyCodec::new(site, TargetIdKind::Str))
    }

    /// Message id already delivered to `group` for `key`, if still in the window.
    pub async fn previous(
        &self,
        site: &str,
        group: GroupId,
        key: &str,
    ) -> Result<Option<String>, StoreError> {
        match self
            .store(site)
            .get_json::<String>(NOTIFY_MSG, &ids(group, key))
            .await
        {
            Ok(id) => Ok(Some(id)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remember the full delivery for `key`. The first record in a window wins.
    pub async fn record(
        &self,
        site: &str,
        group: GroupId,
        key: &str,
        message_id: &str,
    ) -> Result<(), StoreError> {
        let opts = SetOpts::expire(self.window).no_overwrite();
        match self
            .store(site)
            .set_json(NOTIFY_MSG, &ids(group, key), message_id, opts)
            .await
        {
            Ok(()) | Err(StoreError::Exists { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn ids(group: GroupId, key: &str) -> [KeyId; 2] {
    [KeyId::Int(group), KeyId::Str(key.to_string())]
}

/// Short text for a compacted copy: a headline, then the date, the title
/// when there is one, and the copy's own link.
pub fn condensed(content: &NotifyContent) -> String {
    match content.source() {
        ContentSource::Card(card) => {
            let card = card.canonical();
            let headline = if card.forwarded {
                let mut line = format!("{} also shared this", card.author.name);
                if let Some(origin) = card.origin_author.as_ref().filter(|a| !a.name.is_empty()) {
                    line.push_str(&format!(" from {}", origin.name));
                }
                let comment = truncate(card.content.lines().next().unwrap_or_default());
                if !comment.is_empty() {
                    line.push_str(&format!(": {comment}"));
                }
                line
            } else {
                format!("{} also posted this", card.author.name)
            };
            let title = card.title().map(truncate).unwrap_or_default();
            join_lines([headline, card.date.clone(), title, card.url.clone()])
        }
        ContentSource::Live(n) => format!("{}: {}", n.name, truncate(&n.title)),
        ContentSource::Post(p) => join_lines([
            format!("{} also posted this", p.author),
            truncate(&p.title),
            p.url.clone(),
        ]),
    }
}

fn join_lines<const N: usize>(lines: [String; N]) -> String {
    lines
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(s: &str) -> String {
    let s = s.trim();
    match s.char_indices().nth(SUMMARY_CHARS) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryKvStore;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "动".repeat(SUMMARY_CHARS + 5);
        let short = truncate(&long);
        assert_eq!(short.chars().count(), SUMMARY_CHARS + 1);
        assert!(short.ends_with('…'));
    }

    #[tokio::test]
    async fn test_first_record_wins() {
        let compactor = Compactor::new(Arc::new(MemoryKvStore::new()), Duration::from_secs(60));
        assert_eq!(compactor.previous("bili", 1, "dyn:1").await.unwrap(), None);
        compactor.record("bili", 1, "dyn:1", "m1").await.unwrap();
        compactor.record("bili", 1, "dyn:1", "m2").await.unwrap();
        assert_eq!(
            compactor.previous("bili", 1, "dyn:1").await.unwrap(),
            Some("m1".to_string())
        );
        assert_eq!(compactor.previous("bili", 2, "dyn:1").await.unwrap(), None);
    }

    fn card(json: serde_json::Value) -> Arc<NotifyContent> {
        let raw: crate::card::RawCard = serde_json::from_value(json).unwrap();
        NotifyContent::card(crate::card::CacheCard::new(raw))
    }

    #[test]
    fn test_condensed_video_keeps_title_and_link() {
        let content = card(serde_json::json!({
            "desc": {
                "type": 8,
                "dynamic_id_str": "77",
                "bvid": "BV1xx",
                "timestamp": 1_700_000_000,
                "user_profile": { "info": { "uid": 2, "uname": "bob" } }
            },
            "card": serde_json::json!({ "title": "Joint upload", "desc": "", "dynamic": "", "pic": "" }).to_string()
        }));
        assert_eq!(
            condensed(&content),
            "bob also posted this\n2023-11-14 22:13:20\nJoint upload\nhttps://www.bilibili.com/opus/77"
        );
    }

    #[test]
    fn test_condensed_forward_names_origin_author() {
        let content = card(serde_json::json!({
            "desc": {
                "type": 1,
                "dynamic_id_str": "78",
                "orig_dy_id_str": "5",
                "timestamp": 1_700_000_000,
                "user_profile": { "info": { "uid": 2, "uname": "bob" } }
            },
            "card": serde_json::json!({
                "item": { "content": "nice", "orig_type": 4 },
                "origin": serde_json::json!({ "item": { "content": "hello" } }).to_string(),
                "origin_user": { "info": { "uid": 1, "uname": "alice" } }
            }).to_string()
        }));
        let text = condensed(&content);
        assert!(text.starts_with("bob also shared this from alice: nice\n"));
        assert!(text.ends_with("https://www.bilibili.com/opus/78"));
    }
}
