// Card normalizer tests — type dispatch, forwarded origins, degradation.

use serde_json::json;

use watchpost::card::{normalize, Addon, CacheCard, CardBody, CardKind, RawCard};

fn raw(kind: i32, id: &str, body: serde_json::Value, display: serde_json::Value) -> RawCard {
    serde_json::from_value(json!({
        "desc": {
            "type": kind,
            "dynamic_id_str": id,
            "timestamp": 1_700_000_000,
            "user_profile": { "info": { "uid": 42, "uname": "alice", "face": "face.png" } }
        },
        "card": body.to_string(),
        "display": display,
    }))
    .unwrap()
}

fn vote_addon() -> serde_json::Value {
    json!({
        "add_on_card_show_type": 3,
        "vote_card": json!({ "options": [ { "idx": 1, "desc": "yes" }, { "idx": 2, "desc": "no" } ] }).to_string()
    })
}

// ============================================================
// Main payload
// ============================================================

#[test]
fn image_card_has_shared_fields_and_image_block() {
    let card = normalize(&raw(
        2,
        "100",
        json!({ "item": { "description": "look", "pictures": [ { "img_src": "a.jpg" }, { "img_src": "b.jpg" } ] } }),
        json!(null),
    ));
    assert_eq!(card.kind, CardKind::Image);
    assert!(!card.forwarded);
    assert_eq!(card.id, "100");
    assert_eq!(card.author.name, "alice");
    assert_eq!(card.date, "2023-11-14 22:13:20");
    assert_eq!(card.url, "https://www.bilibili.com/opus/100");
    assert_eq!(
        card.body,
        CardBody::Image {
            description: "look".into(),
            image_urls: vec!["a.jpg".into(), "b.jpg".into()],
        }
    );
}

#[test]
fn video_card_uses_display_action() {
    let card = normalize(&raw(
        8,
        "101",
        json!({ "title": "My video", "desc": "about it", "dynamic": "", "pic": "cover.jpg" }),
        json!({ "usr_action_txt": "uploaded a video" }),
    ));
    assert_eq!(
        card.body,
        CardBody::Video {
            title: "My video".into(),
            desc: "about it".into(),
            cover_url: "cover.jpg".into(),
            action: "uploaded a video".into(),
        }
    );
}

#[test]
fn live_v2_maps_onto_live_block() {
    let card = normalize(&raw(
        4308,
        "102",
        json!({ "live_play_info": { "title": "stream", "cover": "c.jpg" } }),
        json!(null),
    ));
    assert_eq!(card.kind, CardKind::LiveV2);
    assert_eq!(
        card.body,
        CardBody::Live {
            title: "stream".into(),
            cover_url: "c.jpg".into(),
        }
    );
}

// ============================================================
// Unknown and broken payloads
// ============================================================

#[test]
fn unknown_type_degrades_to_default_and_keeps_addons() {
    let card = normalize(&raw(
        9999,
        "103",
        json!({ "title": "mystery", "item": { "content": "some text" } }),
        json!({
            "add_on_card_info": [
                vote_addon(),
                { "add_on_card_show_type": 6, "reserve_attach_card": { "title": "launch", "desc_first": { "text": "Friday" } } }
            ]
        }),
    ));

    assert_eq!(card.kind, CardKind::Unknown(9999));
    match &card.body {
        CardBody::Default(block) => {
            assert_eq!(block.title, "mystery");
            assert_eq!(block.desc, "some text");
        }
        other => panic!("expected default block, got {other:?}"),
    }
    assert_eq!(card.addons.len(), 2);
    assert!(matches!(card.addons[0], Addon::Vote { ref choices } if choices.len() == 2));
    assert!(matches!(card.addons[1], Addon::Reserve { ref title, .. } if title == "launch"));
}

#[test]
fn undecodable_body_degrades_to_default() {
    let mut bad = raw(2, "104", json!({}), json!(null));
    bad.card = "{ this is not json".into();
    let card = normalize(&bad);
    assert_eq!(card.kind, CardKind::Image);
    assert!(matches!(card.body, CardBody::Default(_)));
}

#[test]
fn broken_addon_is_skipped_others_continue() {
    let card = normalize(&raw(
        4,
        "105",
        json!({ "item": { "content": "hello" } }),
        json!({
            "add_on_card_info": [
                { "add_on_card_show_type": 3, "vote_card": "garbage" },
                { "add_on_card_show_type": 4 },
                { "add_on_card_show_type": 2, "attach_card": { "type": "game", "title": "ignored" } },
                { "add_on_card_show_type": 77 },
                { "add_on_card_show_type": 1, "goods_card": json!({ "list": [ { "adMark": "ad", "name": "mug", "img": "m.jpg" } ] }).to_string() },
                { "add_on_card_show_type": 5, "ugc_attach_card": { "title": "clip", "play_url": "p" } }
            ]
        }),
    ));
    assert_eq!(card.content, "hello");
    assert_eq!(
        card.addons,
        vec![
            Addon::Goods {
                ad_mark: "ad".into(),
                name: "mug".into(),
                image_url: "m.jpg".into(),
            },
            Addon::Video {
                title: "clip".into(),
                cover_url: String::new(),
                desc: String::new(),
                play_url: "p".into(),
            },
        ]
    );
}

// ============================================================
// Forwarded cards
// ============================================================

fn forward(inner_type: i32, origin: serde_json::Value) -> RawCard {
    let mut card = raw(
        1,
        "200",
        json!({
            "item": { "content": "look at this", "orig_type": inner_type },
            "origin": origin.to_string(),
            "origin_user": { "info": { "uid": 7, "uname": "bob" } }
        }),
        json!({ "origin": { "add_on_card_info": [ vote_addon() ] } }),
    );
    card.desc.orig_dy_id_str = "123".into();
    card
}

#[test]
fn forwarded_card_resolves_inner_type() {
    let card = normalize(&forward(
        64,
        json!({ "title": "Article", "summary": "sum", "banner_url": "banner.jpg" }),
    ));
    assert!(card.forwarded);
    assert_eq!(card.kind, CardKind::Post);
    assert_eq!(card.content, "look at this");
    assert_eq!(card.author.name, "alice");
    assert_eq!(card.origin_author.as_ref().map(|a| a.name.as_str()), Some("bob"));
    assert_eq!(
        card.body,
        CardBody::Post {
            title: "Article".into(),
            summary: "sum".into(),
            image_urls: vec!["banner.jpg".into()],
        }
    );
    // Addons from the origin's display come through
    assert_eq!(card.addons.len(), 1);
}

#[test]
fn forwarded_unknown_type_tries_media_shape() {
    let card = normalize(&forward(
        512,
        json!({ "apiSeasonInfo": { "type_name": "Anime", "title": "Show" }, "cover": "s.jpg", "index": "EP3" }),
    ));
    match card.body {
        CardBody::Default(block) => {
            assert_eq!(block.type_name, "Anime");
            assert_eq!(block.title, "Show");
            assert_eq!(block.desc, "EP3");
            assert_eq!(block.cover_url, "s.jpg");
        }
        other => panic!("expected default block, got {other:?}"),
    }
}

#[test]
fn forward_of_forward_has_no_inner_body() {
    let card = normalize(&forward(1, json!({})));
    assert!(card.forwarded);
    assert_eq!(card.body, CardBody::None);
}

#[test]
fn compaction_keys_follow_card_type() {
    assert_eq!(forward(2, json!({})).compaction_key().as_deref(), Some("dyn:123"));

    let mut video = raw(8, "300", json!({}), json!(null));
    video.desc.bvid = "BV1xx".into();
    assert_eq!(video.compaction_key().as_deref(), Some("video:BV1xx"));

    assert_eq!(raw(2, "301", json!({}), json!(null)).compaction_key(), None);
}

// ============================================================
// Memoization
// ============================================================

#[test]
fn cache_card_normalizes_lazily_once() {
    let card = CacheCard::new(raw(4, "400", json!({ "item": { "content": "hi" } }), json!(null)));
    assert!(!card.is_normalized());
    let first: *const _ = card.canonical();
    let second: *const _ = card.canonical();
    assert!(card.is_normalized());
    assert_eq!(first, second);
    assert_eq!(card.canonical().content, "hi");
}
