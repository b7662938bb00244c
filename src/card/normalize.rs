// Card normalizer — RawCard → CanonicalCard.
//
// Dispatch is on the outer type code; forwarded cards dispatch a second time
// on the embedded original's code. Nothing here fails: a body that won't
// decode degrades to a Default block of salvaged free text, an addon that
// won't decode is skipped. Both are logged so new upstream shapes show up.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::canonical::{
    Addon, Author, CanonicalCard, CardBody, CardKind, DefaultBlock, VoteChoice,
};
use super::model::{
    AddOnCardInfo, CardDisplay, CourseBody, GoodsCard, ImageBody, LiveBody, LiveV2Body,
    MediaBody, MusicBody, MylistBody, OriginBody, PostBody, RawCard, SketchBody, TextBody,
    UserInfo, VideoBody, VoteCard,
};
use super::{
    ADDON_GOODS, ADDON_MATCH, ADDON_RELATED, ADDON_RESERVE, ADDON_VIDEO, ADDON_VOTE, CARD_URL_BASE,
};

/// Build the canonical form of `raw`.
pub fn normalize(raw: &RawCard) -> CanonicalCard {
    let id = raw.desc.dynamic_id_str.clone();
    let outer = CardKind::from_code(raw.desc.kind);

    let mut card = CanonicalCard {
        kind: outer,
        forwarded: false,
        url: format!("{CARD_URL_BASE}{id}"),
        id,
        timestamp: raw.desc.timestamp,
        date: format_date(raw.desc.timestamp),
        author: author(&raw.desc.user_profile.info),
        origin_author: None,
        content: String::new(),
        body: CardBody::None,
        addons: Vec::new(),
    };

    match outer {
        CardKind::Forward => normalize_forward(raw, &mut card),
        CardKind::Miss => match decode::<OriginBody>(&raw.card, "miss", &card.id) {
            Some(orig) => {
                card.content = orig.item.content;
                card.body = CardBody::Miss {
                    tips: orig.item.tips,
                };
            }
            None => card.body = CardBody::Default(salvage(&raw.card)),
        },
        CardKind::Unknown(code) => {
            info!(card_id = %card.id, code, "Found unknown card type, using default block");
            card.body = CardBody::Default(salvage(&raw.card));
        }
        kind => {
            card.body = decode_body(kind, &raw.card, raw.display.as_ref(), &card.id)
                .unwrap_or_else(|| CardBody::Default(salvage(&raw.card)));
            if let CardBody::Text { content } = &card.body {
                card.content = content.clone();
            }
        }
    }

    if let Some(display) = &raw.display {
        let origin = display.origin.as_deref();
        for info in display
            .add_on_card_info
            .iter()
            .chain(origin.into_iter().flat_map(|o| o.add_on_card_info.iter()))
        {
            if let Some(addon) = normalize_addon(info, &card.id) {
                card.addons.push(addon);
            }
        }
    }

    card
}

fn normalize_forward(raw: &RawCard, card: &mut CanonicalCard) {
    card.forwarded = true;
    let Some(orig) = decode::<OriginBody>(&raw.card, "forward", &card.id) else {
        card.body = CardBody::Default(salvage(&raw.card));
        return;
    };

    card.content = orig.item.content;
    card.origin_author = Some(author(&orig.origin_user.info));

    let inner = CardKind::from_code(orig.item.orig_type);
    card.kind = inner;
    let origin_display = raw.display.as_ref().and_then(|d| d.origin.as_deref());

    card.body = match inner {
        // A forward of a forward carries no body beyond the comment.
        CardKind::Forward => CardBody::None,
        CardKind::Miss => CardBody::Miss {
            tips: orig.item.tips,
        },
        CardKind::Unknown(code) => match serde_json::from_str::<MediaBody>(&orig.origin) {
            Ok(MediaBody {
                api_season_info: Some(season),
                cover,
                new_desc,
                index,
            }) => CardBody::Default(DefaultBlock {
                type_name: season.type_name,
                title: season.title,
                desc: if new_desc.is_empty() { index } else { new_desc },
                cover_url: cover,
            }),
            _ => {
                info!(card_id = %card.id, code, "Found unknown forwarded card type, using default block");
                CardBody::Default(salvage(&orig.origin))
            }
        },
        kind => decode_body(kind, &orig.origin, origin_display, &card.id)
            .unwrap_or_else(|| CardBody::Default(salvage(&orig.origin))),
    };
}

/// Decode the type-specific body for a known, non-forward kind.
/// `None` means the body did not decode.
fn decode_body(
    kind: CardKind,
    json: &str,
    display: Option<&CardDisplay>,
    id: &str,
) -> Option<CardBody> {
    let body = match kind {
        CardKind::Image => {
            let b: ImageBody = decode(json, "image", id)?;
            CardBody::Image {
                description: b.item.description,
                image_urls: b.item.pictures.into_iter().map(|p| p.img_src).collect(),
            }
        }
        CardKind::Text => {
            let b: TextBody = decode(json, "text", id)?;
            CardBody::Text {
                content: b.item.content,
            }
        }
        CardKind::Video => {
            let b: VideoBody = decode(json, "video", id)?;
            let mut desc = b.dynamic.trim().to_string();
            if desc.is_empty() {
                desc = b.desc.trim().to_string();
            }
            if desc == b.title {
                desc.clear();
            }
            CardBody::Video {
                title: b.title,
                desc,
                cover_url: b.pic,
                action: display.map(|d| d.usr_action_txt.clone()).unwrap_or_default(),
            }
        }
        CardKind::Post => {
            let b: PostBody = decode(json, "post", id)?;
            let image_urls = if b.image_urls.is_empty() && !b.banner_url.is_empty() {
                vec![b.banner_url]
            } else {
                b.image_urls
            };
            CardBody::Post {
                title: b.title,
                summary: b.summary,
                image_urls,
            }
        }
        CardKind::Music => {
            let b: MusicBody = decode(json, "music", id)?;
            CardBody::Music {
                title: b.title,
                intro: b.intro,
                cover_url: b.cover,
                author: b.author,
            }
        }
        CardKind::Sketch => {
            let b: SketchBody = decode(json, "sketch", id)?;
            let desc_text = if b.sketch.desc_text == b.sketch.title {
                String::new()
            } else {
                b.sketch.desc_text
            };
            CardBody::Sketch {
                content: b.vest.content,
                title: b.sketch.title,
                desc_text,
                cover_url: b.sketch.cover_url,
            }
        }
        CardKind::Live => {
            let b: LiveBody = decode(json, "live", id)?;
            CardBody::Live {
                title: b.title,
                cover_url: b.cover,
            }
        }
        CardKind::LiveV2 => {
            let b: LiveV2Body = decode(json, "live_v2", id)?;
            CardBody::Live {
                title: b.live_play_info.title,
                cover_url: b.live_play_info.cover,
            }
        }
        CardKind::Mylist => {
            let b: MylistBody = decode(json, "mylist", id)?;
            CardBody::Mylist {
                title: b.title,
                cover_url: b.cover,
            }
        }
        CardKind::Course => {
            let b: CourseBody = decode(json, "course", id)?;
            CardBody::Course {
                name: b.up_info.name,
                badge: b.badge.text,
                title: b.title,
                cover_url: b.cover,
            }
        }
        CardKind::Forward | CardKind::Miss | CardKind::Unknown(_) => return None,
    };
    Some(body)
}

fn normalize_addon(info: &AddOnCardInfo, card_id: &str) -> Option<Addon> {
    match info.add_on_card_show_type {
        ADDON_GOODS => {
            let goods: GoodsCard = decode(&info.goods_card, "goods addon", card_id)?;
            let Some(item) = goods.list.into_iter().next() else {
                debug!(card_id, "Goods addon has no items");
                return None;
            };
            Some(Addon::Goods {
                ad_mark: item.ad_mark,
                name: item.name,
                image_url: item.img,
            })
        }
        ADDON_RESERVE => {
            let Some(reserve) = &info.reserve_attach_card else {
                debug!(card_id, "Reserve addon missing its block");
                return None;
            };
            Some(Addon::Reserve {
                title: reserve.title.clone(),
                desc: reserve.desc_first.text.clone(),
                lottery: reserve
                    .reserve_lottery
                    .as_ref()
                    .map(|l| l.text.clone())
                    .unwrap_or_default(),
            })
        }
        ADDON_RELATED => {
            let attach = info.attach_card.as_ref()?;
            if attach.kind == "game" {
                return None;
            }
            Some(Addon::Related {
                kind: attach.kind.clone(),
                head_text: attach.head_text.clone(),
                title: attach.title.clone(),
                desc: attach.desc_first.clone(),
            })
        }
        ADDON_VOTE => {
            let vote: VoteCard = decode(&info.vote_card, "vote addon", card_id)?;
            Some(Addon::Vote {
                choices: vote
                    .options
                    .into_iter()
                    .map(|o| VoteChoice {
                        index: o.idx,
                        desc: o.desc,
                    })
                    .collect(),
            })
        }
        ADDON_MATCH => None,
        ADDON_VIDEO => {
            let ugc = info.ugc_attach_card.as_ref()?;
            Some(Addon::Video {
                title: ugc.title.clone(),
                cover_url: ugc.image_url.clone(),
                desc: ugc.desc_second.clone(),
                play_url: ugc.play_url.clone(),
            })
        }
        other => {
            info!(card_id, addon_type = other, "Found unknown addon type, skipping");
            None
        }
    }
}

fn decode<T: DeserializeOwned>(json: &str, what: &'static str, card_id: &str) -> Option<T> {
    match serde_json::from_str(json) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(card_id, body = what, error = %e, "Failed to decode card body");
            None
        }
    }
}

/// Pull whatever free text a card body has, looking one level into `item`.
fn salvage(json: &str) -> DefaultBlock {
    let Ok(value) = serde_json::from_str::<Value>(json) else {
        return DefaultBlock::default();
    };
    let pick = |names: &[&str]| -> String {
        let scopes = [Some(&value), value.get("item")];
        scopes
            .into_iter()
            .flatten()
            .flat_map(|scope| names.iter().filter_map(move |n| scope.get(*n)))
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string()
    };
    DefaultBlock {
        type_name: String::new(),
        title: pick(&["title"]),
        desc: pick(&["desc", "description", "content", "summary"]),
        cover_url: pick(&["cover", "pic", "cover_url"]),
    }
}

fn author(info: &UserInfo) -> Author {
    Author {
        uid: info.uid,
        name: info.uname.clone(),
        face: info.face.clone(),
    }
}

fn format_date(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salvage_reads_nested_item() {
        let block = salvage(r#"{"item":{"content":"hello"},"title":"t"}"#);
        assert_eq!(block.title, "t");
        assert_eq!(block.desc, "hello");
    }

    #[test]
    fn test_salvage_of_garbage_is_empty() {
        assert_eq!(salvage("not json"), DefaultBlock::default());
    }

    #[test]
    fn test_video_desc_equal_to_title_is_dropped() {
        let json = r#"{"title":"same","dynamic":"  same  ","pic":"p"}"#;
        let body = decode_body(CardKind::Video, json, None, "1").unwrap();
        assert_eq!(
            body,
            CardBody::Video {
                title: "same".into(),
                desc: String::new(),
                cover_url: "p".into(),
                action: String::new(),
            }
        );
    }

    #[test]
    fn test_post_falls_back_to_banner() {
        let json = r#"{"title":"t","banner_url":"b.png"}"#;
        match decode_body(CardKind::Post, json, None, "1").unwrap() {
            CardBody::Post { image_urls, .. } => assert_eq!(image_urls, vec!["b.png".to_string()]),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_format_date_is_utc() {
        assert_eq!(format_date(0), "1970-01-01 00:00:00");
    }
}
