// Upstream feed-card payloads, as delivered by the feed endpoint.
//
// A card is an outer descriptor (type code, ids, author) plus the
// type-specific body as a JSON-encoded string, plus an optional display
// block carrying addon cards. Forwarded cards embed the original card's body
// as yet another JSON string. Every field defaults so partial payloads still
// decode; the normalizer decides what is missing.

use serde::{Deserialize, Serialize};

/// One feed item as delivered upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCard {
    pub desc: CardDesc,
    /// JSON-encoded body; its shape depends on `desc.kind`.
    pub card: String,
    pub display: Option<CardDisplay>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CardDesc {
    #[serde(rename = "type")]
    pub kind: i32,
    pub dynamic_id_str: String,
    /// Id of the original card, for forwarded cards.
    pub orig_dy_id_str: String,
    pub timestamp: i64,
    /// Video id, for video cards.
    pub bvid: String,
    pub user_profile: UserProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub info: UserInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    pub uid: i64,
    pub uname: String,
    pub face: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CardDisplay {
    pub usr_action_txt: String,
    pub add_on_card_info: Vec<AddOnCardInfo>,
    /// Display block of the original card, for forwarded cards.
    pub origin: Option<Box<CardDisplay>>,
}

/// One addon attached to a card. Only the block matching the show type is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddOnCardInfo {
    pub add_on_card_show_type: i32,
    /// JSON-encoded goods list.
    pub goods_card: String,
    pub reserve_attach_card: Option<ReserveAttachCard>,
    pub attach_card: Option<AttachCard>,
    /// JSON-encoded vote card.
    pub vote_card: String,
    pub ugc_attach_card: Option<UgcAttachCard>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReserveAttachCard {
    pub title: String,
    pub desc_first: TextBlock,
    pub reserve_lottery: Option<TextBlock>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextBlock {
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachCard {
    #[serde(rename = "type")]
    pub kind: String,
    pub head_text: String,
    pub title: String,
    pub desc_first: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UgcAttachCard {
    pub title: String,
    pub image_url: String,
    pub desc_second: String,
    pub play_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoodsCard {
    pub list: Vec<GoodsItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoodsItem {
    #[serde(rename = "adMark")]
    pub ad_mark: String,
    pub name: String,
    pub img: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteCard {
    pub options: Vec<VoteOption>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VoteOption {
    pub idx: i32,
    pub desc: String,
}

// --- Type-specific bodies (decoded from `RawCard::card`) ---

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImageBody {
    pub item: ImageItem,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImageItem {
    pub description: String,
    pub pictures: Vec<Picture>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Picture {
    pub img_src: String,
    pub img_width: i64,
    pub img_height: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TextBody {
    pub item: TextItem,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TextItem {
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VideoBody {
    pub title: String,
    pub desc: String,
    pub dynamic: String,
    pub pic: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostBody {
    pub title: String,
    pub summary: String,
    pub image_urls: Vec<String>,
    pub banner_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MusicBody {
    pub title: String,
    pub intro: String,
    pub cover: String,
    pub author: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SketchBody {
    pub vest: TextItem,
    pub sketch: SketchInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SketchInfo {
    pub title: String,
    pub desc_text: String,
    pub cover_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LiveBody {
    pub title: String,
    pub cover: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LiveV2Body {
    pub live_play_info: LiveBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MylistBody {
    pub title: String,
    pub cover: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CourseBody {
    pub title: String,
    pub cover: String,
    pub badge: TextBlock,
    pub up_info: CourseUpInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CourseUpInfo {
    pub name: String,
}

/// Season/media card; the fallback shape tried for unknown forwarded types.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaBody {
    #[serde(rename = "apiSeasonInfo")]
    pub api_season_info: Option<SeasonInfo>,
    pub cover: String,
    pub new_desc: String,
    pub index: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeasonInfo {
    pub type_name: String,
    pub title: String,
}

/// Body of a forwarded card: the forwarder's comment plus the original,
/// itself a JSON-encoded body of type `item.orig_type`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OriginBody {
    pub item: OriginItem,
    pub origin: String,
    pub origin_user: UserProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OriginItem {
    pub content: String,
    pub orig_type: i32,
    pub tips: String,
}

impl RawCard {
    /// Grouping key under which co-authored and forwarded copies of the
    /// same underlying item collapse into one message.
    pub fn compaction_key(&self) -> Option<String> {
        match self.desc.kind {
            super::CODE_FORWARD if !self.desc.orig_dy_id_str.is_empty() => {
                Some(format!("dyn:{}", self.desc.orig_dy_id_str))
            }
            super::CODE_VIDEO if !self.desc.bvid.is_empty() => {
                Some(format!("video:{}", self.desc.bvid))
            }
            _ => None,
        }
    }
}
