// Canonical card — one shape for every upstream card variant.
//
// The type-specific payload is a single enum, so "at most one payload block"
// holds by construction. Addons are independent and may be any number.

use std::fmt;

use serde::Serialize;

/// Upstream card type, decoded from the numeric type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardKind {
    Forward,
    Image,
    Text,
    Video,
    Post,
    Music,
    Miss,
    Sketch,
    Live,
    Mylist,
    Course,
    LiveV2,
    Unknown(i32),
}

impl CardKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            super::CODE_FORWARD => CardKind::Forward,
            super::CODE_IMAGE => CardKind::Image,
            super::CODE_TEXT => CardKind::Text,
            super::CODE_VIDEO => CardKind::Video,
            super::CODE_POST => CardKind::Post,
            super::CODE_MUSIC => CardKind::Music,
            super::CODE_MISS => CardKind::Miss,
            super::CODE_SKETCH => CardKind::Sketch,
            super::CODE_LIVE => CardKind::Live,
            super::CODE_MYLIST => CardKind::Mylist,
            super::CODE_COURSE => CardKind::Course,
            super::CODE_LIVE_V2 => CardKind::LiveV2,
            other => CardKind::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            CardKind::Forward => super::CODE_FORWARD,
            CardKind::Image => super::CODE_IMAGE,
            CardKind::Text => super::CODE_TEXT,
            CardKind::Video => super::CODE_VIDEO,
            CardKind::Post => super::CODE_POST,
            CardKind::Music => super::CODE_MUSIC,
            CardKind::Miss => super::CODE_MISS,
            CardKind::Sketch => super::CODE_SKETCH,
            CardKind::Live => super::CODE_LIVE,
            CardKind::Mylist => super::CODE_MYLIST,
            CardKind::Course => super::CODE_COURSE,
            CardKind::LiveV2 => super::CODE_LIVE_V2,
            CardKind::Unknown(code) => *code,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardKind::Forward => "forward",
            CardKind::Image => "image",
            CardKind::Text => "text",
            CardKind::Video => "video",
            CardKind::Post => "post",
            CardKind::Music => "music",
            CardKind::Miss => "miss",
            CardKind::Sketch => "sketch",
            CardKind::Live => "live",
            CardKind::Mylist => "mylist",
            CardKind::Course => "course",
            CardKind::LiveV2 => "live_v2",
            CardKind::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardKind::Unknown(code) => write!(f, "unknown({code})"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl Serialize for CardKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Author {
    pub uid: i64,
    pub name: String,
    pub face: String,
}

/// Free-text fields salvaged from a card whose shape is unknown or broken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DefaultBlock {
    pub type_name: String,
    pub title: String,
    pub desc: String,
    pub cover_url: String,
}

/// The type-specific payload of a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum CardBody {
    /// Nothing beyond the shared fields (e.g. a forward of a forward).
    None,
    Image {
        description: String,
        image_urls: Vec<String>,
    },
    Text {
        content: String,
    },
    Video {
        title: String,
        desc: String,
        cover_url: String,
        action: String,
    },
    Post {
        title: String,
        summary: String,
        image_urls: Vec<String>,
    },
    Music {
        title: String,
        intro: String,
        cover_url: String,
        author: String,
    },
    Sketch {
        content: String,
        title: String,
        desc_text: String,
        cover_url: String,
    },
    Live {
        title: String,
        cover_url: String,
    },
    Mylist {
        title: String,
        cover_url: String,
    },
    Miss {
        tips: String,
    },
    Course {
        name: String,
        badge: String,
        title: String,
        cover_url: String,
    },
    Default(DefaultBlock),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteChoice {
    pub index: i32,
    pub desc: String,
}

/// Attachment carried alongside the main payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Addon {
    Goods {
        ad_mark: String,
        name: String,
        image_url: String,
    },
    Reserve {
        title: String,
        desc: String,
        lottery: String,
    },
    Related {
        kind: String,
        head_text: String,
        title: String,
        desc: String,
    },
    Vote {
        choices: Vec<VoteChoice>,
    },
    Video {
        title: String,
        cover_url: String,
        desc: String,
        play_url: String,
    },
}

/// Normalized representation of one feed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalCard {
    /// Type of the payload. For forwarded cards, the original's type.
    pub kind: CardKind,
    pub forwarded: bool,
    pub id: String,
    pub timestamp: i64,
    pub date: String,
    pub url: String,
    pub author: Author,
    /// Author of the original, for forwarded cards.
    pub origin_author: Option<Author>,
    /// Text of the outer card: the forward comment, or the post text.
    pub content: String,
    pub body: CardBody,
    pub addons: Vec<Addon>,
}

impl CanonicalCard {
    /// All human-readable text on the card, for keyword filtering.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = vec![&self.content];
        match &self.body {
            CardBody::None => {}
            CardBody::Image { description, .. } => parts.push(description),
            CardBody::Text { content } => parts.push(content),
            CardBody::Video { title, desc, .. } => parts.extend([title.as_str(), desc]),
            CardBody::Post { title, summary, .. } => parts.extend([title.as_str(), summary]),
            CardBody::Music { title, intro, .. } => parts.extend([title.as_str(), intro]),
            CardBody::Sketch {
                content,
                title,
                desc_text,
                ..
            } => parts.extend([content.as_str(), title, desc_text]),
            CardBody::Live { title, .. } | CardBody::Mylist { title, .. } => parts.push(title),
            CardBody::Miss { tips } => parts.push(tips),
            CardBody::Course { name, title, .. } => parts.extend([name.as_str(), title]),
            CardBody::Default(block) => parts.extend([block.title.as_str(), &block.desc]),
        }
        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The headline of the payload, if it has one.
    pub fn title(&self) -> Option<&str> {
        let title = match &self.body {
            CardBody::Video { title, .. }
            | CardBody::Post { title, .. }
            | CardBody::Music { title, .. }
            | CardBody::Sketch { title, .. }
            | CardBody::Live { title, .. }
            | CardBody::Mylist { title, .. }
            | CardBody::Course { title, .. } => title.as_str(),
            CardBody::Default(block) => block.title.as_str(),
            _ => "",
        };
        (!title.is_empty()).then_some(title)
    }
}
