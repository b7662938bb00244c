// Notification events — what the pollers hand to the dispatcher.
//
// One change on one target fans out into one event per interested group.
// The events share their content through an Arc, and the content memoizes
// its render, so N groups cost one render.

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};

use super::render::{Message, RenderError, Renderer};
use crate::card::CacheCard;
use crate::state::{ContentId, GroupId, LiveStatus, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyKind {
    WentLive,
    LiveEnded,
    TitleChanged,
    NewContent,
}

impl NotifyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyKind::WentLive => "went_live",
            NotifyKind::LiveEnded => "live_ended",
            NotifyKind::TitleChanged => "title_changed",
            NotifyKind::NewContent => "new_content",
        }
    }
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live-status change, captured from the new snapshot.
#[derive(Debug, Clone)]
pub struct LiveNotice {
    pub kind: NotifyKind,
    pub name: String,
    pub status: LiveStatus,
    pub title: String,
    pub url: String,
    pub cover: String,
    pub observed_at: DateTime<Utc>,
}

/// A plain feed post from a site without cards.
#[derive(Debug, Clone)]
pub struct PostNotice {
    pub id: ContentId,
    pub author: String,
    pub title: String,
    pub text: String,
    pub url: String,
    pub timestamp: i64,
}

#[derive(Debug)]
pub enum ContentSource {
    Live(LiveNotice),
    Card(CacheCard),
    Post(PostNotice),
}

/// The thing a notification is about, plus its memoized render.
#[derive(Debug)]
pub struct NotifyContent {
    source: ContentSource,
    rendered: OnceLock<Result<Message, RenderError>>,
}

impl NotifyContent {
    pub fn new(source: ContentSource) -> Self {
        Self {
            source,
            rendered: OnceLock::new(),
        }
    }

    pub fn live(notice: LiveNotice) -> Arc<Self> {
        Arc::new(Self::new(ContentSource::Live(notice)))
    }

    pub fn card(card: CacheCard) -> Arc<Self> {
        Arc::new(Self::new(ContentSource::Card(card)))
    }

    pub fn post(notice: PostNotice) -> Arc<Self> {
        Arc::new(Self::new(ContentSource::Post(notice)))
    }

    pub fn source(&self) -> &ContentSource {
        &self.source
    }

    /// Searchable text, for keyword filters.
    pub fn text(&self) -> String {
        match &self.source {
            ContentSource::Live(n) => format!("{}\n{}", n.name, n.title),
            ContentSource::Card(c) => c.canonical().text(),
            ContentSource::Post(p) => format!("{}\n{}", p.title, p.text),
        }
    }

    /// Render once with `renderer`; later calls return the same outcome.
    pub fn rendered(&self, renderer: &dyn Renderer) -> Result<Message, RenderError> {
        self.rendered
            .get_or_init(|| renderer.render(self))
            .clone()
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered.get().is_some()
    }
}

/// One delivery to one group.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub group: GroupId,
    pub target: Target,
    pub kind: NotifyKind,
    pub content: Arc<NotifyContent>,
    /// Set on a live event whose title differs from the previous poll.
    pub title_changed: bool,
    /// Events sharing a key collapse into one reply chain.
    pub compact_key: Option<String>,
    pub at_all: bool,
}
