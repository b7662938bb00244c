// Rendering — notification content → chat message.
//
// The real template engine lives outside this crate behind the Renderer
// trait. TextRenderer is the built-in plain-text rendering.

use std::fmt::Write as _;

use super::event::{ContentSource, NotifyContent, NotifyKind};
use crate::card::{Addon, CanonicalCard, CardBody};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Text(String),
    Image(String),
}

/// A renderable chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Message id this one replies to.
    pub reply_to: Option<String>,
    pub at_all: bool,
    pub elements: Vec<Element>,
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            elements: vec![Element::Text(text.into())],
            ..Default::default()
        }
    }

    pub fn reply(to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            reply_to: Some(to.into()),
            ..Self::text(text)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.iter().all(|e| match e {
            Element::Text(t) => t.trim().is_empty(),
            Element::Image(url) => url.is_empty(),
        })
    }

    /// The text elements joined, for logging and tests.
    pub fn plain_text(&self) -> String {
        self.elements
            .iter()
            .filter_map(|e| match e {
                Element::Text(t) => Some(t.as_str()),
                Element::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("nothing to render for {0}")]
    Empty(String),

    #[error("render failed: {0}")]
    Failed(String),
}

pub trait Renderer: Send + Sync {
    fn render(&self, content: &NotifyContent) -> Result<Message, RenderError>;
}

/// Plain text with images appended as image elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn render(&self, content: &NotifyContent) -> Result<Message, RenderError> {
        let mut text = String::new();
        let mut images = Vec::new();

        match content.source() {
            ContentSource::Live(n) => {
                let _ = match n.kind {
                    NotifyKind::TitleChanged => {
                        writeln!(text, "{} changed the stream title\n{}", n.name, n.title)
                    }
                    NotifyKind::LiveEnded => writeln!(text, "{} has gone offline", n.name),
                    _ => writeln!(text, "{} is live now\n{}", n.name, n.title),
                };
                if n.kind != NotifyKind::LiveEnded {
                    push_line(&mut text, &n.url);
                    push_image(&mut images, &n.cover);
                }
            }
            ContentSource::Card(card) => render_card(card.canonical(), &mut text, &mut images),
            ContentSource::Post(p) => {
                let _ = writeln!(text, "{} posted", p.author);
                push_line(&mut text, &p.title);
                push_line(&mut text, &p.text);
                push_line(&mut text, &p.url);
            }
        }

        let mut message = Message::text(text.trim_end());
        message.elements.extend(images.into_iter().map(Element::Image));
        if message.is_empty() {
            return Err(RenderError::Empty(describe(content)));
        }
        Ok(message)
    }
}

fn render_card(card: &CanonicalCard, text: &mut String, images: &mut Vec<String>) {
    let verb = if card.forwarded { "shared" } else { "posted" };
    let _ = writeln!(text, "{} {} at {}", card.author.name, verb, card.date);
    push_line(text, &card.content);

    if let Some(origin) = &card.origin_author {
        if !origin.name.is_empty() {
            let _ = writeln!(text, "// @{}:", origin.name);
        }
    }

    match &card.body {
        CardBody::None => {}
        CardBody::Image {
            description,
            image_urls,
        } => {
            push_line(text, description);
            images.extend(image_urls.iter().filter(|u| !u.is_empty()).cloned());
        }
        CardBody::Text { content } => {
            if content != &card.content {
                push_line(text, content);
            }
        }
        CardBody::Video {
            title,
            desc,
            cover_url,
            action,
        } => {
            push_line(text, action);
            push_line(text, title);
            push_line(text, desc);
            push_image(images, cover_url);
        }
        CardBody::Post {
            title,
            summary,
            image_urls,
        } => {
            push_line(text, title);
            push_line(text, summary);
            images.extend(image_urls.iter().take(1).cloned());
        }
        CardBody::Music {
            title,
            intro,
            cover_url,
            author,
        } => {
            let _ = writeln!(text, "{title} - {author}");
            push_line(text, intro);
            push_image(images, cover_url);
        }
        CardBody::Sketch {
            content,
            title,
            desc_text,
            cover_url,
        } => {
            push_line(text, content);
            push_line(text, title);
            push_line(text, desc_text);
            push_image(images, cover_url);
        }
        CardBody::Live { title, cover_url } | CardBody::Mylist { title, cover_url } => {
            push_line(text, title);
            push_image(images, cover_url);
        }
        CardBody::Miss { tips } => push_line(text, tips),
        CardBody::Course {
            name,
            badge,
            title,
            cover_url,
        } => {
            let _ = writeln!(text, "[{badge}] {name}");
            push_line(text, title);
            push_image(images, cover_url);
        }
        CardBody::Default(block) => {
            if !block.type_name.is_empty() {
                let _ = writeln!(text, "[{}]", block.type_name);
            }
            push_line(text, &block.title);
            push_line(text, &block.desc);
            push_image(images, &block.cover_url);
        }
    }

    for addon in &card.addons {
        match addon {
            Addon::Goods { name, ad_mark, .. } => {
                let _ = writeln!(text, "[{ad_mark}] {name}");
            }
            Addon::Reserve {
                title,
                desc,
                lottery,
            } => {
                let _ = writeln!(text, "Reservation: {title} {desc}");
                push_line(text, lottery);
            }
            Addon::Related {
                head_text, title, ..
            } => {
                let _ = writeln!(text, "{head_text}: {title}");
            }
            Addon::Vote { choices } => {
                let _ = writeln!(text, "Vote:");
                for choice in choices {
                    let _ = writeln!(text, "{}. {}", choice.index, choice.desc);
                }
            }
            Addon::Video { title, play_url, .. } => {
                let _ = writeln!(text, "Video: {title} {play_url}");
            }
        }
    }

    push_line(text, &card.url);
}

fn push_line(text: &mut String, line: &str) {
    if !line.trim().is_empty() {
        text.push_str(line.trim_end());
        text.push('\n');
    }
}

fn push_image(images: &mut Vec<String>, url: &str) {
    if !url.is_empty() {
        images.push(url.to_string());
    }
}

fn describe(content: &NotifyContent) -> String {
    match content.source() {
        ContentSource::Live(n) => format!("live notice for {}", n.name),
        ContentSource::Card(c) => format!("card {}", c.id()),
        ContentSource::Post(p) => format!("post {}", p.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CacheCard, RawCard};
    use crate::notify::event::LiveNotice;
    use crate::state::LiveStatus;

    #[test]
    fn test_live_notice_renders_title_and_cover() {
        let content = NotifyContent::live(LiveNotice {
            kind: NotifyKind::WentLive,
            name: "streamer".into(),
            status: LiveStatus::Living,
            title: "T".into(),
            url: "https://live.example/1".into(),
            cover: "cover.jpg".into(),
            observed_at: chrono::Utc::now(),
        });
        let message = TextRenderer.render(&content).unwrap();
        assert!(message.plain_text().contains("streamer is live now\nT"));
        assert_eq!(message.elements.last(), Some(&Element::Image("cover.jpg".into())));
    }

    #[test]
    fn test_render_is_memoized() {
        let content = NotifyContent::card(CacheCard::new(RawCard::default()));
        assert!(!content.is_rendered());
        let first = content.rendered(&TextRenderer);
        let second = content.rendered(&TextRenderer);
        assert!(content.is_rendered());
        assert_eq!(first, second);
    }
}
