// Notify — from detected change to delivered chat message.

pub mod callback;
pub mod compact;
pub mod dispatch;
pub mod event;
pub mod pipeline;
pub mod render;

pub use callback::{CallbackChain, DefaultCallback, NotifyCallback};
pub use compact::{condensed, Compactor};
pub use dispatch::{DeliveryError, DeliveryReceipt, Dispatcher};
pub use event::{ContentSource, LiveNotice, NotificationEvent, NotifyContent, NotifyKind, PostNotice};
pub use pipeline::{Notifier, NotifyPipeline, PipelineClosed, PipelineStats};
pub use render::{Element, Message, RenderError, Renderer, TextRenderer};
