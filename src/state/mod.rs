// Per-target state — typed storage, snapshots and change detection.

pub mod manager;
pub mod snapshot;
pub mod store;

/// Chat group identifier.
pub type GroupId = i64;

pub use manager::{
    Change, ConcernKind, ConcernState, ConcernStateManager, DiffOutcome, DiffPolicy,
    GroupConcernConfig, Subscription,
};
pub use snapshot::{ContentId, ContentItem, ItemPayload, LiveStatus, Observation, Snapshot, Target};
pub use store::{SetOpts, StateStore, StoreError};
