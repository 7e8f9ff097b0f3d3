//! Tagstream Projector: windowed multi-projections over the event log
//!
//! Features:
//! - Safe/unsafe dual state: stable results below a caller-supplied
//!   threshold, low-latency results including recent events
//! - Duplicate and out-of-order tolerance through per-key idempotence
//! - Snapshot codec with per-entry type names, zstd compression and
//!   version-gated reuse
//! - Projection host with pull, push and continuous modes
//! - Snapshot builder with a projector registry

pub mod builder;
pub mod builtin;
pub mod host;
pub mod multi_projector;
pub mod safe_unsafe;
pub mod snapshot;
pub mod state;
pub mod tag_projection;

pub use builder::{
    decide, events_since_snapshot, BuildContext, BuildDecision, BuildOptions, BuildResult, BuildStatus,
    ProjectorDescriptor, ProjectorRegistry, RegisteredProjector, SnapshotBuilder,
};
pub use builtin::{EventTypeCountProjector, TagCatalogProjector, TagSummary};
pub use host::{FailedEvent, HostStats, ProjectionHost};
pub use multi_projector::{MultiProjection, MultiProjector, ProjectionView};
pub use safe_unsafe::{ApplyOutcome, SafeFrame, SafeUnsafeProjectionState};
pub use snapshot::{
    deserialize, load_snapshot, serialize, write_snapshot, BuildOrigin, SerializedSnapshot,
};
pub use state::MultiProjectionState;
pub use tag_projection::TagMultiProjector;
