//! Tagstream Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use tagstream::prelude::*;
//! ```

// Core types
pub use crate::{
    Event, PendingEvent, Result, SortableUniqueId, Tag, TagState, TagstreamDb, TagstreamError,
    TypedPayload,
};

// Configs
pub use crate::{
    ErrorPolicy, ProjectionHostConfig, ReservationConfig, SnapshotConfig, TagstreamConfig,
};

// Traits
pub use crate::{
    BlobAccessor, Clock, EventLog, MultiProjector, ReservationStore, SnapshotStore, TagProjector,
};

// Writing
pub use crate::{load_tag_state, ConsistencyCheck, EventWriter};

// Projections and snapshots
pub use crate::{
    BuildOptions, BuildStatus, EventTypeCountProjector, ProjectionHost, ProjectorRegistry,
    SnapshotBuilder, TagCatalogProjector,
};
