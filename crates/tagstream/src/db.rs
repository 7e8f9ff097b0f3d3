//! Unified tagstream database interface
//!
//! Bundles the durable event log, the SQLite snapshot and reservation
//! stores, blob storage for offloaded snapshots and the event writer under
//! one data directory.

use crate::blob::LocalBlobStorage;
use crate::writer::EventWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tagstream_core::{
    BlobAccessor, Clock, EventLog, ReservationStore, Result, SnapshotStore, SystemClock,
    TagReservations, TagstreamConfig,
};
use tagstream_file_log::{FileEventLog, FileEventLogConfig};
use tagstream_projector::{
    BuildContext, MultiProjector, ProjectionHost, ProjectorRegistry, SnapshotBuilder,
};
use tagstream_sqlite::{SqliteConfig, SqliteReservationStore, SqliteSnapshotStore};

/// Unified tagstream database
pub struct TagstreamDb {
    base_path: PathBuf,
    config: TagstreamConfig,
    clock: Arc<dyn Clock>,
    log: Arc<FileEventLog>,
    snapshots: Arc<SqliteSnapshotStore>,
    blobs: Arc<LocalBlobStorage>,
    writer: EventWriter,
}

impl TagstreamDb {
    /// Open a database at the given path with default configuration
    ///
    /// Creates:
    /// - `{path}/events/` - rotated event log files
    /// - `{path}/snapshots.db` - snapshot rows and tag reservations
    /// - `{path}/blobs/` - offloaded snapshot payloads
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, TagstreamConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: TagstreamConfig) -> Result<Self> {
        Self::open_with_clock(path, config, Arc::new(SystemClock))
    }

    /// Open with an explicit clock, e.g. a `ManualClock` in tests.
    pub fn open_with_clock<P: AsRef<Path>>(
        path: P,
        config: TagstreamConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;

        let log = Arc::new(FileEventLog::open(FileEventLogConfig::new(
            base_path.join("events"),
        ))?);

        let sqlite = SqliteConfig::new(base_path.join("snapshots.db"));
        let blobs = Arc::new(LocalBlobStorage::new(base_path.join("blobs")));
        let snapshots = Arc::new(
            SqliteSnapshotStore::open(&sqlite)?
                .with_blob_storage(blobs.clone() as Arc<dyn BlobAccessor>),
        );
        let reservation_store: Arc<dyn ReservationStore> =
            Arc::new(SqliteReservationStore::open(&sqlite)?);

        let reservations = TagReservations::new(
            reservation_store,
            log.clone(),
            clock.clone(),
            config.reservation.clone(),
        );

        tracing::info!(path = %base_path.display(), "opened tagstream database");
        Ok(Self {
            base_path,
            config,
            clock,
            log,
            snapshots,
            blobs,
            writer: EventWriter::new(reservations),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn config(&self) -> &TagstreamConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn log(&self) -> &Arc<FileEventLog> {
        &self.log
    }

    pub fn snapshots(&self) -> &Arc<SqliteSnapshotStore> {
        &self.snapshots
    }

    pub fn blobs(&self) -> &Arc<LocalBlobStorage> {
        &self.blobs
    }

    pub fn writer(&self) -> &EventWriter {
        &self.writer
    }

    pub fn reservations(&self) -> &TagReservations {
        self.writer.reservations()
    }

    /// Handles shared by snapshot builds.
    pub fn build_context(&self) -> BuildContext {
        BuildContext {
            log: self.log.clone() as Arc<dyn EventLog>,
            snapshots: self.snapshots.clone() as Arc<dyn SnapshotStore>,
            clock: self.clock.clone(),
        }
    }

    pub fn snapshot_builder(&self, registry: ProjectorRegistry) -> SnapshotBuilder {
        SnapshotBuilder::new(self.build_context(), registry)
    }

    /// A projection host over this database's log, woken on every append.
    pub fn host<M: MultiProjector>(&self, projector: M) -> ProjectionHost<M> {
        ProjectionHost::new(
            projector,
            self.log.clone(),
            self.clock.clone(),
            self.config.host.clone(),
        )
        .with_event_notify(self.log.event_notify())
    }

    /// Flush the event log to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }
}
