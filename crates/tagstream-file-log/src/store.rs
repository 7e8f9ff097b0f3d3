use crate::index::{Location, LogIndex};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tagstream_core::{
    observe, Event, EventLog, EventLogIterator, EventLogStats, Result, SortableUniqueId, Tag,
    TagWriteOutcome, TagstreamError, ValidationError,
};
use tokio::sync::Notify;

/// Frame header: [seq: u64 BE][len: u32 BE]
const HEADER_LEN: u64 = 12;

/// Configuration for file-based event log
#[derive(Debug, Clone)]
pub struct FileEventLogConfig {
    /// Base directory for segment files
    pub base_dir: PathBuf,

    /// Maximum size of a single segment before rotation (bytes)
    pub max_file_size: u64,

    /// Buffer size for writes
    pub write_buffer_size: usize,

    /// Maximum size of a single serialized event (bytes)
    pub max_event_size: usize,

    /// Maximum total size for a single append batch (bytes)
    pub max_batch_bytes: usize,

    /// Whether to flush the write buffer after each append (default: true).
    ///
    /// With `false`, events buffered at a process crash are lost; the
    /// segment itself is repaired on the next open.
    pub flush_on_append: bool,
}

impl Default for FileEventLogConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data/events"),
            max_file_size: 512 * 1024 * 1024,  // 512MB
            write_buffer_size: 256 * 1024,     // 256KB
            max_event_size: 4 * 1024 * 1024,   // 4MB single-event limit
            max_batch_bytes: 64 * 1024 * 1024, // 64MB batch limit
            flush_on_append: true,
        }
    }
}

impl FileEventLogConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }
}

/// Metadata stored in meta.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct EventLogMeta {
    /// Next frame sequence number
    next_seq: u64,

    /// Current active segment number
    current_file_num: u64,
}

struct Segments {
    meta: EventLogMeta,
    writer: BufWriter<File>,
    /// Bytes in the active segment, including buffered ones.
    current_len: u64,
    index: LogIndex,
}

/// File-based event log
pub struct FileEventLog {
    config: FileEventLogConfig,
    inner: Mutex<Segments>,
    notify: Arc<Notify>,
}

impl FileEventLog {
    /// Open or create a file-based event log, rebuilding the index from disk.
    pub fn open(config: FileEventLogConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.base_dir)?;

        let meta_path = config.base_dir.join("meta.json");
        let mut meta: EventLogMeta = if meta_path.exists() {
            let data = std::fs::read_to_string(&meta_path)?;
            serde_json::from_str(&data).map_err(|e| {
                TagstreamError::Storage(format!("Failed to parse meta.json: {}", e))
            })?
        } else {
            EventLogMeta::default()
        };

        let mut index = LogIndex::default();
        let mut file_num = 0;
        loop {
            let path = Self::log_file_path(&config.base_dir, file_num);
            if !path.exists() {
                if file_num >= meta.current_file_num {
                    break;
                }
                file_num += 1;
                continue;
            }
            // Segments past the recorded one exist when meta.json was not
            // saved after a rotation.
            meta.current_file_num = meta.current_file_num.max(file_num);
            let last_seq = Self::scan_segment(&path, file_num, config.max_event_size, &mut index)?;
            if let Some(seq) = last_seq {
                meta.next_seq = meta.next_seq.max(seq + 1);
            }
            file_num += 1;
        }

        let log_path = Self::log_file_path(&config.base_dir, meta.current_file_num);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        let current_len = file.metadata()?.len();
        let writer = BufWriter::with_capacity(config.write_buffer_size, file);

        tracing::debug!(
            dir = %config.base_dir.display(),
            events = index.len(),
            segment = meta.current_file_num,
            "opened event log"
        );

        Ok(Self {
            config,
            inner: Mutex::new(Segments {
                meta,
                writer,
                current_len,
                index,
            }),
            notify: Arc::new(Notify::new()),
        })
    }

    /// Notified after every append that stored at least one event.
    pub fn event_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn log_file_path(base_dir: &Path, file_num: u64) -> PathBuf {
        base_dir.join(format!("events-{:08}.log", file_num))
    }

    /// Index every frame in a segment and truncate a torn tail.
    ///
    /// Returns the last sequence number seen.
    fn scan_segment(
        path: &Path,
        file_num: u64,
        max_event_size: usize,
        index: &mut LogIndex,
    ) -> Result<Option<u64>> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut offset = 0u64;
        let mut last_seq = None;

        while offset + HEADER_LEN <= file_len {
            let mut header = [0u8; HEADER_LEN as usize];
            file.read_exact(&mut header)?;
            let (seq, size) = decode_header(&header);
            let body_offset = offset + HEADER_LEN;
            if size as usize > max_event_size || body_offset + u64::from(size) > file_len {
                break;
            }
            let mut body = vec![0u8; size as usize];
            file.read_exact(&mut body)?;
            let event: Event = match serde_json::from_slice(&body) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(segment = file_num, offset, error = %e, "unreadable frame");
                    break;
                }
            };
            index.insert(
                &event,
                Location {
                    file_num,
                    offset: body_offset,
                    len: size,
                },
            );
            last_seq = Some(seq);
            offset = body_offset + u64::from(size);
        }

        if offset < file_len {
            tracing::warn!(
                segment = %path.display(),
                valid = offset,
                len = file_len,
                "truncating torn tail"
            );
            OpenOptions::new().write(true).open(path)?.set_len(offset)?;
        }
        Ok(last_seq)
    }

    fn save_meta(&self, meta: &EventLogMeta) -> Result<()> {
        let meta_path = self.config.base_dir.join("meta.json");
        let data = serde_json::to_string(meta)?;
        std::fs::write(&meta_path, data)?;
        Ok(())
    }

    /// Start a new segment once the active one reaches `max_file_size`.
    fn check_rotation(&self, segments: &mut Segments) -> Result<()> {
        if segments.current_len < self.config.max_file_size {
            return Ok(());
        }
        segments.writer.flush()?;

        let old_path = Self::log_file_path(&self.config.base_dir, segments.meta.current_file_num);
        segments.meta.current_file_num += 1;
        self.save_meta(&segments.meta)?;

        let new_path = Self::log_file_path(&self.config.base_dir, segments.meta.current_file_num);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&new_path)?;
        segments.writer = BufWriter::with_capacity(self.config.write_buffer_size, file);
        segments.current_len = 0;

        tracing::info!(
            "Rotated event log: {} -> {}",
            old_path.display(),
            new_path.display()
        );
        Ok(())
    }
}

fn decode_header(header: &[u8; HEADER_LEN as usize]) -> (u64, u32) {
    let mut seq = [0u8; 8];
    let mut len = [0u8; 4];
    seq.copy_from_slice(&header[0..8]);
    len.copy_from_slice(&header[8..12]);
    (u64::from_be_bytes(seq), u32::from_be_bytes(len))
}

impl EventLog for FileEventLog {
    fn append(&self, events: &[Event]) -> Result<Vec<TagWriteOutcome>> {
        let start = Instant::now();
        let mut segments = self.inner.lock();

        let mut seen = HashSet::new();
        let mut fresh = Vec::with_capacity(events.len());
        let mut bodies = Vec::with_capacity(events.len());
        let mut total_size = 0usize;
        for event in events {
            if segments.index.contains(&event.id) || !seen.insert(event.id) {
                continue;
            }
            let body = serde_json::to_vec(event)?;
            if body.len() > self.config.max_event_size || body.len() > u32::MAX as usize {
                return Err(ValidationError::EventTooLarge {
                    size: body.len(),
                    max: self.config.max_event_size,
                }
                .into());
            }
            total_size += HEADER_LEN as usize + body.len();
            fresh.push(event);
            bodies.push(body);
        }
        if total_size > self.config.max_batch_bytes {
            return Err(TagstreamError::InvalidState(format!(
                "Batch size {} exceeds max_batch_bytes {}",
                total_size, self.config.max_batch_bytes
            )));
        }
        if fresh.is_empty() {
            return Ok(Vec::new());
        }

        let file_num = segments.meta.current_file_num;
        let mut buffer = Vec::with_capacity(total_size);
        let mut locations = Vec::with_capacity(fresh.len());
        let mut offset = segments.current_len;
        let mut seq = segments.meta.next_seq;
        for body in &bodies {
            let size = body.len() as u32;
            buffer.extend_from_slice(&seq.to_be_bytes());
            buffer.extend_from_slice(&size.to_be_bytes());
            buffer.extend_from_slice(body);
            locations.push(Location {
                file_num,
                offset: offset + HEADER_LEN,
                len: size,
            });
            offset += HEADER_LEN + u64::from(size);
            seq += 1;
        }

        segments.writer.write_all(&buffer)?;
        if self.config.flush_on_append {
            segments.writer.flush()?;
        }
        segments.current_len = offset;
        segments.meta.next_seq = seq;
        for (event, location) in fresh.iter().zip(locations) {
            segments.index.insert(event, location);
        }
        self.check_rotation(&mut segments)?;
        drop(segments);

        let stored: Vec<Event> = fresh.into_iter().cloned().collect();
        observe::record_append(stored.len(), start.elapsed());
        self.notify.notify_waiters();
        Ok(TagWriteOutcome::summarize(&stored))
    }

    fn read_since(
        &self,
        tag: Option<&Tag>,
        since: Option<&SortableUniqueId>,
        max: Option<usize>,
    ) -> Result<Box<dyn EventLogIterator>> {
        let locations = {
            let mut segments = self.inner.lock();
            segments.writer.flush()?;
            segments
                .index
                .locations_after(tag, since, max.unwrap_or(usize::MAX))
        };
        Ok(Box::new(FileEventLogIter::new(
            self.config.base_dir.clone(),
            locations,
        )))
    }

    fn count(&self, since: Option<&SortableUniqueId>) -> Result<u64> {
        Ok(self.inner.lock().index.count_after(since))
    }

    fn latest_for_tag(&self, tag: &Tag) -> Result<Option<SortableUniqueId>> {
        Ok(self.inner.lock().index.latest_for_tag(tag).cloned())
    }

    fn sync(&self) -> Result<()> {
        let mut segments = self.inner.lock();
        segments.writer.flush()?;
        segments.writer.get_ref().sync_all()?;
        self.save_meta(&segments.meta)?;
        Ok(())
    }

    fn stats(&self) -> Result<EventLogStats> {
        let segments = self.inner.lock();

        let mut total_bytes = 0u64;
        for file_num in 0..=segments.meta.current_file_num {
            let path = Self::log_file_path(&self.config.base_dir, file_num);
            if path.exists() {
                total_bytes += std::fs::metadata(&path)?.len();
            }
        }

        Ok(EventLogStats {
            event_count: segments.index.len() as u64,
            oldest: segments.index.oldest().cloned(),
            newest: segments.index.newest().cloned(),
            tag_count: segments.index.tag_count(),
            total_bytes,
        })
    }
}

/// Ensure buffered frames and metadata reach disk on drop
impl Drop for FileEventLog {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            tracing::warn!("Failed to sync FileEventLog on drop: {}", e);
        }
    }
}

/// Reads indexed frames lazily, keeping one handle per segment.
struct FileEventLogIter {
    base_dir: PathBuf,
    locations: std::vec::IntoIter<Location>,
    files: HashMap<u64, File>,
}

impl FileEventLogIter {
    fn new(base_dir: PathBuf, locations: Vec<Location>) -> Self {
        Self {
            base_dir,
            locations: locations.into_iter(),
            files: HashMap::new(),
        }
    }

    fn read_at(&mut self, location: Location) -> Result<Event> {
        let file = match self.files.entry(location.file_num) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let path = FileEventLog::log_file_path(&self.base_dir, location.file_num);
                entry.insert(File::open(path)?)
            }
        };
        file.seek(SeekFrom::Start(location.offset))?;
        let mut body = vec![0u8; location.len as usize];
        file.read_exact(&mut body)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl Iterator for FileEventLogIter {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        let location = self.locations.next()?;
        Some(self.read_at(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tagstream_core::PendingEvent;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> FileEventLogConfig {
        FileEventLogConfig {
            base_dir: dir.path().to_path_buf(),
            max_file_size: 1024, // Small for testing rotation
            write_buffer_size: 128,
            max_event_size: 64 * 1024,
            max_batch_bytes: 1024 * 1024,
            flush_on_append: true,
        }
    }

    fn event(token: u64, tag: &str) -> Event {
        let tag: Tag = tag.parse().unwrap();
        PendingEvent::raw("Noted", serde_json::json!({ "n": token }), [tag])
            .unwrap()
            .stamp(SortableUniqueId::generate(
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
                token,
            ))
    }

    fn read_all(log: &FileEventLog) -> Vec<Event> {
        log.read_since(None, None, None)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_append_and_read_in_sortable_order() {
        let temp = TempDir::new().unwrap();
        let log = FileEventLog::open(config(&temp)).unwrap();
        let later = event(2, "doc:a");
        let earlier = event(1, "doc:b");

        log.append(&[later.clone()]).unwrap();
        log.append(&[earlier.clone()]).unwrap();

        assert_eq!(read_all(&log), vec![earlier, later]);
    }

    #[test]
    fn test_duplicate_ids_are_skipped() {
        let temp = TempDir::new().unwrap();
        let log = FileEventLog::open(config(&temp)).unwrap();
        let e = event(1, "doc:a");

        let first = log.append(&[e.clone(), e.clone()]).unwrap();
        assert_eq!(first[0].events_written, 1);
        assert!(log.append(&[e]).unwrap().is_empty());
        assert_eq!(log.count(None).unwrap(), 1);
    }

    #[test]
    fn test_reopen_rebuilds_index_across_rotation() {
        let temp = TempDir::new().unwrap();
        let events: Vec<Event> = (1..=40).map(|i| event(i, "doc:a")).collect();
        {
            let log = FileEventLog::open(config(&temp)).unwrap();
            for e in &events {
                log.append(std::slice::from_ref(e)).unwrap();
            }
        }
        assert!(temp.path().join("events-00000001.log").exists());

        let log = FileEventLog::open(config(&temp)).unwrap();
        assert_eq!(read_all(&log), events);
        // Dedup survives the restart.
        assert!(log.append(&events[..1]).unwrap().is_empty());

        let stats = log.stats().unwrap();
        assert_eq!(stats.event_count, 40);
        assert_eq!(stats.tag_count, 1);
        assert!(stats.total_bytes > 0);
    }

    #[test]
    fn test_torn_tail_is_truncated_on_open() {
        let temp = TempDir::new().unwrap();
        let e = event(1, "doc:a");
        {
            let log = FileEventLog::open(config(&temp)).unwrap();
            log.append(&[e.clone()]).unwrap();
        }
        let path = temp.path().join("events-00000000.log");
        let good_len = std::fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&7u64.to_be_bytes()).unwrap();
            file.write_all(&500u32.to_be_bytes()).unwrap();
            file.write_all(b"{\"partial").unwrap();
        }

        let log = FileEventLog::open(config(&temp)).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
        let next = event(2, "doc:a");
        log.append(&[next.clone()]).unwrap();
        assert_eq!(read_all(&log), vec![e, next]);
    }

    #[test]
    fn test_oversized_event_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut cfg = config(&temp);
        cfg.max_event_size = 64;
        let log = FileEventLog::open(cfg).unwrap();

        let err = log.append(&[event(1, "doc:a")]).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(log.count(None).unwrap(), 0);
    }
}
