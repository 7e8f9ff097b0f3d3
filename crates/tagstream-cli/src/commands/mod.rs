pub mod build;
pub mod delete;
pub mod list;
pub mod status;

use anyhow::{Context, Result};
use tagstream::{EventTypeCountProjector, ProjectorRegistry, TagCatalogProjector};

/// Projectors the CLI knows how to build.
pub fn registry() -> Result<ProjectorRegistry> {
    let mut registry = ProjectorRegistry::new();
    registry
        .register(TagCatalogProjector)
        .context("Failed to register tag catalog projector")?;
    registry
        .register(EventTypeCountProjector)
        .context("Failed to register event type count projector")?;
    Ok(registry)
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use tagstream::{ConsistencyCheck, PendingEvent, Tag, TagstreamConfig, TagstreamDb};

    /// A database whose safe window is closed, so every written event is
    /// already safe when a build runs.
    pub fn open(path: &Path) -> TagstreamDb {
        let mut config = TagstreamConfig::default();
        config.host = config.host.with_safe_window_ms(0);
        TagstreamDb::open_with_config(path, config).unwrap()
    }

    pub fn write(db: &TagstreamDb, event_type: &str, tag: &str) {
        let tag: Tag = tag.parse().unwrap();
        let event = PendingEvent::raw(event_type, serde_json::json!({}), [tag]).unwrap();
        db.writer()
            .write(vec![event], &ConsistencyCheck::new())
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 * 1024), "3072.0 GB");
    }

    #[test]
    fn test_registry_holds_builtins() {
        let names: Vec<String> = registry().unwrap().list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["event-type-count", "tag-catalog"]);
    }
}
