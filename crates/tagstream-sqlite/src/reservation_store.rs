use crate::schema::{self, db_err, format_time, parse_time, SqliteConfig};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tagstream_core::{
    ReservationSlot, ReservationStore, Result, Tag, TagWriteReservation, TagstreamError,
};

/// Reservation table in SQLite, shareable between processes on one host.
pub struct SqliteReservationStore {
    conn: Mutex<Connection>,
}

impl SqliteReservationStore {
    pub fn open(cfg: &SqliteConfig) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(schema::open(cfg)?),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(schema::open_in_memory()?),
        })
    }

    /// Delete every reservation that expired at or before `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.conn
            .lock()
            .execute(
                "DELETE FROM tag_reservations WHERE expires_at <= ?1",
                params![format_time(&now)],
            )
            .map_err(db_err)
    }
}

fn read_row(conn: &Connection, tag: &Tag) -> Result<Option<TagWriteReservation>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT reservation_code, expires_at FROM tag_reservations WHERE tag = ?1",
            params![tag.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;
    row.map(|(reservation_code, expires_at)| {
        Ok(TagWriteReservation {
            tag: tag.clone(),
            reservation_code,
            expires_at: parse_time(&expires_at)?,
        })
    })
    .transpose()
}

impl ReservationStore for SqliteReservationStore {
    fn create_if_absent_or_expired(
        &self,
        reservation: &TagWriteReservation,
        now: DateTime<Utc>,
    ) -> Result<ReservationSlot> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let changed = tx
            .execute(
                "INSERT INTO tag_reservations (tag, reservation_code, expires_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(tag) DO UPDATE SET
                     reservation_code = excluded.reservation_code,
                     expires_at = excluded.expires_at
                 WHERE tag_reservations.expires_at <= ?4",
                params![
                    reservation.tag.to_string(),
                    reservation.reservation_code,
                    format_time(&reservation.expires_at),
                    format_time(&now),
                ],
            )
            .map_err(db_err)?;
        let slot = if changed == 1 {
            ReservationSlot::Created
        } else {
            let holder = read_row(&tx, &reservation.tag)?.ok_or_else(|| {
                TagstreamError::InvalidState(format!(
                    "reservation for {} vanished during insert",
                    reservation.tag
                ))
            })?;
            ReservationSlot::Occupied(holder)
        };
        tx.commit().map_err(db_err)?;
        Ok(slot)
    }

    fn lookup(&self, tag: &Tag) -> Result<Option<TagWriteReservation>> {
        read_row(&self.conn.lock(), tag)
    }

    fn delete(&self, tag: &Tag, reservation_code: &str) -> Result<bool> {
        let removed = self
            .conn
            .lock()
            .execute(
                "DELETE FROM tag_reservations WHERE tag = ?1 AND reservation_code = ?2",
                params![tag.to_string(), reservation_code],
            )
            .map_err(db_err)?;
        Ok(removed > 0)
    }
}
