//! Ledger storage: append notice records and read them back.

use std::collections::HashSet;

use rusqlite::{Row, params, types::ValueRef};
use tracing::warn;
use uuid::Uuid;

use crate::model::{Channel, NoticeKind, NoticeRecord, ObligationId, Outcome};

use super::{Ledger, Result, Storage};

const INSERT: &str = "INSERT INTO notices
     (recorded_at, tick_id, obligation_id, kind, channel, destination, outcome, detail)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const SELECT_ALL: &str = "SELECT id, recorded_at, tick_id, obligation_id, kind, channel,
            destination, outcome, detail
     FROM notices ORDER BY id";

const SELECT_FOR_OBLIGATION: &str = "SELECT id, recorded_at, tick_id, obligation_id, kind, channel,
            destination, outcome, detail
     FROM notices WHERE obligation_id = ?1 ORDER BY id";

impl Ledger for Storage {
    fn issued_kinds(&self, obligation_id: &ObligationId) -> Result<HashSet<NoticeKind>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, kind FROM notices WHERE obligation_id = ?1 AND outcome = ?2",
        )?;
        let rows = stmt.query_map(
            params![obligation_id.as_str(), Outcome::Sent.as_str()],
            |row| Ok((row.get::<_, i64>(0)?, text_column(row, 1))),
        )?;

        let mut kinds = HashSet::new();
        for row in rows {
            let (id, kind) = row?;
            match kind.map(|k| k.map(|k| k.parse::<NoticeKind>())) {
                Ok(Some(Ok(kind))) => {
                    kinds.insert(kind);
                }
                Ok(Some(Err(e))) => warn!(row = id, error = %e, "skipping malformed ledger row"),
                Ok(None) => warn!(row = id, "skipping ledger row without a kind"),
                Err(reason) => warn!(row = id, %reason, "skipping malformed ledger row"),
            }
        }
        Ok(kinds)
    }

    fn append_all(&self, records: &[NoticeRecord]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT)?;
            for record in records {
                stmt.execute(params![
                    record.recorded_at.to_string(),
                    record.tick_id.to_string(),
                    record.obligation_id.as_str(),
                    record.kind.as_str(),
                    record.channel.as_str(),
                    record.destination.as_deref(),
                    record.outcome.as_str(),
                    &record.detail,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl Storage {
    /// Loads every well-formed record in append order.
    ///
    /// When `obligation_id` is given, only that obligation's records are returned.
    /// Malformed rows are skipped with a warning.
    pub fn load_notices(
        &self,
        obligation_id: Option<&ObligationId>,
    ) -> Result<Vec<NoticeRecord>> {
        let conn = self.conn()?;
        let mut records = Vec::new();
        let mut push = |row: &Row<'_>| -> rusqlite::Result<()> {
            let id: i64 = row.get(0)?;
            match RawRow::read(row).and_then(RawRow::into_record) {
                Ok(record) => records.push(record),
                Err(reason) => warn!(row = id, %reason, "skipping malformed ledger row"),
            }
            Ok(())
        };

        match obligation_id {
            Some(obligation_id) => {
                let mut stmt = conn.prepare_cached(SELECT_FOR_OBLIGATION)?;
                let mut rows = stmt.query(params![obligation_id.as_str()])?;
                while let Some(row) = rows.next()? {
                    push(row)?;
                }
            }
            None => {
                let mut stmt = conn.prepare_cached(SELECT_ALL)?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    push(row)?;
                }
            }
        }
        Ok(records)
    }
}

/// Columns of one ledger row, before validation.
struct RawRow {
    recorded_at: Option<String>,
    tick_id: Option<String>,
    obligation_id: Option<String>,
    kind: Option<String>,
    channel: Option<String>,
    destination: Option<String>,
    outcome: Option<String>,
    detail: Option<String>,
}

impl RawRow {
    fn read(row: &Row<'_>) -> std::result::Result<Self, String> {
        Ok(Self {
            recorded_at: text_column(row, 1)?,
            tick_id: text_column(row, 2)?,
            obligation_id: text_column(row, 3)?,
            kind: text_column(row, 4)?,
            channel: text_column(row, 5)?,
            destination: text_column(row, 6)?,
            outcome: text_column(row, 7)?,
            detail: text_column(row, 8)?,
        })
    }

    /// Validates the columns, naming the first one that is wrong.
    fn into_record(self) -> std::result::Result<NoticeRecord, String> {
        let recorded_at = self
            .recorded_at
            .ok_or("missing recorded_at")?
            .parse::<jiff::Timestamp>()
            .map_err(|e| format!("invalid recorded_at: {e}"))?;
        let tick_id = self
            .tick_id
            .ok_or("missing tick_id")?
            .parse::<Uuid>()
            .map_err(|e| format!("invalid tick_id: {e}"))?;
        let obligation_id = self
            .obligation_id
            .filter(|id| !id.is_empty())
            .ok_or("missing obligation_id")?;
        let kind = self
            .kind
            .ok_or("missing kind")?
            .parse::<NoticeKind>()
            .map_err(|e| e.to_string())?;
        let channel = self
            .channel
            .ok_or("missing channel")?
            .parse::<Channel>()
            .map_err(|e| e.to_string())?;
        let outcome = self
            .outcome
            .ok_or("missing outcome")?
            .parse::<Outcome>()
            .map_err(|e| e.to_string())?;

        Ok(NoticeRecord {
            recorded_at,
            tick_id,
            obligation_id: ObligationId::new(obligation_id),
            kind,
            channel,
            destination: self.destination,
            outcome,
            detail: self.detail.unwrap_or_default(),
        })
    }
}

/// Reads a nullable text column. Any other value makes the row malformed.
fn text_column(row: &Row<'_>, idx: usize) -> std::result::Result<Option<String>, String> {
    let name = row.as_ref().column_name(idx).unwrap_or("?").to_string();
    match row.get_ref(idx).map_err(|e| e.to_string())? {
        ValueRef::Null => Ok(None),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| Some(s.to_string()))
            .map_err(|_| format!("{name} is not valid UTF-8")),
        ValueRef::Integer(_) | ValueRef::Real(_) | ValueRef::Blob(_) => {
            Err(format!("{name} is not text"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::Timestamp;
    use tempfile::TempDir;

    fn test_storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path().join("ledger.sqlite")).unwrap();
        (dir, storage)
    }

    fn record(id: &str, kind: NoticeKind, channel: Channel, outcome: Outcome) -> NoticeRecord {
        NoticeRecord {
            recorded_at: Timestamp::now(),
            tick_id: Uuid::new_v4(),
            obligation_id: id.into(),
            kind,
            channel,
            destination: Some("someone@example.org".into()),
            outcome,
            detail: String::new(),
        }
    }

    fn insert_raw(storage: &Storage, kind: Option<&str>, outcome: Option<&str>) {
        storage
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO notices (recorded_at, tick_id, obligation_id, kind, channel, outcome)
                 VALUES (?1, ?2, '42', ?3, 'email', ?4)",
                params![
                    Timestamp::now().to_string(),
                    Uuid::new_v4().to_string(),
                    kind,
                    outcome
                ],
            )
            .unwrap();
    }

    #[test]
    fn new_ledger_is_empty() {
        let (_dir, storage) = test_storage();

        assert!(storage.load_notices(None).unwrap().is_empty());
        assert!(storage.issued_kinds(&"42".into()).unwrap().is_empty());
    }

    #[test]
    fn append_and_load_in_order() {
        let (_dir, storage) = test_storage();
        let first = record("42", NoticeKind::Reminder, Channel::Email, Outcome::Failed);
        let second = record(
            "42",
            NoticeKind::Reminder,
            Channel::Messaging,
            Outcome::Sent,
        );

        storage.append(&first).unwrap();
        storage.append(&second).unwrap();

        let loaded = storage.load_notices(None).unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[test]
    fn load_filters_by_obligation() {
        let (_dir, storage) = test_storage();
        storage
            .append_all(&[
                record("1", NoticeKind::Reminder, Channel::Email, Outcome::Sent),
                record("2", NoticeKind::Overdue, Channel::Email, Outcome::Sent),
            ])
            .unwrap();

        let loaded = storage.load_notices(Some(&"2".into())).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].obligation_id.as_str(), "2");
    }

    #[test]
    fn only_sent_rows_count_as_issued() {
        let (_dir, storage) = test_storage();
        storage
            .append_all(&[
                record("42", NoticeKind::Reminder, Channel::Email, Outcome::Failed),
                record(
                    "42",
                    NoticeKind::Reminder,
                    Channel::Messaging,
                    Outcome::Skipped,
                ),
                record("42", NoticeKind::Overdue, Channel::Email, Outcome::Sent),
                record("43", NoticeKind::Reminder, Channel::Email, Outcome::Sent),
            ])
            .unwrap();

        let issued = storage.issued_kinds(&"42".into()).unwrap();
        assert_eq!(issued, HashSet::from([NoticeKind::Overdue]));
    }

    #[test]
    fn one_sent_channel_is_enough() {
        let (_dir, storage) = test_storage();
        storage
            .append_all(&[
                record("42", NoticeKind::Reminder, Channel::Email, Outcome::Failed),
                record(
                    "42",
                    NoticeKind::Reminder,
                    Channel::Messaging,
                    Outcome::Sent,
                ),
            ])
            .unwrap();

        let issued = storage.issued_kinds(&"42".into()).unwrap();
        assert!(issued.contains(&NoticeKind::Reminder));
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let (_dir, storage) = test_storage();
        insert_raw(&storage, Some("bogus"), Some("sent"));
        insert_raw(&storage, None, Some("sent"));
        insert_raw(&storage, Some("reminder"), None);
        storage
            .append(&record("42", NoticeKind::Overdue, Channel::Email, Outcome::Sent))
            .unwrap();

        let issued = storage.issued_kinds(&"42".into()).unwrap();
        assert_eq!(issued, HashSet::from([NoticeKind::Overdue]));

        let loaded = storage.load_notices(None).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].kind, NoticeKind::Overdue);
    }

    #[test]
    fn non_text_values_are_skipped() {
        let (_dir, storage) = test_storage();
        storage
            .conn()
            .unwrap()
            .execute_batch(&format!(
                "INSERT INTO notices (recorded_at, tick_id, obligation_id, kind, channel, outcome)
                 VALUES ('{now}', '{tick}', '42', X'00FF', 'email', 'sent');
                 INSERT INTO notices (recorded_at, tick_id, obligation_id, kind, channel, outcome)
                 VALUES ('{now}', '{tick}', '42', CAST(X'FF' AS TEXT), 'email', 'sent');",
                now = Timestamp::now(),
                tick = Uuid::new_v4(),
            ))
            .unwrap();
        storage
            .append(&record("42", NoticeKind::Overdue, Channel::Email, Outcome::Sent))
            .unwrap();

        let issued = storage.issued_kinds(&"42".into()).unwrap();
        assert_eq!(issued, HashSet::from([NoticeKind::Overdue]));

        let loaded = storage.load_notices(None).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].kind, NoticeKind::Overdue);
    }

    #[test]
    fn row_with_bad_timestamp_is_skipped() {
        let (_dir, storage) = test_storage();
        storage
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO notices (recorded_at, tick_id, obligation_id, kind, channel, outcome)
                 VALUES ('2024-03-13 09:00:00', ?1, '42', 'reminder', 'email', 'sent')",
                params![Uuid::new_v4().to_string()],
            )
            .unwrap();

        assert!(storage.load_notices(None).unwrap().is_empty());
    }

    #[test]
    fn records_survive_reopening() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.sqlite");

        let storage = Storage::open(&path).unwrap();
        storage
            .append(&record("42", NoticeKind::Reminder, Channel::Batch, Outcome::Sent))
            .unwrap();
        drop(storage);

        let storage = Storage::open(&path).unwrap();
        let issued = storage.issued_kinds(&"42".into()).unwrap();
        assert!(issued.contains(&NoticeKind::Reminder));
    }
}
