//! Report repository: raw row access for the `reports` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw report row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub id: String,
    pub filename: String,
    pub source_path: String,
    pub status: String,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ReportRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            filename: row.get("filename")?,
            source_path: row.get("source_path")?,
            status: row.get("status")?,
            result: row.get("result")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub fn insert(db: &Database, report: &ReportRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO reports (id, filename, source_path, status, result, error_message,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                report.id,
                report.filename,
                report.source_path,
                report.status,
                report.result,
                report.error_message,
                report.created_at,
                report.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Writes the full row. `id`, `source_path` and `created_at` are never
/// overwritten once the row exists.
pub fn upsert(db: &Database, report: &ReportRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO reports (id, filename, source_path, status, result, error_message,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                result = excluded.result,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at",
            params![
                report.id,
                report.filename,
                report.source_path,
                report.status,
                report.result,
                report.error_message,
                report.created_at,
                report.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Updates the mutable columns only while the stored status is still
/// `expected`. Returns whether a row was written.
pub fn update_if_status(
    db: &Database,
    report: &ReportRow,
    expected: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE reports
             SET status = ?2, result = ?3, error_message = ?4, updated_at = ?5
             WHERE id = ?1 AND status = ?6",
            params![
                report.id,
                report.status,
                report.result,
                report.error_message,
                report.updated_at,
                expected,
            ],
        )?;
        Ok(affected > 0)
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ReportRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM reports WHERE id = ?1",
                params![id],
                ReportRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM reports WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Most recently created reports first.
pub fn list_recent(db: &Database, limit: u64) -> Result<Vec<ReportRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM reports ORDER BY created_at DESC, id LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit as i64], ReportRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_report(id: &str) -> ReportRow {
        ReportRow {
            id: id.to_string(),
            filename: "labs.pdf".to_string(),
            source_path: "/uploads/labs.pdf".to_string(),
            status: "PENDING".to_string(),
            result: None,
            error_message: None,
            created_at: "2026-01-01T00:00:00.000000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample_report("r-1")).unwrap();

        let found = find_by_id(&db, "r-1").unwrap().unwrap();
        assert_eq!(found.filename, "labs.pdf");
        assert_eq!(found.status, "PENDING");
        assert!(found.result.is_none());
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "nope").unwrap().is_none());
    }

    #[test]
    fn test_upsert_keeps_immutable_columns() {
        let db = test_db();
        insert(&db, &sample_report("r-2")).unwrap();

        let mut changed = sample_report("r-2");
        changed.source_path = "/elsewhere.pdf".to_string();
        changed.created_at = "2030-01-01T00:00:00.000000Z".to_string();
        changed.status = "COMPLETED".to_string();
        changed.result = Some("{\"patient_name\":null}".to_string());
        changed.updated_at = "2026-01-01T00:05:00.000000Z".to_string();
        upsert(&db, &changed).unwrap();

        let found = find_by_id(&db, "r-2").unwrap().unwrap();
        assert_eq!(found.status, "COMPLETED");
        assert_eq!(found.source_path, "/uploads/labs.pdf");
        assert_eq!(found.created_at, "2026-01-01T00:00:00.000000Z");
        assert_eq!(found.updated_at, "2026-01-01T00:05:00.000000Z");
        assert!(found.result.is_some());
    }

    #[test]
    fn test_upsert_inserts_missing_row() {
        let db = test_db();
        upsert(&db, &sample_report("r-3")).unwrap();
        assert!(find_by_id(&db, "r-3").unwrap().is_some());
    }

    #[test]
    fn test_count_by_status() {
        let db = test_db();
        insert(&db, &sample_report("c1")).unwrap();
        insert(&db, &sample_report("c2")).unwrap();
        let mut failed = sample_report("c3");
        failed.status = "FAILED".to_string();
        insert(&db, &failed).unwrap();

        assert_eq!(count_by_status(&db, "PENDING").unwrap(), 2);
        assert_eq!(count_by_status(&db, "FAILED").unwrap(), 1);
        assert_eq!(count_by_status(&db, "COMPLETED").unwrap(), 0);
    }

    #[test]
    fn test_list_recent_orders_newest_first() {
        let db = test_db();
        for i in 0..5 {
            let mut report = sample_report(&format!("l{}", i));
            report.created_at = format!("2026-01-0{}T00:00:00.000000Z", i + 1);
            insert(&db, &report).unwrap();
        }

        let rows = list_recent(&db, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "l4");
        assert_eq!(rows[1].id, "l3");
    }
}
