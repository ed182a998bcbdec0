// ==========================================
// 排班草案引擎 - SQLite 持久化协作者
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
// 表: staff / shift / assignment (线上排班) + schedule_draft (草案记录)
// ==========================================

use crate::domain::draft::{DateRange, ScheduleDraft, ScheduleSnapshot};
use crate::domain::shift::{Assignment, Shift};
use crate::domain::staff::StaffCandidate;
use crate::domain::types::{AssignmentStatus, DraftStatus, ShiftStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::schedule_store::ScheduleStore;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";

// ==========================================
// SqliteScheduleStore - SQLite 排班存储
// ==========================================
pub struct SqliteScheduleStore {
    conn: Arc<Mutex<Connection>>,
}

/// shift 表原始行
struct ShiftRow {
    shift_id: String,
    shift_date: String,
    start_time: String,
    end_time: String,
    required_skill: Option<String>,
    required_staff_count: i64,
    hourly_rate: Option<f64>,
    status: String,
}

impl SqliteScheduleStore {
    /// 创建新的存储实例（会幂等建表）
    pub fn new(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&guard)?;
            crate::db::init_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 按路径打开
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Self::new(Arc::new(Mutex::new(conn)))
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 基础数据写入 (线上排班)
    // ==========================================

    /// 写入/覆盖员工档案
    pub fn upsert_staff(&self, business_id: &str, staff: &StaffCandidate) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO staff (staff_id, business_id, profile_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(staff_id) DO UPDATE SET business_id = ?2, profile_json = ?3",
            params![staff.staff_id, business_id, serde_json::to_string(staff)?],
        )?;
        Ok(())
    }

    /// 写入/覆盖班次及其分配
    pub fn upsert_shift(&self, business_id: &str, shift: &Shift) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        write_shift(&tx, business_id, shift)?;
        tx.commit()?;
        Ok(())
    }

    // ==========================================
    // 查询辅助
    // ==========================================

    fn query_shift_rows(
        conn: &Connection,
        business_id: &str,
        date_range: DateRange,
    ) -> RepositoryResult<Vec<ShiftRow>> {
        let mut stmt = conn.prepare(
            r#"SELECT shift_id, shift_date, start_time, end_time, required_skill,
                      required_staff_count, hourly_rate, status
               FROM shift
               WHERE business_id = ?1 AND shift_date >= ?2 AND shift_date <= ?3
               ORDER BY shift_date, start_time, shift_id"#,
        )?;
        let rows = stmt.query_map(
            params![
                business_id,
                date_range.start.format(DATE_FMT).to_string(),
                date_range.end.format(DATE_FMT).to_string()
            ],
            |row| {
                Ok(ShiftRow {
                    shift_id: row.get(0)?,
                    shift_date: row.get(1)?,
                    start_time: row.get(2)?,
                    end_time: row.get(3)?,
                    required_skill: row.get(4)?,
                    required_staff_count: row.get(5)?,
                    hourly_rate: row.get(6)?,
                    status: row.get(7)?,
                })
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn query_assignments(conn: &Connection, shift_id: &str) -> RepositoryResult<Vec<Assignment>> {
        let mut stmt = conn.prepare(
            r#"SELECT assignment_id, staff_id, staff_name, status, confidence_score,
                      reasoning, override_note
               FROM assignment WHERE shift_id = ?1 ORDER BY seq_no"#,
        )?;
        let rows = stmt.query_map(params![shift_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (assignment_id, staff_id, staff_name, status, confidence, reasoning, override_note) =
                row?;
            let status = AssignmentStatus::from_str(&status).ok_or_else(|| {
                RepositoryError::FieldValueError {
                    field: "assignment.status".to_string(),
                    message: status.clone(),
                }
            })?;
            out.push(Assignment {
                assignment_id,
                shift_id: shift_id.to_string(),
                staff_id,
                staff_name,
                status,
                confidence_score: confidence,
                reasoning,
                // 线上排班即基线
                is_modified: false,
                override_note,
            });
        }
        Ok(out)
    }

    fn row_to_shift(row: ShiftRow, assignments: Vec<Assignment>) -> RepositoryResult<Shift> {
        let date = NaiveDate::parse_from_str(&row.shift_date, DATE_FMT).map_err(|e| {
            RepositoryError::FieldValueError {
                field: "shift.shift_date".to_string(),
                message: e.to_string(),
            }
        })?;
        let parse_time = |field: &str, raw: &str| {
            NaiveTime::parse_from_str(raw, TIME_FMT).map_err(|e| RepositoryError::FieldValueError {
                field: field.to_string(),
                message: e.to_string(),
            })
        };
        let status = ShiftStatus::from_str(&row.status).ok_or_else(|| {
            RepositoryError::FieldValueError {
                field: "shift.status".to_string(),
                message: row.status.clone(),
            }
        })?;
        Ok(Shift {
            shift_id: row.shift_id,
            date,
            start_time: parse_time("shift.start_time", &row.start_time)?,
            end_time: parse_time("shift.end_time", &row.end_time)?,
            required_skill: row.required_skill,
            required_staff_count: row.required_staff_count.max(0) as u32,
            hourly_rate: row.hourly_rate,
            status,
            is_modified: false,
            assignments,
        })
    }

    fn read_draft(conn: &Connection, draft_id: &str) -> RepositoryResult<Option<ScheduleDraft>> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT draft_json FROM schedule_draft WHERE draft_id = ?1",
                params![draft_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn write_draft(conn: &Connection, draft: &ScheduleDraft) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO schedule_draft (draft_id, business_id, range_start, range_end, status, draft_json, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
               ON CONFLICT(draft_id) DO UPDATE SET
                   business_id = ?2, range_start = ?3, range_end = ?4,
                   status = ?5, draft_json = ?6, updated_at = datetime('now')"#,
            params![
                draft.draft_id,
                draft.business_id,
                draft.date_range.start.format(DATE_FMT).to_string(),
                draft.date_range.end.format(DATE_FMT).to_string(),
                draft.status.as_str(),
                serde_json::to_string(draft)?,
            ],
        )?;
        Ok(())
    }
}

/// 写入班次行与分配（先删后插，保证顺序与草案一致）
fn write_shift(conn: &Connection, business_id: &str, shift: &Shift) -> RepositoryResult<()> {
    conn.execute(
        r#"INSERT INTO shift (shift_id, business_id, shift_date, start_time, end_time,
                              required_skill, required_staff_count, hourly_rate, status)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
           ON CONFLICT(shift_id) DO UPDATE SET
               business_id = ?2, shift_date = ?3, start_time = ?4, end_time = ?5,
               required_skill = ?6, required_staff_count = ?7, hourly_rate = ?8, status = ?9"#,
        params![
            shift.shift_id,
            business_id,
            shift.date.format(DATE_FMT).to_string(),
            shift.start_time.format(TIME_FMT).to_string(),
            shift.end_time.format(TIME_FMT).to_string(),
            shift.required_skill,
            shift.required_staff_count as i64,
            shift.hourly_rate,
            shift.status.as_str(),
        ],
    )?;
    conn.execute(
        "DELETE FROM assignment WHERE shift_id = ?1",
        params![shift.shift_id],
    )?;
    for (seq_no, a) in shift.assignments.iter().enumerate() {
        conn.execute(
            r#"INSERT INTO assignment (assignment_id, shift_id, seq_no, staff_id, staff_name,
                                       status, confidence_score, reasoning, override_note)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                a.assignment_id,
                shift.shift_id,
                seq_no as i64,
                a.staff_id,
                a.staff_name,
                a.status.as_str(),
                a.confidence_score,
                a.reasoning,
                a.override_note,
            ],
        )?;
    }
    Ok(())
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    async fn load_snapshot(
        &self,
        business_id: &str,
        date_range: DateRange,
    ) -> RepositoryResult<ScheduleSnapshot> {
        let conn = self.get_conn()?;

        let mut shifts = Vec::new();
        for row in Self::query_shift_rows(&conn, business_id, date_range)? {
            let assignments = Self::query_assignments(&conn, &row.shift_id)?;
            shifts.push(Self::row_to_shift(row, assignments)?);
        }

        let mut stmt = conn
            .prepare("SELECT profile_json FROM staff WHERE business_id = ?1 ORDER BY staff_id")?;
        let rows = stmt.query_map(params![business_id], |row| row.get::<_, String>(0))?;
        let mut staff = Vec::new();
        for row in rows {
            staff.push(serde_json::from_str::<StaffCandidate>(&row?)?);
        }

        debug!(
            business_id,
            shifts = shifts.len(),
            staff = staff.len(),
            "排班快照加载完成"
        );
        Ok(ScheduleSnapshot { shifts, staff })
    }

    async fn save_modified_shifts(&self, draft_id: &str, shifts: &[Shift]) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut draft = Self::read_draft(&tx, draft_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "ScheduleDraft".to_string(),
            id: draft_id.to_string(),
        })?;
        if draft.status != DraftStatus::Draft {
            return Err(RepositoryError::InvalidStateTransition {
                from: draft.status.to_string(),
                to: "draft(sync)".to_string(),
            });
        }

        let incoming: HashMap<&str, &Shift> =
            shifts.iter().map(|s| (s.shift_id.as_str(), s)).collect();
        for shift in draft.shifts.iter_mut() {
            if let Some(updated) = incoming.get(shift.shift_id.as_str()) {
                *shift = (*updated).clone();
            }
        }
        draft.recompute_overall_confidence();
        draft.updated_at = chrono::Utc::now();

        Self::write_draft(&tx, &draft)?;
        tx.commit()?;
        Ok(())
    }

    async fn commit_published(&self, draft_id: &str) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let draft = Self::read_draft(&tx, draft_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "ScheduleDraft".to_string(),
            id: draft_id.to_string(),
        })?;
        for shift in &draft.shifts {
            write_shift(&tx, &draft.business_id, shift)?;
        }
        tx.commit()?;

        debug!(draft_id, shifts = draft.shifts.len(), "草案已写入线上排班");
        Ok(())
    }

    async fn save_draft(&self, draft: &ScheduleDraft) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::write_draft(&conn, draft)
    }

    async fn find_draft(&self, draft_id: &str) -> RepositoryResult<Option<ScheduleDraft>> {
        let conn = self.get_conn()?;
        Self::read_draft(&conn, draft_id)
    }

    async fn find_published_overlapping(
        &self,
        business_id: &str,
        date_range: DateRange,
    ) -> RepositoryResult<Vec<ScheduleDraft>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT draft_json FROM schedule_draft
               WHERE business_id = ?1 AND status = 'published'
                 AND range_start <= ?3 AND range_end >= ?2
               ORDER BY range_start"#,
        )?;
        let rows = stmt.query_map(
            params![
                business_id,
                date_range.start.format(DATE_FMT).to_string(),
                date_range.end.format(DATE_FMT).to_string()
            ],
            |row| row.get::<_, String>(0),
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::draft::ScheduleDraft;

    fn store() -> SqliteScheduleStore {
        SqliteScheduleStore::new(Arc::new(Mutex::new(Connection::open_in_memory().unwrap()))).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn t(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_round() {
        let store = store();
        let mut shift = Shift::new("S1", d(2), t(9), t(17), Some("kitchen".into()), 2);
        shift.assignments.push(Assignment::new("A1", "S1", "st1", "Ann"));
        shift.recompute_status();
        store.upsert_shift("B1", &shift).unwrap();
        store
            .upsert_staff("B1", &StaffCandidate::new("st1", "Ann").with_skill("kitchen"))
            .unwrap();
        store
            .upsert_shift("B1", &Shift::new("S9", d(20), t(9), t(17), None, 1))
            .unwrap();

        let snap = store.load_snapshot("B1", DateRange::new(d(1), d(7))).await.unwrap();
        assert_eq!(snap.shifts.len(), 1);
        assert_eq!(snap.shifts[0].status, ShiftStatus::Understaffed);
        assert_eq!(snap.shifts[0].assignments.len(), 1);
        assert!(!snap.shifts[0].assignments[0].is_modified);
        assert_eq!(snap.staff.len(), 1);
    }

    #[tokio::test]
    async fn test_save_modified_shifts_requires_draft() {
        let store = store();
        let err = store.save_modified_shifts("missing", &[]).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));

        let draft = ScheduleDraft::new_manual(
            "D1",
            "B1",
            DateRange::new(d(2), d(2)),
            vec![Shift::new("S1", d(2), t(9), t(17), None, 1)],
        );
        store.save_draft(&draft).await.unwrap();

        let mut changed = draft.shifts[0].clone();
        changed.assignments.push(Assignment::new("A1", "S1", "st1", "Ann"));
        changed.recompute_status();
        store.save_modified_shifts("D1", &[changed]).await.unwrap();

        let loaded = store.find_draft("D1").await.unwrap().unwrap();
        assert_eq!(loaded.shifts[0].status, ShiftStatus::Filled);
    }

    #[tokio::test]
    async fn test_find_published_overlapping() {
        let store = store();
        let mut published = ScheduleDraft::new_manual("P1", "B1", DateRange::new(d(1), d(7)), vec![]);
        published.status = DraftStatus::Published;
        store.save_draft(&published).await.unwrap();
        let other = ScheduleDraft::new_manual("D2", "B1", DateRange::new(d(5), d(9)), vec![]);
        store.save_draft(&other).await.unwrap();

        let found = store
            .find_published_overlapping("B1", DateRange::new(d(6), d(12)))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].draft_id, "P1");
        assert!(store
            .find_published_overlapping("B1", DateRange::new(d(8), d(12)))
            .await
            .unwrap()
            .is_empty());
    }
}
