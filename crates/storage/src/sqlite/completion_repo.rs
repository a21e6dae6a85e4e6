use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learn_core::model::{ActivityId, CompletionRecord, LessonId, StudentId};

use crate::repository::{CompletionRepository, StorageError};

use super::SqliteRepository;
use super::mapping::{ItemKind, apply_item_row, student_from_row};

impl SqliteRepository {
    async fn insert_item(
        &self,
        student: &StudentId,
        kind: ItemKind,
        item_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r"
            INSERT INTO completed_items (student_id, kind, item_id, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(student_id, kind, item_id) DO NOTHING
            ",
        )
        .bind(student.as_str())
        .bind(kind.as_str())
        .bind(item_id)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CompletionRepository for SqliteRepository {
    async fn get_record(&self, student: &StudentId) -> Result<CompletionRecord, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT kind, item_id
            FROM completed_items
            WHERE student_id = ?1
            ",
        )
        .bind(student.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        let mut record = CompletionRecord::new(student.clone());
        for row in &rows {
            apply_item_row(&mut record, row)?;
        }
        Ok(record)
    }

    async fn mark_lesson_complete(
        &self,
        student: &StudentId,
        lesson: &LessonId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        self.insert_item(student, ItemKind::Lesson, lesson.as_str(), completed_at)
            .await
    }

    async fn mark_activity_complete(
        &self,
        student: &StudentId,
        activity: &ActivityId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        self.insert_item(student, ItemKind::Activity, activity.as_str(), completed_at)
            .await
    }

    async fn list_records(&self) -> Result<Vec<CompletionRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT student_id, kind, item_id
            FROM completed_items
            ORDER BY student_id
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        let mut records: Vec<CompletionRecord> = Vec::new();
        for row in &rows {
            let student = student_from_row(row)?;
            let start_new = records.last().is_none_or(|last| last.student() != &student);
            if start_new {
                records.push(CompletionRecord::new(student));
            }
            if let Some(record) = records.last_mut() {
                apply_item_row(record, row)?;
            }
        }
        Ok(records)
    }
}
