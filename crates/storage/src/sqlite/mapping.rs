use learn_core::model::{ActivityId, CompletionRecord, LessonId, StudentId};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Discriminator stored in `completed_items.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemKind {
    Lesson,
    Activity,
}

impl ItemKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ItemKind::Lesson => "lesson",
            ItemKind::Activity => "activity",
        }
    }

    pub(crate) fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "lesson" => Ok(ItemKind::Lesson),
            "activity" => Ok(ItemKind::Activity),
            _ => Err(StorageError::Serialization(format!("invalid item kind: {s}"))),
        }
    }
}

/// Fold one `completed_items` row into `record`.
pub(crate) fn apply_item_row(
    record: &mut CompletionRecord,
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(), StorageError> {
    let kind: String = row.try_get("kind").map_err(ser)?;
    let item_id: String = row.try_get("item_id").map_err(ser)?;
    match ItemKind::parse(&kind)? {
        ItemKind::Lesson => {
            record.insert_lesson(LessonId::new(item_id).map_err(ser)?);
        }
        ItemKind::Activity => {
            record.insert_activity(ActivityId::new(item_id).map_err(ser)?);
        }
    }
    Ok(())
}

pub(crate) fn student_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StudentId, StorageError> {
    let raw: String = row.try_get("student_id").map_err(ser)?;
    StudentId::new(raw).map_err(ser)
}
