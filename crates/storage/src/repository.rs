use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learn_core::model::{ActivityId, CompletionRecord, LessonId, StudentId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable string key-value storage.
///
/// Values are opaque to the store; callers own the encoding.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Repository contract for per-student completion records.
#[async_trait]
pub trait CompletionRepository: Send + Sync {
    /// Fetch a student's record. Students with no completions get an empty record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be loaded.
    async fn get_record(&self, student: &StudentId) -> Result<CompletionRecord, StorageError>;

    /// Mark a lesson as finished. Returns `true` if it was not recorded before.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the completion cannot be stored.
    async fn mark_lesson_complete(
        &self,
        student: &StudentId,
        lesson: &LessonId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Mark an activity as finished. Returns `true` if it was not recorded before.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the completion cannot be stored.
    async fn mark_activity_complete(
        &self,
        student: &StudentId,
        activity: &ActivityId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Every student's record, ordered by student id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if records cannot be loaded.
    async fn list_records(&self) -> Result<Vec<CompletionRecord>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    entries: Arc<Mutex<HashMap<String, String>>>,
    records: Arc<Mutex<BTreeMap<StudentId, CompletionRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            records: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    fn update_record(
        &self,
        student: &StudentId,
        apply: impl FnOnce(&mut CompletionRecord) -> bool,
    ) -> Result<bool, StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let record = guard
            .entry(student.clone())
            .or_insert_with(|| CompletionRecord::new(student.clone()));
        Ok(apply(record))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[async_trait]
impl CompletionRepository for InMemoryRepository {
    async fn get_record(&self, student: &StudentId) -> Result<CompletionRecord, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(student)
            .cloned()
            .unwrap_or_else(|| CompletionRecord::new(student.clone())))
    }

    async fn mark_lesson_complete(
        &self,
        student: &StudentId,
        lesson: &LessonId,
        _completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        self.update_record(student, |record| record.insert_lesson(lesson.clone()))
    }

    async fn mark_activity_complete(
        &self,
        student: &StudentId,
        activity: &ActivityId,
        _completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        self.update_record(student, |record| record.insert_activity(activity.clone()))
    }

    async fn list_records(&self) -> Result<Vec<CompletionRecord>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.values().cloned().collect())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub kv: Arc<dyn KeyValueStore>,
    pub completions: Arc<dyn CompletionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let kv: Arc<dyn KeyValueStore> = Arc::new(repo.clone());
        let completions: Arc<dyn CompletionRepository> = Arc::new(repo);
        Self { kv, completions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::time::fixed_now;

    fn student(id: &str) -> StudentId {
        StudentId::new(id).unwrap()
    }

    #[tokio::test]
    async fn kv_overwrites_previous_value() {
        let repo = InMemoryRepository::new();
        assert_eq!(repo.get("k").await.unwrap(), None);
        repo.put("k", "one").await.unwrap();
        repo.put("k", "two").await.unwrap();
        assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn unknown_student_has_empty_record() {
        let repo = InMemoryRepository::new();
        let record = repo.get_record(&student("ana")).await.unwrap();
        assert!(record.completed_lessons().is_empty());
        assert!(record.completed_activities().is_empty());
        assert_eq!(record.student(), &student("ana"));
    }

    #[tokio::test]
    async fn completions_accumulate_per_student() {
        let repo = InMemoryRepository::new();
        let ana = student("ana");
        let lesson = LessonId::new("l1").unwrap();
        let quiz = ActivityId::new("q1").unwrap();

        assert!(repo.mark_lesson_complete(&ana, &lesson, fixed_now()).await.unwrap());
        assert!(!repo.mark_lesson_complete(&ana, &lesson, fixed_now()).await.unwrap());
        assert!(repo.mark_activity_complete(&ana, &quiz, fixed_now()).await.unwrap());
        repo.mark_lesson_complete(&student("bo"), &lesson, fixed_now())
            .await
            .unwrap();

        let record = repo.get_record(&ana).await.unwrap();
        assert_eq!(record.completed_lessons().len(), 1);
        assert!(record.completed_activities().contains(&quiz));

        let all = repo.list_records().await.unwrap();
        let names: Vec<&str> = all.iter().map(|r| r.student().as_str()).collect();
        assert_eq!(names, vec!["ana", "bo"]);
    }
}
