use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    Collection, Database, IndexModel,
    bson::{Document, doc, to_bson},
    options::{IndexOptions, ReturnDocument},
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{Achievement, AchievementStatus},
};

const COLLECTION: &str = "achievements";

/// Fields a draft may change after submission. `None` leaves the stored value as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AchievementChanges {
    pub title: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
}

/// AchievementStore
///
/// Accessor for achievement documents. Reads never return soft-deleted records. Writes
/// that depend on the current status are conditional and report whether a record matched,
/// which is how the workflow detects concurrent transitions.
#[async_trait]
pub trait AchievementStore: Send + Sync {
    async fn insert(&self, achievement: &Achievement) -> AppResult<()>;
    async fn find(&self, achievement_id: &str) -> AppResult<Option<Achievement>>;
    async fn find_many(&self, achievement_ids: &[String]) -> AppResult<Vec<Achievement>>;
    /// Applies `changes` to a draft. `None` when no draft with that id exists.
    async fn update_details(
        &self,
        achievement_id: &str,
        changes: AchievementChanges,
    ) -> AppResult<Option<Achievement>>;
    /// Moves the status from `from` to `to` only if it is still `from`.
    async fn transition(
        &self,
        achievement_id: &str,
        from: AchievementStatus,
        to: AchievementStatus,
    ) -> AppResult<bool>;
    /// Sets the soft-delete flag. Deleting only matches drafts; restoring matches any
    /// deleted record.
    async fn set_deleted(&self, achievement_id: &str, deleted: bool) -> AppResult<bool>;
    /// Hard delete, used only to undo a submit that never became visible.
    async fn remove(&self, achievement_id: &str) -> AppResult<()>;
}

/// AchievementState
///
/// Shared handle to the document store accessor.
pub type AchievementState = Arc<dyn AchievementStore>;

/// MongoAchievementStore
///
/// `AchievementStore` over the MongoDB `achievements` collection. Records are looked up by
/// their `achievement_id` field; the driver-assigned `_id` is never exposed.
#[derive(Clone)]
pub struct MongoAchievementStore {
    collection: Collection<Achievement>,
}

impl MongoAchievementStore {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection::<Achievement>(COLLECTION),
        }
    }

    /// Creates the unique index on `achievement_id`. Safe to call on every start.
    pub async fn ensure_indexes(&self) -> AppResult<()> {
        let index = IndexModel::builder()
            .keys(doc! { "achievement_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection.create_index(index).await?;
        self.collection
            .create_index(IndexModel::builder().keys(doc! { "student_id": 1 }).build())
            .await?;
        Ok(())
    }
}

fn live(achievement_id: &str) -> Document {
    doc! { "achievement_id": achievement_id, "is_deleted": false }
}

#[async_trait]
impl AchievementStore for MongoAchievementStore {
    async fn insert(&self, achievement: &Achievement) -> AppResult<()> {
        self.collection.insert_one(achievement).await?;
        Ok(())
    }

    async fn find(&self, achievement_id: &str) -> AppResult<Option<Achievement>> {
        Ok(self.collection.find_one(live(achievement_id)).await?)
    }

    async fn find_many(&self, achievement_ids: &[String]) -> AppResult<Vec<Achievement>> {
        if achievement_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = achievement_ids.to_vec();
        let cursor = self
            .collection
            .find(doc! { "achievement_id": { "$in": ids }, "is_deleted": false })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_details(
        &self,
        achievement_id: &str,
        changes: AchievementChanges,
    ) -> AppResult<Option<Achievement>> {
        let mut set = doc! { "updated_at": to_bson(&Utc::now())? };
        if let Some(title) = changes.title {
            set.insert("title", title);
        }
        if let Some(category) = changes.category {
            set.insert("category", category);
        }
        if let Some(level) = changes.level {
            set.insert("level", level);
        }
        if let Some(description) = changes.description {
            set.insert("description", description);
        }
        if let Some(date) = changes.date {
            set.insert("date", to_bson(&date)?);
        }

        let mut filter = live(achievement_id);
        filter.insert("status", AchievementStatus::Draft.as_str());

        let updated = self
            .collection
            .find_one_and_update(filter, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated)
    }

    async fn transition(
        &self,
        achievement_id: &str,
        from: AchievementStatus,
        to: AchievementStatus,
    ) -> AppResult<bool> {
        let mut filter = live(achievement_id);
        filter.insert("status", from.as_str());
        let update = doc! {
            "$set": { "status": to.as_str(), "updated_at": to_bson(&Utc::now())? }
        };
        let result = self.collection.update_one(filter, update).await?;
        Ok(result.matched_count > 0)
    }

    async fn set_deleted(&self, achievement_id: &str, deleted: bool) -> AppResult<bool> {
        let mut filter = doc! { "achievement_id": achievement_id, "is_deleted": !deleted };
        if deleted {
            filter.insert("status", AchievementStatus::Draft.as_str());
        }
        let update = doc! {
            "$set": { "is_deleted": deleted, "updated_at": to_bson(&Utc::now())? }
        };
        let result = self.collection.update_one(filter, update).await?;
        Ok(result.matched_count > 0)
    }

    async fn remove(&self, achievement_id: &str) -> AppResult<()> {
        self.collection
            .delete_one(doc! { "achievement_id": achievement_id })
            .await?;
        Ok(())
    }
}
