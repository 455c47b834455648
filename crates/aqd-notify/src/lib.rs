use std::sync::Arc;

use aqd_core::{Notification, NotificationKind, NotificationStore, Result, ServiceError};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Per-user inbox of notifications raised by workflow events.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    pub async fn notify(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            kind,
            payload,
            read: false,
            created_at: Utc::now(),
            read_at: None,
        };
        self.store.insert_notification(&notification).await?;
        info!(
            notification_id = %notification.id,
            user_id = %user_id,
            kind = kind.as_str(),
            "notification created"
        );
        Ok(notification)
    }

    /// Unread count for the badge. Never fails: an unknown user has nothing
    /// unread, and a failed lookup is logged and reported as zero so the
    /// surrounding page still renders.
    pub async fn get_unread_count(&self, user_id: Uuid) -> u64 {
        match self.store.count_unread(user_id).await {
            Ok(count) => u64::try_from(count).unwrap_or(0),
            Err(err) => {
                warn!(user_id = %user_id, "unread count lookup failed, reporting 0: {err:#}");
                0
            }
        }
    }

    pub async fn list_notifications(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Notification>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Ok(self.store.notifications_for_user(user_id, limit).await?)
    }

    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<Notification> {
        let existing = self
            .store
            .get_notification(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("notification", id))?;

        if existing.user_id != user_id {
            return Err(ServiceError::unauthorized(
                "notification belongs to another user",
            ));
        }
        if existing.read {
            return Ok(existing);
        }

        self.store
            .mark_read(id, Utc::now())
            .await?
            .ok_or_else(|| ServiceError::not_found("notification", id))
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let changed = self.store.mark_all_read(user_id, Utc::now()).await?;
        Ok(changed)
    }
}
