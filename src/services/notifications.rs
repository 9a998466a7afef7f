// In-app notifications

use tracing::info;

use super::ledger::notify;
use super::{bounded_text, rbac, ServiceContext};
use crate::core::errors::{GameError, GameResult};
use crate::core::models::{Notification, Page, PageRequest, Permission};

pub struct NotificationService {
    ctx: ServiceContext,
}

impl NotificationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn list(
        &self,
        user_id: i64,
        unread_only: bool,
        page: PageRequest,
    ) -> GameResult<Page<Notification>> {
        let mut tx = self.ctx.store.begin().await?;
        let (items, total) = tx.notifications_of_user(user_id, unread_only, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn unread_count(&self, user_id: i64) -> GameResult<i64> {
        let mut tx = self.ctx.store.begin().await?;
        tx.count_unread_notifications(user_id).await
    }

    /// Marking an already read notification is a no-op
    pub async fn mark_read(&self, user_id: i64, notification_id: i64) -> GameResult<Notification> {
        let mut tx = self.ctx.store.begin().await?;
        let mut notification = tx
            .notification_by_id(notification_id)
            .await?
            .filter(|n| n.user_id == user_id)
            .ok_or_else(|| GameError::not_found("Notification"))?;
        if !notification.is_read {
            notification.is_read = true;
            notification.read_at = Some(self.ctx.clock.now());
            tx.update_notification(&notification).await?;
            tx.commit().await?;
        }
        Ok(notification)
    }

    /// Returns how many notifications changed
    pub async fn mark_all_read(&self, user_id: i64) -> GameResult<i64> {
        let mut tx = self.ctx.store.begin().await?;
        let changed = tx
            .mark_all_notifications_read(user_id, self.ctx.clock.now())
            .await?;
        tx.commit().await?;
        Ok(changed)
    }

    pub async fn send(
        &self,
        staff_id: i64,
        user_id: i64,
        title: &str,
        message: &str,
    ) -> GameResult<Notification> {
        let title = bounded_text("Title", title, 1, 100)?;
        let message = bounded_text("Message", message, 1, 2000)?;
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), staff_id, Permission::CustomerService).await?;
        tx.user_by_id(user_id)
            .await?
            .ok_or_else(|| GameError::not_found("User"))?;
        let notification = notify(tx.as_mut(), user_id, title, message, self.ctx.clock.now()).await?;
        tx.commit().await?;
        info!(staff_id, user_id, "Notification sent");
        Ok(notification)
    }
}
