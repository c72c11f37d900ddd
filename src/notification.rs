use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tracing::info;

use crate::api::ApiClient;
use crate::error::Result;
use crate::models::{Notification, NotificationView};
use crate::query::{Query, Relation};

/// Notifications currently in their validity window for any of the given
/// contest cycles, pinned first and then by priority.
pub async fn fetch_user_notifications(
    api: &ApiClient,
    contest_cycle_ids: &[i64],
    now: DateTime<Utc>,
) -> Result<Vec<NotificationView>> {
    if contest_cycle_ids.is_empty() {
        return Ok(Vec::new());
    }

    let now = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let query = Query::new()
        .filters(json!({
            "contestCycle": { "id": { "$in": contest_cycle_ids } },
            "initialDate": { "$lte": now },
            "finalDate": { "$gte": now },
        }))
        .populate("contestCycle", Relation::new().fields(["name"]))
        .sort("pinned:desc")
        .sort("priority:desc");

    let notifications: Vec<Notification> = api.get_data("/api/notifications", &query).await?;
    info!("Fetched {} active notifications", notifications.len());

    Ok(notifications.into_iter().map(NotificationView::from).collect())
}

pub async fn fetch_notification_by_id(api: &ApiClient, id: i64) -> Result<NotificationView> {
    let query = Query::new().populate("contestCycle", Relation::new().fields(["name"]));
    let notification: Notification = api
        .get_data(&format!("/api/notifications/{}", id), &query)
        .await?;
    Ok(notification.into())
}
