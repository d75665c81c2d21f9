//! Payload validation performed before a notification is routed.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use herald_common::error::AppError;
use herald_common::types::NotificationPayload;

/// `scheme://articles/<id>`
static ARTICLE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://articles/[^/?#\s]+$").expect("article link pattern")
});

/// Check that an `ARTICLE_LINK` notification points at an article.
pub fn validate_article_link(deep_link: Option<&str>) -> Result<(), AppError> {
    match deep_link {
        Some(link) if ARTICLE_LINK.is_match(link) => Ok(()),
        Some(link) => Err(AppError::Validation(format!(
            "Invalid article deep link format: {}",
            link
        ))),
        None => Err(AppError::Validation(
            "Article link notification has no deep link".to_string(),
        )),
    }
}

/// Read the delivery time of a `SCHEDULED` notification from `data.scheduledFor`.
///
/// Accepts an RFC 3339 string or epoch milliseconds.
pub fn scheduled_for(payload: &NotificationPayload) -> Result<DateTime<Utc>, AppError> {
    let value = payload
        .data
        .get("scheduledFor")
        .or_else(|| payload.data.get("scheduled_for"))
        .filter(|v| !v.is_null())
        .ok_or_else(|| {
            AppError::Validation("Scheduled notification is missing scheduledFor".to_string())
        })?;

    if let Some(raw) = value.as_str() {
        return DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| AppError::Validation(format!("Invalid scheduledFor '{}': {}", raw, e)));
    }

    value
        .as_i64()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| AppError::Validation(format!("Invalid scheduledFor value: {}", value)))
}
