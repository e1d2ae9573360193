use crate::{
    entities::{activity_log, ActivityEventType, ActivityLogModel},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Append-only writer for the storefront behavior log.
#[derive(Clone)]
pub struct ActivityService {
    db: Arc<DatabaseConnection>,
}

impl ActivityService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Appends one behavior event.
    #[instrument(skip(self, input), fields(event_type = %input.event_type))]
    pub async fn record(&self, input: RecordActivityInput) -> Result<ActivityLogModel, ServiceError> {
        let row = activity_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(input.session_id),
            customer_email: Set(input.customer_email),
            product_id: Set(input.product_id),
            event_type: Set(input.event_type),
            metadata: Set(input.metadata),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        Ok(row)
    }
}

/// Input for appending a behavior event
#[derive(Debug, Deserialize)]
pub struct RecordActivityInput {
    pub session_id: Option<String>,
    pub customer_email: Option<String>,
    pub product_id: Option<Uuid>,
    pub event_type: ActivityEventType,
    pub metadata: Option<serde_json::Value>,
}
