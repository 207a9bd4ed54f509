//! Pending CRM pushes recorded alongside nomination and vote writes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crm_sync_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// nomination_submitted | nomination_status_changed | vote_cast
    pub kind: String,
    /// Email of the contact the event is keyed on
    pub subject_email: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,
    /// pending | synced | failed
    pub status: String,
    pub attempts: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub processed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
