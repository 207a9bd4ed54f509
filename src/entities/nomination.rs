use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "nominations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub category: String,
    pub nominee_type: String, // person | company
    pub nominee_name: String,
    pub nominee_first_name: Option<String>,
    pub nominee_last_name: Option<String>,
    pub nominee_email: Option<String>,
    pub nominee_job_title: Option<String>,
    pub nominee_company: Option<String>,
    pub linkedin_url: String,
    pub website_url: Option<String>,
    pub image_url: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub why_nominated: String,
    pub nominator_name: String,
    pub nominator_email: String,
    pub status: String, // draft | approved | rejected
    #[sea_orm(unique)]
    pub live_slug: Option<String>,
    pub source: String, // public | bulk
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub moderated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vote::Entity")]
    Vote,
}

impl Related<super::vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vote.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
