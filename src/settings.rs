use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait};

use crate::config::SiteDefaults;
use crate::entities::site_setting;
use crate::models::settings::SiteSettingsView;

pub const KEY_NOMINATIONS_OPEN: &str = "nominations_open";
pub const KEY_VOTING_OPEN: &str = "voting_open";
pub const KEY_VOTING_CLOSES_AT: &str = "voting_closes_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSettings {
    pub nominations_open: bool,
    pub voting_open: bool,
    pub voting_closes_at: Option<DateTime<Utc>>,
}

impl SiteSettings {
    /// Builds settings from stored rows; unknown keys and unparsable values are ignored.
    pub fn from_rows(rows: &[site_setting::Model], defaults: &SiteDefaults) -> Self {
        let mut settings = Self {
            nominations_open: defaults.nominations_open,
            voting_open: defaults.voting_open,
            voting_closes_at: None,
        };

        for row in rows {
            match row.key.as_str() {
                KEY_NOMINATIONS_OPEN => {
                    if let Some(value) = parse_bool(&row.value) {
                        settings.nominations_open = value;
                    }
                }
                KEY_VOTING_OPEN => {
                    if let Some(value) = parse_bool(&row.value) {
                        settings.voting_open = value;
                    }
                }
                KEY_VOTING_CLOSES_AT => {
                    settings.voting_closes_at = DateTime::parse_from_rfc3339(row.value.trim())
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc));
                }
                _ => {}
            }
        }

        settings
    }

    pub fn voting_active_at(&self, now: DateTime<Utc>) -> bool {
        self.voting_open && self.voting_closes_at.is_none_or(|closes| now < closes)
    }

    pub fn view(&self, now: DateTime<Utc>) -> SiteSettingsView {
        SiteSettingsView {
            nominations_open: self.nominations_open,
            voting_open: self.voting_open,
            voting_closes_at: self.voting_closes_at,
            voting_active: self.voting_active_at(now),
        }
    }
}

pub async fn load<C: ConnectionTrait>(db: &C, defaults: &SiteDefaults) -> Result<SiteSettings, DbErr> {
    let rows = site_setting::Entity::find().all(db).await?;
    Ok(SiteSettings::from_rows(&rows, defaults))
}

/// Upserts one key.
pub async fn store<C: ConnectionTrait>(db: &C, key: &str, value: String) -> Result<(), DbErr> {
    let row = site_setting::ActiveModel {
        key: Set(key.to_string()),
        value: Set(value),
        updated_at: Set(Utc::now().fixed_offset()),
    };
    site_setting::Entity::insert(row)
        .on_conflict(
            OnConflict::column(site_setting::Column::Key)
                .update_columns([site_setting::Column::Value, site_setting::Column::UpdatedAt])
                .to_owned(),
        )
        .exec(db)
        .await?;
    Ok(())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
