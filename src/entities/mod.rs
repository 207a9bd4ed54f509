pub mod crm_sync_event;
pub mod nomination;
pub mod site_setting;
pub mod vote;
