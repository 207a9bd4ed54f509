pub mod admin;
pub mod nomination;
pub mod settings;
pub mod sync;
pub mod vote;
