pub mod announcements;
pub mod attendance;
pub mod backup_exchange;
pub mod core;
pub mod courses;
pub mod reports;
pub mod scores;
pub mod setup;
pub mod students;
