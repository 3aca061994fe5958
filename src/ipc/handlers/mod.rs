pub mod attendance;
pub mod auth;
pub mod cards;
pub mod core;
pub mod scan;
pub mod settings;
pub mod students;
