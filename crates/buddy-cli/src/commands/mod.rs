pub mod analyze;
pub mod config;
pub mod helpers;
pub mod replay;
