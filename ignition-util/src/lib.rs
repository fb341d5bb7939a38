pub mod dirs;
pub mod types;
