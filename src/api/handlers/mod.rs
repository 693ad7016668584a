pub mod detector;
pub mod files;
pub mod health;
pub mod process;
