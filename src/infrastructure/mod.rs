pub mod detector;
pub mod staging;
