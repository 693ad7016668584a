pub mod manage;
pub mod types;
pub mod upload;

pub use manage::*;
pub use types::*;
pub use upload::*;
