pub mod health;
pub mod status;
pub mod types;
pub mod upload;

pub use types::*;

pub use health::health_check;
pub use status::get_task_status;
pub use upload::upload_to_json;
