mod csrf;
mod health;
mod ventures;

pub use csrf::issue_csrf_token;
pub use health::health_check;
pub use ventures::{create_venture, delete_venture, get_venture, list_ventures, update_venture};
