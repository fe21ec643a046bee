mod auth;
mod health_check;
mod protected;
mod users;

pub use auth::{jwks, login, logout, refresh};
pub use health_check::health_check;
pub use protected::{protected_data, protected_stats};
pub use users::{create_user, delete_user, get_user, list_users};
