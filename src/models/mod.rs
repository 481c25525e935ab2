pub mod user;
pub mod profile;
pub mod api_log;
pub mod telegram_user;

pub use user::{User, RegisterRequest, LoginRequest, PasswordResetRequest};
pub use profile::{ProfileResponse, UpdateProfileRequest};
pub use api_log::ApiLogEntry;
pub use telegram_user::TelegramUser;
