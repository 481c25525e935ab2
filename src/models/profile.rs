use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: Value,
    pub telegram_username: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// PUT replaces the whole profile: omitted fields are cleared.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub telegram_username: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
}
