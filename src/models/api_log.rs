use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiLogEntry {
    pub id: String,
    pub endpoint: String,
    pub method: String,
    pub user_id: Option<String>,
    pub user_username: Option<String>,
    pub ip_address: String,
    pub timestamp: String,
    pub response_status: i64,
    pub response_time: f64,
}
