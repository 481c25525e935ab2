use sqlx::SqlitePool;

use crate::tasks::TaskQueue;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub tasks: TaskQueue,
}

impl AppState {
    pub fn new(pool: SqlitePool, tasks: TaskQueue) -> Self {
        Self { pool, tasks }
    }
}
