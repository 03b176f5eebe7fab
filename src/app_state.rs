use std::sync::Arc;

use crate::{aliases::DbPool, auth::token::TokenKeys};

/// Per-request handles injected into every handler through axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub tokens: Arc<TokenKeys>,
}

impl AppState {
    pub fn new(db_pool: DbPool, tokens: TokenKeys) -> Self {
        Self {
            db_pool,
            tokens: Arc::new(tokens),
        }
    }
}
