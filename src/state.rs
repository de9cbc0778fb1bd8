//! Shared application state.

use crate::executor::Executor;
use crate::store::FileStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FileStore>,
    pub executor: Arc<Executor>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: Arc<dyn FileStore>, executor: Executor, api_key: Option<String>) -> Self {
        Self {
            store,
            executor: Arc::new(executor),
            api_key: api_key.map(Arc::from),
        }
    }
}
