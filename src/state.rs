use crate::config::Config;
use crate::engine::AttemptEngine;
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub engine: AttemptEngine,
    pub config: Config,
}

impl FromRef<AppState> for AttemptEngine {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
