pub mod core {
    pub mod db;
    pub mod errors;
    pub mod helpers;
    pub mod query_params;
    pub mod static_server;
    pub mod store;
}

pub mod models {
    #[allow(clippy::module_inception)]
    pub mod models;
}

pub mod auth;
pub mod blocks;
pub mod config;
pub mod friends;
pub mod handlers;
pub mod messages;
pub mod notifications;
pub mod posts;
pub mod privacy;
pub mod templates;
pub mod users;
pub mod visibility;

#[cfg(not(target_arch = "wasm32"))]
pub mod server;

use crate::config::Config;
use crate::core::store::Repository;

/// Everything a handler needs: the document repository and the settings.
pub struct App {
    pub repo: Repository,
    pub config: Config,
}

impl App {
    pub fn new(repo: Repository, config: Config) -> Self {
        Self { repo, config }
    }

    /// Opens the file-backed store under `config.data_dir`, seeding the demo
    /// accounts when asked to.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn open(config: Config) -> anyhow::Result<Self> {
        use crate::core::store::FileStore;

        let repo = Repository::new(FileStore::open(&config.data_dir)?);
        if config.seed_demo {
            crate::core::db::init_test_data(&repo)?;
        }
        Ok(Self::new(repo, config))
    }
}

#[cfg(target_arch = "wasm32")]
mod component {
    use spin_sdk::http::{IntoResponse, Request};
    use spin_sdk::http_component;

    use crate::config::Config;
    use crate::core::store::{Repository, SpinStore};
    use crate::App;

    #[http_component]
    fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
        let app = App::new(Repository::new(SpinStore), Config::from_env());
        if app.config.seed_demo {
            if let Err(e) = crate::core::db::init_test_data(&app.repo) {
                tracing::warn!(error = %e, "demo seeding failed");
            }
        }
        Ok(crate::handlers::handle_request(&app, req))
    }
}
