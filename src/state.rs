use std::sync::Arc;

use crate::api_client::UpstreamClient;
use crate::auth::AuthManager;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    config: Config,
    auth: AuthManager,
    upstream: UpstreamClient,
}

impl AppState {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let auth = AuthManager::new(&config);
        let upstream = UpstreamClient::new(
            &config.upstream_base_url,
            config.upstream_api_key.clone(),
            config.upstream_timeout,
        )?;
        Ok(Self {
            inner: Arc::new(InnerState {
                config,
                auth,
                upstream,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn auth(&self) -> &AuthManager {
        &self.inner.auth
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.inner.upstream
    }
}
