//! Wiring shared by every command: one transport, one session store.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bookfetch_core::auth::{ServiceConfig, Session, SessionManager, SessionStore};
use bookfetch_core::catalog::{Catalog, CatalogConfig};
use bookfetch_core::transport::{
    RateLimitConfig, RetryPolicy, Transport, TransportConfig, constants::DEFAULT_BUCKET_CAPACITY,
};
use tracing::debug;

use crate::cli::Args;

pub struct AppContext {
    pub transport: Arc<Transport>,
    pub service: ServiceConfig,
    pub catalog: CatalogConfig,
    pub store: SessionStore,
}

impl AppContext {
    pub fn from_args(args: &Args) -> Result<Self> {
        let rate_limit = if args.rate_limit > 0.0 {
            debug!(per_sec = args.rate_limit, "rate limiting enabled");
            RateLimitConfig::Bucket {
                capacity: DEFAULT_BUCKET_CAPACITY,
                refill_per_sec: args.rate_limit,
            }
        } else {
            debug!("rate limiting disabled");
            RateLimitConfig::Disabled
        };
        let config = TransportConfig {
            retry: RetryPolicy::with_max_retries(u32::from(args.max_retries)),
            rate_limit,
            ..TransportConfig::default()
        };
        let transport = Transport::new(config).context("Failed to build HTTP client")?;

        let (service, catalog) = match args.base_url.as_deref().filter(|url| !url.is_empty()) {
            Some(base) => (
                ServiceConfig::default().with_base_url(base),
                CatalogConfig::with_base_url(base),
            ),
            None => (ServiceConfig::default(), CatalogConfig::default()),
        };

        let store = match &args.session_file {
            Some(path) => SessionStore::new(path),
            None => SessionStore::default_location()
                .context("Cannot locate a config directory for the session file")?,
        };

        Ok(Self {
            transport: Arc::new(transport),
            service,
            catalog,
            store,
        })
    }

    pub fn session_manager(&self) -> SessionManager {
        SessionManager::new(Arc::clone(&self.transport), self.service.clone())
            .with_store(self.store.clone())
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(Arc::clone(&self.transport), self.catalog.clone())
    }

    /// The saved session, or an error telling the user how to get one.
    pub fn require_session(&self) -> Result<Session> {
        match self.session_manager().current_session() {
            Some(session) => Ok(session),
            None => bail!("No valid session. Run `bookfetch login` or `bookfetch import-cookies` first."),
        }
    }
}
