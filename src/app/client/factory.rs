//! Client construction and reuse
//!
//! Requests that keep every default share one client. Any request whose
//! [`ClientProfile`] differs gets a dedicated client, memoised per profile.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::app::models::Request;
use crate::errors::ClientResult;

use super::config::{ClientConfig, ClientProfile};
use super::http::ReqwestTransport;
use super::retry::RetryHandler;
use super::transport::Transport;

/// Builds transports for client profiles
pub trait TransportFactory: Send + Sync + fmt::Debug {
    fn create(&self, profile: &ClientProfile) -> ClientResult<Arc<dyn Transport>>;
}

/// Factory producing [`ReqwestTransport`]s
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransportFactory {
    config: ClientConfig,
}

impl ReqwestTransportFactory {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl TransportFactory for ReqwestTransportFactory {
    fn create(&self, profile: &ClientProfile) -> ClientResult<Arc<dyn Transport>> {
        let transport: Arc<dyn Transport> =
            Arc::new(ReqwestTransport::from_profile(&self.config, profile)?);
        Ok(transport)
    }
}

/// A transport paired with the retry policy of its profile
#[derive(Debug, Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    retry: RetryHandler,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryHandler) -> Self {
        Self { transport, retry }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn retry_handler(&self) -> &RetryHandler {
        &self.retry
    }
}

/// Hands out the shared default client or a memoised dedicated one
#[derive(Debug)]
pub struct ClientRegistry {
    config: ClientConfig,
    factory: Arc<dyn TransportFactory>,
    default_client: HttpClient,
    dedicated: Mutex<HashMap<ClientProfile, HttpClient>>,
}

impl ClientRegistry {
    /// Build the registry and its default client
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the default client cannot be built
    pub fn new(config: ClientConfig, factory: Arc<dyn TransportFactory>) -> ClientResult<Self> {
        let base = config.base_profile();
        let default_client = HttpClient::new(factory.create(&base)?, Self::retry_for(&config, &base));
        Ok(Self {
            config,
            factory,
            default_client,
            dedicated: Mutex::new(HashMap::new()),
        })
    }

    /// Client to execute `request` with
    pub fn client_for(&self, request: &Request) -> ClientResult<HttpClient> {
        let profile = ClientProfile::for_request(request);
        if request.is_base_request() || profile == self.config.base_profile() {
            return Ok(self.default_client.clone());
        }

        let mut dedicated = self.dedicated.lock();
        if let Some(client) = dedicated.get(&profile) {
            return Ok(client.clone());
        }

        let client = HttpClient::new(
            self.factory.create(&profile)?,
            Self::retry_for(&self.config, &profile),
        );
        debug!("Created dedicated client for profile {:?}", profile);
        dedicated.insert(profile, client.clone());
        Ok(client)
    }

    pub fn default_client(&self) -> &HttpClient {
        &self.default_client
    }

    /// Number of dedicated clients built so far
    pub fn dedicated_count(&self) -> usize {
        self.dedicated.lock().len()
    }

    fn retry_for(config: &ClientConfig, profile: &ClientProfile) -> RetryHandler {
        RetryHandler::new(profile.max_retries, config.retry_sleep)
    }
}
