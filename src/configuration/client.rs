//! Read access to `CapsuleConfiguration` resources

use super::ConfigurationError;
use crate::operator::CapsuleConfiguration;
use async_trait::async_trait;
use kube::{Api, Client};

/// Data-access seam used by the configuration accessor.
///
/// The production implementation talks to the API server; tests substitute
/// their own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigurationClient: Send + Sync {
    /// Fetch the named configuration. `Ok(None)` means the resource does not exist.
    async fn get_configuration(
        &self,
        name: &str,
    ) -> Result<Option<CapsuleConfiguration>, ConfigurationError>;
}

/// [`ConfigurationClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeConfigurationClient {
    api: Api<CapsuleConfiguration>,
}

impl KubeConfigurationClient {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl ConfigurationClient for KubeConfigurationClient {
    async fn get_configuration(
        &self,
        name: &str,
    ) -> Result<Option<CapsuleConfiguration>, ConfigurationError> {
        self.api
            .get_opt(name)
            .await
            .map_err(|source| ConfigurationError::Retrieval {
                name: name.to_string(),
                source,
            })
    }
}
