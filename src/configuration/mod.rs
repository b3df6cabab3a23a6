//! Capsule Configuration
//!
//! Accessor over the cluster-wide `CapsuleConfiguration` resource. Every
//! getter reads the resource again, so an accessor never serves stale data
//! and is cheap to throw away after a reconciliation.

mod client;

pub use client::{ConfigurationClient, KubeConfigurationClient};

#[cfg(test)]
pub use client::MockConfigurationClient;

use crate::operator::CapsuleConfigurationSpec;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised while reading or interpreting the configuration
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("cannot retrieve Capsule configuration with name {name}")]
    Retrieval {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("cannot compile the protected namespace regexp {expression:?}")]
    InvalidProtectedNamespaceRegex {
        expression: String,
        #[source]
        source: regex::Error,
    },
}

impl ConfigurationError {
    /// True when the error comes from the configuration body itself rather
    /// than from reaching the API server.
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, Self::InvalidProtectedNamespaceRegex { .. })
    }
}

/// Compile the protected namespace pattern. Absent or empty means no pattern.
pub fn compile_protected_namespace_regex(
    expression: Option<&str>,
) -> Result<Option<Regex>, ConfigurationError> {
    match expression {
        None | Some("") => Ok(None),
        Some(expression) => Regex::new(expression).map(Some).map_err(|source| {
            ConfigurationError::InvalidProtectedNamespaceRegex {
                expression: expression.to_string(),
                source,
            }
        }),
    }
}

/// Accessor bound to one client and one configuration name
pub struct CapsuleConfigurationAccessor<C: ?Sized> {
    client: Arc<C>,
    name: String,
}

impl<C> CapsuleConfigurationAccessor<C>
where
    C: ConfigurationClient + ?Sized,
{
    pub fn new(client: Arc<C>, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve(&self) -> Result<CapsuleConfigurationSpec, ConfigurationError> {
        match self.client.get_configuration(&self.name).await? {
            Some(configuration) => Ok(configuration.spec),
            None => {
                debug!(name = %self.name, "CapsuleConfiguration not found, using defaults");
                Ok(CapsuleConfigurationSpec::default())
            }
        }
    }

    pub async fn protected_namespace_regex(&self) -> Result<Option<Regex>, ConfigurationError> {
        let spec = self.retrieve().await?;
        compile_protected_namespace_regex(spec.protected_namespace_regex.as_deref())
    }

    pub async fn user_groups(&self) -> Result<Vec<String>, ConfigurationError> {
        Ok(self.retrieve().await?.user_groups)
    }

    pub async fn force_tenant_prefix(&self) -> Result<bool, ConfigurationError> {
        Ok(self.retrieve().await?.force_tenant_prefix)
    }

    /// Run every check a reconciliation depends on.
    pub async fn validate(&self) -> Result<(), ConfigurationError> {
        self.protected_namespace_regex().await.map(|_| ())
    }
}
