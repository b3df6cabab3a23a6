//! Shared fakes for controller integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use capsule_rs::configuration::{ConfigurationClient, ConfigurationError};
use capsule_rs::operator::{CapsuleConfiguration, CapsuleConfigurationSpec};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const TARGET: &str = "capsule-default";

pub fn configuration(name: &str, regex: Option<&str>) -> CapsuleConfiguration {
    CapsuleConfiguration::new(
        name,
        CapsuleConfigurationSpec {
            protected_namespace_regex: regex.map(str::to_string),
            ..Default::default()
        },
    )
}

fn unavailable(name: &str) -> ConfigurationError {
    ConfigurationError::Retrieval {
        name: name.to_string(),
        source: kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "the server is currently unable to handle the request".to_string(),
            reason: "ServiceUnavailable".to_string(),
            code: 503,
        }),
    }
}

/// In-memory cluster state that remembers every lookup.
#[derive(Default)]
pub struct RecordingClient {
    stored: Mutex<HashMap<String, CapsuleConfiguration>>,
    calls: Mutex<Vec<String>>,
    failures_left: AtomicUsize,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, configuration: CapsuleConfiguration) -> Self {
        let name = configuration.metadata.name.clone().unwrap_or_default();
        self.stored.lock().unwrap().insert(name, configuration);
        self
    }

    /// Fail the next `count` lookups with a retryable API error.
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigurationClient for RecordingClient {
    async fn get_configuration(
        &self,
        name: &str,
    ) -> Result<Option<CapsuleConfiguration>, ConfigurationError> {
        self.calls.lock().unwrap().push(name.to_string());

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(unavailable(name));
        }

        Ok(self.stored.lock().unwrap().get(name).cloned())
    }
}
