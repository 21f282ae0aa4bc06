//! The [`Provisioner`] trait and its HTTP implementation.

use async_trait::async_trait;
use fleet_core::InstanceId;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};
use crate::types::{
    DeploymentAccepted, DeploymentSummary, ProvisionConfig, StopOutcome, CONNECTION_EVENT_PATH,
    DEPLOYMENT_EVENT_PATH, INSTANCE_EVENT_PATH,
};

/// Application metadata forwarded to a new deployment.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Environment variable carrying the connection report URL.
pub const ENV_CONNECTION_EVENT_URL: &str = "FLEET_CONNECTION_EVENT_URL";

/// Environment variable carrying the instance action URL.
pub const ENV_INSTANCE_EVENT_URL: &str = "FLEET_INSTANCE_EVENT_URL";

/// Environment variable carrying the caller metadata as JSON.
pub const ENV_INSTANCE_METADATA: &str = "FLEET_INSTANCE_METADATA";

/// Upper bound on pages fetched by a single listing.
const MAX_LIST_PAGES: u32 = 1_000;

/// Trait for the remote deployment fabric.
///
/// This trait abstracts the provider API, allowing for mock
/// implementations in tests.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Ask the fabric for a new deployment near `location_hints`.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Rejected` if the provider does not accept
    /// the request, or a transport error.
    async fn create_deployment(
        &self,
        location_hints: &[String],
        metadata: &Metadata,
    ) -> Result<DeploymentAccepted>;

    /// Ask the fabric to stop a deployment.
    ///
    /// # Errors
    ///
    /// Returns an error unless the provider stopped the deployment or no
    /// longer knows it.
    async fn stop_deployment(&self, request_id: &InstanceId) -> Result<StopOutcome>;

    /// List every deployment the fabric knows about.
    ///
    /// # Errors
    ///
    /// Returns an error if any page cannot be fetched.
    async fn list_deployments(&self) -> Result<Vec<DeploymentSummary>>;
}

/// HTTP client for the provider API.
#[derive(Debug, Clone)]
pub struct HttpProvisioner {
    client: reqwest::Client,
    config: ProvisionConfig,
}

impl HttpProvisioner {
    /// Create a new provisioner.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Config` if the HTTP client cannot be built.
    pub fn new(config: ProvisionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProvisionError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create a new provisioner with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: ProvisionConfig) -> Self {
        Self { client, config }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    fn creation_body<'a>(
        &'a self,
        location_hints: &'a [String],
        metadata: &Metadata,
    ) -> Result<DeploymentCreation<'a>> {
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| ProvisionError::Decode(format!("metadata is not serializable: {e}")))?;

        Ok(DeploymentCreation {
            application_name: &self.config.application,
            version: &self.config.version,
            users: location_hints
                .iter()
                .map(|ip| DeploymentUser { ip_address: ip })
                .collect(),
            environment_variables: vec![
                EnvironmentVariable {
                    key: ENV_CONNECTION_EVENT_URL,
                    value: self.config.event_url(CONNECTION_EVENT_PATH),
                    is_hidden: true,
                },
                EnvironmentVariable {
                    key: ENV_INSTANCE_EVENT_URL,
                    value: self.config.event_url(INSTANCE_EVENT_PATH),
                    is_hidden: true,
                },
                EnvironmentVariable {
                    key: ENV_INSTANCE_METADATA,
                    value: metadata_json,
                    is_hidden: false,
                },
            ],
            tags: vec!["fleet"],
            webhook: Webhook {
                url: self.config.event_url(DEPLOYMENT_EVENT_PATH),
            },
        })
    }

    /// Turn a non-success response into a rejection carrying the body message.
    async fn rejection(response: reqwest::Response) -> ProvisionError {
        let status = response.status();
        let message = response
            .json::<ApiMessage>()
            .await
            .ok()
            .and_then(|m| m.message)
            .unwrap_or_else(|| format!("provider returned status {status}"));

        ProvisionError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

/// Request body for creating a deployment.
#[derive(Debug, Serialize)]
struct DeploymentCreation<'a> {
    application_name: &'a str,
    version: &'a str,
    users: Vec<DeploymentUser<'a>>,
    environment_variables: Vec<EnvironmentVariable>,
    tags: Vec<&'static str>,
    webhook: Webhook,
}

#[derive(Debug, Serialize)]
struct DeploymentUser<'a> {
    ip_address: &'a str,
}

#[derive(Debug, Serialize)]
struct EnvironmentVariable {
    key: &'static str,
    value: String,
    is_hidden: bool,
}

#[derive(Debug, Serialize)]
struct Webhook {
    url: String,
}

/// Message body returned by most provider endpoints.
#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: Option<String>,
}

/// One page of the deployment listing.
#[derive(Debug, Deserialize)]
struct DeploymentList {
    #[serde(default)]
    data: Vec<DeploymentSummary>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    number: u32,
    next_page_number: Option<u32>,
    has_next: bool,
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn create_deployment(
        &self,
        location_hints: &[String],
        metadata: &Metadata,
    ) -> Result<DeploymentAccepted> {
        let body = self.creation_body(location_hints, metadata)?;

        let response = self
            .client
            .post(self.url("/beta/deployments"))
            .header(reqwest::header::AUTHORIZATION, &self.config.api_token)
            .json(&body)
            .send()
            .await?;

        if response.status() != StatusCode::ACCEPTED {
            let err = Self::rejection(response).await;
            tracing::error!(error = %err, "Provider refused deployment");
            return Err(err);
        }

        let accepted: DeploymentAccepted = response.json().await?;
        if accepted.request_id.is_empty() {
            return Err(ProvisionError::Rejected {
                status: StatusCode::ACCEPTED.as_u16(),
                message: if accepted.message.is_empty() {
                    "provider accepted without a request id".to_string()
                } else {
                    accepted.message
                },
            });
        }

        tracing::debug!(
            request_id = %accepted.request_id,
            hints = location_hints.len(),
            "Deployment requested"
        );
        Ok(accepted)
    }

    async fn stop_deployment(&self, request_id: &InstanceId) -> Result<StopOutcome> {
        let response = self
            .client
            .delete(self.url(&format!("/v1/stop/{request_id}")))
            .header(reqwest::header::AUTHORIZATION, &self.config.api_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED => {
                let message = response
                    .json::<ApiMessage>()
                    .await
                    .ok()
                    .and_then(|m| m.message)
                    .unwrap_or_default();
                tracing::debug!(request_id = %request_id, "Deployment stop accepted");
                Ok(StopOutcome::Stopped { message })
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                tracing::debug!(request_id = %request_id, "Deployment already gone");
                Ok(StopOutcome::AlreadyGone)
            }
            _ => {
                let err = Self::rejection(response).await;
                tracing::error!(request_id = %request_id, error = %err, "Failed to stop deployment");
                Err(err)
            }
        }
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentSummary>> {
        let mut deployments = Vec::new();
        let mut page = 1u32;

        for _ in 0..MAX_LIST_PAGES {
            let response = self
                .client
                .get(self.url("/v1/deployments"))
                .query(&[("page", page)])
                .header(reqwest::header::AUTHORIZATION, &self.config.api_token)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(Self::rejection(response).await);
            }

            let list: DeploymentList = response.json().await?;
            deployments.extend(list.data);

            match list.pagination {
                Some(Pagination {
                    has_next: true,
                    next_page_number: Some(next),
                    number,
                }) if next > number => page = next,
                _ => return Ok(deployments),
            }
        }

        tracing::warn!(pages = MAX_LIST_PAGES, "Deployment listing truncated");
        Ok(deployments)
    }
}

/// Mock provisioner for testing.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// A mock provisioner that keeps deployments in memory.
    #[derive(Default)]
    pub struct MockProvisioner {
        state: Mutex<MockState>,
    }

    #[derive(Default)]
    struct MockState {
        next_id: u64,
        deployments: HashMap<String, MockDeployment>,
        stopped: Vec<String>,
        reject_creates: Option<String>,
        fail_stops: Option<String>,
        fail_lists: bool,
    }

    struct MockDeployment {
        location_hints: Vec<String>,
        metadata: Metadata,
    }

    impl MockProvisioner {
        /// Create a new mock provisioner.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make subsequent creates fail with `message`.
        pub fn reject_creates(&self, message: impl Into<String>) {
            self.state.lock().reject_creates = Some(message.into());
        }

        /// Make subsequent stops fail with `message`.
        pub fn fail_stops(&self, message: impl Into<String>) {
            self.state.lock().fail_stops = Some(message.into());
        }

        /// Make subsequent listings fail.
        pub fn fail_lists(&self) {
            self.state.lock().fail_lists = true;
        }

        /// Register a deployment as if it had been created elsewhere.
        pub fn insert_deployment(&self, request_id: impl Into<String>) {
            self.state.lock().deployments.insert(
                request_id.into(),
                MockDeployment {
                    location_hints: Vec::new(),
                    metadata: Metadata::new(),
                },
            );
        }

        /// Forget a deployment without recording a stop.
        pub fn forget_deployment(&self, request_id: &str) {
            self.state.lock().deployments.remove(request_id);
        }

        /// Get the number of live deployments.
        #[must_use]
        pub fn deployment_count(&self) -> usize {
            self.state.lock().deployments.len()
        }

        /// Get the location hints a deployment was created with.
        #[must_use]
        pub fn location_hints(&self, request_id: &str) -> Option<Vec<String>> {
            self.state
                .lock()
                .deployments
                .get(request_id)
                .map(|d| d.location_hints.clone())
        }

        /// Get the metadata a deployment was created with.
        #[must_use]
        pub fn metadata(&self, request_id: &str) -> Option<Metadata> {
            self.state
                .lock()
                .deployments
                .get(request_id)
                .map(|d| d.metadata.clone())
        }

        /// Ids passed to `stop_deployment`, in call order.
        #[must_use]
        pub fn stopped(&self) -> Vec<String> {
            self.state.lock().stopped.clone()
        }
    }

    #[async_trait]
    impl Provisioner for MockProvisioner {
        async fn create_deployment(
            &self,
            location_hints: &[String],
            metadata: &Metadata,
        ) -> Result<DeploymentAccepted> {
            let mut state = self.state.lock();

            if let Some(message) = &state.reject_creates {
                return Err(ProvisionError::Rejected {
                    status: 400,
                    message: message.clone(),
                });
            }

            state.next_id += 1;
            let request_id = format!("mock{:08x}", state.next_id);
            state.deployments.insert(
                request_id.clone(),
                MockDeployment {
                    location_hints: location_hints.to_vec(),
                    metadata: metadata.clone(),
                },
            );

            Ok(DeploymentAccepted {
                request_id,
                message: "Deployment request accepted".to_string(),
            })
        }

        async fn stop_deployment(&self, request_id: &InstanceId) -> Result<StopOutcome> {
            let mut state = self.state.lock();

            if let Some(message) = &state.fail_stops {
                return Err(ProvisionError::Rejected {
                    status: 500,
                    message: message.clone(),
                });
            }

            state.stopped.push(request_id.to_string());
            if state.deployments.remove(request_id.as_str()).is_some() {
                Ok(StopOutcome::Stopped {
                    message: "Deployment stopped".to_string(),
                })
            } else {
                Ok(StopOutcome::AlreadyGone)
            }
        }

        async fn list_deployments(&self) -> Result<Vec<DeploymentSummary>> {
            let state = self.state.lock();

            if state.fail_lists {
                return Err(ProvisionError::Http("connection refused".to_string()));
            }

            Ok(state
                .deployments
                .keys()
                .map(|id| DeploymentSummary {
                    request_id: id.clone(),
                    ready: true,
                })
                .collect())
        }
    }
}
