//! EnvironmentRegistry client speaking GraphQL over HTTP(S).

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use serde_json::json;

use crate::config::RegistryConfig;
use crate::ports::{EnvironmentRegistry, RegistryError};

static CLIENT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// `execute: false` only marks the environment deleted; the registry must not
/// try to tear anything down itself.
const DELETE_ENVIRONMENT: &str = "mutation deleteEnvironment($name: String!, $project: String!) {
  deleteEnvironment(input: {name: $name, project: $project, execute: false})
}";

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

pub struct GraphqlRegistry {
    endpoint: String,
    token: String,
    client: ReqwestClient,
}

impl GraphqlRegistry {
    pub fn with(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let client = ReqwestClient::builder()
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .user_agent(CLIENT_USER_AGENT)
            .build()
            .map_err(|e| RegistryError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
            client,
        })
    }
}

/// Turn a decoded GraphQL response into the port result.
fn inspect(response: GraphqlResponse) -> Result<(), RegistryError> {
    if response.errors.is_empty() {
        return Ok(());
    }
    let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
    Err(RegistryError::Rejected(messages.join("; ")))
}

#[async_trait]
impl EnvironmentRegistry for GraphqlRegistry {
    async fn mark_deleted(
        &self,
        environment_name: &str,
        project_name: &str,
    ) -> Result<(), RegistryError> {
        let body = json!({
            "query": DELETE_ENVIRONMENT,
            "variables": {"name": environment_name, "project": project_name},
        });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(RegistryError::Rejected(format!("status={status} body={text}")));
        }
        let decoded: GraphqlResponse = serde_json::from_str(&text)
            .map_err(|e| RegistryError::Rejected(format!("invalid response: {e}: {text}")))?;
        inspect(decoded)
    }
}
