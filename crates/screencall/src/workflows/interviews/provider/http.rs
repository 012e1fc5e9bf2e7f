use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{
    AgentInstructions, CallContext, CallGateway, CallState, CallStatusReport, FlexNumber,
    GatewayError, ProviderReport,
};
use crate::config::ProviderConfig;
use crate::workflows::interviews::domain::{AgentId, CallId};

/// REST client for the call provider.
///
/// Endpoints: `POST /agents`, `POST /calls`, `GET /calls/{id}`, `GET /calls/{id}/analytics`.
pub struct HttpCallGateway {
    api_key: String,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CallStatusBody {
    status: String,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default, alias = "duration_seconds", alias = "durationSeconds")]
    duration: Option<FlexNumber>,
}

impl HttpCallGateway {
    pub fn new(config: &ProviderConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            api_key: config.api_key.clone(),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response, GatewayError> {
        let response = self.authorized(request).send().await.map_err(|err| {
            if err.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Network(err)
            }
        })?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(resource.to_string()));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(GatewayError::RateLimited { retry_after_ms });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| GatewayError::Malformed(err.to_string()))
    }
}

#[async_trait]
impl CallGateway for HttpCallGateway {
    async fn create_agent(&self, instructions: &AgentInstructions) -> Result<AgentId, GatewayError> {
        let request = self.client.post(self.url("/agents")).json(instructions);
        let response = self.send(request, "agent").await?;
        let created: CreatedResource = Self::decode(response).await?;
        Ok(AgentId(created.id))
    }

    async fn dispatch_call(
        &self,
        agent_id: &AgentId,
        phone_number: &str,
        context: &CallContext,
    ) -> Result<CallId, GatewayError> {
        let body = json!({
            "agent_id": agent_id.0,
            "phone_number": phone_number,
            "variables": context.variables(),
        });
        let request = self.client.post(self.url("/calls")).json(&body);
        let response = self.send(request, "agent").await?;
        let created: CreatedResource = Self::decode(response).await?;
        Ok(CallId(created.id))
    }

    async fn call_status(&self, call_id: &CallId) -> Result<CallStatusReport, GatewayError> {
        let request = self.client.get(self.url(&format!("/calls/{}", call_id.0)));
        let response = self.send(request, &format!("call {call_id}")).await?;
        let body: CallStatusBody = Self::decode(response).await?;
        Ok(CallStatusReport {
            state: CallState::from_provider(&body.status),
            raw_status: body.status,
            transcript: body.transcript,
            duration_secs: body.duration.as_ref().and_then(FlexNumber::as_seconds),
        })
    }

    async fn call_analytics(&self, call_id: &CallId) -> Result<ProviderReport, GatewayError> {
        let request = self
            .client
            .get(self.url(&format!("/calls/{}/analytics", call_id.0)));
        let response = self.send(request, &format!("call {call_id}")).await?;
        Self::decode(response).await
    }
}
