//! HTTP client for an external agent service.
//!
//! The service owns the real browser and model integrations; the harness
//! drives it resource by resource and one agent step per request:
//!
//! | call | method | path |
//! |------|--------|------|
//! | launch browser | POST | `/browsers` |
//! | open context | POST | `/browsers/{id}/contexts` |
//! | close browser | DELETE | `/browsers/{id}` |
//! | screenshot | GET | `/contexts/{id}/screenshot` |
//! | close context | DELETE | `/contexts/{id}` |
//! | create agent | POST | `/agents` |
//! | run one step | POST | `/agents/{id}/step` |
//!
//! A `409 Conflict` answer to a step request means the service interrupted
//! the run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::agent::{AgentFactory, AgentStepOutcome, BrowserAgent};
use crate::browser::{
    BrowserBackend, BrowserContextHandle, BrowserHandle, BrowserOptions, ContextOptions,
};
use crate::errors::AgentError;
use crate::model::AgentSpec;

pub const BRIDGE_URL_ENV: &str = "HARNESS_AGENT_BRIDGE_URL";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub base_url: Url,
    pub request_timeout: Duration,
    /// Agent steps include model calls and page actions, so they get a longer budget.
    pub step_timeout: Duration,
}

impl BridgeConfig {
    pub fn new(base_url: &str) -> Result<Self, AgentError> {
        let mut base_url = Url::parse(base_url.trim()).map_err(|err| {
            AgentError::invalid_request(format!("invalid bridge url '{base_url}': {err}"))
        })?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AgentError::invalid_request(format!(
                    "bridge url must use http or https (got {scheme})"
                )))
            }
        }
        // endpoints are joined onto the base, which only keeps its last segment with a trailing slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            request_timeout: Duration::from_secs(30),
            step_timeout: Duration::from_secs(180),
        })
    }
}

#[derive(Clone)]
struct BridgeClient {
    http: Client,
    config: Arc<BridgeConfig>,
}

impl BridgeClient {
    fn endpoint(&self, path: &str) -> Result<Url, AgentError> {
        self.config
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| AgentError::invalid_request(format!("bad bridge path {path}: {err}")))
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, AgentError> {
        let response = self
            .http
            .post(self.endpoint(path)?)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        decode(path, response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AgentError> {
        let response = self
            .http
            .get(self.endpoint(path)?)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        decode(path, response).await
    }

    async fn delete(&self, path: &str) -> Result<(), AgentError> {
        let response = self
            .http
            .delete(self.endpoint(path)?)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(AgentError::transport(format!("DELETE {path} returned {status}")))
        }
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, AgentError> {
    let status = response.status();
    if status == StatusCode::CONFLICT {
        let body = response.text().await.unwrap_or_default();
        return Err(AgentError::interrupted(body));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AgentError::transport(format!("{path} returned {status}: {body}")));
    }
    response
        .json::<T>()
        .await
        .map_err(|err| AgentError::transport(format!("{path} returned invalid JSON: {err}")))
}

#[derive(Deserialize)]
struct CreatedResource {
    id: String,
}

#[derive(Deserialize)]
struct ScreenshotPayload {
    #[serde(default)]
    screenshot: Option<String>,
}

#[derive(Deserialize)]
struct StepFailure {
    error: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StepPayload {
    Completed(AgentStepOutcome),
    Failed(StepFailure),
}

/// Browser and agent backend backed by the external agent service.
#[derive(Clone)]
pub struct BridgeBackend {
    client: BridgeClient,
}

impl BridgeBackend {
    pub fn new(config: BridgeConfig) -> Result<Self, AgentError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| {
                AgentError::invalid_request(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client: BridgeClient {
                http,
                config: Arc::new(config),
            },
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.client.config.base_url
    }
}

#[async_trait]
impl BrowserBackend for BridgeBackend {
    async fn launch(&self, options: &BrowserOptions) -> Result<Arc<dyn BrowserHandle>, AgentError> {
        let created: CreatedResource = self
            .client
            .post("browsers", options, self.client.config.request_timeout)
            .await
            .map_err(|err| match err {
                AgentError::Transport(message) => AgentError::launch(message),
                other => other,
            })?;
        debug!(browser = %created.id, "bridge browser launched");
        Ok(Arc::new(BridgeBrowser {
            id: created.id,
            client: self.client.clone(),
        }))
    }
}

#[async_trait]
impl AgentFactory for BridgeBackend {
    async fn create(
        &self,
        spec: &AgentSpec,
        browser: Arc<dyn BrowserHandle>,
        context: Arc<dyn BrowserContextHandle>,
    ) -> Result<Box<dyn BrowserAgent>, AgentError> {
        let body = json!({
            "spec": spec,
            "browser_id": browser.id(),
            "context_id": context.id(),
        });
        let created: CreatedResource = self
            .client
            .post("agents", &body, self.client.config.request_timeout)
            .await?;
        Ok(Box::new(BridgeAgent {
            id: created.id,
            client: self.client.clone(),
        }))
    }
}

struct BridgeBrowser {
    id: String,
    client: BridgeClient,
}

#[async_trait]
impl BrowserHandle for BridgeBrowser {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_context(
        &self,
        options: &ContextOptions,
    ) -> Result<Arc<dyn BrowserContextHandle>, AgentError> {
        let created: CreatedResource = self
            .client
            .post(
                &format!("browsers/{}/contexts", self.id),
                options,
                self.client.config.request_timeout,
            )
            .await
            .map_err(|err| match err {
                AgentError::Transport(message) => AgentError::context(message),
                other => other,
            })?;
        Ok(Arc::new(BridgeContext {
            id: created.id,
            client: self.client.clone(),
        }))
    }

    async fn close(&self) -> Result<(), AgentError> {
        self.client.delete(&format!("browsers/{}", self.id)).await
    }
}

struct BridgeContext {
    id: String,
    client: BridgeClient,
}

#[async_trait]
impl BrowserContextHandle for BridgeContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn screenshot(&self) -> Result<Option<String>, AgentError> {
        let payload: ScreenshotPayload = self
            .client
            .get(&format!("contexts/{}/screenshot", self.id))
            .await?;
        Ok(payload.screenshot.filter(|data| !data.is_empty()))
    }

    async fn close(&self) -> Result<(), AgentError> {
        self.client.delete(&format!("contexts/{}", self.id)).await
    }
}

struct BridgeAgent {
    id: String,
    client: BridgeClient,
}

#[async_trait]
impl BrowserAgent for BridgeAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    async fn step(&mut self, step: u32) -> Result<AgentStepOutcome, AgentError> {
        let payload: StepPayload = self
            .client
            .post(
                &format!("agents/{}/step", self.id),
                &json!({ "step": step }),
                self.client.config.step_timeout,
            )
            .await?;
        match payload {
            StepPayload::Completed(outcome) => Ok(outcome),
            StepPayload::Failed(failure) => {
                warn!(agent = %self.id, step, error = %failure.error, "bridge step failed");
                Err(AgentError::step(failure.error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_provider::LlmSettings;
    use crate::browser::WindowSize;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn rejects_non_http_urls() {
        assert!(BridgeConfig::new("ws://localhost:9000").is_err());
        assert!(BridgeConfig::new("not a url").is_err());
        assert!(BridgeConfig::new("http://127.0.0.1:9000/").is_ok());
    }

    #[test]
    fn endpoints_join_under_base_path() {
        let backend = BridgeBackend::new(BridgeConfig::new("http://localhost:9000/api/").unwrap())
            .unwrap();
        let url = backend.client.endpoint("/agents/a1/step").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/api/agents/a1/step");
    }

    #[test]
    fn base_path_without_trailing_slash_is_kept() {
        let config = BridgeConfig::new("http://localhost:9000/api").unwrap();
        assert_eq!(config.base_url.as_str(), "http://localhost:9000/api/");
        let backend = BridgeBackend::new(config).unwrap();
        let url = backend.client.endpoint("browsers").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/api/browsers");

        let root = BridgeConfig::new("http://localhost:9000").unwrap();
        assert_eq!(root.base_url.as_str(), "http://localhost:9000/");
    }

    #[test]
    fn step_payload_distinguishes_failures() {
        let failed: StepPayload = serde_json::from_str(r#"{"error":"timeout"}"#).unwrap();
        assert!(matches!(failed, StepPayload::Failed(f) if f.error == "timeout"));

        let done: StepPayload = serde_json::from_value(json!({
            "record": {
                "step": 1,
                "timestamp": "2024-01-01T00:00:00Z",
                "is_done": true,
                "extracted_content": "ok"
            }
        }))
        .unwrap();
        assert!(matches!(done, StepPayload::Completed(o) if o.is_done()));
    }

    fn backend_for(server: &MockServer) -> BridgeBackend {
        let mut config = BridgeConfig::new(&format!("{}/bridge", server.uri())).unwrap();
        config.step_timeout = Duration::from_secs(5);
        config.request_timeout = Duration::from_secs(5);
        BridgeBackend::new(config).unwrap()
    }

    async fn mount_json(
        server: &MockServer,
        verb: &str,
        route: &str,
        status: u16,
        body: serde_json::Value,
    ) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn open_agent(server: &MockServer) -> (Arc<dyn BrowserHandle>, Box<dyn BrowserAgent>) {
        mount_json(server, "POST", "/bridge/browsers", 200, json!({ "id": "b1" })).await;
        mount_json(server, "POST", "/bridge/browsers/b1/contexts", 200, json!({ "id": "c1" })).await;
        mount_json(server, "POST", "/bridge/agents", 200, json!({ "id": "a1" })).await;

        let backend = backend_for(server);
        let browser = backend.launch(&BrowserOptions::default()).await.unwrap();
        let context = browser
            .new_context(&ContextOptions {
                window: WindowSize::default(),
                ..ContextOptions::default()
            })
            .await
            .unwrap();
        let spec = AgentSpec::new("find the docs", LlmSettings::default());
        let agent = backend.create(&spec, browser.clone(), context).await.unwrap();
        (browser, agent)
    }

    #[tokio::test]
    async fn step_round_trip_reports_records_and_failures() {
        let server = MockServer::start().await;
        let (_browser, mut agent) = open_agent(&server).await;
        assert_eq!(agent.agent_id(), "a1");

        Mock::given(method("POST"))
            .and(path("/bridge/agents/a1/step"))
            .and(body_json(json!({ "step": 1 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "record": {
                    "step": 1,
                    "timestamp": "2024-01-01T00:00:00Z",
                    "is_done": true,
                    "extracted_content": "done"
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bridge/agents/a1/step"))
            .and(body_json(json!({ "step": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "element not found" })))
            .mount(&server)
            .await;

        let outcome = agent.step(1).await.unwrap();
        assert!(outcome.is_done());
        assert_eq!(outcome.record.extracted_content.as_deref(), Some("done"));

        let err = agent.step(2).await.unwrap_err();
        assert!(matches!(err, AgentError::Step(ref message) if message == "element not found"));
        assert!(err.is_step_failure());
    }

    #[tokio::test]
    async fn conflict_on_step_means_interrupted() {
        let server = MockServer::start().await;
        let (_browser, mut agent) = open_agent(&server).await;
        Mock::given(method("POST"))
            .and(path("/bridge/agents/a1/step"))
            .respond_with(ResponseTemplate::new(409).set_body_string("run cancelled"))
            .mount(&server)
            .await;

        let err = agent.step(1).await.unwrap_err();
        assert!(matches!(err, AgentError::Interrupted(ref message) if message == "run cancelled"));
    }

    #[tokio::test]
    async fn server_errors_map_to_launch_and_context_failures() {
        let server = MockServer::start().await;
        mount_json(&server, "POST", "/bridge/browsers", 500, json!({ "detail": "no chrome" })).await;
        let backend = backend_for(&server);
        let err = backend.launch(&BrowserOptions::default()).await.err().unwrap();
        assert!(matches!(err, AgentError::Launch(ref message) if message.contains("500")));

        let server = MockServer::start().await;
        mount_json(&server, "POST", "/bridge/browsers", 200, json!({ "id": "b1" })).await;
        mount_json(&server, "POST", "/bridge/browsers/b1/contexts", 503, json!({})).await;
        let backend = backend_for(&server);
        let browser = backend.launch(&BrowserOptions::default()).await.unwrap();
        let err = browser.new_context(&ContextOptions::default()).await.err().unwrap();
        assert!(matches!(err, AgentError::Context(_)));
    }

    #[tokio::test]
    async fn screenshot_and_agent_errors_are_transport_failures() {
        let server = MockServer::start().await;
        mount_json(&server, "POST", "/bridge/browsers", 200, json!({ "id": "b1" })).await;
        mount_json(&server, "POST", "/bridge/browsers/b1/contexts", 200, json!({ "id": "c1" })).await;
        mount_json(&server, "GET", "/bridge/contexts/c1/screenshot", 200, json!({ "screenshot": "" })).await;
        mount_json(&server, "POST", "/bridge/agents", 502, json!({})).await;

        let backend = backend_for(&server);
        let browser = backend.launch(&BrowserOptions::default()).await.unwrap();
        let context = browser.new_context(&ContextOptions::default()).await.unwrap();
        assert_eq!(context.screenshot().await.unwrap(), None);

        let spec = AgentSpec::new("task", LlmSettings::default());
        let err = backend.create(&spec, browser, context).await.err().unwrap();
        assert!(matches!(err, AgentError::Transport(_)));
    }

    #[tokio::test]
    async fn delete_tolerates_missing_resources() {
        let server = MockServer::start().await;
        mount_json(&server, "POST", "/bridge/browsers", 200, json!({ "id": "b1" })).await;
        mount_json(&server, "POST", "/bridge/browsers/b1/contexts", 200, json!({ "id": "c1" })).await;
        Mock::given(method("DELETE"))
            .and(path("/bridge/contexts/c1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/bridge/browsers/b1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let browser = backend.launch(&BrowserOptions::default()).await.unwrap();
        let context = browser.new_context(&ContextOptions::default()).await.unwrap();
        context.close().await.unwrap();
        let err = browser.close().await.unwrap_err();
        assert!(matches!(err, AgentError::Transport(ref message) if message.contains("500")));
    }
}
