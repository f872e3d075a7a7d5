//! Typed HTTP client for the Native Hardware Management Service surface.
//!
//! Used southbound against each device agent's `uri`; the identical contract
//! means tests also point it at the gateway's own northbound listener.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use opendm_core::wire::{
    GetLogLevelRequest, GetLogLevelResponse, GetLoggableEntitiesRequest,
    GetLoggingEndpointResponse, HardwareId, HwComponentInfoGetRequest, HwComponentInfoGetResponse,
    HwComponentInfoSetRequest, HwComponentInfoSetResponse, ManagedDevicesResponse,
    ModifiableComponent, PhysicalInventoryResponse, SetLogLevelRequest, SetLogLevelResponse,
    SetLoggingEndpointRequest, SetRemoteEndpointResponse, StartManagingDeviceResponse,
    StopManagingDeviceRequest, StopManagingDeviceResponse,
};

use crate::error::AgentError;
use crate::sse::SseParser;

/// Client-side TLS trust: the CA that signed agent certificates plus the
/// fixed name agents present regardless of their address.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    pub root_ca_path: PathBuf,
    pub server_name: String,
}

/// Dial and retry policy for southbound sessions.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Per-attempt dial timeout.
    pub dial_timeout: Duration,
    /// Cap for the exponential reconnect backoff.
    pub backoff_max: Duration,
    /// Dial retry budget.
    pub max_retries: u32,
    /// Timeout applied to unary calls (streams run unbounded).
    pub request_timeout: Duration,
    pub tls: Option<TlsOptions>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(10),
            backoff_max: Duration::from_secs(30),
            max_retries: 5,
            request_timeout: Duration::from_secs(30),
            tls: None,
        }
    }
}

/// HTTP client bound to one device agent.
#[derive(Debug, Clone)]
pub struct AgentClient {
    client: Client,
    base_url: Url,
    settings: AgentSettings,
}

impl AgentClient {
    /// Build a client for the agent at `uri` (`host:port`). With TLS the
    /// connection dials the uri's address but validates the certificate
    /// against the fixed expected server name.
    pub fn new(uri: &str, settings: AgentSettings) -> Result<Self, AgentError> {
        let mut builder = Client::builder().connect_timeout(settings.dial_timeout);

        let base_url = match &settings.tls {
            None => Url::parse(&format!("http://{uri}"))?,
            Some(tls) => {
                let pem = std::fs::read(&tls.root_ca_path).map_err(|e| {
                    AgentError::ConnectionFailed(format!(
                        "reading root CA {}: {e}",
                        tls.root_ca_path.display()
                    ))
                })?;
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| AgentError::ConnectionFailed(format!("invalid root CA: {e}")))?;

                let addr = uri
                    .to_socket_addrs()
                    .map_err(|e| AgentError::InvalidUri(format!("{uri}: {e}")))?
                    .next()
                    .ok_or_else(|| AgentError::InvalidUri(format!("{uri}: no address")))?;

                builder = builder
                    .add_root_certificate(cert)
                    .resolve(&tls.server_name, addr);
                Url::parse(&format!("https://{}:{}", tls.server_name, addr.port()))?
            }
        };

        let client = builder
            .build()
            .map_err(|e| AgentError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            settings,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Probe the agent until it answers, under the configured retry budget
    /// and capped exponential backoff.
    pub async fn connect(&self) -> Result<(), AgentError> {
        let mut delay = Duration::from_millis(500);
        let mut last = String::from("no attempt made");

        for attempt in 0..=self.settings.max_retries {
            let url = self.url("/health")?;
            match self
                .client
                .get(url)
                .timeout(self.settings.dial_timeout)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    debug!(agent = %self.base_url, attempt, "agent reachable");
                    return Ok(());
                }
                Ok(resp) => last = format!("health probe returned {}", resp.status()),
                Err(e) => last = e.to_string(),
            }
            if attempt < self.settings.max_retries {
                warn!(agent = %self.base_url, attempt, error = %last, "agent dial failed, backing off");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(self.settings.backoff_max);
            }
        }

        Err(AgentError::ConnectionFailed(last))
    }

    // =========================================================================
    // RPC surface
    // =========================================================================

    pub async fn start_managing_device(
        &self,
        req: &ModifiableComponent,
    ) -> Result<FrameStream<StartManagingDeviceResponse>, AgentError> {
        self.stream_post("/hwmgmt/v1/devices", req).await
    }

    pub async fn stop_managing_device(
        &self,
        req: &StopManagingDeviceRequest,
    ) -> Result<StopManagingDeviceResponse, AgentError> {
        self.post_json("/hwmgmt/v1/devices/stop", req).await
    }

    pub async fn get_managed_devices(&self) -> Result<ManagedDevicesResponse, AgentError> {
        self.get_json("/hwmgmt/v1/devices").await
    }

    pub async fn get_physical_inventory(
        &self,
        device_uuid: &str,
    ) -> Result<FrameStream<PhysicalInventoryResponse>, AgentError> {
        self.stream_get(&format!("/hwmgmt/v1/devices/{device_uuid}/inventory"))
            .await
    }

    pub async fn get_hw_component_info(
        &self,
        req: &HwComponentInfoGetRequest,
    ) -> Result<FrameStream<HwComponentInfoGetResponse>, AgentError> {
        self.stream_get(&format!(
            "/hwmgmt/v1/devices/{}/components/{}",
            req.device_uuid, req.component_uuid
        ))
        .await
    }

    pub async fn set_hw_component_info(
        &self,
        req: &HwComponentInfoSetRequest,
    ) -> Result<HwComponentInfoSetResponse, AgentError> {
        self.put_json(
            &format!(
                "/hwmgmt/v1/devices/{}/components/{}",
                req.device_uuid, req.component_uuid
            ),
            req,
        )
        .await
    }

    pub async fn set_logging_endpoint(
        &self,
        req: &SetLoggingEndpointRequest,
    ) -> Result<SetRemoteEndpointResponse, AgentError> {
        self.put_json(
            &format!("/hwmgmt/v1/devices/{}/logging/endpoint", req.device_uuid),
            req,
        )
        .await
    }

    pub async fn get_logging_endpoint(
        &self,
        req: &HardwareId,
    ) -> Result<GetLoggingEndpointResponse, AgentError> {
        self.get_json(&format!("/hwmgmt/v1/devices/{}/logging/endpoint", req.uuid))
            .await
    }

    pub async fn get_loggable_entities(
        &self,
        req: &GetLoggableEntitiesRequest,
    ) -> Result<GetLogLevelResponse, AgentError> {
        self.get_json(&format!(
            "/hwmgmt/v1/devices/{}/logging/entities",
            req.device_uuid
        ))
        .await
    }

    pub async fn set_log_level(
        &self,
        req: &SetLogLevelRequest,
    ) -> Result<SetLogLevelResponse, AgentError> {
        self.put_json(
            &format!("/hwmgmt/v1/devices/{}/logging/level", req.device_uuid),
            req,
        )
        .await
    }

    pub async fn get_log_level(
        &self,
        req: &GetLogLevelRequest,
    ) -> Result<GetLogLevelResponse, AgentError> {
        let mut path = format!("/hwmgmt/v1/devices/{}/logging/level", req.device_uuid);
        if !req.entities.is_empty() {
            path.push_str("?entities=");
            path.push_str(&req.entities.join(","));
        }
        self.get_json(&path).await
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    fn url(&self, path: &str) -> Result<Url, AgentError> {
        Ok(self.base_url.join(path)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AgentError> {
        let resp = self
            .client
            .get(self.url(path)?)
            .timeout(self.settings.request_timeout)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AgentError> {
        let resp = self
            .client
            .post(self.url(path)?)
            .timeout(self.settings.request_timeout)
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AgentError> {
        let resp = self
            .client
            .put(self.url(path)?)
            .timeout(self.settings.request_timeout)
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, AgentError> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::Transport(format!("HTTP {status}: {text}")));
        }
        Ok(resp.json::<T>().await?)
    }

    async fn stream_get<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<FrameStream<T>, AgentError> {
        let resp = self.client.get(self.url(path)?).send().await?;
        FrameStream::from_response(resp)
    }

    async fn stream_post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<FrameStream<T>, AgentError> {
        let resp = self
            .client
            .post(self.url(path)?)
            .json(body)
            .send()
            .await?;
        FrameStream::from_response(resp)
    }
}

/// A server-streaming response: SSE frames decoded one at a time.
/// `next` returning `None` is a clean end-of-stream.
pub struct FrameStream<T> {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    parser: SseParser,
    pending: VecDeque<String>,
    _frame: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> FrameStream<T> {
    fn from_response(resp: reqwest::Response) -> Result<Self, AgentError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(AgentError::Transport(format!(
                "stream setup failed: HTTP {status}"
            )));
        }
        Ok(Self {
            bytes: resp.bytes_stream().boxed(),
            parser: SseParser::new(),
            pending: VecDeque::new(),
            _frame: PhantomData,
        })
    }

    pub async fn next(&mut self) -> Option<Result<T, AgentError>> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                return Some(
                    serde_json::from_str(&payload)
                        .map_err(|e| AgentError::Stream(format!("{e} (payload: {payload})"))),
                );
            }
            match self.bytes.next().await {
                None => return None,
                Some(Err(e)) => return Some(Err(AgentError::Transport(e.to_string()))),
                Some(Ok(chunk)) => self.pending.extend(self.parser.feed(&chunk)),
            }
        }
    }
}
