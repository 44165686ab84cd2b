//! HTTP client for the WebDriverAgent automation service.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{stream::BoxStream, StreamExt};
use mirror_types::{
    config::DeviceConfig,
    geometry::{DevicePoint, DeviceSize},
    MirrorError, Result,
};
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    Client,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::{actions, device_error, session_error, AppInfo, DeviceApi, Session};

/// Current tap route first, then the route older agents expose.
const TAP_ROUTES: [&str; 2] = ["wda/tap", "wda/tap/0"];

/// Commands and images use separate connection pools.
#[derive(Clone)]
pub struct WdaClient {
    config: DeviceConfig,
    base_url: String,
    commands: Client,
    images: Client,
}

impl WdaClient {
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let commands = Client::builder()
            .connect_timeout(config.command_timeout())
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|err| device_error(format!("failed to build command HTTP client: {err}")))?;
        let images = Client::builder()
            .connect_timeout(config.image_timeout())
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|err| device_error(format!("failed to build image HTTP client: {err}")))?;

        Ok(Self {
            config,
            base_url,
            commands,
            images,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json(&self, path: &str, timeout: Duration) -> Result<Value> {
        let url = self.url(path);
        let response = self
            .commands
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| device_error(format!("GET {url} failed: {err}")))?;
        response
            .json::<Value>()
            .await
            .map_err(|err| device_error(format!("GET {url} returned invalid JSON: {err}")))
    }

    async fn post_json(&self, path: &str, body: &Value, timeout: Duration) -> Result<Value> {
        let url = self.url(path);
        let response = self
            .commands
            .post(&url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| device_error(format!("POST {url} failed: {err}")))?;
        response
            .json::<Value>()
            .await
            .map_err(|err| device_error(format!("POST {url} returned invalid JSON: {err}")))
    }

    /// Taps through the agent's coordinate endpoint, falling back to the legacy route.
    pub async fn tap(&self, session_id: &str, at: DevicePoint) -> Result<()> {
        let body = json!({ "x": at.x, "y": at.y });
        let mut last_error = device_error("no tap route attempted");
        for route in TAP_ROUTES {
            let path = format!("session/{session_id}/{route}");
            match self
                .post_json(&path, &body, self.config.command_timeout())
                .await
                .and_then(unwrap_value)
            {
                Ok(_) => return Ok(()),
                Err(err) => {
                    debug!(route, error = %err, "tap route failed");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    pub async fn drag(
        &self,
        session_id: &str,
        from: DevicePoint,
        to: DevicePoint,
        duration: Duration,
    ) -> Result<()> {
        let body = json!({
            "fromX": from.x,
            "fromY": from.y,
            "toX": to.x,
            "toY": to.y,
            "duration": duration.as_secs_f64(),
        });
        let path = format!("session/{session_id}/wda/dragfromtoforduration");
        self.post_json(&path, &body, self.config.drag_timeout(duration))
            .await
            .and_then(unwrap_value)
            .map(|_| ())
    }

    pub async fn session_tap(&self, session_id: &str, at: DevicePoint) -> Result<()> {
        let path = format!("session/{session_id}/actions");
        self.post_json(&path, &actions::tap(at), self.config.command_timeout())
            .await
            .and_then(unwrap_value)
            .map(|_| ())
    }

    pub async fn session_swipe(
        &self,
        session_id: &str,
        from: DevicePoint,
        to: DevicePoint,
        duration: Duration,
    ) -> Result<()> {
        let path = format!("session/{session_id}/actions");
        self.post_json(
            &path,
            &actions::swipe(from, to, duration),
            self.config.drag_timeout(duration),
        )
        .await
        .and_then(unwrap_value)
        .map(|_| ())
    }

    /// Fetches one encoded screenshot (PNG or JPEG bytes).
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let url = self.url("screenshot");
        let response = self
            .images
            .get(&url)
            .header(ACCEPT, "image/png")
            .timeout(self.config.image_timeout())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| device_error(format!("GET {url} failed: {err}")))?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|err| device_error(format!("GET {url} body read failed: {err}")))?;
        screenshot_bytes(content_type.as_deref(), &body)
    }

    /// Opens the multipart JPEG stream and yields raw body chunks.
    ///
    /// The image timeout bounds the wait for response headers only; the body
    /// stays open for as long as the agent keeps streaming.
    pub async fn open_stream(&self) -> Result<BoxStream<'static, Result<Vec<u8>>>> {
        let url = self.config.stream_url();
        let timeout = self.config.image_timeout();
        let response = tokio::time::timeout(timeout, self.images.get(&url).send())
            .await
            .map_err(|_| {
                device_error(format!(
                    "GET {url} sent no headers within {}ms",
                    timeout.as_millis()
                ))
            })?
            .and_then(|response| response.error_for_status())
            .map_err(|err| device_error(format!("GET {url} failed: {err}")))?;
        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|err| device_error(format!("stream read failed: {err}")))
            })
            .boxed())
    }
}

#[async_trait]
impl DeviceApi for WdaClient {
    async fn status(&self) -> Result<Value> {
        self.get_json("status", self.config.command_timeout())
            .await
            .and_then(unwrap_value)
    }

    async fn is_locked(&self) -> Result<bool> {
        let value = self
            .get_json("wda/locked", self.config.lock_check_timeout())
            .await
            .and_then(unwrap_value)?;
        value
            .as_bool()
            .ok_or_else(|| device_error(format!("unexpected lock state payload: {value}")))
    }

    async fn active_app(&self) -> Result<AppInfo> {
        let value = self
            .get_json("wda/activeAppInfo", self.config.command_timeout())
            .await
            .and_then(unwrap_value)?;
        serde_json::from_value(value)
            .map_err(|err| device_error(format!("unexpected active app payload: {err}")))
    }

    async fn create_session(&self, bundle_id: Option<&str>) -> Result<Session> {
        let body = match bundle_id {
            Some(bundle) => json!({ "capabilities": { "alwaysMatch": { "bundleId": bundle } } }),
            None => json!({ "capabilities": {} }),
        };
        let reply = self
            .post_json("session", &body, self.config.command_timeout())
            .await?;
        let id = parse_session_id(&reply);
        unwrap_value(reply)?;
        let id = id.ok_or_else(|| session_error("session reply carries no session id"))?;
        Ok(Session::new(id, bundle_id.map(str::to_owned)))
    }

    async fn window_size(&self, session: &Session) -> Result<DeviceSize> {
        let path = format!("session/{}/window/size", session.id);
        let value = self
            .get_json(&path, self.config.command_timeout())
            .await
            .and_then(unwrap_value)?;
        parse_window_size(&value)
            .ok_or_else(|| device_error(format!("unexpected window size payload: {value}")))
    }
}

/// Strips the `{"value": ...}` envelope and surfaces service-level errors that
/// arrive with a success status.
pub fn unwrap_value(body: Value) -> Result<Value> {
    let value = match body {
        Value::Object(mut map) => match map.remove("value") {
            Some(value) => value,
            None => Value::Object(map),
        },
        other => other,
    };
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(device_error(format!("{error}: {message}")));
    }
    Ok(value)
}

pub fn parse_session_id(body: &Value) -> Option<String> {
    body.get("sessionId")
        .or_else(|| body.get("value").and_then(|value| value.get("sessionId")))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

/// Accepts `{"width": w, "height": h}` or a `[w, h]` pair.
pub fn parse_window_size(value: &Value) -> Option<DeviceSize> {
    let (width, height) = match value {
        Value::Array(pair) if pair.len() == 2 => (pair[0].as_f64()?, pair[1].as_f64()?),
        _ => (
            value.get("width")?.as_f64()?,
            value.get("height")?.as_f64()?,
        ),
    };
    (width > 0.0 && height > 0.0).then_some(DeviceSize::new(width, height))
}

/// Raw image bodies pass through; JSON envelopes carry the image base64-encoded.
pub fn screenshot_bytes(content_type: Option<&str>, body: &[u8]) -> Result<Vec<u8>> {
    if content_type.is_some_and(|value| value.starts_with("image/")) {
        return Ok(body.to_vec());
    }
    let envelope: Value = serde_json::from_slice(body).map_err(|err| {
        MirrorError::Decode(format!("screenshot reply is neither an image nor JSON: {err}"))
    })?;
    let encoded = envelope
        .get("value")
        .and_then(Value::as_str)
        .filter(|data| !data.is_empty())
        .or_else(|| envelope.get("screenshot").and_then(Value::as_str))
        .filter(|data| !data.is_empty())
        .ok_or_else(|| MirrorError::Decode("screenshot reply carries no image data".into()))?;
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| MirrorError::Decode(format!("invalid base64 screenshot: {err}")))
}
