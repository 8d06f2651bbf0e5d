//! HTTP delivery and request capture.
//!
//! [`HttpDeliverer`] replays queued actions verbatim over HTTP.
//! [`OfflineClient`] is the request-layer entry point: it attempts a request
//! once and queues it on a transport failure, while still reporting that
//! failure to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use thiserror::Error;

use super::action::{NewAction, QueuedAction};
use super::manager::QueueManager;
use super::replay::Deliver;
use super::store::DurableStore;
use crate::error::{DeliveryError, QueueError};

/// Re-issues queued actions over HTTP.
///
/// 2xx is a success, any other status an explicit failure, and a request
/// that produced no response is indeterminate. An action that cannot be
/// turned into a request at all is reported as an explicit failure so the
/// retry bound eventually drops it.
#[derive(Debug, Clone)]
pub struct HttpDeliverer {
    client: Client,
    base_url: Option<String>,
}

impl HttpDeliverer {
    /// Create a deliverer with its own client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, QueueError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueueError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a deliverer around an existing client.
    #[must_use]
    pub fn with_client(client: Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.filter(|b| !b.trim().is_empty()),
        }
    }

    /// Resolve a queued URL against the base URL.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Malformed` for a relative URL without a base.
    pub fn resolve_url(&self, url: &str) -> Result<String, DeliveryError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(url.to_string());
        }

        match &self.base_url {
            Some(base) => Ok(format!(
                "{}/{}",
                base.trim_end_matches('/'),
                url.trim_start_matches('/')
            )),
            None => Err(DeliveryError::Malformed(format!(
                "relative URL {url} requires a base URL"
            ))),
        }
    }

    /// Build the request for an action.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Malformed` for an unknown method, an invalid
    /// header, or an unresolvable URL.
    pub fn request(&self, action: &QueuedAction) -> Result<RequestBuilder, DeliveryError> {
        let method = Method::from_bytes(action.method.as_bytes())
            .map_err(|e| DeliveryError::Malformed(format!("method {}: {e}", action.method)))?;
        let url = self.resolve_url(&action.url)?;

        let mut builder = self.client.request(method, url);
        for (name, value) in &action.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| DeliveryError::Malformed(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| DeliveryError::Malformed(format!("header {name}: {e}")))?;
            builder = builder.header(name, value);
        }
        if let Some(body) = &action.body {
            builder = builder.body(body.clone());
        }

        Ok(builder)
    }

    async fn send(&self, action: &QueuedAction) -> Result<Response, DeliveryError> {
        self.request(action)?
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Deliver for HttpDeliverer {
    async fn deliver(&self, action: &QueuedAction) -> Result<bool, DeliveryError> {
        match self.send(action).await {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    tracing::warn!(id = %action.id, %status, "replayed action rejected");
                }
                Ok(status.is_success())
            }
            Err(DeliveryError::Malformed(reason)) => {
                tracing::warn!(id = %action.id, %reason, "queued action cannot be replayed");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Capture an outbound request as a [`NewAction`].
///
/// Queued actions store headers and body as text, so a request that could not
/// be replayed byte for byte is refused rather than altered: a header value
/// that is not visible ASCII, a streaming body, or a body that is not UTF-8.
///
/// # Errors
///
/// Returns `QueueError::InvalidInput` for a request that cannot be stored
/// verbatim.
pub fn capture_request(request: &reqwest::Request) -> Result<NewAction, QueueError> {
    let mut new = NewAction::new(request.method().as_str(), request.url().as_str());
    for (name, value) in request.headers() {
        let value = value.to_str().map_err(|_| {
            QueueError::InvalidInput(format!("Header {name} is not representable as text"))
        })?;
        new = new.header(name.as_str(), value);
    }
    if let Some(body) = request.body() {
        let bytes = body.as_bytes().ok_or_else(|| {
            QueueError::InvalidInput("Streaming request bodies cannot be queued".to_string())
        })?;
        let text = std::str::from_utf8(bytes).map_err(|e| {
            QueueError::InvalidInput(format!("Request body is not UTF-8: {e}"))
        })?;
        new = new.body(text);
    }
    Ok(new)
}

/// Failure of [`OfflineClient::send`].
#[derive(Debug, Error)]
pub enum SendError {
    /// The request failed in transit and was queued for replay.
    #[error("Request failed, queued for replay as {id}: {source}")]
    Queued {
        id: String,
        #[source]
        source: DeliveryError,
    },

    /// The request failed in transit and could not be queued either.
    #[error("Request failed and could not be queued ({persist}): {source}")]
    Unqueued {
        #[source]
        source: DeliveryError,
        persist: QueueError,
    },

    /// The request cannot be sent or queued as described.
    #[error(transparent)]
    Invalid(QueueError),
}

impl SendError {
    /// The queued action id, if the request was saved for replay.
    #[must_use]
    pub fn queued_id(&self) -> Option<&str> {
        match self {
            Self::Queued { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Sends state-changing requests, queueing them when the network fails.
pub struct OfflineClient<S> {
    http: HttpDeliverer,
    queue: QueueManager<S>,
    online: AtomicBool,
}

impl<S: DurableStore> OfflineClient<S> {
    #[must_use]
    pub const fn new(http: HttpDeliverer, queue: QueueManager<S>) -> Self {
        Self {
            http,
            queue,
            online: AtomicBool::new(true),
        }
    }

    /// Record the connectivity state reported by the platform.
    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            tracing::info!(online, "connectivity changed");
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Send a request, queueing it if it cannot reach the server.
    ///
    /// Any HTTP response, including a non-2xx one, is returned as-is and
    /// nothing is queued. While offline no attempt is made.
    ///
    /// # Errors
    ///
    /// Returns `SendError::Queued` when the request failed in transit and
    /// was saved, `SendError::Unqueued` when saving failed too, and
    /// `SendError::Invalid` for a request that cannot be built.
    pub async fn send(&self, new: NewAction) -> Result<Response, SendError> {
        new.validate().map_err(SendError::Invalid)?;

        let failure = if self.is_online() {
            let attempt = QueuedAction::from_new(new.clone());
            match self.http.send(&attempt).await {
                Ok(response) => return Ok(response),
                Err(DeliveryError::Malformed(reason)) => {
                    return Err(SendError::Invalid(QueueError::InvalidInput(reason)));
                }
                Err(e) => e,
            }
        } else {
            DeliveryError::Transport("device offline".to_string())
        };

        tracing::warn!(error = %failure, "request failed, saving for replay");
        match self.queue.enqueue(new).await {
            Ok(action) => Err(SendError::Queued {
                id: action.id,
                source: failure,
            }),
            Err(persist) => {
                tracing::error!(error = %persist, "failed request could not be queued");
                Err(SendError::Unqueued {
                    source: failure,
                    persist,
                })
            }
        }
    }

    #[must_use]
    pub const fn queue(&self) -> &QueueManager<S> {
        &self.queue
    }
}
