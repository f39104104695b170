use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::client::ApiClient;
use crate::event::Event;
use crate::transport::Transport;
use crate::types::{CallbackEvent, ClientConfig, Community, CommunityId};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

#[cfg(feature = "tracing")]
fn trace_event(message: &'static str) {
    tracing::debug!(message);
}

#[cfg(not(feature = "tracing"))]
fn trace_event(_message: &'static str) {}

/// Request type intercepted before the generic dispatch path.
const CONFIRMATION_TYPE: &str = "confirmation";

/// Subscriber for wrapped inbound events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event);
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, event: Event) {
        (self.f)(event).await
    }
}

/// Plain-text reply the transport writes back for one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundReply {
    /// Default acknowledgement.
    Ack,

    /// Confirmation code echo for a handshake request.
    Confirmation(String),

    /// Empty body: handshake for a community the gateway does not know.
    Empty,
}

impl InboundReply {
    /// The literal response body to write.
    pub fn body(&self) -> &str {
        match self {
            InboundReply::Ack => "ok",
            InboundReply::Confirmation(code) => code,
            InboundReply::Empty => "",
        }
    }
}

/// Builds a [`Gateway`] with an immutable community registry.
#[derive(Default)]
pub struct GatewayBuilder {
    config: ClientConfig,
    communities: Vec<Community>,
    transport: Option<Arc<dyn Transport>>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            communities: Vec::new(),
            transport: None,
        }
    }

    /// Outbound client configuration shared by all communities.
    pub fn client_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Substitute the outbound transport (tests, alternative stacks).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Register a community. Later registrations win on ID collision.
    pub fn community(mut self, community: Community) -> Self {
        self.communities.push(community);
        self
    }

    /// Build the gateway and spawn one outbound client per community.
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Gateway {
        let mut communities = HashMap::new();
        for community in self.communities {
            let client = match &self.transport {
                Some(transport) => ApiClient::with_transport(
                    community.access_token.clone(),
                    self.config.clone(),
                    transport.clone(),
                ),
                None => ApiClient::new(community.access_token.clone(), self.config.clone()),
            };
            communities.insert(community.id, CommunityHandle { community, client });
        }

        Gateway {
            communities,
            handlers: RwLock::new(HashMap::new()),
        }
    }
}

struct CommunityHandle {
    community: Community,
    client: ApiClient,
}

/// Inbound webhook dispatcher.
///
/// Routes each parsed callback body to exactly one community, verifies its
/// secret, answers the confirmation handshake, and emits type-wrapped
/// events to subscribers. Validation failures are silent: the reply never
/// reveals whether a community exists, and adversarial input never panics.
pub struct Gateway {
    communities: HashMap<CommunityId, CommunityHandle>,
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Subscribe a handler to an event type.
    pub async fn on(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let mut guard = self.handlers.write().await;
        guard.entry(event_type.into()).or_default().push(handler);
    }

    /// Subscribe an async closure to an event type.
    pub async fn on_fn<F, Fut>(&self, event_type: impl Into<String>, f: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on(event_type, Arc::new(FnHandler { f })).await;
    }

    /// Registered community, when known.
    pub fn community(&self, id: CommunityId) -> Option<&Community> {
        self.communities.get(&id).map(|handle| &handle.community)
    }

    /// Outbound client of a registered community.
    pub fn client(&self, id: CommunityId) -> Option<&ApiClient> {
        self.communities.get(&id).map(|handle| &handle.client)
    }

    /// Process one parsed inbound body.
    ///
    /// Exactly one of {confirmation reply, event emission, silent no-op}
    /// happens per call; the returned reply is always safe to write back
    /// with HTTP 200.
    pub async fn handle(&self, body: Value) -> InboundReply {
        let Ok(callback) = serde_json::from_value::<CallbackEvent>(body) else {
            metric_inc("gateway.inbound.malformed");
            return InboundReply::Ack;
        };

        if callback.event_type == CONFIRMATION_TYPE {
            return match self.communities.get(&callback.group_id) {
                Some(handle) => {
                    trace_event("gateway.inbound.confirmation");
                    InboundReply::Confirmation(handle.community.confirmation_code.clone())
                }
                None => InboundReply::Empty,
            };
        }

        let Some(handle) = self.communities.get(&callback.group_id) else {
            metric_inc("gateway.inbound.unknown_community");
            return InboundReply::Ack;
        };

        if let Some(secret) = handle.community.secret_key.as_deref() {
            if !secret.is_empty() && callback.secret.as_deref() != Some(secret) {
                metric_inc("gateway.inbound.secret_mismatch");
                return InboundReply::Ack;
            }
        }

        let event = Event::from_callback(
            &callback.event_type,
            callback.object,
            handle.client.clone(),
        );

        let subscribers = {
            let guard = self.handlers.read().await;
            guard.get(&callback.event_type).cloned().unwrap_or_default()
        };

        // Fire-and-continue: the inbound path never awaits handler work,
        // so responding to the platform is independent of outbound calls.
        for handler in subscribers {
            let event = event.clone();
            tokio::spawn(async move {
                handler.handle(event).await;
            });
        }

        metric_inc("gateway.inbound.emitted");
        InboundReply::Ack
    }

    /// Shut down every community's outbound client, draining their queues.
    pub async fn shutdown(&self) {
        for handle in self.communities.values() {
            handle.client.shutdown().await;
        }
    }
}
