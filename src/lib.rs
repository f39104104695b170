//! A single-process gateway for the VK Callback API.
//!
//! This crate pairs an **inbound webhook dispatcher** with an **outbound
//! batched API client**: incoming callback pushes are verified per
//! community, answered through the confirmation handshake, and emitted as
//! type-wrapped events; outgoing calls are queued and flushed every
//! ~75 ms in FIFO batches of up to 25 through the platform's `execute`
//! meta-method, so the per-second call limit bounds *batches*, not calls.
//!
//! ## Guarantees
//! - Exactly one outcome per queued call, never a double resolution
//! - Result correlation by opaque ID, never by position alone
//! - Submission order preserved within and across batches
//! - Silent rejection of unauthenticated inbound traffic
//!
//! ## Non-Guarantees
//! - Durability across restarts
//! - Credential issuance or renewal
//! - Distributed coordination
//!
//! The gateway is intentionally a **single logical instance**: one flush
//! task per community client, one immutable community registry, shared by
//! all inbound requests.

mod batch;
mod client;
mod error;
mod event;
mod gateway;
mod transport;
mod types;
mod upload;

#[cfg(feature = "server")]
mod server;

pub use client::ApiClient;
pub use error::{CallError, RemoteError, TransportError, UploadError};
pub use event::{Event, MessageEvent, RawEvent};
pub use gateway::{EventHandler, Gateway, GatewayBuilder, InboundReply};
pub use transport::{HttpTransport, Transport};
pub use types::{
    params, CallbackEvent, ClientConfig, Community, CommunityId, CorrelationId, Params,
};
pub use upload::{FileKind, UploadFile};

#[cfg(feature = "server")]
pub use server::{router, serve};
