//! opendm-agent - Southbound side of the OpenDM gateway
//!
//! One adapter per managed device translates gateway calls into sessions
//! with the device agent at the record's `uri`. The [`Adapter`] trait is the
//! capability set; [`HttpAdapter`] is the default implementation, speaking
//! the shared wire contract over HTTP with SSE streaming and reconciling the
//! repositories as frames arrive. [`AdapterTable`] picks an adapter factory
//! by device make, falling back to the default.

pub mod adapter;
pub mod client;
pub mod error;
pub mod http;
pub mod mock;
pub mod sim;
mod sse;

pub use adapter::{Adapter, AdapterFactory, AdapterTable, FrameSender};
pub use client::{AgentClient, AgentSettings, TlsOptions};
pub use error::AgentError;
pub use http::{HttpAdapter, HttpAdapterFactory};
pub use mock::{MockAdapter, MockAdapterFactory};
pub use sim::SimAgent;
