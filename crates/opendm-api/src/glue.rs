//! Request-scoped correlation.

use tracing::Span;
use uuid::Uuid;

/// Span carrying the RPC name and a fresh correlation id; every log record
/// emitted while serving the request inherits both.
pub(crate) fn rpc_span(op: &'static str) -> Span {
    tracing::info_span!("rpc", op, request_id = %Uuid::new_v4())
}
