//! Northbound RPC handlers.

pub mod devices;
pub mod inventory;
pub mod logging;

use axum::response::sse::{Event, Sse};
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Bounded frame channel plus the SSE response that drains it. Capacity one:
/// the producing task blocks until the previous frame is flushed, so nothing
/// is buffered beyond a single frame.
pub(crate) fn sse_channel<T: Serialize + Send + 'static>() -> (
    mpsc::Sender<T>,
    Sse<impl Stream<Item = Result<Event, axum::Error>>>,
) {
    let (tx, rx) = mpsc::channel::<T>(1);
    let stream = ReceiverStream::new(rx).map(|frame| Event::default().json_data(&frame));
    (tx, Sse::new(stream))
}
