//! Test helpers: an ephemeral gateway server plus a typed client.

use std::net::SocketAddr;

use opendm_agent::{AgentClient, AgentError, AgentSettings};
use tokio::net::TcpListener;

/// A gateway serving on an ephemeral port, shut down when dropped. Because
/// north and south speak the same contract, the bundled [`AgentClient`]
/// doubles as the NEM-side test client.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: AgentClient,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start(router: axum::Router) -> Result<Self, AgentError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| AgentError::ConnectionFailed(e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AgentError::ConnectionFailed(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        let client = AgentClient::new(&addr.to_string(), AgentSettings::default())?;

        Ok(Self {
            addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
