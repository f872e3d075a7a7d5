//! opendmd - OpenDM gateway daemon
//!
//! Wires the four process-wide collaborators together (device repository,
//! component repository, connection registry, event producer), then serves
//! the northbound surface until a termination signal drains it.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use opendm_agent::{AdapterFactory, AdapterTable, AgentSettings, HttpAdapterFactory, TlsOptions};
use opendm_api::{create_router, AppState, ConnectionRegistry};
use opendm_events::kafka::KafkaBus;
use opendm_store::{ComponentRepository, DeviceRepository, EtcdStore};
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::CoreFlags;

/// How long in-flight streams may drain after a termination signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn init_tracing(log_level: &str) {
    let default_directive = match log_level.to_ascii_uppercase().as_str() {
        "ERROR" => "error",
        "WARN" => "warn",
        "INFO" => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let flags = CoreFlags::from_env();
    init_tracing(&flags.log_level);
    tracing::info!(?flags, "starting opendmd");

    // Durable inventory; unreachable store is fatal at startup.
    let store = EtcdStore::connect(&flags.db_end_point, flags.db_timeout)
        .await
        .context("kv store connect")?;
    store
        .wait_until_reachable(flags.max_retry_count, flags.db_timeout)
        .await
        .context("kv store liveness")?;
    let store = Arc::new(store);

    // Event producer; construction failure is fatal, broker hiccups are not.
    let bus = Arc::new(
        KafkaBus::connect(&flags.msgbus_end_point, flags.msgbus_retry_interval)
            .context("message bus producer")?,
    );

    let devices = Arc::new(DeviceRepository::new(store.clone()));
    let components = Arc::new(ComponentRepository::new(store.clone()));

    let settings = AgentSettings {
        dial_timeout: flags.dial_timeout,
        backoff_max: flags.backoff_max_delay,
        max_retries: flags.max_retry_count,
        tls: flags.secure_connection.then(|| TlsOptions {
            root_ca_path: config::PATH_ROOT_CA_CRT.into(),
            server_name: config::AGENT_TLS_SERVER_NAME.into(),
        }),
        ..Default::default()
    };
    let factory: Arc<dyn AdapterFactory> = Arc::new(HttpAdapterFactory::new(
        settings,
        devices.clone(),
        components.clone(),
    ));
    let registry = Arc::new(ConnectionRegistry::new(AdapterTable::new(factory)));

    let state = AppState::new(devices, components, registry.clone(), bus);
    let router = create_router(state);

    let addr: SocketAddr = flags
        .listen_end_point
        .parse()
        .with_context(|| format!("invalid listen address {}", flags.listen_end_point))?;

    // One watch channel fans the termination signal out to the server and
    // the drain watchdog.
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    spawn_signal_listener(stop_tx)?;

    if flags.secure_connection {
        serve_tls(addr, router, stop_rx).await?;
    } else {
        serve_plain(addr, router, stop_rx).await?;
    }

    registry.shutdown().await;
    tracing::info!("opendmd stopped");
    Ok(())
}

/// Forward SIGHUP/SIGINT/SIGTERM/SIGQUIT into the stop channel.
fn spawn_signal_listener(stop_tx: tokio::sync::watch::Sender<bool>) -> anyhow::Result<()> {
    let mut sighup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigquit = signal(SignalKind::quit()).context("installing SIGQUIT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sighup.recv() => tracing::info!("SIGHUP received"),
            _ = sigint.recv() => tracing::info!("SIGINT received"),
            _ = sigterm.recv() => tracing::info!("SIGTERM received"),
            _ = sigquit.recv() => tracing::info!("SIGQUIT received"),
        }
        let _ = stop_tx.send(true);
    });
    Ok(())
}

async fn serve_plain(
    addr: SocketAddr,
    router: axum::Router,
    stop_rx: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding northbound listener on {addr}"))?;
    tracing::info!(%addr, "northbound listener up (plaintext)");

    let mut shutdown_rx = stop_rx.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = shutdown_rx.changed().await;
    });

    let mut watchdog_rx = stop_rx;
    let watchdog = async move {
        let _ = watchdog_rx.changed().await;
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    };

    tokio::select! {
        result = server => result.context("northbound server")?,
        _ = watchdog => tracing::warn!("drain grace period elapsed, forcing shutdown"),
    }
    Ok(())
}

async fn serve_tls(
    addr: SocketAddr,
    router: axum::Router,
    mut stop_rx: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
        config::PATH_SERVER_CRT,
        config::PATH_SERVER_KEY,
    )
    .await
    .context("loading northbound server certificate")?;
    tracing::info!(%addr, "northbound listener up (tls)");

    let handle = axum_server::Handle::new();
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            let _ = stop_rx.changed().await;
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });
    }

    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .context("northbound tls server")?;
    Ok(())
}
