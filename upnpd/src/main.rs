//! `upnpd` : hôte UPnP autonome
//!
//! Publie un device `Basic:1` exposant le service `CallableService`, découvre
//! les devices du réseau et sert les requêtes HTTP (descriptions, SOAP, GENA)
//! avec Axum.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use upnpconfig::get_config;
use upnpstack::devices::{DeviceInfo, HostedDevice};
use upnpstack::hooks::{DEVICE_ADDED, DEVICE_REMOVED, HookBus};
use upnpstack::http::{UpnpRequest, UreqHttpClient};
use upnpstack::services::callable::callable_service;
use upnpstack::ssdp::{SsdpListener, UdpTransport};
use upnpstack::{ControlPoint, UpnpStackConfigExt};

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Passe une requête Axum au point de contrôle.
async fn dispatch(
    State(cp): State<Arc<ControlPoint>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut request = UpnpRequest::new(method.as_str(), uri.path(), remote.ip()).body(body.to_vec());
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            request = request.header(name.as_str(), value);
        }
    }

    // handle_request peut bloquer sur le verrou du registre
    let response = match tokio::task::spawn_blocking(move || cp.handle_request(&request)).await {
        Ok(response) => response,
        Err(e) => {
            warn!("request handler failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn log_hooks(hooks: &HookBus) {
    hooks.register(DEVICE_ADDED, |args: Value| {
        info!("➕ device added: {}", args);
        Ok(Value::Null)
    });
    hooks.register(DEVICE_REMOVED, |args: Value| {
        info!("➖ device removed: {}", args);
        Ok(Value::Null)
    });
}

fn build_device(hooks: &HookBus) -> Result<HostedDevice> {
    let config = get_config();
    let info = DeviceInfo::new(&config.get_device_friendly_name(), "upnpstack", "upnpd");
    let mut device = HostedDevice::new("Basic", 1, info)?.with_udn(&config.get_device_udn()?);
    device.add_service(callable_service(hooks.clone())?)?;
    Ok(device)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = get_config();
    init_logging(&config.get_log_level());
    config.apply_quirks()?;

    let settings = config.control_point_settings()?;
    let http_port = config.get_http_port();
    info!("🚀 upnpd starting, devices at {}", settings.base_url);

    let transport = Arc::new(UdpTransport::new(settings.ipv6)?);
    let http = Arc::new(UreqHttpClient::new(config.get_http_timeout_duration()?));
    let hooks = HookBus::new();
    log_hooks(&hooks);

    let cp = ControlPoint::new(settings, transport.clone(), http, hooks.clone())?;
    // Les réponses aux M-SEARCH reviennent sur le port d'émission
    let unicast = SsdpListener::from_socket(transport.try_clone_v4()?, "unicast");
    cp.attach_listener(unicast)?;
    cp.start()?;

    let device = cp.add_device(build_device(&hooks)?)?;
    info!("✅ device ready at {}", device.location());

    let app = Router::new().fallback(dispatch).with_state(cp.clone());
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], http_port)))
        .await
        .with_context(|| format!("cannot listen on port {}", http_port))?;
    info!("🌐 HTTP server listening on port {}", http_port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("cannot listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C reçu, arrêt gracieux");
    })
    .await?;

    tokio::task::spawn_blocking(move || cp.stop()).await?;
    info!("👋 upnpd stopped");
    Ok(())
}
