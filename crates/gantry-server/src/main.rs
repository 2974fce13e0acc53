use std::sync::Arc;

use gantry_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use gantry_server::gateway::WebSocketProxy;
use gantry_server::serving::AxumStrategy;
use gantry_server::{build_gateway, observability};

#[tokio::main]
async fn main() {
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(e) if e.not_found() => {}
        Err(e) => eprintln!("Ignoring .env: {e}"),
    }

    observability::init_tracing("info");

    let (path, origin) = config_path(std::env::args().skip(1), std::env::var("GANTRY_CONFIG").ok());
    let cfg = match load_config(Some(&path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(
        path = %path,
        origin,
        services = cfg.gateway.services.len(),
        "Configuration loaded"
    );
    observability::apply_logging_level(&cfg.logging.level);

    let websocket = Arc::new(WebSocketProxy::new());
    let strategy = Arc::new(AxumStrategy::from_config(&cfg).with_websocket_proxy(websocket.clone()));
    let mut gateway = build_gateway(&cfg, strategy, websocket);

    if let Err(err) = gateway.run().await {
        tracing::error!(error = %err, "Gateway stopped");
        eprintln!("Gateway error: {err}");
        std::process::exit(1);
    }
}

/// Config file to load: `--config <path>`, then a non-empty `GANTRY_CONFIG`,
/// then `gantry.toml`. The second element names where the path came from.
fn config_path(
    args: impl Iterator<Item = String>,
    env_path: Option<String>,
) -> (String, &'static str) {
    if let Some(path) = args.skip_while(|arg| *arg != "--config").nth(1) {
        return (path, "--config");
    }
    match env_path.filter(|path| !path.is_empty()) {
        Some(path) => (path, "GANTRY_CONFIG"),
        None => (DEFAULT_CONFIG_FILE.to_string(), "default"),
    }
}
