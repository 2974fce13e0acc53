//! Assembles an [`ApiGateway`] from configuration.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::{AppConfig, ServiceConfig};
use crate::gateway::{ApiGateway, Proxy, WebSocketProxy};
use crate::serving::ServingStrategy;

/// Builds the gateway described by `cfg`. No network I/O happens here.
///
/// Services are grouped by their `group` key into one proxy API each, in
/// order of first appearance. All proxies share one HTTP connection pool.
pub fn build_gateway(
    cfg: &AppConfig,
    strategy: Arc<dyn ServingStrategy>,
    websocket: Arc<WebSocketProxy>,
) -> ApiGateway {
    let client = reqwest::Client::new();
    let options = cfg.proxy_options();

    let mut gateway = ApiGateway::new(strategy)
        .with_version(cfg.gateway.version.clone())
        .with_websocket_proxy(websocket);

    for (group, services) in group_services(&cfg.gateway.services) {
        let mut api = gateway.new_api();
        api.add_proxies(services.into_iter().map(|service| {
            let proxy = Proxy::new(&service.name, &service.url)
                .with_options(options.clone())
                .with_client(client.clone());
            match &service.route_prefix {
                Some(prefix) => proxy.with_route_prefix(prefix),
                None => proxy,
            }
        }));
        tracing::info!(group = %group, proxies = api.proxies().len(), "Configured proxy API");
        gateway.add_api(api);
    }

    gateway
}

fn group_services(services: &[ServiceConfig]) -> IndexMap<&str, Vec<&ServiceConfig>> {
    let mut groups: IndexMap<&str, Vec<&ServiceConfig>> = IndexMap::new();
    for service in services {
        groups.entry(service.group.as_str()).or_default().push(service);
    }
    groups
}
