//! Route ownership bookkeeping.
//!
//! Two methods collide when they share both HTTP verb and route. The first
//! service to claim a route owns it; later claims fail the build.

use std::collections::HashMap;

use gantry_core::{Method, ProxyError};

#[derive(Debug, Default)]
pub struct RouteRegistry {
    owners: HashMap<String, String>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `method`'s route for `service`.
    pub fn claim(&mut self, method: &Method, service: &str) -> Result<(), ProxyError> {
        let key = method.route_key();
        if let Some(existing) = self.owners.get(&key) {
            return Err(ProxyError::RouteCollision {
                route: key,
                service: service.to_string(),
                existing: existing.clone(),
            });
        }
        self.owners.insert(key, service.to_string());
        Ok(())
    }

    /// Claims every method in `methods` for `service`, stopping at the first collision.
    pub fn claim_all(&mut self, methods: &[Method], service: &str) -> Result<(), ProxyError> {
        methods
            .iter()
            .try_for_each(|method| self.claim(method, service))
    }

    pub fn owner(&self, route_key: &str) -> Option<&str> {
        self.owners.get(route_key).map(String::as_str)
    }

    pub fn contains(&self, route_key: &str) -> bool {
        self.owners.contains_key(route_key)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
