//! Serving layer: mounts synthesized methods onto an HTTP server.

pub mod router;
pub mod error;

use async_trait::async_trait;
use gantry_core::Method;

pub use router::{AxumStrategy, ServingState};
pub use error::ServingError;

/// Contract the gateway core needs from the HTTP serving framework.
///
/// Registration happens before `run`; the aggregate gateway calls
/// `configure` exactly once with its merged table.
#[async_trait]
pub trait ServingStrategy: Send + Sync {
    /// Exposes one method. A method with the same route key replaces the earlier one.
    fn register_method(&self, method: Method);

    /// Replaces the whole method table and records the API version.
    fn configure(&self, methods: Vec<Method>, version: &str);

    /// Starts serving until shutdown.
    async fn run(&self) -> anyhow::Result<()>;
}
