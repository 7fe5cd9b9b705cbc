//! The container runtime as seen by the update cycle.
//!
//! Implementations own every wire protocol, registry lookup and timeout. The
//! core only calls through this trait, and only from
//! [`Executor`](crate::executor::Executor) and
//! [`run_cycle`](crate::update::run_cycle).

use crate::container::Container;
use crate::error::RuntimeResult;
use crate::filter::ContainerFilter;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Human-readable runtime name for logs.
    fn name(&self) -> &str;

    /// Enumerate the containers visible to this cycle, labels already parsed.
    async fn list_containers(&self, filter: &ContainerFilter) -> RuntimeResult<Vec<Container>>;

    /// Whether a newer image than the one `container` runs is available.
    async fn is_stale(&self, container: &Container) -> RuntimeResult<bool>;

    /// Stop `container`, allowing `grace` before it is killed.
    async fn stop(&self, container: &Container, grace: Duration) -> RuntimeResult<()>;

    /// Recreate `container` from its refreshed image and start it.
    /// Returns the replacement's id.
    async fn start(&self, container: &Container) -> RuntimeResult<String>;

    /// Rename `container`, freeing its name for a replacement.
    async fn rename(&self, container: &Container, new_name: &str) -> RuntimeResult<()>;

    async fn remove_image(&self, image_id: &str) -> RuntimeResult<()>;

    /// Run `command` inside a container, failing on non-zero exit or timeout.
    async fn exec(&self, container_id: &str, command: &str, timeout: Duration)
        -> RuntimeResult<()>;

    /// Fetch fresh metadata for a container by id.
    async fn get_container(&self, id: &str) -> RuntimeResult<Container>;
}
