//! Test fixtures: container builders and a recording [`RuntimeClient`].

use crate::client::RuntimeClient;
use crate::container::Container;
use crate::error::{RuntimeError, RuntimeResult};
use crate::filter::ContainerFilter;
use crate::resolver::StalenessMap;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn container(name: &str, depends_on: Option<&str>) -> Container {
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut c = Container::new(format!("{name}-id"), name, format!("{name}-image:latest"), created)
        .unwrap()
        .with_image_id(format!("sha256:{name}"));
    c.depends_on = depends_on.map(str::to_string);
    c
}

pub fn staleness(stale: &[&str]) -> StalenessMap {
    stale.iter().map(|n| (n.to_string(), true)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Stop(String),
    Start(String),
    Rename(String, String),
    RemoveImage(String),
    Exec(String, String),
    Get(String),
}

/// Records every call and fails the ones it is told to.
#[derive(Debug, Default)]
pub struct MockClient {
    pub containers: Vec<Container>,
    pub stale: HashSet<String>,
    pub stale_errors: HashSet<String>,
    pub fail_list: bool,
    pub fail_stop: HashSet<String>,
    pub fail_start: HashSet<String>,
    pub fail_exec: HashSet<String>,
    pub fail_remove_image: HashSet<String>,
    pub calls: Mutex<Vec<Call>>,
    /// Cancel the token once the named container has been stopped.
    pub cancel_after_stop: Option<(String, CancellationToken)>,
}

impl MockClient {
    pub fn new(containers: Vec<Container>, stale: &[&str]) -> Self {
        Self {
            containers,
            stale: stale.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Stop(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn started(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Start(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Names of every container that received any mutating call.
    pub fn touched(&self) -> HashSet<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Stop(n) | Call::Start(n) | Call::Rename(n, _) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn by_id(&self) -> HashMap<String, &Container> {
        self.containers
            .iter()
            .map(|c| (c.id.clone(), c))
            .collect()
    }
}

#[async_trait]
impl RuntimeClient for MockClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_containers(&self, filter: &ContainerFilter) -> RuntimeResult<Vec<Container>> {
        if self.fail_list {
            return Err(RuntimeError::Unavailable("mock runtime down".into()));
        }
        Ok(self
            .containers
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn is_stale(&self, container: &Container) -> RuntimeResult<bool> {
        if self.stale_errors.contains(&container.name) {
            return Err(RuntimeError::command_failed("pull", "registry unreachable"));
        }
        Ok(self.stale.contains(&container.name))
    }

    async fn stop(&self, container: &Container, _grace: Duration) -> RuntimeResult<()> {
        if self.fail_stop.contains(&container.name) {
            return Err(RuntimeError::command_failed("stop", "refused to stop"));
        }
        self.record(Call::Stop(container.name.clone()));
        if let Some((name, token)) = &self.cancel_after_stop {
            if name == &container.name {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn start(&self, container: &Container) -> RuntimeResult<String> {
        if self.fail_start.contains(&container.name) {
            return Err(RuntimeError::command_failed("start", "image missing"));
        }
        self.record(Call::Start(container.name.clone()));
        Ok(format!("{}-new", container.id))
    }

    async fn rename(&self, container: &Container, new_name: &str) -> RuntimeResult<()> {
        self.record(Call::Rename(container.name.clone(), new_name.to_string()));
        Ok(())
    }

    async fn remove_image(&self, image_id: &str) -> RuntimeResult<()> {
        if self.fail_remove_image.contains(image_id) {
            return Err(RuntimeError::command_failed("rmi", "image in use"));
        }
        self.record(Call::RemoveImage(image_id.to_string()));
        Ok(())
    }

    async fn exec(
        &self,
        container_id: &str,
        command: &str,
        _timeout: Duration,
    ) -> RuntimeResult<()> {
        if self.fail_exec.contains(container_id) {
            return Err(RuntimeError::command_failed("exec", "exit status 1"));
        }
        self.record(Call::Exec(container_id.to_string(), command.to_string()));
        Ok(())
    }

    async fn get_container(&self, id: &str) -> RuntimeResult<Container> {
        self.record(Call::Get(id.to_string()));
        let by_id = self.by_id();
        let original = id
            .strip_suffix("-new")
            .and_then(|old| by_id.get(old))
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        let mut fresh = (*original).clone();
        fresh.id = id.to_string();
        Ok(fresh)
    }
}
