//! Docker runtime client
//!
//! Drives the `docker` binary through `tokio::process`. Every invocation is
//! bounded by the configured command timeout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetwatch_core::config::DockerConfig;
use fleetwatch_core::{Container, ContainerFilter, RuntimeClient, RuntimeError, RuntimeResult};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::process::Command;

// ---------------------------------------------------------------------------
// `docker inspect` output
// ---------------------------------------------------------------------------

/// The subset of `docker inspect` needed to recreate a container.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectedContainer {
    pub id: String,
    pub name: String,
    pub created: DateTime<Utc>,
    /// Id of the image the container runs.
    pub image: String,
    pub config: InspectConfig,
    #[serde(default)]
    pub host_config: HostConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectConfig {
    /// Image reference as given at creation, e.g. `nginx:latest`.
    pub image: String,
    #[serde(default)]
    pub env: Option<Vec<String>>,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
    #[serde(default)]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub working_dir: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default)]
    pub binds: Option<Vec<String>>,
    #[serde(default)]
    pub port_bindings: Option<BTreeMap<String, Option<Vec<PortBinding>>>>,
    #[serde(default)]
    pub network_mode: String,
    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub host_port: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub maximum_retry_count: u32,
}

impl InspectedContainer {
    pub fn to_container(&self) -> RuntimeResult<Container> {
        let labels = self.config.labels.clone().unwrap_or_default();
        let container = Container::new(&self.id, &self.name, &self.config.image, self.created)
            .map_err(|e| RuntimeError::Parse(e.to_string()))?
            .with_image_id(&self.image)
            .with_labels(&labels);
        Ok(container)
    }
}

pub fn parse_inspect(json: &str) -> RuntimeResult<Vec<InspectedContainer>> {
    serde_json::from_str(json).map_err(|e| RuntimeError::Parse(e.to_string()))
}

/// Arguments for `docker run` that recreate `inspected` under `name` from its
/// image reference.
pub fn run_args(inspected: &InspectedContainer, name: &str) -> Vec<String> {
    let config = &inspected.config;
    let host = &inspected.host_config;
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        name.to_string(),
    ];

    for env in config.env.iter().flatten() {
        args.push("-e".to_string());
        args.push(env.clone());
    }

    if let Some(labels) = &config.labels {
        let sorted: BTreeMap<_, _> = labels.iter().collect();
        for (key, value) in sorted {
            args.push("--label".to_string());
            args.push(format!("{key}={value}"));
        }
    }

    for bind in host.binds.iter().flatten() {
        args.push("-v".to_string());
        args.push(bind.clone());
    }

    for (container_port, bindings) in host.port_bindings.iter().flatten() {
        for binding in bindings.iter().flatten() {
            let spec = match (binding.host_ip.as_str(), binding.host_port.as_str()) {
                ("", "") => container_port.clone(),
                ("", port) => format!("{port}:{container_port}"),
                (ip, port) => format!("{ip}:{port}:{container_port}"),
            };
            args.push("-p".to_string());
            args.push(spec);
        }
    }

    if !host.network_mode.is_empty() && host.network_mode != "default" {
        args.push("--network".to_string());
        args.push(host.network_mode.clone());
    }

    if let Some(policy) = &host.restart_policy {
        match policy.name.as_str() {
            "" | "no" => {}
            "on-failure" if policy.maximum_retry_count > 0 => {
                args.push("--restart".to_string());
                args.push(format!("on-failure:{}", policy.maximum_retry_count));
            }
            other => {
                args.push("--restart".to_string());
                args.push(other.to_string());
            }
        }
    }

    if !config.user.is_empty() {
        args.push("--user".to_string());
        args.push(config.user.clone());
    }
    if !config.working_dir.is_empty() {
        args.push("-w".to_string());
        args.push(config.working_dir.clone());
    }

    // `--entrypoint` takes a single program; the rest of an exec-form
    // entrypoint goes in front of the command.
    let mut trailing = Vec::new();
    if let Some((program, rest)) = config.entrypoint.as_deref().and_then(|e| e.split_first()) {
        args.push("--entrypoint".to_string());
        args.push(program.clone());
        trailing.extend(rest.iter().cloned());
    }

    args.push(config.image.clone());
    args.extend(trailing);
    args.extend(config.cmd.iter().flatten().cloned());
    args
}

// ---------------------------------------------------------------------------
// DockerCli
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct DockerCli {
    binary: PathBuf,
    timeout: Duration,
    /// Inspect output by container id, kept so `start` can recreate.
    inspected: Mutex<HashMap<String, InspectedContainer>>,
}

impl DockerCli {
    pub fn new(config: &DockerConfig) -> anyhow::Result<Self> {
        let binary = which::which(&config.binary).map_err(|e| {
            anyhow::anyhow!("docker binary '{}' not found: {e}", config.binary)
        })?;
        Ok(Self {
            binary,
            timeout: config.command_timeout(),
            inspected: Mutex::new(HashMap::new()),
        })
    }

    async fn docker<S: AsRef<OsStr>>(&self, args: &[S], timeout: Duration) -> RuntimeResult<String> {
        let command = args
            .first()
            .map(|a| format!("docker {}", a.as_ref().to_string_lossy()))
            .unwrap_or_else(|| "docker".to_string());

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| RuntimeError::Timeout(timeout))?
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::command_failed(command, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn inspect(&self, ids: &[String]) -> RuntimeResult<Vec<InspectedContainer>> {
        let mut args = vec!["inspect".to_string()];
        args.extend(ids.iter().cloned());
        let records = parse_inspect(&self.docker(&args, self.timeout).await?)?;
        self.remember(&records);
        Ok(records)
    }

    /// Entries are whole inspect records, so a poisoned lock is still usable.
    fn cache(&self) -> MutexGuard<'_, HashMap<String, InspectedContainer>> {
        self.inspected.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("inspect cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn remember(&self, records: &[InspectedContainer]) {
        let mut cache = self.cache();
        for r in records {
            cache.insert(r.id.clone(), r.clone());
        }
    }

    fn cached(&self, id: &str) -> Option<InspectedContainer> {
        self.cache().get(id).cloned()
    }

    async fn recreate_config(&self, id: &str) -> RuntimeResult<InspectedContainer> {
        if let Some(record) = self.cached(id) {
            return Ok(record);
        }
        self.inspect(&[id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl RuntimeClient for DockerCli {
    fn name(&self) -> &str {
        "docker"
    }

    async fn list_containers(&self, filter: &ContainerFilter) -> RuntimeResult<Vec<Container>> {
        let ids: Vec<String> = self
            .docker(&["ps", "-q", "--no-trunc"], self.timeout)
            .await?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut containers = Vec::with_capacity(ids.len());
        for record in self.inspect(&ids).await? {
            match record.to_container() {
                Ok(c) if filter.matches(&c) => containers.push(c),
                Ok(_) => {}
                Err(e) => tracing::warn!(id = %record.id, error = %e, "skipping container"),
            }
        }
        Ok(containers)
    }

    async fn is_stale(&self, container: &Container) -> RuntimeResult<bool> {
        if container.image.contains('@') {
            tracing::debug!(container = %container.name, "image pinned by digest, never stale");
            return Ok(false);
        }
        self.docker(&["pull", "-q", container.image.as_str()], self.timeout)
            .await?;
        let latest = self
            .docker(
                &["image", "inspect", "--format", "{{.Id}}", container.image.as_str()],
                self.timeout,
            )
            .await?;
        Ok(latest.trim() != container.image_id)
    }

    async fn stop(&self, container: &Container, grace: Duration) -> RuntimeResult<()> {
        // Keep the recreate config before the container disappears.
        self.recreate_config(&container.id).await?;

        let secs = grace.as_secs().to_string();
        let mut args = vec!["stop", "--time", secs.as_str()];
        if let Some(signal) = &container.settings.stop_signal {
            args.push("--signal");
            args.push(signal.as_str());
        }
        args.push(container.id.as_str());
        self.docker(&args, self.timeout + grace).await?;
        self.docker(&["rm", container.id.as_str()], self.timeout)
            .await?;
        Ok(())
    }

    async fn start(&self, container: &Container) -> RuntimeResult<String> {
        let record = self.recreate_config(&container.id).await?;
        let args = run_args(&record, &container.name);
        let new_id = self.docker(&args, self.timeout).await?.trim().to_string();
        if new_id.is_empty() {
            return Err(RuntimeError::Parse("docker run printed no container id".into()));
        }
        Ok(new_id)
    }

    async fn rename(&self, container: &Container, new_name: &str) -> RuntimeResult<()> {
        self.recreate_config(&container.id).await?;
        self.docker(&["rename", container.id.as_str(), new_name], self.timeout)
            .await?;
        Ok(())
    }

    async fn remove_image(&self, image_id: &str) -> RuntimeResult<()> {
        self.docker(&["image", "rm", image_id], self.timeout).await?;
        Ok(())
    }

    async fn exec(&self, container_id: &str, command: &str, timeout: Duration) -> RuntimeResult<()> {
        self.docker(&["exec", container_id, "sh", "-c", command], timeout)
            .await?;
        Ok(())
    }

    async fn get_container(&self, id: &str) -> RuntimeResult<Container> {
        self.inspect(&[id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?
            .to_container()
    }
}
