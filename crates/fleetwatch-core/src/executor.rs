//! Drives the runtime client through an [`UpdatePlan`].
//!
//! Stop sequence first, then start sequence, strictly one container at a
//! time. Every failure is scoped to its container: it is recorded, the
//! container leaves the recycle, and the walk moves on. A container whose
//! planned dependency did not come back is not restarted.

use crate::client::RuntimeClient;
use crate::container::{retired_name, Container};
use crate::error::FleetError;
use crate::report::{CycleWarning, FailedPhase, Outcome, SkipReason};
use crate::scheduler::UpdatePlan;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Grace period passed to every stop.
    pub stop_timeout: Duration,
    /// Remove the previous image of each recycled container.
    pub cleanup: bool,
    /// Run pre/post-update hooks declared in labels.
    pub lifecycle_hooks: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(10),
            cleanup: false,
            lifecycle_hooks: false,
        }
    }
}

/// Per-container outcomes for every member of the plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    pub outcomes: BTreeMap<String, Outcome>,
    pub warnings: Vec<CycleWarning>,
}

impl Execution {
    fn set(&mut self, name: &str, outcome: Outcome) {
        self.outcomes.insert(name.to_string(), outcome);
    }

    fn warn(&mut self, container: Option<&str>, message: String) {
        tracing::warn!(container = container.unwrap_or("-"), "{message}");
        self.warnings.push(CycleWarning {
            container: container.map(str::to_string),
            message,
        });
    }
}

pub struct Executor<'a, C: RuntimeClient + ?Sized> {
    client: &'a C,
    options: ExecutorOptions,
    cancel: CancellationToken,
}

impl<'a, C: RuntimeClient + ?Sized> Executor<'a, C> {
    pub fn new(client: &'a C, options: ExecutorOptions, cancel: CancellationToken) -> Self {
        Self {
            client,
            options,
            cancel,
        }
    }

    /// Recycle every container in `plan`. `containers` must hold every
    /// planned name; a missing entry fails that container only.
    pub async fn execute(
        &self,
        plan: &UpdatePlan,
        containers: &HashMap<String, Container>,
    ) -> Execution {
        let mut run = Execution::default();

        for excluded in plan.excluded() {
            run.set(
                &excluded.name,
                Outcome::failed(FailedPhase::Configuration, &excluded.issue),
            );
        }

        // Stopped, or deliberately left running because monitor-only.
        let mut stopped: HashSet<&str> = HashSet::new();
        let mut left_running: HashSet<&str> = HashSet::new();

        for name in plan.stop_sequence() {
            if self.cancel.is_cancelled() {
                run.set(name, Outcome::Skipped(SkipReason::Cancelled));
                continue;
            }
            let Some(container) = containers.get(name) else {
                let err = FleetError::ContainerNotFound(name.clone());
                run.set(name, Outcome::failed(FailedPhase::Stop, err));
                continue;
            };
            if container.is_monitor_only() {
                tracing::info!(container = %name, "monitor only, leaving running");
                run.set(name, Outcome::Skipped(SkipReason::MonitorOnly));
                left_running.insert(name);
                continue;
            }
            match self.stop_one(container).await {
                Ok(()) => {
                    stopped.insert(name);
                }
                Err(outcome) => run.set(name, outcome),
            }
        }

        if self.cancel.is_cancelled() {
            tracing::warn!(
                stopped = stopped.len(),
                "cycle cancelled, stopped containers stay down until the next cycle"
            );
            for name in stopped {
                run.set(name, Outcome::Skipped(SkipReason::Cancelled));
            }
            return run;
        }

        // Up and serving by the time its dependents start: recycled, or left
        // running with its own dependency available.
        let mut available: HashSet<&str> = HashSet::new();
        let mut recycled: BTreeSet<&str> = BTreeSet::new();
        for name in plan.start_sequence() {
            let upstream = plan.upstream_of(name);
            let upstream_ok = upstream.map_or(true, |dep| available.contains(dep));
            if left_running.contains(name.as_str()) {
                if upstream_ok {
                    available.insert(name);
                }
                continue;
            }
            if !stopped.contains(name.as_str()) {
                continue;
            }
            if let Some(dep) = upstream {
                if !upstream_ok {
                    tracing::warn!(container = %name, dependency = dep, "dependency not recycled, not restarting");
                    run.set(
                        name,
                        Outcome::Skipped(SkipReason::UpstreamFailed {
                            dependency: dep.to_string(),
                        }),
                    );
                    continue;
                }
            }
            let container = &containers[name];
            match self.client.start(container).await {
                Ok(new_id) => {
                    tracing::info!(container = %name, new_id = %new_id, "recycled");
                    self.post_update(container, &new_id, &mut run).await;
                    available.insert(name);
                    recycled.insert(name);
                    run.set(name, Outcome::Recycled { new_id });
                }
                Err(e) => {
                    tracing::error!(container = %name, error = %e, "start failed");
                    run.set(name, Outcome::failed(FailedPhase::Start, e));
                }
            }
        }

        if self.options.cleanup {
            self.cleanup(plan, &recycled, containers, &mut run).await;
        }

        run
    }

    async fn stop_one(&self, container: &Container) -> Result<(), Outcome> {
        let name = container.name.as_str();

        if self.options.lifecycle_hooks {
            if let Some(hook) = &container.settings.pre_update {
                tracing::debug!(container = %name, command = %hook.command, "running pre-update hook");
                if let Err(e) = self
                    .client
                    .exec(&container.id, &hook.command, hook.timeout)
                    .await
                {
                    tracing::error!(container = %name, error = %e, "pre-update hook failed");
                    return Err(Outcome::failed(FailedPhase::PreUpdate, e));
                }
            }
        }

        let result = if container.settings.is_updater {
            let retired = retired_name(name);
            tracing::info!(container = %name, retired = %retired, "renaming updater container to free its name");
            self.client.rename(container, &retired).await
        } else {
            tracing::info!(container = %name, grace = ?self.options.stop_timeout, "stopping");
            self.client.stop(container, self.options.stop_timeout).await
        };

        result.map_err(|e| {
            tracing::error!(container = %name, error = %e, "stop failed");
            Outcome::failed(FailedPhase::Stop, e)
        })
    }

    async fn post_update(&self, container: &Container, new_id: &str, run: &mut Execution) {
        if !self.options.lifecycle_hooks {
            return;
        }
        let Some(hook) = &container.settings.post_update else {
            return;
        };
        let fresh = match self.client.get_container(new_id).await {
            Ok(c) => c,
            Err(e) => {
                run.warn(
                    Some(container.name.as_str()),
                    format!("could not inspect replacement for post-update hook: {e}"),
                );
                return;
            }
        };
        // Labels travel with the image config, so prefer the replacement's hook.
        let hook = fresh.settings.post_update.as_ref().unwrap_or(hook);
        if let Err(e) = self.client.exec(&fresh.id, &hook.command, hook.timeout).await {
            run.warn(Some(container.name.as_str()), format!("post-update hook failed: {e}"));
        }
    }

    /// Remove the previous image of each recycled stale container. Dependents
    /// were only restarted and still run the image they started with.
    async fn cleanup(
        &self,
        plan: &UpdatePlan,
        recycled: &BTreeSet<&str>,
        containers: &HashMap<String, Container>,
        run: &mut Execution,
    ) {
        let images: BTreeSet<&str> = recycled
            .iter()
            .filter(|name| plan.is_stale(name))
            .filter_map(|name| containers.get(*name))
            .map(|c| c.image_id.as_str())
            .filter(|id| !id.is_empty())
            .collect();
        for image_id in images {
            match self.client.remove_image(image_id).await {
                Ok(()) => tracing::info!(image = image_id, "removed previous image"),
                Err(e) => run.warn(None, format!("failed to remove image {image_id}: {e}")),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
