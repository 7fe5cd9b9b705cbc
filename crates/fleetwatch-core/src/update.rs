//! One update cycle, end to end: list, check staleness, plan, recycle, report.

use crate::client::RuntimeClient;
use crate::container::Container;
use crate::context::UpdateContext;
use crate::error::{FleetError, Result};
use crate::executor::{Execution, ExecutorOptions, Executor};
use crate::filter::ContainerFilter;
use crate::graph::DependencyGraph;
use crate::report::{ContainerReport, CycleWarning, FailedPhase, Outcome, SkipReason, UpdateReport};
use crate::resolver::{StalenessMap, UpdateSet};
use crate::scheduler::UpdatePlan;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateParams {
    pub filter: ContainerFilter,
    pub stop_timeout: Duration,
    pub cleanup: bool,
    /// Report what would be recycled without touching anything.
    pub monitor_only: bool,
    pub lifecycle_hooks: bool,
}

impl Default for UpdateParams {
    fn default() -> Self {
        Self {
            filter: ContainerFilter::default(),
            stop_timeout: Duration::from_secs(10),
            cleanup: false,
            monitor_only: false,
            lifecycle_hooks: false,
        }
    }
}

impl UpdateParams {
    fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            stop_timeout: self.stop_timeout,
            cleanup: self.cleanup,
            lifecycle_hooks: self.lifecycle_hooks,
        }
    }
}

/// Everything known about the fleet before anything is touched.
#[derive(Debug, Clone)]
pub struct Survey {
    /// First occurrence of every listed name, in name order.
    pub containers: BTreeMap<String, Container>,
    pub stale: StalenessMap,
    /// Outcomes already settled by the staleness pass.
    pub notes: BTreeMap<String, SkipReason>,
    pub graph: DependencyGraph,
    pub update_set: UpdateSet,
    pub plan: UpdatePlan,
    /// Updater instances renamed away by an earlier self-update. Never planned.
    pub retired: Vec<Container>,
}

/// List the fleet, check every container for a newer image and compute the
/// recycle plan. Only a listing failure is fatal.
pub async fn survey<C: RuntimeClient + ?Sized>(
    client: &C,
    params: &UpdateParams,
) -> Result<Survey> {
    let listed = client
        .list_containers(&params.filter)
        .await
        .map_err(FleetError::ListFailed)?;
    tracing::debug!(runtime = client.name(), count = listed.len(), "listed containers");

    let (retired, listed): (Vec<Container>, Vec<Container>) =
        listed.into_iter().partition(Container::is_retired_updater);
    for old in &retired {
        tracing::debug!(container = %old.name, "previous updater instance, not planned");
    }

    let graph = DependencyGraph::build(&listed);

    let mut containers = BTreeMap::new();
    for c in listed {
        containers.entry(c.name.clone()).or_insert(c);
    }

    let mut stale = StalenessMap::new();
    let mut notes = BTreeMap::new();
    for (name, container) in &containers {
        match client.is_stale(container).await {
            Ok(true) if container.is_monitor_only() => {
                tracing::info!(container = %name, image = %container.image, "newer image available (monitor only)");
                notes.insert(name.clone(), SkipReason::MonitorOnly);
                stale.insert(name.clone(), false);
            }
            Ok(is_stale) => {
                if is_stale {
                    tracing::info!(container = %name, image = %container.image, "newer image available");
                }
                stale.insert(name.clone(), is_stale);
            }
            Err(e) => {
                tracing::warn!(container = %name, error = %e, "staleness check failed, treating as current");
                notes.insert(
                    name.clone(),
                    SkipReason::StaleCheckFailed {
                        error: e.to_string(),
                    },
                );
                stale.insert(name.clone(), false);
            }
        }
    }

    for issue in graph.issues() {
        tracing::warn!(container = issue.container(), "{issue}");
    }

    let update_set = UpdateSet::resolve(&graph, &stale);
    let plan = UpdatePlan::schedule(&graph, &update_set);

    Ok(Survey {
        containers,
        stale,
        notes,
        graph,
        update_set,
        plan,
        retired,
    })
}

/// Run one cycle against the fleet behind `client`.
///
/// Fails with [`FleetError::CycleInProgress`] if `ctx` already has a cycle in
/// flight, and with [`FleetError::ListFailed`] if the fleet cannot be listed.
/// Every other failure is recorded per container in the report.
pub async fn run_cycle<C: RuntimeClient + ?Sized>(
    ctx: &UpdateContext,
    client: &C,
    params: &UpdateParams,
) -> Result<UpdateReport> {
    let guard = ctx.try_begin()?;
    tracing::info!(cycle = %guard.id, runtime = client.name(), "update cycle started");

    let survey = survey(client, params).await?;

    let execution = if params.monitor_only {
        tracing::info!(
            cycle = %guard.id,
            planned = survey.plan.stop_sequence().len(),
            "monitor only, nothing will be recycled"
        );
        monitor_only_execution(&survey.plan)
    } else {
        let mut warnings = if ctx.is_cancelled() {
            Vec::new()
        } else {
            retire_previous_updaters(client, &survey.retired, params.stop_timeout).await
        };
        let by_name: HashMap<String, Container> = survey
            .plan
            .stop_sequence()
            .iter()
            .filter_map(|n| survey.containers.get(n).map(|c| (n.clone(), c.clone())))
            .collect();
        let mut run = Executor::new(client, params.executor_options(), ctx.cancellation_token())
            .execute(&survey.plan, &by_name)
            .await;
        warnings.append(&mut run.warnings);
        run.warnings = warnings;
        run
    };

    let report = assemble(guard.id, guard.started_at, survey, execution);
    let summary = report.summary();
    tracing::info!(
        cycle = %report.cycle_id,
        scanned = summary.scanned,
        recycled = summary.recycled,
        skipped = summary.skipped,
        failed = summary.failed,
        "update cycle finished"
    );
    Ok(report)
}

/// Stop and remove the updater instances an earlier self-update left running
/// under a retired name. Failures only warn; the next cycle retries.
async fn retire_previous_updaters<C: RuntimeClient + ?Sized>(
    client: &C,
    retired: &[Container],
    grace: Duration,
) -> Vec<CycleWarning> {
    let mut warnings = Vec::new();
    for old in retired {
        tracing::info!(container = %old.name, "removing previous updater instance");
        if let Err(e) = client.stop(old, grace).await {
            tracing::warn!(container = %old.name, error = %e, "failed to remove previous updater instance");
            warnings.push(CycleWarning {
                container: Some(old.name.clone()),
                message: format!("failed to remove previous updater instance: {e}"),
            });
        }
    }
    warnings
}

fn monitor_only_execution(plan: &UpdatePlan) -> Execution {
    let mut run = Execution::default();
    for name in plan.stop_sequence() {
        run.outcomes
            .insert(name.clone(), Outcome::Skipped(SkipReason::MonitorOnly));
    }
    for excluded in plan.excluded() {
        run.outcomes.insert(
            excluded.name.clone(),
            Outcome::failed(FailedPhase::Configuration, &excluded.issue),
        );
    }
    run
}

fn assemble(
    cycle_id: uuid::Uuid,
    started_at: chrono::DateTime<Utc>,
    survey: Survey,
    mut execution: Execution,
) -> UpdateReport {
    let Survey {
        containers,
        mut notes,
        graph,
        plan,
        ..
    } = survey;

    let containers = containers
        .into_values()
        .map(|c| {
            let outcome = execution
                .outcomes
                .remove(&c.name)
                .or_else(|| notes.remove(&c.name).map(Outcome::Skipped))
                .unwrap_or(Outcome::Skipped(SkipReason::NotStale));
            ContainerReport {
                name: c.name,
                image: c.image,
                outcome,
            }
        })
        .collect();

    UpdateReport {
        cycle_id,
        started_at,
        finished_at: Utc::now(),
        containers,
        stop_sequence: plan.stop_sequence().to_vec(),
        start_sequence: plan.start_sequence().to_vec(),
        config_issues: graph.issues().to_vec(),
        warnings: execution.warnings,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{DEPENDS_ON_LABEL, SELF_LABEL};
    use crate::testing::{container, MockClient};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn labelled(name: &str, created_days_ago: i64, labels: &[(&str, &str)]) -> Container {
        let created =
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() - ChronoDuration::days(created_days_ago);
        let labels: HashMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Container::new(
            format!("{name}-id"),
            name,
            format!("fake-image-{}:latest", &name[name.len() - 2..]),
            created,
        )
        .unwrap()
        .with_labels(&labels)
    }

    fn linked_fleet() -> Vec<Container> {
        vec![
            labelled("test-container-01", 1, &[]),
            labelled(
                "test-container-02",
                0,
                &[(DEPENDS_ON_LABEL, "test-container-01")],
            ),
            labelled("test-container-03", 0, &[(DEPENDS_ON_LABEL, "")]),
        ]
    }

    async fn run(client: &MockClient) -> UpdateReport {
        run_cycle(&UpdateContext::new(), client, &UpdateParams::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn linked_containers_are_stopped_and_restarted_in_order() {
        let client = MockClient::new(linked_fleet(), &["test-container-01"]);
        let report = run(&client).await;

        assert_eq!(client.stopped(), vec!["test-container-02", "test-container-01"]);
        assert_eq!(client.started(), vec!["test-container-01", "test-container-02"]);
        assert!(!client.touched().contains("test-container-03"));
        assert_eq!(
            report.get("test-container-03").unwrap().outcome,
            Outcome::Skipped(SkipReason::NotStale)
        );
        assert_eq!(report.summary().recycled, 2);
    }

    #[tokio::test]
    async fn container_order_does_not_change_the_result() {
        let mut fleet = linked_fleet();
        fleet.rotate_left(1);
        let client = MockClient::new(fleet, &["test-container-01"]);
        let report = run(&client).await;

        assert_eq!(client.stopped(), vec!["test-container-02", "test-container-01"]);
        assert_eq!(client.started(), vec!["test-container-01", "test-container-02"]);
        assert_eq!(
            report.stop_sequence,
            vec!["test-container-02", "test-container-01"]
        );
    }

    #[tokio::test]
    async fn nested_dependencies_are_walked_by_depth() {
        let fleet = vec![
            labelled("test-container-01", 1, &[]),
            labelled(
                "test-container-02",
                0,
                &[(DEPENDS_ON_LABEL, "test-container-01")],
            ),
            labelled(
                "test-container-03",
                0,
                &[(DEPENDS_ON_LABEL, "test-container-02")],
            ),
            labelled(
                "test-container-04",
                0,
                &[(DEPENDS_ON_LABEL, "test-container-03")],
            ),
            labelled("test-container-05", 0, &[]),
        ];
        let client = MockClient::new(fleet, &["test-container-01"]);
        let report = run(&client).await;

        assert_eq!(
            client.stopped(),
            vec![
                "test-container-04",
                "test-container-03",
                "test-container-02",
                "test-container-01"
            ]
        );
        assert_eq!(
            client.started(),
            vec![
                "test-container-01",
                "test-container-02",
                "test-container-03",
                "test-container-04"
            ]
        );
        assert!(!client.touched().contains("test-container-05"));
        assert_eq!(report.start_sequence, client.started());
    }

    #[tokio::test]
    async fn stop_failure_is_reported_without_aborting_the_cycle() {
        let mut client = MockClient::new(
            vec![
                container("a", None),
                container("b", Some("a")),
                container("x", None),
            ],
            &["a", "x"],
        );
        client.fail_stop.insert("a".into());
        let report = run(&client).await;

        assert!(report.has_failures());
        assert!(matches!(
            report.get("a").unwrap().outcome,
            Outcome::Failed {
                phase: FailedPhase::Stop,
                ..
            }
        ));
        assert_eq!(
            report.get("b").unwrap().outcome,
            Outcome::Skipped(SkipReason::UpstreamFailed {
                dependency: "a".into()
            })
        );
        assert!(matches!(
            report.get("x").unwrap().outcome,
            Outcome::Recycled { .. }
        ));
    }

    #[tokio::test]
    async fn listing_failure_fails_the_cycle() {
        let client = MockClient {
            fail_list: true,
            ..Default::default()
        };
        let err = run_cycle(&UpdateContext::new(), &client, &UpdateParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::ListFailed(_)));
    }

    #[tokio::test]
    async fn overlapping_cycles_are_rejected() {
        let ctx = UpdateContext::new();
        let _held = ctx.try_begin().unwrap();
        let client = MockClient::new(vec![container("a", None)], &["a"]);
        let err = run_cycle(&ctx, &client, &UpdateParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::CycleInProgress));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn staleness_errors_are_treated_as_current() {
        let mut client = MockClient::new(
            vec![container("a", None), container("b", Some("a"))],
            &["a"],
        );
        client.stale_errors.insert("a".into());
        let report = run(&client).await;

        assert!(client.calls().is_empty());
        assert!(matches!(
            report.get("a").unwrap().outcome,
            Outcome::Skipped(SkipReason::StaleCheckFailed { .. })
        ));
        assert_eq!(
            report.get("b").unwrap().outcome,
            Outcome::Skipped(SkipReason::NotStale)
        );
    }

    #[tokio::test]
    async fn monitor_only_label_reports_without_recycling() {
        let mut a = container("a", None);
        a.settings.monitor_only = true;
        let client = MockClient::new(vec![a, container("b", Some("a"))], &["a"]);
        let report = run(&client).await;

        assert!(client.calls().is_empty());
        assert_eq!(
            report.get("a").unwrap().outcome,
            Outcome::Skipped(SkipReason::MonitorOnly)
        );
        assert!(report.stop_sequence.is_empty());
    }

    #[tokio::test]
    async fn global_monitor_only_reports_the_plan() {
        let client = MockClient::new(
            vec![container("a", None), container("b", Some("a"))],
            &["a"],
        );
        let params = UpdateParams {
            monitor_only: true,
            ..Default::default()
        };
        let report = run_cycle(&UpdateContext::new(), &client, &params)
            .await
            .unwrap();

        assert!(client.calls().is_empty());
        assert_eq!(report.stop_sequence, vec!["b", "a"]);
        assert_eq!(report.summary().skipped, 2);
        assert_eq!(
            report.get("b").unwrap().outcome,
            Outcome::Skipped(SkipReason::MonitorOnly)
        );
    }

    #[tokio::test]
    async fn filter_limits_the_cycle_to_selected_containers() {
        let client = MockClient::new(
            vec![container("a", None), container("x", None)],
            &["a", "x"],
        );
        let params = UpdateParams {
            filter: ContainerFilter {
                exclude: vec!["x".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let report = run_cycle(&UpdateContext::new(), &client, &params)
            .await
            .unwrap();

        assert_eq!(client.started(), vec!["a"]);
        assert!(report.get("x").is_none());
    }

    #[tokio::test]
    async fn cyclic_configuration_is_reported_and_rest_proceeds() {
        let client = MockClient::new(
            vec![
                container("a", Some("b")),
                container("b", Some("a")),
                container("x", None),
            ],
            &["a", "x"],
        );
        let report = run(&client).await;

        assert_eq!(client.started(), vec!["x"]);
        assert!(!report.config_issues.is_empty());
        assert!(matches!(
            report.get("a").unwrap().outcome,
            Outcome::Failed {
                phase: FailedPhase::Configuration,
                ..
            }
        ));
    }

    fn updater_fleet() -> Vec<Container> {
        vec![
            labelled("fleetwatch", 0, &[(SELF_LABEL, "true")]),
            labelled("fleetwatch-fleetwatch-0a1b2c3d", 3, &[(SELF_LABEL, "true")]),
            labelled("test-container-01", 1, &[]),
        ]
    }

    #[tokio::test]
    async fn previous_updater_instance_is_removed_and_never_planned() {
        // Reported stale too, so planning it would rename it again.
        let client = MockClient::new(
            updater_fleet(),
            &["fleetwatch-fleetwatch-0a1b2c3d", "test-container-01"],
        );
        let report = run(&client).await;

        assert_eq!(
            client.stopped(),
            vec!["fleetwatch-fleetwatch-0a1b2c3d", "test-container-01"]
        );
        assert_eq!(client.started(), vec!["test-container-01"]);
        assert!(!client
            .calls()
            .iter()
            .any(|c| matches!(c, crate::testing::Call::Rename(..))));
        assert!(report.get("fleetwatch-fleetwatch-0a1b2c3d").is_none());
        assert_eq!(report.stop_sequence, vec!["test-container-01"]);
        assert_eq!(
            report.get("fleetwatch").unwrap().outcome,
            Outcome::Skipped(SkipReason::NotStale)
        );
    }

    #[tokio::test]
    async fn failed_removal_of_previous_updater_is_a_warning() {
        let mut client = MockClient::new(updater_fleet(), &["test-container-01"]);
        client
            .fail_stop
            .insert("fleetwatch-fleetwatch-0a1b2c3d".into());
        let report = run(&client).await;

        assert_eq!(client.started(), vec!["test-container-01"]);
        assert!(!report.has_failures());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.warnings[0].container.as_deref(),
            Some("fleetwatch-fleetwatch-0a1b2c3d")
        );
    }

    #[tokio::test]
    async fn previous_updater_instance_is_left_alone_in_monitor_only_mode() {
        let client = MockClient::new(updater_fleet(), &["test-container-01"]);
        let params = UpdateParams {
            monitor_only: true,
            ..Default::default()
        };
        let report = run_cycle(&UpdateContext::new(), &client, &params)
            .await
            .unwrap();

        assert!(client.calls().is_empty());
        assert!(report.get("fleetwatch-fleetwatch-0a1b2c3d").is_none());
    }

    #[tokio::test]
    async fn cancelled_context_touches_nothing() {
        let ctx = UpdateContext::new();
        ctx.cancel();
        let client = MockClient::new(vec![container("a", None)], &["a"]);
        let report = run_cycle(&ctx, &client, &UpdateParams::default())
            .await
            .unwrap();
        assert!(client.stopped().is_empty());
        assert_eq!(
            report.get("a").unwrap().outcome,
            Outcome::Skipped(SkipReason::Cancelled)
        );
    }
}
