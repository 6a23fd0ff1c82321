//! Scenario runner
//!
//! Drives one scenario through base readiness, install, helper readiness,
//! check and evaluation, stopping at the first failing step. The whole
//! sequence is bounded by the scenario timeout.

use chrono::Utc;
use log::error;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use uuid::Uuid;

use crate::aggregate::{FailurePolicy, ResultParser, SubstringParser};
use crate::check::CheckInvocation;
use crate::error::{HarnessError, Result};
use crate::installer::{self, InstallOptions, InstallSpec};
use crate::logging::HarnessLogger;
use crate::models::{
    CapturedLog, CheckResult, Escalation, FailureCategory, PackagingFamily, ScenarioOutcome,
    Verdict,
};
use crate::readiness::{Backoff, Prober, ReadinessCondition};
use crate::target::{Backend, ShellTransport, Target, Transport};

/// Fully resolved scenario, ready to run
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioPlan {
    pub name: String,
    pub family: PackagingFamily,
    pub arch: String,
    pub backend: Backend,
    pub escalation: Escalation,
    /// Unit awaited before anything else, `None` to skip
    pub base_unit: Option<String>,
    pub base_timeout: Duration,
    pub install: InstallSpec,
    pub readiness: ReadinessCondition,
    pub backoff: Backoff,
    pub check: CheckInvocation,
    pub policy: FailurePolicy,
    pub scenario_timeout: Duration,
    pub command_timeout: Duration,
    pub retry_backoff: Duration,
}

impl ScenarioPlan {
    pub fn transport(&self) -> ShellTransport {
        ShellTransport::new(self.backend.clone())
    }
}

/// What the steps produced before they stopped
#[derive(Debug, Default)]
struct Journal {
    logs: Vec<CapturedLog>,
    check: Option<CheckResult>,
}

pub struct ScenarioRunner<T> {
    plan: ScenarioPlan,
    target: Target<T>,
    parser: Box<dyn ResultParser>,
}

impl<T: Transport> ScenarioRunner<T> {
    pub fn new(plan: ScenarioPlan, transport: T) -> Self {
        let target = Target::new(plan.family, plan.arch.clone(), transport, plan.command_timeout);
        Self {
            plan,
            target,
            parser: Box::new(SubstringParser::default()),
        }
    }

    pub fn with_parser(mut self, parser: impl ResultParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn target(&self) -> &Target<T> {
        &self.target
    }

    /// Run the scenario to a verdict. Failures are part of the outcome, never
    /// an error of this call.
    pub async fn run(&self) -> ScenarioOutcome {
        let plan = &self.plan;
        let run_id = Uuid::new_v4().to_string();
        let logger = HarnessLogger::new(plan.name.as_str(), run_id.as_str());
        logger.scenario_started(plan.family, &self.target.transport().describe());

        let started_at = Utc::now();
        let start = Instant::now();
        let mut journal = Journal::default();

        let result = match tokio::time::timeout(
            plan.scenario_timeout,
            self.steps(&run_id, &logger, &mut journal),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(HarnessError::ScenarioTimeout(plan.scenario_timeout)),
        };

        let verdict = match result {
            Ok(()) => Verdict::Pass,
            Err(e) => {
                let category = e.category();
                let reported_by_check = matches!(
                    category,
                    FailureCategory::HelperConnectivityDefect
                        | FailureCategory::CheckAssertionFailed
                ) && journal.check.is_some();
                if !reported_by_check {
                    journal.logs.extend(e.diagnostics());
                }
                Verdict::Fail {
                    category,
                    message: e.to_string(),
                }
            }
        };

        let outcome = ScenarioOutcome::new(
            plan.name.clone(),
            run_id,
            plan.family,
            verdict,
            journal.check,
            journal.logs,
            started_at,
            start.elapsed().as_millis() as u64,
        );
        logger.scenario_finished(&outcome);
        outcome
    }

    async fn steps(
        &self,
        run_id: &str,
        logger: &HarnessLogger,
        journal: &mut Journal,
    ) -> Result<()> {
        let plan = &self.plan;

        if let Some(unit) = &plan.base_unit {
            logger.step_started("base readiness");
            self.target.wait_for_unit(unit, plan.base_timeout).await?;
        }

        logger.step_started("install");
        let options = InstallOptions {
            run_id: run_id.to_string(),
            retry_backoff: plan.retry_backoff,
        };
        let report = installer::install(
            &self.target,
            &plan.install,
            &plan.escalation,
            &options,
            logger,
        )
        .await?;
        journal.logs.push(CapturedLog::new("install log", report.log));

        logger.step_started("readiness");
        Prober::new(plan.backoff)
            .wait(&self.target, &plan.readiness, &plan.escalation, Some(logger))
            .await?;

        logger.step_started("check");
        let output = plan.check.invoke(&self.target, &plan.escalation).await?;
        let result = self.parser.parse(&output);
        journal.check = Some(result.clone());

        plan.policy.evaluate(&result)
    }
}

/// Outcomes of [`run_until`]
#[derive(Debug)]
pub struct RunOutcomes {
    /// Finished scenarios in plan order
    pub outcomes: Vec<ScenarioOutcome>,
    /// Set when the stop signal fired before every scenario finished
    pub interrupted: bool,
}

/// Run `plans` and return outcomes in plan order. Parallel unless
/// `sequential`, one task per scenario.
pub async fn run_all<T, F>(
    plans: Vec<ScenarioPlan>,
    sequential: bool,
    transport_for: F,
) -> Vec<ScenarioOutcome>
where
    T: Transport + 'static,
    F: Fn(&ScenarioPlan) -> T,
{
    run_until(plans, sequential, transport_for, std::future::pending::<()>())
        .await
        .outcomes
}

/// Like [`run_all`], but stops when `stop` completes. Scenarios still
/// running are cancelled and left out of the outcomes.
pub async fn run_until<T, F, S>(
    plans: Vec<ScenarioPlan>,
    sequential: bool,
    transport_for: F,
    stop: S,
) -> RunOutcomes
where
    T: Transport + 'static,
    F: Fn(&ScenarioPlan) -> T,
    S: Future<Output = ()>,
{
    tokio::pin!(stop);

    if sequential {
        let mut outcomes = Vec::with_capacity(plans.len());
        for plan in plans {
            let transport = transport_for(&plan);
            let runner = ScenarioRunner::new(plan, transport);
            tokio::select! {
                outcome = runner.run() => outcomes.push(outcome),
                _ = &mut stop => {
                    return RunOutcomes { outcomes, interrupted: true };
                }
            }
        }
        return RunOutcomes {
            outcomes,
            interrupted: false,
        };
    }

    let names: Vec<(String, PackagingFamily)> =
        plans.iter().map(|p| (p.name.clone(), p.family)).collect();
    let mut slots: Vec<Option<ScenarioOutcome>> = vec![None; plans.len()];
    let mut tasks = JoinSet::new();

    for (index, plan) in plans.into_iter().enumerate() {
        let transport = transport_for(&plan);
        let runner = ScenarioRunner::new(plan, transport);
        tasks.spawn(async move { (index, runner.run().await) });
    }

    let mut interrupted = false;
    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                Some(Ok((index, outcome))) => slots[index] = Some(outcome),
                Some(Err(e)) => error!("Scenario task failed: {}", e),
                None => break,
            },
            _ = &mut stop => {
                interrupted = true;
                break;
            }
        }
    }

    if interrupted {
        // Wait for cancelled tasks so their child processes are killed
        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((index, outcome)) = joined {
                slots[index] = Some(outcome);
            }
        }
        return RunOutcomes {
            outcomes: slots.into_iter().flatten().collect(),
            interrupted,
        };
    }

    let outcomes = slots
        .into_iter()
        .zip(names)
        .map(|(slot, (name, family))| {
            slot.unwrap_or_else(|| {
                ScenarioOutcome::new(
                    name,
                    Uuid::new_v4().to_string(),
                    family,
                    Verdict::Fail {
                        category: FailureCategory::Environment,
                        message: "scenario task aborted".to_string(),
                    },
                    None,
                    Vec::new(),
                    Utc::now(),
                    0,
                )
            })
        })
        .collect();
    RunOutcomes {
        outcomes,
        interrupted,
    }
}
