use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{ForgeError, Result};
use crate::logging::{LogLevel, LogSink};
use crate::phases::PhaseRegistry;
use crate::plan::{ExecutionPlan, Phase, PhaseResult};

/// How the plan's phase x module cross-product is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
}

/// Walks an execution plan and collects one result per (phase, module)
/// cell. Both strategies produce the same result content; only the
/// execution order within a phase differs.
pub struct ExecutionEngine {
    registry: Arc<PhaseRegistry>,
    logger: Arc<dyn LogSink>,
    strategy: ExecutionStrategy,
}

impl ExecutionEngine {
    pub fn new(
        registry: Arc<PhaseRegistry>,
        logger: Arc<dyn LogSink>,
        strategy: ExecutionStrategy,
    ) -> Self {
        Self {
            registry,
            logger,
            strategy,
        }
    }

    pub async fn run(&self, plan: &ExecutionPlan) -> Result<Vec<PhaseResult>> {
        match self.strategy {
            ExecutionStrategy::Sequential => self.run_sequential(plan),
            ExecutionStrategy::Parallel => self.run_parallel(plan).await,
        }
    }

    /// Phases in plan order, modules in catalog order. An Environment
    /// failure is a fatal prerequisite and aborts the whole run; any
    /// other failure is recorded and execution continues.
    fn run_sequential(&self, plan: &ExecutionPlan) -> Result<Vec<PhaseResult>> {
        let mut results = Vec::with_capacity(plan.cell_count());

        for &phase in &plan.phases {
            self.log_phase_start(phase, plan.modules.len());

            for module in &plan.modules {
                let result = self
                    .registry
                    .handler(phase)
                    .handle(module, &plan.configuration);
                let fatal = phase == Phase::Environment && !result.success;
                let module_name = result.module_name.clone();
                results.push(result);

                if fatal {
                    self.logger.log(
                        LogLevel::Error,
                        &format!(
                            "Environment check failed for '{}', aborting run",
                            module_name
                        ),
                    );
                    return Err(ForgeError::EnvironmentPhase {
                        module: module_name,
                        results,
                    });
                }
            }
        }

        Ok(results)
    }

    /// One work item per module per phase, dispatched through a worker
    /// pool bounded by `parallel_jobs`. Phases stay sequential relative
    /// to each other: the next phase starts only after every worker of
    /// the current one has joined.
    async fn run_parallel(&self, plan: &ExecutionPlan) -> Result<Vec<PhaseResult>> {
        if tokio::runtime::Handle::try_current().is_err() {
            self.logger.log(
                LogLevel::Warn,
                "Parallel execution substrate unavailable, falling back to sequential",
            );
            return self.run_sequential(plan);
        }

        let jobs = plan.configuration.parallel_jobs.max(1);
        let semaphore = Arc::new(Semaphore::new(jobs));
        let mut results = Vec::with_capacity(plan.cell_count());

        for &phase in &plan.phases {
            self.log_phase_start(phase, plan.modules.len());

            let mut workers = JoinSet::new();
            let mut worker_modules = HashMap::new();

            for module in plan.modules.iter().cloned() {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("worker semaphore is never closed");
                let registry = self.registry.clone();
                let config = plan.configuration.clone();
                let name = module.name.clone();

                let handle = workers.spawn_blocking(move || {
                    let _permit = permit;
                    registry.handler(phase).handle(&module, &config)
                });
                worker_modules.insert(handle.id(), name);
            }

            let mut phase_results = Vec::with_capacity(plan.modules.len());
            while let Some(joined) = workers.join_next_with_id().await {
                match joined {
                    Ok((_id, result)) => phase_results.push(result),
                    Err(join_error) => {
                        // A crashed worker never takes the pool down; it
                        // becomes a failed result for its module.
                        let module = worker_modules
                            .get(&join_error.id())
                            .cloned()
                            .unwrap_or_else(|| "<unknown>".to_string());
                        phase_results.push(PhaseResult::failure(
                            &module,
                            phase,
                            &format!("Worker crashed: {}", join_error),
                        ));
                    }
                }
            }

            // Catalog order for stable output; execution order is free.
            let order: HashMap<&str, usize> = plan
                .modules
                .iter()
                .enumerate()
                .map(|(i, m)| (m.name.as_str(), i))
                .collect();
            phase_results
                .sort_by_key(|r| order.get(r.module_name.as_str()).copied().unwrap_or(usize::MAX));

            // Phase barrier: Environment failures stay fatal here too.
            let env_failure = (phase == Phase::Environment)
                .then(|| phase_results.iter().find(|r| !r.success))
                .flatten()
                .map(|r| r.module_name.clone());

            results.extend(phase_results);

            if let Some(module) = env_failure {
                self.logger.log(
                    LogLevel::Error,
                    &format!("Environment check failed for '{}', aborting run", module),
                );
                return Err(ForgeError::EnvironmentPhase { module, results });
            }
        }

        Ok(results)
    }

    fn log_phase_start(&self, phase: Phase, modules: usize) {
        self.logger.log(
            LogLevel::Info,
            &format!("Phase {} across {} modules", phase, modules),
        );
    }
}
