use super::{ContentHandler, HandlerMethod, WorkflowData};
use crate::shared::{RuntimeLog, UpdateResult};
use serde::Deserialize;
use std::time::Duration;

const SIMULATOR_PROPERTY: &str = "simulator";
pub const MAX_SIMULATED_DELAY: Duration = Duration::from_secs(5);

/// Canned outcome for one method, read from
/// `handlerProperties.simulator.<method>`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedOutcome {
    result_code: Option<i32>,
    #[serde(default)]
    extended_result_code: i32,
    #[serde(default)]
    delay_ms: u64,
}

impl SimulatedOutcome {
    fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms).min(MAX_SIMULATED_DELAY)
    }
}

/// Handler that performs no work and answers from the workflow's handler
/// properties. Methods without a configured outcome succeed, and
/// `is_installed` reports not installed.
#[derive(Debug)]
pub struct SimulatorHandler {
    log: RuntimeLog,
}

impl SimulatorHandler {
    pub fn new(log: RuntimeLog) -> Self {
        Self { log }
    }

    fn simulate(&self, data: &WorkflowData, method: HandlerMethod) -> UpdateResult {
        let outcome = data
            .property(SIMULATOR_PROPERTY)
            .and_then(|simulator| simulator.get(method.as_str()))
            .and_then(|raw| SimulatedOutcome::deserialize(raw).ok())
            .unwrap_or_default();

        let delay = outcome.delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let result = UpdateResult::new(
            outcome.result_code.unwrap_or(method.success_code()),
            outcome.extended_result_code,
        );
        self.log.debug(
            "simulator.result",
            &format!("{} {method} -> {result}", data.update_type),
        );
        result
    }
}

impl ContentHandler for SimulatorHandler {
    fn download(&self, data: &WorkflowData) -> UpdateResult {
        self.simulate(data, HandlerMethod::Download)
    }

    fn install(&self, data: &WorkflowData) -> UpdateResult {
        self.simulate(data, HandlerMethod::Install)
    }

    fn apply(&self, data: &WorkflowData) -> UpdateResult {
        self.simulate(data, HandlerMethod::Apply)
    }

    fn cancel(&self, data: &WorkflowData) -> UpdateResult {
        self.simulate(data, HandlerMethod::Cancel)
    }

    fn is_installed(&self, data: &WorkflowData) -> UpdateResult {
        self.simulate(data, HandlerMethod::IsInstalled)
    }
}
