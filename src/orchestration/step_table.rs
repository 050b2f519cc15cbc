use super::{UpdateState, WorkflowStep};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEntry {
    pub step: WorkflowStep,
    pub started: UpdateState,
    pub on_success: UpdateState,
    pub next: Option<WorkflowStep>,
}

/// Handler-backed step a deployment chain may contain, as named in settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStep {
    Download,
    Install,
    Apply,
}

impl From<DeploymentStep> for WorkflowStep {
    fn from(step: DeploymentStep) -> Self {
        match step {
            DeploymentStep::Download => WorkflowStep::Download,
            DeploymentStep::Install => WorkflowStep::Install,
            DeploymentStep::Apply => WorkflowStep::Apply,
        }
    }
}

/// Per-step states and auto-transitions. Any failing step moves to
/// [`UpdateState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTable {
    entries: Vec<StepEntry>,
}

impl Default for StepTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn entry(
    step: WorkflowStep,
    started: UpdateState,
    on_success: UpdateState,
    next: Option<WorkflowStep>,
) -> StepEntry {
    StepEntry {
        step,
        started,
        on_success,
        next,
    }
}

fn is_deployment_step(step: WorkflowStep) -> bool {
    matches!(
        step,
        WorkflowStep::Download | WorkflowStep::Install | WorkflowStep::Apply
    )
}

impl StepTable {
    /// Download, Install, Apply.
    pub fn standard() -> Self {
        Self::chain(&[
            DeploymentStep::Download,
            DeploymentStep::Install,
            DeploymentStep::Apply,
        ])
    }

    /// Table whose deployment runs `steps` in order. The chain must start
    /// with download, and every step may appear once, in download, install,
    /// apply order.
    pub fn deployment(steps: &[DeploymentStep]) -> Result<Self, String> {
        if steps.first() != Some(&DeploymentStep::Download) {
            return Err("deployment steps must start with `download`".to_string());
        }
        if steps.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(
                "deployment steps must be unique and ordered download, install, apply"
                    .to_string(),
            );
        }
        Ok(Self::chain(steps))
    }

    fn chain(steps: &[DeploymentStep]) -> Self {
        let mut entries: Vec<StepEntry> = steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let step = WorkflowStep::from(*step);
                let (started, on_success) = match step {
                    WorkflowStep::Download => {
                        (UpdateState::DownloadStarted, UpdateState::DownloadSucceeded)
                    }
                    WorkflowStep::Install => {
                        (UpdateState::InstallStarted, UpdateState::InstallSucceeded)
                    }
                    _ => (UpdateState::ApplyStarted, UpdateState::ApplySucceeded),
                };
                let next = steps.get(index + 1).copied().map(WorkflowStep::from);
                entry(step, started, on_success, next)
            })
            .collect();
        entries.push(entry(
            WorkflowStep::Rollback,
            UpdateState::RollbackStarted,
            UpdateState::Succeeded,
            None,
        ));
        entries.push(entry(
            WorkflowStep::Reboot,
            UpdateState::RebootStarted,
            UpdateState::Succeeded,
            None,
        ));
        Self { entries }
    }

    pub fn from_entries(entries: Vec<StepEntry>) -> Self {
        Self { entries }
    }

    pub fn entry(&self, step: WorkflowStep) -> Option<&StepEntry> {
        self.entries.iter().find(|entry| entry.step == step)
    }

    /// The step that follows a successful `step`. A pending reboot turns the
    /// end of the deployment chain into a Reboot step.
    pub fn next_step(&self, step: WorkflowStep, reboot_pending: bool) -> Option<WorkflowStep> {
        let entry = self.entry(step)?;
        match entry.next {
            Some(next) => Some(next),
            None if reboot_pending && is_deployment_step(step) => Some(WorkflowStep::Reboot),
            None => None,
        }
    }
}

/// Step tables keyed by update type; types without their own table use the
/// standard one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepTables {
    default: StepTable,
    by_update_type: BTreeMap<String, StepTable>,
}

impl StepTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, update_type: &str, table: StepTable) -> Self {
        self.by_update_type.insert(update_type.to_string(), table);
        self
    }

    pub fn for_update_type(&self, update_type: Option<&str>) -> &StepTable {
        update_type
            .and_then(|update_type| self.by_update_type.get(update_type))
            .unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_chain_ends_after_apply_unless_reboot_pending() {
        let table = StepTable::standard();
        assert_eq!(
            table.next_step(WorkflowStep::Download, false),
            Some(WorkflowStep::Install)
        );
        assert_eq!(
            table.next_step(WorkflowStep::Install, false),
            Some(WorkflowStep::Apply)
        );
        assert_eq!(table.next_step(WorkflowStep::Apply, false), None);
        assert_eq!(
            table.next_step(WorkflowStep::Apply, true),
            Some(WorkflowStep::Reboot)
        );
        assert_eq!(table.next_step(WorkflowStep::Reboot, true), None);
        assert!(table.entry(WorkflowStep::Execute).is_none());
    }

    #[test]
    fn custom_chain_ends_at_its_last_step() {
        let table =
            StepTable::deployment(&[DeploymentStep::Download, DeploymentStep::Install])
                .expect("table");
        assert_eq!(
            table.next_step(WorkflowStep::Download, false),
            Some(WorkflowStep::Install)
        );
        assert_eq!(table.next_step(WorkflowStep::Install, false), None);
        assert_eq!(
            table.next_step(WorkflowStep::Install, true),
            Some(WorkflowStep::Reboot)
        );
        assert!(table.entry(WorkflowStep::Apply).is_none());
        assert!(table.entry(WorkflowStep::Rollback).is_some());
    }

    #[test]
    fn deployment_chain_is_validated() {
        assert!(StepTable::deployment(&[]).is_err());
        assert!(StepTable::deployment(&[DeploymentStep::Install]).is_err());
        assert!(StepTable::deployment(&[
            DeploymentStep::Download,
            DeploymentStep::Apply,
            DeploymentStep::Install
        ])
        .is_err());
        assert!(StepTable::deployment(&[DeploymentStep::Download, DeploymentStep::Download]).is_err());
        assert_eq!(
            StepTable::deployment(&[
                DeploymentStep::Download,
                DeploymentStep::Install,
                DeploymentStep::Apply
            ]),
            Ok(StepTable::standard())
        );
    }

    #[test]
    fn lookup_falls_back_to_standard_table() {
        let short = StepTable::deployment(&[DeploymentStep::Download]).expect("table");
        let tables = StepTables::new().with_table("vendor/blob:1", short.clone());
        assert_eq!(tables.for_update_type(Some("vendor/blob:1")), &short);
        assert_eq!(tables.for_update_type(Some("microsoft/apt:1")), &StepTable::standard());
        assert_eq!(tables.for_update_type(None), &StepTable::standard());
    }
}
