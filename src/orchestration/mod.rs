pub mod decision;
pub mod error;
pub mod notification;
pub mod record;
pub mod reporting;
pub mod state_machine;
pub mod states;
pub mod step_table;

pub use decision::{
    get_workflow_step, is_duplicate_request, is_retry_applicable, is_workflow_complete,
    should_not_report_to_cloud,
};
pub use error::WorkflowError;
pub use notification::{Continuation, StepSpec, UpdateNotification, MAX_STEP_DEPTH};
pub use record::{ChildRecord, CompletedWorkflow, WorkflowRecord};
pub use reporting::{ReportSink, ReportingProcessor, StateReport};
pub use state_machine::{ProcessOutcome, StateMachineParts, WorkflowStateMachine};
pub use states::{UpdateAction, UpdateState, WorkflowStep};
pub use step_table::{DeploymentStep, StepEntry, StepTable, StepTables};
