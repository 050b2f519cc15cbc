use serde::{Deserialize, Serialize};

/// Result codes returned by content handlers and the executor boundary.
///
/// Positive values are successes, zero and negative values are failures.
pub mod codes {
    pub const FAILURE: i32 = 0;
    pub const FAILURE_CANCELLED: i32 = -1;
    /// The handler for an update type could not be resolved or created.
    pub const HANDLER_LOAD_FAILURE: i32 = -2;

    pub const SUCCESS: i32 = 1;
    pub const IDLE_SUCCESS: i32 = 200;
    pub const DEPLOYMENT_IN_PROGRESS_SUCCESS: i32 = 400;

    pub const DOWNLOAD_SUCCESS: i32 = 500;
    pub const DOWNLOAD_SKIPPED_UPDATE_ALREADY_INSTALLED: i32 = 503;

    pub const INSTALL_SUCCESS: i32 = 600;
    pub const INSTALL_SKIPPED_UPDATE_ALREADY_INSTALLED: i32 = 603;
    pub const INSTALL_REQUIRED_IMMEDIATE_REBOOT: i32 = 605;
    pub const INSTALL_REQUIRED_REBOOT: i32 = 606;

    pub const APPLY_SUCCESS: i32 = 700;
    pub const APPLY_REQUIRED_IMMEDIATE_REBOOT: i32 = 705;
    pub const APPLY_REQUIRED_REBOOT: i32 = 706;

    pub const CANCEL_SUCCESS: i32 = 800;
    pub const CANCEL_UNABLE_TO_CANCEL: i32 = 801;

    pub const IS_INSTALLED_INSTALLED: i32 = 900;
    pub const IS_INSTALLED_NOT_INSTALLED: i32 = 901;

    pub const ROLLBACK_SUCCESS: i32 = 1100;
    pub const REBOOT_SUCCESS: i32 = 1200;
}

/// Extended result codes: `facility << 20 | value`.
pub mod erc {
    pub const FACILITY_HANDLER: i32 = 0x8;
    pub const FACILITY_EXECUTOR: i32 = 0x9;
    pub const FACILITY_WORKFLOW: i32 = 0xA;

    pub const fn make(facility: i32, value: i32) -> i32 {
        (facility << 20) | (value & 0xF_FFFF)
    }

    pub const HANDLER_UNKNOWN_UPDATE_TYPE: i32 = make(FACILITY_HANDLER, 0x001);
    pub const HANDLER_CONTRACT_UNSUPPORTED: i32 = make(FACILITY_HANDLER, 0x002);
    pub const HANDLER_CREATE_FAILURE: i32 = make(FACILITY_HANDLER, 0x003);
    pub const HANDLER_CACHE_UNAVAILABLE: i32 = make(FACILITY_HANDLER, 0x004);
    pub const HANDLER_UNHANDLED_FAULT: i32 = make(FACILITY_HANDLER, 0x010);
    pub const HANDLER_TARGET_DATA_WRITE_FAILURE: i32 = make(FACILITY_HANDLER, 0x011);
    pub const HANDLER_INSTALLED_CRITERIA_PERSIST_FAILURE: i32 = make(FACILITY_HANDLER, 0x012);
    pub const MULTI_STEP_DISPATCHER_UNAVAILABLE: i32 = make(FACILITY_HANDLER, 0x020);

    pub const EXECUTOR_REJECTED_UPDATE_TYPE: i32 = make(FACILITY_EXECUTOR, 0x001);
    pub const EXECUTOR_REJECTED_UPDATE_ACTION: i32 = make(FACILITY_EXECUTOR, 0x002);
    pub const EXECUTOR_REJECTED_ARGUMENT: i32 = make(FACILITY_EXECUTOR, 0x003);
    pub const EXECUTOR_SPAWN_FAILURE: i32 = make(FACILITY_EXECUTOR, 0x010);
    pub const EXECUTOR_WAIT_FAILURE: i32 = make(FACILITY_EXECUTOR, 0x011);
    pub const EXECUTOR_TARGET_DATA_FAILURE: i32 = make(FACILITY_EXECUTOR, 0x012);
    const EXECUTOR_EXIT_BASE: i32 = 0x1000;
    const EXECUTOR_SIGNAL_BASE: i32 = 0x2000;

    pub const WORKFLOW_UNSUPPORTED_STEP: i32 = make(FACILITY_WORKFLOW, 0x001);
    pub const WORKFLOW_WORK_FOLDER_FAILURE: i32 = make(FACILITY_WORKFLOW, 0x002);
    pub const WORKFLOW_MISSING_UPDATE_TYPE: i32 = make(FACILITY_WORKFLOW, 0x003);
    pub const WORKFLOW_INVALID_PAYLOAD: i32 = make(FACILITY_WORKFLOW, 0x004);
    pub const WORKFLOW_ENQUEUE_FAILURE: i32 = make(FACILITY_WORKFLOW, 0x005);
    pub const WORKFLOW_REPLACED: i32 = make(FACILITY_WORKFLOW, 0x006);

    /// Folds a nonzero child exit status into an extended code.
    pub const fn executor_exit(exit_code: i32) -> i32 {
        make(FACILITY_EXECUTOR, EXECUTOR_EXIT_BASE | (exit_code & 0xFFF))
    }

    pub const fn executor_signal(signal: i32) -> i32 {
        make(FACILITY_EXECUTOR, EXECUTOR_SIGNAL_BASE | (signal & 0xFFF))
    }

    pub const fn facility(extended_result_code: i32) -> i32 {
        extended_result_code >> 20
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub result_code: i32,
    #[serde(default)]
    pub extended_result_code: i32,
}

impl UpdateResult {
    pub const fn new(result_code: i32, extended_result_code: i32) -> Self {
        Self {
            result_code,
            extended_result_code,
        }
    }

    pub const fn success(result_code: i32) -> Self {
        Self::new(result_code, 0)
    }

    pub const fn failure(extended_result_code: i32) -> Self {
        Self::new(codes::FAILURE, extended_result_code)
    }

    pub const fn load_failure(extended_result_code: i32) -> Self {
        Self::new(codes::HANDLER_LOAD_FAILURE, extended_result_code)
    }

    pub fn is_success(&self) -> bool {
        self.result_code > 0
    }

    pub fn is_load_failure(&self) -> bool {
        self.result_code == codes::HANDLER_LOAD_FAILURE
    }

    pub fn requires_reboot(&self) -> bool {
        matches!(
            self.result_code,
            codes::INSTALL_REQUIRED_IMMEDIATE_REBOOT
                | codes::INSTALL_REQUIRED_REBOOT
                | codes::APPLY_REQUIRED_IMMEDIATE_REBOOT
                | codes::APPLY_REQUIRED_REBOOT
        )
    }
}

impl Default for UpdateResult {
    fn default() -> Self {
        Self::success(codes::IDLE_SUCCESS)
    }
}

impl std::fmt::Display for UpdateResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (0x{:08X})",
            self.result_code, self.extended_result_code
        )
    }
}
