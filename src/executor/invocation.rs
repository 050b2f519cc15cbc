use super::ExecutorError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const FLAG_UPDATE_TYPE: &str = "--update-type";
pub const FLAG_UPDATE_ACTION: &str = "--update-action";
pub const FLAG_TARGET_DATA: &str = "--target-data";
pub const FLAG_TARGET_OPTIONS: &str = "--target-options";
pub const FLAG_TARGET_LOG_FOLDER: &str = "--target-log-folder";

/// Update types the privileged executor accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllowedUpdateType {
    MicrosoftApt,
    MicrosoftSwupdate,
    MicrosoftScript,
    Common,
}

impl AllowedUpdateType {
    pub const ALL: [AllowedUpdateType; 4] = [
        Self::MicrosoftApt,
        Self::MicrosoftSwupdate,
        Self::MicrosoftScript,
        Self::Common,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MicrosoftApt => "microsoft/apt",
            Self::MicrosoftSwupdate => "microsoft/swupdate",
            Self::MicrosoftScript => "microsoft/script",
            Self::Common => "common",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ExecutorError> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == raw)
            .ok_or_else(|| ExecutorError::UpdateTypeNotAllowed {
                update_type: raw.to_string(),
            })
    }

    /// Maps a handler update type (`microsoft/apt:1`) to its executor type by
    /// dropping the version suffix.
    pub fn from_handler_type(update_type: &str) -> Result<Self, ExecutorError> {
        let name = update_type
            .split_once(':')
            .map(|(name, _version)| name)
            .unwrap_or(update_type);
        Self::parse(name)
    }
}

impl std::fmt::Display for AllowedUpdateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorAction {
    Initialize,
    Download,
    Install,
    Apply,
    Cancel,
    Rollback,
    Reboot,
    Execute,
}

impl ExecutorAction {
    pub const ALL: [ExecutorAction; 8] = [
        Self::Initialize,
        Self::Download,
        Self::Install,
        Self::Apply,
        Self::Cancel,
        Self::Rollback,
        Self::Reboot,
        Self::Execute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Download => "download",
            Self::Install => "install",
            Self::Apply => "apply",
            Self::Cancel => "cancel",
            Self::Rollback => "rollback",
            Self::Reboot => "reboot",
            Self::Execute => "execute",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ExecutorError> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == raw)
            .ok_or_else(|| ExecutorError::UpdateActionNotAllowed {
                update_action: raw.to_string(),
            })
    }
}

impl std::fmt::Display for ExecutorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated executor command line. Fields are private so an invocation
/// can only exist after its type, action and arguments passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorInvocation {
    update_type: AllowedUpdateType,
    update_action: ExecutorAction,
    target_data: PathBuf,
    target_options: Option<String>,
    target_log_folder: Option<PathBuf>,
}

impl ExecutorInvocation {
    pub fn new(
        update_type: AllowedUpdateType,
        update_action: ExecutorAction,
        target_data: &Path,
    ) -> Result<Self, ExecutorError> {
        validate_path_argument(FLAG_TARGET_DATA, target_data)?;
        Ok(Self {
            update_type,
            update_action,
            target_data: target_data.to_path_buf(),
            target_options: None,
            target_log_folder: None,
        })
    }

    /// Validates raw strings against the allow-lists.
    pub fn parse(
        update_type: &str,
        update_action: &str,
        target_data: &Path,
    ) -> Result<Self, ExecutorError> {
        Self::new(
            AllowedUpdateType::parse(update_type)?,
            ExecutorAction::parse(update_action)?,
            target_data,
        )
    }

    pub fn with_target_options(mut self, options: &str) -> Result<Self, ExecutorError> {
        validate_text_argument(FLAG_TARGET_OPTIONS, options)?;
        self.target_options = Some(options.to_string());
        Ok(self)
    }

    pub fn with_target_log_folder(mut self, folder: &Path) -> Result<Self, ExecutorError> {
        validate_path_argument(FLAG_TARGET_LOG_FOLDER, folder)?;
        self.target_log_folder = Some(folder.to_path_buf());
        Ok(self)
    }

    pub fn update_type(&self) -> AllowedUpdateType {
        self.update_type
    }

    pub fn update_action(&self) -> ExecutorAction {
        self.update_action
    }

    pub fn target_data(&self) -> &Path {
        &self.target_data
    }

    pub fn target_options(&self) -> Option<&str> {
        self.target_options.as_deref()
    }

    pub fn target_log_folder(&self) -> Option<&Path> {
        self.target_log_folder.as_deref()
    }

    pub fn to_args(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(FLAG_UPDATE_TYPE),
            OsString::from(self.update_type.as_str()),
            OsString::from(FLAG_UPDATE_ACTION),
            OsString::from(self.update_action.as_str()),
            OsString::from(FLAG_TARGET_DATA),
            self.target_data.clone().into_os_string(),
        ];
        if let Some(options) = &self.target_options {
            args.push(OsString::from(FLAG_TARGET_OPTIONS));
            args.push(OsString::from(options));
        }
        if let Some(folder) = &self.target_log_folder {
            args.push(OsString::from(FLAG_TARGET_LOG_FOLDER));
            args.push(folder.clone().into_os_string());
        }
        args
    }

    pub fn command_form(&self) -> String {
        self.to_args()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parses the executor side of the grammar. Every flag takes exactly one
    /// value; repeated or unknown flags are rejected.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, ExecutorError> {
        let mut update_type = None;
        let mut update_action = None;
        let mut target_data = None;
        let mut target_options = None;
        let mut target_log_folder = None;

        let mut iter = args.iter().map(AsRef::as_ref);
        while let Some(flag) = iter.next() {
            let slot = match flag {
                FLAG_UPDATE_TYPE => &mut update_type,
                FLAG_UPDATE_ACTION => &mut update_action,
                FLAG_TARGET_DATA => &mut target_data,
                FLAG_TARGET_OPTIONS => &mut target_options,
                FLAG_TARGET_LOG_FOLDER => &mut target_log_folder,
                other => {
                    return Err(ExecutorError::InvalidArgument {
                        flag: other.to_string(),
                        reason: "unknown flag".to_string(),
                    })
                }
            };
            let value = iter.next().ok_or_else(|| ExecutorError::InvalidArgument {
                flag: flag.to_string(),
                reason: "missing value".to_string(),
            })?;
            if slot.replace(value.to_string()).is_some() {
                return Err(ExecutorError::InvalidArgument {
                    flag: flag.to_string(),
                    reason: "flag given more than once".to_string(),
                });
            }
        }

        let required = |flag: &str, value: Option<String>| {
            value.ok_or_else(|| ExecutorError::InvalidArgument {
                flag: flag.to_string(),
                reason: "required flag missing".to_string(),
            })
        };
        let mut invocation = Self::parse(
            &required(FLAG_UPDATE_TYPE, update_type)?,
            &required(FLAG_UPDATE_ACTION, update_action)?,
            Path::new(&required(FLAG_TARGET_DATA, target_data)?),
        )?;
        if let Some(options) = target_options {
            invocation = invocation.with_target_options(&options)?;
        }
        if let Some(folder) = target_log_folder {
            invocation = invocation.with_target_log_folder(Path::new(&folder))?;
        }
        Ok(invocation)
    }
}

fn validate_text_argument(flag: &str, value: &str) -> Result<(), ExecutorError> {
    let reason = if value.is_empty() {
        Some("must be non-empty")
    } else if value.starts_with('-') {
        Some("must not start with '-'")
    } else if value.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ExecutorError::InvalidArgument {
            flag: flag.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn validate_path_argument(flag: &str, path: &Path) -> Result<(), ExecutorError> {
    let Some(raw) = path.to_str() else {
        return Err(ExecutorError::InvalidArgument {
            flag: flag.to_string(),
            reason: "must be valid UTF-8".to_string(),
        });
    };
    validate_text_argument(flag, raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_type_version_suffix_is_stripped() {
        assert_eq!(
            AllowedUpdateType::from_handler_type("microsoft/apt:1").expect("apt"),
            AllowedUpdateType::MicrosoftApt
        );
        assert!(AllowedUpdateType::from_handler_type("microsoft/steps:1").is_err());
    }

    #[test]
    fn target_options_reject_flag_injection() {
        let invocation = ExecutorInvocation::new(
            AllowedUpdateType::Common,
            ExecutorAction::Reboot,
            Path::new("/tmp/wf/reboot.json"),
        )
        .expect("invocation");
        assert!(invocation.clone().with_target_options("--update-type").is_err());
        assert!(invocation.clone().with_target_options("a\nb").is_err());
        assert!(invocation.with_target_options("quiet").is_ok());
    }
}
