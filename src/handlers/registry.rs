use super::{
    ContentHandler, ContractInfo, HandlerDispatcher, HandlerKind, MultiStepHandler,
    ShellTaskHandler, SimulatorHandler,
};
use crate::executor::{AllowedUpdateType, ExecutorRunner};
use crate::shared::{LogLevel, RuntimeLog};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

/// What an extension receives when asked for a handler instance.
#[derive(Debug, Clone)]
pub struct HandlerEnv {
    pub update_type: String,
    pub log_level: LogLevel,
    pub log: RuntimeLog,
    pub executor: Arc<ExecutorRunner>,
    pub data_folder: PathBuf,
    pub dispatcher: Weak<HandlerDispatcher>,
}

/// Load contract of a content handler extension.
pub trait HandlerExtension: Send + Sync {
    fn contract_info(&self) -> ContractInfo;
    fn create_handler(&self, env: &HandlerEnv) -> Result<Arc<dyn ContentHandler>, String>;
}

/// Extension for the handler kinds compiled into the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinExtension {
    kind: HandlerKind,
}

impl BuiltinExtension {
    pub fn new(kind: HandlerKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }
}

impl HandlerExtension for BuiltinExtension {
    fn contract_info(&self) -> ContractInfo {
        ContractInfo::CURRENT
    }

    fn create_handler(&self, env: &HandlerEnv) -> Result<Arc<dyn ContentHandler>, String> {
        let executor_type = match self.kind {
            HandlerKind::MultiStep => {
                return Ok(Arc::new(MultiStepHandler::new(
                    env.dispatcher.clone(),
                    env.log.clone(),
                )))
            }
            HandlerKind::Simulator => return Ok(Arc::new(SimulatorHandler::new(env.log.clone()))),
            HandlerKind::Apt => AllowedUpdateType::MicrosoftApt,
            HandlerKind::Swupdate => AllowedUpdateType::MicrosoftSwupdate,
            HandlerKind::Script => AllowedUpdateType::MicrosoftScript,
        };
        Ok(Arc::new(ShellTaskHandler::new(
            executor_type,
            Arc::clone(&env.executor),
            env.log.clone(),
            env.data_folder.clone(),
        )))
    }
}

/// Update type → extension map, fixed before the dispatcher is built.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    extensions: BTreeMap<String, Arc<dyn HandlerExtension>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("update_types", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_kinds<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a HandlerKind)>,
    {
        let mut registry = Self::new();
        for (update_type, kind) in entries {
            registry.register_kind(update_type, *kind);
        }
        registry
    }

    pub fn register(&mut self, update_type: &str, extension: Arc<dyn HandlerExtension>) {
        self.extensions.insert(update_type.to_string(), extension);
    }

    pub fn register_kind(&mut self, update_type: &str, kind: HandlerKind) {
        self.register(update_type, Arc::new(BuiltinExtension::new(kind)));
    }

    pub fn extension(&self, update_type: &str) -> Option<Arc<dyn HandlerExtension>> {
        self.extensions.get(update_type).cloned()
    }

    pub fn contains(&self, update_type: &str) -> bool {
        self.extensions.contains_key(update_type)
    }

    pub fn update_types(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}
