use super::{ContentHandler, HandlerEnv, HandlerError, HandlerMethod, HandlerRegistry, WorkflowData};
use crate::executor::ExecutorRunner;
use crate::runtime::worker::panic_message;
use crate::shared::{erc, RuntimeLog, UpdateResult};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

/// Resolves update types to cached handler instances and invokes them.
///
/// Handler faults stay inside [`HandlerDispatcher::dispatch`]: a panic becomes
/// a failure result and the calling worker keeps running.
pub struct HandlerDispatcher {
    registry: HandlerRegistry,
    log: RuntimeLog,
    executor: Arc<ExecutorRunner>,
    data_folder: PathBuf,
    cache: Mutex<HashMap<String, Arc<dyn ContentHandler>>>,
    this: Weak<HandlerDispatcher>,
}

impl std::fmt::Debug for HandlerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDispatcher")
            .field("registry", &self.registry)
            .field("data_folder", &self.data_folder)
            .field("cached", &self.cached_update_types())
            .finish()
    }
}

impl HandlerDispatcher {
    pub fn new(
        registry: HandlerRegistry,
        log: RuntimeLog,
        executor: Arc<ExecutorRunner>,
        data_folder: PathBuf,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            registry,
            log,
            executor,
            data_folder,
            cache: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Returns the cached handler for `update_type`, loading it on first use.
    pub fn resolve(&self, update_type: &str) -> Result<Arc<dyn ContentHandler>, HandlerError> {
        {
            let cache = self.cache.lock().map_err(|_| HandlerError::CachePoisoned)?;
            if let Some(handler) = cache.get(update_type) {
                return Ok(Arc::clone(handler));
            }
        }

        let extension =
            self.registry
                .extension(update_type)
                .ok_or_else(|| HandlerError::UnknownUpdateType {
                    update_type: update_type.to_string(),
                })?;
        let contract = extension.contract_info();
        if !contract.is_supported() {
            return Err(HandlerError::UnsupportedContract {
                update_type: update_type.to_string(),
                major: contract.major,
                minor: contract.minor,
            });
        }

        let env = HandlerEnv {
            update_type: update_type.to_string(),
            log_level: self.log.level(),
            log: self.log.clone(),
            executor: Arc::clone(&self.executor),
            data_folder: self.data_folder.clone(),
            dispatcher: self.this.clone(),
        };
        // Creation runs without the cache lock held; a concurrent loader
        // may win the insert, in which case its instance is kept.
        let created = panic::catch_unwind(AssertUnwindSafe(|| extension.create_handler(&env)))
            .unwrap_or_else(|payload| Err(format!("panicked: {}", panic_message(payload.as_ref()))))
            .map_err(|reason| HandlerError::CreateFailed {
                update_type: update_type.to_string(),
                reason,
            })?;

        let mut cache = self.cache.lock().map_err(|_| HandlerError::CachePoisoned)?;
        let handler = cache
            .entry(update_type.to_string())
            .or_insert(created)
            .clone();
        self.log.info(
            "handler.loaded",
            &format!(
                "{update_type} contract={}.{}",
                contract.major, contract.minor
            ),
        );
        Ok(handler)
    }

    pub fn dispatch(
        &self,
        update_type: &str,
        method: HandlerMethod,
        data: &WorkflowData,
    ) -> UpdateResult {
        let handler = match self.resolve(update_type) {
            Ok(handler) => handler,
            Err(err) => {
                self.log.error("handler.load_failed", &err.to_string());
                return err.to_update_result();
            }
        };

        self.log.debug(
            "handler.dispatch",
            &format!("{update_type} {method} workflow={}", data.workflow_id),
        );
        match panic::catch_unwind(AssertUnwindSafe(|| method.invoke(handler.as_ref(), data))) {
            Ok(result) => {
                self.log.info(
                    "handler.result",
                    &format!("{update_type} {method} -> {result}"),
                );
                result
            }
            Err(payload) => {
                self.log.error(
                    "handler.fault",
                    &format!(
                        "{update_type} {method} panicked: {}",
                        panic_message(payload.as_ref())
                    ),
                );
                UpdateResult::failure(erc::HANDLER_UNHANDLED_FAULT)
            }
        }
    }

    pub fn cached_update_types(&self) -> Vec<String> {
        let cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        let mut types = cache.keys().cloned().collect::<Vec<_>>();
        types.sort();
        types
    }
}
