//! Capabilities the host server provides to the supervisor, and the optional
//! drain hooks it may register.

/// Host primitives invoked by the drain sequence.
pub trait WorkerHost {
    /// Stop routing new work to `worker_id`.
    fn deny_new_requests(&mut self, worker_id: u32);

    /// End this worker process. Called once, only after quiescence.
    fn terminate_process(&mut self);
}

/// Callback run once when drain begins (e.g. stop consuming a queue).
pub type PreCloseHook = Box<dyn FnMut()>;

/// Predicate consulted before the final exit; `false` keeps the worker
/// draining.
pub type ReadinessPredicate = Box<dyn FnMut() -> bool>;

/// Optional drain hooks with no-op / always-ready defaults.
#[derive(Default)]
pub struct DrainHooks {
    pre_close: Option<PreCloseHook>,
    readiness: Option<ReadinessPredicate>,
}

impl DrainHooks {
    pub fn set_pre_close(&mut self, hook: impl FnMut() + 'static) {
        self.pre_close = Some(Box::new(hook));
    }

    pub fn set_readiness(&mut self, predicate: impl FnMut() -> bool + 'static) {
        self.readiness = Some(Box::new(predicate));
    }

    /// Run the pre-close hook if one is registered.
    pub fn pre_close(&mut self) {
        if let Some(hook) = self.pre_close.as_mut() {
            hook();
        }
    }

    /// Ask the readiness predicate; ready when none is registered.
    pub fn is_ready(&mut self) -> bool {
        self.readiness.as_mut().is_none_or(|predicate| predicate())
    }
}

impl std::fmt::Debug for DrainHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainHooks")
            .field("pre_close", &self.pre_close.is_some())
            .field("readiness", &self.readiness.is_some())
            .finish()
    }
}
