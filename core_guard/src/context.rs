use crate::config::GuardConfig;
use crate::host::{Audience, Privileges};
use crate::messages::MessageCatalog;

/// Read-only inputs handed to every control loop on each call.
///
/// Built fresh by the orchestrator from the active configuration, so a reload
/// takes effect on the very next callback.
#[derive(Debug, Clone, Copy)]
pub struct LoopContext<'a> {
    pub config: &'a GuardConfig,
    pub catalog: &'a MessageCatalog,
}

impl<'a> LoopContext<'a> {
    pub fn new(config: &'a GuardConfig, catalog: &'a MessageCatalog) -> Self {
        Self { config, catalog }
    }

    /// Recipients of countdown and sweep notices under the notify policy.
    pub fn cleanup_audience(&self) -> Audience {
        if self.config.cleanup().notify_all_players {
            Audience::Everyone
        } else {
            Audience::Privileged(Privileges::NOTICE_AUDIENCE)
        }
    }

    /// Recipients of operational warnings.
    pub fn operator_audience(&self) -> Audience {
        Audience::Privileged(Privileges::NOTICE_AUDIENCE)
    }
}
