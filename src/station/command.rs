//! Hardware command seam
//!
//! Commands received in relay mode are handed to a [`CommandHandler`]
//! before they are acknowledged. Actuator drivers plug in here.

use crate::protocol::Command;
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: &Command);
}

/// Handler that only logs; no hardware is driven
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCommandHandler;

#[async_trait]
impl CommandHandler for NoopCommandHandler {
    async fn handle(&self, command: &Command) {
        debug!(
            command = %command.name,
            direction = %command.direction,
            "No hardware handler installed, command not executed"
        );
    }
}
