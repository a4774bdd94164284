//! What the control surface needs from the scheduler
//!
//! Handlers only see this trait, so they can be tested without a running
//! delivery loop.

use async_trait::async_trait;
use courier_delivery::{BatchOutcome, DeliveryError, Scheduler};

#[async_trait]
pub trait ProcessingController: Send + Sync {
    /// Start automatic processing; `false` if it was already running
    fn start(&self) -> bool;

    /// Stop automatic processing and wait for it; `false` if it was not running
    async fn stop(&self) -> bool;

    fn is_running(&self) -> bool;

    /// Run one batch now
    ///
    /// # Errors
    /// Any error from the delivery cycle, including lock contention
    async fn process_once(&self) -> Result<BatchOutcome, DeliveryError>;
}

#[async_trait]
impl ProcessingController for Scheduler {
    fn start(&self) -> bool {
        Self::start(self)
    }

    async fn stop(&self) -> bool {
        Self::stop(self).await
    }

    fn is_running(&self) -> bool {
        Self::is_running(self)
    }

    async fn process_once(&self) -> Result<BatchOutcome, DeliveryError> {
        Self::process_once(self).await
    }
}
