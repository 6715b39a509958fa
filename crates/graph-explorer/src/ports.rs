use std::sync::Arc;

use async_trait::async_trait;
use wayfinder_core_types::{Action, ActionOutcome};

/// Platform boundary: performs one action against the live UI.
///
/// Implementations report expected failures (element gone, gesture refused)
/// as an unsuccessful [`ActionOutcome`] instead of erroring. The resulting
/// state is read back through the element extractor.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn perform(&self, action: &Action) -> ActionOutcome;
}

#[async_trait]
impl<T> ActionExecutor for Arc<T>
where
    T: ActionExecutor + ?Sized,
{
    async fn perform(&self, action: &Action) -> ActionOutcome {
        (**self).perform(action).await
    }
}
