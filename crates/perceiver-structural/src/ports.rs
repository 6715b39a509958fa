use std::sync::Arc;

use async_trait::async_trait;
use wayfinder_core_types::UiSnapshot;

use crate::errors::PerceiverError;

/// Platform boundary: reads the current UI as a flat element list.
///
/// Implementations wrap whatever introspection the platform provides
/// (accessibility tree, DOM snapshot). The core never looks past this trait.
#[async_trait]
pub trait ElementExtractor: Send + Sync {
    async fn snapshot(&self) -> Result<UiSnapshot, PerceiverError>;
}

#[async_trait]
impl<T> ElementExtractor for Arc<T>
where
    T: ElementExtractor + ?Sized,
{
    async fn snapshot(&self) -> Result<UiSnapshot, PerceiverError> {
        (**self).snapshot().await
    }
}
