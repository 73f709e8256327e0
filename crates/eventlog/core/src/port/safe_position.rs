//! SafePositionSource port trait definition.

use crate::error::Result;
use async_trait::async_trait;

/// Watermark consumed by catch-up subscriptions.
///
/// Events at or below the returned global position are final: no transaction
/// still in flight can commit a row with a lower position.
#[async_trait]
pub trait SafePositionSource: Send + Sync {
    async fn safe_global_position(&self) -> Result<i64>;
}
