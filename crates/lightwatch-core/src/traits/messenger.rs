//! Outbound messaging trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::subscription::SubscriberId;

#[async_trait]
pub trait Messenger: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver `text` to one recipient.
    ///
    /// Returns [`WatchError::RecipientBlocked`](crate::error::WatchError::RecipientBlocked)
    /// when the platform reports the recipient unreachable for good.
    async fn send_message(&self, recipient: SubscriberId, text: &str) -> Result<()>;
}
