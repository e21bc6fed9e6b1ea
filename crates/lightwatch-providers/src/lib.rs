//! # Lightwatch Providers
//!
//! Where published outage schedules come from. The JSON feed provider is
//! the only source today; [`create_provider`] picks it from configuration.

pub mod json_feed;

use std::sync::Arc;

use lightwatch_core::config::ProviderConfig;
use lightwatch_core::error::Result;
use lightwatch_core::traits::ScheduleProvider;

pub use json_feed::JsonFeedProvider;

/// Create the schedule provider from configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn ScheduleProvider>> {
    let provider = JsonFeedProvider::new(config)?;
    tracing::info!(url = %config.today_url, "📡 Schedule provider: json feed");
    Ok(Arc::new(provider))
}
