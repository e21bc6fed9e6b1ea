//! Seams to the external collaborators.

pub mod messenger;
pub mod provider;
pub mod store;

pub use messenger::Messenger;
pub use provider::ScheduleProvider;
pub use store::Store;
