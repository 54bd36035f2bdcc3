//! Task event publication.

mod notifier;
mod types;

pub use notifier::EventNotifier;
pub use types::TaskEvent;
