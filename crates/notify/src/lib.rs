//! Release notifications for detected manifest changes.
//!
//! This crate provides:
//! - `Notifier` trait for chat rooms, with a HipChat implementation
//! - `ReleaseTracker` trait for issue-tracker versions, with a Jira implementation
//! - Minijinja template rendering for announcement messages
//! - Dispatcher that sends the announcement and records tracker versions

pub mod dispatcher;
pub mod hipchat;
pub mod jira;
pub mod secrets;
pub mod templating;
pub mod traits;

pub use dispatcher::{Dispatcher, Room};
pub use hipchat::HipChatNotifier;
pub use jira::JiraTracker;
pub use traits::{DispatchResult, NewVersion, Notification, Notifier, NotifyError, ReleaseTracker};
