//! Discovery watcher and update diff engine
//!
//! A [`Watcher`] owns one background polling loop per `(service, tag)`
//! subscription and surfaces registry changes as batches of [`UpdateEvent`]s.

pub mod diff;
pub mod watcher;

pub use diff::{diff, UpdateEvent};
pub use watcher::Watcher;
