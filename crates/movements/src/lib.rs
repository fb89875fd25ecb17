//! Movement store and view reconciler for the expense tracker.
//!
//! [`store::MovementStore`] owns the list and persists it after every change;
//! [`views`] derives everything that gets rendered from that list.

pub mod format;
pub mod models;
mod repository;
pub mod store;
pub mod views;
