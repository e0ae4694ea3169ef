//! Tracking for the free exercise book programme: school enrollment
//! submissions, approvals, deliveries, walk-in collections, and stock.

pub mod access;
pub mod auth;
pub mod error;
pub mod inventory;
pub mod model;
pub mod report;
pub mod roster;
pub mod search;
pub mod service;
pub mod store;
pub mod validate;

pub use error::{FreeBooksError, Result};
