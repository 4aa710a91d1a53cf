pub mod api;
pub mod config;
pub mod entry;
pub mod executor;
pub mod humanize;
pub mod ledger;
pub mod observability;
pub mod probe;
pub mod replay;
pub mod retry;
pub mod store;
