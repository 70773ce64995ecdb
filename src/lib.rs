pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod files;
pub mod store;
pub mod subcontrols;
pub mod validation;
