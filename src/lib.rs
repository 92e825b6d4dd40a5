//! The backend for the research-fusion study management app.

pub mod auth;
pub mod config;
pub mod consistency;
pub mod db;
pub mod error;
pub mod extract;
pub mod models;
pub mod routes;
pub mod util;
