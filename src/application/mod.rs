//! Application services: typed clients, batch orchestration and the service façade.

pub mod batch;
pub mod clients;
pub mod error;
pub mod service;
