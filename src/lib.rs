pub mod config;
pub mod domain;
pub mod engine;
pub mod export;
pub mod http;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod orchestrator;
pub mod planner;
pub mod reconcile;
pub mod send_home;
pub mod wal;
