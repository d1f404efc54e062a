// Library for tests to access modules

pub mod bedrock;
pub mod cluster_repo;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod session_repo;
pub mod session_worker;
pub mod trace;
pub mod version;
