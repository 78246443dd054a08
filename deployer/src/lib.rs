//! MadaHost deployer library
//!
//! Turns a project's GitHub repository into a published static site:
//! clone, detect the framework, install, build, stage, publish and
//! configure the reverse proxy, recording every step on the deployment.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod store;
pub mod utils;
pub mod workers;
