//! Deployment pipeline

pub mod builder;
pub mod command;
pub mod domain;
pub mod fsm;
pub mod framework;
pub mod git;
pub mod log;
pub mod orchestrator;
pub mod proxy;
pub mod publisher;
