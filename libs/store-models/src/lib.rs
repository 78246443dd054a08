//! Row models for the MadaHost store tables (`projects`, `deployments`, `users`).

pub mod models;

pub use models::*;
