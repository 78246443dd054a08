//! Domain models

pub mod deployment;
pub mod project;

pub use deployment::{Deployment, DeploymentStatus, StatusUpdate};
pub use project::{BuildConfig, EnvVar, Project, ProjectStatus, ProjectUpdate, RepoCoordinate};
