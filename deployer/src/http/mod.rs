//! Supabase REST implementation of the store

pub mod client;
pub mod credentials;
pub mod deployments;
pub mod projects;
pub mod store;

pub use client::SupabaseClient;
