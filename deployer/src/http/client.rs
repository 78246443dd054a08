//! PostgREST client for the hosted Supabase store

use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use store_models::ErrorResponse;
use tracing::{debug, error};

use crate::errors::DeployError;

/// A PostgREST filter such as `("id", "eq.<id>")`
pub type Filter = (&'static str, String);

/// HTTP client for the Supabase REST gateway
pub struct SupabaseClient {
    client: Client,
    rest_url: String,
    service_key: SecretString,
}

impl SupabaseClient {
    /// Create a client for the project at `base_url` (e.g. `https://xyz.supabase.co`)
    pub fn new(base_url: &str, service_key: SecretString) -> Result<Self, DeployError> {
        if service_key.expose_secret().is_empty() {
            return Err(DeployError::ConfigError(
                "Supabase service key is empty".to_string(),
            ));
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            service_key,
        })
    }

    /// Get the REST base URL
    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.rest_url, table);
        debug!("{} {}", method, url);

        let key = self.service_key.expose_secret();
        self.client
            .request(method, url)
            .header("apikey", key)
            .header(header::AUTHORIZATION, format!("Bearer {}", key))
    }

    /// Select rows of `table` matching every filter
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[Filter],
    ) -> Result<Vec<T>, DeployError> {
        let response = self
            .request(Method::GET, table)
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await?;

        let response = check(response, "GET", table).await?;
        Ok(response.json().await?)
    }

    /// Insert one row and return its stored representation
    pub async fn insert<T: DeserializeOwned, B: Serialize>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<T, DeployError> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;

        let response = check(response, "POST", table).await?;
        let mut rows: Vec<T> = response.json().await?;
        if rows.is_empty() {
            return Err(DeployError::StoreError(format!(
                "insert into {} returned no row",
                table
            )));
        }
        Ok(rows.swap_remove(0))
    }

    /// Patch the rows matching `filters`; returns how many rows were touched
    pub async fn update<B: Serialize>(
        &self,
        table: &str,
        filters: &[Filter],
        body: &B,
    ) -> Result<usize, DeployError> {
        let response = self
            .request(Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(filters)
            .json(body)
            .send()
            .await?;

        let response = check(response, "PATCH", table).await?;
        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows.len())
    }
}

/// `eq.` filter
pub fn eq(column: &'static str, value: &str) -> Filter {
    (column, format!("eq.{}", value))
}

async fn check(response: Response, method: &str, table: &str) -> Result<Response, DeployError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!("HTTP {} {} failed: {} - {}", method, table, status, body);

    let message = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => match err.hint {
            Some(hint) => format!("{} ({})", err.message, hint),
            None => err.message,
        },
        Err(_) => body,
    };
    Err(DeployError::StoreError(format!("{}: {}", status, message)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_url() {
        let client =
            SupabaseClient::new("https://abc.supabase.co/", SecretString::from("k".to_string()))
                .unwrap();
        assert_eq!(client.rest_url(), "https://abc.supabase.co/rest/v1");
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = SupabaseClient::new("https://abc.supabase.co", SecretString::from(String::new()));
        assert!(matches!(result, Err(DeployError::ConfigError(_))));
    }

    #[test]
    fn test_eq_filter() {
        assert_eq!(eq("id", "p1"), ("id", "eq.p1".to_string()));
    }
}
