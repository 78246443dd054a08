//! GitHub tokens stored on user rows

use secrecy::SecretString;
use store_models::UserTokenRow;

use crate::errors::DeployError;
use crate::http::client::{eq, SupabaseClient};

impl SupabaseClient {
    /// Read the stored GitHub OAuth token of a user
    pub async fn fetch_access_token(
        &self,
        user_id: &str,
    ) -> Result<Option<SecretString>, DeployError> {
        let rows: Vec<UserTokenRow> = self.select("users", &[eq("id", user_id)]).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.github_access_token)
            .filter(|token| !token.is_empty())
            .map(SecretString::from))
    }
}
