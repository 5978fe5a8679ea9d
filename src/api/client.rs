//! Client for validating accounts against a peer identity service.
//!
//! Used by services that store references to accounts and need to confirm
//! the account still exists before accepting writes. The check fails closed:
//! only a definitive 200 or 404 produces an answer, anything else (timeout,
//! 5xx, network error) is an error the caller must treat as "cannot
//! validate".

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct IdentityClient {
    client: reqwest::Client,
    base_url: Url,
}

impl IdentityClient {
    /// Build a client against the identity service base URL,
    /// e.g. `http://identity:8080`.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid identity service URL")?;
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build identity client")?;
        Ok(Self { client, base_url })
    }

    /// Check whether an account exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the service cannot give a definitive answer.
    pub async fn account_exists(&self, account_id: Uuid) -> Result<bool> {
        let url = self
            .base_url
            .join(&format!("api/v1/users/{account_id}"))
            .context("failed to build account URL")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("identity service request failed")?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => bail!("identity service answered {status}, cannot validate account"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_base_url() {
        assert!(IdentityClient::new("::not-a-url::").is_err());
    }

    #[test]
    fn builds_account_url_from_base() {
        let client = IdentityClient::new("http://identity:8080/").unwrap();
        let id = Uuid::nil();
        let url = client
            .base_url
            .join(&format!("api/v1/users/{id}"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://identity:8080/api/v1/users/00000000-0000-0000-0000-000000000000"
        );
    }
}
