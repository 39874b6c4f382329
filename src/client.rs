//! Client-side calling convention for the four ceremony operations
//!
//! The browser ceremony itself (`navigator.credentials.create/get`) happens
//! between the options call and the verify call; this client only carries
//! JSON to and from the server.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::{AuthenticationVerification, RegistrationVerification};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response; `message` is the server's error message when present
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
}

/// HTTP client for a passkey-gate server
#[derive(Clone)]
pub struct PasskeyClient {
    base_url: url::Url,
    http_client: reqwest::Client,
}

impl PasskeyClient {
    /// # Errors
    ///
    /// Returns `ClientError::Url` if `base_url` is not an absolute URL
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// # Errors
    ///
    /// Returns `ClientError::Url` if `base_url` is not an absolute URL
    pub fn with_client(base_url: &str, http_client: reqwest::Client) -> Result<Self, ClientError> {
        // Ensure relative joins keep any path prefix
        let mut base_url = url::Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// Fetch registration options to pass to `navigator.credentials.create`
    ///
    /// # Errors
    ///
    /// Returns a transport error or the server's error response
    pub async fn registration_options(
        &self,
        username: &str,
        display_name: &str,
        user_id: Option<&str>,
    ) -> Result<Value, ClientError> {
        let mut body = json!({ "username": username, "displayName": display_name });
        if let Some(user_id) = user_id {
            body["userId"] = json!(user_id);
        }
        self.post("register/options", &body).await
    }

    /// Submit the credential returned by the browser for registration
    ///
    /// # Errors
    ///
    /// Returns a transport error or the server's error response
    pub async fn verify_registration(
        &self,
        username: &str,
        credential: &Value,
    ) -> Result<RegistrationVerification, ClientError> {
        self.post(
            "register/verify",
            &json!({ "username": username, "credential": credential }),
        )
        .await
    }

    /// Fetch authentication options; `None` requests a discoverable ceremony
    ///
    /// # Errors
    ///
    /// Returns a transport error or the server's error response
    pub async fn authentication_options(&self, username: Option<&str>) -> Result<Value, ClientError> {
        self.post("authenticate/options", &json!({ "username": username }))
            .await
    }

    /// Submit the assertion returned by the browser
    ///
    /// `username` must be the same value passed to `authentication_options`.
    ///
    /// # Errors
    ///
    /// Returns a transport error or the server's error response
    pub async fn verify_authentication(
        &self,
        username: Option<&str>,
        credential: &Value,
    ) -> Result<AuthenticationVerification, ClientError> {
        self.post(
            "authenticate/verify",
            &json!({ "username": username, "credential": credential }),
        )
        .await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        let resp = self.http_client.post(url).json(body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            return Err(ClientError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let client = PasskeyClient::new("http://localhost:8080/api").unwrap();
        assert_eq!(
            client.base_url.join("register/options").unwrap().as_str(),
            "http://localhost:8080/api/register/options"
        );
    }

    #[test]
    fn test_rejects_relative_base_url() {
        assert!(matches!(
            PasskeyClient::new("/api"),
            Err(ClientError::Url(_))
        ));
    }
}
