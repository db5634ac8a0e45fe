use crate::error::{ApiError, PlaidError};
use crate::models::{
    AddUserRequest, Auth, ConnectGetOptions, ConnectOptions, ConnectOutcome, Credentials,
    DeleteRequest, DeleteResponse, GetRequest, SendMethodOptions, StepRequest,
    StepSendMethodRequest, UpdateRequest, parse_outcome,
};
use log::{debug, info};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client as HttpClient, Method};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

const SANDBOX_URL: &str = "https://tartan.plaid.com";
const PRODUCTION_URL: &str = "https://api.plaid.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Sandbox => SANDBOX_URL,
            Environment::Production => PRODUCTION_URL,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        };
        f.write_str(v)
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    client_id: String,
    secret: String,
    http: HttpClient,
    base_url: String,
}

impl Client {
    /// Create a new client for the given environment.
    pub fn new(
        client_id: impl Into<String>,
        secret: impl Into<String>,
        environment: Environment,
    ) -> Result<Self, PlaidError> {
        let http = HttpClient::builder()
            .user_agent(concat!("plaid-connect/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!("Initialized Plaid client for {} environment", environment);
        Ok(Self {
            client_id: client_id.into(),
            secret: secret.into(),
            http,
            base_url: environment.base_url().to_string(),
        })
    }

    /// Override the base URL (useful for tests or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        info!("Updated Plaid base URL to {}", self.base_url);
        self
    }

    /// Use a preconfigured HTTP client, e.g. one with timeouts or a proxy.
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a new user's credentials for an institution.
    pub async fn connect_add_user(
        &self,
        institution_type: &str,
        credentials: &Credentials,
        options: Option<&ConnectOptions>,
    ) -> Result<ConnectOutcome, PlaidError> {
        debug!("Adding user for institution {}", institution_type);
        let body = AddUserRequest {
            auth: self.auth(),
            institution_type,
            credentials,
            options,
        };
        self.send_outcome(Method::POST, "/connect", &body).await
    }

    /// Choose the channel for an MFA code, e.g. `("mask", "xxx-xxx-5309")`.
    pub async fn connect_step_send_method(
        &self,
        access_token: &str,
        key: &str,
        value: &str,
    ) -> Result<ConnectOutcome, PlaidError> {
        debug!("Selecting MFA send method by {}", key);
        let body = StepSendMethodRequest {
            auth: self.auth(),
            access_token,
            options: SendMethodOptions {
                send_method: BTreeMap::from([(key, value)]),
            },
        };
        self.send_outcome(Method::POST, "/connect/step", &body).await
    }

    /// Answer a pending MFA challenge.
    pub async fn connect_step(
        &self,
        access_token: &str,
        answer: &str,
    ) -> Result<ConnectOutcome, PlaidError> {
        let body = StepRequest {
            auth: self.auth(),
            access_token,
            mfa: answer,
        };
        self.send_outcome(Method::POST, "/connect/step", &body).await
    }

    /// Retrieve accounts and transactions for a linked user.
    pub async fn connect_get(
        &self,
        access_token: &str,
        options: Option<&ConnectGetOptions>,
    ) -> Result<ConnectOutcome, PlaidError> {
        let body = GetRequest {
            auth: self.auth(),
            access_token,
            options,
        };
        self.send_outcome(Method::POST, "/connect/get", &body).await
    }

    /// Replace the stored credentials of a linked user.
    pub async fn connect_update(
        &self,
        access_token: &str,
        credentials: &Credentials,
    ) -> Result<ConnectOutcome, PlaidError> {
        info!("Updating credentials for linked user");
        let body = UpdateRequest {
            auth: self.auth(),
            credentials,
            mfa: None,
            access_token,
        };
        self.send_outcome(Method::PATCH, "/connect", &body).await
    }

    /// Answer an MFA challenge raised by a credential update.
    pub async fn connect_update_step(
        &self,
        access_token: &str,
        credentials: &Credentials,
        mfa: &str,
    ) -> Result<ConnectOutcome, PlaidError> {
        let body = UpdateRequest {
            auth: self.auth(),
            credentials,
            mfa: Some(mfa),
            access_token,
        };
        self.send_outcome(Method::PATCH, "/connect/step", &body).await
    }

    /// Delete all data associated with an access token.
    pub async fn connect_delete(&self, access_token: &str) -> Result<DeleteResponse, PlaidError> {
        info!("Deleting linked user");
        let body = DeleteRequest {
            auth: self.auth(),
            access_token,
        };
        let text = self.send(Method::DELETE, "/connect", &body).await?;
        serde_json::from_str(&text).map_err(PlaidError::InvalidResponse)
    }

    fn auth(&self) -> Auth<'_> {
        Auth {
            client_id: &self.client_id,
            secret: &self.secret,
        }
    }

    async fn send_outcome<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<ConnectOutcome, PlaidError> {
        let text = self.send(method, path, body).await?;
        let outcome = parse_outcome(&text).map_err(PlaidError::InvalidResponse)?;
        if outcome.is_mfa_required() {
            debug!("{} answered with an MFA challenge", path);
        }
        Ok(outcome)
    }

    async fn send<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<String, PlaidError> {
        let payload = serde_json::to_vec(body).map_err(PlaidError::Encode)?;
        let url = format!("{}{}", self.base_url, path);
        debug!("{} request to {}", method, url);
        let response = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;
        let status = response.status();
        debug!("Received status {}", status);
        let text = response.text().await?;
        if status.is_success() {
            if let Some(api_error) = ApiError::from_success_body(status, &text) {
                debug!("{} answered with error code {}", path, api_error.code);
                return Err(PlaidError::Api(api_error));
            }
            return Ok(text);
        }
        match ApiError::from_body(status, &text) {
            Some(api_error) => Err(PlaidError::Api(api_error)),
            None => Err(PlaidError::Status(status)),
        }
    }
}
