//! AWS SSO OIDC Client
//!
//! Talks to the SSO OIDC service (client registration, device authorization,
//! token polling) and to the SSO portal (role credentials).

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::http_client::{HttpSettings, build_client};

use super::error::{IssuerError, TokenErrorCode, TokenRejection};
use super::types::{
    AccessToken, ClientRegistration, CreateTokenResponse, DeviceAuthorization,
    GetRoleCredentialsResponse, OidcErrorResponse, RegisterClientResponse, RoleCredentials,
    StartDeviceAuthResponse,
};

const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const SSO_BEARER_TOKEN_HEADER: &str = "x-amz-sso_bearer_token";

const REGISTER_ENDPOINT: &str = "RegisterClient";
const DEVICE_AUTH_ENDPOINT: &str = "StartDeviceAuthorization";
const TOKEN_ENDPOINT: &str = "CreateToken";
const ROLE_CREDENTIALS_ENDPOINT: &str = "GetRoleCredentials";

/// Outcome of a single token request
#[derive(Debug)]
pub enum TokenPoll {
    Granted(AccessToken),
    Rejected(TokenRejection),
}

/// The identity provider side of a device-authorization login
///
/// One instance is bound to one issuer region and used for one login attempt.
pub trait Issuer {
    async fn register_client(&self, client_name: &str) -> Result<ClientRegistration, IssuerError>;

    async fn start_device_authorization(
        &self,
        registration: &ClientRegistration,
        start_url: &str,
    ) -> Result<DeviceAuthorization, IssuerError>;

    async fn create_token(
        &self,
        registration: &ClientRegistration,
        device_code: &str,
    ) -> Result<TokenPoll, IssuerError>;

    async fn get_role_credentials(
        &self,
        token: &AccessToken,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredentials, IssuerError>;
}

/// SSO OIDC Client for AWS authentication
pub struct SsoOidcClient {
    http: Client,
    region: String,
    oidc_endpoint: String,
    portal_endpoint: String,
}

impl SsoOidcClient {
    pub fn new(region: &str, settings: &HttpSettings) -> Result<Self, IssuerError> {
        let http = build_client(settings).map_err(|e| IssuerError::Client(e.to_string()))?;
        Ok(Self {
            http,
            region: region.to_string(),
            oidc_endpoint: Self::get_oidc_endpoint(region),
            portal_endpoint: Self::get_portal_endpoint(region),
        })
    }

    /// Point the client at non-default endpoints
    pub fn with_endpoints(
        mut self,
        oidc_endpoint: Option<&str>,
        portal_endpoint: Option<&str>,
    ) -> Self {
        if let Some(endpoint) = oidc_endpoint {
            self.oidc_endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Some(endpoint) = portal_endpoint {
            self.portal_endpoint = endpoint.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn get_oidc_endpoint(region: &str) -> String {
        format!("https://oidc.{}.amazonaws.com", region)
    }

    fn get_portal_endpoint(region: &str) -> String {
        format!("https://portal.sso.{}.amazonaws.com", region)
    }

    async fn post_json(
        &self,
        endpoint: &'static str,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<Response, IssuerError> {
        let url = format!("{}{}", self.oidc_endpoint, path);
        tracing::debug!("POST {} ({})", url, endpoint);
        self.http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|source| IssuerError::Transport { endpoint, source })
    }
}

impl Issuer for SsoOidcClient {
    /// Register a new public OIDC client
    async fn register_client(&self, client_name: &str) -> Result<ClientRegistration, IssuerError> {
        let payload = json!({
            "clientName": client_name,
            "clientType": "public",
        });

        let response = self
            .post_json(REGISTER_ENDPOINT, "/client/register", &payload)
            .await?;
        if !response.status().is_success() {
            return Err(service_error(REGISTER_ENDPOINT, response).await);
        }

        let result: RegisterClientResponse = decode(REGISTER_ENDPOINT, response).await?;
        Ok(result.into())
    }

    async fn start_device_authorization(
        &self,
        registration: &ClientRegistration,
        start_url: &str,
    ) -> Result<DeviceAuthorization, IssuerError> {
        let payload = json!({
            "clientId": registration.client_id,
            "clientSecret": registration.client_secret,
            "startUrl": start_url,
        });

        let response = self
            .post_json(DEVICE_AUTH_ENDPOINT, "/device_authorization", &payload)
            .await?;
        if !response.status().is_success() {
            return Err(service_error(DEVICE_AUTH_ENDPOINT, response).await);
        }

        let result: StartDeviceAuthResponse = decode(DEVICE_AUTH_ENDPOINT, response).await?;
        Ok(result.into())
    }

    /// Poll for token after user authorization
    async fn create_token(
        &self,
        registration: &ClientRegistration,
        device_code: &str,
    ) -> Result<TokenPoll, IssuerError> {
        let payload = json!({
            "clientId": registration.client_id,
            "clientSecret": registration.client_secret,
            "deviceCode": device_code,
            "grantType": DEVICE_CODE_GRANT_TYPE,
        });

        let response = self.post_json(TOKEN_ENDPOINT, "/token", &payload).await?;
        let status = response.status();

        if status.is_client_error() {
            let error_type = error_type_header(&response);
            let body = response.text().await.unwrap_or_default();
            if let Some(rejection) = parse_token_rejection(&body, error_type.as_deref()) {
                return Ok(TokenPoll::Rejected(rejection));
            }
            return Err(IssuerError::Service {
                endpoint: TOKEN_ENDPOINT,
                status: status.as_u16(),
                code: status.to_string(),
                message: non_empty(body),
            });
        }

        if !status.is_success() {
            return Err(service_error(TOKEN_ENDPOINT, response).await);
        }

        let result: CreateTokenResponse = decode(TOKEN_ENDPOINT, response).await?;
        Ok(TokenPoll::Granted(AccessToken::new(result.access_token)))
    }

    async fn get_role_credentials(
        &self,
        token: &AccessToken,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredentials, IssuerError> {
        let url = format!("{}/federation/credentials", self.portal_endpoint);
        tracing::debug!("GET {} ({})", url, ROLE_CREDENTIALS_ENDPOINT);

        let response = self
            .http
            .get(&url)
            .query(&[("account_id", account_id), ("role_name", role_name)])
            .header(SSO_BEARER_TOKEN_HEADER, token.as_str())
            .send()
            .await
            .map_err(|source| IssuerError::Transport {
                endpoint: ROLE_CREDENTIALS_ENDPOINT,
                source,
            })?;

        if !response.status().is_success() {
            return Err(service_error(ROLE_CREDENTIALS_ENDPOINT, response).await);
        }

        let result: GetRoleCredentialsResponse =
            decode(ROLE_CREDENTIALS_ENDPOINT, response).await?;
        Ok(result.role_credentials.into_credentials(&self.region))
    }
}

fn error_type_header(response: &Response) -> Option<String> {
    response
        .headers()
        .get("x-amzn-errortype")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn non_empty(body: String) -> Option<String> {
    if body.trim().is_empty() { None } else { Some(body) }
}

/// Extract an OAuth error code from a token-endpoint error answer
fn parse_token_rejection(body: &str, error_type: Option<&str>) -> Option<TokenRejection> {
    if let Ok(err_resp) = serde_json::from_str::<OidcErrorResponse>(body) {
        return Some(TokenRejection {
            code: TokenErrorCode::parse(&err_resp.error),
            description: err_resp.error_description,
        });
    }

    error_type.map(|code| TokenRejection {
        code: TokenErrorCode::parse(code),
        description: non_empty(body.to_string()),
    })
}

/// Turn a non-success response into a service error, keeping whatever
/// code and message AWS sent back
async fn service_error(endpoint: &'static str, response: Response) -> IssuerError {
    let status = response.status();
    let error_type = error_type_header(&response);
    let body = response.text().await.unwrap_or_default();

    let parsed: Option<serde_json::Value> = serde_json::from_str(&body).ok();
    let field = |names: &[&str]| -> Option<String> {
        let value = parsed.as_ref()?;
        names
            .iter()
            .find_map(|name| value.get(*name).and_then(|v| v.as_str()))
            .map(str::to_string)
    };

    let code = field(&["error", "__type", "code"])
        .or(error_type)
        .map(|c| c.split(':').next().unwrap_or_default().to_string())
        .unwrap_or_else(|| status.to_string());
    let message = field(&["error_description", "message", "Message"])
        .or_else(|| if parsed.is_none() { non_empty(body) } else { None });

    IssuerError::Service {
        endpoint,
        status: status.as_u16(),
        code,
        message,
    }
}

async fn decode<T: DeserializeOwned>(
    endpoint: &'static str,
    response: Response,
) -> Result<T, IssuerError> {
    let body = response
        .text()
        .await
        .map_err(|source| IssuerError::Transport { endpoint, source })?;
    serde_json::from_str(&body).map_err(|e| IssuerError::Decode {
        endpoint,
        detail: e.to_string(),
    })
}
