//! SSO login types
//!
//! Wire shapes for the SSO OIDC and portal APIs, plus the values that flow
//! through one login attempt.

use std::fmt;
use std::time::{Duration, SystemTime};

use aws_credential_types::Credentials;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::time::Instant;

/// Provider name attached to credentials handed to the AWS SDK
pub const CREDENTIALS_PROVIDER_NAME: &str = "aws-grok";

/// Poll interval used when the issuer does not send one
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Device code lifetime used when the issuer does not send one
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 600;

/// Issuer metadata and target account/role for a login
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileIdentity {
    pub start_url: String,
    pub region: String,
    pub account_id: String,
    pub role_name: String,
}

impl ProfileIdentity {
    /// Names of the config keys whose values are missing or blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("sso_start_url", &self.start_url),
            ("sso_region", &self.region),
            ("sso_account_id", &self.account_id),
            ("sso_role_name", &self.role_name),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// A public OIDC client registered for a single login attempt
#[derive(Clone, PartialEq, Eq)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// Device code issued for one registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub interval: Duration,
    pub expires_in: Duration,
    /// When the issuer handed out the code; `expires_in` counts from here
    pub issued_at: Instant,
}

impl DeviceAuthorization {
    /// URL shown to the user, preferring the one with the code embedded
    pub fn display_uri(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .filter(|uri| !uri.is_empty())
            .unwrap_or(&self.verification_uri)
    }
}

/// Bearer token returned by the token endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Short-lived credentials for one account/role pair
#[derive(Clone, PartialEq, Eq)]
pub struct RoleCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub region: String,
    pub expiration: Option<DateTime<Utc>>,
}

impl fmt::Debug for RoleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &"***")
            .field("region", &self.region)
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl RoleCredentials {
    /// The same keys in the AWS SDK's credential type
    pub fn to_sdk_credentials(&self) -> Credentials {
        Credentials::new(
            &self.access_key_id,
            &self.secret_access_key,
            Some(self.session_token.clone()),
            self.expiration.map(SystemTime::from),
            CREDENTIALS_PROVIDER_NAME,
        )
    }
}

/// SSO OIDC Register Client Response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterClientResponse {
    pub client_id: String,
    pub client_secret: String,
    pub client_id_issued_at: Option<i64>,
    pub client_secret_expires_at: Option<i64>,
}

impl From<RegisterClientResponse> for ClientRegistration {
    fn from(resp: RegisterClientResponse) -> Self {
        Self {
            client_id: resp.client_id,
            client_secret: resp.client_secret,
        }
    }
}

/// SSO OIDC Start Device Authorization Response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDeviceAuthResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_in: Option<u64>,
    pub interval: Option<u64>,
}

impl From<StartDeviceAuthResponse> for DeviceAuthorization {
    fn from(resp: StartDeviceAuthResponse) -> Self {
        Self {
            device_code: resp.device_code,
            user_code: resp.user_code,
            verification_uri: resp.verification_uri,
            verification_uri_complete: resp.verification_uri_complete,
            interval: Duration::from_secs(resp.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS)),
            expires_in: Duration::from_secs(resp.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)),
            issued_at: Instant::now(),
        }
    }
}

/// SSO OIDC Create Token Response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
}

/// SSO OIDC Error Response
#[derive(Debug, Deserialize)]
pub struct OidcErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}

/// SSO portal GetRoleCredentials response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRoleCredentialsResponse {
    pub role_credentials: RoleCredentialsBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCredentialsBody {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// Milliseconds since the epoch
    pub expiration: Option<i64>,
}

impl RoleCredentialsBody {
    pub fn into_credentials(self, region: &str) -> RoleCredentials {
        RoleCredentials {
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            session_token: self.session_token,
            region: region.to_string(),
            expiration: self
                .expiration
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_reports_blank_values() {
        let identity = ProfileIdentity {
            start_url: "https://x.awsapps.com/start".to_string(),
            region: "  ".to_string(),
            account_id: String::new(),
            role_name: "Admin".to_string(),
        };
        assert_eq!(identity.missing_fields(), vec!["sso_region", "sso_account_id"]);
    }

    #[test]
    fn test_missing_fields_empty_when_complete() {
        let identity = ProfileIdentity {
            start_url: "https://x.awsapps.com/start".to_string(),
            region: "us-east-1".to_string(),
            account_id: "123456789012".to_string(),
            role_name: "Admin".to_string(),
        };
        assert!(identity.missing_fields().is_empty());
    }

    #[test]
    fn test_device_authorization_defaults() {
        let resp: StartDeviceAuthResponse = serde_json::from_str(
            r#"{"deviceCode":"dc","userCode":"ABCD-EFGH","verificationUri":"https://device.sso.us-east-1.amazonaws.com/"}"#,
        )
        .unwrap();
        let auth = DeviceAuthorization::from(resp);
        assert_eq!(auth.interval, Duration::from_secs(5));
        assert_eq!(auth.expires_in, Duration::from_secs(600));
        assert_eq!(auth.display_uri(), "https://device.sso.us-east-1.amazonaws.com/");
    }

    #[test]
    fn test_display_uri_prefers_complete_form() {
        let resp: StartDeviceAuthResponse = serde_json::from_str(
            r#"{
                "deviceCode": "dc",
                "userCode": "ABCD-EFGH",
                "verificationUri": "https://device.sso.us-east-1.amazonaws.com/",
                "verificationUriComplete": "https://device.sso.us-east-1.amazonaws.com/?user_code=ABCD-EFGH",
                "expiresIn": 300,
                "interval": 1
            }"#,
        )
        .unwrap();
        let auth = DeviceAuthorization::from(resp);
        assert_eq!(
            auth.display_uri(),
            "https://device.sso.us-east-1.amazonaws.com/?user_code=ABCD-EFGH"
        );
        assert_eq!(auth.interval, Duration::from_secs(1));
        assert_eq!(auth.expires_in, Duration::from_secs(300));
    }

    #[test]
    fn test_role_credentials_expiration_from_millis() {
        let resp: GetRoleCredentialsResponse = serde_json::from_str(
            r#"{"roleCredentials":{"accessKeyId":"ASIA1","secretAccessKey":"secret","sessionToken":"tok","expiration":1700000000000}}"#,
        )
        .unwrap();
        let creds = resp.role_credentials.into_credentials("eu-west-1");
        assert_eq!(creds.access_key_id, "ASIA1");
        assert_eq!(creds.region, "eu-west-1");
        assert_eq!(creds.expiration.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = RoleCredentials {
            access_key_id: "ASIA1".to_string(),
            secret_access_key: "very-secret".to_string(),
            session_token: "session".to_string(),
            region: "us-east-1".to_string(),
            expiration: None,
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("ASIA1"));
        assert!(!rendered.contains("very-secret"));
        assert!(!format!("{:?}", AccessToken::new("bearer-value")).contains("bearer-value"));
    }

    #[test]
    fn test_to_sdk_credentials_keeps_keys_and_expiry() {
        let creds = RoleCredentials {
            access_key_id: "ASIA1".to_string(),
            secret_access_key: "very-secret".to_string(),
            session_token: "session".to_string(),
            region: "us-east-1".to_string(),
            expiration: Utc.timestamp_opt(1_700_000_000, 0).single(),
        };
        let sdk = creds.to_sdk_credentials();
        assert_eq!(sdk.access_key_id(), "ASIA1");
        assert_eq!(sdk.secret_access_key(), "very-secret");
        assert_eq!(sdk.session_token(), Some("session"));
        assert_eq!(
            sdk.expiry(),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
    }
}
