//! Login error taxonomy

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Error codes the SSO OIDC token endpoint can answer with
///
/// Accepts both the OAuth snake_case form (`authorization_pending`) and the
/// AWS exception name (`AuthorizationPendingException`). Anything else is
/// kept verbatim as `Unrecognized` and treated as terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenErrorCode {
    AuthorizationPending,
    SlowDown,
    ExpiredToken,
    AccessDenied,
    InvalidClient,
    InvalidGrant,
    InvalidRequest,
    InvalidScope,
    UnauthorizedClient,
    UnsupportedGrantType,
    InternalServer,
    Unrecognized(String),
}

impl TokenErrorCode {
    pub fn parse(raw: &str) -> Self {
        let code = raw.trim();
        // x-amzn-errortype may carry a ":<url>" suffix
        let code = code.split(':').next().unwrap_or(code);
        match code {
            "authorization_pending" | "AuthorizationPendingException" => Self::AuthorizationPending,
            "slow_down" | "SlowDownException" => Self::SlowDown,
            "expired_token" | "ExpiredTokenException" => Self::ExpiredToken,
            "access_denied" | "AccessDeniedException" => Self::AccessDenied,
            "invalid_client" | "InvalidClientException" => Self::InvalidClient,
            "invalid_grant" | "InvalidGrantException" => Self::InvalidGrant,
            "invalid_request" | "InvalidRequestException" => Self::InvalidRequest,
            "invalid_scope" | "InvalidScopeException" => Self::InvalidScope,
            "unauthorized_client" | "UnauthorizedClientException" => Self::UnauthorizedClient,
            "unsupported_grant_type" | "UnsupportedGrantTypeException" => {
                Self::UnsupportedGrantType
            }
            "server_error" | "InternalServerException" => Self::InternalServer,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Whether polling may continue after this code
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AuthorizationPending | Self::SlowDown => true,
            Self::ExpiredToken
            | Self::AccessDenied
            | Self::InvalidClient
            | Self::InvalidGrant
            | Self::InvalidRequest
            | Self::InvalidScope
            | Self::UnauthorizedClient
            | Self::UnsupportedGrantType
            | Self::InternalServer
            | Self::Unrecognized(_) => false,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::ExpiredToken => "expired_token",
            Self::AccessDenied => "access_denied",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidRequest => "invalid_request",
            Self::InvalidScope => "invalid_scope",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InternalServer => "server_error",
            Self::Unrecognized(code) => code.as_str(),
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

/// A token-endpoint answer that carried an error code instead of a token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}{}", detail_suffix(.description))]
pub struct TokenRejection {
    pub code: TokenErrorCode,
    pub description: Option<String>,
}

impl TokenRejection {
    pub fn new(code: TokenErrorCode) -> Self {
        Self {
            code,
            description: None,
        }
    }
}

/// Failure talking to an AWS endpoint
#[derive(Debug, Error)]
pub enum IssuerError {
    #[error("could not build HTTP client: {0}")]
    Client(String),

    #[error("{endpoint} request failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} rejected the request (status {status}): {code}{}", detail_suffix(.message))]
    Service {
        endpoint: &'static str,
        status: u16,
        code: String,
        message: Option<String>,
    },

    /// Failure inside the AWS SDK before a service answer arrived
    #[error("{endpoint} call failed: {detail}")]
    Sdk {
        endpoint: &'static str,
        detail: String,
    },

    #[error("{endpoint} returned an unreadable response: {detail}")]
    Decode {
        endpoint: &'static str,
        detail: String,
    },
}

/// Why the token endpoint did not produce a token
#[derive(Debug, Error)]
pub enum TokenExchangeFailure {
    #[error("issuer answered {0}")]
    Rejected(TokenRejection),

    #[error(transparent)]
    Issuer(IssuerError),
}

/// Failure classes of a login attempt
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("missing required SSO configuration: {}", .missing.join(", "))]
    MissingConfiguration { missing: Vec<&'static str> },

    #[error("failed to register OIDC client: {0}")]
    Registration(#[source] IssuerError),

    #[error("failed to start device authorization: {0}")]
    AuthorizationStart(#[source] IssuerError),

    #[error("device authorization timed out after {}s (expires in {}s)", .waited.as_secs(), .expires_in.as_secs())]
    AuthorizationTimeout { waited: Duration, expires_in: Duration },

    #[error("error creating token: {0}")]
    TokenExchange(#[source] TokenExchangeFailure),

    #[error("failed to get role credentials: {0}")]
    RoleCredential(#[source] IssuerError),

    #[error("could not verify identity: {0}")]
    VerificationFailed(#[source] IssuerError),
}

impl LoginError {
    /// Only `VerificationFailed` leaves obtained credentials usable
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::VerificationFailed(_))
    }

    /// Distinct process exit status per failure class
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingConfiguration { .. } => 3,
            Self::Registration(_) => 4,
            Self::AuthorizationStart(_) => 5,
            Self::AuthorizationTimeout { .. } => 6,
            Self::TokenExchange(_) => 7,
            Self::RoleCredential(_) => 8,
            Self::VerificationFailed(_) => 9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snake_case_and_exception_names() {
        assert_eq!(
            TokenErrorCode::parse("authorization_pending"),
            TokenErrorCode::AuthorizationPending
        );
        assert_eq!(
            TokenErrorCode::parse("AuthorizationPendingException"),
            TokenErrorCode::AuthorizationPending
        );
        assert_eq!(TokenErrorCode::parse("slow_down"), TokenErrorCode::SlowDown);
        assert_eq!(
            TokenErrorCode::parse("SlowDownException:http://internal.amazon.com/coral/"),
            TokenErrorCode::SlowDown
        );
        assert_eq!(
            TokenErrorCode::parse("expired_token"),
            TokenErrorCode::ExpiredToken
        );
    }

    #[test]
    fn test_unknown_code_is_kept_and_terminal() {
        let code = TokenErrorCode::parse("brand_new_error");
        assert_eq!(code, TokenErrorCode::Unrecognized("brand_new_error".to_string()));
        assert!(!code.is_retryable());
        assert_eq!(code.to_string(), "brand_new_error");
    }

    #[test]
    fn test_only_pending_and_slow_down_are_retryable() {
        assert!(TokenErrorCode::AuthorizationPending.is_retryable());
        assert!(TokenErrorCode::SlowDown.is_retryable());
        assert!(!TokenErrorCode::ExpiredToken.is_retryable());
        assert!(!TokenErrorCode::AccessDenied.is_retryable());
        assert!(!TokenErrorCode::InternalServer.is_retryable());
    }

    #[test]
    fn test_rejection_display_includes_description() {
        let rejection = TokenRejection {
            code: TokenErrorCode::AccessDenied,
            description: Some("user denied".to_string()),
        };
        assert_eq!(rejection.to_string(), "access_denied: user denied");
        assert_eq!(
            TokenRejection::new(TokenErrorCode::ExpiredToken).to_string(),
            "expired_token"
        );
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let service = || IssuerError::Service {
            endpoint: "test",
            status: 400,
            code: "InvalidRequestException".to_string(),
            message: None,
        };
        let errors = vec![
            LoginError::MissingConfiguration {
                missing: vec!["sso_region"],
            },
            LoginError::Registration(service()),
            LoginError::AuthorizationStart(service()),
            LoginError::AuthorizationTimeout {
                waited: Duration::from_secs(10),
                expires_in: Duration::from_secs(8),
            },
            LoginError::TokenExchange(TokenExchangeFailure::Issuer(service())),
            LoginError::RoleCredential(service()),
            LoginError::VerificationFailed(service()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(LoginError::exit_code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|c| *c != 0));
    }

    #[test]
    fn test_only_verification_failure_is_non_fatal() {
        let err = LoginError::VerificationFailed(IssuerError::Decode {
            endpoint: "sts",
            detail: "bad json".to_string(),
        });
        assert!(!err.is_fatal());
        assert!(
            LoginError::MissingConfiguration {
                missing: vec!["sso_start_url"]
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_missing_configuration_message_lists_fields() {
        let err = LoginError::MissingConfiguration {
            missing: vec!["sso_start_url", "sso_role_name"],
        };
        assert_eq!(
            err.to_string(),
            "missing required SSO configuration: sso_start_url, sso_role_name"
        );
    }
}
