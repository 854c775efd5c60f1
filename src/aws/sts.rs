//! STS GetCallerIdentity
//!
//! Used after login to confirm the credentials work, and to check static
//! credentials of non-SSO profiles.

use std::time::Duration;

use aws_credential_types::Credentials;
use aws_sdk_sts::config::timeout::TimeoutConfig;
use aws_sdk_sts::config::{BehaviorVersion, Region};
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use serde::{Deserialize, Serialize};

use crate::http_client::HttpSettings;
use crate::sso::error::IssuerError;

const ENDPOINT: &str = "GetCallerIdentity";

/// Who a set of credentials belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    pub user_id: String,
    pub account: String,
    pub arn: String,
}

/// Identity introspection endpoint
pub trait IdentityVerifier {
    async fn get_caller_identity(
        &self,
        credentials: &Credentials,
    ) -> Result<CallerIdentity, IssuerError>;
}

/// STS client settings; an SDK client is built per call for the given keys
pub struct StsClient {
    region: String,
    endpoint: Option<String>,
    timeout: Duration,
}

impl StsClient {
    pub fn new(region: &str, settings: &HttpSettings) -> Self {
        Self {
            region: region.to_string(),
            endpoint: None,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    pub fn with_endpoint(mut self, endpoint: Option<&str>) -> Self {
        if let Some(endpoint) = endpoint {
            self.endpoint = Some(endpoint.trim_end_matches('/').to_string());
        }
        self
    }

    fn sdk_client(&self, credentials: &Credentials) -> aws_sdk_sts::Client {
        let mut builder = aws_sdk_sts::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(credentials.clone())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(self.timeout)
                    .build(),
            );
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        aws_sdk_sts::Client::from_conf(builder.build())
    }
}

impl IdentityVerifier for StsClient {
    async fn get_caller_identity(
        &self,
        credentials: &Credentials,
    ) -> Result<CallerIdentity, IssuerError> {
        tracing::debug!(
            "Calling {} in {} as {}",
            ENDPOINT,
            self.region,
            credentials.access_key_id()
        );
        let output = self
            .sdk_client(credentials)
            .get_caller_identity()
            .send()
            .await
            .map_err(|err| match &err {
                SdkError::ServiceError(service) => IssuerError::Service {
                    endpoint: ENDPOINT,
                    status: service.raw().status().as_u16(),
                    code: service.err().code().unwrap_or("Unknown").to_string(),
                    message: service.err().message().map(str::to_string),
                },
                _ => IssuerError::Sdk {
                    endpoint: ENDPOINT,
                    detail: DisplayErrorContext(&err).to_string(),
                },
            })?;

        Ok(CallerIdentity {
            user_id: output.user_id().unwrap_or_default().to_string(),
            account: output.account().unwrap_or_default().to_string(),
            arn: output.arn().unwrap_or_default().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> Credentials {
        Credentials::new("ASIAEXAMPLE", "secret", Some("session".to_string()), None, "test")
    }

    fn client_for(server: &MockServer) -> StsClient {
        StsClient::new("us-east-1", &HttpSettings::default()).with_endpoint(Some(&server.uri()))
    }

    fn xml(status: u16, body: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_raw(body.to_string(), "text/xml")
    }

    #[tokio::test]
    async fn test_get_caller_identity_signed_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_string_contains("Action=GetCallerIdentity"))
            .and(header("x-amz-security-token", "session"))
            .and(header_exists("authorization"))
            .respond_with(xml(
                200,
                r#"<GetCallerIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <GetCallerIdentityResult>
    <Arn>arn:aws:sts::123456789012:assumed-role/Admin/user</Arn>
    <UserId>AROAEXAMPLE:user</UserId>
    <Account>123456789012</Account>
  </GetCallerIdentityResult>
  <ResponseMetadata>
    <RequestId>req-1</RequestId>
  </ResponseMetadata>
</GetCallerIdentityResponse>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let identity = client_for(&server)
            .get_caller_identity(&credentials())
            .await
            .unwrap();
        assert_eq!(identity.account, "123456789012");
        assert_eq!(identity.user_id, "AROAEXAMPLE:user");
        assert!(identity.arn.ends_with("assumed-role/Admin/user"));
    }

    #[tokio::test]
    async fn test_get_caller_identity_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(xml(
                403,
                r#"<ErrorResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <Error>
    <Type>Sender</Type>
    <Code>InvalidClientTokenId</Code>
    <Message>The security token included in the request is invalid.</Message>
  </Error>
  <RequestId>req-2</RequestId>
</ErrorResponse>"#,
            ))
            .mount(&server)
            .await;

        match client_for(&server).get_caller_identity(&credentials()).await {
            Err(IssuerError::Service {
                status,
                code,
                message,
                ..
            }) => {
                assert_eq!(status, 403);
                assert_eq!(code, "InvalidClientTokenId");
                assert!(message.unwrap().contains("security token"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_caller_identity_serializes_like_aws() {
        let identity = CallerIdentity {
            user_id: "AIDAEXAMPLE".to_string(),
            account: "123456789012".to_string(),
            arn: "arn:aws:iam::123456789012:user/dev".to_string(),
        };
        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["Account"], "123456789012");
        assert_eq!(value["UserId"], "AIDAEXAMPLE");
    }
}
