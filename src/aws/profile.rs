//! AWS CLI config and shared credentials files
//!
//! Both files go through aws-config's profile loader, so `[default]`,
//! `[profile NAME]` and `[sso-session NAME]` sections follow the same rules
//! the AWS CLI and SDKs use. Profiles from the credentials file are merged
//! into the ones from the config file.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use aws_config::profile::ProfileSet;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_credential_types::Credentials;
use aws_types::os_shim_internal::{Env, Fs};

use crate::sso::types::{CREDENTIALS_PROVIDER_NAME, ProfileIdentity};

/// Profile keys this tool reads
const PROFILE_KEYS: &[&str] = &[
    "region",
    "sso_session",
    "sso_start_url",
    "sso_starturl",
    "sso_region",
    "sso_account_id",
    "sso_account",
    "sso_role_name",
    "role_name",
    "role_arn",
    "source_profile",
    "aws_access_key_id",
    "aws_secret_access_key",
    "aws_session_token",
];

/// `sso-session` keys a profile can inherit
const SSO_SESSION_KEYS: &[&str] = &["sso_start_url", "sso_region"];

/// Key/value pairs of one section
pub type Properties = BTreeMap<String, String>;

/// One profile, with the keys this tool cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub properties: Properties,
}

impl Profile {
    /// Value of the first non-empty key among `keys`
    pub fn get(&self, keys: &[&str]) -> Option<&str> {
        first_non_empty(&self.properties, keys)
    }

    /// A profile counts as SSO-configured if it has any `sso_` key
    pub fn is_sso(&self) -> bool {
        self.properties.keys().any(|k| k.starts_with("sso_"))
    }

    pub fn region(&self) -> Option<&str> {
        self.get(&["region"])
    }

    pub fn account(&self) -> Option<&str> {
        self.get(&["sso_account_id", "sso_account"])
    }

    pub fn role(&self) -> Option<&str> {
        self.get(&["sso_role_name", "role_name"])
    }

    /// Long-lived keys stored in the profile or the credentials file
    pub fn static_credentials(&self) -> Option<Credentials> {
        Some(Credentials::new(
            self.get(&["aws_access_key_id"])?,
            self.get(&["aws_secret_access_key"])?,
            self.get(&["aws_session_token"]).map(str::to_string),
            None,
            CREDENTIALS_PROVIDER_NAME,
        ))
    }
}

fn first_non_empty<'a>(properties: &'a Properties, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| properties.get(*key))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

/// A row of the profile menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSummary {
    pub name: String,
    pub account: String,
    pub role: String,
}

/// Profiles from `~/.aws/config` and `~/.aws/credentials`
#[derive(Debug, Clone, Default)]
pub struct AwsConfigFile {
    profiles: BTreeMap<String, Profile>,
    sso_sessions: BTreeMap<String, Properties>,
}

impl AwsConfigFile {
    /// Load both files; only the config file has to exist
    pub async fn load(config_path: &Path, credentials_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            bail!("AWS config not found at: {}", config_path.display());
        }

        let files = ProfileFiles::builder()
            .with_file(ProfileFileKind::Config, config_path)
            .with_file(ProfileFileKind::Credentials, credentials_path)
            .build();
        Self::from_files(&Fs::real(), &Env::real(), &files)
            .await
            .with_context(|| format!("Failed to read {}", config_path.display()))
    }

    /// Parse file contents directly, without touching the filesystem
    pub async fn parse(config: &str, credentials: &str) -> anyhow::Result<Self> {
        let files = ProfileFiles::builder()
            .with_contents(ProfileFileKind::Config, config)
            .with_contents(ProfileFileKind::Credentials, credentials)
            .build();
        Self::from_files(&Fs::from_slice(&[]), &Env::from_slice(&[]), &files).await
    }

    async fn from_files(fs: &Fs, env: &Env, files: &ProfileFiles) -> anyhow::Result<Self> {
        let set = aws_config::profile::load(fs, env, files, None).await?;
        Ok(Self::from_profile_set(&set))
    }

    fn from_profile_set(set: &ProfileSet) -> Self {
        let mut config = Self::default();
        for name in set.profiles() {
            let Some(section) = set.get_profile(name) else {
                continue;
            };
            let properties = copy_keys(PROFILE_KEYS, |key| section.get(key));

            if let Some(session) = properties.get("sso_session") {
                match set.sso_session(session) {
                    Some(found) => {
                        config
                            .sso_sessions
                            .entry(session.clone())
                            .or_insert_with(|| copy_keys(SSO_SESSION_KEYS, |key| found.get(key)));
                    }
                    None => tracing::warn!(
                        "Profile '{}' references unknown sso-session '{}'",
                        name,
                        session
                    ),
                }
            }

            config.profiles.insert(
                name.to_string(),
                Profile {
                    name: name.to_string(),
                    properties,
                },
            );
        }
        config
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    /// Menu rows, sorted by profile name
    pub fn summaries(&self) -> Vec<ProfileSummary> {
        self.profiles()
            .map(|profile| ProfileSummary {
                name: profile.name.clone(),
                account: profile.account().unwrap_or("-").to_string(),
                role: profile
                    .get(&["sso_role_name", "role_name", "role_arn"])
                    .unwrap_or("-")
                    .to_string(),
            })
            .collect()
    }

    /// Issuer metadata for a profile, following its `sso_session` reference
    ///
    /// Missing values come back empty; the login flow rejects them.
    pub fn resolve_identity(&self, profile: &Profile) -> ProfileIdentity {
        let session = profile
            .get(&["sso_session"])
            .and_then(|name| self.sso_sessions.get(name));
        let from_session = |keys: &[&str]| session.and_then(|props| first_non_empty(props, keys));

        ProfileIdentity {
            start_url: profile
                .get(&["sso_start_url", "sso_starturl"])
                .or_else(|| from_session(&["sso_start_url"][..]))
                .unwrap_or_default()
                .to_string(),
            region: profile
                .get(&["sso_region"])
                .or_else(|| from_session(&["sso_region"][..]))
                .unwrap_or_default()
                .to_string(),
            account_id: profile.account().unwrap_or_default().to_string(),
            role_name: profile.role().unwrap_or_default().to_string(),
        }
    }
}

fn copy_keys<'a>(keys: &[&str], get: impl Fn(&str) -> Option<&'a str>) -> Properties {
    keys.iter()
        .filter_map(|key| get(key).map(|value| (key.to_string(), value.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# shared settings
[default]
region = us-west-2
output = json

[profile dev]
sso_start_url = https://x.awsapps.com/start
sso_region = us-east-1
sso_account_id = 123456789012
sso_role_name = Admin
region = eu-west-1

[profile ops]
sso_session = corp
sso_account_id = 210987654321
sso_role_name = ReadOnly

[sso-session corp]
sso_start_url = https://corp.awsapps.com/start
sso_region = eu-central-1
sso_registration_scopes = sso:account:access

[profile legacy]
role_arn = arn:aws:iam::111111111111:role/Legacy
source_profile = default
"#;

    async fn sample() -> AwsConfigFile {
        AwsConfigFile::parse(SAMPLE, "").await.unwrap()
    }

    #[tokio::test]
    async fn test_profile_names_strip_prefix() {
        let config = sample().await;
        let names: Vec<&str> = config.profiles().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["default", "dev", "legacy", "ops"]);
    }

    #[tokio::test]
    async fn test_sso_session_is_not_a_profile() {
        let config = sample().await;
        assert!(config.profile("corp").is_none());
        assert!(config.profile("sso-session corp").is_none());
    }

    #[tokio::test]
    async fn test_summaries() {
        let summaries = sample().await.summaries();
        assert_eq!(
            summaries[0],
            ProfileSummary {
                name: "default".to_string(),
                account: "-".to_string(),
                role: "-".to_string(),
            }
        );
        assert_eq!(summaries[1].account, "123456789012");
        assert_eq!(summaries[1].role, "Admin");
        assert_eq!(summaries[2].role, "arn:aws:iam::111111111111:role/Legacy");
    }

    #[tokio::test]
    async fn test_is_sso() {
        let config = sample().await;
        assert!(config.profile("dev").unwrap().is_sso());
        assert!(config.profile("ops").unwrap().is_sso());
        assert!(!config.profile("legacy").unwrap().is_sso());
        assert!(!config.profile("default").unwrap().is_sso());
    }

    #[tokio::test]
    async fn test_resolve_identity_inline() {
        let config = sample().await;
        let identity = config.resolve_identity(config.profile("dev").unwrap());
        assert_eq!(
            identity,
            ProfileIdentity {
                start_url: "https://x.awsapps.com/start".to_string(),
                region: "us-east-1".to_string(),
                account_id: "123456789012".to_string(),
                role_name: "Admin".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_identity_through_sso_session() {
        let config = sample().await;
        let identity = config.resolve_identity(config.profile("ops").unwrap());
        assert_eq!(identity.start_url, "https://corp.awsapps.com/start");
        assert_eq!(identity.region, "eu-central-1");
        assert_eq!(identity.account_id, "210987654321");
        assert_eq!(identity.role_name, "ReadOnly");
        assert!(identity.missing_fields().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_identity_reports_missing() {
        let config = AwsConfigFile::parse(
            "[profile half]\nsso_start_url = https://x.awsapps.com/start\nsso_account = 1\n",
            "",
        )
        .await
        .unwrap();
        let identity = config.resolve_identity(config.profile("half").unwrap());
        assert_eq!(identity.account_id, "1");
        assert_eq!(
            identity.missing_fields(),
            vec!["sso_region", "sso_role_name"]
        );
    }

    #[tokio::test]
    async fn test_load_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AwsConfigFile::load(&dir.path().join("config"), &dir.path().join("credentials"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("AWS config not found at:"));
    }

    #[tokio::test]
    async fn test_load_files_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config");
        let credentials_path = dir.path().join("credentials");
        std::fs::write(&config_path, SAMPLE).unwrap();
        std::fs::write(
            &credentials_path,
            "[legacy]\naws_access_key_id = AKIAFROMFILE\naws_secret_access_key = f\n",
        )
        .unwrap();

        let config = AwsConfigFile::load(&config_path, &credentials_path)
            .await
            .unwrap();
        assert!(config.profile("dev").is_some());
        let creds = config
            .profile("legacy")
            .unwrap()
            .static_credentials()
            .unwrap();
        assert_eq!(creds.access_key_id(), "AKIAFROMFILE");
    }

    #[tokio::test]
    async fn test_missing_credentials_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config");
        std::fs::write(&config_path, SAMPLE).unwrap();

        let config = AwsConfigFile::load(&config_path, &dir.path().join("credentials"))
            .await
            .unwrap();
        assert_eq!(config.profiles().count(), 4);
    }

    #[tokio::test]
    async fn test_static_credentials_from_either_file() {
        let config = AwsConfigFile::parse(
            "[profile static]\nregion = us-east-1\n[profile inline]\naws_access_key_id = AKIAINLINE\naws_secret_access_key = i\n",
            "[static]\naws_access_key_id = AKIAFROMFILE\naws_secret_access_key = f\naws_session_token = t\n",
        )
        .await
        .unwrap();

        let creds = config
            .profile("static")
            .unwrap()
            .static_credentials()
            .unwrap();
        assert_eq!(creds.access_key_id(), "AKIAFROMFILE");
        assert_eq!(creds.session_token(), Some("t"));

        let inline = config
            .profile("inline")
            .unwrap()
            .static_credentials()
            .unwrap();
        assert_eq!(inline.access_key_id(), "AKIAINLINE");
        assert!(inline.session_token().is_none());
    }

    #[tokio::test]
    async fn test_static_credentials_absent() {
        let config = sample().await;
        assert!(
            config
                .profile("legacy")
                .unwrap()
                .static_credentials()
                .is_none()
        );
    }
}
