mod aws;
mod http_client;
mod menu;
mod model;
mod sso;

use std::io::{self, Write};
use std::process;

use aws::profile::{AwsConfigFile, Profile};
use aws::sts::{CallerIdentity, IdentityVerifier, StsClient};
use clap::Parser;
use model::arg::Args;
use model::config::Config;
use sso::types::RoleCredentials;
use sso::{DeviceAuthLoginFlow, LoginError, Presenter, SsoOidcClient};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // Logs go to stderr; stdout carries results
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| Config::default_config_path().to_string());
    let mut config = Config::load(&config_path).unwrap_or_else(|e| {
        tracing::error!("Failed to load config: {:#}", e);
        process::exit(2);
    });
    args.apply_to(&mut config);

    let aws_config_path = config.aws_config_path();
    let aws_config = AwsConfigFile::load(&aws_config_path, &config.aws_credentials_path())
        .await
        .unwrap_or_else(|e| {
            tracing::error!("{:#}", e);
            process::exit(2);
        });
    if aws_config.is_empty() {
        tracing::error!("No profiles found in {}", aws_config_path.display());
        process::exit(1);
    }

    let summaries = aws_config.summaries();
    if args.list {
        for item in &summaries {
            println!("{}\t{}\t{}", item.name, item.account, item.role);
        }
        return;
    }

    let selected = match args.profile.clone() {
        Some(name) => name,
        None => {
            let mut err = io::stderr();
            let chosen = menu::print_menu(&summaries, &mut err)
                .and_then(|_| menu::choose_profile(&summaries, &mut io::stdin().lock(), &mut err));
            match chosen {
                Ok(Some(name)) => name,
                Ok(None) => {
                    eprintln!("No profile selected, exiting.");
                    return;
                }
                Err(e) => {
                    tracing::error!("Failed to read selection: {}", e);
                    process::exit(1);
                }
            }
        }
    };

    let Some(profile) = aws_config.profile(&selected) else {
        tracing::error!("Profile '{}' not found in {}", selected, aws_config_path.display());
        process::exit(1);
    };
    eprintln!("Selected profile: {}", selected);

    let code = if profile.is_sso() {
        tracing::info!("Detected SSO profile, starting device authorization");
        sso_login(&config, &aws_config, profile, args.export).await
    } else {
        tracing::info!("Profile is not SSO-configured, verifying its credentials");
        check_static_profile(&config, profile).await
    };
    process::exit(code);
}

/// Log in through SSO, print the credentials and verify them
async fn sso_login(
    config: &Config,
    aws_config: &AwsConfigFile,
    profile: &Profile,
    export: bool,
) -> i32 {
    let identity = aws_config.resolve_identity(profile);
    let settings = config.http_settings();

    let issuer = match SsoOidcClient::new(&identity.region, &settings) {
        Ok(client) => client.with_endpoints(
            config.oidc_endpoint.as_deref(),
            config.portal_endpoint.as_deref(),
        ),
        Err(e) => {
            tracing::error!("{}", e);
            return LoginError::Registration(e).exit_code();
        }
    };

    tracing::debug!("Using SSO region {}", issuer.region());

    let mut flow = DeviceAuthLoginFlow::new(
        &issuer,
        config.client_name.as_str(),
        Presenter::new(config.open_browser),
    );
    let credentials = match flow.login(&identity).await {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::error!("{}", e);
            tracing::debug!("Login ended in state {:?}", flow.state());
            return e.exit_code();
        }
    };

    if export {
        print_exports(&credentials);
    } else {
        eprintln!(
            "Obtained temporary role credentials (access key {}{})",
            credentials.access_key_id,
            credentials
                .expiration
                .map(|t| format!(", expires {}", t.to_rfc3339()))
                .unwrap_or_default()
        );
    }

    if !config.verify {
        return 0;
    }

    eprintln!("Verifying identity...");
    let region = profile.region().unwrap_or(&identity.region);
    let sts = StsClient::new(region, &settings).with_endpoint(config.sts_endpoint.as_deref());
    match flow.verify(&sts, &credentials).await {
        Ok(caller) => {
            print_identity(&caller);
            eprintln!("SSO login and verification succeeded.");
            0
        }
        Err(e) if !e.is_fatal() => {
            tracing::warn!("{}; the credentials were still issued", e);
            e.exit_code()
        }
        Err(e) => {
            tracing::error!("{}", e);
            e.exit_code()
        }
    }
}

/// Verify a non-SSO profile's static credentials
async fn check_static_profile(config: &Config, profile: &Profile) -> i32 {
    let Some(credentials) = profile.static_credentials() else {
        eprintln!("No credentials available for profile.");
        return print_configure_hint(&profile.name);
    };

    let region = profile.region().unwrap_or(&config.default_region);
    let result = StsClient::new(region, &config.http_settings())
        .with_endpoint(config.sts_endpoint.as_deref())
        .get_caller_identity(&credentials)
        .await;

    match result {
        Ok(caller) => {
            print_identity(&caller);
            eprintln!("Profile appears valid and working.");
            0
        }
        Err(e) => {
            tracing::error!("{}", e);
            print_configure_hint(&profile.name)
        }
    }
}

fn print_configure_hint(profile: &str) -> i32 {
    eprintln!("Profile is not logged in or credentials are missing. To configure SSO for this profile run:");
    eprintln!("  aws configure sso --profile {}", profile);
    eprintln!("Or configure static credentials with 'aws configure --profile <name>'.");
    1
}

fn print_identity(caller: &CallerIdentity) {
    match serde_json::to_string_pretty(caller) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::warn!("Failed to render caller identity: {}", e),
    }
}

fn print_exports(credentials: &RoleCredentials) {
    let mut out = io::stdout().lock();
    let lines = [
        ("AWS_ACCESS_KEY_ID", credentials.access_key_id.as_str()),
        ("AWS_SECRET_ACCESS_KEY", credentials.secret_access_key.as_str()),
        ("AWS_SESSION_TOKEN", credentials.session_token.as_str()),
        ("AWS_REGION", credentials.region.as_str()),
    ];
    for (name, value) in lines {
        if let Err(e) = writeln!(out, "export {}={}", name, value) {
            tracing::error!("Failed to write credentials: {}", e);
            return;
        }
    }
}
