use std::path::PathBuf;

use clap::Parser;

/// Pick an AWS profile and log in with SSO device authorization
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// AWS CLI config file (default: ~/.aws/config)
    #[arg(long)]
    pub aws_config: Option<PathBuf>,

    /// AWS shared credentials file (default: ~/.aws/credentials)
    #[arg(long)]
    pub aws_credentials: Option<PathBuf>,

    /// Profile to use instead of asking
    #[arg(short, long)]
    pub profile: Option<String>,

    /// List profiles and exit
    #[arg(long)]
    pub list: bool,

    /// Do not try to open a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Skip the STS identity check after login
    #[arg(long)]
    pub no_verify: bool,

    /// Print shell export lines for the obtained credentials
    #[arg(long)]
    pub export: bool,
}

impl Args {
    /// Let command line flags override file configuration
    pub fn apply_to(&self, config: &mut crate::model::config::Config) {
        if let Some(path) = &self.aws_config {
            config.aws_config_path = Some(path.clone());
        }
        if let Some(path) = &self.aws_credentials {
            config.aws_credentials_path = Some(path.clone());
        }
        if self.no_browser {
            config.open_browser = false;
        }
        if self.no_verify {
            config.verify = false;
        }
    }
}
