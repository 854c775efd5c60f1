//! AWS IAM Identity Center (SSO) device authorization login
//!
//! - `issuer`: the OIDC and portal endpoints behind a trait
//! - `flow`: the register / authorize / poll / exchange state machine

pub mod error;
pub mod flow;
pub mod issuer;
pub mod types;

pub use error::LoginError;
pub use flow::{DeviceAuthLoginFlow, Presenter};
pub use issuer::SsoOidcClient;
