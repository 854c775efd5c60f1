//! Device-authorization login flow
//!
//! Drives one login attempt through
//! `Registering → AwaitingAuthorization → Polling → Exchanging → Done`,
//! landing in `Failed` on any fatal error.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use tokio::time::Instant;

use crate::aws::sts::{CallerIdentity, IdentityVerifier};

use super::error::{LoginError, TokenErrorCode, TokenExchangeFailure};
use super::issuer::{Issuer, TokenPoll};
use super::types::{
    AccessToken, ClientRegistration, DeviceAuthorization, ProfileIdentity, RoleCredentials,
};

/// Added to the poll interval on every `slow_down`
pub const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Poll interval ceiling
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Where a login attempt currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Registering,
    AwaitingAuthorization,
    Polling,
    Exchanging,
    Done,
    Failed,
}

/// Suspends the flow between token requests
pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Poll interval and deadline for one device authorization
///
/// The interval only grows; it is never reset within an attempt.
#[derive(Debug)]
struct PollSchedule {
    interval: Duration,
    expires_in: Duration,
    started: Instant,
}

impl PollSchedule {
    fn new(interval: Duration, expires_in: Duration, started: Instant) -> Self {
        Self {
            interval,
            expires_in,
            started,
        }
    }

    fn for_authorization(auth: &DeviceAuthorization) -> Self {
        Self::new(auth.interval, auth.expires_in, auth.issued_at)
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Back off after a `slow_down` answer
    fn slow_down(&mut self) {
        let raised = (self.interval + SLOW_DOWN_STEP).min(MAX_POLL_INTERVAL);
        self.interval = self.interval.max(raised);
    }

    fn is_expired(&self) -> bool {
        self.elapsed() > self.expires_in
    }
}

type Launcher = Box<dyn Fn(&str) -> io::Result<()>>;

/// Shows the verification URL and user code, optionally opening a browser
pub struct Presenter {
    open_browser: bool,
    launch: Launcher,
}

impl fmt::Debug for Presenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Presenter")
            .field("open_browser", &self.open_browser)
            .finish_non_exhaustive()
    }
}

impl Presenter {
    pub fn new(open_browser: bool) -> Self {
        Self::with_launcher(open_browser, |uri| open::that_detached(uri))
    }

    pub fn with_launcher(
        open_browser: bool,
        launch: impl Fn(&str) -> io::Result<()> + 'static,
    ) -> Self {
        Self {
            open_browser,
            launch: Box::new(launch),
        }
    }

    /// Write the instructions to `out`, then launch the browser if enabled
    pub fn present<W: Write>(&self, auth: &DeviceAuthorization, out: &mut W) -> io::Result<()> {
        let uri = auth.display_uri();
        writeln!(
            out,
            "Open the following URL in your browser and complete the authentication:"
        )?;
        writeln!(out, "{}", uri)?;
        if !auth.user_code.is_empty() {
            writeln!(out, "Code: {}", auth.user_code)?;
        }
        out.flush()?;

        if self.open_browser {
            if let Err(e) = (self.launch)(uri) {
                tracing::debug!("Could not open browser: {}", e);
            }
        }
        Ok(())
    }
}

/// One device-authorization login attempt against an issuer
pub struct DeviceAuthLoginFlow<'a, I, S = TokioSleeper> {
    issuer: &'a I,
    sleeper: S,
    presenter: Presenter,
    client_name: String,
    state: LoginState,
}

impl<'a, I: Issuer> DeviceAuthLoginFlow<'a, I> {
    pub fn new(issuer: &'a I, client_name: impl Into<String>, presenter: Presenter) -> Self {
        Self::with_sleeper(issuer, client_name, presenter, TokioSleeper)
    }
}

impl<'a, I: Issuer, S: Sleeper> DeviceAuthLoginFlow<'a, I, S> {
    pub fn with_sleeper(
        issuer: &'a I,
        client_name: impl Into<String>,
        presenter: Presenter,
        sleeper: S,
    ) -> Self {
        Self {
            issuer,
            sleeper,
            presenter,
            client_name: client_name.into(),
            state: LoginState::Registering,
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    fn transition(&mut self, next: LoginState) {
        tracing::debug!("Login state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: LoginError) -> LoginError {
        tracing::debug!("Login failed in state {:?}: {}", self.state, err);
        self.state = LoginState::Failed;
        err
    }

    /// Run the whole attempt and return role credentials
    pub async fn login(
        &mut self,
        identity: &ProfileIdentity,
    ) -> Result<RoleCredentials, LoginError> {
        match self.run(identity).await {
            Ok(creds) => {
                self.transition(LoginState::Done);
                Ok(creds)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn run(&mut self, identity: &ProfileIdentity) -> Result<RoleCredentials, LoginError> {
        let missing = identity.missing_fields();
        if !missing.is_empty() {
            return Err(LoginError::MissingConfiguration { missing });
        }

        self.transition(LoginState::Registering);
        let registration = self.register().await?;
        let auth = self
            .start_device_authorization(&registration, &identity.start_url)
            .await?;

        self.transition(LoginState::AwaitingAuthorization);
        self.present_to_user(&auth);

        self.transition(LoginState::Polling);
        let token = self.poll_for_token(&registration, &auth).await?;

        self.transition(LoginState::Exchanging);
        self.exchange_for_role_credentials(&token, &identity.account_id, &identity.role_name)
            .await
    }

    pub async fn register(&self) -> Result<ClientRegistration, LoginError> {
        tracing::info!("Registering OIDC client '{}'", self.client_name);
        self.issuer
            .register_client(&self.client_name)
            .await
            .map_err(LoginError::Registration)
    }

    pub async fn start_device_authorization(
        &self,
        registration: &ClientRegistration,
        start_url: &str,
    ) -> Result<DeviceAuthorization, LoginError> {
        tracing::info!("Starting device authorization for {}", start_url);
        self.issuer
            .start_device_authorization(registration, start_url)
            .await
            .map_err(LoginError::AuthorizationStart)
    }

    pub fn present_to_user(&self, auth: &DeviceAuthorization) {
        if let Err(e) = self.presenter.present(auth, &mut io::stderr()) {
            tracing::debug!("Could not print verification instructions: {}", e);
        }
    }

    /// Poll the token endpoint until the user approves, the code expires,
    /// or the issuer answers with a terminal error
    ///
    /// The deadline counts from when the authorization was issued.
    pub async fn poll_for_token(
        &self,
        registration: &ClientRegistration,
        auth: &DeviceAuthorization,
    ) -> Result<AccessToken, LoginError> {
        let mut schedule = PollSchedule::for_authorization(auth);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let rejection = match self
                .issuer
                .create_token(registration, &auth.device_code)
                .await
            {
                Ok(TokenPoll::Granted(token)) => {
                    tracing::info!("Device authorized after {} token request(s)", attempts);
                    return Ok(token);
                }
                Ok(TokenPoll::Rejected(rejection)) => rejection,
                Err(e) => {
                    return Err(LoginError::TokenExchange(TokenExchangeFailure::Issuer(e)));
                }
            };

            if !rejection.code.is_retryable() {
                return Err(LoginError::TokenExchange(TokenExchangeFailure::Rejected(
                    rejection,
                )));
            }
            if rejection.code == TokenErrorCode::SlowDown {
                schedule.slow_down();
                tracing::info!(
                    "Issuer asked to slow down, poll interval now {}s",
                    schedule.interval().as_secs()
                );
            }

            tracing::debug!(
                "Authorization pending, sleeping {}s",
                schedule.interval().as_secs()
            );
            self.sleeper.sleep(schedule.interval()).await;

            if schedule.is_expired() {
                return Err(LoginError::AuthorizationTimeout {
                    waited: schedule.elapsed(),
                    expires_in: auth.expires_in,
                });
            }
        }
    }

    pub async fn exchange_for_role_credentials(
        &self,
        token: &AccessToken,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredentials, LoginError> {
        tracing::info!("Requesting role credentials for {}/{}", account_id, role_name);
        self.issuer
            .get_role_credentials(token, account_id, role_name)
            .await
            .map_err(LoginError::RoleCredential)
    }

    /// Check the credentials against an identity endpoint
    ///
    /// A failure here leaves the flow in `Done`; the credentials stay valid.
    pub async fn verify<V: IdentityVerifier>(
        &self,
        verifier: &V,
        credentials: &RoleCredentials,
    ) -> Result<CallerIdentity, LoginError> {
        verifier
            .get_caller_identity(&credentials.to_sdk_credentials())
            .await
            .map_err(LoginError::VerificationFailed)
    }
}
