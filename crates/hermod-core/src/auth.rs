//! Password login.

use tracing::{debug, info};

use crate::client::ClientFactory;
use crate::error::{AuthenticationError, ClientError, Error};
use crate::types::Credentials;

/// Display name attached to the device registered at login, so the session
/// is recognizable in account device lists.
pub(crate) const LOGIN_DEVICE_NAME: &str = "Hermod bridge";

/// Perform a password-grant login and hand the resulting session back to the
/// caller. Single attempt; every failure is surfaced as-is.
pub(crate) async fn login(
    factory: &dyn ClientFactory,
    homeserver_url: &str,
    username: &str,
    password: &str,
) -> Result<Credentials, Error> {
    debug!(homeserver = homeserver_url, username, "logging in");
    let client = factory
        .create(homeserver_url, None)
        .await
        .map_err(AuthenticationError::ClientConstruction)?;
    let credentials = client
        .login_password(username, password, LOGIN_DEVICE_NAME)
        .await
        .map_err(map_login_error)?;
    info!(
        user_id = %credentials.user_id,
        device_id = %credentials.device_id,
        "login succeeded"
    );
    Ok(credentials)
}

fn map_login_error(error: ClientError) -> AuthenticationError {
    match error {
        rejection @ ClientError::Api { .. } => AuthenticationError::Rejected(rejection),
        other => AuthenticationError::Transport(other),
    }
}
