//! Interactive login
//!
//! Runs the code flow against the live network and captures the negotiated
//! authorization as a [`SessionRecord`]. The confirmation code, and the 2FA
//! password when the account has one, are read from stdin.

use std::io::{self, BufRead, Write};

use grammers_client::SignInError;

use crate::client;
use crate::config::ApiCredentials;
use crate::session::SessionRecord;
use crate::{Error, Result};

/// Print a message and read one trimmed line from stdin
pub fn prompt(message: &str) -> Result<String> {
    let mut stdout = io::stdout();
    stdout.write_all(message.as_bytes())?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Sign in with a phone number and return the resulting authorization
pub async fn login(creds: &ApiCredentials, phone: &str) -> Result<SessionRecord> {
    let client = client::connect_new(creds).await?;

    let token = client
        .request_login_code(phone)
        .await
        .map_err(Error::telegram)?;
    let code = prompt("Enter the code sent to your phone: ")?;

    let user = match client.sign_in(&token, &code).await {
        Ok(user) => user,
        Err(SignInError::PasswordRequired(password_token)) => {
            let password = prompt("Enter 2-Step Verification (2FA) password: ")?;
            client
                .check_password(password_token, password)
                .await
                .map_err(|err| Error::auth(err.to_string()))?
        }
        Err(SignInError::InvalidCode) => {
            return Err(Error::auth("the confirmation code was not accepted"));
        }
        Err(SignInError::SignUpRequired { .. }) => {
            return Err(Error::auth("this phone number is not registered"));
        }
        Err(err) => return Err(Error::auth(err.to_string())),
    };

    tracing::info!(user_id = user.id(), "signed in");
    client::record_from_client(&client, user.id())
}
