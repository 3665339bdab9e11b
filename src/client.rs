//! Telegram client assembly
//!
//! The only module that talks to grammers directly for connections, so the
//! session/record bridge lives in one place.

use std::net::IpAddr;

use grammers_client::{Client, Config, InitParams};
use grammers_session::Session;

use crate::config::ApiCredentials;
use crate::session::SessionRecord;
use crate::{Error, Result};

/// Open a client over the record's session
pub async fn connect(record: &SessionRecord, creds: &ApiCredentials) -> Result<Client> {
    connect_with_session(Session::from_data(record.to_session_data()), creds).await
}

/// Open a client over a fresh, unauthorized session
pub async fn connect_new(creds: &ApiCredentials) -> Result<Client> {
    connect_with_session(Session::new(), creds).await
}

async fn connect_with_session(session: Session, creds: &ApiCredentials) -> Result<Client> {
    tracing::debug!(api_id = creds.api_id, "connecting to Telegram");

    Client::connect(Config {
        session,
        api_id: creds.api_id,
        api_hash: creds.api_hash.clone(),
        params: InitParams::default(),
    })
    .await
    .map_err(Error::telegram)
}

/// Extract a canonical record from an authorized client
///
/// Pulls the home DC and its auth key out of the live session state.
pub fn record_from_client(client: &Client, user_id: i64) -> Result<SessionRecord> {
    let data = client.session().data();
    let home_dc = data.home_dc;

    let option = data
        .dc_options
        .get(&home_dc)
        .ok_or(Error::AuthKeyMissing { dc_id: home_dc })?;
    let auth_key = option
        .auth_key
        .ok_or(Error::AuthKeyMissing { dc_id: home_dc })?;

    let mut record = SessionRecord::with_address(
        home_dc,
        IpAddr::V4(*option.ipv4.ip()),
        option.ipv4.port(),
        auth_key,
    )?;
    record.user_id = Some(user_id);
    Ok(record)
}
