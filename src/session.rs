//! Canonical session record
//!
//! The format-neutral representation every reader produces and every writer
//! consumes. Holds the fields shared by all supported session formats.

use std::net::{IpAddr, Ipv4Addr};

use crate::{Error, Result, AUTH_KEY_SIZE};

/// Telegram datacenter addresses (production)
const DC_ADDRESSES: [(i32, Ipv4Addr, u16); 5] = [
    (1, Ipv4Addr::new(149, 154, 175, 53), 443),
    (2, Ipv4Addr::new(149, 154, 167, 51), 443),
    (3, Ipv4Addr::new(149, 154, 175, 100), 443),
    (4, Ipv4Addr::new(149, 154, 167, 91), 443),
    (5, Ipv4Addr::new(91, 108, 56, 130), 443),
];

/// Telegram datacenter addresses (test network)
const TEST_DC_ADDRESSES: [(i32, Ipv4Addr, u16); 3] = [
    (1, Ipv4Addr::new(149, 154, 175, 10), 443),
    (2, Ipv4Addr::new(149, 154, 167, 40), 443),
    (3, Ipv4Addr::new(149, 154, 175, 117), 443),
];

/// Look up the address of a datacenter in the known table
pub fn dc_address(dc_id: i32, test_mode: bool) -> Result<(Ipv4Addr, u16)> {
    let table: &[(i32, Ipv4Addr, u16)] = if test_mode {
        &TEST_DC_ADDRESSES
    } else {
        &DC_ADDRESSES
    };

    table
        .iter()
        .find(|(id, _, _)| *id == dc_id)
        .map(|(_, ip, port)| (*ip, *port))
        .ok_or(Error::UnknownDc { dc_id })
}

/// Check whether an address belongs to the test network table
fn is_test_address(addr: &IpAddr) -> bool {
    TEST_DC_ADDRESSES
        .iter()
        .any(|(_, ip, _)| IpAddr::V4(*ip) == *addr)
}

/// A session in its format-neutral form
///
/// Constructed by a reader, consumed by a writer. The auth key is always
/// present; optional fields carry whatever the source format stored.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Datacenter ID (1-5)
    pub dc_id: i32,
    /// Datacenter address the session was bound to
    pub server_address: IpAddr,
    /// Datacenter port
    pub port: u16,
    /// Authorization key (256 bytes)
    pub auth_key: [u8; AUTH_KEY_SIZE],
    /// User ID, present once logged in
    pub user_id: Option<i64>,
    /// Test network flag
    pub test_mode: bool,
    /// API id, when the source format embeds it
    pub api_id: Option<i32>,
    /// Bot account flag
    pub is_bot: bool,
}

impl SessionRecord {
    /// Create a record bound to the production address of `dc_id`
    pub fn new(dc_id: i32, auth_key: [u8; AUTH_KEY_SIZE]) -> Result<Self> {
        let (ip, port) = dc_address(dc_id, false)?;

        Ok(Self {
            dc_id,
            server_address: IpAddr::V4(ip),
            port,
            auth_key,
            user_id: None,
            test_mode: false,
            api_id: None,
            is_bot: false,
        })
    }

    /// Create a record keeping the endpoint the source file stored
    ///
    /// The test flag is inferred from the address table.
    pub fn with_address(
        dc_id: i32,
        server_address: IpAddr,
        port: u16,
        auth_key: [u8; AUTH_KEY_SIZE],
    ) -> Result<Self> {
        // The id must still be a known DC even when the endpoint is custom
        dc_address(dc_id, false)?;

        let test_mode = is_test_address(&server_address);

        Ok(Self {
            dc_id,
            server_address,
            port,
            auth_key,
            user_id: None,
            test_mode,
            api_id: None,
            is_bot: false,
        })
    }

    /// Convert to grammers SessionData
    ///
    /// Returns session data that can be imported into a grammers session for
    /// validation or login continuation.
    pub fn to_session_data(&self) -> grammers_session::SessionData {
        use grammers_session::{defs::DcOption, SessionData};
        use std::net::{SocketAddrV4, SocketAddrV6};

        let (table_ip, table_port) =
            dc_address(self.dc_id, self.test_mode).unwrap_or((Ipv4Addr::new(149, 154, 167, 51), 443));

        // Prefer the endpoint stored in the record over the table entry
        let (ipv4, port) = match self.server_address {
            IpAddr::V4(ip) => (ip, self.port),
            IpAddr::V6(_) => (table_ip, table_port),
        };
        let ipv6 = match self.server_address {
            IpAddr::V6(ip) => SocketAddrV6::new(ip, self.port, 0, 0),
            IpAddr::V4(ip) => SocketAddrV6::new(ip.to_ipv6_mapped(), port, 0, 0),
        };

        let mut session_data = SessionData {
            home_dc: self.dc_id,
            ..SessionData::default()
        };

        if let Some(dc_option) = session_data.dc_options.get_mut(&self.dc_id) {
            dc_option.auth_key = Some(self.auth_key);
        } else {
            session_data.dc_options.insert(
                self.dc_id,
                DcOption {
                    id: self.dc_id,
                    ipv4: SocketAddrV4::new(ipv4, port),
                    ipv6,
                    auth_key: Some(self.auth_key),
                },
            );
        }

        session_data
    }
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose the auth key in debug output
        f.debug_struct("SessionRecord")
            .field("dc_id", &self.dc_id)
            .field("server_address", &self.server_address)
            .field("port", &self.port)
            .field("auth_key_len", &self.auth_key.len())
            .field("user_id", &self.user_id)
            .field("test_mode", &self.test_mode)
            .field("api_id", &self.api_id)
            .field("is_bot", &self.is_bot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_uses_production_address_table() {
        let record = SessionRecord::new(2, [0xAB; AUTH_KEY_SIZE]).unwrap();

        assert_eq!(record.dc_id, 2);
        assert_eq!(
            record.server_address,
            IpAddr::V4(Ipv4Addr::new(149, 154, 167, 51))
        );
        assert_eq!(record.port, 443);
        assert!(!record.test_mode);
        assert_eq!(record.user_id, None);
    }

    #[test]
    fn unknown_dc_is_rejected() {
        assert!(matches!(
            SessionRecord::new(9, [0u8; AUTH_KEY_SIZE]),
            Err(Error::UnknownDc { dc_id: 9 })
        ));
        assert!(matches!(
            SessionRecord::new(0, [0u8; AUTH_KEY_SIZE]),
            Err(Error::UnknownDc { dc_id: 0 })
        ));
    }

    #[test]
    fn test_network_address_sets_test_flag() {
        let addr = IpAddr::V4(Ipv4Addr::new(149, 154, 167, 40));
        let record = SessionRecord::with_address(2, addr, 443, [1u8; AUTH_KEY_SIZE]).unwrap();
        assert!(record.test_mode);

        let prod = IpAddr::V4(Ipv4Addr::new(149, 154, 167, 51));
        let record = SessionRecord::with_address(2, prod, 443, [1u8; AUTH_KEY_SIZE]).unwrap();
        assert!(!record.test_mode);
    }

    #[test]
    fn session_data_carries_home_dc_and_key() {
        let key = [0x5C; AUTH_KEY_SIZE];
        let record = SessionRecord::new(4, key).unwrap();
        let data = record.to_session_data();

        assert_eq!(data.home_dc, 4);
        let option = data.dc_options.get(&4).expect("dc option for home dc");
        assert_eq!(option.auth_key, Some(key));
    }

    #[test]
    fn debug_output_hides_auth_key() {
        let record = SessionRecord::new(1, [0x77; AUTH_KEY_SIZE]).unwrap();
        let out = format!("{record:?}");
        assert!(out.contains("auth_key_len"));
        assert!(!out.contains("77, 77"));
    }
}
