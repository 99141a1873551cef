use serde::{Deserialize, Serialize};

/// Which server process the capture layer is attached to.
///
/// The role picks the file-name tag and the opt-out discriminator: inter-server
/// links open with a fixed 2-byte packet id, and those links are never captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    Login,
    Char,
    #[default]
    Map,
}

impl ServerRole {
    pub fn tag(self) -> &'static str {
        match self {
            ServerRole::Login => "login",
            ServerRole::Char => "char",
            ServerRole::Map => "map",
        }
    }

    /// First inbound packet id that permanently disables capture for a connection.
    pub fn opt_out_code(self) -> Option<u16> {
        match self {
            // char server logging into the login server
            ServerRole::Login => Some(0x2710),
            // map server logging into the char server
            ServerRole::Char => Some(0x2af8),
            ServerRole::Map => None,
        }
    }

    /// Only the map server sees the account authentication event.
    pub fn tags_accounts(self) -> bool {
        matches!(self, ServerRole::Map)
    }
}
