//! Disc identity from `CERTIFICATE/id.bdmv`.

use std::path::{Path, PathBuf};

use crate::error::BridgeError;

const SIGNATURE: &[u8; 4] = b"BDID";
const VERSIONS: [&[u8; 4]; 2] = [b"0100", b"0200"];

const ORG_ID_OFFSET: usize = 40;
const ORG_ID_LEN: usize = 4;
const DISC_ID_OFFSET: usize = ORG_ID_OFFSET + ORG_ID_LEN;
const DISC_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscIdentity {
    /// 8 uppercase hex digits.
    pub org_id: String,
    /// 32 uppercase hex digits.
    pub disc_id: String,
}

impl DiscIdentity {
    /// Disc id reported when the disc carries no readable identity.
    pub const ZERO_DISC_ID: &'static str = "00000000000000000000000000000000";

    pub fn path_for(disc_root: &Path) -> PathBuf {
        disc_root.join("CERTIFICATE").join("id.bdmv")
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, BridgeError> {
        if bytes.len() < 8 {
            return Err(BridgeError::InvalidIdentity(format!(
                "header truncated ({} bytes)",
                bytes.len()
            )));
        }
        if &bytes[0..4] != SIGNATURE {
            return Err(BridgeError::InvalidIdentity("bad signature".into()));
        }
        if !VERSIONS.iter().any(|v| &bytes[4..8] == *v) {
            return Err(BridgeError::InvalidIdentity(format!(
                "unsupported version {:?}",
                String::from_utf8_lossy(&bytes[4..8])
            )));
        }

        let end = DISC_ID_OFFSET + DISC_ID_LEN;
        if bytes.len() < end {
            return Err(BridgeError::InvalidIdentity(format!(
                "file truncated ({} of {end} bytes)",
                bytes.len()
            )));
        }

        Ok(Self {
            org_id: hex::encode_upper(&bytes[ORG_ID_OFFSET..DISC_ID_OFFSET]),
            disc_id: hex::encode_upper(&bytes[DISC_ID_OFFSET..end]),
        })
    }

    pub fn read(disc_root: &Path) -> Result<Self, BridgeError> {
        let bytes = std::fs::read(Self::path_for(disc_root))?;
        Self::parse(&bytes)
    }

    /// The disc id to hand to the hosted program: the parsed id, or
    /// [`Self::ZERO_DISC_ID`] when the file is missing or unreadable.
    pub fn disc_id_or_zero(disc_root: &Path) -> String {
        match Self::read(disc_root) {
            Ok(id) => id.disc_id,
            Err(e) => {
                tracing::debug!(disc_root = %disc_root.display(), "No disc identity: {e}");
                Self::ZERO_DISC_ID.to_string()
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn encode(version: &[u8; 4], org_id: [u8; 4], disc_id: [u8; 16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(DISC_ID_OFFSET + DISC_ID_LEN);
    bytes.extend_from_slice(SIGNATURE);
    bytes.extend_from_slice(version);
    bytes.extend_from_slice(&(DISC_ID_OFFSET as u32 + DISC_ID_LEN as u32).to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.resize(ORG_ID_OFFSET, 0);
    bytes.extend_from_slice(&org_id);
    bytes.extend_from_slice(&disc_id);
    bytes
}
