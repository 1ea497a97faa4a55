//! Self-describing peer addresses.
//!
//! Text form: `/btle/<uuid>[/<protocol>/<address>...][/<major.minor.patch>]`.
//! Binary form: `varuint(code) ‖ address bytes` per segment. The trailing
//! version only exists in the text form.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::WireError;
use crate::semver::SemanticVersion;
use crate::varint;

/// One addressing segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// A Bluetooth LE peripheral, identified by its UUID.
    Bluetooth(Uuid),
}

impl Protocol {
    pub const BLUETOOTH_CODE: u64 = 150;
    pub const BLUETOOTH_NAME: &'static str = "btle";

    pub fn code(&self) -> u64 {
        match self {
            Protocol::Bluetooth(_) => Self::BLUETOOTH_CODE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Bluetooth(_) => Self::BLUETOOTH_NAME,
        }
    }

    fn write_bytes(&self, buf: &mut Vec<u8>) {
        varint::encode_into(self.code(), buf);
        match self {
            Protocol::Bluetooth(uuid) => buf.extend_from_slice(uuid.as_bytes()),
        }
    }

    /// Parse the segment starting at the front of `bytes`, returning it and
    /// the number of bytes consumed.
    fn read_bytes(bytes: &[u8]) -> Result<(Self, usize), WireError> {
        let (code, mut used) = varint::decode(bytes)?;
        match code {
            Self::BLUETOOTH_CODE => {
                let address: [u8; 16] = bytes
                    .get(used..used + 16)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| {
                        WireError::InvalidMultiaddr("truncated btle address".into())
                    })?;
                used += 16;
                Ok((Protocol::Bluetooth(Uuid::from_bytes(address)), used))
            }
            other => Err(WireError::UnknownProtocol(other)),
        }
    }

    /// Parse `address` as the address of protocol `name`. `None` when `name`
    /// is not a protocol.
    fn parse(name: &str, address: Option<&str>) -> Option<Result<Self, WireError>> {
        match name {
            Self::BLUETOOTH_NAME => Some(
                address
                    .ok_or_else(|| WireError::InvalidMultiaddr("btle requires an address".into()))
                    .and_then(|a| {
                        Uuid::parse_str(a).map_err(|e| WireError::InvalidUuid(format!("{a}: {e}")))
                    })
                    .map(Protocol::Bluetooth),
            ),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Bluetooth(uuid) => write!(f, "/{}/{}", self.name(), uuid.hyphenated()),
        }
    }
}

/// An ordered list of protocol segments with an optional version suffix.
///
/// Always holds at least one segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Multiaddr {
    protocols: Vec<Protocol>,
    version: Option<SemanticVersion>,
}

impl Multiaddr {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocols: vec![protocol],
            version: None,
        }
    }

    /// `/btle/<uuid>`.
    pub fn bluetooth(uuid: Uuid) -> Self {
        Self::new(Protocol::Bluetooth(uuid))
    }

    pub fn push(&mut self, protocol: Protocol) {
        self.protocols.push(protocol);
    }

    pub fn with_version(mut self, version: SemanticVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }

    pub fn version(&self) -> Option<SemanticVersion> {
        self.version
    }

    /// UUID of the first Bluetooth segment.
    pub fn bluetooth_uuid(&self) -> Option<Uuid> {
        self.protocols.iter().find_map(|p| match p {
            Protocol::Bluetooth(uuid) => Some(*uuid),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.protocols.len() * 18);
        for protocol in &self.protocols {
            protocol.write_bytes(&mut buf);
        }
        buf
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, WireError> {
        let mut protocols = Vec::new();
        while !bytes.is_empty() {
            let (protocol, used) = Protocol::read_bytes(bytes)?;
            protocols.push(protocol);
            bytes = &bytes[used..];
        }
        if protocols.is_empty() {
            return Err(WireError::InvalidMultiaddr("no protocol segment".into()));
        }
        Ok(Self {
            protocols,
            version: None,
        })
    }
}

impl FromStr for Multiaddr {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split('/').filter(|t| !t.is_empty()).collect();
        let mut protocols = Vec::new();
        let mut version = None;

        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            if let Some(protocol) = Protocol::parse(token, tokens.get(i + 1).copied()) {
                protocols.push(protocol?);
                i += 2;
            } else if i + 1 == tokens.len() {
                version = Some(token.parse::<SemanticVersion>().map_err(|_| {
                    WireError::InvalidMultiaddr(format!("unknown protocol or version {token:?}"))
                })?);
                i += 1;
            } else {
                return Err(WireError::InvalidMultiaddr(format!(
                    "{token:?} is not a protocol and not the final token"
                )));
            }
        }

        if protocols.is_empty() {
            return Err(WireError::InvalidMultiaddr(format!("{s:?} has no protocol segment")));
        }
        Ok(Self { protocols, version })
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for protocol in &self.protocols {
            write!(f, "{protocol}")?;
        }
        if let Some(version) = &self.version {
            write!(f, "/{version}")?;
        }
        Ok(())
    }
}

impl Serialize for Multiaddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Multiaddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
