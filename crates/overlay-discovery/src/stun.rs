//! STUN Binding codec (RFC 5389)
//!
//! Only the subset the overlay needs: building Binding requests, recognising
//! STUN datagrams that share a socket with sealed overlay traffic, and pulling
//! the server reflexive address out of a Binding success response.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;

/// STUN magic cookie (0x2112A442)
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

/// STUN message header size (20 bytes)
pub const HEADER_SIZE: usize = 20;

const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const ATTR_SOFTWARE: u16 = 0x8022;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// STUN message class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunMessageClass {
    /// Request message
    Request,
    /// Success response
    SuccessResponse,
    /// Error response
    ErrorResponse,
    /// Indication (no response expected)
    Indication,
}

/// STUN message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunMessageType {
    /// Binding request/response
    Binding,
}

impl StunMessageType {
    /// Encode method and class into the 16-bit message type field.
    ///
    /// RFC 5389 Section 6 encoding:
    /// ```text
    ///  0                 1
    ///  2  3  4 5 6 7 8 9 0 1 2 3 4 5
    /// +--+--+-+-+-+-+-+-+-+-+-+-+-+-+
    /// |M |M |M|M|M|C|M|M|M|C|M|M|M|M|
    /// |11|10|9|8|7|1|6|5|4|0|3|2|1|0|
    /// +--+--+-+-+-+-+-+-+-+-+-+-+-+-+
    /// ```
    fn encode(self, class: StunMessageClass) -> u16 {
        let method: u16 = match self {
            Self::Binding => 0x0001,
        };
        let class_bits: u16 = match class {
            StunMessageClass::Request => 0b00,
            StunMessageClass::Indication => 0b01,
            StunMessageClass::SuccessResponse => 0b10,
            StunMessageClass::ErrorResponse => 0b11,
        };

        (method & 0x0F)
            | ((class_bits & 0x01) << 4)
            | ((method & 0x70) << 1)
            | ((class_bits & 0x02) << 7)
            | ((method & 0xF80) << 2)
    }

    fn decode(msg_type: u16) -> Result<(Self, StunMessageClass), StunError> {
        let class_bits = ((msg_type >> 4) & 0x01) | (((msg_type >> 8) & 0x01) << 1);
        let class = match class_bits {
            0b00 => StunMessageClass::Request,
            0b01 => StunMessageClass::Indication,
            0b10 => StunMessageClass::SuccessResponse,
            _ => StunMessageClass::ErrorResponse,
        };

        let method = (msg_type & 0x0F) | ((msg_type >> 1) & 0x70) | ((msg_type >> 2) & 0xF80);
        match method {
            0x0001 => Ok((Self::Binding, class)),
            other => Err(StunError::UnsupportedMethod(other)),
        }
    }
}

/// STUN attribute types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StunAttribute {
    /// Mapped address (0x0001), sent by RFC 3489 servers
    MappedAddress(SocketAddr),
    /// XOR-Mapped address (0x0020), preferred over MAPPED-ADDRESS
    XorMappedAddress(SocketAddr),
    /// Software identifier (0x8022)
    Software(String),
    /// Any other attribute, kept verbatim
    Unknown(u16, Vec<u8>),
}

impl StunAttribute {
    fn attr_type(&self) -> u16 {
        match self {
            Self::MappedAddress(_) => ATTR_MAPPED_ADDRESS,
            Self::XorMappedAddress(_) => ATTR_XOR_MAPPED_ADDRESS,
            Self::Software(_) => ATTR_SOFTWARE,
            Self::Unknown(t, _) => *t,
        }
    }

    fn encode(&self, transaction_id: &[u8; 12], out: &mut Vec<u8>) {
        let value = match self {
            Self::MappedAddress(addr) => encode_address(*addr, None),
            Self::XorMappedAddress(addr) => encode_address(*addr, Some(transaction_id)),
            Self::Software(s) => s.as_bytes().to_vec(),
            Self::Unknown(_, data) => data.clone(),
        };

        out.extend_from_slice(&self.attr_type().to_be_bytes());
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
        out.extend_from_slice(&value);
        // Pad to 4-byte boundary
        out.extend(std::iter::repeat_n(0, (4 - value.len() % 4) % 4));
    }

    fn decode(attr_type: u16, value: &[u8], transaction_id: &[u8; 12]) -> Result<Self, StunError> {
        match attr_type {
            ATTR_MAPPED_ADDRESS => decode_address(value, None).map(Self::MappedAddress),
            ATTR_XOR_MAPPED_ADDRESS => {
                decode_address(value, Some(transaction_id)).map(Self::XorMappedAddress)
            }
            ATTR_SOFTWARE => Ok(Self::Software(String::from_utf8_lossy(value).into_owned())),
            _ => Ok(Self::Unknown(attr_type, value.to_vec())),
        }
    }
}

// The XOR key is the magic cookie, followed by the transaction ID for IPv6.
fn xor_key(transaction_id: &[u8; 12]) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    key[4..].copy_from_slice(transaction_id);
    key
}

fn encode_address(addr: SocketAddr, xor_with: Option<&[u8; 12]>) -> Vec<u8> {
    let key = xor_with.map(xor_key);
    let mut value = vec![0];

    let port = match key {
        Some(_) => addr.port() ^ (MAGIC_COOKIE >> 16) as u16,
        None => addr.port(),
    };

    let octets: Vec<u8> = match addr.ip() {
        IpAddr::V4(ip) => {
            value.push(FAMILY_IPV4);
            ip.octets().to_vec()
        }
        IpAddr::V6(ip) => {
            value.push(FAMILY_IPV6);
            ip.octets().to_vec()
        }
    };
    value.extend_from_slice(&port.to_be_bytes());

    for (i, byte) in octets.iter().enumerate() {
        value.push(key.map_or(*byte, |k| byte ^ k[i]));
    }
    value
}

fn decode_address(value: &[u8], xor_with: Option<&[u8; 12]>) -> Result<SocketAddr, StunError> {
    if value.len() < 4 {
        return Err(StunError::InvalidAttribute);
    }
    let key = xor_with.map(xor_key);
    let family = value[1];
    let mut port = u16::from_be_bytes([value[2], value[3]]);
    if key.is_some() {
        port ^= (MAGIC_COOKIE >> 16) as u16;
    }

    let unxor = |i: usize, b: u8| key.map_or(b, |k| b ^ k[i]);
    let ip = match family {
        FAMILY_IPV4 => {
            let raw: [u8; 4] = value
                .get(4..8)
                .and_then(|s| s.try_into().ok())
                .ok_or(StunError::InvalidAttribute)?;
            let mut octets = [0u8; 4];
            for (i, b) in raw.iter().enumerate() {
                octets[i] = unxor(i, *b);
            }
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        FAMILY_IPV6 => {
            let raw: [u8; 16] = value
                .get(4..20)
                .and_then(|s| s.try_into().ok())
                .ok_or(StunError::InvalidAttribute)?;
            let mut octets = [0u8; 16];
            for (i, b) in raw.iter().enumerate() {
                octets[i] = unxor(i, *b);
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        other => return Err(StunError::UnsupportedFamily(other)),
    };

    Ok(SocketAddr::new(ip, port))
}

/// STUN message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    /// Message type
    pub message_type: StunMessageType,
    /// Message class
    pub message_class: StunMessageClass,
    /// Transaction ID (96 bits)
    pub transaction_id: [u8; 12],
    /// Message attributes
    pub attributes: Vec<StunAttribute>,
}

impl StunMessage {
    /// Create a new Binding request with a random transaction ID.
    #[must_use]
    pub fn binding_request() -> Self {
        use rand::RngCore;
        let mut transaction_id = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut transaction_id);

        Self {
            message_type: StunMessageType::Binding,
            message_class: StunMessageClass::Request,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    /// Binding success response reporting `reflexive` to the requester.
    #[must_use]
    pub fn binding_success(transaction_id: [u8; 12], reflexive: SocketAddr) -> Self {
        Self {
            message_type: StunMessageType::Binding,
            message_class: StunMessageClass::SuccessResponse,
            transaction_id,
            attributes: vec![StunAttribute::XorMappedAddress(reflexive)],
        }
    }

    /// Whether a datagram looks like STUN rather than a sealed overlay message.
    ///
    /// Checks the header length, the two zero leading bits and the magic cookie.
    #[must_use]
    pub fn is_message(bytes: &[u8]) -> bool {
        bytes.len() >= HEADER_SIZE
            && bytes[0] & 0xC0 == 0
            && bytes[4..8] == MAGIC_COOKIE.to_be_bytes()
    }

    /// Encode message to bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + 32);
        bytes.extend_from_slice(&self.message_type.encode(self.message_class).to_be_bytes());
        bytes.extend_from_slice(&[0u8; 2]);
        bytes.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        bytes.extend_from_slice(&self.transaction_id);

        for attr in &self.attributes {
            attr.encode(&self.transaction_id, &mut bytes);
        }

        // Message length excludes the 20-byte header
        let msg_length = (bytes.len() - HEADER_SIZE) as u16;
        bytes[2..4].copy_from_slice(&msg_length.to_be_bytes());
        bytes
    }

    /// Decode message from bytes
    ///
    /// # Errors
    ///
    /// Returns `StunError` if the header is short, the cookie is wrong, the
    /// method is not Binding, or an attribute overruns the message.
    pub fn decode(bytes: &[u8]) -> Result<Self, StunError> {
        if bytes.len() < HEADER_SIZE {
            return Err(StunError::MessageTooShort);
        }

        let msg_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        let msg_length = usize::from(u16::from_be_bytes([bytes[2], bytes[3]]));
        if bytes[4..8] != MAGIC_COOKIE.to_be_bytes() {
            return Err(StunError::InvalidMagicCookie);
        }
        if HEADER_SIZE + msg_length > bytes.len() {
            return Err(StunError::MessageTooShort);
        }

        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&bytes[8..20]);
        let (message_type, message_class) = StunMessageType::decode(msg_type)?;

        let body = &bytes[HEADER_SIZE..HEADER_SIZE + msg_length];
        let mut attributes = Vec::new();
        let mut offset = 0;

        while offset + 4 <= body.len() {
            let attr_type = u16::from_be_bytes([body[offset], body[offset + 1]]);
            let attr_length = usize::from(u16::from_be_bytes([body[offset + 2], body[offset + 3]]));
            offset += 4;

            let value = body
                .get(offset..offset + attr_length)
                .ok_or(StunError::InvalidAttribute)?;
            attributes.push(StunAttribute::decode(attr_type, value, &transaction_id)?);

            offset += attr_length + (4 - attr_length % 4) % 4;
        }

        Ok(Self {
            message_type,
            message_class,
            transaction_id,
            attributes,
        })
    }

    /// Server reflexive address carried by a Binding success response.
    ///
    /// XOR-MAPPED-ADDRESS wins over MAPPED-ADDRESS when both are present.
    ///
    /// # Errors
    ///
    /// Returns [`StunError::ErrorResponse`] for non-success classes and
    /// [`StunError::MissingAttribute`] when no address attribute is present.
    pub fn reflexive_address(&self) -> Result<SocketAddr, StunError> {
        if self.message_class != StunMessageClass::SuccessResponse {
            return Err(StunError::ErrorResponse);
        }

        let xor = self.attributes.iter().find_map(|attr| match attr {
            StunAttribute::XorMappedAddress(addr) => Some(*addr),
            _ => None,
        });
        let plain = || {
            self.attributes.iter().find_map(|attr| match attr {
                StunAttribute::MappedAddress(addr) => Some(*addr),
                _ => None,
            })
        };

        xor.or_else(plain).ok_or(StunError::MissingAttribute)
    }
}

/// STUN error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StunError {
    /// Shorter than the header or the declared length
    #[error("STUN message too short")]
    MessageTooShort,
    /// Invalid magic cookie
    #[error("invalid STUN magic cookie")]
    InvalidMagicCookie,
    /// Method other than Binding
    #[error("unsupported STUN method {0:#06x}")]
    UnsupportedMethod(u16),
    /// Truncated or malformed attribute
    #[error("invalid STUN attribute")]
    InvalidAttribute,
    /// Address attribute with an unknown family
    #[error("unsupported STUN address family {0:#04x}")]
    UnsupportedFamily(u8),
    /// Error response received
    #[error("STUN error response")]
    ErrorResponse,
    /// Missing mapped address attribute
    #[error("missing STUN mapped address")]
    MissingAttribute,
}
