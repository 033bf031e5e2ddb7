//! DNS protocol type definitions
//!
//! This module defines the core DNS types including:
//! - Record types (A, AAAA, CNAME, etc.)
//! - Record classes (IN, CH, etc.)
//! - Operation codes
//! - Response codes
//! - The packed header flags field

use std::fmt;

/// DNS record type
///
/// Represents the type of DNS record (A, AAAA, CNAME, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// IPv4 address record
    A,
    /// Name server record
    NS,
    /// Canonical name record
    CNAME,
    /// Start of authority record
    SOA,
    /// Pointer record
    PTR,
    /// Mail exchange record
    MX,
    /// Text record
    TXT,
    /// IPv6 address record
    AAAA,
    /// Service record
    SRV,
    /// OPT pseudo-record for EDNS(0) (RFC 6891)
    OPT,
    /// Unknown or unsupported record type
    Unknown(u16),
}

impl Type {
    /// Create a Type from a u16 value
    ///
    /// # Example
    ///
    /// ```
    /// use fastdns::dns::Type;
    ///
    /// assert_eq!(Type::from_u16(1), Type::A);
    /// assert_eq!(Type::from_u16(28), Type::AAAA);
    /// assert_eq!(Type::from_u16(9999), Type::Unknown(9999));
    /// ```
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Type::A,
            2 => Type::NS,
            5 => Type::CNAME,
            6 => Type::SOA,
            12 => Type::PTR,
            15 => Type::MX,
            16 => Type::TXT,
            28 => Type::AAAA,
            33 => Type::SRV,
            41 => Type::OPT,
            _ => Type::Unknown(value),
        }
    }

    /// Convert Type to its u16 wire value
    pub fn to_u16(self) -> u16 {
        match self {
            Type::A => 1,
            Type::NS => 2,
            Type::CNAME => 5,
            Type::SOA => 6,
            Type::PTR => 12,
            Type::MX => 15,
            Type::TXT => 16,
            Type::AAAA => 28,
            Type::SRV => 33,
            Type::OPT => 41,
            Type::Unknown(v) => v,
        }
    }
}

impl Default for Type {
    fn default() -> Self {
        Type::A
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::A => write!(f, "A"),
            Type::NS => write!(f, "NS"),
            Type::CNAME => write!(f, "CNAME"),
            Type::SOA => write!(f, "SOA"),
            Type::PTR => write!(f, "PTR"),
            Type::MX => write!(f, "MX"),
            Type::TXT => write!(f, "TXT"),
            Type::AAAA => write!(f, "AAAA"),
            Type::SRV => write!(f, "SRV"),
            Type::OPT => write!(f, "OPT"),
            Type::Unknown(v) => write!(f, "TYPE{}", v),
        }
    }
}

/// DNS record class
///
/// Represents the class of DNS record (usually IN for Internet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    /// Internet class
    IN,
    /// Chaos class
    CH,
    /// Hesiod class
    HS,
    /// Any class (query meta-class)
    ANY,
    /// Unknown or unsupported class
    Unknown(u16),
}

impl Class {
    /// Create a Class from a u16 value
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Class::IN,
            3 => Class::CH,
            4 => Class::HS,
            255 => Class::ANY,
            _ => Class::Unknown(value),
        }
    }

    /// Convert Class to its u16 wire value
    pub fn to_u16(self) -> u16 {
        match self {
            Class::IN => 1,
            Class::CH => 3,
            Class::HS => 4,
            Class::ANY => 255,
            Class::Unknown(v) => v,
        }
    }
}

impl Default for Class {
    fn default() -> Self {
        Class::IN
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Class::IN => write!(f, "IN"),
            Class::CH => write!(f, "CH"),
            Class::HS => write!(f, "HS"),
            Class::ANY => write!(f, "ANY"),
            Class::Unknown(v) => write!(f, "CLASS{}", v),
        }
    }
}

/// DNS operation code
///
/// Specifies the kind of query in a DNS message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Standard query
    Query,
    /// Inverse query (obsolete)
    IQuery,
    /// Server status request
    Status,
    /// Notify
    Notify,
    /// Update
    Update,
    /// Unknown operation code
    Unknown(u8),
}

impl Opcode {
    /// Create an Opcode from a u8 value
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Opcode::Query,
            1 => Opcode::IQuery,
            2 => Opcode::Status,
            4 => Opcode::Notify,
            5 => Opcode::Update,
            _ => Opcode::Unknown(value),
        }
    }

    /// Convert Opcode to its u8 wire value
    pub fn to_u8(self) -> u8 {
        match self {
            Opcode::Query => 0,
            Opcode::IQuery => 1,
            Opcode::Status => 2,
            Opcode::Notify => 4,
            Opcode::Update => 5,
            Opcode::Unknown(v) => v,
        }
    }
}

/// DNS response code
///
/// Indicates the status of a DNS response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    /// No error
    NoError,
    /// Format error
    FormErr,
    /// Server failure
    ServFail,
    /// Non-existent domain
    NXDomain,
    /// Not implemented
    NotImp,
    /// Query refused
    Refused,
    /// Unknown response code
    Unknown(u8),
}

impl Rcode {
    /// Create an Rcode from a u8 value
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Rcode::NoError,
            1 => Rcode::FormErr,
            2 => Rcode::ServFail,
            3 => Rcode::NXDomain,
            4 => Rcode::NotImp,
            5 => Rcode::Refused,
            _ => Rcode::Unknown(value),
        }
    }

    /// Convert Rcode to its u8 wire value
    pub fn to_u8(self) -> u8 {
        match self {
            Rcode::NoError => 0,
            Rcode::FormErr => 1,
            Rcode::ServFail => 2,
            Rcode::NXDomain => 3,
            Rcode::NotImp => 4,
            Rcode::Refused => 5,
            Rcode::Unknown(v) => v,
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rcode::NoError => write!(f, "NOERROR"),
            Rcode::FormErr => write!(f, "FORMERR"),
            Rcode::ServFail => write!(f, "SERVFAIL"),
            Rcode::NXDomain => write!(f, "NXDOMAIN"),
            Rcode::NotImp => write!(f, "NOTIMP"),
            Rcode::Refused => write!(f, "REFUSED"),
            Rcode::Unknown(v) => write!(f, "RCODE{}", v),
        }
    }
}

/// The 16-bit header flags field
///
/// Packs QR | Opcode(4) | AA | TC | RD | RA | Z(3) | Rcode(4). The packed
/// representation only surfaces at the serialization boundary; all access
/// goes through the typed accessors and mutators below.
///
/// # Example
///
/// ```
/// use fastdns::dns::{Flags, Opcode, Rcode};
///
/// let flags = Flags::default().with_rd(true);
/// assert_eq!(flags.to_u16(), 0x0100);
/// assert!(!flags.qr());
/// assert_eq!(flags.opcode(), Opcode::Query);
/// assert_eq!(flags.rcode(), Rcode::NoError);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags(u16);

impl Flags {
    /// Create Flags from the packed u16 wire value
    pub fn from_u16(value: u16) -> Self {
        Flags(value)
    }

    /// Return the packed u16 wire value
    pub fn to_u16(self) -> u16 {
        self.0
    }

    /// Query/response bit: true for responses
    pub fn qr(self) -> bool {
        self.0 & 0x8000 != 0
    }

    /// Operation code (4 bits)
    pub fn opcode(self) -> Opcode {
        Opcode::from_u8(((self.0 >> 11) & 0x0F) as u8)
    }

    /// Authoritative-answer bit
    pub fn aa(self) -> bool {
        self.0 & 0x0400 != 0
    }

    /// Truncation bit
    pub fn tc(self) -> bool {
        self.0 & 0x0200 != 0
    }

    /// Recursion-desired bit
    pub fn rd(self) -> bool {
        self.0 & 0x0100 != 0
    }

    /// Recursion-available bit
    pub fn ra(self) -> bool {
        self.0 & 0x0080 != 0
    }

    /// Reserved Z field (3 bits)
    pub fn z(self) -> u8 {
        ((self.0 >> 4) & 0x07) as u8
    }

    /// Response code (4 bits)
    pub fn rcode(self) -> Rcode {
        Rcode::from_u8((self.0 & 0x0F) as u8)
    }

    /// Set the query/response bit
    pub fn with_qr(self, qr: bool) -> Self {
        Flags(if qr { self.0 | 0x8000 } else { self.0 & !0x8000 })
    }

    /// Set the operation code
    pub fn with_opcode(self, opcode: Opcode) -> Self {
        Flags((self.0 & !0x7800) | ((opcode.to_u8() as u16 & 0x0F) << 11))
    }

    /// Set the authoritative-answer bit
    pub fn with_aa(self, aa: bool) -> Self {
        Flags(if aa { self.0 | 0x0400 } else { self.0 & !0x0400 })
    }

    /// Set the truncation bit
    pub fn with_tc(self, tc: bool) -> Self {
        Flags(if tc { self.0 | 0x0200 } else { self.0 & !0x0200 })
    }

    /// Set the recursion-desired bit
    pub fn with_rd(self, rd: bool) -> Self {
        Flags(if rd { self.0 | 0x0100 } else { self.0 & !0x0100 })
    }

    /// Set the recursion-available bit
    pub fn with_ra(self, ra: bool) -> Self {
        Flags(if ra { self.0 | 0x0080 } else { self.0 & !0x0080 })
    }

    /// Set the response code
    pub fn with_rcode(self, rcode: Rcode) -> Self {
        Flags((self.0 & !0x000F) | (rcode.to_u8() as u16 & 0x0F))
    }
}
