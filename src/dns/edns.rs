//! EDNS(0) OPT pseudo-record support (RFC 6891)
//!
//! [`OptWriter`] appends a single OPT record to the additional section
//! and fills it with options; [`OptionIter`] walks the options inside a
//! received OPT record's rdata.

use std::net::IpAddr;

use crate::dns::message::Message;
use crate::dns::records::RecordRef;
use crate::dns::types::Type;
use crate::{Error, Result};

/// Advertised UDP payload size, per the DNS Flag Day 2020 recommendation
pub const UDP_PAYLOAD_SIZE: u16 = 1232;

/// EDNS option code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionCode {
    /// Client subnet (RFC 7871)
    Subnet,
    /// DNS cookie (RFC 7873)
    Cookie,
    /// Message padding (RFC 7830)
    Padding,
    /// Unknown or unsupported option code
    Unknown(u16),
}

impl OptionCode {
    /// Create an OptionCode from a u16 value
    pub fn from_u16(value: u16) -> Self {
        match value {
            8 => OptionCode::Subnet,
            10 => OptionCode::Cookie,
            12 => OptionCode::Padding,
            _ => OptionCode::Unknown(value),
        }
    }

    /// Convert OptionCode to its u16 wire value
    pub fn to_u16(self) -> u16 {
        match self {
            OptionCode::Subnet => 8,
            OptionCode::Cookie => 10,
            OptionCode::Padding => 12,
            OptionCode::Unknown(v) => v,
        }
    }
}

/// A borrowed view of one EDNS option
#[derive(Debug, Clone, Copy)]
pub struct OptionRef<'a> {
    /// Option code
    pub code: OptionCode,
    /// Option payload, pointing into the message buffer
    pub data: &'a [u8],
}

/// Cursor over the options inside an OPT record's rdata
///
/// The first malformed option yields `Err(InvalidOption)` and ends the
/// iteration.
#[derive(Debug)]
pub struct OptionIter<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> OptionIter<'a> {
    /// Iterate the options encoded in `rdata`
    pub fn new(rdata: &'a [u8]) -> Self {
        OptionIter {
            data: rdata,
            pos: 0,
            failed: false,
        }
    }

    fn parse_next(&mut self) -> Result<OptionRef<'a>> {
        let head = self
            .data
            .get(self.pos..self.pos + 4)
            .ok_or(Error::InvalidOption)?;
        let code = OptionCode::from_u16(u16::from_be_bytes([head[0], head[1]]));
        let len = u16::from_be_bytes([head[2], head[3]]) as usize;
        let start = self.pos + 4;
        let data = self
            .data
            .get(start..start + len)
            .ok_or(Error::InvalidOption)?;
        self.pos = start + len;
        Ok(OptionRef { code, data })
    }
}

impl<'a> Iterator for OptionIter<'a> {
    type Item = Result<OptionRef<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        match self.parse_next() {
            Ok(opt) => Some(Ok(opt)),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl<'a> RecordRef<'a> {
    /// Iterate the EDNS options of an OPT record
    pub fn options(&self) -> OptionIter<'a> {
        OptionIter::new(self.rdata)
    }
}

/// Appends an OPT pseudo-record and its options to a message
///
/// The OPT record is created lazily by the first appended option, with a
/// root owner name, an advertised payload size of [`UDP_PAYLOAD_SIZE`]
/// and a zero extended header, and ARCOUNT is bumped both in the parsed
/// header and in the wire bytes. The record must stay the last thing in
/// the message; append answers first, options last.
#[derive(Debug)]
pub struct OptWriter<'a> {
    msg: &'a mut Message,
    rdlen_offset: Option<usize>,
}

impl<'a> OptWriter<'a> {
    /// Append the empty OPT record if this writer has not done so yet,
    /// returning the offset of its RDLENGTH field.
    fn ensure_opt(&mut self) -> usize {
        if let Some(off) = self.rdlen_offset {
            return off;
        }
        let raw = &mut self.msg.raw;
        raw.push(0); // root owner name
        raw.extend_from_slice(&Type::OPT.to_u16().to_be_bytes());
        raw.extend_from_slice(&UDP_PAYLOAD_SIZE.to_be_bytes());
        raw.extend_from_slice(&[0, 0, 0, 0]); // ext-rcode, version, flags
        let off = raw.len();
        raw.extend_from_slice(&[0, 0]);

        self.msg.header.arcount += 1;
        let arcount = self.msg.header.arcount;
        self.msg.raw[10..12].copy_from_slice(&arcount.to_be_bytes());

        self.rdlen_offset = Some(off);
        off
    }

    fn append_option(&mut self, code: OptionCode, data: &[u8]) {
        let off = self.ensure_opt();
        let raw = &mut self.msg.raw;
        raw.extend_from_slice(&code.to_u16().to_be_bytes());
        raw.extend_from_slice(&(data.len() as u16).to_be_bytes());
        raw.extend_from_slice(data);
        // The OPT rdata runs to the end of the message.
        let rdlen = (raw.len() - off - 2) as u16;
        raw[off..off + 2].copy_from_slice(&rdlen.to_be_bytes());
    }

    /// Append a client-subnet option for `addr`, truncated to
    /// `prefix_len` bits
    ///
    /// Only the bytes covered by the prefix are transmitted, and unused
    /// bits of the final byte are cleared, as RFC 7871 requires. Scope
    /// prefix length is always zero.
    pub fn append_subnet(&mut self, addr: IpAddr, prefix_len: u8) -> &mut Self {
        let v4_octets;
        let v6_octets;
        let (family, octets): (u16, &[u8]) = match addr {
            IpAddr::V4(v4) => {
                v4_octets = v4.octets();
                (1, &v4_octets[..])
            }
            IpAddr::V6(v6) => {
                v6_octets = v6.octets();
                (2, &v6_octets[..])
            }
        };
        let max_bits = (octets.len() * 8) as u8;
        let bits = prefix_len.min(max_bits);
        let alen = (bits as usize + 7) / 8;

        let mut data = Vec::with_capacity(4 + alen);
        data.extend_from_slice(&family.to_be_bytes());
        data.push(bits);
        data.push(0); // scope prefix length
        data.extend_from_slice(&octets[..alen]);
        if bits % 8 != 0 {
            if let Some(last) = data.last_mut() {
                *last &= 0xFFu8 << (8 - bits % 8);
            }
        }
        self.append_option(OptionCode::Subnet, &data);
        self
    }

    /// Append a DNS cookie option
    pub fn append_cookie(&mut self, cookie: &[u8]) -> &mut Self {
        self.append_option(OptionCode::Cookie, cookie);
        self
    }

    /// Append a padding option rounding the message up to a multiple of
    /// `block` bytes
    ///
    /// The four bytes of the option header count towards the padded
    /// length, so a message that is already one header short of a block
    /// boundary gets an empty padding option. A zero block is a no-op.
    pub fn append_padding(&mut self, block: usize) -> &mut Self {
        if block == 0 {
            return self;
        }
        self.ensure_opt();
        let pad = (block - (self.msg.raw.len() + 4) % block) % block;
        self.append_option(OptionCode::Padding, &vec![0u8; pad]);
        self
    }
}

impl Message {
    /// Start appending an OPT pseudo-record to this message
    pub fn opt_writer(&mut self) -> OptWriter<'_> {
        OptWriter {
            msg: self,
            rdlen_offset: None,
        }
    }
}
