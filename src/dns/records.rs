//! Resource record iteration and answer encoding
//!
//! [`RecordIter`] walks the answer, authority and additional sections of a
//! parsed message, yielding borrowed [`RecordRef`] views without copying
//! rdata. [`AnswerWriter`] appends records to a response in place, using
//! compression pointers for owner names so a typical answer costs 12 bytes
//! of framing plus its rdata.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::dns::message::{encode_domain, Message, QUESTION_OFFSET};
use crate::dns::types::{Class, Type};
use crate::{Error, Result};

/// A borrowed view of one resource record
///
/// `name` is the raw wire form of the owner name (labels and/or a
/// compression pointer); resolve it with
/// [`Message::decode_name`]. For OPT pseudo-records the class and TTL
/// fields are repurposed by EDNS; use the `udp_payload_size`,
/// `ext_rcode`, `version` and `opt_flags` accessors instead of reading
/// them directly.
#[derive(Debug, Clone, Copy)]
pub struct RecordRef<'a> {
    /// Owner name in wire form, pointing into the message buffer
    pub name: &'a [u8],
    /// Record type
    pub rtype: Type,
    /// Raw class field (EDNS payload size for OPT records)
    pub class: u16,
    /// Raw TTL field (EDNS extended header for OPT records)
    pub ttl: u32,
    /// Record data, pointing into the message buffer
    pub rdata: &'a [u8],
}

impl<'a> RecordRef<'a> {
    /// The class field as a typed [`Class`]
    ///
    /// Meaningless for OPT records, where the field carries the
    /// advertised UDP payload size.
    pub fn rclass(&self) -> Class {
        Class::from_u16(self.class)
    }

    /// EDNS advertised UDP payload size (OPT records only)
    pub fn udp_payload_size(&self) -> u16 {
        self.class
    }

    /// EDNS extended rcode bits (OPT records only)
    pub fn ext_rcode(&self) -> u8 {
        (self.ttl >> 24) as u8
    }

    /// EDNS version (OPT records only)
    pub fn version(&self) -> u8 {
        (self.ttl >> 16) as u8
    }

    /// EDNS flags, DO bit included (OPT records only)
    pub fn opt_flags(&self) -> u16 {
        (self.ttl & 0xFFFF) as u16
    }
}

/// Cursor over the resource records of a parsed message
///
/// Yields records from the answer, authority and additional sections in
/// wire order. The first malformed record yields `Err(InvalidAnswer)`
/// and ends the iteration; a partially-parsed tail is never silently
/// skipped over.
#[derive(Debug)]
pub struct RecordIter<'a> {
    raw: &'a [u8],
    pos: usize,
    remaining: u32,
    failed: bool,
}

impl<'a> RecordIter<'a> {
    fn parse_next(&mut self) -> Result<RecordRef<'a>> {
        let raw = self.raw;

        // Owner name: labels terminated by a zero byte or by a 2-byte
        // compression pointer.
        let name_start = self.pos;
        let mut i = self.pos;
        loop {
            let b = *raw.get(i).ok_or(Error::InvalidAnswer)?;
            if b == 0 {
                i += 1;
                break;
            }
            if b & 0xC0 == 0xC0 {
                if i + 2 > raw.len() {
                    return Err(Error::InvalidAnswer);
                }
                i += 2;
                break;
            }
            if b & 0xC0 != 0 {
                return Err(Error::InvalidAnswer);
            }
            i += 1 + b as usize;
            if i >= raw.len() {
                return Err(Error::InvalidAnswer);
            }
        }
        let name = &raw[name_start..i];

        let fixed = raw.get(i..i + 10).ok_or(Error::InvalidAnswer)?;
        let rtype = Type::from_u16(u16::from_be_bytes([fixed[0], fixed[1]]));
        let class = u16::from_be_bytes([fixed[2], fixed[3]]);
        let ttl = u32::from_be_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
        let rdlen = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;
        i += 10;

        let rdata = raw.get(i..i + rdlen).ok_or(Error::InvalidAnswer)?;
        self.pos = i + rdlen;

        Ok(RecordRef {
            name,
            rtype,
            class,
            ttl,
            rdata,
        })
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<RecordRef<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match self.parse_next() {
            Ok(rec) => Some(Ok(rec)),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Appends resource records onto a response message
///
/// Obtained from [`Message::answer_writer`] after
/// [`Message::set_response_header`] has truncated the message to its
/// question. Owner names are written as compression pointers: initially
/// to the question name, and after [`append_cname`](Self::append_cname)
/// to that CNAME's target, so chains of CNAME records followed by
/// address records compress the way resolvers expect.
///
/// Record counts are not adjusted here; announce them up front via
/// `set_response_header` (or [`OptWriter`](crate::dns::OptWriter) for
/// the additional section).
#[derive(Debug)]
pub struct AnswerWriter<'a> {
    msg: &'a mut Message,
    name_offset: u16,
}

impl<'a> AnswerWriter<'a> {
    /// Write the owner-name pointer and fixed record preamble, leaving a
    /// zero RDLENGTH placeholder. Returns the placeholder's offset.
    fn begin_record(&mut self, rtype: Type, ttl: u32) -> usize {
        let qclass = self.msg.question.qclass.to_u16();
        let raw = &mut self.msg.raw;
        raw.extend_from_slice(&(0xC000 | self.name_offset).to_be_bytes());
        raw.extend_from_slice(&rtype.to_u16().to_be_bytes());
        raw.extend_from_slice(&qclass.to_be_bytes());
        raw.extend_from_slice(&ttl.to_be_bytes());
        let rdlen_offset = raw.len();
        raw.extend_from_slice(&[0, 0]);
        rdlen_offset
    }

    /// Patch the RDLENGTH placeholder at `rdlen_offset` to cover
    /// everything appended since it was written.
    fn finish_record(&mut self, rdlen_offset: usize) {
        let rdlen = (self.msg.raw.len() - rdlen_offset - 2) as u16;
        self.msg.raw[rdlen_offset..rdlen_offset + 2].copy_from_slice(&rdlen.to_be_bytes());
    }

    /// Append an A record
    pub fn append_a(&mut self, ttl: u32, addr: Ipv4Addr) -> &mut Self {
        let off = self.begin_record(Type::A, ttl);
        self.msg.raw.extend_from_slice(&addr.octets());
        self.finish_record(off);
        self
    }

    /// Append an AAAA record
    pub fn append_aaaa(&mut self, ttl: u32, addr: Ipv6Addr) -> &mut Self {
        let off = self.begin_record(Type::AAAA, ttl);
        self.msg.raw.extend_from_slice(&addr.octets());
        self.finish_record(off);
        self
    }

    /// Append one address record per IP, A or AAAA by family
    pub fn append_host(&mut self, ttl: u32, addrs: &[IpAddr]) -> &mut Self {
        for addr in addrs {
            match addr {
                IpAddr::V4(v4) => self.append_a(ttl, *v4),
                IpAddr::V6(v6) => self.append_aaaa(ttl, *v6),
            };
        }
        self
    }

    /// Append a CNAME record
    ///
    /// Subsequent records written by this writer point their owner name
    /// at this record's target, so an address record appended after a
    /// CNAME reads as belonging to the alias target.
    pub fn append_cname(&mut self, ttl: u32, target: &str) -> &mut Self {
        let off = self.begin_record(Type::CNAME, ttl);
        let rdata_offset = self.msg.raw.len();
        encode_domain(&mut self.msg.raw, target);
        self.finish_record(off);
        self.name_offset = rdata_offset as u16;
        self
    }

    /// Append an NS record
    pub fn append_ns(&mut self, ttl: u32, nameserver: &str) -> &mut Self {
        let off = self.begin_record(Type::NS, ttl);
        encode_domain(&mut self.msg.raw, nameserver);
        self.finish_record(off);
        self
    }

    /// Append a PTR record
    pub fn append_ptr(&mut self, ttl: u32, target: &str) -> &mut Self {
        let off = self.begin_record(Type::PTR, ttl);
        encode_domain(&mut self.msg.raw, target);
        self.finish_record(off);
        self
    }

    /// Append an MX record
    pub fn append_mx(&mut self, ttl: u32, preference: u16, exchange: &str) -> &mut Self {
        let off = self.begin_record(Type::MX, ttl);
        self.msg.raw.extend_from_slice(&preference.to_be_bytes());
        encode_domain(&mut self.msg.raw, exchange);
        self.finish_record(off);
        self
    }

    /// Append an SRV record
    pub fn append_srv(
        &mut self,
        ttl: u32,
        priority: u16,
        weight: u16,
        port: u16,
        target: &str,
    ) -> &mut Self {
        let off = self.begin_record(Type::SRV, ttl);
        self.msg.raw.extend_from_slice(&priority.to_be_bytes());
        self.msg.raw.extend_from_slice(&weight.to_be_bytes());
        self.msg.raw.extend_from_slice(&port.to_be_bytes());
        encode_domain(&mut self.msg.raw, target);
        self.finish_record(off);
        self
    }

    /// Append a TXT record
    ///
    /// Text longer than 255 bytes is split into consecutive character
    /// strings within the single record, as RFC 1035 requires.
    pub fn append_txt(&mut self, ttl: u32, text: &[u8]) -> &mut Self {
        let off = self.begin_record(Type::TXT, ttl);
        if text.is_empty() {
            self.msg.raw.push(0);
        } else {
            for chunk in text.chunks(255) {
                self.msg.raw.push(chunk.len() as u8);
                self.msg.raw.extend_from_slice(chunk);
            }
        }
        self.finish_record(off);
        self
    }

    /// Append an SOA record
    #[allow(clippy::too_many_arguments)]
    pub fn append_soa(
        &mut self,
        ttl: u32,
        mname: &str,
        rname: &str,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    ) -> &mut Self {
        let off = self.begin_record(Type::SOA, ttl);
        encode_domain(&mut self.msg.raw, mname);
        encode_domain(&mut self.msg.raw, rname);
        for v in [serial, refresh, retry, expire, minimum] {
            self.msg.raw.extend_from_slice(&v.to_be_bytes());
        }
        self.finish_record(off);
        self
    }
}

impl Message {
    /// Iterate over the records following the question section
    ///
    /// Covers the answer, authority and additional sections in order;
    /// the OPT pseudo-record, when present, appears among the latter.
    pub fn records(&self) -> RecordIter<'_> {
        RecordIter {
            raw: &self.raw,
            pos: self.question_end(),
            remaining: self.header.ancount as u32
                + self.header.nscount as u32
                + self.header.arcount as u32,
            failed: false,
        }
    }

    /// Start appending answer records to this message
    ///
    /// Call after [`set_response_header`](Message::set_response_header)
    /// so the message has been truncated back to its question section.
    pub fn answer_writer(&mut self) -> AnswerWriter<'_> {
        AnswerWriter {
            msg: self,
            name_offset: QUESTION_OFFSET as u16,
        }
    }
}
