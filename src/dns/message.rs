//! DNS message parsing and building
//!
//! A [`Message`] owns the exact wire bytes of a request or response and
//! parses/builds them in place, without intermediate record structures.
//! The question name is kept in wire form inside `raw`; its dotted text
//! decoding lives in a reusable scratch buffer so that repeated parses of
//! pooled messages never reallocate.

use crate::dns::types::{Class, Flags, Rcode, Type};
use crate::{Error, Result};

/// Offset of the question section in a DNS message
pub const QUESTION_OFFSET: usize = 12;

/// Maximum number of compression pointers followed while decoding a name
///
/// Combined with the requirement that every pointer targets a strictly
/// lower offset than the previous one, this rejects forward, circular and
/// self-referential pointer chains instead of looping on them.
const MAX_POINTER_JUMPS: usize = 8;

/// Parsed DNS message header
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Transaction ID
    pub id: u16,
    /// Packed QR/Opcode/AA/TC/RD/RA/Z/Rcode flags
    pub flags: Flags,
    /// Question count
    pub qdcount: u16,
    /// Answer count
    pub ancount: u16,
    /// Authority count
    pub nscount: u16,
    /// Additional count
    pub arcount: u16,
}

/// Parsed question section
///
/// The question name itself stays in wire form inside [`Message::raw`];
/// use [`Message::qname`] for the label sequence and [`Message::domain`]
/// for the dotted decoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct Question {
    /// Query type
    pub qtype: Type,
    /// Query class
    pub qclass: Class,
    /// Wire length of the question name, terminating zero included
    name_len: usize,
}

/// A DNS message backed by its exact wire bytes
///
/// After any parse or header/question-mutating operation, `raw` is a
/// byte-exact RFC 1035 encoding of the header and question (plus any
/// appended sections), and [`Message::domain`] is the dotted decoding of
/// the question name. Messages are intended to be acquired from a
/// [`MessagePool`](crate::pool::MessagePool) and reset between requests.
///
/// # Example
///
/// ```
/// use fastdns::dns::{Class, Message, Type};
///
/// let mut msg = Message::new();
/// msg.set_question("phus.lu", Type::A, Class::IN);
/// assert_eq!(msg.qname(), b"\x04phus\x02lu\x00");
/// assert_eq!(msg.domain(), b"phus.lu");
/// ```
#[derive(Debug, Default)]
pub struct Message {
    /// Exact wire bytes currently representing this message
    pub raw: Vec<u8>,
    /// Dotted decoding of the question name (owned scratch buffer)
    pub(crate) domain: Vec<u8>,
    /// Parsed header fields
    pub header: Header,
    /// Parsed question fields
    pub question: Question,
}

impl Message {
    /// Create an empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// Truncate all buffers and zero the parsed fields
    ///
    /// Retained capacity is kept so pooled messages do not reallocate.
    pub fn reset(&mut self) {
        self.raw.clear();
        self.domain.clear();
        self.header = Header::default();
        self.question = Question::default();
    }

    /// Parse a datagram, copying it into the message's owned buffer
    ///
    /// The copy keeps the message valid after the caller's buffer is
    /// reused or freed. Hot paths that already own the datagram bytes
    /// should place them in [`Message::raw`] and call
    /// [`parse_in_place`](Message::parse_in_place) instead.
    ///
    /// # Errors
    ///
    /// `InvalidHeader` if the payload is shorter than 12 bytes or QDCOUNT
    /// is not exactly 1; `InvalidQuestion` if the question name is empty
    /// or the question section overruns the buffer.
    pub fn parse(&mut self, payload: &[u8]) -> Result<()> {
        self.raw.clear();
        self.raw.extend_from_slice(payload);
        self.parse_in_place()
    }

    /// Parse the datagram already stored in `raw`
    ///
    /// This is the zero-copy path: the server reads each datagram
    /// directly into a pooled message's buffer, so parsing allocates
    /// nothing at all.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`parse`](Message::parse).
    pub fn parse_in_place(&mut self) -> Result<()> {
        if self.raw.len() < QUESTION_OFFSET {
            return Err(Error::InvalidHeader);
        }

        self.header.id = u16::from_be_bytes([self.raw[0], self.raw[1]]);
        self.header.flags = Flags::from_u16(u16::from_be_bytes([self.raw[2], self.raw[3]]));
        self.header.qdcount = u16::from_be_bytes([self.raw[4], self.raw[5]]);
        self.header.ancount = u16::from_be_bytes([self.raw[6], self.raw[7]]);
        self.header.nscount = u16::from_be_bytes([self.raw[8], self.raw[9]]);
        self.header.arcount = u16::from_be_bytes([self.raw[10], self.raw[11]]);

        if self.header.qdcount != 1 {
            return Err(Error::InvalidHeader);
        }

        // Scan the question name up to its terminating zero label. Names
        // in the question section are never compressed; a stray pointer
        // byte reads as an oversized label and fails the bounds check.
        let mut i = QUESTION_OFFSET;
        loop {
            let len = *self.raw.get(i).ok_or(Error::InvalidQuestion)? as usize;
            i += 1;
            if len == 0 {
                break;
            }
            i += len;
            if i >= self.raw.len() {
                return Err(Error::InvalidQuestion);
            }
        }
        let name_len = i - QUESTION_OFFSET;
        if name_len <= 1 {
            return Err(Error::InvalidQuestion);
        }
        if i + 4 > self.raw.len() {
            return Err(Error::InvalidQuestion);
        }

        self.question.qtype = Type::from_u16(u16::from_be_bytes([self.raw[i], self.raw[i + 1]]));
        self.question.qclass =
            Class::from_u16(u16::from_be_bytes([self.raw[i + 2], self.raw[i + 3]]));
        self.question.name_len = name_len;

        // Dotted decoding of the question name into the scratch buffer.
        self.domain.clear();
        let mut j = QUESTION_OFFSET;
        loop {
            let len = self.raw[j] as usize;
            if len == 0 {
                break;
            }
            if !self.domain.is_empty() {
                self.domain.push(b'.');
            }
            self.domain.extend_from_slice(&self.raw[j + 1..j + 1 + len]);
            j += 1 + len;
        }

        Ok(())
    }

    /// The question name as a wire-form label sequence
    ///
    /// Includes the terminating zero byte; the slice points into `raw`.
    /// Empty until a question has been parsed or built.
    pub fn qname(&self) -> &[u8] {
        self.raw
            .get(QUESTION_OFFSET..QUESTION_OFFSET + self.question.name_len)
            .unwrap_or(&[])
    }

    /// The question name in dotted text form, without a trailing dot
    pub fn domain(&self) -> &[u8] {
        &self.domain
    }

    /// The question name as UTF-8 text, replacing invalid bytes
    pub fn domain_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.domain)
    }

    /// Offset just past the question section
    pub fn question_end(&self) -> usize {
        QUESTION_OFFSET + self.question.name_len + 4
    }

    /// Build a fresh query for `domain` in place
    ///
    /// Assigns a random transaction ID, sets RD, QDCOUNT=1 and all other
    /// counts to zero, and re-encodes `raw` as exactly header + question.
    pub fn set_question(&mut self, domain: &str, qtype: Type, qclass: Class) {
        self.header = Header {
            id: rand::random(),
            flags: Flags::default().with_rd(true),
            qdcount: 1,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        };

        self.raw.clear();
        self.raw.resize(QUESTION_OFFSET, 0);
        encode_domain(&mut self.raw, domain);
        let name_len = self.raw.len() - QUESTION_OFFSET;
        self.raw.extend_from_slice(&qtype.to_u16().to_be_bytes());
        self.raw.extend_from_slice(&qclass.to_u16().to_be_bytes());

        self.question = Question {
            qtype,
            qclass,
            name_len,
        };
        self.domain.clear();
        self.domain.extend_from_slice(domain.as_bytes());

        self.write_header();
    }

    /// Rewrite the header in place to turn this message into a response
    ///
    /// Sets QR and the given Rcode, ANCOUNT to `ancount`, and truncates
    /// `raw` to the end of the question so record encoders append after
    /// it. On any non-NoError rcode all counts are forced to zero and the
    /// message is truncated to the bare 12-byte header.
    pub fn set_response_header(&mut self, rcode: Rcode, ancount: u16) {
        self.header.flags = self.header.flags.with_qr(true).with_rcode(rcode);
        if rcode == Rcode::NoError {
            self.header.qdcount = 1;
            self.header.ancount = ancount;
            self.header.nscount = 0;
            self.header.arcount = 0;
            self.raw.truncate(self.question_end());
        } else {
            self.header.qdcount = 0;
            self.header.ancount = 0;
            self.header.nscount = 0;
            self.header.arcount = 0;
            self.raw.truncate(QUESTION_OFFSET);
        }
        self.write_header();
    }

    /// Serialize `header` into the first 12 bytes of `raw`
    pub(crate) fn write_header(&mut self) {
        if self.raw.len() < QUESTION_OFFSET {
            self.raw.resize(QUESTION_OFFSET, 0);
        }
        self.raw[0..2].copy_from_slice(&self.header.id.to_be_bytes());
        self.raw[2..4].copy_from_slice(&self.header.flags.to_u16().to_be_bytes());
        self.raw[4..6].copy_from_slice(&self.header.qdcount.to_be_bytes());
        self.raw[6..8].copy_from_slice(&self.header.ancount.to_be_bytes());
        self.raw[8..10].copy_from_slice(&self.header.nscount.to_be_bytes());
        self.raw[10..12].copy_from_slice(&self.header.arcount.to_be_bytes());
    }

    /// Resolve a possibly-compressed name to dotted text, appending onto `dst`
    ///
    /// `name` is a wire-form name as yielded by
    /// [`records`](Message::records): literal labels optionally terminated
    /// by a 2-byte compression pointer into this message's `raw` buffer.
    ///
    /// Fast path: a name that is exactly one back-reference to the
    /// question offset returns the already-decoded [`domain`](Message::domain)
    /// without re-walking bytes.
    ///
    /// # Errors
    ///
    /// `InvalidAnswer` on out-of-bounds labels, forward or circular
    /// pointers, or more than [`MAX_POINTER_JUMPS`] pointer hops.
    pub fn decode_name(&self, dst: &mut Vec<u8>, name: &[u8]) -> Result<()> {
        if name.len() == 2 && name[0] == 0xC0 && name[1] == QUESTION_OFFSET as u8 {
            dst.extend_from_slice(&self.domain);
            return Ok(());
        }

        let start = dst.len();
        let mut data = name;
        let mut i = 0usize;
        let mut last_target = usize::MAX;
        let mut jumps = 0usize;
        loop {
            let b = *data.get(i).ok_or(Error::InvalidAnswer)?;
            if b == 0 {
                break;
            }
            if b & 0xC0 == 0xC0 {
                let lo = *data.get(i + 1).ok_or(Error::InvalidAnswer)?;
                let target = (((b & 0x3F) as usize) << 8) | lo as usize;
                jumps += 1;
                // Each pointer must land strictly before the previous one.
                if jumps > MAX_POINTER_JUMPS || target >= last_target || target >= self.raw.len() {
                    return Err(Error::InvalidAnswer);
                }
                last_target = target;
                data = &self.raw;
                i = target;
                continue;
            }
            if b & 0xC0 != 0 {
                // 0x40/0x80 extended label types are not in use
                return Err(Error::InvalidAnswer);
            }
            let len = b as usize;
            let label = data.get(i + 1..i + 1 + len).ok_or(Error::InvalidAnswer)?;
            if dst.len() > start {
                dst.push(b'.');
            }
            dst.extend_from_slice(label);
            i += 1 + len;
        }
        Ok(())
    }
}

/// Append the wire encoding of a dotted domain name onto `dst`
///
/// Each label is preceded by its length byte and the sequence is
/// terminated by a zero byte. Embedded dots cannot be escaped, matching
/// the RFC 1035 presentation-format limitation.
///
/// # Example
///
/// ```
/// use fastdns::dns::encode_domain;
///
/// let mut buf = Vec::new();
/// encode_domain(&mut buf, "phus.lu");
/// assert_eq!(buf, b"\x04phus\x02lu\x00");
/// ```
pub fn encode_domain(dst: &mut Vec<u8>, domain: &str) {
    for label in domain.split('.') {
        if label.is_empty() {
            continue;
        }
        dst.push(label.len() as u8);
        dst.extend_from_slice(label.as_bytes());
    }
    dst.push(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Query for hk.phus.lu A/IN with ID 2, RD set, one answer announced
    const QUERY: &[u8] = b"\x00\x02\x81\x00\x00\x01\x00\x01\x00\x00\x00\x00\
                           \x02hk\x04phus\x02lu\x00\x00\x01\x00\x01";

    #[test]
    fn test_parse_query() {
        let mut msg = Message::new();
        msg.parse(QUERY).unwrap();

        assert_eq!(msg.header.id, 0x0002);
        assert!(msg.header.flags.qr());
        assert!(msg.header.flags.rd());
        assert_eq!(msg.header.qdcount, 1);
        assert_eq!(msg.header.ancount, 1);
        assert_eq!(msg.header.nscount, 0);
        assert_eq!(msg.header.arcount, 0);
        assert_eq!(msg.question.qtype, Type::A);
        assert_eq!(msg.question.qclass, Class::IN);
        assert_eq!(msg.qname(), b"\x02hk\x04phus\x02lu\x00");
        assert_eq!(msg.domain(), b"hk.phus.lu");
        assert_eq!(msg.question_end(), QUERY.len());
    }

    #[test]
    fn test_header_question_roundtrip() {
        let mut msg = Message::new();
        msg.parse(QUERY).unwrap();
        // Re-serializing the parsed header must reproduce the original bytes
        msg.write_header();
        assert_eq!(msg.raw, QUERY);
    }

    #[test]
    fn test_truncated_header() {
        let mut msg = Message::new();
        assert!(matches!(msg.parse(&QUERY[..7]), Err(Error::InvalidHeader)));
    }

    #[test]
    fn test_bad_qdcount() {
        let mut payload = QUERY.to_vec();
        payload[5] = 2;
        let mut msg = Message::new();
        assert!(matches!(msg.parse(&payload), Err(Error::InvalidHeader)));
    }

    #[test]
    fn test_truncated_question() {
        // Cut inside the name
        let mut msg = Message::new();
        assert!(matches!(
            msg.parse(&QUERY[..16]),
            Err(Error::InvalidQuestion)
        ));
        // Name complete but QTYPE/QCLASS missing
        assert!(matches!(
            msg.parse(&QUERY[..QUERY.len() - 2]),
            Err(Error::InvalidQuestion)
        ));
    }

    #[test]
    fn test_empty_question_name() {
        let mut payload = Vec::from(&QUERY[..QUESTION_OFFSET]);
        payload.extend_from_slice(b"\x00\x00\x01\x00\x01");
        let mut msg = Message::new();
        assert!(matches!(msg.parse(&payload), Err(Error::InvalidQuestion)));
    }

    #[test]
    fn test_encode_domain() {
        let mut buf = Vec::new();
        encode_domain(&mut buf, "phus.lu");
        assert_eq!(buf, b"\x04phus\x02lu\x00");

        buf.clear();
        encode_domain(&mut buf, "splunk.phus.lu");
        assert_eq!(buf, b"\x06splunk\x04phus\x02lu\x00");
    }

    #[test]
    fn test_encode_decode_inverse() {
        for domain in ["phus.lu", "splunk.phus.lu", "a.b.c.example.com"] {
            let mut wire = Vec::new();
            encode_domain(&mut wire, domain);

            let msg = Message::new();
            let mut text = Vec::new();
            msg.decode_name(&mut text, &wire).unwrap();
            assert_eq!(text, domain.as_bytes());
        }
    }

    #[test]
    fn test_decode_name_question_fast_path() {
        let mut msg = Message::new();
        msg.parse(QUERY).unwrap();

        let mut text = Vec::new();
        msg.decode_name(&mut text, &[0xC0, 0x0C]).unwrap();
        assert_eq!(text, b"hk.phus.lu");
    }

    #[test]
    fn test_decode_name_pointer_chain() {
        let mut msg = Message::new();
        msg.parse(QUERY).unwrap();

        // Literal label followed by a pointer into the question name
        let mut name = Vec::new();
        name.extend_from_slice(b"\x03www");
        name.extend_from_slice(&[0xC0, 0x0F]); // offset of "phus.lu" inside the question
        let mut text = Vec::new();
        msg.decode_name(&mut text, &name).unwrap();
        assert_eq!(text, b"www.phus.lu");
    }

    #[test]
    fn test_decode_name_rejects_bad_pointers() {
        let mut msg = Message::new();
        msg.parse(QUERY).unwrap();

        let mut text = Vec::new();
        // Out of bounds target
        assert!(matches!(
            msg.decode_name(&mut text, &[0xC0, 0xFF]),
            Err(Error::InvalidAnswer)
        ));
        // Pointer at offset 12 targeting offset 12 loops on itself
        let mut looped = msg.raw.clone();
        looped[12] = 0xC0;
        looped[13] = 0x0C;
        let mut msg2 = Message::new();
        msg2.raw = looped;
        msg2.header = msg.header;
        msg2.question = msg.question;
        text.clear();
        assert!(matches!(
            msg2.decode_name(&mut text, b"\x01a\xC0\x0C"),
            Err(Error::InvalidAnswer)
        ));
        // Truncated name with no terminator
        text.clear();
        assert!(matches!(
            msg.decode_name(&mut text, b"\x03www"),
            Err(Error::InvalidAnswer)
        ));
    }

    #[test]
    fn test_set_question() {
        let mut msg = Message::new();
        msg.set_question("hk.phus.lu", Type::A, Class::IN);

        assert_eq!(msg.header.qdcount, 1);
        assert_eq!(msg.header.ancount, 0);
        assert!(msg.header.flags.rd());
        assert!(!msg.header.flags.qr());
        assert_eq!(msg.qname(), b"\x02hk\x04phus\x02lu\x00");
        assert_eq!(msg.domain(), b"hk.phus.lu");
        assert_eq!(&msg.raw[QUESTION_OFFSET..], b"\x02hk\x04phus\x02lu\x00\x00\x01\x00\x01");

        // The built query must parse back to the same question
        let raw = msg.raw.clone();
        let mut parsed = Message::new();
        parsed.parse(&raw).unwrap();
        assert_eq!(parsed.header.id, msg.header.id);
        assert_eq!(parsed.domain(), b"hk.phus.lu");
        assert_eq!(parsed.question.qtype, Type::A);
    }

    #[test]
    fn test_set_response_header_success() {
        let mut msg = Message::new();
        msg.parse(QUERY).unwrap();
        msg.set_response_header(Rcode::NoError, 2);

        assert!(msg.header.flags.qr());
        assert_eq!(msg.header.flags.rcode(), Rcode::NoError);
        assert_eq!(msg.header.qdcount, 1);
        assert_eq!(msg.header.ancount, 2);
        assert_eq!(msg.raw.len(), msg.question_end());
        assert_eq!(&msg.raw[6..8], &[0x00, 0x02]);
    }

    #[test]
    fn test_set_response_header_failure_truncates() {
        let mut msg = Message::new();
        msg.parse(QUERY).unwrap();
        msg.set_response_header(Rcode::NXDomain, 5);

        assert!(msg.header.flags.qr());
        assert_eq!(msg.header.flags.rcode(), Rcode::NXDomain);
        assert_eq!(msg.header.qdcount, 0);
        assert_eq!(msg.header.ancount, 0);
        assert_eq!(msg.raw.len(), QUESTION_OFFSET);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut msg = Message::new();
        msg.parse(QUERY).unwrap();
        let cap = msg.raw.capacity();
        msg.reset();
        assert!(msg.raw.is_empty());
        assert!(msg.domain.is_empty());
        assert_eq!(msg.raw.capacity(), cap);
    }
}
