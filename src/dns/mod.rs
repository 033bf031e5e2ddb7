//! DNS protocol implementation
//!
//! This module implements the RFC 1035 wire format directly against byte
//! buffers: header and question parsing, domain-name compression, resource
//! record iteration and encoding, and EDNS(0) options.

pub mod edns;
pub mod message;
pub mod records;
pub mod types;

pub use edns::{OptWriter, OptionCode, OptionIter, OptionRef};
pub use message::{encode_domain, Header, Message, Question, QUESTION_OFFSET};
pub use records::{AnswerWriter, RecordIter, RecordRef};
pub use types::{Class, Flags, Opcode, Rcode, Type};
