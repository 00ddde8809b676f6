// Minimal DNS protocol implementation for the tunnel driver
//
// Implements just enough of the DNS protocol to:
// - Parse incoming questions of any type
// - Build responses carrying A/AAAA/CNAME/MX/NS/TXT answers
// - Build header-only error responses (NXDOMAIN, SERVFAIL)
// - Pack a single record's RDATA so builders can measure it

use super::{DnsError, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use std::io::Cursor;
use std::net::{Ipv4Addr, Ipv6Addr};

/// The Internet class
pub const CLASS_IN: u16 = 1;

/// Longest name on the wire, length bytes and root label included (RFC 1035)
const MAX_WIRE_NAME_LEN: usize = 255;
const MAX_LABEL_LEN: usize = 63;
const MAX_POINTER_HOPS: usize = 16;

const FLAG_QR: u16 = 0x8000;
const FLAG_AA: u16 = 0x0400;
const FLAG_RD: u16 = 0x0100;
const FLAG_RA: u16 = 0x0080;
const OPCODE_MASK: u16 = 0x7800;
const RCODE_MASK: u16 = 0x000F;

/// Offset of the first question name, the only compression target we emit
const QUESTION_NAME_OFFSET: u16 = 12;

/// DNS response codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Other(u16),
}

impl Rcode {
    pub fn code(&self) -> u16 {
        match self {
            Rcode::NoError => 0,
            Rcode::FormErr => 1,
            Rcode::ServFail => 2,
            Rcode::NxDomain => 3,
            Rcode::NotImp => 4,
            Rcode::Refused => 5,
            Rcode::Other(code) => *code & RCODE_MASK,
        }
    }
}

impl From<u16> for Rcode {
    fn from(code: u16) -> Self {
        match code & RCODE_MASK {
            0 => Rcode::NoError,
            1 => Rcode::FormErr,
            2 => Rcode::ServFail,
            3 => Rcode::NxDomain,
            4 => Rcode::NotImp,
            5 => Rcode::Refused,
            other => Rcode::Other(other),
        }
    }
}

/// Resource record types the driver knows by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Soa,
    Mx,
    Txt,
    Aaaa,
    Any,
    Other(u16),
}

impl RecordType {
    pub fn code(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Any => 255,
            RecordType::Other(code) => *code,
        }
    }
}

impl From<u16> for RecordType {
    fn from(code: u16) -> Self {
        match code {
            1 => RecordType::A,
            2 => RecordType::Ns,
            5 => RecordType::Cname,
            6 => RecordType::Soa,
            15 => RecordType::Mx,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            255 => RecordType::Any,
            other => RecordType::Other(other),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => f.write_str("A"),
            RecordType::Ns => f.write_str("NS"),
            RecordType::Cname => f.write_str("CNAME"),
            RecordType::Soa => f.write_str("SOA"),
            RecordType::Mx => f.write_str("MX"),
            RecordType::Txt => f.write_str("TXT"),
            RecordType::Aaaa => f.write_str("AAAA"),
            RecordType::Any => f.write_str("ANY"),
            RecordType::Other(code) => write!(f, "TYPE{}", code),
        }
    }
}

/// DNS message header (12 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub id: u16,      // Transaction ID
    pub flags: u16,   // Flags
    pub qdcount: u16, // Question count
    pub ancount: u16, // Answer count
    pub nscount: u16, // Authority count
    pub arcount: u16, // Additional count
}

impl Header {
    /// Create a new query header
    pub fn new_query(id: u16) -> Self {
        Self {
            id,
            flags: FLAG_RD, // Standard query, recursion desired
            qdcount: 1,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    /// Create a response header for `request`, echoing its ID, opcode and RD bit
    pub fn new_response(request: &Header, rcode: Rcode) -> Self {
        Self {
            id: request.id,
            flags: FLAG_QR
                | (request.flags & (OPCODE_MASK | FLAG_RD))
                | FLAG_AA
                | FLAG_RA
                | rcode.code(),
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    /// Parse header from bytes
    pub fn parse(buf: &mut Cursor<&[u8]>) -> Result<Self> {
        if buf.remaining() < 12 {
            return Err(DnsError::InvalidMessage("Header too short".into()));
        }

        Ok(Self {
            id: buf.get_u16(),
            flags: buf.get_u16(),
            qdcount: buf.get_u16(),
            ancount: buf.get_u16(),
            nscount: buf.get_u16(),
            arcount: buf.get_u16(),
        })
    }

    /// Write header to buffer
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u16(self.id);
        buf.put_u16(self.flags);
        buf.put_u16(self.qdcount);
        buf.put_u16(self.ancount);
        buf.put_u16(self.nscount);
        buf.put_u16(self.arcount);
    }

    /// Check if this is a response
    pub fn is_response(&self) -> bool {
        (self.flags & FLAG_QR) != 0
    }

    pub fn rcode(&self) -> Rcode {
        Rcode::from(self.flags)
    }
}

/// DNS question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: RecordType,
    pub qclass: u16,
}

impl Question {
    /// Create a new IN-class question
    pub fn new(name: &str, qtype: RecordType) -> Self {
        Self {
            name: name.to_string(),
            qtype,
            qclass: CLASS_IN,
        }
    }

    /// Parse question from bytes
    pub fn parse(buf: &mut Cursor<&[u8]>) -> Result<Self> {
        let name = read_domain_name(buf)?;

        if buf.remaining() < 4 {
            return Err(DnsError::InvalidMessage("Question too short".into()));
        }

        let qtype = RecordType::from(buf.get_u16());
        let qclass = buf.get_u16();

        Ok(Self { name, qtype, qclass })
    }

    /// Write question to buffer
    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        write_domain_name(&self.name, buf)?;
        buf.put_u16(self.qtype.code());
        buf.put_u16(self.qclass);
        Ok(())
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (class {})", self.name, self.qtype, self.qclass)
    }
}

/// Record data for the types the tunnel speaks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(String),
    Mx { preference: u16, exchange: String },
    Ns(String),
    /// Concatenated character-strings
    Txt(Vec<u8>),
    /// Anything else, kept as raw bytes
    Unknown(Vec<u8>),
}

impl RData {
    pub fn record_type(&self) -> Option<RecordType> {
        match self {
            RData::A(_) => Some(RecordType::A),
            RData::Aaaa(_) => Some(RecordType::Aaaa),
            RData::Cname(_) => Some(RecordType::Cname),
            RData::Mx { .. } => Some(RecordType::Mx),
            RData::Ns(_) => Some(RecordType::Ns),
            RData::Txt(_) => Some(RecordType::Txt),
            RData::Unknown(_) => None,
        }
    }

    /// Write the RDATA (without the length prefix) to buffer.
    ///
    /// Names are never compressed here, so the packed size is the worst case.
    pub fn pack(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            RData::A(addr) => buf.put_slice(&addr.octets()),
            RData::Aaaa(addr) => buf.put_slice(&addr.octets()),
            RData::Cname(name) | RData::Ns(name) => write_domain_name(name, buf)?,
            RData::Mx {
                preference,
                exchange,
            } => {
                buf.put_u16(*preference);
                write_domain_name(exchange, buf)?;
            }
            RData::Txt(data) => {
                if data.is_empty() {
                    buf.put_u8(0);
                }
                for chunk in data.chunks(255) {
                    buf.put_u8(chunk.len() as u8);
                    buf.put_slice(chunk);
                }
            }
            RData::Unknown(data) => buf.put_slice(data),
        }
        Ok(())
    }

    /// Parse RDATA of the given type; `buf` spans the whole message so
    /// compression pointers resolve
    fn parse(rtype: RecordType, buf: &mut Cursor<&[u8]>, rdlen: usize) -> Result<Self> {
        if buf.remaining() < rdlen {
            return Err(DnsError::InvalidMessage("Truncated record data".into()));
        }
        let start = buf.position() as usize;

        let rdata = match rtype {
            RecordType::A if rdlen == 4 => {
                let mut octets = [0u8; 4];
                buf.copy_to_slice(&mut octets);
                RData::A(Ipv4Addr::from(octets))
            }
            RecordType::Aaaa if rdlen == 16 => {
                let mut octets = [0u8; 16];
                buf.copy_to_slice(&mut octets);
                RData::Aaaa(Ipv6Addr::from(octets))
            }
            RecordType::Cname => RData::Cname(read_domain_name(buf)?),
            RecordType::Ns => RData::Ns(read_domain_name(buf)?),
            RecordType::Mx if rdlen >= 3 => {
                let preference = buf.get_u16();
                let exchange = read_domain_name(buf)?;
                RData::Mx {
                    preference,
                    exchange,
                }
            }
            RecordType::Txt => {
                let mut data = Vec::with_capacity(rdlen);
                let end = start + rdlen;
                while (buf.position() as usize) < end {
                    let len = buf.get_u8() as usize;
                    if (buf.position() as usize) + len > end {
                        return Err(DnsError::InvalidMessage("Truncated TXT data".into()));
                    }
                    let mut chunk = vec![0u8; len];
                    buf.copy_to_slice(&mut chunk);
                    data.extend_from_slice(&chunk);
                }
                RData::Txt(data)
            }
            RecordType::A | RecordType::Aaaa | RecordType::Mx => {
                return Err(DnsError::InvalidMessage(format!(
                    "Bad RDATA length {} for {}",
                    rdlen, rtype
                )));
            }
            _ => {
                let mut data = vec![0u8; rdlen];
                buf.copy_to_slice(&mut data);
                RData::Unknown(data)
            }
        };

        if buf.position() as usize != start + rdlen {
            return Err(DnsError::InvalidMessage(format!(
                "RDATA length mismatch for {}",
                rtype
            )));
        }

        Ok(rdata)
    }
}

/// DNS resource record (answer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub rtype: RecordType,
    pub class: u16,
    pub ttl: u32,
    pub rdata: RData,
}

impl Record {
    /// Parse record from bytes
    pub fn parse(buf: &mut Cursor<&[u8]>) -> Result<Self> {
        let name = read_domain_name(buf)?;

        if buf.remaining() < 10 {
            return Err(DnsError::InvalidMessage("Record too short".into()));
        }

        let rtype = RecordType::from(buf.get_u16());
        let class = buf.get_u16();
        let ttl = buf.get_u32();
        let rdlen = buf.get_u16() as usize;
        let rdata = RData::parse(rtype, buf, rdlen)?;

        Ok(Self {
            name,
            rtype,
            class,
            ttl,
            rdata,
        })
    }

    /// Write record to buffer, pointing the owner name at the question when they match
    pub fn write(&self, buf: &mut BytesMut, question_name: Option<&str>) -> Result<()> {
        match question_name {
            Some(qname) if qname.eq_ignore_ascii_case(&self.name) => {
                buf.put_u16(0xC000 | QUESTION_NAME_OFFSET);
            }
            _ => write_domain_name(&self.name, buf)?,
        }
        buf.put_u16(self.rtype.code());
        buf.put_u16(self.class);
        buf.put_u32(self.ttl);

        // RDLENGTH is patched once the RDATA is packed
        let length_at = buf.len();
        buf.put_u16(0);
        self.rdata.pack(buf)?;
        let rdlen = buf.len() - length_at - 2;
        let rdlen = u16::try_from(rdlen)
            .map_err(|_| DnsError::EncodingError(format!("RDATA too long: {} bytes", rdlen)))?;
        buf[length_at..length_at + 2].copy_from_slice(&rdlen.to_be_bytes());

        Ok(())
    }
}

/// DNS message (complete query or response)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
}

impl Message {
    /// Create a new single-question query
    pub fn new_query(name: &str, qtype: RecordType, id: u16) -> Self {
        Self {
            header: Header::new_query(id),
            questions: vec![Question::new(name, qtype)],
            answers: Vec::new(),
        }
    }

    /// Create a response to `request`, echoing its questions
    pub fn new_response(request: &Message, rcode: Rcode, answers: Vec<Record>) -> Self {
        Self {
            header: Header::new_response(&request.header, rcode),
            questions: request.questions.clone(),
            answers,
        }
    }

    /// Create a response carrying nothing but a header, for requests we
    /// couldn't fully parse
    pub fn new_header_only_response(request: &Header, rcode: Rcode) -> Self {
        Self {
            header: Header::new_response(request, rcode),
            questions: Vec::new(),
            answers: Vec::new(),
        }
    }

    /// Parse DNS message from bytes.
    ///
    /// Authority and additional sections are not needed and are ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let header = Header::parse(&mut cursor)?;

        let mut questions = Vec::new();
        for _ in 0..header.qdcount {
            questions.push(Question::parse(&mut cursor)?);
        }

        let mut answers = Vec::new();
        for _ in 0..header.ancount {
            answers.push(Record::parse(&mut cursor)?);
        }

        Ok(Self {
            header,
            questions,
            answers,
        })
    }

    /// Serialize DNS message to bytes; section counts come from the vectors
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(512);

        let header = Header {
            qdcount: count(self.questions.len())?,
            ancount: count(self.answers.len())?,
            nscount: 0,
            arcount: 0,
            ..self.header.clone()
        };
        header.write(&mut buf);

        for q in &self.questions {
            q.write(&mut buf)?;
        }

        let question_name = self.questions.first().map(|q| q.name.as_str());
        for a in &self.answers {
            a.write(&mut buf, question_name)?;
        }

        Ok(buf.to_vec())
    }

    pub fn rcode(&self) -> Rcode {
        self.header.rcode()
    }
}

fn count(n: usize) -> Result<u16> {
    u16::try_from(n).map_err(|_| DnsError::EncodingError(format!("Too many records: {}", n)))
}

/// Read a domain name from DNS message (follows compression pointers)
fn read_domain_name(buf: &mut Cursor<&[u8]>) -> Result<String> {
    let message: &[u8] = *buf.get_ref();
    let mut pos = buf.position() as usize;
    let mut resume_at = None;
    let mut hops = 0;
    let mut wire_len = 1;
    let mut labels = Vec::new();

    loop {
        let len = *message
            .get(pos)
            .ok_or_else(|| DnsError::InvalidMessage("Truncated domain name".into()))?;

        if len & 0xC0 == 0xC0 {
            let low = *message
                .get(pos + 1)
                .ok_or_else(|| DnsError::InvalidMessage("Truncated compression pointer".into()))?;
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(DnsError::InvalidMessage("Too many compression pointers".into()));
            }
            resume_at.get_or_insert(pos + 2);
            pos = (((len & 0x3F) as usize) << 8) | low as usize;
            continue;
        }
        if len & 0xC0 != 0 {
            return Err(DnsError::InvalidMessage(format!("Unsupported label type 0x{:02x}", len)));
        }

        pos += 1;
        if len == 0 {
            break;
        }

        let end = pos + len as usize;
        let label = message
            .get(pos..end)
            .ok_or_else(|| DnsError::InvalidMessage("Truncated label".into()))?;
        wire_len += 1 + label.len();
        if wire_len > MAX_WIRE_NAME_LEN {
            return Err(DnsError::InvalidMessage("Domain name too long".into()));
        }

        labels.push(
            std::str::from_utf8(label)
                .map_err(|_| DnsError::InvalidMessage("Invalid UTF-8 in domain name".into()))?
                .to_string(),
        );
        pos = end;
    }

    buf.set_position(resume_at.unwrap_or(pos) as u64);
    Ok(labels.join("."))
}

/// Write a domain name to DNS message, uncompressed
fn write_domain_name(name: &str, buf: &mut BytesMut) -> Result<()> {
    let start = buf.len();
    let name = name.strip_suffix('.').unwrap_or(name);

    if !name.is_empty() {
        for label in name.split('.') {
            let bytes = label.as_bytes();
            if bytes.is_empty() || bytes.len() > MAX_LABEL_LEN {
                return Err(DnsError::EncodingError(format!(
                    "Invalid label length {} in {}",
                    bytes.len(),
                    name
                )));
            }
            buf.put_u8(bytes.len() as u8);
            buf.put_slice(bytes);
        }
    }
    buf.put_u8(0); // End of name

    if buf.len() - start > MAX_WIRE_NAME_LEN {
        return Err(DnsError::EncodingError(format!(
            "Domain name too long: {} bytes",
            buf.len() - start
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(name: &str, rdata: RData) -> Record {
        Record {
            name: name.to_string(),
            rtype: rdata.record_type().unwrap(),
            class: CLASS_IN,
            ttl: 3600,
            rdata,
        }
    }

    #[test]
    fn test_query_construction() {
        let msg = Message::new_query("tunnel.example.com", RecordType::Txt, 0x1234);
        let bytes = msg.to_bytes().unwrap();

        assert_eq!(&bytes[0..2], &[0x12, 0x34]); // Transaction ID

        let parsed = Message::parse(&bytes).unwrap();
        assert_eq!(parsed.questions.len(), 1);
        assert_eq!(parsed.questions[0].name, "tunnel.example.com");
        assert_eq!(parsed.questions[0].qtype, RecordType::Txt);
        assert!(!parsed.header.is_response());
    }

    #[test]
    fn test_response_roundtrip_all_types() {
        let query = Message::new_query("abc.41414141", RecordType::Any, 7);
        let answers = vec![
            answer("abc.41414141", RData::A(Ipv4Addr::new(0, 1, 65, 255))),
            answer("abc.41414141", RData::Aaaa("1:41ff:ffff:ffff:ffff:ffff:ffff:ffff".parse().unwrap())),
            answer("abc.41414141", RData::Cname("abc.4242".into())),
            answer(
                "abc.41414141",
                RData::Mx {
                    preference: 10,
                    exchange: "abc.4242".into(),
                },
            ),
            answer("abc.41414141", RData::Ns("abc.4242".into())),
            answer("abc.41414141", RData::Txt(b"4242".to_vec())),
            answer("other.name", RData::Txt(Vec::new())),
        ];
        let response = Message::new_response(&query, Rcode::NoError, answers.clone());
        let parsed = Message::parse(&response.to_bytes().unwrap()).unwrap();

        assert!(parsed.header.is_response());
        assert_eq!(parsed.header.id, 7);
        assert_eq!(parsed.rcode(), Rcode::NoError);
        assert_eq!(parsed.answers, answers);
    }

    #[test]
    fn test_answer_name_is_compressed() {
        let query = Message::new_query("test.com", RecordType::A, 1);
        let response = Message::new_response(
            &query,
            Rcode::NoError,
            vec![answer("test.com", RData::A(Ipv4Addr::new(0, 0, 255, 255)))],
        );
        let bytes = response.to_bytes().unwrap();

        // header + question (10 + 4) + answer (2 + 10 + 4)
        assert_eq!(bytes.len(), 12 + 14 + 16);
        assert_eq!(&bytes[26..28], &[0xC0, 0x0C]);
    }

    #[test]
    fn test_error_response_flags() {
        let query = Message::new_query("example.org", RecordType::A, 0xBEEF);
        let response = Message::new_response(&query, Rcode::NxDomain, Vec::new());
        let parsed = Message::parse(&response.to_bytes().unwrap()).unwrap();

        assert_eq!(parsed.rcode(), Rcode::NxDomain);
        assert_eq!(parsed.header.flags & FLAG_RD, FLAG_RD);
        assert!(parsed.answers.is_empty());
        assert_eq!(parsed.questions, query.questions);
    }

    #[test]
    fn test_domain_name_encoding() {
        let mut buf = BytesMut::new();
        write_domain_name("example.com", &mut buf).unwrap();

        let mut cursor = Cursor::new(&buf[..]);
        let domain = read_domain_name(&mut cursor).unwrap();

        assert_eq!(domain, "example.com");
    }

    #[test]
    fn test_domain_name_limits() {
        let mut buf = BytesMut::new();
        assert!(write_domain_name(&"a".repeat(64), &mut buf).is_err());

        let mut buf = BytesMut::new();
        assert!(write_domain_name("a..b", &mut buf).is_err());

        // 4 labels of 63 = 257 bytes on the wire
        let long = vec!["a".repeat(63); 4].join(".");
        let mut buf = BytesMut::new();
        assert!(write_domain_name(&long, &mut buf).is_err());

        let mut buf = BytesMut::new();
        write_domain_name("", &mut buf).unwrap();
        assert_eq!(&buf[..], &[0]);
    }

    #[test]
    fn test_pointer_loop_rejected() {
        let packet = [0xC0, 0x00];
        let mut cursor = Cursor::new(&packet[..]);
        assert!(read_domain_name(&mut cursor).is_err());
    }

    #[test]
    fn test_truncated_messages_rejected() {
        assert!(Message::parse(&[0x12, 0x34, 0x01]).is_err());

        let bytes = Message::new_query("example.com", RecordType::A, 1).to_bytes().unwrap();
        assert!(Message::parse(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn test_record_type_codes() {
        for code in [1u16, 2, 5, 6, 15, 16, 28, 255, 99] {
            assert_eq!(RecordType::from(code).code(), code);
        }
        assert_eq!(RecordType::from(99), RecordType::Other(99));
        assert_eq!(RecordType::Aaaa.to_string(), "AAAA");
    }
}
