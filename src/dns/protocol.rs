//! implements the DNS protocol in a transport agnostic fashion

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::Ipv4Addr;

use derive_more::{Display, Error};
use rand::random;

use crate::dns::buffer::{BufferError, BytePacketBuffer, PacketBuffer, VectorPacketBuffer};
use crate::dns::hostname::is_within;

#[derive(Debug, Display, Error)]
pub enum ProtocolError {
    Buffer(BufferError),
    #[display(fmt = "record data length mismatch (declared {}, consumed {})", declared, consumed)]
    RdataLength { declared: u16, consumed: usize },
}

impl From<BufferError> for ProtocolError {
    fn from(err: BufferError) -> Self {
        ProtocolError::Buffer(err)
    }
}

type Result<T> = std::result::Result<T, ProtocolError>;

/// Class code for the Internet
pub const CLASS_IN: u16 = 1;

/// `QueryType` represents the requested Record Type of a query
///
/// Only the types the resolver acts on are named. Everything else is carried
/// as `Unknown` so the numeric code survives a decode.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy)]
pub enum QueryType {
    Unknown(u16),
    A,     // 1
    Ns,    // 2
    Cname, // 5
}

impl QueryType {
    pub fn to_num(&self) -> u16 {
        match *self {
            QueryType::Unknown(x) => x,
            QueryType::A => 1,
            QueryType::Ns => 2,
            QueryType::Cname => 5,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::Ns,
            5 => QueryType::Cname,
            _ => QueryType::Unknown(num),
        }
    }
}

/// A TTL that takes no part in equality, ordering or hashing, so two records
/// with the same data compare equal regardless of how long they may be kept.
#[derive(Copy, Clone, Debug, Eq)]
pub struct TransientTtl(pub u32);

impl PartialEq<TransientTtl> for TransientTtl {
    fn eq(&self, _: &TransientTtl) -> bool {
        true
    }
}

impl PartialOrd<TransientTtl> for TransientTtl {
    fn partial_cmp(&self, other: &TransientTtl) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TransientTtl {
    fn cmp(&self, _: &TransientTtl) -> Ordering {
        Ordering::Equal
    }
}

impl Hash for TransientTtl {
    fn hash<H>(&self, _: &mut H)
    where
        H: Hasher,
    {
        // purposely left empty
    }
}

/// `DnsRecord` is the primary representation of a DNS record
///
/// A, NS and CNAME data is interpreted. Any other type is kept as `Opaque`
/// with its raw RDATA, so a decoded section always accounts for every record
/// the server sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DnsRecord {
    A {
        domain: String,
        addr: Ipv4Addr,
        ttl: TransientTtl,
    }, // 1
    Ns {
        domain: String,
        host: String,
        ttl: TransientTtl,
    }, // 2
    Cname {
        domain: String,
        host: String,
        ttl: TransientTtl,
    }, // 5
    Opaque {
        domain: String,
        qtype: u16,
        class: u16,
        data: Vec<u8>,
        ttl: TransientTtl,
    },
}

impl DnsRecord {
    pub fn read<T: PacketBuffer>(buffer: &mut T) -> Result<DnsRecord> {
        let mut domain = String::new();
        buffer.read_qname(&mut domain)?;

        let qtype_num = buffer.read_u16()?;
        let qtype = QueryType::from_num(qtype_num);
        let class = buffer.read_u16()?;
        let ttl = buffer.read_u32()?;
        let data_len = buffer.read_u16()?;

        let data_start = buffer.pos();

        let record = match qtype {
            QueryType::A => {
                let raw_addr = buffer.read_u32()?;
                let addr = Ipv4Addr::new(
                    ((raw_addr >> 24) & 0xFF) as u8,
                    ((raw_addr >> 16) & 0xFF) as u8,
                    ((raw_addr >> 8) & 0xFF) as u8,
                    (raw_addr & 0xFF) as u8,
                );

                DnsRecord::A {
                    domain,
                    addr,
                    ttl: TransientTtl(ttl),
                }
            }
            QueryType::Ns => {
                let mut ns = String::new();
                buffer.read_qname(&mut ns)?;

                DnsRecord::Ns {
                    domain,
                    host: ns,
                    ttl: TransientTtl(ttl),
                }
            }
            QueryType::Cname => {
                let mut cname = String::new();
                buffer.read_qname(&mut cname)?;

                DnsRecord::Cname {
                    domain,
                    host: cname,
                    ttl: TransientTtl(ttl),
                }
            }
            QueryType::Unknown(_) => {
                let data = buffer.get_range(data_start, data_len as usize)?.to_vec();
                buffer.step(data_len as usize)?;

                log::debug!(
                    "Keeping rdata of unsupported type {} for {} uninterpreted",
                    qtype_num,
                    domain
                );

                DnsRecord::Opaque {
                    domain,
                    qtype: qtype_num,
                    class,
                    data,
                    ttl: TransientTtl(ttl),
                }
            }
        };

        let consumed = buffer.pos() - data_start;
        if consumed != data_len as usize {
            return Err(ProtocolError::RdataLength {
                declared: data_len,
                consumed,
            });
        }

        Ok(record)
    }

    pub fn write<T: PacketBuffer>(&self, buffer: &mut T) -> Result<usize> {
        let start_pos = buffer.pos();

        match *self {
            DnsRecord::A {
                ref domain,
                ref addr,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::A.to_num())?;
                buffer.write_u16(CLASS_IN)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(4)?;

                let octets = addr.octets();
                buffer.write_u8(octets[0])?;
                buffer.write_u8(octets[1])?;
                buffer.write_u8(octets[2])?;
                buffer.write_u8(octets[3])?;
            }
            DnsRecord::Ns {
                ref domain,
                ref host,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Ns.to_num())?;
                buffer.write_u16(CLASS_IN)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_qname(host)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Cname {
                ref domain,
                ref host,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Cname.to_num())?;
                buffer.write_u16(CLASS_IN)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_qname(host)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Opaque {
                ref domain,
                qtype,
                class,
                ref data,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(qtype)?;
                buffer.write_u16(class)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(data.len() as u16)?;

                for b in data {
                    buffer.write_u8(*b)?;
                }
            }
        }

        Ok(buffer.pos() - start_pos)
    }

    pub fn get_querytype(&self) -> QueryType {
        match *self {
            DnsRecord::A { .. } => QueryType::A,
            DnsRecord::Ns { .. } => QueryType::Ns,
            DnsRecord::Cname { .. } => QueryType::Cname,
            DnsRecord::Opaque { qtype, .. } => QueryType::from_num(qtype),
        }
    }
}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DnsRecord::A {
                ref domain,
                ref addr,
                ttl: TransientTtl(ttl),
            } => write!(f, "{} {} IN A {}", domain, ttl, addr),
            DnsRecord::Ns {
                ref domain,
                ref host,
                ttl: TransientTtl(ttl),
            } => write!(f, "{} {} IN NS {}", domain, ttl, host),
            DnsRecord::Cname {
                ref domain,
                ref host,
                ttl: TransientTtl(ttl),
            } => write!(f, "{} {} IN CNAME {}", domain, ttl, host),
            DnsRecord::Opaque {
                ref domain,
                qtype,
                ref data,
                ttl: TransientTtl(ttl),
                ..
            } => write!(f, "{} {} TYPE{} ({} bytes)", domain, ttl, qtype, data.len()),
        }
    }
}

/// The result code for a DNS query, as described in RFC 1035
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ResultCode {
    #[default]
    NOERROR,
    FORMERR,
    SERVFAIL,
    NXDOMAIN,
    NOTIMP,
    REFUSED,
    Unknown(u8),
}

impl ResultCode {
    pub fn to_num(&self) -> u8 {
        match *self {
            ResultCode::NOERROR => 0,
            ResultCode::FORMERR => 1,
            ResultCode::SERVFAIL => 2,
            ResultCode::NXDOMAIN => 3,
            ResultCode::NOTIMP => 4,
            ResultCode::REFUSED => 5,
            ResultCode::Unknown(x) => x & 0x0F,
        }
    }

    pub fn from_num(num: u8) -> ResultCode {
        match num & 0x0F {
            0 => ResultCode::NOERROR,
            1 => ResultCode::FORMERR,
            2 => ResultCode::SERVFAIL,
            3 => ResultCode::NXDOMAIN,
            4 => ResultCode::NOTIMP,
            5 => ResultCode::REFUSED,
            x => ResultCode::Unknown(x),
        }
    }
}

/// Representation of a DNS header
#[derive(Clone, Debug, Default)]
pub struct DnsHeader {
    pub id: u16, // 16 bits

    pub recursion_desired: bool,    // 1 bit
    pub truncated_message: bool,    // 1 bit
    pub authoritative_answer: bool, // 1 bit
    pub opcode: u8,                 // 4 bits
    pub response: bool,             // 1 bit

    pub rescode: ResultCode,       // 4 bits
    pub checking_disabled: bool,   // 1 bit
    pub authed_data: bool,         // 1 bit
    pub z: bool,                   // 1 bit
    pub recursion_available: bool, // 1 bit

    pub questions: u16,             // 16 bits
    pub answers: u16,               // 16 bits
    pub authoritative_entries: u16, // 16 bits
    pub resource_entries: u16,      // 16 bits
}

impl DnsHeader {
    pub fn new() -> DnsHeader {
        DnsHeader::default()
    }

    /// The second header word as it appears on the wire
    pub fn flags(&self) -> u16 {
        let a = (self.recursion_desired as u8)
            | ((self.truncated_message as u8) << 1)
            | ((self.authoritative_answer as u8) << 2)
            | ((self.opcode & 0x0F) << 3)
            | ((self.response as u8) << 7);

        let b = self.rescode.to_num()
            | ((self.checking_disabled as u8) << 4)
            | ((self.authed_data as u8) << 5)
            | ((self.z as u8) << 6)
            | ((self.recursion_available as u8) << 7);

        ((a as u16) << 8) | (b as u16)
    }

    pub fn write<T: PacketBuffer>(&self, buffer: &mut T) -> Result<()> {
        buffer.write_u16(self.id)?;
        buffer.write_u16(self.flags())?;

        buffer.write_u16(self.questions)?;
        buffer.write_u16(self.answers)?;
        buffer.write_u16(self.authoritative_entries)?;
        buffer.write_u16(self.resource_entries)?;

        Ok(())
    }

    pub fn read<T: PacketBuffer>(&mut self, buffer: &mut T) -> Result<()> {
        self.id = buffer.read_u16()?;

        let flags = buffer.read_u16()?;
        let a = (flags >> 8) as u8;
        let b = (flags & 0xFF) as u8;
        self.recursion_desired = (a & (1 << 0)) > 0;
        self.truncated_message = (a & (1 << 1)) > 0;
        self.authoritative_answer = (a & (1 << 2)) > 0;
        self.opcode = (a >> 3) & 0x0F;
        self.response = (a & (1 << 7)) > 0;

        self.rescode = ResultCode::from_num(b & 0x0F);
        self.checking_disabled = (b & (1 << 4)) > 0;
        self.authed_data = (b & (1 << 5)) > 0;
        self.z = (b & (1 << 6)) > 0;
        self.recursion_available = (b & (1 << 7)) > 0;

        self.questions = buffer.read_u16()?;
        self.answers = buffer.read_u16()?;
        self.authoritative_entries = buffer.read_u16()?;
        self.resource_entries = buffer.read_u16()?;

        Ok(())
    }
}

impl fmt::Display for DnsHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DnsHeader:")?;
        writeln!(f, "\tid: {0}", self.id)?;

        writeln!(f, "\trecursion_desired: {0}", self.recursion_desired)?;
        writeln!(f, "\ttruncated_message: {0}", self.truncated_message)?;
        writeln!(
            f,
            "\tauthoritative_answer: {0}",
            self.authoritative_answer
        )?;
        writeln!(f, "\topcode: {0}", self.opcode)?;
        writeln!(f, "\tresponse: {0}", self.response)?;

        writeln!(f, "\trescode: {:?}", self.rescode)?;
        writeln!(f, "\tchecking_disabled: {0}", self.checking_disabled)?;
        writeln!(f, "\tauthed_data: {0}", self.authed_data)?;
        writeln!(f, "\tz: {0}", self.z)?;
        writeln!(f, "\trecursion_available: {0}", self.recursion_available)?;

        writeln!(f, "\tquestions: {0}", self.questions)?;
        writeln!(f, "\tanswers: {0}", self.answers)?;
        writeln!(
            f,
            "\tauthoritative_entries: {0}",
            self.authoritative_entries
        )?;
        writeln!(f, "\tresource_entries: {0}", self.resource_entries)?;

        Ok(())
    }
}

/// Representation of a DNS question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: QueryType,
    pub qclass: u16,
}

impl DnsQuestion {
    pub fn new(name: String, qtype: QueryType) -> DnsQuestion {
        DnsQuestion {
            name,
            qtype,
            qclass: CLASS_IN,
        }
    }

    pub fn write<T: PacketBuffer>(&self, buffer: &mut T) -> Result<()> {
        buffer.write_qname(&self.name)?;
        buffer.write_u16(self.qtype.to_num())?;
        buffer.write_u16(self.qclass)?;

        Ok(())
    }

    pub fn read<T: PacketBuffer>(&mut self, buffer: &mut T) -> Result<()> {
        buffer.read_qname(&mut self.name)?;
        self.qtype = QueryType::from_num(buffer.read_u16()?);
        self.qclass = buffer.read_u16()?;

        Ok(())
    }
}

/// Representation of a complete DNS packet
///
/// Queries are built and responses decoded through this type. The resolver
/// inspects the three record sections through the lookup helpers below.
#[derive(Clone, Debug, Default)]
pub struct DnsPacket {
    pub header: DnsHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsRecord>,
    pub authorities: Vec<DnsRecord>,
    pub resources: Vec<DnsRecord>,
}

impl DnsPacket {
    pub fn new() -> DnsPacket {
        DnsPacket::default()
    }

    pub fn from_buffer<T: PacketBuffer>(buffer: &mut T) -> Result<DnsPacket> {
        let mut result = DnsPacket::new();
        result.header.read(buffer)?;

        for _ in 0..result.header.questions {
            let mut question = DnsQuestion::new("".to_string(), QueryType::Unknown(0));
            question.read(buffer)?;
            result.questions.push(question);
        }

        for _ in 0..result.header.answers {
            let rec = DnsRecord::read(buffer)?;
            result.answers.push(rec);
        }
        for _ in 0..result.header.authoritative_entries {
            let rec = DnsRecord::read(buffer)?;
            result.authorities.push(rec);
        }
        for _ in 0..result.header.resource_entries {
            let rec = DnsRecord::read(buffer)?;
            result.resources.push(rec);
        }

        Ok(result)
    }

    /// Serializes the packet, taking the section counts from the vectors
    pub fn write<T: PacketBuffer>(&mut self, buffer: &mut T) -> Result<()> {
        self.header.questions = self.questions.len() as u16;
        self.header.answers = self.answers.len() as u16;
        self.header.authoritative_entries = self.authorities.len() as u16;
        self.header.resource_entries = self.resources.len() as u16;

        self.header.write(buffer)?;

        for question in &self.questions {
            question.write(buffer)?;
        }

        for rec in self
            .answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.resources.iter())
        {
            rec.write(buffer)?;
        }

        Ok(())
    }

    pub fn print(&self) {
        log::debug!("{}", self.header);

        log::debug!("questions:");
        for x in &self.questions {
            log::debug!("\t{:?}", x);
        }

        log::debug!("answers:");
        for x in &self.answers {
            log::debug!("\t{}", x);
        }

        log::debug!("authorities:");
        for x in &self.authorities {
            log::debug!("\t{}", x);
        }

        log::debug!("resources:");
        for x in &self.resources {
            log::debug!("\t{}", x);
        }
    }

    /// Follows CNAME records in the answer section starting at `qname`
    ///
    /// The returned chain always starts with `qname`; every further entry is
    /// the target of an alias owned by the previous one. A chain that loops
    /// back on itself stops before repeating a name.
    pub fn get_alias_chain(&self, qname: &str) -> Vec<String> {
        let mut chain = vec![qname.to_string()];

        for _ in 0..self.answers.len() {
            let current = match chain.last() {
                Some(name) => name.clone(),
                None => break,
            };

            let target = self.answers.iter().find_map(|answer| match *answer {
                DnsRecord::Cname {
                    ref domain,
                    ref host,
                    ..
                } if domain.eq_ignore_ascii_case(&current) => Some(host.clone()),
                _ => None,
            });

            match target {
                Some(host) if !chain.iter().any(|x| x.eq_ignore_ascii_case(&host)) => {
                    chain.push(host)
                }
                _ => break,
            }
        }

        chain
    }

    /// All A records in the answer section owned by one of `names`
    pub fn get_addresses(&self, names: &[String]) -> Vec<Ipv4Addr> {
        self.answers
            .iter()
            .filter_map(|answer| match *answer {
                DnsRecord::A {
                    ref domain,
                    ref addr,
                    ..
                } if names.iter().any(|x| x.eq_ignore_ascii_case(domain)) => Some(*addr),
                _ => None,
            })
            .collect()
    }

    /// Nameserver host names the authority section delegates `qname` to
    ///
    /// NS records for zones that do not enclose `qname` are ignored.
    pub fn get_unresolved_ns(&self, qname: &str) -> Vec<String> {
        let mut hosts = Vec::new();
        for auth in &self.authorities {
            if let DnsRecord::Ns {
                ref domain,
                ref host,
                ..
            } = *auth
            {
                if !is_within(qname, domain) {
                    continue;
                }

                if !hosts.iter().any(|x: &String| x.eq_ignore_ascii_case(host)) {
                    hosts.push(host.clone());
                }
            }
        }

        hosts
    }

    /// Glue address for `host` from the additional section, if any
    pub fn get_resolved_ns(&self, host: &str) -> Option<Ipv4Addr> {
        self.resources.iter().find_map(|rsrc| match *rsrc {
            DnsRecord::A {
                ref domain,
                ref addr,
                ..
            } if domain.eq_ignore_ascii_case(host) => Some(*addr),
            _ => None,
        })
    }

    pub fn has_ns_records(&self) -> bool {
        self.authorities
            .iter()
            .any(|auth| auth.get_querytype() == QueryType::Ns)
    }
}

/// Builds a single-question query with a random transaction id
///
/// Flags are left at zero: no recursion is requested, since the resolver
/// walks the delegation chain itself. Returns the encoded message together
/// with the id a matching response must echo.
pub fn encode_query(qname: &str, qtype: QueryType, qclass: u16) -> Result<(Vec<u8>, u16)> {
    let mut packet = DnsPacket::new();
    packet.header.id = random::<u16>();
    packet.questions.push(DnsQuestion {
        name: qname.to_string(),
        qtype,
        qclass,
    });

    let mut buffer = VectorPacketBuffer::new();
    packet.write(&mut buffer)?;

    Ok((buffer.into_inner(), packet.header.id))
}

/// Decodes a received datagram into header, questions and all three sections
pub fn decode_response(data: &[u8]) -> Result<DnsPacket> {
    let mut buffer = BytePacketBuffer::from_bytes(data)?;
    DnsPacket::from_buffer(&mut buffer)
}
