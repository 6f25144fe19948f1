//! iterative resolution, walking referrals down from the root servers

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::vec::Vec;

use derive_more::{Display, Error};

use crate::dns::client::ClientError;
use crate::dns::context::ResolverContext;
use crate::dns::hostname::{self, HostnameError};
use crate::dns::protocol::{
    decode_response, encode_query, DnsPacket, ProtocolError, QueryType, ResultCode, CLASS_IN,
};
use crate::dns::validate::{validate, ValidationError};

/// Failure of a single exchange with a single server
///
/// These never end a resolution. The server is dropped and the walk moves on
/// to the next candidate.
#[derive(Debug, Display, Error)]
pub enum ExchangeError {
    Client(ClientError),
    Protocol(ProtocolError),
    Validation(ValidationError),
    #[display(fmt = "server answered with {:?}", rescode)]
    ServerFailure { rescode: ResultCode },
    #[display(fmt = "referral for {} names no enclosing zone", qname)]
    LameReferral { qname: String },
}

impl From<ClientError> for ExchangeError {
    fn from(err: ClientError) -> Self {
        ExchangeError::Client(err)
    }
}

impl From<ProtocolError> for ExchangeError {
    fn from(err: ProtocolError) -> Self {
        ExchangeError::Protocol(err)
    }
}

impl From<ValidationError> for ExchangeError {
    fn from(err: ValidationError) -> Self {
        ExchangeError::Validation(err)
    }
}

#[derive(Debug, Display, Error)]
pub enum ResolveError {
    #[display(fmt = "invalid domain name {:?}: {}", name, source)]
    InvalidDomainName { name: String, source: HostnameError },
    #[display(fmt = "{} does not exist (NXDOMAIN)", qname)]
    NxDomain { qname: String },
    #[display(fmt = "no nameserver could answer for {} (last error: {})", qname, last_error)]
    NoServersAvailable { qname: String, last_error: String },
    #[display(fmt = "{} gave neither an answer nor a referral for {}", server, qname)]
    EmptyResponse { qname: String, server: Ipv4Addr },
    #[display(fmt = "gave up on {} after {} queries", qname, max_hops)]
    MaxHopsExceeded { qname: String, max_hops: usize },
    #[display(fmt = "cannot encode a query for {}: {}", qname, source)]
    Encode { qname: String, source: ProtocolError },
    #[display(fmt = "looking up nameserver {} would nest deeper than {}", host, max_depth)]
    NsDepthExceeded { host: String, max_depth: usize },
}

type Result<T> = std::result::Result<T, ResolveError>;

/// A server the walk may ask next
#[derive(Clone, Debug, PartialEq)]
pub enum Nameserver {
    /// Known only by address, as the root hints are
    Address(Ipv4Addr),
    /// Named by an NS record, with the glue address if the referral had one
    Named { host: String, glue: Option<Ipv4Addr> },
}

impl fmt::Display for Nameserver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Nameserver::Address(addr) => write!(f, "{}", addr),
            Nameserver::Named {
                ref host,
                glue: Some(addr),
            } => write!(f, "{} ({})", host, addr),
            Nameserver::Named {
                ref host,
                glue: None,
            } => write!(f, "{} (no glue)", host),
        }
    }
}

/// Candidate servers, last in first out
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NameserverStack {
    entries: Vec<Nameserver>,
}

impl NameserverStack {
    pub fn new() -> NameserverStack {
        NameserverStack::default()
    }

    /// Pushes the roots in list order, so the last one is tried first
    pub fn from_roots(roots: &[Ipv4Addr]) -> NameserverStack {
        let mut stack = NameserverStack::new();
        for root in roots {
            stack.push(Nameserver::Address(*root));
        }

        stack
    }

    /// Candidates for the zone `packet` delegates `qname` to
    ///
    /// Servers with glue end up on top, so they are tried before any name
    /// that needs a lookup of its own.
    pub fn from_referral(packet: &DnsPacket, qname: &str) -> NameserverStack {
        let mut named = Vec::new();
        let mut glued = Vec::new();

        for host in packet.get_unresolved_ns(qname) {
            match packet.get_resolved_ns(&host) {
                Some(addr) => glued.push(Nameserver::Named {
                    host,
                    glue: Some(addr),
                }),
                None => named.push(Nameserver::Named { host, glue: None }),
            }
        }

        NameserverStack {
            entries: named.into_iter().chain(glued).collect(),
        }
    }

    pub fn push(&mut self, ns: Nameserver) {
        self.entries.push(ns);
    }

    pub fn pop(&mut self) -> Option<Nameserver> {
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The candidates in the order they will be popped
    pub fn try_order(&self) -> impl Iterator<Item = &Nameserver> {
        self.entries.iter().rev()
    }
}

/// One query sent during a resolution
#[derive(Clone, Debug, PartialEq)]
pub struct Hop {
    pub qname: String,
    pub server: Ipv4Addr,
    pub host: Option<String>,
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.host {
            Some(ref host) => write!(f, "{} @{} ({})", self.qname, self.server, host),
            None => write!(f, "{} @{}", self.qname, self.server),
        }
    }
}

/// Outcome of a successful resolution
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    /// The name that was asked for
    pub name: String,
    /// The name the addresses belong to, after following aliases
    pub canonical_name: String,
    pub addresses: Vec<Ipv4Addr>,
    /// Queries sent, including those spent on nameserver lookups
    pub hops: usize,
    pub trace: Vec<Hop>,
}

/// What the walk does after a usable response
#[derive(Debug, PartialEq)]
enum Step {
    Answer {
        canonical: String,
        addresses: Vec<Ipv4Addr>,
    },
    NxDomain,
    Alias(String),
    Referral(NameserverStack),
    Empty,
}

/// Mutable state of one walk for one name
#[derive(Debug)]
struct WalkState {
    qname: String,
    candidates: NameserverStack,
    queried: Vec<Ipv4Addr>,
    /// Addresses found for glue-less nameservers during this walk
    looked_up: Vec<(String, Ipv4Addr)>,
    last_error: Option<String>,
}

impl WalkState {
    fn new(qname: &str, roots: &[Ipv4Addr]) -> WalkState {
        WalkState {
            qname: qname.to_string(),
            candidates: NameserverStack::from_roots(roots),
            queried: Vec::new(),
            looked_up: Vec::new(),
            last_error: None,
        }
    }

    fn looked_up(&self, host: &str) -> Option<Ipv4Addr> {
        self.looked_up
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(host))
            .map(|(_, addr)| *addr)
    }

    /// Starts over from the roots for the alias target
    fn follow_alias(&mut self, target: String, roots: &[Ipv4Addr]) {
        self.qname = target;
        self.candidates = NameserverStack::from_roots(roots);
        self.queried.clear();
    }

    /// Replaces the candidates with the servers of the delegated zone
    fn follow_referral(&mut self, candidates: NameserverStack) {
        self.candidates = candidates;
    }

    fn no_servers(&self) -> ResolveError {
        ResolveError::NoServersAvailable {
            qname: self.qname.clone(),
            last_error: self
                .last_error
                .clone()
                .unwrap_or_else(|| "no candidates left".to_string()),
        }
    }
}

struct Answer {
    canonical: String,
    addresses: Vec<Ipv4Addr>,
}

/// The queries of one resolution, appended to the caller's trace
struct Budget<'a> {
    trace: &'a mut Vec<Hop>,
    start: usize,
    max_hops: usize,
}

impl<'a> Budget<'a> {
    fn spent(&self) -> usize {
        self.trace.len() - self.start
    }

    fn is_exhausted(&self) -> bool {
        self.spent() >= self.max_hops
    }

    fn record(&mut self, hop: Hop) {
        self.trace.push(hop);
    }
}

/// Iterative resolver
///
/// Starts every name at the configured root servers and follows referrals
/// and aliases itself, sending queries without the recursion desired bit.
/// Nameservers named without glue are looked up through the same walk,
/// sharing the hop budget of the resolution that needs them.
pub struct IterativeResolver {
    context: Arc<ResolverContext>,
}

impl IterativeResolver {
    pub fn new(context: Arc<ResolverContext>) -> IterativeResolver {
        IterativeResolver { context }
    }

    /// Resolves `qname` to its IPv4 addresses
    pub fn resolve(&self, qname: &str) -> Result<Resolution> {
        self.resolve_with_trace(qname, &mut Vec::new())
    }

    /// Like `resolve`, appending every query to `trace` as it is sent
    ///
    /// The trace stays available when the resolution fails. Entries already
    /// in `trace` count neither against the hop budget nor towards the
    /// returned `Resolution`.
    pub fn resolve_with_trace(&self, qname: &str, trace: &mut Vec<Hop>) -> Result<Resolution> {
        hostname::validate(qname).map_err(|source| ResolveError::InvalidDomainName {
            name: qname.to_string(),
            source,
        })?;

        let name = qname.strip_suffix('.').unwrap_or(qname);
        let start = trace.len();
        let mut budget = Budget {
            trace,
            start,
            max_hops: self.context.config.max_hops,
        };
        let answer = self.walk(name, 0, &mut budget)?;

        Ok(Resolution {
            name: name.to_string(),
            canonical_name: answer.canonical,
            addresses: answer.addresses,
            hops: budget.spent(),
            trace: budget.trace[start..].to_vec(),
        })
    }

    fn walk(&self, qname: &str, depth: usize, budget: &mut Budget) -> Result<Answer> {
        let config = &self.context.config;
        let mut state = WalkState::new(qname, &config.root_servers);

        loop {
            let candidate = match state.candidates.pop() {
                Some(x) => x,
                None => {
                    log::warn!("ran out of nameservers for {}", state.qname);
                    return Err(state.no_servers());
                }
            };

            let (server, host) = match candidate {
                Nameserver::Address(addr) => (addr, None),
                Nameserver::Named {
                    host,
                    glue: Some(addr),
                } => (addr, Some(host)),
                Nameserver::Named { host, glue: None } => {
                    let found = match state.looked_up(&host) {
                        Some(addr) => Ok(addr),
                        None => self.lookup_nameserver(&host, depth, budget).map(|addr| {
                            state.looked_up.push((host.clone(), addr));
                            addr
                        }),
                    };

                    match found {
                        Ok(addr) => (addr, Some(host)),
                        Err(ResolveError::MaxHopsExceeded { max_hops, .. }) => {
                            log::warn!("query budget ran out while looking up nameserver {}", host);
                            return Err(ResolveError::MaxHopsExceeded {
                                qname: state.qname.clone(),
                                max_hops,
                            });
                        }
                        Err(e) => {
                            log::warn!("dropping nameserver {}: {}", host, e);
                            state.last_error = Some(e.to_string());
                            continue;
                        }
                    }
                }
            };

            if state.queried.contains(&server) {
                log::debug!("{} was already asked about {}", server, state.qname);
                continue;
            }
            state.queried.push(server);

            if budget.is_exhausted() {
                log::warn!(
                    "query budget of {} spent while resolving {}",
                    config.max_hops,
                    state.qname
                );
                return Err(ResolveError::MaxHopsExceeded {
                    qname: state.qname.clone(),
                    max_hops: config.max_hops,
                });
            }

            let (query, id) = encode_query(&state.qname, QueryType::A, CLASS_IN).map_err(
                |source| ResolveError::Encode {
                    qname: state.qname.clone(),
                    source,
                },
            )?;

            log::info!(
                "attempting lookup of {} with ns {} {}",
                state.qname,
                server,
                host.as_deref().unwrap_or("")
            );
            budget.record(Hop {
                qname: state.qname.clone(),
                server,
                host,
            });

            let step = self
                .exchange(server, &query, id)
                .and_then(|packet| interpret(&state.qname, &packet));

            match step {
                Ok(Step::Answer {
                    canonical,
                    addresses,
                }) => {
                    log::info!("{} resolved to {:?}", canonical, addresses);
                    return Ok(Answer {
                        canonical,
                        addresses,
                    });
                }
                Ok(Step::NxDomain) => {
                    log::info!("{} reports {} as nonexistent", server, state.qname);
                    return Err(ResolveError::NxDomain {
                        qname: state.qname.clone(),
                    });
                }
                Ok(Step::Alias(target)) => {
                    log::info!("{} is an alias for {}, restarting at the roots", state.qname, target);
                    state.follow_alias(target, &config.root_servers);
                }
                Ok(Step::Referral(candidates)) => {
                    log::info!(
                        "{} referred {} to {} nameservers",
                        server,
                        state.qname,
                        candidates.len()
                    );
                    state.follow_referral(candidates);
                }
                Ok(Step::Empty) => {
                    return Err(ResolveError::EmptyResponse {
                        qname: state.qname.clone(),
                        server,
                    });
                }
                Err(e) => {
                    log::warn!("dropping server {}: {}", server, e);
                    state.last_error = Some(format!("{}: {}", server, e));
                }
            }
        }
    }

    /// Finds an address for a nameserver the referral gave no glue for
    fn lookup_nameserver(&self, host: &str, depth: usize, budget: &mut Budget) -> Result<Ipv4Addr> {
        let max_depth = self.context.config.max_ns_depth;
        if depth >= max_depth {
            return Err(ResolveError::NsDepthExceeded {
                host: host.to_string(),
                max_depth,
            });
        }

        log::info!("resolving nameserver {} which came without glue", host);
        let answer = self.walk(host, depth + 1, budget)?;

        match answer.addresses.first() {
            Some(addr) => Ok(*addr),
            None => Err(ResolveError::NoServersAvailable {
                qname: host.to_string(),
                last_error: "no address records".to_string(),
            }),
        }
    }

    /// Sends one query and accepts the reply only if it answers that query
    fn exchange(
        &self,
        server: Ipv4Addr,
        query: &[u8],
        id: u16,
    ) -> std::result::Result<DnsPacket, ExchangeError> {
        let data = self.context.client.query(server, query)?;
        let packet = decode_response(&data)?;
        packet.print();

        match validate(&packet.header, id)? {
            ResultCode::NOERROR | ResultCode::NXDOMAIN => Ok(packet),
            rescode => Err(ExchangeError::ServerFailure { rescode }),
        }
    }
}

/// Decides the next step from a validated response
fn interpret(qname: &str, packet: &DnsPacket) -> std::result::Result<Step, ExchangeError> {
    if packet.header.rescode == ResultCode::NXDOMAIN {
        return Ok(Step::NxDomain);
    }

    let chain = packet.get_alias_chain(qname);
    let addresses = packet.get_addresses(&chain);
    let canonical = chain.last().cloned().unwrap_or_else(|| qname.to_string());

    if !addresses.is_empty() {
        return Ok(Step::Answer {
            canonical,
            addresses,
        });
    }

    if chain.len() > 1 {
        return Ok(Step::Alias(canonical));
    }

    let candidates = NameserverStack::from_referral(packet, qname);
    if !candidates.is_empty() {
        return Ok(Step::Referral(candidates));
    }

    if packet.has_ns_records() {
        return Err(ExchangeError::LameReferral {
            qname: qname.to_string(),
        });
    }

    Ok(Step::Empty)
}

#[cfg(test)]
mod tests {

    use std::net::SocketAddrV4;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::dns::buffer::VectorPacketBuffer;
    use crate::dns::client::DnsClient;
    use crate::dns::context::tests::create_test_context;
    use crate::dns::context::ResolverConfig;
    use crate::dns::protocol::{DnsRecord, TransientTtl};

    use super::*;

    const ROOT_1: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const ROOT_2: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const ROOT_3: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);

    fn test_config() -> ResolverConfig {
        ResolverConfig {
            root_servers: vec![ROOT_1, ROOT_2, ROOT_3],
            ..ResolverConfig::default()
        }
    }

    fn timeout(server: Ipv4Addr) -> ClientError {
        ClientError::TimeOut {
            server: SocketAddrV4::new(server, 53),
            timeout: Duration::from_millis(10),
        }
    }

    fn answer(domain: &str, addr: &str) -> DnsPacket {
        let mut packet = DnsPacket::new();
        packet.answers.push(DnsRecord::A {
            domain: domain.to_string(),
            addr: addr.parse().unwrap(),
            ttl: TransientTtl(3600),
        });
        packet
    }

    fn referral(zone: &str, host: &str, glue: Option<&str>) -> DnsPacket {
        let mut packet = DnsPacket::new();
        packet.authorities.push(DnsRecord::Ns {
            domain: zone.to_string(),
            host: host.to_string(),
            ttl: TransientTtl(172800),
        });
        if let Some(addr) = glue {
            packet.resources.push(DnsRecord::A {
                domain: host.to_string(),
                addr: addr.parse().unwrap(),
                ttl: TransientTtl(172800),
            });
        }
        packet
    }

    fn qname_of(request: &DnsPacket) -> &str {
        &request.questions[0].name
    }

    fn servers(context: &Arc<ResolverContext>) -> usize {
        context.client.get_sent_count()
    }

    #[test]
    fn test_roots_are_tried_last_first() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let context = create_test_context(
            test_config(),
            Box::new(move |server, _| {
                seen.lock().unwrap().push(server);
                Err(timeout(server))
            }),
        );
        let resolver = IterativeResolver::new(context);

        match resolver.resolve("example.com") {
            Err(ResolveError::NoServersAvailable { qname, last_error }) => {
                assert_eq!("example.com", qname);
                assert!(last_error.starts_with("10.0.0.1"));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(vec![ROOT_3, ROOT_2, ROOT_1], *calls.lock().unwrap());
    }

    #[test]
    fn test_failed_server_is_dropped() {
        let context = create_test_context(
            test_config(),
            Box::new(|server, request| {
                if server == ROOT_3 {
                    return Err(timeout(server));
                }
                Ok(answer(qname_of(request), "93.184.216.34"))
            }),
        );
        let resolver = IterativeResolver::new(context.clone());

        let res = resolver.resolve("example.com").unwrap();
        assert_eq!(vec!["93.184.216.34".parse::<Ipv4Addr>().unwrap()], res.addresses);
        assert_eq!(2, res.hops);
        assert_eq!(ROOT_3, res.trace[0].server);
        assert_eq!(ROOT_2, res.trace[1].server);
        assert_eq!(2, servers(&context));
    }

    #[test]
    fn test_server_failure_and_lame_referral_are_dropped() {
        let context = create_test_context(
            test_config(),
            Box::new(|server, request| {
                if server == ROOT_3 {
                    let mut packet = DnsPacket::new();
                    packet.header.rescode = ResultCode::SERVFAIL;
                    Ok(packet)
                } else if server == ROOT_2 {
                    Ok(referral("net", "a.gtld-servers.net", Some("10.1.0.1")))
                } else {
                    Ok(answer(qname_of(request), "10.5.5.5"))
                }
            }),
        );
        let resolver = IterativeResolver::new(context);

        let res = resolver.resolve("example.com").unwrap();
        assert_eq!(vec![Ipv4Addr::new(10, 5, 5, 5)], res.addresses);
        assert_eq!(3, res.hops);
    }

    #[test]
    fn test_nxdomain_is_terminal() {
        let context = create_test_context(
            test_config(),
            Box::new(|_, _| {
                let mut packet = DnsPacket::new();
                packet.header.rescode = ResultCode::NXDOMAIN;
                Ok(packet)
            }),
        );
        let resolver = IterativeResolver::new(context.clone());

        match resolver.resolve("nonexistent.invalid") {
            Err(ResolveError::NxDomain { qname }) => assert_eq!("nonexistent.invalid", qname),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(1, servers(&context));
    }

    #[test]
    fn test_empty_response() {
        let context = create_test_context(test_config(), Box::new(|_, _| Ok(DnsPacket::new())));
        let resolver = IterativeResolver::new(context);

        match resolver.resolve("example.com") {
            Err(ResolveError::EmptyResponse { qname, server }) => {
                assert_eq!("example.com", qname);
                assert_eq!(ROOT_3, server);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_referral_with_glue() {
        let context = create_test_context(
            test_config(),
            Box::new(|server, request| {
                let packet = match server.octets() {
                    [10, 0, 0, _] => referral("com", "a.gtld-servers.net", Some("10.1.0.1")),
                    [10, 1, 0, 1] => {
                        referral("example.com", "a.iana-servers.net", Some("10.2.0.1"))
                    }
                    [10, 2, 0, 1] => answer(qname_of(request), "93.184.216.34"),
                    _ => panic!("unexpected server {}", server),
                };
                Ok(packet)
            }),
        );
        let resolver = IterativeResolver::new(context);

        let res = resolver.resolve("Example.COM.").unwrap();
        assert_eq!("Example.COM", res.name);
        assert_eq!(vec![Ipv4Addr::new(93, 184, 216, 34)], res.addresses);
        assert_eq!(
            vec![
                Hop {
                    qname: "Example.COM".to_string(),
                    server: ROOT_3,
                    host: None
                },
                Hop {
                    qname: "Example.COM".to_string(),
                    server: Ipv4Addr::new(10, 1, 0, 1),
                    host: Some("a.gtld-servers.net".to_string())
                },
                Hop {
                    qname: "Example.COM".to_string(),
                    server: Ipv4Addr::new(10, 2, 0, 1),
                    host: Some("a.iana-servers.net".to_string())
                },
            ],
            res.trace
        );
    }

    #[test]
    fn test_referral_cycle_terminates() {
        let config = ResolverConfig {
            max_hops: 10,
            ..test_config()
        };
        let context = create_test_context(
            config,
            Box::new(|server, _| {
                let packet = match server.octets() {
                    [10, 9, 0, 1] => referral("com", "ns-b.example.net", Some("10.9.0.2")),
                    _ => referral("com", "ns-a.example.net", Some("10.9.0.1")),
                };
                Ok(packet)
            }),
        );
        let resolver = IterativeResolver::new(context.clone());

        assert!(resolver.resolve("example.com").is_err());
        assert!(servers(&context) <= 10);
    }

    #[test]
    fn test_hop_budget() {
        let config = ResolverConfig {
            max_hops: 5,
            ..test_config()
        };
        let context = create_test_context(
            config,
            Box::new(|server, _| {
                let [a, b, c, d] = server.octets();
                let next = Ipv4Addr::new(a, b, c.wrapping_add(1), d).to_string();
                Ok(referral("com", &format!("ns{}.example.net", c), Some(next.as_str())))
            }),
        );
        let resolver = IterativeResolver::new(context.clone());

        match resolver.resolve("example.com") {
            Err(ResolveError::MaxHopsExceeded { max_hops, .. }) => assert_eq!(5, max_hops),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(5, servers(&context));
    }

    #[test]
    fn test_glueless_nameserver_is_resolved() {
        let context = create_test_context(
            test_config(),
            Box::new(|server, request| {
                let qname = qname_of(request);
                let packet = match (server.octets(), qname) {
                    ([10, 0, 0, _], "example.com") => {
                        referral("example.com", "ns.other.net", None)
                    }
                    ([10, 0, 0, _], "ns.other.net") => answer(qname, "10.3.0.1"),
                    ([10, 3, 0, 1], "example.com") => answer(qname, "93.184.216.34"),
                    _ => panic!("unexpected query for {} to {}", qname, server),
                };
                Ok(packet)
            }),
        );
        let resolver = IterativeResolver::new(context);

        let res = resolver.resolve("example.com").unwrap();
        assert_eq!(vec![Ipv4Addr::new(93, 184, 216, 34)], res.addresses);

        let asked: Vec<(&str, Ipv4Addr)> = res
            .trace
            .iter()
            .map(|hop| (hop.qname.as_str(), hop.server))
            .collect();
        assert_eq!(
            vec![
                ("example.com", ROOT_3),
                ("ns.other.net", ROOT_3),
                ("example.com", Ipv4Addr::new(10, 3, 0, 1)),
            ],
            asked
        );
    }

    #[test]
    fn test_glueless_nameserver_depth_limit() {
        let config = ResolverConfig {
            max_ns_depth: 0,
            ..test_config()
        };
        let context = create_test_context(
            config,
            Box::new(|_, _| Ok(referral("example.com", "ns.other.net", None))),
        );
        let resolver = IterativeResolver::new(context.clone());

        match resolver.resolve("example.com") {
            Err(ResolveError::NoServersAvailable { last_error, .. }) => {
                assert!(last_error.contains("ns.other.net"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(1, servers(&context));
    }

    #[test]
    fn test_budget_spent_on_nameserver_lookup_names_the_query() {
        let config = ResolverConfig {
            max_hops: 3,
            ..test_config()
        };
        let context = create_test_context(
            config,
            Box::new(|server, request| {
                if qname_of(request) == "example.com" {
                    return Ok(referral("example.com", "ns.other.net", None));
                }
                let [a, b, c, d] = server.octets();
                let next = Ipv4Addr::new(a, b, c + 1, d).to_string();
                Ok(referral("net", &format!("ns{}.other.net", c), Some(next.as_str())))
            }),
        );
        let resolver = IterativeResolver::new(context.clone());

        match resolver.resolve("example.com") {
            Err(ResolveError::MaxHopsExceeded { qname, max_hops }) => {
                assert_eq!("example.com", qname);
                assert_eq!(3, max_hops);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(3, servers(&context));
    }

    #[test]
    fn test_glueless_nameserver_is_looked_up_once() {
        let context = create_test_context(
            test_config(),
            Box::new(|server, request| {
                let qname = qname_of(request);
                let packet = match (server.octets(), qname) {
                    (_, "example.com") => referral("example.com", "ns.other.net", None),
                    ([10, 0, 0, _], "ns.other.net") => answer(qname, "10.3.0.1"),
                    _ => panic!("unexpected query for {} to {}", qname, server),
                };
                Ok(packet)
            }),
        );
        let resolver = IterativeResolver::new(context.clone());

        match resolver.resolve("example.com") {
            Err(ResolveError::NoServersAvailable { qname, .. }) => assert_eq!("example.com", qname),
            other => panic!("unexpected {:?}", other),
        }
        // roots for example.com, roots for ns.other.net, then 10.3.0.1 once
        assert_eq!(3, servers(&context));
    }

    #[test]
    fn test_alias_restarts_from_roots() {
        let context = create_test_context(
            test_config(),
            Box::new(|server, request| {
                assert_eq!(ROOT_3, server);

                let qname = qname_of(request);
                if qname == "alias.example.com" {
                    let mut packet = DnsPacket::new();
                    packet.answers.push(DnsRecord::Cname {
                        domain: qname.to_string(),
                        host: "target.example.com".to_string(),
                        ttl: TransientTtl(300),
                    });
                    Ok(packet)
                } else {
                    Ok(answer(qname, "10.4.0.1"))
                }
            }),
        );
        let resolver = IterativeResolver::new(context);

        let res = resolver.resolve("alias.example.com").unwrap();
        assert_eq!("alias.example.com", res.name);
        assert_eq!("target.example.com", res.canonical_name);
        assert_eq!(vec![Ipv4Addr::new(10, 4, 0, 1)], res.addresses);
        assert_eq!(2, res.hops);
    }

    #[test]
    fn test_alias_answered_in_one_response() {
        let context = create_test_context(
            test_config(),
            Box::new(|_, request| {
                let mut packet = answer("target.example.com", "10.4.0.2");
                packet.answers.insert(
                    0,
                    DnsRecord::Cname {
                        domain: qname_of(request).to_string(),
                        host: "target.example.com".to_string(),
                        ttl: TransientTtl(300),
                    },
                );
                Ok(packet)
            }),
        );
        let resolver = IterativeResolver::new(context);

        let res = resolver.resolve("www.example.com").unwrap();
        assert_eq!("target.example.com", res.canonical_name);
        assert_eq!(1, res.hops);
    }

    #[test]
    fn test_invalid_name_sends_nothing() {
        let context = create_test_context(test_config(), Box::new(|_, _| Ok(DnsPacket::new())));
        let resolver = IterativeResolver::new(context.clone());

        match resolver.resolve("localhost") {
            Err(ResolveError::InvalidDomainName { name, .. }) => assert_eq!("localhost", name),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(0, servers(&context));
    }

    /// Answers correctly, except that the last root echoes the wrong id
    struct MismatchingClient;

    impl DnsClient for MismatchingClient {
        fn get_sent_count(&self) -> usize {
            0
        }

        fn get_failed_count(&self) -> usize {
            0
        }

        fn query(
            &self,
            server: Ipv4Addr,
            datagram: &[u8],
        ) -> std::result::Result<Vec<u8>, ClientError> {
            let request = decode_response(datagram).unwrap();

            let mut packet = answer(qname_of(&request), "10.6.0.1");
            packet.header.id = request.header.id;
            if server == ROOT_3 {
                packet.header.id = packet.header.id.wrapping_add(1);
            }
            packet.header.response = true;
            packet.questions = request.questions.clone();

            let mut buffer = VectorPacketBuffer::new();
            packet.write(&mut buffer).unwrap();
            Ok(buffer.into_inner())
        }
    }

    #[test]
    fn test_mismatched_id_is_dropped() {
        let context = ResolverContext::with_client(test_config(), Box::new(MismatchingClient));
        let resolver = IterativeResolver::new(context);

        let mut trace = Vec::new();
        let res = resolver.resolve_with_trace("example.com", &mut trace).unwrap();

        assert_eq!(vec![Ipv4Addr::new(10, 6, 0, 1)], res.addresses);
        assert_eq!(ROOT_2, trace[1].server);
    }

    #[test]
    fn test_shared_trace_does_not_spend_budget() {
        let config = ResolverConfig {
            max_hops: 2,
            ..test_config()
        };
        let context = create_test_context(
            config,
            Box::new(|_, request| Ok(answer(qname_of(request), "10.7.0.1"))),
        );
        let resolver = IterativeResolver::new(context);

        let mut trace = Vec::new();
        for name in &["a.example.com", "b.example.com", "c.example.com"] {
            let res = resolver.resolve_with_trace(name, &mut trace).unwrap();
            assert_eq!(1, res.hops);
            assert_eq!(1, res.trace.len());
            assert_eq!(*name, res.trace[0].qname);
        }
        assert_eq!(3, trace.len());
    }

    #[test]
    fn test_nameserver_stack_order() {
        let mut packet = referral("com", "a.gtld-servers.net", None);
        packet.authorities.push(DnsRecord::Ns {
            domain: "com".to_string(),
            host: "b.gtld-servers.net".to_string(),
            ttl: TransientTtl(172800),
        });
        packet.resources.push(DnsRecord::A {
            domain: "b.gtld-servers.net".to_string(),
            addr: Ipv4Addr::new(10, 1, 0, 2),
            ttl: TransientTtl(172800),
        });

        let mut stack = NameserverStack::from_referral(&packet, "example.com");
        assert_eq!(2, stack.len());
        assert_eq!(
            vec![
                "b.gtld-servers.net (10.1.0.2)".to_string(),
                "a.gtld-servers.net (no glue)".to_string()
            ],
            stack.try_order().map(|ns| ns.to_string()).collect::<Vec<_>>()
        );

        stack.push(Nameserver::Address(ROOT_1));
        assert_eq!(Some(Nameserver::Address(ROOT_1)), stack.pop());
    }
}
