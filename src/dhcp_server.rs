//! DHCP server for stations joining the access point
//!
//! Hands out addresses from a small pool next to the AP address. Only the
//! messages a phone or laptop needs to get online are answered: DISCOVER,
//! REQUEST and RELEASE.

use crate::wifi::{ap_broadcast_address, ap_netmask};
use crate::{BoardError, config};
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Ipv4Address, Stack};
use embassy_time::{Duration, Instant};
use esp_println::println;
use heapless::Vec;

const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;
const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const MIN_DHCP_FRAME: usize = 240;
const MAX_LEASES: usize = 8;

const OPT_SUBNET_MASK: u8 = 1;
const OPT_ROUTER: u8 = 3;
const OPT_DNS: u8 = 6;
const OPT_BROADCAST: u8 = 28;
const OPT_REQUESTED_IP: u8 = 50;
const OPT_LEASE_TIME: u8 = 51;
const OPT_MESSAGE_TYPE: u8 = 53;
const OPT_SERVER_ID: u8 = 54;
const OPT_END: u8 = 255;

/// DHCP message types (option 53)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpMessageType {
    Discover,
    Offer,
    Request,
    Ack,
    Nak,
    Release,
    Other(u8),
}

impl DhcpMessageType {
    fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            other => Self::Other(other),
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::Discover => 1,
            Self::Offer => 2,
            Self::Request => 3,
            Self::Ack => 5,
            Self::Nak => 6,
            Self::Release => 7,
            Self::Other(code) => code,
        }
    }
}

/// The fields of a client message the server acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpMessage {
    pub msg_type: DhcpMessageType,
    pub transaction_id: u32,
    pub flags: u16,
    pub client_mac: [u8; 6],
    pub client_ip: Option<Ipv4Address>,
    pub requested_ip: Option<Ipv4Address>,
    pub server_id: Option<Ipv4Address>,
}

/// Parse a BOOTREQUEST; anything else (or malformed input) yields `None`
pub fn parse_dhcp_message(frame: &[u8]) -> Option<DhcpMessage> {
    if frame.len() < MIN_DHCP_FRAME || frame[0] != 1 {
        return None;
    }
    // Ethernet style hardware address only
    if frame[1] != 1 || frame[2] != 6 {
        return None;
    }
    if frame[236..240] != DHCP_MAGIC_COOKIE {
        return None;
    }

    let transaction_id = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
    let flags = u16::from_be_bytes([frame[10], frame[11]]);

    let mut msg_type = None;
    let mut requested_ip = None;
    let mut server_id = None;

    let mut idx = MIN_DHCP_FRAME;
    while idx < frame.len() {
        let opt = frame[idx];
        idx += 1;
        match opt {
            0 => continue,
            OPT_END => break,
            _ => {
                let len = *frame.get(idx)? as usize;
                idx += 1;
                let data = frame.get(idx..idx + len)?;
                match (opt, len) {
                    (OPT_MESSAGE_TYPE, 1) => msg_type = Some(DhcpMessageType::from_code(data[0])),
                    (OPT_REQUESTED_IP, 4) => {
                        requested_ip = Some(Ipv4Address::new(data[0], data[1], data[2], data[3]))
                    }
                    (OPT_SERVER_ID, 4) => {
                        server_id = Some(Ipv4Address::new(data[0], data[1], data[2], data[3]))
                    }
                    _ => {}
                }
                idx += len;
            }
        }
    }

    let ciaddr = Ipv4Address::new(frame[12], frame[13], frame[14], frame[15]);
    let mut client_mac = [0u8; 6];
    client_mac.copy_from_slice(&frame[28..34]);

    Some(DhcpMessage {
        msg_type: msg_type?,
        transaction_id,
        flags,
        client_mac,
        client_ip: (ciaddr != Ipv4Address::UNSPECIFIED).then_some(ciaddr),
        requested_ip,
        server_id,
    })
}

fn append_option(dest: &mut [u8], code: u8, payload: &[u8]) -> Option<usize> {
    let needed = payload.len() + 2;
    let slot = dest.get_mut(..needed)?;
    slot[0] = code;
    slot[1] = payload.len() as u8;
    slot[2..].copy_from_slice(payload);
    Some(needed)
}

/// Build a BOOTREPLY into `scratch` and return its length
pub fn build_dhcp_reply(
    scratch: &mut [u8],
    request: &DhcpMessage,
    reply_type: DhcpMessageType,
    offered_ip: Ipv4Address,
) -> Option<usize> {
    if scratch.len() < 300 {
        return None;
    }

    let server = config::AP_IP_ADDRESS.octets();

    scratch.fill(0);
    scratch[0] = 2; // BOOTREPLY
    scratch[1] = 1;
    scratch[2] = 6;
    scratch[4..8].copy_from_slice(&request.transaction_id.to_be_bytes());
    scratch[10..12].copy_from_slice(&request.flags.to_be_bytes());
    if reply_type != DhcpMessageType::Nak {
        scratch[16..20].copy_from_slice(&offered_ip.octets());
        scratch[20..24].copy_from_slice(&server);
    }
    scratch[28..34].copy_from_slice(&request.client_mac);
    scratch[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);

    let mut idx = MIN_DHCP_FRAME;
    idx += append_option(&mut scratch[idx..], OPT_MESSAGE_TYPE, &[reply_type.code()])?;
    idx += append_option(&mut scratch[idx..], OPT_SERVER_ID, &server)?;
    if reply_type != DhcpMessageType::Nak {
        idx += append_option(
            &mut scratch[idx..],
            OPT_LEASE_TIME,
            &config::DHCP_LEASE_SECONDS.to_be_bytes(),
        )?;
        idx += append_option(&mut scratch[idx..], OPT_SUBNET_MASK, &ap_netmask().octets())?;
        idx += append_option(&mut scratch[idx..], OPT_ROUTER, &server)?;
        idx += append_option(&mut scratch[idx..], OPT_DNS, &server)?;
        idx += append_option(
            &mut scratch[idx..],
            OPT_BROADCAST,
            &ap_broadcast_address().octets(),
        )?;
    }
    *scratch.get_mut(idx)? = OPT_END;

    Some(idx + 1)
}

#[derive(Debug, Clone, Copy)]
struct DhcpLease {
    mac: [u8; 6],
    ip: Ipv4Address,
    expires_at: Instant,
}

/// Address pool with per-MAC leases
pub struct LeaseTable {
    leases: Vec<DhcpLease, MAX_LEASES>,
    pool_start: Ipv4Address,
    pool_size: u8,
}

impl LeaseTable {
    pub fn new(pool_start: Ipv4Address, pool_size: u8) -> Self {
        Self {
            leases: Vec::new(),
            pool_start,
            pool_size: pool_size.min(MAX_LEASES as u8),
        }
    }

    /// Whether `ip` is one of the addresses this table hands out
    pub fn in_pool(&self, ip: Ipv4Address) -> bool {
        let start = u32::from_be_bytes(self.pool_start.octets());
        let value = u32::from_be_bytes(ip.octets());
        value >= start && value < start + self.pool_size as u32
    }

    fn pool_address(&self, offset: u8) -> Ipv4Address {
        let start = u32::from_be_bytes(self.pool_start.octets());
        Ipv4Address::from((start + offset as u32).to_be_bytes())
    }

    /// Find or allocate an address for `mac`, preferring `requested`
    pub fn assign(
        &mut self,
        mac: [u8; 6],
        requested: Option<Ipv4Address>,
        now: Instant,
    ) -> Option<Ipv4Address> {
        self.leases.retain(|lease| lease.expires_at > now);
        let expires_at = now + Duration::from_secs(config::DHCP_LEASE_SECONDS as u64);

        let wanted = requested.filter(|ip| {
            self.in_pool(*ip)
                && self
                    .leases
                    .iter()
                    .all(|lease| lease.mac == mac || lease.ip != *ip)
        });

        if let Some(existing) = self.leases.iter_mut().find(|lease| lease.mac == mac) {
            if let Some(ip) = wanted {
                existing.ip = ip;
            }
            existing.expires_at = expires_at;
            return Some(existing.ip);
        }

        let ip = match wanted {
            Some(ip) => ip,
            None => (0..self.pool_size)
                .map(|offset| self.pool_address(offset))
                .find(|candidate| self.leases.iter().all(|lease| lease.ip != *candidate))?,
        };

        self.leases
            .push(DhcpLease {
                mac,
                ip,
                expires_at,
            })
            .ok()?;
        Some(ip)
    }

    /// Drop the lease held by `mac`, if any
    pub fn release(&mut self, mac: [u8; 6]) {
        self.leases.retain(|lease| lease.mac != mac);
    }

    /// Number of live leases
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

/// Decide how to answer a client message
///
/// Returns the reply type and the address to put in it, or `None` when no
/// reply should be sent.
pub fn plan_reply(
    leases: &mut LeaseTable,
    message: &DhcpMessage,
    now: Instant,
) -> Option<(DhcpMessageType, Ipv4Address)> {
    match message.msg_type {
        DhcpMessageType::Discover => leases
            .assign(message.client_mac, message.requested_ip, now)
            .map(|ip| (DhcpMessageType::Offer, ip)),
        DhcpMessageType::Request => {
            // Selecting another server's offer
            if message
                .server_id
                .is_some_and(|id| id != config::AP_IP_ADDRESS)
            {
                return None;
            }
            let requested = message.requested_ip.or(message.client_ip);
            match requested {
                Some(ip) if !leases.in_pool(ip) => {
                    Some((DhcpMessageType::Nak, Ipv4Address::UNSPECIFIED))
                }
                _ => match leases.assign(message.client_mac, requested, now) {
                    Some(ip) if requested.is_none_or(|wanted| wanted == ip) => {
                        Some((DhcpMessageType::Ack, ip))
                    }
                    _ => Some((DhcpMessageType::Nak, Ipv4Address::UNSPECIFIED)),
                },
            }
        }
        DhcpMessageType::Release => {
            leases.release(message.client_mac);
            None
        }
        _ => None,
    }
}

/// Serve DHCP on the access point interface forever
pub async fn run(stack: &Stack<'_>) -> Result<(), BoardError> {
    let mut rx_buffer = [0u8; 1024];
    let mut tx_buffer = [0u8; 1024];
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];

    stack.wait_config_up().await;

    let mut socket = UdpSocket::new(
        *stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    if let Err(e) = socket.bind(DHCP_SERVER_PORT) {
        println!("[DHCP] Failed to bind port {}: {:?}", DHCP_SERVER_PORT, e);
        return Err(BoardError::DhcpError);
    }
    println!("[DHCP] DHCP server listening on port {}", DHCP_SERVER_PORT);

    let mut leases = LeaseTable::new(config::DHCP_POOL_START, config::DHCP_POOL_SIZE);
    let mut frame = [0u8; 576];
    let mut reply = [0u8; 320];
    let broadcast = IpEndpoint::new(Ipv4Address::BROADCAST.into(), DHCP_CLIENT_PORT);

    loop {
        let len = match socket.recv_from(&mut frame).await {
            Ok((len, _)) => len,
            Err(e) => {
                println!("[DHCP] Receive error: {:?}", e);
                continue;
            }
        };

        let Some(message) = parse_dhcp_message(&frame[..len]) else {
            continue;
        };

        let Some((reply_type, ip)) = plan_reply(&mut leases, &message, Instant::now()) else {
            continue;
        };

        let Some(reply_len) = build_dhcp_reply(&mut reply, &message, reply_type, ip) else {
            println!("[DHCP] Reply buffer too small");
            continue;
        };

        match socket.send_to(&reply[..reply_len], broadcast).await {
            Ok(_) => println!("[DHCP] {:?} -> {} ({} leases)", reply_type, ip, leases.len()),
            Err(e) => println!("[DHCP] Failed to send {:?}: {:?}", reply_type, e),
        }
    }
}
