//! mDNS service discovery module
//!
//! Advertises the board as `led-control.local` with an `_http._tcp` service
//! so browsers on the access point can find the control page by name.

use crate::{BoardError, config};
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Ipv4Address, Stack};
use embassy_time::{Duration, Instant};
use esp_println::println;
use heapless::Vec;

const MDNS_PORT: u16 = 5353;
const MDNS_MULTICAST: Ipv4Address = Ipv4Address::new(224, 0, 0, 251);
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);
const RECORD_TTL_SECS: u32 = 120;

const TYPE_A: u16 = 1;
const TYPE_PTR: u16 = 12;
const TYPE_SRV: u16 = 33;
const CLASS_IN: u16 = 1;
const CACHE_FLUSH: u16 = 0x8000;

/// Maximum mDNS packet size handled here
pub const MAX_MDNS_PACKET_SIZE: usize = 512;

pub type MdnsPacket = Vec<u8, MAX_MDNS_PACKET_SIZE>;

fn push(packet: &mut MdnsPacket, bytes: &[u8]) -> Result<(), BoardError> {
    packet
        .extend_from_slice(bytes)
        .map_err(|_| BoardError::MdnsError)
}

/// Append a domain name as length-prefixed labels, terminated by the root label
fn push_name(packet: &mut MdnsPacket, labels: &[&str]) -> Result<(), BoardError> {
    for label in labels {
        if label.is_empty() || label.len() > 63 {
            return Err(BoardError::MdnsError);
        }
        push(packet, &[label.len() as u8])?;
        push(packet, label.as_bytes())?;
    }
    push(packet, &[0])
}

/// Append a compression pointer to an earlier name
fn push_pointer(packet: &mut MdnsPacket, offset: usize) -> Result<(), BoardError> {
    push(packet, &(0xC000 | offset as u16).to_be_bytes())
}

fn push_record_header(
    packet: &mut MdnsPacket,
    record_type: u16,
    class: u16,
    data_len: usize,
) -> Result<(), BoardError> {
    push(packet, &record_type.to_be_bytes())?;
    push(packet, &class.to_be_bytes())?;
    push(packet, &RECORD_TTL_SECS.to_be_bytes())?;
    push(packet, &(data_len as u16).to_be_bytes())
}

/// Build an unsolicited response carrying PTR, SRV and A records
pub fn build_announcement(ip: Ipv4Address, port: u16) -> Result<MdnsPacket, BoardError> {
    let host = config::MDNS_HOSTNAME;
    let service = config::MDNS_SERVICE_TYPE;
    let protocol = config::MDNS_SERVICE_PROTOCOL;

    let mut packet = MdnsPacket::new();

    // Header: id 0, response + authoritative, 0 questions, 3 answers
    push(
        &mut packet,
        &[0x00, 0x00, 0x84, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00],
    )?;

    // PTR _http._tcp.local -> led-control._http._tcp.local
    let service_offset = packet.len();
    push_name(&mut packet, &[service, protocol, "local"])?;
    let instance_len = 1 + host.len() + 2;
    push_record_header(&mut packet, TYPE_PTR, CLASS_IN, instance_len)?;
    let instance_offset = packet.len();
    push(&mut packet, &[host.len() as u8])?;
    push(&mut packet, host.as_bytes())?;
    push_pointer(&mut packet, service_offset)?;

    // SRV led-control._http._tcp.local -> led-control.local:port
    push_pointer(&mut packet, instance_offset)?;
    let target_len = 1 + host.len() + 1 + "local".len() + 1;
    push_record_header(&mut packet, TYPE_SRV, CLASS_IN | CACHE_FLUSH, 6 + target_len)?;
    push(&mut packet, &[0, 0, 0, 0])?; // priority, weight
    push(&mut packet, &port.to_be_bytes())?;
    let host_offset = packet.len();
    push_name(&mut packet, &[host, "local"])?;

    // A led-control.local -> ip
    push_pointer(&mut packet, host_offset)?;
    push_record_header(&mut packet, TYPE_A, CLASS_IN | CACHE_FLUSH, 4)?;
    push(&mut packet, &ip.octets())?;

    Ok(packet)
}

/// Whether a received packet is a query that mentions our host or service
pub fn is_query_for_us(data: &[u8]) -> bool {
    if data.len() <= 12 || data[2] & 0x80 != 0 {
        return false;
    }
    let questions = &data[12..];
    contains_label(questions, config::MDNS_HOSTNAME)
        || contains_label(questions, config::MDNS_SERVICE_TYPE)
}

fn contains_label(data: &[u8], label: &str) -> bool {
    let label = label.as_bytes();
    data.windows(label.len() + 1).any(|window| {
        window[0] as usize == label.len() && window[1..].eq_ignore_ascii_case(label)
    })
}

/// Announce and answer queries forever
pub async fn run(stack: &Stack<'_>) -> Result<(), BoardError> {
    stack.wait_config_up().await;

    let our_ip = stack
        .config_v4()
        .map(|config| config.address.address())
        .ok_or(BoardError::MdnsError)?;
    println!("[MDNS] Our IP: {}", our_ip);

    let multicast_addr = IpAddress::Ipv4(MDNS_MULTICAST);
    match stack.join_multicast_group(multicast_addr) {
        Ok(_) => println!("[MDNS] Joined mDNS multicast group {}", MDNS_MULTICAST),
        Err(e) => println!("[MDNS] Failed to join mDNS multicast group: {:?}", e),
    }

    let mut rx_buffer = [0; 1500];
    let mut tx_buffer = [0; 1500];
    let mut rx_meta = [PacketMetadata::EMPTY; 8];
    let mut tx_meta = [PacketMetadata::EMPTY; 8];
    let mut socket = UdpSocket::new(
        *stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );

    if let Err(e) = socket.bind(MDNS_PORT) {
        println!("[MDNS] Failed to bind mDNS socket: {:?}", e);
        return Err(BoardError::MdnsError);
    }

    let response = build_announcement(our_ip, config::HTTP_PORT)?;
    let multicast = IpEndpoint::new(multicast_addr, MDNS_PORT);

    println!(
        "[MDNS] Advertising {}.local ({}.{}.local)",
        config::MDNS_HOSTNAME,
        config::MDNS_SERVICE_TYPE,
        config::MDNS_SERVICE_PROTOCOL
    );
    if let Err(e) = socket.send_to(&response, multicast).await {
        println!("[MDNS] Failed to send initial announcement: {:?}", e);
    }

    let mut last_announcement = Instant::now();
    let mut buffer = [0u8; 1500];

    loop {
        let now = Instant::now();
        if now.duration_since(last_announcement) > ANNOUNCE_INTERVAL {
            if let Err(e) = socket.send_to(&response, multicast).await {
                println!("[MDNS] Failed to send periodic announcement: {:?}", e);
            }
            last_announcement = now;
        }

        match embassy_time::with_timeout(Duration::from_millis(1000), socket.recv_from(&mut buffer))
            .await
        {
            Ok(Ok((len, endpoint))) => {
                if is_query_for_us(&buffer[..len]) {
                    let mut reply = response.clone();
                    // Echo the query id back
                    reply[0] = buffer[0];
                    reply[1] = buffer[1];

                    if let Err(e) = socket.send_to(&reply, multicast).await {
                        println!("[MDNS] Failed to send multicast response: {:?}", e);
                    }
                    // Also send unicast response for compatibility
                    if let Err(e) = socket.send_to(&reply, endpoint.endpoint).await {
                        println!("[MDNS] Failed to send unicast response: {:?}", e);
                    }
                }
            }
            Ok(Err(e)) => println!("[MDNS] Socket error: {:?}", e),
            // Timeout - normal, continue loop
            Err(_) => {}
        }
    }
}
