#![no_std]

//! ESP32-C3 Disco LED Board Library
//!
//! This library provides modules for a WiFi access point that serves a color
//! control page over HTTP and renders the submitted color on a WS2812 strip.
//! Until the first color arrives the strip plays a randomized rainbow animation.

extern crate alloc;

pub mod animation;
pub mod color_command;
pub mod dhcp_server;
pub mod http_server;
pub mod led_control;
pub mod led_state;
pub mod mdns;
pub mod page;
pub mod state_machine;
pub mod wifi;

/// Project version information
pub const VERSION: &str = "0.1.0-dev";

/// Default configuration constants
pub mod config {
    use embassy_net::Ipv4Address;

    /// LED data GPIO pin
    pub const LED_DATA_PIN: u8 = 20;

    /// Number of addressable LEDs on the strip
    pub const PIXEL_COUNT: usize = 20;

    /// Brightness ceiling for user submitted colors (per channel)
    pub const MAX_CHANNEL_VALUE: u8 = 60;

    /// Palette channels are reduced modulo this value while animating
    pub const ANIMATION_CHANNEL_MODULUS: u8 = 40;

    /// Delay between two animation frames
    pub const ANIMATION_INTERVAL_MS: u64 = 250;

    /// HTTP port for the control page and color commands
    pub const HTTP_PORT: u16 = 80;

    /// Maximum accepted size of a color command body
    pub const MAX_FORM_BODY: usize = 100;

    /// mDNS host name (advertised as `<name>.local`)
    pub const MDNS_HOSTNAME: &str = "led-control";

    /// mDNS service type
    pub const MDNS_SERVICE_TYPE: &str = "_http";

    /// mDNS service protocol
    pub const MDNS_SERVICE_PROTOCOL: &str = "_tcp";

    /// Access point configuration
    /// Read from environment variables at compile time
    pub const AP_SSID: &str = env!("AP_SSID");
    pub const AP_PASSWORD: &str = env!("AP_PASSWORD");

    /// Maximum number of stations allowed on the access point
    pub const AP_MAX_CONNECTIONS: u16 = 4;

    /// Access point address, also used as gateway and DNS for clients
    pub const AP_IP_ADDRESS: Ipv4Address = Ipv4Address::new(192, 168, 4, 1);

    /// Access point subnet prefix length
    pub const AP_PREFIX_LEN: u8 = 24;

    /// First address handed out by the DHCP server
    pub const DHCP_POOL_START: Ipv4Address = Ipv4Address::new(192, 168, 4, 2);

    /// Number of addresses in the DHCP pool
    pub const DHCP_POOL_SIZE: u8 = 8;

    /// DHCP lease duration in seconds
    pub const DHCP_LEASE_SECONDS: u32 = 7200;

    /// Access point monitor interval in milliseconds
    pub const AP_MONITOR_INTERVAL_MS: u64 = 5000;
}

/// Error types for the disco board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    /// WiFi access point error
    WiFiError,
    /// HTTP server error
    HttpError,
    /// DHCP server error
    DhcpError,
    /// LED control error
    LedError,
    /// Protocol parsing error
    ProtocolError,
    /// System error
    SystemError,
    /// mDNS service error
    MdnsError,
}

/// Stop on a fault the firmware cannot recover from, such as the LED driver
/// failing to refresh. The panic handler halts the chip.
pub fn fatal(context: &str, error: BoardError) -> ! {
    panic!("[FATAL] {}: {:?}", context, error)
}
