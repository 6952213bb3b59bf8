//! WiFi module for ESP32-C3 board
//!
//! Brings up the soft access point using esp-wifi 0.14.1. The embassy-net
//! stack on the AP interface uses a static address; stations get theirs from
//! [`crate::dhcp_server`].

use crate::{BoardError, config};
use embassy_net::{Ipv4Address, Ipv4Cidr, StaticConfigV4};
use esp_println::println;
use esp_wifi::wifi::{AccessPointConfiguration, AuthMethod, Configuration, WifiController};

/// Static IPv4 configuration of the access point interface
pub fn ap_ip_config() -> StaticConfigV4 {
    StaticConfigV4 {
        address: Ipv4Cidr::new(config::AP_IP_ADDRESS, config::AP_PREFIX_LEN),
        gateway: Some(config::AP_IP_ADDRESS),
        dns_servers: Default::default(),
    }
}

/// Authentication used for a given password; an empty password means an open network
pub fn auth_method_for(password: &str) -> AuthMethod {
    if password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    }
}

/// Broadcast address of the access point subnet
pub fn ap_broadcast_address() -> Ipv4Address {
    let ip = u32::from_be_bytes(config::AP_IP_ADDRESS.octets());
    let host_mask = u32::MAX >> config::AP_PREFIX_LEN;
    Ipv4Address::from((ip | host_mask).to_be_bytes())
}

/// Subnet mask of the access point subnet
pub fn ap_netmask() -> Ipv4Address {
    let mask = u32::MAX << (32 - config::AP_PREFIX_LEN as u32);
    Ipv4Address::from(mask.to_be_bytes())
}

/// Access point manager
pub struct AccessPointManager<'a> {
    controller: WifiController<'a>,
    is_running: bool,
}

impl<'a> AccessPointManager<'a> {
    /// Create a new access point manager instance
    pub fn new(controller: WifiController<'a>) -> Self {
        Self {
            controller,
            is_running: false,
        }
    }

    /// Configure and start the access point
    pub fn start(&mut self, ssid: &str, password: &str) -> Result<(), BoardError> {
        println!("[WIFI] Starting access point: {}", ssid);

        let ap_config = AccessPointConfiguration {
            ssid: ssid.try_into().map_err(|_| BoardError::WiFiError)?,
            password: password.try_into().map_err(|_| BoardError::WiFiError)?,
            auth_method: auth_method_for(password),
            max_connections: config::AP_MAX_CONNECTIONS,
            ..Default::default()
        };

        self.controller
            .set_configuration(&Configuration::AccessPoint(ap_config))
            .map_err(|_| BoardError::WiFiError)?;

        self.controller.start().map_err(|_| BoardError::WiFiError)?;

        if self.controller.is_started().unwrap_or(false) {
            self.is_running = true;
            println!(
                "[WIFI] Access point initialized. SSID: {} Password: {}",
                ssid,
                if password.is_empty() { "<open>" } else { password }
            );
            println!("[WIFI] Device IP address: {}", config::AP_IP_ADDRESS);
            Ok(())
        } else {
            println!("[WIFI] Access point did not start");
            Err(BoardError::WiFiError)
        }
    }

    /// Check if the access point is up
    pub fn is_running(&self) -> bool {
        self.is_running && self.controller.is_started().unwrap_or(false)
    }

    /// Monitor access point status
    pub fn monitor(&mut self) -> Result<(), BoardError> {
        let started = self
            .controller
            .is_started()
            .map_err(|_| BoardError::WiFiError)?;

        if self.is_running && !started {
            println!("[WIFI] Access point stopped!");
            self.is_running = false;
        }

        Ok(())
    }

    /// Stop the access point so it can be started again
    pub fn stop(&mut self) -> Result<(), BoardError> {
        self.is_running = false;
        self.controller.stop().map_err(|_| BoardError::WiFiError)
    }
}
