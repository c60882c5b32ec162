//! Networking helpers.
//!
//! # Responsibilities
//! - Turn socket bucket keys (`80`, `127.0.0.1:80`, `[::1]:80`) into bind addresses
//! - Extract the port a bucket listens on
//!
//! # Design Decisions
//! - A bare port binds every interface (`0.0.0.0`)

use std::net::{AddrParseError, IpAddr, Ipv4Addr, SocketAddr};

/// Bind address for a socket bucket key.
pub fn bind_address(bucket_key: &str) -> Result<SocketAddr, AddrParseError> {
    match bucket_key.parse::<u16>() {
        Ok(port) => Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)),
        Err(_) => bucket_key.parse(),
    }
}

/// Port of a socket bucket key.
pub fn port_of(bucket_key: &str) -> Option<u16> {
    bucket_key
        .rsplit_once(':')
        .map_or(bucket_key, |(_, port)| port)
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        assert_eq!(bind_address("8080").unwrap(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(bind_address("127.0.0.1:80").unwrap(), "127.0.0.1:80".parse().unwrap());
        assert_eq!(bind_address("[::1]:443").unwrap().port(), 443);
        assert!(bind_address("localhost:80").is_err());
    }

    #[test]
    fn test_port_of() {
        assert_eq!(port_of("80"), Some(80));
        assert_eq!(port_of("127.0.0.1:8080"), Some(8080));
        assert_eq!(port_of("[::1]:443"), Some(443));
        assert_eq!(port_of("nope"), None);
    }
}
