//! FTP Response handling
//!
//! Defines FTP response codes and formatting.

use std::net::Ipv4Addr;

/// Standard FTP response codes
pub const OPENING_DATA: u16 = 150;
pub const OK: u16 = 200;
pub const FEATURES: u16 = 211;
pub const SYSTEM_TYPE: u16 = 215;
pub const READY: u16 = 220;
pub const GOODBYE: u16 = 221;
pub const TRANSFER_COMPLETE: u16 = 226;
pub const ENTERING_PASSIVE: u16 = 227;
pub const LOGIN_SUCCESS: u16 = 230;
pub const FILE_ACTION_OK: u16 = 250;
pub const PATH_CREATED: u16 = 257;
pub const PASSWORD_REQUIRED: u16 = 331;
pub const SERVICE_UNAVAILABLE: u16 = 421;
pub const CANT_OPEN_DATA: u16 = 425;
pub const TRANSFER_ABORTED: u16 = 426;
pub const LOCAL_ERROR: u16 = 451;
pub const SYNTAX_ERROR: u16 = 500;
pub const BAD_ARGUMENTS: u16 = 501;
pub const NOT_IMPLEMENTED: u16 = 502;
pub const BAD_SEQUENCE: u16 = 503;
pub const PARAM_NOT_IMPLEMENTED: u16 = 504;
pub const NOT_LOGGED_IN: u16 = 530;
pub const FILE_UNAVAILABLE: u16 = 550;
pub const NAME_NOT_ALLOWED: u16 = 553;

/// Format an FTP response message
pub fn format_response(code: u16, message: &str) -> String {
    format!("{} {}\r\n", code, message)
}

/// Formats the PASV reply: four address octets followed by the port split
/// into its high and low bytes.
pub fn format_pasv_response(ip: Ipv4Addr, port: u16) -> String {
    let [a, b, c, d] = ip.octets();
    let [hi, lo] = port.to_be_bytes();
    format_response(
        ENTERING_PASSIVE,
        &format!("Entering Passive Mode ({a},{b},{c},{d},{hi},{lo})."),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_response() {
        assert_eq!(format_response(OK, "Command okay."), "200 Command okay.\r\n");
    }

    #[test]
    fn test_pasv_encodes_port_big_endian() {
        let reply = format_pasv_response(Ipv4Addr::new(192, 168, 1, 20), 2101);
        assert_eq!(reply, "227 Entering Passive Mode (192,168,1,20,8,53).\r\n");
    }

    #[test]
    fn test_pasv_low_and_high_ports() {
        assert!(format_pasv_response(Ipv4Addr::LOCALHOST, 255).contains("(127,0,0,1,0,255)"));
        assert!(format_pasv_response(Ipv4Addr::LOCALHOST, 65535).contains("(127,0,0,1,255,255)"));
    }
}
