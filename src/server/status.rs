//! Server status
//!
//! Operational snapshot of where the server is listening.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub listen_address: String,
    pub control_port: u16,
    pub static_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_to_json() {
        let status = ServerStatus {
            listen_address: "0.0.0.0".into(),
            control_port: 2100,
            static_port: 8000,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "listen_address": "0.0.0.0",
                "control_port": 2100,
                "static_port": 8000
            })
        );
    }
}
