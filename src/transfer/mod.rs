//! Transfer module for FTP server
//!
//! Handles the passive port pool, passive data channels and the file
//! transfers that run over them.

pub mod data_channel;
pub mod file_ops;
pub mod port_pool;

pub use data_channel::{DataConnection, PendingDataChannel};
pub use file_ops::{receive_file, send_file, send_listing};
pub use port_pool::{LeaseInfo, PassivePortAllocator, PortLease};
