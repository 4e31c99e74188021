pub mod config;
pub mod memory;
pub mod udp;

pub mod tcp {
    pub mod context;
    pub mod errors;
    pub mod flags;
    pub mod host;
    pub mod retransmit;
    pub mod segment;
    pub mod state;
    pub mod transport;
    pub mod wrap32;
}

pub use config::StcpConfig;
pub use tcp::errors::StcpError;
pub use tcp::transport::{Role, Transport};
