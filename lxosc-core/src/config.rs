//! lxosc-core/src/config.rs
//!
//! Host/port settings the engine reacts to. Stored as JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{OscError, Result};

pub const DEFAULT_RECEIVE_HOST: &str = "0.0.0.0";
pub const DEFAULT_RECEIVE_PORT: u16 = 3030;
pub const DEFAULT_TRANSMIT_HOST: &str = "localhost";
pub const DEFAULT_TRANSMIT_PORT: u16 = 3131;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    pub receive_active: bool,
    pub receive_host: String,
    pub receive_port: u16,
    pub transmit_active: bool,
    pub transmit_host: String,
    pub transmit_port: u16,
    /// Log every dispatched inbound message.
    pub log_input: bool,
    /// Log every outbound packet.
    pub log_output: bool,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            receive_active: false,
            receive_host: DEFAULT_RECEIVE_HOST.to_string(),
            receive_port: DEFAULT_RECEIVE_PORT,
            transmit_active: false,
            transmit_host: DEFAULT_TRANSMIT_HOST.to_string(),
            transmit_port: DEFAULT_TRANSMIT_PORT,
            log_input: false,
            log_output: false,
        }
    }
}

pub(crate) fn check_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(OscError::InvalidPort(port));
    }
    Ok(())
}

impl OscConfig {
    /// Ports must be in 1..=65535.
    pub fn validate(&self) -> Result<()> {
        check_port(self.receive_port)?;
        check_port(self.transmit_port)?;
        Ok(())
    }

    /// Read a JSON config file. A leading UTF-8 BOM is ignored.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let bytes = fs::read(p)
            .map_err(|e| OscError::Config(format!("Could not read {}: {e}", p.display())))?;
        let content = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
        let config: OscConfig = serde_json::from_slice(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = path.as_ref();
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(p, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}
