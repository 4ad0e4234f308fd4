use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_string(),
            port: 9100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MimoConfig {
    /// Contract whose Mimo events are indexed. Unset disables the protocol.
    pub factory_address: Option<Address>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NativeTransfersConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolsConfig {
    #[serde(default)]
    pub mimo: MimoConfig,
    #[serde(default)]
    pub native_transfers: NativeTransfersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chain_name: String,
    pub rpc_url: String,
    pub database_url: String,
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    pub chain_tip_buffer: u64,
    #[serde(default)]
    pub protocols: ProtocolsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}
