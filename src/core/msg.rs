use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CreateNetworkRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(default)]
    pub options: HashMap<String, Value>,
    #[serde(default, rename = "IPv4Data")]
    pub ipv4_data: Vec<Value>,
    #[serde(default, rename = "IPv6Data")]
    pub ipv6_data: Vec<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NetworkRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CreateEndpointRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
    #[serde(default)]
    pub interface: Option<Value>,
    #[serde(default)]
    pub options: HashMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EndpointRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct JoinRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
    pub sandbox_key: String,
    #[serde(default)]
    pub options: HashMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AllocateNetworkRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(default, rename = "IPv4Data")]
    pub ipv4_data: Vec<Value>,
    #[serde(default, rename = "IPv6Data")]
    pub ipv6_data: Vec<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DiscoveryNotification {
    pub discovery_type: i32,
    #[serde(default)]
    pub discovery_data: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ExternalConnectivityRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
    #[serde(default)]
    pub options: HashMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CreateEndpointResponse {
    /// Always empty: the runtime's addresses are used unmodified.
    pub interface: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceName {
    pub src_name: String,
    pub dst_prefix: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct JoinResponse {
    pub interface_name: InterfaceName,
    pub disable_gateway_service: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InfoResponse {
    #[serde(rename = "Value")]
    pub value: HashMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AllocateNetworkResponse {
    #[serde(rename = "Options")]
    pub options: HashMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CapabilitiesResponse {
    pub scope: String,
    pub connectivity_scope: String,
}

/// One remote-driver call, tagged with its method name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "Method", content = "Body")]
pub enum Request {
    #[serde(rename = "NetworkDriver.GetCapabilities")]
    GetCapabilities,
    #[serde(rename = "NetworkDriver.CreateNetwork")]
    CreateNetwork(CreateNetworkRequest),
    #[serde(rename = "NetworkDriver.DeleteNetwork")]
    DeleteNetwork(NetworkRequest),
    #[serde(rename = "NetworkDriver.CreateEndpoint")]
    CreateEndpoint(CreateEndpointRequest),
    #[serde(rename = "NetworkDriver.DeleteEndpoint")]
    DeleteEndpoint(EndpointRequest),
    #[serde(rename = "NetworkDriver.EndpointOperInfo")]
    EndpointInfo(EndpointRequest),
    #[serde(rename = "NetworkDriver.Join")]
    Join(JoinRequest),
    #[serde(rename = "NetworkDriver.Leave")]
    Leave(EndpointRequest),
    #[serde(rename = "NetworkDriver.AllocateNetwork")]
    AllocateNetwork(AllocateNetworkRequest),
    #[serde(rename = "NetworkDriver.FreeNetwork")]
    FreeNetwork(NetworkRequest),
    #[serde(rename = "NetworkDriver.DiscoverNew")]
    DiscoverNew(DiscoveryNotification),
    #[serde(rename = "NetworkDriver.DiscoverDelete")]
    DiscoverDelete(DiscoveryNotification),
    #[serde(rename = "NetworkDriver.ProgramExternalConnectivity")]
    ProgramExternalConnectivity(ExternalConnectivityRequest),
    #[serde(rename = "NetworkDriver.RevokeExternalConnectivity")]
    RevokeExternalConnectivity(EndpointRequest),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Ok(Value),
    Err(String),
}

impl Request {
    pub async fn send_to(
        &self,
        stream: &mut (impl AsyncWriteExt + std::marker::Unpin),
    ) -> tokio::io::Result<()> {
        write_line(self, stream).await
    }

    /// Reads the next request. `Ok(None)` means the peer closed the stream.
    pub async fn recv_from(
        reader: &mut (impl AsyncBufReadExt + std::marker::Unpin),
    ) -> tokio::io::Result<Option<Result<Self, serde_json::Error>>> {
        let mut buf = String::new();
        if reader.read_line(&mut buf).await? == 0 {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&buf)))
    }
}

impl Response {
    pub fn ok(value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Response::Ok(value),
            Err(e) => Response::Err(format!("P2P: Encoding response: {e}")),
        }
    }

    pub async fn send_to(
        &self,
        stream: &mut (impl AsyncWriteExt + std::marker::Unpin),
    ) -> tokio::io::Result<()> {
        write_line(self, stream).await
    }

    pub async fn recv_from(
        reader: &mut (impl AsyncBufReadExt + std::marker::Unpin),
    ) -> tokio::io::Result<Self> {
        let mut buf = String::new();
        reader.read_line(&mut buf).await?;

        serde_json::from_str(&buf)
            .map_err(|e| tokio::io::Error::new(tokio::io::ErrorKind::InvalidData, e))
    }
}

#[inline]
async fn write_line(
    value: &impl Serialize,
    stream: &mut (impl AsyncWriteExt + std::marker::Unpin),
) -> tokio::io::Result<()> {
    let mut msg = serde_json::to_string(value)
        .map_err(|e| tokio::io::Error::new(tokio::io::ErrorKind::InvalidData, e))?;
    msg.push('\n');

    stream.write_all(msg.as_bytes()).await
}
