// LAN link to the feeder's local control bridge
//
// One TCP session per command: connect, send a single newline-delimited
// JSON request, read a single JSON reply, disconnect. This mirrors how the
// appliance's local protocol behaves — a fresh handshake per command, no
// long-lived connection. The vendor encryption handshake is handled by the
// bridge endpoint; this side only carries device identity and the data
// points.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use super::{DeviceLink, DeviceState, LinkError};
use crate::config::DeviceSettings;

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request<'a> {
    Set {
        device_id: &'a str,
        local_key: &'a str,
        version: f32,
        dp: &'a str,
        value: u32,
    },
    Status {
        device_id: &'a str,
        local_key: &'a str,
        version: f32,
    },
}

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    dps: Option<DeviceState>,
}

/// `DeviceLink` over the feeder's LAN control endpoint.
pub struct LanDevice {
    host: String,
    port: u16,
    device_id: String,
    local_key: String,
    version: f32,
}

impl LanDevice {
    pub fn new(settings: &DeviceSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            device_id: settings.device_id.clone(),
            local_key: settings.local_key.clone(),
            version: settings.version,
        }
    }

    /// Run one full session: connect, write the request line, read the
    /// reply line. The caller (dispatcher) owns timeouts and retries.
    async fn exchange(&self, request: &Request<'_>) -> Result<Reply, LinkError> {
        let addr = format!("{}:{}", self.host, self.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| LinkError::Connect(format!("{addr}: {e}")))?;

        let (read_half, mut write_half) = stream.into_split();

        let mut line = serde_json::to_string(request)
            .map_err(|e| LinkError::Malformed(format!("request encode: {e}")))?;
        line.push('\n');
        write_half
            .write_all(line.as_bytes())
            .await
            .map_err(|e| LinkError::Connect(format!("send: {e}")))?;

        let mut reply_line = String::new();
        let mut reader = BufReader::new(read_half);
        let n = reader
            .read_line(&mut reply_line)
            .await
            .map_err(|e| LinkError::Connect(format!("receive: {e}")))?;
        if n == 0 {
            return Err(LinkError::Connect("connection closed before reply".into()));
        }

        debug!(reply = %reply_line.trim_end(), "Device replied");
        let reply: Reply = serde_json::from_str(&reply_line)
            .map_err(|e| LinkError::Malformed(e.to_string()))?;

        if !reply.ok {
            return Err(LinkError::Rejected(
                reply.error.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        Ok(reply)
    }
}

#[async_trait]
impl DeviceLink for LanDevice {
    async fn send_data_point(&self, dp: &str, value: u32) -> Result<(), LinkError> {
        self.exchange(&Request::Set {
            device_id: &self.device_id,
            local_key: &self.local_key,
            version: self.version,
            dp,
            value,
        })
        .await?;
        Ok(())
    }

    async fn query_state(&self) -> Result<DeviceState, LinkError> {
        let reply = self
            .exchange(&Request::Status {
                device_id: &self.device_id,
                local_key: &self.local_key,
                version: self.version,
            })
            .await?;
        reply
            .dps
            .ok_or_else(|| LinkError::Malformed("status reply carried no dps map".into()))
    }
}
