//! Marionette client.
//!
//! Marionette frames every message as `<byte length>:<json>`. On connect
//! the server sends a greeting; afterwards each command is
//! `[0, id, name, params]` and each response `[1, id, error, result]`.
//! The client is blocking: tests are serial and the poll loop sleeps on
//! the calling thread anyway.

use crate::result::{WebApiError, WebApiResult};
use crate::session::ScriptSession;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default Marionette port on the device
pub const DEFAULT_MARIONETTE_PORT: u16 = 2828;

/// Protocol level this client speaks
pub const PROTOCOL_LEVEL: u64 = 3;

/// Upper bound for a single packet body
const MAX_PACKET_BYTES: usize = 64 * 1024 * 1024;

/// Extra time granted to a socket read beyond the script timeout
const READ_GRACE: Duration = Duration::from_secs(10);

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarionetteConfig {
    /// Host running Marionette (usually forwarded with `adb forward`)
    pub host: String,
    /// Marionette port
    pub port: u16,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Script timeout applied to the session in milliseconds
    pub script_timeout_ms: u64,
}

impl Default for MarionetteConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_MARIONETTE_PORT,
            connect_timeout_ms: 10_000,
            script_timeout_ms: 30_000,
        }
    }
}

/// Browsing context scripts run in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// Web content
    Content,
    /// Privileged browser chrome
    Chrome,
}

impl Context {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Chrome => "chrome",
        }
    }
}

// =============================================================================
// FRAMING
// =============================================================================

/// Encode a value as a length-prefixed packet
pub fn encode_packet(value: &Value) -> WebApiResult<Vec<u8>> {
    let body = serde_json::to_vec(value)?;
    let mut packet = format!("{}:", body.len()).into_bytes();
    packet.extend_from_slice(&body);
    Ok(packet)
}

/// Read one length-prefixed packet
pub fn read_packet<R: BufRead>(reader: &mut R) -> WebApiResult<Value> {
    let mut header = Vec::new();
    reader.read_until(b':', &mut header)?;
    if header.pop() != Some(b':') {
        return Err(WebApiError::session(
            "connection closed while reading packet length",
        ));
    }

    let len = std::str::from_utf8(&header)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            WebApiError::session(format!(
                "invalid packet length {:?}",
                String::from_utf8_lossy(&header)
            ))
        })?;
    if len > MAX_PACKET_BYTES {
        return Err(WebApiError::session(format!(
            "packet of {len} bytes exceeds limit"
        )));
    }

    let mut body = vec![0; len];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

// =============================================================================
// SESSION
// =============================================================================

/// A live Marionette session
#[derive(Debug)]
pub struct MarionetteSession {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    next_id: u64,
    session_id: Option<String>,
}

impl MarionetteSession {
    /// Connect, check the greeting and open a content-context session
    pub fn connect(config: &MarionetteConfig) -> WebApiResult<Self> {
        let stream = connect_stream(config)?;
        let script_timeout = Duration::from_millis(config.script_timeout_ms);
        stream.set_read_timeout(Some(script_timeout + READ_GRACE))?;
        stream.set_nodelay(true)?;

        let writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);

        let greeting = read_packet(&mut reader)?;
        let level = greeting.get("marionetteProtocol").and_then(Value::as_u64);
        if level != Some(PROTOCOL_LEVEL) {
            return Err(WebApiError::session(format!(
                "unsupported Marionette protocol {greeting}"
            )));
        }
        debug!(application = ?greeting.get("applicationType"), "marionette greeting");

        let mut session = Self {
            reader,
            writer,
            next_id: 0,
            session_id: None,
        };
        session.new_session()?;
        session.set_script_timeout(script_timeout)?;
        session.set_context(Context::Content)?;
        info!(
            host = %config.host,
            port = config.port,
            session_id = session.session_id.as_deref().unwrap_or("-"),
            "marionette session established"
        );
        Ok(session)
    }

    /// Session id assigned by the remote end
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Send a command and wait for its response
    pub fn command(&mut self, name: &str, params: Value) -> WebApiResult<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let packet = encode_packet(&json!([0, id, name, params]))?;
        self.writer.write_all(&packet)?;
        self.writer.flush()?;
        debug!(id, name, "marionette command sent");

        loop {
            let message = read_packet(&mut self.reader)?;
            let parts = message
                .as_array()
                .filter(|a| a.len() == 4 && a[0] == json!(1))
                .ok_or_else(|| {
                    WebApiError::session(format!("malformed Marionette response {message}"))
                })?;

            if parts[1].as_u64() != Some(id) {
                warn!(expected = id, got = %parts[1], "skipping response for another command");
                continue;
            }

            let error = &parts[2];
            if !error.is_null() {
                return Err(WebApiError::Script {
                    kind: error
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                });
            }
            return Ok(parts[3].clone());
        }
    }

    /// Switch the browsing context scripts run in
    pub fn set_context(&mut self, context: Context) -> WebApiResult<()> {
        self.command("Marionette:SetContext", json!({ "value": context.as_str() }))?;
        Ok(())
    }

    /// End the session
    pub fn close(mut self) -> WebApiResult<()> {
        self.command("WebDriver:DeleteSession", json!({}))?;
        info!("marionette session closed");
        Ok(())
    }

    fn new_session(&mut self) -> WebApiResult<()> {
        let result = self.command("WebDriver:NewSession", json!({ "capabilities": {} }))?;
        self.session_id = result
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(())
    }

    fn set_script_timeout(&mut self, timeout: Duration) -> WebApiResult<()> {
        self.command(
            "WebDriver:SetTimeouts",
            json!({ "script": timeout.as_millis() as u64 }),
        )?;
        Ok(())
    }
}

impl ScriptSession for MarionetteSession {
    fn execute_script(&mut self, source: &str, args: &[Value]) -> WebApiResult<Value> {
        let result = self.command(
            "WebDriver:ExecuteScript",
            json!({ "script": source, "args": args }),
        )?;
        Ok(result.get("value").cloned().unwrap_or(Value::Null))
    }

    fn execute_async_script(&mut self, source: &str, args: &[Value]) -> WebApiResult<Value> {
        let result = self.command(
            "WebDriver:ExecuteAsyncScript",
            json!({ "script": source, "args": args }),
        )?;
        Ok(result.get("value").cloned().unwrap_or(Value::Null))
    }
}

fn connect_stream(config: &MarionetteConfig) -> WebApiResult<TcpStream> {
    let timeout = Duration::from_millis(config.connect_timeout_ms);
    let mut last_error = None;
    for addr in (config.host.as_str(), config.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "marionette connect attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(WebApiError::session(format!(
        "could not connect to Marionette at {}:{}: {}",
        config.host,
        config.port,
        last_error.map_or_else(|| "no addresses".to_string(), |e| e.to_string())
    )))
}
