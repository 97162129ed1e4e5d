//! The magic-cookie handshake: spawn the plugin, set the cookie and
//! protocol version in its environment, and read back its one-line
//! connect announcement.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::error::{TransportError, TransportResult};

/// Env var names and values that identify a legitimate kilometers plugin
/// host to the child, and the protocol version we speak.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Environment variable name carrying the magic cookie value.
    pub cookie_key: &'static str,
    /// The magic cookie value itself.
    pub cookie_value: &'static str,
    /// Environment variable name carrying the protocol version.
    pub protocol_version_key: &'static str,
    /// The protocol version this host speaks.
    pub protocol_version: u32,
    /// How long to wait for the handshake line before giving up.
    pub timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            cookie_key: "KM_PLUGIN_MAGIC_COOKIE",
            cookie_value: "d3f9a4b1-kilometers-plugin-host",
            protocol_version_key: "KM_PLUGIN_PROTOCOL_VERSION",
            protocol_version: 1,
            timeout: Duration::from_secs(10),
        }
    }
}

/// How to reach the plugin's RPC endpoint, as advertised by its
/// handshake line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Network {
    /// A unix domain socket at this filesystem path.
    Unix(PathBuf),
    /// A loopback TCP listener at this address.
    Tcp(SocketAddr),
}

/// Everything learned from a successful handshake.
#[derive(Debug, Clone)]
pub struct HandshakeInfo {
    /// The core (host) protocol version the child echoed back.
    pub core_version: u32,
    /// How to connect to the plugin's RPC endpoint.
    pub network: Network,
    /// The child's own reported PID (may differ from the OS-level PID in
    /// exotic supervision setups; we trust the OS PID for process control).
    pub reported_pid: u32,
    /// An optional PEM certificate blob for TLS pinning.
    pub cert: Option<String>,
}

/// Spawn `binary_path` with the handshake environment set, and wait for
/// its connect line.
///
/// # Errors
///
/// Returns [`TransportError::Spawn`] if the process can't start,
/// [`TransportError::HandshakeTimeout`] if no line arrives in time, or
/// [`TransportError::MalformedHandshake`] / [`TransportError::VersionMismatch`]
/// if the line doesn't parse or doesn't match our protocol version.
pub async fn perform_handshake(
    binary_path: &std::path::Path,
    args: &[String],
    config: &HandshakeConfig,
) -> TransportResult<(Child, HandshakeInfo)> {
    let mut child = Command::new(binary_path)
        .args(args)
        .env(config.cookie_key, config.cookie_value)
        .env(
            config.protocol_version_key,
            config.protocol_version.to_string(),
        )
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(TransportError::Spawn)?;

    let stdout = child.stdout.take().ok_or(TransportError::ChildExited)?;
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    let read_result = timeout(config.timeout, reader.read_line(&mut line)).await;

    let info = match read_result {
        Err(_elapsed) => {
            let _ = child.start_kill();
            return Err(TransportError::HandshakeTimeout);
        }
        Ok(Ok(0)) => {
            let _ = child.start_kill();
            return Err(TransportError::ChildExited);
        }
        Ok(Err(e)) => {
            let _ = child.start_kill();
            return Err(TransportError::MalformedHandshake(e.to_string()));
        }
        Ok(Ok(_)) => parse_handshake_line(line.trim_end(), config.protocol_version)?,
    };

    child.stdout = Some(reader.into_inner());

    Ok((child, info))
}

fn parse_handshake_line(line: &str, expected_protocol: u32) -> TransportResult<HandshakeInfo> {
    let parts: Vec<&str> = line.splitn(5, '|').collect();
    if parts.len() < 4 {
        return Err(TransportError::MalformedHandshake(line.to_owned()));
    }

    let core_version: u32 = parts[0]
        .parse()
        .map_err(|_| TransportError::MalformedHandshake(line.to_owned()))?;
    let proto_version: u32 = parts[1]
        .parse()
        .map_err(|_| TransportError::MalformedHandshake(line.to_owned()))?;

    if proto_version != expected_protocol {
        return Err(TransportError::VersionMismatch {
            host: expected_protocol,
            child: proto_version,
        });
    }

    let network = match parts[2] {
        "unix" => Network::Unix(PathBuf::from(parts[3])),
        "tcp" => {
            let addr: SocketAddr = parts[3]
                .parse()
                .map_err(|_| TransportError::MalformedHandshake(line.to_owned()))?;
            Network::Tcp(addr)
        }
        other => {
            return Err(TransportError::MalformedHandshake(format!(
                "unknown network kind: {other}"
            )))
        }
    };

    let cert = parts.get(4).filter(|s| !s.is_empty()).map(|s| (*s).to_owned());

    Ok(HandshakeInfo {
        core_version,
        network,
        reported_pid: 0,
        cert,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_handshake_line() {
        let info = parse_handshake_line("1|1|unix|/tmp/plugin.sock|", 1).unwrap();
        assert_eq!(info.core_version, 1);
        assert_eq!(info.network, Network::Unix(PathBuf::from("/tmp/plugin.sock")));
        assert!(info.cert.is_none());
    }

    #[test]
    fn parses_tcp_handshake_line_with_cert() {
        let info = parse_handshake_line("1|1|tcp|127.0.0.1:9000|PEM_CERT_BLOB", 1).unwrap();
        assert_eq!(info.network, Network::Tcp("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(info.cert.as_deref(), Some("PEM_CERT_BLOB"));
    }

    #[test]
    fn rejects_version_mismatch() {
        let result = parse_handshake_line("1|2|unix|/tmp/x.sock|", 1);
        assert!(matches!(
            result,
            Err(TransportError::VersionMismatch { host: 1, child: 2 })
        ));
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(parse_handshake_line("garbage", 1).is_err());
        assert!(parse_handshake_line("1|1|carrier-pigeon|x|", 1).is_err());
    }
}
