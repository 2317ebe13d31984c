//! MQTT broker addressing and transport selection.
//!
//! Accepted address forms:
//! - `host:port` (TLS only when forced)
//! - `mqtt://host:port`, `tcp://host:port` (plain TCP)
//! - `mqtts://host:port`, `ssl://host:port` (TLS)
//! - `[ipv6]:port`
//!
//! Brokers are expected on the loopback interface unless the caller opts in
//! to remote connections.

use anyhow::{anyhow, Context, Result};
use rumqttc::Transport;
use std::net::IpAddr;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl MqttEndpoint {
    /// Parse a broker address. `force_tls` enables TLS for scheme-less addresses.
    pub fn parse(addr: &str, force_tls: bool) -> Result<Self> {
        let mut use_tls = force_tls;
        let mut remainder = addr.trim();

        if let Some((scheme, rest)) = remainder.split_once("://") {
            match scheme.to_ascii_lowercase().as_str() {
                "mqtt" | "tcp" => {}
                "mqtts" | "ssl" => use_tls = true,
                other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
            }
            remainder = rest;
        }

        let (host, port) = split_host_port(remainder)?;
        if host.is_empty() {
            return Err(anyhow!("missing MQTT host in {}", addr));
        }
        Ok(Self {
            host,
            port,
            use_tls,
        })
    }

    pub fn is_loopback(&self) -> bool {
        if self.host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        self.host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }

    /// Reject non-loopback brokers unless `allow_remote` is set.
    pub fn ensure_allowed(&self, allow_remote: bool) -> Result<()> {
        if self.is_loopback() {
            return Ok(());
        }
        if allow_remote {
            log::warn!(
                "publishing to remote MQTT broker {}:{}; ensure it is on a trusted network",
                self.host,
                self.port
            );
            return Ok(());
        }
        Err(anyhow!(
            "MQTT broker {}:{} is not loopback (use --allow-remote-mqtt to override)",
            self.host,
            self.port
        ))
    }

    /// Build the rumqttc transport for this endpoint.
    pub fn transport(&self, tls: &TlsMaterials) -> Result<Transport> {
        if !self.use_tls {
            if tls.is_configured() {
                return Err(anyhow!(
                    "MQTT TLS materials provided but TLS is disabled (use --mqtt-use-tls or mqtts://)"
                ));
            }
            return Ok(Transport::tcp());
        }

        if !tls.is_configured() {
            return Ok(Transport::tls_with_default_config());
        }

        let ca = tls.ca.clone().ok_or_else(|| {
            anyhow!("MQTT TLS CA certificate is required when providing client certificates")
        })?;
        Ok(Transport::tls(ca, tls.client_auth.clone(), None))
    }
}

impl std::fmt::Display for MqttEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.use_tls { "mqtts" } else { "mqtt" };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid MQTT port in {}", addr))?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid MQTT port in {}", addr))?;
    Ok((host.to_string(), port))
}

/// PEM material for MQTT TLS.
#[derive(Clone, Debug, Default)]
pub struct TlsMaterials {
    /// CA certificate; `None` uses the default webpki roots.
    pub ca: Option<Vec<u8>>,
    /// Client certificate and key, always provided together.
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
}

impl TlsMaterials {
    pub fn load(
        ca_path: Option<&Path>,
        client_cert_path: Option<&Path>,
        client_key_path: Option<&Path>,
    ) -> Result<Self> {
        let ca = match ca_path {
            Some(path) => Some(
                std::fs::read(path)
                    .with_context(|| format!("failed to read MQTT TLS CA {}", path.display()))?,
            ),
            None => None,
        };

        let client_auth = match (client_cert_path, client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let cert = std::fs::read(cert_path).with_context(|| {
                    format!(
                        "failed to read MQTT TLS client cert {}",
                        cert_path.display()
                    )
                })?;
                let key = std::fs::read(key_path).with_context(|| {
                    format!("failed to read MQTT TLS client key {}", key_path.display())
                })?;
                Some((cert, key))
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(anyhow!("MQTT TLS client certificate provided without key"))
            }
            (None, Some(_)) => {
                return Err(anyhow!("MQTT TLS client key provided without certificate"))
            }
        };

        Ok(Self { ca, client_auth })
    }

    pub fn is_configured(&self) -> bool {
        self.ca.is_some() || self.client_auth.is_some()
    }
}
