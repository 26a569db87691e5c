//! Display metadata derived from a single endpoint URI

use crate::{error::ProbeError, links::extract::decode_base64_text};
use serde::Deserialize;
use url::Url;

/// Protocol, display name and server address of one profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileInfo {
    pub protocol: String,
    pub remarks: String,
    pub host: String,
    pub port: u16,
}

impl ProfileInfo {
    /// `host:port` suitable for a TCP connect
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

type ProfileResult<T> = std::result::Result<T, ProbeError>;

/// Lower-cased scheme of the URI, or an empty string
pub fn protocol_of(uri: &str) -> String {
    uri.split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Parse protocol, remarks and server address out of a profile URI
pub fn parse_profile(uri: &str) -> ProfileResult<ProfileInfo> {
    let protocol = protocol_of(uri);
    let body = uri
        .split_once("://")
        .map(|(_, body)| body)
        .ok_or_else(|| ProbeError::InvalidProfile(format!("missing scheme: {}", uri)))?;

    match protocol.as_str() {
        "vmess" => parse_vmess(body),
        "ssr" => parse_ssr(body),
        "ss" => parse_ss(uri, body),
        "trojan" | "http" | "https" | "socks5" | "socks5h" => parse_url_profile(&protocol, uri),
        _ => Err(ProbeError::InvalidProfile(format!("unknown scheme: {}", protocol))),
    }
}

#[derive(Debug, Deserialize)]
struct VmessBody {
    #[serde(default)]
    ps: String,
    #[serde(default)]
    add: String,
    #[serde(default)]
    port: serde_json::Value,
}

fn parse_vmess(body: &str) -> ProfileResult<ProfileInfo> {
    let json = decode_base64_text(body)
        .map_err(|e| ProbeError::InvalidProfile(format!("vmess body: {}", e)))?;
    let parsed: VmessBody = serde_json::from_str(&json)
        .map_err(|e| ProbeError::InvalidProfile(format!("vmess json: {}", e)))?;

    // Some generators emit the port as a string
    let port = match &parsed.port {
        serde_json::Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ProbeError::InvalidProfile("vmess port".to_string()))?;

    if parsed.add.is_empty() {
        return Err(ProbeError::InvalidProfile("vmess address".to_string()));
    }

    Ok(ProfileInfo {
        protocol: "vmess".to_string(),
        remarks: parsed.ps,
        host: parsed.add,
        port,
    })
}

/// `host:port:protocol:method:obfs:password_b64/?remarks=b64&...`
fn parse_ssr(body: &str) -> ProfileResult<ProfileInfo> {
    let decoded = decode_base64_text(body)
        .map_err(|e| ProbeError::InvalidProfile(format!("ssr body: {}", e)))?;

    let (main, query) = match decoded.split_once("/?") {
        Some((main, query)) => (main, Some(query)),
        None => (decoded.as_str(), None),
    };

    // host may be an IPv6 literal, so split from the right
    let fields: Vec<&str> = main.rsplitn(6, ':').collect();
    if fields.len() != 6 {
        return Err(ProbeError::InvalidProfile("ssr field count".to_string()));
    }
    let host = fields[5].to_string();
    let port = fields[4]
        .parse::<u16>()
        .map_err(|_| ProbeError::InvalidProfile("ssr port".to_string()))?;

    let remarks = query
        .and_then(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "remarks")
                .map(|(_, value)| value)
        })
        .and_then(|value| decode_base64_text(value).ok())
        .unwrap_or_default();

    Ok(ProfileInfo {
        protocol: "ssr".to_string(),
        remarks,
        host,
        port,
    })
}

fn parse_ss(uri: &str, body: &str) -> ProfileResult<ProfileInfo> {
    let (without_fragment, fragment) = match body.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (body, None),
    };

    // SIP002: userinfo@host:port
    if without_fragment.contains('@') {
        let mut info = parse_url_profile("ss", uri)?;
        info.protocol = "ss".to_string();
        return Ok(info);
    }

    // Legacy: base64(method:password@host:port)
    let decoded = decode_base64_text(without_fragment.trim_end_matches('/'))
        .map_err(|e| ProbeError::InvalidProfile(format!("ss body: {}", e)))?;
    let (_, server) = decoded
        .rsplit_once('@')
        .ok_or_else(|| ProbeError::InvalidProfile("ss server".to_string()))?;
    let (host, port) = server
        .rsplit_once(':')
        .ok_or_else(|| ProbeError::InvalidProfile("ss port".to_string()))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| ProbeError::InvalidProfile("ss port".to_string()))?;

    Ok(ProfileInfo {
        protocol: "ss".to_string(),
        remarks: fragment.map(percent_decode).unwrap_or_default(),
        host: host.trim_matches(|c| c == '[' || c == ']').to_string(),
        port,
    })
}

fn parse_url_profile(protocol: &str, uri: &str) -> ProfileResult<ProfileInfo> {
    let url = Url::parse(uri).map_err(|e| ProbeError::InvalidProfile(format!("{}: {}", protocol, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| ProbeError::InvalidProfile(format!("{} host", protocol)))?
        .trim_matches(|c| c == '[' || c == ']')
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ProbeError::InvalidProfile(format!("{} port", protocol)))?;

    let remarks = url
        .fragment()
        .map(percent_decode)
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| format!("{}:{}", host, port));

    Ok(ProfileInfo {
        protocol: protocol.to_string(),
        remarks,
        host,
        port,
    })
}

/// Decode `%XX` escapes; malformed escapes are kept verbatim
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(value) = decoded {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
