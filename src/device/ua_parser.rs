use std::net::IpAddr;

use woothee::parser::{Parser, WootheeResult};

use crate::storage::models::{ClientMetadata, DeviceInfo, DeviceKind};

/// Longest User-Agent kept on a session record
const MAX_USER_AGENT_LEN: usize = 512;

/// Capture the client details recorded on a session
pub fn client_metadata(user_agent: Option<&str>, ip_address: Option<IpAddr>) -> ClientMetadata {
    ClientMetadata {
        device_info: user_agent.map(parse_user_agent).unwrap_or_default(),
        ip_address: ip_address.map(|ip| ip.to_string()),
    }
}

/// Parse a User-Agent string into device information
pub fn parse_user_agent(user_agent: &str) -> DeviceInfo {
    let raw_user_agent = truncate(user_agent.trim());

    let parsed = Parser::new()
        .parse(&raw_user_agent)
        .map(|result| from_woothee(&result))
        .unwrap_or_default();

    DeviceInfo {
        raw_user_agent,
        ..parsed
    }
}

/// Short human label for a session listing, e.g. "Chrome on Windows 10"
pub fn describe(info: &DeviceInfo) -> String {
    match (&info.browser, &info.os) {
        (Some(browser), Some(os)) => format!("{browser} on {os}"),
        (Some(browser), None) => browser.clone(),
        (None, Some(os)) => os.clone(),
        (None, None) => "Unknown device".to_string(),
    }
}

fn from_woothee(result: &WootheeResult<'_>) -> DeviceInfo {
    let kind = match result.category {
        "pc" => DeviceKind::Desktop,
        "smartphone" | "mobilephone" => DeviceKind::Mobile,
        "tablet" => DeviceKind::Tablet,
        "crawler" => DeviceKind::Bot,
        _ => DeviceKind::Unknown,
    };

    DeviceInfo {
        browser: known(result.name),
        browser_version: known(result.version),
        kind,
        os: known(result.os),
        os_version: known(&result.os_version),
        raw_user_agent: String::new(),
    }
}

// woothee reports missing fields as "UNKNOWN"
fn known(value: &str) -> Option<String> {
    if value.is_empty() || value == "UNKNOWN" {
        None
    } else {
        Some(value.to_string())
    }
}

fn truncate(user_agent: &str) -> String {
    match user_agent.char_indices().nth(MAX_USER_AGENT_LEN) {
        Some((cut, _)) => user_agent[..cut].to_string(),
        None => user_agent.to_string(),
    }
}
