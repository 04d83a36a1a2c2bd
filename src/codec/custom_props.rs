//! Custom property extraction and key canonicalization.

use unicode_normalization::UnicodeNormalization;

use crate::properties::{ConnectionType, DeviceType, PropertyMap, PropertyRow, Shape};

/// Keys downstream consumers can rely on. Anything else is kept under its original label.
pub const RECOGNIZED_KEYS: [&str; 14] = [
    "ip_address",
    "mac_address",
    "vlan",
    "bandwidth",
    "model",
    "location",
    "vendor",
    "hostname",
    "serial_number",
    "os_version",
    "management_ip",
    "description",
    "site",
    "rack",
];

const ALIASES: &[(&str, &str)] = &[
    ("ip", "ip_address"),
    ("ipaddr", "ip_address"),
    ("ip_addr", "ip_address"),
    ("ipaddress", "ip_address"),
    ("ipv4", "ip_address"),
    ("ipv4_address", "ip_address"),
    ("mac", "mac_address"),
    ("mac_addr", "mac_address"),
    ("macaddress", "mac_address"),
    ("vlan_id", "vlan"),
    ("vlanid", "vlan"),
    ("vlan_number", "vlan"),
    ("speed", "bandwidth"),
    ("bw", "bandwidth"),
    ("link_speed", "bandwidth"),
    ("model_number", "model"),
    ("device_model", "model"),
    ("product_number", "model"),
    ("loc", "location"),
    ("building", "location"),
    ("manufacturer", "vendor"),
    ("make", "vendor"),
    ("host_name", "hostname"),
    ("device_name", "hostname"),
    ("network_name", "hostname"),
    ("serial", "serial_number"),
    ("serial_no", "serial_number"),
    ("sn", "serial_number"),
    ("os", "os_version"),
    ("firmware", "os_version"),
    ("software_version", "os_version"),
    ("mgmt_ip", "management_ip"),
    ("mgmt_ip_address", "management_ip"),
    ("management_ip_address", "management_ip"),
    ("desc", "description"),
];

/// Lowercase-with-underscores form of a label: NFKC, camelCase split, non-alphanumeric runs
/// collapsed to `_`.
pub fn snake_case(raw: &str) -> String {
    let normalized: String = raw.nfkc().collect();
    let chars: Vec<char> = normalized.chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 && !out.is_empty() && !out.ends_with('_') {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            // "IPv4" stays one word: a lowercase letter then a digit closes the acronym
            let versioned = next_lower && chars.get(i + 2).is_some_and(|n| n.is_ascii_digit());
            if prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_lower && !versioned)
            {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out.trim_end_matches('_').to_string()
}

/// The recognized canonical key for `raw`, if it denotes one.
pub fn recognized_key(raw: &str) -> Option<&'static str> {
    let snake = snake_case(raw);
    let resolved = ALIASES
        .iter()
        .find(|(alias, _)| *alias == snake)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(snake.as_str());
    RECOGNIZED_KEYS.iter().copied().find(|k| *k == resolved)
}

/// Canonical key when recognized, otherwise the trimmed original.
pub fn canonical_key(raw: &str) -> String {
    match recognized_key(raw) {
        Some(key) => key.to_string(),
        None => raw.trim().to_string(),
    }
}

/// Flatten property rows into a normalized map.
///
/// The row's label is preferred as key, falling back to the row name; if only the row name is
/// recognized (a localized label over a standard row), the recognized name wins. Values are
/// trimmed and whitespace-only values dropped. The first occurrence of a key is kept.
pub fn extract(rows: &[PropertyRow]) -> PropertyMap {
    let mut map = PropertyMap::new();
    for row in rows {
        let Some(value) = row.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        let label = row.label.as_deref().map(str::trim).filter(|l| !l.is_empty());
        let key = match label {
            Some(label) => recognized_key(label)
                .or_else(|| recognized_key(&row.name))
                .map(str::to_string)
                .unwrap_or_else(|| label.to_string()),
            None => canonical_key(&row.name),
        };
        if key.is_empty() {
            continue;
        }
        if map.contains_key(&key) {
            tracing::debug!("Duplicate property key {key:?}; keeping first value");
            continue;
        }
        map.insert(key, value.to_string());
    }
    map
}

/// Fill absent descriptive properties of a shape with placeholder values.
pub fn apply_device_defaults(shape: &mut Shape) {
    let kind = shape.shape_type;
    let (vendor, model) = match kind {
        DeviceType::Router => ("Generic", "Router"),
        DeviceType::Switch => ("Generic", "Switch"),
        DeviceType::Firewall => ("Generic", "Firewall"),
        DeviceType::Server => ("Generic", "Server"),
        _ => ("Unknown", "Unknown"),
    };
    let defaults = [
        ("vendor", vendor.to_string()),
        ("model", model.to_string()),
        ("hostname", shape.name.clone()),
        ("description", format!("{kind} - {}", shape.name)),
    ];
    for (key, value) in defaults {
        shape.properties.entry(key.to_string()).or_insert(value);
    }
}

/// Fill absent link properties based on the connection type.
pub fn apply_connection_defaults(properties: &mut PropertyMap, kind: ConnectionType) {
    let (bandwidth, media) = match kind {
        ConnectionType::Fiber => ("10 Gbps", "Fiber Optic"),
        ConnectionType::Trunk => ("10 Gbps", "Ethernet"),
        ConnectionType::Logical => ("N/A", "Virtual"),
        ConnectionType::Ethernet | ConnectionType::Unknown => ("1 Gbps", "Ethernet"),
    };
    properties
        .entry("bandwidth".to_string())
        .or_insert_with(|| bandwidth.to_string());
    properties
        .entry("media_type".to_string())
        .or_insert_with(|| media.to_string());
}
