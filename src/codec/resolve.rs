//! Device profile resolution.
//!
//! Turns a classified [`Shape`] into an inventory entry: architectural role, vendor, model,
//! management address, location and a human-readable display name. Everything here is derived
//! from the shape's label and normalized properties; nothing is read back from the archive.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::properties::{DeviceType, Shape, ShapeId};

/// Position of a device in the network architecture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    Core,
    Spine,
    Distribution,
    Leaf,
    Access,
    Edge,
    Management,
    #[default]
    Unknown,
}

impl DeviceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceRole::Core => "core",
            DeviceRole::Spine => "spine",
            DeviceRole::Distribution => "distribution",
            DeviceRole::Leaf => "leaf",
            DeviceRole::Access => "access",
            DeviceRole::Edge => "edge",
            DeviceRole::Management => "management",
            DeviceRole::Unknown => "unknown",
        }
    }

    /// Inventory sort priority; lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            DeviceRole::Core => 1,
            DeviceRole::Spine => 2,
            DeviceRole::Distribution => 3,
            DeviceRole::Leaf => 4,
            DeviceRole::Access => 5,
            DeviceRole::Edge => 6,
            DeviceRole::Management => 7,
            DeviceRole::Unknown => 99,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            DeviceRole::Core => "Core",
            DeviceRole::Spine => "Spine",
            DeviceRole::Distribution => "Distribution",
            DeviceRole::Leaf => "Leaf",
            DeviceRole::Access => "Access",
            DeviceRole::Edge => "Edge",
            DeviceRole::Management => "Management",
            DeviceRole::Unknown => "Unknown",
        }
    }
}

impl Display for DeviceRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn pattern(src: &str) -> Regex {
    Regex::new(src).expect("Device profile patterns are valid regexes.")
}

static ROLE_PATTERNS: Lazy<Vec<(Regex, DeviceRole)>> = Lazy::new(|| {
    vec![
        (pattern(r"(?i)\bcore"), DeviceRole::Core),
        (pattern(r"(?i)\b(dist|distribution)\b"), DeviceRole::Distribution),
        (pattern(r"(?i)\baccess\b"), DeviceRole::Access),
        (pattern(r"(?i)\b(edge|border)\b"), DeviceRole::Edge),
        (pattern(r"(?i)\bspine"), DeviceRole::Spine),
        (pattern(r"(?i)\bleaf"), DeviceRole::Leaf),
        (pattern(r"(?i)\b(mgmt|management|oob)\b"), DeviceRole::Management),
    ]
});

static VENDOR_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (pattern(r"(?i)\b(cisco|catalyst|nexus|asr|isr)"), "Cisco"),
        (pattern(r"(?i)\b(juniper|junos|srx|ex\d+|mx\d+)"), "Juniper"),
        (pattern(r"(?i)\barista\b"), "Arista"),
        (pattern(r"(?i)\b(fortinet|fortigate)"), "Fortinet"),
        (pattern(r"(?i)\bpalo[\s_-]?alto\b"), "Palo Alto"),
        (pattern(r"(?i)\b(f5|big-?ip)\b"), "F5"),
        (pattern(r"(?i)\b(dell|force10)\b"), "Dell"),
        (pattern(r"(?i)\b(hpe?|aruba|procurve)\b"), "HPE"),
        (pattern(r"(?i)\bhuawei\b"), "Huawei"),
        (pattern(r"(?i)\b(vmware|nsx|esxi)\b"), "VMware"),
    ]
});

static MODEL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        pattern(r"(?i)\b(catalyst|cat)[\s-]?\d{4}[a-z]?\b"),
        pattern(r"(?i)\b(nexus|n)[\s-]?\d{4}[a-z]?\b"),
        pattern(r"(?i)\basr[\s-]?\d{3,4}[a-z]?\b"),
        pattern(r"(?i)\bisr[\s-]?\d{4}[a-z]?\b"),
        pattern(r"(?i)\b(ex|srx|mx)[\s-]?\d{3,4}[a-z]?\b"),
        pattern(r"(?i)\bfortigate[\s-]?\d{2,4}[a-z]?\b"),
        pattern(r"(?i)\basa[\s-]?\d{4}[a-z-]*\b"),
    ]
});

static MODEL_FIELD: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)\bmodel[:\s]+([^\s,;]+)"));

static IPV4: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"\b(?:(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\b",
    )
});

static DIGITS: Lazy<Regex> = Lazy::new(|| pattern(r"\d+"));

const ADDRESS_KEYS: [&str; 2] = ["management_ip", "ip_address"];
const LOCATION_KEYS: [&str; 3] = ["location", "site", "rack"];

/// Resolved descriptive profile of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub id: ShapeId,
    pub name: String,
    pub display_name: String,
    pub device_type: DeviceType,
    pub role: DeviceRole,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub management_ip: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl DeviceProfile {
    pub fn resolve(shape: &Shape) -> Self {
        let role = detect_role(shape);
        DeviceProfile {
            id: shape.id.clone(),
            name: shape.name.clone(),
            display_name: display_name(shape, role),
            device_type: shape.shape_type,
            role,
            vendor: detect_vendor(shape),
            model: detect_model(shape),
            management_ip: detect_address(shape),
            location: LOCATION_KEYS
                .iter()
                .find_map(|key| shape.properties.get(*key))
                .cloned(),
            description: shape.properties.get("description").cloned(),
        }
    }
}

/// Label followed by every property value, the text searched by the pattern detectors.
fn searchable(shape: &Shape) -> impl Iterator<Item = &str> {
    std::iter::once(shape.name.as_str()).chain(shape.properties.values().map(String::as_str))
}

fn detect_role(shape: &Shape) -> DeviceRole {
    for text in searchable(shape) {
        if let Some((_, role)) = ROLE_PATTERNS.iter().find(|(re, _)| re.is_match(text)) {
            return *role;
        }
    }
    DeviceRole::Unknown
}

fn detect_vendor(shape: &Shape) -> Option<String> {
    if let Some(vendor) = shape.properties.get("vendor") {
        return Some(vendor.clone());
    }
    searchable(shape).find_map(|text| {
        VENDOR_PATTERNS
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, vendor)| vendor.to_string())
    })
}

fn detect_model(shape: &Shape) -> Option<String> {
    if let Some(model) = shape.properties.get("model") {
        return Some(model.clone());
    }
    searchable(shape).find_map(|text| {
        MODEL_PATTERNS
            .iter()
            .find_map(|re| re.find(text))
            .map(|m| m.as_str().trim().to_string())
            .or_else(|| {
                MODEL_FIELD
                    .captures(text)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
    })
}

fn detect_address(shape: &Shape) -> Option<String> {
    ADDRESS_KEYS
        .iter()
        .filter_map(|key| shape.properties.get(*key))
        .chain(std::iter::once(&shape.name))
        .find_map(|text| IPV4.find(text))
        .map(|m| m.as_str().to_string())
}

fn display_name(shape: &Shape, role: DeviceRole) -> String {
    if !shape.name.starts_with("Shape_") {
        return shape.name.clone();
    }
    let mut parts: Vec<String> = Vec::new();
    if role != DeviceRole::Unknown {
        parts.push(role.title().to_string());
    }
    if shape.shape_type != DeviceType::Unknown {
        let kind = shape.shape_type.as_str();
        let mut chars = kind.chars();
        if let Some(first) = chars.next() {
            parts.push(first.to_uppercase().chain(chars).collect());
        }
    }
    if parts.is_empty() {
        return shape.name.clone();
    }
    if let Some(number) = DIGITS.find(shape.id.as_str()) {
        parts.push(number.as_str().to_string());
    }
    parts.join(" ")
}

/// Resolve every shape and order the result by role priority, type, name and id.
pub fn inventory(shapes: &[Shape]) -> Vec<DeviceProfile> {
    let mut profiles: Vec<DeviceProfile> = shapes.iter().map(DeviceProfile::resolve).collect();
    profiles.sort_by(|a, b| {
        a.role
            .priority()
            .cmp(&b.role.priority())
            .then_with(|| a.device_type.as_str().cmp(b.device_type.as_str()))
            .then_with(|| a.display_name.cmp(&b.display_name))
            .then_with(|| a.id.cmp(&b.id))
    });
    for profile in &profiles {
        tracing::debug!(
            "Resolved device {} ({}, role {})",
            profile.display_name,
            profile.device_type,
            profile.role
        );
    }
    profiles
}
