//! Keyword-table classification of shapes and connectors.
//!
//! Classification is a pure function of the element's text (master name, label, property
//! values) and an ordered [`RuleTable`]. The tables themselves are data: the defaults are
//! embedded from `assets/*.toml` and can be replaced through
//! [`ExtractionConfig`](crate::config::ExtractionConfig).

use once_cell::sync::Lazy;
use serde::{de::DeserializeOwned, Deserialize};
use std::{collections::BTreeMap, fs::read_to_string, path::Path};

use crate::{
    config::ExtractionConfig,
    error::NetdocError,
    properties::{ConnectionType, DeviceType, PropertyMap, RawShape},
};

pub const DEFAULT_DEVICE_RULES: &str = include_str!("../../assets/device_rules.toml");
pub const DEFAULT_CONNECTION_RULES: &str = include_str!("../../assets/connection_rules.toml");

/// Master id → master name, as read from the masters part.
pub type MasterMap = BTreeMap<String, String>;

/// One entry of a keyword table, as written in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeywordRule<T> {
    pub kind: T,
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RuleFile<T> {
    #[serde(rename = "rule", default = "Vec::new")]
    rules: Vec<KeywordRule<T>>,
}

#[derive(Debug, Clone, PartialEq)]
struct Keyword {
    tokens: Vec<String>,
    /// The last token matches as a prefix
    prefix: bool,
}

impl Keyword {
    fn parse(raw: &str) -> Option<Keyword> {
        let raw = raw.trim();
        let (body, prefix) = match raw.strip_suffix('*') {
            Some(body) => (body, true),
            None => (raw, false),
        };
        let tokens = coarse_tokens(body);
        if tokens.is_empty() {
            return None;
        }
        Some(Keyword { tokens, prefix })
    }

    fn matches(&self, haystack: &[String]) -> bool {
        let n = self.tokens.len();
        if haystack.len() < n {
            return false;
        }
        haystack.windows(n).any(|window| {
            window.iter().zip(&self.tokens).enumerate().all(|(i, (hay, kw))| {
                if self.prefix && i == n - 1 {
                    hay.starts_with(kw.as_str())
                } else {
                    hay == kw
                }
            })
        })
    }
}

/// An ordered keyword table mapping text to a taxonomy value.
///
/// Rules are tried in order and the first rule with any matching keyword wins; keyword
/// specificity plays no part.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTable<T> {
    rules: Vec<(T, Vec<Keyword>)>,
}

impl<T: Copy + DeserializeOwned> RuleTable<T> {
    pub fn from_rules(rules: Vec<KeywordRule<T>>) -> Self {
        RuleTable {
            rules: rules
                .into_iter()
                .map(|rule| {
                    let keywords = rule
                        .keywords
                        .iter()
                        .filter_map(|k| Keyword::parse(k))
                        .collect();
                    (rule.kind, keywords)
                })
                .collect(),
        }
    }

    pub fn from_toml(src: &str) -> Result<Self, NetdocError> {
        let file: RuleFile<T> = toml::from_str(src)?;
        if file.rules.is_empty() {
            return Err(NetdocError::Config(
                "keyword table defines no [[rule]] entries".to_string(),
            ));
        }
        Ok(Self::from_rules(file.rules))
    }

    pub fn load(path: &Path) -> Result<Self, NetdocError> {
        tracing::debug!("Loading keyword table from {:?}", path);
        let content = read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The kind of the first rule with a keyword present in `text`.
    pub fn first_match(&self, text: &str) -> Option<T> {
        if text.trim().is_empty() {
            return None;
        }
        let coarse = coarse_tokens(text);
        let fine = fine_tokens(text);
        self.rules
            .iter()
            .find(|(_, keywords)| {
                keywords
                    .iter()
                    .any(|k| k.matches(&coarse) || k.matches(&fine))
            })
            .map(|(kind, _)| *kind)
    }
}

/// Lowercased runs of alphanumeric characters.
fn coarse_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Coarse tokens further split at lower→upper case changes and letter↔digit changes, so that
/// "EdgeRouter01" yields `edge router 01`.
fn fine_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let mut current = String::new();
        let mut prev: Option<char> = None;
        for c in word.chars() {
            if let Some(p) = prev {
                let case_break = p.is_lowercase() && c.is_uppercase();
                let digit_break = p.is_ascii_digit() != c.is_ascii_digit();
                if (case_break || digit_break) && !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            current.extend(c.to_lowercase());
            prev = Some(c);
        }
        if !current.is_empty() {
            tokens.push(current);
        }
    }
    tokens
}

static EMBEDDED_DEVICE_RULES: Lazy<Result<RuleTable<DeviceType>, NetdocError>> =
    Lazy::new(|| RuleTable::from_toml(DEFAULT_DEVICE_RULES));

static EMBEDDED_CONNECTION_RULES: Lazy<Result<RuleTable<ConnectionType>, NetdocError>> =
    Lazy::new(|| RuleTable::from_toml(DEFAULT_CONNECTION_RULES));

/// Classify a shape: master name first, then label, then `Unknown`.
pub fn classify(shape: &RawShape, masters: &MasterMap, table: &RuleTable<DeviceType>) -> DeviceType {
    shape
        .master
        .as_ref()
        .and_then(|id| masters.get(id))
        .and_then(|name| table.first_match(name))
        .or_else(|| table.first_match(&shape.text))
        .unwrap_or_default()
}

/// Classify a connector: label first, then property values in key order, then `Unknown`.
pub fn classify_connection(
    label: &str,
    properties: &PropertyMap,
    table: &RuleTable<ConnectionType>,
) -> ConnectionType {
    table
        .first_match(label)
        .or_else(|| properties.values().find_map(|v| table.first_match(v)))
        .unwrap_or_default()
}

/// The device and connection tables used for one parse.
#[derive(Debug, Clone)]
pub struct Classifier {
    pub devices: RuleTable<DeviceType>,
    pub connections: RuleTable<ConnectionType>,
}

impl Classifier {
    /// The tables embedded in the crate.
    pub fn embedded() -> Result<Self, NetdocError> {
        Ok(Classifier {
            devices: EMBEDDED_DEVICE_RULES.clone()?,
            connections: EMBEDDED_CONNECTION_RULES.clone()?,
        })
    }

    /// Embedded tables, replaced by any table files named in the configuration.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, NetdocError> {
        let mut classifier = Self::embedded()?;
        if let Some(path) = &config.device_rules {
            classifier.devices = RuleTable::load(path)?;
        }
        if let Some(path) = &config.connection_rules {
            classifier.connections = RuleTable::load(path)?;
        }
        Ok(classifier)
    }

    pub fn classify_shape(&self, shape: &RawShape, masters: &MasterMap) -> DeviceType {
        classify(shape, masters, &self.devices)
    }

    pub fn classify_connection(&self, label: &str, properties: &PropertyMap) -> ConnectionType {
        classify_connection(label, properties, &self.connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{Bounds, ShapeId};

    fn shape(text: &str, master: Option<&str>) -> RawShape {
        RawShape {
            id: ShapeId::from("1"),
            text: text.to_string(),
            master: master.map(str::to_string),
            bounds: Bounds::default(),
            rows: vec![],
            page: 1,
            group: None,
        }
    }

    fn label(classifier: &Classifier, text: &str) -> DeviceType {
        classifier.classify_shape(&shape(text, None), &MasterMap::new())
    }

    #[test]
    fn test_embedded_tables_parse() {
        let classifier = Classifier::embedded().unwrap();
        assert_eq!(classifier.devices.len(), 6);
        assert_eq!(classifier.connections.len(), 4);
    }

    #[test]
    fn test_device_labels() {
        let c = Classifier::embedded().unwrap();
        let cases = [
            ("RT-01", DeviceType::Router),
            ("Edge Router BGP", DeviceType::Router),
            ("Core-Router", DeviceType::Router),
            ("SW-CORE-01", DeviceType::Switch),
            ("L2 Switch", DeviceType::Switch),
            ("Edge-Switch", DeviceType::Switch),
            ("FW-01", DeviceType::Firewall),
            ("Palo Alto", DeviceType::Firewall),
            ("FortiGate", DeviceType::Firewall),
            ("ASA 5505", DeviceType::Firewall),
            ("DB-SRV-01", DeviceType::Server),
            ("ESXi Host", DeviceType::Server),
            ("Web Server", DeviceType::Server),
            ("PC", DeviceType::Workstation),
            ("User Laptop", DeviceType::Workstation),
            ("Desktop Computer", DeviceType::Workstation),
            ("Internet", DeviceType::Cloud),
            ("AWS VPC", DeviceType::Cloud),
            ("Azure Cloud", DeviceType::Cloud),
            ("Random Shape", DeviceType::Unknown),
            ("Some Text", DeviceType::Unknown),
            ("Unknown-Box", DeviceType::Unknown),
            ("", DeviceType::Unknown),
        ];
        for (text, expected) in cases {
            assert_eq!(label(&c, text), expected, "label {text:?}");
        }
    }

    #[test]
    fn test_router_keyword_any_casing() {
        let c = Classifier::embedded().unwrap();
        for text in ["router", "ROUTER", "Router", "rOuTeR-7", "branch_router"] {
            assert_eq!(label(&c, text), DeviceType::Router, "{text}");
        }
    }

    #[test]
    fn test_tokens_do_not_match_inside_words() {
        let c = Classifier::embedded().unwrap();
        // "station" is not a keyword and "rt" must not match inside "start"
        assert_eq!(label(&c, "Station"), DeviceType::Unknown);
        assert_eq!(label(&c, "Start here"), DeviceType::Unknown);
        assert_eq!(label(&c, "Workstation"), DeviceType::Workstation);
    }

    #[test]
    fn test_camel_case_and_digit_boundaries() {
        let c = Classifier::embedded().unwrap();
        assert_eq!(label(&c, "EdgeRouter01"), DeviceType::Router);
        assert_eq!(label(&c, "SW1"), DeviceType::Switch);
        assert_eq!(label(&c, "Catalyst9300"), DeviceType::Switch);
    }

    #[test]
    fn test_master_name_beats_label() {
        let c = Classifier::embedded().unwrap();
        let masters: MasterMap = [("4".to_string(), "Firewall".to_string())].into();
        let raw = shape("Core Router", Some("4"));
        assert_eq!(c.classify_shape(&raw, &masters), DeviceType::Firewall);

        // Unknown master id falls through to the label
        let raw = shape("Core Router", Some("99"));
        assert_eq!(c.classify_shape(&raw, &masters), DeviceType::Router);
    }

    #[test]
    fn test_first_rule_in_table_order_wins() {
        let table = RuleTable::from_rules(vec![
            KeywordRule {
                kind: DeviceType::Switch,
                keywords: vec!["switch".into()],
            },
            KeywordRule {
                kind: DeviceType::Router,
                keywords: vec!["router".into()],
            },
        ]);
        assert_eq!(table.first_match("Router Switch"), Some(DeviceType::Switch));
        assert_eq!(table.first_match("router"), Some(DeviceType::Router));
    }

    #[test]
    fn test_prefix_and_multi_token_keywords() {
        let table = RuleTable::from_rules(vec![KeywordRule {
            kind: DeviceType::Firewall,
            keywords: vec!["palo alto".into(), "pa*".into()],
        }]);
        assert_eq!(table.first_match("palo-alto"), Some(DeviceType::Firewall));
        assert_eq!(table.first_match("PA-3220"), Some(DeviceType::Firewall));
        assert_eq!(table.first_match("alto"), None);
        assert_eq!(table.first_match("spa"), None);
    }

    #[test]
    fn test_connection_types() {
        let c = Classifier::embedded().unwrap();
        let empty = PropertyMap::new();
        let cases = [
            ("1 Gig", ConnectionType::Ethernet),
            ("FastEthernet", ConnectionType::Ethernet),
            ("10G SFP+", ConnectionType::Fiber),
            ("Optical Link", ConnectionType::Fiber),
            ("IPSec", ConnectionType::Logical),
            ("VPN Tunnel", ConnectionType::Logical),
            ("802.1Q Trunk", ConnectionType::Trunk),
            ("", ConnectionType::Unknown),
        ];
        for (text, expected) in cases {
            assert_eq!(c.classify_connection(text, &empty), expected, "{text:?}");
        }
    }

    #[test]
    fn test_connection_falls_back_to_properties() {
        let c = Classifier::embedded().unwrap();
        let props: PropertyMap = [("media".to_string(), "Single Mode Fiber".to_string())].into();
        assert_eq!(c.classify_connection("uplink", &props), ConnectionType::Fiber);
    }

    #[test]
    fn test_table_from_toml_rejects_empty() {
        let err = RuleTable::<DeviceType>::from_toml("").unwrap_err();
        assert!(matches!(err, NetdocError::Config(_)));
    }
}
