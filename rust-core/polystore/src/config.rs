// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Store descriptor and store-type tags.
//
// A `StoreConfig` names the backend to use and where to find it. It can be
// deserialised from JSON (camelCase keys, with the legacy `dbType`/`dbUrl`/
// `dbName` spellings accepted), built in code, or loaded from `POLYSTORE_*`
// environment variables. The store type tag stays raw until the factory
// resolves it, so an unrecognised tag surfaces as `UnknownStoreType` rather
// than a deserialisation failure.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::StorageError;

/// Environment variable holding the store type tag.
pub const ENV_STORE_TYPE: &str = "POLYSTORE_STORE_TYPE";
/// Environment variable holding the backend URL (or file path).
pub const ENV_URL: &str = "POLYSTORE_URL";
/// Environment variable holding the logical namespace.
pub const ENV_NAME: &str = "POLYSTORE_NAME";
/// Environment variable holding the backend port.
pub const ENV_PORT: &str = "POLYSTORE_PORT";
/// Environment variable forcing a fresh connection on every `connect()`.
pub const ENV_NEW_CONNECTION: &str = "POLYSTORE_NEW_CONNECTION";

/// The closed set of backends a descriptor can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreType {
    /// MongoDB document store.
    Document,
    /// Redis key-value/hash store.
    KeyValue,
    /// redb record store.
    Record,
}

impl StoreType {
    /// Resolve a numeric flag (`1`, `2` or `4`).
    pub fn from_flag(flag: u64) -> Result<Self, StorageError> {
        match flag {
            1 => Ok(StoreType::Document),
            2 => Ok(StoreType::KeyValue),
            4 => Ok(StoreType::Record),
            other => Err(StorageError::UnknownStoreType(other.to_string())),
        }
    }

    /// The numeric flag for this store type.
    pub fn flag(self) -> u64 {
        match self {
            StoreType::Document => 1,
            StoreType::KeyValue => 2,
            StoreType::Record => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StoreType::Document => "document",
            StoreType::KeyValue => "key-value",
            StoreType::Record => "record",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "document" | "document-store" | "mongo" | "mongodb" => Ok(StoreType::Document),
            "key-value" | "keyvalue" | "key-value-store" | "kv" | "redis" => {
                Ok(StoreType::KeyValue)
            }
            "record" | "record-store" | "redb" => Ok(StoreType::Record),
            _ => match name.parse::<u64>() {
                Ok(flag) => StoreType::from_flag(flag),
                Err(_) => Err(StorageError::UnknownStoreType(s.to_string())),
            },
        }
    }
}

/// An unresolved store type tag, as it appears in configuration input.
///
/// Any JSON value decodes: tags that are neither a flag nor a name are kept
/// in `Other` and rejected on resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreTag {
    Flag(u64),
    Name(String),
    Other(Value),
}

impl StoreTag {
    /// Resolve the tag to a known store type.
    pub fn resolve(&self) -> Result<StoreType, StorageError> {
        match self {
            StoreTag::Flag(flag) => StoreType::from_flag(*flag),
            StoreTag::Name(name) => name.parse(),
            StoreTag::Other(value) => Err(StorageError::UnknownStoreType(value.to_string())),
        }
    }
}

impl From<StoreType> for StoreTag {
    fn from(store_type: StoreType) -> Self {
        StoreTag::Name(store_type.as_str().to_string())
    }
}

/// Descriptor selecting and locating a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Which adapter to construct.
    #[serde(alias = "dbType")]
    pub store_type: StoreTag,
    /// Connection URL, or database file path for the record store.
    #[serde(alias = "dbUrl")]
    pub url: String,
    /// Logical namespace: the MongoDB database, the redb table.
    #[serde(default, alias = "dbName")]
    pub name: String,
    /// Port merged into `url` when the URL does not carry one.
    #[serde(default)]
    pub port: Option<u16>,
    /// Replace the driver client on every `connect()` instead of reusing it.
    #[serde(default)]
    pub new_connection: bool,
}

impl StoreConfig {
    pub fn new(store_type: StoreType, url: impl Into<String>) -> Self {
        Self {
            store_type: store_type.into(),
            url: url.into(),
            name: String::new(),
            port: None,
            new_connection: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_new_connection(mut self, new_connection: bool) -> Self {
        self.new_connection = new_connection;
        self
    }

    /// Decode a descriptor from an untyped value.
    pub fn from_value(value: &Value) -> Result<Self, StorageError> {
        StoreConfig::deserialize(value)
            .map_err(|err| StorageError::Config(format!("store descriptor: {err}")))
    }

    /// Decode a descriptor from JSON text, e.g. a config file.
    pub fn from_json_str(text: &str) -> Result<Self, StorageError> {
        serde_json::from_str(text)
            .map_err(|err| StorageError::Config(format!("store descriptor: {err}")))
    }

    /// Load a descriptor from the `POLYSTORE_*` environment variables.
    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load a descriptor through `lookup`, which maps a variable name to its
    /// value. `POLYSTORE_STORE_TYPE` and `POLYSTORE_URL` are required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StorageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| StorageError::Config(format!("{name} is not set")))
        };

        let raw_type = required(ENV_STORE_TYPE)?;
        let store_type = match raw_type.trim().parse::<u64>() {
            Ok(flag) => StoreTag::Flag(flag),
            Err(_) => StoreTag::Name(raw_type),
        };
        let url = required(ENV_URL)?;
        let name = lookup(ENV_NAME).unwrap_or_default();
        let port = match lookup(ENV_PORT) {
            Some(raw) if !raw.trim().is_empty() => Some(raw.trim().parse::<u16>().map_err(|err| {
                StorageError::Config(format!("{ENV_PORT}={raw}: {err}"))
            })?),
            _ => None,
        };
        let new_connection = match lookup(ENV_NEW_CONNECTION) {
            Some(raw) => parse_bool(ENV_NEW_CONNECTION, &raw)?,
            None => false,
        };

        debug!(url = %url, name = %name, "loaded store descriptor from environment");
        Ok(Self {
            store_type,
            url,
            name,
            port,
            new_connection,
        })
    }

    /// Resolve the store type tag.
    pub fn store_type(&self) -> Result<StoreType, StorageError> {
        self.store_type.resolve()
    }

    /// The URL with `port` merged in when the URL's authority has none.
    ///
    /// ```rust
    /// use polystore::config::{StoreConfig, StoreType};
    ///
    /// let config = StoreConfig::new(StoreType::KeyValue, "redis://cache").with_port(6380);
    /// assert_eq!(config.endpoint(), "redis://cache:6380");
    /// ```
    pub fn endpoint(&self) -> String {
        let Some(port) = self.port else {
            return self.url.clone();
        };
        let (scheme, rest) = match self.url.split_once("://") {
            Some((scheme, rest)) => (Some(scheme), rest),
            None => (None, self.url.as_str()),
        };
        let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);
        let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
        // Multi-host URIs (`a:1,b:2`) carry their own ports. A bracketed IPv6
        // host has one only after the closing bracket.
        let has_port = match host.rsplit_once(']') {
            Some((_, after)) => after.starts_with(':'),
            None => host.contains(':'),
        };
        if has_port || host.contains(',') || host.is_empty() {
            return self.url.clone();
        }
        match scheme {
            Some(scheme) => format!("{scheme}://{authority}:{port}{tail}"),
            None => format!("{authority}:{port}{tail}"),
        }
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, StorageError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(StorageError::Config(format!(
            "{name}={raw}: expected a boolean"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_store_type_flags() {
        assert_eq!(StoreType::from_flag(1).unwrap(), StoreType::Document);
        assert_eq!(StoreType::from_flag(2).unwrap(), StoreType::KeyValue);
        assert_eq!(StoreType::from_flag(4).unwrap(), StoreType::Record);
        for store_type in [StoreType::Document, StoreType::KeyValue, StoreType::Record] {
            assert_eq!(StoreType::from_flag(store_type.flag()).unwrap(), store_type);
        }
        assert!(matches!(
            StoreType::from_flag(3),
            Err(StorageError::UnknownStoreType(ref tag)) if tag == "3"
        ));
    }

    #[test]
    fn test_store_type_names() {
        assert_eq!("redis".parse::<StoreType>().unwrap(), StoreType::KeyValue);
        assert_eq!("Mongo".parse::<StoreType>().unwrap(), StoreType::Document);
        assert_eq!("record".parse::<StoreType>().unwrap(), StoreType::Record);
        assert_eq!("2".parse::<StoreType>().unwrap(), StoreType::KeyValue);
        assert!(matches!(
            "cassandra".parse::<StoreType>(),
            Err(StorageError::UnknownStoreType(_))
        ));
    }

    #[test]
    fn test_descriptor_from_json() {
        let config = StoreConfig::from_value(&json!({
            "storeType": 2,
            "url": "redis://localhost",
            "port": 6379,
            "newConnection": true
        }))
        .unwrap();
        assert_eq!(config.store_type().unwrap(), StoreType::KeyValue);
        assert_eq!(config.name, "");
        assert!(config.new_connection);
        assert_eq!(config.endpoint(), "redis://localhost:6379");
    }

    #[test]
    fn test_legacy_field_names() {
        let config = StoreConfig::from_json_str(
            r#"{"dbType": 1, "dbUrl": "mongodb://db", "dbName": "app"}"#,
        )
        .unwrap();
        assert_eq!(config.store_type().unwrap(), StoreType::Document);
        assert_eq!(config.name, "app");
    }

    #[test]
    fn test_unknown_tag_survives_decoding() {
        let config =
            StoreConfig::from_value(&json!({"storeType": 999, "url": "x"})).unwrap();
        assert!(matches!(
            config.store_type(),
            Err(StorageError::UnknownStoreType(ref tag)) if tag == "999"
        ));
    }

    #[test]
    fn test_non_flag_tags_survive_decoding() {
        for tag in [json!(-1), json!(1.5), json!(true), json!(null), json!([4])] {
            let config =
                StoreConfig::from_value(&json!({"storeType": tag.clone(), "url": "x"})).unwrap();
            assert_eq!(config.store_type, StoreTag::Other(tag.clone()));
            assert!(matches!(
                config.store_type(),
                Err(StorageError::UnknownStoreType(ref raw)) if *raw == tag.to_string()
            ));
        }
    }

    #[test]
    fn test_missing_url_is_config_error() {
        let err = StoreConfig::from_value(&json!({"storeType": "redis"})).unwrap_err();
        assert!(matches!(err, StorageError::Config(ref msg) if msg.contains("url")));
    }

    #[test]
    fn test_endpoint_merging() {
        let base = |url: &str| StoreConfig::new(StoreType::Document, url).with_port(27017);
        assert_eq!(
            base("mongodb://user:pw@db/app?tls=true").endpoint(),
            "mongodb://user:pw@db:27017/app?tls=true"
        );
        assert_eq!(base("mongodb://db:27018").endpoint(), "mongodb://db:27018");
        assert_eq!(base("mongodb://a:1,b:2/app").endpoint(), "mongodb://a:1,b:2/app");
        assert_eq!(base("localhost").endpoint(), "localhost:27017");
        assert_eq!(base("mongodb://[::1]/app").endpoint(), "mongodb://[::1]:27017/app");
        assert_eq!(base("mongodb://[::1]:27018").endpoint(), "mongodb://[::1]:27018");
        assert_eq!(
            StoreConfig::new(StoreType::Record, "/var/lib/store.redb").endpoint(),
            "/var/lib/store.redb"
        );
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_STORE_TYPE, "record"),
            (ENV_URL, "/tmp/records.redb"),
            (ENV_NAME, "sessions"),
            (ENV_NEW_CONNECTION, "yes"),
        ]);
        let config = StoreConfig::from_lookup(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.store_type().unwrap(), StoreType::Record);
        assert_eq!(config.name, "sessions");
        assert_eq!(config.port, None);
        assert!(config.new_connection);
    }

    #[test]
    fn test_from_lookup_numeric_tag_and_port() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_STORE_TYPE, "2"),
            (ENV_URL, "redis://cache"),
            (ENV_PORT, "6380"),
        ]);
        let config = StoreConfig::from_lookup(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.store_type, StoreTag::Flag(2));
        assert_eq!(config.endpoint(), "redis://cache:6380");
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let missing = StoreConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(missing, StorageError::Config(ref msg) if msg.contains(ENV_STORE_TYPE)));

        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_STORE_TYPE, "redis"),
            (ENV_URL, "redis://cache"),
            (ENV_PORT, "not-a-port"),
        ]);
        let err = StoreConfig::from_lookup(|name| env.get(name).map(|v| v.to_string()))
            .unwrap_err();
        assert!(matches!(err, StorageError::Config(ref msg) if msg.contains(ENV_PORT)));
    }
}
