//! Registry metadata normalization into storage-safe module records
//!
//! Raw registry payloads key versions, release timestamps and users by
//! arbitrary strings, many of which contain literal periods (`1.2.3`,
//! `user.name`). Storage keys must not contain periods, so maps are
//! converted to ordered lists and every remaining object key is rewritten
//! with `.` encoded as `%20`, recursively through the whole document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Character that is unsafe in storage key namespaces.
const UNSAFE_KEY_CHAR: char = '.';

/// Replacement for the unsafe character, kept byte-identical to what the
/// reporting layer decodes.
const SAFE_ENCODING: &str = "%20";

#[derive(Debug)]
pub enum NormalizeError {
    MalformedPayload(String),
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeError::MalformedPayload(msg) => write!(f, "Malformed payload: {}", msg),
        }
    }
}

impl std::error::Error for NormalizeError {}

/// One dependency declaration of a published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub name: String,
    #[serde(rename = "version")]
    pub range: String,
}

/// One published version with its dependency list and remaining metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    pub dependencies: Vec<DependencyEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One lifecycle timestamp (`created`, `modified`, or a version string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub field: String,
    pub value: Value,
}

/// One starred-by-user flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
    #[serde(rename = "isUser")]
    pub is_user: bool,
}

/// Normalized package metadata, replaced wholesale on every crawl.
///
/// Invariant: no object key anywhere in this record contains a period
/// once `normalize_module` has produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub name: String,
    pub versions: Vec<VersionEntry>,
    pub time: Vec<TimeEntry>,
    pub users: Vec<UserEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModuleRecord {
    /// Serialize into the JSON document persisted in the modules
    /// collection. Keys are already sanitized.
    pub fn to_document(&self) -> Result<Value, NormalizeError> {
        serde_json::to_value(self)
            .map_err(|e| NormalizeError::MalformedPayload(format!("serialization failed: {}", e)))
    }
}

/// Normalize a raw registry metadata payload into a [`ModuleRecord`].
///
/// Pure transform: the version, time and user maps become ordered lists
/// (sorted key order, so identical input yields byte-identical output)
/// and every key at any depth has periods rewritten. Fails only when the
/// payload is not a JSON object.
pub fn normalize_module(name: &str, raw: &Value) -> Result<ModuleRecord, NormalizeError> {
    let obj = raw.as_object().ok_or_else(|| {
        NormalizeError::MalformedPayload(format!("metadata for '{}' is not an object", name))
    })?;

    let mut versions = Vec::new();
    if let Some(version_map) = obj.get("versions").and_then(Value::as_object) {
        for (version, meta) in version_map {
            versions.push(normalize_version(version, meta));
        }
    }

    let mut time = Vec::new();
    if let Some(time_map) = obj.get("time").and_then(Value::as_object) {
        for (field, value) in time_map {
            time.push(TimeEntry {
                field: sanitize_key(field),
                value: sanitize_value(value.clone()),
            });
        }
    }

    let mut users = Vec::new();
    if let Some(user_map) = obj.get("users").and_then(Value::as_object) {
        for (user, flag) in user_map {
            users.push(UserEntry {
                name: sanitize_key(user),
                is_user: flag.as_bool().unwrap_or(false),
            });
        }
    }

    let mut extra = Map::new();
    for (key, value) in obj {
        match key.as_str() {
            "versions" | "time" | "users" | "name" => {}
            _ => {
                extra.insert(sanitize_key(key), sanitize_value(value.clone()));
            }
        }
    }

    Ok(ModuleRecord {
        name: name.to_string(),
        versions,
        time,
        users,
        extra,
    })
}

fn normalize_version(version: &str, meta: &Value) -> VersionEntry {
    let mut dependencies = Vec::new();
    let mut extra = Map::new();

    if let Some(obj) = meta.as_object() {
        if let Some(dep_map) = obj.get("dependencies").and_then(Value::as_object) {
            for (dep, range) in dep_map {
                dependencies.push(DependencyEntry {
                    name: dep.clone(),
                    range: range.as_str().unwrap_or_default().to_string(),
                });
            }
        }

        for (key, value) in obj {
            match key.as_str() {
                "dependencies" | "version" => {}
                _ => {
                    extra.insert(sanitize_key(key), sanitize_value(value.clone()));
                }
            }
        }
    }

    VersionEntry {
        version: version.to_string(),
        dependencies,
        extra,
    }
}

fn sanitize_key(key: &str) -> String {
    if key.contains(UNSAFE_KEY_CHAR) {
        key.replace(UNSAFE_KEY_CHAR, SAFE_ENCODING)
    } else {
        key.to_string()
    }
}

/// Rewrite unsafe object keys through nested objects and arrays. Values
/// are never altered.
fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (sanitize_key(&k), sanitize_value(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        other => other,
    }
}
