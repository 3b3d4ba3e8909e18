//! In-memory permission table.
//!
//! The persisted document is a single JSON object:
//!
//! ```json
//! {
//!     "Permissions": {
//!         "Upload": {
//!             "DefaultValue": false,
//!             "AllowedRoles": ["SW", "HW"]
//!         }
//!     }
//! }
//! ```
//!
//! Document order is the display order, so the table keeps records in a
//! Vec and serializes them back in the same order. Serialization is
//! deterministic: saving an unchanged table twice produces byte-identical
//! output.

use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SyncError};

/// One row of the permission table.
///
/// The name is the unique key and is immutable after creation; edits
/// replace the value fields wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    name: String,
    default_value: bool,
    allowed_roles: Vec<String>,
}

impl PermissionRecord {
    pub fn new(
        name: impl Into<String>,
        default_value: bool,
        allowed_roles: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SyncError::Validation(
                "Permission name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name,
            default_value,
            allowed_roles,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> bool {
        self.default_value
    }

    /// Allowed roles in document order. Roles outside the fixed
    /// vocabulary are kept as-is and round-trip untouched.
    pub fn allowed_roles(&self) -> &[String] {
        &self.allowed_roles
    }
}

/// Ordered, name-unique set of permission records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionTable {
    records: Vec<PermissionRecord>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionRecord> {
        self.records.iter()
    }

    pub fn get(&self, name: &str) -> Option<&PermissionRecord> {
        self.records.iter().find(|record| record.name == name)
    }

    /// Append a record. The name must be unique within the table.
    pub fn insert(&mut self, record: PermissionRecord) -> Result<()> {
        if self.get(&record.name).is_some() {
            return Err(SyncError::Validation(format!(
                "Permission already exists: {}",
                record.name
            )));
        }
        self.records.push(record);
        Ok(())
    }

    /// Replace the value fields of an existing record wholesale. The
    /// table is left untouched when the name is unknown.
    pub fn replace(
        &mut self,
        name: &str,
        default_value: bool,
        allowed_roles: Vec<String>,
    ) -> Result<()> {
        let record = self
            .records
            .iter_mut()
            .find(|record| record.name == name)
            .ok_or_else(|| SyncError::Validation(format!("Permission not found: {}", name)))?;
        record.default_value = default_value;
        record.allowed_roles = allowed_roles;
        Ok(())
    }

    /// Strict parse of a permission document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Deterministic, human-diffable serialization of the document.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    // Parse-time insert: a duplicate name keeps its first position and
    // takes the last value, the semantics of a key/value mapping.
    fn upsert(&mut self, name: String, default_value: bool, allowed_roles: Vec<String>) {
        match self.records.iter_mut().find(|record| record.name == name) {
            Some(existing) => {
                existing.default_value = default_value;
                existing.allowed_roles = allowed_roles;
            }
            None => self.records.push(PermissionRecord {
                name,
                default_value,
                allowed_roles,
            }),
        }
    }
}

#[derive(Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "DefaultValue")]
    default_value: bool,
    #[serde(rename = "AllowedRoles")]
    allowed_roles: &'a [String],
}

struct RecordsMap<'a>(&'a [PermissionRecord]);

impl Serialize for RecordsMap<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for record in self.0 {
            map.serialize_entry(
                &record.name,
                &RecordBody {
                    default_value: record.default_value,
                    allowed_roles: &record.allowed_roles,
                },
            )?;
        }
        map.end()
    }
}

impl Serialize for PermissionTable {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut doc = serializer.serialize_struct("PermissionDocument", 1)?;
        doc.serialize_field("Permissions", &RecordsMap(&self.records))?;
        doc.end()
    }
}

// Missing per-record fields fall back to a disabled permission with no
// allowed roles.
#[derive(Deserialize)]
struct RecordFields {
    #[serde(rename = "DefaultValue", default)]
    default_value: bool,
    #[serde(rename = "AllowedRoles", default)]
    allowed_roles: Vec<String>,
}

struct Records(PermissionTable);

impl<'de> Deserialize<'de> for Records {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RecordsVisitor;

        impl<'de> Visitor<'de> for RecordsVisitor {
            type Value = Records;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map of permission name to record")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut table = PermissionTable::new();
                while let Some((name, fields)) = map.next_entry::<String, RecordFields>()? {
                    if name.trim().is_empty() {
                        return Err(de::Error::custom("permission name must not be empty"));
                    }
                    table.upsert(name, fields.default_value, fields.allowed_roles);
                }
                Ok(Records(table))
            }
        }

        deserializer.deserialize_map(RecordsVisitor)
    }
}

impl<'de> Deserialize<'de> for PermissionTable {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DocVisitor;

        impl<'de> Visitor<'de> for DocVisitor {
            type Value = PermissionTable;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a permission document object")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut table: Option<PermissionTable> = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key == "Permissions" {
                        if table.is_some() {
                            return Err(de::Error::duplicate_field("Permissions"));
                        }
                        table = Some(map.next_value::<Records>()?.0);
                    } else {
                        // Unknown top-level fields are dropped: the
                        // document is replaced whole on save.
                        map.next_value::<IgnoredAny>()?;
                    }
                }
                table.ok_or_else(|| de::Error::missing_field("Permissions"))
            }
        }

        deserializer.deserialize_map(DocVisitor)
    }
}
