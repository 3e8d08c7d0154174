//! Field schemas and index definitions.
//!
//! A [`FieldSchema`] describes which fields a document of a collection may carry and
//! how the remote store maps them. It is used twice: by the coercion engine as an
//! allow-list for record data, and by the schema synchronizer as the mapping that is
//! created or reconciled on the remote collection.
//!
//! Descriptors serialize to the store's own mapping JSON, so a declared descriptor
//! can be compared field by field with what the store reports.
//!
//! # Example
//!
//! ```ignore
//! use indexlayer::schema::{FieldDescriptor, FieldSchema, IndexDefinition};
//!
//! let definition = IndexDefinition::new(
//!     FieldSchema::new()
//!         .field("title", FieldDescriptor::text())
//!         .field("views", FieldDescriptor::long())
//!         .field("author", FieldDescriptor::object(
//!             FieldSchema::new().field("name", FieldDescriptor::keyword()),
//!         )),
//! )
//! .with_index_setting("number_of_replicas", 1);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{IndexStoreError, IndexStoreResult};

/// Identity fields every record carries outside of its data.
pub const RESERVED_FIELDS: [&str; 3] = ["_id", "_index", "_score"];

/// Index-level settings the store refuses to change on an existing index.
///
/// These are sent when the index is created and never during reconciliation.
pub const STATIC_INDEX_SETTINGS: [&str; 7] = [
    "number_of_shards",
    "number_of_routing_shards",
    "codec",
    "routing_partition_size",
    "soft_deletes",
    "load_fixed_bitset_filters_eagerly",
    "shard",
];

/// Mapping type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Full-text string.
    Text,
    /// Exact-value string.
    Keyword,
    Long,
    Integer,
    Short,
    Byte,
    Double,
    Float,
    Boolean,
    /// Date as an RFC 3339 string or epoch milliseconds.
    Date,
    /// Inner object, flattened by the store.
    Object,
    /// Array of inner objects, indexed as independent documents.
    Nested,
}

impl FieldType {
    /// Returns `true` for string types.
    pub fn is_string(&self) -> bool {
        matches!(self, FieldType::Text | FieldType::Keyword)
    }

    /// Returns `true` for whole-number types.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::Long | FieldType::Integer | FieldType::Short | FieldType::Byte
        )
    }

    /// Returns `true` for every numeric type.
    pub fn is_number(&self) -> bool {
        self.is_integer() || matches!(self, FieldType::Double | FieldType::Float)
    }

    /// Returns `true` for types that hold inner objects.
    pub fn is_object(&self) -> bool {
        matches!(self, FieldType::Object | FieldType::Nested)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::Long => "long",
            FieldType::Integer => "integer",
            FieldType::Short => "short",
            FieldType::Byte => "byte",
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Object => "object",
            FieldType::Nested => "nested",
        };

        f.write_str(name)
    }
}

/// Mapping of a single field.
///
/// A descriptor without a type but with `properties` is an object field, which is
/// how the store itself reports object mappings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// The mapping type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    /// Whether the field is searchable. The store treats a missing value as `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
    /// Custom date format. Date strings are passed through untouched when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Schema of inner fields for object and nested fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<FieldSchema>,
}

impl FieldDescriptor {
    /// Creates a descriptor of the given type.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type: Some(field_type),
            ..Self::default()
        }
    }

    pub fn text() -> Self {
        Self::new(FieldType::Text)
    }

    pub fn keyword() -> Self {
        Self::new(FieldType::Keyword)
    }

    pub fn long() -> Self {
        Self::new(FieldType::Long)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn double() -> Self {
        Self::new(FieldType::Double)
    }

    pub fn float() -> Self {
        Self::new(FieldType::Float)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn date() -> Self {
        Self::new(FieldType::Date)
    }

    /// Creates an object field with the given inner schema.
    ///
    /// The type is left unset, matching how the store reports object mappings.
    pub fn object(properties: FieldSchema) -> Self {
        Self {
            properties: Some(properties),
            ..Self::default()
        }
    }

    /// Creates a nested field (array of objects) with the given inner schema.
    pub fn nested(properties: FieldSchema) -> Self {
        Self {
            field_type: Some(FieldType::Nested),
            properties: Some(properties),
            ..Self::default()
        }
    }

    /// Marks the field as stored but not searchable.
    pub fn not_indexed(mut self) -> Self {
        self.index = Some(false);
        self
    }

    /// Sets a custom date format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Whether the field is searchable.
    pub fn indexed(&self) -> bool {
        self.index.unwrap_or(true)
    }

    /// Returns the effective type: an untyped descriptor with properties is an object.
    pub fn effective_type(&self) -> Option<FieldType> {
        match (self.field_type, &self.properties) {
            (Some(field_type), _) => Some(field_type),
            (None, Some(_)) => Some(FieldType::Object),
            (None, None) => None,
        }
    }

    /// Returns the descriptor as the store's mapping JSON.
    pub fn to_value(&self) -> IndexStoreResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn validate(&self, path: &str) -> IndexStoreResult<()> {
        if let Some(properties) = &self.properties {
            if !self.effective_type().is_some_and(|t| t.is_object()) {
                return Err(IndexStoreError::InvalidSchema(format!(
                    "field `{}` declares properties but is not an object or nested field",
                    path
                )));
            }

            properties.validate_at(Some(path))?;
        }

        Ok(())
    }
}

/// Ordered mapping from field name to [`FieldDescriptor`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSchema(BTreeMap<String, FieldDescriptor>);

impl FieldSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds a field, builder style. A field declared twice keeps the last descriptor.
    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.0.insert(name.into(), descriptor);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Option<FieldDescriptor> {
        self.0.insert(name.into(), descriptor)
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldDescriptor)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks the schema invariants.
    ///
    /// Field names must be non-empty, top-level names must not collide with the
    /// [`RESERVED_FIELDS`], and only object and nested fields may declare properties.
    pub fn validate(&self) -> IndexStoreResult<()> {
        self.validate_at(None)
    }

    fn validate_at(&self, parent: Option<&str>) -> IndexStoreResult<()> {
        for (name, descriptor) in &self.0 {
            if name.is_empty() {
                return Err(IndexStoreError::InvalidSchema(match parent {
                    Some(parent) => format!("empty field name under `{}`", parent),
                    None => "empty field name".to_string(),
                }));
            }

            let path = match parent {
                Some(parent) => format!("{}.{}", parent, name),
                None => {
                    if RESERVED_FIELDS.contains(&name.as_str()) {
                        return Err(IndexStoreError::InvalidSchema(format!(
                            "field `{}` collides with a reserved identity field",
                            name
                        )));
                    }
                    name.clone()
                }
            };

            descriptor.validate(&path)?;
        }

        Ok(())
    }
}

impl FromIterator<(String, FieldDescriptor)> for FieldSchema {
    fn from_iter<I: IntoIterator<Item = (String, FieldDescriptor)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FieldSchema {
    type Item = (&'a String, &'a FieldDescriptor);
    type IntoIter = std::collections::btree_map::Iter<'a, String, FieldDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Mappings section of an index definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mappings {
    /// Declared fields.
    #[serde(default)]
    pub properties: FieldSchema,
    /// Other mapping options such as `dynamic` or `_source`, sent only on creation.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Settings section of an index definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Index-level settings such as `number_of_replicas` or `refresh_interval`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub index: Map<String, Value>,
    /// Other settings sections such as `analysis`, sent only on creation.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Everything needed to create a remote collection: settings, mappings and aliases.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<IndexSettings>,
    #[serde(default)]
    pub mappings: Mappings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Value>,
}

impl IndexDefinition {
    /// Creates a definition with the given field schema and no settings.
    pub fn new(properties: FieldSchema) -> Self {
        Self {
            settings: None,
            mappings: Mappings {
                properties,
                extra: Map::new(),
            },
            aliases: None,
        }
    }

    /// Returns the declared field schema.
    pub fn schema(&self) -> &FieldSchema {
        &self.mappings.properties
    }

    /// Sets a single index-level setting.
    pub fn with_index_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings
            .get_or_insert_with(IndexSettings::default)
            .index
            .insert(key.into(), value.into());
        self
    }

    /// Replaces the whole settings section.
    pub fn with_settings(mut self, settings: IndexSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Sets a mapping option other than `properties`, e.g. `dynamic`.
    pub fn with_mapping_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.mappings.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_aliases(mut self, aliases: Value) -> Self {
        self.aliases = Some(aliases);
        self
    }

    /// Returns the declared index-level settings the store accepts on an existing index.
    ///
    /// This is the `index` settings object minus [`STATIC_INDEX_SETTINGS`].
    pub fn mutable_index_settings(&self) -> Map<String, Value> {
        self.settings
            .as_ref()
            .map(|settings| {
                settings
                    .index
                    .iter()
                    .filter(|(key, _)| !STATIC_INDEX_SETTINGS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
