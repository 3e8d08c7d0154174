//! Coercion between raw input data and canonical record data.
//!
//! [`coerce_input`] turns an arbitrary JSON object into [`CanonicalData`] governed by a
//! [`FieldSchema`]: undeclared fields are dropped, declared fields are converted to
//! their mapping type, and fields that were not supplied stay absent.
//! [`project_output`] is the way back, used whenever a record is sent over the wire.
//! [`coerce_stored`] applies the same rules to documents read back from the store,
//! keeping values it cannot convert instead of failing the read.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::{
    error::{IndexStoreError, IndexStoreResult},
    schema::{FieldDescriptor, FieldSchema, FieldType},
};

/// Schema-filtered, coerced field data of a record.
///
/// Only keys that were supplied and declared are present. There is no defaulting
/// and no null-filling.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalData(Map<String, Value>);

impl CanonicalData {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Overwrites fields with the ones supplied in `other`.
    pub fn merge(&mut self, other: CanonicalData) {
        self.0.extend(other.0);
    }
}

/// Coerces a raw JSON object into canonical data.
///
/// # Errors
///
/// Returns [`IndexStoreError::InvalidDocument`] naming the field path when a declared
/// field holds a value that cannot be converted to its mapping type.
pub fn coerce_input(raw: &Map<String, Value>, schema: &FieldSchema) -> IndexStoreResult<CanonicalData> {
    coerce_map(raw, schema, None).map(CanonicalData)
}

/// Coerces any JSON value into canonical data.
///
/// `null` is treated as an empty object. Anything other than an object is rejected.
pub fn coerce_value(raw: &Value, schema: &FieldSchema) -> IndexStoreResult<CanonicalData> {
    match raw {
        Value::Null => Ok(CanonicalData::default()),
        Value::Object(map) => coerce_input(map, schema),
        other => Err(IndexStoreError::InvalidDocument(format!(
            "expected an object, found {}",
            kind_of(other)
        ))),
    }
}

/// Coerces a document read back from the store.
///
/// Undeclared fields are dropped as in [`coerce_input`], but a declared value that
/// does not convert is kept as the store reported it. The store accepted it once,
/// and one odd document must not make a whole search unreadable.
pub fn coerce_stored(source: &Map<String, Value>, schema: &FieldSchema) -> CanonicalData {
    CanonicalData(restore_map(source, schema, None))
}

/// Projects canonical data to a plain serializable object restricted to declared fields.
pub fn project_output(data: &CanonicalData, schema: &FieldSchema) -> Map<String, Value> {
    project_map(&data.0, schema)
}

fn coerce_map(
    raw: &Map<String, Value>,
    schema: &FieldSchema,
    parent: Option<&str>,
) -> IndexStoreResult<Map<String, Value>> {
    let mut coerced = Map::new();

    for (name, descriptor) in schema {
        if let Some(value) = raw.get(name) {
            let path = match parent {
                Some(parent) => format!("{}.{}", parent, name),
                None => name.clone(),
            };

            coerced.insert(name.clone(), coerce_field(value, descriptor, &path)?);
        }
    }

    Ok(coerced)
}

fn coerce_field(value: &Value, descriptor: &FieldDescriptor, path: &str) -> IndexStoreResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        // Every field type accepts an array of values of that type.
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| coerce_field(item, descriptor, &format!("{}[{}]", path, i)))
                .collect::<IndexStoreResult<Vec<_>>>()?,
        )),
        _ => match descriptor.effective_type() {
            Some(FieldType::Text | FieldType::Keyword) => coerce_string(value, path),
            Some(
                field_type @ (FieldType::Long
                | FieldType::Integer
                | FieldType::Short
                | FieldType::Byte
                | FieldType::Double
                | FieldType::Float),
            ) => coerce_number(value, field_type, path),
            Some(FieldType::Boolean) => coerce_boolean(value, path),
            Some(FieldType::Date) => coerce_date(value, descriptor.format.is_some(), path),
            Some(FieldType::Object | FieldType::Nested) => {
                coerce_object(value, descriptor.properties.as_ref(), path)
            }
            None => Ok(value.clone()),
        },
    }
}

fn coerce_string(value: &Value, path: &str) -> IndexStoreResult<Value> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(number) => Ok(Value::String(number.to_string())),
        Value::Bool(flag) => Ok(Value::String(flag.to_string())),
        other => Err(mismatch(path, "a string", other)),
    }
}

fn coerce_number(value: &Value, field_type: FieldType, path: &str) -> IndexStoreResult<Value> {
    let number = match value {
        Value::Number(number) => number.clone(),
        Value::String(text) => parse_number(text.trim()).ok_or_else(|| mismatch(path, "a number", value))?,
        other => return Err(mismatch(path, "a number", other)),
    };

    let Some((min, max)) = integer_bounds(field_type) else {
        return Ok(Value::Number(number));
    };

    let whole = match (number.as_i64(), number.as_f64()) {
        (Some(whole), _) => whole,
        // Beyond i64 only u64 remains, which no integer type can hold.
        (None, _) if number.is_u64() => return Err(out_of_range(path, field_type, value)),
        (None, Some(float)) if float.fract() == 0.0 => {
            if float < i64::MIN as f64 || float >= i64::MAX as f64 {
                return Err(out_of_range(path, field_type, value));
            }
            float as i64
        }
        _ => return Err(mismatch(path, "a whole number", value)),
    };

    if whole < min || whole > max {
        return Err(out_of_range(path, field_type, value));
    }

    Ok(Value::Number(Number::from(whole)))
}

/// Inclusive value range of the integer mapping types.
fn integer_bounds(field_type: FieldType) -> Option<(i64, i64)> {
    match field_type {
        FieldType::Byte => Some((i8::MIN.into(), i8::MAX.into())),
        FieldType::Short => Some((i16::MIN.into(), i16::MAX.into())),
        FieldType::Integer => Some((i32::MIN.into(), i32::MAX.into())),
        FieldType::Long => Some((i64::MIN, i64::MAX)),
        _ => None,
    }
}

fn parse_number(text: &str) -> Option<Number> {
    text.parse::<i64>()
        .map(Number::from)
        .ok()
        .or_else(|| text.parse::<u64>().map(Number::from).ok())
        .or_else(|| text.parse::<f64>().ok().and_then(Number::from_f64))
}

fn coerce_boolean(value: &Value, path: &str) -> IndexStoreResult<Value> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::String(text) if text == "true" => Ok(Value::Bool(true)),
        Value::String(text) if text == "false" => Ok(Value::Bool(false)),
        other => Err(mismatch(path, "a boolean", other)),
    }
}

fn coerce_date(value: &Value, custom_format: bool, path: &str) -> IndexStoreResult<Value> {
    match value {
        // Epoch milliseconds.
        Value::Number(_) => Ok(value.clone()),
        Value::String(_) if custom_format => Ok(value.clone()),
        Value::String(text) => match parse_date(text.trim()) {
            Some(ParsedDate::Zoned(datetime)) => Ok(Value::String(
                datetime
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            Some(ParsedDate::Local) => Ok(value.clone()),
            None => Err(mismatch(path, "a date", value)),
        },
        other => Err(mismatch(path, "a date", other)),
    }
}

enum ParsedDate {
    /// Carries a zone and can be normalized to UTC.
    Zoned(DateTime<FixedOffset>),
    /// Zone-less, reduced-precision or epoch-millis form the store reads as is.
    Local,
}

/// `%z` accepts both `+0200` and `+02:00`.
const ZONED_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z"];

const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Recognizes the store's default `strict_date_optional_time||epoch_millis` format.
fn parse_date(text: &str) -> Option<ParsedDate> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(ParsedDate::Zoned(datetime));
    }

    if let Some(datetime) = ZONED_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(text, format).ok())
    {
        return Some(ParsedDate::Zoned(datetime));
    }

    // Epoch milliseconds, or a bare year.
    let digits = text.strip_prefix('-').unwrap_or(text);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return Some(ParsedDate::Local);
    }

    let is_local = LOCAL_FORMATS
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(text, format).is_ok())
        // Hour only: 2024-03-01T10
        || NaiveDateTime::parse_from_str(&format!("{}:00", text), "%Y-%m-%dT%H:%M").is_ok()
        || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        // Year and month: 2024-03
        || NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d").is_ok();

    is_local.then_some(ParsedDate::Local)
}

fn coerce_object(value: &Value, properties: Option<&FieldSchema>, path: &str) -> IndexStoreResult<Value> {
    match (value, properties) {
        (Value::Object(map), Some(schema)) => Ok(Value::Object(coerce_map(map, schema, Some(path))?)),
        // Without an inner schema the object is kept as supplied.
        (Value::Object(_), None) => Ok(value.clone()),
        (other, _) => Err(mismatch(path, "an object", other)),
    }
}

fn restore_map(source: &Map<String, Value>, schema: &FieldSchema, parent: Option<&str>) -> Map<String, Value> {
    schema
        .iter()
        .filter_map(|(name, descriptor)| {
            source.get(name).map(|value| {
                let path = match parent {
                    Some(parent) => format!("{}.{}", parent, name),
                    None => name.clone(),
                };

                (name.clone(), restore_value(value, descriptor, &path))
            })
        })
        .collect()
}

fn restore_value(value: &Value, descriptor: &FieldDescriptor, path: &str) -> Value {
    match (value, &descriptor.properties) {
        (Value::Object(map), Some(schema)) => Value::Object(restore_map(map, schema, Some(path))),
        (Value::Array(items), Some(_)) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| restore_value(item, descriptor, &format!("{}[{}]", path, i)))
                .collect(),
        ),
        _ => coerce_field(value, descriptor, path).unwrap_or_else(|err| {
            warn!(field = path, error = %err, "keeping stored value that does not fit the schema");
            value.clone()
        }),
    }
}

fn project_map(map: &Map<String, Value>, schema: &FieldSchema) -> Map<String, Value> {
    schema
        .iter()
        .filter_map(|(name, descriptor)| {
            map.get(name)
                .map(|value| (name.clone(), project_value(value, descriptor)))
        })
        .collect()
}

fn project_value(value: &Value, descriptor: &FieldDescriptor) -> Value {
    match (value, &descriptor.properties) {
        (Value::Object(map), Some(schema)) => Value::Object(project_map(map, schema)),
        (Value::Array(items), Some(_)) => Value::Array(
            items
                .iter()
                .map(|item| project_value(item, descriptor))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn mismatch(path: &str, expected: &str, found: &Value) -> IndexStoreError {
    IndexStoreError::InvalidDocument(format!(
        "field `{}` expected {}, found {}",
        path,
        expected,
        kind_of(found)
    ))
}

fn out_of_range(path: &str, field_type: FieldType, found: &Value) -> IndexStoreError {
    IndexStoreError::InvalidDocument(format!(
        "field `{}` value {} is out of range for {}",
        path, found, field_type
    ))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> FieldSchema {
        FieldSchema::new()
            .field("stringField", FieldDescriptor::keyword())
            .field("count", FieldDescriptor::long())
            .field("ratio", FieldDescriptor::double())
            .field("active", FieldDescriptor::boolean())
            .field("created", FieldDescriptor::date())
            .field("author", FieldDescriptor::object(
                FieldSchema::new()
                    .field("name", FieldDescriptor::text())
                    .field("age", FieldDescriptor::integer()),
            ))
            .field("comments", FieldDescriptor::nested(
                FieldSchema::new().field("body", FieldDescriptor::text()),
            ))
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn undeclared_fields_are_dropped() {
        let data = coerce_input(&object(json!({ "stringField": "a", "extra": "b" })), &schema()).unwrap();

        assert_eq!(Value::Object(data.into_map()), json!({ "stringField": "a" }));
    }

    #[test]
    fn missing_fields_stay_absent() {
        let data = coerce_input(&object(json!({ "count": 1 })), &schema()).unwrap();

        assert_eq!(data.len(), 1);
        assert!(!data.contains("stringField"));
        assert!(!data.contains("author"));
    }

    #[test]
    fn nested_objects_follow_the_inner_schema() {
        let data = coerce_input(
            &object(json!({
                "author": { "name": "Ada", "age": "36", "secret": true },
                "comments": [{ "body": "hi", "spam": 1 }, { "body": 2 }]
            })),
            &schema(),
        )
        .unwrap();

        assert_eq!(data.get("author"), Some(&json!({ "name": "Ada", "age": 36 })));
        assert_eq!(data.get("comments"), Some(&json!([{ "body": "hi" }, { "body": "2" }])));
    }

    #[test]
    fn scalars_are_coerced_to_their_mapping_type() {
        let data = coerce_input(
            &object(json!({
                "stringField": 42,
                "count": "17",
                "ratio": "0.5",
                "active": "true"
            })),
            &schema(),
        )
        .unwrap();

        assert_eq!(data.get("stringField"), Some(&json!("42")));
        assert_eq!(data.get("count"), Some(&json!(17)));
        assert_eq!(data.get("ratio"), Some(&json!(0.5)));
        assert_eq!(data.get("active"), Some(&json!(true)));
    }

    #[test]
    fn whole_floats_become_integers() {
        let data = coerce_input(&object(json!({ "count": 3.0 })), &schema()).unwrap();

        assert_eq!(data.get("count"), Some(&json!(3)));
    }

    #[test]
    fn fractional_values_are_rejected_for_integer_fields() {
        let err = coerce_input(&object(json!({ "count": 3.5 })), &schema()).unwrap_err();

        assert!(matches!(err, IndexStoreError::InvalidDocument(message) if message.contains("`count`")));
    }

    #[test]
    fn dates_are_normalized_to_utc() {
        let data = coerce_input(
            &object(json!({ "created": "2024-03-01T12:00:00+02:00" })),
            &schema(),
        )
        .unwrap();

        assert_eq!(data.get("created"), Some(&json!("2024-03-01T10:00:00.000Z")));
    }

    #[test]
    fn plain_dates_and_epoch_millis_are_kept() {
        let data = coerce_input(&object(json!({ "created": "2024-03-01" })), &schema()).unwrap();
        assert_eq!(data.get("created"), Some(&json!("2024-03-01")));

        let data = coerce_input(&object(json!({ "created": 1709287200000_i64 })), &schema()).unwrap();
        assert_eq!(data.get("created"), Some(&json!(1709287200000_i64)));
    }

    #[test]
    fn store_date_forms_are_accepted() {
        let kept = ["1709287200000", "-86400000", "2024", "2024-03", "2024-03-01T10", "2024-03-01T10:30"];

        for text in kept {
            let data = coerce_input(&object(json!({ "created": text })), &schema()).unwrap();
            assert_eq!(data.get("created"), Some(&json!(text)), "{}", text);
        }

        let data = coerce_input(
            &object(json!({ "created": "2024-03-01T12:00:00+0200" })),
            &schema(),
        )
        .unwrap();
        assert_eq!(data.get("created"), Some(&json!("2024-03-01T10:00:00.000Z")));

        let data = coerce_input(&object(json!({ "created": "2024-03-01T12:00-0130" })), &schema()).unwrap();
        assert_eq!(data.get("created"), Some(&json!("2024-03-01T13:30:00.000Z")));
    }

    #[test]
    fn integer_types_check_their_range() {
        let schema = FieldSchema::new()
            .field("b", FieldDescriptor::new(FieldType::Byte))
            .field("s", FieldDescriptor::new(FieldType::Short))
            .field("i", FieldDescriptor::integer())
            .field("l", FieldDescriptor::long());

        let data = coerce_input(
            &object(json!({ "b": -128, "s": "32767", "i": 2147483647_i64, "l": i64::MIN })),
            &schema,
        )
        .unwrap();
        assert_eq!(data.get("b"), Some(&json!(-128)));
        assert_eq!(data.get("s"), Some(&json!(32767)));

        let too_big = [
            json!({ "b": 200 }),
            json!({ "b": "128" }),
            json!({ "s": 40000 }),
            json!({ "i": 3_000_000_000_i64 }),
            json!({ "i": -2147483649_i64 }),
            json!({ "l": u64::MAX }),
            json!({ "l": 1e19 }),
        ];

        for input in too_big {
            let err = coerce_input(&object(input.clone()), &schema).unwrap_err();
            assert!(
                matches!(&err, IndexStoreError::InvalidDocument(message) if message.contains("out of range")),
                "{} gave {:?}",
                input,
                err
            );
        }
    }

    #[test]
    fn stored_documents_keep_values_that_do_not_convert() {
        let data = coerce_stored(
            &object(json!({
                "created": "yesterday",
                "count": "17",
                "author": { "name": "Ada", "age": "old", "secret": 1 },
                "comments": [{ "body": 3 }, "not an object"],
                "extra": true
            })),
            &schema(),
        );

        assert_eq!(data.get("created"), Some(&json!("yesterday")));
        assert_eq!(data.get("count"), Some(&json!(17)));
        assert_eq!(data.get("author"), Some(&json!({ "name": "Ada", "age": "old" })));
        assert_eq!(data.get("comments"), Some(&json!([{ "body": "3" }, "not an object"])));
        assert!(!data.contains("extra"));
    }

    #[test]
    fn custom_date_formats_pass_through() {
        let schema = FieldSchema::new().field("day", FieldDescriptor::date().with_format("dd/MM/yyyy"));
        let data = coerce_input(&object(json!({ "day": "01/03/2024" })), &schema).unwrap();

        assert_eq!(data.get("day"), Some(&json!("01/03/2024")));
    }

    #[test]
    fn invalid_dates_are_rejected() {
        let err = coerce_input(&object(json!({ "created": "yesterday" })), &schema()).unwrap_err();

        assert!(matches!(err, IndexStoreError::InvalidDocument(_)));
    }

    #[test]
    fn arrays_are_coerced_element_wise() {
        let schema = FieldSchema::new().field("tags", FieldDescriptor::keyword());
        let data = coerce_input(&object(json!({ "tags": ["a", 1, true] })), &schema).unwrap();

        assert_eq!(data.get("tags"), Some(&json!(["a", "1", "true"])));
    }

    #[test]
    fn errors_name_the_nested_path() {
        let err = coerce_input(
            &object(json!({ "comments": [{ "body": "ok" }, { "body": { "no": 1 } }] })),
            &schema(),
        )
        .unwrap_err();

        assert!(matches!(err, IndexStoreError::InvalidDocument(message) if message.contains("comments[1].body")));
    }

    #[test]
    fn explicit_nulls_are_kept() {
        let data = coerce_input(&object(json!({ "count": null })), &schema()).unwrap();

        assert_eq!(data.get("count"), Some(&Value::Null));
    }

    #[test]
    fn non_object_input_is_rejected() {
        assert!(coerce_value(&json!([1, 2]), &schema()).is_err());
        assert!(coerce_value(&Value::Null, &schema()).unwrap().is_empty());
    }

    #[test]
    fn projection_keeps_exactly_the_supplied_declared_keys() {
        let inputs = [
            json!({}),
            json!({ "stringField": "x", "unknown": 1 }),
            json!({ "author": { "name": "n", "extra": 1 }, "count": 2, "zzz": null }),
            json!({ "comments": [{ "body": "b", "x": 1 }], "active": false }),
        ];

        for input in inputs {
            let raw = object(input);
            let data = coerce_input(&raw, &schema()).unwrap();
            let projected = project_output(&data, &schema());

            let mut expected = raw
                .keys()
                .filter(|key| schema().contains(key))
                .cloned()
                .collect::<Vec<_>>();
            expected.sort();

            assert_eq!(projected.keys().cloned().collect::<Vec<_>>(), expected);

            if let Some(Value::Object(author)) = projected.get("author") {
                assert!(author.keys().all(|key| key == "name" || key == "age"));
            }
        }
    }
}
