//! Contract schemas as a closed tagged union.
//!
//! Schemas arrive as JSON Schema (draft-07) values. The common shapes are
//! parsed into typed variants; anything using keywords outside those shapes
//! (composition, conditionals, tuple items, boolean schemas) is kept verbatim
//! as [`Schema::Opaque`] so no constraint is ever dropped. Schemas carrying
//! `$id` or `$schema` also stay opaque, since those change how `$ref` resolves.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Annotation keywords that carry no constraint and may appear anywhere.
const ANNOTATIONS: &[&str] = &[
    "title",
    "description",
    "default",
    "examples",
    "$comment",
    "readOnly",
    "writeOnly",
    "deprecated",
];

const PRIMITIVE_KEYWORDS: &[&str] = &[
    "type",
    "enum",
    "const",
    "format",
    "pattern",
    "minLength",
    "maxLength",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
];

const OBJECT_KEYWORDS: &[&str] = &[
    "type",
    "properties",
    "required",
    "additionalProperties",
    "patternProperties",
    "dependencies",
    "dependentSchemas",
    "minProperties",
    "maxProperties",
    "definitions",
];

const ARRAY_KEYWORDS: &[&str] = &["type", "items", "minItems", "maxItems", "uniqueItems"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Number => "number",
            PrimitiveType::Integer => "integer",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Null => "null",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(PrimitiveType::String),
            "number" => Some(PrimitiveType::Number),
            "integer" => Some(PrimitiveType::Integer),
            "boolean" => Some(PrimitiveType::Boolean),
            "null" => Some(PrimitiveType::Null),
            _ => None,
        }
    }
}

/// Scalar schema: one primitive type plus string/number constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveSchema {
    pub kind: PrimitiveType,
    pub nullable: bool,
    pub enum_values: Option<Vec<Value>>,
    pub const_value: Option<Value>,
    pub format: Option<String>,
    pub pattern: Option<String>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub minimum: Option<Number>,
    pub maximum: Option<Number>,
    pub exclusive_minimum: Option<Number>,
    pub exclusive_maximum: Option<Number>,
    pub multiple_of: Option<Number>,
    pub description: Option<String>,
}

impl PrimitiveSchema {
    pub fn new(kind: PrimitiveType) -> Self {
        Self {
            kind,
            nullable: false,
            enum_values: None,
            const_value: None,
            format: None,
            pattern: None,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            exclusive_minimum: None,
            exclusive_maximum: None,
            multiple_of: None,
            description: None,
        }
    }
}

/// Either `additionalProperties: <bool>` or a schema for extra properties.
#[derive(Debug, Clone, PartialEq)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<Schema>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    /// Parsed from a schema without `type`; non-objects then pass, so no
    /// `type` is rendered.
    pub untyped: bool,
    pub properties: BTreeMap<String, Schema>,
    pub required: Vec<String>,
    pub additional_properties: Option<AdditionalProperties>,
    pub pattern_properties: BTreeMap<String, Schema>,
    /// Schemas applied when the named property is present.
    pub dependent_schemas: BTreeMap<String, Schema>,
    pub min_properties: Option<u64>,
    pub max_properties: Option<u64>,
    pub nullable: bool,
    /// Inline definitions that `$ref` pointers (`#/definitions/...`) resolve against.
    pub definitions: BTreeMap<String, Schema>,
    pub description: Option<String>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.properties.insert(name.into(), schema.into());
        self
    }

    pub fn required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = Some(AdditionalProperties::Allowed(allowed));
        self
    }

    pub fn definition(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.definitions.insert(name.into(), schema.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArraySchema {
    /// Parsed from a schema without `type`.
    pub untyped: bool,
    pub items: Option<Box<Schema>>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
    pub nullable: bool,
    pub description: Option<String>,
}

/// `{"$ref": "#/definitions/Name"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSchema {
    pub reference: String,
}

/// A JSON-Schema-shaped contract fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Schema {
    Primitive(PrimitiveSchema),
    Object(ObjectSchema),
    Array(ArraySchema),
    Reference(ReferenceSchema),
    /// Anything not modeled above, passed to the evaluator unchanged.
    Opaque(Value),
}

impl Schema {
    pub fn string() -> Self {
        Schema::Primitive(PrimitiveSchema::new(PrimitiveType::String))
    }

    pub fn integer() -> Self {
        Schema::Primitive(PrimitiveSchema::new(PrimitiveType::Integer))
    }

    pub fn number() -> Self {
        Schema::Primitive(PrimitiveSchema::new(PrimitiveType::Number))
    }

    pub fn boolean() -> Self {
        Schema::Primitive(PrimitiveSchema::new(PrimitiveType::Boolean))
    }

    pub fn null() -> Self {
        Schema::Primitive(PrimitiveSchema::new(PrimitiveType::Null))
    }

    pub fn array(items: impl Into<Schema>) -> Self {
        Schema::Array(ArraySchema {
            items: Some(Box::new(items.into())),
            ..ArraySchema::default()
        })
    }

    pub fn reference(pointer: impl Into<String>) -> Self {
        Schema::Reference(ReferenceSchema {
            reference: pointer.into(),
        })
    }

    pub fn opaque(value: Value) -> Self {
        Schema::Opaque(value)
    }

    /// Parses a JSON Schema value. Never fails; unmodeled shapes become
    /// [`Schema::Opaque`].
    pub fn from_json(value: Value) -> Self {
        let parsed = match &value {
            Value::Object(map) => parse_schema(map),
            _ => None,
        };
        parsed.unwrap_or(Schema::Opaque(value))
    }

    /// Renders the schema as a draft-07 JSON Schema value.
    pub fn to_json(&self) -> Value {
        match self {
            Schema::Primitive(schema) => primitive_to_json(schema),
            Schema::Object(schema) => object_to_json(schema),
            Schema::Array(schema) => array_to_json(schema),
            Schema::Reference(schema) => {
                let mut map = Map::new();
                map.insert("$ref".into(), Value::String(schema.reference.clone()));
                Value::Object(map)
            }
            Schema::Opaque(value) => value.clone(),
        }
    }

    /// Top-level type name, when the schema declares exactly one.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Schema::Primitive(schema) => Some(schema.kind.as_str()),
            Schema::Object(schema) if !schema.untyped => Some("object"),
            Schema::Array(schema) if !schema.untyped => Some("array"),
            _ => None,
        }
    }
}

impl From<Value> for Schema {
    fn from(value: Value) -> Self {
        Schema::from_json(value)
    }
}

impl From<Schema> for Value {
    fn from(schema: Schema) -> Self {
        schema.to_json()
    }
}

impl From<ObjectSchema> for Schema {
    fn from(schema: ObjectSchema) -> Self {
        Schema::Object(schema)
    }
}

impl From<PrimitiveSchema> for Schema {
    fn from(schema: PrimitiveSchema) -> Self {
        Schema::Primitive(schema)
    }
}

impl From<ArraySchema> for Schema {
    fn from(schema: ArraySchema) -> Self {
        Schema::Array(schema)
    }
}

// ===== Parsing =====

fn only_keys(map: &Map<String, Value>, allowed: &[&str]) -> bool {
    map.keys()
        .all(|key| allowed.contains(&key.as_str()) || ANNOTATIONS.contains(&key.as_str()))
}

/// Reads `type` as a single type, or a two-element `[type, "null"]` pair.
fn declared_type(map: &Map<String, Value>) -> Option<(Option<String>, bool)> {
    match map.get("type") {
        None => Some((None, false)),
        Some(Value::String(name)) => Some((Some(name.clone()), false)),
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            match names.as_slice() {
                [single] => Some((Some((*single).to_string()), false)),
                [a, "null"] | ["null", a] if *a != "null" => Some((Some((*a).to_string()), true)),
                _ => None,
            }
        }
        Some(_) => None,
    }
}

fn parse_schema(map: &Map<String, Value>) -> Option<Schema> {
    if let Some(reference) = map.get("$ref") {
        if !only_keys(map, &["$ref"]) {
            return None;
        }
        return reference.as_str().map(Schema::reference);
    }

    let (type_name, nullable) = declared_type(map)?;
    match type_name.as_deref() {
        Some("object") => parse_object(map, nullable, false).map(Schema::Object),
        Some("array") => parse_array(map, nullable, false).map(Schema::Array),
        Some(name) => {
            let kind = PrimitiveType::parse(name)?;
            parse_primitive(map, kind, nullable).map(Schema::Primitive)
        }
        None if map.contains_key("properties") || map.contains_key("required") => {
            parse_object(map, false, true).map(Schema::Object)
        }
        None if map.contains_key("items") => parse_array(map, false, true).map(Schema::Array),
        None => None,
    }
}

fn parse_primitive(
    map: &Map<String, Value>,
    kind: PrimitiveType,
    nullable: bool,
) -> Option<PrimitiveSchema> {
    if !only_keys(map, PRIMITIVE_KEYWORDS) {
        return None;
    }
    Some(PrimitiveSchema {
        kind,
        nullable,
        enum_values: match map.get("enum") {
            None => None,
            Some(Value::Array(values)) => Some(values.clone()),
            Some(_) => return None,
        },
        const_value: map.get("const").cloned(),
        format: optional_str(map, "format")?,
        pattern: optional_str(map, "pattern")?,
        min_length: optional_u64(map, "minLength")?,
        max_length: optional_u64(map, "maxLength")?,
        minimum: optional_number(map, "minimum")?,
        maximum: optional_number(map, "maximum")?,
        exclusive_minimum: optional_number(map, "exclusiveMinimum")?,
        exclusive_maximum: optional_number(map, "exclusiveMaximum")?,
        multiple_of: optional_number(map, "multipleOf")?,
        description: map
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn parse_object(map: &Map<String, Value>, nullable: bool, untyped: bool) -> Option<ObjectSchema> {
    if !only_keys(map, OBJECT_KEYWORDS) {
        return None;
    }
    let required = match map.get("required") {
        None => Vec::new(),
        Some(Value::Array(names)) => names
            .iter()
            .map(|name| name.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?,
        Some(_) => return None,
    };
    let additional_properties = match map.get("additionalProperties") {
        None => None,
        Some(Value::Bool(allowed)) => Some(AdditionalProperties::Allowed(*allowed)),
        Some(value @ Value::Object(_)) => Some(AdditionalProperties::Schema(Box::new(
            Schema::from_json(value.clone()),
        ))),
        Some(_) => return None,
    };
    // Draft-07 `dependencies` may also hold property-name arrays; those stay opaque.
    let mut dependent_schemas = schema_map(map, "dependentSchemas")?;
    for (name, schema) in schema_map(map, "dependencies")? {
        if matches!(schema, Schema::Opaque(Value::Array(_))) {
            return None;
        }
        dependent_schemas.insert(name, schema);
    }
    Some(ObjectSchema {
        untyped,
        properties: schema_map(map, "properties")?,
        required,
        additional_properties,
        pattern_properties: schema_map(map, "patternProperties")?,
        dependent_schemas,
        min_properties: optional_u64(map, "minProperties")?,
        max_properties: optional_u64(map, "maxProperties")?,
        nullable,
        definitions: schema_map(map, "definitions")?,
        description: map
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn parse_array(map: &Map<String, Value>, nullable: bool, untyped: bool) -> Option<ArraySchema> {
    if !only_keys(map, ARRAY_KEYWORDS) {
        return None;
    }
    let items = match map.get("items") {
        None => None,
        Some(value @ Value::Object(_)) => Some(Box::new(Schema::from_json(value.clone()))),
        // Tuple validation is not modeled.
        Some(_) => return None,
    };
    Some(ArraySchema {
        untyped,
        items,
        min_items: optional_u64(map, "minItems")?,
        max_items: optional_u64(map, "maxItems")?,
        unique_items: match map.get("uniqueItems") {
            None => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return None,
        },
        nullable,
        description: map
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// `Some(None)` when absent, `None` when present with the wrong shape.
fn optional_str(map: &Map<String, Value>, key: &str) -> Option<Option<String>> {
    match map.get(key) {
        None => Some(None),
        Some(Value::String(value)) => Some(Some(value.clone())),
        Some(_) => None,
    }
}

fn optional_u64(map: &Map<String, Value>, key: &str) -> Option<Option<u64>> {
    match map.get(key) {
        None => Some(None),
        Some(value) => value.as_u64().map(Some),
    }
}

fn optional_number(map: &Map<String, Value>, key: &str) -> Option<Option<Number>> {
    match map.get(key) {
        None => Some(None),
        Some(Value::Number(number)) => Some(Some(number.clone())),
        Some(_) => None,
    }
}

fn schema_map(map: &Map<String, Value>, key: &str) -> Option<BTreeMap<String, Schema>> {
    match map.get(key) {
        None => Some(BTreeMap::new()),
        Some(Value::Object(entries)) => Some(
            entries
                .iter()
                .map(|(name, value)| (name.clone(), Schema::from_json(value.clone())))
                .collect(),
        ),
        Some(_) => None,
    }
}

// ===== Rendering =====

fn type_value(name: &str, nullable: bool) -> Value {
    if nullable {
        Value::Array(vec![Value::String(name.into()), Value::String("null".into())])
    } else {
        Value::String(name.into())
    }
}

fn insert_opt<T: Into<Value>>(map: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value.into());
    }
}

fn schemas_to_json(schemas: &BTreeMap<String, Schema>) -> Value {
    Value::Object(
        schemas
            .iter()
            .map(|(name, schema)| (name.clone(), schema.to_json()))
            .collect(),
    )
}

fn primitive_to_json(schema: &PrimitiveSchema) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), type_value(schema.kind.as_str(), schema.nullable));
    insert_opt(&mut map, "enum", schema.enum_values.clone());
    insert_opt(&mut map, "const", schema.const_value.clone());
    insert_opt(&mut map, "format", schema.format.clone());
    insert_opt(&mut map, "pattern", schema.pattern.clone());
    insert_opt(&mut map, "minLength", schema.min_length);
    insert_opt(&mut map, "maxLength", schema.max_length);
    insert_opt(&mut map, "minimum", schema.minimum.clone());
    insert_opt(&mut map, "maximum", schema.maximum.clone());
    insert_opt(&mut map, "exclusiveMinimum", schema.exclusive_minimum.clone());
    insert_opt(&mut map, "exclusiveMaximum", schema.exclusive_maximum.clone());
    insert_opt(&mut map, "multipleOf", schema.multiple_of.clone());
    insert_opt(&mut map, "description", schema.description.clone());
    Value::Object(map)
}

fn object_to_json(schema: &ObjectSchema) -> Value {
    let mut map = Map::new();
    if !schema.untyped {
        map.insert("type".into(), type_value("object", schema.nullable));
    }
    if !schema.properties.is_empty() {
        map.insert("properties".into(), schemas_to_json(&schema.properties));
    }
    if !schema.required.is_empty() {
        map.insert(
            "required".into(),
            Value::Array(schema.required.iter().cloned().map(Value::String).collect()),
        );
    }
    match &schema.additional_properties {
        Some(AdditionalProperties::Allowed(allowed)) => {
            map.insert("additionalProperties".into(), Value::Bool(*allowed));
        }
        Some(AdditionalProperties::Schema(extra)) => {
            map.insert("additionalProperties".into(), extra.to_json());
        }
        None => {}
    }
    if !schema.pattern_properties.is_empty() {
        map.insert(
            "patternProperties".into(),
            schemas_to_json(&schema.pattern_properties),
        );
    }
    if !schema.dependent_schemas.is_empty() {
        map.insert(
            "dependencies".into(),
            schemas_to_json(&schema.dependent_schemas),
        );
    }
    insert_opt(&mut map, "minProperties", schema.min_properties);
    insert_opt(&mut map, "maxProperties", schema.max_properties);
    if !schema.definitions.is_empty() {
        map.insert("definitions".into(), schemas_to_json(&schema.definitions));
    }
    insert_opt(&mut map, "description", schema.description.clone());
    Value::Object(map)
}

fn array_to_json(schema: &ArraySchema) -> Value {
    let mut map = Map::new();
    if !schema.untyped {
        map.insert("type".into(), type_value("array", schema.nullable));
    }
    if let Some(items) = &schema.items {
        map.insert("items".into(), items.to_json());
    }
    insert_opt(&mut map, "minItems", schema.min_items);
    insert_opt(&mut map, "maxItems", schema.max_items);
    if schema.unique_items {
        map.insert("uniqueItems".into(), Value::Bool(true));
    }
    insert_opt(&mut map, "description", schema.description.clone());
    Value::Object(map)
}
