//! The shape DHIS2 accepts for an event, and validation against it.
use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde_json::{Map, Value};

use crate::{event::Event, Error, Result};

static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date regex is valid"));

/// ASCII `\w` without underscore.
static DHIS2_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("DHIS2 id regex is valid"));

static STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(ACTIVE|COMPLETED|VISITED|SCHEDULE|OVERDUE|SKIPPED)$")
        .expect("status regex is valid")
});

/// A rule a single JSON value must satisfy.
#[derive(Debug, Clone)]
pub enum Rule {
    /// A string matching the pattern.
    Pattern(&'static Regex),
    String,
    Number,
    /// Any value, including `null`.
    Any,
    Object(Schema),
    /// A list whose every item satisfies the rule. Empty lists are valid.
    List(Box<Rule>),
}

#[derive(Debug, Clone)]
pub struct Field {
    pub key: &'static str,
    pub required: bool,
    pub rule: Rule,
}

/// An object schema. Keys that are not listed are rejected.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Schema { fields }
    }

    pub fn validate(&self, value: &Value) -> std::result::Result<(), SchemaError> {
        self.validate_at("", value)
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.validate(value).is_ok()
    }

    pub fn validate_object(&self, object: &Map<String, Value>) -> std::result::Result<(), SchemaError> {
        self.validate_fields("", object)
    }

    fn validate_at(&self, path: &str, value: &Value) -> std::result::Result<(), SchemaError> {
        let Value::Object(object) = value else {
            return Err(SchemaError::new(path, SchemaErrorKind::WrongType("object")));
        };
        self.validate_fields(path, object)
    }

    fn validate_fields(
        &self,
        path: &str,
        object: &Map<String, Value>,
    ) -> std::result::Result<(), SchemaError> {
        for key in object.keys() {
            if !self.fields.iter().any(|field| field.key == key) {
                return Err(SchemaError::new(
                    &join(path, key),
                    SchemaErrorKind::UnexpectedKey,
                ));
            }
        }

        for field in &self.fields {
            let field_path = join(path, field.key);
            match object.get(field.key) {
                Some(value) => field.rule.validate_at(&field_path, value)?,
                None if field.required => {
                    return Err(SchemaError::new(
                        &field_path,
                        SchemaErrorKind::MissingKey,
                    ));
                }
                None => {}
            }
        }

        Ok(())
    }
}

impl Rule {
    fn validate_at(&self, path: &str, value: &Value) -> std::result::Result<(), SchemaError> {
        match self {
            Rule::Pattern(regex) => {
                let s = value
                    .as_str()
                    .ok_or_else(|| SchemaError::new(path, SchemaErrorKind::WrongType("string")))?;
                if regex.is_match(s) {
                    Ok(())
                } else {
                    Err(SchemaError::new(
                        path,
                        SchemaErrorKind::NoMatch {
                            value: s.to_owned(),
                            pattern: regex.as_str().to_owned(),
                        },
                    ))
                }
            }
            Rule::String if value.is_string() => Ok(()),
            Rule::String => Err(SchemaError::new(path, SchemaErrorKind::WrongType("string"))),
            Rule::Number if value.is_number() => Ok(()),
            Rule::Number => Err(SchemaError::new(path, SchemaErrorKind::WrongType("number"))),
            Rule::Any => Ok(()),
            Rule::Object(schema) => schema.validate_at(path, value),
            Rule::List(item) => {
                let Value::Array(items) = value else {
                    return Err(SchemaError::new(path, SchemaErrorKind::WrongType("list")));
                };
                for (i, value) in items.iter().enumerate() {
                    item.validate_at(&format!("{}[{}]", path, i), value)?;
                }
                Ok(())
            }
        }
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_owned()
    } else {
        format!("{}.{}", path, key)
    }
}

fn required(key: &'static str, rule: Rule) -> Field {
    Field {
        key,
        required: true,
        rule,
    }
}

fn optional(key: &'static str, rule: Rule) -> Field {
    Field {
        key,
        required: false,
        rule,
    }
}

/// Returns the schema for a DHIS2 event.
///
/// A valid event looks like:
/// ```json
/// {
///   "program": "eBAyeGv0exc",
///   "orgUnit": "DiszpKrYNg8",
///   "eventDate": "2013-05-17",
///   "status": "COMPLETED",
///   "completedDate": "2013-05-18",
///   "storedBy": "admin",
///   "coordinate": {"latitude": 59.8, "longitude": 10.9},
///   "dataValues": [
///     {"dataElement": "qrur9Dvnyt5", "value": "22"},
///     {"dataElement": "oZg33kd9taw", "value": "Male"}
///   ]
/// }
/// ```
///
/// Coordinates accept any JSON number, integers included.
pub fn get_event_schema() -> Schema {
    let date = || Rule::Pattern(&DATE);
    let dhis2_id = || Rule::Pattern(&DHIS2_ID);

    Schema::new(vec![
        required("program", dhis2_id()),
        optional("programStage", dhis2_id()),
        required("orgUnit", dhis2_id()),
        required("eventDate", date()),
        optional("completedDate", date()),
        optional("status", Rule::Pattern(&STATUS)),
        optional("storedBy", Rule::String),
        optional(
            "coordinate",
            Rule::Object(Schema::new(vec![
                required("latitude", Rule::Number),
                required("longitude", Rule::Number),
            ])),
        ),
        optional(
            "geometry",
            Rule::Object(Schema::new(vec![
                required("type", Rule::String),
                required("coordinates", Rule::List(Box::new(Rule::Number))),
            ])),
        ),
        optional("assignedUser", dhis2_id()),
        required(
            "dataValues",
            Rule::List(Box::new(Rule::Object(Schema::new(vec![
                required("dataElement", dhis2_id()),
                required("value", Rule::Any),
            ])))),
        ),
    ])
}

/// Returns [`Error::Configuration`] if `event` is missing required properties, or value data
/// types are invalid.
pub fn validate_event_schema(event: &Event) -> Result<()> {
    get_event_schema()
        .validate_object(event.as_map())
        .map_err(Error::Configuration)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{path}: {kind}")]
pub struct SchemaError {
    /// Dotted path to the offending value, e.g. `dataValues[2].dataElement`.
    pub path: String,
    pub kind: SchemaErrorKind,
}

impl SchemaError {
    fn new(path: &str, kind: SchemaErrorKind) -> Self {
        SchemaError {
            path: if path.is_empty() {
                "<root>".to_owned()
            } else {
                path.to_owned()
            },
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaErrorKind {
    MissingKey,
    UnexpectedKey,
    WrongType(&'static str),
    NoMatch { value: String, pattern: String },
}

impl fmt::Display for SchemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaErrorKind::MissingKey => write!(f, "missing required key"),
            SchemaErrorKind::UnexpectedKey => write!(f, "unexpected key"),
            SchemaErrorKind::WrongType(expected) => write!(f, "expected {}", expected),
            SchemaErrorKind::NoMatch { value, pattern } => {
                write!(f, "{:?} does not match {:?}", value, pattern)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{get_event_schema, validate_event_schema, SchemaError, SchemaErrorKind};
    use crate::{event::Event, Error};

    fn valid_event() -> Value {
        json!({
            "program": "eBAyeGv0exc",
            "orgUnit": "DiszpKrYNg8",
            "eventDate": "2013-05-17",
            "status": "COMPLETED",
            "completedDate": "2013-05-18",
            "storedBy": "admin",
            "coordinate": {
                "latitude": 59.8,
                "longitude": 10.9
            },
            "dataValues": [
                { "dataElement": "qrur9Dvnyt5", "value": "22" },
                { "dataElement": "oZg33kd9taw", "value": "Male" },
                { "dataElement": "msodh3rEMJa", "value": "2013-05-18" }
            ]
        })
    }

    fn error_for(event: Value) -> SchemaError {
        get_event_schema().validate(&event).unwrap_err()
    }

    #[test]
    fn valid() {
        assert!(get_event_schema().is_valid(&valid_event()));
    }

    #[test]
    fn minimal() {
        assert!(get_event_schema().is_valid(&json!({
            "program": "abc",
            "orgUnit": "def",
            "eventDate": "2020-01-01",
            "dataValues": []
        })));
    }

    #[test]
    fn geometry() {
        let mut event = valid_event();
        event["geometry"] = json!({"type": "Point", "coordinates": [10.9, 59.8]});
        assert!(get_event_schema().is_valid(&event));

        event["geometry"] = json!({"type": "Point", "coordinates": ["10.9"]});
        assert_eq!(error_for(event).path, "geometry.coordinates[0]");
    }

    #[test]
    fn missing_event_date() {
        let mut event = valid_event();
        event.as_object_mut().unwrap().remove("eventDate");
        assert_eq!(
            error_for(event),
            SchemaError {
                path: "eventDate".to_owned(),
                kind: SchemaErrorKind::MissingKey
            }
        );
    }

    #[test]
    fn null_event_date() {
        let mut event = valid_event();
        event["eventDate"] = Value::Null;
        assert_eq!(
            error_for(event).kind,
            SchemaErrorKind::WrongType("string")
        );
    }

    #[test]
    fn bad_date_format() {
        let mut event = valid_event();
        event["completedDate"] = json!("2013-05-18T00:00:00");
        let err = error_for(event);
        assert_eq!(err.path, "completedDate");
        assert!(matches!(err.kind, SchemaErrorKind::NoMatch { .. }));
    }

    #[test]
    fn bad_status() {
        let mut event = valid_event();
        event["status"] = json!("DONE");
        assert_eq!(error_for(event).path, "status");
    }

    #[test]
    fn bad_dhis2_id() {
        let mut event = valid_event();
        event["orgUnit"] = json!("org_unit");
        assert_eq!(error_for(event).path, "orgUnit");

        let mut event = valid_event();
        event["dataValues"][1]["dataElement"] = json!("");
        assert_eq!(error_for(event).path, "dataValues[1].dataElement");
    }

    #[test]
    fn any_value_type() {
        let mut event = valid_event();
        event["dataValues"] = json!([
            { "dataElement": "a1", "value": 22 },
            { "dataElement": "a2", "value": true },
            { "dataElement": "a3", "value": null }
        ]);
        assert!(get_event_schema().is_valid(&event));
    }

    #[test]
    fn unexpected_key() {
        let mut event = valid_event();
        event["notes"] = json!("hello");
        assert_eq!(
            error_for(event).kind,
            SchemaErrorKind::UnexpectedKey
        );
    }

    #[test]
    fn not_an_object() {
        assert_eq!(
            error_for(json!([])),
            SchemaError {
                path: "<root>".to_owned(),
                kind: SchemaErrorKind::WrongType("object")
            }
        );
    }

    #[test]
    fn validate_event_returns_configuration_error() {
        let event: Event = serde_json::from_value(json!({"program": "abc"})).unwrap();
        assert!(matches!(
            validate_event_schema(&event),
            Err(Error::Configuration(_))
        ));
    }
}
