use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flattened form data, keyed by question path (`/data/...`) or metadata path (`/metadata/...`).
pub type FormQuestionValues = HashMap<String, Value>;

/// Everything a value source may read from when an event is being built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseTriggerInfo {
    pub domain: String,
    pub case_id: Option<String>,
    pub form_question_values: FormQuestionValues,
    /// Case properties updated by the form.
    pub updates: HashMap<String, Value>,
    /// Case properties that were not updated, but are needed by the configuration.
    pub extra_fields: HashMap<String, Value>,
}

impl CaseTriggerInfo {
    /// Trigger info for a form submission that is not tied to a case.
    pub fn from_form(domain: impl Into<String>, form_json: &Value) -> Self {
        CaseTriggerInfo {
            domain: domain.into(),
            case_id: None,
            form_question_values: get_form_question_values(form_json),
            ..Default::default()
        }
    }
}

/// Where a configured value comes from, and how to convert it for DHIS2.
///
/// Deserialized from configuration like:
/// ```json
/// {"form_question": "/data/visit_date", "commcare_data_type": "cc_date", "external_data_type": "dhis2_date"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSource {
    #[serde(flatten)]
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commcare_data_type: Option<CommCareDataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_data_type: Option<ExternalDataType>,
    /// Maps a CommCare value (as a string) to the value DHIS2 expects, e.g. an option set code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_map: Option<HashMap<String, Value>>,
}

/// Variants are tried in order; `Constant` must stay last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    CaseProperty { case_property: String },
    FormQuestion { form_question: String },
    Constant { value: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommCareDataType {
    #[serde(rename = "cc_text")]
    Text,
    #[serde(rename = "cc_integer")]
    Integer,
    #[serde(rename = "cc_decimal")]
    Decimal,
    #[serde(rename = "cc_boolean")]
    Boolean,
    #[serde(rename = "cc_date")]
    Date,
    #[serde(rename = "cc_datetime")]
    DateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalDataType {
    #[serde(rename = "dhis2_text")]
    Text,
    #[serde(rename = "dhis2_integer")]
    Integer,
    #[serde(rename = "dhis2_number")]
    Number,
    #[serde(rename = "dhis2_boolean")]
    Boolean,
    #[serde(rename = "dhis2_date")]
    Date,
    #[serde(rename = "dhis2_datetime")]
    DateTime,
}

impl ValueSource {
    pub fn constant(value: impl Into<Value>) -> Self {
        Source::Constant {
            value: value.into(),
        }
        .into()
    }

    pub fn case_property(name: impl Into<String>) -> Self {
        Source::CaseProperty {
            case_property: name.into(),
        }
        .into()
    }

    pub fn form_question(path: impl Into<String>) -> Self {
        Source::FormQuestion {
            form_question: path.into(),
        }
        .into()
    }

    pub fn with_data_types(
        mut self,
        commcare_data_type: CommCareDataType,
        external_data_type: ExternalDataType,
    ) -> Self {
        self.commcare_data_type = Some(commcare_data_type);
        self.external_data_type = Some(external_data_type);
        self
    }

    pub fn with_value_map(mut self, value_map: HashMap<String, Value>) -> Self {
        self.value_map = Some(value_map);
        self
    }

    /// The raw CommCare value, before mapping and conversion. JSON `null` counts as missing.
    fn get_commcare_value(&self, info: &CaseTriggerInfo) -> Option<Value> {
        let value = match &self.source {
            Source::Constant { value } => Some(value),
            Source::CaseProperty { case_property } => info
                .updates
                .get(case_property)
                .or_else(|| info.extra_fields.get(case_property)),
            Source::FormQuestion { form_question } => {
                info.form_question_values.get(form_question)
            }
        };
        value.filter(|v| !v.is_null()).cloned()
    }
}

impl From<Source> for ValueSource {
    fn from(source: Source) -> Self {
        ValueSource {
            source,
            commcare_data_type: None,
            external_data_type: None,
            value_map: None,
        }
    }
}

/// Resolve `source` against `info`, returning the value to send to DHIS2.
///
/// Returns `None` if the value is missing, is not in the source's value map, or cannot be
/// converted to the configured external data type.
pub fn get_value(source: &ValueSource, info: &CaseTriggerInfo) -> Option<Value> {
    let value = source.get_commcare_value(info)?;

    let value = match &source.value_map {
        Some(value_map) => {
            let key = value_as_string(&value);
            let Some(mapped) = value_map.get(&key) else {
                log::debug!(target: "dhis2", domain = info.domain.as_str(), value = key.as_str(); "value not found in value map");
                return None;
            };
            mapped.clone()
        }
        None => value,
    };

    let (Some(commcare_data_type), Some(external_data_type)) =
        (source.commcare_data_type, source.external_data_type)
    else {
        return Some(value);
    };

    match convert(&value, commcare_data_type, external_data_type) {
        Ok(converted) => Some(converted),
        Err(err) => {
            log::warn!(target: "dhis2",
                domain = info.domain.as_str(),
                value:serde = value;
                "unable to convert value: {}", err);
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("{value} is not a valid {expected}")]
    InvalidValue { value: String, expected: &'static str },
    #[error("cannot convert {commcare:?} to {external:?}")]
    Unsupported {
        commcare: CommCareDataType,
        external: ExternalDataType,
    },
}

const DHIS2_DATE_FORMAT: &str = "%Y-%m-%d";
const DHIS2_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Convert a CommCare value to a DHIS2 value.
///
/// Empty strings are passed through unchanged: an unanswered question is not a conversion error.
pub fn convert(
    value: &Value,
    commcare_data_type: CommCareDataType,
    external_data_type: ExternalDataType,
) -> Result<Value, ConversionError> {
    if value.as_str() == Some("") {
        return Ok(value.clone());
    }

    let invalid = |expected: &'static str| ConversionError::InvalidValue {
        value: value_as_string(value),
        expected,
    };

    match external_data_type {
        ExternalDataType::Text => Ok(Value::String(value_as_string(value))),
        ExternalDataType::Integer => as_i64(value)
            .map(Value::from)
            .ok_or_else(|| invalid("integer")),
        ExternalDataType::Number => {
            let n = as_f64(value).ok_or_else(|| invalid("number"))?;
            serde_json::Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| invalid("number"))
        }
        ExternalDataType::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(invalid("boolean")),
            },
            Value::Number(n) => match n.as_i64() {
                Some(1) => Ok(Value::Bool(true)),
                Some(0) => Ok(Value::Bool(false)),
                _ => Err(invalid("boolean")),
            },
            _ => Err(invalid("boolean")),
        },
        ExternalDataType::Date | ExternalDataType::DateTime => {
            let s = value.as_str().ok_or_else(|| invalid("date"))?;
            let datetime = match commcare_data_type {
                CommCareDataType::Date => NaiveDate::parse_from_str(s, DHIS2_DATE_FORMAT)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0)),
                CommCareDataType::DateTime => parse_datetime(s),
                commcare => {
                    return Err(ConversionError::Unsupported {
                        commcare,
                        external: external_data_type,
                    })
                }
            }
            .ok_or_else(|| invalid("date"))?;

            let format = if external_data_type == ExternalDataType::Date {
                DHIS2_DATE_FORMAT
            } else {
                DHIS2_DATETIME_FORMAT
            };
            Ok(Value::String(datetime.format(format).to_string()))
        }
    }
}

/// Parse a CommCare timestamp. Timestamps with an offset keep their local time.
fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(s) {
        return Some(datetime.naive_local());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// Exact integers are taken as they are. Floats such as `34.0` are accepted only if they are whole
/// and within `i64` range.
fn as_i64(value: &Value) -> Option<i64> {
    let exact = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    if exact.is_some() {
        return exact;
    }
    let n = as_f64(value)?;
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    if n.fract() != 0.0 || n < i64::MIN as f64 || n >= i64::MAX as f64 {
        return None;
    }
    Some(n as i64)
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten a form submission into question and metadata values.
///
/// Questions under `form` are keyed by their path, e.g. `/data/household/size`. Entries of
/// `form.meta` and the top-level `received_on` are keyed as `/metadata/<name>`. Repeat groups
/// (arrays) are kept whole at their path. The reserved `case` block is not a question and is
/// skipped.
pub fn get_form_question_values(form_json: &Value) -> FormQuestionValues {
    let mut values = FormQuestionValues::new();

    if let Some(form) = form_json.get("form") {
        let mut stack = vec![("/data".to_owned(), form)];
        while let Some((path, data)) = stack.pop() {
            match data {
                Value::Object(fields) => {
                    for (key, value) in fields {
                        if key.starts_with('@') || key.starts_with('#') {
                            continue;
                        }
                        if path == "/data" && (key == "meta" || key == "case") {
                            continue;
                        }
                        stack.push((format!("{}/{}", path, key), value));
                    }
                }
                leaf => {
                    values.insert(path, leaf.clone());
                }
            }
        }

        if let Some(Value::Object(meta)) = form.get("meta") {
            for (key, value) in meta {
                if key.starts_with('@') {
                    continue;
                }
                values.insert(format!("/metadata/{}", key), value.clone());
            }
        }
    }

    if let Some(received_on) = form_json.get("received_on") {
        values.insert("/metadata/received_on".to_owned(), received_on.clone());
    }

    values
}

/// The XML namespace identifying which form `form_json` is a submission of.
pub fn get_form_xmlns(form_json: &Value) -> Option<&str> {
    form_json
        .get("form")
        .and_then(|form| form.get("@xmlns"))
        .or_else(|| form_json.get("xmlns"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::{json, Value};

    use super::*;

    fn form_json() -> Value {
        json!({
            "domain": "sample-domain",
            "received_on": "2017-05-18T09:14:04.337000Z",
            "form": {
                "@xmlns": "http://openrosa.org/formdesigner/sample",
                "#type": "data",
                "visit_date": "2017-05-17",
                "patient": {
                    "age": "34",
                    "sex": "f"
                },
                "children": [{"name": "a"}, {"name": "b"}],
                "case": {
                    "@case_id": "c0ffee",
                    "update": {"status": "seen"}
                },
                "meta": {
                    "@xmlns": "http://openrosa.org/jr/xforms",
                    "userID": "abc123",
                    "timeEnd": "2017-05-17T15:01:22.000000Z"
                }
            }
        })
    }

    fn info() -> CaseTriggerInfo {
        CaseTriggerInfo::from_form("sample-domain", &form_json())
    }

    #[test]
    fn flattens_form_questions() {
        let values = get_form_question_values(&form_json());
        assert_eq!(values.get("/data/visit_date"), Some(&json!("2017-05-17")));
        assert_eq!(values.get("/data/patient/age"), Some(&json!("34")));
        assert_eq!(
            values.get("/data/children"),
            Some(&json!([{"name": "a"}, {"name": "b"}]))
        );
        assert!(!values.contains_key("/data/@xmlns"));
        assert!(!values.contains_key("/data/#type"));
        assert!(!values.contains_key("/data/meta/userID"));
        assert!(!values.contains_key("/data/case/@case_id"));
        assert!(!values.contains_key("/data/case/update/status"));
    }

    #[test]
    fn flattens_form_metadata() {
        let values = get_form_question_values(&form_json());
        assert_eq!(values.get("/metadata/userID"), Some(&json!("abc123")));
        assert_eq!(
            values.get("/metadata/received_on"),
            Some(&json!("2017-05-18T09:14:04.337000Z"))
        );
        assert!(!values.contains_key("/metadata/@xmlns"));
    }

    #[test]
    fn form_xmlns() {
        assert_eq!(
            get_form_xmlns(&form_json()),
            Some("http://openrosa.org/formdesigner/sample")
        );
        assert_eq!(get_form_xmlns(&json!({"xmlns": "x"})), Some("x"));
        assert_eq!(get_form_xmlns(&json!({})), None);
    }

    #[test]
    fn constant_value() {
        assert_eq!(
            get_value(&ValueSource::constant("abc"), &info()),
            Some(json!("abc"))
        );
        assert_eq!(get_value(&ValueSource::constant(Value::Null), &info()), None);
    }

    #[test]
    fn form_question_value() {
        assert_eq!(
            get_value(&ValueSource::form_question("/data/patient/sex"), &info()),
            Some(json!("f"))
        );
        assert_eq!(
            get_value(&ValueSource::form_question("/data/missing"), &info()),
            None
        );
    }

    #[test]
    fn case_property_prefers_updates() {
        let info = CaseTriggerInfo {
            updates: HashMap::from([("status".to_owned(), json!("open"))]),
            extra_fields: HashMap::from([
                ("status".to_owned(), json!("stale")),
                ("district".to_owned(), json!("north")),
            ]),
            ..Default::default()
        };
        assert_eq!(
            get_value(&ValueSource::case_property("status"), &info),
            Some(json!("open"))
        );
        assert_eq!(
            get_value(&ValueSource::case_property("district"), &info),
            Some(json!("north"))
        );
        assert_eq!(get_value(&ValueSource::case_property("nope"), &info), None);
    }

    #[test]
    fn value_map() {
        let source = ValueSource::form_question("/data/patient/sex").with_value_map(HashMap::from(
            [
                ("f".to_owned(), json!("Female")),
                ("m".to_owned(), json!("Male")),
            ],
        ));
        assert_eq!(get_value(&source, &info()), Some(json!("Female")));

        let unmapped = ValueSource::constant("x").with_value_map(HashMap::new());
        assert_eq!(get_value(&unmapped, &info()), None);
    }

    #[test]
    fn datetime_to_date() {
        let source = ValueSource::form_question("/metadata/received_on")
            .with_data_types(CommCareDataType::DateTime, ExternalDataType::Date);
        assert_eq!(get_value(&source, &info()), Some(json!("2017-05-18")));
    }

    #[test]
    fn date_to_date() {
        assert_eq!(
            convert(
                &json!("2017-05-17"),
                CommCareDataType::Date,
                ExternalDataType::Date
            ),
            Ok(json!("2017-05-17"))
        );
        assert!(convert(
            &json!("17/05/2017"),
            CommCareDataType::Date,
            ExternalDataType::Date
        )
        .is_err());
    }

    #[test]
    fn date_to_datetime() {
        assert_eq!(
            convert(
                &json!("2017-05-17"),
                CommCareDataType::Date,
                ExternalDataType::DateTime
            ),
            Ok(json!("2017-05-17T00:00:00.000"))
        );
    }

    #[test]
    fn text_to_date_is_unsupported() {
        assert!(matches!(
            convert(
                &json!("2017-05-17"),
                CommCareDataType::Text,
                ExternalDataType::Date
            ),
            Err(ConversionError::Unsupported { .. })
        ));
    }

    #[test]
    fn numbers() {
        assert_eq!(
            convert(
                &json!("34"),
                CommCareDataType::Text,
                ExternalDataType::Integer
            ),
            Ok(json!(34))
        );
        assert!(convert(
            &json!("34.5"),
            CommCareDataType::Decimal,
            ExternalDataType::Integer
        )
        .is_err());
        assert_eq!(
            convert(
                &json!("34.5"),
                CommCareDataType::Decimal,
                ExternalDataType::Number
            ),
            Ok(json!(34.5))
        );
        assert_eq!(
            convert(&json!(7), CommCareDataType::Integer, ExternalDataType::Text),
            Ok(json!("7"))
        );
    }

    #[test]
    fn integers_keep_precision() {
        assert_eq!(
            convert(
                &json!("9007199254740993"),
                CommCareDataType::Text,
                ExternalDataType::Integer
            ),
            Ok(json!(9007199254740993_i64))
        );
        assert_eq!(
            convert(
                &json!(9007199254740993_i64),
                CommCareDataType::Integer,
                ExternalDataType::Integer
            ),
            Ok(json!(9007199254740993_i64))
        );
        assert_eq!(
            convert(
                &json!("34.0"),
                CommCareDataType::Decimal,
                ExternalDataType::Integer
            ),
            Ok(json!(34))
        );
    }

    #[test]
    fn integers_out_of_range() {
        for value in [json!("1e30"), json!("-1e19"), json!(1e30), json!(u64::MAX)] {
            assert!(
                convert(&value, CommCareDataType::Decimal, ExternalDataType::Integer).is_err(),
                "{} should not convert to an integer",
                value
            );
        }
    }

    #[test]
    fn booleans() {
        assert_eq!(
            convert(
                &json!("yes"),
                CommCareDataType::Text,
                ExternalDataType::Boolean
            ),
            Ok(json!(true))
        );
        assert_eq!(
            convert(
                &json!(0),
                CommCareDataType::Integer,
                ExternalDataType::Boolean
            ),
            Ok(json!(false))
        );
        assert!(convert(
            &json!("maybe"),
            CommCareDataType::Text,
            ExternalDataType::Boolean
        )
        .is_err());
    }

    #[test]
    fn empty_string_is_not_converted() {
        assert_eq!(
            convert(&json!(""), CommCareDataType::Date, ExternalDataType::Date),
            Ok(json!(""))
        );
    }

    #[test]
    fn unconvertible_value_is_none() {
        let source = ValueSource::constant("not a number")
            .with_data_types(CommCareDataType::Text, ExternalDataType::Number);
        assert_eq!(get_value(&source, &info()), None);
    }

    #[test]
    fn deserialize_value_sources() {
        let source: ValueSource = serde_json::from_str(
            r#"{"form_question": "/data/visit_date", "commcare_data_type": "cc_date", "external_data_type": "dhis2_date"}"#,
        )
        .unwrap();
        assert_eq!(
            source,
            ValueSource::form_question("/data/visit_date")
                .with_data_types(CommCareDataType::Date, ExternalDataType::Date)
        );

        let source: ValueSource = serde_json::from_str(r#"{"case_property": "name"}"#).unwrap();
        assert_eq!(source, ValueSource::case_property("name"));

        let source: ValueSource = serde_json::from_str(r#"{"value": 5}"#).unwrap();
        assert_eq!(source, ValueSource::constant(5));
    }
}
