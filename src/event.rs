use derive_more::From;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    form_config::Dhis2FormConfig,
    value_source::{get_value, CaseTriggerInfo},
};

/// A DHIS2 event payload, as sent to `/api/<version>/events`.
///
/// Events are kept as plain JSON objects so that broken configuration still yields a payload that
/// [`validate_event_schema`](crate::validate_event_schema) can report on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, From)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn event_date(&self) -> Option<&Value> {
        self.get("eventDate").filter(|v| !is_empty(Some(*v)))
    }

    pub fn data_values(&self) -> &[Value] {
        self.get("dataValues")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_owned(), value);
    }

    fn insert_non_empty(&mut self, key: &str, value: Option<Value>) {
        if let Some(value) = value.filter(|v| !is_empty(Some(v))) {
            self.insert(key, value);
        }
    }
}

/// Missing, `null` and `""` are all treated as "no value" for optional event properties.
fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Build an event from a form submission.
pub fn get_event(domain: &str, config: &Dhis2FormConfig, form_json: &Value) -> Option<Event> {
    let info = CaseTriggerInfo::from_form(domain, form_json);
    get_event_with_info(config, &info)
}

/// Build an event from the values available in `info`.
///
/// Returns `None` if the event would have neither a date nor any data values. An event that has
/// data values but no date is still returned: `eventDate` is required, so it will fail validation
/// and the administrator will learn that the value source for the date is broken.
pub fn get_event_with_info(config: &Dhis2FormConfig, info: &CaseTriggerInfo) -> Option<Event> {
    let mut event = Event::default();

    event.insert("program", Value::String(config.program_id.clone()));

    if let Some(source) = &config.program_stage_id {
        event.insert_non_empty("programStage", get_value(source, info));
    }

    if let Some(source) = &config.org_unit_id {
        event.insert_non_empty("orgUnit", get_value(source, info));
    }

    event.insert(
        "eventDate",
        get_value(&config.event_date, info).unwrap_or(Value::Null),
    );

    event.insert("status", Value::String(config.event_status.as_str().to_owned()));

    if let Some(source) = &config.completed_date {
        event.insert_non_empty("completedDate", get_value(source, info));
    }

    if let Some(source) = &config.event_location {
        let geometry = get_value(source, info).and_then(|value| {
            let geometry = value.as_str().and_then(parse_geo_point);
            if geometry.is_none() {
                log::warn!(target: "dhis2",
                    domain = info.domain.as_str(),
                    value:serde = value;
                    "event location is not a valid GPS point");
            }
            geometry
        });
        event.insert_non_empty("geometry", geometry);
    }

    let data_values = config
        .datavalue_maps
        .iter()
        .filter_map(|data_value| {
            get_value(&data_value.value, info).map(|value| {
                json!({
                    "dataElement": data_value.data_element_id,
                    "value": value,
                })
            })
        })
        .collect::<Vec<_>>();
    event.insert("dataValues", Value::Array(data_values));

    if event.event_date().is_none() && event.data_values().is_empty() {
        log::debug!(target: "dhis2",
            domain = info.domain.as_str(),
            program = config.program_id.as_str();
            "event has no date and no values, skipping");
        return None;
    }

    Some(event)
}

/// Parse a CommCare GPS value, "lat lon [alt acc]", as a GeoJSON point.
///
/// GeoJSON orders coordinates longitude first.
fn parse_geo_point(s: &str) -> Option<Value> {
    let mut parts = s.split_whitespace().map(str::parse::<f64>);
    let latitude = parts.next()?.ok()?;
    let longitude = parts.next()?.ok()?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }
    Some(json!({
        "type": "Point",
        "coordinates": [longitude, latitude],
    }))
}
