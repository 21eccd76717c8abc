use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    value_source::{CommCareDataType, ExternalDataType, ValueSource},
    Error, Result,
};

/// Describes how to build a DHIS2 event from submissions of one form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dhis2FormConfig {
    /// XML namespace of the form this configuration applies to.
    pub xmlns: String,
    pub program_id: String,
    #[serde(default)]
    pub program_stage_id: Option<ValueSource>,
    #[serde(default)]
    pub org_unit_id: Option<ValueSource>,
    #[serde(default = "default_event_date")]
    pub event_date: ValueSource,
    #[serde(default)]
    pub event_status: EventStatus,
    #[serde(default)]
    pub completed_date: Option<ValueSource>,
    /// A CommCare GPS value ("lat lon [alt acc]") sent as the event geometry.
    #[serde(default)]
    pub event_location: Option<ValueSource>,
    #[serde(default)]
    pub datavalue_maps: Vec<DataValueMap>,
}

/// Events are dated by when the form was received, unless configured otherwise.
fn default_event_date() -> ValueSource {
    ValueSource::form_question("/metadata/received_on")
        .with_data_types(CommCareDataType::DateTime, ExternalDataType::Date)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValueMap {
    pub data_element_id: String,
    pub value: ValueSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Active,
    #[default]
    Completed,
    Visited,
    Schedule,
    Overdue,
    Skipped,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "ACTIVE",
            EventStatus::Completed => "COMPLETED",
            EventStatus::Visited => "VISITED",
            EventStatus::Schedule => "SCHEDULE",
            EventStatus::Overdue => "OVERDUE",
            EventStatus::Skipped => "SKIPPED",
        }
    }
}

impl Dhis2FormConfig {
    /// A configuration with only the required fields set.
    pub fn new(xmlns: impl Into<String>, program_id: impl Into<String>) -> Self {
        Dhis2FormConfig {
            xmlns: xmlns.into(),
            program_id: program_id.into(),
            program_stage_id: None,
            org_unit_id: None,
            event_date: default_event_date(),
            event_status: EventStatus::default(),
            completed_date: None,
            event_location: None,
            datavalue_maps: Vec::new(),
        }
    }
}

/// Read a JSON list of form configurations.
pub fn read_form_configs(path: impl AsRef<Path>) -> Result<Vec<Dhis2FormConfig>> {
    let f = File::open(path)?;
    serde_json::from_reader(BufReader::new(f)).map_err(|err| Error::ConfigParse(Arc::new(err)))
}
