//! Build, validate and send DHIS2 events from submitted forms.
//!
//! # Overview
//!
//! A [`Dhis2FormConfig`] describes how submissions of one form map to a DHIS2 event: which
//! program it belongs to, and where the organisation unit, dates and data values come from. Each
//! of those is a [`ValueSource`]: a constant, a form question, or a case property, optionally
//! converted to the data type DHIS2 expects.
//!
//! [`get_event`] builds an [`Event`] from a form submission, [`validate_event_schema`] checks it
//! against the shape DHIS2 accepts, and [`Dhis2Client`] sends it to the server's events endpoint.
//!
//! An optional [`RequestLogger`] receives a record of every request sent, so that failures can be
//! reviewed by an administrator.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. [`Error::Configuration`] means the event did not
//! validate, which almost always points at a broken value source in the form configuration.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages, with
//! the `dhis2` target. Consider integrating a `log`-compatible logger implementation for better
//! visibility into which values could not be resolved.

#![warn(rustdoc::missing_crate_level_docs)]

mod client;
mod config;
mod error;
mod event;
mod form_config;
mod request_logger;
mod schema;
mod value_source;

pub use client::{Dhis2Client, SendResponse};
pub use config::ConnectionSettings;
pub use error::{Error, Result};
pub use event::{get_event, get_event_with_info, Event};
pub use form_config::{read_form_configs, DataValueMap, Dhis2FormConfig, EventStatus};
pub use request_logger::{RequestLogEntry, RequestLogger};
pub use schema::{
    get_event_schema, validate_event_schema, Field, Rule, Schema, SchemaError, SchemaErrorKind,
};
pub use value_source::{
    convert, get_form_question_values, get_form_xmlns, get_value, CaseTriggerInfo,
    CommCareDataType, ConversionError, ExternalDataType, FormQuestionValues, Source, ValueSource,
};
