use reqwest::{StatusCode, Url};
use serde_json::Value;

use crate::{
    event::{get_event, Event},
    form_config::Dhis2FormConfig,
    request_logger::RequestLogEntry,
    schema::validate_event_schema,
    value_source::get_form_xmlns,
    ConnectionSettings, Error, Result,
};

/// A client for the DHIS2 Web API.
///
/// In order to create a client instance, first create [`ConnectionSettings`].
///
/// # Examples
/// ```
/// # use dhis2_events::{ConnectionSettings, Dhis2Client};
/// Dhis2Client::new(ConnectionSettings::new("https://dhis2.example.com", "admin", "district"));
/// ```
pub struct Dhis2Client<'a> {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    http: reqwest::blocking::Client,
    settings: ConnectionSettings<'a>,
}

/// What DHIS2 replied to a successfully sent event.
#[derive(Debug, Clone, PartialEq)]
pub struct SendResponse {
    pub status: u16,
    /// Usually an import summary. Falls back to a JSON string if the body is not JSON.
    pub body: Value,
}

impl<'a> Dhis2Client<'a> {
    /// Create a new `Dhis2Client` using the specified settings.
    pub fn new(settings: ConnectionSettings<'a>) -> Self {
        Dhis2Client {
            http: reqwest::blocking::Client::new(),
            settings,
        }
    }

    #[cfg(test)]
    fn new_with_http_client(
        settings: ConnectionSettings<'a>,
        http: reqwest::blocking::Client,
    ) -> Self {
        Self { http, settings }
    }

    /// URL of the events endpoint, e.g. `https://dhis2.example.com/api/29/events`.
    pub fn events_url(&self) -> Result<Url> {
        Url::parse(&format!(
            "{}/api/{}/events",
            self.settings.server_url.trim_end_matches('/'),
            self.settings.api_version
        ))
        .map_err(Error::InvalidBaseUrl)
    }

    /// Build an event from `form_json` as configured by `form_config`, validate it and send it.
    ///
    /// Returns `Ok(None)` if the form yields no event (no date and no values), in which case
    /// nothing is sent.
    pub fn send_dhis2_event(
        &self,
        domain: &str,
        form_config: &Dhis2FormConfig,
        form_json: &Value,
    ) -> Result<Option<SendResponse>> {
        let Some(event) = get_event(domain, form_config, form_json) else {
            return Ok(None);
        };
        self.send_event(domain, &event).map(Some)
    }

    /// Send an event for every configuration that applies to the submitted form.
    ///
    /// A failure for one configuration does not stop events being sent for the others.
    pub fn send_form<'c>(
        &self,
        domain: &str,
        form_configs: &'c [Dhis2FormConfig],
        form_json: &Value,
    ) -> Vec<(&'c Dhis2FormConfig, Result<Option<SendResponse>>)> {
        let Some(xmlns) = get_form_xmlns(form_json) else {
            log::warn!(target: "dhis2", domain; "form has no xmlns, not sending events");
            return Vec::new();
        };

        form_configs
            .iter()
            .filter(|config| config.xmlns == xmlns)
            .map(|config| (config, self.send_dhis2_event(domain, config, form_json)))
            .collect()
    }

    /// Validate `event` and POST it to the events endpoint.
    pub fn send_event(&self, domain: &str, event: &Event) -> Result<SendResponse> {
        validate_event_schema(event).inspect_err(|err| {
            log::warn!(target: "dhis2",
                domain,
                event:serde;
                "event failed validation: {:?}", err);
        })?;

        let url = self.events_url()?;
        let mut entry = RequestLogEntry {
            domain: domain.to_owned(),
            method: "POST".to_owned(),
            url: url.to_string(),
            payload: Value::Object(event.as_map().clone()),
            response_status: None,
            response_body: None,
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        log::debug!(target: "dhis2", domain, url = entry.url.as_str(); "sending event");
        let response = self
            .http
            .post(url)
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .json(event)
            .send();

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                log::warn!(target: "dhis2", domain; "error while sending event: {:?}", err);
                entry.error = Some(err.to_string());
                self.settings.request_logger.log_request(entry);
                return Err(err.into());
            }
        };

        let status = response.status();
        let body = match response.text() {
            Ok(body) => body,
            Err(err) => {
                entry.response_status = Some(status.as_u16());
                entry.error = Some(err.to_string());
                self.settings.request_logger.log_request(entry);
                return Err(err.into());
            }
        };

        entry.response_status = Some(status.as_u16());
        entry.response_body = Some(body.clone());

        let result = if status == StatusCode::UNAUTHORIZED {
            log::warn!(target: "dhis2", domain; "client is not authorized. Check username and password");
            Err(Error::Unauthorized)
        } else if !status.is_success() {
            log::warn!(target: "dhis2", domain; "received non-2xx response while sending event: {:?}", status);
            Err(Error::Http {
                status: status.as_u16(),
                body,
            })
        } else {
            log::debug!(target: "dhis2", domain; "successfully sent event");
            let body = serde_json::from_str(&body).unwrap_or(Value::String(body));
            Ok(SendResponse {
                status: status.as_u16(),
                body,
            })
        };

        if let Err(err) = &result {
            entry.error = Some(err.to_string());
        }
        self.settings.request_logger.log_request(entry);

        result
    }
}
