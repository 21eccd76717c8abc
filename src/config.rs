use crate::{request_logger::NoopRequestLogger, Dhis2Client, RequestLogger};

/// Configuration for [`Dhis2Client`].
pub struct ConnectionSettings<'a> {
    pub(crate) server_url: String,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) api_version: String,
    pub(crate) request_logger: Box<dyn RequestLogger + Send + Sync + 'a>,
}

impl<'a> ConnectionSettings<'a> {
    /// Create connection settings for the DHIS2 server at `server_url`, e.g.
    /// `https://play.dhis2.org/2.39.0`.
    ///
    /// ```
    /// # use dhis2_events::ConnectionSettings;
    /// ConnectionSettings::new("https://dhis2.example.com", "admin", "district");
    /// ```
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        ConnectionSettings {
            server_url: server_url.into(),
            username: username.into(),
            password: password.into(),
            api_version: ConnectionSettings::DEFAULT_API_VERSION.to_owned(),
            request_logger: Box::new(NoopRequestLogger),
        }
    }

    /// Set request logger to keep a record of requests sent to DHIS2.
    ///
    /// ```
    /// # use dhis2_events::ConnectionSettings;
    /// let mut settings = ConnectionSettings::new("https://dhis2.example.com", "admin", "district");
    /// settings.request_logger(|entry| {
    ///   println!("{:?}", entry);
    /// });
    /// ```
    pub fn request_logger(
        &mut self,
        request_logger: impl RequestLogger + Send + Sync + 'a,
    ) -> &mut Self {
        self.request_logger = Box::new(request_logger);
        self
    }

    /// Default DHIS2 Web API version.
    pub const DEFAULT_API_VERSION: &'static str = "29";

    /// Override the Web API version used in request paths.
    pub fn api_version(&mut self, api_version: impl Into<String>) -> &mut Self {
        self.api_version = api_version.into();
        self
    }

    /// Create a new [`Dhis2Client`] using the specified settings.
    ///
    /// ```
    /// # use dhis2_events::{ConnectionSettings, Dhis2Client};
    /// let client: Dhis2Client =
    ///     ConnectionSettings::new("https://dhis2.example.com", "admin", "district").to_client();
    /// ```
    pub fn to_client(self) -> Dhis2Client<'a> {
        Dhis2Client::new(self)
    }
}
