use crate::client::standard::StandardTableClient;
use crate::config::TableEndpoint;
use crate::error::{Error, Result};
use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::Client as AwsDynamoDbClient;
use std::time::Duration;

/// Default timeout for a single store call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const STATIC_CREDENTIALS_PROVIDER: &str = "dynamoutil-static";

/// Builder for [`StandardTableClient`]
///
/// Without static credentials the default AWS provider chain (environment, profile,
/// instance metadata) is used.
pub struct TableClientBuilder {
    /// Region for the client
    region: String,

    /// Endpoint override, e.g. a local DynamoDB
    endpoint_url: Option<String>,

    /// Access key id and secret access key
    credentials: Option<(String, String)>,

    /// Per-call timeout
    timeout: Duration,
}

impl TableClientBuilder {
    /// Creates a new builder with the given region
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint_url: None,
            credentials: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Creates a builder carrying the region, endpoint and credentials of `endpoint`
    pub fn from_endpoint(endpoint: &TableEndpoint) -> Self {
        let mut builder = Self::new(endpoint.region.clone());

        if let Some(url) = endpoint.endpoint_url() {
            builder = builder.with_endpoint_url(url);
        }

        if let Some((access_key_id, secret_access_key)) = endpoint.static_credentials() {
            builder = builder.with_static_credentials(access_key_id, secret_access_key);
        }

        builder
    }

    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn with_static_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.credentials = Some((access_key_id.into(), secret_access_key.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the client
    pub async fn build(self) -> Result<StandardTableClient> {
        if self.region.trim().is_empty() {
            return Err(Error::Connectivity("region must not be empty".into()));
        }

        let mut loader = aws_config::from_env().region(Region::new(self.region.clone()));

        if let Some(url) = &self.endpoint_url {
            loader = loader.endpoint_url(url);
        }

        if let Some((access_key_id, secret_access_key)) = self.credentials {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                STATIC_CREDENTIALS_PROVIDER,
            ));
        }

        let config = loader.load().await;

        if config.credentials_provider().is_none() {
            return Err(Error::Connectivity(format!(
                "no AWS credentials available for region {}",
                self.region
            )));
        }

        log::debug!(
            "Opened DynamoDB session region={} endpoint={}",
            self.region,
            self.endpoint_url.as_deref().unwrap_or("<default>")
        );

        let client = AwsDynamoDbClient::new(&config);

        Ok(StandardTableClient::new(client, self.region, self.timeout))
    }
}
