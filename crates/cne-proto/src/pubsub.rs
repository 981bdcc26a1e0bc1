//! Publisher and subscription resource records.

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::Error;

/// A registered publisher or subscription.
///
/// The same shape is used for both kinds; the registry keeps them apart.
/// `id` and `uri_location` are assigned by the gateway at creation and never
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PubSub {
    /// Server-assigned unique identifier.
    #[serde(rename = "Id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Callback URL of the publisher/subscriber.
    #[serde(rename = "EndpointUri", default, skip_serializing_if = "Option::is_none")]
    pub endpoint_uri: Option<String>,
    /// Server-assigned self reference.
    #[serde(rename = "UriLocation", default, skip_serializing_if = "Option::is_none")]
    pub uri_location: Option<String>,
    /// Hierarchical resource address, e.g. `/cluster/node/sync/sync-state`.
    #[serde(rename = "Resource", alias = "ResourceAddress", default)]
    pub resource: String,
}

impl PubSub {
    /// Create an unregistered record for a resource.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Self::default()
        }
    }

    /// Set the endpoint URI.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_uri = Some(endpoint.into());
        self
    }

    /// The endpoint URI, treating an empty string as absent.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint_uri.as_deref().filter(|uri| !uri.trim().is_empty())
    }

    /// Parse the endpoint URI, if one is set.
    ///
    /// Only absolute `http`/`https` URLs are accepted.
    pub fn endpoint_url(&self) -> Result<Option<Url>, Error> {
        let Some(raw) = self.endpoint() else {
            return Ok(None);
        };

        let url = Url::parse(raw).map_err(|e| Error::InvalidEndpoint {
            uri: raw.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(Some(url)),
            scheme => Err(Error::InvalidEndpoint {
                uri: raw.to_string(),
                reason: format!("unsupported scheme {scheme}"),
            }),
        }
    }

    /// Check the fields a caller must supply.
    pub fn validate(&self) -> Result<(), Error> {
        if self.resource.trim().is_empty() {
            return Err(Error::MissingField("Resource"));
        }
        self.endpoint_url()?;
        Ok(())
    }

    /// Whether this record registers the same `(resource, endpoint)` pair.
    pub fn same_registration(&self, other: &PubSub) -> bool {
        self.resource == other.resource && self.endpoint() == other.endpoint()
    }

    /// Deterministic client identifier derived from the endpoint URI.
    pub fn client_id(&self) -> Option<Uuid> {
        self.endpoint()
            .map(|uri| Uuid::new_v5(&Uuid::NAMESPACE_URL, uri.as_bytes()))
    }
}

impl std::fmt::Display for PubSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "id={} resource={} endpoint={}",
            self.id,
            self.resource,
            self.endpoint().unwrap_or("-")
        )
    }
}
