//! Service endpoint registry.
//!
//! The registry is the process-wide map of service name → base URL. It is
//! built once at startup (by the config loader, or directly in tests) and only
//! read afterwards, so it needs no interior mutability or locking.

use crate::{ServiceName, ServiceNameError};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid service name: {0}")]
    Name(#[from] ServiceNameError),
    #[error("invalid base URL for service {name}: {source}")]
    InvalidUrl {
        name: ServiceName,
        source: url::ParseError,
    },
    #[error("base URL for service {name} must be http or https (got {scheme})")]
    UnsupportedScheme { name: ServiceName, scheme: String },
}

/// A named backend service and the base URL its requests are issued against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    name: ServiceName,
    base_url: Url,
}

impl ServiceEndpoint {
    /// Parse and validate a base URL for the given service.
    ///
    /// Only `http` and `https` schemes are accepted.
    pub fn new(name: ServiceName, base_url: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(base_url).map_err(|source| EndpointError::InvalidUrl {
            name: name.clone(),
            source,
        })?;
        match url.scheme() {
            "http" | "https" => Ok(Self {
                name,
                base_url: url,
            }),
            scheme => Err(EndpointError::UnsupportedScheme {
                name,
                scheme: scheme.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Full request URL for a relative path: exactly one `/` at the seam,
    /// regardless of how the base URL or the path spell their edges.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }
}

/// Map of service name → endpoint. Write-once at startup, read-only after.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    services: HashMap<ServiceName, ServiceEndpoint>,
}

impl EndpointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `(name, base_url)` pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, EndpointError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut registry = Self::new();
        for (name, base_url) in pairs {
            let name = ServiceName::new(name)?;
            registry.insert(ServiceEndpoint::new(name, base_url)?);
        }
        Ok(registry)
    }

    /// Register an endpoint, replacing any previous entry under the same name.
    ///
    /// Only the startup path (config loading) should call this; the registry
    /// is read-only once requests start flowing.
    pub fn insert(&mut self, endpoint: ServiceEndpoint) -> Option<ServiceEndpoint> {
        self.services.insert(endpoint.name.clone(), endpoint)
    }

    /// Look up an endpoint by name. Lookup applies the same normalization as
    /// registration, so `"orders"` finds a service registered as `"ORDERS"`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServiceEndpoint> {
        let name = ServiceName::new(name).ok()?;
        self.services.get(&name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceEndpoint> {
        self.services.values()
    }
}
