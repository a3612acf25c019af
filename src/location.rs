//! Location codes and the catalog of locations that are synced.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Location used when nothing else is configured.
pub const DEFAULT_LOCATION: &str = "EUR";

/// Opaque geographic identifier of a key package source, e.g. `EUR` or `DE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationCode(String);

impl LocationCode {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into().trim().to_uppercase())
    }

    pub fn identifier(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocationCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Ordered set of locations the agent keeps key packages for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationCatalog {
    locations: Vec<LocationCode>,
}

impl LocationCatalog {
    /// Build a catalog, dropping duplicates and keeping first occurrence order.
    pub fn new<I, L>(locations: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<LocationCode>,
    {
        let mut unique: Vec<LocationCode> = Vec::new();
        for location in locations.into_iter().map(Into::into) {
            if !location.identifier().is_empty() && !unique.contains(&location) {
                unique.push(location);
            }
        }
        Self { locations: unique }
    }

    /// Build a catalog from configured identifiers, falling back to the default location.
    pub fn from_config(identifiers: &[String]) -> Self {
        let catalog = Self::new(identifiers.iter().map(|s| LocationCode::new(s.as_str())));
        if catalog.locations.is_empty() {
            Self::default()
        } else {
            catalog
        }
    }

    pub fn locations(&self) -> &[LocationCode] {
        &self.locations
    }

    pub fn contains(&self, location: &LocationCode) -> bool {
        self.locations.contains(location)
    }
}

impl Default for LocationCatalog {
    fn default() -> Self {
        Self::new([DEFAULT_LOCATION])
    }
}
