//! Device category descriptors
//!
//! A category is a class of controllable device (bedroom, kitchen, ...) that is
//! advertised on the local segment under a single DNS-SD service type.

use serde::{Deserialize, Serialize};

/// Domain appended to bare service types
const LOCAL_DOMAIN: &str = "local.";

/// Static metadata identifying one device category
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawCategoryDescriptor")]
pub struct CategoryDescriptor {
    /// DNS-SD service type (e.g. `_bedroom._tcp.local.`)
    service_type: String,

    /// Human-readable label shown on the category panel
    display_name: String,
}

impl CategoryDescriptor {
    /// Creates a descriptor, normalising the service type
    pub fn new(service_type: impl AsRef<str>, display_name: impl Into<String>) -> Self {
        Self {
            service_type: normalize_service_type(service_type.as_ref()),
            display_name: display_name.into(),
        }
    }

    /// Returns the normalised service type string
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Returns the display name
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Checks whether an event's service type belongs to this category
    pub fn matches(&self, service_type: &str) -> bool {
        self.service_type == normalize_service_type(service_type)
    }

    /// The four rooms served by a stock installation
    pub fn defaults() -> Vec<CategoryDescriptor> {
        vec![
            CategoryDescriptor::new("_bedroom._tcp.local.", "Bedroom"),
            CategoryDescriptor::new("_livingroom._tcp.local.", "Living Room"),
            CategoryDescriptor::new("_kitchen._tcp.local.", "Kitchen"),
            CategoryDescriptor::new("_bathroom._tcp.local.", "Bathroom"),
        ]
    }
}

// Descriptors arrive from YAML with raw service types
#[derive(Deserialize)]
struct RawCategoryDescriptor {
    service_type: String,
    display_name: String,
}

impl From<RawCategoryDescriptor> for CategoryDescriptor {
    fn from(raw: RawCategoryDescriptor) -> Self {
        CategoryDescriptor::new(raw.service_type, raw.display_name)
    }
}

/// Normalises a DNS-SD service type to its fully-qualified form
///
/// Types already ending in a dot are taken as fully qualified. Anything else
/// is assumed to live in the `.local` domain.
pub fn normalize_service_type(service_type: &str) -> String {
    let trimmed = service_type.trim();
    if trimmed.ends_with('.') {
        trimmed.to_string()
    } else if trimmed.ends_with(".local") {
        format!("{}.", trimmed)
    } else {
        format!("{}.{}", trimmed, LOCAL_DOMAIN)
    }
}
