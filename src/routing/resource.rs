//! Allow-listed API resources and path matching.
//!
//! Each [`Resource`] is one path shape of the Classic API that addresses a
//! single computer record. Paths are matched against an ordered pattern list;
//! the first match wins and yields the lookup type and raw lookup value used
//! to fetch the record for the binding check.
//!
//! Character classes are ASCII-only and no percent-decoding or case folding
//! is applied: `/JSSResource/computers/name/My%20Mac` does not match.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

// ─────────────────────────────────────────────────────────────────────────────
// Resource and lookup type
// ─────────────────────────────────────────────────────────────────────────────

/// Allow-listed resource shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// `/JSSResource/computers/id/{id}`
    ComputerById,
    /// `/JSSResource/computers/name/{name}`
    ComputerByName,
    /// `/JSSResource/computers/serialnumber/{serial}`
    ComputerBySerialNumber,
    /// `/JSSResource/computers/udid/{udid}`
    ComputerByUdid,
    /// `/JSSResource/computers/macaddress/{mac}`
    ComputerByMacAddress,
    /// `/JSSResource/fileuploads/computer/id/{id}`
    FileUploadById,
    /// `/JSSResource/fileuploads/computer/name/{name}`
    FileUploadByName,
}

impl Resource {
    /// Every resource, in match order.
    pub const ALL: [Self; 7] = [
        Self::ComputerById,
        Self::ComputerByName,
        Self::ComputerBySerialNumber,
        Self::ComputerByUdid,
        Self::ComputerByMacAddress,
        Self::FileUploadById,
        Self::FileUploadByName,
    ];

    /// Stable identifier: the fixed path prefix before the lookup value.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::ComputerById => "/JSSResource/computers/id/",
            Self::ComputerByName => "/JSSResource/computers/name/",
            Self::ComputerBySerialNumber => "/JSSResource/computers/serialnumber/",
            Self::ComputerByUdid => "/JSSResource/computers/udid/",
            Self::ComputerByMacAddress => "/JSSResource/computers/macaddress/",
            Self::FileUploadById => "/JSSResource/fileuploads/computer/id/",
            Self::FileUploadByName => "/JSSResource/fileuploads/computer/name/",
        }
    }

    /// How the addressed computer record is looked up.
    #[must_use]
    pub fn lookup_type(self) -> LookupType {
        match self {
            Self::ComputerById | Self::FileUploadById => LookupType::Id,
            Self::ComputerByName | Self::FileUploadByName => LookupType::Name,
            Self::ComputerBySerialNumber => LookupType::SerialNumber,
            Self::ComputerByUdid => LookupType::Udid,
            Self::ComputerByMacAddress => LookupType::MacAddress,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.id() == s)
            .ok_or_else(|| format!("Unknown resource '{s}'"))
    }
}

/// Lookup key kind for a computer record, as spelled in the API path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupType {
    /// Numeric record id
    Id,
    /// Computer name
    Name,
    /// Hardware serial number
    SerialNumber,
    /// Unique device identifier
    Udid,
    /// Primary MAC address
    MacAddress,
}

impl LookupType {
    /// Path segment used by the Classic API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::SerialNumber => "serialnumber",
            Self::Udid => "udid",
            Self::MacAddress => "macaddress",
        }
    }
}

impl fmt::Display for LookupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Matching
// ─────────────────────────────────────────────────────────────────────────────

/// Decomposition of a matched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMatch {
    /// Matched resource.
    pub resource: Resource,
    /// Lookup type of the resource.
    pub lookup_type: LookupType,
    /// Raw lookup value taken from the path.
    pub lookup_value: String,
}

static PATTERNS: LazyLock<Vec<(Regex, Resource)>> = LazyLock::new(|| {
    [
        (r"^/JSSResource/computers/id/([0-9]+)$", Resource::ComputerById),
        (r"^/JSSResource/computers/name/([A-Za-z0-9_-]+)$", Resource::ComputerByName),
        (
            r"^/JSSResource/computers/serialnumber/([A-Za-z0-9_]+)$",
            Resource::ComputerBySerialNumber,
        ),
        (r"^/JSSResource/computers/udid/([A-Za-z0-9_-]+)$", Resource::ComputerByUdid),
        (
            r"^/JSSResource/computers/macaddress/([A-Za-z0-9_:]+)$",
            Resource::ComputerByMacAddress,
        ),
        (r"^/JSSResource/fileuploads/computer/id/([0-9]+)$", Resource::FileUploadById),
        (
            r"^/JSSResource/fileuploads/computer/name/([A-Za-z0-9_-]+)$",
            Resource::FileUploadByName,
        ),
    ]
    .into_iter()
    .map(|(pattern, resource)| {
        (
            Regex::new(pattern).expect("resource patterns are valid"),
            resource,
        )
    })
    .collect()
});

/// Ordered, first-match-wins matcher over the allow-listed path shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceMatcher;

impl ResourceMatcher {
    /// Create a matcher over the built-in pattern list.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Match a request path (without query string).
    ///
    /// Returns `None` when no pattern matches; callers answer that with 404.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<ResourceMatch> {
        PATTERNS.iter().find_map(|(regex, resource)| {
            regex.captures(path).map(|caps| ResourceMatch {
                resource: *resource,
                lookup_type: resource.lookup_type(),
                lookup_value: caps[1].to_string(),
            })
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
