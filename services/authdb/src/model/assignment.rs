//! Domain-scoped role grants.
use super::codec::{CodecError, CodecResult, Record, get_str, get_u8, get_uuid, put_str, put_uuid};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Domain ID meaning "the whole domain type".
pub const WILDCARD_DOMAIN_ID: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainType {
    Global,
    Cloud,
    Organization,
    Location,
    Clinic,
    User,
}

impl DomainType {
    pub const ALL: [DomainType; 6] = [
        DomainType::Global,
        DomainType::Cloud,
        DomainType::Organization,
        DomainType::Location,
        DomainType::Clinic,
        DomainType::User,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DomainType::Global => "global",
            DomainType::Cloud => "cloud",
            DomainType::Organization => "organization",
            DomainType::Location => "location",
            DomainType::Clinic => "clinic",
            DomainType::User => "user",
        }
    }

    /// Global and cloud grants do not point at a stored entity.
    pub fn references_entity(self) -> bool {
        !matches!(self, DomainType::Global | DomainType::Cloud)
    }

    fn tag(self) -> u8 {
        match self {
            DomainType::Global => 0,
            DomainType::Cloud => 1,
            DomainType::Organization => 2,
            DomainType::Location => 3,
            DomainType::Clinic => 4,
            DomainType::User => 5,
        }
    }

    fn from_tag(tag: u8) -> CodecResult<Self> {
        Self::ALL
            .into_iter()
            .find(|domain| domain.tag() == tag)
            .ok_or_else(|| CodecError::InvalidValue {
                field: "assignment.domain_type",
                value: tag.to_string(),
            })
    }

    /// Canonical stored form of a domain ID for this type: global is always
    /// the wildcard, cloud maps an empty ID to the wildcard, entity IDs use
    /// the hyphenated lowercase UUID form.
    pub fn normalize_id(self, domain_id: &str) -> String {
        match self {
            DomainType::Global => WILDCARD_DOMAIN_ID.to_string(),
            DomainType::Cloud if domain_id.is_empty() => WILDCARD_DOMAIN_ID.to_string(),
            DomainType::Cloud => domain_id.to_string(),
            _ => Uuid::parse_str(domain_id.trim())
                .map(|id| id.to_string())
                .unwrap_or_else(|_| domain_id.to_string()),
        }
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid domain type: {0}")]
pub struct InvalidDomainType(pub String);

impl FromStr for DomainType {
    type Err = InvalidDomainType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|domain| domain.as_str() == value)
            .ok_or_else(|| InvalidDomainType(value.to_string()))
    }
}

/// Grant of `role_id` to `user_id` within one domain scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub domain_type: DomainType,
    pub domain_id: String,
}

impl RoleAssignment {
    pub fn new(
        user_id: Uuid,
        role_id: Uuid,
        domain_type: DomainType,
        domain_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            user_id,
            role_id,
            domain_type,
            domain_id: domain_id.into(),
        }
    }

    /// Grant over a whole domain type, e.g. global or cloud.
    pub fn wildcard(user_id: Uuid, role_id: Uuid, domain_type: DomainType) -> Self {
        Self::new(user_id, role_id, domain_type, WILDCARD_DOMAIN_ID)
    }
}

impl Record for RoleAssignment {
    const VERSION: u8 = 1;

    fn encode_fields(&self, buf: &mut BytesMut) {
        put_uuid(buf, &self.id);
        put_uuid(buf, &self.user_id);
        put_uuid(buf, &self.role_id);
        buf.put_u8(self.domain_type.tag());
        put_str(buf, &self.domain_id);
    }

    fn decode_fields(buf: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            id: get_uuid(buf, "assignment.id")?,
            user_id: get_uuid(buf, "assignment.user_id")?,
            role_id: get_uuid(buf, "assignment.role_id")?,
            domain_type: DomainType::from_tag(get_u8(buf, "assignment.domain_type")?)?,
            domain_id: get_str(buf, "assignment.domain_id")?,
        })
    }
}

/// Optional-field filter for role assignment lookups. Unset fields match
/// anything; set fields must match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentFilter {
    pub user_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
    pub domain_type: Option<DomainType>,
    pub domain_id: Option<String>,
}

impl AssignmentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn role(mut self, role_id: Uuid) -> Self {
        self.role_id = Some(role_id);
        self
    }

    pub fn domain_type(mut self, domain_type: DomainType) -> Self {
        self.domain_type = Some(domain_type);
        self
    }

    pub fn domain(mut self, domain_type: DomainType, domain_id: impl Into<String>) -> Self {
        self.domain_type = Some(domain_type);
        self.domain_id = Some(domain_id.into());
        self
    }

    /// Applies the same domain ID normalization writes use.
    pub fn normalized(mut self) -> Self {
        if let Some(domain_type) = self.domain_type {
            match domain_type {
                DomainType::Global => self.domain_id = Some(WILDCARD_DOMAIN_ID.to_string()),
                _ => {
                    if let Some(id) = self.domain_id.take() {
                        self.domain_id = Some(domain_type.normalize_id(&id));
                    }
                }
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.role_id.is_none()
            && self.domain_type.is_none()
            && self.domain_id.is_none()
    }

    pub fn matches(&self, assignment: &RoleAssignment) -> bool {
        self.user_id.is_none_or(|id| id == assignment.user_id)
            && self.role_id.is_none_or(|id| id == assignment.role_id)
            && self
                .domain_type
                .is_none_or(|domain| domain == assignment.domain_type)
            && self
                .domain_id
                .as_deref()
                .is_none_or(|id| id == assignment.domain_id)
    }
}
