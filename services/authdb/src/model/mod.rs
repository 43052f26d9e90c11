//! Authdb data model.
//!
//! # Purpose
//! Entity records stored in the encrypted buckets, each with an explicit
//! versioned binary codec ([`Record`]), plus the query filter for role
//! assignments.
mod assignment;
mod clinic;
mod codec;
mod location;
mod organization;
mod role;
mod rule;
mod user;

pub use assignment::{AssignmentFilter, DomainType, InvalidDomainType, RoleAssignment, WILDCARD_DOMAIN_ID};
pub use clinic::Clinic;
pub use codec::{CodecError, CodecResult, Record};
pub use location::Location;
pub use organization::Organization;
pub use role::{BuiltinRole, Role};
pub use rule::Rule;
pub use user::{NewUser, User};
