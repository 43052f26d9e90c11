//! Carebridge authorization primitives shared by the authdb service and its
//! callers.
//!
//! # Purpose
//! Centralizes the action bitmask, resource matching (glob and `{self}`) and
//! the compiled allow/deny policy evaluator.
//!
//! # How it fits
//! The authdb service stores rules and role assignments, rebuilds a
//! [`PolicySet`] from them and answers enforcement requests against it. This
//! crate has no storage or I/O.
//!
//! # Key invariants
//! - Actions are Read=1, Write=2, Delete=4; requests match by subset.
//! - Deny rules take precedence over allow rules.
//!
//! # Examples
//! ```rust
//! use carebridge_authz::{Actions, wildcard_match};
//!
//! assert!(wildcard_match("/users/*", "/users/42"));
//! assert_eq!((Actions::READ | Actions::WRITE).bits(), 3);
//! ```
//!
//! # Common pitfalls
//! - `*` also spans `/`; `/users/*` covers `/users/1/roles`.
//! - `{self}` is substituted with the requesting subject, not with the group
//!   the rule was attached to.

mod action;
mod errors;
mod matcher;
mod policy;

pub use action::Actions;
pub use errors::{AuthzError, AuthzResult};
pub use matcher::{SELF_TOKEN, resource_matches, self_match, wildcard_match};
pub use policy::{Effect, GroupingRule, PolicyRule, PolicySet};
