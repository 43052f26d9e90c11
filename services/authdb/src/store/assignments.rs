//! Role assignment storage and its three secondary indices.
//!
//! Besides the primary bucket (ID -> record) every assignment is written under
//! three `.`-joined keys whose value is the primary ID:
//!
//! - by domain: `domain_type.domain_id.user_id.role_id`
//! - by user:   `user_id.domain_type.domain_id.role_id`
//! - by role:   `role_id.domain_type.domain_id.user_id`
//!
//! Queries pick the narrowest index for the fields supplied and always finish
//! with an exact field filter, so a plan only has to over-approximate.
use super::{
    AuthStore, CLINICS, LOCATIONS, ORGANIZATIONS, ROLE_ASSIGNMENTS, ROLE_ASSIGNMENTS_BY_DOMAIN,
    ROLE_ASSIGNMENTS_BY_ROLE, ROLE_ASSIGNMENTS_BY_USER, ROLES, USERS, ensure_unassigned, exists,
    id_from_bytes, key, load, parse_id, require, save,
};
use crate::error::{AuthDbError, AuthDbResult};
use crate::model::{AssignmentFilter, DomainType, Record, RoleAssignment};
use carebridge_storage::{Transaction, WriteTx};
use std::collections::BTreeSet;
use tracing::trace;
use uuid::Uuid;

/// Access path chosen for an [`AssignmentFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    FullScan,
    PointLookup(String),
    Intersect {
        user_prefix: String,
        role_prefix: String,
    },
    UserPrefix(String),
    RolePrefix(String),
    DomainPrefix(String),
}

impl QueryPlan {
    /// Expects a normalized filter.
    pub fn for_filter(filter: &AssignmentFilter) -> Self {
        let scope = scope_prefix(filter);
        match (
            filter.user_id,
            filter.role_id,
            filter.domain_type,
            filter.domain_id.as_deref(),
        ) {
            (None, None, None, _) => QueryPlan::FullScan,
            (Some(user), Some(role), Some(domain_type), Some(domain_id)) => {
                QueryPlan::PointLookup(format!("{domain_type}.{domain_id}.{user}.{role}"))
            }
            (Some(user), Some(role), _, _) => QueryPlan::Intersect {
                user_prefix: format!("{user}.{scope}"),
                role_prefix: format!("{role}.{scope}"),
            },
            (Some(user), None, _, _) => QueryPlan::UserPrefix(format!("{user}.{scope}")),
            (None, Some(role), _, _) => QueryPlan::RolePrefix(format!("{role}.{scope}")),
            (None, None, Some(_), _) => QueryPlan::DomainPrefix(scope),
        }
    }
}

/// `domain_type.` plus `domain_id.` when both are known. A domain ID without
/// its type cannot narrow any index.
fn scope_prefix(filter: &AssignmentFilter) -> String {
    match (filter.domain_type, filter.domain_id.as_deref()) {
        (Some(domain_type), Some(domain_id)) => format!("{domain_type}.{domain_id}."),
        (Some(domain_type), None) => format!("{domain_type}."),
        (None, _) => String::new(),
    }
}

fn domain_key(a: &RoleAssignment) -> String {
    format!("{}.{}.{}.{}", a.domain_type, a.domain_id, a.user_id, a.role_id)
}

fn user_key(a: &RoleAssignment) -> String {
    format!("{}.{}.{}.{}", a.user_id, a.domain_type, a.domain_id, a.role_id)
}

fn role_key(a: &RoleAssignment) -> String {
    format!("{}.{}.{}.{}", a.role_id, a.domain_type, a.domain_id, a.user_id)
}

fn ids_under<T: Transaction>(tx: &T, bucket: &str, prefix: &str) -> AuthDbResult<BTreeSet<Uuid>> {
    tx.scan_prefix(bucket, prefix.as_bytes())?
        .into_iter()
        .map(|(_, value)| id_from_bytes(&value))
        .collect()
}

/// Checks and canonicalizes the domain ID of an assignment about to be
/// written.
fn resolve_domain_id<T: Transaction>(
    tx: &T,
    domain_type: DomainType,
    domain_id: &str,
) -> AuthDbResult<String> {
    let normalized = domain_type.normalize_id(domain_id);
    let bucket = match domain_type {
        DomainType::Organization => ORGANIZATIONS,
        DomainType::Location => LOCATIONS,
        DomainType::Clinic => CLINICS,
        DomainType::User => USERS,
        DomainType::Global | DomainType::Cloud => {
            if normalized.contains('.') {
                return Err(AuthDbError::bad_request(format!(
                    "invalid {domain_type} domain id: {normalized:?}"
                )));
            }
            return Ok(normalized);
        }
    };
    let id = parse_id(&normalized)?;
    if !exists(tx, bucket, &id)? {
        return Err(AuthDbError::bad_request(format!(
            "unknown {domain_type} domain {id}"
        )));
    }
    Ok(key(&id))
}

/// Validates and writes one assignment plus its index entries.
pub(crate) fn insert_assignment(
    tx: &WriteTx<'_>,
    mut assignment: RoleAssignment,
) -> AuthDbResult<RoleAssignment> {
    if !exists(tx, USERS, &assignment.user_id)? {
        return Err(AuthDbError::bad_request(format!(
            "unknown user {}",
            assignment.user_id
        )));
    }
    if !exists(tx, ROLES, &assignment.role_id)? {
        return Err(AuthDbError::bad_request(format!(
            "unknown role {}",
            assignment.role_id
        )));
    }
    assignment.domain_id = resolve_domain_id(tx, assignment.domain_type, &assignment.domain_id)?;

    let domain_key = domain_key(&assignment);
    if tx.contains(ROLE_ASSIGNMENTS_BY_DOMAIN, domain_key.as_bytes())? {
        return Err(AuthDbError::bad_request(format!(
            "role assignment already exists: {domain_key}"
        )));
    }

    assignment.id = Uuid::new_v4();
    let id = key(&assignment.id);
    save(tx, ROLE_ASSIGNMENTS, &assignment.id, &assignment)?;
    tx.put(ROLE_ASSIGNMENTS_BY_DOMAIN, domain_key.as_bytes(), id.as_bytes())?;
    tx.put(ROLE_ASSIGNMENTS_BY_USER, user_key(&assignment).as_bytes(), id.as_bytes())?;
    tx.put(ROLE_ASSIGNMENTS_BY_ROLE, role_key(&assignment).as_bytes(), id.as_bytes())?;
    Ok(assignment)
}

/// Deletes the primary record and all three index entries.
pub(crate) fn delete_assignment(tx: &WriteTx<'_>, assignment: &RoleAssignment) -> AuthDbResult<()> {
    tx.delete(ROLE_ASSIGNMENTS, key(&assignment.id).as_bytes())?;
    tx.delete(ROLE_ASSIGNMENTS_BY_DOMAIN, domain_key(assignment).as_bytes())?;
    tx.delete(ROLE_ASSIGNMENTS_BY_USER, user_key(assignment).as_bytes())?;
    tx.delete(ROLE_ASSIGNMENTS_BY_ROLE, role_key(assignment).as_bytes())?;
    Ok(())
}

pub(crate) fn query_assignments<T: Transaction>(
    tx: &T,
    filter: &AssignmentFilter,
) -> AuthDbResult<Vec<RoleAssignment>> {
    let filter = filter.clone().normalized();
    let plan = QueryPlan::for_filter(&filter);
    trace!(?plan, ?filter, "role assignment query");

    let ids = match &plan {
        QueryPlan::FullScan => {
            let mut all = tx
                .scan(ROLE_ASSIGNMENTS)?
                .into_iter()
                .map(|(_, value)| RoleAssignment::decode(&value).map_err(AuthDbError::from))
                .collect::<AuthDbResult<Vec<_>>>()?;
            all.retain(|assignment| filter.matches(assignment));
            return Ok(all);
        }
        QueryPlan::PointLookup(domain_key) => {
            match tx.get(ROLE_ASSIGNMENTS_BY_DOMAIN, domain_key.as_bytes())? {
                Some(raw) => BTreeSet::from([id_from_bytes(&raw)?]),
                None => BTreeSet::new(),
            }
        }
        QueryPlan::Intersect {
            user_prefix,
            role_prefix,
        } => {
            let by_user = ids_under(tx, ROLE_ASSIGNMENTS_BY_USER, user_prefix)?;
            let by_role = ids_under(tx, ROLE_ASSIGNMENTS_BY_ROLE, role_prefix)?;
            by_user.intersection(&by_role).copied().collect()
        }
        QueryPlan::UserPrefix(prefix) => ids_under(tx, ROLE_ASSIGNMENTS_BY_USER, prefix)?,
        QueryPlan::RolePrefix(prefix) => ids_under(tx, ROLE_ASSIGNMENTS_BY_ROLE, prefix)?,
        QueryPlan::DomainPrefix(prefix) => ids_under(tx, ROLE_ASSIGNMENTS_BY_DOMAIN, prefix)?,
    };

    let mut found = Vec::with_capacity(ids.len());
    for id in ids {
        let assignment: RoleAssignment = load(tx, ROLE_ASSIGNMENTS, &id)?.ok_or_else(|| {
            AuthDbError::Internal(anyhow::anyhow!("index entry points at missing assignment {id}"))
        })?;
        if filter.matches(&assignment) {
            found.push(assignment);
        }
    }
    Ok(found)
}

/// Removes every assignment matching `filter` inside the caller's
/// transaction and returns how many went.
pub(crate) fn remove_matching(tx: &WriteTx<'_>, filter: &AssignmentFilter) -> AuthDbResult<usize> {
    let doomed = query_assignments(tx, filter)?;
    for assignment in &doomed {
        delete_assignment(tx, assignment)?;
    }
    Ok(doomed.len())
}

impl AuthStore {
    /// Grants a role within a domain. The assignment ID must be nil.
    pub fn add_role_assignment(&self, assignment: RoleAssignment) -> AuthDbResult<RoleAssignment> {
        ensure_unassigned(&assignment.id, "role assignment")?;
        self.write_and_reload(|tx| insert_assignment(tx, assignment))
    }

    pub fn get_role_assignment(&self, id: Uuid) -> AuthDbResult<RoleAssignment> {
        self.read(|tx| require(tx, ROLE_ASSIGNMENTS, &id, "role assignment"))
    }

    pub fn find_role_assignments(&self, filter: &AssignmentFilter) -> AuthDbResult<Vec<RoleAssignment>> {
        self.read(|tx| query_assignments(tx, filter))
    }

    pub fn list_role_assignments(&self) -> AuthDbResult<Vec<RoleAssignment>> {
        self.find_role_assignments(&AssignmentFilter::new())
    }

    pub fn remove_role_assignment(&self, id: Uuid) -> AuthDbResult<()> {
        self.write_and_reload(|tx| {
            let assignment: RoleAssignment = require(tx, ROLE_ASSIGNMENTS, &id, "role assignment")?;
            delete_assignment(tx, &assignment)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WILDCARD_DOMAIN_ID;

    #[test]
    fn plans_pick_the_narrowest_index() {
        let user = Uuid::new_v4();
        let role = Uuid::new_v4();
        let org = Uuid::new_v4().to_string();

        let plan = |filter: AssignmentFilter| QueryPlan::for_filter(&filter.normalized());

        assert_eq!(plan(AssignmentFilter::new()), QueryPlan::FullScan);
        assert_eq!(
            plan(AssignmentFilter::new().user(user).role(role).domain(DomainType::Organization, &org)),
            QueryPlan::PointLookup(format!("organization.{org}.{user}.{role}"))
        );
        assert_eq!(
            plan(AssignmentFilter::new().user(user).role(role).domain_type(DomainType::Global)),
            QueryPlan::PointLookup(format!("global.{WILDCARD_DOMAIN_ID}.{user}.{role}"))
        );
        assert_eq!(
            plan(AssignmentFilter::new().user(user).role(role).domain_type(DomainType::Clinic)),
            QueryPlan::Intersect {
                user_prefix: format!("{user}.clinic."),
                role_prefix: format!("{role}.clinic."),
            }
        );
        assert_eq!(
            plan(AssignmentFilter::new().user(user)),
            QueryPlan::UserPrefix(format!("{user}."))
        );
        assert_eq!(
            plan(AssignmentFilter::new().role(role).domain(DomainType::Organization, &org)),
            QueryPlan::RolePrefix(format!("{role}.organization.{org}."))
        );
        assert_eq!(
            plan(AssignmentFilter::new().domain_type(DomainType::Cloud)),
            QueryPlan::DomainPrefix("cloud.".to_string())
        );
        // A domain id alone narrows nothing.
        let id_only = AssignmentFilter {
            domain_id: Some(org.clone()),
            ..AssignmentFilter::default()
        };
        assert_eq!(plan(id_only), QueryPlan::FullScan);
    }

    #[test]
    fn index_keys_share_one_shape() {
        let assignment = RoleAssignment {
            id: Uuid::new_v4(),
            ..RoleAssignment::wildcard(Uuid::new_v4(), Uuid::new_v4(), DomainType::Global)
        };
        let user = assignment.user_id;
        let role = assignment.role_id;
        assert_eq!(domain_key(&assignment), format!("global.*.{user}.{role}"));
        assert_eq!(user_key(&assignment), format!("{user}.global.*.{role}"));
        assert_eq!(role_key(&assignment), format!("{role}.global.*.{user}"));
    }
}
