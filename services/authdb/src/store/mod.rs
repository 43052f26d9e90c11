//! Entity repositories over the encrypted store.
//!
//! # Purpose
//! CRUD, uniqueness and referential integrity for users, roles,
//! organizations, locations, clinics, role assignments and rules. Every
//! public operation runs in exactly one store transaction, so a failed
//! cascade leaves nothing behind.
//!
//! # Key invariants
//! - Each entity bucket is keyed by the hyphenated UUID; each name index maps
//!   a unique name (or `org.location.name` for clinics) to that UUID.
//! - `Organization::clinics` and `Location::clinics` are recomputed from
//!   clinic records on every write that can change them.
//! - Mutations that can change the effective policy call
//!   [`PolicyStore::reload`] after the transaction commits.
//!
//! # Common pitfalls
//! - Callers must pass a nil ID to `add_*`; the store generates IDs.
mod assignments;
mod clinics;
mod locations;
mod organizations;
mod roles;
mod rules;
mod users;

pub use assignments::QueryPlan;

use crate::error::{AuthDbError, AuthDbResult};
use crate::model::{BuiltinRole, Record, Rule};
use crate::policy::PolicyStore;
use carebridge_authz::Actions;
use carebridge_storage::{ReadTx, SharedStore, Transaction, WriteTx};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const USERS: &str = "users";
pub const USERNAMES: &str = "usernames";
pub const ROLES: &str = "roles";
pub const ROLE_NAMES: &str = "roleNames";
pub const RULES: &str = "rules";
pub const ROLE_ASSIGNMENTS: &str = "roleAssignments";
pub const ROLE_ASSIGNMENTS_BY_DOMAIN: &str = "roleAssignmentsByDomain";
pub const ROLE_ASSIGNMENTS_BY_USER: &str = "roleAssignmentsByUser";
pub const ROLE_ASSIGNMENTS_BY_ROLE: &str = "roleAssignmentsByRole";
pub const ORGANIZATIONS: &str = "organizations";
pub const ORGANIZATION_NAMES: &str = "organizationNames";
pub const LOCATIONS: &str = "locations";
pub const LOCATION_NAMES: &str = "locationNames";
pub const CLINICS: &str = "clinics";
pub const CLINIC_NAMES: &str = "clinicNames";

/// Every bucket a store file carries.
pub const BUCKETS: &[&str] = &[
    USERS,
    USERNAMES,
    ROLES,
    ROLE_NAMES,
    RULES,
    ROLE_ASSIGNMENTS,
    ROLE_ASSIGNMENTS_BY_DOMAIN,
    ROLE_ASSIGNMENTS_BY_USER,
    ROLE_ASSIGNMENTS_BY_ROLE,
    ORGANIZATIONS,
    ORGANIZATION_NAMES,
    LOCATIONS,
    LOCATION_NAMES,
    CLINICS,
    CLINIC_NAMES,
];

const SUPERADMIN_RULE_ID: Uuid = Uuid::from_u128(0x6a1f_0c52_9e1b_4c1e_8a3d_0000_0000_0101);
const AUTHOR_SELF_RULE_ID: Uuid = Uuid::from_u128(0x6a1f_0c52_9e1b_4c1e_8a3d_0000_0000_0102);

/// Rules seeded next to the built-in roles.
fn seeded_rules() -> [Rule; 2] {
    [
        Rule {
            id: SUPERADMIN_RULE_ID,
            ..Rule::allow(BuiltinRole::Superadmin.id(), "*", Actions::ALL)
        },
        Rule {
            id: AUTHOR_SELF_RULE_ID,
            ..Rule::allow(
                BuiltinRole::Author.id(),
                "/users/{self}",
                Actions::READ | Actions::WRITE,
            )
        },
    ]
}

/// Parse a caller-supplied ID. Malformed IDs are a `BadRequest`.
pub fn parse_id(value: &str) -> AuthDbResult<Uuid> {
    Uuid::parse_str(value.trim())
        .map_err(|_| AuthDbError::bad_request(format!("malformed id: {value:?}")))
}

pub(crate) fn key(id: &Uuid) -> String {
    id.to_string()
}

pub(crate) fn load<R: Record, T: Transaction>(
    tx: &T,
    bucket: &str,
    id: &Uuid,
) -> AuthDbResult<Option<R>> {
    match tx.get(bucket, key(id).as_bytes())? {
        Some(bytes) => Ok(Some(R::decode(&bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn require<R: Record, T: Transaction>(
    tx: &T,
    bucket: &str,
    id: &Uuid,
    what: &str,
) -> AuthDbResult<R> {
    load(tx, bucket, id)?.ok_or_else(|| AuthDbError::not_found(format!("{what} {id}")))
}

pub(crate) fn exists<T: Transaction>(tx: &T, bucket: &str, id: &Uuid) -> AuthDbResult<bool> {
    Ok(tx.contains(bucket, key(id).as_bytes())?)
}

pub(crate) fn save<R: Record>(tx: &WriteTx<'_>, bucket: &str, id: &Uuid, record: &R) -> AuthDbResult<()> {
    tx.put(bucket, key(id).as_bytes(), &record.encode())?;
    Ok(())
}

pub(crate) fn list_all<R: Record, T: Transaction>(tx: &T, bucket: &str) -> AuthDbResult<Vec<R>> {
    tx.scan(bucket)?
        .into_iter()
        .map(|(_, value)| R::decode(&value).map_err(AuthDbError::from))
        .collect()
}

/// Reads the ID a name index entry points at.
pub(crate) fn lookup_name<T: Transaction>(tx: &T, bucket: &str, name: &str) -> AuthDbResult<Option<Uuid>> {
    match tx.get(bucket, name.as_bytes())? {
        Some(raw) => Ok(Some(id_from_bytes(&raw)?)),
        None => Ok(None),
    }
}

pub(crate) fn id_from_bytes(raw: &[u8]) -> AuthDbResult<Uuid> {
    let text = std::str::from_utf8(raw)
        .map_err(|err| AuthDbError::Internal(anyhow::Error::new(err).context("index value")))?;
    Uuid::parse_str(text)
        .map_err(|err| AuthDbError::Internal(anyhow::Error::new(err).context("index value")))
}

pub(crate) fn ensure_unassigned(id: &Uuid, what: &str) -> AuthDbResult<()> {
    if id.is_nil() {
        Ok(())
    } else {
        Err(AuthDbError::bad_request(format!(
            "{what} id is assigned by the store"
        )))
    }
}

pub(crate) fn required_name<'a>(name: &'a str, what: &str) -> AuthDbResult<&'a str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AuthDbError::bad_request(format!("{what} name is required")));
    }
    Ok(trimmed)
}

pub(crate) fn record_cascade(entity: &'static str, removed: usize) {
    if removed > 0 {
        metrics::counter!("carebridge_cascade_removed_total", "entity" => entity)
            .increment(removed as u64);
    }
}

/// Repository facade over one shared store.
pub struct AuthStore {
    db: Arc<SharedStore>,
    policy: Arc<dyn PolicyStore>,
    bcrypt_cost: u32,
    /// Hash checked against when a username is unknown; built on first use.
    decoy_hash: OnceLock<String>,
}

impl AuthStore {
    /// Wraps `db` and, when it is writable, seeds the built-in roles and
    /// their rules.
    pub fn open(
        db: Arc<SharedStore>,
        policy: Arc<dyn PolicyStore>,
        bcrypt_cost: u32,
    ) -> AuthDbResult<Self> {
        let store = Self {
            db,
            policy,
            bcrypt_cost,
            decoy_hash: OnceLock::new(),
        };
        if !store.db.mode().is_read_only() {
            let seeded = store.db.update(seed_builtins)?;
            if seeded > 0 {
                info!(seeded, "seeded built-in roles and rules");
                store.policy.reload();
            }
        }
        Ok(store)
    }

    pub fn shared(&self) -> &Arc<SharedStore> {
        &self.db
    }

    fn read<T>(&self, f: impl FnOnce(&ReadTx<'_>) -> AuthDbResult<T>) -> AuthDbResult<T> {
        self.db.view(f)
    }

    fn write<T>(&self, f: impl FnOnce(&WriteTx<'_>) -> AuthDbResult<T>) -> AuthDbResult<T> {
        self.db.update(f)
    }

    /// Commits `f`, then schedules a policy reload.
    fn write_and_reload<T>(
        &self,
        f: impl FnOnce(&WriteTx<'_>) -> AuthDbResult<T>,
    ) -> AuthDbResult<T> {
        let value = self.db.update(f)?;
        self.policy.reload();
        Ok(value)
    }
}

fn seed_builtins(tx: &WriteTx<'_>) -> AuthDbResult<usize> {
    let mut seeded = 0;
    for builtin in BuiltinRole::ALL {
        let id = builtin.id();
        if exists(tx, ROLES, &id)? {
            continue;
        }
        if let Some(other) = lookup_name(tx, ROLE_NAMES, builtin.name())? {
            warn!(role = builtin.name(), %other, "built-in role name already taken");
            continue;
        }
        save(tx, ROLES, &id, &builtin.role())?;
        tx.put(ROLE_NAMES, builtin.name().as_bytes(), key(&id).as_bytes())?;
        debug!(role = builtin.name(), "seeded role");
        seeded += 1;
    }
    for rule in seeded_rules() {
        if exists(tx, RULES, &rule.id)? || !exists(tx, ROLES, &rule.subject)? {
            continue;
        }
        save(tx, RULES, &rule.id, &rule)?;
        seeded += 1;
    }
    Ok(seeded)
}
