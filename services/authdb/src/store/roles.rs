use super::assignments::remove_matching;
use super::rules::remove_rules_for_subject;
use super::{
    AuthStore, ROLE_NAMES, ROLES, ensure_unassigned, key, list_all, lookup_name, record_cascade,
    require, required_name, save,
};
use crate::error::{AuthDbError, AuthDbResult};
use crate::model::{AssignmentFilter, BuiltinRole, Role};
use carebridge_storage::Transaction;
use tracing::info;
use uuid::Uuid;

fn role_name_taken<T: Transaction>(tx: &T, name: &str) -> AuthDbResult<()> {
    if lookup_name(tx, ROLE_NAMES, name)?.is_some() {
        return Err(AuthDbError::bad_request(format!("role name already taken: {name}")));
    }
    Ok(())
}

impl AuthStore {
    pub fn add_role(&self, role: Role) -> AuthDbResult<Role> {
        ensure_unassigned(&role.id, "role")?;
        let name = required_name(&role.name, "role")?.to_string();
        self.write_and_reload(|tx| {
            role_name_taken(tx, &name)?;
            let role = Role {
                id: Uuid::new_v4(),
                name,
            };
            save(tx, ROLES, &role.id, &role)?;
            tx.put(ROLE_NAMES, role.name.as_bytes(), key(&role.id).as_bytes())?;
            Ok(role)
        })
    }

    pub fn get_role(&self, id: Uuid) -> AuthDbResult<Role> {
        self.read(|tx| require(tx, ROLES, &id, "role"))
    }

    pub fn find_role_by_name(&self, name: &str) -> AuthDbResult<Role> {
        self.read(|tx| {
            let id = lookup_name(tx, ROLE_NAMES, name)?
                .ok_or_else(|| AuthDbError::not_found(format!("role {name}")))?;
            require(tx, ROLES, &id, "role")
        })
    }

    pub fn list_roles(&self) -> AuthDbResult<Vec<Role>> {
        self.read(|tx| list_all(tx, ROLES))
    }

    /// Renames a role. Built-in roles keep their names.
    pub fn update_role(&self, role: &Role) -> AuthDbResult<Role> {
        let name = required_name(&role.name, "role")?.to_string();
        self.write_and_reload(|tx| {
            let existing: Role = require(tx, ROLES, &role.id, "role")?;
            if existing.name == name {
                return Ok(existing);
            }
            if BuiltinRole::from_id(existing.id).is_some() {
                return Err(AuthDbError::bad_request(format!(
                    "built-in role {} cannot be renamed",
                    existing.name
                )));
            }
            role_name_taken(tx, &name)?;
            tx.delete(ROLE_NAMES, existing.name.as_bytes())?;
            tx.put(ROLE_NAMES, name.as_bytes(), key(&existing.id).as_bytes())?;
            let updated = Role {
                id: existing.id,
                name,
            };
            save(tx, ROLES, &updated.id, &updated)?;
            Ok(updated)
        })
    }

    /// Removes a role together with its assignments and the rules granted to
    /// it. Everyone and Superadmin are refused.
    pub fn remove_role(&self, id: Uuid) -> AuthDbResult<()> {
        if let Some(builtin) = BuiltinRole::from_id(id).filter(|role| role.is_protected()) {
            return Err(AuthDbError::bad_request(format!(
                "role {} is protected",
                builtin.name()
            )));
        }
        let (assignments, rules) = self.write_and_reload(|tx| {
            let role: Role = require(tx, ROLES, &id, "role")?;
            let assignments = remove_matching(tx, &AssignmentFilter::new().role(id))?;
            let rules = remove_rules_for_subject(tx, &id)?;
            tx.delete(ROLE_NAMES, role.name.as_bytes())?;
            tx.delete(ROLES, key(&id).as_bytes())?;
            Ok((assignments, rules))
        })?;
        record_cascade("role_assignment", assignments);
        record_cascade("rule", rules);
        info!(role_id = %id, assignments, rules, "role removed");
        Ok(())
    }
}
