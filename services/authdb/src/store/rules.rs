use super::{AuthStore, ROLES, RULES, USERS, ensure_unassigned, exists, key, list_all, require, save};
use crate::error::{AuthDbError, AuthDbResult};
use crate::model::Rule;
use carebridge_authz::AuthzError;
use carebridge_storage::WriteTx;
use uuid::Uuid;

/// Deletes every rule whose subject is `subject`.
pub(crate) fn remove_rules_for_subject(tx: &WriteTx<'_>, subject: &Uuid) -> AuthDbResult<usize> {
    let doomed = list_all::<Rule, _>(tx, RULES)?
        .into_iter()
        .filter(|rule| rule.subject == *subject)
        .collect::<Vec<_>>();
    for rule in &doomed {
        tx.delete(RULES, key(&rule.id).as_bytes())?;
    }
    Ok(doomed.len())
}

impl AuthStore {
    /// Stores a policy rule. The subject must be an existing user or role and
    /// the actions a non-empty subset of read, write and delete.
    pub fn add_rule(&self, rule: Rule) -> AuthDbResult<Rule> {
        ensure_unassigned(&rule.id, "rule")?;
        if rule.actions.is_empty() {
            return Err(AuthzError::EmptyActions.into());
        }
        if rule.resource.trim().is_empty() {
            return Err(AuthDbError::bad_request("rule resource is required"));
        }
        self.write_and_reload(|tx| {
            if !exists(tx, USERS, &rule.subject)? && !exists(tx, ROLES, &rule.subject)? {
                return Err(AuthDbError::bad_request(format!(
                    "unknown rule subject {}",
                    rule.subject
                )));
            }
            let rule = Rule {
                id: Uuid::new_v4(),
                ..rule
            };
            save(tx, RULES, &rule.id, &rule)?;
            Ok(rule)
        })
    }

    pub fn get_rule(&self, id: Uuid) -> AuthDbResult<Rule> {
        self.read(|tx| require(tx, RULES, &id, "rule"))
    }

    pub fn list_rules(&self) -> AuthDbResult<Vec<Rule>> {
        self.read(|tx| list_all(tx, RULES))
    }

    pub fn remove_rule(&self, id: Uuid) -> AuthDbResult<()> {
        self.write_and_reload(|tx| {
            let _: Rule = require(tx, RULES, &id, "rule")?;
            tx.delete(RULES, key(&id).as_bytes())?;
            Ok(())
        })
    }
}
