//! Materialized policy and batched enforcement.
//!
//! # Purpose and responsibility
//! Compiles the stored rules and role assignments into a
//! [`carebridge_authz::PolicySet`] and answers batched access questions
//! against it.
//!
//! # Key invariants and assumptions
//! - The cache is rebuilt in full, never patched incrementally.
//! - Group membership is the flat `(user, role)` relation of all role
//!   assignments; the domain scope of an assignment does not narrow it.
//! - Rebuilds are serialized so a slow, older rebuild cannot overwrite a
//!   newer one.
//!
//! # Security considerations
//! - A storage failure during the first load is returned to the caller rather
//!   than treated as "deny".
use crate::error::AuthDbResult;
use crate::model::{Record, RoleAssignment, Rule};
use crate::store::{ROLE_ASSIGNMENTS, RULES};
use carebridge_authz::{Actions, GroupingRule, PolicyRule, PolicySet};
use carebridge_storage::{SharedStore, Transaction};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;

pub struct PolicyEnforcer {
    db: Arc<SharedStore>,
    cache: RwLock<Option<Arc<PolicySet>>>,
    rebuild: Mutex<()>,
}

impl PolicyEnforcer {
    pub fn new(db: Arc<SharedStore>) -> Self {
        Self {
            db,
            cache: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    /// Rebuild the cached policy from storage.
    ///
    /// # What it does
    /// Reads every rule and every role assignment in one snapshot, compiles
    /// them, and swaps the result in.
    ///
    /// # Errors
    /// - Storage, decrypt or decode failures; the previous cache is kept.
    pub fn reload_now(&self) -> AuthDbResult<()> {
        let _serialized = self.rebuild.lock();
        let result = self.db.view(|tx| -> AuthDbResult<PolicySet> {
            let rules = tx
                .scan(RULES)?
                .into_iter()
                .map(|(_, value)| Ok(Rule::decode(&value)?.to_policy()))
                .collect::<AuthDbResult<Vec<PolicyRule>>>()?;
            let groupings = tx
                .scan(ROLE_ASSIGNMENTS)?
                .into_iter()
                .map(|(_, value)| {
                    let assignment = RoleAssignment::decode(&value)?;
                    Ok(GroupingRule::new(
                        assignment.user_id.to_string(),
                        assignment.role_id.to_string(),
                    ))
                })
                .collect::<AuthDbResult<Vec<GroupingRule>>>()?;
            Ok(PolicySet::new(rules, groupings))
        });
        match result {
            Ok(policy) => {
                debug!(
                    rules = policy.rule_count(),
                    groupings = policy.grouping_count(),
                    "policy reloaded"
                );
                *self.cache.write() = Some(Arc::new(policy));
                metrics::counter!("carebridge_policy_reloads_total", "result" => "ok").increment(1);
                Ok(())
            }
            Err(err) => {
                metrics::counter!("carebridge_policy_reloads_total", "result" => "error")
                    .increment(1);
                Err(err)
            }
        }
    }

    /// Current policy, loading it synchronously if nothing has loaded yet.
    pub fn policy(&self) -> AuthDbResult<Arc<PolicySet>> {
        if let Some(policy) = self.cache.read().as_ref() {
            return Ok(Arc::clone(policy));
        }
        self.reload_now()?;
        Ok(self
            .cache
            .read()
            .as_ref()
            .map(Arc::clone)
            .unwrap_or_default())
    }

    /// Evaluate a batch of `(resource, actions)` requests for one subject.
    ///
    /// # Returns
    /// - One decision per request, in request order, each evaluated
    ///   independently.
    ///
    /// # Example
    /// ```rust,no_run
    /// use carebridge_authdb::policy::PolicyEnforcer;
    /// use carebridge_authz::Actions;
    ///
    /// # fn demo(enforcer: &PolicyEnforcer) -> carebridge_authdb::AuthDbResult<()> {
    /// let decisions = enforcer.enforce("user-id", &[("/users/user-id", Actions::READ)])?;
    /// assert_eq!(decisions.len(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn enforce<R: AsRef<str>>(
        &self,
        subject: &str,
        requests: &[(R, Actions)],
    ) -> AuthDbResult<Vec<bool>> {
        let policy = self.policy()?;
        Ok(requests
            .iter()
            .map(|(resource, actions)| policy.permits(subject, resource.as_ref(), *actions))
            .collect())
    }
}
