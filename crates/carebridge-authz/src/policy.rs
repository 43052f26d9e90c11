//! Compiled policy evaluation.
//!
//! # Purpose
//! Turns a flat list of allow/deny rules plus a subject-to-group relation
//! into an in-memory structure that answers "may `subject` perform `actions`
//! on `resource`?" without touching storage.
//!
//! # How it fits
//! The authdb enforcer rebuilds a [`PolicySet`] from the stored rules and
//! role assignments on every reload and swaps it in atomically. Requests are
//! then evaluated against the cached set.
//!
//! # Key invariants
//! - A request is permitted iff at least one allow rule matches and no deny
//!   rule matches. Deny always wins.
//! - Group membership is transitive; cycles are tolerated.
//! - `{self}` in a rule resource refers to the requesting subject, even when
//!   the rule was granted to one of its groups.
//!
//! # Examples
//! ```rust
//! use carebridge_authz::{Actions, GroupingRule, PolicyRule, PolicySet};
//!
//! let set = PolicySet::new(
//!     vec![PolicyRule::allow("author", "/users/{self}", Actions::READ | Actions::WRITE)],
//!     vec![GroupingRule::new("u-1", "author")],
//! );
//! assert!(set.permits("u-1", "/users/u-1", Actions::WRITE));
//! assert!(!set.permits("u-1", "/users/u-2", Actions::READ));
//! ```
use crate::{Actions, resource_matches};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
}

/// One `(subject, resource, actions, effect)` policy line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    pub subject: String,
    pub resource: String,
    pub actions: Actions,
    pub effect: Effect,
}

impl PolicyRule {
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        actions: Actions,
        effect: Effect,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            actions,
            effect,
        }
    }

    pub fn allow(subject: impl Into<String>, resource: impl Into<String>, actions: Actions) -> Self {
        Self::new(subject, resource, actions, Effect::Allow)
    }

    pub fn deny(subject: impl Into<String>, resource: impl Into<String>, actions: Actions) -> Self {
        Self::new(subject, resource, actions, Effect::Deny)
    }

    /// Whether this rule covers the request, given the original requester.
    ///
    /// # Parameters
    /// - `requester`: the subject the request was made for; used for `{self}`.
    /// - `resource`: the concrete resource being accessed.
    /// - `actions`: the requested action bits.
    pub fn covers(&self, requester: &str, resource: &str, actions: Actions) -> bool {
        self.actions.contains(actions) && resource_matches(&self.resource, resource, requester)
    }
}

/// `member` inherits every rule granted to `group`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupingRule {
    pub member: String,
    pub group: String,
}

impl GroupingRule {
    pub fn new(member: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            group: group.into(),
        }
    }
}

/// Immutable, indexed policy snapshot.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    rules_by_subject: HashMap<String, Vec<PolicyRule>>,
    groups_by_member: HashMap<String, Vec<String>>,
    rule_count: usize,
    grouping_count: usize,
}

impl PolicySet {
    /// Index the rules by subject and the groupings by member.
    ///
    /// Duplicate groupings are collapsed; duplicate rules are harmless.
    pub fn new(rules: Vec<PolicyRule>, groupings: Vec<GroupingRule>) -> Self {
        let rule_count = rules.len();
        let mut rules_by_subject: HashMap<String, Vec<PolicyRule>> = HashMap::new();
        for rule in rules {
            rules_by_subject
                .entry(rule.subject.clone())
                .or_default()
                .push(rule);
        }

        let mut seen = HashSet::new();
        let mut groups_by_member: HashMap<String, Vec<String>> = HashMap::new();
        for grouping in groupings {
            if seen.insert((grouping.member.clone(), grouping.group.clone())) {
                groups_by_member
                    .entry(grouping.member)
                    .or_default()
                    .push(grouping.group);
            }
        }

        Self {
            rules_by_subject,
            groups_by_member,
            rule_count,
            grouping_count: seen.len(),
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    pub fn grouping_count(&self) -> usize {
        self.grouping_count
    }

    /// `subject` followed by every group reachable from it, breadth first.
    pub fn subjects_for(&self, subject: &str) -> Vec<String> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([subject.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(groups) = self.groups_by_member.get(&current) {
                queue.extend(groups.iter().cloned());
            }
            order.push(current);
        }
        order
    }

    /// Evaluate one request.
    ///
    /// # Returns
    /// - `true` if some allow rule covers the request and no deny rule does.
    pub fn permits(&self, subject: &str, resource: &str, actions: Actions) -> bool {
        let mut allowed = false;
        for candidate in self.subjects_for(subject) {
            let Some(rules) = self.rules_by_subject.get(&candidate) else {
                continue;
            };
            for rule in rules {
                if !rule.covers(subject, resource, actions) {
                    continue;
                }
                match rule.effect {
                    Effect::Deny => return false,
                    Effect::Allow => allowed = true,
                }
            }
        }
        allowed
    }
}
