use super::assignments::{insert_assignment, remove_matching};
use super::rules::remove_rules_for_subject;
use super::{
    AuthStore, USERNAMES, USERS, key, list_all, lookup_name, record_cascade, require,
    required_name, save,
};
use crate::error::{AuthDbError, AuthDbResult};
use crate::model::{AssignmentFilter, BuiltinRole, DomainType, NewUser, RoleAssignment, User};
use carebridge_storage::{Transaction, WriteTx};
use tracing::{debug, info};
use uuid::Uuid;

const INVALID_CREDENTIALS: &str = "invalid credentials";
const DECOY_PASSWORD: &str = "carebridge-decoy";

/// Assignments every new user starts with: Everyone globally, Member in the
/// cloud, and Author over their own user record.
fn default_assignments(user_id: Uuid) -> [RoleAssignment; 3] {
    [
        RoleAssignment::wildcard(user_id, BuiltinRole::Everyone.id(), DomainType::Global),
        RoleAssignment::wildcard(user_id, BuiltinRole::Member.id(), DomainType::Cloud),
        RoleAssignment::new(
            user_id,
            BuiltinRole::Author.id(),
            DomainType::User,
            user_id.to_string(),
        ),
    ]
}

fn username_taken<T: Transaction>(tx: &T, username: &str) -> AuthDbResult<()> {
    if lookup_name(tx, USERNAMES, username)?.is_some() {
        return Err(AuthDbError::bad_request(format!(
            "username already taken: {username}"
        )));
    }
    Ok(())
}

fn required_password(password: &str) -> AuthDbResult<()> {
    if password.is_empty() {
        return Err(AuthDbError::bad_request("password is required"));
    }
    Ok(())
}

/// Drops every trace of a user: grants held by it, grants scoped to it, rules
/// naming it, its username entry and the record itself.
fn purge_user(tx: &WriteTx<'_>, user: &User) -> AuthDbResult<(usize, usize)> {
    let mut removed = remove_matching(tx, &AssignmentFilter::new().user(user.id))?;
    removed += remove_matching(
        tx,
        &AssignmentFilter::new().domain(DomainType::User, user.id.to_string()),
    )?;
    let rules = remove_rules_for_subject(tx, &user.id)?;
    tx.delete(USERNAMES, user.username.as_bytes())?;
    tx.delete(USERS, key(&user.id).as_bytes())?;
    Ok((removed, rules))
}

impl AuthStore {
    fn hash_password(&self, password: &str) -> AuthDbResult<String> {
        bcrypt::hash(password, self.bcrypt_cost)
            .map_err(|err| AuthDbError::Internal(anyhow::Error::new(err).context("hash password")))
    }

    fn decoy_hash(&self) -> AuthDbResult<&str> {
        if let Some(hash) = self.decoy_hash.get() {
            return Ok(hash);
        }
        let hash = self.hash_password(DECOY_PASSWORD)?;
        Ok(self.decoy_hash.get_or_init(|| hash))
    }

    /// Creates a user with a bcrypt-hashed password and the three default
    /// role assignments.
    pub fn add_user(&self, new_user: NewUser) -> AuthDbResult<User> {
        let username = required_name(&new_user.username, "user")?.to_string();
        required_password(&new_user.password)?;
        // Hash outside the write transaction; bcrypt is slow on purpose.
        let password_hash = self.hash_password(&new_user.password)?;

        let user = self.write_and_reload(|tx| {
            username_taken(tx, &username)?;
            let user = User {
                id: Uuid::new_v4(),
                username,
                email: new_user.email,
                password_hash,
            };
            save(tx, USERS, &user.id, &user)?;
            tx.put(USERNAMES, user.username.as_bytes(), key(&user.id).as_bytes())?;
            for assignment in default_assignments(user.id) {
                insert_assignment(tx, assignment)?;
            }
            Ok(user)
        })?;
        info!(user_id = %user.id, username = %user.username, "user added");
        Ok(user)
    }

    pub fn get_user(&self, id: Uuid) -> AuthDbResult<User> {
        self.read(|tx| require(tx, USERS, &id, "user"))
    }

    pub fn find_user_by_username(&self, username: &str) -> AuthDbResult<User> {
        self.read(|tx| {
            let id = lookup_name(tx, USERNAMES, username)?
                .ok_or_else(|| AuthDbError::not_found(format!("user {username}")))?;
            require(tx, USERS, &id, "user")
        })
    }

    pub fn list_users(&self) -> AuthDbResult<Vec<User>> {
        self.read(|tx| list_all(tx, USERS))
    }

    /// Updates username and email. The stored password hash is kept.
    pub fn update_user(&self, user: &User) -> AuthDbResult<User> {
        let username = required_name(&user.username, "user")?.to_string();
        self.write(|tx| {
            let existing: User = require(tx, USERS, &user.id, "user")?;
            if existing.username != username {
                username_taken(tx, &username)?;
                tx.delete(USERNAMES, existing.username.as_bytes())?;
                tx.put(USERNAMES, username.as_bytes(), key(&user.id).as_bytes())?;
            }
            let updated = User {
                id: existing.id,
                username,
                email: user.email.clone(),
                password_hash: existing.password_hash,
            };
            save(tx, USERS, &updated.id, &updated)?;
            Ok(updated)
        })
    }

    pub fn change_password(&self, id: Uuid, new_password: &str) -> AuthDbResult<()> {
        required_password(new_password)?;
        let password_hash = self.hash_password(new_password)?;
        self.write(|tx| {
            let mut user: User = require(tx, USERS, &id, "user")?;
            user.password_hash = password_hash;
            save(tx, USERS, &id, &user)
        })?;
        debug!(user_id = %id, "password changed");
        Ok(())
    }

    /// Verifies a username/password pair. Unknown users and wrong passwords
    /// fail identically, and both pay for one bcrypt verification at the
    /// store's cost.
    pub fn authenticate(&self, username: &str, password: &str) -> AuthDbResult<User> {
        let user = match self.find_user_by_username(username) {
            Ok(user) => user,
            Err(AuthDbError::NotFound(_)) => {
                let _ = bcrypt::verify(password, self.decoy_hash()?);
                return Err(AuthDbError::bad_request(INVALID_CREDENTIALS));
            }
            Err(err) => return Err(err),
        };
        let valid = bcrypt::verify(password, &user.password_hash).map_err(|err| {
            AuthDbError::Internal(anyhow::Error::new(err).context("verify password"))
        })?;
        if !valid {
            return Err(AuthDbError::bad_request(INVALID_CREDENTIALS));
        }
        Ok(user)
    }

    /// Removes a user and cascades to its assignments and rules.
    pub fn remove_user(&self, id: Uuid) -> AuthDbResult<()> {
        let (assignments, rules) = self.write_and_reload(|tx| {
            let user: User = require(tx, USERS, &id, "user")?;
            purge_user(tx, &user)
        })?;
        record_cascade("role_assignment", assignments);
        record_cascade("rule", rules);
        info!(user_id = %id, assignments, rules, "user removed");
        Ok(())
    }
}
