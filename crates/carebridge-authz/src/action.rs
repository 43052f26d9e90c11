use crate::{AuthzError, AuthzResult};
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Set of actions a rule grants or a request asks for.
///
/// # Summary
/// A bitmask over Read (1), Write (2) and Delete (4). Requests are matched
/// with subset semantics: a rule covers a request when every requested bit is
/// present on the rule.
///
/// # Example
/// ```rust
/// use carebridge_authz::Actions;
///
/// let rw = Actions::READ | Actions::WRITE;
/// assert!(rw.contains(Actions::READ));
/// assert!(!rw.contains(Actions::DELETE));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Actions(u8);

impl Actions {
    pub const NONE: Actions = Actions(0);
    pub const READ: Actions = Actions(1);
    pub const WRITE: Actions = Actions(2);
    pub const DELETE: Actions = Actions(4);
    pub const ALL: Actions = Actions(1 | 2 | 4);

    /// Build from raw bits, rejecting anything outside Read|Write|Delete.
    pub fn from_bits(bits: u8) -> AuthzResult<Self> {
        if bits & !Self::ALL.0 != 0 {
            return Err(AuthzError::InvalidAction(format!("unknown bits {bits:#04x}")));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set on `self`.
    pub fn contains(self, other: Actions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Actions {
    type Output = Actions;

    fn bitor(self, rhs: Self) -> Self::Output {
        Actions(self.0 | rhs.0)
    }
}

impl BitOrAssign for Actions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl TryFrom<u8> for Actions {
    type Error = AuthzError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

impl From<Actions> for u8 {
    fn from(actions: Actions) -> Self {
        actions.0
    }
}

impl std::fmt::Display for Actions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names = [
            (Actions::READ, "read"),
            (Actions::WRITE, "write"),
            (Actions::DELETE, "delete"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for Actions {
    type Err = AuthzError;

    /// Accepts `|`-separated names (`read|write`), case-insensitive, or `*`
    /// for all actions.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim() == "*" {
            return Ok(Actions::ALL);
        }
        let mut actions = Actions::NONE;
        for part in value.split('|') {
            actions |= match part.trim().to_ascii_lowercase().as_str() {
                "read" | "r" => Actions::READ,
                "write" | "w" => Actions::WRITE,
                "delete" | "d" => Actions::DELETE,
                _ => return Err(AuthzError::InvalidAction(part.to_string())),
            };
        }
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_values_are_stable() {
        assert_eq!(Actions::READ.bits(), 1);
        assert_eq!(Actions::WRITE.bits(), 2);
        assert_eq!(Actions::DELETE.bits(), 4);
        assert_eq!((Actions::READ | Actions::DELETE).bits(), 5);
    }

    #[test]
    fn subset_semantics() {
        let rw = Actions::READ | Actions::WRITE;
        assert!(rw.contains(Actions::READ));
        assert!(rw.contains(rw));
        assert!(!rw.contains(Actions::ALL));
        assert!(Actions::ALL.contains(Actions::DELETE));
    }

    #[test]
    fn parse_and_display() {
        let parsed: Actions = "Read|write".parse().expect("parse");
        assert_eq!(parsed, Actions::READ | Actions::WRITE);
        assert_eq!(parsed.to_string(), "read|write");
        assert_eq!("*".parse::<Actions>().expect("parse"), Actions::ALL);
        assert!(matches!(
            "read|execute".parse::<Actions>(),
            Err(AuthzError::InvalidAction(_))
        ));
        assert_eq!(Actions::NONE.to_string(), "none");
    }

    #[test]
    fn from_bits_rejects_unknown() {
        assert_eq!(Actions::from_bits(7).expect("bits"), Actions::ALL);
        assert!(Actions::from_bits(8).is_err());
    }
}
