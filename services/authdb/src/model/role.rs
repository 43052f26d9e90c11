//! Role records and the built-in roles every store carries.
use super::codec::{CodecResult, Record, get_str, get_uuid, put_str, put_uuid};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
}

impl Role {
    /// A role not yet stored; `add_role` assigns the ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            name: name.into(),
        }
    }
}

impl Record for Role {
    const VERSION: u8 = 1;

    fn encode_fields(&self, buf: &mut BytesMut) {
        put_uuid(buf, &self.id);
        put_str(buf, &self.name);
    }

    fn decode_fields(buf: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            id: get_uuid(buf, "role.id")?,
            name: get_str(buf, "role.name")?,
        })
    }
}

/// Roles seeded into every read-write store. The IDs are fixed so that edge
/// and cloud stores created independently agree on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinRole {
    Everyone,
    Superadmin,
    Member,
    Author,
}

impl BuiltinRole {
    pub const ALL: [BuiltinRole; 4] = [
        BuiltinRole::Everyone,
        BuiltinRole::Superadmin,
        BuiltinRole::Member,
        BuiltinRole::Author,
    ];

    pub const fn id(self) -> Uuid {
        match self {
            BuiltinRole::Everyone => Uuid::from_u128(0x6a1f_0c52_9e1b_4c1e_8a3d_0000_0000_0001),
            BuiltinRole::Superadmin => Uuid::from_u128(0x6a1f_0c52_9e1b_4c1e_8a3d_0000_0000_0002),
            BuiltinRole::Member => Uuid::from_u128(0x6a1f_0c52_9e1b_4c1e_8a3d_0000_0000_0003),
            BuiltinRole::Author => Uuid::from_u128(0x6a1f_0c52_9e1b_4c1e_8a3d_0000_0000_0004),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            BuiltinRole::Everyone => "Everyone",
            BuiltinRole::Superadmin => "Superadmin",
            BuiltinRole::Member => "Member",
            BuiltinRole::Author => "Author",
        }
    }

    /// Protected roles can never be removed.
    pub const fn is_protected(self) -> bool {
        matches!(self, BuiltinRole::Everyone | BuiltinRole::Superadmin)
    }

    pub fn from_id(id: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.id() == id)
    }

    pub fn role(self) -> Role {
        Role {
            id: self.id(),
            name: self.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_distinct_and_resolvable() {
        for role in BuiltinRole::ALL {
            assert_eq!(BuiltinRole::from_id(role.id()), Some(role));
        }
        assert_eq!(BuiltinRole::from_id(Uuid::new_v4()), None);
        assert!(BuiltinRole::Everyone.is_protected());
        assert!(!BuiltinRole::Author.is_protected());
    }
}
