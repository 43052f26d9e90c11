//! User records.
use super::codec::{CodecResult, Record, get_str, get_uuid, put_str, put_uuid};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// bcrypt hash; never serialized outward.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

/// Input for `AuthStore::add_user`. The password is hashed before storage.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

impl Record for User {
    const VERSION: u8 = 1;

    fn encode_fields(&self, buf: &mut BytesMut) {
        put_uuid(buf, &self.id);
        put_str(buf, &self.username);
        put_str(buf, &self.email);
        put_str(buf, &self.password_hash);
    }

    fn decode_fields(buf: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            id: get_uuid(buf, "user.id")?,
            username: get_str(buf, "user.username")?,
            email: get_str(buf, "user.email")?,
            password_hash: get_str(buf, "user.password_hash")?,
        })
    }
}
