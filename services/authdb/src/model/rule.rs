//! Stored policy rules.
use super::codec::{CodecError, CodecResult, Record, get_bool, get_str, get_u8, get_uuid, put_bool, put_str, put_uuid};
use bytes::{BufMut, Bytes, BytesMut};
use carebridge_authz::{Actions, Effect, PolicyRule};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `subject` (a user or role ID) may, or with `deny` may not, perform
/// `actions` on resources matching `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub subject: Uuid,
    pub resource: String,
    pub actions: Actions,
    pub deny: bool,
}

impl Rule {
    pub fn allow(subject: Uuid, resource: impl Into<String>, actions: Actions) -> Self {
        Self {
            id: Uuid::nil(),
            subject,
            resource: resource.into(),
            actions,
            deny: false,
        }
    }

    pub fn deny(subject: Uuid, resource: impl Into<String>, actions: Actions) -> Self {
        Self {
            deny: true,
            ..Self::allow(subject, resource, actions)
        }
    }

    pub fn effect(&self) -> Effect {
        if self.deny { Effect::Deny } else { Effect::Allow }
    }

    pub fn to_policy(&self) -> PolicyRule {
        PolicyRule::new(
            self.subject.to_string(),
            self.resource.clone(),
            self.actions,
            self.effect(),
        )
    }
}

impl Record for Rule {
    const VERSION: u8 = 1;

    fn encode_fields(&self, buf: &mut BytesMut) {
        put_uuid(buf, &self.id);
        put_uuid(buf, &self.subject);
        put_str(buf, &self.resource);
        buf.put_u8(self.actions.bits());
        put_bool(buf, self.deny);
    }

    fn decode_fields(buf: &mut Bytes) -> CodecResult<Self> {
        let id = get_uuid(buf, "rule.id")?;
        let subject = get_uuid(buf, "rule.subject")?;
        let resource = get_str(buf, "rule.resource")?;
        let bits = get_u8(buf, "rule.actions")?;
        let actions = Actions::from_bits(bits).map_err(|_| CodecError::InvalidValue {
            field: "rule.actions",
            value: bits.to_string(),
        })?;
        Ok(Self {
            id,
            subject,
            resource,
            actions,
            deny: get_bool(buf, "rule.deny")?,
        })
    }
}
