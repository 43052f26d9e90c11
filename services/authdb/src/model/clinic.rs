use super::codec::{CodecResult, Record, get_str, get_uuid, put_str, put_uuid};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A clinic belongs to exactly one organization and one location. Its name
/// is unique within that pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    pub organization_id: Uuid,
    pub location_id: Uuid,
}

impl Clinic {
    pub fn new(name: impl Into<String>, organization_id: Uuid, location_id: Uuid) -> Self {
        Self {
            id: Uuid::nil(),
            name: name.into(),
            organization_id,
            location_id,
        }
    }
}

impl Record for Clinic {
    const VERSION: u8 = 1;

    fn encode_fields(&self, buf: &mut BytesMut) {
        put_uuid(buf, &self.id);
        put_str(buf, &self.name);
        put_uuid(buf, &self.organization_id);
        put_uuid(buf, &self.location_id);
    }

    fn decode_fields(buf: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            id: get_uuid(buf, "clinic.id")?,
            name: get_str(buf, "clinic.name")?,
            organization_id: get_uuid(buf, "clinic.organization_id")?,
            location_id: get_uuid(buf, "clinic.location_id")?,
        })
    }
}
