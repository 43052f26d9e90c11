use super::codec::{
    CodecResult, Record, get_str, get_uuid, get_uuid_list, put_str, put_uuid, put_uuid_list,
};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub legal_status: String,
    /// Derived from clinic records; ignored on add and update.
    #[serde(default)]
    pub clinics: Vec<Uuid>,
}

impl Organization {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        legal_status: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            name: name.into(),
            address: address.into(),
            legal_status: legal_status.into(),
            clinics: Vec::new(),
        }
    }
}

impl Record for Organization {
    const VERSION: u8 = 1;

    fn encode_fields(&self, buf: &mut BytesMut) {
        put_uuid(buf, &self.id);
        put_str(buf, &self.name);
        put_str(buf, &self.address);
        put_str(buf, &self.legal_status);
        put_uuid_list(buf, &self.clinics);
    }

    fn decode_fields(buf: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            id: get_uuid(buf, "organization.id")?,
            name: get_str(buf, "organization.name")?,
            address: get_str(buf, "organization.address")?,
            legal_status: get_str(buf, "organization.legal_status")?,
            clinics: get_uuid_list(buf, "organization.clinics")?,
        })
    }
}
