use super::codec::{
    CodecResult, Record, get_bool, get_str, get_uuid, get_uuid_list, put_bool, put_str, put_uuid,
    put_uuid_list,
};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub city: String,
    pub country: String,
    pub has_electricity: bool,
    pub has_internet: bool,
    /// Derived from clinic records; ignored on add and update.
    #[serde(default)]
    pub clinics: Vec<Uuid>,
}

impl Location {
    pub fn new(name: impl Into<String>, city: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            name: name.into(),
            city: city.into(),
            country: country.into(),
            has_electricity: true,
            has_internet: true,
            clinics: Vec::new(),
        }
    }
}

impl Record for Location {
    const VERSION: u8 = 1;

    fn encode_fields(&self, buf: &mut BytesMut) {
        put_uuid(buf, &self.id);
        put_str(buf, &self.name);
        put_str(buf, &self.city);
        put_str(buf, &self.country);
        put_bool(buf, self.has_electricity);
        put_bool(buf, self.has_internet);
        put_uuid_list(buf, &self.clinics);
    }

    fn decode_fields(buf: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            id: get_uuid(buf, "location.id")?,
            name: get_str(buf, "location.name")?,
            city: get_str(buf, "location.city")?,
            country: get_str(buf, "location.country")?,
            has_electricity: get_bool(buf, "location.has_electricity")?,
            has_internet: get_bool(buf, "location.has_internet")?,
            clinics: get_uuid_list(buf, "location.clinics")?,
        })
    }
}
