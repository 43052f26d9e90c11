//! Binary record codec for values stored in the authdb buckets.
//!
//! Every record is `version: u8` followed by its fields in declaration order.
//! Integers are big-endian; strings and byte runs carry a `u32` length prefix;
//! UUIDs are their 16 raw bytes.
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("record truncated while reading {0}")]
    Incomplete(&'static str),
    #[error("unsupported record version {actual} (expected {expected})")]
    UnsupportedVersion { expected: u8, actual: u8 },
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("{0} trailing bytes after record")]
    Trailing(usize),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// A value that can live in a bucket.
pub trait Record: Sized {
    const VERSION: u8;

    fn encode_fields(&self, buf: &mut BytesMut);

    fn decode_fields(buf: &mut Bytes) -> CodecResult<Self>;

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(Self::VERSION);
        self.encode_fields(&mut buf);
        buf.freeze()
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut buf = Bytes::copy_from_slice(bytes);
        if buf.remaining() < 1 {
            return Err(CodecError::Incomplete("version"));
        }
        let version = buf.get_u8();
        if version != Self::VERSION {
            return Err(CodecError::UnsupportedVersion {
                expected: Self::VERSION,
                actual: version,
            });
        }
        let record = Self::decode_fields(&mut buf)?;
        if buf.has_remaining() {
            return Err(CodecError::Trailing(buf.remaining()));
        }
        Ok(record)
    }
}

pub(crate) fn put_str(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

pub(crate) fn get_str(buf: &mut Bytes, field: &'static str) -> CodecResult<String> {
    if buf.remaining() < 4 {
        return Err(CodecError::Incomplete(field));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(CodecError::Incomplete(field));
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8(field))
}

pub(crate) fn put_uuid(buf: &mut BytesMut, value: &Uuid) {
    buf.put_slice(value.as_bytes());
}

pub(crate) fn get_uuid(buf: &mut Bytes, field: &'static str) -> CodecResult<Uuid> {
    if buf.remaining() < 16 {
        return Err(CodecError::Incomplete(field));
    }
    let mut raw = [0u8; 16];
    buf.copy_to_slice(&mut raw);
    Ok(Uuid::from_bytes(raw))
}

pub(crate) fn put_uuid_list(buf: &mut BytesMut, values: &[Uuid]) {
    buf.put_u32(values.len() as u32);
    for value in values {
        put_uuid(buf, value);
    }
}

pub(crate) fn get_uuid_list(buf: &mut Bytes, field: &'static str) -> CodecResult<Vec<Uuid>> {
    if buf.remaining() < 4 {
        return Err(CodecError::Incomplete(field));
    }
    let count = buf.get_u32() as usize;
    if buf.remaining() < count.saturating_mul(16) {
        return Err(CodecError::Incomplete(field));
    }
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(get_uuid(buf, field)?);
    }
    Ok(values)
}

pub(crate) fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

pub(crate) fn get_bool(buf: &mut Bytes, field: &'static str) -> CodecResult<bool> {
    if buf.remaining() < 1 {
        return Err(CodecError::Incomplete(field));
    }
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CodecError::InvalidValue {
            field,
            value: other.to_string(),
        }),
    }
}

pub(crate) fn get_u8(buf: &mut Bytes, field: &'static str) -> CodecResult<u8> {
    if buf.remaining() < 1 {
        return Err(CodecError::Incomplete(field));
    }
    Ok(buf.get_u8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Sample {
        id: Uuid,
        name: String,
        flag: bool,
        refs: Vec<Uuid>,
    }

    impl Record for Sample {
        const VERSION: u8 = 3;

        fn encode_fields(&self, buf: &mut BytesMut) {
            put_uuid(buf, &self.id);
            put_str(buf, &self.name);
            put_bool(buf, self.flag);
            put_uuid_list(buf, &self.refs);
        }

        fn decode_fields(buf: &mut Bytes) -> CodecResult<Self> {
            Ok(Self {
                id: get_uuid(buf, "id")?,
                name: get_str(buf, "name")?,
                flag: get_bool(buf, "flag")?,
                refs: get_uuid_list(buf, "refs")?,
            })
        }
    }

    fn sample() -> Sample {
        Sample {
            id: Uuid::new_v4(),
            name: "Klinik Süd".to_string(),
            flag: true,
            refs: vec![Uuid::new_v4(), Uuid::new_v4()],
        }
    }

    #[test]
    fn layout_is_versioned_and_length_prefixed() {
        let record = sample();
        let encoded = record.encode();
        assert_eq!(encoded[0], 3);
        assert_eq!(&encoded[1..17], record.id.as_bytes());
        let name_len = u32::from_be_bytes([encoded[17], encoded[18], encoded[19], encoded[20]]);
        assert_eq!(name_len as usize, record.name.len());
        assert_eq!(Sample::decode(&encoded).expect("decode"), record);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut encoded = sample().encode().to_vec();
        encoded[0] = 9;
        assert_eq!(
            Sample::decode(&encoded),
            Err(CodecError::UnsupportedVersion {
                expected: 3,
                actual: 9
            })
        );
    }

    #[test]
    fn rejects_truncation_and_trailing_bytes() {
        let encoded = sample().encode().to_vec();
        assert!(matches!(
            Sample::decode(&encoded[..encoded.len() - 1]),
            Err(CodecError::Incomplete("refs"))
        ));
        let mut extended = encoded.clone();
        extended.push(0);
        assert_eq!(Sample::decode(&extended), Err(CodecError::Trailing(1)));
        assert!(matches!(Sample::decode(&[]), Err(CodecError::Incomplete("version"))));
    }

    #[test]
    fn rejects_invalid_bool() {
        let mut encoded = sample().encode().to_vec();
        // version + uuid + len + name
        let flag_at = 1 + 16 + 4 + "Klinik Süd".len();
        encoded[flag_at] = 7;
        assert!(matches!(
            Sample::decode(&encoded),
            Err(CodecError::InvalidValue { field: "flag", .. })
        ));
    }
}
