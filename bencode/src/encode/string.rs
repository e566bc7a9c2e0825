use serde::ser::{self, Impossible};
use crate::Error;

// Bencode dictionary keys must be byte strings - nothing else is a valid
// key. This serializer exists only to pull the raw bytes out of a key
// (`&'static str` struct field names, `String`/`&str` map keys) without
// bencode-framing them; framing happens once, when `Encoder` writes the
// sorted key/value pairs to the buffer.
pub struct StringSerializer;

impl ser::Serializer for &mut StringSerializer {
    type Ok = Vec<u8>;
    type Error = Error;

    type SerializeSeq           = Impossible<Vec<u8>, Error>;
    type SerializeTuple         = Impossible<Vec<u8>, Error>;
    type SerializeTupleStruct   = Impossible<Vec<u8>, Error>;
    type SerializeTupleVariant  = Impossible<Vec<u8>, Error>;
    type SerializeMap           = Impossible<Vec<u8>, Error>;
    type SerializeStruct        = Impossible<Vec<u8>, Error>;
    type SerializeStructVariant = Impossible<Vec<u8>, Error>;

    fn serialize_str(self, v: &str) -> Result<Self::Ok, Self::Error> {
        Ok(v.as_bytes().to_vec())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Self::Ok, Self::Error> {
        Ok(v.to_vec())
    }

    fn serialize_char(self, v: char) -> Result<Self::Ok, Self::Error> {
        let mut buf = [0; 4];
        self.serialize_str(v.encode_utf8(&mut buf))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: ?Sized>(self, _name: &'static str, value: &T) -> Result<Self::Ok, Self::Error>
        where T: serde::Serialize
    {
        value.serialize(self)
    }

    fn serialize_bool(self, _: bool) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("bool is not a valid dictionary key".to_string()))
    }

    fn serialize_i8(self, _: i8) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("i8 is not a valid dictionary key".to_string()))
    }

    fn serialize_i16(self, _: i16) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("i16 is not a valid dictionary key".to_string()))
    }

    fn serialize_i32(self, _: i32) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("i32 is not a valid dictionary key".to_string()))
    }

    fn serialize_i64(self, _: i64) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("i64 is not a valid dictionary key".to_string()))
    }

    fn serialize_u8(self, _: u8) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("u8 is not a valid dictionary key".to_string()))
    }

    fn serialize_u16(self, _: u16) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("u16 is not a valid dictionary key".to_string()))
    }

    fn serialize_u32(self, _: u32) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("u32 is not a valid dictionary key".to_string()))
    }

    fn serialize_u64(self, _: u64) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("u64 is not a valid dictionary key".to_string()))
    }

    fn serialize_f32(self, _: f32) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("f32 is not a valid dictionary key".to_string()))
    }

    fn serialize_f64(self, _: f64) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("f64 is not a valid dictionary key".to_string()))
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("none is not a valid dictionary key".to_string()))
    }

    fn serialize_some<T: ?Sized>(self, _: &T) -> Result<Self::Ok, Self::Error>
        where T: serde::Serialize
    {
        Err(Error::InvalidType("option is not a valid dictionary key".to_string()))
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("unit is not a valid dictionary key".to_string()))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType("unit struct is not a valid dictionary key".to_string()))
    }

    fn serialize_newtype_variant<T: ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Self::Ok, Self::Error>
        where T: serde::Serialize
    {
        Err(Error::InvalidType("newtype variant is not a valid dictionary key".to_string()))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(Error::InvalidType("sequence is not a valid dictionary key".to_string()))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(Error::InvalidType("tuple is not a valid dictionary key".to_string()))
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(Error::InvalidType("tuple struct is not a valid dictionary key".to_string()))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(Error::InvalidType("tuple variant is not a valid dictionary key".to_string()))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(Error::InvalidType("map is not a valid dictionary key".to_string()))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct, Self::Error> {
        Err(Error::InvalidType("struct is not a valid dictionary key".to_string()))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(Error::InvalidType("struct variant is not a valid dictionary key".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[test]
    fn str_key_serializes_to_raw_bytes() {
        let bytes = "name".serialize(&mut StringSerializer).unwrap();
        assert_eq!(bytes, b"name".to_vec());
    }

    #[test]
    fn non_string_key_is_rejected() {
        let err = 42i64.serialize(&mut StringSerializer).unwrap_err();
        assert!(matches!(err, Error::InvalidType(_)));
    }
}
