use log::warn;

use crate::error::ParseError;

// DLMS data type tags actually seen in push telegrams
const TAG_NULL: u8 = 0x00;
const TAG_ARRAY: u8 = 0x01;
const TAG_STRUCTURE: u8 = 0x02;
const TAG_I32: u8 = 0x05;
const TAG_U32: u8 = 0x06;
const TAG_OCTET_STRING: u8 = 0x09;
const TAG_STRING: u8 = 0x0A;
const TAG_I8: u8 = 0x0F;
const TAG_I16: u8 = 0x10;
const TAG_U8: u8 = 0x11;
const TAG_U16: u8 = 0x12;
const TAG_ENUM: u8 = 0x16;

/// One node of a parsed DLMS data tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DlmsValue {
    Array(Vec<DlmsValue>),
    Structure(Vec<DlmsValue>),
    OctetString(Vec<u8>),
    Text(String),
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    I16(i16),
    I32(i32),
    Enum(u8),
    Null,
}

impl DlmsValue {
    /// Numeric view of the integer and enum variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DlmsValue::U8(v) => Some(*v as f64),
            DlmsValue::U16(v) => Some(*v as f64),
            DlmsValue::U32(v) => Some(*v as f64),
            DlmsValue::I8(v) => Some(*v as f64),
            DlmsValue::I16(v) => Some(*v as f64),
            DlmsValue::I32(v) => Some(*v as f64),
            DlmsValue::Enum(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DlmsValue::U8(v) => Some(*v as i64),
            DlmsValue::U16(v) => Some(*v as i64),
            DlmsValue::U32(v) => Some(*v as i64),
            DlmsValue::I8(v) => Some(*v as i64),
            DlmsValue::I16(v) => Some(*v as i64),
            DlmsValue::I32(v) => Some(*v as i64),
            DlmsValue::Enum(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// The children of an array or structure.
    pub fn entries(&self) -> Option<&[DlmsValue]> {
        match self {
            DlmsValue::Array(items) | DlmsValue::Structure(items) => Some(items),
            _ => None,
        }
    }

    pub fn octets(&self) -> Option<&[u8]> {
        match self {
            DlmsValue::OctetString(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            DlmsValue::Array(_) => "array",
            DlmsValue::Structure(_) => "structure",
            DlmsValue::OctetString(_) => "octet_string",
            DlmsValue::Text(_) => "string",
            DlmsValue::U8(_) => "u8",
            DlmsValue::U16(_) => "u16",
            DlmsValue::U32(_) => "u32",
            DlmsValue::I8(_) => "i8",
            DlmsValue::I16(_) => "i16",
            DlmsValue::I32(_) => "i32",
            DlmsValue::Enum(_) => "enum",
            DlmsValue::Null => "null",
        }
    }
}

/// Tag/length/value decoder for the DLMS subset carried by push telegrams.
pub struct DlmsParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DlmsParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Parse one value. Reading a value from an exhausted buffer yields
    /// `Null`; a truncated value inside the buffer is an error.
    pub fn parse_value(&mut self) -> Result<DlmsValue, ParseError> {
        if self.pos >= self.data.len() {
            return Ok(DlmsValue::Null);
        }
        let tag = self.data[self.pos];
        self.pos += 1;

        match tag {
            TAG_NULL => Ok(DlmsValue::Null),
            TAG_ARRAY => {
                let count = self.parse_count()?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.parse_value()?);
                }
                Ok(DlmsValue::Array(items))
            }
            TAG_STRUCTURE => {
                let count = self.parse_count()?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.parse_value()?);
                }
                Ok(DlmsValue::Structure(items))
            }
            TAG_OCTET_STRING => {
                let len = self.parse_count()?;
                Ok(DlmsValue::OctetString(self.take(len)?.to_vec()))
            }
            TAG_STRING => {
                let len = self.parse_count()?;
                let bytes = self.take(len)?;
                Ok(DlmsValue::Text(
                    String::from_utf8_lossy(bytes).into_owned(),
                ))
            }
            TAG_U8 => Ok(DlmsValue::U8(self.take(1)?[0])),
            TAG_U16 => {
                let b = self.take(2)?;
                Ok(DlmsValue::U16(u16::from_be_bytes([b[0], b[1]])))
            }
            TAG_U32 => {
                let b = self.take(4)?;
                Ok(DlmsValue::U32(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
            }
            TAG_I8 => Ok(DlmsValue::I8(self.take(1)?[0] as i8)),
            TAG_I16 => {
                let b = self.take(2)?;
                Ok(DlmsValue::I16(i16::from_be_bytes([b[0], b[1]])))
            }
            TAG_I32 => {
                let b = self.take(4)?;
                Ok(DlmsValue::I32(i32::from_be_bytes([b[0], b[1], b[2], b[3]])))
            }
            TAG_ENUM => Ok(DlmsValue::Enum(self.take(1)?[0])),
            other => {
                warn!("unknown DLMS data type 0x{:02x} at offset {}", other, self.pos - 1);
                Err(ParseError::Decode(format!(
                    "unknown DLMS data type 0x{:02x}",
                    other
                )))
            }
        }
    }

    /// The shared variable-length object count: a plain byte below 0x81, or
    /// a 0x81/0x82/0x83 prefix selecting a 1/2/4-byte big-endian count.
    fn parse_count(&mut self) -> Result<usize, ParseError> {
        let first = self.take(1)?[0];
        if first < 0x81 {
            return Ok(first as usize);
        }
        match first {
            0x81 => Ok(self.take(1)?[0] as usize),
            0x82 => {
                let b = self.take(2)?;
                Ok(u16::from_be_bytes([b[0], b[1]]) as usize)
            }
            0x83 => {
                let b = self.take(4)?;
                Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
            }
            other => Err(ParseError::Decode(format!(
                "invalid object count prefix 0x{:02x}",
                other
            ))),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        if self.pos + len > self.data.len() {
            return Err(ParseError::Decode("unexpected end of data".to_string()));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integers() {
        let mut parser = DlmsParser::new(&[0x12, 0x08, 0x99]);
        assert_eq!(parser.parse_value().unwrap(), DlmsValue::U16(0x0899));

        let mut parser = DlmsParser::new(&[0x10, 0xFF, 0x38]);
        assert_eq!(parser.parse_value().unwrap(), DlmsValue::I16(-200));

        let mut parser = DlmsParser::new(&[0x0F, 0xFF]);
        assert_eq!(parser.parse_value().unwrap(), DlmsValue::I8(-1));

        let mut parser = DlmsParser::new(&[0x06, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(parser.parse_value().unwrap(), DlmsValue::U32(65536));
    }

    #[test]
    fn test_parse_structure_with_octet_string() {
        let data = [
            0x02, 0x02, /* structure of 2 */
            0x09, 0x06, 0x01, 0x00, 0x01, 0x08, 0x00, 0xFF, /* octet string */
            0x11, 0x2A, /* u8 42 */
        ];
        let mut parser = DlmsParser::new(&data);
        let value = parser.parse_value().unwrap();
        let entries = value.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].octets().unwrap(), &[0x01, 0x00, 0x01, 0x08, 0x00, 0xFF]);
        assert_eq!(entries[1], DlmsValue::U8(42));
        assert_eq!(parser.position(), data.len());
    }

    #[test]
    fn test_object_count_encodings() {
        /* 0x81: one length byte follows */
        let mut data = vec![0x09, 0x81, 0x82];
        data.extend(std::iter::repeat(0xAB).take(0x82));
        let mut parser = DlmsParser::new(&data);
        match parser.parse_value().unwrap() {
            DlmsValue::OctetString(bytes) => assert_eq!(bytes.len(), 0x82),
            other => panic!("expected octet string, got {:?}", other),
        }

        /* 0x82: two big-endian length bytes follow */
        let mut data = vec![0x09, 0x82, 0x01, 0x00];
        data.extend(std::iter::repeat(0xCD).take(0x100));
        let mut parser = DlmsParser::new(&data);
        match parser.parse_value().unwrap() {
            DlmsValue::OctetString(bytes) => assert_eq!(bytes.len(), 0x100),
            other => panic!("expected octet string, got {:?}", other),
        }

        /* anything else at or above 0x81 fails */
        let mut parser = DlmsParser::new(&[0x09, 0x85, 0x01]);
        assert!(parser.parse_value().is_err());
    }

    #[test]
    fn test_unknown_tag_fails() {
        let mut parser = DlmsParser::new(&[0x42, 0x00]);
        assert!(matches!(
            parser.parse_value(),
            Err(ParseError::Decode(_))
        ));
    }

    #[test]
    fn test_exhausted_buffer_is_null() {
        let mut parser = DlmsParser::new(&[]);
        assert_eq!(parser.parse_value().unwrap(), DlmsValue::Null);
    }

    #[test]
    fn test_truncated_value_fails() {
        let mut parser = DlmsParser::new(&[0x12, 0x01]);
        assert!(parser.parse_value().is_err());

        let mut parser = DlmsParser::new(&[0x09, 0x05, 0x01, 0x02]);
        assert!(parser.parse_value().is_err());
    }

    #[test]
    fn test_enum_and_string() {
        let mut parser = DlmsParser::new(&[0x16, 0x1E]);
        assert_eq!(parser.parse_value().unwrap(), DlmsValue::Enum(30));

        let mut parser = DlmsParser::new(&[0x0A, 0x04, b'p', b'u', b's', b'h']);
        assert_eq!(
            parser.parse_value().unwrap(),
            DlmsValue::Text("push".to_string())
        );
    }
}
