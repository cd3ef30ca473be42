//! Text converters and the encodings they support.

use super::{Convert, Options, label, mismatch};
use crate::Result;
use crate::attribute::OptionValue;
use crate::error::{Error, ValidationErrorKind};
use crate::value::{SqlValue, Value};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// A byte encoding for [`Value::EncodedText`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    Utf8,
    /// ISO-8859-1: every byte is the code point of the same value
    Latin1,
    Ascii,
}

impl TextEncoding {
    pub const fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf8",
            TextEncoding::Latin1 => "latin1",
            TextEncoding::Ascii => "ascii",
        }
    }

    const fn max_code_point(self) -> u32 {
        match self {
            TextEncoding::Utf8 => char::MAX as u32,
            TextEncoding::Latin1 => 0xFF,
            TextEncoding::Ascii => 0x7F,
        }
    }

    /// Encode strictly. Returns the offending character on failure.
    pub fn encode(self, text: &str) -> std::result::Result<Vec<u8>, char> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            _ => text
                .chars()
                .map(|c| {
                    if u32::from(c) <= self.max_code_point() {
                        // Fits in one byte for both single-byte encodings.
                        u8::try_from(u32::from(c)).map_err(|_| c)
                    } else {
                        Err(c)
                    }
                })
                .collect(),
        }
    }

    /// Encode, substituting `?` for characters the encoding cannot hold.
    pub fn encode_lossy(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            _ => text
                .chars()
                .map(|c| {
                    if u32::from(c) <= self.max_code_point() {
                        u8::try_from(u32::from(c)).unwrap_or(b'?')
                    } else {
                        b'?'
                    }
                })
                .collect(),
        }
    }

    /// Decode strictly, returning `None` on an invalid byte sequence.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    /// Decode, substituting U+FFFD for invalid sequences.
    pub fn decode_lossy(self, bytes: &[u8]) -> Cow<'_, str> {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes),
            TextEncoding::Latin1 => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Ascii => Cow::Owned(
                bytes
                    .iter()
                    .map(|&b| {
                        if b.is_ascii() {
                            char::from(b)
                        } else {
                            char::REPLACEMENT_CHARACTER
                        }
                    })
                    .collect(),
            ),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "latin1" | "latin-1" | "iso-8859-1" | "iso8859-1" => Ok(TextEncoding::Latin1),
            "ascii" | "us-ascii" => Ok(TextEncoding::Ascii),
            _ => Err(format!("Unknown encoding {s:?}")),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read the optional max-length positional argument shared by both text
/// converters. Zero means no limit.
fn configure_max_len(opts: &Options<'_>) -> Result<Option<usize>> {
    let args = opts.args();
    let Some(first) = args.first() else {
        return Ok(None);
    };
    opts.reject_args(&args[1..])?;
    let OptionValue::Int(max_len) = first else {
        return Err(opts.config_error(format!(
            "Max length argument must be int. Got: {first}"
        )));
    };
    let max_len = usize::try_from(*max_len).map_err(|_| {
        opts.config_error(format!("Max length argument must not be negative. Got: {max_len}"))
    })?;
    Ok((max_len != 0).then_some(max_len))
}

fn check_length(attr: Option<&String>, max_len: Option<usize>, len: usize) -> Result<()> {
    if let Some(max_len) = max_len {
        if len > max_len {
            return Err(Error::validation(
                attr.cloned(),
                ValidationErrorKind::MaxLength,
                format!(
                    "Value for attribute {} is too long. Max length is {max_len}, value length is {len}",
                    label(attr)
                ),
            ));
        }
    }
    if len == 0 {
        return Err(Error::validation(
            attr.cloned(),
            ValidationErrorKind::Empty,
            "Empty strings are not allowed. Try using None instead",
        ));
    }
    Ok(())
}

fn varchar(max_len: Option<usize>) -> String {
    match max_len {
        Some(n) => format!("VARCHAR({n})"),
        None => "TEXT".to_string(),
    }
}

/// Unicode text, length counted in characters.
#[derive(Debug, Clone)]
pub struct UnicodeConverter {
    attr: Option<String>,
    max_len: Option<usize>,
}

impl UnicodeConverter {
    pub(crate) fn configure(opts: &mut Options<'_>) -> Result<Self> {
        Ok(Self {
            attr: opts.attr_name(),
            max_len: configure_max_len(opts)?,
        })
    }

    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }
}

impl Convert for UnicodeConverter {
    fn validate(&self, value: Value) -> Result<Value> {
        let text = match value {
            Value::Text(s) => s,
            Value::EncodedText(bytes) => TextEncoding::Ascii.decode(&bytes).ok_or_else(|| {
                Error::validation(
                    self.attr.clone(),
                    ValidationErrorKind::Encoding,
                    format!(
                        "Value for attribute {} is not valid ascii text",
                        label(self.attr.as_ref())
                    ),
                )
            })?,
            other => return Err(mismatch("unicode text", &other, self.attr.as_ref())),
        };
        check_length(self.attr.as_ref(), self.max_len, text.chars().count())?;
        Ok(Value::Text(text))
    }

    fn to_storage(&self, value: &Value) -> Result<SqlValue> {
        match value {
            Value::Text(s) => Ok(SqlValue::Text(s.clone())),
            other => Err(mismatch("unicode text", other, self.attr.as_ref())),
        }
    }

    fn from_storage(&self, value: SqlValue) -> Value {
        match value {
            SqlValue::Blob(bytes) => Value::Text(String::from_utf8_lossy(&bytes).into_owned()),
            other => Value::from(other),
        }
    }

    fn storage_type_name(&self) -> String {
        varchar(self.max_len)
    }
}

/// Text held as bytes in a declared encoding, length counted in bytes.
///
/// The encoding defaults to `latin1` for attributes and `ascii` for a
/// standalone converter.
#[derive(Debug, Clone)]
pub struct EncodedTextConverter {
    attr: Option<String>,
    max_len: Option<usize>,
    encoding: TextEncoding,
}

impl EncodedTextConverter {
    pub(crate) fn configure(opts: &mut Options<'_>) -> Result<Self> {
        let max_len = configure_max_len(opts)?;
        let encoding = if opts.is_standalone() {
            TextEncoding::Ascii
        } else {
            match opts.take("encoding") {
                None => TextEncoding::Latin1,
                Some(OptionValue::Text(name)) => name
                    .parse()
                    .map_err(|message: String| opts.config_error(message))?,
                Some(other) => {
                    return Err(opts.config_error(format!(
                        "'encoding' option for attribute {} must be a string. Got: {other}",
                        opts.attr_label()
                    )));
                }
            }
        };
        Ok(Self {
            attr: opts.attr_name(),
            max_len,
            encoding,
        })
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    fn encoding_error(&self) -> Error {
        Error::validation(
            self.attr.clone(),
            ValidationErrorKind::Encoding,
            format!(
                "Value for attribute {} is not representable in encoding {}",
                label(self.attr.as_ref()),
                self.encoding
            ),
        )
    }
}

impl Convert for EncodedTextConverter {
    fn validate(&self, value: Value) -> Result<Value> {
        let bytes = match value {
            Value::EncodedText(bytes) => bytes,
            Value::Text(s) => self
                .encoding
                .encode(&s)
                .map_err(|_| self.encoding_error())?,
            other => return Err(mismatch("encoded text", &other, self.attr.as_ref())),
        };
        check_length(self.attr.as_ref(), self.max_len, bytes.len())?;
        Ok(Value::EncodedText(bytes))
    }

    fn to_storage(&self, value: &Value) -> Result<SqlValue> {
        match value {
            Value::EncodedText(bytes) => self
                .encoding
                .decode(bytes)
                .map(SqlValue::Text)
                .ok_or_else(|| self.encoding_error()),
            Value::Text(s) => Ok(SqlValue::Text(s.clone())),
            other => Err(mismatch("encoded text", other, self.attr.as_ref())),
        }
    }

    fn from_storage(&self, value: SqlValue) -> Value {
        match value {
            SqlValue::Text(s) => Value::EncodedText(self.encoding.encode_lossy(&s)),
            SqlValue::Blob(bytes) => Value::EncodedText(bytes),
            other => Value::from(other),
        }
    }

    fn storage_type_name(&self) -> String {
        varchar(self.max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;
    use crate::convert::Converter;
    use crate::value::ValueKind;

    fn text(max_len: i64) -> Converter {
        Converter::for_attribute(&Attribute::new("Person", "name", ValueKind::Text).arg(max_len))
            .unwrap()
    }

    #[test]
    fn length_limit_is_inclusive() {
        let conv = text(5);
        assert_eq!(
            conv.validate(Value::from("héllo")).unwrap(),
            Value::from("héllo")
        );
        let err = conv.validate(Value::from("héllo!")).unwrap_err();
        assert_eq!(err.validation_kind(), Some(ValidationErrorKind::MaxLength));
        assert_eq!(
            err.to_string(),
            "Validation error: Value for attribute Person.name is too long. Max length is 5, value length is 6"
        );
    }

    #[test]
    fn empty_text_always_fails() {
        for conv in [text(5), text(0), Converter::standalone(ValueKind::Text).unwrap()] {
            let err = conv.validate(Value::from("")).unwrap_err();
            assert_eq!(err.validation_kind(), Some(ValidationErrorKind::Empty));
        }
    }

    #[test]
    fn zero_max_len_is_unbounded() {
        let conv = text(0);
        assert_eq!(conv.storage_type_name(), "TEXT");
        assert!(conv.validate(Value::from("x".repeat(10_000))).is_ok());
        assert_eq!(text(50).storage_type_name(), "VARCHAR(50)");
    }

    #[test]
    fn max_len_must_be_int() {
        let attr = Attribute::new("Person", "name", ValueKind::Text).arg("50");
        let err = Converter::for_attribute(&attr).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let attr = Attribute::new("Person", "name", ValueKind::Text).arg(-1);
        assert!(matches!(
            Converter::for_attribute(&attr).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn unicode_accepts_ascii_bytes_only() {
        let conv = text(10);
        assert_eq!(
            conv.validate(Value::EncodedText(b"abc".to_vec())).unwrap(),
            Value::from("abc")
        );
        let err = conv
            .validate(Value::EncodedText(vec![0x61, 0xE9]))
            .unwrap_err();
        assert_eq!(err.validation_kind(), Some(ValidationErrorKind::Encoding));
        assert!(conv.validate(Value::Int(3)).unwrap_err().is_type_mismatch());
    }

    #[test]
    fn unicode_decodes_blob_lossily() {
        let conv = text(0);
        assert_eq!(
            conv.from_storage(SqlValue::Blob(vec![0x61, 0xFF])),
            Value::Text("a\u{FFFD}".into())
        );
    }

    #[test]
    fn encoded_text_defaults_to_latin1() {
        let attr = Attribute::new("Doc", "title", ValueKind::EncodedText);
        let conv = Converter::for_attribute(&attr).unwrap();

        let validated = conv.validate(Value::from("café")).unwrap();
        assert_eq!(validated, Value::EncodedText(vec![b'c', b'a', b'f', 0xE9]));
        assert_eq!(
            conv.to_storage(&validated).unwrap(),
            SqlValue::Text("café".into())
        );
        assert_eq!(
            conv.from_storage(SqlValue::Text("café€".into())),
            Value::EncodedText(vec![b'c', b'a', b'f', 0xE9, b'?'])
        );
    }

    #[test]
    fn encoded_text_rejects_unencodable() {
        let attr = Attribute::new("Doc", "title", ValueKind::EncodedText).option("encoding", "ascii");
        let conv = Converter::for_attribute(&attr).unwrap();
        let err = conv.validate(Value::from("café")).unwrap_err();
        assert_eq!(err.validation_kind(), Some(ValidationErrorKind::Encoding));
    }

    #[test]
    fn encoded_length_counts_bytes() {
        let attr = Attribute::new("Doc", "title", ValueKind::EncodedText)
            .arg(4)
            .option("encoding", "utf-8");
        let conv = Converter::for_attribute(&attr).unwrap();
        assert!(conv.validate(Value::from("éé")).is_ok());
        assert!(conv.validate(Value::from("ééé")).unwrap_err().is_validation());
    }

    #[test]
    fn unknown_encoding_is_config_error() {
        let attr = Attribute::new("Doc", "title", ValueKind::EncodedText).option("encoding", "ebcdic");
        assert!(matches!(
            Converter::for_attribute(&attr).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn standalone_encoded_is_ascii() {
        let conv = Converter::standalone(ValueKind::EncodedText).unwrap();
        assert!(conv.validate(Value::from("é")).unwrap_err().is_validation());
        assert_eq!(
            conv.to_storage(&Value::EncodedText(vec![0x80])).unwrap_err().validation_kind(),
            Some(ValidationErrorKind::Encoding)
        );
    }

    #[test]
    fn encoding_names() {
        assert_eq!("UTF-8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("ISO-8859-1".parse::<TextEncoding>().unwrap(), TextEncoding::Latin1);
        assert_eq!("latin_1".parse::<TextEncoding>().unwrap(), TextEncoding::Latin1);
        assert!("koi8-r".parse::<TextEncoding>().is_err());
    }
}
