//! Field and method descriptor parsing.
use std::fmt;
use std::sync::OnceLock;

use regex::bytes::Regex;

use crate::error::StructuralError;
use crate::reader::ByteReader;

type Result<T> = std::result::Result<T, StructuralError>;

/// Type of a field, parameter, or non-void return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Object(Vec<u8>),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Returns the size in words of a given type.
    pub fn size(&self) -> usize {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Byte => write!(f, "byte"),
            Self::Char => write!(f, "char"),
            Self::Double => write!(f, "double"),
            Self::Float => write!(f, "float"),
            Self::Int => write!(f, "int"),
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
            Self::Boolean => write!(f, "boolean"),
            Self::Object(name) => write!(f, "{}", String::from_utf8_lossy(name).replace('/', ".")),
            Self::Array(element) => write!(f, "{element}[]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Void,
    Value(FieldType),
}

/// Parsed form of a method descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub params: Vec<FieldType>,
    pub ret: ReturnType,
}

impl MethodSignature {
    /// Parses a descriptor such as `(ILjava/lang/String;)V`.
    pub fn parse(descriptor: &[u8]) -> Result<Self> {
        static METHOD_TYPES: OnceLock<Regex> = OnceLock::new();
        let re = METHOD_TYPES.get_or_init(|| {
            Regex::new(r"^\(([^)]*)\)(.+)$").expect("method descriptor pattern")
        });
        let malformed = || StructuralError::MalformedDescriptor(lossy(descriptor));
        let caps = re.captures(descriptor).ok_or_else(malformed)?;
        let arg_bytes = caps.get(1).map_or(&b""[..], |m| m.as_bytes());
        let ret_bytes = caps.get(2).map_or(&b""[..], |m| m.as_bytes());

        let mut params = Vec::new();
        let mut args = ByteReader::new(arg_bytes);
        while !args.is_empty() {
            params.push(read_field_type(&mut args).map_err(|_| malformed())?);
        }

        let ret = if ret_bytes == b"V" {
            ReturnType::Void
        } else {
            ReturnType::Value(parse_field_type(ret_bytes).map_err(|_| malformed())?)
        };
        Ok(Self { params, ret })
    }

    /// Number of local variable slots the parameters occupy.
    pub fn param_slots(&self) -> usize {
        self.params.iter().map(FieldType::size).sum()
    }
}

/// Text of a method descriptor before the closing parenthesis. Overload
/// resolution compares these prefixes.
pub fn params_prefix(descriptor: &[u8]) -> &[u8] {
    descriptor
        .iter()
        .position(|&b| b == b')')
        .map_or(descriptor, |end| &descriptor[..end])
}

/// Parses a complete field descriptor such as `Ljava/io/PrintStream;`.
pub fn parse_field_type(descriptor: &[u8]) -> Result<FieldType> {
    let mut reader = ByteReader::new(descriptor);
    let field = read_field_type(&mut reader)?;
    if !reader.is_empty() {
        return Err(StructuralError::MalformedDescriptor(lossy(descriptor)));
    }
    Ok(field)
}

fn read_field_type(reader: &mut ByteReader) -> Result<FieldType> {
    let code = reader.read_u8()?;
    let field = match code {
        b'B' => FieldType::Byte,
        b'C' => FieldType::Char,
        b'D' => FieldType::Double,
        b'F' => FieldType::Float,
        b'I' => FieldType::Int,
        b'J' => FieldType::Long,
        b'S' => FieldType::Short,
        b'Z' => FieldType::Boolean,
        b'L' => {
            let name = reader.read_until(b';')?;
            if name.is_empty() {
                return Err(StructuralError::MalformedDescriptor("L;".into()));
            }
            FieldType::Object(name)
        }
        b'[' => FieldType::Array(Box::new(read_field_type(reader)?)),
        other => {
            return Err(StructuralError::MalformedDescriptor(
                (other as char).to_string(),
            ))
        }
    };
    Ok(field)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitive_and_reference_parameters() {
        let signature = MethodSignature::parse(b"(BCDFIJSZLjava/lang/String;)I").unwrap();
        assert_eq!(
            signature.params,
            vec![
                FieldType::Byte,
                FieldType::Char,
                FieldType::Double,
                FieldType::Float,
                FieldType::Int,
                FieldType::Long,
                FieldType::Short,
                FieldType::Boolean,
                FieldType::Object(b"java/lang/String".to_vec()),
            ]
        );
        assert_eq!(signature.ret, ReturnType::Value(FieldType::Int));
        assert_eq!(signature.param_slots(), 11);
    }

    #[test]
    fn parses_main_signature() {
        let signature = MethodSignature::parse(b"([Ljava/lang/String;)V").unwrap();
        assert_eq!(
            signature.params,
            vec![FieldType::Array(Box::new(FieldType::Object(
                b"java/lang/String".to_vec()
            )))]
        );
        assert_eq!(signature.ret, ReturnType::Void);
        assert_eq!(signature.params[0].to_string(), "java.lang.String[]");
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for descriptor in [
            &b"I)V"[..],
            b"(I",
            b"(Q)V",
            b"(Ljava/lang/String)V",
            b"()",
            b"()VV",
            b"(V)V",
            b"(L;)V",
        ] {
            assert!(
                matches!(
                    MethodSignature::parse(descriptor),
                    Err(StructuralError::MalformedDescriptor(_))
                ),
                "{}",
                String::from_utf8_lossy(descriptor)
            );
        }
    }

    #[test]
    fn field_descriptors_must_be_complete() {
        assert_eq!(
            parse_field_type(b"Ljava/io/PrintStream;").unwrap(),
            FieldType::Object(b"java/io/PrintStream".to_vec())
        );
        assert!(parse_field_type(b"II").is_err());
        assert!(parse_field_type(b"").is_err());
    }

    #[test]
    fn prefix_stops_at_closing_parenthesis() {
        assert_eq!(params_prefix(b"(I)V"), b"(I");
        assert_eq!(params_prefix(b"(Ljava/lang/String;)V"), b"(Ljava/lang/String;");
        assert_eq!(params_prefix(b"()I"), b"(");
    }
}
