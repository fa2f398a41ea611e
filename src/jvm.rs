//! Lightweight implementation of a parser and decoder for JVM bytecode
//! class files.
//!
//! The parser walks the class file front to back in the order the format
//! lays it out and produces a `ClassFile` with every constant pool index
//! already converted to a 0-based pool position.
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::debug;

use crate::attribute::{AttributeInfo, AttributeName, Attributes, ExceptionTableEntry, LineNumber};
use crate::class::{AccessFlags, ClassFile, FieldInfo, MethodInfo};
use crate::constant_pool::{decode_f32, decode_f64, tag, CPInfo, ConstantPool, MemberKind};
use crate::descriptor::parse_field_type;
use crate::error::{Result, StructuralError};
use crate::reader::ByteReader;

const MAGIC: u32 = 0xCAFE_BABE;

type ParseResult<T> = std::result::Result<T, StructuralError>;

/// Reads a class file from disk into memory.
pub fn read_class_file(path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
    let mut f = File::open(path)?;
    let mut buffer = Vec::new();
    f.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// `JVMParser` decodes a class file into a `ClassFile`.
pub struct JVMParser;

impl JVMParser {
    /// Parses a complete class file. Pool cross references are not checked
    /// here, see `ClassFile::validate`.
    pub fn parse(class_file_bytes: &[u8]) -> Result<ClassFile> {
        let mut reader = ByteReader::new(class_file_bytes);
        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(StructuralError::BadMagic(magic).into());
        }
        let minor_version = reader.read_u16()?;
        let major_version = reader.read_u16()?;
        let constant_pool = Self::parse_constant_pool(&mut reader)?;

        let access_flags = AccessFlags::new(reader.read_u16()?);
        let this_class = reader.read_pool_index()?;
        let super_class = reader.read_optional_pool_index()?;
        let interfaces_count = reader.read_u16()?;
        let interfaces = (0..interfaces_count)
            .map(|_| reader.read_pool_index())
            .collect::<ParseResult<Vec<_>>>()?;
        let fields = Self::parse_fields(&mut reader, &constant_pool)?;
        let methods = Self::parse_methods(&mut reader, &constant_pool)?;
        let attributes = Self::parse_attributes(&mut reader, &constant_pool, false)?;
        if !reader.is_empty() {
            return Err(StructuralError::TrailingBytes(reader.remaining()).into());
        }

        let mut class = ClassFile::new(constant_pool, this_class);
        class.minor_version = minor_version;
        class.major_version = major_version;
        class.access_flags = access_flags;
        class.super_class = super_class;
        class.interfaces = interfaces;
        class.fields = fields;
        class.methods = methods;
        class.attributes = attributes;
        debug!(
            class = %class.display_name(),
            version = %format!("{major_version}.{minor_version}"),
            pool = class.constant_pool.len(),
            fields = class.fields.len(),
            methods = class.methods.len(),
            "parsed class file"
        );
        Ok(class)
    }

    fn parse_constant_pool(reader: &mut ByteReader) -> ParseResult<ConstantPool> {
        // The on-disk count is one more than the number of slots.
        let constant_pool_count = reader.read_u16()? as usize;
        let mut pool = ConstantPool::new();
        while pool.len() + 1 < constant_pool_count {
            let entry = Self::parse_constant(reader, pool.len() + 1)?;
            pool.push(entry);
        }
        Ok(pool)
    }

    fn parse_constant(reader: &mut ByteReader, index: usize) -> ParseResult<CPInfo> {
        let member_ref = |reader: &mut ByteReader, kind| -> ParseResult<CPInfo> {
            Ok(CPInfo::ConstantMemberRef {
                kind,
                class_index: reader.read_pool_index()?,
                name_and_type_index: reader.read_pool_index()?,
            })
        };
        let entry = match reader.read_u8()? {
            tag::UTF8 => {
                let length = reader.read_u16()? as usize;
                CPInfo::ConstantUtf8 {
                    bytes: reader.read_bytes(length)?,
                }
            }
            tag::INTEGER => CPInfo::ConstantInteger {
                value: reader.read_u32()? as i32,
            },
            tag::FLOAT => CPInfo::ConstantFloat {
                value: decode_f32(reader.read_u32()?),
            },
            tag::LONG => CPInfo::ConstantLong {
                value: reader.read_u64()? as i64,
            },
            tag::DOUBLE => CPInfo::ConstantDouble {
                value: decode_f64(reader.read_u64()?),
            },
            tag::CLASS => CPInfo::ConstantClass {
                name_index: reader.read_pool_index()?,
            },
            tag::STRING => CPInfo::ConstantString {
                string_index: reader.read_pool_index()?,
            },
            tag::FIELD_REF => member_ref(reader, MemberKind::Field)?,
            tag::METHOD_REF => member_ref(reader, MemberKind::Method)?,
            tag::INTERFACE_METHOD_REF => member_ref(reader, MemberKind::InterfaceMethod)?,
            tag::NAME_AND_TYPE => CPInfo::ConstantNameAndType {
                name_index: reader.read_pool_index()?,
                descriptor_index: reader.read_pool_index()?,
            },
            other => return Err(StructuralError::UnknownConstantTag { tag: other, index }),
        };
        Ok(entry)
    }

    fn parse_fields(
        reader: &mut ByteReader,
        pool: &ConstantPool,
    ) -> ParseResult<Vec<FieldInfo>> {
        let fields_count = reader.read_u16()?;
        let mut fields = Vec::with_capacity(fields_count as usize);
        for _ in 0..fields_count {
            let access_flags = AccessFlags::new(reader.read_u16()?);
            let name_index = reader.read_pool_index()?;
            let descriptor_index = reader.read_pool_index()?;
            parse_field_type(pool.utf8(descriptor_index)?)?;
            let attributes = Self::parse_attributes(reader, pool, false)?;
            fields.push(FieldInfo {
                access_flags,
                name_index,
                descriptor_index,
                attributes,
            });
        }
        Ok(fields)
    }

    fn parse_methods(
        reader: &mut ByteReader,
        pool: &ConstantPool,
    ) -> ParseResult<Vec<MethodInfo>> {
        let methods_count = reader.read_u16()?;
        let mut methods = Vec::with_capacity(methods_count as usize);
        for _ in 0..methods_count {
            let access_flags = AccessFlags::new(reader.read_u16()?);
            let name_index = reader.read_pool_index()?;
            let descriptor_index = reader.read_pool_index()?;
            let attributes = Self::parse_attributes(reader, pool, false)?;
            methods.push(MethodInfo::new(
                access_flags,
                name_index,
                descriptor_index,
                attributes,
                pool,
            )?);
        }
        Ok(methods)
    }

    /// Reads an attribute table. `in_code` is set for the table inside a
    /// `Code` attribute, where another `Code` is malformed.
    fn parse_attributes(
        reader: &mut ByteReader,
        pool: &ConstantPool,
        in_code: bool,
    ) -> ParseResult<Attributes> {
        let attributes_count = reader.read_u16()?;
        let mut attributes = Vec::with_capacity(attributes_count as usize);
        for _ in 0..attributes_count {
            let name_index = reader.read_pool_index()?;
            let raw_name = pool.utf8(name_index)?;
            let name = AttributeName::from_bytes(raw_name).ok_or_else(|| {
                StructuralError::UnknownAttribute(String::from_utf8_lossy(raw_name).into_owned())
            })?;
            if in_code && name == AttributeName::Code {
                return Err(StructuralError::NestedCode);
            }
            let length = reader.read_u32()? as usize;
            let info = reader.read_bytes(length)?;

            let mut body = ByteReader::new(&info);
            let attribute = Self::parse_attribute(name, &mut body, pool)?;
            if !body.is_empty() {
                return Err(StructuralError::AttributeLength {
                    name: name.as_str(),
                    declared: length,
                    consumed: body.position(),
                });
            }
            attributes.push(attribute);
        }
        Ok(Attributes::new(attributes))
    }

    fn parse_attribute(
        name: AttributeName,
        reader: &mut ByteReader,
        pool: &ConstantPool,
    ) -> ParseResult<AttributeInfo> {
        let attribute = match name {
            AttributeName::ConstantValue => AttributeInfo::ConstantValueAttribute {
                constant_value_index: reader.read_pool_index()?,
            },
            AttributeName::SourceFile => AttributeInfo::SourceFileAttribute {
                sourcefile_index: reader.read_pool_index()?,
            },
            AttributeName::Signature => AttributeInfo::SignatureAttribute {
                signature_index: reader.read_pool_index()?,
            },
            AttributeName::LineNumberTable => {
                let length = reader.read_u16()?;
                let entries = (0..length)
                    .map(|_| -> ParseResult<LineNumber> {
                        Ok(LineNumber {
                            start_pc: reader.read_u16()?,
                            line_number: reader.read_u16()?,
                        })
                    })
                    .collect::<ParseResult<Vec<_>>>()?;
                AttributeInfo::LineNumberTableAttribute { entries }
            }
            AttributeName::Code => {
                let max_stack = reader.read_u16()?;
                let max_locals = reader.read_u16()?;
                let code_length = reader.read_u32()? as usize;
                let code = reader.read_bytes(code_length)?;
                let exception_table_length = reader.read_u16()?;
                let exception_table = (0..exception_table_length)
                    .map(|_| -> ParseResult<ExceptionTableEntry> {
                        Ok(ExceptionTableEntry {
                            start_pc: reader.read_u16()?,
                            end_pc: reader.read_u16()?,
                            handler_pc: reader.read_u16()?,
                            catch_type: reader.read_u16()?,
                        })
                    })
                    .collect::<ParseResult<Vec<_>>>()?;
                let attributes = Self::parse_attributes(reader, pool, true)?;
                AttributeInfo::CodeAttribute {
                    max_stack,
                    max_locals,
                    code,
                    exception_table,
                    attributes,
                }
            }
            other => AttributeInfo::OpaqueAttribute {
                name: other,
                info: reader.read_bytes(reader.remaining())?,
            },
        };
        Ok(attribute)
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::path::Path;

    use super::*;
    use crate::error::Error;
    use crate::fixtures::ClassAssembler;
    use crate::value::Value;

    fn support(name: &str) -> Vec<u8> {
        let env_var = env::var("CARGO_MANIFEST_DIR").unwrap();
        let path = Path::new(&env_var).join("support").join(name);
        read_class_file(path).unwrap()
    }

    fn structural(result: Result<ClassFile>) -> StructuralError {
        match result {
            Err(Error::Structural(err)) => err,
            other => panic!("expected a structural error, got {other:?}"),
        }
    }

    #[test]
    fn can_you_read_class_file() {
        let buffer = support("Greeter.class");
        assert_eq!(0xcafebabe, u32::from_be_bytes(buffer[..4].try_into().unwrap()));

        let class = JVMParser::parse(&buffer).unwrap();
        assert!(class.validate().is_ok());
        assert_eq!(class.major_version, 52);
        assert_eq!(class.constant_pool.len(), 31);
        assert_eq!(class.this_class, 7);
        assert_eq!(class.name().unwrap(), b"Greeter");
        assert_eq!(class.super_class_name().unwrap(), Some(&b"java/lang/Object"[..]));
        assert!(class.access_flags.contains(AccessFlags::SUPER));
        assert_eq!(class.fields.len(), 1);
        assert!(class.attributes.contains(AttributeName::SourceFile));

        let main = class.resolve_overload(b"main", b"([Ljava/lang/String;)V").unwrap();
        assert!(main.is_static());
        let code = main.code().unwrap();
        assert_eq!(code.code.len(), 19);
        assert_eq!(code.code[0], 0xbb);
        let init = class.resolve_overload(b"<init>", b"()V").unwrap();
        assert_eq!(init.code().unwrap().max_locals, 1);
    }

    #[test]
    fn reads_constant_values_and_wide_literals() {
        let class = JVMParser::parse(&support("Messages.class")).unwrap();
        let greeting = class.field_by_name(b"GREETING").unwrap();
        let limit = class.field_by_name(b"LIMIT").unwrap();
        assert_eq!(class.initial_value(greeting).unwrap().to_string(), "hello");
        assert_eq!(class.initial_value(limit).unwrap().value, Value::Int(300));

        let wide = class
            .constant_pool
            .iter()
            .filter(|entry| entry.is_wide())
            .count();
        let empty = class
            .constant_pool
            .iter()
            .filter(|entry| **entry == CPInfo::Empty)
            .count();
        assert_eq!(wide, 2);
        assert_eq!(empty, 2);
        assert!(class.validate().is_ok());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = ClassAssembler::new("Point", None).build();
        bytes[0] = 0xca;
        bytes[3] = 0xfe;
        assert!(matches!(
            structural(JVMParser::parse(&bytes)),
            StructuralError::BadMagic(0xcafe_bafe)
        ));
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = ClassAssembler::new("Point", None).build();
        for len in [0, 3, 9, bytes.len() - 1] {
            assert!(matches!(
                structural(JVMParser::parse(&bytes[..len])),
                StructuralError::UnexpectedEof { .. }
            ));
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = ClassAssembler::new("Point", None).build();
        bytes.extend_from_slice(&[0, 0]);
        assert!(matches!(
            structural(JVMParser::parse(&bytes)),
            StructuralError::TrailingBytes(2)
        ));
    }

    #[test]
    fn rejects_unknown_constant_tag() {
        let mut assembler = ClassAssembler::new("Point", None);
        let index = assembler.raw_entry(2, &[0, 0]);
        assert!(matches!(
            structural(JVMParser::parse(&assembler.build())),
            StructuralError::UnknownConstantTag { tag: 2, index: i } if i == usize::from(index)
        ));
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut assembler = ClassAssembler::new("Point", None);
        let long = assembler.long(-5);
        let double = assembler.double(0.25);
        let float = assembler.float(-1.5);
        assert_eq!(double, long + 2);
        assert_eq!(float, double + 2);

        let class = JVMParser::parse(&assembler.build()).unwrap();
        let pool = &class.constant_pool;
        let at = |index: u16| usize::from(index) - 1;
        assert_eq!(pool.literal(at(long)).unwrap().value, Value::Long(-5));
        assert_eq!(pool.literal(at(double)).unwrap().value, Value::Double(0.25));
        assert_eq!(pool.literal(at(float)).unwrap().value, Value::Float(-1.5));
        assert!(matches!(
            pool.get(at(long) + 1),
            Err(StructuralError::EmptyPoolSlot(_))
        ));
    }

    #[test]
    fn reserved_index_is_rejected() {
        let mut assembler = ClassAssembler::new("Point", None);
        assembler.raw_entry(7, &[0, 0]);
        assert!(matches!(
            structural(JVMParser::parse(&assembler.build())),
            StructuralError::ReservedPoolIndex
        ));
    }

    #[test]
    fn root_class_has_no_superclass() {
        let class = JVMParser::parse(&ClassAssembler::new("Root", None).build()).unwrap();
        assert_eq!(class.super_class, None);
        assert_eq!(class.super_class_name().unwrap(), None);
    }

    #[test]
    fn recognized_attributes_are_kept_opaque() {
        let mut assembler = ClassAssembler::new("Point", None);
        assembler
            .attribute("Deprecated", &[])
            .attribute("InnerClasses", &[0, 0]);
        let class = JVMParser::parse(&assembler.build()).unwrap();
        assert_eq!(class.attributes.len(), 2);
        assert_eq!(
            class.attributes.get(AttributeName::InnerClasses),
            Some(&AttributeInfo::OpaqueAttribute {
                name: AttributeName::InnerClasses,
                info: vec![0, 0],
            })
        );
    }

    #[test]
    fn unknown_attribute_is_fatal() {
        let mut assembler = ClassAssembler::new("Point", None);
        assembler.attribute("NestMembers", &[0, 0]);
        assert!(matches!(
            structural(JVMParser::parse(&assembler.build())),
            StructuralError::UnknownAttribute(name) if name == "NestMembers"
        ));
    }

    #[test]
    fn attribute_must_consume_its_declared_length() {
        let mut assembler = ClassAssembler::new("Point", None);
        let source = assembler.utf8("Point.java");
        let [hi, lo] = source.to_be_bytes();
        assembler.attribute("SourceFile", &[hi, lo, 0]);
        assert!(matches!(
            structural(JVMParser::parse(&assembler.build())),
            StructuralError::AttributeLength {
                name: "SourceFile",
                declared: 3,
                consumed: 2,
            }
        ));
    }

    #[test]
    fn malformed_method_descriptor_is_fatal() {
        let mut assembler = ClassAssembler::new("Point", None);
        assembler.bodyless_method(AccessFlags::PUBLIC, "broken", "(I");
        assert!(matches!(
            structural(JVMParser::parse(&assembler.build())),
            StructuralError::MalformedDescriptor(_)
        ));
    }

    #[test]
    fn parses_code_attribute() {
        let mut assembler = ClassAssembler::new("Point", None);
        assembler.method(
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            "one",
            "()I",
            0,
            &[0x04, 0xac],
        );
        let class = JVMParser::parse(&assembler.build()).unwrap();
        let method = class.resolve_overload(b"one", b"()I").unwrap();
        let code = method.code().unwrap();
        assert_eq!(code.code, &[0x04, 0xac]);
        assert_eq!(code.max_stack, 16);
        assert_eq!(method.signature().param_slots(), 0);
    }

    /// `Code` payload with no instructions whose attribute table holds
    /// `nested`, if given.
    fn code_payload(code_name: u16, nested: Option<&[u8]>) -> Vec<u8> {
        let mut info = vec![0, 1, 0, 1, 0, 0, 0, 0, 0, 0];
        match nested {
            Some(inner) => {
                info.extend_from_slice(&[0, 1]);
                info.extend_from_slice(&code_name.to_be_bytes());
                info.extend_from_slice(&(inner.len() as u32).to_be_bytes());
                info.extend_from_slice(inner);
            }
            None => info.extend_from_slice(&[0, 0]),
        }
        info
    }

    #[test]
    fn code_inside_code_is_rejected() {
        let mut assembler = ClassAssembler::new("Point", None);
        let code_name = assembler.utf8("Code");
        let inner = code_payload(code_name, None);
        assembler.attribute("Code", &code_payload(code_name, Some(&inner)));
        assert!(matches!(
            structural(JVMParser::parse(&assembler.build())),
            StructuralError::NestedCode
        ));
    }

    #[test]
    fn deeply_nested_code_fails_without_recursing() {
        let mut assembler = ClassAssembler::new("Point", None);
        let code_name = assembler.utf8("Code");
        let mut payload = code_payload(code_name, None);
        for _ in 0..5_000 {
            payload = code_payload(code_name, Some(&payload));
        }
        assembler.attribute("Code", &payload);
        assert!(matches!(
            structural(JVMParser::parse(&assembler.build())),
            StructuralError::NestedCode
        ));
    }
}
