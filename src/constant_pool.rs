//! Constant pool entries and the index conventions used to address them.
//!
//! Entries refer to each other by position only. Positions are 0-based: the
//! parser subtracts one from every on-disk index, so on-disk index `i`
//! addresses `entries[i - 1]`.
use std::rc::Rc;

use crate::error::StructuralError;
use crate::value::{StackValue, Value};

type Result<T> = std::result::Result<T, StructuralError>;

/// Which instruction family a member reference belongs to. All three share
/// the same on-disk shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

/// Constant pool tags as found on disk.
pub mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
}

#[derive(Debug, Clone, PartialEq)]
pub enum CPInfo {
    ConstantClass {
        name_index: usize,
    },
    ConstantNameAndType {
        name_index: usize,
        descriptor_index: usize,
    },
    ConstantUtf8 {
        bytes: Vec<u8>,
    },
    ConstantString {
        string_index: usize,
    },
    ConstantInteger {
        value: i32,
    },
    ConstantLong {
        value: i64,
    },
    ConstantFloat {
        value: f32,
    },
    ConstantDouble {
        value: f64,
    },
    ConstantMemberRef {
        kind: MemberKind,
        class_index: usize,
        name_and_type_index: usize,
    },
    /// Second slot of a long or double.
    Empty,
}

impl CPInfo {
    /// Long and double entries occupy two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Self::ConstantLong { .. } | Self::ConstantDouble { .. })
    }
}

/// Resolved view of a field or method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub kind: MemberKind,
    pub class_name: &'a [u8],
    pub name: &'a [u8],
    pub descriptor: &'a [u8],
}

/// Owned, append-only table of constants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<CPInfo>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and returns its 0-based position. Wide entries get
    /// their trailing `Empty` slot appended as well.
    pub fn push(&mut self, entry: CPInfo) -> usize {
        let index = self.entries.len();
        let wide = entry.is_wide();
        self.entries.push(entry);
        if wide {
            self.entries.push(CPInfo::Empty);
        }
        index
    }

    /// Appends a UTF-8 entry for `s`.
    pub fn push_utf8(&mut self, s: &str) -> usize {
        self.push(CPInfo::ConstantUtf8 {
            bytes: s.as_bytes().to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CPInfo> {
        self.entries.iter()
    }

    /// Returns the entry at `index`. The placeholder half of a wide entry is
    /// never a valid target.
    pub fn get(&self, index: usize) -> Result<&CPInfo> {
        match self.entries.get(index) {
            Some(CPInfo::Empty) => Err(StructuralError::EmptyPoolSlot(index)),
            Some(entry) => Ok(entry),
            None => Err(StructuralError::PoolIndexOutOfRange {
                index,
                len: self.entries.len(),
            }),
        }
    }

    fn unexpected(index: usize, expected: &'static str) -> StructuralError {
        StructuralError::UnexpectedConstant { index, expected }
    }

    pub fn utf8(&self, index: usize) -> Result<&[u8]> {
        match self.get(index)? {
            CPInfo::ConstantUtf8 { bytes } => Ok(bytes),
            _ => Err(Self::unexpected(index, "Utf8")),
        }
    }

    /// Name of the class referenced by the `ConstantClass` at `index`.
    pub fn class_name(&self, index: usize) -> Result<&[u8]> {
        match self.get(index)? {
            CPInfo::ConstantClass { name_index } => self.utf8(*name_index),
            _ => Err(Self::unexpected(index, "Class")),
        }
    }

    /// Name and descriptor of the `ConstantNameAndType` at `index`.
    pub fn name_and_type(&self, index: usize) -> Result<(&[u8], &[u8])> {
        match self.get(index)? {
            CPInfo::ConstantNameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(Self::unexpected(index, "NameAndType")),
        }
    }

    /// Follows a member reference to its class name, member name and
    /// descriptor.
    pub fn member_ref(&self, index: usize) -> Result<MemberRef<'_>> {
        match self.get(index)? {
            CPInfo::ConstantMemberRef {
                kind,
                class_index,
                name_and_type_index,
            } => {
                let class_name = self.class_name(*class_index)?;
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(MemberRef {
                    kind: *kind,
                    class_name,
                    name,
                    descriptor,
                })
            }
            _ => Err(Self::unexpected(index, "MemberRef")),
        }
    }

    /// Converts a loadable literal into a runtime value.
    pub fn literal(&self, index: usize) -> Result<StackValue> {
        let value = match self.get(index)? {
            CPInfo::ConstantInteger { value } => Value::Int(*value),
            CPInfo::ConstantLong { value } => Value::Long(*value),
            CPInfo::ConstantFloat { value } => Value::Float(*value),
            CPInfo::ConstantDouble { value } => Value::Double(*value),
            CPInfo::ConstantString { string_index } => {
                let bytes = self.utf8(*string_index)?;
                Value::String(Rc::from(String::from_utf8_lossy(bytes).as_ref()))
            }
            _ => return Err(Self::unexpected(index, "literal")),
        };
        Ok(StackValue::new(value))
    }

    /// Checks that every cross reference lands on an entry of the right kind.
    pub fn validate(&self) -> Result<()> {
        for entry in &self.entries {
            match entry {
                CPInfo::ConstantClass { name_index }
                | CPInfo::ConstantNameAndType { name_index, .. } => {
                    self.utf8(*name_index)?;
                }
                CPInfo::ConstantString { string_index } => {
                    self.utf8(*string_index)?;
                }
                CPInfo::ConstantMemberRef {
                    class_index,
                    name_and_type_index,
                    ..
                } => {
                    self.class_name(*class_index)?;
                    self.name_and_type(*name_and_type_index)?;
                }
                _ => (),
            }
        }
        Ok(())
    }
}

/// Multiplies `mantissa` by two to the power `exp` without leaving the
/// representable range on the way, so subnormal results come out exact.
fn scale(mantissa: f64, exp: i32) -> f64 {
    let half = exp / 2;
    mantissa * 2f64.powi(half) * 2f64.powi(exp - half)
}

/// Decodes IEEE-754 single precision bits from sign, exponent and mantissa.
pub fn decode_f32(bits: u32) -> f32 {
    let sign = if bits >> 31 == 0 { 1.0 } else { -1.0 };
    let exponent = ((bits >> 23) & 0xff) as i32;
    let fraction = bits & 0x7f_ffff;
    if exponent == 0xff {
        return if fraction == 0 {
            sign as f32 * f32::INFINITY
        } else {
            f32::NAN
        };
    }
    let mantissa = if exponent == 0 {
        fraction << 1
    } else {
        fraction | 0x80_0000
    };
    (sign * scale(f64::from(mantissa), exponent - 150)) as f32
}

/// Decodes IEEE-754 double precision bits from sign, exponent and mantissa.
pub fn decode_f64(bits: u64) -> f64 {
    let sign = if bits >> 63 == 0 { 1.0 } else { -1.0 };
    let exponent = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & 0xf_ffff_ffff_ffff;
    if exponent == 0x7ff {
        return if fraction == 0 {
            sign * f64::INFINITY
        } else {
            f64::NAN
        };
    }
    let mantissa = if exponent == 0 {
        fraction << 1
    } else {
        fraction | 0x10_0000_0000_0000
    };
    sign * scale(mantissa as f64, exponent - 1075)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ConstantPool {
        let mut pool = ConstantPool::new();
        pool.push_utf8("Greeter"); // 0
        pool.push(CPInfo::ConstantClass { name_index: 0 }); // 1
        pool.push_utf8("value"); // 2
        pool.push_utf8("I"); // 3
        pool.push(CPInfo::ConstantNameAndType {
            name_index: 2,
            descriptor_index: 3,
        }); // 4
        pool.push(CPInfo::ConstantMemberRef {
            kind: MemberKind::Field,
            class_index: 1,
            name_and_type_index: 4,
        }); // 5
        pool.push(CPInfo::ConstantLong { value: -2 }); // 6, 7
        pool.push(CPInfo::ConstantString { string_index: 2 }); // 8
        pool
    }

    #[test]
    fn follows_member_reference_chain() {
        let pool = pool();
        let member = pool.member_ref(5).unwrap();
        assert_eq!(member.kind, MemberKind::Field);
        assert_eq!(member.class_name, b"Greeter");
        assert_eq!(member.name, b"value");
        assert_eq!(member.descriptor, b"I");
        assert!(pool.validate().is_ok());
    }

    #[test]
    fn wide_entries_reserve_a_placeholder() {
        let pool = pool();
        assert_eq!(pool.len(), 9);
        assert_eq!(pool.literal(6).unwrap().value, Value::Long(-2));
        assert!(matches!(
            pool.get(7),
            Err(StructuralError::EmptyPoolSlot(7))
        ));
        assert_eq!(pool.literal(8).unwrap(), StackValue::string("value"));
    }

    #[test]
    fn typed_lookups_reject_other_kinds() {
        let pool = pool();
        assert!(matches!(
            pool.utf8(1),
            Err(StructuralError::UnexpectedConstant {
                index: 1,
                expected: "Utf8"
            })
        ));
        assert!(pool.class_name(0).is_err());
        assert!(pool.member_ref(4).is_err());
        assert!(matches!(
            pool.get(40),
            Err(StructuralError::PoolIndexOutOfRange { index: 40, len: 9 })
        ));
    }

    #[test]
    fn validate_catches_dangling_references() {
        let mut pool = pool();
        pool.push(CPInfo::ConstantClass { name_index: 1 });
        assert!(pool.validate().is_err());

        let mut pool = ConstantPool::new();
        pool.push(CPInfo::ConstantDouble { value: 1.0 });
        pool.push(CPInfo::ConstantString { string_index: 1 });
        assert!(matches!(
            pool.validate(),
            Err(StructuralError::EmptyPoolSlot(1))
        ));
    }

    #[test]
    fn decodes_single_precision() {
        assert_eq!(decode_f32(0x3F80_0000), 1.0);
        assert_eq!(decode_f32(0xC020_0000), -2.5);
        assert_eq!(decode_f32(0x7F80_0000), f32::INFINITY);
        assert_eq!(decode_f32(0xFF80_0000), f32::NEG_INFINITY);
        assert!(decode_f32(0x7FC0_0000).is_nan());
        assert_eq!(decode_f32(0x0000_0001), f32::from_bits(1));
        assert_eq!(decode_f32(0x7F7F_FFFF), f32::MAX);
        for bits in [0x3DCC_CCCDu32, 0x4049_0FDB, 0x0080_0000, 0x8000_0000] {
            assert_eq!(decode_f32(bits).to_bits(), bits);
        }
    }

    #[test]
    fn decodes_double_precision() {
        assert_eq!(decode_f64(0x3FF0_0000_0000_0000), 1.0);
        assert_eq!(decode_f64(0x4004_0000_0000_0000), 2.5);
        assert_eq!(decode_f64(0x7FF0_0000_0000_0000), f64::INFINITY);
        assert_eq!(decode_f64(0xFFF0_0000_0000_0000), f64::NEG_INFINITY);
        assert!(decode_f64(0x7FF8_0000_0000_0000).is_nan());
        assert_eq!(decode_f64(1), f64::from_bits(1));
        assert_eq!(decode_f64(0x7FEF_FFFF_FFFF_FFFF), f64::MAX);
        for value in [0.1f64, -3.141592653589793, 1e-310, 6.02214076e23] {
            assert_eq!(decode_f64(value.to_bits()), value);
        }
    }
}
