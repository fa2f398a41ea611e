//! JVM bytecode instruction set understood by the interpreter.

/// Opcodes the interpreter executes. Any other byte decodes to
/// `Unsupported` and is rejected when reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OPCode {
    NOP,
    Iconst1,
    Dconst1,
    BiPush,
    SiPush,
    Ldc,
    Ldc2W,
    ALoad0,
    ALoad1,
    AStore0,
    AStore1,
    Dup,
    GetStatic,
    GetField,
    PutField,
    New,
    InvokeVirtual,
    InvokeSpecial,
    Return,
    AReturn,
    Unsupported(u8),
}

impl OPCode {
    /// Raw opcode byte.
    pub fn byte(self) -> u8 {
        match self {
            Self::NOP => 0x00,
            Self::Iconst1 => 0x04,
            Self::Dconst1 => 0x0f,
            Self::BiPush => 0x10,
            Self::SiPush => 0x11,
            Self::Ldc => 0x12,
            Self::Ldc2W => 0x14,
            Self::AStore0 => 0x4b,
            Self::AStore1 => 0x4c,
            Self::ALoad0 => 0x2a,
            Self::ALoad1 => 0x2b,
            Self::Dup => 0x59,
            Self::AReturn => 0xb0,
            Self::Return => 0xb1,
            Self::GetStatic => 0xb2,
            Self::GetField => 0xb4,
            Self::PutField => 0xb5,
            Self::InvokeVirtual => 0xb6,
            Self::InvokeSpecial => 0xb7,
            Self::New => 0xbb,
            Self::Unsupported(byte) => byte,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::NOP => "nop",
            Self::Iconst1 => "iconst_1",
            Self::Dconst1 => "dconst_1",
            Self::BiPush => "bipush",
            Self::SiPush => "sipush",
            Self::Ldc => "ldc",
            Self::Ldc2W => "ldc2_w",
            Self::ALoad0 => "aload_0",
            Self::ALoad1 => "aload_1",
            Self::AStore0 => "astore_0",
            Self::AStore1 => "astore_1",
            Self::Dup => "dup",
            Self::GetStatic => "getstatic",
            Self::GetField => "getfield",
            Self::PutField => "putfield",
            Self::New => "new",
            Self::InvokeVirtual => "invokevirtual",
            Self::InvokeSpecial => "invokespecial",
            Self::Return => "return",
            Self::AReturn => "areturn",
            Self::Unsupported(_) => "<unsupported>",
        }
    }

    /// Number of operand bytes following the opcode.
    pub fn operand_width(self) -> usize {
        match self {
            Self::BiPush | Self::Ldc => 1,
            Self::SiPush
            | Self::Ldc2W
            | Self::GetStatic
            | Self::GetField
            | Self::PutField
            | Self::New
            | Self::InvokeVirtual
            | Self::InvokeSpecial => 2,
            _ => 0,
        }
    }
}

impl From<u8> for OPCode {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => Self::NOP,
            0x04 => Self::Iconst1,
            0x0f => Self::Dconst1,
            0x10 => Self::BiPush,
            0x11 => Self::SiPush,
            0x12 => Self::Ldc,
            0x14 => Self::Ldc2W,
            0x2a => Self::ALoad0,
            0x2b => Self::ALoad1,
            0x4b => Self::AStore0,
            0x4c => Self::AStore1,
            0x59 => Self::Dup,
            0xb0 => Self::AReturn,
            0xb1 => Self::Return,
            0xb2 => Self::GetStatic,
            0xb4 => Self::GetField,
            0xb5 => Self::PutField,
            0xb6 => Self::InvokeVirtual,
            0xb7 => Self::InvokeSpecial,
            0xbb => Self::New,
            other => Self::Unsupported(other),
        }
    }
}
