//! Error taxonomy for loading, linking and running classes.
use thiserror::Error;

/// Failures while decoding a class file. A class that fails with one of these
/// is never registered.
#[derive(Debug, Error)]
pub enum StructuralError {
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("unexpected end of input at offset {offset} (wanted {wanted} bytes)")]
    UnexpectedEof { offset: usize, wanted: usize },

    #[error("{0} trailing bytes after class attributes")]
    TrailingBytes(usize),

    #[error("unknown constant pool tag {tag} at entry {index}")]
    UnknownConstantTag { tag: u8, index: usize },

    #[error("constant pool index 0 is reserved")]
    ReservedPoolIndex,

    #[error("constant pool index {index} out of range (pool has {len} entries)")]
    PoolIndexOutOfRange { index: usize, len: usize },

    #[error("constant pool index {0} addresses the second half of a long or double")]
    EmptyPoolSlot(usize),

    #[error("constant pool entry {index} is not a {expected}")]
    UnexpectedConstant { index: usize, expected: &'static str },

    #[error("unknown attribute `{0}`")]
    UnknownAttribute(String),

    #[error("attribute `{name}` declared {declared} bytes but consumed {consumed}")]
    AttributeLength {
        name: &'static str,
        declared: usize,
        consumed: usize,
    },

    #[error("`Code` attribute nested inside another `Code` attribute")]
    NestedCode,

    #[error("malformed descriptor `{0}`")]
    MalformedDescriptor(String),
}

/// Failures while linking a class to its superclass chain.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("NoClassDefFoundError: {0}")]
    NoClassDefFound(String),

    #[error("cannot initialize superclass of {class}")]
    Superclass {
        class: String,
        #[source]
        source: Box<Error>,
    },
}

/// Failures while resolving a symbolic reference.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("class {0} not found")]
    ClassNotFound(String),

    #[error("expected class {expected} but the class source defined {found}")]
    NameMismatch { expected: String, found: String },

    #[error("no field {field} in {class}")]
    NoSuchField { class: String, field: String },

    #[error("no overload for {class}.{name} with signature {descriptor}")]
    NoSuchMethod {
        class: String,
        name: String,
        descriptor: String,
    },

    #[error("ambiguous overload for {class}.{name} with signature {descriptor}")]
    AmbiguousOverload {
        class: String,
        name: String,
        descriptor: String,
    },

    #[error("method {class}.{name} has no Code attribute")]
    MissingCode { class: String, name: String },
}

/// Failures while executing bytecode.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("unsupported opcode {opcode:#04x} at pc {pc}")]
    UnsupportedOpcode { opcode: u8, pc: usize },

    #[error("truncated {mnemonic} at pc {pc}")]
    TruncatedInstruction { mnemonic: &'static str, pc: usize },

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("local variable slot {index} out of range ({len} slots)")]
    LocalOutOfRange { index: usize, len: usize },

    #[error("cannot set field {0} on null")]
    NullFieldStore(String),

    #[error("cannot read field {0} of null")]
    NullFieldLoad(String),

    #[error("field access on a value that is not an instance: {0}")]
    NotAnInstance(String),

    #[error("invalid operand for {mnemonic}: constant pool entry {index}")]
    InvalidConstant { mnemonic: &'static str, index: usize },

    #[error("execution ran past the end of the code without returning")]
    MissingReturn,
}

/// Crate wide error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
