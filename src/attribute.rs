//! Class, field, method and code attributes.

/// Attribute names the parser knows about. Anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeName {
    ConstantValue,
    Code,
    StackMapTable,
    Exceptions,
    InnerClasses,
    EnclosingMethod,
    Synthetic,
    Signature,
    SourceFile,
    SourceDebugExtension,
    LineNumberTable,
    LocalVariableTable,
    LocalVariableTypeTable,
    Deprecated,
    RuntimeVisibleAnnotations,
    RuntimeInvisibleAnnotations,
    RuntimeVisibleParameterAnnotations,
    RuntimeInvisibleParameterAnnotations,
    AnnotationDefault,
    BootstrapMethods,
}

impl AttributeName {
    const ALL: [AttributeName; 20] = [
        Self::ConstantValue,
        Self::Code,
        Self::StackMapTable,
        Self::Exceptions,
        Self::InnerClasses,
        Self::EnclosingMethod,
        Self::Synthetic,
        Self::Signature,
        Self::SourceFile,
        Self::SourceDebugExtension,
        Self::LineNumberTable,
        Self::LocalVariableTable,
        Self::LocalVariableTypeTable,
        Self::Deprecated,
        Self::RuntimeVisibleAnnotations,
        Self::RuntimeInvisibleAnnotations,
        Self::RuntimeVisibleParameterAnnotations,
        Self::RuntimeInvisibleParameterAnnotations,
        Self::AnnotationDefault,
        Self::BootstrapMethods,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConstantValue => "ConstantValue",
            Self::Code => "Code",
            Self::StackMapTable => "StackMapTable",
            Self::Exceptions => "Exceptions",
            Self::InnerClasses => "InnerClasses",
            Self::EnclosingMethod => "EnclosingMethod",
            Self::Synthetic => "Synthetic",
            Self::Signature => "Signature",
            Self::SourceFile => "SourceFile",
            Self::SourceDebugExtension => "SourceDebugExtension",
            Self::LineNumberTable => "LineNumberTable",
            Self::LocalVariableTable => "LocalVariableTable",
            Self::LocalVariableTypeTable => "LocalVariableTypeTable",
            Self::Deprecated => "Deprecated",
            Self::RuntimeVisibleAnnotations => "RuntimeVisibleAnnotations",
            Self::RuntimeInvisibleAnnotations => "RuntimeInvisibleAnnotations",
            Self::RuntimeVisibleParameterAnnotations => "RuntimeVisibleParameterAnnotations",
            Self::RuntimeInvisibleParameterAnnotations => "RuntimeInvisibleParameterAnnotations",
            Self::AnnotationDefault => "AnnotationDefault",
            Self::BootstrapMethods => "BootstrapMethods",
        }
    }

    pub fn from_bytes(name: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|attr| attr.as_str().as_bytes() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeInfo {
    CodeAttribute {
        max_stack: u16,
        max_locals: u16,
        code: Vec<u8>,
        exception_table: Vec<ExceptionTableEntry>,
        attributes: Attributes,
    },
    LineNumberTableAttribute {
        entries: Vec<LineNumber>,
    },
    SourceFileAttribute {
        sourcefile_index: usize,
    },
    SignatureAttribute {
        signature_index: usize,
    },
    ConstantValueAttribute {
        constant_value_index: usize,
    },
    /// Recognized but not interpreted; kept as its raw payload.
    OpaqueAttribute {
        name: AttributeName,
        info: Vec<u8>,
    },
}

impl AttributeInfo {
    pub fn name(&self) -> AttributeName {
        match self {
            Self::CodeAttribute { .. } => AttributeName::Code,
            Self::LineNumberTableAttribute { .. } => AttributeName::LineNumberTable,
            Self::SourceFileAttribute { .. } => AttributeName::SourceFile,
            Self::SignatureAttribute { .. } => AttributeName::Signature,
            Self::ConstantValueAttribute { .. } => AttributeName::ConstantValue,
            Self::OpaqueAttribute { name, .. } => *name,
        }
    }
}

/// Ordered attribute list with lookup by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Vec<AttributeInfo>);

impl Attributes {
    pub fn new(attributes: Vec<AttributeInfo>) -> Self {
        Self(attributes)
    }

    /// First attribute called `name`, if any.
    pub fn get(&self, name: AttributeName) -> Option<&AttributeInfo> {
        self.0.iter().find(|attr| attr.name() == name)
    }

    pub fn contains(&self, name: AttributeName) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeInfo> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<AttributeInfo>> for Attributes {
    fn from(attributes: Vec<AttributeInfo>) -> Self {
        Self(attributes)
    }
}
