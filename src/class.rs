//! In-memory class model: class records, fields, methods and their flags.
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::attribute::{AttributeInfo, AttributeName, Attributes};
use crate::constant_pool::ConstantPool;
use crate::descriptor::{params_prefix, MethodSignature};
use crate::error::{ResolutionError, Result, StructuralError};
use crate::native::NativeMethod;
use crate::value::{Instance, ObjectRef, StackValue};

/// Access and property flags shared by classes, fields and methods.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessFlags(u16);

#[rustfmt::skip]
impl AccessFlags {
    pub const PUBLIC:       u16 = 0x0001;
    pub const PRIVATE:      u16 = 0x0002;
    pub const PROTECTED:    u16 = 0x0004;
    pub const STATIC:       u16 = 0x0008;
    pub const FINAL:        u16 = 0x0010;
    pub const SUPER:        u16 = 0x0020;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const BRIDGE:       u16 = 0x0040;
    pub const VARARGS:      u16 = 0x0080;
    pub const NATIVE:       u16 = 0x0100;
    pub const INTERFACE:    u16 = 0x0200;
    pub const ABSTRACT:     u16 = 0x0400;
    pub const STRICT:       u16 = 0x0800;
    pub const SYNTHETIC:    u16 = 0x1000;
    pub const ANNOTATION:   u16 = 0x2000;
    pub const ENUM:         u16 = 0x4000;
}

impl AccessFlags {
    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub const fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }
}

impl fmt::Debug for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AccessFlags({:#06x})", self.0)
    }
}

/// Link-time initialization progress of a class. `Error` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializationState {
    Verified,
    InProgress,
    Done,
    Error,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub access_flags: AccessFlags,
    pub name_index: usize,
    pub descriptor_index: usize,
    pub attributes: Attributes,
}

impl FieldInfo {
    pub fn constant_value_index(&self) -> Option<usize> {
        match self.attributes.get(AttributeName::ConstantValue) {
            Some(AttributeInfo::ConstantValueAttribute {
                constant_value_index,
            }) => Some(*constant_value_index),
            _ => None,
        }
    }
}

/// What runs when a method is invoked.
#[derive(Debug, Clone)]
pub enum MethodBody {
    /// Interpreted from the method's `Code` attribute.
    Bytecode,
    /// Host callable supplied by the native bridge.
    Native(NativeMethod),
}

/// Borrowed view of a method's `Code` attribute.
#[derive(Debug, Clone, Copy)]
pub struct Code<'a> {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: AccessFlags,
    pub name_index: usize,
    pub descriptor_index: usize,
    pub attributes: Attributes,
    signature: MethodSignature,
    body: MethodBody,
}

impl MethodInfo {
    /// Builds a bytecode method. The signature is parsed from `pool`, which
    /// must already hold the descriptor.
    pub fn new(
        access_flags: AccessFlags,
        name_index: usize,
        descriptor_index: usize,
        attributes: Attributes,
        pool: &ConstantPool,
    ) -> std::result::Result<Self, StructuralError> {
        let signature = MethodSignature::parse(pool.utf8(descriptor_index)?)?;
        Ok(Self {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
            signature,
            body: MethodBody::Bytecode,
        })
    }

    /// Builds a method backed by a host callable.
    pub fn native(
        access_flags: AccessFlags,
        name_index: usize,
        descriptor_index: usize,
        pool: &ConstantPool,
        native: NativeMethod,
    ) -> std::result::Result<Self, StructuralError> {
        let mut method = Self::new(
            access_flags,
            name_index,
            descriptor_index,
            Attributes::default(),
            pool,
        )?;
        method.body = MethodBody::Native(native);
        Ok(method)
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    pub fn body(&self) -> &MethodBody {
        &self.body
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.is_static()
    }

    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Result<&'p [u8]> {
        Ok(pool.utf8(self.name_index)?)
    }

    pub fn descriptor<'p>(&self, pool: &'p ConstantPool) -> Result<&'p [u8]> {
        Ok(pool.utf8(self.descriptor_index)?)
    }

    pub fn code(&self) -> Option<Code<'_>> {
        match self.attributes.get(AttributeName::Code) {
            Some(AttributeInfo::CodeAttribute {
                max_stack,
                max_locals,
                code,
                ..
            }) => Some(Code {
                max_stack: *max_stack,
                max_locals: *max_locals,
                code,
            }),
            _ => None,
        }
    }
}

/// A loaded class. Registered once and never removed; the initialization
/// state and the static field map are updated in place by the linker.
#[derive(Debug)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: AccessFlags,
    pub this_class: usize,
    pub super_class: Option<usize>,
    pub interfaces: Vec<usize>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Attributes,
    state: Cell<InitializationState>,
    static_fields: RefCell<HashMap<Vec<u8>, StackValue>>,
}

impl ClassFile {
    pub fn new(constant_pool: ConstantPool, this_class: usize) -> Self {
        Self {
            minor_version: 0,
            major_version: 0,
            constant_pool,
            access_flags: AccessFlags::new(AccessFlags::PUBLIC),
            this_class,
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Attributes::default(),
            state: Cell::new(InitializationState::Verified),
            static_fields: RefCell::new(HashMap::new()),
        }
    }

    /// Fully qualified, slash separated class name.
    pub fn name(&self) -> Result<&[u8]> {
        Ok(self.constant_pool.class_name(self.this_class)?)
    }

    /// Class name for messages; never fails.
    pub fn display_name(&self) -> String {
        self.name()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .unwrap_or_else(|_| format!("<class #{}>", self.this_class))
    }

    /// `None` for the root of the hierarchy.
    pub fn super_class_name(&self) -> Result<Option<&[u8]>> {
        match self.super_class {
            Some(index) => Ok(Some(self.constant_pool.class_name(index)?)),
            None => Ok(None),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(AccessFlags::INTERFACE)
    }

    pub fn state(&self) -> InitializationState {
        self.state.get()
    }

    pub fn set_state(&self, state: InitializationState) {
        self.state.set(state);
    }

    pub fn field_by_name(&self, name: &[u8]) -> Option<&FieldInfo> {
        self.fields
            .iter()
            .find(|field| self.constant_pool.utf8(field.name_index).ok() == Some(name))
    }

    /// Selects the single method called `name` whose parameter descriptor
    /// text equals the call site's. No widening or closest match is tried.
    pub fn resolve_overload(&self, name: &[u8], descriptor: &[u8]) -> Result<&MethodInfo> {
        let index = self.resolve_overload_index(name, descriptor)?;
        Ok(&self.methods[index])
    }

    /// Position in `methods` of the overload `resolve_overload` selects.
    pub fn resolve_overload_index(&self, name: &[u8], descriptor: &[u8]) -> Result<usize> {
        let wanted = params_prefix(descriptor);
        let mut fit = self.methods.iter().enumerate().filter(|(_, method)| {
            let own_name = self.constant_pool.utf8(method.name_index).ok();
            let own_descriptor = self.constant_pool.utf8(method.descriptor_index).ok();
            own_name == Some(name) && own_descriptor.map(params_prefix) == Some(wanted)
        });
        let error = |ambiguous: bool| {
            let class = self.display_name();
            let name = String::from_utf8_lossy(name).into_owned();
            let descriptor = String::from_utf8_lossy(descriptor).into_owned();
            if ambiguous {
                ResolutionError::AmbiguousOverload {
                    class,
                    name,
                    descriptor,
                }
            } else {
                ResolutionError::NoSuchMethod {
                    class,
                    name,
                    descriptor,
                }
            }
        };
        let (index, _) = fit.next().ok_or_else(|| error(false))?;
        if fit.next().is_some() {
            return Err(error(true).into());
        }
        Ok(index)
    }

    /// Value a field starts with: its `ConstantValue` literal, else null.
    pub fn initial_value(&self, field: &FieldInfo) -> Result<StackValue> {
        match field.constant_value_index() {
            Some(index) => Ok(self.constant_pool.literal(index)?),
            None => Ok(StackValue::null()),
        }
    }

    pub fn get_static_field(&self, name: &[u8]) -> Result<StackValue> {
        self.static_fields.borrow().get(name).cloned().ok_or_else(|| {
            ResolutionError::NoSuchField {
                class: self.display_name(),
                field: String::from_utf8_lossy(name).into_owned(),
            }
            .into()
        })
    }

    pub fn set_static_field(&self, name: &[u8], value: StackValue) {
        self.static_fields.borrow_mut().insert(name.to_vec(), value);
    }

    /// Gives every declared static field a slot in the static map, keeping
    /// values that are already present.
    pub fn prepare_static_fields(&self) -> Result<()> {
        for field in self.fields.iter().filter(|f| f.access_flags.is_static()) {
            let name = self.constant_pool.utf8(field.name_index)?;
            if self.static_fields.borrow().contains_key(name) {
                continue;
            }
            let value = self.initial_value(field)?;
            self.set_static_field(name, value);
        }
        Ok(())
    }

    /// Allocates an instance with one slot per non-static field.
    pub fn new_instance(self: &Rc<Self>) -> Result<ObjectRef> {
        let mut instance = Instance::new(Rc::clone(self));
        for field in self.fields.iter().filter(|f| !f.access_flags.is_static()) {
            let name = self.constant_pool.utf8(field.name_index)?;
            instance.set_field(name, self.initial_value(field)?);
        }
        Ok(Rc::new(RefCell::new(instance)))
    }

    /// Cross-checks the pool and every index the class record holds into it.
    pub fn validate(&self) -> std::result::Result<(), StructuralError> {
        let pool = &self.constant_pool;
        pool.validate()?;
        pool.class_name(self.this_class)?;
        if let Some(index) = self.super_class {
            pool.class_name(index)?;
        }
        for index in &self.interfaces {
            pool.class_name(*index)?;
        }
        validate_attributes(pool, &self.attributes)?;
        for field in &self.fields {
            pool.utf8(field.name_index)?;
            pool.utf8(field.descriptor_index)?;
            validate_attributes(pool, &field.attributes)?;
        }
        for method in &self.methods {
            pool.utf8(method.name_index)?;
            validate_attributes(pool, &method.attributes)?;
        }
        Ok(())
    }
}

/// Checks the pool indices held by attributes, descending into `Code`.
fn validate_attributes(
    pool: &ConstantPool,
    attributes: &Attributes,
) -> std::result::Result<(), StructuralError> {
    for attribute in attributes.iter() {
        match attribute {
            AttributeInfo::SourceFileAttribute { sourcefile_index } => {
                pool.utf8(*sourcefile_index)?;
            }
            AttributeInfo::SignatureAttribute { signature_index } => {
                pool.utf8(*signature_index)?;
            }
            AttributeInfo::ConstantValueAttribute {
                constant_value_index,
            } => {
                pool.literal(*constant_value_index)?;
            }
            AttributeInfo::CodeAttribute { attributes, .. } => {
                validate_attributes(pool, attributes)?;
            }
            _ => (),
        }
    }
    Ok(())
}
