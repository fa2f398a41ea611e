//! Bootstrap classes whose methods run host code instead of bytecode.
//!
//! Native classes are ordinary `ClassFile` records with a real constant pool,
//! so name and overload lookups work on them exactly as on parsed classes.
//! Only the method body differs: the interpreter hands a native method the
//! owning class, the shared operand stack and the ordered arguments (the
//! receiver first), and the method pushes its own result if it has one.
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use tracing::debug;

use crate::attribute::Attributes;
use crate::class::{AccessFlags, ClassFile, FieldInfo, InitializationState, MethodInfo};
use crate::constant_pool::{CPInfo, ConstantPool};
use crate::error::Result;
use crate::registry::ClassRegistry;
use crate::runtime::OperandStack;
use crate::value::{StackValue, Value};

/// Signature every host callable implements.
pub type NativeFn = dyn Fn(&ClassFile, &mut OperandStack, &[StackValue]) -> Result<()>;

/// Shared writer the console natives print to.
pub type Console = Rc<RefCell<dyn Write>>;

#[derive(Clone)]
pub struct NativeMethod {
    name: Rc<str>,
    function: Rc<NativeFn>,
}

impl NativeMethod {
    pub fn new<F>(name: &str, function: F) -> Self
    where
        F: Fn(&ClassFile, &mut OperandStack, &[StackValue]) -> Result<()> + 'static,
    {
        Self {
            name: Rc::from(name),
            function: Rc::new(function),
        }
    }

    pub fn call(
        &self,
        class: &ClassFile,
        stack: &mut OperandStack,
        args: &[StackValue],
    ) -> Result<()> {
        (self.function)(class, stack, args)
    }
}

impl fmt::Debug for NativeMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NativeMethod({})", self.name)
    }
}

/// Assembles a native `ClassFile` entry by entry.
pub struct NativeClassBuilder {
    pool: ConstantPool,
    utf8: HashMap<String, usize>,
    this_class: usize,
    super_class: Option<usize>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    statics: Vec<(Vec<u8>, StackValue)>,
}

impl NativeClassBuilder {
    /// A class extending `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        let mut builder = Self::root(name);
        let super_class = builder.class_entry("java/lang/Object");
        builder.super_class = Some(super_class);
        builder
    }

    /// A class with no superclass.
    pub fn root(name: &str) -> Self {
        let mut builder = Self {
            pool: ConstantPool::new(),
            utf8: HashMap::new(),
            this_class: 0,
            super_class: None,
            fields: Vec::new(),
            methods: Vec::new(),
            statics: Vec::new(),
        };
        builder.this_class = builder.class_entry(name);
        builder
    }

    fn utf8(&mut self, s: &str) -> usize {
        if let Some(index) = self.utf8.get(s) {
            return *index;
        }
        let index = self.pool.push_utf8(s);
        self.utf8.insert(s.to_string(), index);
        index
    }

    fn class_entry(&mut self, name: &str) -> usize {
        let name_index = self.utf8(name);
        self.pool.push(CPInfo::ConstantClass { name_index })
    }

    /// Adds a public native method.
    pub fn method<F>(&mut self, name: &str, descriptor: &str, function: F) -> Result<&mut Self>
    where
        F: Fn(&ClassFile, &mut OperandStack, &[StackValue]) -> Result<()> + 'static,
    {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let native = NativeMethod::new(&format!("{name}{descriptor}"), function);
        self.methods.push(MethodInfo::native(
            AccessFlags::new(AccessFlags::PUBLIC | AccessFlags::NATIVE),
            name_index,
            descriptor_index,
            &self.pool,
            native,
        )?);
        Ok(self)
    }

    /// Adds a public static field with a seeded value.
    pub fn static_field(&mut self, name: &str, descriptor: &str, value: StackValue) -> &mut Self {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.fields.push(FieldInfo {
            access_flags: AccessFlags::new(AccessFlags::PUBLIC | AccessFlags::STATIC),
            name_index,
            descriptor_index,
            attributes: Attributes::default(),
        });
        self.statics.push((name.as_bytes().to_vec(), value));
        self
    }

    /// Finishes the class. Native classes are born initialized.
    pub fn build(self) -> ClassFile {
        let mut class = ClassFile::new(self.pool, self.this_class);
        class.super_class = self.super_class;
        class.fields = self.fields;
        class.methods = self.methods;
        for (name, value) in self.statics {
            class.set_static_field(&name, value);
        }
        class.set_state(InitializationState::Done);
        class
    }
}

fn print_line(out: &Console, args: &[StackValue]) -> Result<()> {
    let mut out = out.borrow_mut();
    match args.get(1) {
        Some(value) => writeln!(out, "{value}")?,
        None => writeln!(out)?,
    }
    Ok(())
}

/// Registers the bootstrap classes: `java/lang/Object`, `java/lang/String`,
/// `java/io/PrintStream` printing to `out`, and `java/lang/System` whose
/// static `out` field holds a `PrintStream` instance.
pub fn install(registry: &mut ClassRegistry, out: Console) -> Result<()> {
    let mut object = NativeClassBuilder::root("java/lang/Object");
    object.method("<init>", "()V", |_, _, _| Ok(()))?;
    registry.register(object.build())?;

    let mut string = NativeClassBuilder::new("java/lang/String");
    string.method("length", "()I", |_, stack, args| {
        let length = match args.first().map(|receiver| &receiver.value) {
            Some(Value::String(s)) => s.encode_utf16().count() as i32,
            _ => 0,
        };
        stack.push(StackValue::int(length));
        Ok(())
    })?;
    registry.register(string.build())?;

    let mut print_stream = NativeClassBuilder::new("java/io/PrintStream");
    for descriptor in [
        "()V",
        "(Ljava/lang/String;)V",
        "(Ljava/lang/Object;)V",
        "(D)V",
        "(F)V",
        "(I)V",
        "(J)V",
    ] {
        let out = Rc::clone(&out);
        print_stream.method("println", descriptor, move |_, _, args| print_line(&out, args))?;
    }
    let print_stream = registry.register(print_stream.build())?;

    let mut system = NativeClassBuilder::new("java/lang/System");
    system.static_field(
        "out",
        "Ljava/io/PrintStream;",
        StackValue::object(print_stream.new_instance()?),
    );
    registry.register(system.build())?;

    debug!(classes = registry.len(), "installed native bridge");
    Ok(())
}
