//! JVM runtime module responsible for creating a new runtime
//! environment and running programs.
//!
//! Every invocation shares one `OperandStack`. A `Frame` tracks how many of
//! the values on it were pushed by its own invocation and refuses to pop
//! past them, so a method can never consume its caller's operands.
use std::rc::Rc;

use tracing::{debug, trace};

use crate::bytecode::OPCode;
use crate::class::{ClassFile, Code, MethodBody, MethodInfo};
use crate::constant_pool::CPInfo;
use crate::error::{Error, ExecutionError, ResolutionError, Result, StructuralError};
use crate::reader::ByteReader;
use crate::registry::ClassRegistry;
use crate::value::{ObjectRef, StackValue, Value};

/// Descriptor of the conventional entry point.
pub const MAIN_DESCRIPTOR: &[u8] = b"([Ljava/lang/String;)V";

/// LIFO of tagged values shared by all frames.
#[derive(Debug, Default)]
pub struct OperandStack {
    values: Vec<StackValue>,
}

impl OperandStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: StackValue) {
        self.values.push(value);
    }

    pub fn pop(&mut self) -> Result<StackValue> {
        self.values
            .pop()
            .ok_or_else(|| ExecutionError::StackUnderflow.into())
    }

    pub fn peek(&self) -> Option<&StackValue> {
        self.values.last()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Runs `method` of `class` with `args` already in call order, the receiver
/// first for instance methods. Results are left on `stack`.
pub fn run_method(
    registry: &mut ClassRegistry,
    class: &Rc<ClassFile>,
    method: &MethodInfo,
    stack: &mut OperandStack,
    args: Vec<StackValue>,
) -> Result<()> {
    match method.body() {
        MethodBody::Native(native) => native.call(class, stack, &args),
        MethodBody::Bytecode => {
            let code = method.code().ok_or_else(|| ResolutionError::MissingCode {
                class: class.display_name(),
                name: method
                    .name(&class.constant_pool)
                    .map(|name| String::from_utf8_lossy(name).into_owned())
                    .unwrap_or_default(),
            })?;
            Frame::new(class, code, args).run(registry, stack)
        }
    }
}

/// Activation record of one bytecode invocation.
struct Frame<'a> {
    class: &'a Rc<ClassFile>,
    code: &'a [u8],
    locals: Vec<StackValue>,
    pc: usize,
    // Values this frame has pushed that are still on the shared stack.
    pushed: usize,
}

impl<'a> Frame<'a> {
    fn new(class: &'a Rc<ClassFile>, code: Code<'a>, args: Vec<StackValue>) -> Self {
        let mut locals = Vec::with_capacity(usize::from(code.max_locals));
        for arg in args {
            let wide = arg.width() == 2;
            locals.push(arg);
            if wide {
                locals.push(StackValue::null());
            }
        }
        if locals.len() < usize::from(code.max_locals) {
            locals.resize(usize::from(code.max_locals), StackValue::null());
        }
        Self {
            class,
            code: code.code,
            locals,
            pc: 0,
            pushed: 0,
        }
    }

    fn push(&mut self, stack: &mut OperandStack, value: StackValue) {
        stack.push(value);
        self.pushed += 1;
    }

    fn pop(&mut self, stack: &mut OperandStack) -> Result<StackValue> {
        if self.pushed == 0 {
            return Err(ExecutionError::StackUnderflow.into());
        }
        self.pushed -= 1;
        stack.pop()
    }

    fn load(&self, index: usize) -> Result<StackValue> {
        self.locals
            .get(index)
            .cloned()
            .ok_or_else(|| self.local_out_of_range(index))
    }

    fn store(&mut self, index: usize, value: StackValue) -> Result<()> {
        let len = self.locals.len();
        match self.locals.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ExecutionError::LocalOutOfRange { index, len }.into()),
        }
    }

    fn local_out_of_range(&self, index: usize) -> Error {
        ExecutionError::LocalOutOfRange {
            index,
            len: self.locals.len(),
        }
        .into()
    }

    /// Executes until `return` or `areturn`.
    fn run(&mut self, registry: &mut ClassRegistry, stack: &mut OperandStack) -> Result<()> {
        let class = self.class;
        let code = self.code;
        let pool = &class.constant_pool;
        loop {
            let pc = self.pc;
            let opcode = match code.get(pc) {
                Some(byte) => OPCode::from(*byte),
                None => return Err(ExecutionError::MissingReturn.into()),
            };
            let mnemonic = opcode.mnemonic();
            let operands = code
                .get(pc + 1..pc + 1 + opcode.operand_width())
                .ok_or(ExecutionError::TruncatedInstruction { mnemonic, pc })?;
            let mut operands = ByteReader::new(operands);
            self.pc += 1 + opcode.operand_width();
            trace!(
                class = %class.display_name(),
                pc,
                opcode = mnemonic,
                depth = stack.len(),
                "dispatch"
            );

            match opcode {
                OPCode::NOP => (),
                OPCode::Iconst1 => self.push(stack, StackValue::int(1)),
                OPCode::Dconst1 => self.push(stack, StackValue::new(Value::Double(1.0))),
                OPCode::BiPush => {
                    let value = i32::from(operands.read_i8()?);
                    self.push(stack, StackValue::int(value));
                }
                OPCode::SiPush => {
                    let value = i32::from(operands.read_i16()?);
                    self.push(stack, StackValue::int(value));
                }
                OPCode::Ldc => {
                    let index = usize::from(operands.read_u8()?)
                        .checked_sub(1)
                        .ok_or(StructuralError::ReservedPoolIndex)?;
                    let value = pool
                        .literal(index)
                        .map_err(|_| ExecutionError::InvalidConstant { mnemonic, index })?;
                    self.push(stack, value);
                }
                OPCode::Ldc2W => {
                    let index = operands.read_pool_index()?;
                    match pool.get(index)? {
                        CPInfo::ConstantLong { .. } | CPInfo::ConstantDouble { .. } => {
                            self.push(stack, pool.literal(index)?)
                        }
                        _ => return Err(ExecutionError::InvalidConstant { mnemonic, index }.into()),
                    }
                }
                OPCode::ALoad0 => {
                    let value = self.load(0)?;
                    self.push(stack, value);
                }
                OPCode::ALoad1 => {
                    let value = self.load(1)?;
                    self.push(stack, value);
                }
                OPCode::AStore0 => {
                    let value = self.pop(stack)?;
                    self.store(0, value)?;
                }
                OPCode::AStore1 => {
                    let value = self.pop(stack)?;
                    self.store(1, value)?;
                }
                OPCode::Dup => {
                    let value = self.pop(stack)?;
                    self.push(stack, value.clone());
                    self.push(stack, value);
                }
                OPCode::GetStatic => {
                    let field = pool.member_ref(operands.read_pool_index()?)?;
                    let owner = registry.load(field.class_name)?;
                    registry.initialize(&owner)?;
                    let value = owner.get_static_field(field.name)?;
                    self.push(stack, value);
                }
                OPCode::GetField => {
                    let field = pool.member_ref(operands.read_pool_index()?)?;
                    let value = match self.pop(stack)?.value {
                        Value::Object(object) => read_field(&object, field.name)?,
                        Value::Null => {
                            let name = String::from_utf8_lossy(field.name).into_owned();
                            return Err(ExecutionError::NullFieldLoad(name).into());
                        }
                        other => {
                            return Err(ExecutionError::NotAnInstance(other.to_string()).into())
                        }
                    };
                    self.push(stack, value);
                }
                OPCode::PutField => {
                    let field = pool.member_ref(operands.read_pool_index()?)?;
                    let value = self.pop(stack)?;
                    match self.pop(stack)?.value {
                        Value::Object(object) => object.borrow_mut().set_field(field.name, value),
                        Value::Null => {
                            let name = String::from_utf8_lossy(field.name).into_owned();
                            return Err(ExecutionError::NullFieldStore(name).into());
                        }
                        other => {
                            return Err(ExecutionError::NotAnInstance(other.to_string()).into())
                        }
                    }
                }
                OPCode::New => {
                    let name = pool.class_name(operands.read_pool_index()?)?;
                    let target = registry.load(name)?;
                    let object = target.new_instance()?;
                    self.push(stack, StackValue::object(object));
                }
                OPCode::InvokeVirtual | OPCode::InvokeSpecial => {
                    let member = pool.member_ref(operands.read_pool_index()?)?;
                    let resolved =
                        registry.resolve_method(member.class_name, member.name, member.descriptor)?;
                    let target = resolved.method();

                    let mut args = Vec::with_capacity(target.signature().params.len() + 1);
                    for _ in 0..target.signature().params.len() {
                        args.push(self.pop(stack)?);
                    }
                    if !target.is_static() {
                        args.push(self.pop(stack)?);
                    }
                    args.reverse();

                    debug!(
                        caller = %class.display_name(),
                        target = %resolved.class.display_name(),
                        method = %String::from_utf8_lossy(member.name),
                        descriptor = %String::from_utf8_lossy(member.descriptor),
                        "invoke"
                    );
                    let before = stack.len();
                    run_method(registry, &resolved.class, target, stack, args)?;
                    let pushed = stack
                        .len()
                        .checked_sub(before)
                        .ok_or(ExecutionError::StackUnderflow)?;
                    self.pushed += pushed;
                }
                OPCode::Return => return Ok(()),
                OPCode::AReturn => {
                    let result = self.pop(stack)?;
                    while self.pushed > 0 {
                        self.pop(stack)?;
                    }
                    stack.push(result);
                    return Ok(());
                }
                OPCode::Unsupported(opcode) => {
                    return Err(ExecutionError::UnsupportedOpcode { opcode, pc }.into())
                }
            }
        }
    }
}

fn read_field(object: &ObjectRef, name: &[u8]) -> Result<StackValue> {
    let instance = object.borrow();
    if let Some(value) = instance.get_field(name) {
        return Ok(value.clone());
    }
    Err(ResolutionError::NoSuchField {
        class: instance.class_name(),
        field: String::from_utf8_lossy(name).into_owned(),
    }
    .into())
}

/// `Runtime` represents an execution context for JVM programs: a class
/// registry and the operand stack every invocation shares.
pub struct Runtime {
    registry: ClassRegistry,
    stack: OperandStack,
}

impl Runtime {
    pub fn new(registry: ClassRegistry) -> Self {
        Self {
            registry,
            stack: OperandStack::new(),
        }
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    /// Runs `main([Ljava/lang/String;)V` of `class_name` with a null
    /// argument array.
    pub fn run_main(&mut self, class_name: &[u8]) -> Result<()> {
        self.invoke(class_name, b"main", MAIN_DESCRIPTOR, vec![StackValue::null()])
    }

    /// Loads and initializes `class_name`, then runs the overload of `name`
    /// matching `descriptor` with `args` in call order.
    pub fn invoke(
        &mut self,
        class_name: &[u8],
        name: &[u8],
        descriptor: &[u8],
        args: Vec<StackValue>,
    ) -> Result<()> {
        let class = self.registry.load(class_name)?;
        self.registry.initialize(&class)?;
        let resolved = self.registry.resolve_method(class_name, name, descriptor)?;
        debug!(
            class = %class.display_name(),
            method = %String::from_utf8_lossy(name),
            args = args.len(),
            "running method"
        );
        run_method(
            &mut self.registry,
            &resolved.class,
            resolved.method(),
            &mut self.stack,
            args,
        )
    }
}
