//! Loaded classes, where their bytes come from, and lazy initialization.
//!
//! A registry owns every class it has defined, keyed by the class's own
//! slash separated name. Classes are registered once and never replaced.
//! Initialization walks the superclass chain, loading missing classes from
//! the registry's `ClassSource` on the way.
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::class::{ClassFile, InitializationState, MethodInfo};
use crate::error::{Error, LinkError, ResolutionError, Result};
use crate::jvm::{read_class_file, JVMParser};

/// Somewhere class bytes can be read from by name.
pub trait ClassSource {
    /// Bytes of the class called `name`, or `None` when this source does not
    /// have it. Names may use `/` or `.` as the package separator.
    fn read_class(&self, name: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Directory roots searched in order for `a/b/C.class`.
#[derive(Debug, Clone, Default)]
pub struct ClassPath {
    roots: Vec<PathBuf>,
}

impl ClassPath {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Location of `name` relative to a class path root.
    pub fn relative_path(name: &str) -> PathBuf {
        PathBuf::from(format!("{}.class", name.replace('.', "/")))
    }
}

impl ClassSource for ClassPath {
    fn read_class(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let relative = Self::relative_path(name);
        for root in &self.roots {
            match fs::read(root.join(&relative)) {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}

/// Class bytes held in memory, keyed by slash separated name.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    classes: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) -> &mut Self {
        self.classes.insert(name.replace('.', "/"), bytes);
        self
    }
}

impl ClassSource for MemorySource {
    fn read_class(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.classes.get(&name.replace('.', "/")).cloned())
    }
}

/// A method picked by overload resolution, together with its class.
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    pub class: Rc<ClassFile>,
    index: usize,
}

impl ResolvedMethod {
    pub fn method(&self) -> &MethodInfo {
        &self.class.methods[self.index]
    }
}

pub struct ClassRegistry {
    classes: HashMap<Vec<u8>, Rc<ClassFile>>,
    source: Box<dyn ClassSource>,
}

impl ClassRegistry {
    pub fn new(source: impl ClassSource + 'static) -> Self {
        Self {
            classes: HashMap::new(),
            source: Box::new(source),
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        self.classes.contains_key(name)
    }

    /// Adds `class` under its own name. If a class of that name is already
    /// present the existing one is kept and returned.
    pub fn register(&mut self, class: ClassFile) -> Result<Rc<ClassFile>> {
        let name = class.name()?.to_vec();
        if let Some(existing) = self.classes.get(&name) {
            debug!(class = %class.display_name(), "class already registered");
            return Ok(Rc::clone(existing));
        }
        debug!(class = %class.display_name(), "registered class");
        let class = Rc::new(class);
        self.classes.insert(name, Rc::clone(&class));
        Ok(class)
    }

    pub fn get(&self, name: &[u8]) -> Option<Rc<ClassFile>> {
        self.classes.get(name).cloned()
    }

    /// Like `get`, failing with `ClassNotFound` when absent.
    pub fn lookup(&self, name: &[u8]) -> Result<Rc<ClassFile>> {
        self.get(name)
            .ok_or_else(|| ResolutionError::ClassNotFound(lossy(name)).into())
    }

    fn parse(bytes: &[u8]) -> Result<ClassFile> {
        let class = JVMParser::parse(bytes)?;
        class.validate()?;
        Ok(class)
    }

    /// Parses, validates and registers a class. Nothing is registered when
    /// either step fails.
    pub fn define_class(&mut self, bytes: &[u8]) -> Result<Rc<ClassFile>> {
        let class = Self::parse(bytes)?;
        self.register(class)
    }

    pub fn define_class_file(&mut self, path: impl AsRef<Path>) -> Result<Rc<ClassFile>> {
        let bytes = read_class_file(path)?;
        self.define_class(&bytes)
    }

    /// Returns the registered class called `name`, reading and defining it
    /// from the class source on first use.
    pub fn load(&mut self, name: &[u8]) -> Result<Rc<ClassFile>> {
        if let Some(class) = self.get(name) {
            return Ok(class);
        }
        let wanted = lossy(name);
        let bytes = self
            .source
            .read_class(&wanted)?
            .ok_or_else(|| ResolutionError::ClassNotFound(wanted.clone()))?;
        let class = Self::parse(&bytes)?;
        if class.name()? != name {
            return Err(ResolutionError::NameMismatch {
                expected: wanted,
                found: class.display_name(),
            }
            .into());
        }
        debug!(class = %wanted, bytes = bytes.len(), "loaded class from source");
        self.register(class)
    }

    /// Links `class` to its superclass chain and prepares its static
    /// fields. Re-entering a class that is already in progress returns
    /// immediately, which is what ends inheritance cycles. A class whose
    /// initialization failed stays failed.
    pub fn initialize(&mut self, class: &Rc<ClassFile>) -> Result<()> {
        match class.state() {
            InitializationState::Done | InitializationState::InProgress => return Ok(()),
            InitializationState::Error => {
                return Err(LinkError::NoClassDefFound(class.display_name()).into())
            }
            InitializationState::Verified => (),
        }

        class.set_state(InitializationState::InProgress);
        debug!(class = %class.display_name(), "initializing class");
        let result = self
            .initialize_superclass(class)
            .map_err(|source| {
                Error::from(LinkError::Superclass {
                    class: class.display_name(),
                    source: Box::new(source),
                })
            })
            .and_then(|()| class.prepare_static_fields());

        match result {
            Ok(()) => {
                class.set_state(InitializationState::Done);
                debug!(class = %class.display_name(), "class initialized");
                Ok(())
            }
            Err(err) => {
                class.set_state(InitializationState::Error);
                warn!(class = %class.display_name(), error = %err, "class initialization failed");
                Err(err)
            }
        }
    }

    fn initialize_superclass(&mut self, class: &Rc<ClassFile>) -> Result<()> {
        if class.is_interface() {
            return Ok(());
        }
        let Some(super_name) = class.super_class_name()? else {
            return Ok(());
        };
        let superclass = self.load(super_name)?;
        self.initialize(&superclass)
    }

    /// Loads `class_name` and selects its method `name` by the parameter
    /// part of `descriptor`.
    pub fn resolve_method(
        &mut self,
        class_name: &[u8],
        name: &[u8],
        descriptor: &[u8],
    ) -> Result<ResolvedMethod> {
        let class = self.load(class_name)?;
        let index = class.resolve_overload_index(name, descriptor)?;
        Ok(ResolvedMethod { class, index })
    }
}

fn lossy(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}
