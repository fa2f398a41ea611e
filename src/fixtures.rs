//! Assembler for small class files used by unit tests.
use std::collections::HashMap;

use byteorder::{BigEndian, WriteBytesExt};

use crate::class::AccessFlags;

/// Builds the on-disk form of a class. Pool helpers return the 1-based
/// index an instruction operand or class record would carry.
pub(crate) struct ClassAssembler {
    pool: Vec<u8>,
    next_index: u16,
    utf8: HashMap<String, u16>,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    attributes: Vec<Vec<u8>>,
}

impl ClassAssembler {
    pub fn new(name: &str, super_name: Option<&str>) -> Self {
        let mut assembler = Self {
            pool: Vec::new(),
            next_index: 1,
            utf8: HashMap::new(),
            access_flags: AccessFlags::PUBLIC | AccessFlags::SUPER,
            this_class: 0,
            super_class: 0,
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        };
        assembler.this_class = assembler.class(name);
        if let Some(super_name) = super_name {
            assembler.super_class = assembler.class(super_name);
        }
        assembler
    }

    pub fn interface(&mut self) -> &mut Self {
        self.access_flags = AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT;
        self
    }

    fn entry(&mut self, bytes: &[u8], slots: u16) -> u16 {
        let index = self.next_index;
        self.pool.extend_from_slice(bytes);
        self.next_index += slots;
        index
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        if let Some(index) = self.utf8.get(s) {
            return *index;
        }
        let mut bytes = vec![1];
        bytes.write_u16::<BigEndian>(s.len() as u16).unwrap();
        bytes.extend_from_slice(s.as_bytes());
        let index = self.entry(&bytes, 1);
        self.utf8.insert(s.to_string(), index);
        index
    }

    /// Appends an entry with an arbitrary tag and payload.
    pub fn raw_entry(&mut self, tag: u8, payload: &[u8]) -> u16 {
        let mut bytes = vec![tag];
        bytes.extend_from_slice(payload);
        self.entry(&bytes, 1)
    }

    fn indexed(&mut self, tag: u8, indices: &[u16]) -> u16 {
        let mut bytes = vec![tag];
        for index in indices {
            bytes.write_u16::<BigEndian>(*index).unwrap();
        }
        self.entry(&bytes, 1)
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.indexed(7, &[name])
    }

    pub fn string(&mut self, s: &str) -> u16 {
        let s = self.utf8(s);
        self.indexed(8, &[s])
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        let mut bytes = vec![3];
        bytes.write_i32::<BigEndian>(value).unwrap();
        self.entry(&bytes, 1)
    }

    pub fn float(&mut self, value: f32) -> u16 {
        let mut bytes = vec![4];
        bytes.write_u32::<BigEndian>(value.to_bits()).unwrap();
        self.entry(&bytes, 1)
    }

    pub fn long(&mut self, value: i64) -> u16 {
        let mut bytes = vec![5];
        bytes.write_i64::<BigEndian>(value).unwrap();
        self.entry(&bytes, 2)
    }

    pub fn double(&mut self, value: f64) -> u16 {
        let mut bytes = vec![6];
        bytes.write_u64::<BigEndian>(value.to_bits()).unwrap();
        self.entry(&bytes, 2)
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.indexed(12, &[name, descriptor])
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.indexed(9, &[class, name_and_type])
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.indexed(10, &[class, name_and_type])
    }

    fn attribute_bytes(&mut self, name: &str, info: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.write_u16::<BigEndian>(self.utf8(name)).unwrap();
        bytes.write_u32::<BigEndian>(info.len() as u32).unwrap();
        bytes.extend_from_slice(info);
        bytes
    }

    fn member(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        attributes: &[Vec<u8>],
    ) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.write_u16::<BigEndian>(flags).unwrap();
        bytes.write_u16::<BigEndian>(self.utf8(name)).unwrap();
        bytes.write_u16::<BigEndian>(self.utf8(descriptor)).unwrap();
        bytes.write_u16::<BigEndian>(attributes.len() as u16).unwrap();
        for attribute in attributes {
            bytes.extend_from_slice(attribute);
        }
        bytes
    }

    /// Adds a field, optionally carrying a `ConstantValue` pointing at `constant`.
    pub fn field(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        constant: Option<u16>,
    ) -> &mut Self {
        let attributes = match constant {
            Some(index) => vec![self.attribute_bytes("ConstantValue", &index.to_be_bytes())],
            None => Vec::new(),
        };
        let field = self.member(flags, name, descriptor, &attributes);
        self.fields.push(field);
        self
    }

    /// Adds a method with a `Code` attribute and no exception table.
    pub fn method(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        max_locals: u16,
        code: &[u8],
    ) -> &mut Self {
        let mut info = Vec::new();
        info.write_u16::<BigEndian>(16).unwrap();
        info.write_u16::<BigEndian>(max_locals).unwrap();
        info.write_u32::<BigEndian>(code.len() as u32).unwrap();
        info.extend_from_slice(code);
        info.write_u16::<BigEndian>(0).unwrap();
        info.write_u16::<BigEndian>(0).unwrap();
        let attributes = vec![self.attribute_bytes("Code", &info)];
        let method = self.member(flags, name, descriptor, &attributes);
        self.methods.push(method);
        self
    }

    /// Adds a method without a `Code` attribute.
    pub fn bodyless_method(&mut self, flags: u16, name: &str, descriptor: &str) -> &mut Self {
        let method = self.member(flags, name, descriptor, &[]);
        self.methods.push(method);
        self
    }

    /// Adds a class level attribute with a raw payload.
    pub fn attribute(&mut self, name: &str, info: &[u8]) -> &mut Self {
        let attribute = self.attribute_bytes(name, info);
        self.attributes.push(attribute);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.write_u32::<BigEndian>(0xCAFE_BABE).unwrap();
        bytes.write_u16::<BigEndian>(0).unwrap();
        bytes.write_u16::<BigEndian>(52).unwrap();
        bytes.write_u16::<BigEndian>(self.next_index).unwrap();
        bytes.extend_from_slice(&self.pool);
        bytes.write_u16::<BigEndian>(self.access_flags).unwrap();
        bytes.write_u16::<BigEndian>(self.this_class).unwrap();
        bytes.write_u16::<BigEndian>(self.super_class).unwrap();
        bytes.write_u16::<BigEndian>(0).unwrap();
        for table in [&self.fields, &self.methods, &self.attributes] {
            bytes.write_u16::<BigEndian>(table.len() as u16).unwrap();
            for entry in table {
                bytes.extend_from_slice(entry);
            }
        }
        bytes
    }
}
