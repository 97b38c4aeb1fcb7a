use super::bytes::PutBytes;
use super::{ClassEncodeError, Result};
use crate::constant_pool_entry as tag;
use crate::{ClassConstant, ConstantDynamic, Handle};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Entry {
    Utf8(Rc<str>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    Member(u8, u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u8, u16, u16),
    Module(u16),
    Package(u16),
}

impl Entry {
    fn width(&self) -> u16 {
        match self {
            Entry::Long(_) | Entry::Double(_) => 2,
            _ => 1
        }
    }
}

///Append-only constant pool builder.
///
///Each entry is stored once; asking for an entry that is already present returns the index it was
///given the first time. Bootstrap methods are collected alongside, since `invokedynamic` and
///dynamic constants refer to them by position.
#[derive(Debug)]
pub(crate) struct ConstantPool {
    bytes: Vec<u8>,
    next: u16,
    entries: HashMap<Entry, u16>,
    bootstrap_methods: Vec<(u16, Vec<u16>)>,
    bootstrap_index: HashMap<(u16, Vec<u16>), u16>,
}

impl ConstantPool {
    pub(crate) fn new() -> ConstantPool {
        ConstantPool {
            bytes: Vec::new(),
            next: 1,
            entries: HashMap::new(),
            bootstrap_methods: Vec::new(),
            bootstrap_index: HashMap::new(),
        }
    }

    ///Value of the `constant_pool_count` field.
    pub(crate) fn count(&self) -> u16 {
        self.next
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.put_u2(self.next);
        out.extend_from_slice(&self.bytes);
    }

    pub(crate) fn has_bootstrap_methods(&self) -> bool {
        !self.bootstrap_methods.is_empty()
    }

    ///Body of the `BootstrapMethods` attribute.
    pub(crate) fn bootstrap_methods_info(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u2(self.bootstrap_methods.len() as u16);
        for (handle, args) in &self.bootstrap_methods {
            out.put_u2(*handle);
            out.put_u2(args.len() as u16);
            for arg in args {
                out.put_u2(*arg);
            }
        }
        out
    }

    fn intern(&mut self, entry: Entry) -> Result<u16> {
        if let Some(idx) = self.entries.get(&entry) {
            return Ok(*idx);
        }
        let idx = self.next;
        let next = match idx.checked_add(entry.width()) {
            Some(next) => next,
            None => return Err(ClassEncodeError::ConstantPoolOverflow)
        };
        self.encode(&entry)?;
        self.next = next;
        self.entries.insert(entry, idx);
        Ok(idx)
    }

    fn encode(&mut self, entry: &Entry) -> Result<()> {
        let out = &mut self.bytes;
        match entry {
            Entry::Utf8(s) => {
                let encoded = cesu8::to_java_cesu8(s);
                if encoded.len() > u16::max_value() as usize {
                    return Err(ClassEncodeError::StringTooLong(encoded.len()));
                }
                out.put_u1(tag::UTF8);
                out.put_u2(encoded.len() as u16);
                out.extend_from_slice(&encoded);
            },
            Entry::Integer(v) => {
                out.put_u1(tag::INT);
                out.put_i4(*v);
            },
            Entry::Float(bits) => {
                out.put_u1(tag::FLOAT);
                out.put_u4(*bits);
            },
            Entry::Long(v) => {
                out.put_u1(tag::LONG);
                out.put_u8(*v as u64);
            },
            Entry::Double(bits) => {
                out.put_u1(tag::DOUBLE);
                out.put_u8(*bits);
            },
            Entry::Class(name) => {
                out.put_u1(tag::CLASS);
                out.put_u2(*name);
            },
            Entry::String(value) => {
                out.put_u1(tag::STR);
                out.put_u2(*value);
            },
            Entry::Member(kind, owner, name_and_type) => {
                out.put_u1(*kind);
                out.put_u2(*owner);
                out.put_u2(*name_and_type);
            },
            Entry::NameAndType(name, desc) => {
                out.put_u1(tag::NAME_TYPE);
                out.put_u2(*name);
                out.put_u2(*desc);
            },
            Entry::MethodHandle(kind, member) => {
                out.put_u1(tag::HANDLE);
                out.put_u1(*kind);
                out.put_u2(*member);
            },
            Entry::MethodType(desc) => {
                out.put_u1(tag::MTYPE);
                out.put_u2(*desc);
            },
            Entry::Dynamic(kind, bsm, name_and_type) => {
                out.put_u1(*kind);
                out.put_u2(*bsm);
                out.put_u2(*name_and_type);
            },
            Entry::Module(name) => {
                out.put_u1(tag::MODULE);
                out.put_u2(*name);
            },
            Entry::Package(name) => {
                out.put_u1(tag::PACKAGE);
                out.put_u2(*name);
            },
        }
        Ok(())
    }

    pub(crate) fn utf8(&mut self, s: &str) -> Result<u16> {
        self.intern(Entry::Utf8(Rc::from(s)))
    }

    ///`name` is an internal name, or a descriptor for array classes.
    pub(crate) fn class(&mut self, name: &str) -> Result<u16> {
        let name = self.utf8(name)?;
        self.intern(Entry::Class(name))
    }

    pub(crate) fn string(&mut self, value: &str) -> Result<u16> {
        let value = self.utf8(value)?;
        self.intern(Entry::String(value))
    }

    pub(crate) fn integer(&mut self, value: i32) -> Result<u16> {
        self.intern(Entry::Integer(value))
    }

    pub(crate) fn float(&mut self, value: f32) -> Result<u16> {
        self.intern(Entry::Float(value.to_bits()))
    }

    pub(crate) fn long(&mut self, value: i64) -> Result<u16> {
        self.intern(Entry::Long(value))
    }

    pub(crate) fn double(&mut self, value: f64) -> Result<u16> {
        self.intern(Entry::Double(value.to_bits()))
    }

    pub(crate) fn name_and_type(&mut self, name: &str, desc: &str) -> Result<u16> {
        let name = self.utf8(name)?;
        let desc = self.utf8(desc)?;
        self.intern(Entry::NameAndType(name, desc))
    }

    pub(crate) fn field_ref(&mut self, owner: &str, name: &str, desc: &str) -> Result<u16> {
        self.member(tag::FIELD, owner, name, desc)
    }

    pub(crate) fn method_ref(&mut self, owner: &str, name: &str, desc: &str, interface: bool) -> Result<u16> {
        let kind = if interface { tag::IMETH } else { tag::METH };
        self.member(kind, owner, name, desc)
    }

    fn member(&mut self, kind: u8, owner: &str, name: &str, desc: &str) -> Result<u16> {
        let owner = self.class(owner)?;
        let name_and_type = self.name_and_type(name, desc)?;
        self.intern(Entry::Member(kind, owner, name_and_type))
    }

    pub(crate) fn method_handle(&mut self, handle: &Handle) -> Result<u16> {
        let member = if handle.is_field() {
            self.field_ref(&handle.owner, &handle.name, &handle.desc)?
        } else {
            self.method_ref(&handle.owner, &handle.name, &handle.desc, handle.interface)?
        };
        self.intern(Entry::MethodHandle(handle.tag, member))
    }

    pub(crate) fn method_type(&mut self, desc: &str) -> Result<u16> {
        let desc = self.utf8(desc)?;
        self.intern(Entry::MethodType(desc))
    }

    pub(crate) fn module(&mut self, name: &str) -> Result<u16> {
        let name = self.utf8(name)?;
        self.intern(Entry::Module(name))
    }

    pub(crate) fn package(&mut self, name: &str) -> Result<u16> {
        let name = self.utf8(name)?;
        self.intern(Entry::Package(name))
    }

    pub(crate) fn bootstrap_method(&mut self, handle: &Handle, args: &[ClassConstant]) -> Result<u16> {
        let handle = self.method_handle(handle)?;
        let mut arg_indices = Vec::with_capacity(args.len());
        for arg in args {
            arg_indices.push(self.constant(arg)?);
        }
        let key = (handle, arg_indices);
        if let Some(idx) = self.bootstrap_index.get(&key) {
            return Ok(*idx);
        }
        if self.bootstrap_methods.len() >= u16::max_value() as usize {
            return Err(ClassEncodeError::TooManyEntries("bootstrap methods"));
        }
        let idx = self.bootstrap_methods.len() as u16;
        self.bootstrap_methods.push(key.clone());
        self.bootstrap_index.insert(key, idx);
        Ok(idx)
    }

    pub(crate) fn dynamic(&mut self, cst: &ConstantDynamic) -> Result<u16> {
        let bsm = self.bootstrap_method(&cst.bootstrap, &cst.args)?;
        let name_and_type = self.name_and_type(&cst.name, &cst.desc)?;
        self.intern(Entry::Dynamic(tag::CONDY, bsm, name_and_type))
    }

    pub(crate) fn invoke_dynamic(&mut self, name: &str, desc: &str, bsm: &Handle, args: &[ClassConstant]) -> Result<u16> {
        let bsm = self.bootstrap_method(bsm, args)?;
        let name_and_type = self.name_and_type(name, desc)?;
        self.intern(Entry::Dynamic(tag::INDY, bsm, name_and_type))
    }

    ///Index of a loadable constant, as used by `ldc`, `ConstantValue` and bootstrap arguments.
    pub(crate) fn constant(&mut self, cst: &ClassConstant) -> Result<u16> {
        match cst {
            ClassConstant::Integer(v) => self.integer(*v),
            ClassConstant::Long(v) => self.long(*v),
            ClassConstant::Float(v) => self.float(*v),
            ClassConstant::Double(v) => self.double(*v),
            ClassConstant::Class(ty) => self.class(ty.internal_name()),
            ClassConstant::String(s) => self.string(s),
            ClassConstant::MethodType(ty) => self.method_type(ty.get_descriptor()),
            ClassConstant::MethodHandle(handle) => self.method_handle(handle),
            ClassConstant::ConstantDynamic(cst) => self.dynamic(cst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Type;

    #[test]
    fn entries_are_shared() {
        let mut pool = ConstantPool::new();
        let a = pool.method_ref("java/io/PrintStream", "println", "(Ljava/lang/String;)V", false).unwrap();
        let b = pool.method_ref("java/io/PrintStream", "println", "(Ljava/lang/String;)V", false).unwrap();
        assert_eq!(a, b);
        let count = pool.count();
        assert_eq!(pool.class("java/io/PrintStream").unwrap(), 2);
        assert_eq!(pool.count(), count);
    }

    #[test]
    fn interface_refs_are_distinct_from_class_refs() {
        let mut pool = ConstantPool::new();
        let a = pool.method_ref("java/lang/Runnable", "run", "()V", false).unwrap();
        let b = pool.method_ref("java/lang/Runnable", "run", "()V", true).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.long(7).unwrap(), 1);
        assert_eq!(pool.integer(7).unwrap(), 3);
        assert_eq!(pool.double(1.5).unwrap(), 4);
        assert_eq!(pool.count(), 6);
    }

    #[test]
    fn class_constants_use_internal_names() {
        let mut pool = ConstantPool::new();
        let from_type = pool.constant(&ClassConstant::Class(Type::new_object_type("java/lang/String"))).unwrap();
        assert_eq!(from_type, pool.class("java/lang/String").unwrap());
    }

    #[test]
    fn utf8_is_modified_utf8() {
        let mut pool = ConstantPool::new();
        pool.utf8("\0").unwrap();
        let mut out = Vec::new();
        pool.write_to(&mut out);
        assert_eq!(out, vec![0, 2, tag::UTF8, 0, 2, 0xC0, 0x80]);
    }

    #[test]
    fn overflow_is_reported() {
        let mut pool = ConstantPool::new();
        for i in 0..(u16::max_value() as i32 - 1) {
            pool.integer(i).unwrap();
        }
        assert_eq!(pool.integer(-1), Err(ClassEncodeError::ConstantPoolOverflow));
    }

    #[test]
    fn bootstrap_methods_are_shared() {
        let mut pool = ConstantPool::new();
        let bsm = Handle::new(Handle::INVOKE_STATIC, "Boot".into(), "bsm".into(), "()V".into(), false);
        let a = pool.invoke_dynamic("run", "()Ljava/lang/Runnable;", &bsm, &[ClassConstant::Integer(1)]).unwrap();
        let b = pool.invoke_dynamic("call", "()Ljava/lang/Runnable;", &bsm, &[ClassConstant::Integer(1)]).unwrap();
        assert_ne!(a, b);
        assert!(pool.has_bootstrap_methods());
        let info = pool.bootstrap_methods_info();
        assert_eq!(&info[..2], &[0, 1]);
    }
}
