//! Parses a class file and reports its contents to a [`ClassVisitor`].
use super::{ClassVisitor, AnnotationVisitor, MethodVisitor, FieldVisitor, RecordComponentVisitor};
use super::{Type, TypeRef, TypePath, TypePathEntry, LocalVariableSpan, ClassVersion};
use super::{ClassAccess, FieldAccess, MethodAccess, ParameterAccess, InnerClassAccess};
use super::{ModuleFlags, ExportFlags, RequireFlags};
use super::{AnnotationPrimitive, ClassConstant, ConstantDynamic};
use super::{Label, Handle, FrameItem, FrameMode, opcodes, constant_pool_entry, initial_frame};
use byteorder::{BigEndian, ByteOrder};
use std::{collections::HashMap, rc::Rc};
use bitflags::*;
use thiserror::Error;



bitflags! {
    pub struct ClassReaderFlags: u32 {
        const SKIP_CODE = 1;
        const SKIP_DEBUG = 2;
        const SKIP_FRAMES = 4;
    }
}
const SAME_LOCALS_1_STACK_ITEM_EXTENDED: u8 = 247;
const SAME_LOCALS_1_STACK_ITEM: u8 = 64;
const FRAME_RESERVED: u8 = 128;
const CHOP_FRAME: u8 = 248;
const SAME_FRAME_EXTENDED:u8 = 251;
const FULL_FRAME: u8 = 255;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum ClassDecodeError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("not a class file")]
    InvalidMagic,
    #[error("unsupported class file version")]
    UnknownVersion,
    #[error("constant pool index out of bounds")]
    ConstantPoolIndexOutOfBounds,
    #[error("constant pool entry has the wrong type")]
    ConstantPoolTypeMismatch,
    #[error("unrecognized constant pool entry")]
    UnrecognizedConstantPoolEntry,
    #[error("unrecognized annotation element tag")]
    UnrecognizedAnnotationTag,
    #[error("unrecognized type path kind")]
    UnrecognizedTypePathKind,
    #[error("method code is longer than 65535 bytes")]
    BytecodeTooLong,
    #[error("unrecognized instruction")]
    UnrecognizedInstruction,
    #[error("code offset outside of the method")]
    InvalidCodeOffset,
    #[error("unrecognized stack map frame")]
    UnrecognizedFrameType,
    #[error("unrecognized type annotation target")]
    UnrecognizedTypeRef,
    #[error("malformed modified UTF-8 string")]
    InvalidUtf8,
    #[error("inner class entry has an outer class but no name")]
    InconsistentInnerClassAttribute,
    #[error("class has no superclass")]
    MissingSuperclass,
    #[error("invalid bootstrap method reference")]
    InvalidBootstrapMethod,
}


pub type Result<T> = ::std::result::Result<T, ClassDecodeError>;

#[derive(Debug)]
pub struct ClassReader<'a> {
    bytes: &'a [u8],
    const_pool: Vec<usize>,
    header_offset: usize,
    error: Option<ClassDecodeError>,
}

///Per-traversal state: decoded strings keyed by constant pool offset and the
///offsets of the `BootstrapMethods` entries.
struct Context {
    strings: HashMap<usize, Rc<str>>,
    bootstrap_methods: Vec<usize>,
    flags: ClassReaderFlags,
    class_name: Rc<str>,
}

impl Context {
    fn new(flags: ClassReaderFlags) -> Context {
        Context {
            strings: HashMap::new(),
            bootstrap_methods: Vec::new(),
            flags,
            class_name: Rc::from("")
        }
    }
}

///Something annotations can be reported to.
trait Annotatable {
    fn annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>>;
    fn type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>>;
}

impl<'v> Annotatable for dyn ClassVisitor + 'v {
    fn annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.visit_annotation(desc, visible)
    }
    fn type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.visit_type_annotation(type_ref, type_path, desc, visible)
    }
}
impl<'v> Annotatable for dyn FieldVisitor + 'v {
    fn annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.visit_annotation(desc, visible)
    }
    fn type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.visit_type_annotation(type_ref, type_path, desc, visible)
    }
}
impl<'v> Annotatable for dyn MethodVisitor + 'v {
    fn annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.visit_annotation(desc, visible)
    }
    fn type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.visit_type_annotation(type_ref, type_path, desc, visible)
    }
}
impl<'v> Annotatable for dyn RecordComponentVisitor + 'v {
    fn annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.visit_annotation(desc, visible)
    }
    fn type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.visit_type_annotation(type_ref, type_path, desc, visible)
    }
}

///Offsets of the annotation attributes of one element, 0 when absent.
#[derive(Default)]
struct AnnotationOffsets {
    visible: usize,
    invisible: usize,
    visible_type: usize,
    invisible_type: usize,
}

impl AnnotationOffsets {
    fn record(&mut self, attr_name: &str, info: usize) -> bool {
        match attr_name {
            "RuntimeVisibleAnnotations" => self.visible = info,
            "RuntimeInvisibleAnnotations" => self.invisible = info,
            "RuntimeVisibleTypeAnnotations" => self.visible_type = info,
            "RuntimeInvisibleTypeAnnotations" => self.invisible_type = info,
            _ => return false
        }
        true
    }
}

struct DecodedFrame {
    offset: usize,
    mode: FrameMode,
    locals: Vec<FrameItem>,
    stack: Vec<FrameItem>,
}

///A code type annotation, kept until its instruction (or the end of the code) is reached.
struct PendingAnnotation {
    type_ref: TypeRef,
    type_path: TypePath,
    spans: Vec<LocalVariableSpan>,
    at: usize,
    visible: bool,
}

impl<'a> ClassReader<'a> {
    pub fn new(bytes: &'a [u8]) -> ClassReader<'a> {
        match ClassReader::new_inner(bytes) {
            Ok(this) => this,
            Err(e) => ClassReader {
                error: Some(e),
                bytes,
                const_pool: Vec::new(),
                header_offset: 0
            }
        }
    }
    fn new_inner(bytes: &'a [u8]) -> Result<ClassReader<'a>> {
        let mut this = ClassReader {
            bytes,
            const_pool: vec![],
            header_offset: 0,
            error: None
        };
        let magic = this.read_u4(0)?;
        if magic != opcodes::CLASS_MAGIC {
            return Err(ClassDecodeError::InvalidMagic);
        }
        let version = this.read_u2(6)?;
        if version > opcodes::V21 {
            return Err(ClassDecodeError::UnknownVersion)
        }
        let const_pool_len = this.read_u2(8)? as usize;
        this.const_pool.reserve(const_pool_len);
        let mut offset = 10;
        this.const_pool.push(0); //Dummy zero-th entry
        let mut i = 1;
        while i < const_pool_len {
            this.const_pool.push(offset);
            match this.read_u1(offset)? {
                constant_pool_entry::FIELD |
                constant_pool_entry::METH |
                constant_pool_entry::IMETH |
                constant_pool_entry::INT |
                constant_pool_entry::FLOAT |
                constant_pool_entry::NAME_TYPE |
                constant_pool_entry::INDY |
                constant_pool_entry::CONDY => {
                    offset += 5;
                },
                constant_pool_entry::LONG |
                constant_pool_entry::DOUBLE => {
                    offset += 9;
                    this.const_pool.push(0);
                    i += 1;
                },
                constant_pool_entry::HANDLE => {
                    offset += 4;
                },
                constant_pool_entry::CLASS |
                constant_pool_entry::STR |
                constant_pool_entry::MTYPE |
                constant_pool_entry::PACKAGE |
                constant_pool_entry::MODULE => {
                    offset += 3;
                },
                constant_pool_entry::UTF8 => {
                    let len = this.read_u2(offset + 1)? as usize;
                    offset += 3 + len;
                },
                _ => {
                    return Err(ClassDecodeError::UnrecognizedConstantPoolEntry);
                }
            }
            i += 1;
        }
        this.header_offset = offset;
        Ok(this)
    }
    fn slice(&self, idx: usize, len: usize) -> Result<&'a [u8]> {
        self.bytes.get(idx..idx + len).ok_or(ClassDecodeError::UnexpectedEof)
    }
    fn read_u1(&self, idx: usize) -> Result<u8> {
        self.bytes.get(idx).copied().ok_or(ClassDecodeError::UnexpectedEof)
    }
    fn read_u2(&self, idx: usize) -> Result<u16> {
        self.slice(idx, 2).map(BigEndian::read_u16)
    }
    fn read_u4(&self, idx: usize) -> Result<u32> {
        self.slice(idx, 4).map(BigEndian::read_u32)
    }
    fn read_f8(&self, idx: usize) -> Result<f64> {
        self.slice(idx, 8).map(BigEndian::read_f64)
    }
    fn read_i8(&self, idx: usize) -> Result<i64> {
        self.slice(idx, 8).map(BigEndian::read_i64)
    }
    fn read_i4(&self, idx: usize) -> Result<i32> {
        self.slice(idx, 4).map(BigEndian::read_i32)
    }
    fn read_i2(&self, idx: usize) -> Result<i16> {
        self.slice(idx, 2).map(BigEndian::read_i16)
    }
    fn read_i1(&self, idx: usize) -> Result<i8> {
        self.read_u1(idx).map(|c| c as i8)
    }
    fn read_f4(&self, idx: usize) -> Result<f32> {
        self.slice(idx, 4).map(BigEndian::read_f32)
    }
    fn entry(&self, pool_index: usize) -> Result<usize> {
        match self.const_pool.get(pool_index) {
            Some(&offset) if offset != 0 => Ok(offset),
            _ => Err(ClassDecodeError::ConstantPoolIndexOutOfBounds)
        }
    }
    fn read_stringlike(&self, idx: usize, kind: u8, cx: &mut Context) -> Result<Option<Rc<str>>> {
        let pool_index = self.read_u2(idx)? as usize;
        if pool_index == 0 {
            return Ok(None);
        }
        let item_offset = self.entry(pool_index)?;
        if self.read_u1(item_offset)? != kind {
            return Err(ClassDecodeError::ConstantPoolTypeMismatch);
        }
        self.read_utf8(item_offset + 1, cx).map(Some)
    }
    fn read_class_maybe(&self, idx: usize, cx: &mut Context) -> Result<Option<Rc<str>>> {
        self.read_stringlike(idx, constant_pool_entry::CLASS, cx)
    }
    fn read_module(&self, idx: usize, cx: &mut Context) -> Result<Rc<str>> {
        let md = self.read_stringlike(idx, constant_pool_entry::MODULE, cx)?;
        md.ok_or(ClassDecodeError::ConstantPoolIndexOutOfBounds)
    }
    fn read_class(&self, idx: usize, cx: &mut Context) -> Result<Rc<str>> {
        let cl = self.read_class_maybe(idx, cx)?;
        cl.ok_or(ClassDecodeError::ConstantPoolIndexOutOfBounds)
    }
    fn read_package(&self, idx: usize, cx: &mut Context) -> Result<Rc<str>> {
        let pk = self.read_stringlike(idx, constant_pool_entry::PACKAGE, cx)?;
        pk.ok_or(ClassDecodeError::ConstantPoolIndexOutOfBounds)
    }
    fn read_utf8(&self, idx: usize, cx: &mut Context) -> Result<Rc<str>> {
        let utf = self.read_utf8_maybe(idx, cx)?;
        utf.ok_or(ClassDecodeError::ConstantPoolIndexOutOfBounds)
    }
    fn read_utf8_maybe(&self, idx: usize, cx: &mut Context) -> Result<Option<Rc<str>>> {
        let pool_index = self.read_u2(idx)? as usize;
        if pool_index == 0 {
            return Ok(None);
        }
        let offset = self.entry(pool_index)?;
        if let Some(s) = cx.strings.get(&offset) {
            return Ok(Some(s.clone()));
        }
        if self.read_u1(offset)? != constant_pool_entry::UTF8 {
            return Err(ClassDecodeError::ConstantPoolTypeMismatch)
        }
        let len = self.read_u2(offset + 1)? as usize;
        let s: Rc<str> = Rc::from(self.read_cesu8(offset + 3, len)?);
        cx.strings.insert(offset, s.clone());
        Ok(Some(s))
    }
    fn read_cesu8(&self, data_offset: usize, data_size: usize) -> Result<String> {
        let slc = self.slice(data_offset, data_size)?;
        cesu8::from_java_cesu8(slc)
            .map(|s| s.into_owned())
            .map_err(|_| ClassDecodeError::InvalidUtf8)
    }
    fn read_name_and_type_maybe(&self, at: usize, cx: &mut Context) -> Result<Option<(Rc<str>, Rc<str>)>> {
        let item = self.read_u2(at)? as usize;
        if item != 0 {
            let cpi = self.entry(item)?;
            if self.read_u1(cpi)? != constant_pool_entry::NAME_TYPE {
                return Err(ClassDecodeError::ConstantPoolTypeMismatch)
            }
            let name = self.read_utf8(cpi + 1, cx)?;
            let desc = self.read_utf8(cpi + 3, cx)?;
            Ok(Some((name, desc)))
        } else {
            Ok(None)
        }
    }
    fn read_name_and_type(&self, at: usize, cx: &mut Context) -> Result<(Rc<str>, Rc<str>)> {
        self.read_name_and_type_maybe(at, cx)?
            .ok_or(ClassDecodeError::ConstantPoolIndexOutOfBounds)
    }
    ///Reads a field or method reference: its tag, owner, name and descriptor.
    fn read_member_ref(&self, at: usize, cx: &mut Context) -> Result<(u8, Rc<str>, Rc<str>, Rc<str>)> {
        let cpi = self.entry(self.read_u2(at)? as usize)?;
        let kind = self.read_u1(cpi)?;
        match kind {
            constant_pool_entry::FIELD | constant_pool_entry::METH | constant_pool_entry::IMETH => {},
            _ => return Err(ClassDecodeError::ConstantPoolTypeMismatch)
        }
        let owner = self.read_class(cpi + 1, cx)?;
        let (name, desc) = self.read_name_and_type(cpi + 3, cx)?;
        Ok((kind, owner, name, desc))
    }
    pub fn get_name(&self) -> Result<Rc<str>> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let mut cx = Context::new(ClassReaderFlags::empty());
        self.read_class(self.header_offset + 2, &mut cx)
    }
    pub fn get_access(&self) -> Result<ClassAccess> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let access_raw = self.read_u2(self.header_offset)?;
        Ok(ClassAccess::from_bits_truncate(access_raw as u32))
    }
    ///Reports the whole class to `visitor`, stopping at the first malformed structure.
    pub fn accept(&self, visitor: &mut dyn ClassVisitor, flags: ClassReaderFlags) -> Result<()> {
        let mut cx = Context::new(flags);
        if let Some(e) = self.error {
            return Err(e);
        }
        let mut hdr = self.header_offset;
        let version = ClassVersion {
            minor: self.read_u2(4)?,
            major: self.read_u2(6)?
        };
        let mut access = self.get_access()?;
        let name = self.read_class(hdr + 2, &mut cx)?;
        let super_class = self.read_class_maybe(hdr + 4, &mut cx)?;
        if super_class.is_none() && &*name != "java/lang/Object" && !access.contains(ClassAccess::ACC_MODULE) {
            return Err(ClassDecodeError::MissingSuperclass);
        }
        cx.class_name = name.clone();
        let num_interfaces = self.read_u2(hdr + 6)?;
        let mut interfaces = Vec::new();
        hdr += 8;
        for _ in 0..num_interfaces {
            interfaces.push(self.read_class(hdr, &mut cx)?);
            hdr += 2;
        }
        hdr = self.get_attributes_offset()?;
        let mut source_file = None;
        let mut inner_classes = 0;
        let mut enclosing_class = None;
        let mut enclosing_method = None;
        let mut signature = None;
        let mut annotations = AnnotationOffsets::default();
        let mut module = 0;
        let mut module_main = None;
        let mut module_packages = 0;
        let mut source_debug = None;
        let mut nest_host = None;
        let mut nest_members_offset = 0;
        let mut permitted_subclasses_offset = 0;
        let mut record_offset = 0;
        let num_attrs = self.read_u2(hdr)?;
        for _ in 0..num_attrs {
            let attr_name = self.read_utf8(hdr + 2, &mut cx)?;
            match &*attr_name {
                "SourceFile" => {
                    source_file = Some(self.read_utf8(hdr + 8, &mut cx)?)
                },
                "InnerClasses" => {
                    inner_classes = hdr + 8;
                },
                "EnclosingMethod" => {
                    enclosing_class = Some(self.read_class(hdr + 8, &mut cx)?);
                    enclosing_method = self.read_name_and_type_maybe(hdr + 10, &mut cx)?;
                },
                "Signature" => {
                    signature = Some(self.read_utf8(hdr + 8, &mut cx)?);
                },
                "Deprecated" => {
                    access |= ClassAccess::ACC_PSEUDO_DEPRECATED;
                },
                "Synthetic" => {
                    access |= ClassAccess::ACC_SYNTHETIC;
                },
                "BootstrapMethods" => {
                    let num_meth = self.read_u2(hdr + 8)?;
                    cx.bootstrap_methods.reserve(num_meth as usize);
                    let mut nat = hdr + 10;
                    for _ in 0..num_meth {
                        cx.bootstrap_methods.push(nat);
                        nat += 4 + self.read_u2(nat + 2)? as usize * 2;
                    }
                },
                "SourceDebugExtension" => {
                    let len = self.read_u4(hdr + 4)? as usize;
                    source_debug = Some(self.read_cesu8(hdr + 8, len)?);
                },
                "NestHost" => {
                    nest_host = Some(self.read_class(hdr + 8, &mut cx)?);
                },
                "NestMembers" => {
                    nest_members_offset = hdr + 8;
                },
                "PermittedSubclasses" => {
                    permitted_subclasses_offset = hdr + 8;
                },
                "Record" => {
                    record_offset = hdr + 8;
                },
                "Module" => {
                    module = hdr + 8;
                },
                "ModuleMainClass" => {
                    module_main = Some(self.read_class(hdr + 8, &mut cx)?);
                },
                "ModulePackages" => {
                    module_packages = hdr + 8;
                },
                other => {
                    annotations.record(other, hdr + 8);
                }
            }
            hdr += 6 + self.read_u4(hdr + 4)? as usize;
        }
        log::trace!("reading class {} version {}.{}", name, version.major, version.minor);
        visitor.visit_header(version, access, name, signature, super_class, interfaces);
        if !flags.contains(ClassReaderFlags::SKIP_DEBUG) {
            visitor.visit_source(source_file, source_debug);
        }
        if module != 0 {
            self.read_module_attribute(visitor, module, module_main, module_packages, &mut cx)?;
        }
        if let Some(host) = nest_host {
            visitor.visit_nest_host(host);
        }
        if let Some(class) = enclosing_class {
            visitor.visit_outer_class(class, enclosing_method);
        }
        self.read_annotations(&mut *visitor, &annotations, &mut cx)?;
        for class in self.read_class_list(nest_members_offset, &mut cx)? {
            visitor.visit_nest_member(class);
        }
        for class in self.read_class_list(permitted_subclasses_offset, &mut cx)? {
            visitor.visit_permitted_subclass(class);
        }
        if inner_classes != 0 {
            let mut offset = inner_classes + 2;
            let num = self.read_u2(inner_classes)?;
            for _ in 0..num {
                let inner = self.read_class(offset, &mut cx)?;
                let outer = self.read_class_maybe(offset + 2, &mut cx)?;
                let inner_name = self.read_utf8_maybe(offset + 4, &mut cx)?;
                if version.major >= opcodes::V1_7 && inner_name.is_none() && outer.is_some() {
                    return Err(ClassDecodeError::InconsistentInnerClassAttribute);
                }
                let access = InnerClassAccess::from_bits_truncate(
                    self.read_u2(offset + 6)? as u32);
                visitor.visit_inner_class(inner, outer, inner_name, access);
                offset += 8;
            }
        }
        if record_offset != 0 {
            self.read_record(visitor, record_offset, &mut cx)?;
        }
        let mut at = self.header_offset + 10 + 2 * (num_interfaces as usize);
        let nfields = self.read_u2(at - 2)?;
        for _ in 0..nfields {
            at = self.read_field(visitor, at, &mut cx)?;
        }
        let nmethods = self.read_u2(at)?;
        at += 2;
        for _ in 0..nmethods {
            at = self.read_method(visitor, at, &mut cx)?;
        }
        visitor.visit_end();
        Ok(())
    }

    fn read_class_list(&self, offset: usize, cx: &mut Context) -> Result<Vec<Rc<str>>> {
        let mut classes = Vec::new();
        if offset != 0 {
            let num = self.read_u2(offset)?;
            for i in 0..num as usize {
                classes.push(self.read_class(offset + 2 + i * 2, cx)?);
            }
        }
        Ok(classes)
    }

    fn read_module_attribute(&self, visitor: &mut dyn ClassVisitor, mut at: usize, main: Option<Rc<str>>,
                             packages: usize, cx: &mut Context) -> Result<()> {
        let name = self.read_module(at, cx)?;
        let flags = ModuleFlags::from_bits_truncate(self.read_u2(at + 2)? as u32);
        let version = self.read_utf8_maybe(at + 4, cx)?;
        let mut mv = match visitor.visit_module(name, flags, version) {
            Some(mv) => mv,
            None => return Ok(())
        };
        at += 6;
        if let Some(main) = main {
            mv.visit_main_class(main);
        }
        if packages != 0 {
            let num = self.read_u2(packages)? as usize;
            for i in 0..num {
                let pkg = self.read_package(packages + 2 + i * 2, cx)?;
                mv.visit_package(pkg);
            }
        }
        let num_req = self.read_u2(at)?;
        at += 2;
        for _ in 0..num_req {
            let md = self.read_module(at, cx)?;
            let flags = RequireFlags::from_bits_truncate(self.read_u2(at + 2)? as u32);
            let version = self.read_utf8_maybe(at + 4, cx)?;
            mv.visit_require(md, flags, version);
            at += 6;
        }
        for open in &[false, true] {
            let num = self.read_u2(at)?;
            at += 2;
            for _ in 0..num {
                let pkg = self.read_package(at, cx)?;
                let access = ExportFlags::from_bits_truncate(self.read_u2(at + 2)? as u32);
                let num_to = self.read_u2(at + 4)? as usize;
                at += 6;
                let mut to = Vec::with_capacity(num_to);
                for _ in 0..num_to {
                    to.push(self.read_module(at, cx)?);
                    at += 2;
                }
                if *open {
                    mv.visit_open(pkg, access, to);
                } else {
                    mv.visit_export(pkg, access, to);
                }
            }
        }
        let num_use = self.read_u2(at)?;
        at += 2;
        for _ in 0..num_use {
            let cl = self.read_class(at, cx)?;
            at += 2;
            mv.visit_use(cl);
        }
        let num_provide = self.read_u2(at)?;
        at += 2;
        for _ in 0..num_provide {
            let service = self.read_class(at, cx)?;
            let num_provide_with = self.read_u2(at + 2)? as usize;
            at += 4;
            let mut provide_with = Vec::with_capacity(num_provide_with);
            for _ in 0..num_provide_with {
                provide_with.push(self.read_class(at, cx)?);
                at += 2;
            }
            mv.visit_provide(service, provide_with);
        }
        mv.visit_end();
        Ok(())
    }

    fn read_record(&self, visitor: &mut dyn ClassVisitor, offset: usize, cx: &mut Context) -> Result<()> {
        let num = self.read_u2(offset)?;
        let mut at = offset + 2;
        for _ in 0..num {
            let name = self.read_utf8(at, cx)?;
            let desc = self.read_utf8(at + 2, cx)?;
            let num_attrs = self.read_u2(at + 4)?;
            //Same convention as the other members: `at` sits two bytes before each attribute.
            at += 4;
            let mut signature = None;
            let mut annotations = AnnotationOffsets::default();
            for _ in 0..num_attrs {
                let attr_name = self.read_utf8(at + 2, cx)?;
                if &*attr_name == "Signature" {
                    signature = Some(self.read_utf8(at + 8, cx)?);
                } else {
                    annotations.record(&attr_name, at + 8);
                }
                at += 6 + self.read_u4(at + 4)? as usize;
            }
            at += 2;
            if let Some(mut rv) = visitor.visit_record_component(name, desc, signature) {
                self.read_annotations(&mut *rv, &annotations, cx)?;
                rv.visit_end();
            }
        }
        Ok(())
    }

    fn read_annotations<A: Annotatable + ?Sized>(&self, target: &mut A, offsets: &AnnotationOffsets, cx: &mut Context) -> Result<()> {
        for &(offset, visible) in &[(offsets.visible, true), (offsets.invisible, false)] {
            if offset == 0 {
                continue;
            }
            let num = self.read_u2(offset)?;
            let mut v = offset + 2;
            for _ in 0..num {
                let desc = self.read_utf8(v, cx)?;
                let mut av = target.annotation(desc, visible);
                v = self.read_annotation_values(v + 2, true, av.as_deref_mut(), cx)?;
            }
        }
        for &(offset, visible) in &[(offsets.visible_type, true), (offsets.invisible_type, false)] {
            if offset == 0 {
                continue;
            }
            let num = self.read_u2(offset)?;
            let mut v = offset + 2;
            for _ in 0..num {
                let (next, type_ref, type_path) = self.read_annotation_target(v)?;
                let desc = self.read_utf8(next, cx)?;
                let mut av = target.type_annotation(type_ref, type_path, desc, visible);
                v = self.read_annotation_values(next + 2, true, av.as_deref_mut(), cx)?;
            }
        }
        Ok(())
    }

    fn read_field(&self, vis: &mut dyn ClassVisitor, mut at: usize, cx: &mut Context) -> Result<usize> {
        let access_raw = self.read_u2(at)? as u32;
        let mut access = FieldAccess::from_bits_truncate(access_raw);
        let name = self.read_utf8(at + 2, cx)?;
        let desc = self.read_utf8(at + 4, cx)?;
        at += 6;
        let num_attrs = self.read_u2(at)?;
        let mut signature = None;
        let mut annotations = AnnotationOffsets::default();
        let mut value = None;
        for _ in 0..num_attrs {
            let attr_name = self.read_utf8(at + 2, cx)?;
            match &*attr_name {
                "ConstantValue" => {
                    let itm = self.read_u2(at + 8)? as usize;
                    if itm != 0 {
                        value = Some(self.read_const(itm, cx)?);
                    }
                },
                "Signature" => {
                    signature = Some(self.read_utf8(at + 8, cx)?);
                },
                "Deprecated" => {
                    access |= FieldAccess::ACC_PSEUDO_DEPRECATED;
                },
                "Synthetic" => {
                    access |= FieldAccess::ACC_SYNTHETIC;
                },
                other => {
                    annotations.record(other, at + 8);
                }
            }
            at += 6 + self.read_u4(at + 4)? as usize;
        }
        at += 2;
        if let Some(mut fv) = vis.visit_field(access, name, desc, signature, value) {
            self.read_annotations(&mut *fv, &annotations, cx)?;
            fv.visit_end();
        }
        Ok(at)
    }
    fn read_method(&self, vis: &mut dyn ClassVisitor, mut at: usize, cx: &mut Context) -> Result<usize> {
        let access_raw = self.read_u2(at)? as u32;
        let mut access = MethodAccess::from_bits_truncate(access_raw);
        let name = self.read_utf8(at + 2, cx)?;
        let desc = self.read_utf8(at + 4, cx)?;
        at += 6;
        let num_attrs = self.read_u2(at)?;
        let mut code = 0;
        let mut exceptions = Vec::new();
        let mut signature = None;
        let mut annotations = AnnotationOffsets::default();
        let mut parameter_annotations_offset = 0;
        let mut invisible_parameter_annotations_offset = 0;
        let mut annotation_default = 0;
        let mut method_parameters = 0;
        for _ in 0..num_attrs {
            let attr_name = self.read_utf8(at + 2, cx)?;
            match &*attr_name {
                "Code" => {
                    if !cx.flags.contains(ClassReaderFlags::SKIP_CODE) {
                        code = at + 8;
                    }
                },
                "Exceptions" => {
                    let n_exceptions = self.read_u2(at + 8)?;
                    let mut exc_ref = at + 10;
                    for _ in 0..n_exceptions {
                        exceptions.push(self.read_class(exc_ref, cx)?);
                        exc_ref += 2;
                    }
                },
                "Signature" => {
                    signature = Some(self.read_utf8(at + 8, cx)?);
                },
                "Deprecated" => {
                    access |= MethodAccess::ACC_PSEUDO_DEPRECATED;
                },
                "AnnotationDefault" => {
                    annotation_default = at + 8;
                }
                "Synthetic" => {
                    access |= MethodAccess::ACC_SYNTHETIC;
                },
                "RuntimeVisibleParameterAnnotations" => {
                    parameter_annotations_offset = at + 8;
                },
                "RuntimeInvisibleParameterAnnotations" => {
                    invisible_parameter_annotations_offset = at + 8;
                },
                "MethodParameters" => {
                    method_parameters = at + 8;
                },
                other => {
                    annotations.record(other, at + 8);
                }
            }
            at += 6 + self.read_u4(at + 4)? as usize;
        }
        at += 2;
        let initial = initial_frame(&cx.class_name, access, &name, &desc);
        let mut visitor = match vis.visit_method(access, name, desc, signature, exceptions) {
            Some(mv) => mv,
            None => return Ok(at)
        };
        if method_parameters != 0 {
            let count = self.read_u1(method_parameters)? as usize;
            for i in 0..count {
                let name = self.read_utf8_maybe(method_parameters + 1 + i * 4, cx)?;
                let access_raw = self.read_u2(method_parameters + 3 + i * 4)? as u32;
                visitor.visit_parameter(name, ParameterAccess::from_bits_truncate(access_raw));
            }
        }
        if annotation_default != 0 {
            let mut av = visitor.visit_annotation_default();
            self.read_annotation_value(annotation_default, Rc::from(""), av.as_deref_mut(), cx)?;
            if let Some(mut av) = av {
                av.visit_end();
            }
        }
        self.read_annotations(&mut *visitor, &annotations, cx)?;
        for &(offset, visible) in &[(parameter_annotations_offset, true), (invisible_parameter_annotations_offset, false)] {
            if offset == 0 {
                continue;
            }
            let mut at = offset;
            let pars = self.read_u1(at)?;
            visitor.visit_annotable_parameter_count(pars, visible);
            at += 1;
            for i in 0..pars {
                let num = self.read_u2(at)?;
                at += 2;
                for _ in 0..num {
                    let desc = self.read_utf8(at, cx)?;
                    let mut av = visitor.visit_parameter_annotation(i, desc, visible);
                    at = self.read_annotation_values(at + 2, true, av.as_deref_mut(), cx)?;
                }
            }
        }
        if code != 0 {
            visitor.visit_code();
            self.read_code(&mut *visitor, code, initial, cx)?;
        }
        visitor.visit_end();
        Ok(at)
    }

    fn read_code(&self, vis: &mut dyn MethodVisitor, mut at: usize, initial: Vec<FrameItem>, cx: &mut Context) -> Result<()> {
        let max_stack = self.read_u2(at)?;
        let max_local = self.read_u2(at + 2)?;
        let code_length = self.read_u4(at + 4)? as usize;
        if code_length >= 65536 {
            return Err(ClassDecodeError::BytecodeTooLong);
        }
        at += 8;
        let code_begin = at;
        let code_end = at + code_length;
        self.slice(code_begin, code_length)?;
        let mut labels = vec![None; code_length + 1];
        while at < code_end {
            let offset = (at - code_begin) as isize;
            let opcode = self.read_u1(at)?;
            match classify_insn(opcode)? {
                InsnClass::NoArg |
                InsnClass::ImplVar => {
                    at += 1;
                },
                InsnClass::Label => {
                    create_label(offset + self.read_i2(at + 1)? as isize, &mut labels)?;
                    at += 3;
                },
                InsnClass::WideLabel => {
                    create_label(offset + self.read_i4(at + 1)? as isize, &mut labels)?;
                    at += 5;
                },
                InsnClass::Wide => {
                    if self.read_u1(at + 1)? == opcodes::IINC {
                        at += 6;
                    } else {
                        at += 4;
                    }
                },
                InsnClass::Tableswitch => {
                    at = at + 4 - (offset & 3) as usize;
                    create_label(offset + self.read_i4(at)? as isize, &mut labels)?;
                    let entries = switch_entries(self.read_i4(at + 4)?, self.read_i4(at + 8)?)?;
                    at += 12;
                    for _ in 0..entries {
                        create_label(offset + self.read_i4(at)? as isize, &mut labels)?;
                        at += 4;
                    }
                },
                InsnClass::Lookupswitch => {
                    at = at + 4 - (offset & 3) as usize;
                    create_label(offset + self.read_i4(at)? as isize, &mut labels)?;
                    let entries = self.read_u4(at + 4)?;
                    at += 8;
                    for _ in 0..entries {
                        create_label(offset + self.read_i4(at + 4)? as isize, &mut labels)?;
                        at += 8;
                    }
                },
                InsnClass::Var |
                InsnClass::Sbyte |
                InsnClass::Ldc => {
                    at += 2;
                },
                InsnClass::Short |
                InsnClass::LdcWide |
                InsnClass::Field |
                InsnClass::Meth |
                InsnClass::Type |
                InsnClass::Iinc => {
                    at += 3;
                },
                InsnClass::ItfMeth |
                InsnClass::IndyMeth => {
                    at += 5;
                },
                InsnClass::Multianew => {
                    at += 4;
                }
            }
        }
        if at != code_end {
            return Err(ClassDecodeError::InvalidCodeOffset);
        }
        let num_try_catch = self.read_u2(at)?;
        for _ in 0..num_try_catch {
            let start = create_label(self.read_u2(at + 2)? as isize, &mut labels)?;
            let end = create_label(self.read_u2(at + 4)? as isize, &mut labels)?;
            let handler = create_label(self.read_u2(at + 6)? as isize, &mut labels)?;
            let class = self.read_class_maybe(at + 8, cx)?;
            vis.visit_try_catch(start, end, handler, class);
            at += 8;
        }
        at += 2;
        let skip_debug = cx.flags.contains(ClassReaderFlags::SKIP_DEBUG);
        let nattr = self.read_u2(at)?;
        let mut variables_table = 0;
        let mut variables_type_table = 0;
        let mut line_numbers: HashMap<usize, Vec<u16>> = HashMap::new();
        let mut stack_map = 0;
        let mut local_var_annot = Vec::new();
        let mut insn_annot: HashMap<usize, Vec<PendingAnnotation>> = HashMap::new();
        for _ in 0..nattr {
            let name = self.read_utf8(at + 2, cx)?;
            match &*name {
                "LocalVariableTable" if !skip_debug => {
                    variables_table = at + 8;
                    let nvars = self.read_u2(at + 8)?;
                    let mut nat = at;
                    for _ in 0..nvars {
                        let start = self.read_u2(nat + 10)? as isize;
                        create_label(start, &mut labels)?;
                        create_label(start + self.read_u2(nat + 12)? as isize, &mut labels)?;
                        nat += 10;
                    }
                },
                "LocalVariableTypeTable" if !skip_debug => {
                    variables_type_table = at + 8;
                },
                "LineNumberTable" if !skip_debug => {
                    let table_len = self.read_u2(at + 8)?;
                    let mut nat = at;
                    for _ in 0..table_len {
                        let addr = self.read_u2(nat + 10)? as usize;
                        create_label(addr as isize, &mut labels)?;
                        let line = self.read_u2(nat + 12)?;
                        line_numbers.entry(addr).or_insert_with(Vec::new).push(line);
                        nat += 4;
                    }
                },
                "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => {
                    let visible = &*name == "RuntimeVisibleTypeAnnotations";
                    let mut nat = at + 8;
                    let n_annot = self.read_u2(nat)?;
                    nat += 2;
                    for _ in 0..n_annot {
                        let target = self.read_u1(nat)?;
                        nat += 1;
                        match target {
                            0x40 | 0x41 => {
                                let table_len = self.read_u2(nat)? as usize;
                                let mut spans = Vec::with_capacity(table_len);
                                nat += 2;
                                for _ in 0..table_len {
                                    let start_offset = self.read_u2(nat)? as isize;
                                    let start = create_label(start_offset, &mut labels)?;
                                    let end = create_label(start_offset + self.read_u2(nat + 2)? as isize, &mut labels)?;
                                    let var = self.read_u2(nat + 4)?;
                                    nat += 6;
                                    spans.push(LocalVariableSpan::new(start, end, var));
                                }
                                let (next, type_path) = self.read_type_path(nat)?;
                                let type_ref = if target == 0x40 { TypeRef::LocalVariable } else { TypeRef::ResourceVariable };
                                local_var_annot.push(PendingAnnotation {
                                    type_ref, type_path, spans, at: next, visible
                                });
                                nat = self.read_annotation_values(next + 2, true, None, cx)?;
                            },
                            0x42 => {
                                let type_ref = TypeRef::ExceptionParameter(self.read_u2(nat)?);
                                let (next, type_path) = self.read_type_path(nat + 2)?;
                                let desc = self.read_utf8(next, cx)?;
                                let mut av = vis.visit_trycatch_annotation(type_ref, type_path, desc, visible);
                                nat = self.read_annotation_values(next + 2, true, av.as_deref_mut(), cx)?;
                            },
                            0x43..=0x4B => {
                                let insn_offset = self.read_u2(nat)? as usize;
                                nat += 2;
                                let type_ref = match target {
                                    0x43 => TypeRef::Instanceof,
                                    0x44 => TypeRef::New,
                                    0x45 => TypeRef::ConstructorReference,
                                    0x46 => TypeRef::MethodReference,
                                    _ => {
                                        let type_arg = self.read_u1(nat)?;
                                        nat += 1;
                                        match target {
                                            0x47 => TypeRef::Cast(type_arg),
                                            0x48 => TypeRef::GenericConstructorInvocation(type_arg),
                                            0x49 => TypeRef::GenericMethodInvocation(type_arg),
                                            0x4A => TypeRef::GenericConstructorReference(type_arg),
                                            _ => TypeRef::GenericMethodReference(type_arg),
                                        }
                                    }
                                };
                                let (next, type_path) = self.read_type_path(nat)?;
                                insn_annot.entry(insn_offset).or_insert_with(Vec::new).push(PendingAnnotation {
                                    type_ref, type_path, spans: Vec::new(), at: next, visible
                                });
                                nat = self.read_annotation_values(next + 2, true, None, cx)?;
                            },
                            _ => {
                                return Err(ClassDecodeError::UnrecognizedTypeRef);
                            }
                        }
                    }
                },
                "StackMapTable" if !cx.flags.contains(ClassReaderFlags::SKIP_FRAMES) => {
                    stack_map = at + 8;
                },
                _ => {}
            }
            at += 6 + self.read_u4(at + 4)? as usize;
        }
        let frames = if stack_map != 0 {
            self.read_frames(stack_map, code_length, initial, &mut labels, cx)?
        } else {
            Vec::new()
        };
        let mut frames = frames.into_iter().peekable();
        at = code_begin;
        while at < code_end {
            let offset = at - code_begin;
            if let Some(l) = labels[offset] {
                vis.visit_label(l);
                if let Some(lines) = line_numbers.get(&offset) {
                    for &line in lines {
                        vis.visit_line_number(line, l);
                    }
                }
            }
            while let Some(frame) = frames.peek() {
                if frame.offset > offset {
                    break;
                }
                if frame.offset == offset {
                    vis.visit_frame(frame.mode, &frame.locals, &frame.stack);
                }
                frames.next();
            }

            let opcode = self.read_u1(at)?;
            match classify_insn(opcode)? {
                InsnClass::NoArg => {
                    vis.visit_insn(opcode);
                    at += 1;
                },
                InsnClass::ImplVar => {
                    if opcode >= opcodes::ISTORE_0 {
                        let opcode_real = opcodes::ISTORE + ((opcode - opcodes::ISTORE_0) >> 2);
                        vis.visit_var_insn(opcode_real, ((opcode - opcodes::ISTORE_0) & 0x3) as u16);
                    } else {
                        let opcode_real = opcodes::ILOAD + ((opcode - opcodes::ILOAD_0) >> 2);
                        vis.visit_var_insn(opcode_real, ((opcode - opcodes::ILOAD_0) & 0x3) as u16);
                    }
                    at += 1;
                },
                InsnClass::Label => {
                    let target = label_at(offset as isize + self.read_i2(at + 1)? as isize, &labels)?;
                    vis.visit_jump_insn(opcode, target);
                    at += 3;
                },
                InsnClass::WideLabel => {
                    let target = label_at(offset as isize + self.read_i4(at + 1)? as isize, &labels)?;
                    vis.visit_jump_insn(opcode, target);
                    at += 5;
                },
                InsnClass::Wide => {
                    let opcode = self.read_u1(at + 1)?;
                    if opcode == opcodes::IINC {
                        let var = self.read_u2(at + 2)?;
                        let by = self.read_i2(at + 4)?;
                        vis.visit_iinc_insn(var, by);
                        at += 6;
                    } else {
                        vis.visit_var_insn(opcode, self.read_u2(at + 2)?);
                        at += 4;
                    }
                },
                InsnClass::Tableswitch => {
                    at = at + 4 - (offset & 3);
                    let dflt = label_at(offset as isize + self.read_i4(at)? as isize, &labels)?;
                    let min = self.read_i4(at + 4)?;
                    let max = self.read_i4(at + 8)?;
                    at += 12;
                    let entries = switch_entries(min, max)?;
                    let mut targets = Vec::with_capacity(entries);
                    for _ in 0..entries {
                        targets.push(label_at(offset as isize + self.read_i4(at)? as isize, &labels)?);
                        at += 4;
                    }
                    vis.visit_tableswitch_insn(min, max, dflt, targets);
                },
                InsnClass::Lookupswitch => {
                    at = at + 4 - (offset & 3);
                    let dflt = label_at(offset as isize + self.read_i4(at)? as isize, &labels)?;
                    let entries = self.read_u4(at + 4)? as usize;
                    let mut pairs = Vec::with_capacity(entries);
                    at += 8;
                    for _ in 0..entries {
                        let k = self.read_i4(at)?;
                        let v = label_at(offset as isize + self.read_i4(at + 4)? as isize, &labels)?;
                        pairs.push((k, v));
                        at += 8;
                    }
                    vis.visit_lookupswitch_insn(dflt, pairs);
                },
                InsnClass::Var => {
                    vis.visit_var_insn(opcode, self.read_u1(at + 1)? as u16);
                    at += 2;
                },
                InsnClass::Sbyte => {
                    let operand = if opcode == opcodes::NEWARRAY {
                        self.read_u1(at + 1)? as i32
                    } else {
                        self.read_i1(at + 1)? as i32
                    };
                    vis.visit_int_insn(opcode, operand);
                    at += 2;
                },
                InsnClass::Ldc => {
                    let idx = self.read_u1(at + 1)?;
                    let cst = self.read_const(idx as usize, cx)?;
                    vis.visit_ldc_insn(cst);
                    at += 2;
                },
                InsnClass::Short => {
                    let operand = self.read_i2(at + 1)? as i32;
                    vis.visit_int_insn(opcode, operand);
                    at += 3;
                },
                InsnClass::Iinc => {
                    let var = self.read_u1(at + 1)? as u16;
                    let by = self.read_i1(at + 2)? as i16;
                    vis.visit_iinc_insn(var, by);
                    at += 3;
                },
                InsnClass::LdcWide => {
                    let idx = self.read_u2(at + 1)?;
                    let cst = self.read_const(idx as usize, cx)?;
                    vis.visit_ldc_insn(cst);
                    at += 3;
                },
                InsnClass::Field => {
                    let (_, owner, name, desc) = self.read_member_ref(at + 1, cx)?;
                    vis.visit_field_insn(opcode, owner, name, desc);
                    at += 3;
                },
                InsnClass::ItfMeth |
                InsnClass::Meth => {
                    let (kind, owner, name, desc) = self.read_member_ref(at + 1, cx)?;
                    vis.visit_method_insn(opcode, owner, name, desc, kind == constant_pool_entry::IMETH);
                    if opcode == opcodes::INVOKEINTERFACE {
                        at += 5;
                    } else {
                        at += 3;
                    }
                },
                InsnClass::IndyMeth => {
                    let cpi = self.entry(self.read_u2(at + 1)? as usize)?;
                    if self.read_u1(cpi)? != constant_pool_entry::INDY {
                        return Err(ClassDecodeError::ConstantPoolTypeMismatch);
                    }
                    let dta = self.read_dynamic(cpi, cx)?;
                    vis.visit_indy_insn(dta.name, dta.desc, dta.bootstrap, dta.args);
                    at += 5;
                },
                InsnClass::Type => {
                    let cls = self.read_class(at + 1, cx)?;
                    vis.visit_type_insn(opcode, cls);
                    at += 3;
                },
                InsnClass::Multianew => {
                    let class = self.read_class(at + 1, cx)?;
                    let dim = self.read_u1(at + 3)?;
                    vis.visit_multianew_insn(class, dim);
                    at += 4;
                }
            }
            if let Some(annots) = insn_annot.remove(&offset) {
                for annot in annots {
                    let desc = self.read_utf8(annot.at, cx)?;
                    let mut av = vis.visit_insn_annotation(annot.type_ref, annot.type_path, desc, annot.visible);
                    self.read_annotation_values(annot.at + 2, true, av.as_deref_mut(), cx)?;
                }
            }
        }
        if let Some(l) = labels[code_length] {
            vis.visit_label(l);
        }
        if variables_table != 0 {
            let mut signatures = HashMap::new();
            if variables_type_table != 0 {
                let mut at = variables_type_table + 2;
                for _ in 0..self.read_u2(variables_type_table)? {
                    let start = self.read_u2(at)?;
                    let index = self.read_u2(at + 8)?;
                    signatures.insert((start, index), self.read_utf8(at + 6, cx)?);
                    at += 10;
                }
            }
            at = variables_table + 2;
            for _ in 0..self.read_u2(variables_table)? {
                let start = self.read_u2(at)?;
                let len = self.read_u2(at + 2)? as usize;
                let idx = self.read_u2(at + 8)?;
                let name = self.read_utf8(at + 4, cx)?;
                let desc = self.read_utf8(at + 6, cx)?;
                let sig = signatures.get(&(start, idx)).cloned();
                let span = LocalVariableSpan::new(label_at(start as isize, &labels)?,
                                                  label_at((start as usize + len) as isize, &labels)?, idx);
                vis.visit_local_var(name, desc, sig, span);
                at += 10;
            }
        }

        for annot in local_var_annot {
            let desc = self.read_utf8(annot.at, cx)?;
            let mut av = vis.visit_local_variable_annotation(annot.type_ref, annot.type_path, annot.spans, desc, annot.visible);
            self.read_annotation_values(annot.at + 2, true, av.as_deref_mut(), cx)?;
        }
        vis.visit_maxs(max_stack, max_local);
        Ok(())
    }

    ///Decodes a `StackMapTable`, expanding every frame to its complete list of locals.
    fn read_frames(&self, mut at: usize, code_length: usize, initial: Vec<FrameItem>,
                   labels: &mut [Option<Label>], cx: &mut Context) -> Result<Vec<DecodedFrame>> {
        let frame_count = self.read_u2(at)?;
        at += 2;
        let mut frames = Vec::with_capacity(frame_count as usize);
        let mut locals = initial;
        let mut offset: Option<usize> = None;
        for _ in 0..frame_count {
            let tag = self.read_u1(at)?;
            at += 1;
            let mut stack = Vec::new();
            let delta;
            let mode;
            if tag < SAME_LOCALS_1_STACK_ITEM {
                delta = tag as usize;
                mode = FrameMode::Same;
            } else if tag < FRAME_RESERVED {
                delta = (tag - SAME_LOCALS_1_STACK_ITEM) as usize;
                mode = FrameMode::Same1;
                at = self.read_frame_item(at, &mut stack, labels, cx)?;
            } else if tag < SAME_LOCALS_1_STACK_ITEM_EXTENDED {
                return Err(ClassDecodeError::UnrecognizedFrameType);
            } else {
                delta = self.read_u2(at)? as usize;
                at += 2;
                if tag == SAME_LOCALS_1_STACK_ITEM_EXTENDED {
                    mode = FrameMode::Same1;
                    at = self.read_frame_item(at, &mut stack, labels, cx)?;
                } else if tag >= CHOP_FRAME && tag < SAME_FRAME_EXTENDED {
                    mode = FrameMode::Chop;
                    let k = (SAME_FRAME_EXTENDED - tag) as usize;
                    if k > locals.len() {
                        return Err(ClassDecodeError::UnrecognizedFrameType);
                    }
                    locals.truncate(locals.len() - k);
                } else if tag == SAME_FRAME_EXTENDED {
                    mode = FrameMode::Same;
                } else if tag < FULL_FRAME {
                    mode = FrameMode::Append;
                    for _ in 0..(tag - SAME_FRAME_EXTENDED) {
                        at = self.read_frame_item(at, &mut locals, labels, cx)?;
                    }
                } else {
                    mode = FrameMode::Full;
                    locals.clear();
                    let local_count = self.read_u2(at)?;
                    at += 2;
                    for _ in 0..local_count {
                        at = self.read_frame_item(at, &mut locals, labels, cx)?;
                    }
                    let stack_count = self.read_u2(at)?;
                    at += 2;
                    for _ in 0..stack_count {
                        at = self.read_frame_item(at, &mut stack, labels, cx)?;
                    }
                }
            }
            let frame_offset = match offset {
                None => delta,
                Some(prev) => prev + delta + 1
            };
            if frame_offset >= code_length {
                return Err(ClassDecodeError::InvalidCodeOffset);
            }
            offset = Some(frame_offset);
            frames.push(DecodedFrame {
                offset: frame_offset,
                mode,
                locals: locals.clone(),
                stack
            });
        }
        Ok(frames)
    }
    fn read_frame_item(&self, mut at: usize, items: &mut Vec<FrameItem>, labels: &mut [Option<Label>],
                       cx: &mut Context) -> Result<usize> {
        let ty = self.read_u1(at)?;
        at += 1;
        items.push(match ty {
            0 => FrameItem::Top,
            1 => FrameItem::Integer,
            2 => FrameItem::Float,
            3 => FrameItem::Double,
            4 => FrameItem::Long,
            5 => FrameItem::Null,
            6 => FrameItem::UninitializedThis,
            7 => {
                let cs = self.read_class(at, cx)?;
                at += 2;
                FrameItem::Class(cs)
            },
            8 => {
                let label = create_label(self.read_u2(at)? as isize, labels)?;
                at += 2;
                FrameItem::Uninitialized(label)
            },
            _ => {
                return Err(ClassDecodeError::UnrecognizedFrameType);
            }
        });
        Ok(at)
    }
    ///Reads the `CONSTANT_Dynamic` or `CONSTANT_InvokeDynamic` entry at `entry`.
    fn read_dynamic(&self, entry: usize, cx: &mut Context) -> Result<ConstantDynamic> {
        let bsm_index = self.read_u2(entry + 1)? as usize;
        let mut bsm_at = *cx.bootstrap_methods.get(bsm_index)
            .ok_or(ClassDecodeError::InvalidBootstrapMethod)?;
        let bootstrap = match self.read_const(self.read_u2(bsm_at)? as usize, cx)? {
            ClassConstant::MethodHandle(handle) => handle,
            _ => return Err(ClassDecodeError::InvalidBootstrapMethod)
        };
        let bsm_argc = self.read_u2(bsm_at + 2)? as usize;
        let mut args = Vec::with_capacity(bsm_argc);
        bsm_at += 4;
        for _ in 0..bsm_argc {
            args.push(self.read_const(self.read_u2(bsm_at)? as usize, cx)?);
            bsm_at += 2;
        }
        let (name, desc) = self.read_name_and_type(entry + 3, cx)?;
        Ok(ConstantDynamic {name, desc, bootstrap, args})
    }
    fn read_annotation_values(&self, mut at: usize, named: bool, mut vis: Option<&mut (dyn AnnotationVisitor + '_)>,
                              cx: &mut Context) -> Result<usize> {
        let num = self.read_u2(at)?;
        at += 2;
        for _ in 0..num {
            let name = if named {
                let name = self.read_utf8(at, cx)?;
                at += 2;
                name
            } else {
                Rc::from("")
            };
            at = self.read_annotation_value(at, name, vis.as_deref_mut(), cx)?;
        }
        if let Some(vis) = vis {
            vis.visit_end();
        }
        Ok(at)
    }
    fn read_annotation_value(&self, mut at: usize, name: Rc<str>, vis: Option<&mut (dyn AnnotationVisitor + '_)>,
                             cx: &mut Context) -> Result<usize> {
        let tag = self.read_u1(at)?;
        at += 1;
        match tag {
            b'B' | b'C' | b'I' | b'S' | b'Z' => {
                let value = match self.read_const(self.read_u2(at)? as usize, cx)? {
                    ClassConstant::Integer(c) => c,
                    _ => return Err(ClassDecodeError::ConstantPoolTypeMismatch)
                };
                let primitive = match tag {
                    b'B' => AnnotationPrimitive::Byte(value as i8),
                    b'C' => AnnotationPrimitive::Character(value as u16),
                    b'S' => AnnotationPrimitive::Short(value as i16),
                    b'Z' => AnnotationPrimitive::Boolean(value != 0),
                    _ => AnnotationPrimitive::Integer(value),
                };
                if let Some(vis) = vis {
                    vis.visit_primitive(name, primitive);
                }
                Ok(at + 2)
            },
            b'J' | b'F' | b'D' => {
                let primitive = match (tag, self.read_const(self.read_u2(at)? as usize, cx)?) {
                    (b'J', ClassConstant::Long(c)) => AnnotationPrimitive::Long(c),
                    (b'F', ClassConstant::Float(c)) => AnnotationPrimitive::Float(c),
                    (b'D', ClassConstant::Double(c)) => AnnotationPrimitive::Double(c),
                    _ => return Err(ClassDecodeError::ConstantPoolTypeMismatch)
                };
                if let Some(vis) = vis {
                    vis.visit_primitive(name, primitive);
                }
                Ok(at + 2)
            },
            b's' => {
                let string = self.read_utf8(at, cx)?;
                if let Some(vis) = vis {
                    vis.visit_primitive(name, AnnotationPrimitive::String(string));
                }
                Ok(at + 2)
            },
            b'e' => {
                let desc = self.read_utf8(at, cx)?;
                let value = self.read_utf8(at + 2, cx)?;
                if let Some(vis) = vis {
                    vis.visit_enum(name, desc, value);
                }
                Ok(at + 4)
            },
            b'c' => {
                let desc = self.read_utf8(at, cx)?;
                if let Some(vis) = vis {
                    vis.visit_primitive(name, AnnotationPrimitive::Type(Type::new(desc)));
                }
                Ok(at + 2)
            }
            b'@' => {
                let desc = self.read_utf8(at, cx)?;
                let mut nested = match vis {
                    Some(vis) => vis.visit_annotation(name, desc),
                    None => None
                };
                self.read_annotation_values(at + 2, true, nested.as_deref_mut(), cx)
            },
            b'[' => {
                let mut nested = match vis {
                    Some(vis) => vis.visit_array(name),
                    None => None
                };
                self.read_annotation_values(at, false, nested.as_deref_mut(), cx)
            },
            _ => {
                Err(ClassDecodeError::UnrecognizedAnnotationTag)
            }
        }
    }
    fn read_annotation_target(&self, mut at: usize) -> Result<(usize, TypeRef, TypePath)> {
        let target = self.read_u1(at)?;
        let typeref;
        match target {
            0x0 => {
                typeref = TypeRef::ClassTypeParameter(self.read_u1(at + 1)?);
                at += 2;
            },
            0x1 => {
                typeref = TypeRef::MethodTypeParameter(self.read_u1(at + 1)?);
                at += 2;
            },
            0x10 => {
                typeref = TypeRef::ClassExtends(self.read_u2(at + 1)?);
                at += 3;
            },
            0x11 => {
                let parameter = self.read_u1(at + 1)?;
                let bound = self.read_u1(at + 2)?;
                typeref = TypeRef::ClassTypeParameterBound {parameter, bound};
                at += 3;
            },
            0x12 => {
                let parameter = self.read_u1(at + 1)?;
                let bound = self.read_u1(at + 2)?;
                typeref = TypeRef::MethodTypeParameterBound {parameter, bound};
                at += 3;
            },
            0x13 => {
                typeref = TypeRef::FieldDeclaration;
                at += 1;
            },
            0x14 => {
                typeref = TypeRef::MethodReturnType;
                at += 1;
            },
            0x15 => {
                typeref = TypeRef::MethodReceiverType;
                at += 1;
            },
            0x16 => {
                typeref = TypeRef::MethodFormalParameter(self.read_u1(at + 1)?);
                at += 2;
            },
            0x17 => {
                typeref = TypeRef::ThrowsClause(self.read_u2(at + 1)?);
                at += 3;
            },
            _ => {
                return Err(ClassDecodeError::UnrecognizedTypeRef);
            }
        }
        let (at, type_path) = self.read_type_path(at)?;
        Ok((at, typeref, type_path))
    }
    fn read_type_path(&self, mut at: usize) -> Result<(usize, TypePath)> {
        let path_len = self.read_u1(at)?;
        at += 1;
        let mut type_path = Vec::with_capacity(path_len as usize);
        for _ in 0..path_len {
            match self.read_u1(at)? {
                0 => type_path.push(TypePathEntry::ArrayElement),
                1 => type_path.push(TypePathEntry::InnerType),
                2 => type_path.push(TypePathEntry::WildcardBound),
                3 => type_path.push(TypePathEntry::TypeArgument(self.read_u1(at + 1)?)),
                _ => {
                    return Err(ClassDecodeError::UnrecognizedTypePathKind);
                }
            }
            at += 2;
        }
        Ok((at, type_path))
    }
    fn get_attributes_offset(&self) -> Result<usize> {
        let mut u = self.header_offset + 8 +
            self.read_u2(self.header_offset + 6)? as usize * 2;
        for _ in 0..2 {
            //fields, then methods
            let n_members = self.read_u2(u)?;
            for _ in 0..n_members {
                let n_attrs = self.read_u2(u + 8)?;
                for _ in 0..n_attrs {
                    u += 6 + self.read_u4(u + 12)? as usize;
                }
                u += 8;
            }
            u += 2;
        }
        Ok(u)
    }

    fn read_const(&self, item: usize, cx: &mut Context) -> Result<ClassConstant> {
        let at = self.entry(item)?;
        let discr = self.read_u1(at)?;
        match discr {
            constant_pool_entry::INT => {
                self.read_i4(at + 1).map(ClassConstant::Integer)
            },
            constant_pool_entry::FLOAT => {
                self.read_f4(at + 1).map(ClassConstant::Float)
            },
            constant_pool_entry::LONG => {
                self.read_i8(at + 1).map(ClassConstant::Long)
            },
            constant_pool_entry::DOUBLE => {
                self.read_f8(at + 1).map(ClassConstant::Double)
            },
            constant_pool_entry::STR => {
                self.read_utf8(at + 1, cx).map(ClassConstant::String)
            },
            constant_pool_entry::CLASS => {
                self.read_utf8(at + 1, cx)
                    .map(|c| ClassConstant::Class(Type::new_object_type(c)))
            },
            constant_pool_entry::MTYPE => {
                self.read_utf8(at + 1, cx)
                    .map(|c| ClassConstant::MethodType(Type::new(c)))
            },
            constant_pool_entry::HANDLE => {
                let kind = self.read_u1(at + 1)?;
                let (member, owner, name, desc) = self.read_member_ref(at + 2, cx)?;
                Ok(ClassConstant::MethodHandle(
                    Handle::new(kind, owner, name, desc, member == constant_pool_entry::IMETH)))
            },
            constant_pool_entry::CONDY => {
                Ok(ClassConstant::ConstantDynamic(self.read_dynamic(at, cx)?))
            },
            _ => {
                Err(ClassDecodeError::UnrecognizedConstantPoolEntry)
            }
        }
    }
}
fn create_label(offset: isize, labels: &mut [Option<Label>]) -> Result<Label> {
    if offset < 0 || offset as usize >= labels.len() {
        return Err(ClassDecodeError::InvalidCodeOffset);
    }
    Ok(*labels[offset as usize].get_or_insert_with(Label::new))
}
fn label_at(offset: isize, labels: &[Option<Label>]) -> Result<Label> {
    if offset < 0 {
        return Err(ClassDecodeError::InvalidCodeOffset);
    }
    labels.get(offset as usize).copied().flatten().ok_or(ClassDecodeError::InvalidCodeOffset)
}
fn switch_entries(min: i32, max: i32) -> Result<usize> {
    let entries = max as i64 - min as i64 + 1;
    if entries < 0 || entries > 65536 {
        return Err(ClassDecodeError::InvalidCodeOffset);
    }
    Ok(entries as usize)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum InsnClass {
    NoArg,
    ImplVar,
    Sbyte,
    Short,
    Ldc,
    LdcWide,
    Var,
    Iinc,
    Label,
    WideLabel,
    Tableswitch,
    Lookupswitch,
    Field,
    Meth,
    ItfMeth,
    IndyMeth,
    Type,
    Multianew,
    Wide,
}

fn classify_insn(insn: u8) -> Result<InsnClass> {
    use self::opcodes::*;
    Ok(match insn {
        NOP..=DCONST_1 => InsnClass::NoArg,
        BIPUSH | NEWARRAY => InsnClass::Sbyte,
        SIPUSH => InsnClass::Short,
        LDC => InsnClass::Ldc,
        LDC_W | LDC2_W => InsnClass::LdcWide,
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => InsnClass::Var,
        ILOAD_0..=ALOAD_3 | ISTORE_0..=ASTORE_3 => InsnClass::ImplVar,
        IALOAD..=SALOAD | IASTORE..=LXOR | I2L..=DCMPG => InsnClass::NoArg,
        IINC => InsnClass::Iinc,
        IFEQ..=JSR | IFNULL | IFNONNULL => InsnClass::Label,
        TABLESWITCH => InsnClass::Tableswitch,
        LOOKUPSWITCH => InsnClass::Lookupswitch,
        IRETURN..=RETURN | ARRAYLENGTH | ATHROW | MONITORENTER | MONITOREXIT => InsnClass::NoArg,
        GETSTATIC..=PUTFIELD => InsnClass::Field,
        INVOKEVIRTUAL..=INVOKESTATIC => InsnClass::Meth,
        INVOKEINTERFACE => InsnClass::ItfMeth,
        INVOKEDYNAMIC => InsnClass::IndyMeth,
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => InsnClass::Type,
        WIDE => InsnClass::Wide,
        MULTIANEWARRAY => InsnClass::Multianew,
        GOTO_W | JSR_W => InsnClass::WideLabel,
        _ => return Err(ClassDecodeError::UnrecognizedInstruction)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    #[test]
    fn every_opcode_is_classified() {
        for op in 0..=JSR_W {
            assert!(classify_insn(op).is_ok(), "opcode {} not classified", op);
        }
        assert_eq!(classify_insn(202), Err(ClassDecodeError::UnrecognizedInstruction));
        assert_eq!(classify_insn(ALOAD_3).unwrap(), InsnClass::ImplVar);
        assert_eq!(classify_insn(RET).unwrap(), InsnClass::Var);
        assert_eq!(classify_insn(INVOKEINTERFACE).unwrap(), InsnClass::ItfMeth);
    }

    #[test]
    fn rejects_non_class_bytes() {
        let reader = ClassReader::new(&[0xCA, 0xFE, 0xBA, 0xBF, 0, 0, 0, 52]);
        assert_eq!(reader.get_name(), Err(ClassDecodeError::InvalidMagic));
        let reader = ClassReader::new(&[0xCA, 0xFE]);
        assert_eq!(reader.get_access(), Err(ClassDecodeError::UnexpectedEof));
    }

    #[test]
    fn rejects_future_versions() {
        let reader = ClassReader::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 66, 0, 1]);
        assert_eq!(reader.get_name(), Err(ClassDecodeError::UnknownVersion));
    }

    #[test]
    fn labels_are_bounded_by_code_length() {
        let mut labels = vec![None; 3];
        assert!(create_label(2, &mut labels).is_ok());
        assert_eq!(create_label(3, &mut labels), Err(ClassDecodeError::InvalidCodeOffset));
        assert_eq!(create_label(-1, &mut labels), Err(ClassDecodeError::InvalidCodeOffset));
        assert_eq!(create_label(2, &mut labels).unwrap(), label_at(2, &labels).unwrap());
        assert_eq!(label_at(1, &labels), Err(ClassDecodeError::InvalidCodeOffset));
    }
}
