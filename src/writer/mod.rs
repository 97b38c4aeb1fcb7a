//! Builds a class file from visitor events.
//!
//! [`ClassWriter`] is the terminal visitor of a chain. It does not compute stack map frames or
//! operand stack sizes; whatever `visit_frame` and `visit_maxs` report is written back, with frame
//! offsets and branch targets resolved against the code as it was re-encoded.
mod annotation;
mod bytes;
mod code;
mod constant_pool;

use self::annotation::{put_target, put_type_path, AnnotationWriter, Annotations};
use self::bytes::{put_attribute, PutBytes};
use self::code::MethodWriter;
use self::constant_pool::ConstantPool;
use crate::opcodes;
use crate::{AnnotationVisitor, ClassAccess, ClassConstant, ClassVersion, ClassVisitor, ExportFlags, FieldAccess,
            FieldVisitor, InnerClassAccess, MethodAccess, MethodVisitor, ModuleFlags, ModuleVisitor,
            RecordComponentVisitor, RequireFlags, TypePath, TypeRef};
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassEncodeError {
    #[error("constant pool is full")]
    ConstantPoolOverflow,
    #[error("string of {0} encoded bytes does not fit in a constant")]
    StringTooLong(usize),
    #[error("code of method {0} is longer than 65535 bytes")]
    CodeTooLong(Rc<str>),
    #[error("branch offset {offset} in method {method} does not fit in 16 bits")]
    BranchOffsetOverflow { method: Rc<str>, offset: i64 },
    #[error("method {0} refers to a label that was never visited")]
    UnresolvedLabel(Rc<str>),
    #[error("class header was never visited")]
    MissingHeader,
    #[error("too many {0}")]
    TooManyEntries(&'static str),
}

pub type Result<T> = ::std::result::Result<T, ClassEncodeError>;

///State shared by the class writer and the writers it hands out.
///Visitor methods cannot return errors, so the first one is kept here.
#[derive(Debug)]
pub(crate) struct Context {
    pub(crate) pool: ConstantPool,
    pub(crate) class_name: Rc<str>,
    error: Option<ClassEncodeError>,
}

impl Context {
    pub(crate) fn new() -> Context {
        Context {
            pool: ConstantPool::new(),
            class_name: Rc::from(""),
            error: None
        }
    }
    ///Runs a pool operation, recording its failure and standing in index 0 for the result.
    pub(crate) fn index<F>(&mut self, f: F) -> u16 where F: FnOnce(&mut ConstantPool) -> Result<u16> {
        match f(&mut self.pool) {
            Ok(idx) => idx,
            Err(e) => {
                self.fail(e);
                0
            }
        }
    }
    pub(crate) fn fail(&mut self, e: ClassEncodeError) {
        if self.error.is_none() {
            log::debug!("class encoding failed: {}", e);
            self.error = Some(e);
        }
    }
    pub(crate) fn error(&self) -> Option<&ClassEncodeError> {
        self.error.as_ref()
    }
    fn attribute_name(&mut self, name: &str) -> u16 {
        self.index(|cp| cp.utf8(name))
    }
}

///Serialized `field_info`/`method_info`/`record_component_info` structures and their count.
#[derive(Debug, Default)]
pub(crate) struct MemberList {
    body: Vec<u8>,
    count: u16,
}

impl MemberList {
    pub(crate) fn push(&mut self, ctx: &mut Context, member: &[u8], what: &'static str) {
        match self.count.checked_add(1) {
            Some(count) => {
                self.count = count;
                self.body.extend_from_slice(member);
            },
            None => ctx.fail(ClassEncodeError::TooManyEntries(what))
        }
    }
    fn write_to(&self, out: &mut Vec<u8>) {
        out.put_u2(self.count);
        out.extend_from_slice(&self.body);
    }
}

pub(crate) fn put_attributes(out: &mut Vec<u8>, attrs: &[(u16, Vec<u8>)]) {
    out.put_u2(attrs.len() as u16);
    for (name, info) in attrs {
        put_attribute(out, *name, info);
    }
}

fn index_list(indices: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(indices.len() * 2 + 2);
    out.put_u2(indices.len() as u16);
    for idx in indices {
        out.put_u2(*idx);
    }
    out
}

#[derive(Debug, Clone)]
struct Header {
    version: ClassVersion,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    signature: Option<u16>,
    deprecated: bool,
}

#[derive(Debug, Default)]
struct ModuleData {
    name: u16,
    flags: u16,
    version: u16,
    requires: Vec<u8>,
    requires_count: u16,
    exports: Vec<u8>,
    exports_count: u16,
    opens: Vec<u8>,
    opens_count: u16,
    uses: Vec<u16>,
    provides: Vec<u8>,
    provides_count: u16,
    packages: Vec<u16>,
    main_class: Option<u16>,
}

impl ModuleData {
    fn info(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u2(self.name);
        out.put_u2(self.flags);
        out.put_u2(self.version);
        out.put_u2(self.requires_count);
        out.extend_from_slice(&self.requires);
        out.put_u2(self.exports_count);
        out.extend_from_slice(&self.exports);
        out.put_u2(self.opens_count);
        out.extend_from_slice(&self.opens);
        out.extend_from_slice(&index_list(&self.uses));
        out.put_u2(self.provides_count);
        out.extend_from_slice(&self.provides);
        out
    }
}

///A [`ClassVisitor`] that accumulates the visited class and serializes it with [`to_bytes`].
///
///[`to_bytes`]: ClassWriter::to_bytes
#[derive(Debug)]
pub struct ClassWriter {
    ctx: Context,
    header: Option<Header>,
    source: Option<u16>,
    debug: Option<Vec<u8>>,
    enclosing_method: Option<(u16, u16)>,
    nest_host: Option<u16>,
    nest_members: Vec<u16>,
    permitted_subclasses: Vec<u16>,
    inner_classes: Vec<u8>,
    inner_class_count: u16,
    annotations: Annotations,
    type_annotations: Annotations,
    module: Option<ModuleData>,
    record: Option<MemberList>,
    fields: MemberList,
    methods: MemberList,
}

impl Default for ClassWriter {
    fn default() -> Self {
        ClassWriter::new()
    }
}

impl ClassWriter {
    pub fn new() -> ClassWriter {
        ClassWriter {
            ctx: Context::new(),
            header: None,
            source: None,
            debug: None,
            enclosing_method: None,
            nest_host: None,
            nest_members: Vec::new(),
            permitted_subclasses: Vec::new(),
            inner_classes: Vec::new(),
            inner_class_count: 0,
            annotations: Annotations::default(),
            type_annotations: Annotations::default(),
            module: None,
            record: None,
            fields: MemberList::default(),
            methods: MemberList::default(),
        }
    }

    ///Serializes the class. Fails with the first error recorded while visiting, or with
    ///`MissingHeader` if `visit_header` never happened.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let header = self.header.clone().ok_or(ClassEncodeError::MissingHeader)?;
        let attrs = self.class_attributes(&header);
        if let Some(e) = self.ctx.error() {
            return Err(e.clone());
        }
        let mut out = Vec::new();
        out.put_u4(opcodes::CLASS_MAGIC);
        out.put_u2(header.version.minor);
        out.put_u2(header.version.major);
        self.ctx.pool.write_to(&mut out);
        out.put_u2(header.access);
        out.put_u2(header.this_class);
        out.put_u2(header.super_class);
        out.extend_from_slice(&index_list(&header.interfaces));
        self.fields.write_to(&mut out);
        self.methods.write_to(&mut out);
        put_attributes(&mut out, &attrs);
        log::debug!("encoded class {} ({} bytes, {} constants)", self.ctx.class_name, out.len(), self.ctx.pool.count());
        Ok(out)
    }

    pub fn save_to_path<P: AsRef<Path>>(&mut self, path: P) -> ::std::result::Result<(), crate::Error> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    fn class_attributes(&mut self, header: &Header) -> Vec<(u16, Vec<u8>)> {
        let ctx = &mut self.ctx;
        let mut attrs = Vec::new();
        if let Some(source) = self.source {
            let mut info = Vec::new();
            info.put_u2(source);
            attrs.push((ctx.attribute_name("SourceFile"), info));
        }
        if let Some(ref debug) = self.debug {
            attrs.push((ctx.attribute_name("SourceDebugExtension"), debug.clone()));
        }
        if let Some(signature) = header.signature {
            let mut info = Vec::new();
            info.put_u2(signature);
            attrs.push((ctx.attribute_name("Signature"), info));
        }
        if header.deprecated {
            attrs.push((ctx.attribute_name("Deprecated"), Vec::new()));
        }
        if let Some((class, method)) = self.enclosing_method {
            let mut info = Vec::new();
            info.put_u2(class);
            info.put_u2(method);
            attrs.push((ctx.attribute_name("EnclosingMethod"), info));
        }
        if let Some(host) = self.nest_host {
            let mut info = Vec::new();
            info.put_u2(host);
            attrs.push((ctx.attribute_name("NestHost"), info));
        }
        if !self.nest_members.is_empty() {
            attrs.push((ctx.attribute_name("NestMembers"), index_list(&self.nest_members)));
        }
        if !self.permitted_subclasses.is_empty() {
            attrs.push((ctx.attribute_name("PermittedSubclasses"), index_list(&self.permitted_subclasses)));
        }
        if self.inner_class_count > 0 {
            let mut info = Vec::new();
            info.put_u2(self.inner_class_count);
            info.extend_from_slice(&self.inner_classes);
            attrs.push((ctx.attribute_name("InnerClasses"), info));
        }
        if let Some(ref module) = self.module {
            attrs.push((ctx.attribute_name("Module"), module.info()));
            if !module.packages.is_empty() {
                attrs.push((ctx.attribute_name("ModulePackages"), index_list(&module.packages)));
            }
            if let Some(main) = module.main_class {
                let mut info = Vec::new();
                info.put_u2(main);
                attrs.push((ctx.attribute_name("ModuleMainClass"), info));
            }
        }
        if let Some(ref record) = self.record {
            let mut info = Vec::new();
            record.write_to(&mut info);
            attrs.push((ctx.attribute_name("Record"), info));
        }
        self.annotations.attributes(ctx, "RuntimeVisibleAnnotations", "RuntimeInvisibleAnnotations", &mut attrs);
        self.type_annotations.attributes(ctx, "RuntimeVisibleTypeAnnotations", "RuntimeInvisibleTypeAnnotations", &mut attrs);
        //Must come last: everything above may still add bootstrap methods' names to the pool.
        if ctx.pool.has_bootstrap_methods() {
            let name = ctx.attribute_name("BootstrapMethods");
            attrs.push((name, ctx.pool.bootstrap_methods_info()));
        }
        attrs
    }

    fn class_index(&mut self, name: &str) -> u16 {
        self.ctx.index(|cp| cp.class(name))
    }
}

impl ClassVisitor for ClassWriter {
    fn visit_header(&mut self, version: ClassVersion, access: ClassAccess, name: Rc<str>,
                   signature: Option<Rc<str>>, super_name: Option<Rc<str>>,
                   interfaces: Vec<Rc<str>>) {
        self.ctx.class_name = name.clone();
        let this_class = self.class_index(&name);
        let super_class = super_name.map_or(0, |s| self.class_index(&s));
        let interfaces = interfaces.iter().map(|i| self.class_index(i)).collect::<Vec<_>>();
        let signature = signature.map(|s| self.ctx.index(|cp| cp.utf8(&s)));
        self.header = Some(Header {
            version,
            access: access.bits() as u16,
            this_class,
            super_class,
            interfaces,
            signature,
            deprecated: access.contains(ClassAccess::ACC_PSEUDO_DEPRECATED)
        });
    }
    fn visit_source(&mut self, source: Option<Rc<str>>, debug: Option<String>) {
        self.source = source.map(|s| self.ctx.index(|cp| cp.utf8(&s)));
        self.debug = debug.map(|d| cesu8::to_java_cesu8(&d).into_owned());
    }
    fn visit_outer_class(&mut self, owner: Rc<str>, method: Option<(Rc<str>, Rc<str>)>) {
        let owner = self.class_index(&owner);
        let method = method.map_or(0, |(name, desc)| self.ctx.index(|cp| cp.name_and_type(&name, &desc)));
        self.enclosing_method = Some((owner, method));
    }
    fn visit_nest_host(&mut self, name: Rc<str>) {
        self.nest_host = Some(self.class_index(&name));
    }
    fn visit_nest_member(&mut self, name: Rc<str>) {
        let idx = self.class_index(&name);
        self.nest_members.push(idx);
    }
    fn visit_permitted_subclass(&mut self, name: Rc<str>) {
        let idx = self.class_index(&name);
        self.permitted_subclasses.push(idx);
    }
    fn visit_annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let out = self.annotations.list(visible).begin();
        Some(Box::new(AnnotationWriter::annotation(&mut self.ctx, out, &desc)))
    }
    fn visit_type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let out = self.type_annotations.list(visible).begin();
        put_target(out, &type_ref, 0);
        put_type_path(out, &type_path);
        Some(Box::new(AnnotationWriter::annotation(&mut self.ctx, out, &desc)))
    }
    fn visit_module(&mut self, name: Rc<str>, flags: ModuleFlags, version: Option<Rc<str>>) -> Option<Box<dyn ModuleVisitor + '_>> {
        let name = self.ctx.index(|cp| cp.module(&name));
        let version = version.map_or(0, |v| self.ctx.index(|cp| cp.utf8(&v)));
        let module = self.module.get_or_insert_with(ModuleData::default);
        module.name = name;
        module.flags = flags.bits() as u16;
        module.version = version;
        Some(Box::new(ModuleWriter {
            ctx: &mut self.ctx,
            module
        }))
    }
    fn visit_inner_class(&mut self, inner_name: Rc<str>, outer_name: Option<Rc<str>>, simple_inner_name: Option<Rc<str>>, access: InnerClassAccess) {
        let inner = self.class_index(&inner_name);
        let outer = outer_name.map_or(0, |o| self.class_index(&o));
        let simple = simple_inner_name.map_or(0, |s| self.ctx.index(|cp| cp.utf8(&s)));
        match self.inner_class_count.checked_add(1) {
            Some(count) => self.inner_class_count = count,
            None => return self.ctx.fail(ClassEncodeError::TooManyEntries("inner classes"))
        }
        let out = &mut self.inner_classes;
        out.put_u2(inner);
        out.put_u2(outer);
        out.put_u2(simple);
        out.put_u2(access.bits() as u16);
    }
    fn visit_record_component(&mut self, name: Rc<str>, desc: Rc<str>, signature: Option<Rc<str>>) -> Option<Box<dyn RecordComponentVisitor + '_>> {
        let name = self.ctx.index(|cp| cp.utf8(&name));
        let desc = self.ctx.index(|cp| cp.utf8(&desc));
        let signature = signature.map(|s| self.ctx.index(|cp| cp.utf8(&s)));
        Some(Box::new(RecordComponentWriter {
            ctx: &mut self.ctx,
            out: self.record.get_or_insert_with(MemberList::default),
            name, desc, signature,
            annotations: Annotations::default(),
            type_annotations: Annotations::default()
        }))
    }
    fn visit_field(&mut self, access: FieldAccess, name: Rc<str>, desc: Rc<str>, signature: Option<Rc<str>>, value: Option<ClassConstant>) -> Option<Box<dyn FieldVisitor + '_>> {
        let ctx = &mut self.ctx;
        let name = ctx.index(|cp| cp.utf8(&name));
        let desc = ctx.index(|cp| cp.utf8(&desc));
        let signature = signature.map(|s| ctx.index(|cp| cp.utf8(&s)));
        let value = value.map(|v| ctx.index(|cp| cp.constant(&v)));
        Some(Box::new(FieldWriter {
            ctx,
            out: &mut self.fields,
            access, name, desc, signature, value,
            annotations: Annotations::default(),
            type_annotations: Annotations::default()
        }))
    }
    fn visit_method(&mut self, access: MethodAccess, name: Rc<str>, desc: Rc<str>, signature: Option<Rc<str>>, exceptions: Vec<Rc<str>>) -> Option<Box<dyn MethodVisitor + '_>> {
        Some(Box::new(MethodWriter::new(&mut self.ctx, &mut self.methods, access, name, desc, signature, exceptions)))
    }
}

struct FieldWriter<'a> {
    ctx: &'a mut Context,
    out: &'a mut MemberList,
    access: FieldAccess,
    name: u16,
    desc: u16,
    signature: Option<u16>,
    value: Option<u16>,
    annotations: Annotations,
    type_annotations: Annotations,
}

impl<'a> FieldVisitor for FieldWriter<'a> {
    fn visit_annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let out = self.annotations.list(visible).begin();
        Some(Box::new(AnnotationWriter::annotation(self.ctx, out, &desc)))
    }
    fn visit_type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let out = self.type_annotations.list(visible).begin();
        put_target(out, &type_ref, 0);
        put_type_path(out, &type_path);
        Some(Box::new(AnnotationWriter::annotation(self.ctx, out, &desc)))
    }
    fn visit_end(&mut self) {
        let ctx = &mut *self.ctx;
        let mut attrs = Vec::new();
        if let Some(value) = self.value {
            let mut info = Vec::new();
            info.put_u2(value);
            attrs.push((ctx.attribute_name("ConstantValue"), info));
        }
        if let Some(signature) = self.signature {
            let mut info = Vec::new();
            info.put_u2(signature);
            attrs.push((ctx.attribute_name("Signature"), info));
        }
        if self.access.contains(FieldAccess::ACC_PSEUDO_DEPRECATED) {
            attrs.push((ctx.attribute_name("Deprecated"), Vec::new()));
        }
        self.annotations.attributes(ctx, "RuntimeVisibleAnnotations", "RuntimeInvisibleAnnotations", &mut attrs);
        self.type_annotations.attributes(ctx, "RuntimeVisibleTypeAnnotations", "RuntimeInvisibleTypeAnnotations", &mut attrs);
        let mut field = Vec::new();
        field.put_u2(self.access.bits() as u16);
        field.put_u2(self.name);
        field.put_u2(self.desc);
        put_attributes(&mut field, &attrs);
        self.out.push(ctx, &field, "fields");
    }
}

struct RecordComponentWriter<'a> {
    ctx: &'a mut Context,
    out: &'a mut MemberList,
    name: u16,
    desc: u16,
    signature: Option<u16>,
    annotations: Annotations,
    type_annotations: Annotations,
}

impl<'a> RecordComponentVisitor for RecordComponentWriter<'a> {
    fn visit_annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let out = self.annotations.list(visible).begin();
        Some(Box::new(AnnotationWriter::annotation(self.ctx, out, &desc)))
    }
    fn visit_type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let out = self.type_annotations.list(visible).begin();
        put_target(out, &type_ref, 0);
        put_type_path(out, &type_path);
        Some(Box::new(AnnotationWriter::annotation(self.ctx, out, &desc)))
    }
    fn visit_end(&mut self) {
        let ctx = &mut *self.ctx;
        let mut attrs = Vec::new();
        if let Some(signature) = self.signature {
            let mut info = Vec::new();
            info.put_u2(signature);
            attrs.push((ctx.attribute_name("Signature"), info));
        }
        self.annotations.attributes(ctx, "RuntimeVisibleAnnotations", "RuntimeInvisibleAnnotations", &mut attrs);
        self.type_annotations.attributes(ctx, "RuntimeVisibleTypeAnnotations", "RuntimeInvisibleTypeAnnotations", &mut attrs);
        let mut component = Vec::new();
        component.put_u2(self.name);
        component.put_u2(self.desc);
        put_attributes(&mut component, &attrs);
        self.out.push(ctx, &component, "record components");
    }
}

struct ModuleWriter<'a> {
    ctx: &'a mut Context,
    module: &'a mut ModuleData,
}

impl<'a> ModuleWriter<'a> {
    fn put_exports(&mut self, open: bool, pkg: &str, flags: ExportFlags, modules: &[Rc<str>]) {
        let pkg = self.ctx.index(|cp| cp.package(pkg));
        let mut entry = Vec::new();
        entry.put_u2(pkg);
        entry.put_u2(flags.bits() as u16);
        entry.put_u2(modules.len() as u16);
        for m in modules {
            let m = self.ctx.index(|cp| cp.module(m));
            entry.put_u2(m);
        }
        if open {
            self.module.opens.extend_from_slice(&entry);
            self.module.opens_count = self.module.opens_count.wrapping_add(1);
        } else {
            self.module.exports.extend_from_slice(&entry);
            self.module.exports_count = self.module.exports_count.wrapping_add(1);
        }
    }
}

impl<'a> ModuleVisitor for ModuleWriter<'a> {
    fn visit_main_class(&mut self, name: Rc<str>) {
        self.module.main_class = Some(self.ctx.index(|cp| cp.class(&name)));
    }
    fn visit_package(&mut self, pkg: Rc<str>) {
        let idx = self.ctx.index(|cp| cp.package(&pkg));
        self.module.packages.push(idx);
    }
    fn visit_require(&mut self, module: Rc<str>, flags: RequireFlags, version: Option<Rc<str>>) {
        let module = self.ctx.index(|cp| cp.module(&module));
        let version = version.map_or(0, |v| self.ctx.index(|cp| cp.utf8(&v)));
        let out = &mut self.module.requires;
        out.put_u2(module);
        out.put_u2(flags.bits() as u16);
        out.put_u2(version);
        self.module.requires_count = self.module.requires_count.wrapping_add(1);
    }
    fn visit_export(&mut self, pkg: Rc<str>, flags: ExportFlags, modules: Vec<Rc<str>>) {
        self.put_exports(false, &pkg, flags, &modules);
    }
    fn visit_open(&mut self, pkg: Rc<str>, flags: ExportFlags, modules: Vec<Rc<str>>) {
        self.put_exports(true, &pkg, flags, &modules);
    }
    fn visit_use(&mut self, service: Rc<str>) {
        let idx = self.ctx.index(|cp| cp.class(&service));
        self.module.uses.push(idx);
    }
    fn visit_provide(&mut self, service: Rc<str>, providers: Vec<Rc<str>>) {
        let service = self.ctx.index(|cp| cp.class(&service));
        let out = &mut self.module.provides;
        out.put_u2(service);
        out.put_u2(providers.len() as u16);
        for p in &providers {
            let p = self.ctx.index(|cp| cp.class(p));
            self.module.provides.put_u2(p);
        }
        self.module.provides_count = self.module.provides_count.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    fn header(cw: &mut ClassWriter) {
        cw.visit_header(ClassVersion::new(V1_8, 0), ClassAccess::ACC_PUBLIC | ClassAccess::ACC_SUPER, Rc::from("Foo"),
                        None, Some(Rc::from("java/lang/Object")), vec![Rc::from("java/lang/Runnable")]);
    }

    #[test]
    fn missing_header_is_an_error() {
        let mut cw = ClassWriter::new();
        assert_eq!(cw.to_bytes(), Err(ClassEncodeError::MissingHeader));
    }

    #[test]
    fn empty_class_layout() {
        let mut cw = ClassWriter::new();
        header(&mut cw);
        cw.visit_end();
        let bytes = cw.to_bytes().unwrap();
        assert_eq!(&bytes[..8], &[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52]);
        //Foo, its class, Object, its class, Runnable, its class
        assert_eq!(&bytes[8..10], &[0, 7]);
        //access, this, super, one interface, no fields, methods or attributes
        let tail = &bytes[bytes.len() - 16..];
        assert_eq!(tail, &[0, 0x21, 0, 2, 0, 4, 0, 1, 0, 6, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn first_error_is_reported() {
        let mut cw = ClassWriter::new();
        header(&mut cw);
        let long = "x".repeat(70_000);
        cw.visit_source(Some(Rc::from(long.as_str())), None);
        cw.visit_nest_host(Rc::from(long.as_str()));
        assert_eq!(cw.to_bytes(), Err(ClassEncodeError::StringTooLong(70_000)));
    }

    #[test]
    fn deprecated_is_not_an_access_flag() {
        let mut cw = ClassWriter::new();
        cw.visit_header(ClassVersion::new(V1_8, 0), ClassAccess::ACC_PUBLIC | ClassAccess::ACC_PSEUDO_DEPRECATED,
                        Rc::from("Old"), None, Some(Rc::from("java/lang/Object")), vec![]);
        let bytes = cw.to_bytes().unwrap();
        //constant pool: Old, class, Object, class, Deprecated
        assert_eq!(&bytes[8..10], &[0, 6]);
        let tail = &bytes[bytes.len() - 8..];
        assert_eq!(tail, &[0, 1, 0, 5, 0, 0, 0, 0]);
    }
}
