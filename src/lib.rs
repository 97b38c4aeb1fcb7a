//! Reads JVM class files, rewrites them through a visitor chain and writes them back out.
//!
//! The crate is organised around the visitor traits defined here. [`reader::ClassReader`]
//! produces events, [`writer::ClassWriter`] consumes them into a new class file, and
//! [`instrument::ClassRewriter`] sits between the two, adding trace calls at method entry and
//! before every return.
//!
//! ```no_run
//! use classfile_tracer::instrument::{instrument_class, TraceConfig};
//!
//! # fn run(bytes: &[u8]) -> Result<(), classfile_tracer::Error> {
//! let traced = instrument_class(bytes, &TraceConfig::default())?;
//! std::fs::write("t.class", traced).map_err(classfile_tracer::Error::Write)?;
//! # Ok(())
//! # }
//! ```
pub mod opcodes;
mod somewhat_unique_id;
use crate::somewhat_unique_id::UID;
use std::borrow::Borrow;
use std::rc::Rc;

pub mod classpath;
mod error;
pub mod instrument;
pub mod reader;
#[cfg(feature = "tree")]
pub mod tree;
pub mod writer;
pub use error::Error;
use bitflags::*;

pub(crate) mod constant_pool_entry {
    pub(crate) const UTF8:u8 = 1;
    pub(crate) const INT:u8 = 3;
    pub(crate) const FLOAT:u8 = 4;
    pub(crate) const LONG:u8 = 5;
    pub(crate) const DOUBLE:u8 = 6;
    pub(crate) const CLASS:u8 = 7;
    pub(crate) const STR:u8 = 8;
    pub(crate) const FIELD:u8 = 9;
    pub(crate) const METH:u8 = 10;
    pub(crate) const IMETH:u8 = 11;
    pub(crate) const NAME_TYPE:u8 = 12;
    pub(crate) const HANDLE:u8 = 15;
    pub(crate) const MTYPE:u8 = 16;
    pub(crate) const CONDY:u8 = 17;
    pub(crate) const INDY:u8 = 18;

    pub(crate) const MODULE:u8 = 19;
    pub(crate) const PACKAGE:u8 = 20;
}


bitflags! {
    pub struct ClassAccess: u32 {
        const ACC_PUBLIC = 0x1;
        const ACC_FINAL = 0x10;
        const ACC_SUPER = 0x20;
        const ACC_INTERFACE = 0x200;
        const ACC_ABSTRACT = 0x400;
        const ACC_SYNTHETIC = 0x1000;
        const ACC_ANNOTATION = 0x2000;
        const ACC_ENUM = 0x4000;
        const ACC_MODULE = 0x8000;
        const ACC_PSEUDO_DEPRECATED = 0x20000;
    }
}

bitflags! {
    pub struct InnerClassAccess: u32 {
        const ACC_PUBLIC = 0x1;
        const ACC_PRIVATE = 0x2;
        const ACC_PROTECTED = 0x4;
        const ACC_STATIC = 0x8;
        const ACC_FINAL = 0x10;
        const ACC_INTERFACE = 0x200;
        const ACC_ABSTRACT = 0x400;
        const ACC_SYNTHETIC = 0x1000;
        const ACC_ANNOTATION = 0x2000;
        const ACC_ENUM = 0x4000;
    }
}

bitflags! {
    pub struct FieldAccess: u32 {
        const ACC_PUBLIC = 0x1;
        const ACC_PRIVATE = 0x2;
        const ACC_PROTECTED = 0x4;
        const ACC_STATIC = 0x8;
        const ACC_FINAL = 0x10;
        const ACC_VOLATILE = 0x40;
        const ACC_TRANSIENT = 0x80;
        const ACC_SYNTHETIC = 0x1000;
        const ACC_ENUM = 0x4000;
        const ACC_PSEUDO_DEPRECATED = 0x20000;
    }
}

bitflags! {
    pub struct MethodAccess: u32 {
        const ACC_PUBLIC = 0x1;
        const ACC_PRIVATE = 0x2;
        const ACC_PROTECTED = 0x4;
        const ACC_STATIC = 0x8;
        const ACC_FINAL = 0x10;
        const ACC_SYNCHRONIZED = 0x20;
        const ACC_BRIDGE = 0x40;
        const ACC_VARARGS = 0x80;
        const ACC_NATIVE = 0x100;
        const ACC_ABSTRACT = 0x400;
        const ACC_STRICT = 0x800;
        const ACC_SYNTHETIC = 0x1000;
        const ACC_PSEUDO_DEPRECATED = 0x20000;
    }
}

bitflags! {
    pub struct ParameterAccess: u32 {
        const ACC_FINAL = 0x10;
        const ACC_SYNTHETIC = 0x1000;
        const ACC_MANDATED = 0x8000;
    }
}

bitflags! {
    pub struct ModuleFlags: u32 {
        const ACC_OPEN = 0x20;
        const ACC_SYNTHETIC = 0x1000;
        const ACC_MANDATED = 0x8000;
    }
}

bitflags! {
    pub struct RequireFlags: u32 {
        const ACC_TRANSITIVE = 0x20;
        const ACC_STATIC_PHASE = 0x40;
        const ACC_SYNTHETIC = 0x1000;
        const ACC_MANDATED = 0x8000;
    }
}

bitflags! {
    pub struct ExportFlags: u32 {
        const ACC_SYNTHETIC = 0x1000;
        const ACC_MANDATED = 0x8000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassVersion {
    pub minor: u16,
    pub major: u16
}

impl ClassVersion {
    pub fn new(major: u16, minor: u16) -> ClassVersion {
        ClassVersion {
            major, minor
        }
    }
}

///A method handle constant. `interface` tells whether the referenced member
///is resolved through an `InterfaceMethodref`.
#[derive(Debug, Clone, PartialEq)]
pub struct Handle {
    pub tag: u8,
    pub owner: Rc<str>,
    pub name: Rc<str>,
    pub desc: Rc<str>,
    pub interface: bool
}
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDynamic {
    pub name: Rc<str>,
    pub desc: Rc<str>,
    pub bootstrap: Handle,
    pub args: Vec<ClassConstant>
}

impl Handle {
    pub const GET_FIELD: u8 = 1;
    pub const GET_STATIC: u8 = 2;
    pub const PUT_FIELD: u8 = 3;
    pub const PUT_STATIC: u8 = 4;
    pub const INVOKE_VIRTUAL: u8 = 5;
    pub const INVOKE_STATIC: u8 = 6;
    pub const INVOKE_SPECIAL: u8 = 7;
    pub const NEW_INVOKE_SPECIAL: u8 = 8;
    pub const INVOKE_INTERFACE: u8 = 9;

    pub fn new(tag: u8, owner: Rc<str>, name: Rc<str>, desc: Rc<str>, interface: bool) -> Handle {
        Handle {
            tag, owner, name, desc, interface
        }
    }
    pub fn is_field(&self) -> bool {
        self.tag <= Handle::PUT_STATIC
    }
}
///An abstract token used to represent a position in code.
///The only useful operation is the equality comparison.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Copy)]
pub struct Label {
    data: UID
}
#[derive(Clone, Debug, Copy, PartialEq)]
pub struct LocalVariableSpan {
    pub end: Label,
    pub index: u16,
    pub start: Label,
}
impl LocalVariableSpan {
    pub fn new(start: Label, end: Label, index: u16) -> LocalVariableSpan {
        LocalVariableSpan {
            start, end, index
        }
    }
}
///Which `StackMapTable` encoding a frame was stored with.
///Frames are always reported with the complete list of locals, whatever the mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameMode {
    Full,
    Append,
    Chop,
    Same,
    Same1
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameItem {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Class(Rc<str>),
    Uninitialized(Label)
}

impl Label {
    pub fn new() -> Label {
        let data = UID::new();
        Label {data}
    }
}

impl Default for Label {
    fn default() -> Self {
        Label::new()
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Type {
    desc: Rc<str>
}

impl Type {
    pub fn new<T>(desc: T) -> Type where T: Into<Rc<str>> {
        Type {
            desc: desc.into()
        }
    }
    ///Builds the type of a class constant from its internal name (`java/lang/String`)
    ///or, for arrays, from its descriptor.
    pub fn new_object_type<T>(desc: T) -> Type where T: Into<Rc<str>> {
        let c = desc.into();
        let ds = if c.starts_with('[') {
            c
        } else {
            Rc::from(format!("L{};", c))
        };
        Type {
            desc: ds
        }
    }
    pub fn get_descriptor(&self) -> &str {
        self.desc.borrow()
    }
    ///The name a `CONSTANT_Class` entry stores for this type.
    pub fn internal_name(&self) -> &str {
        let ds: &str = self.desc.borrow();
        if ds.starts_with('L') && ds.ends_with(';') {
            &ds[1..ds.len() - 1]
        } else {
            ds
        }
    }
    pub fn size(&self) -> usize {
        match self.desc.as_bytes().first() {
            Some(b'J') | Some(b'D') => 2,
            Some(b'V') => 0,
            _ => 1
        }
    }
    ///Slot count of the arguments (plus one for the receiver) and of the return value.
    pub fn argument_and_return_size(&self) -> (usize, usize) {
        let arg = self.argument_types().iter().fold(1, |a, e| a + e.size());
        let ret = self.return_type().map_or(0, |t| t.size());
        (arg, ret)
    }
    pub fn return_type(&self) -> Option<Type> {
        let ds: &str = self.desc.borrow();
        ds.find(')').map(|i| Type::new(&ds[i + 1..]))
    }
    pub fn argument_types(&self) -> Vec<Type> {
        let ds: &str = self.desc.borrow();
        let bytes = ds.as_bytes();
        let mut args = Vec::new();
        let mut i = match ds.find('(') {
            Some(open) => open + 1,
            None => return args
        };
        while i < bytes.len() && bytes[i] != b')' {
            let start = i;
            while i < bytes.len() && bytes[i] == b'[' {
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b'L' {
                while i < bytes.len() && bytes[i] != b';' {
                    i += 1;
                }
            }
            i += 1;
            args.push(Type::new(&ds[start..i.min(bytes.len())]));
        }
        args
    }
}
///Locals of the frame that is implicit at method entry, which compressed frames are relative to.
pub(crate) fn initial_frame(owner: &str, access: MethodAccess, name: &str, desc: &str) -> Vec<FrameItem> {
    let mut locals = Vec::new();
    if !access.contains(MethodAccess::ACC_STATIC) {
        if name == "<init>" {
            locals.push(FrameItem::UninitializedThis);
        } else {
            locals.push(FrameItem::Class(Rc::from(owner)));
        }
    }
    for arg in Type::new(desc).argument_types() {
        locals.push(match arg.get_descriptor().as_bytes().first() {
            Some(b'Z') | Some(b'B') | Some(b'C') | Some(b'S') | Some(b'I') => FrameItem::Integer,
            Some(b'F') => FrameItem::Float,
            Some(b'J') => FrameItem::Long,
            Some(b'D') => FrameItem::Double,
            _ => FrameItem::Class(Rc::from(arg.internal_name()))
        });
    }
    locals
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassConstant {
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Class(Type),
    String(Rc<str>),
    MethodType(Type),
    MethodHandle(Handle),
    ConstantDynamic(ConstantDynamic)
}
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationPrimitive {
    Byte(i8),
    Boolean(bool),
    Character(u16),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(Rc<str>),
    Type(Type)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypePathEntry {
    ArrayElement,
    InnerType,
    WildcardBound,
    TypeArgument(u8)
}

pub type TypePath = Vec<TypePathEntry>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypeRef {
    ClassTypeParameter(u8),
    ClassExtends(u16),
    ClassTypeParameterBound {parameter: u8, bound: u8},
    FieldDeclaration,
    MethodTypeParameter(u8),
    MethodTypeParameterBound {parameter: u8, bound: u8},
    MethodReturnType,
    MethodReceiverType,
    MethodFormalParameter(u8), //Due to javac being javac the value can be not what you expect
    ThrowsClause(u16),
    LocalVariable,
    ResourceVariable,
    ExceptionParameter(u16),
    Instanceof,
    New,
    MethodReference,
    ConstructorReference,
    Cast(u8),
    GenericConstructorInvocation(u8),
    GenericMethodInvocation(u8),
    GenericConstructorReference(u8),
    GenericMethodReference(u8)
}

///Visits a Java annotation. The methods will be called in the following order:
/// (`visit_primitive` | `visit_array` | `visit_annotation` | `visit_enum`)* `visit_end`
/// If used to visit an array, an empty string must be passed as `name` argument
/// If `get_wrapped_visitor` returns `Some`, unimplemented methods will be forwarded to that visitor
pub trait AnnotationVisitor {
    ///Returns a visitor that the unimplemented methods will be forwarded to.
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn AnnotationVisitor> {
        None
    }
    ///Visits a primitive value. Unlike in ASM, this can't be used to visit arrays.
    fn visit_primitive(&mut self, name: Rc<str>, value: AnnotationPrimitive) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_primitive(name, value);
        }
    }
    fn visit_enum(&mut self, name: Rc<str>, desc: Rc<str>, value: Rc<str>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_enum(name, desc, value);
        }
    }
    fn visit_annotation(&mut self, name: Rc<str>, desc: Rc<str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_annotation(name, desc)
        } else {
            None
        }
    }
    ///Returns a visitor to visit the array members
    fn visit_array(&mut self, name: Rc<str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_array(name)
        } else {
            None
        }
    }
    fn visit_end(&mut self) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_end();
        }
    }
}
pub trait FieldVisitor {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn FieldVisitor> {
        None
    }
    fn visit_annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_annotation(desc, visible)
        } else {
            None
        }
    }
    fn visit_type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_type_annotation(type_ref, type_path, desc, visible)
        } else {
            None
        }
    }
    fn visit_end(&mut self) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_end();
        }
    }
}
pub trait RecordComponentVisitor {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn RecordComponentVisitor> {
        None
    }
    fn visit_annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_annotation(desc, visible)
        } else {
            None
        }
    }
    fn visit_type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_type_annotation(type_ref, type_path, desc, visible)
        } else {
            None
        }
    }
    fn visit_end(&mut self) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_end();
        }
    }
}
///Visits a method. Everything from `visit_code` to `visit_maxs` is only reported for methods
///that have a body; `visit_end` is always the last call.
pub trait MethodVisitor {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn MethodVisitor> {
        None
    }
    fn visit_tableswitch_insn(&mut self, min: i32, max: i32, dflt: Label, labels: Vec<Label>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_tableswitch_insn(min, max, dflt, labels);
        }
    }
    fn visit_frame(&mut self, mode: FrameMode, locals: &[FrameItem], stack: &[FrameItem]) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_frame(mode, locals, stack);
        }
    }
    fn visit_insn(&mut self, opcode: u8) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_insn(opcode);
        }
    }
    fn visit_multianew_insn(&mut self, class: Rc<str>, dimensions: u8) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_multianew_insn(class, dimensions);
        }
    }
    fn visit_type_insn(&mut self, opcode: u8, class: Rc<str>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_type_insn(opcode, class);
        }
    }
    fn visit_ldc_insn(&mut self, cst: ClassConstant) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_ldc_insn(cst);
        }
    }
    fn visit_lookupswitch_insn(&mut self, dflt: Label, pairs: Vec<(i32, Label)>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_lookupswitch_insn(dflt, pairs);
        }
    }
    fn visit_indy_insn(&mut self, name: Rc<str>, desc: Rc<str>, bsm: Handle, args: Vec<ClassConstant>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_indy_insn(name, desc, bsm, args);
        }
    }
    fn visit_field_insn(&mut self, opcode: u8, owner: Rc<str>, name: Rc<str>, desc: Rc<str>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_field_insn(opcode, owner, name, desc);
        }
    }
    ///`interface` is true when the owner is an interface (the reference is an `InterfaceMethodref`).
    fn visit_method_insn(&mut self, opcode: u8, owner: Rc<str>, name: Rc<str>, desc: Rc<str>, interface: bool) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_method_insn(opcode, owner, name, desc, interface);
        }
    }
    fn visit_jump_insn(&mut self, opcode: u8, label: Label) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_jump_insn(opcode, label);
        }
    }
    fn visit_iinc_insn(&mut self, var: u16, by: i16) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_iinc_insn(var, by);
        }
    }
    fn visit_var_insn(&mut self, opcode: u8, var: u16) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_var_insn(opcode, var);
        }
    }
    fn visit_int_insn(&mut self, opcode: u8, operand: i32) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_int_insn(opcode, operand);
        }
    }
    fn visit_local_var(&mut self, name: Rc<str>, desc: Rc<str>, sig: Option<Rc<str>>, span: LocalVariableSpan) {
       if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_local_var(name, desc, sig, span);
        }
    }
    fn visit_maxs(&mut self, max_stack: u16, max_local: u16) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_maxs(max_stack, max_local);
        }
    }
    fn visit_label(&mut self, label: Label) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_label(label);
        }
    }
    fn visit_line_number(&mut self, line: u16, label: Label) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_line_number(line, label);
        }
    }
    fn visit_parameter(&mut self, name: Option<Rc<str>>, access: ParameterAccess) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_parameter(name, access);
        }
    }
    fn visit_annotation_default(&mut self) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_annotation_default()
        } else {
            None
        }
    }
    fn visit_annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_annotation(desc, visible)
        } else {
            None
        }
    }
    ///Annotates the instruction visited last.
    fn visit_insn_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_insn_annotation(type_ref, type_path, desc, visible)
        } else {
            None
        }
    }
    fn visit_type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_type_annotation(type_ref, type_path, desc, visible)
        } else {
            None
        }
    }
    fn visit_trycatch_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_trycatch_annotation(type_ref, type_path, desc, visible)
        } else {
            None
        }
    }
    fn visit_local_variable_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, spans: Vec<LocalVariableSpan>, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_local_variable_annotation(type_ref, type_path, spans, desc, visible)
        } else {
            None
        }
    }
    fn visit_parameter_annotation(&mut self, parameter: u8, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_parameter_annotation(parameter, desc, visible)
        } else {
            None
        }
    }
    fn visit_end(&mut self) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_end();
        }
    }
    fn visit_code(&mut self) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_code();
        }
    }
    fn visit_try_catch(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<Rc<str>>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_try_catch(start, end, handler, catch_type);
        }
    }
    fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_annotable_parameter_count(count, visible);
        }
    }
}
pub trait ModuleVisitor {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn ModuleVisitor> {
        None
    }
    fn visit_main_class(&mut self, name: Rc<str>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_main_class(name);
        }
    }
    fn visit_package(&mut self, pkg: Rc<str>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_package(pkg);
        }
    }
    fn visit_require(&mut self, module: Rc<str>, flags: RequireFlags, version: Option<Rc<str>>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_require(module, flags, version);
        }
    }
    fn visit_export(&mut self, pkg: Rc<str>, flags: ExportFlags, modules: Vec<Rc<str>>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_export(pkg, flags, modules);
        }
    }
    fn visit_open(&mut self, pkg: Rc<str>, flags: ExportFlags, modules: Vec<Rc<str>>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_open(pkg, flags, modules);
        }
    }
    fn visit_provide(&mut self, service: Rc<str>, providers: Vec<Rc<str>>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_provide(service, providers);
        }
    }
    fn visit_use(&mut self, service: Rc<str>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_use(service);
        }
    }
    fn visit_end(&mut self) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_end();
        }
    }
}

pub trait ClassVisitor {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn ClassVisitor> {
        None
    }
    fn visit_header(&mut self, version: ClassVersion, access: ClassAccess, name: Rc<str>,
                   signature: Option<Rc<str>>, super_name: Option<Rc<str>>,
                   interfaces: Vec<Rc<str>>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_header(version, access, name, signature, super_name, interfaces);
        }
    }
    fn visit_end(&mut self) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_end();
        }
    }
    fn visit_source(&mut self, source: Option<Rc<str>>, debug: Option<String>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_source(source, debug);
        }
    }
    fn visit_outer_class(&mut self, owner: Rc<str>, method: Option<(Rc<str>, Rc<str>)>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_outer_class(owner, method);
        }
    }
    fn visit_nest_host(&mut self, name: Rc<str>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_nest_host(name);
        }
    }
    fn visit_nest_member(&mut self, name: Rc<str>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_nest_member(name);
        }
    }
    fn visit_permitted_subclass(&mut self, name: Rc<str>) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_permitted_subclass(name);
        }
    }
    fn visit_annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_annotation(desc, visible)
        } else {
            None
        }
    }
    fn visit_module(&mut self, name: Rc<str>, flags: ModuleFlags, version: Option<Rc<str>>) -> Option<Box<dyn ModuleVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_module(name, flags, version)
        } else {
            None
        }
    }
    fn visit_type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_type_annotation(type_ref, type_path, desc, visible)
        } else {
            None
        }
    }
    fn visit_inner_class(&mut self, inner_name: Rc<str>, outer_name: Option<Rc<str>>, simple_inner_name: Option<Rc<str>>, access: InnerClassAccess) {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_inner_class(inner_name, outer_name, simple_inner_name, access);
        }
    }
    fn visit_record_component(&mut self, name: Rc<str>, desc: Rc<str>, signature: Option<Rc<str>>) -> Option<Box<dyn RecordComponentVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_record_component(name, desc, signature)
        } else {
            None
        }
    }
    fn visit_field(&mut self, access: FieldAccess, name: Rc<str>, desc: Rc<str>, signature: Option<Rc<str>>, value: Option<ClassConstant>) -> Option<Box<dyn FieldVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_field(access, name, desc, signature, value)
        } else {
            None
        }
    }
    fn visit_method(&mut self, access: MethodAccess, name: Rc<str>, desc: Rc<str>, signature: Option<Rc<str>>, exceptions: Vec<Rc<str>>) -> Option<Box<dyn MethodVisitor + '_>> {
        if let Some(vis) = self.get_wrapped_visitor() {
            vis.visit_method(access, name, desc, signature, exceptions)
        } else {
            None
        }
    }
}

//A mutable borrow of a visitor is itself a visitor, so chains can be built over
//visitors the caller keeps ownership of.
impl<'a, T: AnnotationVisitor> AnnotationVisitor for &'a mut T {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn AnnotationVisitor> {
        Some(&mut **self)
    }
}
impl<'a, T: FieldVisitor> FieldVisitor for &'a mut T {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn FieldVisitor> {
        Some(&mut **self)
    }
}
impl<'a, T: RecordComponentVisitor> RecordComponentVisitor for &'a mut T {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn RecordComponentVisitor> {
        Some(&mut **self)
    }
}
impl<'a, T: MethodVisitor> MethodVisitor for &'a mut T {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn MethodVisitor> {
        Some(&mut **self)
    }
}
impl<'a, T: ModuleVisitor> ModuleVisitor for &'a mut T {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn ModuleVisitor> {
        Some(&mut **self)
    }
}
impl<'a, T: ClassVisitor> ClassVisitor for &'a mut T {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut **self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_types_of_mixed_descriptor() {
        let ty = Type::new("(I[JLjava/lang/String;[[Ljava/util/List;D)V");
        let args: Vec<String> = ty.argument_types().iter().map(|t| t.get_descriptor().to_owned()).collect();
        assert_eq!(args, vec!["I", "[J", "Ljava/lang/String;", "[[Ljava/util/List;", "D"]);
        assert_eq!(ty.argument_and_return_size(), (7, 0));
    }

    #[test]
    fn return_size_of_wide_values() {
        assert_eq!(Type::new("()J").argument_and_return_size(), (1, 2));
        assert_eq!(Type::new("(Ljava/lang/Object;)I").argument_and_return_size(), (2, 1));
    }

    #[test]
    fn object_type_round_trips_internal_name() {
        let ty = Type::new_object_type("java/lang/String");
        assert_eq!(ty.get_descriptor(), "Ljava/lang/String;");
        assert_eq!(ty.internal_name(), "java/lang/String");
        let arr = Type::new_object_type("[I");
        assert_eq!(arr.get_descriptor(), "[I");
        assert_eq!(arr.internal_name(), "[I");
    }

    #[test]
    fn labels_compare_by_identity() {
        let a = Label::new();
        let b = Label::new();
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    struct Counter {
        insns: usize,
        ends: usize
    }
    impl MethodVisitor for Counter {
        fn visit_insn(&mut self, _: u8) {
            self.insns += 1;
        }
        fn visit_end(&mut self) {
            self.ends += 1;
        }
    }

    fn drive<V: MethodVisitor>(mut vis: V) {
        vis.visit_insn(opcodes::NOP);
        vis.visit_insn(opcodes::RETURN);
        vis.visit_label(Label::new());
        vis.visit_end();
    }

    #[test]
    fn borrowed_visitor_forwards_every_event() {
        let mut counter = Counter { insns: 0, ends: 0 };
        drive(&mut counter);
        assert_eq!(counter.insns, 2);
        assert_eq!(counter.ends, 1);
    }

    #[test]
    fn entry_frame_of_constructor_and_static_method() {
        let ctor = initial_frame("a/B", MethodAccess::ACC_PUBLIC, "<init>", "(JLjava/lang/String;)V");
        assert_eq!(ctor, vec![FrameItem::UninitializedThis, FrameItem::Long, FrameItem::Class(Rc::from("java/lang/String"))]);
        let stat = initial_frame("a/B", MethodAccess::ACC_STATIC, "f", "([IZ)V");
        assert_eq!(stat, vec![FrameItem::Class(Rc::from("[I")), FrameItem::Integer]);
        let inst = initial_frame("a/B", MethodAccess::empty(), "g", "()V");
        assert_eq!(inst, vec![FrameItem::Class(Rc::from("a/B"))]);
    }
}
