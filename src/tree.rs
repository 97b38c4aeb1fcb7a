//! In-memory recordings of visitor events that can be replayed with `accept`.
use super::{ClassVisitor, MethodVisitor, AnnotationVisitor, FieldVisitor};
use super::{ParameterAccess, ClassAccess, MethodAccess, FieldAccess, InnerClassAccess};
use super::{ClassConstant, Label, Handle, TypePath, TypeRef, ClassVersion};
use super::{FrameItem, FrameMode, AnnotationPrimitive, LocalVariableSpan};
use super::reader::{ClassReader, ClassReaderFlags, ClassDecodeError};
use std::{
    rc::Rc,
    vec::Vec,
    cmp::max
};

fn record_annotation(list: &mut Vec<AnnotationNode>, desc: Rc<str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
    list.push(AnnotationNode::new(desc));
    list.last_mut().map(|c| Box::new(c) as Box<dyn AnnotationVisitor + '_>)
}

fn record_type_annotation(list: &mut Vec<TypeAnnotationNode>, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
    list.push(TypeAnnotationNode::new(type_ref, type_path, desc));
    list.last_mut().map(|c| Box::new(&mut c.annotation) as Box<dyn AnnotationVisitor + '_>)
}

fn replay(av: Option<Box<dyn AnnotationVisitor + '_>>, node: &AnnotationNode) {
    if let Some(mut av) = av {
        node.accept(&mut *av);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub access: FieldAccess,
    pub name: Rc<str>,
    pub desc: Rc<str>,
    pub invisible_annotations: Vec<AnnotationNode>,
    pub invisible_type_annotations: Vec<TypeAnnotationNode>,
    pub signature: Option<Rc<str>>,
    pub value: Option<ClassConstant>,
    pub visible_annotations: Vec<AnnotationNode>,
    pub visible_type_annotations: Vec<TypeAnnotationNode>
}

impl FieldNode {
    pub fn new(access: FieldAccess, name: Rc<str>, desc: Rc<str>, signature: Option<Rc<str>>, value: Option<ClassConstant>) -> FieldNode {
        FieldNode {
            access, name, desc, signature, value,
            invisible_annotations: Vec::new(),
            invisible_type_annotations: Vec::new(),
            visible_annotations: Vec::new(),
            visible_type_annotations: Vec::new()
        }
    }
    pub fn accept(&self, vis: &mut dyn ClassVisitor) {
        if let Some(mut fv) = vis.visit_field(self.access, self.name.clone(), self.desc.clone(), self.signature.clone(), self.value.clone()) {
            for ann in &self.visible_annotations {
                replay(fv.visit_annotation(ann.desc.clone(), true), ann);
            }
            for ann in &self.invisible_annotations {
                replay(fv.visit_annotation(ann.desc.clone(), false), ann);
            }
            for tann in &self.visible_type_annotations {
                replay(fv.visit_type_annotation(tann.type_ref, tann.type_path.clone(), tann.annotation.desc.clone(), true), &tann.annotation);
            }
            for tann in &self.invisible_type_annotations {
                replay(fv.visit_type_annotation(tann.type_ref, tann.type_path.clone(), tann.annotation.desc.clone(), false), &tann.annotation);
            }
            fv.visit_end();
        }
    }
}
impl FieldVisitor for FieldNode {
    fn visit_annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if visible {
            record_annotation(&mut self.visible_annotations, desc)
        } else {
            record_annotation(&mut self.invisible_annotations, desc)
        }
    }
    fn visit_type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool)-> Option<Box<dyn AnnotationVisitor + '_>> {
        if visible {
            record_type_annotation(&mut self.visible_type_annotations, type_ref, type_path, desc)
        } else {
            record_type_annotation(&mut self.invisible_type_annotations, type_ref, type_path, desc)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerClassNode {
    pub access: InnerClassAccess,
    pub inner_name: Rc<str>,
    pub name: Option<Rc<str>>,
    pub outer_name: Option<Rc<str>>,
}

impl InnerClassNode {
    pub fn accept(&self, vis: &mut dyn ClassVisitor) {
        vis.visit_inner_class(self.inner_name.clone(), self.outer_name.clone(), self.name.clone(), self.access);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Primitive(AnnotationPrimitive),
    Enum{desc: Rc<str>, value: Rc<str>},
    Nested(AnnotationNode),
    Array(Vec<AnnotationValue>)
}

impl AnnotationValue {
    fn accept(&self, vis: &mut dyn AnnotationVisitor, k: Rc<str>) {
        match self {
            AnnotationValue::Primitive(pr) => {
                vis.visit_primitive(k, pr.clone());
            },
            AnnotationValue::Enum{desc, value} => {
                vis.visit_enum(k, desc.clone(), value.clone());
            },
            AnnotationValue::Array(arr) => {
                if let Some(mut vis2) = vis.visit_array(k) {
                    for val in arr {
                        val.accept(&mut *vis2, Rc::from(""));
                    }
                    vis2.visit_end();
                }
            },
            AnnotationValue::Nested(n) => {
                replay(vis.visit_annotation(k, n.desc.clone()), n);
            }
        }
    }
}

///Records the elements of an array value; element names are empty and dropped.
struct ArrayRecorder<'a> {
    values: &'a mut Vec<AnnotationValue>
}

impl<'a> AnnotationVisitor for ArrayRecorder<'a> {
    fn visit_primitive(&mut self, _: Rc<str>, value: AnnotationPrimitive) {
        self.values.push(AnnotationValue::Primitive(value));
    }
    fn visit_enum(&mut self, _: Rc<str>, desc: Rc<str>, value: Rc<str>) {
        self.values.push(AnnotationValue::Enum {desc, value});
    }
    fn visit_annotation(&mut self, _: Rc<str>, desc: Rc<str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.values.push(AnnotationValue::Nested(AnnotationNode::new(desc)));
        match self.values.last_mut() {
            Some(AnnotationValue::Nested(node)) => Some(Box::new(node)),
            _ => None
        }
    }
    fn visit_array(&mut self, _: Rc<str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.values.push(AnnotationValue::Array(Vec::new()));
        match self.values.last_mut() {
            Some(AnnotationValue::Array(values)) => Some(Box::new(ArrayRecorder {values})),
            _ => None
        }
    }
}

///An annotation with its element-value pairs in the order they were visited.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationNode {
    pub desc: Rc<str>,
    pub values: Vec<(Rc<str>, AnnotationValue)>
}

impl AnnotationNode {
    pub fn new(desc: Rc<str>) -> AnnotationNode {
        AnnotationNode {
            desc,
            values: Vec::new()
        }
    }
    pub fn get(&self, name: &str) -> Option<&AnnotationValue> {
        self.values.iter().find(|(k, _)| &**k == name).map(|(_, v)| v)
    }
    pub fn accept(&self, vis: &mut dyn AnnotationVisitor) {
        for (k, v) in &self.values {
            v.accept(vis, k.clone());
        }
        vis.visit_end();
    }
}
impl AnnotationVisitor for AnnotationNode {
    fn visit_primitive(&mut self, name: Rc<str>, value: AnnotationPrimitive) {
        self.values.push((name, AnnotationValue::Primitive(value)));
    }
    fn visit_enum(&mut self, name: Rc<str>, desc: Rc<str>, value: Rc<str>) {
        self.values.push((name, AnnotationValue::Enum {desc, value}));
    }
    fn visit_annotation(&mut self, name: Rc<str>, desc: Rc<str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.values.push((name, AnnotationValue::Nested(AnnotationNode::new(desc))));
        match self.values.last_mut() {
            Some((_, AnnotationValue::Nested(node))) => Some(Box::new(node)),
            _ => None
        }
    }
    fn visit_array(&mut self, name: Rc<str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.values.push((name, AnnotationValue::Array(Vec::new())));
        match self.values.last_mut() {
            Some((_, AnnotationValue::Array(values))) => Some(Box::new(ArrayRecorder {values})),
            _ => None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotationNode {
    pub type_ref: TypeRef,
    pub type_path: TypePath,
    pub annotation: AnnotationNode,
}

impl TypeAnnotationNode {
    pub fn new(type_ref: TypeRef, type_path: TypePath, desc: Rc<str>) -> TypeAnnotationNode {
        let annotation = AnnotationNode::new(desc);
        TypeAnnotationNode {
            type_path, type_ref, annotation
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariableAnnotationNode {
    pub data: TypeAnnotationNode,
    pub spans: Vec<LocalVariableSpan>
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstructionNode {
    pub data: InstructionData,
    pub invisible_type_annotations: Vec<TypeAnnotationNode>,
    pub visible_type_annotations: Vec<TypeAnnotationNode>
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstructionData {
    NoArgInsn{opcode: u8},
    FieldInsn{opcode: u8, owner: Rc<str>, name: Rc<str>, desc: Rc<str>},
    MethodInsn{opcode: u8, owner: Rc<str>, name: Rc<str>, desc: Rc<str>, interface: bool},
    IincInsn{var: u16, by: i16},
    IntInsn{opcode: u8, operand: i32},
    InvokeDynamic{name: Rc<str>, desc: Rc<str>, bsm: Handle, args: Vec<ClassConstant>},
    JumpInsn{opcode: u8, label: Label},
    LabelNode{label: Label},
    LdcInsn{data: ClassConstant},
    LineNumberNode{line: u16, start: Label},
    LookupswitchInsn{dflt: Label, pairs: Vec<(i32, Label)>},
    MultianewInsn{ty: Rc<str>, dims: u8},
    TableswitchInsn{min: i32, max: i32, dflt: Label, labels: Vec<Label>},
    TypeInsn{opcode: u8, ty: Rc<str>},
    VarInsn{opcode: u8, var: u16},
    FrameNode{mode: FrameMode, locals: Vec<FrameItem>, stack: Vec<FrameItem>}
}

impl InstructionData {
    ///The opcode of a real instruction; labels, line numbers and frames have none.
    pub fn opcode(&self) -> Option<u8> {
        use crate::opcodes;
        match self {
            InstructionData::NoArgInsn {opcode} |
            InstructionData::FieldInsn {opcode, ..} |
            InstructionData::MethodInsn {opcode, ..} |
            InstructionData::IntInsn {opcode, ..} |
            InstructionData::JumpInsn {opcode, ..} |
            InstructionData::TypeInsn {opcode, ..} |
            InstructionData::VarInsn {opcode, ..} => Some(*opcode),
            InstructionData::IincInsn {..} => Some(opcodes::IINC),
            InstructionData::InvokeDynamic {..} => Some(opcodes::INVOKEDYNAMIC),
            InstructionData::LdcInsn {..} => Some(opcodes::LDC),
            InstructionData::LookupswitchInsn {..} => Some(opcodes::LOOKUPSWITCH),
            InstructionData::MultianewInsn {..} => Some(opcodes::MULTIANEWARRAY),
            InstructionData::TableswitchInsn {..} => Some(opcodes::TABLESWITCH),
            InstructionData::LabelNode {..} |
            InstructionData::LineNumberNode {..} |
            InstructionData::FrameNode {..} => None
        }
    }
}

impl InstructionNode {
    pub fn new(data: InstructionData) -> InstructionNode {
        InstructionNode {
            data,
            invisible_type_annotations: Vec::new(),
            visible_type_annotations: Vec::new()
        }
    }
    pub fn accept(&self, vis: &mut dyn MethodVisitor) {
        match &self.data {
            InstructionData::NoArgInsn {opcode} => {
                vis.visit_insn(*opcode);
            },
            InstructionData::FieldInsn {opcode, owner, name, desc} => {
                vis.visit_field_insn(*opcode, owner.clone(), name.clone(), desc.clone());
            },
            InstructionData::MethodInsn {opcode, owner, name, desc, interface} => {
                vis.visit_method_insn(*opcode, owner.clone(), name.clone(), desc.clone(), *interface);
            },
            InstructionData::IincInsn {var, by} => {
                vis.visit_iinc_insn(*var, *by);
            },
            InstructionData::IntInsn {opcode, operand} => {
                vis.visit_int_insn(*opcode, *operand);
            },
            InstructionData::InvokeDynamic {name, desc, bsm, args} => {
                vis.visit_indy_insn(name.clone(), desc.clone(), bsm.clone(), args.clone());
            },
            InstructionData::JumpInsn {opcode, label} => {
                vis.visit_jump_insn(*opcode, *label);
            },
            InstructionData::LabelNode {label} => {
                vis.visit_label(*label);
            },
            InstructionData::LdcInsn {data} => {
                vis.visit_ldc_insn(data.clone());
            },
            InstructionData::LineNumberNode {line, start} => {
                vis.visit_line_number(*line, *start);
            },
            InstructionData::LookupswitchInsn {dflt, pairs} => {
                vis.visit_lookupswitch_insn(*dflt, pairs.clone());
            },
            InstructionData::MultianewInsn{ty, dims} => {
                vis.visit_multianew_insn(ty.clone(), *dims);
            },
            InstructionData::TableswitchInsn{min, max, dflt, labels} => {
                vis.visit_tableswitch_insn(*min, *max, *dflt, labels.clone());
            },
            InstructionData::TypeInsn{opcode, ty} => {
                vis.visit_type_insn(*opcode, ty.clone());
            },
            InstructionData::VarInsn{opcode, var} => {
                vis.visit_var_insn(*opcode, *var);
            },
            InstructionData::FrameNode {mode, locals, stack} => {
                vis.visit_frame(*mode, locals, stack);
            }
        }
        for tann in &self.visible_type_annotations {
            replay(vis.visit_insn_annotation(tann.type_ref, tann.type_path.clone(), tann.annotation.desc.clone(), true), &tann.annotation);
        }
        for tann in &self.invisible_type_annotations {
            replay(vis.visit_insn_annotation(tann.type_ref, tann.type_path.clone(), tann.annotation.desc.clone(), false), &tann.annotation);
        }
    }
}


#[derive(Debug, Clone, PartialEq)]
pub struct ParameterNode {
    pub access: ParameterAccess,
    pub name: Option<Rc<str>>,
}

impl ParameterNode {
    pub fn accept(&self, vis: &mut dyn MethodVisitor) {
        vis.visit_parameter(self.name.clone(), self.access);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariableNode {
    pub name: Rc<str>,
    pub desc: Rc<str>,
    pub span: LocalVariableSpan,
    pub signature: Option<Rc<str>>,
}

impl LocalVariableNode {
    pub fn accept(&self, vis: &mut dyn MethodVisitor) {
        vis.visit_local_var(self.name.clone(), self.desc.clone(), self.signature.clone(), self.span);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryCatchBlockNode {
    pub start: Label,
    pub handler: Label,
    pub end: Label,
    pub catch_type: Option<Rc<str>>,
    pub invisible_type_annotations: Vec<TypeAnnotationNode>,
    pub visible_type_annotations: Vec<TypeAnnotationNode>
}

impl TryCatchBlockNode {
    pub fn new(start: Label, end: Label, handler: Label, catch_type: Option<Rc<str>>) -> TryCatchBlockNode {
        TryCatchBlockNode {
            start, end, handler, catch_type,
            invisible_type_annotations: Vec::new(),
            visible_type_annotations: Vec::new(),
        }
    }
    pub fn accept(&self, vis: &mut dyn MethodVisitor) {
        vis.visit_try_catch(self.start, self.end, self.handler, self.catch_type.clone());
        for tann in &self.visible_type_annotations {
            replay(vis.visit_trycatch_annotation(tann.type_ref, tann.type_path.clone(), tann.annotation.desc.clone(), true), &tann.annotation);
        }
        for tann in &self.invisible_type_annotations {
            replay(vis.visit_trycatch_annotation(tann.type_ref, tann.type_path.clone(), tann.annotation.desc.clone(), false), &tann.annotation);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    pub access: MethodAccess,
    pub annotation_default: Option<AnnotationNode>,
    pub name: Rc<str>,
    pub desc: Rc<str>,
    pub exceptions: Vec<Rc<str>>,
    pub has_code: bool,
    pub instructions: Vec<InstructionNode>,
    pub invisible_annotable_parameter_count: Option<u8>,
    pub invisible_annotations: Vec<AnnotationNode>,
    pub invisible_local_variable_annotations: Vec<LocalVariableAnnotationNode>,
    pub invisible_parameter_annotations: Vec<Vec<AnnotationNode>>,
    pub invisible_type_annotations: Vec<TypeAnnotationNode>,
    pub local_variables: Vec<LocalVariableNode>,
    pub max_locals: u16,
    pub max_stack: u16,
    pub parameters: Vec<ParameterNode>,
    pub signature: Option<Rc<str>>,
    pub try_catch_blocks: Vec<TryCatchBlockNode>,
    pub visible_annotable_parameter_count: Option<u8>,
    pub visible_annotations: Vec<AnnotationNode>,
    pub visible_local_variable_annotations: Vec<LocalVariableAnnotationNode>,
    pub visible_parameter_annotations: Vec<Vec<AnnotationNode>>,
    pub visible_type_annotations: Vec<TypeAnnotationNode>,
}

impl MethodNode {
    pub fn new(access: MethodAccess, name: Rc<str>, desc: Rc<str>, signature: Option<Rc<str>>, exceptions: Vec<Rc<str>>) -> MethodNode {
        MethodNode {
            access, name, desc, signature, exceptions,
            annotation_default: None,
            has_code: false,
            instructions: Vec::new(),
            invisible_annotable_parameter_count: None,
            invisible_annotations: Vec::new(),
            invisible_local_variable_annotations: Vec::new(),
            invisible_parameter_annotations: Vec::new(),
            invisible_type_annotations: Vec::new(),
            local_variables: Vec::new(),
            max_locals: 0,
            max_stack: 0,
            parameters: Vec::new(),
            try_catch_blocks: Vec::new(),
            visible_annotable_parameter_count: None,
            visible_annotations: Vec::new(),
            visible_local_variable_annotations: Vec::new(),
            visible_parameter_annotations: Vec::new(),
            visible_type_annotations: Vec::new(),
        }
    }
    pub fn new_empty() -> MethodNode {
        MethodNode::new(MethodAccess::empty(), Rc::from(""), Rc::from("()V"), None, Vec::new())
    }
    ///Opcodes of the real instructions, skipping labels, line numbers and frames.
    pub fn opcodes(&self) -> Vec<u8> {
        self.instructions.iter().filter_map(|i| i.data.opcode()).collect()
    }
    pub fn accept_cv(&self, vis: &mut dyn ClassVisitor) {
        if let Some(mut mv) = vis.visit_method(self.access, self.name.clone(), self.desc.clone(), self.signature.clone(), self.exceptions.clone()) {
            self.accept_mv(&mut *mv);
        }
    }
    pub fn accept_mv(&self, vis: &mut dyn MethodVisitor) {
        for par in &self.parameters {
            par.accept(vis);
        }
        if let Some(vl) = &self.annotation_default {
            if let Some(mut av) = vis.visit_annotation_default() {
                //the default is a single unnamed value
                for (k, v) in &vl.values {
                    v.accept(&mut *av, k.clone());
                }
                av.visit_end();
            }
        }
        for ann in &self.visible_annotations {
            replay(vis.visit_annotation(ann.desc.clone(), true), ann);
        }
        for ann in &self.invisible_annotations {
            replay(vis.visit_annotation(ann.desc.clone(), false), ann);
        }
        for tann in &self.visible_type_annotations {
            replay(vis.visit_type_annotation(tann.type_ref, tann.type_path.clone(), tann.annotation.desc.clone(), true), &tann.annotation);
        }
        for tann in &self.invisible_type_annotations {
            replay(vis.visit_type_annotation(tann.type_ref, tann.type_path.clone(), tann.annotation.desc.clone(), false), &tann.annotation);
        }
        let parameter_annotations = [
            (self.visible_annotable_parameter_count, &self.visible_parameter_annotations, true),
            (self.invisible_annotable_parameter_count, &self.invisible_parameter_annotations, false),
        ];
        for (count, lists, visible) in parameter_annotations.iter() {
            if let Some(num) = count {
                vis.visit_annotable_parameter_count(*num, *visible);
            }
            for (i, annset) in lists.iter().enumerate() {
                for ann in annset {
                    replay(vis.visit_parameter_annotation(i as u8, ann.desc.clone(), *visible), ann);
                }
            }
        }
        if self.has_code {
            vis.visit_code();
            for tcb in &self.try_catch_blocks {
                tcb.accept(vis);
            }
            for insn in &self.instructions {
                insn.accept(vis);
            }
            for locv in &self.local_variables {
                locv.accept(vis);
            }
            for (list, visible) in &[(&self.visible_local_variable_annotations, true), (&self.invisible_local_variable_annotations, false)] {
                for lva in list.iter() {
                    let tann = &lva.data;
                    replay(vis.visit_local_variable_annotation(tann.type_ref, tann.type_path.clone(), lva.spans.clone(),
                                                               tann.annotation.desc.clone(), *visible), &tann.annotation);
                }
            }
            vis.visit_maxs(self.max_stack, self.max_locals);
        }
        vis.visit_end();
    }
    fn push(&mut self, data: InstructionData) {
        self.instructions.push(InstructionNode::new(data));
    }
}
impl MethodVisitor for MethodNode {
    fn visit_parameter(&mut self, name: Option<Rc<str>>, access: ParameterAccess) {
        self.parameters.push(ParameterNode {access, name});
    }
    fn visit_annotation_default(&mut self) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.annotation_default = Some(AnnotationNode::new(Rc::from("")));
        self.annotation_default.as_mut().map(|c| Box::new(c) as Box<dyn AnnotationVisitor + '_>)
    }
    fn visit_code(&mut self) {
        self.has_code = true;
    }
    fn visit_field_insn(&mut self, opcode: u8, owner: Rc<str>, name: Rc<str>, desc: Rc<str>) {
        self.push(InstructionData::FieldInsn {opcode, owner, name, desc});
    }
    fn visit_method_insn(&mut self, opcode: u8, owner: Rc<str>, name: Rc<str>, desc: Rc<str>, interface: bool) {
        self.push(InstructionData::MethodInsn {opcode, owner, name, desc, interface});
    }
    fn visit_insn(&mut self, opcode: u8) {
        self.push(InstructionData::NoArgInsn {opcode});
    }
    fn visit_iinc_insn(&mut self, var: u16, by: i16) {
        self.push(InstructionData::IincInsn {var, by});
    }
    fn visit_int_insn(&mut self, opcode: u8, operand: i32) {
        self.push(InstructionData::IntInsn {opcode, operand});
    }
    fn visit_indy_insn(&mut self, name: Rc<str>, desc: Rc<str>, bsm: Handle, args: Vec<ClassConstant>) {
        self.push(InstructionData::InvokeDynamic {name, desc, bsm, args});
    }
    fn visit_jump_insn(&mut self, opcode: u8, label: Label) {
        self.push(InstructionData::JumpInsn {opcode, label});
    }
    fn visit_label(&mut self, label: Label) {
        self.push(InstructionData::LabelNode {label});
    }
    fn visit_ldc_insn(&mut self, cst: ClassConstant) {
        self.push(InstructionData::LdcInsn {data: cst});
    }
    fn visit_line_number(&mut self, line: u16, label: Label) {
        self.push(InstructionData::LineNumberNode {line, start: label});
    }
    fn visit_lookupswitch_insn(&mut self, dflt: Label, pairs: Vec<(i32, Label)>) {
        self.push(InstructionData::LookupswitchInsn {dflt, pairs});
    }
    fn visit_multianew_insn(&mut self, class: Rc<str>, dimensions: u8) {
        self.push(InstructionData::MultianewInsn {ty: class, dims: dimensions});
    }
    fn visit_tableswitch_insn(&mut self, min: i32, max: i32, dflt: Label, labels: Vec<Label>) {
        self.push(InstructionData::TableswitchInsn {min, max, dflt, labels});
    }
    fn visit_type_insn(&mut self, opcode: u8, class: Rc<str>) {
        self.push(InstructionData::TypeInsn {opcode, ty: class});
    }
    fn visit_var_insn(&mut self, opcode: u8, var: u16) {
        self.push(InstructionData::VarInsn {opcode, var});
    }
    fn visit_frame(&mut self, mode: FrameMode, locals: &[FrameItem], stack: &[FrameItem]) {
        self.push(InstructionData::FrameNode {mode, locals: locals.into(), stack: stack.into()});
    }
    fn visit_try_catch(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<Rc<str>>) {
        self.try_catch_blocks.push(TryCatchBlockNode::new(start, end, handler, catch_type));
    }
    fn visit_local_var(&mut self, name: Rc<str>, desc: Rc<str>, sig: Option<Rc<str>>, span: LocalVariableSpan) {
        self.local_variables.push(LocalVariableNode {name, desc, signature: sig, span});
    }
    fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) {
        if visible {
            self.visible_annotable_parameter_count = Some(count);
        } else {
            self.invisible_annotable_parameter_count = Some(count);
        }
    }
    fn visit_annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if visible {
            record_annotation(&mut self.visible_annotations, desc)
        } else {
            record_annotation(&mut self.invisible_annotations, desc)
        }
    }
    fn visit_type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if visible {
            record_type_annotation(&mut self.visible_type_annotations, type_ref, type_path, desc)
        } else {
            record_type_annotation(&mut self.invisible_type_annotations, type_ref, type_path, desc)
        }
    }
    fn visit_trycatch_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let block = self.try_catch_blocks.last_mut()?;
        if visible {
            record_type_annotation(&mut block.visible_type_annotations, type_ref, type_path, desc)
        } else {
            record_type_annotation(&mut block.invisible_type_annotations, type_ref, type_path, desc)
        }
    }
    fn visit_insn_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let insn = self.instructions.last_mut()?;
        if visible {
            record_type_annotation(&mut insn.visible_type_annotations, type_ref, type_path, desc)
        } else {
            record_type_annotation(&mut insn.invisible_type_annotations, type_ref, type_path, desc)
        }
    }
    fn visit_local_variable_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, spans: Vec<LocalVariableSpan>, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let data = TypeAnnotationNode::new(type_ref, type_path, desc);
        let list = if visible {
            &mut self.visible_local_variable_annotations
        } else {
            &mut self.invisible_local_variable_annotations
        };
        list.push(LocalVariableAnnotationNode {data, spans});
        list.last_mut().map(|c| Box::new(&mut c.data.annotation) as Box<dyn AnnotationVisitor + '_>)
    }
    fn visit_parameter_annotation(&mut self, parameter: u8, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let parameter = parameter as usize;
        let lists = if visible {
            &mut self.visible_parameter_annotations
        } else {
            &mut self.invisible_parameter_annotations
        };
        let nl = max(lists.len(), parameter + 1);
        lists.resize(nl, Vec::new());
        record_annotation(&mut lists[parameter], desc)
    }
    fn visit_maxs(&mut self, max_stack: u16, max_local: u16) {
        self.max_locals = max_local;
        self.max_stack = max_stack;
    }
}

///A recorded class. Module and record component events are not kept.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassNode {
    pub access: ClassAccess,
    pub fields: Vec<FieldNode>,
    pub inner_classes: Vec<InnerClassNode>,
    pub interfaces: Vec<Rc<str>>,
    pub invisible_annotations: Vec<AnnotationNode>,
    pub invisible_type_annotations: Vec<TypeAnnotationNode>,
    pub methods: Vec<MethodNode>,
    pub name: Rc<str>,
    pub nest_host_class: Option<Rc<str>>,
    pub nest_members: Vec<Rc<str>>,
    pub permitted_subclasses: Vec<Rc<str>>,
    pub outer_class: Option<Rc<str>>,
    pub outer_method: Option<(Rc<str>, Rc<str>)>,
    pub signature: Option<Rc<str>>,
    pub source_debug: Option<String>,
    pub source_name: Option<Rc<str>>,
    pub super_name: Option<Rc<str>>,
    pub version: ClassVersion,
    pub visible_annotations: Vec<AnnotationNode>,
    pub visible_type_annotations: Vec<TypeAnnotationNode>
}

impl ClassVisitor for ClassNode {
    fn visit_header(&mut self, version: ClassVersion, access: ClassAccess, name: Rc<str>,
            signature: Option<Rc<str>>, super_name: Option<Rc<str>>, interfaces: Vec<Rc<str>>) {
        self.version = version;
        self.access = access;
        self.signature = signature;
        self.super_name = super_name;
        self.name = name;
        self.interfaces = interfaces;
    }
    fn visit_nest_host(&mut self, name: Rc<str>) {
        self.nest_host_class = Some(name);
    }
    fn visit_nest_member(&mut self, name: Rc<str>) {
        self.nest_members.push(name);
    }
    fn visit_permitted_subclass(&mut self, name: Rc<str>) {
        self.permitted_subclasses.push(name);
    }
    fn visit_source(&mut self, source: Option<Rc<str>>, debug: Option<String>) {
        self.source_name = source;
        self.source_debug = debug;
    }
    fn visit_outer_class(&mut self, owner: Rc<str>, method: Option<(Rc<str>, Rc<str>)>) {
        self.outer_class = Some(owner);
        self.outer_method = method;
    }
    fn visit_inner_class(&mut self, inner_name: Rc<str>, outer_name: Option<Rc<str>>, simple_inner_name: Option<Rc<str>>, access: InnerClassAccess) {
        self.inner_classes.push(InnerClassNode {
            access, inner_name,
            name: simple_inner_name,
            outer_name
        });
    }
    fn visit_field(&mut self, access: FieldAccess, name: Rc<str>, desc: Rc<str>, signature: Option<Rc<str>>, value: Option<ClassConstant>) -> Option<Box<dyn FieldVisitor + '_>> {
        self.fields.push(FieldNode::new(access, name, desc, signature, value));
        self.fields.last_mut().map(|c| Box::new(c) as Box<dyn FieldVisitor + '_>)
    }
    fn visit_method(&mut self, access: MethodAccess, name: Rc<str>, desc: Rc<str>, signature: Option<Rc<str>>, exceptions: Vec<Rc<str>>) -> Option<Box<dyn MethodVisitor + '_>> {
        self.methods.push(MethodNode::new(access, name, desc, signature, exceptions));
        self.methods.last_mut().map(|c| Box::new(c) as Box<dyn MethodVisitor + '_>)
    }
    fn visit_annotation(&mut self, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        if visible {
            record_annotation(&mut self.visible_annotations, desc)
        } else {
            record_annotation(&mut self.invisible_annotations, desc)
        }
    }
    fn visit_type_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool)-> Option<Box<dyn AnnotationVisitor + '_>> {
        if visible {
            record_type_annotation(&mut self.visible_type_annotations, type_ref, type_path, desc)
        } else {
            record_type_annotation(&mut self.invisible_type_annotations, type_ref, type_path, desc)
        }
    }
}

impl Default for ClassNode {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassNode {
    pub fn new() -> ClassNode {
        ClassNode {
            access: ClassAccess::empty(),
            fields: Vec::new(),
            inner_classes: Vec::new(),
            interfaces: Vec::new(),
            invisible_annotations: Vec::new(),
            invisible_type_annotations: Vec::new(),
            methods: Vec::new(),
            name: Rc::from(""),
            nest_host_class: None,
            nest_members: Vec::new(),
            permitted_subclasses: Vec::new(),
            outer_class: None,
            outer_method: None,
            signature: None,
            source_debug: None,
            source_name: None,
            super_name: None,
            version: ClassVersion::new(0, 0),
            visible_annotations: Vec::new(),
            visible_type_annotations: Vec::new(),
        }
    }
    pub fn from_bytes(bytes: &[u8]) -> Result<ClassNode, ClassDecodeError> {
        let reader = ClassReader::new(bytes);
        let mut visitor = ClassNode::new();
        reader.accept(&mut visitor, ClassReaderFlags::empty())?;
        Ok(visitor)
    }
    pub fn method(&self, name: &str) -> Option<&MethodNode> {
        self.methods.iter().find(|m| &*m.name == name)
    }
    pub fn accept(&self, vis: &mut dyn ClassVisitor) {
        vis.visit_header(self.version, self.access, self.name.clone(), self.signature.clone(), self.super_name.clone(), self.interfaces.clone());
        if self.source_name.is_some() || self.source_debug.is_some() {
            vis.visit_source(self.source_name.clone(), self.source_debug.clone());
        }
        if let Some(nh) = &self.nest_host_class {
            vis.visit_nest_host(nh.clone());
        }
        if let Some(oc) = &self.outer_class {
            vis.visit_outer_class(oc.clone(), self.outer_method.clone());
        }
        for ann in &self.visible_annotations {
            replay(vis.visit_annotation(ann.desc.clone(), true), ann);
        }
        for ann in &self.invisible_annotations {
            replay(vis.visit_annotation(ann.desc.clone(), false), ann);
        }
        for tann in &self.visible_type_annotations {
            replay(vis.visit_type_annotation(tann.type_ref, tann.type_path.clone(), tann.annotation.desc.clone(), true), &tann.annotation);
        }
        for tann in &self.invisible_type_annotations {
            replay(vis.visit_type_annotation(tann.type_ref, tann.type_path.clone(), tann.annotation.desc.clone(), false), &tann.annotation);
        }
        for nm in &self.nest_members {
            vis.visit_nest_member(nm.clone());
        }
        for ps in &self.permitted_subclasses {
            vis.visit_permitted_subclass(ps.clone());
        }
        for ic in &self.inner_classes {
            ic.accept(vis);
        }
        for fi in &self.fields {
            fi.accept(vis);
        }
        for me in &self.methods {
            me.accept_cv(vis);
        }
        vis.visit_end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    #[test]
    fn annotations_keep_element_order() {
        let mut node = AnnotationNode::new(Rc::from("LA;"));
        node.visit_primitive(Rc::from("z"), AnnotationPrimitive::Integer(1));
        {
            let mut arr = node.visit_array(Rc::from("a")).unwrap();
            arr.visit_enum(Rc::from(""), Rc::from("LE;"), Rc::from("X"));
            arr.visit_end();
        }
        node.visit_primitive(Rc::from("b"), AnnotationPrimitive::Boolean(true));
        let names: Vec<&str> = node.values.iter().map(|(k, _)| &**k).collect();
        assert_eq!(names, vec!["z", "a", "b"]);
        assert_eq!(node.get("a"), Some(&AnnotationValue::Array(vec![
            AnnotationValue::Enum {desc: Rc::from("LE;"), value: Rc::from("X")}
        ])));
    }

    #[test]
    fn method_replays_into_equal_node() {
        let mut class = ClassNode::new();
        class.visit_header(ClassVersion::new(V1_8, 0), ClassAccess::ACC_PUBLIC, Rc::from("T"),
                           None, Some(Rc::from("java/lang/Object")), Vec::new());
        {
            let mut mv = class.visit_method(MethodAccess::ACC_STATIC, Rc::from("f"), Rc::from("(I)I"), None, Vec::new()).unwrap();
            let end = Label::new();
            mv.visit_code();
            mv.visit_var_insn(ILOAD, 0);
            mv.visit_jump_insn(IFEQ, end);
            mv.visit_iinc_insn(0, -1);
            mv.visit_label(end);
            mv.visit_var_insn(ILOAD, 0);
            mv.visit_insn(IRETURN);
            mv.visit_maxs(1, 1);
            mv.visit_end();
        }
        class.visit_end();
        let mut copy = ClassNode::new();
        class.accept(&mut copy);
        assert_eq!(copy, class);
        let f = copy.method("f").unwrap();
        assert!(f.has_code);
        assert_eq!(f.opcodes(), vec![ILOAD, IFEQ, IINC, ILOAD, IRETURN]);
    }

    #[test]
    fn annotations_on_missing_instructions_are_ignored() {
        let mut method = MethodNode::new_empty();
        assert!(method.visit_insn_annotation(TypeRef::New, Vec::new(), Rc::from("LA;"), true).is_none());
        assert!(method.visit_trycatch_annotation(TypeRef::ExceptionParameter(0), Vec::new(), Rc::from("LA;"), true).is_none());
    }
}
