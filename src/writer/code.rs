use super::annotation::{put_target, put_type_path, target_type, AnnotationList, AnnotationWriter, Annotations};
use super::bytes::PutBytes;
use super::{put_attributes, ClassEncodeError, Context, MemberList};
use crate::opcodes::*;
use crate::{initial_frame, AnnotationVisitor, ClassConstant, FrameItem, FrameMode, Handle, Label,
            LocalVariableSpan, MethodAccess, MethodVisitor, ParameterAccess, Type, TypePath, TypeRef};
use byteorder::{BigEndian, ByteOrder};
use std::collections::HashMap;
use std::rc::Rc;

const MAX_CODE_LENGTH: usize = 65535;

///A branch offset to patch once the target label is placed.
struct Fixup {
    insn: usize,
    at: usize,
    label: Label,
    wide: bool,
}

struct LocalVariable {
    name: u16,
    desc: u16,
    signature: Option<u16>,
    span: LocalVariableSpan,
}

struct Frame {
    offset: usize,
    mode: FrameMode,
    locals: Vec<FrameItem>,
    stack: Vec<FrameItem>,
}

///A type annotation on code. Local variable targets get their ranges at the end of the method,
///so the target table is kept apart from the rest of the annotation.
struct CodeTypeAnnotation {
    visible: bool,
    target: Vec<u8>,
    spans: Option<Vec<LocalVariableSpan>>,
    rest: Vec<u8>,
}

#[derive(Default)]
struct ParameterAnnotations {
    count: Option<u8>,
    lists: Vec<AnnotationList>,
}

impl ParameterAnnotations {
    fn is_empty(&self) -> bool {
        self.count.is_none() && self.lists.iter().all(|l| l.is_empty())
    }
    fn list(&mut self, parameter: u8) -> &mut AnnotationList {
        let idx = parameter as usize;
        while self.lists.len() <= idx {
            self.lists.push(AnnotationList::default());
        }
        &mut self.lists[idx]
    }
    fn info(&self) -> Vec<u8> {
        let count = self.count.map_or(self.lists.len(), |c| c as usize);
        let mut out = Vec::new();
        out.put_u1(count as u8);
        for i in 0..count {
            match self.lists.get(i) {
                Some(list) => out.extend_from_slice(&list.info()),
                None => out.put_u2(0)
            }
        }
        out
    }
}

///Encodes one method. The `method_info` is appended to the class when `visit_end` is called.
pub(crate) struct MethodWriter<'a> {
    ctx: &'a mut Context,
    out: &'a mut MemberList,
    access: MethodAccess,
    name: Rc<str>,
    desc: Rc<str>,
    name_index: u16,
    desc_index: u16,
    signature: Option<u16>,
    exceptions: Vec<u16>,
    parameters: Vec<(u16, u16)>,
    annotation_default: Option<Vec<u8>>,
    annotations: Annotations,
    type_annotations: Annotations,
    parameter_annotations: [ParameterAnnotations; 2],
    has_code: bool,
    code: Vec<u8>,
    last_insn: usize,
    labels: HashMap<Label, usize>,
    fixups: Vec<Fixup>,
    try_catch: Vec<(Label, Label, Label, u16)>,
    line_numbers: Vec<(Label, u16)>,
    local_variables: Vec<LocalVariable>,
    frames: Vec<Frame>,
    code_type_annotations: Vec<CodeTypeAnnotation>,
    max_stack: u16,
    max_locals: u16,
}

impl<'a> MethodWriter<'a> {
    pub(crate) fn new(ctx: &'a mut Context, out: &'a mut MemberList, access: MethodAccess, name: Rc<str>,
                      desc: Rc<str>, signature: Option<Rc<str>>, exceptions: Vec<Rc<str>>) -> MethodWriter<'a> {
        let name_index = ctx.index(|cp| cp.utf8(&name));
        let desc_index = ctx.index(|cp| cp.utf8(&desc));
        let signature = signature.map(|s| ctx.index(|cp| cp.utf8(&s)));
        let exceptions = exceptions.iter().map(|e| ctx.index(|cp| cp.class(e))).collect();
        MethodWriter {
            ctx, out, access, name, desc, name_index, desc_index, signature, exceptions,
            parameters: Vec::new(),
            annotation_default: None,
            annotations: Annotations::default(),
            type_annotations: Annotations::default(),
            parameter_annotations: Default::default(),
            has_code: false,
            code: Vec::new(),
            last_insn: 0,
            labels: HashMap::new(),
            fixups: Vec::new(),
            try_catch: Vec::new(),
            line_numbers: Vec::new(),
            local_variables: Vec::new(),
            frames: Vec::new(),
            code_type_annotations: Vec::new(),
            max_stack: 0,
            max_locals: 0,
        }
    }

    fn begin_insn(&mut self) {
        self.last_insn = self.code.len();
    }

    fn branch(&mut self, label: Label, wide: bool) {
        self.fixups.push(Fixup {
            insn: self.last_insn,
            at: self.code.len(),
            label, wide
        });
        if wide {
            self.code.put_u4(0);
        } else {
            self.code.put_u2(0);
        }
    }

    fn pad_switch(&mut self) {
        while self.code.len() % 4 != 0 {
            self.code.put_u1(0);
        }
    }

    fn offset_of(&mut self, label: &Label) -> Option<usize> {
        match self.labels.get(label) {
            Some(offset) => Some(*offset),
            None => {
                self.ctx.fail(ClassEncodeError::UnresolvedLabel(self.name.clone()));
                None
            }
        }
    }

    fn resolve_branches(&mut self) {
        let fixups = std::mem::replace(&mut self.fixups, Vec::new());
        for fixup in fixups {
            let target = match self.offset_of(&fixup.label) {
                Some(target) => target,
                None => continue
            };
            let delta = target as i64 - fixup.insn as i64;
            if fixup.wide {
                BigEndian::write_i32(&mut self.code[fixup.at..fixup.at + 4], delta as i32);
            } else if delta >= i16::min_value() as i64 && delta <= i16::max_value() as i64 {
                BigEndian::write_i16(&mut self.code[fixup.at..fixup.at + 2], delta as i16);
            } else {
                self.ctx.fail(ClassEncodeError::BranchOffsetOverflow {
                    method: self.name.clone(),
                    offset: delta
                });
            }
        }
    }

    fn span(&mut self, span: &LocalVariableSpan) -> (u16, u16) {
        let start = self.offset_of(&span.start).unwrap_or(0);
        let end = self.offset_of(&span.end).unwrap_or(start);
        (start as u16, end.saturating_sub(start) as u16)
    }

    fn put_frame_item(&mut self, out: &mut Vec<u8>, item: &FrameItem) {
        match item {
            FrameItem::Top => out.put_u1(0),
            FrameItem::Integer => out.put_u1(1),
            FrameItem::Float => out.put_u1(2),
            FrameItem::Double => out.put_u1(3),
            FrameItem::Long => out.put_u1(4),
            FrameItem::Null => out.put_u1(5),
            FrameItem::UninitializedThis => out.put_u1(6),
            FrameItem::Class(name) => {
                let idx = self.ctx.index(|cp| cp.class(name));
                out.put_u1(7);
                out.put_u2(idx);
            },
            FrameItem::Uninitialized(label) => {
                let offset = self.offset_of(label).unwrap_or(0);
                out.put_u1(8);
                out.put_u2(offset as u16);
            },
        }
    }

    fn stack_map_table(&mut self) -> Option<Vec<u8>> {
        if self.frames.is_empty() {
            return None;
        }
        let frames = std::mem::replace(&mut self.frames, Vec::new());
        let mut previous = initial_frame(&self.ctx.class_name, self.access, &self.name, &self.desc);
        let mut previous_offset: Option<usize> = None;
        let mut out = Vec::new();
        let mut count: u16 = 0;
        for frame in frames {
            let delta = match previous_offset {
                None => frame.offset,
                Some(prev) if frame.offset > prev => frame.offset - prev - 1,
                Some(_) => {
                    log::debug!("dropping frame at offset {} of {}: not after the previous one", frame.offset, self.name);
                    continue;
                }
            };
            self.put_frame(&mut out, &frame, &previous, delta as u16);
            count += 1;
            previous_offset = Some(frame.offset);
            previous = frame.locals;
        }
        let mut info = Vec::with_capacity(out.len() + 2);
        info.put_u2(count);
        info.extend_from_slice(&out);
        Some(info)
    }

    ///Writes a frame in the mode it was read with when that encoding can express it,
    ///and as a full frame otherwise.
    fn put_frame(&mut self, out: &mut Vec<u8>, frame: &Frame, previous: &[FrameItem], delta: u16) {
        let same_locals = frame.locals.as_slice() == previous;
        let shared = frame.locals.len().min(previous.len());
        let prefix = frame.locals[..shared] == previous[..shared];
        match frame.mode {
            FrameMode::Same if same_locals && frame.stack.is_empty() => {
                if delta < 64 {
                    out.put_u1(delta as u8);
                } else {
                    out.put_u1(251);
                    out.put_u2(delta);
                }
                return;
            },
            FrameMode::Same1 if same_locals && frame.stack.len() == 1 => {
                if delta < 64 {
                    out.put_u1(64 + delta as u8);
                } else {
                    out.put_u1(247);
                    out.put_u2(delta);
                }
                self.put_frame_item(out, &frame.stack[0]);
                return;
            },
            FrameMode::Chop if prefix && frame.stack.is_empty() && previous.len() > frame.locals.len()
                && previous.len() - frame.locals.len() <= 3 => {
                let k = previous.len() - frame.locals.len();
                out.put_u1(251 - k as u8);
                out.put_u2(delta);
                return;
            },
            FrameMode::Append if prefix && frame.stack.is_empty() && frame.locals.len() > previous.len()
                && frame.locals.len() - previous.len() <= 3 => {
                let k = frame.locals.len() - previous.len();
                out.put_u1(251 + k as u8);
                out.put_u2(delta);
                for item in &frame.locals[previous.len()..] {
                    self.put_frame_item(out, item);
                }
                return;
            },
            _ => {}
        }
        out.put_u1(255);
        out.put_u2(delta);
        out.put_u2(frame.locals.len() as u16);
        for item in &frame.locals {
            self.put_frame_item(out, item);
        }
        out.put_u2(frame.stack.len() as u16);
        for item in &frame.stack {
            self.put_frame_item(out, item);
        }
    }

    fn code_attribute(&mut self) -> Vec<u8> {
        self.resolve_branches();
        if self.code.len() > MAX_CODE_LENGTH {
            self.ctx.fail(ClassEncodeError::CodeTooLong(self.name.clone()));
        }
        let mut info = Vec::new();
        info.put_u2(self.max_stack);
        info.put_u2(self.max_locals);
        info.put_u4(self.code.len() as u32);
        info.extend_from_slice(&self.code);

        let try_catch = std::mem::replace(&mut self.try_catch, Vec::new());
        info.put_u2(try_catch.len() as u16);
        for (start, end, handler, catch_type) in &try_catch {
            let start = self.offset_of(start).unwrap_or(0);
            let end = self.offset_of(end).unwrap_or(0);
            let handler = self.offset_of(handler).unwrap_or(0);
            info.put_u2(start as u16);
            info.put_u2(end as u16);
            info.put_u2(handler as u16);
            info.put_u2(*catch_type);
        }

        let mut attrs = Vec::new();
        if !self.line_numbers.is_empty() {
            let lines = std::mem::replace(&mut self.line_numbers, Vec::new());
            let mut table = Vec::new();
            table.put_u2(lines.len() as u16);
            for (label, line) in &lines {
                let start = self.offset_of(label).unwrap_or(0);
                table.put_u2(start as u16);
                table.put_u2(*line);
            }
            attrs.push((self.ctx.attribute_name("LineNumberTable"), table));
        }
        if !self.local_variables.is_empty() {
            let vars = std::mem::replace(&mut self.local_variables, Vec::new());
            let mut table = Vec::new();
            let mut type_table = Vec::new();
            let mut typed: u16 = 0;
            table.put_u2(vars.len() as u16);
            for var in &vars {
                let (start, length) = self.span(&var.span);
                table.put_u2(start);
                table.put_u2(length);
                table.put_u2(var.name);
                table.put_u2(var.desc);
                table.put_u2(var.span.index);
                if let Some(signature) = var.signature {
                    type_table.put_u2(start);
                    type_table.put_u2(length);
                    type_table.put_u2(var.name);
                    type_table.put_u2(signature);
                    type_table.put_u2(var.span.index);
                    typed += 1;
                }
            }
            attrs.push((self.ctx.attribute_name("LocalVariableTable"), table));
            if typed > 0 {
                let mut info = Vec::new();
                info.put_u2(typed);
                info.extend_from_slice(&type_table);
                attrs.push((self.ctx.attribute_name("LocalVariableTypeTable"), info));
            }
        }
        if let Some(table) = self.stack_map_table() {
            attrs.push((self.ctx.attribute_name("StackMapTable"), table));
        }
        let annotations = std::mem::replace(&mut self.code_type_annotations, Vec::new());
        for &visible in &[true, false] {
            let mut body = Vec::new();
            let mut count: u16 = 0;
            for annot in annotations.iter().filter(|a| a.visible == visible) {
                body.extend_from_slice(&annot.target);
                if let Some(ref spans) = annot.spans {
                    body.put_u2(spans.len() as u16);
                    for span in spans {
                        let (start, length) = self.span(span);
                        body.put_u2(start);
                        body.put_u2(length);
                        body.put_u2(span.index);
                    }
                }
                body.extend_from_slice(&annot.rest);
                count += 1;
            }
            if count > 0 {
                let name = if visible { "RuntimeVisibleTypeAnnotations" } else { "RuntimeInvisibleTypeAnnotations" };
                let mut attr = Vec::new();
                attr.put_u2(count);
                attr.extend_from_slice(&body);
                attrs.push((self.ctx.attribute_name(name), attr));
            }
        }
        put_attributes(&mut info, &attrs);
        info
    }

    fn code_type_annotation(&mut self, visible: bool, target: Vec<u8>, spans: Option<Vec<LocalVariableSpan>>,
                            type_path: &TypePath, desc: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let mut rest = Vec::new();
        put_type_path(&mut rest, type_path);
        self.code_type_annotations.push(CodeTypeAnnotation {
            visible, target, spans, rest
        });
        let annot = self.code_type_annotations.last_mut()?;
        Some(Box::new(AnnotationWriter::annotation(self.ctx, &mut annot.rest, desc)))
    }
}

impl<'a> MethodVisitor for MethodWriter<'a> {
    fn visit_parameter(&mut self, name: Option<Rc<str>>, access: ParameterAccess) {
        let name = name.map_or(0, |n| self.ctx.index(|cp| cp.utf8(&n)));
        self.parameters.push((name, access.bits() as u16));
    }
    fn visit_annotation_default(&mut self) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let out = self.annotation_default.get_or_insert_with(Vec::new);
        out.clear();
        Some(Box::new(AnnotationWriter::single(self.ctx, out)))
    }
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
    fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) {
        let idx = if visible { 0 } else { 1 };
        self.parameter_annotations[idx].count = Some(count);
    }
    fn visit_parameter_annotation(&mut self, parameter: u8, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let idx = if visible { 0 } else { 1 };
        let out = self.parameter_annotations[idx].list(parameter).begin();
        Some(Box::new(AnnotationWriter::annotation(self.ctx, out, &desc)))
    }
    fn visit_code(&mut self) {
        self.has_code = true;
    }
    fn visit_frame(&mut self, mode: FrameMode, locals: &[FrameItem], stack: &[FrameItem]) {
        self.frames.push(Frame {
            offset: self.code.len(),
            mode,
            locals: locals.to_vec(),
            stack: stack.to_vec()
        });
    }
    fn visit_insn(&mut self, opcode: u8) {
        self.begin_insn();
        self.code.put_u1(opcode);
    }
    fn visit_int_insn(&mut self, opcode: u8, operand: i32) {
        self.begin_insn();
        self.code.put_u1(opcode);
        if opcode == SIPUSH {
            self.code.put_i2(operand as i16);
        } else {
            self.code.put_i1(operand as i8);
        }
    }
    fn visit_var_insn(&mut self, opcode: u8, var: u16) {
        self.begin_insn();
        if opcode == RET {
            if var < 256 {
                self.code.put_u1(RET);
                self.code.put_u1(var as u8);
            } else {
                self.code.put_u1(WIDE);
                self.code.put_u1(RET);
                self.code.put_u2(var);
            }
        } else if var < 4 {
            let short = if opcode < ISTORE {
                ILOAD_0 + ((opcode - ILOAD) << 2)
            } else {
                ISTORE_0 + ((opcode - ISTORE) << 2)
            };
            self.code.put_u1(short + var as u8);
        } else if var < 256 {
            self.code.put_u1(opcode);
            self.code.put_u1(var as u8);
        } else {
            self.code.put_u1(WIDE);
            self.code.put_u1(opcode);
            self.code.put_u2(var);
        }
    }
    fn visit_iinc_insn(&mut self, var: u16, by: i16) {
        self.begin_insn();
        if var > 255 || by > i8::max_value() as i16 || by < i8::min_value() as i16 {
            self.code.put_u1(WIDE);
            self.code.put_u1(IINC);
            self.code.put_u2(var);
            self.code.put_i2(by);
        } else {
            self.code.put_u1(IINC);
            self.code.put_u1(var as u8);
            self.code.put_i1(by as i8);
        }
    }
    fn visit_type_insn(&mut self, opcode: u8, class: Rc<str>) {
        let idx = self.ctx.index(|cp| cp.class(&class));
        self.begin_insn();
        self.code.put_u1(opcode);
        self.code.put_u2(idx);
    }
    fn visit_multianew_insn(&mut self, class: Rc<str>, dimensions: u8) {
        let idx = self.ctx.index(|cp| cp.class(&class));
        self.begin_insn();
        self.code.put_u1(MULTIANEWARRAY);
        self.code.put_u2(idx);
        self.code.put_u1(dimensions);
    }
    fn visit_field_insn(&mut self, opcode: u8, owner: Rc<str>, name: Rc<str>, desc: Rc<str>) {
        let idx = self.ctx.index(|cp| cp.field_ref(&owner, &name, &desc));
        self.begin_insn();
        self.code.put_u1(opcode);
        self.code.put_u2(idx);
    }
    fn visit_method_insn(&mut self, opcode: u8, owner: Rc<str>, name: Rc<str>, desc: Rc<str>, interface: bool) {
        let idx = self.ctx.index(|cp| cp.method_ref(&owner, &name, &desc, interface));
        self.begin_insn();
        self.code.put_u1(opcode);
        self.code.put_u2(idx);
        if opcode == INVOKEINTERFACE {
            let (args, _) = Type::new(desc).argument_and_return_size();
            self.code.put_u1(args as u8);
            self.code.put_u1(0);
        }
    }
    fn visit_indy_insn(&mut self, name: Rc<str>, desc: Rc<str>, bsm: Handle, args: Vec<ClassConstant>) {
        let idx = self.ctx.index(|cp| cp.invoke_dynamic(&name, &desc, &bsm, &args));
        self.begin_insn();
        self.code.put_u1(INVOKEDYNAMIC);
        self.code.put_u2(idx);
        self.code.put_u2(0);
    }
    fn visit_jump_insn(&mut self, opcode: u8, label: Label) {
        self.begin_insn();
        self.code.put_u1(opcode);
        self.branch(label, opcode == GOTO_W || opcode == JSR_W);
    }
    fn visit_ldc_insn(&mut self, cst: ClassConstant) {
        let wide = match &cst {
            ClassConstant::Long(_) | ClassConstant::Double(_) => true,
            ClassConstant::ConstantDynamic(d) => &*d.desc == "J" || &*d.desc == "D",
            _ => false
        };
        let idx = self.ctx.index(|cp| cp.constant(&cst));
        self.begin_insn();
        if wide {
            self.code.put_u1(LDC2_W);
            self.code.put_u2(idx);
        } else if idx < 256 {
            self.code.put_u1(LDC);
            self.code.put_u1(idx as u8);
        } else {
            self.code.put_u1(LDC_W);
            self.code.put_u2(idx);
        }
    }
    fn visit_tableswitch_insn(&mut self, min: i32, max: i32, dflt: Label, labels: Vec<Label>) {
        self.begin_insn();
        self.code.put_u1(TABLESWITCH);
        self.pad_switch();
        self.branch(dflt, true);
        self.code.put_i4(min);
        self.code.put_i4(max);
        for label in labels {
            self.branch(label, true);
        }
    }
    fn visit_lookupswitch_insn(&mut self, dflt: Label, pairs: Vec<(i32, Label)>) {
        self.begin_insn();
        self.code.put_u1(LOOKUPSWITCH);
        self.pad_switch();
        self.branch(dflt, true);
        self.code.put_u4(pairs.len() as u32);
        for (key, label) in pairs {
            self.code.put_i4(key);
            self.branch(label, true);
        }
    }
    fn visit_label(&mut self, label: Label) {
        self.labels.insert(label, self.code.len());
    }
    fn visit_line_number(&mut self, line: u16, label: Label) {
        self.line_numbers.push((label, line));
    }
    fn visit_try_catch(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<Rc<str>>) {
        let catch_type = catch_type.map_or(0, |c| self.ctx.index(|cp| cp.class(&c)));
        self.try_catch.push((start, end, handler, catch_type));
    }
    fn visit_local_var(&mut self, name: Rc<str>, desc: Rc<str>, sig: Option<Rc<str>>, span: LocalVariableSpan) {
        let name = self.ctx.index(|cp| cp.utf8(&name));
        let desc = self.ctx.index(|cp| cp.utf8(&desc));
        let signature = sig.map(|s| self.ctx.index(|cp| cp.utf8(&s)));
        self.local_variables.push(LocalVariable {
            name, desc, signature, span
        });
    }
    fn visit_insn_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let mut target = Vec::new();
        put_target(&mut target, &type_ref, self.last_insn as u16);
        self.code_type_annotation(visible, target, None, &type_path, &desc)
    }
    fn visit_trycatch_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let mut target = Vec::new();
        put_target(&mut target, &type_ref, 0);
        self.code_type_annotation(visible, target, None, &type_path, &desc)
    }
    fn visit_local_variable_annotation(&mut self, type_ref: TypeRef, type_path: TypePath, spans: Vec<LocalVariableSpan>, desc: Rc<str>, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let target = vec![target_type(&type_ref)];
        self.code_type_annotation(visible, target, Some(spans), &type_path, &desc)
    }
    fn visit_maxs(&mut self, max_stack: u16, max_local: u16) {
        self.max_stack = max_stack;
        self.max_locals = max_local;
    }
    fn visit_end(&mut self) {
        let mut attrs = Vec::new();
        if self.has_code {
            let code = self.code_attribute();
            attrs.push((self.ctx.attribute_name("Code"), code));
        }
        let ctx = &mut *self.ctx;
        if !self.exceptions.is_empty() {
            attrs.push((ctx.attribute_name("Exceptions"), super::index_list(&self.exceptions)));
        }
        if let Some(signature) = self.signature {
            let mut info = Vec::new();
            info.put_u2(signature);
            attrs.push((ctx.attribute_name("Signature"), info));
        }
        if self.access.contains(MethodAccess::ACC_PSEUDO_DEPRECATED) {
            attrs.push((ctx.attribute_name("Deprecated"), Vec::new()));
        }
        if !self.parameters.is_empty() {
            let mut info = Vec::new();
            info.put_u1(self.parameters.len() as u8);
            for (name, access) in &self.parameters {
                info.put_u2(*name);
                info.put_u2(*access);
            }
            attrs.push((ctx.attribute_name("MethodParameters"), info));
        }
        if let Some(ref default) = self.annotation_default {
            attrs.push((ctx.attribute_name("AnnotationDefault"), default.clone()));
        }
        self.annotations.attributes(ctx, "RuntimeVisibleAnnotations", "RuntimeInvisibleAnnotations", &mut attrs);
        self.type_annotations.attributes(ctx, "RuntimeVisibleTypeAnnotations", "RuntimeInvisibleTypeAnnotations", &mut attrs);
        for (idx, name) in ["RuntimeVisibleParameterAnnotations", "RuntimeInvisibleParameterAnnotations"].iter().enumerate() {
            if !self.parameter_annotations[idx].is_empty() {
                attrs.push((ctx.attribute_name(name), self.parameter_annotations[idx].info()));
            }
        }
        let mut method = Vec::new();
        method.put_u2(self.access.bits() as u16);
        method.put_u2(self.name_index);
        method.put_u2(self.desc_index);
        put_attributes(&mut method, &attrs);
        self.out.push(ctx, &method, "methods");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ClassWriter;
    use crate::{ClassAccess, ClassVersion, ClassVisitor};

    fn with_method<F>(access: MethodAccess, desc: &str, f: F) -> Vec<u8> where F: FnOnce(&mut dyn MethodVisitor) {
        let mut cw = ClassWriter::new();
        cw.visit_header(ClassVersion::new(V1_8, 0), ClassAccess::ACC_PUBLIC, Rc::from("T"), None,
                        Some(Rc::from("java/lang/Object")), vec![]);
        {
            let mut mv = cw.visit_method(access, Rc::from("m"), Rc::from(desc), None, vec![]).unwrap();
            mv.visit_code();
            f(&mut *mv);
            mv.visit_end();
        }
        let methods = &cw.methods.body;
        //access, name, desc, attribute count, Code name, length, max_stack, max_locals
        let code_len = BigEndian::read_u32(&methods[18..22]) as usize;
        methods[22..22 + code_len].to_vec()
    }

    #[test]
    fn short_forms_and_wide_locals() {
        let code = with_method(MethodAccess::ACC_STATIC, "()V", |mv| {
            mv.visit_var_insn(ILOAD, 0);
            mv.visit_var_insn(ASTORE, 3);
            mv.visit_var_insn(LLOAD, 200);
            mv.visit_var_insn(DSTORE, 300);
            mv.visit_iinc_insn(1, 1);
            mv.visit_iinc_insn(1, 1000);
            mv.visit_insn(RETURN);
        });
        assert_eq!(code, vec![ILOAD_0, ASTORE_3, LLOAD, 200, WIDE, DSTORE, 1, 44, IINC, 1, 1,
                              WIDE, IINC, 0, 1, 0x03, 0xE8, RETURN]);
    }

    #[test]
    fn ldc_widens_past_index_255() {
        let code = with_method(MethodAccess::ACC_STATIC, "()V", |mv| {
            for i in 0..300 {
                mv.visit_ldc_insn(ClassConstant::Integer(100_000 + i));
                mv.visit_insn(POP);
            }
            mv.visit_ldc_insn(ClassConstant::Long(1));
            mv.visit_insn(RETURN);
        });
        assert_eq!(code[0], LDC);
        let n = code.len();
        assert_eq!(&code[n - 8..n - 4], &[LDC_W, code[n - 6], code[n - 5], POP][..]);
        assert_eq!(code[n - 4], LDC2_W);
        assert_eq!(code[n - 1], RETURN);
    }

    #[test]
    fn backward_and_forward_branches() {
        let code = with_method(MethodAccess::ACC_STATIC, "()V", |mv| {
            let top = Label::new();
            let out = Label::new();
            mv.visit_label(top);
            mv.visit_insn(ICONST_0);
            mv.visit_jump_insn(IFEQ, out);
            mv.visit_jump_insn(GOTO, top);
            mv.visit_label(out);
            mv.visit_insn(RETURN);
        });
        assert_eq!(code, vec![ICONST_0, IFEQ, 0, 6, GOTO, 0xFF, 0xFC, RETURN]);
    }

    #[test]
    fn switch_is_aligned() {
        let code = with_method(MethodAccess::ACC_STATIC, "(I)V", |mv| {
            let dflt = Label::new();
            let one = Label::new();
            mv.visit_var_insn(ILOAD, 0);
            mv.visit_lookupswitch_insn(dflt, vec![(1, one)]);
            mv.visit_label(one);
            mv.visit_label(dflt);
            mv.visit_insn(RETURN);
        });
        //iload_0 at 0, lookupswitch at 1, two bytes of padding
        assert_eq!(code.len(), 4 + 4 + 4 + 8 + 1);
        assert_eq!(&code[4..8], &[0, 0, 0, 19]);
        assert_eq!(code[20], RETURN);
    }

    #[test]
    fn interface_calls_count_argument_slots() {
        let code = with_method(MethodAccess::ACC_STATIC, "()V", |mv| {
            mv.visit_method_insn(INVOKEINTERFACE, Rc::from("java/util/Map"), Rc::from("put"),
                                 Rc::from("(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;"), true);
            mv.visit_insn(RETURN);
        });
        assert_eq!(code[0], INVOKEINTERFACE);
        assert_eq!(&code[3..5], &[3, 0]);
    }

    #[test]
    fn far_branches_are_reported() {
        let mut cw = ClassWriter::new();
        cw.visit_header(ClassVersion::new(V1_8, 0), ClassAccess::ACC_PUBLIC, Rc::from("T"), None,
                        Some(Rc::from("java/lang/Object")), vec![]);
        {
            let mut mv = cw.visit_method(MethodAccess::ACC_STATIC, Rc::from("far"), Rc::from("()V"), None, vec![]).unwrap();
            mv.visit_code();
            let end = Label::new();
            mv.visit_jump_insn(GOTO, end);
            for _ in 0..40_000 {
                mv.visit_insn(NOP);
            }
            mv.visit_label(end);
            mv.visit_insn(RETURN);
            mv.visit_end();
        }
        match cw.to_bytes() {
            Err(ClassEncodeError::BranchOffsetOverflow { offset, .. }) => assert_eq!(offset, 40_003),
            other => panic!("unexpected result {:?}", other)
        }
    }

    #[test]
    fn unresolved_labels_are_reported() {
        let mut cw = ClassWriter::new();
        cw.visit_header(ClassVersion::new(V1_8, 0), ClassAccess::ACC_PUBLIC, Rc::from("T"), None,
                        Some(Rc::from("java/lang/Object")), vec![]);
        {
            let mut mv = cw.visit_method(MethodAccess::ACC_STATIC, Rc::from("lost"), Rc::from("()V"), None, vec![]).unwrap();
            mv.visit_code();
            mv.visit_jump_insn(GOTO, Label::new());
            mv.visit_end();
        }
        assert_eq!(cw.to_bytes(), Err(ClassEncodeError::UnresolvedLabel(Rc::from("lost"))));
    }
}
