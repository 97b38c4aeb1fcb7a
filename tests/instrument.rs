use classfile_tracer::instrument::{instrument_class, TraceConfig};
use classfile_tracer::opcodes::*;
use classfile_tracer::tree::{ClassNode, InstructionData};
use classfile_tracer::writer::ClassWriter;
use classfile_tracer::*;
use std::rc::Rc;

fn rc(s: &str) -> Rc<str> {
    Rc::from(s)
}

fn class(name: &str, access: ClassAccess, methods: impl FnOnce(&mut ClassWriter)) -> Vec<u8> {
    let mut cw = ClassWriter::new();
    cw.visit_header(ClassVersion::new(V1_8, 0), access, rc(name), None, Some(rc("java/lang/Object")), vec![]);
    cw.visit_source(Some(rc("Calc.java")), None);
    {
        let mut mv = cw.visit_method(MethodAccess::ACC_PUBLIC, rc("<init>"), rc("()V"), None, vec![]).unwrap();
        mv.visit_code();
        mv.visit_var_insn(ALOAD, 0);
        mv.visit_method_insn(INVOKESPECIAL, rc("java/lang/Object"), rc("<init>"), rc("()V"), false);
        mv.visit_insn(RETURN);
        mv.visit_maxs(1, 1);
        mv.visit_end();
    }
    methods(&mut cw);
    cw.visit_end();
    cw.to_bytes().unwrap()
}

fn ldc_strings(method: &tree::MethodNode) -> Vec<String> {
    method.instructions.iter().filter_map(|i| match &i.data {
        InstructionData::LdcInsn { data: ClassConstant::String(s) } => Some(s.to_string()),
        _ => None
    }).collect()
}

#[test]
fn add_is_traced_on_entry_and_exit() {
    let bytes = class("demo/Calc", ClassAccess::ACC_PUBLIC | ClassAccess::ACC_SUPER, |cw| {
        let mut mv = cw.visit_method(MethodAccess::ACC_PUBLIC, rc("add"), rc("(II)I"), None, vec![]).unwrap();
        mv.visit_code();
        mv.visit_var_insn(ILOAD, 1);
        mv.visit_var_insn(ILOAD, 2);
        mv.visit_insn(IADD);
        mv.visit_insn(IRETURN);
        mv.visit_maxs(2, 3);
        mv.visit_end();
    });
    let traced = instrument_class(&bytes, &TraceConfig::default()).unwrap();
    let node = ClassNode::from_bytes(&traced).unwrap();
    assert_eq!(&*node.name, "demo/Calc");
    assert_eq!(node.source_name.as_deref(), Some("Calc.java"));
    let add = node.method("add").unwrap();
    assert_eq!(add.opcodes(), vec![
        GETSTATIC, LDC, INVOKEVIRTUAL,
        ILOAD, ILOAD, IADD,
        GETSTATIC, LDC, INVOKEVIRTUAL,
        IRETURN
    ]);
    assert_eq!(ldc_strings(add), vec!["--Begin Method--", "--End Method--"]);
    assert_eq!((add.max_stack, add.max_locals), (4, 3));
    match &add.instructions[0].data {
        InstructionData::FieldInsn { owner, name, desc, .. } => {
            assert_eq!((&**owner, &**name, &**desc), ("java/lang/System", "out", "Ljava/io/PrintStream;"));
        },
        other => panic!("unexpected {:?}", other)
    }
    let init = node.method("<init>").unwrap();
    assert_eq!(init.opcodes(), vec![
        GETSTATIC, LDC, INVOKEVIRTUAL,
        ALOAD, INVOKESPECIAL,
        GETSTATIC, LDC, INVOKEVIRTUAL,
        RETURN
    ]);
}

#[test]
fn branches_and_frames_survive_the_shift() {
    let bytes = class("demo/Sign", ClassAccess::ACC_PUBLIC, |cw| {
        let mut mv = cw.visit_method(MethodAccess::ACC_PUBLIC | MethodAccess::ACC_STATIC, rc("sign"), rc("(I)I"), None, vec![]).unwrap();
        let positive = Label::new();
        mv.visit_code();
        mv.visit_var_insn(ILOAD, 0);
        mv.visit_jump_insn(IFGE, positive);
        mv.visit_insn(ICONST_M1);
        mv.visit_insn(IRETURN);
        mv.visit_label(positive);
        mv.visit_frame(FrameMode::Same, &[FrameItem::Integer], &[]);
        mv.visit_insn(ICONST_1);
        mv.visit_insn(IRETURN);
        mv.visit_maxs(1, 1);
        mv.visit_end();
    });
    let traced = instrument_class(&bytes, &TraceConfig::default()).unwrap();
    let node = ClassNode::from_bytes(&traced).unwrap();
    let sign = node.method("sign").unwrap();
    assert_eq!(ldc_strings(sign), vec!["--Begin Method--", "--End Method--", "--End Method--"]);

    //the jump still lands on the label that precedes the frame
    let target = sign.instructions.iter().find_map(|i| match i.data {
        InstructionData::JumpInsn { label, .. } => Some(label),
        _ => None
    }).unwrap();
    let at = sign.instructions.iter().position(|i| i.data == InstructionData::LabelNode { label: target }).unwrap();
    assert_eq!(sign.instructions[at + 1].data, InstructionData::FrameNode {
        mode: FrameMode::Same,
        locals: vec![FrameItem::Integer],
        stack: vec![]
    });
    assert_eq!(sign.instructions[at + 2].data, InstructionData::NoArgInsn { opcode: ICONST_1 });
}

#[test]
fn abstract_methods_are_left_alone() {
    let bytes = class("demo/Task", ClassAccess::ACC_PUBLIC | ClassAccess::ACC_ABSTRACT, |cw| {
        let mut mv = cw.visit_method(MethodAccess::ACC_PUBLIC | MethodAccess::ACC_ABSTRACT, rc("run"), rc("()V"), None, vec![]).unwrap();
        mv.visit_end();
    });
    let traced = instrument_class(&bytes, &TraceConfig::default()).unwrap();
    let run = ClassNode::from_bytes(&traced).unwrap().method("run").cloned().unwrap();
    assert!(!run.has_code);
    assert!(run.instructions.is_empty());
}

#[test]
fn debug_info_and_handlers_round_trip() {
    let bytes = class("demo/Lookup", ClassAccess::ACC_PUBLIC, |cw| {
        let mut mv = cw.visit_method(MethodAccess::ACC_PUBLIC | MethodAccess::ACC_STATIC, rc("pick"), rc("(I)Ljava/lang/String;"), None, vec![]).unwrap();
        let (start, end, handler) = (Label::new(), Label::new(), Label::new());
        let (one, two, other) = (Label::new(), Label::new(), Label::new());
        mv.visit_code();
        mv.visit_try_catch(start, end, handler, Some(rc("java/lang/RuntimeException")));
        mv.visit_label(start);
        mv.visit_line_number(7, start);
        mv.visit_var_insn(ILOAD, 0);
        mv.visit_tableswitch_insn(1, 2, other, vec![one, two]);
        mv.visit_label(one);
        mv.visit_frame(FrameMode::Same, &[FrameItem::Integer], &[]);
        mv.visit_ldc_insn(ClassConstant::String(rc("one")));
        mv.visit_insn(ARETURN);
        mv.visit_label(two);
        mv.visit_frame(FrameMode::Same, &[FrameItem::Integer], &[]);
        mv.visit_ldc_insn(ClassConstant::String(rc("two")));
        mv.visit_insn(ARETURN);
        mv.visit_label(other);
        mv.visit_frame(FrameMode::Same, &[FrameItem::Integer], &[]);
        mv.visit_insn(ACONST_NULL);
        mv.visit_label(end);
        mv.visit_insn(ARETURN);
        mv.visit_label(handler);
        mv.visit_frame(FrameMode::Same1, &[FrameItem::Integer], &[FrameItem::Class(rc("java/lang/RuntimeException"))]);
        mv.visit_var_insn(ASTORE, 1);
        mv.visit_insn(ACONST_NULL);
        mv.visit_insn(ARETURN);
        mv.visit_local_var(rc("key"), rc("I"), None, LocalVariableSpan::new(start, end, 0));
        mv.visit_maxs(1, 2);
        mv.visit_end();
    });
    let original = ClassNode::from_bytes(&bytes).unwrap();
    let traced = ClassNode::from_bytes(&instrument_class(&bytes, &TraceConfig::default()).unwrap()).unwrap();
    let before = original.method("pick").unwrap();
    let after = traced.method("pick").unwrap();

    //four returns, each preceded by one exit trace
    assert_eq!(after.opcodes().len(), before.opcodes().len() + 3 * 5);
    assert_eq!(after.try_catch_blocks.len(), 1);
    assert_eq!(after.try_catch_blocks[0].catch_type.as_deref(), Some("java/lang/RuntimeException"));
    assert_eq!(after.local_variables.len(), 1);
    assert_eq!(&*after.local_variables[0].name, "key");
    let lines: Vec<u16> = after.instructions.iter().filter_map(|i| match i.data {
        InstructionData::LineNumberNode { line, .. } => Some(line),
        _ => None
    }).collect();
    assert_eq!(lines, vec![7]);
    let frames = after.instructions.iter().filter(|i| match i.data {
        InstructionData::FrameNode { .. } => true,
        _ => false
    }).count();
    assert_eq!(frames, 4);
    assert_eq!(after.max_stack, before.max_stack + 2);
}

#[test]
fn malformed_input_is_a_decode_error() {
    match instrument_class(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0], &TraceConfig::default()) {
        Err(Error::Decode(_)) => {},
        other => panic!("unexpected {:?}", other.map(|b| b.len()))
    }
}
