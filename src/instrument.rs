//! Entry and exit tracing spliced into every method body.
//!
//! [`ClassRewriter`] forwards a class unchanged except that each method visitor it hands out is
//! wrapped in a [`MethodRewriter`]. The method rewriter prints a fixed label when the body starts
//! and again right before each return instruction, using the sequence
//! `getstatic System.out; ldc "label"; invokevirtual PrintStream.println(String)`.
use crate::opcodes;
use crate::reader::{ClassReader, ClassReaderFlags, ClassDecodeError};
use crate::writer::ClassWriter;
use crate::{ClassAccess, ClassConstant, ClassVersion, ClassVisitor, MethodAccess, MethodVisitor};
use std::rc::Rc;

///Operand stack slots the trace sequence needs on top of whatever the method already uses.
pub const TRACE_STACK_SIZE: u16 = 2;

///The method a [`MethodRewriter`] was created for, captured from `visit_method`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub access: MethodAccess,
    pub name: Rc<str>,
    pub desc: Rc<str>,
    pub signature: Option<Rc<str>>,
    pub exceptions: Vec<Rc<str>>,
}

///The static stream field the trace is printed to and the method called on it.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceTarget {
    pub owner: Rc<str>,
    pub field: Rc<str>,
    pub field_desc: Rc<str>,
    pub stream_class: Rc<str>,
    pub method: Rc<str>,
    pub method_desc: Rc<str>,
}

impl TraceTarget {
    ///`System.err` instead of `System.out`.
    pub fn stderr() -> TraceTarget {
        TraceTarget {
            field: Rc::from("err"),
            ..TraceTarget::default()
        }
    }
}

impl Default for TraceTarget {
    fn default() -> Self {
        TraceTarget {
            owner: Rc::from("java/lang/System"),
            field: Rc::from("out"),
            field_desc: Rc::from("Ljava/io/PrintStream;"),
            stream_class: Rc::from("java/io/PrintStream"),
            method: Rc::from("println"),
            method_desc: Rc::from("(Ljava/lang/String;)V"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStyle {
    ///The labels exactly as configured.
    Plain,
    ///The label followed by a space and `owner.name` plus the method descriptor.
    Qualified,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceConfig {
    pub target: TraceTarget,
    pub entry_label: Rc<str>,
    pub exit_label: Rc<str>,
    pub style: LabelStyle,
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig {
            target: TraceTarget::default(),
            entry_label: Rc::from("--Begin Method--"),
            exit_label: Rc::from("--End Method--"),
            style: LabelStyle::Plain,
        }
    }
}

impl TraceConfig {
    fn label(&self, label: &Rc<str>, owner: &str, method: &MethodDescriptor) -> Rc<str> {
        match self.style {
            LabelStyle::Plain => label.clone(),
            LabelStyle::Qualified => {
                Rc::from(format!("{} {}.{}{}", label, owner.replace('/', "."), method.name, method.desc))
            }
        }
    }
}

///Emits the three instructions that print `label` to `target`.
pub fn emit_trace(sink: &mut dyn MethodVisitor, target: &TraceTarget, label: Rc<str>) {
    sink.visit_field_insn(opcodes::GETSTATIC, target.owner.clone(), target.field.clone(), target.field_desc.clone());
    sink.visit_ldc_insn(ClassConstant::String(label));
    sink.visit_method_insn(opcodes::INVOKEVIRTUAL, target.stream_class.clone(), target.method.clone(),
                           target.method_desc.clone(), false);
}

///Forwards every class event to `inner`, wrapping the method visitors it returns.
pub struct ClassRewriter<'c, V> {
    inner: V,
    config: &'c TraceConfig,
    class_name: Rc<str>,
}

impl<'c, V: ClassVisitor> ClassRewriter<'c, V> {
    pub fn new(inner: V, config: &'c TraceConfig) -> ClassRewriter<'c, V> {
        ClassRewriter {
            inner, config,
            class_name: Rc::from("")
        }
    }
    pub fn into_inner(self) -> V {
        self.inner
    }
}

impl<'c, V: ClassVisitor> ClassVisitor for ClassRewriter<'c, V> {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut self.inner)
    }
    fn visit_header(&mut self, version: ClassVersion, access: ClassAccess, name: Rc<str>,
                    signature: Option<Rc<str>>, super_name: Option<Rc<str>>, interfaces: Vec<Rc<str>>) {
        self.class_name = name.clone();
        self.inner.visit_header(version, access, name, signature, super_name, interfaces);
    }
    fn visit_method(&mut self, access: MethodAccess, name: Rc<str>, desc: Rc<str>, signature: Option<Rc<str>>,
                    exceptions: Vec<Rc<str>>) -> Option<Box<dyn MethodVisitor + '_>> {
        log::debug!("visiting method {}{}", name, desc);
        let method = MethodDescriptor {
            access,
            name: name.clone(),
            desc: desc.clone(),
            signature: signature.clone(),
            exceptions: exceptions.clone(),
        };
        let config = self.config;
        let owner = self.class_name.clone();
        let inner = self.inner.visit_method(access, name, desc, signature, exceptions)?;
        Some(Box::new(MethodRewriter::new(inner, config, &owner, method)))
    }
}

///Forwards the events of one method, adding the entry trace after `visit_code` and the exit
///trace before every return instruction.
pub struct MethodRewriter<'a> {
    inner: Box<dyn MethodVisitor + 'a>,
    target: &'a TraceTarget,
    entry: Rc<str>,
    exit: Rc<str>,
    method: MethodDescriptor,
    traces: usize,
}

impl<'a> MethodRewriter<'a> {
    pub fn new(inner: Box<dyn MethodVisitor + 'a>, config: &'a TraceConfig, owner: &str,
               method: MethodDescriptor) -> MethodRewriter<'a> {
        MethodRewriter {
            inner,
            target: &config.target,
            entry: config.label(&config.entry_label, owner, &method),
            exit: config.label(&config.exit_label, owner, &method),
            method,
            traces: 0,
        }
    }
    fn trace(&mut self, label: Rc<str>) {
        log::trace!("trace {:?} in {}{}", label, self.method.name, self.method.desc);
        emit_trace(&mut *self.inner, self.target, label);
        self.traces += 1;
    }
}

impl<'a> MethodVisitor for MethodRewriter<'a> {
    fn get_wrapped_visitor(&mut self) -> Option<&mut dyn MethodVisitor> {
        Some(&mut *self.inner)
    }
    fn visit_code(&mut self) {
        self.inner.visit_code();
        let label = self.entry.clone();
        self.trace(label);
    }
    fn visit_insn(&mut self, opcode: u8) {
        if opcodes::is_return(opcode) {
            let label = self.exit.clone();
            self.trace(label);
        }
        self.inner.visit_insn(opcode);
    }
    fn visit_maxs(&mut self, max_stack: u16, max_local: u16) {
        self.inner.visit_maxs(max_stack.saturating_add(TRACE_STACK_SIZE), max_local);
    }
    fn visit_end(&mut self) {
        if self.traces > 0 {
            log::debug!("{}{}: {} trace sequences", self.method.name, self.method.desc, self.traces);
        }
        self.inner.visit_end();
    }
}

///Reads `bytes` and replays the instrumented class into `writer`.
pub fn instrument_into(bytes: &[u8], config: &TraceConfig, writer: &mut ClassWriter) -> Result<(), ClassDecodeError> {
    let reader = ClassReader::new(bytes);
    let mut rewriter = ClassRewriter::new(writer, config);
    reader.accept(&mut rewriter, ClassReaderFlags::empty())
}

///Instruments one class file and returns the bytes of the result.
pub fn instrument_class(bytes: &[u8], config: &TraceConfig) -> Result<Vec<u8>, crate::Error> {
    let mut writer = ClassWriter::new();
    instrument_into(bytes, config, &mut writer)?;
    let out = writer.to_bytes()?;
    log::info!("instrumented class: {} bytes in, {} bytes out", bytes.len(), out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;
    use crate::{AnnotationVisitor, FieldAccess, FieldVisitor, InnerClassAccess, Label, RecordComponentVisitor};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Code,
        Insn(u8),
        Var(u8, u16),
        Field(u8, String, String),
        Ldc(String),
        Invoke(u8, String, String),
        Jump(u8),
        Label,
        Maxs(u16, u16),
        End,
    }

    #[derive(Default)]
    struct Log {
        events: Vec<Event>,
    }

    impl Log {
        fn instructions(&self) -> Vec<&Event> {
            self.events.iter().filter(|e| match e {
                Event::Code | Event::Label | Event::Maxs(..) | Event::End => false,
                _ => true
            }).collect()
        }
    }

    impl MethodVisitor for Log {
        fn visit_code(&mut self) {
            self.events.push(Event::Code);
        }
        fn visit_insn(&mut self, opcode: u8) {
            self.events.push(Event::Insn(opcode));
        }
        fn visit_var_insn(&mut self, opcode: u8, var: u16) {
            self.events.push(Event::Var(opcode, var));
        }
        fn visit_field_insn(&mut self, opcode: u8, owner: Rc<str>, name: Rc<str>, _: Rc<str>) {
            self.events.push(Event::Field(opcode, owner.to_string(), name.to_string()));
        }
        fn visit_ldc_insn(&mut self, cst: ClassConstant) {
            if let ClassConstant::String(s) = cst {
                self.events.push(Event::Ldc(s.to_string()));
            }
        }
        fn visit_method_insn(&mut self, opcode: u8, owner: Rc<str>, name: Rc<str>, _: Rc<str>, _: bool) {
            self.events.push(Event::Invoke(opcode, owner.to_string(), name.to_string()));
        }
        fn visit_jump_insn(&mut self, opcode: u8, _: Label) {
            self.events.push(Event::Jump(opcode));
        }
        fn visit_label(&mut self, _: Label) {
            self.events.push(Event::Label);
        }
        fn visit_maxs(&mut self, max_stack: u16, max_local: u16) {
            self.events.push(Event::Maxs(max_stack, max_local));
        }
        fn visit_end(&mut self) {
            self.events.push(Event::End);
        }
    }

    ///Hands out one `Log` per method and records the kind of every other class event.
    #[derive(Default)]
    struct Sink {
        methods: Vec<Log>,
        class: Vec<&'static str>,
    }

    impl ClassVisitor for Sink {
        fn visit_header(&mut self, _: ClassVersion, _: ClassAccess, _: Rc<str>, _: Option<Rc<str>>,
                        _: Option<Rc<str>>, _: Vec<Rc<str>>) {
            self.class.push("header");
        }
        fn visit_source(&mut self, _: Option<Rc<str>>, _: Option<String>) {
            self.class.push("source");
        }
        fn visit_outer_class(&mut self, _: Rc<str>, _: Option<(Rc<str>, Rc<str>)>) {
            self.class.push("outer");
        }
        fn visit_nest_member(&mut self, _: Rc<str>) {
            self.class.push("nest member");
        }
        fn visit_annotation(&mut self, _: Rc<str>, _: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
            self.class.push("annotation");
            None
        }
        fn visit_inner_class(&mut self, _: Rc<str>, _: Option<Rc<str>>, _: Option<Rc<str>>, _: InnerClassAccess) {
            self.class.push("inner class");
        }
        fn visit_record_component(&mut self, _: Rc<str>, _: Rc<str>, _: Option<Rc<str>>)
                                  -> Option<Box<dyn RecordComponentVisitor + '_>> {
            self.class.push("record component");
            None
        }
        fn visit_field(&mut self, _: FieldAccess, _: Rc<str>, _: Rc<str>, _: Option<Rc<str>>,
                       _: Option<ClassConstant>) -> Option<Box<dyn FieldVisitor + '_>> {
            self.class.push("field");
            None
        }
        fn visit_method(&mut self, _: MethodAccess, _: Rc<str>, _: Rc<str>, _: Option<Rc<str>>,
                        _: Vec<Rc<str>>) -> Option<Box<dyn MethodVisitor + '_>> {
            self.methods.push(Log::default());
            self.methods.last_mut().map(|m| Box::new(m) as Box<dyn MethodVisitor + '_>)
        }
        fn visit_end(&mut self) {
            self.class.push("end");
        }
    }

    fn entry(label: &str) -> Vec<Event> {
        vec![
            Event::Field(GETSTATIC, "java/lang/System".into(), "out".into()),
            Event::Ldc(label.into()),
            Event::Invoke(INVOKEVIRTUAL, "java/io/PrintStream".into(), "println".into()),
        ]
    }

    fn rewrite<F>(config: &TraceConfig, access: MethodAccess, name: &str, desc: &str, body: F) -> Log
        where F: FnOnce(&mut dyn MethodVisitor) {
        let mut sink = Sink::default();
        {
            let mut rewriter = ClassRewriter::new(&mut sink, config);
            rewriter.visit_header(ClassVersion::new(V1_8, 0), ClassAccess::ACC_PUBLIC, Rc::from("demo/Calc"),
                                  None, Some(Rc::from("java/lang/Object")), Vec::new());
            {
                let mut mv = rewriter.visit_method(access, Rc::from(name), Rc::from(desc), None, Vec::new()).unwrap();
                body(&mut *mv);
                mv.visit_end();
            }
            rewriter.visit_end();
        }
        sink.methods.remove(0)
    }

    #[test]
    fn add_gets_entry_and_exit_traces() {
        let log = rewrite(&TraceConfig::default(), MethodAccess::ACC_PUBLIC, "add", "(II)I", |mv| {
            mv.visit_code();
            mv.visit_var_insn(ILOAD, 1);
            mv.visit_var_insn(ILOAD, 2);
            mv.visit_insn(IADD);
            mv.visit_insn(IRETURN);
            mv.visit_maxs(2, 3);
        });
        let mut expected = entry("--Begin Method--");
        expected.extend(vec![Event::Var(ILOAD, 1), Event::Var(ILOAD, 2), Event::Insn(IADD)]);
        expected.extend(entry("--End Method--"));
        expected.push(Event::Insn(IRETURN));
        let expected: Vec<&Event> = expected.iter().collect();
        assert_eq!(log.instructions().len(), 10);
        assert_eq!(log.instructions(), expected);
        assert_eq!(log.events[0], Event::Code);
        assert_eq!(log.events[log.events.len() - 2], Event::Maxs(4, 3));
        assert_eq!(log.events.last(), Some(&Event::End));
    }

    #[test]
    fn every_return_gets_an_exit_trace() {
        let log = rewrite(&TraceConfig::default(), MethodAccess::ACC_STATIC, "sign", "(I)I", |mv| {
            let negative = Label::new();
            mv.visit_code();
            mv.visit_var_insn(ILOAD, 0);
            mv.visit_jump_insn(IFLT, negative);
            mv.visit_insn(ICONST_1);
            mv.visit_insn(IRETURN);
            mv.visit_label(negative);
            mv.visit_insn(ICONST_M1);
            mv.visit_insn(IRETURN);
            mv.visit_maxs(1, 1);
        });
        let insns = log.instructions();
        let exits: Vec<usize> = insns.iter().enumerate()
            .filter(|(_, e)| ***e == Event::Ldc("--End Method--".into()))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(exits.len(), 2);
        for i in exits {
            assert_eq!(insns[i + 2], &Event::Invoke(INVOKEVIRTUAL, "java/io/PrintStream".into(), "println".into()));
            assert_eq!(insns[i + 3], &Event::Insn(IRETURN));
        }
        assert_eq!(insns.last(), Some(&&Event::Insn(IRETURN)));
    }

    #[test]
    fn bodiless_methods_pass_through() {
        let log = rewrite(&TraceConfig::default(), MethodAccess::ACC_PUBLIC | MethodAccess::ACC_ABSTRACT, "run", "()V", |_| {});
        assert_eq!(log.events, vec![Event::End]);
        let log = rewrite(&TraceConfig::default(), MethodAccess::ACC_NATIVE, "peek", "()V", |_| {});
        assert_eq!(log.events, vec![Event::End]);
    }

    #[test]
    fn other_instructions_are_untouched() {
        let log = rewrite(&TraceConfig::default(), MethodAccess::ACC_STATIC, "spin", "()V", |mv| {
            mv.visit_code();
            mv.visit_insn(NOP);
            mv.visit_insn(ATHROW);
        });
        let insns = log.instructions();
        assert_eq!(insns.len(), 5);
        assert_eq!(insns[3..], [&Event::Insn(NOP), &Event::Insn(ATHROW)]);
    }

    #[test]
    fn qualified_labels_name_the_method() {
        let config = TraceConfig {
            style: LabelStyle::Qualified,
            ..TraceConfig::default()
        };
        let log = rewrite(&config, MethodAccess::ACC_STATIC, "main", "([Ljava/lang/String;)V", |mv| {
            mv.visit_code();
            mv.visit_insn(RETURN);
        });
        assert_eq!(log.events[2], Event::Ldc("--Begin Method-- demo.Calc.main([Ljava/lang/String;)V".into()));
        assert_eq!(log.events[5], Event::Ldc("--End Method-- demo.Calc.main([Ljava/lang/String;)V".into()));
    }

    #[test]
    fn stderr_target_changes_only_the_field() {
        let config = TraceConfig {
            target: TraceTarget::stderr(),
            ..TraceConfig::default()
        };
        let log = rewrite(&config, MethodAccess::ACC_STATIC, "f", "()V", |mv| {
            mv.visit_code();
            mv.visit_insn(RETURN);
        });
        assert_eq!(log.events[1], Event::Field(GETSTATIC, "java/lang/System".into(), "err".into()));
        assert_eq!(log.events[3], Event::Invoke(INVOKEVIRTUAL, "java/io/PrintStream".into(), "println".into()));
    }

    #[test]
    fn class_events_are_forwarded_once() {
        let config = TraceConfig::default();
        let mut sink = Sink::default();
        {
            let mut rewriter = ClassRewriter::new(&mut sink, &config);
            rewriter.visit_header(ClassVersion::new(V1_8, 0), ClassAccess::ACC_PUBLIC, Rc::from("A"),
                                  None, Some(Rc::from("java/lang/Record")), Vec::new());
            rewriter.visit_source(Some(Rc::from("A.java")), None);
            rewriter.visit_outer_class(Rc::from("Outer"), None);
            assert!(rewriter.visit_annotation(Rc::from("Ljava/lang/Deprecated;"), true).is_none());
            rewriter.visit_nest_member(Rc::from("A$B"));
            rewriter.visit_inner_class(Rc::from("A$B"), Some(Rc::from("A")), Some(Rc::from("B")),
                                       InnerClassAccess::ACC_STATIC);
            assert!(rewriter.visit_record_component(Rc::from("x"), Rc::from("I"), None).is_none());
            for field in &["x", "y", "z"] {
                assert!(rewriter.visit_field(FieldAccess::ACC_PRIVATE, Rc::from(*field), Rc::from("I"), None, None).is_none());
            }
            for method in &["a", "b"] {
                let mut mv = rewriter.visit_method(MethodAccess::ACC_PUBLIC, Rc::from(*method), Rc::from("()V"),
                                                   None, Vec::new()).unwrap();
                mv.visit_code();
                mv.visit_var_insn(ALOAD, 0);
                mv.visit_insn(POP);
                mv.visit_insn(RETURN);
                mv.visit_maxs(1, 1);
                mv.visit_end();
            }
            rewriter.visit_end();
        }
        assert_eq!(sink.class, vec![
            "header", "source", "outer", "annotation", "nest member", "inner class", "record component",
            "field", "field", "field", "end"
        ]);
        assert_eq!(sink.methods.len(), 2);
        for log in &sink.methods {
            let mut expected = vec![Event::Code];
            expected.extend(entry("--Begin Method--"));
            expected.extend(vec![Event::Var(ALOAD, 0), Event::Insn(POP)]);
            expected.extend(entry("--End Method--"));
            expected.extend(vec![Event::Insn(RETURN), Event::Maxs(3, 1), Event::End]);
            assert_eq!(log.events, expected);
        }
    }
}
