use super::bytes::PutBytes;
use super::Context;
use crate::{AnnotationPrimitive, AnnotationVisitor, TypePath, TypePathEntry, TypeRef};
use byteorder::{BigEndian, ByteOrder};
use std::rc::Rc;

///Writes `element_value_pairs` (or the values of an array) straight into the buffer of its parent.
///
///The element count sits at `count_at` and is patched after every element, so the output stays
///well formed even if `visit_end` is never reached.
pub(crate) struct AnnotationWriter<'a> {
    ctx: &'a mut Context,
    out: &'a mut Vec<u8>,
    named: bool,
    count_at: Option<usize>,
    count: u16,
}

impl<'a> AnnotationWriter<'a> {
    ///Starts an `annotation` structure (type index and pair count) at the end of `out`.
    pub(crate) fn annotation(ctx: &'a mut Context, out: &'a mut Vec<u8>, desc: &str) -> AnnotationWriter<'a> {
        let type_index = ctx.index(|cp| cp.utf8(desc));
        out.put_u2(type_index);
        AnnotationWriter::counted(ctx, out, true)
    }

    fn counted(ctx: &'a mut Context, out: &'a mut Vec<u8>, named: bool) -> AnnotationWriter<'a> {
        let count_at = out.len();
        out.put_u2(0);
        AnnotationWriter {
            ctx, out, named,
            count_at: Some(count_at),
            count: 0
        }
    }

    ///Writes exactly one unnamed value with no count, as `AnnotationDefault` holds.
    pub(crate) fn single(ctx: &'a mut Context, out: &'a mut Vec<u8>) -> AnnotationWriter<'a> {
        AnnotationWriter {
            ctx, out,
            named: false,
            count_at: None,
            count: 0
        }
    }

    fn element(&mut self, name: &str) {
        if self.named {
            let name = self.ctx.index(|cp| cp.utf8(name));
            self.out.put_u2(name);
        }
        self.count = self.count.wrapping_add(1);
        if let Some(at) = self.count_at {
            BigEndian::write_u16(&mut self.out[at..at + 2], self.count);
        }
    }
}

impl<'a> AnnotationVisitor for AnnotationWriter<'a> {
    fn visit_primitive(&mut self, name: Rc<str>, value: AnnotationPrimitive) {
        self.element(&name);
        let (tag, index) = {
            let ctx = &mut *self.ctx;
            match value {
                AnnotationPrimitive::Byte(v) => (b'B', ctx.index(|cp| cp.integer(v as i32))),
                AnnotationPrimitive::Boolean(v) => (b'Z', ctx.index(|cp| cp.integer(v as i32))),
                AnnotationPrimitive::Character(v) => (b'C', ctx.index(|cp| cp.integer(v as i32))),
                AnnotationPrimitive::Short(v) => (b'S', ctx.index(|cp| cp.integer(v as i32))),
                AnnotationPrimitive::Integer(v) => (b'I', ctx.index(|cp| cp.integer(v))),
                AnnotationPrimitive::Long(v) => (b'J', ctx.index(|cp| cp.long(v))),
                AnnotationPrimitive::Float(v) => (b'F', ctx.index(|cp| cp.float(v))),
                AnnotationPrimitive::Double(v) => (b'D', ctx.index(|cp| cp.double(v))),
                AnnotationPrimitive::String(s) => (b's', ctx.index(|cp| cp.utf8(&s))),
                AnnotationPrimitive::Type(ty) => (b'c', ctx.index(|cp| cp.utf8(ty.get_descriptor()))),
            }
        };
        self.out.put_u1(tag);
        self.out.put_u2(index);
    }
    fn visit_enum(&mut self, name: Rc<str>, desc: Rc<str>, value: Rc<str>) {
        self.element(&name);
        let desc = self.ctx.index(|cp| cp.utf8(&desc));
        let value = self.ctx.index(|cp| cp.utf8(&value));
        self.out.put_u1(b'e');
        self.out.put_u2(desc);
        self.out.put_u2(value);
    }
    fn visit_annotation(&mut self, name: Rc<str>, desc: Rc<str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.element(&name);
        self.out.put_u1(b'@');
        Some(Box::new(AnnotationWriter::annotation(self.ctx, self.out, &desc)))
    }
    fn visit_array(&mut self, name: Rc<str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.element(&name);
        self.out.put_u1(b'[');
        Some(Box::new(AnnotationWriter::counted(self.ctx, self.out, false)))
    }
}

///Annotations of one visibility collected for a `Runtime*Annotations` attribute.
#[derive(Debug, Default)]
pub(crate) struct AnnotationList {
    pub(crate) body: Vec<u8>,
    pub(crate) count: u16,
}

impl AnnotationList {
    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }
    pub(crate) fn begin(&mut self) -> &mut Vec<u8> {
        self.count = self.count.wrapping_add(1);
        &mut self.body
    }
    pub(crate) fn info(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 2);
        out.put_u2(self.count);
        out.extend_from_slice(&self.body);
        out
    }
}

///Visible and invisible annotations of one element.
#[derive(Debug, Default)]
pub(crate) struct Annotations {
    pub(crate) visible: AnnotationList,
    pub(crate) invisible: AnnotationList,
}

impl Annotations {
    pub(crate) fn list(&mut self, visible: bool) -> &mut AnnotationList {
        if visible {
            &mut self.visible
        } else {
            &mut self.invisible
        }
    }

    ///Adds the non-empty attributes to `attrs` under the given attribute names.
    pub(crate) fn attributes(&self, ctx: &mut Context, visible_name: &str, invisible_name: &str, attrs: &mut Vec<(u16, Vec<u8>)>) {
        if !self.visible.is_empty() {
            attrs.push((ctx.index(|cp| cp.utf8(visible_name)), self.visible.info()));
        }
        if !self.invisible.is_empty() {
            attrs.push((ctx.index(|cp| cp.utf8(invisible_name)), self.invisible.info()));
        }
    }
}

pub(crate) fn put_type_path(out: &mut Vec<u8>, path: &TypePath) {
    out.put_u1(path.len() as u8);
    for entry in path {
        match entry {
            TypePathEntry::ArrayElement => {
                out.put_u1(0);
                out.put_u1(0);
            },
            TypePathEntry::InnerType => {
                out.put_u1(1);
                out.put_u1(0);
            },
            TypePathEntry::WildcardBound => {
                out.put_u1(2);
                out.put_u1(0);
            },
            TypePathEntry::TypeArgument(arg) => {
                out.put_u1(3);
                out.put_u1(*arg);
            },
        }
    }
}

///The `target_type` byte of a type reference.
pub(crate) fn target_type(type_ref: &TypeRef) -> u8 {
    match type_ref {
        TypeRef::ClassTypeParameter(_) => 0x00,
        TypeRef::MethodTypeParameter(_) => 0x01,
        TypeRef::ClassExtends(_) => 0x10,
        TypeRef::ClassTypeParameterBound {..} => 0x11,
        TypeRef::MethodTypeParameterBound {..} => 0x12,
        TypeRef::FieldDeclaration => 0x13,
        TypeRef::MethodReturnType => 0x14,
        TypeRef::MethodReceiverType => 0x15,
        TypeRef::MethodFormalParameter(_) => 0x16,
        TypeRef::ThrowsClause(_) => 0x17,
        TypeRef::LocalVariable => 0x40,
        TypeRef::ResourceVariable => 0x41,
        TypeRef::ExceptionParameter(_) => 0x42,
        TypeRef::Instanceof => 0x43,
        TypeRef::New => 0x44,
        TypeRef::ConstructorReference => 0x45,
        TypeRef::MethodReference => 0x46,
        TypeRef::Cast(_) => 0x47,
        TypeRef::GenericConstructorInvocation(_) => 0x48,
        TypeRef::GenericMethodInvocation(_) => 0x49,
        TypeRef::GenericConstructorReference(_) => 0x4A,
        TypeRef::GenericMethodReference(_) => 0x4B,
    }
}

///Writes `target_type` and `target_info` for references to declarations and instructions.
///`offset` is the bytecode offset used by instruction targets; local variable targets are
///written by the code writer once their spans are resolved.
pub(crate) fn put_target(out: &mut Vec<u8>, type_ref: &TypeRef, offset: u16) {
    out.put_u1(target_type(type_ref));
    match *type_ref {
        TypeRef::ClassTypeParameter(idx) | TypeRef::MethodTypeParameter(idx) |
        TypeRef::MethodFormalParameter(idx) => {
            out.put_u1(idx);
        },
        TypeRef::ClassExtends(idx) | TypeRef::ThrowsClause(idx) | TypeRef::ExceptionParameter(idx) => {
            out.put_u2(idx);
        },
        TypeRef::ClassTypeParameterBound {parameter, bound} |
        TypeRef::MethodTypeParameterBound {parameter, bound} => {
            out.put_u1(parameter);
            out.put_u1(bound);
        },
        TypeRef::FieldDeclaration | TypeRef::MethodReturnType | TypeRef::MethodReceiverType |
        TypeRef::LocalVariable | TypeRef::ResourceVariable => {},
        TypeRef::Instanceof | TypeRef::New | TypeRef::ConstructorReference | TypeRef::MethodReference => {
            out.put_u2(offset);
        },
        TypeRef::Cast(arg) | TypeRef::GenericConstructorInvocation(arg) | TypeRef::GenericMethodInvocation(arg) |
        TypeRef::GenericConstructorReference(arg) | TypeRef::GenericMethodReference(arg) => {
            out.put_u2(offset);
            out.put_u1(arg);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_patched_per_element() {
        let mut ctx = Context::new();
        let mut out = Vec::new();
        {
            let mut vis = AnnotationWriter::annotation(&mut ctx, &mut out, "LMarker;");
            vis.visit_primitive(Rc::from("a"), AnnotationPrimitive::Integer(1));
            {
                let mut arr = vis.visit_array(Rc::from("b")).unwrap();
                arr.visit_primitive(Rc::from(""), AnnotationPrimitive::Boolean(true));
                arr.visit_primitive(Rc::from(""), AnnotationPrimitive::Boolean(false));
            }
        }
        //type index, pair count
        assert_eq!(&out[2..4], &[0, 2]);
        //second pair: name, '[', value count
        assert_eq!(&out[11..14], &[b'[', 0, 2]);
        assert!(ctx.error().is_none());
    }

    #[test]
    fn instruction_targets_carry_offsets() {
        let mut out = Vec::new();
        put_target(&mut out, &TypeRef::Cast(1), 0x0102);
        put_target(&mut out, &TypeRef::FieldDeclaration, 0);
        assert_eq!(out, vec![0x47, 1, 2, 1, 0x13]);
    }
}
