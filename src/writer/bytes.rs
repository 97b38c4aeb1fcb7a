use byteorder::{BigEndian, ByteOrder};

///Big-endian appends for class file buffers.
pub(crate) trait PutBytes {
    fn put_u1(&mut self, v: u8);
    fn put_u2(&mut self, v: u16);
    fn put_u4(&mut self, v: u32);
    fn put_u8(&mut self, v: u64);

    fn put_i1(&mut self, v: i8) {
        self.put_u1(v as u8);
    }
    fn put_i2(&mut self, v: i16) {
        self.put_u2(v as u16);
    }
    fn put_i4(&mut self, v: i32) {
        self.put_u4(v as u32);
    }
}

impl PutBytes for Vec<u8> {
    fn put_u1(&mut self, v: u8) {
        self.push(v);
    }
    fn put_u2(&mut self, v: u16) {
        let mut buf = [0; 2];
        BigEndian::write_u16(&mut buf, v);
        self.extend_from_slice(&buf);
    }
    fn put_u4(&mut self, v: u32) {
        let mut buf = [0; 4];
        BigEndian::write_u32(&mut buf, v);
        self.extend_from_slice(&buf);
    }
    fn put_u8(&mut self, v: u64) {
        let mut buf = [0; 8];
        BigEndian::write_u64(&mut buf, v);
        self.extend_from_slice(&buf);
    }
}

///Appends an attribute with the given name index and contents.
pub(crate) fn put_attribute(out: &mut Vec<u8>, name: u16, info: &[u8]) {
    out.put_u2(name);
    out.put_u4(info.len() as u32);
    out.extend_from_slice(info);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_big_endian() {
        let mut out = Vec::new();
        out.put_u1(0xAB);
        out.put_u2(0x0102);
        out.put_i2(-2);
        out.put_u4(0xCAFE_BABE);
        out.put_u8(1);
        assert_eq!(out, vec![0xAB, 1, 2, 0xFF, 0xFE, 0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn attribute_carries_its_length() {
        let mut out = Vec::new();
        put_attribute(&mut out, 7, &[1, 2, 3]);
        assert_eq!(out, vec![0, 7, 0, 0, 0, 3, 1, 2, 3]);
    }
}
