use crate::classpath::ClassLookupError;
use crate::reader::ClassDecodeError;
use crate::writer::ClassEncodeError;
use std::io;
use thiserror::Error;

///Any failure of the lookup, transform or write steps.
#[derive(Debug, Error)]
pub enum Error {
    #[error("class lookup failed: {0}")]
    Lookup(#[from] ClassLookupError),
    #[error("malformed class file: {0}")]
    Decode(#[from] ClassDecodeError),
    #[error("cannot encode class: {0}")]
    Encode(#[from] ClassEncodeError),
    #[error("cannot write class file: {0}")]
    Write(#[from] io::Error),
}

impl Error {
    ///Whether the failure happened before anything was written.
    pub fn is_lookup(&self) -> bool {
        matches!(self, Error::Lookup(_) | Error::Decode(_))
    }
}
