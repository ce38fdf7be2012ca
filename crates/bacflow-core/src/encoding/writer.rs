use crate::EncodeError;

/// Growable output buffer with an optional size ceiling.
///
/// The ceiling lets callers encode straight into a frame that must respect a
/// negotiated maximum (an APDU or BVLL length) and get
/// [`EncodeError::BufferTooSmall`] instead of an oversized frame.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
    limit: Option<usize>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit.min(1500)),
            limit: Some(limit),
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn as_written(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    fn reserve(&self, additional: usize) -> Result<(), EncodeError> {
        match self.limit {
            Some(limit) if self.buf.len() + additional > limit => Err(EncodeError::BufferTooSmall),
            _ => Ok(()),
        }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.reserve(1)?;
        self.buf.push(value);
        Ok(())
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        self.reserve(data.len())?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    pub fn write_be_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }

    pub fn write_be_u32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }
}
