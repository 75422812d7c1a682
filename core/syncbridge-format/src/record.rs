//! Records: typed, possibly absent payloads.

use std::fmt;

use tracing::trace;

use crate::env::FormatEnv;
use crate::error::FormatResult;
use crate::objformat::FormatRef;
use crate::payload::Payload;

/// A payload tagged with its format and object type.
///
/// An absent payload and an empty payload are distinct here; only the
/// comparator treats them alike. The payload is destroyed through its
/// format when it is replaced or when the record is dropped.
pub struct Record {
    payload: Option<Payload>,
    format: FormatRef,
    objtype: String,
}

impl Record {
    /// Creates a record whose object type is the format's.
    #[must_use]
    pub fn new(format: FormatRef, payload: impl Into<Payload>) -> Self {
        let objtype = format.objtype().to_string();
        Self {
            payload: Some(payload.into()),
            format,
            objtype,
        }
    }

    /// Creates a record without a payload.
    #[must_use]
    pub fn empty(format: FormatRef) -> Self {
        let objtype = format.objtype().to_string();
        Self {
            payload: None,
            format,
            objtype,
        }
    }

    /// Creates a record with an explicit object type.
    #[must_use]
    pub fn with_objtype(format: FormatRef, objtype: impl Into<String>, payload: Option<Payload>) -> Self {
        Self {
            payload,
            format,
            objtype: objtype.into(),
        }
    }

    /// Builds a record from transported bytes, running the format's
    /// demarshal capability.
    pub fn demarshal(format: FormatRef, objtype: impl Into<String>, bytes: &[u8]) -> FormatResult<Self> {
        let payload = format.demarshal(bytes)?;
        Ok(Self::with_objtype(format, objtype, Some(payload)))
    }

    /// Builds a record from a `(format name, object type, bytes)` tuple.
    ///
    /// Unknown format names are rejected with
    /// [`FormatError::FormatNotFound`](crate::FormatError::FormatNotFound).
    pub fn from_wire(env: &FormatEnv, format: &str, objtype: &str, bytes: &[u8]) -> FormatResult<Self> {
        let format = env.require_format(format)?;
        Self::demarshal(format, objtype, bytes)
    }

    #[must_use]
    pub fn format(&self) -> &FormatRef {
        &self.format
    }

    #[must_use]
    pub fn objtype(&self) -> &str {
        &self.objtype
    }

    /// Returns the payload, if present.
    #[must_use]
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Returns the payload bytes; empty when absent.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.payload.as_ref().map(Payload::as_bytes).unwrap_or_default()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.payload.as_ref().map_or(0, Payload::len)
    }

    /// Returns true if a payload is present, even a zero-size one.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.payload.is_some()
    }

    /// Returns true for absent and zero-size payloads alike.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub(crate) fn take_payload(&mut self) -> Option<Payload> {
        self.payload.take()
    }

    pub(crate) fn restore_payload(&mut self, payload: Payload) {
        debug_assert!(self.payload.is_none());
        self.payload = Some(payload);
    }

    /// Replaces the payload, destroying the previous one.
    pub fn set_payload(&mut self, payload: Option<Payload>) {
        if let Some(old) = std::mem::replace(&mut self.payload, payload) {
            self.format.destroy(old);
        }
    }

    /// Moves the payload out; the record keeps its format and becomes empty.
    #[must_use]
    pub fn into_payload(mut self) -> Option<Payload> {
        self.payload.take()
    }

    /// Retags the record without touching the payload.
    pub fn relabel(&mut self, format: &FormatRef) {
        trace!(from = %self.format, to = %format, "relabeling record");
        self.format = format.clone();
        self.objtype = format.objtype().to_string();
    }

    /// Copies the record through its format's copy capability.
    pub fn try_clone(&self) -> FormatResult<Self> {
        let payload = self
            .payload
            .as_ref()
            .map(|p| self.format.copy_payload(p.as_bytes()))
            .transpose()?;
        Ok(Self {
            payload,
            format: self.format.clone(),
            objtype: self.objtype.clone(),
        })
    }

    /// Renders the payload for humans.
    #[must_use]
    pub fn printable(&self) -> String {
        self.format.print(self.bytes())
    }

    /// Returns the payload revision.
    pub fn revision(&self) -> FormatResult<i64> {
        self.format.revision(self.bytes())
    }

    /// Encodes the payload for transport.
    pub fn marshal(&self) -> FormatResult<Vec<u8>> {
        self.format.marshal(self.bytes())
    }
}

impl Drop for Record {
    fn drop(&mut self) {
        if let Some(payload) = self.payload.take() {
            self.format.destroy(payload);
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("format", &self.format.name())
            .field("objtype", &self.objtype)
            .field("payload", &self.payload)
            .finish()
    }
}
