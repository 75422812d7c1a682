//! Format descriptors.
//!
//! An [`ObjFormat`] names one concrete encoding of an object type and owns
//! its capability table. Descriptors are built and configured before they are
//! handed to the registry; once registered they are shared as [`FormatRef`]
//! and never mutated again.

use std::fmt;
use std::sync::Arc;

use syncbridge_types::CompareResult;
use tracing::trace;

use crate::capability::{
    Capabilities, Capability, CompareFn, CopyFn, CreateFn, DemarshalFn, DestroyFn, Duplicated,
    DuplicateFn, MarshalFn, PrintFn, RevisionFn, Structure, StructureFn, ValidateFn,
};
use crate::error::{FormatError, FormatResult};
use crate::payload::Payload;
use crate::structured::{Field, ScoreTable};

/// Shared handle to a registered format.
pub type FormatRef = Arc<ObjFormat>;

/// A named encoding of an object type plus its capability table.
pub struct ObjFormat {
    name: String,
    objtype: String,
    caps: Capabilities,
}

/// Fills one slot, refusing to overwrite.
macro_rules! setter {
    ($(#[$doc:meta])* $fn_name:ident, $slot:ident, $cap:ident, $ty:ty, $($bound:tt)+) => {
        $(#[$doc])*
        pub fn $fn_name<F>(&mut self, f: F) -> FormatResult<&mut Self>
        where
            F: $($bound)+ + Send + Sync + 'static,
        {
            if self.caps.$slot.is_some() {
                return Err(self.already_set(Capability::$cap));
            }
            let boxed: $ty = Box::new(f);
            self.caps.$slot = Some(boxed);
            Ok(self)
        }
    };
}

impl ObjFormat {
    /// Creates a descriptor with an empty capability table.
    #[must_use]
    pub fn new(name: impl Into<String>, objtype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objtype: objtype.into(),
            caps: Capabilities::default(),
        }
    }

    /// Returns the format name, unique within an environment.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the object type this format encodes.
    #[must_use]
    pub fn objtype(&self) -> &str {
        &self.objtype
    }

    /// Returns the capability table.
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Returns true if the given slot is filled.
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.caps.has(capability)
    }

    fn already_set(&self, capability: Capability) -> FormatError {
        FormatError::CapabilityAlreadySet {
            format: self.name.clone(),
            capability,
        }
    }

    fn missing(&self, capability: Capability) -> FormatError {
        FormatError::CapabilityMissing {
            format: self.name.clone(),
            capability,
        }
    }

    fn failed(&self, capability: Capability, reason: String) -> FormatError {
        FormatError::CapabilityFailed {
            format: self.name.clone(),
            capability,
            reason,
        }
    }

    // ── Capability setters ───────────────────────────────────────

    setter!(
        /// Sets the compare capability. Its result is used verbatim.
        set_compare, compare, Compare, CompareFn, Fn(&[u8], &[u8]) -> CompareResult
    );
    setter!(
        /// Sets the destroy capability.
        set_destroy, destroy, Destroy, DestroyFn, Fn(Payload)
    );
    setter!(
        /// Sets the copy capability.
        set_copy, copy, Copy, CopyFn, Fn(&[u8]) -> Result<Payload, String>
    );
    setter!(
        /// Sets the duplicate capability.
        set_duplicate, duplicate, Duplicate, DuplicateFn,
        Fn(&str, &[u8]) -> Result<Duplicated, String>
    );
    setter!(
        /// Sets the create capability.
        set_create, create, Create, CreateFn, Fn() -> Payload
    );
    setter!(
        /// Sets the print capability.
        set_print, print, Print, PrintFn, Fn(&[u8]) -> String
    );
    setter!(
        /// Sets the revision capability.
        set_revision, revision, Revision, RevisionFn, Fn(&[u8]) -> Result<i64, String>
    );
    setter!(
        /// Sets the marshal capability.
        set_marshal, marshal, Marshal, MarshalFn, Fn(&[u8]) -> Result<Vec<u8>, String>
    );
    setter!(
        /// Sets the demarshal capability.
        set_demarshal, demarshal, Demarshal, DemarshalFn, Fn(&[u8]) -> Result<Payload, String>
    );
    setter!(
        /// Sets the validate capability, run on every converter output
        /// targeting this format.
        set_validate, validate, Validate, ValidateFn, Fn(&[u8]) -> Result<(), String>
    );

    /// Sets the structure capability used by scored comparison.
    pub fn set_structure<F>(&mut self, parse: F, table: ScoreTable) -> FormatResult<&mut Self>
    where
        F: Fn(&[u8]) -> Result<Vec<Field>, String> + Send + Sync + 'static,
    {
        if self.caps.structure.is_some() {
            return Err(self.already_set(Capability::Structure));
        }
        let parse: StructureFn = Box::new(parse);
        self.caps.structure = Some(Structure { parse, table });
        Ok(self)
    }

    // ── Operations ───────────────────────────────────────────────

    /// Releases a payload owned by this format.
    ///
    /// This is the only place payloads are destroyed.
    pub fn destroy(&self, payload: Payload) {
        match &self.caps.destroy {
            Some(destroy) => destroy(payload),
            None => {
                trace!(format = %self.name, size = payload.len(), "dropping payload");
                drop(payload);
            }
        }
    }

    /// Returns the custom compare function, if any.
    #[must_use]
    pub(crate) fn compare_fn(&self) -> Option<&CompareFn> {
        self.caps.compare.as_ref()
    }

    /// Returns the structure capability, if any.
    #[must_use]
    pub fn structure(&self) -> Option<&Structure> {
        self.caps.structure.as_ref()
    }

    /// Copies a payload. Without a copy capability the bytes are copied.
    pub fn copy_payload(&self, bytes: &[u8]) -> FormatResult<Payload> {
        match &self.caps.copy {
            Some(copy) => copy(bytes).map_err(|e| self.failed(Capability::Copy, e)),
            None => Ok(Payload::from_slice(bytes)),
        }
    }

    /// Rewrites a payload under a fresh UID.
    pub fn duplicate(&self, uid: &str, bytes: &[u8]) -> FormatResult<Duplicated> {
        let duplicate = self
            .caps
            .duplicate
            .as_ref()
            .ok_or_else(|| self.missing(Capability::Duplicate))?;
        duplicate(uid, bytes).map_err(|e| self.failed(Capability::Duplicate, e))
    }

    /// Creates an empty-but-valid payload.
    pub fn create(&self) -> FormatResult<Payload> {
        let create = self
            .caps
            .create
            .as_ref()
            .ok_or_else(|| self.missing(Capability::Create))?;
        Ok(create())
    }

    /// Renders a payload for humans, falling back to lossy UTF-8.
    #[must_use]
    pub fn print(&self, bytes: &[u8]) -> String {
        match &self.caps.print {
            Some(print) => print(bytes),
            None => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// Returns the revision of a payload.
    pub fn revision(&self, bytes: &[u8]) -> FormatResult<i64> {
        let revision = self
            .caps
            .revision
            .as_ref()
            .ok_or_else(|| self.missing(Capability::Revision))?;
        revision(bytes).map_err(|e| self.failed(Capability::Revision, e))
    }

    /// Encodes a payload for transport. Identity without a marshal capability.
    pub fn marshal(&self, bytes: &[u8]) -> FormatResult<Vec<u8>> {
        match &self.caps.marshal {
            Some(marshal) => marshal(bytes).map_err(|e| self.failed(Capability::Marshal, e)),
            None => Ok(bytes.to_vec()),
        }
    }

    /// Decodes a transported payload. Identity without a demarshal capability.
    pub fn demarshal(&self, bytes: &[u8]) -> FormatResult<Payload> {
        match &self.caps.demarshal {
            Some(demarshal) => {
                demarshal(bytes).map_err(|e| self.failed(Capability::Demarshal, e))
            }
            None => Ok(Payload::from_slice(bytes)),
        }
    }

    /// Validates a payload. Always succeeds without a validate capability.
    pub fn validate(&self, bytes: &[u8]) -> FormatResult<()> {
        match &self.caps.validate {
            Some(validate) => validate(bytes).map_err(|e| self.failed(Capability::Validate, e)),
            None => Ok(()),
        }
    }
}

impl PartialEq for ObjFormat {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ObjFormat {}

impl fmt::Debug for ObjFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjFormat")
            .field("name", &self.name)
            .field("objtype", &self.objtype)
            .field("capabilities", &self.caps)
            .finish()
    }
}

impl fmt::Display for ObjFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
