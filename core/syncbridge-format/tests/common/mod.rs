//! Shared fixtures for format tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use syncbridge_format::{
    ConverterEdge, ConverterKind, Converted, FormatEnvBuilder, FormatRef, ObjFormat, Payload,
    Rejected,
};

/// Counts payloads handed out and destroyed across instrumented formats.
#[derive(Debug, Default)]
pub struct Ledger {
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl Ledger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wraps bytes as a payload and counts it.
    pub fn payload(&self, bytes: impl Into<Payload>) -> Payload {
        self.created.fetch_add(1, Ordering::SeqCst);
        bytes.into()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.created() - self.destroyed()
    }
}

/// A format whose destroy capability reports to `ledger`.
pub fn tracked_format(name: &str, ledger: &Arc<Ledger>) -> ObjFormat {
    let mut format = ObjFormat::new(name, "note");
    let ledger = ledger.clone();
    format
        .set_destroy(move |_payload| {
            ledger.destroyed.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    format
}

/// A converter that appends `suffix` into a freshly allocated output.
pub fn appending(from: &FormatRef, to: &FormatRef, suffix: &'static str, ledger: &Arc<Ledger>) -> ConverterEdge {
    let ledger = ledger.clone();
    ConverterEdge::new(ConverterKind::Convert, from.clone(), to.clone(), move |input, _ctx| {
        let mut bytes = input.as_bytes().to_vec();
        bytes.extend_from_slice(suffix.as_bytes());
        Ok(Converted::produced(ledger.payload(bytes), input))
    })
    .unwrap()
}

/// A converter that rewrites its input buffer in place.
pub fn in_place(from: &FormatRef, to: &FormatRef) -> ConverterEdge {
    ConverterEdge::new(ConverterKind::Convert, from.clone(), to.clone(), |input, _ctx| {
        let bytes = input.into_vec().to_ascii_uppercase();
        Ok(Converted::consumed(bytes))
    })
    .unwrap()
}

/// A converter that always rejects.
pub fn failing(from: &FormatRef, to: &FormatRef) -> ConverterEdge {
    ConverterEdge::new(ConverterKind::Convert, from.clone(), to.clone(), |input, _ctx| {
        Err(Rejected::new(input, "refused"))
    })
    .unwrap()
}

/// A converter that copies bytes unchanged.
pub fn identity(kind: ConverterKind, from: &FormatRef, to: &FormatRef) -> ConverterEdge {
    ConverterEdge::new(kind, from.clone(), to.clone(), |input, _ctx| {
        Ok(Converted::consumed(input.into_vec()))
    })
    .unwrap()
}

/// Registers plain formats `names` on a builder and returns them in order.
pub fn formats(builder: &mut FormatEnvBuilder, names: &[&str]) -> Vec<FormatRef> {
    names
        .iter()
        .map(|name| builder.register_format(ObjFormat::new(*name, "note")).unwrap())
        .collect()
}
