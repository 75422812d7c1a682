//! Three-valued record comparison.

use syncbridge_types::CompareResult;
use tracing::trace;

use crate::capability::Capability;
use crate::error::{FormatError, FormatResult};
use crate::record::Record;
use crate::structured;

/// Compares two records of the same format.
///
/// The format's compare capability decides when present. Otherwise absent
/// and zero-size payloads are equal to each other and differ from anything
/// else, and non-empty payloads go through the structure capability.
/// A format with neither capability yields `CapabilityMissing`, which is
/// not the same as `Mismatch`.
pub fn compare(a: &Record, b: &Record) -> FormatResult<CompareResult> {
    if std::ptr::eq(a, b) {
        return Ok(CompareResult::Same);
    }
    let format = a.format();
    if format != b.format() {
        return Err(FormatError::FormatMismatch {
            left: format.name().to_string(),
            right: b.format().name().to_string(),
        });
    }

    if let Some(compare) = format.compare_fn() {
        let result = compare(a.bytes(), b.bytes());
        trace!(format = %format, %result, "custom comparison");
        return Ok(result);
    }

    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ok(CompareResult::Same),
        (true, false) | (false, true) => return Ok(CompareResult::Mismatch),
        (false, false) => {}
    }

    match format.structure() {
        Some(structure) => structured::compare_structured(format.name(), structure, a.bytes(), b.bytes()),
        None => Err(FormatError::CapabilityMissing {
            format: format.name().to_string(),
            capability: Capability::Compare,
        }),
    }
}
