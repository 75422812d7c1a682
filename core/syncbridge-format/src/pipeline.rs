//! Executes conversion paths on records.
//!
//! Execution is a linear walk along the path: each hop either advances the
//! record to the hop's target format or stops the walk. A failed hop leaves
//! the record exactly as the previous hop left it.

use tracing::{debug, trace};

use crate::capability::Capability;
use crate::converter::{ConvertContext, Converted, ConverterEdge, ConverterKind, Rejected};
use crate::error::{FormatError, FormatResult};
use crate::path::ConversionPath;
use crate::payload::Payload;
use crate::record::Record;

/// Runs every edge of `path` on `record`, in order.
///
/// - An empty path is a no-op.
/// - The record must be in the path's source format.
/// - A record without payload is relabeled to the path's target and no
///   converter runs.
/// - The path configuration reaches the last edge only.
/// - Detector hops re-run detection on the current payload and relabel.
pub fn execute(path: &mut ConversionPath, record: &mut Record) -> FormatResult<()> {
    let (Some(source), Some(target)) = (path.source().cloned(), path.target().cloned()) else {
        return Ok(());
    };
    if record.format() != &source {
        return Err(FormatError::FormatMismatch {
            left: record.format().name().to_string(),
            right: source.name().to_string(),
        });
    }
    if !record.has_data() {
        debug!(from = %source, to = %target, "relabeling record without payload");
        record.relabel(&target);
        return Ok(());
    }

    path.prepare()?;
    let last = path.len() - 1;
    for (i, edge) in path.edges().iter().enumerate() {
        if edge.kind() == ConverterKind::DetectOnly {
            match edge.detect(record) {
                Some(detected) => record.relabel(&detected),
                None => return Err(edge.failure("detector declined the payload")),
            }
            continue;
        }
        let ctx = ConvertContext {
            config: if i == last { path.config() } else { None },
            state: path.state(i),
        };
        step(edge, record, &ctx)?;
    }
    debug!(from = %source, to = %record.format(), hops = path.len(), "converted record");
    Ok(())
}

/// Runs one data-carrying edge. Every payload involved is either installed
/// in the record or destroyed by its owning format, exactly once.
fn step(edge: &ConverterEdge, record: &mut Record, ctx: &ConvertContext<'_>) -> FormatResult<()> {
    let from = edge.from_format();
    let to = edge.to_format();

    // A validating target may reject output after the input was consumed.
    let backup = if to.has(Capability::Validate) {
        Some(from.copy_payload(record.bytes())?)
    } else {
        None
    };

    let Some(input) = record.take_payload() else {
        record.relabel(to);
        return Ok(());
    };

    let converted = match edge.invoke(input, ctx)? {
        Ok(converted) => converted,
        Err(Rejected { input, reason }) => {
            record.restore_payload(input);
            if let Some(backup) = backup {
                from.destroy(backup);
            }
            return Err(edge.failure(reason));
        }
    };

    let (output, leftover) = match converted {
        Converted::Consumed(output) => (output, None),
        Converted::Produced { output, input } => (output, Some(input)),
    };

    if let Err(err) = to.validate(output.as_bytes()) {
        to.destroy(output);
        match (leftover, backup) {
            (Some(input), backup) => {
                record.restore_payload(input);
                if let Some(backup) = backup {
                    from.destroy(backup);
                }
            }
            (None, Some(backup)) => record.restore_payload(backup),
            // A validate capability implies a backup.
            (None, None) => {}
        }
        return Err(edge.failure(err.to_string()));
    }

    release(edge, leftover, backup);
    trace!(from = %from, to = %to, size = output.len(), "hop done");
    record.relabel(to);
    record.restore_payload(output);
    Ok(())
}

fn release(edge: &ConverterEdge, leftover: Option<Payload>, backup: Option<Payload>) {
    for payload in [leftover, backup].into_iter().flatten() {
        edge.from_format().destroy(payload);
    }
}
