//! Format registry and conversion engine for syncbridge.
//!
//! This crate provides:
//! - Format descriptors with a once-settable capability table ([`ObjFormat`])
//! - Directed converter edges with explicit payload ownership ([`ConverterEdge`])
//! - Breadth-first conversion path search ([`FormatEnv::find_path`])
//! - Path execution that destroys every payload exactly once ([`pipeline::execute`])
//! - Three-valued comparison, including scored structural comparison
//!   ([`compare::compare`], [`ScoreTable`])
//!
//! # Example
//!
//! ```
//! use syncbridge_format::{ConverterEdge, ConverterKind, Converted, FormatEnv, ObjFormat, Record};
//!
//! let mut builder = FormatEnv::builder();
//! let upper = builder.register_format(ObjFormat::new("upper", "note")).unwrap();
//! let lower = builder.register_format(ObjFormat::new("lower", "note")).unwrap();
//! let edge = ConverterEdge::new(ConverterKind::Convert, upper.clone(), lower.clone(), |input, _| {
//!     let output = String::from_utf8_lossy(input.as_bytes()).to_lowercase();
//!     Ok(Converted::produced(output, input))
//! })
//! .unwrap();
//! builder.register_converter(edge).unwrap();
//! let env = builder.build();
//!
//! let mut record = Record::new(upper, "HELLO");
//! env.convert_to(&mut record, &[lower]).unwrap();
//! assert_eq!(record.bytes(), b"hello");
//! ```

pub mod capability;
pub mod compare;
pub mod converter;
pub mod env;
pub mod error;
pub mod objformat;
pub mod path;
pub mod payload;
pub mod pipeline;
pub mod record;
pub mod structured;

pub use capability::{Capabilities, Capability, Duplicated, Structure};
pub use converter::{
    ConvertContext, Converted, ConverterEdge, ConverterKind, ConverterRef, ConverterState,
    Rejected,
};
pub use env::{FormatEnv, FormatEnvBuilder};
pub use error::{FormatError, FormatResult};
pub use objformat::{FormatRef, ObjFormat};
pub use path::ConversionPath;
pub use payload::Payload;
pub use record::Record;
pub use structured::{Field, FieldRule, ScoreTable, Scored, Selector, Weight};
pub use syncbridge_types::CompareResult;
