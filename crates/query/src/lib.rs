//! Query language for the arcus archiver
//!
//! Consumers talk to the archiver in a small declarative language:
//!
//! ```text
//! select * where Metadata.Location = "lab"
//! select distinct Properties.UnitofMeasure where has Actuator
//! select data in (1400000000000, 1400000360000) limit 100 where uuid = "..."
//! set Metadata/Owner = "ops" where Path like "/building-7/%"
//! ```
//!
//! `parse` turns a query string into an [`Ast`]: a WHERE [`Predicate`] plus
//! one of three targets (tags read, tags write, data read). The predicate
//! compiles to a backend-agnostic document [`Filter`] that metadata backends
//! interpret; [`filter::matches`] is the reference evaluation used by the
//! in-memory backend and the republisher's live matching.

pub mod ast;
pub mod filter;
mod error;
mod parser;
mod predicate;

pub use ast::{Ast, DataQueryKind, DataTarget, SetTarget, TagsTarget, Target};
pub use error::ParseError;
pub use filter::Filter;
pub use parser::parse;
pub use predicate::{Operator, Predicate};

/// Result type for query parsing
pub type Result<T> = std::result::Result<T, ParseError>;
