pub mod document;
pub mod parser;
pub mod tags;

pub use document::{
    DataTable, DocString, ExamplesTable, FeatureDocument, Section, SectionKind, Step,
    StepArgument, TableRow, Tag,
};
pub use parser::Parser;
pub use tags::{TagExpression, matches};
