mod algebra;
mod profile;
mod solution;
pub mod vocab;

pub use algebra::*;
pub use profile::*;
pub use solution::*;

// Re-export some oxrdf types.
pub use oxiri::Iri;
pub use oxrdf::{
    BlankNode, BlankNodeRef, Graph, IriParseError, Literal, LiteralRef, NamedNode, NamedNodeRef,
    NamedOrBlankNode, Subject, SubjectRef, Term, TermRef, Triple, TripleRef, Variable,
    VariableNameParseError, VariableRef,
};
