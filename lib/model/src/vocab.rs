//! Vocabularies used by service descriptors and the federation.

pub use oxrdf::vocab::{rdf, xsd};

pub mod rdfs {
    use oxrdf::NamedNodeRef;

    pub const LABEL: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#label");
}

/// [SPIN](http://spinrdf.org/spin#) terms describing the parameters of a service.
pub mod spin {
    use oxrdf::NamedNodeRef;

    pub const CONSTRAINT: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://spinrdf.org/spin#constraint");
    pub const COLUMN: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://spinrdf.org/spin#column");
    pub const COLUMN_CLASS: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://spinrdf.org/spin#Column");
}

pub mod spl {
    use oxrdf::NamedNodeRef;

    pub const ARGUMENT: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://spinrdf.org/spl#Argument");
    pub const PREDICATE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://spinrdf.org/spl#predicate");
    pub const VALUE_TYPE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://spinrdf.org/spl#valueType");
    pub const DEFAULT_VALUE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://spinrdf.org/spl#defaultValue");
    pub const OPTIONAL: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://spinrdf.org/spl#optional");
}

pub mod sp {
    use oxrdf::NamedNodeRef;

    pub const SUBJECT: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://spinrdf.org/sp#subject");
    pub const PREDICATE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://spinrdf.org/sp#predicate");
    pub const OBJECT: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://spinrdf.org/sp#object");
}

/// Terms of the federation itself.
pub mod ephedra {
    use oxrdf::NamedNodeRef;

    pub const NAMESPACE: &str = "http://www.researchspace.org/resource/system/ephedra#";

    pub const JSON_PATH: NamedNodeRef<'_> = NamedNodeRef::new_unchecked(
        "http://www.researchspace.org/resource/system/ephedra#jsonPath",
    );
    pub const INPUT_JSON_PATH: NamedNodeRef<'_> = NamedNodeRef::new_unchecked(
        "http://www.researchspace.org/resource/system/ephedra#inputJsonPath",
    );
    pub const HAS_SPARQL_PATTERN: NamedNodeRef<'_> = NamedNodeRef::new_unchecked(
        "http://www.researchspace.org/resource/system/ephedra#hasSPARQLPattern",
    );
    /// The median aggregate service that every federation provides.
    pub const MEDIAN: NamedNodeRef<'_> = NamedNodeRef::new_unchecked(
        "http://www.researchspace.org/resource/system/ephedra#median",
    );
}

/// The XPath function namespace. Query parsers resolve several keyword functions into it.
pub mod xpath {
    pub const NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions#";
}
