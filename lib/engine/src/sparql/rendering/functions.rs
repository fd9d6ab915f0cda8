use sparql_federation_model::vocab::xpath;
use sparql_federation_model::BuiltInFunction;

/// XPath functions that have a SPARQL keyword. Parsers that resolve keywords to function IRIs
/// produce these names.
const XPATH_FUNCTIONS: [(&str, BuiltInFunction); 23] = [
    ("concat", BuiltInFunction::Concat),
    ("contains", BuiltInFunction::Contains),
    ("starts-with", BuiltInFunction::StrStarts),
    ("ends-with", BuiltInFunction::StrEnds),
    ("string-length", BuiltInFunction::StrLen),
    ("substring", BuiltInFunction::SubStr),
    ("substring-before", BuiltInFunction::StrBefore),
    ("substring-after", BuiltInFunction::StrAfter),
    ("upper-case", BuiltInFunction::UCase),
    ("lower-case", BuiltInFunction::LCase),
    ("encode-for-uri", BuiltInFunction::EncodeForUri),
    ("replace", BuiltInFunction::Replace),
    ("matches", BuiltInFunction::Regex),
    ("numeric-abs", BuiltInFunction::Abs),
    ("numeric-ceil", BuiltInFunction::Ceil),
    ("numeric-floor", BuiltInFunction::Floor),
    ("numeric-round", BuiltInFunction::Round),
    ("year-from-dateTime", BuiltInFunction::Year),
    ("month-from-dateTime", BuiltInFunction::Month),
    ("day-from-dateTime", BuiltInFunction::Day),
    ("hours-from-dateTime", BuiltInFunction::Hours),
    ("minutes-from-dateTime", BuiltInFunction::Minutes),
    ("seconds-from-dateTime", BuiltInFunction::Seconds),
];

/// Returns the keyword function for an IRI of the XPath function namespace.
pub fn well_known_function(iri: &str) -> Option<BuiltInFunction> {
    let local_name = iri.strip_prefix(xpath::NAMESPACE)?;
    XPATH_FUNCTIONS
        .iter()
        .find(|(name, _)| *name == local_name)
        .map(|(_, function)| *function)
}
