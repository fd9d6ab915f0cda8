mod functions;
mod preprocessor;
mod serializer;

pub use functions::well_known_function;
pub use preprocessor::QueryPreprocessor;
pub use serializer::QuerySerializer;
