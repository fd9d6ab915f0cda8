pub mod sparql;

pub use sparql::{render_query, PreparedQuery, QueryRenderError};
