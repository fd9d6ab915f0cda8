//! REST services as members of a SPARQL federation.
//!
//! A REST service is described by a [`ServiceDescriptor`] that maps the triple patterns of a
//! SERVICE clause to request parameters and response fields. [`RestMember`] uses the descriptor
//! to answer such patterns with plain HTTP calls.

mod config;
mod descriptor;
mod error;
pub mod json;
mod member;
mod parameters;
mod secrets;
mod transport;

pub use config::{RestMemberConfig, DEFAULT_USER_AGENT};
pub use descriptor::{
    MemoryDescriptorStore, ServiceDescriptor, ServiceDescriptorStore, ServiceParameter,
    ServicePattern,
};
pub use error::RestError;
pub use member::RestMember;
pub use parameters::RestParameters;
pub use secrets::{EnvSecretResolver, MemorySecretResolver, SecretResolver};
pub use transport::{HttpMethod, ReqwestTransport, RestRequest, RestResponse, RestTransport};
