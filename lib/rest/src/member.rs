//! A REST service that answers the triple patterns of a SERVICE clause.
//!
//! Each evaluation runs four steps. Input values and output variables are extracted from the
//! patterns, the request is sent, the JSON response is converted into solutions, and the solutions
//! are joined with the incoming binding.

use crate::config::RestMemberConfig;
use crate::descriptor::{ServiceDescriptor, ServiceDescriptorStore, ServicePattern};
use crate::error::RestError;
use crate::json::{insert_at, lexical_form, select};
use crate::parameters::RestParameters;
use crate::secrets::SecretResolver;
use crate::transport::{HttpMethod, ReqwestTransport, RestRequest, RestTransport};
use serde_json::{Map, Value};
use sparql_federation_model::vocab::xsd;
use sparql_federation_model::{Literal, NamedNode, Solution, Term};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct RestMember {
    config: RestMemberConfig,
    descriptor: Arc<ServiceDescriptor>,
    headers: Vec<(String, String)>,
    transport: Arc<dyn RestTransport>,
}

impl RestMember {
    /// Creates a member that sends its requests with [`reqwest`].
    pub fn try_new(
        config: RestMemberConfig,
        descriptors: &dyn ServiceDescriptorStore,
        secrets: &dyn SecretResolver,
    ) -> Result<Self, RestError> {
        let transport = ReqwestTransport::new(&config.user_agent, config.requests_per_second)?;
        Self::with_transport(config, descriptors, secrets, Arc::new(transport))
    }

    pub fn with_transport(
        config: RestMemberConfig,
        descriptors: &dyn ServiceDescriptorStore,
        secrets: &dyn SecretResolver,
        transport: Arc<dyn RestTransport>,
    ) -> Result<Self, RestError> {
        let errors = config.validate();
        if !errors.is_empty() {
            return RestError::configuration(errors.join("; "));
        }
        let service_iri = config.service_iri.as_deref().unwrap_or_default();
        let service_iri = NamedNode::new(service_iri)
            .map_err(|e| RestError::Configuration(format!("Invalid service IRI: {e}")))?;
        let Some(descriptor) = descriptors.descriptor(&service_iri) else {
            return RestError::configuration(format!(
                "No service descriptor found for {service_iri}"
            ));
        };

        let headers = config.resolved_headers(secrets);
        Ok(Self {
            config,
            descriptor,
            headers,
            transport,
        })
    }

    pub fn config(&self) -> &RestMemberConfig {
        &self.config
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Evaluates the patterns of a SERVICE clause for one incoming binding.
    pub async fn evaluate(
        &self,
        patterns: &[ServicePattern],
        binding: &Solution,
    ) -> Result<Vec<Solution>, RestError> {
        let parameters = RestParameters::extract(&self.descriptor, patterns, binding);
        if !parameters.is_complete() {
            debug!(
                url = %self.config.url,
                missing = ?parameters.missing_inputs(),
                "Skipping REST call without required inputs"
            );
            return Ok(Vec::new());
        }

        let request = self.build_request(&parameters)?;
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(RestError::Transport {
                status: response.status,
                reason: response.reason,
            });
        }

        let solutions = self.convert(&response.body, &parameters)?;
        debug!(url = %self.config.url, solutions = solutions.len(), "REST call finished");
        Ok(solutions
            .into_iter()
            .map(|solution| binding.merge(&solution))
            .collect())
    }

    /// Write operations are never supported.
    pub fn update(&self) -> Result<(), RestError> {
        Err(RestError::ReadOnly {
            url: self.config.url.clone(),
        })
    }

    pub fn build_request(&self, parameters: &RestParameters) -> Result<RestRequest, RestError> {
        let mut request = RestRequest {
            method: self.config.http_method,
            url: self.config.url.clone(),
            query: Vec::new(),
            headers: self.headers.clone(),
            body: None,
        };
        match self.config.http_method {
            HttpMethod::Get => {
                request.query = parameters
                    .inputs()
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
            }
            HttpMethod::Post => {
                let mut body = Map::new();
                for (name, value) in parameters.inputs() {
                    let path = self
                        .descriptor
                        .inputs()
                        .iter()
                        .find(|p| &p.name == name)
                        .and_then(|p| p.input_json_path.as_deref())
                        .unwrap_or(name);
                    insert_at(&mut body, path, Value::String(value.clone()))?;
                }
                request.body = Some(Value::Object(body));
            }
        }
        Ok(request)
    }

    /// Turns a JSON response into solutions over the output variables.
    pub fn convert(
        &self,
        body: &[u8],
        parameters: &RestParameters,
    ) -> Result<Vec<Solution>, RestError> {
        let response: Value = serde_json::from_slice(body)?;
        let root_path = self
            .descriptor
            .subject_parameter()
            .and_then(|p| p.json_path.as_deref())
            .unwrap_or("$");

        // A single array is the list of items. Otherwise every selected object is an item.
        let nodes = select(&response, root_path)?;
        let items = match nodes.as_slice() {
            [Value::Array(items)] => items.iter().collect::<Vec<_>>(),
            nodes => nodes.iter().copied().filter(|n| n.is_object()).collect(),
        };
        if items.is_empty() {
            debug!(url = %self.config.url, root_path, "REST response has no results");
        }
        items
            .into_iter()
            .map(|item| self.convert_item(item, parameters))
            .collect()
    }

    fn convert_item(
        &self,
        item: &Value,
        parameters: &RestParameters,
    ) -> Result<Solution, RestError> {
        let mut solution = Solution::new();
        for (property, variable) in parameters.outputs() {
            let Some(parameter) = self.descriptor.output_for_property(property) else {
                continue;
            };
            let path = parameter.json_path.as_deref().unwrap_or(&parameter.name);
            let Some(value) = select(item, path)?.first().copied().and_then(lexical_form) else {
                continue;
            };
            match typed_value(value, &parameter.value_type) {
                Some(term) => {
                    solution.insert(variable.clone(), term);
                }
                None => warn!(variable = %variable, "Skipping value that is not a valid IRI"),
            }
        }
        Ok(solution)
    }
}

fn typed_value(value: String, value_type: &NamedNode) -> Option<Term> {
    if value_type.as_ref() == xsd::ANY_URI {
        return NamedNode::new(value).ok().map(Term::from);
    }
    Some(Literal::new_typed_literal(value, value_type.clone()).into())
}
