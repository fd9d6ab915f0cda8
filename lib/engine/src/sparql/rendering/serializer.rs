use crate::sparql::error::QueryRenderError;
use crate::sparql::rendering::functions::well_known_function;
use sparql_federation_model::{
    AggregateFunction, Node, NodeId, PatternTerm, ProjectionElem, QueryModifier, QueryProfile,
    QueryTree, Term, UnaryOp, Variable,
};

type RenderResult = Result<(), QueryRenderError>;

/// Renders a preprocessed [`QueryTree`] back into SPARQL text.
///
/// The output is meant to be sent to an endpoint, not to be read. Clauses follow the layout
/// that [`QueryProfile`] describes and every token is followed by whitespace, so no token needs
/// look-ahead.
pub struct QuerySerializer<'a> {
    tree: &'a QueryTree,
    root: &'a QueryProfile,
    builder: String,
    /// Whether variables bound by the group of the current profile are replaced by their
    /// aggregate. Only enabled for SELECT, HAVING and ORDER BY.
    inline_aggregates: bool,
}

impl<'a> QuerySerializer<'a> {
    pub fn new(tree: &'a QueryTree, root: &'a QueryProfile) -> Self {
        Self {
            tree,
            root,
            builder: String::new(),
            inline_aggregates: false,
        }
    }

    pub fn serialize(mut self) -> Result<String, QueryRenderError> {
        if let Some(root) = self.tree.root() {
            if matches!(
                self.node(root),
                Node::MultiProjection { .. } | Node::Update(_)
            ) {
                return Err(QueryRenderError::only_select());
            }
        }
        self.process_query(self.root)?;
        Ok(self.builder)
    }

    /// Renders `SELECT *` over some operands of the where clause of the root profile.
    pub fn serialize_fragment(mut self, operands: &[NodeId]) -> Result<String, QueryRenderError> {
        let root = self.root;
        self.push("SELECT * \nWHERE { \n");
        for operand in operands {
            self.pattern(root, *operand)?;
        }
        self.push(" }\n ");
        Ok(self.builder)
    }

    fn process_query(&mut self, profile: &'a QueryProfile) -> RenderResult {
        if let Some(projection) = profile.projection() {
            self.push("SELECT ");
            match profile.modifier() {
                Some(QueryModifier::Distinct) => self.push("DISTINCT "),
                Some(QueryModifier::Reduced) => self.push("REDUCED "),
                None => {}
            }
            let Node::Projection { elems, .. } = self.node(projection) else {
                return QueryRenderError::internal("Profile projection is not a projection.");
            };
            self.inline_aggregates = true;
            for elem in elems {
                self.projection_elem(profile, elem)?;
            }
            self.inline_aggregates = false;
            self.push("\nWHERE ");
        }

        self.push("{ \n");
        if let Some(where_clause) = profile.where_clause() {
            self.pattern(profile, where_clause)?;
        }
        self.push(" }\n ");

        self.group_by(profile)?;
        self.order_by(profile)?;
        self.slice(profile)?;

        if let Some(bindings) = profile.bindings() {
            self.pattern(profile, bindings)?;
            self.push("\n");
        }
        Ok(())
    }

    fn group_by(&mut self, profile: &'a QueryProfile) -> RenderResult {
        let Some(group) = profile.group_by() else {
            return Ok(());
        };
        let Node::Group { variables, .. } = self.node(group) else {
            return QueryRenderError::internal("Profile group is not a group.");
        };

        // An implicit group has no clause of its own; only HAVING may refer to it.
        let has_clause = !variables.is_empty() || profile.having().is_some();
        if !variables.is_empty() {
            self.push("GROUP BY ");
            for variable in variables {
                self.variable(variable);
                self.push(" ");
            }
        }
        if let Some(having) = profile.having() {
            let Node::Filter { condition, .. } = self.node(having) else {
                return QueryRenderError::internal("Profile having is not a filter.");
            };
            self.push("HAVING (");
            self.inline_aggregates = true;
            self.expression(profile, *condition)?;
            self.inline_aggregates = false;
            self.push(") ");
        }
        if has_clause {
            self.push("\n");
        }
        Ok(())
    }

    fn order_by(&mut self, profile: &'a QueryProfile) -> RenderResult {
        let Some(order) = profile.order_by() else {
            return Ok(());
        };
        let Node::Order { elems, .. } = self.node(order) else {
            return QueryRenderError::internal("Profile order is not an order.");
        };

        self.push("ORDER BY ");
        self.inline_aggregates = true;
        for elem in elems {
            if elem.ascending {
                self.expression(profile, elem.expr)?;
            } else {
                self.push("DESC(");
                self.expression(profile, elem.expr)?;
                self.push(")");
            }
            self.push(" ");
        }
        self.inline_aggregates = false;
        self.push("\n");
        Ok(())
    }

    fn slice(&mut self, profile: &'a QueryProfile) -> RenderResult {
        let Some(slice) = profile.slice() else {
            return Ok(());
        };
        let Node::Slice { offset, limit, .. } = self.node(slice) else {
            return QueryRenderError::internal("Profile slice is not a slice.");
        };

        if let Some(limit) = limit {
            self.push("LIMIT ");
            self.push(&limit.to_string());
            self.push(" ");
        }
        if *offset > 0 {
            self.push("OFFSET ");
            self.push(&offset.to_string());
            self.push(" ");
        }
        self.push("\n");
        Ok(())
    }

    fn projection_elem(
        &mut self,
        profile: &'a QueryProfile,
        elem: &ProjectionElem,
    ) -> RenderResult {
        match elem.source_expression {
            Some(extension_elem) => {
                let Node::ExtensionElem { name, expr } = self.node(extension_elem) else {
                    return QueryRenderError::internal(
                        "Projection source is not an extension element.",
                    );
                };
                if self.is_tautology(profile, name, *expr) {
                    self.variable(name);
                    self.push(" ");
                } else {
                    self.push("(");
                    self.extension_elem(profile, extension_elem)?;
                    self.push(") ");
                }
            }
            None => {
                if let Some(operator) = self.inlined_aggregate(profile, &elem.source) {
                    self.push("(");
                    self.expression(profile, operator)?;
                    self.push_infix(" AS ");
                    self.variable(&elem.target);
                    self.push(") ");
                    return Ok(());
                }
                self.plain_projection_elem(elem);
            }
        }
        Ok(())
    }

    fn plain_projection_elem(&mut self, elem: &ProjectionElem) {
        if elem.source == elem.target {
            self.variable(&elem.target);
            self.push(" ");
        } else {
            self.push("(");
            self.variable(&elem.source);
            self.push_infix(" AS ");
            self.variable(&elem.target);
            self.push(") ");
        }
    }

    fn extension_elem(&mut self, profile: &'a QueryProfile, id: NodeId) -> RenderResult {
        let Node::ExtensionElem { name, expr } = self.node(id) else {
            return QueryRenderError::internal("Expected an extension element.");
        };
        self.expression(profile, *expr)?;
        self.push_infix(" AS ");
        self.variable(name);
        Ok(())
    }

    fn pattern(&mut self, profile: &'a QueryProfile, id: NodeId) -> RenderResult {
        match self.node(id) {
            Node::StatementPattern {
                subject,
                predicate,
                object,
                context,
            } => {
                if let Some(context) = context {
                    self.push("GRAPH ");
                    self.pattern_term(context);
                    self.push(" { ");
                }
                self.push("\t");
                self.pattern_term(subject);
                self.push(" ");
                self.pattern_term(predicate);
                self.push(" ");
                self.pattern_term(object);
                self.push(" . \n");
                if context.is_some() {
                    self.push(" } \n");
                }
            }
            Node::Join { left, right } => {
                self.pattern(profile, *left)?;
                self.pattern(profile, *right)?;
            }
            Node::NaryJoin { args } => {
                for arg in args {
                    self.pattern(profile, *arg)?;
                }
            }
            Node::LeftJoin {
                left,
                right,
                condition,
            } => {
                self.pattern(profile, *left)?;
                self.push(" OPTIONAL { ");
                self.pattern(profile, *right)?;
                if let Some(condition) = condition {
                    self.push(" FILTER (");
                    self.expression(profile, *condition)?;
                    self.push(") ");
                }
                self.push("} ");
            }
            Node::Union { left, right } => self.binary_pattern(profile, *left, *right, "UNION")?,
            Node::Difference { left, right } => {
                self.binary_pattern(profile, *left, *right, "MINUS")?;
            }
            Node::Intersection { .. } => {
                return Err(QueryRenderError::unsupported_operator("Intersection"))
            }
            Node::Filter { arg, condition } => {
                self.pattern(profile, *arg)?;
                if profile.having() != Some(id) {
                    self.push(" FILTER (");
                    self.expression(profile, *condition)?;
                    self.push(") ");
                }
            }
            Node::Extension { arg, elems } => {
                self.pattern(profile, *arg)?;
                let sources = self.projection_sources(profile);
                for elem in elems {
                    let Node::ExtensionElem { name, expr } = self.node(*elem) else {
                        return QueryRenderError::internal("Expected an extension element.");
                    };
                    if sources.contains(elem) || self.is_tautology(profile, name, *expr) {
                        continue;
                    }
                    self.push("\tBIND (");
                    self.extension_elem(profile, *elem)?;
                    self.push(") . \n");
                }
            }
            Node::Projection { .. } => {
                let Some(sub_query) = self.root.sub_query(id) else {
                    return QueryRenderError::internal(format!(
                        "No profile for sub-select {id}."
                    ));
                };
                self.push("{ ");
                self.process_query(sub_query)?;
                self.push(" } ");
            }
            Node::Service {
                service,
                arg,
                silent,
            } => {
                self.push("SERVICE ");
                if *silent {
                    self.push("SILENT ");
                }
                self.pattern_term(service);
                self.push(" { \n");
                self.pattern(profile, *arg)?;
                self.push("} \n");
            }
            Node::BindingSetAssignment { variables, rows } => {
                self.push("VALUES (");
                for variable in variables {
                    self.variable(variable);
                    self.push(" ");
                }
                self.push(") { ");
                for row in rows {
                    self.push("(");
                    for value in row {
                        match value {
                            Some(value) => {
                                self.value(value);
                                self.push(" ");
                            }
                            None => self.push("UNDEF "),
                        }
                    }
                    self.push(") ");
                }
                self.push(" } ");
            }
            Node::Slice { arg, .. }
            | Node::Distinct { arg }
            | Node::Reduced { arg }
            | Node::Order { arg, .. } => self.pattern(profile, *arg)?,
            Node::SingletonSet | Node::EmptySet => {}
            Node::MultiProjection { .. } | Node::Update(_) => {
                return Err(QueryRenderError::only_select())
            }
            Node::Group { .. } => {
                return QueryRenderError::internal("Unexpected group inside a where clause.")
            }
            node => {
                return QueryRenderError::internal(format!(
                    "Expected a graph pattern, found {}.",
                    node.kind()
                ))
            }
        }
        Ok(())
    }

    fn binary_pattern(
        &mut self,
        profile: &'a QueryProfile,
        left: NodeId,
        right: NodeId,
        keyword: &str,
    ) -> RenderResult {
        self.push("{\n");
        self.pattern(profile, left)?;
        self.push("}\n ");
        self.push(keyword);
        self.push("\n{\n");
        self.pattern(profile, right)?;
        self.push("}\n");
        Ok(())
    }

    fn expression(&mut self, profile: &'a QueryProfile, id: NodeId) -> RenderResult {
        match self.node(id) {
            Node::Var(variable) => match self.inlined_aggregate(profile, variable) {
                Some(operator) => self.expression(profile, operator)?,
                None => self.variable(variable),
            },
            Node::ValueConstant(value) => self.value(value),
            Node::Compare { left, right, op } => {
                self.expression(profile, *left)?;
                self.push_infix(&format!(" {} ", op.symbol()));
                self.expression(profile, *right)?;
            }
            Node::MathExpr { left, right, op } => {
                self.push("(");
                self.expression(profile, *left)?;
                self.push_infix(&format!(" {} ", op.symbol()));
                self.expression(profile, *right)?;
                self.push(") ");
            }
            Node::Unary { arg, op } => {
                self.push(match op {
                    UnaryOp::Plus => "+(",
                    UnaryOp::Minus => "-(",
                });
                self.expression(profile, *arg)?;
                self.push(")");
            }
            Node::And { left, right } => self.logical(profile, *left, *right, " && ")?,
            Node::Or { left, right } => self.logical(profile, *left, *right, " || ")?,
            Node::Not { arg } => match self.node(*arg) {
                Node::Exists { arg } => {
                    self.push("NOT EXISTS {");
                    self.pattern(profile, *arg)?;
                    self.push("} ");
                }
                Node::In { arg, list } => {
                    self.expression(profile, *arg)?;
                    self.push_infix(" NOT IN (");
                    self.expression_list(profile, list)?;
                    self.push(") ");
                }
                _ => {
                    self.push("!(");
                    self.expression(profile, *arg)?;
                    self.push(")");
                }
            },
            Node::Bound(variable) => {
                self.push("BOUND(");
                self.variable(variable);
                self.push(") ");
            }
            Node::FunctionCall { iri, args } => {
                match well_known_function(iri.as_str()) {
                    Some(function) => self.push(function.keyword()),
                    None => {
                        self.push("<");
                        self.push(iri.as_str());
                        self.push(">");
                    }
                }
                self.call_arguments(profile, args)?;
            }
            Node::BuiltIn { function, args } => {
                self.push(function.keyword());
                self.call_arguments(profile, args)?;
            }
            Node::If {
                condition,
                then,
                otherwise,
            } => {
                self.push("IF");
                self.call_arguments(profile, &[*condition, *then, *otherwise])?;
            }
            Node::Coalesce { args } => {
                self.push("COALESCE");
                self.call_arguments(profile, args)?;
            }
            Node::In { arg, list } => {
                self.expression(profile, *arg)?;
                self.push_infix(" IN (");
                self.expression_list(profile, list)?;
                self.push(") ");
            }
            Node::Exists { arg } => {
                self.push("EXISTS {");
                self.pattern(profile, *arg)?;
                self.push("} ");
            }
            Node::Aggregate {
                function,
                arg,
                distinct,
            } => {
                match function {
                    AggregateFunction::Count => self.push("COUNT"),
                    AggregateFunction::Sum => self.push("SUM"),
                    AggregateFunction::Avg => self.push("AVG"),
                    AggregateFunction::Min => self.push("MIN"),
                    AggregateFunction::Max => self.push("MAX"),
                    AggregateFunction::Sample => self.push("SAMPLE"),
                    AggregateFunction::GroupConcat { .. } => self.push("GROUP_CONCAT"),
                    AggregateFunction::Service(iri) => {
                        self.push("<");
                        self.push(iri.as_str());
                        self.push(">");
                    }
                }
                self.push("(");
                if *distinct {
                    self.push("DISTINCT ");
                }
                match arg {
                    Some(arg) => self.expression(profile, *arg)?,
                    None => self.push("*"),
                }
                if let AggregateFunction::GroupConcat {
                    separator: Some(separator),
                } = function
                {
                    self.push(";separator=\"");
                    self.push(&escape_string(separator));
                    self.push("\"");
                }
                self.push(") ");
            }
            node => {
                return QueryRenderError::internal(format!(
                    "Expected an expression, found {}.",
                    node.kind()
                ))
            }
        }
        Ok(())
    }

    fn logical(
        &mut self,
        profile: &'a QueryProfile,
        left: NodeId,
        right: NodeId,
        operator: &str,
    ) -> RenderResult {
        self.push("(");
        self.expression(profile, left)?;
        self.push(operator);
        self.expression(profile, right)?;
        self.push(")");
        Ok(())
    }

    fn call_arguments(&mut self, profile: &'a QueryProfile, args: &[NodeId]) -> RenderResult {
        self.push("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.push(",");
            }
            self.expression(profile, *arg)?;
        }
        self.push(") ");
        Ok(())
    }

    fn expression_list(&mut self, profile: &'a QueryProfile, list: &[NodeId]) -> RenderResult {
        for (i, item) in list.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expression(profile, *item)?;
        }
        Ok(())
    }

    /// Returns the operator of the group element that binds `variable`, if the variable must be
    /// written as its aggregate.
    fn inlined_aggregate(&self, profile: &QueryProfile, variable: &Variable) -> Option<NodeId> {
        if !self.inline_aggregates {
            return None;
        }
        let Node::Group { elems, .. } = self.node(profile.group_by()?) else {
            return None;
        };
        elems
            .iter()
            .find(|e| &e.name == variable)
            .map(|e| e.operator)
    }

    /// `(?x AS ?x)` only passes a variable through unless `?x` names an aggregate.
    fn is_tautology(&self, profile: &QueryProfile, name: &Variable, expr: NodeId) -> bool {
        let Node::Var(variable) = self.node(expr) else {
            return false;
        };
        if variable != name {
            return false;
        }
        let is_group_elem = profile.group_by().is_some_and(|group| {
            matches!(
                self.node(group),
                Node::Group { elems, .. } if elems.iter().any(|e| &e.name == name)
            )
        });
        !is_group_elem
    }

    fn projection_sources(&self, profile: &QueryProfile) -> Vec<NodeId> {
        let Some(projection) = profile.projection() else {
            return Vec::new();
        };
        match self.node(projection) {
            Node::Projection { elems, .. } => {
                elems.iter().filter_map(|e| e.source_expression).collect()
            }
            _ => Vec::new(),
        }
    }

    fn pattern_term(&mut self, term: &PatternTerm) {
        match term {
            PatternTerm::Variable(variable) => self.variable(variable),
            PatternTerm::Constant(value) => self.value(value),
        }
    }

    fn variable(&mut self, variable: &Variable) {
        self.push("?");
        self.push(variable.as_str());
    }

    /// IRIs as `<iri>`, blank nodes as `_:id` and literals quoted with their language tag or
    /// datatype. Simple literals carry no datatype.
    fn value(&mut self, value: &Term) {
        self.push(&value.to_string());
    }

    fn node(&self, id: NodeId) -> &'a Node {
        self.tree.node(id)
    }

    fn push(&mut self, text: &str) {
        self.builder.push_str(text);
    }

    /// Pushes an infix keyword or operator. Calls already end with a space, so it is not doubled.
    fn push_infix(&mut self, text: &str) {
        if text.starts_with(' ') && self.builder.ends_with(' ') {
            self.builder.pop();
        }
        self.builder.push_str(text);
    }
}

fn escape_string(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c => result.push(c),
        }
    }
    result
}
