//! An arena-based query algebra.
//!
//! All nodes of one query live in a single [`QueryTree`] and refer to each other through
//! [`NodeId`]s. Rewriting passes mutate the tree in place by replacing child references, which
//! keeps ownership trivial and allows cloning a whole tree cheaply.

use oxrdf::{NamedNode, Term, Variable};
use std::fmt::{Display, Formatter};

/// Identifies a node within a [`QueryTree`].
///
/// A [`NodeId`] is only meaningful for the tree that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A position of a statement pattern. Either a variable or a constant term.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PatternTerm {
    Variable(Variable),
    Constant(Term),
}

impl PatternTerm {
    pub fn variable(&self) -> Option<&Variable> {
        match self {
            PatternTerm::Variable(variable) => Some(variable),
            PatternTerm::Constant(_) => None,
        }
    }

    pub fn constant(&self) -> Option<&Term> {
        match self {
            PatternTerm::Variable(_) => None,
            PatternTerm::Constant(term) => Some(term),
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, PatternTerm::Variable(_))
    }

    /// Replaces the variable with its value from `lookup`, if there is one.
    #[must_use]
    pub fn bind(&self, lookup: impl Fn(&Variable) -> Option<Term>) -> Self {
        match self {
            PatternTerm::Variable(variable) => match lookup(variable) {
                Some(term) => PatternTerm::Constant(term),
                None => self.clone(),
            },
            PatternTerm::Constant(_) => self.clone(),
        }
    }
}

impl From<Variable> for PatternTerm {
    fn from(value: Variable) -> Self {
        PatternTerm::Variable(value)
    }
}

impl From<Term> for PatternTerm {
    fn from(value: Term) -> Self {
        PatternTerm::Constant(value)
    }
}

impl From<NamedNode> for PatternTerm {
    fn from(value: NamedNode) -> Self {
        PatternTerm::Constant(value.into())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Ge,
    Gt,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MathOp {
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl MathOp {
    pub fn symbol(self) -> &'static str {
        match self {
            MathOp::Plus => "+",
            MathOp::Minus => "-",
            MathOp::Multiply => "*",
            MathOp::Divide => "/",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Minus,
}

/// The built-in functions of SPARQL 1.1 that are written with a keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltInFunction {
    Str,
    Lang,
    LangMatches,
    Datatype,
    Iri,
    BNode,
    Rand,
    Abs,
    Ceil,
    Floor,
    Round,
    Concat,
    SubStr,
    StrLen,
    Replace,
    UCase,
    LCase,
    EncodeForUri,
    Contains,
    StrStarts,
    StrEnds,
    StrBefore,
    StrAfter,
    Year,
    Month,
    Day,
    Hours,
    Minutes,
    Seconds,
    Timezone,
    Tz,
    Now,
    Uuid,
    StrUuid,
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    StrLang,
    StrDt,
    IsIri,
    IsBlank,
    IsLiteral,
    IsNumeric,
    Regex,
    SameTerm,
}

impl BuiltInFunction {
    /// The keyword used in the query text.
    pub fn keyword(self) -> &'static str {
        match self {
            BuiltInFunction::Str => "STR",
            BuiltInFunction::Lang => "LANG",
            BuiltInFunction::LangMatches => "LANGMATCHES",
            BuiltInFunction::Datatype => "DATATYPE",
            BuiltInFunction::Iri => "IRI",
            BuiltInFunction::BNode => "BNODE",
            BuiltInFunction::Rand => "RAND",
            BuiltInFunction::Abs => "ABS",
            BuiltInFunction::Ceil => "CEIL",
            BuiltInFunction::Floor => "FLOOR",
            BuiltInFunction::Round => "ROUND",
            BuiltInFunction::Concat => "CONCAT",
            BuiltInFunction::SubStr => "SUBSTR",
            BuiltInFunction::StrLen => "STRLEN",
            BuiltInFunction::Replace => "REPLACE",
            BuiltInFunction::UCase => "UCASE",
            BuiltInFunction::LCase => "LCASE",
            BuiltInFunction::EncodeForUri => "ENCODE_FOR_URI",
            BuiltInFunction::Contains => "CONTAINS",
            BuiltInFunction::StrStarts => "STRSTARTS",
            BuiltInFunction::StrEnds => "STRENDS",
            BuiltInFunction::StrBefore => "STRBEFORE",
            BuiltInFunction::StrAfter => "STRAFTER",
            BuiltInFunction::Year => "YEAR",
            BuiltInFunction::Month => "MONTH",
            BuiltInFunction::Day => "DAY",
            BuiltInFunction::Hours => "HOURS",
            BuiltInFunction::Minutes => "MINUTES",
            BuiltInFunction::Seconds => "SECONDS",
            BuiltInFunction::Timezone => "TIMEZONE",
            BuiltInFunction::Tz => "TZ",
            BuiltInFunction::Now => "NOW",
            BuiltInFunction::Uuid => "UUID",
            BuiltInFunction::StrUuid => "STRUUID",
            BuiltInFunction::Md5 => "MD5",
            BuiltInFunction::Sha1 => "SHA1",
            BuiltInFunction::Sha256 => "SHA256",
            BuiltInFunction::Sha384 => "SHA384",
            BuiltInFunction::Sha512 => "SHA512",
            BuiltInFunction::StrLang => "STRLANG",
            BuiltInFunction::StrDt => "STRDT",
            BuiltInFunction::IsIri => "isIRI",
            BuiltInFunction::IsBlank => "isBLANK",
            BuiltInFunction::IsLiteral => "isLITERAL",
            BuiltInFunction::IsNumeric => "isNUMERIC",
            BuiltInFunction::Regex => "REGEX",
            BuiltInFunction::SameTerm => "sameTerm",
        }
    }
}

/// An aggregate function.
///
/// [`AggregateFunction::Service`] is an aggregate that is not part of the query language and is
/// evaluated by a registered aggregate service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Sample,
    GroupConcat { separator: Option<String> },
    Service(NamedNode),
}

impl AggregateFunction {
    pub fn is_service(&self) -> bool {
        matches!(self, AggregateFunction::Service(_))
    }
}

/// One column of a projection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectionElem {
    /// The variable read from the projected pattern.
    pub source: Variable,
    /// The name of the column in the result.
    pub target: Variable,
    /// The [`Node::ExtensionElem`] computing this column, if the column is an expression.
    pub source_expression: Option<NodeId>,
    /// Whether the source expression contains an aggregate.
    pub aggregate_in_expression: bool,
}

impl ProjectionElem {
    pub fn new(variable: Variable) -> Self {
        Self {
            source: variable.clone(),
            target: variable,
            source_expression: None,
            aggregate_in_expression: false,
        }
    }

    pub fn renamed(source: Variable, target: Variable) -> Self {
        Self {
            source,
            target,
            source_expression: None,
            aggregate_in_expression: false,
        }
    }
}

/// An aggregate bound by a group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupElem {
    pub name: Variable,
    pub operator: NodeId,
    /// Anonymous elements exist only to feed an enclosing expression and never appear as a
    /// column of their own.
    pub anonymous: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderElem {
    pub expr: NodeId,
    pub ascending: bool,
}

/// Write operations. None of them can be rendered or evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Add,
    Copy,
    Move,
    Load,
    Clear,
    Create,
    Drop,
    InsertData,
    DeleteData,
    Modify,
}

/// A node of the query algebra. Tuple operators and value expressions share one type so that
/// a single arena can hold the whole query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Projection {
        arg: NodeId,
        elems: Vec<ProjectionElem>,
    },
    /// The template of a CONSTRUCT query.
    MultiProjection {
        arg: NodeId,
    },
    Extension {
        arg: NodeId,
        elems: Vec<NodeId>,
    },
    ExtensionElem {
        name: Variable,
        expr: NodeId,
    },
    Group {
        arg: NodeId,
        variables: Vec<Variable>,
        elems: Vec<GroupElem>,
    },
    Filter {
        arg: NodeId,
        condition: NodeId,
    },
    Join {
        left: NodeId,
        right: NodeId,
    },
    NaryJoin {
        args: Vec<NodeId>,
    },
    LeftJoin {
        left: NodeId,
        right: NodeId,
        condition: Option<NodeId>,
    },
    Union {
        left: NodeId,
        right: NodeId,
    },
    Difference {
        left: NodeId,
        right: NodeId,
    },
    Intersection {
        left: NodeId,
        right: NodeId,
    },
    StatementPattern {
        subject: PatternTerm,
        predicate: PatternTerm,
        object: PatternTerm,
        context: Option<PatternTerm>,
    },
    Service {
        service: PatternTerm,
        arg: NodeId,
        silent: bool,
    },
    BindingSetAssignment {
        variables: Vec<Variable>,
        rows: Vec<Vec<Option<Term>>>,
    },
    Slice {
        arg: NodeId,
        offset: usize,
        limit: Option<usize>,
    },
    Distinct {
        arg: NodeId,
    },
    Reduced {
        arg: NodeId,
    },
    Order {
        arg: NodeId,
        elems: Vec<OrderElem>,
    },
    SingletonSet,
    EmptySet,
    Update(UpdateKind),

    Var(Variable),
    ValueConstant(Term),
    Compare {
        left: NodeId,
        right: NodeId,
        op: CompareOp,
    },
    MathExpr {
        left: NodeId,
        right: NodeId,
        op: MathOp,
    },
    Unary {
        arg: NodeId,
        op: UnaryOp,
    },
    And {
        left: NodeId,
        right: NodeId,
    },
    Or {
        left: NodeId,
        right: NodeId,
    },
    Not {
        arg: NodeId,
    },
    Bound(Variable),
    FunctionCall {
        iri: NamedNode,
        args: Vec<NodeId>,
    },
    BuiltIn {
        function: BuiltInFunction,
        args: Vec<NodeId>,
    },
    If {
        condition: NodeId,
        then: NodeId,
        otherwise: NodeId,
    },
    Coalesce {
        args: Vec<NodeId>,
    },
    In {
        arg: NodeId,
        list: Vec<NodeId>,
    },
    Exists {
        arg: NodeId,
    },
    Aggregate {
        function: AggregateFunction,
        /// [`None`] for `COUNT(*)`.
        arg: Option<NodeId>,
        distinct: bool,
    },
}

impl Node {
    /// Returns the children of this node in the order in which they appear in the query text.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Node::Projection { arg, .. }
            | Node::MultiProjection { arg }
            | Node::Service { arg, .. }
            | Node::Slice { arg, .. }
            | Node::Distinct { arg }
            | Node::Reduced { arg }
            | Node::Unary { arg, .. }
            | Node::Not { arg }
            | Node::Exists { arg } => vec![*arg],
            Node::Extension { arg, elems } => {
                std::iter::once(*arg).chain(elems.iter().copied()).collect()
            }
            Node::ExtensionElem { expr, .. } => vec![*expr],
            Node::Group { arg, elems, .. } => std::iter::once(*arg)
                .chain(elems.iter().map(|e| e.operator))
                .collect(),
            Node::Filter { arg, condition } => vec![*arg, *condition],
            Node::Join { left, right }
            | Node::Union { left, right }
            | Node::Difference { left, right }
            | Node::Intersection { left, right }
            | Node::Compare { left, right, .. }
            | Node::MathExpr { left, right, .. }
            | Node::And { left, right }
            | Node::Or { left, right } => vec![*left, *right],
            Node::LeftJoin {
                left,
                right,
                condition,
            } => std::iter::once(*left)
                .chain(std::iter::once(*right))
                .chain(condition.iter().copied())
                .collect(),
            Node::NaryJoin { args }
            | Node::FunctionCall { args, .. }
            | Node::BuiltIn { args, .. }
            | Node::Coalesce { args } => args.clone(),
            Node::Order { arg, elems } => std::iter::once(*arg)
                .chain(elems.iter().map(|e| e.expr))
                .collect(),
            Node::If {
                condition,
                then,
                otherwise,
            } => vec![*condition, *then, *otherwise],
            Node::In { arg, list } => std::iter::once(*arg).chain(list.iter().copied()).collect(),
            Node::Aggregate { arg, .. } => arg.iter().copied().collect(),
            Node::StatementPattern { .. }
            | Node::BindingSetAssignment { .. }
            | Node::SingletonSet
            | Node::EmptySet
            | Node::Update(_)
            | Node::Var(_)
            | Node::ValueConstant(_)
            | Node::Bound(_) => Vec::new(),
        }
    }

    /// Replaces every reference to `old` with `new`. Returns whether a reference was found.
    fn replace_child_reference(&mut self, old: NodeId, new: NodeId) -> bool {
        let mut found = false;
        let mut swap = |id: &mut NodeId| {
            if *id == old {
                *id = new;
                found = true;
            }
        };
        match self {
            Node::Projection { arg, .. }
            | Node::MultiProjection { arg }
            | Node::Service { arg, .. }
            | Node::Slice { arg, .. }
            | Node::Distinct { arg }
            | Node::Reduced { arg }
            | Node::Unary { arg, .. }
            | Node::Not { arg }
            | Node::Exists { arg } => swap(arg),
            Node::Extension { arg, elems } => {
                swap(arg);
                elems.iter_mut().for_each(&mut swap);
            }
            Node::ExtensionElem { expr, .. } => swap(expr),
            Node::Group { arg, elems, .. } => {
                swap(arg);
                for elem in elems.iter_mut() {
                    swap(&mut elem.operator);
                }
            }
            Node::Filter { arg, condition } => {
                swap(arg);
                swap(condition);
            }
            Node::Join { left, right }
            | Node::Union { left, right }
            | Node::Difference { left, right }
            | Node::Intersection { left, right }
            | Node::Compare { left, right, .. }
            | Node::MathExpr { left, right, .. }
            | Node::And { left, right }
            | Node::Or { left, right } => {
                swap(left);
                swap(right);
            }
            Node::LeftJoin {
                left,
                right,
                condition,
            } => {
                swap(left);
                swap(right);
                if let Some(condition) = condition {
                    swap(condition);
                }
            }
            Node::NaryJoin { args }
            | Node::FunctionCall { args, .. }
            | Node::BuiltIn { args, .. }
            | Node::Coalesce { args } => args.iter_mut().for_each(&mut swap),
            Node::Order { arg, elems } => {
                swap(arg);
                for elem in elems.iter_mut() {
                    swap(&mut elem.expr);
                }
            }
            Node::If {
                condition,
                then,
                otherwise,
            } => {
                swap(condition);
                swap(then);
                swap(otherwise);
            }
            Node::In { arg, list } => {
                swap(arg);
                list.iter_mut().for_each(&mut swap);
            }
            Node::Aggregate { arg, .. } => {
                if let Some(arg) = arg {
                    swap(arg);
                }
            }
            Node::StatementPattern { .. }
            | Node::BindingSetAssignment { .. }
            | Node::SingletonSet
            | Node::EmptySet
            | Node::Update(_)
            | Node::Var(_)
            | Node::ValueConstant(_)
            | Node::Bound(_) => {}
        }
        found
    }

    /// A short name of the operator, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Projection { .. } => "Projection",
            Node::MultiProjection { .. } => "MultiProjection",
            Node::Extension { .. } => "Extension",
            Node::ExtensionElem { .. } => "ExtensionElem",
            Node::Group { .. } => "Group",
            Node::Filter { .. } => "Filter",
            Node::Join { .. } => "Join",
            Node::NaryJoin { .. } => "NaryJoin",
            Node::LeftJoin { .. } => "LeftJoin",
            Node::Union { .. } => "Union",
            Node::Difference { .. } => "Difference",
            Node::Intersection { .. } => "Intersection",
            Node::StatementPattern { .. } => "StatementPattern",
            Node::Service { .. } => "Service",
            Node::BindingSetAssignment { .. } => "BindingSetAssignment",
            Node::Slice { .. } => "Slice",
            Node::Distinct { .. } => "Distinct",
            Node::Reduced { .. } => "Reduced",
            Node::Order { .. } => "Order",
            Node::SingletonSet => "SingletonSet",
            Node::EmptySet => "EmptySet",
            Node::Update(kind) => match kind {
                UpdateKind::Add => "Add",
                UpdateKind::Copy => "Copy",
                UpdateKind::Move => "Move",
                UpdateKind::Load => "Load",
                UpdateKind::Clear => "Clear",
                UpdateKind::Create => "Create",
                UpdateKind::Drop => "Drop",
                UpdateKind::InsertData => "InsertData",
                UpdateKind::DeleteData => "DeleteData",
                UpdateKind::Modify => "Modify",
            },
            Node::Var(_) => "Var",
            Node::ValueConstant(_) => "ValueConstant",
            Node::Compare { .. } => "Compare",
            Node::MathExpr { .. } => "MathExpr",
            Node::Unary { .. } => "Unary",
            Node::And { .. } => "And",
            Node::Or { .. } => "Or",
            Node::Not { .. } => "Not",
            Node::Bound(_) => "Bound",
            Node::FunctionCall { .. } => "FunctionCall",
            Node::BuiltIn { .. } => "BuiltIn",
            Node::If { .. } => "If",
            Node::Coalesce { .. } => "Coalesce",
            Node::In { .. } => "In",
            Node::Exists { .. } => "Exists",
            Node::Aggregate { .. } => "Aggregate",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Slot {
    node: Node,
    parent: Option<NodeId>,
}

/// The arena holding all nodes of one query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryTree {
    slots: Vec<Slot>,
    root: Option<NodeId>,
}

impl QueryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node to the arena and makes it the parent of all of its children.
    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.slots.len());
        let children = node.children();
        self.slots.push(Slot { node, parent: None });
        for child in children {
            self.slots[child.0].parent = Some(id);
        }
        id
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.slots[root.0].parent = None;
        self.root = Some(root);
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.slots[id.0].node
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.slots[id.0].node
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).children()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Replaces the child `old` of `parent` with `new`.
    ///
    /// Returns `false` if `old` is not a child of `parent`.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> bool {
        if !self.slots[parent.0].node.replace_child_reference(old, new) {
            return false;
        }
        self.slots[old.0].parent = None;
        self.slots[new.0].parent = Some(parent);
        true
    }

    /// Puts `new` where `old` is, either below the parent of `old` or as the root.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) {
        match self.parent(old) {
            Some(parent) => {
                self.replace_child(parent, old, new);
            }
            None => {
                if self.root == Some(old) {
                    self.set_root(new);
                }
            }
        }
    }

    /// Inserts a new node between `target` and its parent. `make` receives `target` and must
    /// return a node that has `target` as a child.
    pub fn insert_above(&mut self, target: NodeId, make: impl FnOnce(NodeId) -> Node) -> NodeId {
        let parent = self.parent(target);
        let was_root = self.root == Some(target);
        let new = self.add(make(target));
        match parent {
            Some(parent) => {
                self.slots[parent.0].node.replace_child_reference(target, new);
                self.slots[new.0].parent = Some(parent);
            }
            None if was_root => self.set_root(new),
            None => {}
        }
        new
    }

    /// Appends an element to a [`Node::Group`]. Returns `false` if `group` is not a group.
    pub fn add_group_elem(&mut self, group: NodeId, elem: GroupElem) -> bool {
        let operator = elem.operator;
        match &mut self.slots[group.0].node {
            Node::Group { elems, .. } => elems.push(elem),
            _ => return false,
        }
        self.slots[operator.0].parent = Some(group);
        true
    }

    /// Appends a [`Node::ExtensionElem`] to a [`Node::Extension`]. Returns `false` if
    /// `extension` is not an extension.
    pub fn add_extension_elem(&mut self, extension: NodeId, elem: NodeId) -> bool {
        match &mut self.slots[extension.0].node {
            Node::Extension { elems, .. } => elems.push(elem),
            _ => return false,
        }
        self.slots[elem.0].parent = Some(extension);
        true
    }

    /// Returns whether `ancestor` is a strict ancestor of `node`.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Returns `id` and all of its descendants in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            result.push(current);
            let children = self.children(current);
            stack.extend(children.into_iter().rev());
        }
        result
    }

    /// Collects the variables referenced by a value expression, in order of appearance and
    /// without duplicates. Sub-patterns of `EXISTS` are not entered.
    pub fn expression_variables(&self, expr: NodeId) -> Vec<Variable> {
        let mut result: Vec<Variable> = Vec::new();
        let mut stack = vec![expr];
        while let Some(current) = stack.pop() {
            match self.node(current) {
                Node::Var(variable) | Node::Bound(variable) => {
                    if !result.contains(variable) {
                        result.push(variable.clone());
                    }
                }
                Node::Exists { .. } => {}
                node => stack.extend(node.children().into_iter().rev()),
            }
        }
        result
    }

    /// Returns the names bound by a group: its grouping variables followed by the names of its
    /// elements.
    pub fn group_binding_names(&self, group: NodeId) -> Vec<Variable> {
        match self.node(group) {
            Node::Group {
                variables, elems, ..
            } => variables
                .iter()
                .cloned()
                .chain(elems.iter().map(|e| e.name.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Adds a variable reference.
    pub fn var(&mut self, variable: Variable) -> NodeId {
        self.add(Node::Var(variable))
    }

    /// Adds a triple pattern without graph context.
    pub fn statement_pattern(
        &mut self,
        subject: impl Into<PatternTerm>,
        predicate: impl Into<PatternTerm>,
        object: impl Into<PatternTerm>,
    ) -> NodeId {
        self.add(Node::StatementPattern {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            context: None,
        })
    }
}
