use crate::sparql::rewriting::AggregateLookup;
use rustc_hash::FxHashMap;
use sparql_federation_model::{Iri, NamedNode};

/// Separators of `GROUP_CONCAT` calls that stand for an aggregate service start with this.
const SERVICE_MARKER: &str = "urn:x-sparql-federation:aggregate-service:";

/// Clauses that may follow the `GROUP BY` clause of a query.
const AFTER_GROUP: [&str; 5] = ["HAVING", "ORDER", "LIMIT", "OFFSET", "VALUES"];

#[derive(Clone, Debug, PartialEq, Eq)]
enum TokenKind {
    /// The content of an IRI reference without the angle brackets.
    Iri(String),
    PrefixedName(String, String),
    Variable(String),
    Word(String),
    Punct(char),
    Literal,
}

#[derive(Clone, Debug)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

impl Token {
    fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(word))
    }

    fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }
}

/// Splits query text into the tokens needed to find clauses and function calls. Strings, IRIs
/// and comments are recognized so that their content is never mistaken for syntax.
struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn tokenize(text: &'a str) -> Vec<Token> {
        let mut lexer = Self { text, pos: 0 };
        let mut tokens = Vec::new();
        while let Some(c) = lexer.peek() {
            let start = lexer.pos;
            let kind = match c {
                c if c.is_whitespace() => {
                    lexer.bump();
                    continue;
                }
                '#' => {
                    lexer.eat_while(|c| c != '\n');
                    continue;
                }
                '"' | '\'' => {
                    lexer.string(c);
                    TokenKind::Literal
                }
                '<' => match lexer.iri() {
                    Some(iri) => TokenKind::Iri(iri),
                    None => {
                        lexer.bump();
                        TokenKind::Punct('<')
                    }
                },
                '?' | '$' => {
                    lexer.bump();
                    let name = lexer.eat_while(|c| c.is_alphanumeric() || c == '_');
                    if name.is_empty() {
                        TokenKind::Punct(c)
                    } else {
                        TokenKind::Variable(name.to_owned())
                    }
                }
                c if c.is_ascii_digit() => {
                    lexer.eat_name(|c| c.is_ascii_alphanumeric() || c == '.');
                    TokenKind::Literal
                }
                c if c.is_alphabetic() || c == '_' || c == ':' => lexer.name(),
                c => {
                    lexer.bump();
                    TokenKind::Punct(c)
                }
            };
            tokens.push(Token {
                kind,
                start,
                end: lexer.pos,
            });
        }
        tokens
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&predicate) {
            self.bump();
        }
        &self.text[start..self.pos]
    }

    /// Like [`Self::eat_while`], but a name never ends with a dot.
    fn eat_name(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        self.eat_while(predicate);
        while self.pos > start && self.text[..self.pos].ends_with('.') {
            self.pos -= 1;
        }
        &self.text[start..self.pos]
    }

    fn name(&mut self) -> TokenKind {
        let prefix = self.eat_name(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if self.peek() != Some(':') {
            return TokenKind::Word(prefix.to_owned());
        }
        self.bump();
        let local = self.eat_name(|c| {
            c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '%' | '\\')
        });
        TokenKind::PrefixedName(prefix.to_owned(), local.replace('\\', ""))
    }

    fn string(&mut self, quote: char) {
        let long = quote.to_string().repeat(3);
        if self.text[self.pos..].starts_with(&long) {
            self.pos += long.len();
            while !self.text[self.pos..].starts_with(&long) {
                match self.bump() {
                    Some('\\') => {
                        self.bump();
                    }
                    Some(_) => {}
                    None => return,
                }
            }
            self.pos += long.len();
        } else {
            self.bump();
            while let Some(c) = self.bump() {
                match c {
                    '\\' => {
                        self.bump();
                    }
                    '\n' => return,
                    c if c == quote => return,
                    _ => {}
                }
            }
        }
    }

    /// Reads an IRI reference. A `<` that does not start one is a comparison operator.
    fn iri(&mut self) -> Option<String> {
        let rest = &self.text[self.pos + 1..];
        let end = rest.find(|c: char| {
            c == '>' || c <= ' ' || matches!(c, '<' | '"' | '{' | '}' | '|' | '^' | '`')
        })?;
        if !rest[end..].starts_with('>') {
            return None;
        }
        let iri = rest[..end].to_owned();
        self.pos += end + 2;
        Some(iri)
    }
}

/// Query text prepared for parsing.
///
/// Custom aggregates have no syntax of their own, so calls to registered aggregate services in a
/// `SELECT` clause are written as `GROUP_CONCAT` with a reserved separator. [`Self::services`]
/// maps these separators back to the service IRIs.
#[derive(Clone, Debug)]
pub struct QueryText {
    text: String,
    services: FxHashMap<String, NamedNode>,
}

impl QueryText {
    pub fn new(
        query: &str,
        base_iri: Option<&str>,
        lookup: &(impl AggregateLookup + ?Sized),
    ) -> Self {
        let unchanged = Self {
            text: query.to_owned(),
            services: FxHashMap::default(),
        };
        if query.contains(SERVICE_MARKER) {
            return unchanged;
        }

        let tokens = Lexer::tokenize(query);
        let prefixes = Prefixes::read(&tokens, base_iri);
        let mut markers = FxHashMap::<NamedNode, String>::default();
        let mut edits = Vec::new();

        for (select, end) in select_clauses(&tokens) {
            let mut i = select;
            while i < end {
                let Some(iri) = prefixes.resolve(&tokens[i].kind) else {
                    i += 1;
                    continue;
                };
                let is_call = tokens.get(i + 1).is_some_and(|t| t.is_punct('('));
                if !is_call || !lookup.is_aggregate(iri.as_ref()) {
                    i += 1;
                    continue;
                }
                let Some(close) = single_argument_call(&tokens, i + 1) else {
                    i += 1;
                    continue;
                };
                let next = markers.len();
                let marker = markers
                    .entry(iri)
                    .or_insert_with(|| format!("{SERVICE_MARKER}{next}"));
                edits.push((tokens[i].start, tokens[i].end, "GROUP_CONCAT".to_owned()));
                let separator = format!(" ; SEPARATOR=\"{marker}\"");
                edits.push((tokens[close].start, tokens[close].start, separator));
                i = close + 1;
            }
        }
        if edits.is_empty() {
            return unchanged;
        }

        Self {
            text: apply_edits(query, edits),
            services: markers
                .into_iter()
                .map(|(iri, marker)| (marker, iri))
                .collect(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The service IRIs keyed by their `GROUP_CONCAT` separator.
    pub fn services(&self) -> &FxHashMap<String, NamedNode> {
        &self.services
    }

    /// Adds every variable of the outermost `SELECT` clause to its `GROUP BY` clause, creating
    /// the clause if needed. The parser then accepts ungrouped columns, which allows reporting
    /// them by name. Returns the new text and the number of added keys, which come last.
    pub fn with_relaxed_grouping(&self) -> Option<(String, usize)> {
        let tokens = Lexer::tokenize(&self.text);
        let (select, end) = select_clauses(&tokens).into_iter().next()?;

        let clause = &tokens[select..end];
        let mut variables: Vec<&str> = Vec::new();
        for (i, token) in clause.iter().enumerate() {
            if let TokenKind::Variable(name) = &token.kind {
                let is_alias = i > 0 && clause[i - 1].is_word("AS");
                if !is_alias && !variables.contains(&name.as_str()) {
                    variables.push(name);
                }
            }
        }
        if variables.is_empty() {
            return None;
        }
        let keys = variables
            .iter()
            .map(|v| format!("?{v}"))
            .collect::<Vec<_>>()
            .join(" ");

        let open = (end..tokens.len()).find(|i| tokens[*i].is_punct('{'))?;
        let close = matching(&tokens, open, '{', '}')?;
        let has_group = tokens.get(close + 1).is_some_and(|t| t.is_word("GROUP"))
            && tokens.get(close + 2).is_some_and(|t| t.is_word("BY"));

        let edit = if has_group {
            let mut depth = 0_usize;
            let position = tokens[close + 3..]
                .iter()
                .find(|t| {
                    match t.kind {
                        TokenKind::Punct('(') => depth += 1,
                        TokenKind::Punct(')') => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    depth == 0 && AFTER_GROUP.iter().any(|w| t.is_word(w))
                })
                .map_or(self.text.len(), |t| t.start);
            (position, position, format!(" {keys} "))
        } else {
            let position = tokens[close].end;
            (position, position, format!(" GROUP BY {keys} "))
        };
        Some((apply_edits(&self.text, vec![edit]), variables.len()))
    }
}

/// Prefix declarations and the base IRI of a query.
struct Prefixes {
    base: Option<Iri<String>>,
    prefixes: FxHashMap<String, String>,
}

impl Prefixes {
    fn read(tokens: &[Token], base_iri: Option<&str>) -> Self {
        let mut result = Self {
            base: base_iri.and_then(|iri| Iri::parse(iri.to_owned()).ok()),
            prefixes: FxHashMap::default(),
        };
        for (i, token) in tokens.iter().enumerate() {
            if token.is_word("BASE") {
                if let Some(TokenKind::Iri(iri)) = tokens.get(i + 1).map(|t| &t.kind) {
                    if let Some(base) = result.resolve_iri(iri) {
                        result.base = Iri::parse(base.into_string()).ok();
                    }
                }
            } else if token.is_word("PREFIX") {
                let name = tokens.get(i + 1).map(|t| &t.kind);
                let iri = tokens.get(i + 2).map(|t| &t.kind);
                if let (Some(TokenKind::PrefixedName(name, local)), Some(TokenKind::Iri(iri))) =
                    (name, iri)
                {
                    if local.is_empty() {
                        if let Some(iri) = result.resolve_iri(iri) {
                            result.prefixes.insert(name.clone(), iri.into_string());
                        }
                    }
                }
            }
        }
        result
    }

    fn resolve(&self, token: &TokenKind) -> Option<NamedNode> {
        match token {
            TokenKind::Iri(iri) => self.resolve_iri(iri),
            TokenKind::PrefixedName(prefix, local) => {
                NamedNode::new(format!("{}{local}", self.prefixes.get(prefix)?)).ok()
            }
            _ => None,
        }
    }

    fn resolve_iri(&self, iri: &str) -> Option<NamedNode> {
        match &self.base {
            Some(base) => base
                .resolve(iri)
                .ok()
                .map(|iri| NamedNode::new_unchecked(iri.into_inner())),
            None => NamedNode::new(iri).ok(),
        }
    }
}

/// The token ranges of all `SELECT` clauses, from the keyword to the start of the where clause.
fn select_clauses(tokens: &[Token]) -> Vec<(usize, usize)> {
    let mut result = Vec::new();
    for (select, token) in tokens.iter().enumerate() {
        if !token.is_word("SELECT") {
            continue;
        }
        let mut depth = 0_usize;
        let end = tokens[select..]
            .iter()
            .position(|t| {
                match t.kind {
                    TokenKind::Punct('(') => depth += 1,
                    TokenKind::Punct(')') => depth = depth.saturating_sub(1),
                    _ => {}
                }
                depth == 0 && (t.is_punct('{') || t.is_word("WHERE") || t.is_word("FROM"))
            })
            .map_or(tokens.len(), |offset| select + offset);
        result.push((select, end));
    }
    result
}

/// Returns the closing parenthesis of a call with exactly one argument.
fn single_argument_call(tokens: &[Token], open: usize) -> Option<usize> {
    let close = matching(tokens, open, '(', ')')?;
    let mut depth = 0_usize;
    let has_comma = tokens[open + 1..close].iter().any(|t| {
        match t.kind {
            TokenKind::Punct('(') => depth += 1,
            TokenKind::Punct(')') => depth = depth.saturating_sub(1),
            _ => {}
        }
        depth == 0 && t.is_punct(',')
    });
    (close > open + 1 && !has_comma).then_some(close)
}

fn matching(tokens: &[Token], open: usize, left: char, right: char) -> Option<usize> {
    let mut depth = 0_usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if token.is_punct(left) {
            depth += 1;
        } else if token.is_punct(right) {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn apply_edits(text: &str, mut edits: Vec<(usize, usize, String)>) -> String {
    let mut result = text.to_owned();
    edits.sort_by(|a, b| b.0.cmp(&a.0));
    for (start, end, replacement) in edits {
        result.replace_range(start..end, &replacement);
    }
    result
}
