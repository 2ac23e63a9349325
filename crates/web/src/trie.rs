//! Prefix tree over path segments, one per HTTP method.
//!
//! The tree is built while the router is assembled and never mutated after
//! the server starts, so lookups take `&self` and need no locking. Each
//! terminal node carries a `NodeId` that the router maps back to its handler
//! chain.

use std::fmt;

use regex::Regex;

use crate::RouterError;

/// Index of a terminal node, handed back by [`Trie::add`] and reported by
/// [`Trie::find`]. The router uses it to index its route table.
pub type NodeId = usize;

/// What one level of a pattern accepts.
///
/// Kinds are ordered by matching precedence: when several children of a node
/// accept the same segment, the one with the lowest-numbered kind wins.
enum SegmentKind {
    Literal(String),
    Int,
    Double,
    Str,
    Regex(Regex),
    Tail,
}

impl SegmentKind {
    fn precedence(&self) -> u8 {
        match self {
            SegmentKind::Literal(_) => 0,
            SegmentKind::Int => 1,
            SegmentKind::Double => 2,
            SegmentKind::Str => 3,
            SegmentKind::Regex(_) => 4,
            SegmentKind::Tail => 5,
        }
    }

    fn accepts(&self, segment: &str) -> bool {
        match self {
            SegmentKind::Literal(text) => text == segment,
            SegmentKind::Int => looks_like_int(segment),
            SegmentKind::Double => looks_like_double(segment),
            SegmentKind::Str => true,
            SegmentKind::Regex(re) => re.is_match(segment),
            SegmentKind::Tail => true,
        }
    }

    /// Typed segments capture their text; literals don't.
    fn captures(&self) -> bool {
        !matches!(self, SegmentKind::Literal(_))
    }

    /// Two pattern segments address the same child node.
    fn same_shape(&self, other: &SegmentKind) -> bool {
        match (self, other) {
            (SegmentKind::Literal(a), SegmentKind::Literal(b)) => a == b,
            (SegmentKind::Int, SegmentKind::Int) => true,
            (SegmentKind::Double, SegmentKind::Double) => true,
            (SegmentKind::Str, SegmentKind::Str) => true,
            (SegmentKind::Regex(a), SegmentKind::Regex(b)) => a.as_str() == b.as_str(),
            (SegmentKind::Tail, SegmentKind::Tail) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentKind::Literal(text) => write!(f, "Literal({text:?})"),
            SegmentKind::Int => write!(f, "Int"),
            SegmentKind::Double => write!(f, "Double"),
            SegmentKind::Str => write!(f, "Str"),
            SegmentKind::Regex(re) => write!(f, "Regex({:?})", re.as_str()),
            SegmentKind::Tail => write!(f, "Tail"),
        }
    }
}

fn looks_like_int(segment: &str) -> bool {
    let digits = segment.strip_prefix(['+', '-']).unwrap_or(segment);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn looks_like_double(segment: &str) -> bool {
    let digits = segment.strip_prefix(['+', '-']).unwrap_or(segment);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

/// Parses one pattern segment.
///
/// Accepted forms: a literal, `{int}`, `{double}`, `{str}`, `{re:PATTERN}`,
/// `{*rest}`. The typed forms take an optional `:name` suffix which is kept
/// only for the reader's benefit (`{int:user_id}` matches like `{int}`).
fn parse_segment(raw: &str) -> Result<SegmentKind, RouterError> {
    let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
        if raw.contains(['{', '}']) {
            return Err(RouterError::invalid_pattern(format!("unbalanced braces in segment `{raw}`")));
        }
        return Ok(SegmentKind::Literal(raw.to_owned()));
    };

    if let Some(pattern) = inner.strip_prefix("re:") {
        // anchored so the regex must cover the whole segment
        let re = Regex::new(&format!("^(?:{pattern})$"))?;
        return Ok(SegmentKind::Regex(re));
    }
    if inner.starts_with('*') {
        return Ok(SegmentKind::Tail);
    }

    let kind = inner.split_once(':').map_or(inner, |(kind, _name)| kind);
    match kind {
        "int" => Ok(SegmentKind::Int),
        "double" => Ok(SegmentKind::Double),
        "str" => Ok(SegmentKind::Str),
        other => Err(RouterError::invalid_pattern(format!("unknown segment kind `{{{other}}}`"))),
    }
}

struct Node {
    kind: SegmentKind,
    /// Indices into the arena, kept in registration order.
    children: Vec<usize>,
    /// Set once the node terminates a registered pattern.
    occupied: bool,
}

impl Node {
    fn new(kind: SegmentKind) -> Self {
        Self { kind, children: Vec::new(), occupied: false }
    }
}

/// A successful lookup: the terminal node plus everything the typed segments
/// captured along the way.
#[derive(Debug)]
pub struct Match {
    pub node: NodeId,
    pub params: Vec<String>,
    pub tail: Option<String>,
}

pub struct Trie {
    /// Arena of nodes; index 0 is the root, which matches the empty path.
    nodes: Vec<Node>,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    pub fn new() -> Self {
        Self { nodes: vec![Node::new(SegmentKind::Literal(String::new()))] }
    }

    /// Registers `pattern` and returns the id of its terminal node.
    ///
    /// Shared prefixes reuse existing nodes. Registering the same pattern
    /// twice, or registering anything beneath a `{*tail}` segment, is an
    /// error.
    pub fn add(&mut self, pattern: &str) -> Result<NodeId, RouterError> {
        let mut current = 0;
        for raw in pattern.split('/').filter(|s| !s.is_empty()) {
            if matches!(self.nodes[current].kind, SegmentKind::Tail) {
                return Err(RouterError::invalid_pattern(format!(
                    "`{pattern}`: segments after a tail wildcard are unreachable"
                )));
            }
            let kind = parse_segment(raw)?;
            current = self.child_for(current, kind);
        }

        if self.nodes[current].occupied {
            return Err(RouterError::conflicting_route(pattern));
        }
        self.nodes[current].occupied = true;
        Ok(current)
    }

    fn child_for(&mut self, parent: usize, kind: SegmentKind) -> usize {
        let existing = self.nodes[parent].children.iter().copied().find(|&c| self.nodes[c].kind.same_shape(&kind));
        match existing {
            Some(child) => child,
            None => {
                let child = self.nodes.len();
                self.nodes.push(Node::new(kind));
                self.nodes[parent].children.push(child);
                child
            }
        }
    }

    /// Walks `path` segment by segment. At each level the accepting child
    /// with the highest precedence wins, with no backtracking; a level where
    /// no child accepts is a miss.
    pub fn find(&self, path: &str) -> Option<Match> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut current = 0;
        let mut params = Vec::new();

        for (at, segment) in segments.iter().enumerate() {
            let next = self.pick_child(current, segment)?;
            let node = &self.nodes[next];
            if matches!(node.kind, SegmentKind::Tail) {
                let tail = segments[at..].join("/");
                return node.occupied.then(|| Match { node: next, params, tail: Some(tail) });
            }
            if node.kind.captures() {
                params.push((*segment).to_owned());
            }
            current = next;
        }

        self.nodes[current].occupied.then_some(Match { node: current, params, tail: None })
    }

    fn pick_child(&self, parent: usize, segment: &str) -> Option<usize> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .filter(|&c| self.nodes[c].kind.accepts(segment))
            .min_by_key(|&c| self.nodes[c].kind.precedence())
    }
}

impl fmt::Debug for Trie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trie").field("nodes", &self.nodes.len()).finish()
    }
}
