//! Path expressions over a [`Node`] tree.
//!
//! ```text
//! /..          root of the tree
//! /.           parent
//! /*           all children
//! /**          all descendants, document order
//! /#           node held in the value of each current node
//! /-  /+       previous / next sibling
//! /[1]  /[0,2] index filter over the current set
//! /@name       nearest ancestor-or-self named `name`
//! /=text       keep nodes whose value prints as `text`
//! /name        children named `name`
//! ?value       result kind: node (default), value, name or count
//! ```

use std::{collections::HashSet, fmt, str::FromStr};

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{all_consuming, eof, map, map_res, opt, peek, recognize, value},
    multi::many1,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use super::{Node, Value};
use crate::{LambdaError, LambdaResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Root,
    Parent,
    Children,
    Descendants,
    Reference,
    Previous,
    Next,
    Range(usize, usize),
    Ancestor(String),
    ValueIs(String),
    Named(String),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum MatchKind {
    #[default]
    Node,
    Value,
    Name,
    Count,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    steps: Vec<Step>,
    kind: MatchKind,
}

fn step_end(input: &str) -> IResult<&str, &str> {
    peek(alt((eof, recognize(char('/')), recognize(char('?')))))(input)
}

fn token<'a, O: Clone>(text: &'static str, step: O) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    value(step, terminated(tag(text), step_end))
}

fn is_text(c: char) -> bool {
    c != '/' && c != '?'
}

fn index(input: &str) -> IResult<&str, usize> {
    map_res(digit1, usize::from_str)(input)
}

fn range(input: &str) -> IResult<&str, Step> {
    map(
        terminated(
            delimited(char('['), pair(index, opt(preceded(char(','), index))), char(']')),
            step_end,
        ),
        |(from, to)| Step::Range(from, to.unwrap_or(from + 1)),
    )(input)
}

fn step(input: &str) -> IResult<&str, Step> {
    alt((
        token("..", Step::Root),
        token(".", Step::Parent),
        token("**", Step::Descendants),
        token("*", Step::Children),
        token("#", Step::Reference),
        token("-", Step::Previous),
        token("+", Step::Next),
        range,
        map(preceded(char('@'), take_while1(is_text)), |s: &str| {
            Step::Ancestor(s.to_string())
        }),
        map(preceded(char('='), take_while(is_text)), |s: &str| {
            Step::ValueIs(s.to_string())
        }),
        map(take_while1(is_text), |s: &str| Step::Named(s.to_string())),
    ))(input)
}

fn kind(input: &str) -> IResult<&str, MatchKind> {
    map_res(preceded(char('?'), take_while1(|c: char| c.is_alphabetic())), |s: &str| {
        MatchKind::from_str(s)
    })(input)
}

fn selector(input: &str) -> IResult<&str, (Vec<Step>, Option<MatchKind>)> {
    pair(many1(preceded(char('/'), step)), opt(kind))(input)
}

impl Selector {
    pub fn parse(source: &str) -> LambdaResult<Self> {
        let (_, (steps, kind)) = all_consuming(selector)(source)
            .map_err(|e| LambdaError::validation(format!("malformed selector '{}': {}", source, e)))?;
        Ok(Self {
            source: source.to_string(),
            steps,
            kind: kind.unwrap_or_default(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    /// Evaluates relative to `origin`, the node holding the selector.
    pub fn evaluate(&self, origin: &Node) -> SelectorMatch {
        let nodes = self
            .steps
            .iter()
            .fold(vec![origin.clone()], |current, step| apply(step, current));
        SelectorMatch {
            nodes,
            kind: self.kind,
        }
    }
}

fn apply(step: &Step, current: Vec<Node>) -> Vec<Node> {
    let next: Vec<Node> = match step {
        Step::Root => current.iter().map(Node::root).collect(),
        Step::Parent => current.iter().filter_map(Node::parent).collect(),
        Step::Children => current.iter().flat_map(Node::children).collect(),
        Step::Descendants => current.iter().flat_map(Node::descendants).collect(),
        Step::Reference => current
            .iter()
            .filter_map(|n| match n.value() {
                Some(Value::Node(target)) => Some(target),
                _ => None,
            })
            .collect(),
        Step::Previous => current.iter().filter_map(Node::previous_sibling).collect(),
        Step::Next => current.iter().filter_map(Node::next_sibling).collect(),
        Step::Range(from, to) => current
            .into_iter()
            .skip(*from)
            .take(to.saturating_sub(*from))
            .collect(),
        Step::Ancestor(name) => current
            .iter()
            .filter_map(|n| {
                let mut cursor = Some(n.clone());
                while let Some(node) = cursor {
                    if node.has_name(name) {
                        return Some(node);
                    }
                    cursor = node.parent();
                }
                None
            })
            .collect(),
        Step::ValueIs(text) => current
            .into_iter()
            .filter(|n| n.value().map(|v| v.to_string()).unwrap_or_default() == *text)
            .collect(),
        Step::Named(name) => current.iter().flat_map(|n| n.find_all(name)).collect(),
    };
    let mut seen = HashSet::new();
    next.into_iter().filter(|n| seen.insert(n.id())).collect()
}

/// Result of evaluating a [`Selector`].
#[derive(Debug, Clone)]
pub struct SelectorMatch {
    nodes: Vec<Node>,
    kind: MatchKind,
}

impl SelectorMatch {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    /// Number of items; a `count` match always holds exactly one.
    pub fn len(&self) -> usize {
        match self.kind {
            MatchKind::Count => 1,
            _ => self.nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> Vec<Option<Value>> {
        match self.kind {
            MatchKind::Node => self
                .nodes
                .iter()
                .map(|n| Some(Value::Node(n.clone())))
                .collect(),
            MatchKind::Value => self.nodes.iter().map(Node::value).collect(),
            MatchKind::Name => self
                .nodes
                .iter()
                .map(|n| Some(Value::String(n.name())))
                .collect(),
            MatchKind::Count => vec![Some(Value::Int(self.nodes.len() as i64))],
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Selector({})", self.source)
    }
}

impl FromStr for Selector {
    type Err = LambdaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}
