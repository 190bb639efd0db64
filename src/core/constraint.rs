use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Query operators a constraint may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Mod,
    In,
    Nin,
    Not,
    All,
    Or,
    Nor,
    And,
    Regex,
    Where,
    ElemMatch,
    Exists,
}

impl Operator {
    pub const ALL: [Operator; 18] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::Mod,
        Self::In,
        Self::Nin,
        Self::Not,
        Self::All,
        Self::Or,
        Self::Nor,
        Self::And,
        Self::Regex,
        Self::Where,
        Self::ElemMatch,
        Self::Exists,
    ];

    /// The wire token, including the `$` sigil.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::Mod => "$mod",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::Not => "$not",
            Self::All => "$all",
            Self::Or => "$or",
            Self::Nor => "$nor",
            Self::And => "$and",
            Self::Regex => "$regex",
            Self::Where => "$where",
            Self::ElemMatch => "$elemMatch",
            Self::Exists => "$exists",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == token)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-operator predicate over one value: `{ "$gte": "-21y" }`.
///
/// Held as the raw object so that malformed constraints survive parsing and
/// can be reported by validation or skipped by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Constraint(Map<String, Json>);

impl Constraint {
    pub fn new(operator: Operator, operand: impl Into<Json>) -> Self {
        let mut map = Map::new();
        map.insert(operator.as_str().to_owned(), operand.into());
        Self(map)
    }

    pub fn eq(operand: impl Into<Json>) -> Self {
        Self::new(Operator::Eq, operand)
    }

    pub fn from_map(map: Map<String, Json>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Json> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of operator keys present; well-formed constraints have one.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn operator_token(&self) -> Option<&str> {
        self.0.keys().next().map(String::as_str)
    }

    pub fn operator(&self) -> Option<Operator> {
        self.operator_token().and_then(Operator::from_token)
    }

    /// The operand of the first operator, ignoring `null`.
    pub fn operand(&self) -> Option<&Json> {
        self.0.values().next().filter(|value| !value.is_null())
    }
}
