use std::{cmp::Ordering, fmt};

/// A natively evaluated ordering comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Whether `value.cmp(operand) == ordering` satisfies the comparison.
    pub fn evaluate(&self, ordering: Ordering) -> bool {
        match self {
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Translates an ordering operator token (`$gt`, `gte`, ...) into a
/// comparator. Anything else is untranslatable and yields `None`.
pub fn translate(token: &str) -> Option<Comparator> {
    match token.strip_prefix('$').unwrap_or(token) {
        "gt" => Some(Comparator::Gt),
        "gte" => Some(Comparator::Gte),
        "lt" => Some(Comparator::Lt),
        "lte" => Some(Comparator::Lte),
        _ => None,
    }
}
