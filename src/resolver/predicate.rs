//! Predicate interpreter.
//!
//! Predicates are evaluated against a credential's JSON document. A field
//! path may select several values, and a field holding an array matches when
//! the array itself or any of its elements does.
//!
//! Ordering comparisons understand dates: RFC 3339 timestamps, `YYYY-MM-DD`
//! dates, `{ "day", "month", "year" }` objects, epoch milliseconds and offsets
//! from the current UTC date such as `-21y`, `+6m`, `-2w` or `-30d`.

use std::{cmp::Ordering, sync::OnceLock};

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use regex::Regex;
use serde_json::{Map, Value as Json};

use super::operator::{self, Comparator};
use crate::{
    core::{claim_path::ClaimPath, constraint::Operator},
    credential::Credential,
};

#[derive(Debug, Clone)]
pub enum Predicate {
    /// Field equals `value`, or contains it when the field is an array.
    Equals { path: ClaimPath, value: Json },
    Compare {
        path: ClaimPath,
        comparator: Comparator,
        operand: Json,
    },
    Exists { path: ClaimPath, exists: bool },
    Regex { path: ClaimPath, pattern: Regex },
    /// Any single-field operator constraint, `{ "$op": operand }`.
    Operator {
        path: ClaimPath,
        constraint: Map<String, Json>,
    },
    And(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn evaluate(&self, document: &Json) -> bool {
        match self {
            Self::Equals { path, value } => equals(&path.select(document), value),
            Self::Compare {
                path,
                comparator,
                operand,
            } => compares(&path.select(document), *comparator, operand),
            Self::Exists { path, exists } => path.exists_in(document) == *exists,
            Self::Regex { path, pattern } => regex_matches(&path.select(document), pattern),
            Self::Operator { path, constraint } => {
                constraint_holds(&path.select(document), constraint)
            }
            Self::And(predicates) => predicates.iter().all(|p| p.evaluate(document)),
            Self::Not(predicate) => !predicate.evaluate(document),
        }
    }
}

/// Candidates satisfying `predicate`, in input order.
pub fn filter<'a, I>(predicate: &Predicate, candidates: I) -> Vec<&'a Credential>
where
    I: IntoIterator<Item = &'a Credential>,
{
    candidates
        .into_iter()
        .filter(|candidate| predicate.evaluate(candidate.document()))
        .collect()
}

/// Candidates satisfying every predicate, in input order.
pub fn evaluate<'a>(predicates: &[Predicate], candidates: &'a [Credential]) -> Vec<&'a Credential> {
    candidates
        .iter()
        .filter(|candidate| predicates.iter().all(|p| p.evaluate(candidate.document())))
        .collect()
}

/// Holds when every operator in `constraint` holds for the selected values.
pub(crate) fn constraint_holds(values: &[&Json], constraint: &Map<String, Json>) -> bool {
    constraint.iter().all(|(token, operand)| match Operator::from_token(token) {
        Some(op) => operator_holds(values, op, operand),
        None => {
            tracing::warn!(operator = %token, "unknown operator never matches");
            false
        }
    })
}

fn operator_holds(values: &[&Json], op: Operator, operand: &Json) -> bool {
    match op {
        Operator::Eq => equals(values, operand),
        Operator::Ne => !equals(values, operand),
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            operator::translate(op.as_str())
                .is_some_and(|comparator| compares(values, comparator, operand))
        }
        Operator::In => operand
            .as_array()
            .is_some_and(|options| options.iter().any(|option| equals(values, option))),
        Operator::Nin => operand
            .as_array()
            .is_some_and(|options| !options.iter().any(|option| equals(values, option))),
        Operator::Mod => modulo(values, operand),
        Operator::Not => match operand {
            Json::Object(nested) => !constraint_holds(values, nested),
            Json::String(pattern) => {
                compile_regex(pattern).is_some_and(|re| !regex_matches(values, &re))
            }
            _ => false,
        },
        Operator::All => contains_all(values, operand),
        Operator::And => operand
            .as_array()
            .is_some_and(|subs| subs.iter().all(|sub| sub_holds(values, sub))),
        Operator::Or => operand
            .as_array()
            .is_some_and(|subs| subs.iter().any(|sub| sub_holds(values, sub))),
        Operator::Nor => operand
            .as_array()
            .is_some_and(|subs| !subs.iter().any(|sub| sub_holds(values, sub))),
        Operator::Regex => operand
            .as_str()
            .and_then(compile_regex)
            .is_some_and(|re| regex_matches(values, &re)),
        Operator::Where => {
            tracing::warn!("free predicates are not evaluated, `$where` never matches");
            false
        }
        Operator::ElemMatch => elem_match(values, operand),
        Operator::Exists => is_truthy(operand) == !values.is_empty(),
    }
}

/// The selected values followed by the elements of any selected array.
fn expand<'a>(values: &[&'a Json]) -> Vec<&'a Json> {
    let mut expanded = Vec::with_capacity(values.len());
    for value in values {
        expanded.push(*value);
        if let Json::Array(items) = *value {
            expanded.extend(items.iter());
        }
    }
    expanded
}

fn equals(values: &[&Json], expected: &Json) -> bool {
    if values.is_empty() {
        return expected.is_null();
    }
    expand(values).into_iter().any(|value| json_eq(value, expected))
}

/// Structural equality with numbers compared by value, so `1` equals `1.0`.
fn json_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64() == y.as_f64(),
        (Json::Array(x), Json::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| json_eq(x, y))
        }
        (Json::Object(x), Json::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, value)| y.get(key).is_some_and(|other| json_eq(value, other)))
        }
        _ => a == b,
    }
}

fn compares(values: &[&Json], comparator: Comparator, operand: &Json) -> bool {
    expand(values).into_iter().any(|value| {
        compare_values(value, operand).is_some_and(|ordering| comparator.evaluate(ordering))
    })
}

/// Orders `value` against `operand`; `None` when they are not comparable.
fn compare_values(value: &Json, operand: &Json) -> Option<Ordering> {
    match (value, operand) {
        (Json::Number(a), Json::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Json::Bool(a), Json::Bool(b)) => Some(a.cmp(b)),
        (Json::String(a), Json::String(b)) => {
            match (epoch_millis(value), epoch_millis(operand)) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => Some(a.cmp(b)),
            }
        }
        _ => Some(epoch_millis(value)?.cmp(&epoch_millis(operand)?)),
    }
}

/// Milliseconds since the epoch for anything that reads as a point in time.
pub(crate) fn epoch_millis(value: &Json) -> Option<i64> {
    match value {
        Json::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Json::String(s) => parse_timestamp(s),
        Json::Object(map) => date_object(map),
        _ => None,
    }
}

fn parse_timestamp(value: &str) -> Option<i64> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return midnight_millis(date);
    }
    relative_date(value, Utc::now().date_naive()).and_then(midnight_millis)
}

fn date_object(map: &Map<String, Json>) -> Option<i64> {
    let part = |name: &str| map.get(name).and_then(Json::as_i64);
    let year = i32::try_from(part("year")?).ok()?;
    let month = u32::try_from(part("month")?).ok()?;
    let day = u32::try_from(part("day")?).ok()?;
    midnight_millis(NaiveDate::from_ymd_opt(year, month, day)?)
}

fn midnight_millis(date: NaiveDate) -> Option<i64> {
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

/// Resolves an offset such as `-21y` against `today`.
pub(crate) fn relative_date(value: &str, today: NaiveDate) -> Option<NaiveDate> {
    static RELATIVE: OnceLock<Option<Regex>> = OnceLock::new();
    let relative = RELATIVE
        .get_or_init(|| Regex::new(r"^([+-]?)(\d+)([ymwd])$").ok())
        .as_ref()?;

    let captures = relative.captures(value)?;
    let amount: u32 = captures[2].parse().ok()?;
    let backwards = &captures[1] == "-";

    match &captures[3] {
        "y" => shift_months(today, amount.checked_mul(12)?, backwards),
        "m" => shift_months(today, amount, backwards),
        "w" => shift_days(today, u64::from(amount) * 7, backwards),
        "d" => shift_days(today, u64::from(amount), backwards),
        _ => None,
    }
}

fn shift_months(date: NaiveDate, months: u32, backwards: bool) -> Option<NaiveDate> {
    if backwards {
        date.checked_sub_months(Months::new(months))
    } else {
        date.checked_add_months(Months::new(months))
    }
}

fn shift_days(date: NaiveDate, days: u64, backwards: bool) -> Option<NaiveDate> {
    if backwards {
        date.checked_sub_days(Days::new(days))
    } else {
        date.checked_add_days(Days::new(days))
    }
}

fn modulo(values: &[&Json], operand: &Json) -> bool {
    let Some([divisor, remainder]) = operand.as_array().map(Vec::as_slice) else {
        return false;
    };
    let (Some(divisor), Some(remainder)) = (divisor.as_f64(), remainder.as_f64()) else {
        return false;
    };
    let divisor = divisor.trunc();
    if divisor == 0.0 {
        return false;
    }
    expand(values)
        .into_iter()
        .filter_map(Json::as_f64)
        .any(|value| value.trunc() % divisor == remainder)
}

fn contains_all(values: &[&Json], operand: &Json) -> bool {
    let Some(required) = operand.as_array().filter(|required| !required.is_empty()) else {
        return false;
    };
    values.iter().any(|value| {
        let elements: Vec<&Json> = match *value {
            Json::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        required
            .iter()
            .all(|needle| elements.iter().any(|element| json_eq(element, needle)))
    })
}

fn sub_holds(values: &[&Json], sub: &Json) -> bool {
    match sub {
        Json::Object(map) if is_operator_map(map) => constraint_holds(values, map),
        other => equals(values, other),
    }
}

fn elem_match(values: &[&Json], operand: &Json) -> bool {
    let Json::Object(query) = operand else {
        return false;
    };
    values
        .iter()
        .filter_map(|value| value.as_array())
        .flatten()
        .any(|element| element_matches(element, query))
}

fn element_matches(element: &Json, query: &Map<String, Json>) -> bool {
    if is_operator_map(query) {
        return constraint_holds(&[element], query);
    }
    query.iter().all(|(key, condition)| {
        let selected = ClaimPath::parse(key).select(element);
        match condition {
            Json::Object(map) if is_operator_map(map) => constraint_holds(&selected, map),
            other => equals(&selected, other),
        }
    })
}

fn is_operator_map(map: &Map<String, Json>) -> bool {
    !map.is_empty() && map.keys().all(|key| key.starts_with('$'))
}

fn regex_matches(values: &[&Json], pattern: &Regex) -> bool {
    expand(values)
        .into_iter()
        .filter_map(Json::as_str)
        .any(|value| pattern.is_match(value))
}

fn compile_regex(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .map_err(|error| tracing::warn!(pattern, %error, "invalid regular expression never matches"))
        .ok()
}

fn is_truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Json::String(s) => !s.is_empty(),
        _ => true,
    }
}
