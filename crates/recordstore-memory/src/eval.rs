//! Predicate evaluation over in-memory rows.
//!
//! Evaluation follows SQL three-valued logic: `None` stands for UNKNOWN, and
//! a row passes a WHERE or ON clause only when its predicate is `Some(true)`.

use std::cmp::Ordering;
use std::collections::HashMap;

use regex::RegexBuilder;

use recordstore_core::{Error, Result, Value};
use recordstore_query::{ArrayOp, Column, CompareOp, Expr, JsonOp, OrderBy, SortOrder};

/// One stored row, keyed by column name.
pub(crate) type StoredRow = HashMap<String, Value>;

/// The rows visible to one evaluation, one entry per table alias. A `None`
/// row is the NULL side of a left join.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope<'a> {
    entries: Vec<(&'a str, Option<&'a StoredRow>)>,
}

impl<'a> Scope<'a> {
    pub(crate) fn root(alias: &'a str, row: &'a StoredRow) -> Self {
        Self {
            entries: vec![(alias, Some(row))],
        }
    }

    pub(crate) fn with(&self, alias: &'a str, row: Option<&'a StoredRow>) -> Self {
        let mut entries = self.entries.clone();
        entries.push((alias, row));
        Self { entries }
    }

    /// Value of `column`. Unqualified columns resolve against the root alias.
    pub(crate) fn lookup(&self, column: &Column) -> Result<Value> {
        let entry = match &column.table {
            None => self.entries.first(),
            Some(alias) => self.entries.iter().find(|(a, _)| a == alias),
        };
        let Some((_, row)) = entry else {
            return Err(Error::execution(format!(
                "unknown table alias in column {}",
                column.to_sql()
            )));
        };
        Ok(row
            .and_then(|r| r.get(&column.name))
            .cloned()
            .unwrap_or(Value::Null))
    }
}

/// Evaluate `expr` against `scope`.
pub(crate) fn eval(expr: &Expr, scope: &Scope<'_>) -> Result<Option<bool>> {
    Ok(match expr {
        Expr::Const(b) => Some(*b),
        Expr::Compare { column, op, value } => scope
            .lookup(column)?
            .compare(value)
            .map(|ordering| compare_holds(*op, ordering)),
        Expr::ColumnEq { left, right } => scope
            .lookup(left)?
            .compare(&scope.lookup(right)?)
            .map(Ordering::is_eq),
        Expr::Between { column, low, high } => {
            let value = scope.lookup(column)?;
            match (value.compare(low), value.compare(high)) {
                (Some(lo), Some(hi)) => Some(lo.is_ge() && hi.is_le()),
                _ => None,
            }
        }
        Expr::Like {
            column,
            pattern,
            case_insensitive,
            negated,
        } => match scope.lookup(column)? {
            Value::Null => None,
            Value::Text(text) => Some(like(&text, pattern, *case_insensitive)? != *negated),
            other => {
                return Err(Error::execution(format!(
                    "LIKE applied to {} column `{}`",
                    other.type_name(),
                    column.name
                )));
            }
        },
        Expr::InList {
            column,
            values,
            negated,
        } => in_list(&scope.lookup(column)?, values).map(|found| found != *negated),
        Expr::IsNull { column, negated } => Some(scope.lookup(column)?.is_null() != *negated),
        Expr::Array { column, op, values } => match scope.lookup(column)? {
            Value::Null => None,
            Value::Array(items) => Some(array_holds(*op, &items, values)),
            other => {
                return Err(Error::execution(format!(
                    "array operator applied to {} column `{}`",
                    other.type_name(),
                    column.name
                )));
            }
        },
        Expr::Json { column, op } => match scope.lookup(column)? {
            Value::Null => None,
            Value::Json(doc) => Some(json_holds(op, &doc)),
            other => {
                return Err(Error::execution(format!(
                    "JSON operator applied to {} column `{}`",
                    other.type_name(),
                    column.name
                )));
            }
        },
        Expr::And(children) => {
            let mut unknown = false;
            for child in children {
                match eval(child, scope)? {
                    Some(false) => return Ok(Some(false)),
                    None => unknown = true,
                    Some(true) => {}
                }
            }
            if unknown { None } else { Some(true) }
        }
        Expr::Or(children) => {
            let mut unknown = false;
            for child in children {
                match eval(child, scope)? {
                    Some(true) => return Ok(Some(true)),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            if unknown { None } else { Some(false) }
        }
        Expr::Not(inner) => eval(inner, scope)?.map(|b| !b),
    })
}

/// Whether `expr` holds, treating UNKNOWN as false.
pub(crate) fn holds(expr: Option<&Expr>, scope: &Scope<'_>) -> Result<bool> {
    match expr {
        None => Ok(true),
        Some(expr) => Ok(eval(expr, scope)? == Some(true)),
    }
}

fn compare_holds(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::Ne => ordering.is_ne(),
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Le => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Ge => ordering.is_ge(),
    }
}

fn in_list(value: &Value, candidates: &[Value]) -> Option<bool> {
    if candidates.is_empty() {
        return Some(false);
    }
    if value.is_null() {
        return None;
    }
    let mut unknown = false;
    for candidate in candidates {
        match value.compare(candidate) {
            Some(Ordering::Equal) => return Some(true),
            None if candidate.is_null() => unknown = true,
            _ => {}
        }
    }
    if unknown { None } else { Some(false) }
}

fn like(text: &str, pattern: &str, case_insensitive: bool) -> Result<bool> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    source.push('$');
    let re = RegexBuilder::new(&source)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| Error::execution_with(format!("invalid LIKE pattern `{pattern}`"), e))?;
    Ok(re.is_match(text))
}

fn array_holds(op: ArrayOp, items: &[Value], operand: &[Value]) -> bool {
    match op {
        ArrayOp::Contains => operand.iter().all(|v| items.contains(v)),
        ArrayOp::ContainedBy => items.iter().all(|v| operand.contains(v)),
        ArrayOp::Overlaps => operand.iter().any(|v| items.contains(v)),
    }
}

fn json_holds(op: &JsonOp, doc: &serde_json::Value) -> bool {
    let has = |key: &String| doc.as_object().is_some_and(|o| o.contains_key(key));
    match op {
        JsonOp::HasKey(key) => has(key),
        JsonOp::HasAnyKey(keys) => keys.iter().any(has),
        JsonOp::HasAllKeys(keys) => keys.iter().all(has),
        JsonOp::Contains(fragment) => json_contains(doc, fragment),
        JsonOp::PathExists(path) => json_path(doc, path).is_some(),
    }
}

/// Document containment: objects contain subsets of their entries, arrays
/// contain arrays whose every element is contained by some element.
pub(crate) fn json_contains(doc: &serde_json::Value, fragment: &serde_json::Value) -> bool {
    use serde_json::Value as Json;
    match (doc, fragment) {
        (Json::Object(d), Json::Object(f)) => f
            .iter()
            .all(|(k, fv)| d.get(k).is_some_and(|dv| json_contains(dv, fv))),
        (Json::Array(d), Json::Array(f)) => {
            f.iter().all(|fv| d.iter().any(|dv| json_contains(dv, fv)))
        }
        (Json::Array(d), scalar) if !scalar.is_object() => d.contains(scalar),
        (d, f) => d == f,
    }
}

fn json_path<'a>(doc: &'a serde_json::Value, path: &[String]) -> Option<&'a serde_json::Value> {
    path.iter().try_fold(doc, |node, step| match node {
        serde_json::Value::Object(map) => map.get(step),
        serde_json::Value::Array(items) => step.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Compare two scopes by ORDER BY terms. NULLs sort last in both
/// directions.
pub(crate) fn compare_rows(order_by: &[OrderBy], a: &Scope<'_>, b: &Scope<'_>) -> Result<Ordering> {
    for term in order_by {
        let left = a.lookup(&term.column)?;
        let right = b.lookup(&term.column)?;
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let natural = left.compare(&right).unwrap_or(Ordering::Equal);
                match term.order {
                    SortOrder::Asc => natural,
                    SortOrder::Desc => natural.reverse(),
                }
            }
        };
        if ordering.is_ne() {
            return Ok(ordering);
        }
    }
    Ok(Ordering::Equal)
}
