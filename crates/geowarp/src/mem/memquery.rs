//! Minimal SQL support of the in-memory vector sources, real datasources evaluate filters and statements through OGR.

use crate::{
    Error, Result,
    vector::{Feature, FieldValue},
};

fn matches_literal(value: &FieldValue, literal: &Literal) -> bool {
    match (value, literal) {
        (FieldValue::String(value), Literal::String(lit)) => value == lit,
        (FieldValue::Integer(value), Literal::Number(lit)) => *value as f64 == *lit,
        (FieldValue::Real(value), Literal::Number(lit)) => value == lit,
        (FieldValue::String(value), Literal::Number(lit)) => value.parse::<f64>().is_ok_and(|v| v == *lit),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Comparison {
    field: String,
    equal: bool,
    value: Literal,
}

/// Attribute filter of the in-memory sources: comparisons (`=`, `<>`, `!=`) combined with `AND`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AttributeFilter {
    comparisons: Vec<Comparison>,
}

fn split_and(expr: &str) -> Vec<&str> {
    let upper = expr.to_ascii_uppercase();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut search = 0;
    while let Some(pos) = upper[search..].find(" AND ").map(|p| p + search) {
        search = pos + " AND ".len();
        if !inside_quotes(&expr[start..pos]) {
            parts.push(&expr[start..pos]);
            start = search;
        }
    }
    parts.push(&expr[start..]);
    parts
}

fn inside_quotes(prefix: &str) -> bool {
    prefix.chars().filter(|c| *c == '\'').count() % 2 == 1
}

fn parse_literal(text: &str) -> Result<Literal> {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Ok(Literal::String(inner.replace("''", "'")));
    }

    text.parse::<f64>()
        .map(Literal::Number)
        .map_err(|_| Error::Configuration(format!("Invalid literal in attribute filter: {text}")))
}

fn unquote_identifier(text: &str) -> String {
    let text = text.trim();
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
        .to_string()
}

impl AttributeFilter {
    pub fn parse(expr: &str) -> Result<Self> {
        let comparisons = split_and(expr)
            .into_iter()
            .map(|part| {
                let (field, equal, value) = if let Some((f, v)) = part.split_once("<>") {
                    (f, false, v)
                } else if let Some((f, v)) = part.split_once("!=") {
                    (f, false, v)
                } else if let Some((f, v)) = part.split_once('=') {
                    (f, true, v)
                } else {
                    return Err(Error::Configuration(format!("Unsupported attribute filter: {part}")));
                };

                Ok(Comparison {
                    field: unquote_identifier(field),
                    equal,
                    value: parse_literal(value)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AttributeFilter { comparisons })
    }

    /// Missing fields never match
    pub fn matches(&self, feature: &Feature) -> bool {
        self.comparisons.iter().all(|cmp| match feature.field(&cmp.field) {
            Some(value) => matches_literal(value, &cmp.value) == cmp.equal,
            None => false,
        })
    }
}

/// Query in the supported SQL subset: `SELECT * FROM <layer> [WHERE <filter>]`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SelectQuery {
    pub(crate) layer: String,
    pub(crate) filter: Option<AttributeFilter>,
}

impl SelectQuery {
    pub fn parse(sql: &str) -> Result<Self> {
        let unsupported = || Error::Configuration(format!("Unsupported SQL statement: {sql}"));
        let trimmed = sql.trim().trim_end_matches(';');
        let upper = trimmed.to_ascii_uppercase();

        const PREFIX: &str = "SELECT * FROM ";
        if !upper.starts_with(PREFIX) {
            return Err(unsupported());
        }

        let rest = &trimmed[PREFIX.len()..];
        let (layer, filter) = match rest.to_ascii_uppercase().find(" WHERE ") {
            Some(pos) => (&rest[..pos], Some(AttributeFilter::parse(&rest[pos + " WHERE ".len()..])?)),
            None => (rest, None),
        };

        let layer = unquote_identifier(layer);
        if layer.is_empty() || layer.contains(char::is_whitespace) {
            return Err(unsupported());
        }

        Ok(SelectQuery { layer, filter })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(fields: &[(&str, FieldValue)]) -> Feature {
        Feature {
            geometry: None,
            fields: fields.iter().map(|(n, v)| (n.to_string(), v.clone())).collect(),
        }
    }

    #[test]
    fn attribute_filter() -> Result<()> {
        let f = feature(&[("name", FieldValue::String("Gent".into())), ("id", FieldValue::Integer(3))]);

        assert!(AttributeFilter::parse("name = 'Gent'")?.matches(&f));
        assert!(AttributeFilter::parse("NAME = 'Gent' AND id = 3")?.matches(&f));
        assert!(!AttributeFilter::parse("name = 'Gent' and id <> 3")?.matches(&f));
        assert!(AttributeFilter::parse("\"id\" != 4")?.matches(&f));
        assert!(!AttributeFilter::parse("missing = 1")?.matches(&f));
        assert!(AttributeFilter::parse("id > 3").is_err());
        Ok(())
    }

    #[test]
    fn quoted_and_is_not_a_separator() -> Result<()> {
        let f = feature(&[("name", FieldValue::String("Salt AND Pepper".into()))]);
        assert!(AttributeFilter::parse("name = 'Salt AND Pepper'")?.matches(&f));
        Ok(())
    }

    #[test]
    fn select_query() -> Result<()> {
        let query = SelectQuery::parse("select * from regions where id = 2;")?;
        assert_eq!(query.layer, "regions");
        assert!(query.filter.is_some());

        assert_eq!(SelectQuery::parse("SELECT * FROM regions")?.filter, None);
        assert!(SelectQuery::parse("SELECT id FROM regions").is_err());
        Ok(())
    }
}
