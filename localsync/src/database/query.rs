//! Predicate compilation
//!
//! Translates a facet [`Predicate`] into a parameterised SQL condition over
//! the `items` table. Tag membership is checked against the JSON tag array
//! with `json_each`, so a tag never matches as a substring of another tag.

use crate::collection::Predicate;

/// A SQL boolean expression with its positional bind values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlCondition {
    pub sql: String,
    pub binds: Vec<String>,
}

pub fn compile(predicate: &Predicate) -> SqlCondition {
    let mut condition = SqlCondition {
        sql: String::new(),
        binds: Vec::new(),
    };
    push_predicate(predicate, &mut condition);
    condition
}

fn push_predicate(predicate: &Predicate, out: &mut SqlCondition) {
    match predicate {
        Predicate::HasTag(tag) => {
            out.sql
                .push_str("EXISTS (SELECT 1 FROM json_each(items.tags_json) WHERE json_each.value = ?)");
            out.binds.push(tag.clone());
        }
        Predicate::InCategory(category) => {
            out.sql.push_str("items.category = ?");
            out.binds.push(category.clone());
        }
        Predicate::Not(inner) => {
            out.sql.push_str("NOT (");
            push_predicate(inner, out);
            out.sql.push(')');
        }
        Predicate::All(parts) => push_joined(parts, " AND ", "1", out),
        Predicate::Any(parts) => push_joined(parts, " OR ", "0", out),
    }
}

fn push_joined(parts: &[Predicate], separator: &str, empty: &str, out: &mut SqlCondition) {
    if parts.is_empty() {
        out.sql.push_str(empty);
        return;
    }

    out.sql.push('(');
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.sql.push_str(separator);
        }
        push_predicate(part, out);
    }
    out.sql.push(')');
}

/// `%text%` with LIKE wildcards escaped (use with `ESCAPE '\'`)
pub fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
