//! Lightweight scanning of user-written SQL snippets (filters, metric expressions)

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "null", "true", "false", "like", "ilike", "between", "case", "when", "then",
    "else", "end", "as", "cast", "distinct", "interval", "date", "timestamp", "exists", "any", "all", "similar",
    "to", "escape", "day", "week", "month", "quarter", "year", "double", "int", "integer", "varchar", "float",
    "boolean", "numeric", "decimal", "string", "text", "bigint",
];

/// Byte ranges of the column-like identifiers in `sql`. Quoted strings, bind parameters
/// (`:name`), qualified parts (`t.col`), function names and keywords are skipped.
fn identifier_spans(sql: &str) -> Vec<(usize, usize)> {
    let bytes = sql.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'\'' || c == b'"' {
            let quote = c;
            i += 1;
            while i < bytes.len() {
                if bytes[i] == quote {
                    if i + 1 < bytes.len() && bytes[i + 1] == quote {
                        i += 2;
                        continue;
                    }
                    break;
                }
                i += 1;
            }
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.' || bytes[i] == b'_') {
                i += 1;
            }
            continue;
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let preceded = start > 0 && matches!(bytes[start - 1], b':' | b'.' | b'@' | b'$');
            let followed_by_dot = i < bytes.len() && bytes[i] == b'.';
            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            let is_call = j < bytes.len() && bytes[j] == b'(';
            let word = &sql[start..i];
            let is_keyword = KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word));
            if !preceded && !followed_by_dot && !is_call && !is_keyword {
                spans.push((start, i));
            }
            continue;
        }
        i += 1;
    }
    spans
}

/// Column-like identifiers of `sql`, in order of first appearance, without duplicates
pub fn sql_identifiers(sql: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for (start, end) in identifier_spans(sql) {
        let word = &sql[start..end];
        if !out.iter().any(|w| w == word) {
            out.push(word.to_string());
        }
    }
    out
}

/// Rewrite each identifier for which `replace` returns a new name
pub fn replace_identifiers(sql: &str, replace: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for (start, end) in identifier_spans(sql) {
        if let Some(replacement) = replace(&sql[start..end]) {
            out.push_str(&sql[last..start]);
            out.push_str(&replacement);
            last = end;
        }
    }
    out.push_str(&sql[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_skip_literals_and_keywords() {
        let ids = sql_identifiers("listing__country_latest = 'us' AND is_instant IS NOT NULL");
        assert_eq!(ids, vec!["listing__country_latest", "is_instant"]);
    }

    #[test]
    fn test_identifiers_skip_binds_and_functions() {
        let ids = sql_identifiers("LOWER(listing__country_latest) = :country AND t.col > 10.5");
        assert_eq!(ids, vec!["listing__country_latest"]);
    }

    #[test]
    fn test_escaped_quotes() {
        let ids = sql_identifiers("name = 'it''s here' OR other_name = \"quoted\"");
        assert_eq!(ids, vec!["name", "other_name"]);
    }

    #[test]
    fn test_replace_identifiers() {
        let sql = replace_identifiers("metric_time >= '2020-01-01' AND metric_time < x", |w| {
            (w == "metric_time").then(|| "metric_time__day".to_string())
        });
        assert_eq!(sql, "metric_time__day >= '2020-01-01' AND metric_time__day < x");
    }
}
