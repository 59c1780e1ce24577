//! Schema-prefixing rewrite for SQL text.
//!
//! Unqualified references to a fixed set of tables are rewritten to `public.<name>`. This is a
//! text heuristic, not a parser: a listed name inside a string literal is rewritten too, and
//! aliased or otherwise qualified usages outside the pattern are left alone.
//!
//! A name at byte offset `s` is rewritten when all of these hold:
//! - the match is case-insensitive (ASCII folding only);
//! - the byte before `s` is not an ASCII word character `[A-Za-z0-9_]`;
//! - the seven bytes before `s` are not `public.` or `schema.` (any case);
//! - the name is followed by whitespace, `)`, `;`, `,` or the end of the text.
//!
//! ```rust
//! use pg_gateway::schema::prefix_public_schema;
//!
//! assert_eq!(
//!     prefix_public_schema("SELECT * FROM Orders WHERE id = $1"),
//!     "SELECT * FROM public.Orders WHERE id = $1"
//! );
//! assert_eq!(prefix_public_schema("SELECT * FROM public.orders"), "SELECT * FROM public.orders");
//! ```

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::GatewayError;

/// Tables rewritten by the default rule.
pub const PREFIXED_TABLES: [&str; 7] = [
    "tbl_users",
    "products",
    "product_variants",
    "cart_items",
    "orders",
    "order_items",
    "historical_sales",
];

pub const TARGET_SCHEMA: &str = "public";

const QUALIFIERS: [&[u8]; 2] = [b"public.", b"schema."];

static DEFAULT_REWRITER: LazyLock<SchemaRewriter> = LazyLock::new(SchemaRewriter::default);

/// Rewrite `sql` with the default table list.
///
/// Returns a borrowed `Cow` when nothing needed rewriting.
#[must_use]
pub fn prefix_public_schema(sql: &str) -> Cow<'_, str> {
    DEFAULT_REWRITER.rewrite(sql)
}

/// Compiled schema-prefixing rule for a list of table names.
#[derive(Debug, Clone)]
pub struct SchemaRewriter {
    tables: Vec<String>,
    // Locates candidate starts; boundary and qualifier checks happen in `match_at`.
    candidates: Option<Regex>,
}

impl Default for SchemaRewriter {
    fn default() -> Self {
        Self::for_tables(&PREFIXED_TABLES).expect("built-in table list is a valid pattern")
    }
}

impl SchemaRewriter {
    /// Build a rewriter for `tables`, tried in the given order at each position.
    ///
    /// # Errors
    /// Returns `GatewayError::ConfigError` if a name is empty or contains anything other than
    /// ASCII letters, digits and `_`.
    pub fn for_tables<S: AsRef<str>>(tables: &[S]) -> Result<Self, GatewayError> {
        let tables: Vec<String> = tables.iter().map(|t| t.as_ref().to_string()).collect();
        if let Some(bad) = tables
            .iter()
            .find(|t| t.is_empty() || !t.bytes().all(is_word_byte))
        {
            return Err(GatewayError::ConfigError(format!(
                "table name {bad:?} must be a non-empty ASCII identifier"
            )));
        }

        let candidates = if tables.is_empty() {
            None
        } else {
            let alternation = tables
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = Regex::new(&format!("(?i-u:{alternation})"))
                .map_err(|e| GatewayError::ConfigError(format!("table pattern: {e}")))?;
            Some(pattern)
        };

        Ok(Self { tables, candidates })
    }

    #[must_use]
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Rewrite every qualifying table reference in `sql` to `public.<name>`.
    #[must_use]
    pub fn rewrite<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        let Some(candidates) = &self.candidates else {
            return Cow::Borrowed(sql);
        };

        let mut out: Option<String> = None;
        let mut copied = 0;
        let mut pos = 0;

        while let Some(found) = candidates.find_at(sql, pos) {
            let start = found.start();
            match self.match_at(sql, start) {
                Some(end) => {
                    let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 32));
                    buf.push_str(&sql[copied..start]);
                    buf.push_str(TARGET_SCHEMA);
                    buf.push('.');
                    buf.push_str(&sql[start..end]);
                    copied = end;
                    pos = end;
                }
                // Candidates always start on an ASCII byte.
                None => pos = start + 1,
            }
            if pos >= sql.len() {
                break;
            }
        }

        match out {
            Some(mut buf) => {
                buf.push_str(&sql[copied..]);
                Cow::Owned(buf)
            }
            None => Cow::Borrowed(sql),
        }
    }

    /// End offset of the first table name that qualifies at `start`, if any.
    fn match_at(&self, sql: &str, start: usize) -> Option<usize> {
        let bytes = sql.as_bytes();

        if start > 0 && is_word_byte(bytes[start - 1]) {
            return None;
        }
        if start >= 7 {
            let before = &bytes[start - 7..start];
            if QUALIFIERS.iter().any(|q| before.eq_ignore_ascii_case(q)) {
                return None;
            }
        }

        self.tables.iter().find_map(|table| {
            let end = start + table.len();
            let name = bytes.get(start..end)?;
            (name.eq_ignore_ascii_case(table.as_bytes()) && is_terminator(&sql[end..]))
                .then_some(end)
        })
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_terminator(rest: &str) -> bool {
    match rest.chars().next() {
        None => true,
        Some(c) => matches!(c, ')' | ';' | ',') || is_js_whitespace(c),
    }
}

// Same set as `\s` in ECMAScript: differs from `char::is_whitespace` on U+0085 and U+FEFF.
fn is_js_whitespace(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n'
            | '\u{000B}'
            | '\u{000C}'
            | '\r'
            | ' '
            | '\u{00A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
            | '\u{FEFF}'
    )
}
