//! `sql_writer` emits query text for a remote store, one token at a time.
//!
//! The writer only knows keywords, literal tokens and identifiers. Identifiers are quoted when they
//! would not survive unquoted: characters outside `[A-Za-z0-9_]`, a leading digit, a reserved word,
//! or (for dialects that fold unquoted names) any uppercase letter. An embedded quote character is
//! doubled.

use std::collections::HashSet;
use std::str::FromStr;

/// Options for the textual dialect of the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    pub name: &'static str,
    pub identifier_quote: char,
    pub uppercase_keywords: bool,
    /// quote identifiers containing uppercase letters, for stores that fold unquoted names to lower case.
    pub quote_mixed_case: bool,
}

impl Dialect {
    pub fn ansi() -> Dialect {
        Dialect {
            name: "ansi",
            identifier_quote: '"',
            uppercase_keywords: false,
            quote_mixed_case: false,
        }
    }

    pub fn postgres() -> Dialect {
        Dialect {
            name: "postgres",
            identifier_quote: '"',
            uppercase_keywords: false,
            quote_mixed_case: true,
        }
    }

    pub fn mysql() -> Dialect {
        Dialect {
            name: "mysql",
            identifier_quote: '`',
            uppercase_keywords: false,
            quote_mixed_case: false,
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::ansi()
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown dialect: {0}.")]
    UnknownDialect(String),
    #[error("Malformed quoted identifier: {0}")]
    MalformedIdentifier(String),
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ansi" | "" => Ok(Dialect::ansi()),
            "postgres" | "postgresql" => Ok(Dialect::postgres()),
            "mysql" => Ok(Dialect::mysql()),
            x => Err(Error::UnknownDialect(x.to_string())),
        }
    }
}

lazy_static::lazy_static! {
    /// SQL:2016 reserved words, plus `limit`.
    static ref RESERVED_WORDS: HashSet<&'static str> = [
        "abs", "acos", "all", "allocate", "alter", "and", "any", "are", "array", "array_agg",
        "array_max_cardinality", "as", "asensitive", "asin", "asymmetric", "at", "atan", "atomic",
        "authorization", "avg", "begin", "begin_frame", "begin_partition", "between", "bigint",
        "binary", "blob", "boolean", "both", "by", "call", "called", "cardinality", "cascaded",
        "case", "cast", "ceil", "ceiling", "char", "char_length", "character", "character_length",
        "check", "classifier", "clob", "close", "coalesce", "collate", "collect", "column",
        "commit", "condition", "connect", "constraint", "contains", "convert", "copy", "corr",
        "corresponding", "cos", "cosh", "count", "covar_pop", "covar_samp", "create", "cross",
        "cube", "cume_dist", "current", "current_catalog", "current_date",
        "current_default_transform_group", "current_path", "current_role", "current_row",
        "current_schema", "current_time", "current_timestamp", "current_transform_group_for_type",
        "current_user", "cursor", "cycle", "date", "day", "deallocate", "dec", "decimal",
        "decfloat", "declare", "default", "define", "delete", "dense_rank", "deref", "describe",
        "deterministic", "disconnect", "distinct", "double", "drop", "dynamic", "each", "element",
        "else", "empty", "end", "end_frame", "end_partition", "end-exec", "equals", "escape",
        "every", "except", "exec", "execute", "exists", "exp", "external", "extract", "false",
        "fetch", "filter", "first_value", "float", "floor", "for", "foreign", "frame_row", "free",
        "from", "full", "function", "fusion", "get", "global", "grant", "group", "grouping",
        "groups", "having", "hold", "hour", "identity", "in", "indicator", "initial", "inner",
        "inout", "insensitive", "insert", "int", "integer", "intersect", "intersection", "interval",
        "into", "is", "join", "json_array", "json_arrayagg", "json_exists", "json_object",
        "json_objectagg", "json_query", "json_table", "json_table_primitive", "json_value", "lag",
        "language", "large", "last_value", "lateral", "lead", "leading", "left", "like",
        "like_regex", "listagg", "ln", "local", "localtime", "localtimestamp", "log", "log10",
        "lower", "match", "match_number", "match_recognize", "matches", "max", "measures", "member",
        "merge", "method", "min", "minute", "mod", "modifies", "module", "month", "multiset",
        "national", "natural", "nchar", "nclob", "new", "no", "none", "normalize", "not",
        "nth_value", "ntile", "null", "nullif", "numeric", "occurrences_regex", "octet_length",
        "of", "offset", "old", "omit", "on", "one", "only", "open", "or", "order", "out", "outer",
        "over", "overlaps", "overlay", "parameter", "partition", "pattern", "per", "percent",
        "percent_rank", "percentile_cont", "percentile_disc", "period", "portion", "position",
        "position_regex", "power", "precedes", "precision", "prepare", "primary", "procedure",
        "ptf", "range", "rank", "reads", "real", "recursive", "ref", "references", "referencing",
        "regr_avgx", "regr_avgy", "regr_count", "regr_intercept", "regr_r2", "regr_slope",
        "regr_sxx", "regr_sxy", "regr_syy", "release", "result", "return", "returns", "revoke",
        "right", "rollback", "rollup", "row", "row_number", "rows", "running", "savepoint", "scope",
        "scroll", "search", "second", "seek", "select", "sensitive", "session_user", "set", "show",
        "similar", "sin", "sinh", "skip", "smallint", "some", "specific", "specifictype", "sql",
        "sqlexception", "sqlstate", "sqlwarning", "sqrt", "start", "static", "stddev_pop",
        "stddev_samp", "submultiset", "subset", "substring", "substring_regex", "succeeds", "sum",
        "symmetric", "system", "system_time", "system_user", "table", "tablesample", "tan", "tanh",
        "then", "time", "timestamp", "timezone_hour", "timezone_minute", "to", "trailing",
        "translate", "translate_regex", "translation", "treat", "trigger", "trim", "trim_array",
        "true", "truncate", "uescape", "union", "unique", "unknown", "unnest", "update", "upper",
        "user", "using", "value", "values", "value_of", "var_pop", "var_samp", "varbinary",
        "varchar", "varying", "versioning", "when", "whenever", "where", "width_bucket", "window",
        "with", "within", "without", "year", "limit",
    ]
    .into_iter()
    .collect();
}

pub fn is_reserved_word(s: &str) -> bool {
    RESERVED_WORDS.contains(s.to_lowercase().as_str())
}

pub fn needs_quoting(dialect: &Dialect, ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        None => return true,
        Some(c) if c.is_ascii_digit() => return true,
        _ => (),
    }
    if !ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return true;
    }
    if dialect.quote_mixed_case && ident.chars().any(|c| c.is_ascii_uppercase()) {
        return true;
    }
    is_reserved_word(ident)
}

pub fn quote_identifier(dialect: &Dialect, ident: &str) -> String {
    if !needs_quoting(dialect, ident) {
        return ident.to_string();
    }
    let q = dialect.identifier_quote;
    let doubled: String = [q, q].iter().collect();
    format!("{q}{}{q}", ident.replace(q, &doubled))
}

/// inverts `quote_identifier`: strips the quotes and undoubles embedded quote characters.
/// Unquoted identifiers are returned unchanged.
pub fn unquote_identifier(dialect: &Dialect, s: &str) -> Result<String, Error> {
    let q = dialect.identifier_quote;
    let inner = match s.strip_prefix(q) {
        None => return Ok(s.to_string()),
        Some(rest) => rest
            .strip_suffix(q)
            .ok_or_else(|| Error::MalformedIdentifier(s.to_string()))?,
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == q && chars.next() != Some(q) {
            return Err(Error::MalformedIdentifier(s.to_string()));
        }
        out.push(c);
    }
    Ok(out)
}

/// builds query text token by token, separating tokens with single spaces.
pub struct SqlWriter<'d> {
    dialect: &'d Dialect,
    buf: String,
}

impl<'d> SqlWriter<'d> {
    pub fn new(dialect: &'d Dialect) -> SqlWriter<'d> {
        SqlWriter {
            dialect,
            buf: String::new(),
        }
    }

    fn sep(&mut self) {
        if !self.buf.is_empty() {
            self.buf.push(' ');
        }
    }

    pub fn keyword(&mut self, kw: &str) {
        self.sep();
        if self.dialect.uppercase_keywords {
            self.buf.push_str(&kw.to_uppercase());
        } else {
            self.buf.push_str(&kw.to_lowercase());
        }
    }

    pub fn literal(&mut self, s: &str) {
        self.sep();
        self.buf.push_str(s);
    }

    /// writes a possibly qualified identifier, quoting each part as needed.
    pub fn identifier(&mut self, parts: &[&str]) {
        self.sep();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                self.buf.push('.');
            }
            self.buf.push_str(&quote_identifier(self.dialect, part));
        }
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

#[test]
fn test_quote_identifier() {
    let ansi = Dialect::ansi();
    let cases = vec![
        ("sales", "sales"),
        ("sales_1997", "sales_1997"),
        ("Sales", "Sales"),
        ("sales fact", "\"sales fact\""),
        ("select", "\"select\""),
        ("ORDER", "\"ORDER\""),
        ("1997", "\"1997\""),
        ("", "\"\""),
        ("a\"b", "\"a\"\"b\""),
        ("x;drop table y", "\"x;drop table y\""),
        ("check", "\"check\""),
        ("primary", "\"primary\""),
        ("grant", "\"grant\""),
        ("column", "\"column\""),
        ("Constraint", "\"Constraint\""),
        ("references", "\"references\""),
        ("unique", "\"unique\""),
        ("natural", "\"natural\""),
        ("window", "\"window\""),
        ("customer", "customer"),
    ];
    for (input, expected) in cases {
        assert_eq!(quote_identifier(&ansi, input), expected, "input {input:?}");
    }
    assert_eq!(quote_identifier(&Dialect::postgres(), "Sales"), "\"Sales\"");
    assert_eq!(quote_identifier(&Dialect::mysql(), "a`b c"), "`a``b c`");
}

#[test]
fn test_unquote_inverts_quote() {
    for d in [Dialect::ansi(), Dialect::postgres(), Dialect::mysql()] {
        for ident in ["sales", "sales fact", "select", "a\"b", "a`b", "", "Mixed Case", "9lives"] {
            let quoted = quote_identifier(&d, ident);
            assert_eq!(unquote_identifier(&d, &quoted), Ok(ident.to_string()));
        }
    }
}

#[test]
fn test_unquote_malformed() {
    let ansi = Dialect::ansi();
    assert!(unquote_identifier(&ansi, "\"abc").is_err());
    assert!(unquote_identifier(&ansi, "\"a\"b\"").is_err());
}

#[test]
fn test_writer() {
    let ansi = Dialect::ansi();
    let mut w = SqlWriter::new(&ansi);
    w.keyword("SELECT");
    w.literal("*");
    w.keyword("from");
    w.identifier(&["foodmart", "sales fact"]);
    assert_eq!(w.finish(), "select * from foodmart.\"sales fact\"");

    let upper = Dialect {
        uppercase_keywords: true,
        ..Dialect::ansi()
    };
    let mut w = SqlWriter::new(&upper);
    w.keyword("select");
    w.literal("*");
    w.keyword("from");
    w.identifier(&["t"]);
    assert_eq!(w.finish(), "SELECT * FROM t");
}

#[test]
fn test_parse_dialect() {
    assert_eq!(Dialect::from_str("MySQL"), Ok(Dialect::mysql()));
    assert_eq!(Dialect::from_str("postgresql"), Ok(Dialect::postgres()));
    assert_eq!(
        Dialect::from_str("oracle"),
        Err(Error::UnknownDialect("oracle".to_string()))
    );
}
