//! `parser` contains generated parsing routines for scan query text and tests on them.
//!
//! Lowering never needs to read query text back. The parser exists so that the identifier escaping
//! can be checked by round trip, and so that an in-memory store can find the table a query names.

use crate::schema::TableId;
use crate::sql_writer::{self, Dialect};

#[allow(unused_imports)]
use pest::Parser; // This needs to be in scope for the next statements to work.
#[derive(Parser)]
#[grammar = "scan_query.pest"]
pub struct ScanQueryParser;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Not a scan query: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),
    #[error("Bad identifier in scan query: {0}")]
    Identifier(#[from] sql_writer::Error),
    #[error("Table name has {0} parts; expected table or schema.table.")]
    TooManyNameParts(usize),
}

fn unquote(pair: pest::iterators::Pair<'_, Rule>) -> Result<String, Error> {
    let ident = pair.as_str();
    let inner = pair.into_inner().next();
    let s = match inner.as_ref().map(|p| p.as_rule()) {
        Some(Rule::double_quoted) => sql_writer::unquote_identifier(&Dialect::ansi(), ident)?,
        Some(Rule::back_quoted) => sql_writer::unquote_identifier(&Dialect::mysql(), ident)?,
        _ => ident.to_string(),
    };
    Ok(s)
}

/// parses `select * from [schema.]table` and returns the unescaped table id.
pub fn parse_scan_query(text: &str) -> Result<TableId, Error> {
    let query = ScanQueryParser::parse(Rule::scan_query, text)
        .map_err(Box::new)?
        .next()
        .ok_or_else(|| {
            Box::new(pest::error::Error::new_from_pos(
                pest::error::ErrorVariant::CustomError {
                    message: "empty parse".to_string(),
                },
                pest::Position::from_start(text),
            ))
        })?;
    let mut parts: Vec<String> = vec![];
    for p in query.into_inner() {
        if p.as_rule() == Rule::qualified_name {
            for ident in p.into_inner() {
                parts.push(unquote(ident)?);
            }
        }
    }
    match parts.len() {
        1 => Ok(TableId {
            schema: None,
            table: parts.remove(0),
        }),
        2 => {
            let table = parts.remove(1);
            Ok(TableId {
                schema: Some(parts.remove(0)),
                table,
            })
        }
        n => Err(Error::TooManyNameParts(n)),
    }
}

#[test]
fn test_parse_scan_queries() {
    let cases = vec![
        ("select * from t", TableId::new(None, "t")),
        ("SELECT * FROM foodmart.sales", TableId::new(Some("foodmart"), "sales")),
        ("select *\nfrom \"sales fact\"", TableId::new(None, "sales fact")),
        ("select * from \"select\".\"a\"\"b\"", TableId::new(Some("select"), "a\"b")),
        ("select * from `my db`.`x``y`", TableId::new(Some("my db"), "x`y")),
    ];
    for (input, expected) in cases {
        println!("Case: {}", input);
        assert_eq!(parse_scan_query(input).unwrap(), expected);
    }
}

#[test]
fn test_not_parse_invalid_scan_queries() {
    let cases = vec![
        "select a from t",
        "select * from",
        "select * from t where x = 1",
        "select * from \"unterminated",
        "delete from t",
        "select * from 1t",
    ];
    for case in cases {
        assert!(parse_scan_query(case).is_err(), "case {case}");
    }
    assert!(matches!(
        parse_scan_query("select * from a.b.c"),
        Err(Error::TooManyNameParts(3))
    ));
}
