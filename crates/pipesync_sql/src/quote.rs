//! Identifier escaping and value literal rendering.

use pipesync_batch::Cell;
use pipesync_types::Flavor;

/// Escapes an identifier for the backend, doubling embedded quote
/// characters.
pub fn quote_ident(flavor: Flavor, name: &str) -> String {
    let open = flavor.quote_open();
    let close = flavor.quote_close();
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push(open);
    for c in name.chars() {
        escaped.push(c);
        // "a""b" / `a``b` / [a]]b]
        if c == close {
            escaped.push(close);
        }
    }
    escaped.push(close);
    escaped
}

/// Escapes a table reference (currently a bare name; schemas are the
/// connector's concern).
pub fn table_ref(flavor: Flavor, table: &str) -> String {
    quote_ident(flavor, table)
}

/// Renders a cell as a SQL literal for the backend.
pub fn literal(flavor: Flavor, cell: &Cell) -> String {
    match cell {
        Cell::Null => "NULL".to_string(),
        Cell::Bool(b) => match flavor {
            Flavor::Mssql | Flavor::Oracle | Flavor::Sqlite => {
                if *b { "1" } else { "0" }.to_string()
            }
            _ => if *b { "TRUE" } else { "FALSE" }.to_string(),
        },
        Cell::Int(n) => n.to_string(),
        Cell::Float(x) => {
            if x.is_finite() {
                format!("{x:?}")
            } else {
                // NaN and infinities have no portable literal.
                "NULL".to_string()
            }
        }
        Cell::Numeric(d) => d.to_string(),
        Cell::Text(s) => text_literal(flavor, s),
        Cell::Datetime(dt) => {
            let formatted = dt.format("%Y-%m-%d %H:%M:%S%.f");
            match flavor {
                Flavor::Oracle => {
                    format!("TO_TIMESTAMP('{formatted}', 'YYYY-MM-DD HH24:MI:SS.FF')")
                }
                _ => format!("'{formatted}'"),
            }
        }
        Cell::DatetimeTz(dt) => {
            let formatted = dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f");
            match flavor {
                Flavor::Oracle => format!(
                    "TO_TIMESTAMP_TZ('{formatted} +00:00', 'YYYY-MM-DD HH24:MI:SS.FF TZH:TZM')"
                ),
                f if f.is_postgres_family() => format!("'{formatted}+00'"),
                _ => format!("'{formatted}'"),
            }
        }
        Cell::Json(v) => text_literal(flavor, &v.to_string()),
        Cell::Uuid(u) => format!("'{u}'"),
        Cell::Bytes(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
            match flavor {
                f if f.is_postgres_family() => format!("'\\x{hex}'"),
                Flavor::Mssql => format!("0x{hex}"),
                Flavor::Oracle => format!("HEXTORAW('{hex}')"),
                _ => format!("X'{hex}'"),
            }
        }
    }
}

fn text_literal(flavor: Flavor, s: &str) -> String {
    let escaped = s.replace('\'', "''");
    match flavor {
        // National-character literal keeps non-ASCII intact on MSSQL.
        Flavor::Mssql => format!("N'{escaped}'"),
        _ => format!("'{escaped}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ident_quoting_per_flavor() {
        assert_eq!(quote_ident(Flavor::Postgres, "col"), "\"col\"");
        assert_eq!(quote_ident(Flavor::Mysql, "col"), "`col`");
        assert_eq!(quote_ident(Flavor::Mssql, "col"), "[col]");
    }

    #[test]
    fn ident_quoting_doubles_embedded_quotes() {
        assert_eq!(quote_ident(Flavor::Postgres, "a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_ident(Flavor::Mysql, "a`b"), "`a``b`");
        assert_eq!(quote_ident(Flavor::Mssql, "a]b"), "[a]]b]");
    }

    #[test]
    fn text_literals_escape_quotes() {
        assert_eq!(
            literal(Flavor::Postgres, &Cell::Text("it's".into())),
            "'it''s'"
        );
        assert_eq!(literal(Flavor::Mssql, &Cell::Text("x".into())), "N'x'");
    }

    #[test]
    fn scalar_literals() {
        assert_eq!(literal(Flavor::Postgres, &Cell::Null), "NULL");
        assert_eq!(literal(Flavor::Postgres, &Cell::Int(5)), "5");
        assert_eq!(literal(Flavor::Postgres, &Cell::Bool(true)), "TRUE");
        assert_eq!(literal(Flavor::Mssql, &Cell::Bool(true)), "1");
        assert_eq!(literal(Flavor::Postgres, &Cell::Float(1.5)), "1.5");
        assert_eq!(
            literal(Flavor::Postgres, &Cell::Numeric("2.50".parse().unwrap())),
            "2.50"
        );
    }

    #[test]
    fn float_literal_preserves_precision() {
        // {:?} round-trips f64 exactly.
        assert_eq!(literal(Flavor::Postgres, &Cell::Float(0.1)), "0.1");
        assert_eq!(literal(Flavor::Postgres, &Cell::Float(f64::NAN)), "NULL");
    }

    #[test]
    fn datetime_literals() {
        let dt = chrono::NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(
            literal(Flavor::Postgres, &Cell::Datetime(dt)),
            "'2022-01-01 10:30:00'"
        );
        assert!(literal(Flavor::Oracle, &Cell::Datetime(dt)).starts_with("TO_TIMESTAMP("));
    }

    #[test]
    fn json_literal_is_escaped_text() {
        let cell = Cell::Json(json!({"note": "it's"}));
        assert_eq!(
            literal(Flavor::Postgres, &cell),
            r#"'{"note":"it''s"}'"#
        );
    }

    #[test]
    fn bytes_literals_per_flavor() {
        let cell = Cell::Bytes(vec![0xde, 0xad]);
        assert_eq!(literal(Flavor::Postgres, &cell), "'\\xdead'");
        assert_eq!(literal(Flavor::Mssql, &cell), "0xdead");
        assert_eq!(literal(Flavor::Mysql, &cell), "X'dead'");
        assert_eq!(literal(Flavor::Oracle, &cell), "HEXTORAW('dead')");
    }
}
