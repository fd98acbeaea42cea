//! Statement template macro.
//!
//! `sql!` expands to an [`SqlTemplate`](crate::sql::SqlTemplate) builder
//! chain at compile time. String literals become literal SQL text; every other
//! argument becomes a value node and is escaped when the template is rendered.

/// Build an [`SqlTemplate`](crate::sql::SqlTemplate) from alternating literal
/// text and values.
///
/// # Example
///
/// ```ignore
/// let table = trx.identifier("generic")?;
/// let rows = trx
///     .sql(sql!("SELECT * FROM ", table, " WHERE _id = ", id))
///     .await?;
/// ```
///
/// A string that should be escaped as a value rather than spliced as text
/// must be passed as an expression, e.g. `("abc")` or a variable.
#[macro_export]
macro_rules! sql {
    (@acc $template:expr;) => {
        $template
    };
    (@acc $template:expr; $text:literal $(, $($rest:tt)*)?) => {
        $crate::sql!(@acc $crate::sql::template::append_literal($template, $text); $($($rest)*)?)
    };
    (@acc $template:expr; $value:expr $(, $($rest:tt)*)?) => {
        $crate::sql!(@acc $template.value($value); $($($rest)*)?)
    };
    ($($args:tt)*) => {
        $crate::sql!(@acc $crate::sql::SqlTemplate::empty(); $($args)*)
    };
}

#[cfg(test)]
mod tests {
    use crate::sql::escape::PgEscaper;
    use crate::sql::fragment::identifier;

    #[test]
    fn test_sql_macro_literal_and_values() {
        let table = identifier("table", &PgEscaper).unwrap();
        let statement = crate::sql!("SELECT * FROM ", table, " WHERE id = ", 5)
            .render(&PgEscaper)
            .unwrap();
        assert_eq!(statement, "SELECT * FROM \"table\" WHERE id = 5");
    }

    #[test]
    fn test_sql_macro_escapes_variables() {
        let name = "O'Brien";
        let statement = crate::sql!("SELECT ", name).render(&PgEscaper).unwrap();
        assert_eq!(statement, "SELECT 'O''Brien'");
    }

    #[test]
    fn test_sql_macro_parenthesized_string_is_value() {
        let statement = crate::sql!("SELECT ", ("abc")).render(&PgEscaper).unwrap();
        assert_eq!(statement, "SELECT 'abc'");
    }

    #[test]
    fn test_sql_macro_trailing_comma() {
        let statement = crate::sql!("SELECT 1",).render(&PgEscaper).unwrap();
        assert_eq!(statement, "SELECT 1");
    }

    #[test]
    fn test_sql_macro_empty() {
        assert!(crate::sql!().is_empty());
    }
}
