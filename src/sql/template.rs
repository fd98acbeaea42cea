//! Template-driven statement composition.
//!
//! A [`SqlTemplate`] is an ordered list of literal text and value nodes.
//! Literal text is restricted to `&'static str`, so a string computed at
//! runtime can only reach the statement as an escaped value or through an
//! explicit [`RawSql`](crate::sql::RawSql). Rendering is a single pass:
//! text nodes are copied, value nodes go through [`escape_value`].

use crate::error::{AppError, AppResult};
use crate::sql::escape::{Escaper, SqlValue, escape_value};

/// One piece of a statement template.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(&'static str),
    Value(SqlValue),
}

/// A SQL statement built from alternating literal text and values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlTemplate {
    nodes: Vec<Node>,
}

impl SqlTemplate {
    /// Start a template with a leading literal segment.
    pub fn new(text: &'static str) -> Self {
        Self::empty().text(text)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from template-literal shaped input: `parts.len()` must be exactly
    /// one more than `values.len()`.
    pub fn from_parts(parts: &[&'static str], values: Vec<SqlValue>) -> AppResult<Self> {
        if parts.len() != values.len() + 1 {
            return Err(AppError::invalid_input(format!(
                "template has {} text segments for {} values",
                parts.len(),
                values.len()
            )));
        }

        let mut template = Self::empty();
        let mut values = values.into_iter();
        for part in parts {
            template.push_text(part);
            if let Some(value) = values.next() {
                template.push_value(value);
            }
        }
        Ok(template)
    }

    /// Append literal SQL text.
    pub fn text(mut self, text: &'static str) -> Self {
        self.push_text(text);
        self
    }

    /// Append a value that will be escaped at render time.
    pub fn value(mut self, value: impl Into<SqlValue>) -> Self {
        self.push_value(value);
        self
    }

    pub fn push_text(&mut self, text: &'static str) {
        if !text.is_empty() {
            self.nodes.push(Node::Text(text));
        }
    }

    pub fn push_value(&mut self, value: impl Into<SqlValue>) {
        self.nodes.push(Node::Value(value.into()));
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Concatenate the template into statement text.
    pub fn render<E: Escaper + ?Sized>(&self, escaper: &E) -> AppResult<String> {
        let mut statement = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => statement.push_str(text),
                Node::Value(value) => {
                    let escaped = escape_value(value, escaper)?;
                    // `x -` followed by `-1` would otherwise start a line comment
                    if statement.ends_with('-') && escaped.starts_with('-') {
                        statement.push(' ');
                    }
                    statement.push_str(&escaped);
                }
            }
        }
        Ok(statement)
    }
}

/// Statement text produced from string literals in the [`sql!`](crate::sql!)
/// macro versus scalar literals, which are values.
#[doc(hidden)]
pub trait TemplateLiteral {
    fn append_to(self, template: SqlTemplate) -> SqlTemplate;
}

impl TemplateLiteral for &'static str {
    fn append_to(self, template: SqlTemplate) -> SqlTemplate {
        template.text(self)
    }
}

macro_rules! impl_value_literal {
    ($($t:ty),+) => {
        $(
            impl TemplateLiteral for $t {
                fn append_to(self, template: SqlTemplate) -> SqlTemplate {
                    template.value(self)
                }
            }
        )+
    };
}

impl_value_literal!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool);

#[doc(hidden)]
pub fn append_literal<L: TemplateLiteral>(template: SqlTemplate, literal: L) -> SqlTemplate {
    literal.append_to(template)
}
