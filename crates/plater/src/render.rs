//! template rendering
//!
//! Templates are Go templates, executed by [gtmpl] against the decrypted variables of a cluster. Objects are
//! handed to the engine as structs rather than maps, so a reference to a key that does not exist is an error
//! instead of rendering `<no value>`.
use crate::value::{Tree, Value};
use std::collections::HashMap;

/// Renders templates against one variable tree
#[derive(Debug, Clone)]
pub struct Renderer {
    context: gtmpl_value::Value,
}

impl Renderer {
    pub fn new(variables: &Tree) -> Self {
        Self {
            context: object(variables),
        }
    }

    pub fn render(&self, template: &str) -> Result<String, RenderError> {
        gtmpl::template(template, self.context.clone())
            .map_err(|err| RenderError::Template(err.to_string()))
    }
}

fn object(tree: &Tree) -> gtmpl_value::Value {
    let fields: HashMap<String, gtmpl_value::Value> = tree
        .iter()
        .map(|(key, value)| (key.clone(), template_value(value)))
        .collect();
    gtmpl_value::Value::Object(fields)
}

fn template_value(value: &Value) -> gtmpl_value::Value {
    match value {
        Value::Null => gtmpl_value::Value::Nil,
        Value::Boolean(b) => gtmpl_value::Value::Bool(*b),
        Value::Integer(i) => gtmpl_value::Value::from(*i),
        Value::Decimal(f) => gtmpl_value::Value::from(*f),
        Value::String(s) => gtmpl_value::Value::String(s.clone()),
        Value::Array(values) => {
            gtmpl_value::Value::Array(values.iter().map(template_value).collect())
        }
        Value::Object(tree) => object(tree),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("unable to render template: {0}")]
    Template(String),
}
