//! Template rendering over JSON data

use minijinja::value::Value as TemplateValue;
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior};
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::TemplateResult;

/// Jinja2-compatible renderer for entry payloads
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create an engine; undefined variables render empty
    pub fn new() -> Self {
        Self::with_undefined(UndefinedBehavior::Lenient)
    }

    /// Create an engine that fails on undefined variables
    pub fn strict() -> Self {
        Self::with_undefined(UndefinedBehavior::Strict)
    }

    fn with_undefined(behavior: UndefinedBehavior) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(behavior);
        env.add_filter("to_json", to_json);
        env.add_filter("from_json", from_json);
        Self { env }
    }

    /// Check if a string contains template syntax
    pub fn is_template(template: &str) -> bool {
        template.contains("{{") || template.contains("{%")
    }

    /// Render one template string against `context`
    pub fn render(&self, template: &str, context: &Map<String, Value>) -> TemplateResult<String> {
        trace!(template, "Rendering template");
        let tmpl = self.env.template_from_str(template)?;
        Ok(tmpl.render(context)?)
    }

    /// Render every template string inside `value`
    ///
    /// Rendered strings that parse as JSON are replaced by the parsed value,
    /// so `"{{ brightness }}"` yields a number. Everything else is kept.
    ///
    /// Nested entries (see [`Self::is_nested_entry`]) are left untouched:
    /// they are rendered when the composite block runs them through the
    /// pipeline, against the metadata of that moment and under their own
    /// options.
    pub fn render_value(&self, value: &Value, context: &Map<String, Value>) -> TemplateResult<Value> {
        match value {
            Value::String(s) if Self::is_template(s) => {
                let rendered = self.render(s, context)?;
                Ok(serde_json::from_str(&rendered).unwrap_or(Value::String(rendered)))
            }
            Value::Object(obj) if Self::is_nested_entry(obj) => Ok(value.clone()),
            Value::Object(obj) => {
                let mut new_obj = Map::with_capacity(obj.len());
                for (k, v) in obj {
                    new_obj.insert(k.clone(), self.render_value(v, context)?);
                }
                Ok(Value::Object(new_obj))
            }
            Value::Array(arr) => arr
                .iter()
                .map(|v| self.render_value(v, context))
                .collect::<TemplateResult<Vec<_>>>()
                .map(Value::Array),
            _ => Ok(value.clone()),
        }
    }

    /// Whether `value` contains any template string outside nested entries
    pub fn contains_template(value: &Value) -> bool {
        match value {
            Value::String(s) => Self::is_template(s),
            Value::Object(obj) if Self::is_nested_entry(obj) => false,
            Value::Object(obj) => obj.values().any(Self::contains_template),
            Value::Array(arr) => arr.iter().any(Self::contains_template),
            _ => false,
        }
    }

    /// Whether `obj` has the shape of a phase entry
    ///
    /// That is a literal `type` tag and no keys besides `type`, `alias`,
    /// `data` and `options`, as in the entries `sequence`, `if`, `and` and
    /// friends carry in their data.
    pub fn is_nested_entry(obj: &Map<String, Value>) -> bool {
        let tagged = matches!(obj.get("type"), Some(Value::String(tag)) if !Self::is_template(tag));
        tagged
            && obj
                .keys()
                .all(|key| matches!(key.as_str(), "type" | "alias" | "data" | "options"))
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a value to a JSON string
fn to_json(value: TemplateValue) -> Result<String, Error> {
    serde_json::to_string(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("to_json failed: {}", e)))
}

/// Parse a JSON string into a value
fn from_json(value: &str) -> Result<TemplateValue, Error> {
    let parsed: Value = serde_json::from_str(value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("from_json failed: {}", e)))?;
    Ok(TemplateValue::from_serialize(&parsed))
}
