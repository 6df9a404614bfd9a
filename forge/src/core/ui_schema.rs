//! D-HDC: deterministic three-layer validation of generated UI documents.
//!
//! Layer 1 checks the document skeleton and short-circuits on failure. Layer 2
//! checks every component's shape and closed type vocabulary. Layer 3 checks
//! each templated component's props against its required and allowed sets.
//! All errors from layers 2 and 3 accumulate so a single retry can fix them.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared props for one component type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentTemplate {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub allowed: Vec<String>,
}

/// Closed vocabulary of component types plus per-type prop templates.
///
/// Types listed without a template pass layer 3 unconditionally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentCatalog {
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub templates: Vec<ComponentTemplate>,
}

impl Default for ComponentCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ComponentCatalog {
    pub fn builtin() -> Self {
        let t = |name: &str, description: &str, keywords: &[&str], required: &[&str], allowed: &[&str]| {
            ComponentTemplate {
                type_name: name.to_string(),
                description: description.to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                required: required.iter().map(|p| p.to_string()).collect(),
                allowed: allowed.iter().map(|p| p.to_string()).collect(),
            }
        };
        Self {
            types: vec!["Divider".to_string(), "Spacer".to_string()],
            templates: vec![
                t(
                    "Button",
                    "Clickable action trigger",
                    &["button", "click", "submit", "action", "cta"],
                    &["label"],
                    &["label", "variant", "size", "disabled"],
                ),
                t(
                    "Text",
                    "Body copy or inline text",
                    &["text", "paragraph", "copy", "label", "description"],
                    &["content"],
                    &["content", "variant", "align"],
                ),
                t(
                    "Heading",
                    "Section or page title",
                    &["heading", "title", "header", "headline"],
                    &["content"],
                    &["content", "level", "align"],
                ),
                t(
                    "Input",
                    "Single-line text field",
                    &["input", "field", "form", "search", "email", "password"],
                    &[],
                    &["placeholder", "label", "type", "value", "disabled"],
                ),
                t(
                    "Image",
                    "Static image",
                    &["image", "photo", "picture", "logo", "avatar"],
                    &["src"],
                    &["src", "alt", "width", "height"],
                ),
                t(
                    "Card",
                    "Bordered content group",
                    &["card", "tile", "panel", "product", "profile"],
                    &[],
                    &["title", "body", "footer"],
                ),
                t(
                    "Container",
                    "Layout wrapper for child components",
                    &["container", "section", "row", "column", "layout", "wrapper"],
                    &[],
                    &["direction", "gap", "padding", "align"],
                ),
                t(
                    "List",
                    "Ordered or unordered list of items",
                    &["list", "items", "todo", "menu", "feed"],
                    &["items"],
                    &["items", "ordered"],
                ),
                t(
                    "Checkbox",
                    "Boolean toggle with a label",
                    &["checkbox", "toggle", "agree", "option", "done"],
                    &["label"],
                    &["label", "checked", "disabled"],
                ),
                t(
                    "Select",
                    "Dropdown choice",
                    &["select", "dropdown", "choose", "picker", "filter"],
                    &["options"],
                    &["options", "placeholder", "value", "label"],
                ),
            ],
        }
    }

    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Every allowed type name, sorted.
    pub fn allowed_types(&self) -> BTreeSet<&str> {
        self.types
            .iter()
            .map(String::as_str)
            .chain(self.templates.iter().map(|t| t.type_name.as_str()))
            .collect()
    }

    pub fn template(&self, type_name: &str) -> Option<&ComponentTemplate> {
        self.templates.iter().find(|t| t.type_name == type_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Structure,
    Semantic,
    Property,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Layer::Structure => "structure",
            Layer::Semantic => "semantic",
            Layer::Property => "property",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiError {
    pub layer: Layer,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiValidation {
    pub ok: bool,
    pub errors: Vec<UiError>,
    /// Corrective context for the next generation attempt; empty when ok.
    pub diagnostic: String,
}

/// Parse then validate. Malformed JSON is reported as a structure error.
pub fn validate_str(text: &str, catalog: &ComponentCatalog) -> UiValidation {
    match serde_json::from_str::<Value>(text) {
        Ok(doc) => validate(&doc, catalog),
        Err(err) => finish(
            vec![UiError {
                layer: Layer::Structure,
                message: format!("document is not valid JSON: {err}"),
            }],
            catalog,
        ),
    }
}

pub fn validate(doc: &Value, catalog: &ComponentCatalog) -> UiValidation {
    let mut errors = Vec::new();

    let Some(components) = check_structure(doc, &mut errors) else {
        return finish(errors, catalog);
    };

    let allowed = catalog.allowed_types();
    let mut seen_ids = HashSet::new();
    for (idx, component) in components.iter().enumerate() {
        check_component(idx, component, catalog, &allowed, &mut seen_ids, &mut errors);
    }

    finish(errors, catalog)
}

fn check_structure<'a>(doc: &'a Value, errors: &mut Vec<UiError>) -> Option<&'a Vec<Value>> {
    let structure = |message: String| UiError {
        layer: Layer::Structure,
        message,
    };
    let Some(object) = doc.as_object() else {
        errors.push(structure(format!(
            "document must be a JSON object, got {}",
            kind(doc)
        )));
        return None;
    };
    let components = match object.get("components") {
        Some(Value::Array(items)) => Some(items),
        Some(other) => {
            errors.push(structure(format!(
                "\"components\" must be an array, got {}",
                kind(other)
            )));
            None
        }
        None => {
            errors.push(structure("missing \"components\" array".to_string()));
            None
        }
    };
    match object.get("layout") {
        Some(Value::Object(_)) => {}
        Some(other) => errors.push(structure(format!(
            "\"layout\" must be an object, got {}",
            kind(other)
        ))),
        None => errors.push(structure("missing \"layout\" object".to_string())),
    }
    if errors.is_empty() { components } else { None }
}

fn check_component(
    idx: usize,
    component: &Value,
    catalog: &ComponentCatalog,
    allowed: &BTreeSet<&str>,
    seen_ids: &mut HashSet<String>,
    errors: &mut Vec<UiError>,
) {
    let semantic = |message: String| UiError {
        layer: Layer::Semantic,
        message,
    };
    let Some(object) = component.as_object() else {
        errors.push(semantic(format!(
            "components[{idx}] must be an object, got {}",
            kind(component)
        )));
        return;
    };

    let label = match object.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => {
            if !seen_ids.insert(id.clone()) {
                errors.push(semantic(format!("components[{idx}]: duplicate id {id:?}")));
            }
            format!("component {id:?}")
        }
        _ => {
            errors.push(semantic(format!(
                "components[{idx}]: \"id\" must be a non-empty string"
            )));
            format!("components[{idx}]")
        }
    };

    let type_name = match object.get("type") {
        Some(Value::String(type_name)) => {
            if allowed.contains(type_name.as_str()) {
                Some(type_name.as_str())
            } else {
                errors.push(semantic(format!(
                    "{label}: type {type_name:?} is not an allowed component type"
                )));
                None
            }
        }
        Some(other) => {
            errors.push(semantic(format!(
                "{label}: \"type\" must be a string, got {}",
                kind(other)
            )));
            None
        }
        None => {
            errors.push(semantic(format!("{label}: missing \"type\"")));
            None
        }
    };

    let props = match object.get("props") {
        Some(Value::Object(props)) => Some(props),
        Some(other) => {
            errors.push(semantic(format!(
                "{label}: \"props\" must be an object, got {}",
                kind(other)
            )));
            None
        }
        None => {
            errors.push(semantic(format!("{label}: missing \"props\" object")));
            None
        }
    };

    match object.get("position") {
        Some(Value::Object(position)) => {
            for axis in ["x", "y"] {
                if !position.get(axis).is_some_and(Value::is_number) {
                    errors.push(semantic(format!(
                        "{label}: position.{axis} must be a number"
                    )));
                }
            }
        }
        Some(other) => errors.push(semantic(format!(
            "{label}: \"position\" must be an object with numeric x and y, got {}",
            kind(other)
        ))),
        None => errors.push(semantic(format!(
            "{label}: missing \"position\" {{x, y}}"
        ))),
    }

    if let (Some(type_name), Some(props)) = (type_name, props)
        && let Some(template) = catalog.template(type_name)
    {
        for required in &template.required {
            if !props.contains_key(required) {
                errors.push(UiError {
                    layer: Layer::Property,
                    message: format!(
                        "{label}: missing required prop {required:?} for type {type_name:?}"
                    ),
                });
            }
        }
        for prop in props.keys() {
            if !template.allowed.iter().any(|allowed| allowed == prop) {
                errors.push(UiError {
                    layer: Layer::Property,
                    message: format!(
                        "{label}: prop {prop:?} is not allowed for type {type_name:?} (allowed: {})",
                        template.allowed.join(", ")
                    ),
                });
            }
        }
    }
}

fn finish(errors: Vec<UiError>, catalog: &ComponentCatalog) -> UiValidation {
    let diagnostic = if errors.is_empty() {
        String::new()
    } else {
        diagnostic(&errors, catalog)
    };
    UiValidation {
        ok: errors.is_empty(),
        errors,
        diagnostic,
    }
}

fn diagnostic(errors: &[UiError], catalog: &ComponentCatalog) -> String {
    let mut out = format!(
        "The UI document failed validation with {} error(s):\n",
        errors.len()
    );
    for (idx, error) in errors.iter().enumerate() {
        out.push_str(&format!("{}. [{}] {}\n", idx + 1, error.layer, error.message));
    }
    let types = catalog.allowed_types().into_iter().collect::<Vec<_>>();
    out.push_str(&format!("\nAllowed component types: {}\n", types.join(", ")));
    let props: BTreeMap<&str, String> = catalog
        .templates
        .iter()
        .map(|t| (t.type_name.as_str(), t.allowed.join(", ")))
        .collect();
    for (type_name, allowed) in props {
        out.push_str(&format!("- {type_name}: {allowed}\n"));
    }
    out.push_str(
        "\nReturn the complete corrected JSON document. Use only the allowed component types and props.\n",
    );
    out
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> ComponentCatalog {
        ComponentCatalog::builtin()
    }

    #[test]
    fn disallowed_prop_is_named_in_diagnostic() {
        let doc = r#"{"components":[{"id":"b1","type":"Button","props":{"label":"Go","color":"red"},"position":{"x":0,"y":0}}],"layout":{}}"#;
        let result = validate_str(doc, &catalog());
        assert!(!result.ok);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].layer, Layer::Property);
        assert!(result.diagnostic.contains("prop \"color\" is not allowed for type \"Button\""));
        assert!(result.diagnostic.starts_with("The UI document failed validation with 1 error(s):\n1. [property]"));
    }

    #[test]
    fn well_formed_document_passes() {
        let doc = json!({
            "components": [
                {"id": "h", "type": "Heading", "props": {"content": "Todos", "level": 1}, "position": {"x": 0, "y": 0}},
                {"id": "d", "type": "Divider", "props": {"anything": true}, "position": {"x": 0, "y": 1.5}},
                {"id": "l", "type": "List", "props": {"items": []}, "position": {"x": 0, "y": 2}}
            ],
            "layout": {"columns": 1}
        });
        let result = validate(&doc, &catalog());
        assert!(result.ok, "{:?}", result.errors);
        assert!(result.diagnostic.is_empty());
    }

    #[test]
    fn unknown_type_is_named() {
        let doc = json!({
            "components": [{"id": "s", "type": "Slider", "props": {}, "position": {"x": 0, "y": 0}}],
            "layout": {}
        });
        let result = validate(&doc, &catalog());
        assert!(!result.ok);
        assert!(result.errors[0].message.contains("\"Slider\""));
    }

    #[test]
    fn structure_failure_short_circuits() {
        let doc = json!({"components": [{"type": "Nope"}]});
        let result = validate(&doc, &catalog());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].layer, Layer::Structure);
        assert!(result.errors[0].message.contains("layout"));

        let result = validate_str("not json", &catalog());
        assert!(!result.ok);
        assert_eq!(result.errors[0].layer, Layer::Structure);
    }

    #[test]
    fn every_component_is_checked() {
        let doc = json!({
            "components": [
                {"id": "a", "type": "Button", "props": {}, "position": {"x": 0}},
                {"id": "a", "type": "Image", "props": {"src": "x.png"}, "position": {"x": 1, "y": "2"}},
                {"type": "Text", "props": [], "position": {"x": 0, "y": 0}}
            ],
            "layout": {}
        });
        let result = validate(&doc, &catalog());
        let messages: Vec<&str> = result.errors.iter().map(|e| e.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("position.y")));
        assert!(messages.iter().any(|m| m.contains("missing required prop \"label\"")));
        assert!(messages.iter().any(|m| m.contains("duplicate id \"a\"")));
        assert!(messages.iter().any(|m| m.contains("components[2]: \"id\"")));
        assert!(messages.iter().any(|m| m.contains("\"props\" must be an object")));
        assert_eq!(result.errors.len(), 6);
    }

    #[test]
    fn catalog_can_be_loaded_from_json() {
        let catalog = ComponentCatalog::from_json_str(
            r#"{"types":["Badge"],"templates":[{"type":"Chip","required":["text"],"allowed":["text"]}]}"#,
        )
        .expect("catalog");
        assert_eq!(catalog.allowed_types().into_iter().collect::<Vec<_>>(), vec!["Badge", "Chip"]);
        let doc = json!({
            "components": [{"id": "c", "type": "Button", "props": {"label": "x"}, "position": {"x": 0, "y": 0}}],
            "layout": {}
        });
        assert!(!validate(&doc, &catalog).ok);
    }
}
