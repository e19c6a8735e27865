//! JSON-schema builder for tool inputs.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON Schema describing a tool's input object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub schema: Value,
}

impl ToolSchema {
    /// Wrap a raw JSON Schema value.
    pub fn from_value(schema: Value) -> Self {
        Self { schema }
    }

    /// A schema accepting an empty object.
    pub fn empty() -> Self {
        Self::object().build()
    }

    /// Start building an object schema.
    pub fn object() -> SchemaBuilder {
        SchemaBuilder {
            properties: Map::new(),
            required: Vec::new(),
        }
    }
}

/// Builder for object schemas.
pub struct SchemaBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl SchemaBuilder {
    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, json!({ "type": "string", "description": description.into() }), required)
    }

    pub fn integer(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, json!({ "type": "integer", "description": description.into() }), required)
    }

    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, json!({ "type": "boolean", "description": description.into() }), required)
    }

    pub fn string_enum(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[&str],
        required: bool,
    ) -> Self {
        self.property(
            name,
            json!({ "type": "string", "description": description.into(), "enum": values }),
            required,
        )
    }

    /// Array property whose items follow `items`.
    pub fn array(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        items: Value,
        required: bool,
    ) -> Self {
        self.property(
            name,
            json!({ "type": "array", "description": description.into(), "items": items }),
            required,
        )
    }

    /// Add a property with an arbitrary schema.
    pub fn property(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    pub fn build(self) -> ToolSchema {
        ToolSchema {
            schema: json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_tracks_required_properties() {
        let schema = ToolSchema::object()
            .string("path", "File path", true)
            .integer("limit", "Max lines", false)
            .build();
        assert_eq!(schema.schema["properties"]["path"]["type"], "string");
        assert_eq!(schema.schema["properties"]["limit"]["type"], "integer");
        assert_eq!(schema.schema["required"], json!(["path"]));
    }

    #[test]
    fn empty_schema_is_an_object() {
        let schema = ToolSchema::empty();
        assert_eq!(schema.schema["type"], "object");
        assert_eq!(schema.schema["properties"], json!({}));
    }
}
