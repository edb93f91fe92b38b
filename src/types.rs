use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Catalog product as returned by the API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub nombre: String,
    pub precio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categoria: Option<String>,
    /// Fields this crate does not model, kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Payload for creating a product.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewProduct {
    pub nombre: String,
    pub precio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categoria: Option<String>,
}

impl NewProduct {
    pub fn new(nombre: impl Into<String>, precio: f64) -> Self {
        Self {
            nombre: nombre.into(),
            precio,
            categoria: None,
        }
    }

    pub fn with_categoria(mut self, categoria: impl Into<String>) -> Self {
        self.categoria = Some(categoria.into());
        self
    }
}

/// Reason and suggested remediation attached to a 409 response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictDetails {
    pub message: String,
    pub action: Option<String>,
}

impl ConflictDetails {
    pub(crate) fn from_payload(message: &str, payload: Option<&JsonValue>) -> Self {
        let field = |name: &str| {
            payload
                .and_then(|value| value.get(name))
                .and_then(JsonValue::as_str)
                .map(str::to_owned)
        };
        Self {
            message: field("message").unwrap_or_else(|| message.to_owned()),
            action: field("action"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The server refused because dependent data still exists.
    Blocked(ConflictDetails),
}
