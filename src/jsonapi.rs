//! Hypermedia document model for release API responses.
//!
//! A `Document` holds the primary resource of one response body together with
//! the URL the body was fetched from, so relation-typed links can be turned
//! into dereferenceable URLs without the client hard-coding any paths.
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

/// Malformed or structurally incomplete response body.
#[derive(Debug, thiserror::Error)]
#[error("malformed resource document: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// An attribute was present but did not hold the JSON kind the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("attribute {name:?} is {found}, expected {expected}")]
pub struct AttributeTypeError {
    pub name: String,
    pub expected: &'static str,
    pub found: &'static str,
}

/// One navigation link advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    data: Resource,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    resource_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    attributes: Map<String, Value>,
    #[serde(default, deserialize_with = "deserialize_links")]
    links: Vec<Link>,
}

/// A decoded resource document. Immutable once decoded.
#[derive(Debug)]
pub struct Document {
    resource: Resource,
    base_url: Option<Url>,
}

/// Decode a `{ "data": { type, id, attributes, links } }` body.
///
/// The resource type is not checked here; callers compare it against the type
/// their workflow expects.
pub fn decode(bytes: &[u8], base_url: Option<Url>) -> Result<Document, DecodeError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    Ok(Document {
        resource: envelope.data,
        base_url,
    })
}

impl Document {
    pub fn resource_type(&self) -> &str {
        &self.resource.resource_type
    }

    /// Server-assigned identifier; empty until one is assigned.
    pub fn id(&self) -> &str {
        &self.resource.id
    }

    pub fn links(&self) -> &[Link] {
        &self.resource.links
    }

    /// Raw attribute lookup. Absence is not an error.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.resource.attributes.get(name)
    }

    /// Attribute lookup asserting a string value.
    pub fn attribute_str(&self, name: &str) -> Result<Option<&str>, AttributeTypeError> {
        match self.attribute(name) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(other) => Err(AttributeTypeError {
                name: name.to_string(),
                expected: "a string",
                found: json_kind(other),
            }),
        }
    }

    /// Resolve the link carrying `rel` to a URL.
    ///
    /// Absolute hrefs are returned unchanged. Relative hrefs are resolved
    /// against the document's base URL using RFC 3986 reference resolution.
    /// Returns `None` when no link carries the relation or its href is not a
    /// valid URL reference.
    ///
    /// The server does not promise unique relations. When several links share
    /// one, the first in wire order is used; callers should not depend on that.
    ///
    /// # Panics
    ///
    /// Panics if the href is relative and the document was decoded without a
    /// base URL. Every document fetched over HTTP carries its request URL.
    pub fn resolve_link(&self, rel: &str) -> Option<Url> {
        let link = self.resource.links.iter().find(|link| link.rel == rel)?;
        match Url::parse(&link.href) {
            Ok(url) => Some(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let Some(base) = self.base_url.as_ref() else {
                    panic!(
                        "relative link {:?} for relation {rel} has no base URL",
                        link.href
                    );
                };
                base.join(&link.href).ok()
            }
            Err(_) => None,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_links<'de, D>(deserializer: D) -> Result<Vec<Link>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| link_from_value(item, None))
            .collect::<Result<_, _>>()
            .map_err(de::Error::custom),
        Some(Value::Object(entries)) => entries
            .into_iter()
            .filter(|(_, item)| !item.is_null())
            .map(|(key, item)| link_from_value(item, Some(key)))
            .collect::<Result<_, _>>()
            .map_err(de::Error::custom),
        Some(other) => Err(de::Error::custom(format!(
            "links must be an array or an object, found {}",
            json_kind(&other)
        ))),
    }
}

// Keyed links may omit `rel` or be a bare href; the key then names the relation.
fn link_from_value(value: Value, key: Option<String>) -> Result<Link, String> {
    match value {
        Value::String(href) => {
            let rel = key.ok_or_else(|| format!("link {href:?} has no relation"))?;
            Ok(Link { rel, href })
        }
        Value::Object(mut fields) => {
            let href = match fields.remove("href") {
                Some(Value::String(href)) => href,
                Some(other) => return Err(format!("link href is {}", json_kind(&other))),
                None => return Err("link is missing href".to_string()),
            };
            let rel = match fields.remove("rel") {
                Some(Value::String(rel)) => rel,
                Some(other) => return Err(format!("link rel is {}", json_kind(&other))),
                None => key.ok_or_else(|| format!("link {href:?} has no relation"))?,
            };
            Ok(Link { rel, href })
        }
        other => Err(format!("link is {}", json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
