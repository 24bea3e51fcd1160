//! `$ref` inlining
//!
//! Replaces every `{"$ref": "<file>#/<path>"}` marker with the content it
//! points at. Pointers naming a file are looked up in the fragment document
//! handed to the resolver; pointers with an empty file part (`#/...`) are
//! looked up in the document being resolved. Keys that sit next to `$ref` are
//! merged over the resolved target and win on collision.

use serde_json::{Map, Value};

use crate::error::{Result, ValidatorError};

/// Key marking a pointer reference
pub const REF_KEY: &str = "$ref";

/// Resolve all references in `node`, using `fragments` for file pointers
pub fn resolve(node: &Value, fragments: &Value) -> Result<Value> {
    ReferenceResolver::new(node, fragments).resolve()
}

/// True if any `$ref` key remains anywhere in `value`
pub fn contains_refs(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.contains_key(REF_KEY) || map.values().any(contains_refs),
        Value::Array(items) => items.iter().any(contains_refs),
        _ => false,
    }
}

/// One pointer currently being expanded
#[derive(Debug, Clone, PartialEq, Eq)]
struct RefFrame {
    local: bool,
    path: String,
    pointer: String,
}

/// Resolver bound to one root document and one fragment source
pub struct ReferenceResolver<'a> {
    root: &'a Value,
    fragments: &'a Value,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(root: &'a Value, fragments: &'a Value) -> Self {
        Self { root, fragments }
    }

    /// Resolve the whole root document
    pub fn resolve(&self) -> Result<Value> {
        let mut chain = Vec::new();
        self.resolve_node(self.root, &mut chain)
    }

    fn resolve_node(&self, node: &Value, chain: &mut Vec<RefFrame>) -> Result<Value> {
        match node {
            Value::Object(map) => match map.get(REF_KEY) {
                Some(pointer) => self.resolve_pointer(map, pointer, chain),
                None => {
                    let mut out = Map::with_capacity(map.len());
                    for (key, value) in map {
                        out.insert(key.clone(), self.resolve_node(value, chain)?);
                    }
                    Ok(Value::Object(out))
                }
            },
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_node(item, chain))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            scalar => Ok(scalar.clone()),
        }
    }

    fn resolve_pointer(
        &self,
        map: &Map<String, Value>,
        pointer: &Value,
        chain: &mut Vec<RefFrame>,
    ) -> Result<Value> {
        let pointer = pointer
            .as_str()
            .ok_or_else(|| ValidatorError::InvalidPointer(pointer.to_string()))?;
        let (file, path) = pointer
            .split_once('#')
            .ok_or_else(|| ValidatorError::InvalidPointer(pointer.to_string()))?;

        let frame = RefFrame {
            local: file.trim().is_empty(),
            path: path.trim().trim_matches('/').to_string(),
            pointer: pointer.to_string(),
        };

        if chain
            .iter()
            .any(|f| f.local == frame.local && f.path == frame.path)
        {
            let mut pointers: Vec<String> = chain.iter().map(|f| f.pointer.clone()).collect();
            pointers.push(frame.pointer.clone());
            return Err(ValidatorError::CyclicReference {
                pointer: frame.pointer,
                chain: pointers,
            });
        }

        let source = if frame.local { self.root } else { self.fragments };
        let target = lookup(source, &frame.path, pointer)?;

        chain.push(frame);
        let resolved = self.resolve_node(target, chain);
        chain.pop();
        let resolved = resolved?;

        let mut siblings = Map::new();
        for (key, value) in map.iter().filter(|(k, _)| k.as_str() != REF_KEY) {
            siblings.insert(key.clone(), self.resolve_node(value, chain)?);
        }

        Ok(match resolved {
            Value::Object(mut base) => {
                base.extend(siblings);
                Value::Object(base)
            }
            other if siblings.is_empty() => other,
            _ => Value::Object(siblings),
        })
    }
}

/// Walk a slash-delimited path through objects (by key) and arrays (by index)
fn lookup<'v>(source: &'v Value, path: &str, pointer: &str) -> Result<&'v Value> {
    if path.is_empty() {
        return Ok(source);
    }

    path.split('/').try_fold(source, |current, raw| {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        let next = match current {
            Value::Object(map) => map.get(&segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        next.ok_or_else(|| ValidatorError::MissingReference {
            pointer: pointer.to_string(),
            segment,
        })
    })
}
