//! Multi-document manifest handling

use kube::api::{DynamicObject, GroupVersionKind};

use crate::error::{Error, Result};

/// Split YAML text into documents
///
/// Documents are separated by lines that are exactly `---`. Blank lines and
/// lines beginning with `#` are dropped, as are documents left empty.
pub fn split_documents(yaml: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();

    for line in yaml.lines() {
        let line = line.trim_end_matches('\r');
        if line == "---" {
            if !current.is_empty() {
                documents.push(std::mem::take(&mut current));
            }
            continue;
        }

        // only column-zero comments, indented `#` may belong to a block scalar
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        current.push_str(line);
        current.push('\n');
    }

    if !current.is_empty() {
        documents.push(current);
    }

    documents
}

/// Decode one document into a generic object
///
/// `index` is the document's position in its manifest and only used to
/// name it in errors.
pub fn decode_document(document: &str, index: usize) -> Result<DynamicObject> {
    let object: DynamicObject = serde_yaml::from_str(document).map_err(|e| Error::Decode {
        index,
        reason: e.to_string(),
    })?;

    if object.types.is_none() {
        return Err(Error::Decode {
            index,
            reason: "missing apiVersion or kind".to_string(),
        });
    }

    if object.metadata.name.as_deref().unwrap_or_default().is_empty() {
        return Err(Error::Decode {
            index,
            reason: "missing metadata.name".to_string(),
        });
    }

    Ok(object)
}

/// Split and decode a whole manifest, documents in input order
///
/// A manifest without any document is an error, never a no-op.
pub fn parse_manifest(yaml: &str) -> Result<Vec<DynamicObject>> {
    let documents = split_documents(yaml);
    if documents.is_empty() {
        return Err(Error::EmptyManifest);
    }

    documents
        .iter()
        .enumerate()
        .map(|(index, doc)| decode_document(doc, index))
        .collect()
}

/// GroupVersionKind of a decoded object
pub fn object_gvk(object: &DynamicObject, index: usize) -> Result<GroupVersionKind> {
    let types = object.types.as_ref().ok_or_else(|| Error::Decode {
        index,
        reason: "missing apiVersion or kind".to_string(),
    })?;

    GroupVersionKind::try_from(types).map_err(|e| Error::Decode {
        index,
        reason: format!("invalid apiVersion {}: {e}", types.api_version),
    })
}
