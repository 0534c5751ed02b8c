//! labels for rendered manifests
//!
//! Every rendered document with a `metadata` object gets two labels: who created it and when it was last
//! rendered.
//!
//! ```yaml
//! metadata:
//!   labels:
//!     nais.io/created-by: nais-yaml
//!     nais.io/touched-at: 20240131T120000
//! ```
use crate::value::{Tree, Value};
use crate::variables;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

#[derive(Debug, Clone)]
pub struct Labels {
    pub domain: String,
    pub created_by: String,
    pub touched_at: String,
}

impl Labels {
    pub fn new(touched_at: impl Into<String>) -> Self {
        Self {
            domain: "nais.io".to_string(),
            created_by: "nais-yaml".to_string(),
            touched_at: touched_at.into(),
        }
    }

    /// Labels stamped with the current local time
    pub fn now() -> Self {
        Self::new(chrono::Local::now().format(TIMESTAMP_FORMAT).to_string())
    }

    /// Inject the labels into one document
    ///
    /// Returns whether the document had a `metadata` object.
    pub fn inject(&self, document: &mut Tree) -> bool {
        let Some(metadata) = document.get_mut("metadata").and_then(Value::as_object_mut) else {
            return false;
        };

        let labels = metadata
            .entry("labels".to_string())
            .or_insert_with(|| Value::Object(Tree::new()));
        if !matches!(labels, Value::Object(_)) {
            *labels = Value::Object(Tree::new());
        }

        if let Value::Object(labels) = labels {
            labels.insert(
                format!("{}/created-by", self.domain),
                self.created_by.as_str().into(),
            );
            labels.insert(
                format!("{}/touched-at", self.domain),
                self.touched_at.as_str().into(),
            );
        }

        true
    }

    /// Inject the labels into every document of a rendered yaml stream
    pub fn inject_all(&self, rendered: &str) -> Result<String, LabelError> {
        let mut documents = variables::decode(rendered).map_err(LabelError::Decode)?;

        let mut out = Vec::with_capacity(documents.len());
        for document in documents.iter_mut() {
            if !self.inject(document) {
                tracing::debug!("document without metadata, no labels added");
            }
            out.push(serde_yaml::to_string(document).map_err(LabelError::Encode)?);
        }

        Ok(out.join("---\n"))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LabelError {
    #[error("rendered output is not valid yaml")]
    Decode(#[source] serde_yaml::Error),
    #[error("unable to encode labeled document")]
    Encode(#[source] serde_yaml::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn adds_labels_to_every_document() {
        let rendered = "\
kind: ConfigMap
metadata:
  name: one
---
kind: Secret
metadata:
  name: two
  labels:
    team: aura
";
        let labeled = Labels::new("20240131T120000").inject_all(rendered).unwrap();
        assert_eq!(
            labeled,
            "\
kind: ConfigMap
metadata:
  name: one
  labels:
    nais.io/created-by: nais-yaml
    nais.io/touched-at: 20240131T120000
---
kind: Secret
metadata:
  name: two
  labels:
    team: aura
    nais.io/created-by: nais-yaml
    nais.io/touched-at: 20240131T120000
"
        );
    }

    #[test]
    fn documents_without_metadata_are_unchanged() {
        let labeled = Labels::new("x").inject_all("kind: List\nitems: []\n").unwrap();
        assert_eq!(labeled, "kind: List\nitems: []\n");
    }

    #[test]
    fn non_object_labels_are_replaced() {
        let mut document = crate::variables!("metadata:\n  labels: broken").into_tree();
        assert!(Labels::new("t").inject(&mut document));
        assert_eq!(
            serde_yaml::to_string(&document).unwrap(),
            "metadata:\n  labels:\n    nais.io/created-by: nais-yaml\n    nais.io/touched-at: t\n"
        );
    }

    #[test]
    fn timestamp_format() {
        let labels = Labels::now();
        assert_eq!(labels.touched_at.len(), "20240131T120000".len());
        assert_eq!(labels.touched_at.as_bytes()[8], b'T');
    }
}
