//! layered variable files
//!
//! [Variables] loads yaml documents in order and deep-merges them into one [Tree]. Later documents override
//! earlier ones key by key:
//!
//! - both values are objects: merge recursively
//! - neither value is an object: the later value replaces the earlier one
//! - only one of them is an object: error ([MergeError::Conflict])
//!
//! A file may contain several documents (separated by `---`), they are merged in the same way.
//!
//! The source paths are kept so errors can point to the offending file.
use crate::value::{Tree, Value};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the file holding variables shared by all clusters
pub const GLOBAL_FILE: &str = "vars.yaml";

/// Extension of variable files
pub const EXTENSION: &str = "yaml";

pub type Source = Option<PathBuf>;

#[derive(Default, Debug)]
pub struct Variables {
    sources: Vec<Source>,
    tree: Tree,
}

impl Variables {
    /// Decodes all documents of `contents` and merges them over the current variables
    pub fn load_str(&mut self, contents: &str, path: impl Into<Source>) -> Result<(), LoadError> {
        let path = path.into();
        let file = source_name(&path);

        let documents = decode(contents).map_err(|source| LoadError::Decode {
            file: file.clone(),
            source,
        })?;

        for document in documents {
            merge_trees(&mut self.tree, document).map_err(|source| LoadError::Merge {
                file: file.clone(),
                source,
            })?;
        }

        self.sources.push(path);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        let file_path = file_path.canonicalize().map_err(|source| LoadError::Io {
            path: file_path.to_owned(),
            source,
        })?;
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(&file_path).map_err(|source| LoadError::Io {
            path: file_path.clone(),
            source,
        })?;

        self.load_str(&file_contents, file_path)
    }

    /// Loads and merges the given files in order
    pub fn load_files<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Self, LoadError> {
        let mut variables = Self::default();
        for path in paths {
            variables.load_file(path.as_ref())?;
        }
        Ok(variables)
    }

    /// Global variables (`vars.yaml`) overridden by the variables of `cluster` (`<cluster>.yaml`)
    pub fn for_cluster(directory: &Path, cluster: &str) -> Result<Self, LoadError> {
        let global = directory.join(GLOBAL_FILE);
        let local = directory.join(format!("{cluster}.{EXTENSION}"));

        tracing::debug!(path=%global.display(), "using global variables");
        tracing::debug!(path=%local.display(), "using cluster-override variables");

        Self::load_files([global, local])
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

/// Names of all clusters with a variable file in `directory`, sorted
///
/// Every `*.yaml` file except the global one names a cluster.
pub fn clusters(directory: &Path) -> Result<Vec<String>, LoadError> {
    let clusters: Vec<String> = variable_files(directory)?
        .iter()
        .filter(|path| path.file_name().and_then(|name| name.to_str()) != Some(GLOBAL_FILE))
        .filter_map(|path| path.file_stem().and_then(|stem| stem.to_str()))
        .map(str::to_string)
        .collect();

    if clusters.is_empty() {
        return Err(LoadError::NoFilesFound(directory.to_owned()));
    }

    Ok(clusters)
}

/// All regular `*.yaml` files of `directory`, sorted
pub fn variable_files(directory: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_error = |source| LoadError::Io {
        path: directory.to_owned(),
        source,
    };

    let mut files = vec![];
    for dir_entry in std::fs::read_dir(directory).map_err(io_error)? {
        let dir_entry = dir_entry.map_err(io_error)?;
        if !dir_entry.file_type().map_err(io_error)?.is_file() {
            continue;
        }

        let path = dir_entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some(EXTENSION) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Name of the component a variable or template file belongs to: its stem, `-` replaced by `_`
///
/// The name is used as a key in templates (`.web_app.name`), where `-` is not allowed.
pub fn component_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().replace('-', "_"))
        .unwrap_or_default()
}

/// Replace the file at `path` with the encoded `tree`
///
/// The tree is written to a temporary file in the same directory first, which is then renamed over `path`. A
/// crash leaves either the old or the new file behind, never a partial one.
pub fn save(path: &Path, tree: &Tree) -> Result<(), SaveError> {
    use std::io::Write;

    let contents = encode(tree).map_err(SaveError::Encode)?;
    let io_error = |source| SaveError::Io {
        path: path.to_owned(),
        source,
    };

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(directory).map_err(io_error)?;
    file.write_all(contents.as_bytes()).map_err(io_error)?;
    file.persist(path).map_err(|err| io_error(err.error))?;

    tracing::debug!(path=%path.display(), "saved");
    Ok(())
}

/// Decode every document of a yaml stream
///
/// Empty documents are skipped, any other document must be a mapping.
pub fn decode(contents: &str) -> Result<Vec<Tree>, serde_yaml::Error> {
    let mut documents = vec![];

    for document in serde_yaml::Deserializer::from_str(contents) {
        match Value::deserialize(document)? {
            Value::Null => continue,
            Value::Object(tree) => documents.push(tree),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected a mapping at the document root, found {}",
                    other.kind()
                )))
            }
        }
    }

    Ok(documents)
}

/// Encode a tree as a yaml document
pub fn encode(tree: &Tree) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(tree)
}

/// Deep-merge `src` over `dst`
pub fn merge_trees(dst: &mut Tree, src: Tree) -> Result<(), MergeError> {
    merge_at(dst, src, &mut vec![])
}

fn merge_at(dst: &mut Tree, src: Tree, path: &mut Vec<String>) -> Result<(), MergeError> {
    for (key, incoming) in src {
        let Some(existing) = dst.get_mut(&key) else {
            dst.insert(key, incoming);
            continue;
        };

        match (existing, incoming) {
            (Value::Object(existing), Value::Object(incoming)) => {
                path.push(key);
                merge_at(existing, incoming, path)?;
                path.pop();
            }
            (existing, incoming)
                if matches!(existing, Value::Object(_)) || matches!(incoming, Value::Object(_)) =>
            {
                path.push(key);
                return Err(MergeError::Conflict {
                    path: path.join("."),
                    existing: existing.kind(),
                    incoming: incoming.kind(),
                });
            }
            (existing, incoming) => *existing = incoming,
        }
    }

    Ok(())
}

fn source_name(source: &Source) -> String {
    match source {
        Some(path) => path.display().to_string(),
        None => "<inline>".to_string(),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MergeError {
    #[error("map/non-map conflict at `{path}`: can not merge {incoming} over {existing}")]
    Conflict {
        path: String,
        existing: &'static str,
        incoming: &'static str,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum SaveError {
    #[error("unable to encode variables")]
    Encode(#[source] serde_yaml::Error),
    #[error("{}: unable to write", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("No variable files found in {}", .0.display())]
    NoFilesFound(PathBuf),
    #[error("{}: IO error", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{file}: unable to decode yaml")]
    Decode {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{file}: unable to merge variables")]
    Merge {
        file: String,
        #[source]
        source: MergeError,
    },
}

/// Utility macro to create [Variables]
///
/// Create from a single document
/// ```
/// # use plater::variables;
/// let variables = variables!("attribute: 42");
/// assert_eq!(variables.source_count(), 1);
/// ```
///
/// Create from multiple documents (path required), merged in order
/// ```
/// # use plater::variables;
/// let variables = variables! {
///   "vars.yaml" => "team: { name: one }",
///   "dev.yaml" => "team: { size: 2 }"
/// };
/// assert_eq!(variables.tree()["team"], plater::value::Value::Object(
///     [("name".to_string(), "one".into()), ("size".to_string(), 2i64.into())].into_iter().collect()
/// ));
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use plater::variables;
/// variables!("not: [valid");
/// ```
#[macro_export]
macro_rules! variables {
    // single document without source
    { $expr:expr } => {{
        let mut variables = $crate::variables::Variables::default();
        variables.load_str($expr, None).expect("variables must load");
        variables
    }};
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut variables = $crate::variables::Variables::default();
        $(
            variables
                .load_str($expr, Some(::std::path::PathBuf::from($source)))
                .expect("variables must load");
        )+

        variables
    }};
}
