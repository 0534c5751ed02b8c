//! migrate a legacy variable directory
//!
//! The legacy layout keeps one file per cluster and component:
//!
//! ```text
//! <directory>/<cluster>/<component>.yaml
//! ```
//!
//! Migration re-encrypts every secret ([cipher::re_encrypt]) and collects the components of a cluster into one
//! tree, keyed by component name (`-` replaced by `_` so the name can be used in a template reference).
use crate::cipher;
use crate::crypt::{self, TransformError};
use crate::value::{Tree, Value};
use crate::variables::{self, LoadError, Variables};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Component {
    pub cluster: String,
    pub name: String,
    pub tree: Tree,
}

/// Load every file below `directory` and re-encrypt its secrets
#[tracing::instrument(level = "debug", skip(password))]
pub fn collect(directory: &Path, password: &str) -> Result<Vec<Component>, MigrateError> {
    tracing::debug!(directory=%directory.display(), "found directory");

    let mut components = vec![];
    for path in sorted_entries(directory)? {
        if path.is_dir() {
            components.extend(collect(&path, password)?);
        } else {
            let component = load_component(&path, password)?;
            tracing::info!(
                cluster = %component.cluster,
                component = %component.name,
                entries = component.tree.len(),
                "processed"
            );
            components.push(component);
        }
    }

    Ok(components)
}

/// Group components by cluster: cluster name to `{ component: tree }`
pub fn by_cluster(components: Vec<Component>) -> BTreeMap<String, Tree> {
    let mut clusters: BTreeMap<String, Tree> = BTreeMap::new();
    for component in components {
        clusters
            .entry(component.cluster)
            .or_default()
            .insert(component.name, Value::Object(component.tree));
    }
    clusters
}

fn load_component(path: &Path, password: &str) -> Result<Component, MigrateError> {
    let cluster = path
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = variables::component_name(path);

    let mut variables = Variables::default();
    variables.load_file(path)?;
    let mut tree = variables.into_tree();

    crypt::transform(&mut tree, password, &cipher::re_encrypt, false).map_err(|source| {
        MigrateError::Transform {
            path: path.to_owned(),
            source,
        }
    })?;

    Ok(Component {
        cluster,
        name,
        tree,
    })
}

fn sorted_entries(directory: &Path) -> Result<Vec<PathBuf>, MigrateError> {
    let io_error = |source| MigrateError::Io {
        path: directory.to_owned(),
        source,
    };

    let mut entries = std::fs::read_dir(directory)
        .map_err(io_error)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_error)?;
    entries.sort();
    Ok(entries)
}

#[derive(thiserror::Error, Debug)]
pub enum MigrateError {
    #[error("{}: unable to read directory", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("{}: unable to re-encrypt secrets", .path.display())]
    Transform {
        path: PathBuf,
        #[source]
        source: TransformError,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn component(cluster: &str, name: &str, yaml: &str) -> Component {
        Component {
            cluster: cluster.to_string(),
            name: name.to_string(),
            tree: crate::variables!(yaml).into_tree(),
        }
    }

    #[test]
    fn groups_components_by_cluster() {
        let clusters = by_cluster(vec![
            component("prod", "web_app", "replicas: 3"),
            component("dev", "web_app", "replicas: 1"),
            component("prod", "db", "size: large"),
        ]);

        assert_eq!(clusters.keys().collect::<Vec<_>>(), vec!["dev", "prod"]);
        assert_eq!(
            serde_yaml::to_string(&clusters["prod"]).unwrap(),
            "web_app:\n  replicas: 3\ndb:\n  size: large\n"
        );
    }
}
