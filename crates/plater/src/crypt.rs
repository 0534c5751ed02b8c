//! transform secrets of a variable tree
//!
//! A secret is any string value whose key ends in [SECRET_SUFFIX]:
//!
//! ```yaml
//! database:
//!   user: app
//!   password.enc: Q1JZUFQ...
//! ```
//!
//! [transform] walks all objects of a [Tree] and hands every secret to a [Crypt] implementation, e.g.
//! [crate::cipher::decrypt]. Arrays are not descended into.
use crate::cipher::CipherError;
use crate::value::{Tree, Value};

pub const SECRET_SUFFIX: &str = ".enc";

/// A transformation of a single secret
pub trait Crypt {
    fn crypt(&self, value: &str, password: &str) -> Result<String, CipherError>;
}

// blanket impl for Fn, covers the functions of [crate::cipher]
impl<F> Crypt for F
where
    F: Fn(&str, &str) -> Result<String, CipherError>,
{
    fn crypt(&self, value: &str, password: &str) -> Result<String, CipherError> {
        self(value, password)
    }
}

pub fn is_secret(key: &str) -> bool {
    key.ends_with(SECRET_SUFFIX)
}

/// Apply `crypt` to every secret in `tree`
///
/// With `rename` the result is stored under the key without [SECRET_SUFFIX] and the suffixed entry is removed
/// (`password.enc` becomes `password`), otherwise the secret is replaced in place.
///
/// Returns the number of transformed secrets. The first failure aborts the walk, secrets transformed up to that
/// point stay transformed.
#[tracing::instrument(level = "debug", skip_all, fields(rename = rename))]
pub fn transform(
    tree: &mut Tree,
    password: &str,
    crypt: &dyn Crypt,
    rename: bool,
) -> Result<usize, TransformError> {
    let count = walk(tree, password, crypt, rename, &mut vec![])?;
    tracing::debug!(count, "secrets transformed");
    Ok(count)
}

fn walk(
    tree: &mut Tree,
    password: &str,
    crypt: &dyn Crypt,
    rename: bool,
    path: &mut Vec<String>,
) -> Result<usize, TransformError> {
    let mut count = 0;
    let keys: Vec<String> = tree.keys().cloned().collect();

    for key in keys {
        let Some(value) = tree.get_mut(&key) else {
            continue;
        };

        path.push(key);
        let key = path.last().map(String::as_str).unwrap_or_default();

        match value {
            Value::Object(child) => count += walk(child, password, crypt, rename, path)?,
            Value::String(secret) if is_secret(key) => {
                let result = crypt
                    .crypt(secret, password)
                    .map_err(|source| TransformError::Crypt {
                        path: path.join("."),
                        source,
                    })?;

                if rename {
                    let plain_key = &key[..key.len() - SECRET_SUFFIX.len()];
                    rename_entry(tree, key, plain_key, Value::String(result));
                } else {
                    *secret = result;
                }
                tracing::trace!(path = %path.join("."), "secret transformed");
                count += 1;
            }
            other if is_secret(key) => {
                return Err(TransformError::NonStringSecret {
                    path: path.join("."),
                    kind: other.kind(),
                })
            }
            _ => {}
        }

        path.pop();
    }

    Ok(count)
}

/// Replace the entry `from` with `to`, keeping its position
fn rename_entry(tree: &mut Tree, from: &str, to: &str, value: Value) {
    let Some((index, _, _)) = tree.shift_remove_full(from) else {
        return;
    };

    if let Some(existing) = tree.get_mut(to) {
        *existing = value;
    } else {
        tree.shift_insert(index, to.to_string(), value);
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    #[error("unable to transform secret `{path}`")]
    Crypt {
        path: String,
        #[source]
        source: CipherError,
    },
    #[error("non-string secret `{path}`: found {kind}")]
    NonStringSecret { path: String, kind: &'static str },
}
