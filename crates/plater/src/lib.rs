//! # plater - layered variables for yaml templates
//!
//! `plater` prepares the inputs of a template engine: it rewrites template sources so their variable references
//! point into a shared, namespaced variable tree, and it builds that tree from layered yaml files whose secrets
//! are stored encrypted.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `plater` works internally.
//!
//! ### Template rewriting
//!
//! Templates use the `{{ .name }}` reference syntax. When several components share one variable tree, the
//! references of a component's template have to be scoped: `{{ .name }}` in `web-app.yaml` becomes
//! `{{ .web_app.name }}`.
//!
//! This is done lexically, without understanding the template language:
//!
//! - [lexer::Lexer] splits the source into maximal runs of whitespace, `{`, `}` and everything else
//! - [rewriter::Rewriter] tracks whether it is inside `{{ ... }}` and prefixes references found there
//!
//! Nested expressions (`{{ {{`) and stray closing delimiters (`}}` outside an expression) are errors. Everything
//! else, including text outside of expressions, is passed through unchanged.
//!
//! ### Variables
//!
//! Variable files are yaml documents decoded into [value::Value]s. They are layered: a global `vars.yaml` is
//! overridden by `<cluster>.yaml`. Objects are merged recursively, other values are replaced
//! (see [variables::merge_trees]).
//!
//! ### Secrets
//!
//! Keys ending in `.enc` hold secrets:
//!
//! ```yaml
//! database:
//!   password.enc: Q1JZUFQ...
//! ```
//!
//! [crypt::transform] walks a tree and applies a [crypt::Crypt] to each secret. The functions in [cipher] all
//! fit:
//!
//! | function                         | use                                          | rename |
//! |----------------------------------|----------------------------------------------|--------|
//! | [cipher::encrypt_if_plaintext]   | encrypt variable files in place              | no     |
//! | [cipher::decrypt]                | show a decrypted variable file               | no     |
//! | [cipher::decrypt]                | variables for rendering (`password.enc` → `password`) | yes    |
//! | [cipher::re_encrypt]             | migrate the legacy openssl format            | no     |
//!
//! [cipher::encrypt_if_plaintext] can be run over a file any number of times: values already encrypted with the
//! same password are left as they are, values encrypted with another password are an error.
//!
//! ### Output
//!
//! [render::Renderer] executes the templates of a cluster against its decrypted variables. The yaml output can be
//! labeled with [labels::Labels::inject_all].
//!
pub mod cipher;
pub mod crypt;
pub mod labels;
pub mod lexer;
pub mod migrate;
pub mod render;
pub mod rewriter;
pub mod value;
pub mod variables;
