//! plater cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; plater ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    /// Enable debug output (overrides PLATER_LOG)
    #[clap(long, global(true))]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encrypt all plaintext secrets ('<key>.enc') of a variables directory in place
    Encrypt(EncryptCommand),

    /// Decrypt all secrets of a variables file and print the whole file
    Decrypt(DecryptCommand),

    /// Print the merged and decrypted variables of a cluster
    #[command(alias = "vars")]
    Variables(VariablesCommand),

    /// Render the templates of a cluster with its decrypted variables
    Render(RenderCommand),

    /// Render the templates of every cluster in memory, reporting all errors
    #[command(alias = "validate")]
    Check(CheckCommand),

    /// Scope the variable references of templates to their file name
    ///
    /// `{{ .name }}` in `web-app.yaml` becomes `{{ .web_app.name }}`.
    Rewrite(RewriteCommand),

    /// Re-encrypt legacy secrets and merge <cluster>/<component>.yaml files into <cluster>.yaml
    Migrate(MigrateCommand),

    /// Add 'created-by' and 'touched-at' labels to rendered manifests
    ///
    /// Reads yaml from stdin unless a file is given.
    Label(LabelCommand),
}

#[derive(Parser, Debug)]
pub struct KeyArgs {
    /// Password for encrypting and decrypting secrets
    #[clap(long = "decryption-key", env = "PLATER_DECRYPTION_KEY", hide_env_values(true))]
    pub decryption_key: Option<String>,
}

#[derive(Parser, Debug)]
pub struct EncryptCommand {
    #[clap(flatten)]
    pub key: KeyArgs,

    /// Directory with variable files
    #[clap(long = "variables")]
    pub variables: PathBuf,
}

#[derive(Parser, Debug)]
pub struct DecryptCommand {
    #[clap(flatten)]
    pub key: KeyArgs,

    /// Variable file to decrypt
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct VariablesCommand {
    #[clap(flatten)]
    pub key: KeyArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Directory with variable files
    #[clap(long = "variables")]
    pub variables: PathBuf,

    /// Cluster whose variables override the global ones
    #[clap(long = "cluster")]
    pub cluster: String,
}

#[derive(Parser, Debug)]
pub struct RenderCommand {
    #[clap(flatten)]
    pub key: KeyArgs,

    /// Directory with variable files
    #[clap(long = "variables")]
    pub variables: PathBuf,

    /// Directory with templates, cluster specific overrides in <templates>/<cluster>/
    #[clap(long = "templates")]
    pub templates: PathBuf,

    /// Cluster to render
    #[clap(long = "cluster")]
    pub cluster: String,

    /// Directory to write rendered templates to
    #[clap(long = "output")]
    pub output: PathBuf,

    /// Add 'created-by' and 'touched-at' labels to every rendered document
    #[clap(long = "add-labels")]
    pub add_labels: bool,

    /// Use custom timestamp in 'touched-at' label
    #[clap(long = "touched-at", requires = "add_labels")]
    pub touched_at: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CheckCommand {
    #[clap(flatten)]
    pub key: KeyArgs,

    /// Directory with variable files
    #[clap(long = "variables")]
    pub variables: PathBuf,

    /// Directory with templates, cluster specific overrides in <templates>/<cluster>/
    #[clap(long = "templates")]
    pub templates: PathBuf,
}

#[derive(Parser, Debug)]
pub struct RewriteCommand {
    /// Directory with templates
    #[clap(long = "input")]
    pub input: PathBuf,

    /// Directory to write rewritten templates to
    #[clap(long = "output")]
    pub output: PathBuf,

    /// Only rewrite tokens that start with a reference
    ///
    /// Leaves compound tokens such as `(.a!=.b)` untouched.
    #[clap(long = "leading-only")]
    pub leading_only: bool,
}

#[derive(Parser, Debug)]
pub struct MigrateCommand {
    #[clap(flatten)]
    pub key: KeyArgs,

    /// Directory with <cluster>/<component>.yaml files
    #[clap(long = "input")]
    pub input: PathBuf,

    /// Directory to write <cluster>.yaml files to
    #[clap(long = "output")]
    pub output: PathBuf,
}

#[derive(Parser, Debug)]
pub struct LabelCommand {
    /// Rendered manifests
    pub file: Option<PathBuf>,

    /// Use custom timestamp in 'touched-at' label
    #[clap(long = "touched-at")]
    pub touched_at: Option<String>,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
