mod cli;

use plater::crypt;
use plater::value::Tree;
use plater::variables::{self, Variables};
use plater::{cipher, labels, migrate, render, rewriter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    let filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("trace")
    } else {
        tracing_subscriber::EnvFilter::from_env("PLATER_LOG")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Encrypt(cmd) => encrypt(cmd),
        cli::Command::Decrypt(cmd) => decrypt(cmd),
        cli::Command::Variables(cmd) => print_variables(cmd),
        cli::Command::Render(cmd) => render(cmd),
        cli::Command::Check(cmd) => check(cmd),
        cli::Command::Rewrite(cmd) => rewrite(cmd),
        cli::Command::Migrate(cmd) => migrate(cmd),
        cli::Command::Label(cmd) => label(cmd),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn required_key(key: &cli::KeyArgs) -> anyhow::Result<&str> {
    match key.decryption_key.as_deref() {
        Some(key) if !key.is_empty() => Ok(key),
        _ => anyhow::bail!("--decryption-key (or $PLATER_DECRYPTION_KEY) is required"),
    }
}

/// In-place encryption of every variable file in a directory
pub fn encrypt(cli: cli::EncryptCommand) -> anyhow::Result<()> {
    let password = required_key(&cli.key)?;

    for path in variables::variable_files(&cli.variables)? {
        let mut tree = Variables::load_files([&path])?.into_tree();

        let count = crypt::transform(&mut tree, password, &cipher::encrypt_if_plaintext, false)
            .map_err(|e| anyhow::Error::new(e).context(format!("{}", path.display())))?;

        variables::save(&path, &tree)?;
        tracing::info!(path=%path.display(), count, "encrypted");
    }

    Ok(())
}

/// Print a variable file with all secrets decrypted
pub fn decrypt(cli: cli::DecryptCommand) -> anyhow::Result<()> {
    let password = required_key(&cli.key)?;

    let mut tree = Variables::load_files([&cli.file])?.into_tree();
    crypt::transform(&mut tree, password, &cipher::decrypt, false)?;

    serde_yaml::to_writer(std::io::stdout(), &tree)?;
    Ok(())
}

pub fn print_variables(cli: cli::VariablesCommand) -> anyhow::Result<()> {
    let (tree, errors) = cluster_variables(&cli.variables, &cli.cluster, &cli.key)?;

    match cli.output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), &tree)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), &tree)?,
    };

    anyhow::ensure!(errors == 0, "encountered {errors} errors; see log");
    Ok(())
}

/// Layered and decrypted variables of a cluster, ready for rendering
///
/// Without a password decryption errors are logged and counted, the secrets stay encrypted.
fn cluster_variables(
    directory: &Path,
    cluster: &str,
    key: &cli::KeyArgs,
) -> anyhow::Result<(Tree, usize)> {
    let mut tree = Variables::for_cluster(directory, cluster)?.into_tree();
    let password = key.decryption_key.as_deref().unwrap_or_default();

    tracing::debug!("decrypting variables");
    match crypt::transform(&mut tree, password, &cipher::decrypt, true) {
        Ok(_) => Ok((tree, 0)),
        Err(err) if password.is_empty() => {
            tracing::error!(error = %err, "decrypt variable");
            tracing::warn!("Decryption key is missing; skipping all variable decryption");
            Ok((tree, 1))
        }
        Err(err) => Err(err.into()),
    }
}

/// Render all templates of one cluster into the output directory
pub fn render(cli: cli::RenderCommand) -> anyhow::Result<()> {
    let labels = cli.add_labels.then(|| match &cli.touched_at {
        Some(touched_at) => labels::Labels::new(touched_at.as_str()),
        None => labels::Labels::now(),
    });

    tracing::debug!(path=%cli.output.display(), "using output directory");
    std::fs::create_dir_all(&cli.output)?;

    let errors = render_cluster(
        &cli.variables,
        &cli.templates,
        &cli.cluster,
        &cli.key,
        labels.as_ref(),
        Some(&cli.output),
    )?;

    anyhow::ensure!(errors == 0, "encountered {errors} errors; see log");
    Ok(())
}

/// Render the templates of every cluster without writing them
pub fn check(cli: cli::CheckCommand) -> anyhow::Result<()> {
    let mut failed = 0;

    for cluster in variables::clusters(&cli.variables)? {
        tracing::info!(cluster = %cluster, "running validation");

        match render_cluster(&cli.variables, &cli.templates, &cluster, &cli.key, None, None) {
            Ok(0) => {}
            Ok(errors) => {
                tracing::error!(cluster = %cluster, errors, "validation failed");
                failed += 1;
            }
            Err(err) => {
                tracing::error!(cluster = %cluster, error = %err, "validation failed");
                failed += 1;
            }
        }
    }

    anyhow::ensure!(failed == 0, "{failed} clusters failed validation");
    tracing::info!("all clusters rendered successfully");
    Ok(())
}

/// Render every template of `cluster`, returning the number of errors
///
/// Without `output` the rendered templates are discarded.
fn render_cluster(
    variables: &Path,
    templates: &Path,
    cluster: &str,
    key: &cli::KeyArgs,
    labels: Option<&labels::Labels>,
    output: Option<&Path>,
) -> anyhow::Result<usize> {
    let (tree, mut errors) = cluster_variables(variables, cluster, key)?;
    let renderer = render::Renderer::new(&tree);

    for (name, path) in cluster_templates(templates, cluster)? {
        match render_template(&renderer, &path, labels) {
            Ok(rendered) => {
                if let Some(output) = output {
                    let destination = output.join(&name);
                    std::fs::write(&destination, rendered)?;
                    tracing::debug!(path=%destination.display(), "rendered");
                }
            }
            Err(err) => {
                tracing::error!(path=%path.display(), error = %err, "render failed");
                errors += 1;
            }
        }
    }

    Ok(errors)
}

fn render_template(
    renderer: &render::Renderer,
    path: &Path,
    labels: Option<&labels::Labels>,
) -> anyhow::Result<String> {
    let template = std::fs::read_to_string(path)?;
    let rendered = renderer.render(&template)?;

    match labels {
        Some(labels) => Ok(labels.inject_all(&rendered)?),
        None => Ok(rendered),
    }
}

/// Templates of a cluster: file name to path
///
/// Files in `<templates>/<cluster>/` replace files with the same name in `<templates>/`.
fn cluster_templates(directory: &Path, cluster: &str) -> anyhow::Result<BTreeMap<String, PathBuf>> {
    let mut templates = BTreeMap::new();

    let overrides = directory.join(cluster);
    let directories = if overrides.is_dir() {
        tracing::debug!(path=%overrides.display(), "using cluster-override templates");
        vec![directory.to_owned(), overrides]
    } else {
        tracing::debug!(cluster, "no cluster-specific template directory");
        vec![directory.to_owned()]
    };

    for directory in directories {
        for path in regular_files(&directory)? {
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                templates.insert(name.to_string(), path.clone());
            }
        }
    }

    Ok(templates)
}

/// Mirror a template directory, scoping every template to its file name
pub fn rewrite(cli: cli::RewriteCommand) -> anyhow::Result<()> {
    let mode = if cli.leading_only {
        rewriter::ReferenceMode::Leading
    } else {
        rewriter::ReferenceMode::Embedded
    };

    let summary = rewriter::rewrite_directory(&cli.input, &cli.output, mode)?;
    tracing::info!(rewritten = summary.rewritten, failed = summary.failed, "templates rewritten");

    anyhow::ensure!(
        summary.failed == 0,
        "{} templates could not be rewritten; see log",
        summary.failed
    );
    Ok(())
}

/// Re-encrypt a legacy variable tree and write one file per cluster
pub fn migrate(cli: cli::MigrateCommand) -> anyhow::Result<()> {
    let password = required_key(&cli.key)?;

    let components = migrate::collect(&cli.input, password)?;
    std::fs::create_dir_all(&cli.output)?;

    for (cluster, tree) in migrate::by_cluster(components) {
        let destination = cli
            .output
            .join(format!("{cluster}.{}", variables::EXTENSION));
        variables::save(&destination, &tree)?;
        tracing::info!(path=%destination.display(), "written");
    }

    Ok(())
}

pub fn label(cli: cli::LabelCommand) -> anyhow::Result<()> {
    let rendered = match &cli.file {
        Some(path) => std::fs::read_to_string(path)?,
        None => std::io::read_to_string(std::io::stdin())?,
    };

    let labels = match cli.touched_at {
        Some(touched_at) => labels::Labels::new(touched_at),
        None => labels::Labels::now(),
    };

    print!("{}", labels.inject_all(&rendered)?);
    Ok(())
}

/// Regular files of a directory, sorted
fn regular_files(directory: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = vec![];
    for dir_entry in std::fs::read_dir(directory)? {
        let dir_entry = dir_entry?;
        if dir_entry.file_type()?.is_file() {
            files.push(dir_entry.path());
        }
    }
    files.sort();
    Ok(files)
}
