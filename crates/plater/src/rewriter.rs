//! scope variable references of a template
//!
//! Templates address their variables as `.name`. Once variables of many components live in one tree the
//! references need a namespace: with prefix `.component` the expression `{{ .name }}` becomes
//! `{{ .component.name }}`.
//!
//! Only references inside `{{` and `}}` are touched, everything else is copied byte for byte.
use crate::lexer::{Lexer, TokenClass};
use crate::variables;
use std::borrow::Cow;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Rewrite `source` into `sink`, prefixing every variable reference inside an expression with `prefix`
///
/// `prefix` is expected to start with a `.`, e.g. `.component`.
pub fn rewrite(source: impl Read, sink: impl Write, prefix: &str) -> Result<(), RewriteError> {
    Rewriter::new(prefix).rewrite(source, sink)
}

/// Which dots of an identifier token start a variable reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReferenceMode {
    /// Only a token starting with `.` is a reference: `.a` but not `(.a)`
    Leading,
    /// Additionally references embedded in compound tokens: `(.a!=.b)`
    #[default]
    Embedded,
}

#[derive(Debug, Clone, derive_new::new)]
pub struct Rewriter<'p> {
    prefix: &'p str,
    #[new(default)]
    mode: ReferenceMode,
}

impl<'p> Rewriter<'p> {
    pub fn with_mode(mut self, mode: ReferenceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn rewrite(&self, source: impl Read, mut sink: impl Write) -> Result<(), RewriteError> {
        let mut lexer = Lexer::new(source);
        let mut inside_expression = false;
        let mut position = Position::default();

        loop {
            let token = lexer.scan();
            if token.class == TokenClass::End {
                break;
            }

            let literal = match token.class {
                TokenClass::Identifier if inside_expression => self.qualify(&token.literal),
                _ => Cow::Borrowed(token.literal.as_str()),
            };
            sink.write_all(literal.as_bytes())?;

            if token.is_delimiter() {
                match (token.class, inside_expression) {
                    (TokenClass::OpenDelimiter, true) => {
                        return Err(RewriteError::NestedExpression(position))
                    }
                    (TokenClass::CloseDelimiter, false) => {
                        return Err(RewriteError::UnmatchedClose(position))
                    }
                    (TokenClass::OpenDelimiter, false) => inside_expression = true,
                    _ => inside_expression = false,
                }
            }

            position.advance(&token.literal);
        }

        if let Some(source) = lexer.take_error() {
            return Err(RewriteError::Read { position, source });
        }

        if inside_expression {
            tracing::debug!(%position, "input ended inside an expression");
        }

        sink.flush()?;
        Ok(())
    }

    fn qualify<'l>(&self, literal: &'l str) -> Cow<'l, str> {
        match self.mode {
            ReferenceMode::Leading if literal.starts_with('.') => {
                Cow::Owned(format!("{}{literal}", self.prefix))
            }
            ReferenceMode::Leading => Cow::Borrowed(literal),
            ReferenceMode::Embedded => {
                let mut out: Option<String> = None;
                let mut previous = None;
                for (index, ch) in literal.char_indices() {
                    if ch == '.' && starts_reference(previous) {
                        out.get_or_insert_with(|| {
                            let mut out = String::with_capacity(literal.len() + self.prefix.len());
                            out.push_str(&literal[..index]);
                            out
                        })
                        .push_str(self.prefix);
                    }
                    if let Some(out) = out.as_mut() {
                        out.push(ch);
                    }
                    previous = Some(ch);
                }

                match out {
                    Some(out) => Cow::Owned(out),
                    None => Cow::Borrowed(literal),
                }
            }
        }
    }
}

/// Prefix for the templates of a component: `web-app.yaml` is scoped to `.web_app`
pub fn prefix_for(path: &Path) -> String {
    format!(".{}", variables::component_name(path))
}

/// Files rewritten and failed by [rewrite_directory]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub rewritten: usize,
    pub failed: usize,
}

/// Mirror `input` below `output`, rewriting every file with the prefix of its name ([prefix_for])
///
/// A file that can not be rewritten is logged and counted, the walk continues with the next one.
pub fn rewrite_directory(
    input: &Path,
    output: &Path,
    mode: ReferenceMode,
) -> Result<Summary, DirectoryError> {
    let mut summary = Summary::default();
    walk_directory(input, output, mode, &mut summary)?;
    Ok(summary)
}

fn walk_directory(
    input: &Path,
    output: &Path,
    mode: ReferenceMode,
    summary: &mut Summary,
) -> Result<(), DirectoryError> {
    tracing::debug!(path=%output.display(), "create directory");
    let io_error = |path: &Path| {
        let path = path.to_owned();
        move |source: std::io::Error| DirectoryError { path, source }
    };

    std::fs::create_dir_all(output).map_err(io_error(output))?;
    let mut entries = std::fs::read_dir(input)
        .map_err(io_error(input))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_error(input))?;
    entries.sort();

    for path in entries {
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let destination = output.join(file_name);

        if path.is_dir() {
            walk_directory(&path, &destination, mode, summary)?;
            continue;
        }

        tracing::debug!(from=%path.display(), to=%destination.display(), "rewriting");
        match rewrite_file(&path, &destination, mode) {
            Ok(()) => summary.rewritten += 1,
            Err(err) => {
                tracing::error!(path=%path.display(), error = %err, "unable to rewrite template");
                summary.failed += 1;
            }
        }
    }

    Ok(())
}

fn rewrite_file(path: &Path, destination: &Path, mode: ReferenceMode) -> Result<(), RewriteError> {
    let prefix = prefix_for(path);
    let source = std::fs::File::open(path).map_err(|source| RewriteError::Read {
        position: Position::default(),
        source,
    })?;
    let sink = std::io::BufWriter::new(std::fs::File::create(destination)?);

    Rewriter::new(&prefix).with_mode(mode).rewrite(source, sink)
}

/// A `.` starts a reference at the beginning of a token or after a character that can not end an operand
fn starts_reference(previous: Option<char>) -> bool {
    match previous {
        None => true,
        Some(ch) => matches!(
            ch,
            '(' | '!' | '=' | '<' | '>' | ',' | '|' | '&' | '+' | '-' | '*' | '/' | '%' | '['
        ),
    }
}

/// Line and column (both starting at 1) in the template source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Default for Position {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl Position {
    fn advance(&mut self, literal: &str) {
        for ch in literal.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RewriteError {
    #[error("template error at {0}: nested expression")]
    NestedExpression(Position),
    #[error("template error at {0}: end of expression, but not inside an expression")]
    UnmatchedClose(Position),
    #[error("unable to read template at {position}")]
    Read {
        position: Position,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to write template")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
#[error("{}: unable to read or create directory", .path.display())]
pub struct DirectoryError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rewritten(input: &str, mode: ReferenceMode) -> String {
        let mut out = Vec::new();
        Rewriter::new(".prefix")
            .with_mode(mode)
            .rewrite(input.as_bytes(), &mut out)
            .expect("must rewrite");
        String::from_utf8(out).expect("utf-8 in, utf-8 out")
    }

    #[test]
    fn rewrites() {
        let cases = [
            ("simple case", "simple case"),
            (
                "not s\n \no {{ simple .case }}",
                "not s\n \no {{ simple .prefix.case }}",
            ),
            ("{ .single }", "{ .single }"),
            ("{ { .single }", "{ { .single }"),
            ("{{.single}}", "{{.prefix.single}}"),
            (
                "{{.multiple.levels.in.variable}}",
                "{{.prefix.multiple.levels.in.variable}}",
            ),
            (
                "{{ range $i, $cluster := .clusters }}",
                "{{ range $i, $cluster := .prefix.clusters }}",
            ),
            (
                "{{ (.paranthesis!=.foo) }}",
                "{{ (.prefix.paranthesis!=.prefix.foo) }}",
            ),
            ("{{ $cluster.name }} .outside", "{{ $cluster.name }} .outside"),
            ("{{ (index .a 0).b }}", "{{ (index .prefix.a 0).b }}"),
        ];

        for (input, expected) in cases {
            assert_eq!(rewritten(input, ReferenceMode::Embedded), expected, "{input}");
        }
    }

    #[test]
    fn leading_mode_only_rewrites_token_starts() {
        assert_eq!(
            rewritten("{{ .a.b (.c!=.d) }}", ReferenceMode::Leading),
            "{{ .prefix.a.b (.c!=.d) }}"
        );
    }

    #[test]
    fn free_function_uses_embedded_mode() {
        let mut out = Vec::new();
        rewrite("{{ .a.b }} {{(.x)}}".as_bytes(), &mut out, ".scope").unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{{ .scope.a.b }} {{(.scope.x)}}"
        );
    }

    #[test]
    fn nested_expression() {
        let err = rewrite("ok\n  {{ {{ }}".as_bytes(), std::io::sink(), ".p").unwrap_err();
        let RewriteError::NestedExpression(position) = err else {
            panic!("unexpected error");
        };
        assert_eq!(position, Position { line: 2, column: 6 });
    }

    #[test]
    fn unmatched_close() {
        let err = rewrite("}} {{".as_bytes(), std::io::sink(), ".p").unwrap_err();
        assert!(matches!(
            err,
            RewriteError::UnmatchedClose(Position { line: 1, column: 1 })
        ));
        assert_eq!(
            err.to_string(),
            "template error at line 1, column 1: end of expression, but not inside an expression"
        );
    }

    #[test]
    fn output_is_written_up_to_the_error() {
        let mut out = Vec::new();
        let result = rewrite("{{ .a }} }}".as_bytes(), &mut out, ".p");
        assert!(result.is_err());
        assert_eq!(String::from_utf8(out).unwrap(), "{{ .p.a }} }}");
    }

    #[test]
    fn invalid_utf8_does_not_truncate() {
        let mut out = Vec::new();
        rewrite(&b"name: caf\xe9\n{{ .a }}\nrest: keep\n"[..], &mut out, ".p").unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "name: caf\u{fffd}\n{{ .p.a }}\nrest: keep\n"
        );
    }

    struct FailingReader<'a>(&'a [u8]);

    impl Read for FailingReader<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.0.is_empty() {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "gone"));
            }
            self.0.read(buf)
        }
    }

    #[test]
    fn read_errors_propagate() {
        let mut out = Vec::new();
        let err = rewrite(FailingReader(b"{{ .a }}\nb"), &mut out, ".p").unwrap_err();
        let RewriteError::Read { position, .. } = err else {
            panic!("unexpected error");
        };
        assert_eq!(position, Position { line: 2, column: 2 });
        assert_eq!(String::from_utf8(out).unwrap(), "{{ .p.a }}\nb");
    }

    #[test]
    fn prefix_from_file_name() {
        assert_eq!(prefix_for(Path::new("templates/web-app.yaml")), ".web_app");
        assert_eq!(prefix_for(Path::new("db")), ".db");
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_propagate() {
        let err = rewrite("{{ .a }}".as_bytes(), FailingWriter, ".p").unwrap_err();
        assert!(matches!(err, RewriteError::Io(_)));
    }
}
