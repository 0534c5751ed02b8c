//! Snapshot tests
//!
//! Rewrites a realistic template, builds the variables of a cluster from files on disk and renders manifests.

use plater::value::Tree;
use plater::{cipher, crypt, labels, render, rewriter, variables};

const TEMPLATE: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: {{ .name }}
  annotations: {}
  labels:
    team: "{{ $.team }}"
data:
  replicas: "{{ .replicas }}"
  home: ${HOME}
{{- if (.debug) }}
  debug: "true"
{{- end }}
{{- range $i, $host := .hosts }}
  host-{{ $i }}: {{ $host }}
{{- end }}
"#;

fn rewrite(mode: rewriter::ReferenceMode) -> String {
    let mut out = Vec::new();
    rewriter::Rewriter::new(".web_app")
        .with_mode(mode)
        .rewrite(TEMPLATE.as_bytes(), &mut out)
        .expect("template must rewrite");
    String::from_utf8(out).expect("utf-8")
}

#[test]
fn rewrite_template() {
    insta::assert_snapshot!(rewrite(rewriter::ReferenceMode::Embedded), @r###"
    apiVersion: v1
    kind: ConfigMap
    metadata:
      name: {{ .web_app.name }}
      annotations: {}
      labels:
        team: "{{ $.team }}"
    data:
      replicas: "{{ .web_app.replicas }}"
      home: ${HOME}
    {{- if (.web_app.debug) }}
      debug: "true"
    {{- end }}
    {{- range $i, $host := .web_app.hosts }}
      host-{{ $i }}: {{ $host }}
    {{- end }}
    "###);
}

#[test]
fn rewrite_template_leading_only() {
    insta::assert_snapshot!(rewrite(rewriter::ReferenceMode::Leading), @r###"
    apiVersion: v1
    kind: ConfigMap
    metadata:
      name: {{ .web_app.name }}
      annotations: {}
      labels:
        team: "{{ $.team }}"
    data:
      replicas: "{{ .web_app.replicas }}"
      home: ${HOME}
    {{- if (.debug) }}
      debug: "true"
    {{- end }}
    {{- range $i, $host := .web_app.hosts }}
      host-{{ $i }}: {{ $host }}
    {{- end }}
    "###);
}

#[test]
fn cluster_variables() {
    let directory = tempfile::tempdir().unwrap();
    let secret = cipher::encrypt("hunter2", "secure").unwrap();

    std::fs::write(
        directory.path().join(variables::GLOBAL_FILE),
        format!(
            "\
team: aura
database:
  host: db.local
  port: 5432
  password.enc: {secret}
replicas: 1
"
        ),
    )
    .unwrap();
    std::fs::write(
        directory.path().join("prod.yaml"),
        "\
database:
  host: db.prod
replicas: 3
ingress:
  - app.example.com
",
    )
    .unwrap();

    let variables = variables::Variables::for_cluster(directory.path(), "prod").unwrap();
    assert_eq!(variables.source_count(), 2);

    let mut tree: Tree = variables.into_tree();
    let count = crypt::transform(&mut tree, "secure", &cipher::decrypt, true).unwrap();
    assert_eq!(count, 1);

    insta::assert_snapshot!(variables::encode(&tree).unwrap(), @r###"
    team: aura
    database:
      host: db.prod
      port: 5432
      password: hunter2
    replicas: 3
    ingress:
    - app.example.com
    "###);
}

#[test]
fn render_labeled_manifests() {
    let mut tree: Tree = plater::variables!(
        "\
name: web
team: aura
enabled: true
database:
  password.enc: placeholder
"
    )
    .into_tree();
    crypt::transform(&mut tree, "secure", &cipher::encrypt, false).unwrap();
    crypt::transform(&mut tree, "secure", &cipher::decrypt, true).unwrap();

    let rendered = render::Renderer::new(&tree)
        .render(
            "\
apiVersion: v1
kind: Secret
metadata:
  name: {{ .name }}
  labels:
    team: {{ .team }}
stringData:
  password: {{ .database.password }}
---
kind: Note
text: {{ if .enabled }}enabled{{ end }}
",
        )
        .unwrap();
    let labeled = labels::Labels::new("20240131T120000")
        .inject_all(&rendered)
        .unwrap();

    insta::assert_snapshot!(labeled, @r###"
    apiVersion: v1
    kind: Secret
    metadata:
      name: web
      labels:
        team: aura
        nais.io/created-by: nais-yaml
        nais.io/touched-at: 20240131T120000
    stringData:
      password: placeholder
    ---
    kind: Note
    text: enabled
    "###);
}
