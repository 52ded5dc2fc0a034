//! End-to-end tests of the squeezing engine.
//!
//! These tests drive [`Squeezer`] the way the HTTP layer does: documents are
//! processed, their sub-resource responses are observed, and the documents
//! are processed again until the statistics settle.

use std::sync::Arc;

use squeeze_core::{
    ElementFamily, HtmlDocument, ManagedElement, ResourceId, ResourceResponse,
    ResponseObservation, SqueezeConfig, Squeezer, VaryRegistry,
};
use tempfile::TempDir;

const HOST: &str = "http://example.com";

fn squeezer(dir: &TempDir, threshold: f64) -> Squeezer {
    let config =
        SqueezeConfig::new(dir.path().join("squeezed"), "/squeezed").with_threshold(threshold);
    Squeezer::new(config, Arc::new(VaryRegistry::new())).unwrap()
}

/// Builds a document linking one stylesheet per name.
fn page(names: &[&str]) -> String {
    let mut html = String::from("<html>\n<head>\n");
    for name in names {
        let media = if *name == "e" { " media=\"print\"" } else { "" };
        html.push_str(&format!(
            "<link rel=\"stylesheet\" href=\"/css/{name}.css\"{media}>\n"
        ));
    }
    html.push_str("</head>\n<body></body>\n</html>\n");
    html
}

/// Serves every stylesheet of `names` once, as the application would.
fn serve(squeezer: &Squeezer, names: &[&str]) {
    for name in names {
        let url = format!("{HOST}/css/{name}.css");
        let response = ResourceResponse::new(&url, 200)
            .with_content_type("text/css")
            .with_body(format!("{name}{{}}"));
        let observed = squeezer.observe_response("", HOST, response);
        assert!(matches!(observed, ResponseObservation::Stored { .. }));
    }
}

fn stylesheet_refs(html: &str) -> Vec<String> {
    HtmlDocument::parse(html)
        .elements(ElementFamily::Stylesheets)
        .iter()
        .filter_map(|e| e.reference())
        .collect()
}

fn artifact_body(squeezer: &Squeezer, url: &str) -> String {
    let id = url.rsplit('/').next().unwrap();
    std::fs::read_to_string(squeezer.merge_cache().path_for(id)).unwrap()
}

#[test]
fn test_groups_split_when_subset_stabilizes() {
    let dir = TempDir::new().unwrap();
    let squeezer = squeezer(&dir, 0.8);
    let all = ["a", "b", "c", "d", "e"];
    let head = ["a", "b", "c"];

    squeezer.process_html("", HOST, "/index.html", &page(&all));
    serve(&squeezer, &all);

    // The whole set always appears together and is merged into one file.
    let merged = squeezer.process_html("", HOST, "/index.html", &page(&all));
    assert!(merged.changed);
    let refs = stylesheet_refs(&merged.body.unwrap());
    assert_eq!(refs.len(), 1);
    assert_eq!(
        artifact_body(&squeezer, &refs[0]),
        "a{}b{}c{}d{}@media print {\ne{}}\n"
    );

    for _ in 0..2 {
        squeezer.process_html("", HOST, "/other.html", &page(&head));
    }
    for _ in 0..1000 {
        squeezer.process_html("", HOST, "/index.html", &page(&all));
    }
    for _ in 0..1000 {
        squeezer.process_html("", HOST, "/other.html", &page(&head));
    }

    let split = squeezer.process_html("", HOST, "/index.html", &page(&all));
    assert!(split.changed);
    let refs = stylesheet_refs(&split.body.unwrap());
    assert_eq!(refs.len(), 2);
    assert_eq!(artifact_body(&squeezer, &refs[0]), "a{}b{}c{}");
    assert_eq!(artifact_body(&squeezer, &refs[1]), "d{}@media print {\ne{}}\n");

    let axis = squeezer.registry().axis("");
    let state = axis.lock();
    let a = ResourceId::new(format!("{HOST}/css/a.css"));
    let d = ResourceId::new(format!("{HOST}/css/d.css"));
    assert_eq!(state.appearances.count(&a), 2005);
    assert_eq!(state.appearances.count(&d), 1003);
}

#[test]
fn test_conditional_comment_block_is_never_tracked() {
    let dir = TempDir::new().unwrap();
    let squeezer = squeezer(&dir, 0.5);
    let html = r#"<html>
  <head>
    <link type="text/css" media="screen" href="http://john/doe.css">
    <link type="text/css" media="screen" href="http://john/doegh.css">

    <!-- Internet Explorer CSS Fixes -->
    <!--[if lt IE 7]>
        <style type="text/css" media="all">
           @import url(http://foo/bar.css);
    </style>
    <![endif]-->
  </head>
  <body></body>
</html>"#;

    for _ in 0..3 {
        let processed = squeezer.process_html("", "http://john", "/", html);
        assert!(!processed.changed);
    }

    let axis = squeezer.registry().axis("");
    let state = axis.lock();
    let groups: Vec<Vec<String>> = state
        .groups(ElementFamily::Stylesheets)
        .iter()
        .map(|(group, _)| group.members().iter().map(|id| id.to_string()).collect())
        .collect();
    assert_eq!(
        groups,
        vec![vec![
            "http://john/doe.css".to_string(),
            "http://john/doegh.css".to_string()
        ]]
    );
    assert!(!state.is_known(&ResourceId::new("http://foo/bar.css")));
}

#[test]
fn test_unchanged_document_reports_no_body() {
    let dir = TempDir::new().unwrap();
    let squeezer = squeezer(&dir, 0.5);
    let html = page(&["a"]);

    let processed = squeezer.process_html("", HOST, "/", &html);
    assert!(!processed.changed);
    assert!(processed.body.is_none());
    assert!(processed.expires.is_none());
}

#[test]
fn test_vary_axes_learn_independently() {
    let dir = TempDir::new().unwrap();
    let squeezer = squeezer(&dir, 0.5);
    let names = ["a", "b"];

    squeezer.process_html("", HOST, "/", &page(&names));
    serve(&squeezer, &names);

    let plain = squeezer.process_html("", HOST, "/", &page(&names));
    assert!(plain.changed);

    // Nothing has been cached for this axis yet.
    let gzip = squeezer.process_html("gzip", HOST, "/", &page(&names));
    assert!(!gzip.changed);
    assert_eq!(squeezer.registry().len(), 2);
}

#[test]
fn test_concurrent_documents_share_one_artifact() {
    let dir = TempDir::new().unwrap();
    let squeezer = Arc::new(squeezer(&dir, 0.5));
    let names = ["a", "b", "c"];

    squeezer.process_html("", HOST, "/", &page(&names));
    serve(&squeezer, &names);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let squeezer = Arc::clone(&squeezer);
            std::thread::spawn(move || {
                for _ in 0..20 {
                    let processed = squeezer.process_html("", HOST, "/", &page(&names));
                    assert!(processed.changed);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let artifacts: Vec<_> = std::fs::read_dir(squeezer.merge_cache().dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].to_string_lossy().ends_with(".css"));
}
