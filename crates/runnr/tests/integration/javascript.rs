use std::sync::Arc;

use runnr::Runnr;

use super::{answer_with, fixture_source, run};

#[tokio::test]
async fn test_console_output() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "console.log('Hello', 1 + 1);\nconsole.error('oops');", "js").await;
    assert_eq!(result.stdout, "Hello 2");
    assert_eq!(result.stderr, "oops");
}

#[tokio::test]
async fn test_warn_is_prefixed() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "console.warn('careful');", "javascript").await;
    assert_eq!(result.stderr, "[WARN] careful");
}

#[tokio::test]
async fn test_prompt_round_trip() {
    let runnr = Arc::new(Runnr::with_defaults());
    answer_with(&runnr, &["Ada", "3"]);

    let result = run(&runnr, &fixture_source("greet.js"), "javascript").await;
    assert_eq!(result.stdout, "Hello, Ada!\n1\n2\n3");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
async fn test_prompt_without_handler_is_empty() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "const v = prompt('anything?');\nconsole.log(JSON.stringify(v));", "js").await;
    assert_eq!(result.stdout, "\"\"");
}

#[tokio::test]
async fn test_uncaught_error_completes() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "console.log('before');\nthrow new Error('boom');", "js").await;
    assert_eq!(result.stdout, "before");
    assert!(result.stderr.starts_with("Error: boom"), "{}", result.stderr);
}

#[tokio::test]
async fn test_syntax_error_completes() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "let = ;", "js").await;
    assert!(result.stderr.starts_with("SyntaxError: "), "{}", result.stderr);
    assert!(result.stderr.ends_with("at main.js:1"), "{}", result.stderr);
}

#[tokio::test]
async fn test_error_lines_match_submitted_code() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "console.log(1);
null.x;", "js").await;
    assert_eq!(result.stdout, "1");
    let mut lines = result.stderr.lines();
    assert!(lines.next().unwrap().starts_with("TypeError: "));
    assert_eq!(lines.next().unwrap().trim(), "at main.js:2:6");
    assert_eq!(lines.next(), None);
}

#[tokio::test]
async fn test_runs_are_isolated() {
    let runnr = Runnr::with_defaults();
    run(&runnr, "globalThis.leaked = 1;", "js").await;
    let result = run(&runnr, "console.log(typeof leaked);", "js").await;
    assert_eq!(result.stdout, "undefined");
}

#[tokio::test]
async fn test_host_globals_are_hidden() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "console.log(typeof process, typeof require);", "js").await;
    assert_eq!(result.stdout, "undefined undefined");
}

#[tokio::test]
#[ignore = "requires esbuild"]
async fn test_typescript_runs_on_the_sandbox() {
    let runnr = Runnr::with_defaults();
    let code = "const greet = (name: string): string => `Hi ${name}`;\nconsole.log(greet('TS'));";
    let result = run(&runnr, code, "ts").await;
    assert_eq!(result.stdout, "Hi TS");
}

#[tokio::test]
#[ignore = "requires esbuild"]
async fn test_typescript_compile_error_has_diagnostics() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "const x: = 1;", "ts").await;
    assert!(result.stderr.starts_with("Compilation failed:"));
    assert!(!result.diagnostics.is_empty());
}
