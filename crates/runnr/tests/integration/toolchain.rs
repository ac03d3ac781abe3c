use runnr::Runnr;

use super::{fixture_source, run};

#[tokio::test]
#[ignore = "requires a JDK"]
async fn test_java_hello() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, &fixture_source("Main.java"), "java").await;
    assert_eq!(result.stdout, "Hello from Java");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
#[ignore = "requires a JDK"]
async fn test_java_compile_error() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "public class Main { void broken( }", "java").await;
    assert!(result.stderr.starts_with("Compilation failed:"));
    assert!(!result.diagnostics.is_empty());
}

#[tokio::test]
#[ignore = "requires gcc"]
async fn test_c_hello() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, &fixture_source("hello.c"), "c").await;
    assert_eq!(result.stdout, "Hello from C");
}

#[tokio::test]
#[ignore = "requires gcc"]
async fn test_c_without_main() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "int helper(void) { return 1; }", "c").await;
    assert!(
        result.stderr.starts_with("Execution failed: missing entry point"),
        "{}",
        result.stderr
    );
}

#[tokio::test]
#[ignore = "requires gcc"]
async fn test_c_nonzero_exit() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "#include <stdio.h>\nint main(void) { puts(\"bye\"); return 3; }", "c").await;
    assert_eq!(result.stdout, "bye");
    assert!(result.stderr.ends_with("Process exited with code 3"));
}
