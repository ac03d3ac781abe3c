use std::sync::Arc;

use runnr::{ExecutionRequest, RunError, Runnr};

use super::run;

#[tokio::test]
async fn test_unsupported_language() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "PRINT 1", "basic").await;
    assert_eq!(result.stderr, "Language 'basic' is not supported");
}

#[tokio::test]
async fn test_empty_source() {
    let runnr = Runnr::with_defaults();
    for language in runnr.supported_languages() {
        let result = run(&runnr, "   ", &language).await;
        assert_eq!(result.stderr, "Error: Code cannot be empty", "{language}");
    }
}

#[tokio::test]
async fn test_reentrant_execute_is_rejected() {
    let runnr = Arc::new(Runnr::with_defaults());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    runnr.on_input_request(move |request| {
        let _ = tx.send(request);
    });

    let running = tokio::spawn({
        let runnr = runnr.clone();
        async move { run(&runnr, "const v = prompt('wait');\nconsole.log(v);", "js").await }
    });
    rx.recv().await.unwrap();

    let second = runnr
        .execute(&ExecutionRequest::new("console.log(1)", "js"))
        .await;
    assert!(matches!(second, Err(RunError::AlreadyExecuting)));

    assert!(runnr.provide_input("done"));
    assert_eq!(running.await.unwrap().stdout, "done");
}
