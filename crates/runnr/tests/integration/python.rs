use std::sync::Arc;

use runnr::{Runnr, WorkerStatus};

use super::{answer_with, fixture_source, run};

#[tokio::test]
async fn test_print_output() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "print('Hello', 2)\nimport sys\nprint('warn', file=sys.stderr)", "py").await;
    assert_eq!(result.stdout, "Hello 2");
    assert_eq!(result.stderr, "warn");
    runnr.destroy();
}

#[tokio::test]
async fn test_input_round_trip() {
    let runnr = Arc::new(Runnr::with_defaults());
    answer_with(&runnr, &["Ada", "2"]);

    let result = run(&runnr, &fixture_source("greet.py"), "python").await;
    assert_eq!(result.stdout, "Hello, Ada!\n1\n2\n2");
    assert_eq!(result.stderr, "");
    runnr.destroy();
}

#[tokio::test]
async fn test_input_in_loop() {
    let runnr = Arc::new(Runnr::with_defaults());
    answer_with(&runnr, &["7", "8"]);

    let code = "total = 0\nfor _ in range(2):\n    total += int(input('n?'))\nprint(total)";
    let result = run(&runnr, code, "python").await;
    assert_eq!(result.stderr, "");
    assert_eq!(result.stdout, "15");
    runnr.destroy();
}

#[tokio::test]
async fn test_exception_keeps_partial_output() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "print('a')\nraise ValueError('bad value')", "python").await;
    assert_eq!(result.stdout, "a");
    assert!(result.stderr.ends_with("ValueError: bad value"), "{}", result.stderr);
    runnr.destroy();
}

#[tokio::test]
async fn test_traceback_points_at_submitted_line() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "def f():\n    return 1 / 0\n\nf()", "python").await;
    let stderr = result.stderr;
    assert!(stderr.starts_with("Traceback (most recent call last):"), "{stderr}");
    assert!(stderr.contains("File \"<main>\", line 4, in <module>"), "{stderr}");
    assert!(stderr.contains("File \"<main>\", line 2, in f"), "{stderr}");
    assert!(stderr.ends_with("ZeroDivisionError: division by zero"), "{stderr}");
    assert!(!stderr.contains("worker.py"), "{stderr}");
    runnr.destroy();
}

#[tokio::test]
async fn test_traceback_lines_survive_input_rewrite() {
    let runnr = Arc::new(Runnr::with_defaults());
    answer_with(&runnr, &["x"]);

    let result = run(&runnr, "name = input('who?')\nprint(int(name))", "python").await;
    assert!(
        result.stderr.contains("File \"<main>\", line 2, in <module>"),
        "{}",
        result.stderr
    );
    assert!(result.stderr.ends_with("ValueError: invalid literal for int() with base 10: 'x'"));
    runnr.destroy();
}

#[tokio::test]
async fn test_syntax_error_reports_line() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "print('ok')\nx = = 1", "python").await;
    assert_eq!(result.stdout, "");
    assert!(result.stderr.starts_with("File \"<main>\", line 2"), "{}", result.stderr);
    assert!(result.stderr.contains("SyntaxError: "), "{}", result.stderr);
    runnr.destroy();
}

#[tokio::test]
async fn test_empty_prompt_uses_default() {
    let runnr = Arc::new(Runnr::with_defaults());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let weak = Arc::downgrade(&runnr);
    runnr.on_input_request(move |request| {
        let _ = tx.send(request.message);
        if let Some(runnr) = weak.upgrade() {
            runnr.provide_input("v");
        }
    });

    let result = run(&runnr, "a = input('')\nb = input()\nprint(a + b)", "python").await;
    assert_eq!(result.stdout, "vv");
    assert_eq!(rx.recv().await.unwrap(), "Enter value:");
    assert_eq!(rx.recv().await.unwrap(), "Enter value:");
    runnr.destroy();
}

#[tokio::test]
async fn test_missing_module_is_reported_by_import() {
    let runnr = Runnr::with_defaults();
    let result = run(&runnr, "import runnr_no_such_module", "python").await;
    assert!(result.stderr.contains("line 1, in <module>"), "{}", result.stderr);
    assert!(
        result.stderr.ends_with("ModuleNotFoundError: No module named 'runnr_no_such_module'"),
        "{}",
        result.stderr
    );
    runnr.destroy();
}

#[tokio::test]
async fn test_worker_stays_warm() {
    let runnr = Runnr::with_defaults();
    assert_eq!(run(&runnr, "print(1)", "python").await.stdout, "1");
    assert_eq!(runnr.registry().status("python"), WorkerStatus::Ready);
    assert_eq!(run(&runnr, "print(2)", "python").await.stdout, "2");

    runnr.destroy();
    assert_eq!(runnr.registry().status("python"), WorkerStatus::Uninitialized);
}

#[tokio::test]
async fn test_destroy_while_waiting_for_input() {
    let runnr = Arc::new(Runnr::with_defaults());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    runnr.on_input_request(move |request| {
        let _ = tx.send(request);
    });

    let running = tokio::spawn({
        let runnr = runnr.clone();
        async move { run(&runnr, "print('partial')\nx = input('never answered')", "python").await }
    });
    let request = rx.recv().await.unwrap();
    assert_eq!(request.message, "never answered");
    assert_eq!(request.language, "python");

    runnr.destroy();
    let result = running.await.unwrap();
    assert_eq!(result.stdout, "partial");
    assert!(!runnr.is_running());

    assert_eq!(run(&runnr, "print('again')", "python").await.stdout, "again");
    runnr.destroy();
}
