//! In-process fakes for isolated contexts
//!
//! Both fakes interpret submitted code as a tiny line-command script:
//!
//! - `print TEXT` writes TEXT to stdout
//! - `warn TEXT` writes TEXT to stderr
//! - `ask PROMPT` requests input and waits for the answer
//! - `say PREFIX` writes PREFIX followed by the last answer to stdout
//! - `fail MESSAGE` stops the run with an uncaught error
//! - `hang` blocks until the host goes away
//! - `crash` kills the context without finishing the run
//!
//! Unknown lines are ignored.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::bridge::{InputCallback, InputHook};
use crate::transport::{
    Endpoint, HostMessage, InterpreterRequest, Launcher, RunMode, SandboxMessage,
    TransportError, WorkerMessage,
};
use crate::types::InputRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Print(String),
    Warn(String),
    Ask(String),
    Say(String),
    Fail(String),
    Hang,
    Crash,
}

fn parse_script(code: &str) -> Vec<Step> {
    code.lines()
        .filter_map(|line| {
            let (command, arg) = line.trim_start().split_once(' ').unwrap_or((line.trim(), ""));
            let arg = arg.to_owned();
            Some(match command {
                "print" => Step::Print(arg),
                "warn" => Step::Warn(arg),
                "ask" => Step::Ask(arg),
                "say" => Step::Say(arg),
                "fail" => Step::Fail(arg),
                "hang" => Step::Hang,
                "crash" => Step::Crash,
                _ => return None,
            })
        })
        .collect()
}

enum Ending {
    Finished,
    Failed(String),
    Crashed,
}

/// How a fake context spells its messages
struct Dialect<Out, In> {
    stdout: fn(String) -> Out,
    stderr: fn(String) -> Out,
    ask: fn(String) -> Out,
    answer: fn(In) -> Option<String>,
}

async fn play<Out, In>(
    steps: &[Step],
    context: &mut Endpoint<Out, In>,
    dialect: &Dialect<Out, In>,
) -> Ending {
    let mut last_answer = String::new();
    for step in steps {
        match step {
            Step::Print(text) => {
                let _ = context.send((dialect.stdout)(text.clone()));
            }
            Step::Warn(text) => {
                let _ = context.send((dialect.stderr)(text.clone()));
            }
            Step::Ask(prompt) => {
                let _ = context.send((dialect.ask)(prompt.clone()));
                loop {
                    match context.recv().await {
                        Some(message) => {
                            if let Some(value) = (dialect.answer)(message) {
                                last_answer = value;
                                break;
                            }
                        }
                        None => return Ending::Crashed,
                    }
                }
            }
            Step::Say(prefix) => {
                let _ = context.send((dialect.stdout)(format!("{prefix}{last_answer}")));
            }
            Step::Fail(message) => return Ending::Failed(message.clone()),
            Step::Hang => {
                while context.recv().await.is_some() {}
                return Ending::Crashed;
            }
            Step::Crash => return Ending::Crashed,
        }
    }
    Ending::Finished
}

const SANDBOX_DIALECT: Dialect<SandboxMessage, HostMessage> = Dialect {
    stdout: |data| SandboxMessage::Stdout { data },
    stderr: |data| SandboxMessage::Stderr { data },
    ask: |message| SandboxMessage::InputRequest { message },
    answer: |message| match message {
        HostMessage::InputResponse { value } => Some(value),
        HostMessage::ExecuteCode { .. } => None,
    },
};

const WORKER_DIALECT: Dialect<WorkerMessage, InterpreterRequest> = Dialect {
    stdout: |data| WorkerMessage::Stdout { data },
    stderr: |data| WorkerMessage::Stderr { data },
    ask: |prompt| WorkerMessage::InputRequest { prompt },
    answer: |request| match request {
        InterpreterRequest::InputResponse { value } => Some(value),
        InterpreterRequest::Run { .. } => None,
    },
};

/// Fake sandbox context
#[derive(Debug, Default)]
pub struct ScriptedSandbox {
    launches: AtomicUsize,
    failing_launches: AtomicUsize,
    received: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` launches fail
    pub fn failing_launches(self, count: usize) -> Self {
        self.failing_launches.store(count, Ordering::SeqCst);
        self
    }

    /// Successful launches so far
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Code of every run received, in order
    pub fn received_code(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Launcher<HostMessage, SandboxMessage> for ScriptedSandbox {
    async fn launch(&self) -> Result<Endpoint<HostMessage, SandboxMessage>, TransportError> {
        if take_failure(&self.failing_launches) {
            return Err(TransportError::CommandNotFound("fake-sandbox".to_owned()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);

        let (host, mut context) = Endpoint::pair();
        let received = self.received.clone();
        tokio::spawn(async move {
            while let Some(message) = context.recv().await {
                let HostMessage::ExecuteCode { code } = message else {
                    continue;
                };
                received.lock().unwrap().push(code.clone());
                match play(&parse_script(&code), &mut context, &SANDBOX_DIALECT).await {
                    Ending::Finished => {}
                    Ending::Failed(data) => {
                        let _ = context.send(SandboxMessage::Stderr { data });
                    }
                    Ending::Crashed => return,
                }
                let _ = context.send(SandboxMessage::ExecutionComplete);
            }
        });
        Ok(host)
    }
}

/// One run received by a [`ScriptedInterpreter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRun {
    pub code: String,
    pub mode: RunMode,
    pub packages: Vec<String>,
}

/// Fake worker interpreter
#[derive(Debug, Default)]
pub struct ScriptedInterpreter {
    launches: AtomicUsize,
    failing_launches: AtomicUsize,
    silent: AtomicBool,
    ready_delay: Mutex<Option<Duration>>,
    received: Arc<Mutex<Vec<ReceivedRun>>>,
}

impl ScriptedInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_launches(self, count: usize) -> Self {
        self.failing_launches.store(count, Ordering::SeqCst);
        self
    }

    /// Never report readiness
    pub fn silent(self) -> Self {
        self.silent.store(true, Ordering::SeqCst);
        self
    }

    /// Wait before reporting readiness
    pub fn ready_after(self, delay: Duration) -> Self {
        *self.ready_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn received_runs(&self) -> Vec<ReceivedRun> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Launcher<InterpreterRequest, WorkerMessage> for ScriptedInterpreter {
    async fn launch(&self) -> Result<Endpoint<InterpreterRequest, WorkerMessage>, TransportError> {
        if take_failure(&self.failing_launches) {
            return Err(TransportError::CommandNotFound("fake-interpreter".to_owned()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);

        let (host, mut context) = Endpoint::pair();
        let received = self.received.clone();
        let silent = self.silent.load(Ordering::SeqCst);
        let ready_delay = *self.ready_delay.lock().unwrap();
        tokio::spawn(async move {
            if let Some(delay) = ready_delay {
                tokio::time::sleep(delay).await;
            }
            if silent {
                while context.recv().await.is_some() {}
                return;
            }
            let _ = context.send(WorkerMessage::Ready);

            while let Some(request) = context.recv().await {
                let InterpreterRequest::Run {
                    code,
                    mode,
                    packages,
                } = request
                else {
                    continue;
                };
                received.lock().unwrap().push(ReceivedRun {
                    code: code.clone(),
                    mode,
                    packages,
                });
                let reply = match play(&parse_script(&code), &mut context, &WORKER_DIALECT).await {
                    Ending::Finished => WorkerMessage::Done,
                    Ending::Failed(data) => WorkerMessage::Error { data },
                    Ending::Crashed => return,
                };
                let _ = context.send(reply);
            }
        });
        Ok(host)
    }
}

fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Hook that records every request without answering
pub fn recording_hook() -> (InputHook, Arc<Mutex<Vec<InputRequest>>>) {
    let hook = InputHook::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    hook.set(Arc::new(move |request| sink.lock().unwrap().push(request)));
    (hook, seen)
}

/// Host stand-in that answers input requests from a fixed list
pub struct Answering {
    hook: InputHook,
    answers: Arc<Mutex<VecDeque<String>>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl Answering {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hook: InputHook::new(),
            answers: Arc::new(Mutex::new(answers.into_iter().map(Into::into).collect())),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn hook(&self) -> InputHook {
        self.hook.clone()
    }

    /// Callback recording each prompt and handing the next answer to `provide`
    pub fn callback(&self, provide: impl Fn(String) + Send + Sync + 'static) -> InputCallback {
        let answers = self.answers.clone();
        let seen = self.seen.clone();
        Arc::new(move |request: InputRequest| {
            seen.lock().unwrap().push(request.message);
            let answer = answers.lock().unwrap().pop_front().unwrap_or_default();
            provide(answer);
        })
    }

    /// Install [`Answering::callback`] on this stand-in's own hook
    pub fn answer_with(&self, provide: impl Fn(String) + Send + Sync + 'static) {
        self.hook.set(self.callback(provide));
    }

    /// Prompts seen so far
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_parsing() {
        let steps = parse_script("print a b\n  warn x\nask Name?\nsay Hi \nbogus\nhang\ncrash\nfail E");
        assert_eq!(
            steps,
            [
                Step::Print("a b".to_owned()),
                Step::Warn("x".to_owned()),
                Step::Ask("Name?".to_owned()),
                Step::Say("Hi ".to_owned()),
                Step::Hang,
                Step::Crash,
                Step::Fail("E".to_owned()),
            ]
        );
    }
}
