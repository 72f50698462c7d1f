//! Interactive `forge chat` session.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use forge_engine::{ForgeEvent, GenerationOutcome, GenerationRequest, Orchestrator};
use forge_utils::error::{ForgeError, UserFriendlyError};
use forge_utils::exit_codes::ExitCode;
use forge_utils::types::DocumentId;

use super::progress::ProgressPrinter;

/// One line of chat input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReplCommand {
    Request(String),
    History,
    Restore(u64),
    Show,
    Export(Utf8PathBuf),
    Help,
    Quit,
    Empty,
}

impl ReplCommand {
    /// Lines starting with `:` are commands; anything else is a request.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let Some(command) = line.strip_prefix(':') else {
            return Ok(if line.is_empty() {
                Self::Empty
            } else {
                Self::Request(line.to_string())
            });
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        match (name, arg) {
            ("history", "") => Ok(Self::History),
            ("show", "") => Ok(Self::Show),
            ("help", "") => Ok(Self::Help),
            ("quit" | "q" | "exit", "") => Ok(Self::Quit),
            ("restore", n) => n
                .parse()
                .map(Self::Restore)
                .map_err(|_| "usage: :restore N".to_string()),
            ("export", "") => Err("usage: :export PATH".to_string()),
            ("export", path) => Ok(Self::Export(Utf8PathBuf::from(path))),
            _ => Err(format!("unknown command ':{name}' (try :help)")),
        }
    }
}

const HELP: &str = "\
  :history        list saved versions, newest first
  :restore N      make version N current again
  :show           print the current code
  :export PATH    write the current version to PATH
  :quit           leave the session
  Ctrl-C cancels the generation in flight; a new line while one runs replaces it.";

type Running = JoinHandle<Result<GenerationOutcome, ForgeError>>;

enum Input {
    Line(Option<String>),
    Event(Result<ForgeEvent, RecvError>),
    Finished(Result<Result<GenerationOutcome, ForgeError>, tokio::task::JoinError>),
    Interrupt,
}

pub(crate) async fn execute_chat_command(
    orchestrator: Arc<Orchestrator>,
    document: DocumentId,
    name: Option<String>,
) -> Result<ExitCode> {
    if !orchestrator.contains(&document) {
        let name = name.unwrap_or_else(|| document.to_string());
        orchestrator.create_document(document.clone(), name)?;
    }
    let snapshot = orchestrator.snapshot(&document)?;
    if let Some(welcome) = orchestrator.messages(&document)?.first() {
        println!("{}", welcome.text);
    }
    println!(
        "Document '{}' is at version {}. Type :help for commands.",
        document, snapshot.current_artifact.version
    );

    let mut events = orchestrator.subscribe();
    let mut lines = stdin_lines();
    let mut running: Option<Running> = None;
    let mut progress = ProgressPrinter::default();

    loop {
        let input = tokio::select! {
            biased;
            event = events.recv() => Input::Event(event),
            joined = join(&mut running) => Input::Finished(joined),
            line = lines.recv() => Input::Line(line),
            _ = tokio::signal::ctrl_c() => Input::Interrupt,
        };

        match input {
            Input::Event(Ok(event)) => {
                if event.document_id() == &document {
                    if let Some(line) = progress.line(&event) {
                        println!("{line}");
                    }
                }
            }
            Input::Event(Err(RecvError::Lagged(skipped))) => {
                tracing::debug!(skipped, "Progress output lagged");
            }
            Input::Event(Err(RecvError::Closed)) => break,
            Input::Finished(joined) => {
                running = None;
                // Outcomes are already reported through events; only errors remain.
                if let Err(err) = joined.context("generation task panicked")? {
                    eprintln!("{}", err.display_for_user());
                }
            }
            Input::Interrupt => {
                if !orchestrator.cancel(&document)? {
                    println!("Nothing is running. Use :quit to leave.");
                }
            }
            Input::Line(None) => break,
            Input::Line(Some(line)) => match ReplCommand::parse(&line) {
                Ok(ReplCommand::Quit) => break,
                Ok(command) => {
                    if let Some(task) = handle(&orchestrator, &document, command)? {
                        // The previous task is superseded and settles on its own.
                        running = Some(task);
                    }
                }
                Err(usage) => eprintln!("{usage}"),
            },
        }
    }

    if running.is_some() {
        orchestrator.cancel(&document)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn handle(
    orchestrator: &Arc<Orchestrator>,
    document: &DocumentId,
    command: ReplCommand,
) -> Result<Option<Running>> {
    match command {
        ReplCommand::Request(text) => {
            let orchestrator = Arc::clone(orchestrator);
            let document = document.clone();
            return Ok(Some(tokio::spawn(async move {
                orchestrator
                    .submit(&document, GenerationRequest::new(text))
                    .await
            })));
        }
        ReplCommand::History => {
            let snapshot = orchestrator.snapshot(document)?;
            for artifact in &snapshot.history {
                let marker = if artifact.version == snapshot.current_artifact.version {
                    '*'
                } else {
                    ' '
                };
                println!(
                    "{marker} v{:<4} {}  {}",
                    artifact.version,
                    artifact.created_at.format("%Y-%m-%d %H:%M:%S"),
                    artifact.commit_message
                );
            }
        }
        ReplCommand::Restore(version) => match orchestrator.restore(document, version) {
            Ok(_) => {}
            // The orchestrator has already posted a notice for a missing version.
            Err(ForgeError::Store(_)) => {}
            Err(err) => eprintln!("{}", err.display_for_user()),
        },
        ReplCommand::Show => {
            println!("{}", orchestrator.snapshot(document)?.current_artifact.code);
        }
        ReplCommand::Export(path) => match orchestrator.export(document, &path) {
            Ok(artifact) => println!("Wrote version {} to {path}", artifact.version),
            Err(err) => eprintln!("{}", err.display_for_user()),
        },
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Quit | ReplCommand::Empty => {}
    }
    Ok(None)
}

async fn join(
    running: &mut Option<Running>,
) -> Result<Result<GenerationOutcome, ForgeError>, tokio::task::JoinError> {
    match running {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    rx
}
