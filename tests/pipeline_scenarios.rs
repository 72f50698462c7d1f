//! End-to-end generation scenarios against a scripted model gateway
//!
//! Every test drives the public [`Orchestrator`] API only and inspects the
//! calls the scripted backend recorded, the published events, and the
//! document snapshot afterwards.

use camino::Utf8PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use forge::{
    ArtifactStore, Branch, DocumentId, FABRICATION_FAILED_MARKER, ForgeEvent, GenerationOutcome,
    GenerationRequest, GenerationSettings, InlineImage, LlmError, Orchestrator, PipelinePhase,
    ScriptedBackend, ScriptedResponse, Sender, StaticRetriever,
};

const ARCHITECT_REPLY: &str = r#"{
    "thought_process": "search page with three parts",
    "global_state_definition": "const query = ref(''); const page = ref(1)",
    "components": [
        {
            "name": "SearchBar",
            "description": "Text input with a search button",
            "props_contract": "modelValue: string; placeholder?: string",
            "emits_contract": "update:modelValue(value: string), search()"
        },
        {
            "name": "ResultTable",
            "description": "Paged result table",
            "props_contract": "rows: Array<{ id: number, title: string }>",
            "emits_contract": "select(id: number)"
        },
        {
            "name": "Pager",
            "description": "Page switcher",
            "props_contract": "page: number; total: number",
            "emits_contract": "change(page: number)"
        }
    ],
    "main_logic_flow": "SearchBar updates query; Pager updates page; ResultTable reads both"
}"#;

const EMPTY_ARCHITECT_REPLY: &str = r#"{
    "thought_process": "a static banner needs no components",
    "global_state_definition": "",
    "components": [],
    "main_logic_flow": "render a banner"
}"#;

const PLAN_REPLY: &str = r#"{
    "thought_process": "tweak the table",
    "component_list": ["k-table"],
    "layout_strategy": "unchanged",
    "implementation_steps": ["Add a striped style", "Widen the title column"]
}"#;

fn page(marker: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><script src=\"https://cdn.tailwindcss.com\"></script></head>\n\
         <body>\n<!-- [KPC:STEP:1] -->\n<div id=\"app\" class=\"p-4\">{marker}</div>\n\
         <script>Vue.createApp({{}}).mount('#app')</script>\n</body>\n</html>"
    )
}

fn backend() -> ScriptedBackend {
    ScriptedBackend::new()
        .on("architecting", ScriptedResponse::text(ARCHITECT_REPLY))
        .on_matching(
            "fabricating",
            "Name: SearchBar",
            ScriptedResponse::text("<k-input v-model=\"query\"></k-input>"),
        )
        .on_matching(
            "fabricating",
            "Name: ResultTable",
            ScriptedResponse::text("<k-table :data=\"rows\"></k-table>"),
        )
        .on("fabricating", ScriptedResponse::text("<k-pagination></k-pagination>"))
        .on("planning", ScriptedResponse::text(PLAN_REPLY))
        .on(
            "assembling",
            ScriptedResponse::chunks([format!("```html\n{}\n```", page("assembled"))]),
        )
        .on("coding", ScriptedResponse::chunks([page("coded")]))
        .on("refining", ScriptedResponse::chunks([page("refined")]))
}

fn settings() -> GenerationSettings {
    GenerationSettings {
        model: "lead-model".to_string(),
        worker_model: "worker-model".to_string(),
        ..GenerationSettings::default()
    }
}

fn orchestrator_with(
    backend: ScriptedBackend,
    store: ArtifactStore,
) -> (Arc<Orchestrator>, Arc<ScriptedBackend>) {
    let backend = Arc::new(backend);
    let orchestrator = Orchestrator::new(
        backend.clone(),
        Arc::new(StaticRetriever),
        settings(),
        store,
    );
    (Arc::new(orchestrator), backend)
}

fn setup(backend: ScriptedBackend) -> (Arc<Orchestrator>, Arc<ScriptedBackend>) {
    let (orchestrator, backend) = orchestrator_with(backend, ArtifactStore::new());
    orchestrator.create_document("home", "Home").unwrap();
    (orchestrator, backend)
}

fn home() -> DocumentId {
    DocumentId::from("home")
}

fn prompts_for(backend: &ScriptedBackend, phase: &str) -> Vec<String> {
    backend
        .calls()
        .into_iter()
        .filter(|call| call.phase == phase)
        .map(|call| call.prompt)
        .collect()
}

async fn wait_for(
    events: &mut broadcast::Receiver<ForgeEvent>,
    pred: impl Fn(&ForgeEvent) -> bool,
) -> ForgeEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event did not arrive in time")
}

fn entered(document: &str, phase: PipelinePhase) -> impl Fn(&ForgeEvent) -> bool {
    let document = DocumentId::from(document);
    move |event| {
        matches!(event, ForgeEvent::PhaseChanged { document_id, phase: p, .. }
            if *document_id == document && *p == phase)
    }
}

#[tokio::test]
async fn test_hierarchical_build_fans_out_one_worker_per_component() {
    let (orch, backend) = setup(backend());
    let mut events = orch.subscribe();

    let outcome = orch
        .submit(&home(), GenerationRequest::new("A searchable result list"))
        .await
        .unwrap();
    assert_eq!(outcome, GenerationOutcome::Committed { version: 1 });

    let workers: Vec<_> = backend
        .calls()
        .into_iter()
        .filter(|call| call.phase == "fabricating")
        .collect();
    assert_eq!(workers.len(), 3);
    assert!(workers.iter().all(|call| call.model == "worker-model"));
    assert!(backend
        .calls()
        .iter()
        .filter(|call| call.phase != "fabricating")
        .all(|call| call.model == "lead-model"));

    let searchbar = workers
        .iter()
        .find(|call| call.prompt.contains("Name: SearchBar"))
        .unwrap();
    assert!(searchbar
        .prompt
        .contains("modelValue: string; placeholder?: string"));
    assert!(searchbar
        .prompt
        .contains("update:modelValue(value: string), search()"));
    assert!(searchbar.prompt.contains("const query = ref(''); const page = ref(1)"));

    let assembling = prompts_for(&backend, "assembling");
    assert_eq!(assembling.len(), 1);
    for fragment in ["<k-input", "<k-table", "<k-pagination"] {
        assert!(assembling[0].contains(fragment), "missing {fragment}");
    }

    let mut phases = Vec::new();
    loop {
        match events.try_recv() {
            Ok(ForgeEvent::PhaseChanged { phase, .. }) => phases.push(phase),
            Ok(ForgeEvent::Settled { .. }) | Err(_) => break,
            Ok(_) => {}
        }
    }
    assert_eq!(
        phases,
        vec![
            PipelinePhase::Architecting,
            PipelinePhase::Fabricating,
            PipelinePhase::Assembling,
            PipelinePhase::Ready,
        ]
    );
}

#[tokio::test]
async fn test_workers_run_concurrently() {
    let mut backend = backend();
    let gate = backend.gate("fabricating");
    let (orch, backend) = setup(backend);

    let task = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.submit(&home(), GenerationRequest::new("search")).await })
    };

    // All three workers must be waiting at once before any of them is released.
    tokio::time::timeout(Duration::from_secs(5), async {
        while backend.call_count("fabricating") < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("workers were not started together");
    gate.release(3);

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, GenerationOutcome::Committed { version: 1 });
}

#[tokio::test]
async fn test_failed_worker_leaves_marked_placeholder() {
    let backend = ScriptedBackend::new()
        .on("architecting", ScriptedResponse::text(ARCHITECT_REPLY))
        .on_matching(
            "fabricating",
            "Name: Pager",
            ScriptedResponse::fail(LlmError::Transport("connection reset".to_string())),
        )
        .on("fabricating", ScriptedResponse::text("<div>ok</div>"))
        .on("assembling", ScriptedResponse::chunks([page("assembled")]));
    let (orch, backend) = setup(backend);

    let outcome = orch
        .submit(&home(), GenerationRequest::new("search"))
        .await
        .unwrap();
    assert_eq!(outcome, GenerationOutcome::Committed { version: 1 });

    let assembling = prompts_for(&backend, "assembling").pop().unwrap();
    assert!(assembling.contains(&format!("{FABRICATION_FAILED_MARKER} Pager")));
    assert_eq!(assembling.matches("<div>ok</div>").count(), 2);
    assert!(assembling.contains("Integrate Pager"));
}

#[tokio::test]
async fn test_zero_components_still_assemble() {
    let backend = ScriptedBackend::new()
        .on("architecting", ScriptedResponse::text(EMPTY_ARCHITECT_REPLY))
        .on("assembling", ScriptedResponse::chunks([page("banner")]));
    let (orch, backend) = setup(backend);

    let outcome = orch
        .submit(&home(), GenerationRequest::new("a banner"))
        .await
        .unwrap();

    assert_eq!(outcome, GenerationOutcome::Committed { version: 1 });
    assert_eq!(backend.call_count("fabricating"), 0);
    assert!(prompts_for(&backend, "assembling")[0].contains("no components"));
}


#[tokio::test]
async fn test_malformed_architect_reply_fails_without_commit() {
    let backend = ScriptedBackend::new()
        .on("architecting", ScriptedResponse::text("Sure! Here is your page layout."))
        .on("assembling", ScriptedResponse::chunks([page("never")]));
    let (orch, backend) = setup(backend);

    let outcome = orch
        .submit(&home(), GenerationRequest::new("search"))
        .await
        .unwrap();

    assert!(matches!(outcome, GenerationOutcome::Failed { .. }));
    assert_eq!(backend.call_count("fabricating"), 0);
    assert_eq!(backend.call_count("assembling"), 0);

    let snapshot = orch.snapshot(&home()).unwrap();
    assert_eq!(snapshot.phase, PipelinePhase::Idle);
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.current_artifact.version, 0);

    let notice = orch.messages(&home()).unwrap().pop().unwrap();
    assert_eq!(notice.sender, Sender::System);
    assert!(notice.text.starts_with("Generation failed"));
}

#[tokio::test]
async fn test_refine_uses_fallback_plan_when_planning_fails() {
    let backend = ScriptedBackend::new()
        .on("architecting", ScriptedResponse::text(ARCHITECT_REPLY))
        .on("fabricating", ScriptedResponse::text("<div>part</div>"))
        .on("assembling", ScriptedResponse::chunks([page("assembled")]))
        .on(
            "planning",
            ScriptedResponse::fail(LlmError::ProviderOutage("503 overloaded".to_string())),
        )
        .on("refining", ScriptedResponse::chunks([page("refined")]));
    let (orch, backend) = setup(backend);

    orch.submit(&home(), GenerationRequest::new("search"))
        .await
        .unwrap();
    let outcome = orch
        .submit(&home(), GenerationRequest::new("stripe the table"))
        .await
        .unwrap();

    assert_eq!(outcome, GenerationOutcome::Committed { version: 2 });
    assert_eq!(backend.call_count("planning"), 1);
    let refining = prompts_for(&backend, "refining").pop().unwrap();
    assert!(refining.contains("Please retry"));
    assert!(refining.contains("assembled"));
    assert!(refining.contains("stripe the table"));

    let snapshot = orch.snapshot(&home()).unwrap();
    assert!(snapshot.current_artifact.code.contains("refined"));
    let versions: Vec<u64> = snapshot.history.iter().map(|a| a.version).collect();
    assert_eq!(versions, vec![2, 1, 0]);
}

#[tokio::test]
async fn test_reference_image_reaches_planning_phases_only() {
    let image = InlineImage {
        mime_type: "image/png".to_string(),
        data: "iVBORw0KGgo=".to_string(),
    };
    let (orch, backend) = setup(backend());

    orch.submit(&home(), GenerationRequest::new("").with_image(image.clone()))
        .await
        .unwrap();
    orch.submit(
        &home(),
        GenerationRequest::new("like this")
            .with_image(image)
            .with_branch(Branch::Direct),
    )
    .await
    .unwrap();

    for call in backend.calls() {
        let expected = usize::from(matches!(call.phase.as_str(), "architecting" | "planning"));
        assert_eq!(call.image_count, expected, "phase {}", call.phase);
    }

    let snapshot = orch.snapshot(&home()).unwrap();
    assert_eq!(snapshot.history[1].commit_message, "hierarchical: image request");
    assert!(snapshot.history[0].commit_message.starts_with("direct: like this"));

    let user_messages: Vec<_> = orch
        .messages(&home())
        .unwrap()
        .into_iter()
        .filter(|m| m.sender == Sender::User)
        .collect();
    assert_eq!(user_messages.len(), 2);
    assert!(user_messages.iter().all(|m| m.image.is_some()));
}

#[tokio::test]
async fn test_superseded_stream_never_writes_late_output() {
    let mut backend = ScriptedBackend::new()
        .on("architecting", ScriptedResponse::text(ARCHITECT_REPLY))
        .on("fabricating", ScriptedResponse::text("<div>part</div>"))
        .on(
            "assembling",
            ScriptedResponse::chunks(["```html\n".to_string(), page("stale")]),
        )
        .on("planning", ScriptedResponse::text(PLAN_REPLY))
        .on("coding", ScriptedResponse::chunks([page("coded")]));
    let gate = backend.gate("assembling");
    let (orch, _) = setup(backend);
    let mut events = orch.subscribe();

    let first = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.submit(&home(), GenerationRequest::new("search")).await })
    };
    wait_for(&mut events, entered("home", PipelinePhase::Assembling)).await;

    let second = orch
        .submit(
            &home(),
            GenerationRequest::new("just a quick page").with_branch(Branch::Direct),
        )
        .await
        .unwrap();
    assert_eq!(second, GenerationOutcome::Committed { version: 1 });
    assert_eq!(first.await.unwrap().unwrap(), GenerationOutcome::Superseded);

    // Anything still held back by the gate must go nowhere.
    gate.release(16);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = orch.snapshot(&home()).unwrap();
    assert_eq!(snapshot.phase, PipelinePhase::Ready);
    assert!(snapshot.current_artifact.code.contains("coded"));
    assert_eq!(snapshot.history.len(), 2);

    while let Ok(event) = events.try_recv() {
        if let ForgeEvent::Snapshot { code, .. } = &event {
            assert!(!code.contains("stale"), "stale snapshot published");
        }
    }
    let replaced = orch
        .messages(&home())
        .unwrap()
        .into_iter()
        .filter(|m| m.text.contains("replaced"))
        .count();
    assert_eq!(replaced, 1);
}

#[tokio::test]
async fn test_cancel_mid_stream_restores_committed_view() {
    let partial = "<!DOCTYPE html>\n<html>\n<body>\n<!-- [KPC:STEP:1] -->\n<div>half".to_string();
    let mut backend = ScriptedBackend::new()
        .on("planning", ScriptedResponse::text(PLAN_REPLY))
        .on(
            "coding",
            ScriptedResponse::chunks([partial, "</div>\n</body>\n</html>".to_string()]),
        );
    let _gate = backend.gate("coding");
    let (orch, _) = setup(backend);
    let mut events = orch.subscribe();

    let task = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move {
            orch.submit(
                &home(),
                GenerationRequest::new("page").with_branch(Branch::Direct),
            )
            .await
        })
    };
    let streamed = wait_for(&mut events, |e| matches!(e, ForgeEvent::Snapshot { .. })).await;
    let ForgeEvent::Snapshot { code, step, .. } = streamed else {
        unreachable!()
    };
    assert!(code.contains("half"));
    assert_eq!(step.map(|s| (s.current, s.total)), Some((1, 2)));
    assert!(orch.snapshot(&home()).unwrap().current_artifact.code.contains("half"));

    assert!(orch.cancel(&home()).unwrap());
    assert_eq!(task.await.unwrap().unwrap(), GenerationOutcome::Cancelled);

    let snapshot = orch.snapshot(&home()).unwrap();
    assert_eq!(snapshot.phase, PipelinePhase::Ready);
    assert_eq!(snapshot.current_artifact.version, 0);
    assert!(!snapshot.current_artifact.code.contains("half"));
    assert_eq!(snapshot.history.len(), 1);
    assert!(!orch.cancel(&home()).unwrap());
}

#[tokio::test]
async fn test_documents_progress_independently() {
    let mut backend = backend();
    let _gate = backend.gate("architecting");
    let (orch, _) = setup(backend);
    orch.create_document("settings", "Settings").unwrap();
    let settings_doc = DocumentId::from("settings");
    let mut events = orch.subscribe();

    let blocked = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.submit(&home(), GenerationRequest::new("search")).await })
    };
    wait_for(&mut events, entered("home", PipelinePhase::Architecting)).await;

    let outcome = orch
        .submit(
            &settings_doc,
            GenerationRequest::new("a settings form").with_branch(Branch::Direct),
        )
        .await
        .unwrap();
    assert_eq!(outcome, GenerationOutcome::Committed { version: 1 });
    assert_eq!(
        orch.snapshot(&home()).unwrap().phase,
        PipelinePhase::Architecting
    );

    assert!(orch.cancel(&home()).unwrap());
    assert_eq!(blocked.await.unwrap().unwrap(), GenerationOutcome::Cancelled);

    let settings_snapshot = orch.snapshot(&settings_doc).unwrap();
    assert_eq!(settings_snapshot.phase, PipelinePhase::Ready);
    assert_eq!(settings_snapshot.current_artifact.version, 1);
    assert_eq!(orch.snapshot(&home()).unwrap().history.len(), 1);

    let listed: Vec<_> = orch
        .list_documents()
        .into_iter()
        .map(|d| (d.document_id.to_string(), d.version))
        .collect();
    assert!(listed.contains(&("home".to_string(), 0)));
    assert!(listed.contains(&("settings".to_string(), 1)));
}

#[tokio::test]
async fn test_history_replays_from_log() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp_dir.path().join("forge.jsonl")).unwrap();

    {
        let (orch, _) = orchestrator_with(backend(), ArtifactStore::open(&path).unwrap());
        orch.create_document("home", "Home").unwrap();
        orch.submit(&home(), GenerationRequest::new("search"))
            .await
            .unwrap();
        orch.submit(&home(), GenerationRequest::new("stripe the table"))
            .await
            .unwrap();
        orch.restore(&home(), 1).unwrap();
    }

    let store = ArtifactStore::open(&path).unwrap();
    assert_eq!(store.current(&home()).unwrap().version, 1);
    let versions: Vec<u64> = store
        .list_history(&home())
        .unwrap()
        .iter()
        .map(|a| a.version)
        .collect();
    assert_eq!(versions, vec![2, 1, 0]);

    let (orch, _) = orchestrator_with(backend(), store);
    let snapshot = orch.snapshot(&home()).unwrap();
    assert_eq!(snapshot.phase, PipelinePhase::Ready);
    assert!(snapshot.current_artifact.code.contains("assembled"));

    // Refines the restored version and numbers past the old maximum.
    let outcome = orch
        .submit(&home(), GenerationRequest::new("one more tweak"))
        .await
        .unwrap();
    assert_eq!(outcome, GenerationOutcome::Committed { version: 3 });
}

#[tokio::test]
async fn test_corrupt_log_is_rejected() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp_dir.path().join("forge.jsonl")).unwrap();
    std::fs::write(&path, "{\"not\": \"a record\"}\n").unwrap();

    let err = ArtifactStore::open(&path).unwrap_err();
    assert!(matches!(err, forge::StoreError::LogCorrupt { line: 1, .. }));
}
