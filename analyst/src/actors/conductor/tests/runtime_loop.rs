use std::sync::Arc;
use std::time::Duration;

use shared_types::AnalysisRunStatus;

use crate::actors::agent_harness::test_support::{text, tool, ScriptedGateway};
use crate::actors::agent_harness::{AgentHarness, HarnessConfig};
use crate::actors::collaborator::CollaboratorError;
use crate::actors::conductor::registry::WorkerRegistry;
use crate::actors::conductor::runtime::{Orchestrator, RunPolicy};
use crate::actors::conductor::state::{ConversationState, Role, RoutingDecision};
use crate::actors::conductor::supervisor::{LlmSupervisor, ROUTE_TOOL_NAME};
use crate::actors::conductor::workers::{HarnessWorker, WorkerAgent, WorkerFailurePolicy};
use crate::actors::conductor::ConductorError;
use crate::actors::model_gateway::ModelGateway;
use crate::actors::search::{SearchCollaborator, SearchPort};

use super::support::{
    orchestrator, route, route_needing, FailingWorker, RecordingWorker, ScriptedSupervisor,
    SlowWorker,
};

fn team_workers() -> (Arc<RecordingWorker>, Arc<RecordingWorker>) {
    (
        Arc::new(RecordingWorker::new("Search", "Market Data: consensus is buy")),
        Arc::new(RecordingWorker::new("DocAnalyst", "Total net sales were $383.3B")),
    )
}

fn policy(max_turns: u32) -> RunPolicy {
    RunPolicy {
        max_turns,
        ..RunPolicy::default()
    }
}

fn authors(state: &ConversationState) -> Vec<Option<String>> {
    state.messages().iter().map(|m| m.author.clone()).collect()
}

#[tokio::test]
async fn test_doc_analyst_then_finish() {
    let supervisor = Arc::new(ScriptedSupervisor::new(vec![
        route("DocAnalyst"),
        RoutingDecision::finish("Revenue found"),
    ]));
    let (search, doc) = team_workers();
    let orchestrator = orchestrator(
        supervisor.clone(),
        vec![search.clone(), doc.clone()],
        RunPolicy::default(),
    );

    let outcome = orchestrator
        .run_query("run_a", "What is the total revenue?")
        .await;

    assert_eq!(outcome.status, AnalysisRunStatus::Finished);
    assert!(outcome.error.is_none());
    assert_eq!(
        authors(&outcome.state),
        vec![None, Some("DocAnalyst".to_string())]
    );
    assert_eq!(outcome.state.messages()[0].role, Role::User);
    assert_eq!(supervisor.calls(), 2);
    assert_eq!(search.invocations(), 0);
    assert_eq!(doc.invocations(), 1);

    let response = outcome.to_response("run_a");
    assert_eq!(response.final_answer(), Some("Total net sales were $383.3B"));
    assert_eq!(response.decisions.len(), 2);
    assert_eq!(response.decisions[1].next, "FINISH");
    assert!(response.finished_at.is_some());
}

#[tokio::test]
async fn test_endless_routing_hits_turn_ceiling() {
    let supervisor = Arc::new(ScriptedSupervisor::always(route("Search")));
    let (search, doc) = team_workers();
    let orchestrator = orchestrator(supervisor.clone(), vec![search.clone(), doc], policy(5));

    let outcome = orchestrator.run_query("run_b", "Loop forever").await;

    assert_eq!(outcome.status, AnalysisRunStatus::Failed);
    assert_eq!(
        outcome.error,
        Some(ConductorError::RunBoundExceeded { max_turns: 5 })
    );
    assert_eq!(supervisor.calls(), 5);
    assert_eq!(outcome.turns(), 5);
    // partial history survives
    assert_eq!(outcome.state.messages().len(), 6);
    assert_eq!(search.invocations(), 5);

    let response = outcome.to_response("run_b");
    assert_eq!(response.error.unwrap().code, "RUN_BOUND_EXCEEDED");
}

#[tokio::test]
async fn test_unknown_worker_fails_without_worker_invocation() {
    let supervisor = Arc::new(ScriptedSupervisor::new(vec![route("UnknownWorker")]));
    let (search, doc) = team_workers();
    let orchestrator = orchestrator(
        supervisor.clone(),
        vec![search.clone(), doc.clone()],
        RunPolicy::default(),
    );

    let outcome = orchestrator.run_query("run_c", "q").await;

    assert_eq!(outcome.status, AnalysisRunStatus::Failed);
    assert!(matches!(
        outcome.error,
        Some(ConductorError::RoutingSchema(_))
    ));
    assert_eq!(supervisor.calls(), 1);
    assert_eq!(search.invocations() + doc.invocations(), 0);
    assert_eq!(outcome.state.messages().len(), 1);
    // the rejected decision stays in the trail for debugging
    assert_eq!(outcome.state.decisions().len(), 1);
    assert!(outcome.state.next().is_none());
}

#[tokio::test]
async fn test_empty_team_finishes_with_seed_only() {
    let gateway = Arc::new(ScriptedGateway::new(vec![]));
    let shared: Arc<dyn ModelGateway> = gateway.clone();
    let orchestrator = Orchestrator::new(
        Arc::new(LlmSupervisor::new(shared)),
        WorkerRegistry::new(),
        RunPolicy::default(),
    );

    let outcome = orchestrator.run_query("run_d", "Anything?").await;

    assert!(outcome.is_finished());
    assert_eq!(outcome.state.messages().len(), 1);
    assert_eq!(outcome.turns(), 1);
    assert!(outcome.state.team_members().is_empty());
    assert!(gateway.recorded().is_empty());
}

#[tokio::test]
async fn test_every_run_terminates_within_ceiling() {
    let scripts: Vec<Vec<RoutingDecision>> = vec![
        vec![],
        vec![route("Search"), route("DocAnalyst"), route("Search")],
        vec![route("Search"); 10],
        vec![route("DocAnalyst"), route("Nobody")],
    ];

    for script in scripts {
        let supervisor = Arc::new(ScriptedSupervisor::new(script));
        let (search, doc) = team_workers();
        let orchestrator = orchestrator(supervisor.clone(), vec![search, doc], policy(3));

        let outcome = orchestrator.run_query("run_p1", "q").await;

        assert!(outcome.status.is_terminal());
        assert!(supervisor.calls() <= 3);
    }
}

#[tokio::test]
async fn test_messages_grow_by_one_per_worker_turn() {
    let supervisor = Arc::new(ScriptedSupervisor::new(vec![
        route("Search"),
        route("DocAnalyst"),
        route("Search"),
        RoutingDecision::finish("done"),
    ]));
    let (search, doc) = team_workers();
    let orchestrator = orchestrator(
        supervisor,
        vec![search.clone(), doc.clone()],
        RunPolicy::default(),
    );

    let outcome = orchestrator.run_query("run_p2", "q").await;

    // each worker saw exactly one more message than the previous worker turn
    let mut seen_lengths: Vec<usize> = search
        .seen()
        .iter()
        .chain(doc.seen().iter())
        .map(Vec::len)
        .collect();
    seen_lengths.sort_unstable();
    assert_eq!(seen_lengths, vec![1, 2, 3]);
    assert_eq!(outcome.state.messages().len(), 4);
    assert_eq!(outcome.state.worker_message_count(), 3);
}

#[tokio::test]
async fn test_decisions_stay_within_team_or_finish() {
    let supervisor = Arc::new(ScriptedSupervisor::new(vec![
        route("DocAnalyst"),
        route("Search"),
        RoutingDecision::finish("done"),
    ]));
    let (search, doc) = team_workers();
    let orchestrator = orchestrator(supervisor, vec![search, doc], RunPolicy::default());

    let outcome = orchestrator.run_query("run_p3", "q").await;

    assert!(outcome.is_finished());
    for record in outcome.state.decisions() {
        let next = record.decision.next.as_str();
        assert!(next == "FINISH" || outcome.state.is_member(next));
    }
}

#[tokio::test]
async fn test_information_needed_reaches_next_worker() {
    let supervisor = Arc::new(ScriptedSupervisor::new(vec![
        route_needing("Search", &["analyst price targets", "peer P/E ratios"]),
        RoutingDecision::finish("done"),
    ]));
    let (search, doc) = team_workers();
    let orchestrator = orchestrator(supervisor, vec![search.clone(), doc], RunPolicy::default());

    orchestrator
        .run_query("run_p4", "How does AAPL compare to peers?")
        .await;

    let seen = search.seen();
    assert_eq!(seen.len(), 1);
    let input = &seen[0][0].content;
    assert!(input.contains("- analyst price targets\n- peer P/E ratios"));
    assert!(input.ends_with("Query: How does AAPL compare to peers?"));
}

#[tokio::test]
async fn test_rerun_with_fixed_stubs_is_deterministic() {
    let script = || {
        vec![
            route("Search"),
            route("DocAnalyst"),
            RoutingDecision::finish("done"),
        ]
    };

    let mut runs = Vec::new();
    for run_id in ["run_p5_1", "run_p5_2"] {
        let (search, doc) = team_workers();
        let orchestrator = orchestrator(
            Arc::new(ScriptedSupervisor::new(script())),
            vec![search, doc],
            RunPolicy::default(),
        );
        runs.push(orchestrator.run_query(run_id, "Same question").await);
    }

    assert_eq!(
        runs[0].state.messages().len(),
        runs[1].state.messages().len()
    );
    assert_eq!(authors(&runs[0].state), authors(&runs[1].state));
}

#[tokio::test]
async fn test_degraded_worker_failure_keeps_running() {
    let supervisor = Arc::new(ScriptedSupervisor::new(vec![
        route("Search"),
        RoutingDecision::finish("partial information"),
    ]));
    let (_, doc) = team_workers();
    let orchestrator = orchestrator(
        supervisor,
        vec![Arc::new(FailingWorker::new("Search")), doc],
        RunPolicy::default(),
    );

    let outcome = orchestrator.run_query("run_degrade", "q").await;

    assert!(outcome.is_finished());
    let degraded = &outcome.state.messages()[1];
    assert_eq!(degraded.author.as_deref(), Some("Search"));
    assert_eq!(
        degraded.content,
        "Search could not complete its step: Decision failed: backend down"
    );
}

#[tokio::test]
async fn test_fatal_worker_failure_fails_run() {
    let supervisor = Arc::new(ScriptedSupervisor::new(vec![route("Search")]));
    let (_, doc) = team_workers();
    let orchestrator = orchestrator(
        supervisor,
        vec![Arc::new(FailingWorker::new("Search")), doc],
        RunPolicy {
            worker_failure: WorkerFailurePolicy::Fatal,
            ..RunPolicy::default()
        },
    );

    let outcome = orchestrator.run_query("run_fatal", "q").await;

    assert_eq!(outcome.status, AnalysisRunStatus::Failed);
    assert_eq!(
        outcome.error,
        Some(ConductorError::WorkerFailed {
            worker: "Search".to_string(),
            message: "Decision failed: backend down".to_string(),
        })
    );
    assert_eq!(outcome.state.messages().len(), 1);
}

#[tokio::test]
async fn test_supervisor_error_fails_run() {
    let supervisor = Arc::new(ScriptedSupervisor::failing(ConductorError::ModelGateway(
        "HTTP 500".to_string(),
    )));
    let (search, doc) = team_workers();
    let orchestrator = orchestrator(supervisor, vec![search, doc], RunPolicy::default());

    let outcome = orchestrator.run_query("run_gateway", "q").await;

    assert_eq!(outcome.status, AnalysisRunStatus::Failed);
    assert_eq!(
        outcome.to_response("run_gateway").error.unwrap().code,
        "MODEL_GATEWAY_ERROR"
    );
}

#[tokio::test]
async fn test_timeout_keeps_partial_history() {
    let supervisor = Arc::new(ScriptedSupervisor::new(vec![
        route("DocAnalyst"),
        route("Search"),
        RoutingDecision::finish("never reached"),
    ]));
    let (_, doc) = team_workers();
    let workers: Vec<Arc<dyn WorkerAgent>> = vec![
        Arc::new(SlowWorker::new("Search", Duration::from_secs(30))),
        doc,
    ];
    let orchestrator = orchestrator(
        supervisor,
        workers,
        RunPolicy {
            run_timeout: Duration::from_millis(100),
            ..RunPolicy::default()
        },
    );

    let outcome = orchestrator.run_query("run_timeout", "q").await;

    assert_eq!(outcome.status, AnalysisRunStatus::Failed);
    assert_eq!(
        outcome.error,
        Some(ConductorError::RunTimeout { timeout_ms: 100 })
    );
    assert_eq!(
        authors(&outcome.state),
        vec![None, Some("DocAnalyst".to_string())]
    );
    assert_eq!(outcome.turns(), 2);
}

struct CannedSearch;

#[async_trait::async_trait]
impl SearchCollaborator for CannedSearch {
    async fn search(&self, query: &str) -> Result<String, CollaboratorError> {
        Ok(format!("1. Analysts on {query}: overweight"))
    }
}

#[tokio::test]
async fn test_llm_supervisor_and_harness_worker_end_to_end() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
        tool(
            "r1",
            ROUTE_TOOL_NAME,
            serde_json::json!({
                "next": "Search",
                "reasoning": "Need market sentiment",
                "information_needed": ["analyst ratings"]
            }),
        ),
        tool("s1", "web_search", serde_json::json!({"query": "AAPL analyst ratings"})),
        text("Market Data: analysts are overweight"),
        tool(
            "r2",
            ROUTE_TOOL_NAME,
            serde_json::json!({"next": "FINISH", "reasoning": "Answered", "information_needed": []}),
        ),
    ]));
    let shared: Arc<dyn ModelGateway> = gateway.clone();
    let team = vec!["Search".to_string()];
    let search = HarnessWorker::new(
        "Search",
        AgentHarness::with_config(
            SearchPort::new(Arc::new(CannedSearch), team),
            shared.clone(),
            HarnessConfig::default(),
        ),
    );
    let orchestrator = Orchestrator::new(
        Arc::new(LlmSupervisor::new(shared)),
        WorkerRegistry::new().register(Arc::new(search)),
        RunPolicy::default(),
    );

    let outcome = orchestrator
        .run_query("run_e2e", "What do analysts think of AAPL?")
        .await;

    assert!(outcome.is_finished(), "{:?}", outcome.error);
    assert_eq!(
        outcome.state.messages()[1].content,
        "Market Data: analysts are overweight"
    );
    let callsites: Vec<String> = gateway
        .recorded()
        .iter()
        .map(|r| r.callsite.clone())
        .collect();
    assert_eq!(callsites, vec!["supervisor", "search", "search", "supervisor"]);
}
