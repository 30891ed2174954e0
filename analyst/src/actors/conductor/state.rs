//! Per-run conversation state
//!
//! A `ConversationState` is owned by exactly one run. Messages are
//! append-only; `next`, `reasoning` and `information_needed` reflect the most
//! recent supervisor decision and `decisions` keeps the whole trail.

use chrono::{DateTime, Utc};
use shared_types::{
    AnalysisError, AnalysisMessage, AnalysisRunResponse, AnalysisRunStatus, DecisionTrace,
    MessageRole, ROUTE_FINISH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Worker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Worker id for worker-authored messages
    pub author: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            author: None,
        }
    }

    pub fn from_worker(worker_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Worker,
            content: content.into(),
            author: Some(worker_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Worker(String),
    Finish,
}

impl RouteTarget {
    /// Maps the wire value: `FINISH` or a worker id.
    pub fn parse(value: &str) -> Self {
        if value == ROUTE_FINISH {
            RouteTarget::Finish
        } else {
            RouteTarget::Worker(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RouteTarget::Worker(id) => id,
            RouteTarget::Finish => ROUTE_FINISH,
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, RouteTarget::Finish)
    }
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured supervisor output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub next: RouteTarget,
    pub reasoning: String,
    pub information_needed: Vec<String>,
}

impl RoutingDecision {
    pub fn finish(reasoning: impl Into<String>) -> Self {
        Self {
            next: RouteTarget::Finish,
            reasoning: reasoning.into(),
            information_needed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRecord {
    pub turn: u32,
    pub decision: RoutingDecision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    messages: Vec<Message>,
    team_members: Vec<String>,
    next: Option<RouteTarget>,
    information_needed: Vec<String>,
    reasoning: String,
    decisions: Vec<DecisionRecord>,
}

impl ConversationState {
    /// Fresh state seeded with the user query.
    pub fn new(query: impl Into<String>, team_members: Vec<String>) -> Self {
        Self {
            messages: vec![Message::user(query)],
            team_members,
            next: None,
            information_needed: Vec::new(),
            reasoning: String::new(),
            decisions: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn team_members(&self) -> &[String] {
        &self.team_members
    }

    pub fn next(&self) -> Option<&RouteTarget> {
        self.next.as_ref()
    }

    pub fn information_needed(&self) -> &[String] {
        &self.information_needed
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn decisions(&self) -> &[DecisionRecord] {
        &self.decisions
    }

    pub fn query(&self) -> &str {
        self.messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Overwrites the latest supervisor fields and extends the trail.
    pub fn record_decision(&mut self, turn: u32, decision: &RoutingDecision) {
        self.reasoning = decision.reasoning.clone();
        self.information_needed = decision.information_needed.clone();
        self.decisions.push(DecisionRecord {
            turn,
            decision: decision.clone(),
        });
    }

    pub fn set_next(&mut self, next: RouteTarget) {
        self.next = Some(next);
    }

    pub fn is_member(&self, worker_id: &str) -> bool {
        self.team_members.iter().any(|m| m == worker_id)
    }

    pub fn worker_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Worker)
            .count()
    }

    pub fn to_response(
        &self,
        run_id: &str,
        status: AnalysisRunStatus,
        error: Option<AnalysisError>,
        started_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
    ) -> AnalysisRunResponse {
        AnalysisRunResponse {
            run_id: run_id.to_string(),
            status,
            query: self.query().to_string(),
            messages: self
                .messages
                .iter()
                .map(|m| AnalysisMessage {
                    role: match m.role {
                        Role::User => MessageRole::User,
                        Role::Worker => MessageRole::Worker,
                    },
                    content: m.content.clone(),
                    author: m.author.clone(),
                })
                .collect(),
            reasoning: self.reasoning.clone(),
            information_needed: self.information_needed.clone(),
            decisions: self
                .decisions
                .iter()
                .map(|record| DecisionTrace {
                    turn: record.turn,
                    next: record.decision.next.as_str().to_string(),
                    reasoning: record.decision.reasoning.clone(),
                    information_needed: record.decision.information_needed.clone(),
                })
                .collect(),
            error,
            started_at,
            finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team() -> Vec<String> {
        vec!["Search".to_string(), "DocAnalyst".to_string()]
    }

    #[test]
    fn test_new_state_is_seeded_with_user_query() {
        let state = ConversationState::new("What was revenue?", team());
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].role, Role::User);
        assert!(state.messages()[0].author.is_none());
        assert!(state.next().is_none());
        assert!(state.information_needed().is_empty());
        assert_eq!(state.reasoning(), "");
        assert_eq!(state.query(), "What was revenue?");
    }

    #[test]
    fn test_record_decision_overwrites_latest_fields() {
        let mut state = ConversationState::new("q", team());
        state.record_decision(
            1,
            &RoutingDecision {
                next: RouteTarget::Worker("DocAnalyst".to_string()),
                reasoning: "need filing".to_string(),
                information_needed: vec!["revenue".to_string()],
            },
        );
        state.record_decision(2, &RoutingDecision::finish("done"));

        assert_eq!(state.reasoning(), "done");
        assert!(state.information_needed().is_empty());
        assert_eq!(state.decisions().len(), 2);
        assert_eq!(state.decisions()[0].decision.reasoning, "need filing");
    }

    #[test]
    fn test_route_target_wire_values() {
        assert_eq!(RouteTarget::parse("FINISH"), RouteTarget::Finish);
        assert_eq!(
            RouteTarget::parse("Search"),
            RouteTarget::Worker("Search".to_string())
        );
        assert_eq!(RouteTarget::Finish.to_string(), "FINISH");
        assert!(!RouteTarget::parse("finish").is_finish());
    }

    #[test]
    fn test_to_response_maps_history_and_trail() {
        let mut state = ConversationState::new("q", team());
        state.record_decision(
            1,
            &RoutingDecision {
                next: RouteTarget::Worker("Search".to_string()),
                reasoning: "market view".to_string(),
                information_needed: vec!["analyst ratings".to_string()],
            },
        );
        state.append(Message::from_worker("Search", "ratings: buy"));

        let started = Utc::now();
        let response = state.to_response(
            "run_1",
            AnalysisRunStatus::Running,
            None,
            started,
            None,
        );
        assert_eq!(response.messages.len(), 2);
        assert_eq!(response.messages[1].role, MessageRole::Worker);
        assert_eq!(response.messages[1].author.as_deref(), Some("Search"));
        assert_eq!(response.decisions[0].next, "Search");
        assert_eq!(response.information_needed, vec!["analyst ratings"]);
        assert_eq!(response.final_answer(), Some("ratings: buy"));
        assert_eq!(state.worker_message_count(), 1);
    }
}
