//! DocAnalyst worker - retrieval over the ingested filing.
//!
//! `RagChain` is the default retrieval collaborator: lexical top-k over the
//! filing chunk store, then one model call that answers from that context.
//! `DocAnalystPort` exposes it to the agent harness as `retrieve_information`.

mod loader;
mod store;

pub use loader::{estimate_tokens, load_filing, split_into_chunks, DEFAULT_CHUNK_TOKENS};
pub use store::{chunk_hash, ChunkHit, FilingStore};

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::actors::agent_harness::{ExecutionContext, HarnessError, ToolExecution, WorkerPort};
use crate::actors::collaborator::CollaboratorError;
use crate::actors::model_config::{CALLSITE_DOC_ANALYST, CALLSITE_RAG};
use crate::actors::model_gateway::{
    ChatMessage, CompletionRequest, SharedModelGateway, ToolCall, ToolSpec,
};
use crate::actors::search::{query_argument, query_parameters_schema, worker_system_context};

pub const RETRIEVE_TOOL_NAME: &str = "retrieve_information";
pub const DEFAULT_TOP_K: usize = 4;

const DOC_ANALYST_SYSTEM_PROMPT: &str = "You are a financial analyst specialized in SEC filings analysis.\n\
After analyzing the filing:\n\
1. If you need market context, clearly state what specific market data you need.\n\
2. If numbers need industry comparison, explicitly request competitor data.\n\
3. Always include specific numbers and trends from the filing.\n\
4. Highlight significant changes or unusual patterns.\n\n\
Format your response as:\n\
1. Data from SEC Filings: [your findings]\n\
2. Additional Context Needed: [if any]\n\
3. Analysis: [your insights]";

pub type SharedRetrievalCollaborator = Arc<dyn RetrievalCollaborator>;

/// Document retrieval: question in, grounded answer text out.
#[async_trait]
pub trait RetrievalCollaborator: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<String, CollaboratorError>;
}

/// Filing chunk store plus answer synthesis.
pub struct RagChain {
    store: Arc<Mutex<FilingStore>>,
    gateway: SharedModelGateway,
    top_k: usize,
}

impl RagChain {
    pub fn new(store: FilingStore, gateway: SharedModelGateway) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            gateway,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Split `text` and add its chunks to the store. Returns the number of
    /// new chunks.
    pub async fn ingest_text(
        &self,
        source_ref: &str,
        text: &str,
    ) -> Result<usize, CollaboratorError> {
        let chunks = split_into_chunks(text, DEFAULT_CHUNK_TOKENS);
        let store = Arc::clone(&self.store);
        let source_ref = source_ref.to_string();
        tokio::task::spawn_blocking(move || {
            let mut guard = store
                .lock()
                .map_err(|_| CollaboratorError::Store("filing store lock poisoned".to_string()))?;
            guard
                .ingest_chunks(&source_ref, &chunks)
                .map_err(|e| CollaboratorError::Store(e.to_string()))
        })
        .await
        .map_err(|e| CollaboratorError::Store(format!("ingest task failed: {e}")))?
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<usize, CollaboratorError> {
        let text = load_filing(path)?;
        let inserted = self.ingest_text(&path.display().to_string(), &text).await?;
        tracing::info!(
            path = %path.display(),
            chunks_added = inserted,
            "Ingested filing"
        );
        Ok(inserted)
    }

    async fn top_chunks(&self, query: &str) -> Result<Vec<ChunkHit>, CollaboratorError> {
        let store = Arc::clone(&self.store);
        let query = query.to_string();
        let k = self.top_k;
        tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|_| CollaboratorError::Store("filing store lock poisoned".to_string()))?;
            guard
                .search(&query, k)
                .map_err(|e| CollaboratorError::Store(e.to_string()))
        })
        .await
        .map_err(|e| CollaboratorError::Store(format!("search task failed: {e}")))?
    }
}

#[async_trait]
impl RetrievalCollaborator for RagChain {
    async fn retrieve(&self, query: &str) -> Result<String, CollaboratorError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CollaboratorError::Validation(
                "retrieval query cannot be empty".to_string(),
            ));
        }

        let hits = self.top_chunks(query).await?;
        tracing::debug!(hits = hits.len(), "Retrieved filing chunks");
        if hits.is_empty() {
            return Ok(format!("No relevant filing context found for: {query}"));
        }

        let request = CompletionRequest::new(
            CALLSITE_RAG,
            vec![ChatMessage::user(answer_prompt(query, &hits))],
        );
        let response = self
            .gateway
            .complete(request)
            .await
            .map_err(|e| CollaboratorError::Synthesis(e.to_string()))?;
        response
            .content
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| CollaboratorError::Synthesis("model returned no answer".to_string()))
    }
}

fn answer_prompt(question: &str, hits: &[ChunkHit]) -> String {
    let context = hits
        .iter()
        .map(|hit| hit.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    format!(
        "You are a financial analyst. Use the provided context to answer questions about the \
         company's financials.\n\nContext: {context}\nQuestion: {question}\n\n\
         Answer the question based on the context provided. Include specific numbers and data \
         when available."
    )
}

/// Binds a retrieval collaborator to the agent harness.
pub struct DocAnalystPort {
    retrieval: SharedRetrievalCollaborator,
    team_members: Vec<String>,
}

impl DocAnalystPort {
    pub fn new(retrieval: SharedRetrievalCollaborator, team_members: Vec<String>) -> Self {
        Self {
            retrieval,
            team_members,
        }
    }
}

#[async_trait]
impl WorkerPort for DocAnalystPort {
    fn get_model_role(&self) -> &str {
        CALLSITE_DOC_ANALYST
    }

    fn get_system_context(&self, _ctx: &ExecutionContext) -> String {
        worker_system_context(DOC_ANALYST_SYSTEM_PROMPT, &self.team_members)
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![ToolSpec {
            name: RETRIEVE_TOOL_NAME.to_string(),
            description: "Analyze the SEC filing and extract specific information. Input should \
                          be a clear question about financial metrics, risks, or statements."
                .to_string(),
            parameters: query_parameters_schema("Question about the filing"),
        }]
    }

    async fn execute_tool_call(
        &self,
        _ctx: &ExecutionContext,
        tool_call: &ToolCall,
    ) -> Result<ToolExecution, HarnessError> {
        let started = Instant::now();
        if tool_call.name() != RETRIEVE_TOOL_NAME {
            return Err(HarnessError::ToolExecution(format!(
                "unknown tool: {}",
                tool_call.name()
            )));
        }
        let query = query_argument(tool_call)?;
        Ok(match self.retrieval.retrieve(&query).await {
            Ok(output) => ToolExecution::succeeded(RETRIEVE_TOOL_NAME, output, started),
            Err(e) => ToolExecution::failed(RETRIEVE_TOOL_NAME, e.to_string(), started),
        })
    }
}
