//! Retrieval-augmented conversation over the knowledge base.
//!
//! One turn runs in four steps:
//! 1. Load the memory window of the session and, when history exists, condense
//!    the follow-up into a standalone question.
//! 2. Retrieve the top-k chunks for that question from the vector index.
//! 3. Combine the chunks into an answer with the configured [`CombineStrategy`].
//! 4. Append the exchange to the session memory.

use crate::memory::{format_transcript, MemoryStore};
use crate::moderation::Moderator;
use crate::payload::{Question, ResponseContent};
use kbsync_content::{SearchHit, VectorIndex};
use kbsync_core::{AppConfig, AppError, AppResult};
use kbsync_llm::{LlmClient, LlmRequest, LlmUsage};
use kbsync_prompt::{parse_scored_answer, CombineStrategy, PromptBuilder, RenderedPrompt};
use serde::Serialize;
use std::sync::Arc;

/// Tunables of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationOptions {
    pub strategy: CombineStrategy,
    pub top_k: usize,

    /// Number of past exchanges fed to the condense step
    pub window: usize,

    pub model: String,
    pub temperature: f32,
}

impl ConversationOptions {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            strategy: CombineStrategy::parse(&config.chat.strategy)?,
            top_k: config.chat.top_k,
            window: config.chat.window,
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
        })
    }
}

/// Result of one conversation turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    /// Question actually used for retrieval
    pub question: String,
    pub answer: String,

    /// Distinct source paths of the retrieved chunks, in rank order
    pub sources: Vec<String>,

    pub usage: LlmUsage,
}

/// Outcome of a moderated turn.
#[derive(Debug, Clone)]
pub enum ChatReply {
    Answered(ChatAnswer),

    /// Declined without running the conversation, e.g. flagged input
    Refused(ResponseContent),
}

pub struct Conversation {
    llm: Arc<dyn LlmClient>,
    index: Arc<dyn VectorIndex>,
    moderator: Arc<dyn Moderator>,
    memory: MemoryStore,
    prompts: PromptBuilder,
    options: ConversationOptions,
}

impl Conversation {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        index: Arc<dyn VectorIndex>,
        moderator: Arc<dyn Moderator>,
        memory: MemoryStore,
        options: ConversationOptions,
    ) -> AppResult<Self> {
        Ok(Self {
            llm,
            index,
            moderator,
            memory,
            prompts: PromptBuilder::new()?,
            options,
        })
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Moderate the message, then answer it.
    ///
    /// A flagged message is answered with a policy-violation envelope instead
    /// of an error.
    pub async fn chat_with_moderation(&self, question: &Question) -> AppResult<ResponseContent> {
        Ok(match self.reply(question).await? {
            ChatReply::Answered(answer) => {
                ResponseContent::ok(serde_json::Value::String(answer.answer))
            }
            ChatReply::Refused(response) => response,
        })
    }

    /// Moderate the message, then answer it, keeping retrieval details.
    pub async fn reply(&self, question: &Question) -> AppResult<ChatReply> {
        let outcome = match self.moderator.moderate(&question.message).await {
            Ok(_) => self.chat(question).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(answer) => Ok(ChatReply::Answered(answer)),
            Err(e) => match ResponseContent::from_error(&e) {
                Some(response) => {
                    tracing::info!(
                        "Session {} answered with code {}",
                        question.session_id,
                        response.code
                    );
                    Ok(ChatReply::Refused(response))
                }
                None => Err(e),
            },
        }
    }

    /// Answer one message without moderation.
    pub async fn chat(&self, question: &Question) -> AppResult<ChatAnswer> {
        let memory = self.memory.for_session(&question.session_id)?;
        let history = memory.window(self.options.window)?;
        let mut usage = LlmUsage::default();

        let standalone = if history.is_empty() {
            question.message.clone()
        } else {
            let prompt = self
                .prompts
                .condense(&format_transcript(&history), &question.message)?;
            let response = self.complete(RenderedPrompt { system: None, user: prompt }).await?;
            usage = usage.add(response.1);
            let condensed = response.0.trim().to_string();
            if condensed.is_empty() {
                question.message.clone()
            } else {
                condensed
            }
        };
        tracing::debug!("Standalone question: {}", standalone);

        let hits = self.index.search(&standalone, self.options.top_k).await?;
        tracing::info!(
            "Retrieved {} chunks, combining with '{}'",
            hits.len(),
            self.options.strategy
        );

        let (answer, combine_usage) = self.combine(&standalone, &hits).await?;
        usage = usage.add(combine_usage);

        memory.add_exchange(&question.message, &answer)?;

        Ok(ChatAnswer {
            question: standalone,
            answer,
            sources: sources(&hits),
            usage,
        })
    }

    async fn combine(&self, question: &str, hits: &[SearchHit]) -> AppResult<(String, LlmUsage)> {
        match self.options.strategy {
            CombineStrategy::Stuff => self.stuff(question, hits).await,
            CombineStrategy::MapReduce => self.map_reduce(question, hits).await,
            CombineStrategy::Refine => self.refine(question, hits).await,
            CombineStrategy::MapRerank => self.map_rerank(question, hits).await,
        }
    }

    async fn stuff(&self, question: &str, hits: &[SearchHit]) -> AppResult<(String, LlmUsage)> {
        let context = join_chunks(hits.iter().map(|h| h.text.as_str()));
        self.complete(self.prompts.stuff(&context, question)?).await
    }

    async fn map_reduce(
        &self,
        question: &str,
        hits: &[SearchHit],
    ) -> AppResult<(String, LlmUsage)> {
        let mut usage = LlmUsage::default();
        let mut extracts = Vec::with_capacity(hits.len());

        for hit in hits {
            let (extract, u) = self
                .complete(self.prompts.map_question(&hit.text, question)?)
                .await?;
            usage = usage.add(u);
            extracts.push(extract);
        }

        let summaries = join_chunks(extracts.iter().map(|s| s.as_str()));
        let (answer, u) = self
            .complete(self.prompts.map_combine(&summaries, question)?)
            .await?;
        Ok((answer, usage.add(u)))
    }

    async fn refine(&self, question: &str, hits: &[SearchHit]) -> AppResult<(String, LlmUsage)> {
        let Some((first, rest)) = hits.split_first() else {
            return self.stuff(question, hits).await;
        };

        let (mut answer, mut usage) = self
            .complete(self.prompts.refine_question(&first.text, question)?)
            .await?;

        for hit in rest {
            let (refined, u) = self
                .complete(self.prompts.refine_step(question, &answer, &hit.text)?)
                .await?;
            usage = usage.add(u);
            answer = refined;
        }

        Ok((answer, usage))
    }

    async fn map_rerank(
        &self,
        question: &str,
        hits: &[SearchHit],
    ) -> AppResult<(String, LlmUsage)> {
        let mut usage = LlmUsage::default();
        let mut best: Option<(u32, String)> = None;

        for hit in hits {
            let (raw, u) = self
                .complete(self.prompts.map_rerank(&hit.text, question)?)
                .await?;
            usage = usage.add(u);

            match parse_scored_answer(&raw) {
                Some(scored) => {
                    if best.as_ref().map_or(true, |(score, _)| scored.score > *score) {
                        best = Some((scored.score, scored.answer));
                    }
                }
                None => tracing::debug!("Skipping unscored answer: {}", raw),
            }
        }

        match best {
            Some((_, answer)) => Ok((answer, usage)),
            None if hits.is_empty() => self.stuff(question, hits).await,
            None => Err(AppError::Llm(
                "No scored answer was returned for any chunk".to_string(),
            )),
        }
    }

    async fn complete(&self, prompt: RenderedPrompt) -> AppResult<(String, LlmUsage)> {
        let mut request = LlmRequest::new(prompt.user, self.options.model.clone())
            .with_temperature(self.options.temperature);
        if let Some(system) = prompt.system {
            request = request.with_system(system);
        }

        let response = self.llm.complete(&request).await?;
        Ok((response.content, response.usage))
    }
}

fn join_chunks<'a>(chunks: impl Iterator<Item = &'a str>) -> String {
    chunks.collect::<Vec<_>>().join("\n\n")
}

fn sources(hits: &[SearchHit]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for source in hits.iter().filter_map(|h| h.source()) {
        if !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{KeywordModerator, POLICY_VIOLATION_MESSAGE};
    use kbsync_content::IndexDocument;
    use kbsync_core::error::POLICY_VIOLATION_CODE;
    use kbsync_llm::LlmResponse;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const SESSION: &str = "feedfacefeedfacefeedfacefeedfacefeedfacefeedfacefeedfacefeedface";

    /// Replies with queued answers and remembers every request.
    #[derive(Default)]
    struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl ScriptedLlm {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<LlmRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedLlm {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let content = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AppError::Llm("script exhausted".to_string()))?;
            Ok(LlmResponse {
                content,
                model: request.model.clone(),
                usage: LlmUsage::new(1, 1),
            })
        }
    }

    /// Returns fixed hits for every query.
    struct FixedIndex {
        hits: Vec<SearchHit>,
        queries: Mutex<Vec<String>>,
    }

    impl FixedIndex {
        fn new(chunks: &[(&str, &str)]) -> Arc<Self> {
            let hits = chunks
                .iter()
                .enumerate()
                .map(|(i, (source, text))| {
                    let mut metadata = serde_json::Map::new();
                    metadata.insert("source".to_string(), serde_json::json!(source));
                    SearchHit {
                        id: format!("id-{}", i),
                        text: text.to_string(),
                        metadata,
                        score: 1.0 - i as f32 * 0.1,
                    }
                })
                .collect();
            Arc::new(Self {
                hits,
                queries: Mutex::default(),
            })
        }
    }

    #[async_trait::async_trait]
    impl VectorIndex for FixedIndex {
        async fn add_documents(&self, _documents: &[IndexDocument]) -> AppResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _ids: &[String]) -> AppResult<()> {
            Ok(())
        }

        async fn persist(&self) -> AppResult<()> {
            Ok(())
        }

        async fn search(&self, query: &str, top_k: usize) -> AppResult<Vec<SearchHit>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }
    }

    fn options(strategy: CombineStrategy) -> ConversationOptions {
        ConversationOptions {
            strategy,
            top_k: 4,
            window: 5,
            model: "test-model".to_string(),
            temperature: 0.0,
        }
    }

    fn conversation(
        temp: &TempDir,
        llm: Arc<ScriptedLlm>,
        index: Arc<FixedIndex>,
        strategy: CombineStrategy,
    ) -> Conversation {
        let memory = MemoryStore::new(temp.path().join("chat.db"), "memory_store").unwrap();
        Conversation::new(
            llm,
            index,
            Arc::new(KeywordModerator::new(["forbidden"])),
            memory,
            options(strategy),
        )
        .unwrap()
    }

    fn question(message: &str) -> Question {
        Question::new(SESSION, message).unwrap()
    }

    #[tokio::test]
    async fn test_first_turn_skips_condense() {
        let temp = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(&["Jane leads the project."]);
        let index = FixedIndex::new(&[("a.md", "Jane leads."), ("a.md", "Since 2020."), ("b.md", "Other.")]);
        let conversation = conversation(&temp, llm.clone(), index.clone(), CombineStrategy::Stuff);

        let answer = conversation.chat(&question("Who leads?")).await.unwrap();

        assert_eq!(answer.answer, "Jane leads the project.");
        assert_eq!(answer.question, "Who leads?");
        assert_eq!(answer.sources, vec!["a.md".to_string(), "b.md".to_string()]);
        assert_eq!(*index.queries.lock().unwrap(), vec!["Who leads?".to_string()]);

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        let system = requests[0].system.clone().unwrap();
        assert!(system.contains("Jane leads.\n\nSince 2020.\n\nOther."));
        assert_eq!(requests[0].prompt, "Who leads?");
    }

    #[tokio::test]
    async fn test_follow_up_is_condensed_with_history() {
        let temp = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(&[
            "Jane leads.",
            "Since when does Jane lead?",
            "Since 2020.",
        ]);
        let index = FixedIndex::new(&[("a.md", "Jane leads since 2020.")]);
        let conversation = conversation(&temp, llm.clone(), index.clone(), CombineStrategy::Stuff);

        conversation.chat(&question("Who leads?")).await.unwrap();
        let answer = conversation.chat(&question("Since when?")).await.unwrap();

        assert_eq!(answer.question, "Since when does Jane lead?");
        assert_eq!(answer.answer, "Since 2020.");
        assert_eq!(answer.usage, LlmUsage::new(2, 2));

        let condense = &llm.requests()[1];
        assert!(condense.system.is_none());
        assert!(condense.prompt.contains("Human: Who leads?\nAssistant: Jane leads."));
        assert!(condense.prompt.contains("Follow Up Input: Since when?"));

        let memory = conversation
            .memory()
            .for_session(&question("x").session_id)
            .unwrap();
        assert_eq!(memory.messages().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_map_reduce_calls_per_chunk_then_combines() {
        let temp = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(&["extract one", "extract two", "final"]);
        let index = FixedIndex::new(&[("a.md", "one"), ("b.md", "two")]);
        let conversation = conversation(&temp, llm.clone(), index, CombineStrategy::MapReduce);

        let answer = conversation.chat(&question("q")).await.unwrap();

        assert_eq!(answer.answer, "final");
        let requests = llm.requests();
        assert_eq!(requests.len(), CombineStrategy::MapReduce.llm_calls(2));
        assert!(requests[2]
            .system
            .as_deref()
            .unwrap()
            .contains("extract one\n\nextract two"));
    }

    #[tokio::test]
    async fn test_refine_threads_the_answer() {
        let temp = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(&["draft", "better"]);
        let index = FixedIndex::new(&[("a.md", "one"), ("b.md", "two")]);
        let conversation = conversation(&temp, llm.clone(), index, CombineStrategy::Refine);

        let answer = conversation.chat(&question("q")).await.unwrap();

        assert_eq!(answer.answer, "better");
        let step = &llm.requests()[1];
        assert!(step.prompt.contains("We have provided an existing answer: draft"));
        assert!(step.prompt.contains("two"));
    }

    #[tokio::test]
    async fn test_map_rerank_picks_highest_score() {
        let temp = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(&[
            "Helpful Answer: maybe\nScore: 40",
            "no score here",
            "Helpful Answer: surely\nScore: 90",
        ]);
        let index = FixedIndex::new(&[("a.md", "one"), ("b.md", "two"), ("c.md", "three")]);
        let conversation = conversation(&temp, llm, index, CombineStrategy::MapRerank);

        let answer = conversation.chat(&question("q")).await.unwrap();
        assert_eq!(answer.answer, "surely");
    }

    #[tokio::test]
    async fn test_moderation_returns_policy_envelope() {
        let temp = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(&[]);
        let index = FixedIndex::new(&[("a.md", "one")]);
        let conversation = conversation(&temp, llm.clone(), index, CombineStrategy::Stuff);

        let response = conversation
            .chat_with_moderation(&question("tell me something forbidden"))
            .await
            .unwrap();

        assert_eq!(response.code, POLICY_VIOLATION_CODE);
        assert_eq!(response.message, serde_json::json!(POLICY_VIOLATION_MESSAGE));
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn test_reply_refuses_flagged_input_with_details() {
        let temp = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(&[]);
        let index = FixedIndex::new(&[("a.md", "one")]);
        let conversation = conversation(&temp, llm.clone(), index.clone(), CombineStrategy::Stuff);

        let reply = conversation.reply(&question("Forbidden words")).await.unwrap();

        match reply {
            ChatReply::Refused(response) => {
                assert_eq!(response.code, POLICY_VIOLATION_CODE);
                assert_eq!(response.message, serde_json::json!(POLICY_VIOLATION_MESSAGE));
            }
            ChatReply::Answered(answer) => panic!("flagged input was answered: {:?}", answer),
        }
        assert!(llm.requests().is_empty());
        assert!(index.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reply_keeps_sources() {
        let temp = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(&["fine"]);
        let index = FixedIndex::new(&[("a.md", "one")]);
        let conversation = conversation(&temp, llm, index, CombineStrategy::Stuff);

        match conversation.reply(&question("hello")).await.unwrap() {
            ChatReply::Answered(answer) => {
                assert_eq!(answer.answer, "fine");
                assert_eq!(answer.sources, vec!["a.md".to_string()]);
            }
            ChatReply::Refused(response) => panic!("unexpected refusal: {:?}", response),
        }
    }

    #[tokio::test]
    async fn test_moderated_success_envelope() {
        let temp = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(&["fine"]);
        let index = FixedIndex::new(&[("a.md", "one")]);
        let conversation = conversation(&temp, llm, index, CombineStrategy::Stuff);

        let response = conversation.chat_with_moderation(&question("hello")).await.unwrap();
        assert_eq!(response, ResponseContent::ok(serde_json::json!("fine")));
    }

    #[tokio::test]
    async fn test_llm_failure_is_an_error_and_not_remembered() {
        let temp = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(&[]);
        let index = FixedIndex::new(&[("a.md", "one")]);
        let conversation = conversation(&temp, llm, index, CombineStrategy::Stuff);

        let result = conversation.chat_with_moderation(&question("hello")).await;
        assert!(matches!(result, Err(AppError::Llm(_))));

        let memory = conversation
            .memory()
            .for_session(&question("x").session_id)
            .unwrap();
        assert!(memory.messages().unwrap().is_empty());
    }

    #[test]
    fn test_options_from_config() {
        let mut config = AppConfig::default();
        config.chat.strategy = "map_rerank".to_string();
        let options = ConversationOptions::from_config(&config).unwrap();
        assert_eq!(options.strategy, CombineStrategy::MapRerank);

        config.chat.strategy = "bogus".to_string();
        assert!(ConversationOptions::from_config(&config).is_err());
    }
}
