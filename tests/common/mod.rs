//! Fakes and fixtures shared by the integration tests.
//!
//! Nothing here talks to the network: embeddings come from a bag-of-words
//! model over a growing vocabulary and chat replies are scripted.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use nlsql_harness::catalog::StaticSchemaCatalog;
use nlsql_harness::config::{OrchestratorConfig, TargetConfig};
use nlsql_harness::embedding::EmbeddingProvider;
use nlsql_harness::executor::SqliteExecutor;
use nlsql_harness::few_shot::StaticExamples;
use nlsql_harness::generation::GenerationClient;
use nlsql_harness::guardrail::SqlGuardrail;
use nlsql_harness::llm::{ChatMessage, ChatModel};
use nlsql_harness::models::FewShotExample;
use nlsql_harness::orchestrator::Orchestrator;
use nlsql_harness::prompt::SUMMARY_SYSTEM_PROMPT;
use nlsql_harness::retrieval::RetrievalService;
use nlsql_harness::store::InMemorySegmentStore;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SCHEMA: &str = "\
# Star Wars database

Data imported from the public Star Wars API.

### people
- name TEXT
- gender TEXT

### films
- title TEXT
- episode_id INTEGER
";

pub fn rules() -> Vec<String> {
    vec!["gender values are lowercase: 'male', 'female', 'n/a'".to_string()]
}

pub fn catalog() -> StaticSchemaCatalog {
    StaticSchemaCatalog::new(SCHEMA, rules())
}

// ─── Embedder ───────────────────────────────────────────────────────

const DIMS: usize = 512;

/// Counts each lowercase alphanumeric word into its own dimension.
#[derive(Default)]
pub struct BagOfWordsEmbedder {
    vocabulary: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `embed` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vocabulary = self.vocabulary.lock().unwrap();
        let mut vec = vec![0.0f32; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let next = vocabulary.len();
            let index = *vocabulary.entry(word.to_lowercase()).or_insert(next);
            vec[index % DIMS] += 1.0;
        }
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

// ─── Chat model ─────────────────────────────────────────────────────

/// Replies to SQL generation requests from a script, one entry per call.
/// `None` entries fail like an unreachable model. Summarization requests
/// always get `summary`.
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
    summaries: AtomicUsize,
    summary: String,
}

impl ScriptedChat {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(Into::into)).collect()),
            prompts: Mutex::new(Vec::new()),
            summaries: AtomicUsize::new(0),
            summary: "There are 2 male characters: Luke Skywalker and Han Solo.".to_string(),
        })
    }

    /// Shorthand for a script where every reply succeeds.
    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Some(r.to_string())))
    }

    /// User prompts of every generation request, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn summaries(&self) -> usize {
        self.summaries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
        if messages[0].content == SUMMARY_SYSTEM_PROMPT {
            self.summaries.fetch_add(1, Ordering::SeqCst);
            return Ok(Some(self.summary.clone()));
        }

        self.prompts
            .lock()
            .unwrap()
            .push(messages.last().map(|m| m.content.clone()).unwrap_or_default());

        match self.replies.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(Some(reply)),
            Some(None) => bail!("connection refused"),
            None => bail!("script exhausted"),
        }
    }
}

// ─── Target database ────────────────────────────────────────────────

/// Create `target.sqlite` under `dir` with a populated `people` table.
pub async fn people_db(dir: &Path) -> PathBuf {
    let path = dir.join("target.sqlite");
    let pool = SqlitePool::connect_with(
        SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true),
    )
    .await
    .unwrap();

    sqlx::query("CREATE TABLE people (name TEXT, gender TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("CREATE TABLE films (title TEXT, episode_id INTEGER)")
        .execute(&pool)
        .await
        .unwrap();
    for (name, gender) in [
        ("Luke Skywalker", "male"),
        ("Leia Organa", "female"),
        ("Han Solo", "male"),
        ("R2-D2", "n/a"),
    ] {
        sqlx::query("INSERT INTO people (name, gender) VALUES (?, ?)")
            .bind(name)
            .bind(gender)
            .execute(&pool)
            .await
            .unwrap();
    }
    sqlx::query("INSERT INTO films (title, episode_id) VALUES ('A New Hope', 4)")
        .execute(&pool)
        .await
        .unwrap();

    pool.close().await;
    path
}

// ─── Pipeline ───────────────────────────────────────────────────────

pub struct Pipeline {
    pub orchestrator: Orchestrator,
    pub chat: Arc<ScriptedChat>,
    pub embedder: Arc<BagOfWordsEmbedder>,
}

pub struct PipelineBuilder {
    chat: Arc<ScriptedChat>,
    allowed_tables: Vec<String>,
    examples: Vec<FewShotExample>,
}

impl PipelineBuilder {
    pub fn new(chat: Arc<ScriptedChat>) -> Self {
        Self {
            chat,
            allowed_tables: Vec::new(),
            examples: Vec::new(),
        }
    }

    pub fn allowed_tables(mut self, tables: &[&str]) -> Self {
        self.allowed_tables = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn examples(mut self, examples: Vec<FewShotExample>) -> Self {
        self.examples = examples;
        self
    }

    pub async fn build(self, dir: &Path) -> Pipeline {
        let target = people_db(dir).await;
        let embedder = Arc::new(BagOfWordsEmbedder::new());

        let retrieval = RetrievalService::new(
            Arc::new(catalog()),
            embedder.clone(),
            Arc::new(InMemorySegmentStore::new()),
        )
        .with_search(5, 0.6);
        retrieval.reindex_if_stale().await.unwrap();

        let executor = SqliteExecutor::from_config(&TargetConfig {
            path: target,
            max_rows: 100,
            timeout_secs: 5,
        })
        .await
        .unwrap();

        let orchestrator = Orchestrator::new(
            Arc::new(retrieval),
            GenerationClient::new(self.chat.clone()),
            SqlGuardrail::new(&self.allowed_tables),
            Arc::new(executor),
            Arc::new(StaticExamples(self.examples)),
            &OrchestratorConfig::default(),
        );

        Pipeline {
            orchestrator,
            chat: self.chat,
            embedder,
        }
    }
}
