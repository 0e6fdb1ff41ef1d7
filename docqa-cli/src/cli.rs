//! Command definitions and execution.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use docqa_rag::indexer::remove_document;
use docqa_rag::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
use docqa_rag::{
    Answer, FileTextStore, InMemoryVectorStore, PromptBuilder, RagPipeline, VectorStore,
};
use docqa_telemetry::LogFormat;
use tracing::info;

use crate::loader::load_documents;
use crate::settings::{Overrides, Settings};

/// Ask grounded questions about your documents.
#[derive(Parser, Debug)]
#[command(name = "docqa", version, about, long_about = None)]
pub struct Cli {
    /// TOML settings file.
    #[arg(long, global = true, env = "DOCQA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format: pretty, compact or json.
    #[arg(long, global = true, env = "DOCQA_LOG_FORMAT", default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub provider: ProviderArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Default)]
pub struct ProviderArgs {
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, global = true, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    #[arg(long, global = true, env = "DOCQA_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    #[arg(long, global = true, env = "DOCQA_CHAT_MODEL")]
    pub chat_model: Option<String>,

    #[arg(long, global = true, env = "QDRANT_URL")]
    pub qdrant_url: Option<String>,

    #[arg(long, global = true, env = "DOCQA_COLLECTION")]
    pub collection: Option<String>,

    #[arg(long, global = true, env = "DOCQA_STORE_DIR")]
    pub store_dir: Option<PathBuf>,
}

impl ProviderArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.openai_base_url.clone(),
            embedding_model: self.embedding_model.clone(),
            chat_model: self.chat_model.clone(),
            qdrant_url: self.qdrant_url.clone(),
            collection: self.collection.clone(),
            store_dir: self.store_dir.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index .txt, .md and .jsonl files or directories.
    Index {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Answer a question from the indexed documents.
    Ask {
        question: String,
        /// Print the answer and citations as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove a document and all of its chunks.
    Delete { document_id: String },

    /// Print the effective configuration.
    ShowConfig,
}

/// Merge the settings file with flags and environment.
pub fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.apply(cli.provider.overrides());
    settings.validate()?;
    Ok(settings)
}

/// The vector and text stores. The local vector store must be written back
/// after every change.
struct Stores {
    vectors: Arc<dyn VectorStore>,
    texts: Arc<FileTextStore>,
    snapshot: Option<Arc<InMemoryVectorStore>>,
}

impl Stores {
    async fn open(settings: &Settings) -> Result<Self> {
        let providers = &settings.providers;
        let (vectors, snapshot) = match &providers.qdrant_url {
            Some(url) => (remote_store(url)?, None),
            None => {
                let store = Arc::new(InMemoryVectorStore::load(providers.vector_snapshot()).await?);
                (store.clone() as Arc<dyn VectorStore>, Some(store))
            }
        };
        let texts = Arc::new(FileTextStore::open(providers.text_dir()).await?);
        Ok(Self { vectors, texts, snapshot })
    }

    async fn persist(&self, settings: &Settings) -> Result<()> {
        if let Some(store) = &self.snapshot {
            let path = settings.providers.vector_snapshot();
            store.save(&path).await.with_context(|| format!("cannot write {}", path.display()))?;
        }
        Ok(())
    }
}

/// A pipeline over [`Stores`] with the OpenAI providers.
fn build_pipeline(settings: &Settings, stores: &Stores, api_key: Option<&str>) -> Result<RagPipeline> {
    let providers = &settings.providers;
    let Some(api_key) = api_key.filter(|k| !k.trim().is_empty()) else {
        bail!("OPENAI_API_KEY is not set");
    };
    let timeout = settings.rag.request_timeout().unwrap_or(std::time::Duration::from_secs(300));

    let mut embedder = OpenAIEmbeddingProvider::new(api_key)?
        .with_model(&providers.embedding_model, providers.embedding_dimensions)
        .with_timeout(timeout)?;
    let mut model =
        OpenAIChatModel::new(api_key)?.with_model(&providers.chat_model).with_timeout(timeout)?;
    if let Some(base_url) = &providers.base_url {
        embedder = embedder.with_base_url(base_url);
        model = model.with_base_url(base_url);
    }

    let mut prompt = PromptBuilder::new().with_options(settings.generation.clone());
    if let Some(system_prompt) = &providers.system_prompt {
        prompt = prompt.with_system_prompt(system_prompt);
    }

    Ok(RagPipeline::builder()
        .config(settings.rag.clone())
        .embedding_provider(Arc::new(embedder))
        .vector_store(stores.vectors.clone())
        .text_store(stores.texts.clone())
        .generative_model(Arc::new(model))
        .prompt_builder(prompt)
        .build()?)
}

#[cfg(feature = "qdrant")]
fn remote_store(url: &str) -> Result<Arc<dyn VectorStore>> {
    Ok(Arc::new(docqa_rag::qdrant::QdrantVectorStore::new(url)?))
}

#[cfg(not(feature = "qdrant"))]
fn remote_store(_url: &str) -> Result<Arc<dyn VectorStore>> {
    bail!("QDRANT_URL is set but docqa was built without the `qdrant` feature")
}

/// Execute the parsed command.
pub async fn execute(cli: Cli) -> Result<()> {
    let settings = resolve_settings(&cli)?;
    if let Commands::ShowConfig = cli.command {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    let stores = Stores::open(&settings).await?;
    let collection = settings.providers.collection.as_str();
    let api_key = cli.provider.openai_api_key.as_deref();

    match cli.command {
        Commands::Index { paths } => {
            let pipeline = build_pipeline(&settings, &stores, api_key)?;
            let documents = load_documents(&paths).await?;
            info!(documents = documents.len(), "loaded documents");
            let report = pipeline.index(collection, &documents).await?;
            stores.persist(&settings).await?;

            println!(
                "Indexed {} document(s): {} chunk(s) stored, {} failed, {} stale removed",
                report.documents, report.succeeded, report.failed, report.removed_stale
            );
            for failed in &report.failed_chunks {
                println!("  failed {} ({}): {}", failed.chunk_id, failed.document_id, failed.reason);
            }
            if !report.is_complete() {
                bail!("{} chunk(s) could not be indexed", report.failed);
            }
        }
        Commands::Ask { question, json } => {
            let pipeline = build_pipeline(&settings, &stores, api_key)?;
            let answer = pipeline.ask(collection, &question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print!("{}", render_answer(&answer));
            }
        }
        Commands::Delete { document_id } => {
            let removed = delete_document(&settings, &stores, &document_id).await?;
            stores.persist(&settings).await?;
            println!("Removed {removed} chunk(s) of '{document_id}'");
        }
        Commands::ShowConfig => {}
    }
    Ok(())
}

/// Remove a document from the stores. No provider is contacted.
async fn delete_document(settings: &Settings, stores: &Stores, document_id: &str) -> Result<usize> {
    Ok(remove_document(
        &settings.rag.retry,
        stores.vectors.as_ref(),
        stores.texts.as_ref(),
        &settings.providers.collection,
        document_id,
    )
    .await?)
}

/// The answer followed by a numbered source list.
pub fn render_answer(answer: &Answer) -> String {
    let mut out = format!("{}\n", answer.text.trim_end());
    if !answer.citations.is_empty() {
        out.push_str("\nSources:\n");
        for citation in &answer.citations {
            out.push_str(&format!("[{}] {}\n", citation.index, citation.label()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use clap::CommandFactory;
    use docqa_rag::{AnswerOutcome, Chunk, Citation, StoredText, TextStore};

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_parses_question_and_flags() {
        let cli = Cli::try_parse_from([
            "docqa",
            "ask",
            "What is the GST threshold?",
            "--json",
            "--collection",
            "ato",
        ])
        .unwrap();
        assert_eq!(cli.provider.collection.as_deref(), Some("ato"));
        match cli.command {
            Commands::Ask { question, json } => {
                assert_eq!(question, "What is the GST threshold?");
                assert!(json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn index_requires_a_path() {
        assert!(Cli::try_parse_from(["docqa", "index"]).is_err());
    }

    #[test]
    fn answer_renders_sources() {
        let answer = Answer {
            text: "The threshold is $75,000 [1].".into(),
            citations: vec![Citation {
                index: 1,
                chunk_id: "ato-gst-guide_0".into(),
                document_id: "ato-gst-guide".into(),
                title: Some("ATO GST Guide".into()),
                source_uri: Some("https://ato.example/gst".into()),
                score: 0.91,
            }],
            outcome: AnswerOutcome::Grounded,
        };
        assert_eq!(
            render_answer(&answer),
            "The threshold is $75,000 [1].\n\nSources:\n[1] ATO GST Guide (https://ato.example/gst)\n"
        );
        assert_eq!(render_answer(&Answer::no_context()).lines().count(), 1);
    }

    #[tokio::test]
    async fn delete_needs_no_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.providers.store_dir = dir.path().to_path_buf();

        let stores = Stores::open(&settings).await.unwrap();
        stores.vectors.create_collection("documents", 2).await.unwrap();
        let chunk = Chunk {
            id: "gst_0".into(),
            document_id: "gst".into(),
            ordinal: 0,
            text: "The GST threshold is $75,000.".into(),
            embedding: vec![1.0, 0.0],
            metadata: HashMap::new(),
        };
        stores.texts.put(&chunk.id, StoredText::from(&chunk)).await.unwrap();
        stores.vectors.upsert("documents", &[chunk]).await.unwrap();
        stores.persist(&settings).await.unwrap();

        let mut cli = Cli::try_parse_from(["docqa", "delete", "gst"]).unwrap();
        cli.config = None;
        cli.provider =
            ProviderArgs { store_dir: Some(dir.path().to_path_buf()), ..ProviderArgs::default() };
        execute(cli).await.unwrap();

        let reopened = Stores::open(&settings).await.unwrap();
        assert!(reopened.texts.chunk_ids_for_document("gst").await.unwrap().is_empty());
        assert!(reopened.vectors.search("documents", &[1.0, 0.0], 5).await.unwrap().is_empty());
    }
}
