use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mongodb::Client as MongoClient;

use crate::config::{Config, StoreBackend};
use attempt_store::{AttemptStore, InMemoryAttemptStore, MongoAttemptStore};
use diagnostic::DiagnosticClient;
use evaluation_gateway::EvaluationClient;
use mastery::ProblemGenerator;
use model_client::HttpTutorModelClient;
use problem_repository::{InMemoryProblemRepository, MongoProblemRepository, ProblemRepository};
use tutor_service::{RetentionPolicy, TutorService};

pub mod attempt_machine;
pub mod attempt_store;
pub mod diagnostic;
pub mod evaluation_gateway;
pub mod hint_ledger;
pub mod mastery;
pub mod model_client;
pub mod persistence;
pub mod problem_repository;
pub mod tutor_service;

/// External capabilities the tutor depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub problems: Arc<dyn ProblemRepository>,
    pub evaluator: Arc<dyn EvaluationClient>,
    pub generator: Arc<dyn ProblemGenerator>,
    pub diagnostics: Arc<dyn DiagnosticClient>,
    pub store: Arc<dyn AttemptStore>,
}

pub struct AppState {
    pub config: Config,
    pub tutor: TutorService,
    pub problems: Arc<dyn ProblemRepository>,
    pub store: Arc<dyn AttemptStore>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let model = Arc::new(HttpTutorModelClient::new(
            &config.model_api_url,
            config.model_api_timeout_ms,
        )?);

        let (problems, store): (Arc<dyn ProblemRepository>, Arc<dyn AttemptStore>) =
            match config.store_backend {
                StoreBackend::Mongo => {
                    let mongo_client = MongoClient::with_uri_str(&config.mongo_uri)
                        .await
                        .context("Failed to connect to MongoDB")?;
                    let mongo = mongo_client.database(&config.mongo_database);

                    tracing::info!("Attempting to ping MongoDB...");
                    tokio::time::timeout(
                        std::time::Duration::from_secs(5),
                        mongo.run_command(mongodb::bson::doc! { "ping": 1 }),
                    )
                    .await
                    .map_err(|_| anyhow::anyhow!("MongoDB ping timeout after 5s"))??;
                    tracing::info!("MongoDB connection established successfully");

                    (
                        Arc::new(MongoProblemRepository::new(mongo.clone())),
                        Arc::new(MongoAttemptStore::new(mongo)),
                    )
                }
                StoreBackend::Memory => {
                    let problems = match &config.problems_seed_path {
                        Some(path) => InMemoryProblemRepository::from_json_file(path)?,
                        None => InMemoryProblemRepository::default(),
                    };
                    tracing::warn!("Using in-memory store, attempts are not durable");
                    (Arc::new(problems), Arc::new(InMemoryAttemptStore::new()))
                }
            };

        let collaborators = Collaborators {
            problems,
            evaluator: model.clone(),
            generator: model.clone(),
            diagnostics: model,
            store,
        };

        Ok(Self::from_parts(config, collaborators))
    }

    /// Wires state from explicit collaborators.
    pub fn from_parts(config: Config, collaborators: Collaborators) -> Self {
        let problems = collaborators.problems.clone();
        let store = collaborators.store.clone();
        let retention = RetentionPolicy {
            closed_retention: Duration::from_secs(config.closed_retention_secs),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        };
        let tutor = TutorService::new(collaborators, config.write_async).with_retention(retention);

        Self {
            config,
            tutor,
            problems,
            store,
        }
    }
}

/// Keeps the live attempt registry bounded for the life of the process.
pub fn spawn_sweeper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let every = Duration::from_secs(state.config.sweep_interval_secs);
    tokio::spawn(async move { state.tutor.run_sweeper(every).await })
}
