use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};

use crate::metrics::track_store_operation;
use crate::models::{Problem, ProblemFilter};

const MAX_LIST_LIMIT: i64 = 100;

#[async_trait]
pub trait ProblemRepository: Send + Sync {
    async fn find_by_id(&self, problem_id: &str) -> Result<Option<Problem>>;

    async fn find_filtered(&self, filter: &ProblemFilter) -> Result<Vec<Problem>>;

    async fn ping(&self) -> Result<()>;
}

pub struct MongoProblemRepository {
    mongo: Database,
    collection: Collection<Problem>,
}

impl MongoProblemRepository {
    pub fn new(mongo: Database) -> Self {
        Self {
            collection: mongo.collection("problems"),
            mongo,
        }
    }
}

#[async_trait]
impl ProblemRepository for MongoProblemRepository {
    async fn find_by_id(&self, problem_id: &str) -> Result<Option<Problem>> {
        track_store_operation("find_one", "problems", async {
            self.collection
                .find_one(doc! { "_id": problem_id })
                .await
                .context("Failed to query problems collection")
        })
        .await
    }

    async fn find_filtered(&self, filter: &ProblemFilter) -> Result<Vec<Problem>> {
        let mut query = Document::new();
        if let Some(grade) = filter.grade_level {
            query.insert("grade_level", grade as i32);
        }
        if let Some(chapter) = &filter.chapter {
            query.insert("chapter", chapter.as_str());
        }
        if let Some(complexity) = filter.complexity {
            query.insert("complexity", complexity.as_str());
        }

        let options = FindOptions::builder()
            .sort(doc! { "grade_level": 1, "chapter": 1, "sequence_number": 1 })
            .limit(MAX_LIST_LIMIT)
            .build();

        track_store_operation("find", "problems", async {
            let cursor = self
                .collection
                .find(query)
                .with_options(options)
                .await
                .context("Failed to query problems collection")?;
            cursor
                .try_collect::<Vec<Problem>>()
                .await
                .context("Failed to read problems cursor")
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}

/// Problem repository backed by a map, seeded from JSON for local runs.
#[derive(Default)]
pub struct InMemoryProblemRepository {
    problems: HashMap<String, Problem>,
}

impl InMemoryProblemRepository {
    pub fn new(problems: impl IntoIterator<Item = Problem>) -> Self {
        Self {
            problems: problems
                .into_iter()
                .map(|problem| (problem.id.clone(), problem))
                .collect(),
        }
    }

    /// Loads a JSON array of problems (same shape as the `problems` collection).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read problem seed file {}", path.display()))?;
        let problems: Vec<Problem> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid problem seed file {}", path.display()))?;
        tracing::info!(count = problems.len(), "Loaded problem seed file");
        Ok(Self::new(problems))
    }
}

#[async_trait]
impl ProblemRepository for InMemoryProblemRepository {
    async fn find_by_id(&self, problem_id: &str) -> Result<Option<Problem>> {
        Ok(self.problems.get(problem_id).cloned())
    }

    async fn find_filtered(&self, filter: &ProblemFilter) -> Result<Vec<Problem>> {
        let mut problems: Vec<Problem> = self
            .problems
            .values()
            .filter(|problem| filter.matches(problem))
            .cloned()
            .collect();
        problems.sort_by(|a, b| {
            (a.grade_level, &a.chapter, a.sequence_number).cmp(&(
                b.grade_level,
                &b.chapter,
                b.sequence_number,
            ))
        });
        problems.truncate(MAX_LIST_LIMIT as usize);
        Ok(problems)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
