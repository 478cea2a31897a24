//! Seeding pipeline (`SPEC_FULL.md` §4/§6): turns a `--filesdir` of
//! plain-text files into the four persisted collections. Replaces the
//! teacher's connector-driven `ingest.rs` with a single straight-line
//! pipeline over [`source_loader::scan_filesdir`], since there is only
//! one source kind to ingest from.
//!
//! Stages, in order: scan → checkpoint filter → concurrent concept
//! extraction → chunk + enrich → concept index → category summaries →
//! embed → persist → checkpoint flush. Each stage only touches the
//! documents this run decided need (re)processing; everything else is
//! read back from storage so concept/category construction still sees
//! the whole corpus.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::config::Config;
use crate::context::Context;
use crate::embedding;
use crate::enrichment::categories::{llm_summarize_category, summarize_new_categories};
use crate::enrichment::checkpoint::Checkpoint;
use crate::enrichment::extractor::ExtractionResult;
use crate::enrichment::rate_limiter::RateLimiter;
use crate::enrichment::worker_pool::{run_worker_pool, WorkItem, WorkOutcome};
use crate::enrichment::{concept_index, enrich_chunks, matcher};
use crate::ids;
use crate::models::{Category, Chunk, Concept, Document};
use crate::progress::SyncProgressReporter;
use crate::source_loader::{scan_filesdir, SourceDocument};
use crate::store::chunk::replace_for_catalog;
use crate::store::Collection;

/// Flags controlling one seeding run (`SPEC_FULL.md` §6's CLI table).
pub struct SeedOptions {
    pub filesdir: PathBuf,
    pub overwrite: bool,
    pub rebuild_concepts: bool,
    pub auto_reseed: bool,
    pub resume: bool,
    pub clean_checkpoint: bool,
    pub retry_failed: bool,
    pub max_docs: Option<usize>,
}

/// Outcome of one run, enough for the CLI to choose an exit code.
#[derive(Debug, Default)]
pub struct SeedReport {
    pub documents_seen: usize,
    pub documents_processed: usize,
    pub documents_skipped: usize,
    pub documents_failed: usize,
    pub concepts_indexed: usize,
    pub categories_created: usize,
    pub failed: Vec<(String, String)>,
}

impl SeedReport {
    /// Partial failure per `SPEC_FULL.md` §7: at least one document
    /// failed extraction, but the run otherwise completed.
    pub fn has_partial_failure(&self) -> bool {
        self.documents_failed > 0
    }
}

fn sibling_path(db_path: &Path, filename: &str) -> PathBuf {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(filename),
        _ => PathBuf::from(filename),
    }
}

fn derive_title(source_path: &str, text: &str) -> String {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if first_line.is_empty() {
        source_path.to_string()
    } else {
        first_line.chars().take(120).collect()
    }
}

fn derive_summary(text: &str) -> String {
    let first_para = text.split("\n\n").find(|p| !p.trim().is_empty()).unwrap_or("").trim();
    first_para.chars().take(280).collect()
}

/// Runs one seeding pass against `config`, returning a report the
/// caller turns into an exit code.
pub async fn run_seed(
    config: Config,
    opts: &SeedOptions,
    progress: &dyn SyncProgressReporter,
) -> Result<SeedReport> {
    let ctx = Arc::new(Context::build(config).await?);
    let checkpoint_path = sibling_path(&ctx.config.db.path, "checkpoint.json");
    let category_cache_path = sibling_path(&ctx.config.db.path, "category_summaries.json");

    let mut checkpoint = if opts.clean_checkpoint {
        Checkpoint::default()
    } else {
        Checkpoint::load(&checkpoint_path)?
    };

    let mut scanned = scan_filesdir(&opts.filesdir)?;
    if let Some(max_docs) = opts.max_docs {
        scanned.truncate(max_docs);
    }

    let mut report = SeedReport {
        documents_seen: scanned.len(),
        ..Default::default()
    };

    let to_process = select_documents_to_process(&ctx, &scanned, &checkpoint, opts).await?;
    report.documents_skipped = report.documents_seen - to_process.len();

    if to_process.is_empty() {
        if !opts.rebuild_concepts {
            tracing::info!("nothing to seed, all documents already up to date");
            return Ok(report);
        }
    }

    let rate_limiter = ctx.rate_limiter.clone();
    let work_items: Vec<WorkItem> = to_process
        .iter()
        .map(|doc| WorkItem {
            source: doc.source_path.clone(),
            content_hash: doc.content_hash.clone(),
            text: doc.raw_text.clone(),
        })
        .collect();

    let outcomes = run_worker_pool(
        work_items,
        &ctx.config.enrichment,
        ctx.resilience.clone(),
        rate_limiter,
        progress,
    )
    .await;

    let mut new_extractions: Vec<(u64, ExtractionResult)> = Vec::new();
    let mut new_chunks_by_doc: HashMap<u64, Vec<Chunk>> = HashMap::new();
    let mut new_documents: Vec<Document> = Vec::new();

    for (source_doc, outcome) in to_process.iter().zip(outcomes.iter()) {
        match outcome {
            WorkOutcome::Success { extraction, .. } => {
                checkpoint.mark_processed(&source_doc.content_hash);

                let doc_id = ids::document_id(&source_doc.source_path);
                let document = Document {
                    id: doc_id,
                    source: source_doc.source_path.clone(),
                    title: derive_title(&source_doc.source_path, &source_doc.raw_text),
                    summary: derive_summary(&source_doc.raw_text),
                    primary_concepts: extraction.primary_concepts.clone(),
                    technical_terms: extraction.technical_terms.clone(),
                    category_ids: Vec::new(),
                    embedding: Vec::new(),
                    ocr_processed: false,
                    content_hash: source_doc.content_hash.clone(),
                };

                let mut chunks = crate::chunking::chunk_text(
                    doc_id,
                    &source_doc.raw_text,
                    ctx.config.chunking.max_tokens,
                );
                enrich_chunks(&mut chunks, &document.concept_candidates(), ctx.config.enrichment.fuzzy_match_ratio);

                new_chunks_by_doc.insert(doc_id, chunks);
                new_extractions.push((doc_id, extraction.clone()));
                new_documents.push(document);
                report.documents_processed += 1;
            }
            WorkOutcome::Failure { source, content_hash, error } => {
                checkpoint.mark_failed(content_hash, source, error);
                report.documents_failed += 1;
                report.failed.push((source.clone(), error.clone()));
            }
        }
    }

    checkpoint.save(&checkpoint_path)?;

    // Union this run's freshly extracted concept candidates with
    // every other document already on disk so the concept index
    // reflects the whole corpus, not just what changed this run.
    let mut all_extractions = new_extractions.clone();
    let mut all_chunks_by_doc = new_chunks_by_doc.clone();
    let reprocessed_ids: HashSet<u64> = new_documents.iter().map(|d| d.id).collect();

    for existing in ctx.catalog.find_all().await? {
        if reprocessed_ids.contains(&existing.id) {
            continue;
        }
        all_extractions.push((
            existing.id,
            ExtractionResult {
                primary_concepts: existing.primary_concepts.clone(),
                technical_terms: existing.technical_terms.clone(),
                acronyms: Vec::new(),
                categories: Vec::new(),
                related_concepts: Vec::new(),
            },
        ));
        if opts.rebuild_concepts {
            let chunks = ctx.chunks.by_catalog_id(existing.id).await?;
            all_chunks_by_doc.insert(existing.id, chunks);
        }
    }

    let should_rebuild_concept_index = opts.rebuild_concepts || !new_documents.is_empty();
    if should_rebuild_concept_index {
        let wordnet = ctx.wordnet.as_ref();
        let mut concepts = concept_index::build_concept_index(
            &all_extractions,
            &all_chunks_by_doc,
            wordnet,
            ctx.config.enrichment.fuzzy_match_ratio,
        );

        assign_categories(&ctx, &mut concepts, &new_extractions, &category_cache_path, &mut report).await?;

        if ctx.config.embedding.is_enabled() {
            embed_concepts(&ctx, &mut concepts, &new_chunks_by_doc).await?;
        }

        report.concepts_indexed = concepts.len();
        ctx.concepts.batch_upsert(&concepts).await.map_err(anyhow::Error::from)?;
    }

    if ctx.config.embedding.is_enabled() {
        embed_documents_and_chunks(&ctx, &mut new_documents, &mut new_chunks_by_doc).await?;
    }

    ctx.catalog.batch_upsert(&new_documents).await.map_err(anyhow::Error::from)?;
    for doc in &new_documents {
        if let Some(chunks) = new_chunks_by_doc.get(&doc.id) {
            replace_for_catalog(&ctx.pool, &ctx.resilience, doc.id, chunks)
                .await
                .map_err(anyhow::Error::from)?;
        }
    }

    ctx.names
        .rebuild(&ctx.concepts, &ctx.categories)
        .await
        .map_err(anyhow::Error::from)?;

    Ok(report)
}

/// Decides which scanned files need (re)processing this run, applying
/// `--overwrite`/`--auto-reseed`/checkpoint resume semantics in that
/// order (`SPEC_FULL.md` §6's `--retry-failed` resolution).
async fn select_documents_to_process(
    ctx: &Context,
    scanned: &[SourceDocument],
    checkpoint: &Checkpoint,
    opts: &SeedOptions,
) -> Result<Vec<SourceDocument>> {
    let failed_hashes = checkpoint.failed_hash_set();
    let mut selected = Vec::with_capacity(scanned.len());

    for doc in scanned {
        if opts.overwrite {
            selected.push(doc.clone());
            continue;
        }

        let existing = ctx
            .catalog
            .get_by_source(&doc.source_path)
            .await
            .map_err(anyhow::Error::from)?;

        let content_changed = existing
            .as_ref()
            .map(|d| d.content_hash != doc.content_hash)
            .unwrap_or(true);

        if !content_changed {
            continue;
        }
        if existing.is_some() && !opts.auto_reseed {
            tracing::warn!(source = %doc.source_path, "content changed but --auto-reseed not set, skipping");
            continue;
        }

        if opts.resume {
            if checkpoint.is_processed(&doc.content_hash) {
                continue;
            }
            if failed_hashes.contains(&doc.content_hash) && !opts.retry_failed {
                continue;
            }
        }

        selected.push(doc.clone());
    }

    Ok(selected)
}

/// Folds new per-document category names into the corpus's category
/// set, summarizing only names missing from the on-disk cache, then
/// stamps each affected concept with the resulting category ids.
async fn assign_categories(
    ctx: &Context,
    concepts: &mut [Concept],
    new_extractions: &[(u64, ExtractionResult)],
    category_cache_path: &Path,
    report: &mut SeedReport,
) -> Result<()> {
    let mut cache: HashMap<String, String> = if category_cache_path.exists() {
        let content = std::fs::read_to_string(category_cache_path)
            .with_context(|| format!("failed to read {}", category_cache_path.display()))?;
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        HashMap::new()
    };

    let mut category_names: Vec<String> = new_extractions
        .iter()
        .flat_map(|(_, extraction)| extraction.categories.iter().cloned())
        .collect();
    category_names.sort();
    category_names.dedup_by_key(|n| ids::normalize_name(n));

    if category_names.is_empty() {
        return Ok(());
    }

    let llm_config = ctx.config.enrichment.clone();
    let resilience = ctx.resilience.clone();
    let merged = summarize_new_categories(&category_names, &cache, |name| {
        let config = llm_config.clone();
        let resilience = resilience.clone();
        async move { llm_summarize_category(&resilience, &config, &name).await }
    })
    .await?;

    let content = serde_json::to_string_pretty(&merged)?;
    if let Some(parent) = category_cache_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(category_cache_path, content)
        .with_context(|| format!("failed to write {}", category_cache_path.display()))?;
    cache = merged;

    let mut new_categories = Vec::new();
    let mut name_to_id: HashMap<String, u64> = HashMap::new();
    for name in &category_names {
        if let Some(existing) = ctx
            .categories
            .get_by_name(name)
            .await
            .map_err(anyhow::Error::from)?
        {
            name_to_id.insert(ids::normalize_name(name), existing.id);
            continue;
        }
        let id = ids::category_id(name);
        name_to_id.insert(ids::normalize_name(name), id);
        new_categories.push(Category {
            id,
            name: name.clone(),
            aliases: Vec::new(),
            parent_id: None,
            summary: cache.get(name).cloned().unwrap_or_default(),
            embedding: Vec::new(),
        });
    }

    report.categories_created = new_categories.len();
    if !new_categories.is_empty() {
        ctx.categories
            .batch_upsert(&new_categories)
            .await
            .map_err(anyhow::Error::from)?;
    }

    for concept in concepts.iter_mut() {
        if let Some(&id) = name_to_id.get(&ids::normalize_name(&concept.name)) {
            if !concept.category_ids.contains(&id) {
                concept.category_ids.push(id);
            }
        }
    }

    Ok(())
}

/// Embeds each concept's name, or (when
/// `concept_embedding_from_examples` is set) up to five chunk texts
/// that matched it this run, joined into one passage.
async fn embed_concepts(
    ctx: &Context,
    concepts: &mut [Concept],
    chunks_by_doc: &HashMap<u64, Vec<Chunk>>,
) -> Result<()> {
    let fuzzy_ratio = ctx.config.enrichment.fuzzy_match_ratio;
    let all_chunks: Vec<&Chunk> = chunks_by_doc.values().flatten().collect();

    let texts: Vec<String> = concepts
        .iter()
        .map(|concept| {
            if !ctx.config.enrichment.concept_embedding_from_examples {
                return concept.name.clone();
            }
            let examples: Vec<&str> = all_chunks
                .iter()
                .filter(|c| matcher::match_tier(&c.text, &concept.name, fuzzy_ratio).is_some())
                .take(5)
                .map(|c| c.text.as_str())
                .collect();
            if examples.is_empty() {
                concept.name.clone()
            } else {
                examples.join("\n")
            }
        })
        .collect();

    let vectors = embedding::embed_texts(
        ctx.embedding_provider.as_ref(),
        &ctx.resilience,
        &ctx.config.embedding,
        &texts,
    )
    .await?;
    for (concept, vector) in concepts.iter_mut().zip(vectors.into_iter()) {
        concept.embedding = vector;
    }
    Ok(())
}

/// Embeds each new document's summary and every one of its chunks,
/// batched per `config.embedding.batch_size`.
async fn embed_documents_and_chunks(
    ctx: &Context,
    documents: &mut [Document],
    chunks_by_doc: &mut HashMap<u64, Vec<Chunk>>,
) -> Result<()> {
    if documents.is_empty() {
        return Ok(());
    }

    let summaries: Vec<String> = documents.iter().map(|d| d.summary.clone()).collect();
    let doc_vectors = embedding::embed_texts(
        ctx.embedding_provider.as_ref(),
        &ctx.resilience,
        &ctx.config.embedding,
        &summaries,
    )
    .await?;
    for (doc, vector) in documents.iter_mut().zip(doc_vectors.into_iter()) {
        doc.embedding = vector;
    }

    for doc in documents.iter() {
        let Some(chunks) = chunks_by_doc.get_mut(&doc.id) else {
            continue;
        };
        let batch_size = ctx.config.embedding.batch_size.max(1);
        for batch in chunks.chunks_mut(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedding::embed_texts(
                ctx.embedding_provider.as_ref(),
                &ctx.resilience,
                &ctx.config.embedding,
                &texts,
            )
            .await?;
            for (chunk, vector) in batch.iter_mut().zip(vectors.into_iter()) {
                chunk.embedding = vector;
            }
        }
    }

    Ok(())
}
