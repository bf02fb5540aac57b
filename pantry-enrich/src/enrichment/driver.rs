//! Batch enrichment driver
//!
//! **Algorithm per batch:**
//! 1. Fetch the next `batch_size` records of this worker's id partition
//! 2. Plan each record: resolve a tag, grow allergens, decide what to write
//! 3. Commit the planned writes and the checkpoint in one transaction
//!    (retried on lock contention)
//!
//! Planning runs outside the transaction; the commit re-checks each record's
//! revision so a concurrent writer turns into an `errored` count instead of
//! a lost update.
//!
//! Workers own disjoint partitions (`id mod workers`), so every record is
//! claimed by exactly one worker. Cancellation is checked between batches.

use chrono::Utc;
use pantry_common::events::{EnrichmentEvent, EventBus};
use pantry_common::models::RecordSource;
use pantry_common::{ConfidenceTier, Error, Result};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::checkpoint::{CheckpointStore, PartitionCheckpoint};
use super::context::EnrichmentContext;
use super::RecordError;
use crate::db::{self, records, records::RawRecord};
use crate::models::{EnrichmentReport, RecordOutcome, RunCounters};
use crate::resolver::Resolution;
use crate::utils::retry_on_lock;

/// Options for one `enrich` call
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub source: RecordSource,
    pub job_name: String,
    /// Clear the job's checkpoints before running
    pub restart: bool,
    /// Stop each partition after this many batches (run reported incomplete)
    pub max_batches: Option<usize>,
    pub cancel: CancellationToken,
    pub events: EventBus,
}

impl EnrichOptions {
    pub fn new(source: RecordSource) -> Self {
        Self {
            source,
            job_name: default_job_name(source),
            restart: false,
            max_batches: None,
            cancel: CancellationToken::new(),
            events: EventBus::default(),
        }
    }
}

pub fn default_job_name(source: RecordSource) -> String {
    format!("enrich-{}", source)
}

/// Fields to write for one record
#[derive(Debug, Clone, PartialEq)]
struct AnnotationWrite {
    canonical_tag: Option<String>,
    tier: ConfidenceTier,
    allergens_json: String,
    /// Only the allergen set grew
    allergen_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct RecordPlan {
    id: i64,
    revision: i64,
    /// Outcome if nothing is written
    outcome: RecordOutcome,
    write: Option<AnnotationWrite>,
}

impl RecordPlan {
    fn errored(record: &RawRecord, error: RecordError) -> Self {
        tracing::warn!(record_id = record.id, error = %error, "Record errored");
        Self {
            id: record.id,
            revision: record.revision,
            outcome: RecordOutcome::Errored,
            write: None,
        }
    }
}

/// Planned batch: per-record plans plus names of canonicals created while planning
#[derive(Debug, Default)]
struct BatchPlan {
    records: Vec<RecordPlan>,
    created: Vec<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn allergen_text(record: &RawRecord) -> String {
    [record.description.as_deref(), record.ingredients_text.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ; ")
}

/// Decide what to write for one record
async fn plan_record(
    ctx: &mut EnrichmentContext,
    pool: &SqlitePool,
    record: &RawRecord,
    created: &mut Vec<String>,
) -> RecordPlan {
    let existing = match record.allergens.as_deref() {
        Some(json) => match db::parse_label_set(json) {
            Some(set) => set,
            None => {
                return RecordPlan::errored(
                    record,
                    RecordError::Malformed {
                        id: record.id,
                        reason: "allergens is not a JSON string array".to_string(),
                    },
                )
            }
        },
        None => BTreeSet::new(),
    };

    let stored_tier = ConfidenceTier::from_stored(record.confidence.as_deref());
    let stored_tag = non_empty(record.canonical_tag.as_deref());

    // Settled tags are never re-resolved
    let resolution = if stored_tier.is_settled() {
        Resolution::unresolved()
    } else {
        let text = record.description.as_deref().unwrap_or_default();
        let key = ctx.normalizer().normalize(text);
        let resolved = match ctx.resolver_mut().resolve(pool, &key).await {
            Ok(r) => r,
            Err(source) => return RecordPlan::errored(record, RecordError::Storage { id: record.id, source }),
        };

        if !resolved.is_resolved() && ctx.params().create_missing_canonicals && !key.is_empty() {
            match ctx.resolver_mut().ensure_canonical(pool, &key).await {
                Ok((r, was_created)) => {
                    if was_created {
                        created.push(key.clone());
                    }
                    r
                }
                Err(source) => return RecordPlan::errored(record, RecordError::Storage { id: record.id, source }),
            }
        } else {
            resolved
        }
    };

    let new_tag = resolution.canonical.as_deref();
    let write_tag = match new_tag {
        Some(tag) => resolution.tier > stored_tier || (resolution.tier == stored_tier && Some(tag) != stored_tag),
        None => false,
    };

    let (final_tag, final_tier) = if write_tag {
        (new_tag, resolution.tier)
    } else {
        (stored_tag, stored_tier)
    };

    let mut allergens = ctx.tag_allergens(&allergen_text(record), &existing);
    if final_tier.is_settled() {
        let canonical = if write_tag {
            resolution.canonical_id.and_then(|id| ctx.resolver().registry().get(id))
        } else {
            final_tag.and_then(|tag| ctx.resolver().registry().by_name(tag))
        };
        if let Some(c) = canonical {
            allergens.extend(c.allergens.iter().cloned());
        }
    }
    let grew = allergens.len() > existing.len();

    tracing::debug!(
        record_id = record.id,
        stored_tier = %stored_tier,
        method = ?resolution.method,
        tag = ?final_tag,
        write_tag,
        allergens_grew = grew,
        "Record planned"
    );

    let write = (write_tag || grew).then(|| AnnotationWrite {
        canonical_tag: final_tag.map(str::to_string),
        tier: final_tier,
        allergens_json: db::label_set_json(&allergens),
        allergen_only: !write_tag,
    });

    let outcome = if final_tag.is_none() {
        RecordOutcome::Unresolved
    } else {
        RecordOutcome::Skipped
    };

    RecordPlan {
        id: record.id,
        revision: record.revision,
        outcome,
        write,
    }
}

async fn plan_batch(ctx: &mut EnrichmentContext, pool: &SqlitePool, batch: &[RawRecord]) -> BatchPlan {
    let mut plan = BatchPlan::default();
    for record in batch {
        let record_plan = plan_record(ctx, pool, record, &mut plan.created).await;
        plan.records.push(record_plan);
    }
    plan
}

/// Write planned records and the checkpoint atomically
///
/// Returns this batch's counters. Safe to re-invoke after a rolled-back
/// attempt: counters are rebuilt from scratch each time.
async fn commit_batch(
    pool: &SqlitePool,
    source: RecordSource,
    store: &CheckpointStore,
    plan: &BatchPlan,
    checkpoint: &PartitionCheckpoint,
) -> Result<RunCounters> {
    let mut batch = RunCounters {
        canonicals_created: plan.created.len() as u64,
        ..Default::default()
    };

    let mut tx = pool.begin().await?;
    for record in &plan.records {
        let Some(write) = &record.write else {
            batch.record(record.outcome);
            continue;
        };

        let written = records::write_annotation(
            &mut tx,
            source,
            record.id,
            record.revision,
            write.canonical_tag.as_deref(),
            write.tier,
            &write.allergens_json,
        )
        .await?;

        if written {
            batch.record(RecordOutcome::Updated);
            if write.allergen_only {
                batch.allergen_only_updates += 1;
            }
        } else {
            let error = RecordError::Conflict {
                id: record.id,
                expected_revision: record.revision,
            };
            tracing::warn!(error = %error, "Record errored");
            batch.record(RecordOutcome::Errored);
        }
    }

    let mut cumulative = checkpoint.clone();
    cumulative.counters.add(&batch);
    store.save(&mut tx, &cumulative).await?;
    tx.commit().await?;

    Ok(batch)
}

/// What one partition did in this run
#[derive(Debug, Default)]
struct PartitionResult {
    counters: RunCounters,
    batches: u64,
    finished: bool,
}

struct Worker {
    pool: SqlitePool,
    ctx: EnrichmentContext,
    store: CheckpointStore,
    source: RecordSource,
    partition_index: usize,
    partition_count: usize,
    max_batches: Option<usize>,
    cancel: CancellationToken,
    events: EventBus,
    run_id: Uuid,
}

impl Worker {
    async fn run(mut self, resume: Option<PartitionCheckpoint>) -> Result<PartitionResult> {
        let mut checkpoint = resume.unwrap_or_else(|| PartitionCheckpoint {
            job_name: self.store.job_name().to_string(),
            partition_index: self.partition_index,
            partition_count: self.partition_count,
            last_id: i64::MIN,
            counters: RunCounters::default(),
            updated_at: None,
        });
        let mut after_id = (checkpoint.last_id != i64::MIN).then_some(checkpoint.last_id);

        let batch_size = self.ctx.params().batch_size;
        let max_wait_ms = self.ctx.params().max_lock_wait_ms;
        let mut result = PartitionResult::default();

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(partition = self.partition_index, "Cancellation requested, stopping partition");
                break;
            }
            if self.max_batches.is_some_and(|max| result.batches >= max as u64) {
                tracing::info!(partition = self.partition_index, "Batch limit reached, stopping partition");
                break;
            }

            let batch = records::fetch_partition_batch(
                &self.pool,
                self.source,
                self.partition_index,
                self.partition_count,
                after_id,
                batch_size,
            )
            .await?;
            let Some(last) = batch.last() else {
                result.finished = true;
                break;
            };
            let batch_last_id = last.id;

            let plan = plan_batch(&mut self.ctx, &self.pool, &batch).await;

            let pool = &self.pool;
            let store = &self.store;
            let plan_ref = &plan;
            let mut next = checkpoint.clone();
            next.last_id = batch_last_id;
            let next_ref = &next;
            let counters = retry_on_lock("enrichment batch commit", max_wait_ms, || {
                commit_batch(pool, self.source, store, plan_ref, next_ref)
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    partition = self.partition_index,
                    last_committed_id = ?after_id,
                    error = %e,
                    "Batch aborted; last checkpoint preserved"
                );
                e
            })?;

            next.counters.add(&counters);
            checkpoint = next;
            after_id = Some(batch_last_id);
            result.counters.add(&counters);
            result.batches += 1;

            for name in &plan.created {
                self.events.emit_lossy(EnrichmentEvent::CanonicalCreated {
                    run_id: self.run_id,
                    name: name.clone(),
                    timestamp: Utc::now(),
                });
            }
            self.events.emit_lossy(EnrichmentEvent::BatchCompleted {
                run_id: self.run_id,
                partition: self.partition_index,
                last_id: batch_last_id,
                batch_size: batch.len(),
                counters: counters.progress(),
                timestamp: Utc::now(),
            });
            tracing::info!(
                partition = self.partition_index,
                last_id = batch_last_id,
                records = batch.len(),
                updated = counters.updated,
                skipped = counters.skipped,
                unresolved = counters.unresolved,
                errored = counters.errored,
                "Batch committed"
            );

            if batch.len() < batch_size {
                result.finished = true;
                break;
            }
        }

        Ok(result)
    }
}

/// Enrich every record of `options.source`
///
/// Each worker starts from a clone of `ctx` (registry, mapping cache,
/// allergen rules) and reconciles with the database on a miss. A completed
/// run clears its checkpoints, so the next run of the job starts over; an
/// incomplete run leaves them for resumption.
pub async fn enrich(pool: &SqlitePool, ctx: &EnrichmentContext, options: EnrichOptions) -> Result<EnrichmentReport> {
    let started = Instant::now();
    let run_id = Uuid::new_v4();
    let workers = ctx.params().workers;
    let store = CheckpointStore::new(pool.clone(), options.job_name.clone());

    if options.restart {
        store.reset().await?;
    }
    let resume = store.load(workers).await?;

    tracing::info!(
        %run_id,
        job = %options.job_name,
        source = %options.source,
        workers,
        batch_size = ctx.params().batch_size,
        canonicals = ctx.resolver().registry().len(),
        mappings = ctx.resolver().registry().mapping_count(),
        "Enrichment run started"
    );
    options.events.emit_lossy(EnrichmentEvent::RunStarted {
        run_id,
        job_name: options.job_name.clone(),
        source: options.source,
        workers,
        canonical_count: ctx.resolver().registry().len(),
        mapping_count: ctx.resolver().registry().mapping_count(),
        timestamp: Utc::now(),
    });

    // Stops sibling workers if one hits a fatal storage error
    let worker_cancel = options.cancel.child_token();
    let mut join_set = JoinSet::new();
    for (partition_index, checkpoint) in resume.into_iter().enumerate() {
        let worker = Worker {
            pool: pool.clone(),
            ctx: ctx.clone(),
            store: store.clone(),
            source: options.source,
            partition_index,
            partition_count: workers,
            max_batches: options.max_batches,
            cancel: worker_cancel.clone(),
            events: options.events.clone(),
            run_id,
        };
        join_set.spawn(worker.run(checkpoint));
    }

    let mut counters = RunCounters::default();
    let mut batches = 0u64;
    let mut all_finished = true;
    let mut failure: Option<Error> = None;

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(partition)) => {
                counters.add(&partition.counters);
                batches += partition.batches;
                all_finished &= partition.finished;
            }
            Ok(Err(e)) => {
                worker_cancel.cancel();
                all_finished = false;
                if failure.is_none() {
                    failure = Some(e);
                }
            }
            Err(join_err) => {
                worker_cancel.cancel();
                all_finished = false;
                if failure.is_none() {
                    failure = Some(Error::Internal(format!("Enrichment worker panicked: {}", join_err)));
                }
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }

    let completed = all_finished && !options.cancel.is_cancelled();
    let checkpoints = store.list().await?;
    if completed {
        store.reset().await?;
    }

    let elapsed_seconds = started.elapsed().as_secs_f64();
    let report = EnrichmentReport {
        run_id,
        job_name: options.job_name.clone(),
        source: options.source,
        workers,
        batches,
        counters,
        elapsed_seconds,
        records_per_second: EnrichmentReport::throughput(counters.records_seen, elapsed_seconds),
        completed,
        checkpoints,
    };

    tracing::info!(
        %run_id,
        completed,
        batches,
        records = counters.records_seen,
        updated = counters.updated,
        skipped = counters.skipped,
        unresolved = counters.unresolved,
        errored = counters.errored,
        canonicals_created = counters.canonicals_created,
        elapsed_seconds,
        "Enrichment run finished"
    );
    options.events.emit_lossy(EnrichmentEvent::RunFinished {
        run_id,
        completed,
        counters: counters.progress(),
        elapsed_seconds,
        timestamp: Utc::now(),
    });

    Ok(report)
}
