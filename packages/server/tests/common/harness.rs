//! Test harnesses for integration testing.
//!
//! `TestHarness` runs the whole pipeline over in-memory backends and mock
//! outbound services. `PostgresHarness` uses a shared Postgres container
//! started once on first use and reused by every test.

use anyhow::{Context, Result};
use bills_core::domains::bills::{BillStore, PostgresBillStore};
use bills_core::domains::ingestion::IngestJobHandler;
use bills_core::kernel::jobs::{
    JobQueue, JobStatusView, JobWorker, JobWorkerConfig, PostgresJobQueue,
};
use bills_core::kernel::{AdmissionControl, ServerDeps, TestDependencies};
use bills_core::server::IngestService;
use sqlx::PgPool;
use std::sync::Arc;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// In-memory harness
// =============================================================================

/// Pipeline harness over in-memory backends.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let job_id = ctx.service.enqueue_job("ontario", Default::default()).await.unwrap();
///     ctx.drain_jobs().await;
/// }
/// ```
pub struct TestHarness {
    /// Mocks and in-memory backends, kept for inspection
    pub mocks: TestDependencies,
    pub deps: ServerDeps,
    pub service: IngestService,
    worker: JobWorker,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new(TestDependencies::new())
    }

    async fn teardown(self) {}
}

impl TestHarness {
    pub fn new(mocks: TestDependencies) -> Self {
        Self::with_admission(mocks, AdmissionControl::unlimited())
    }

    pub fn with_admission(mocks: TestDependencies, admission: AdmissionControl) -> Self {
        init_tracing();

        let deps = mocks.clone().into_deps();
        let worker = JobWorker::new(
            deps.queue.clone(),
            Arc::new(IngestJobHandler::new(deps.clone())),
            deps.retry,
            JobWorkerConfig::with_worker_id("test-worker"),
        );
        let service = IngestService::new(deps.clone(), admission);

        Self {
            mocks,
            deps,
            service,
            worker,
        }
    }

    /// Run the worker until no job is runnable. Returns the number of attempts processed.
    pub async fn drain_jobs(&self) -> usize {
        let mut processed = 0;
        // Bounded so a retry loop can never hang a test
        for _ in 0..50 {
            let count = self.worker.run_once().await.expect("claim failed");
            if count == 0 {
                break;
            }
            processed += count;
        }
        processed
    }

    pub async fn status(&self, job_id: Uuid) -> JobStatusView {
        self.service
            .get_job_status(job_id)
            .await
            .expect("job status")
    }
}

// =============================================================================
// Postgres harness
// =============================================================================

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    db_url: String,
    // Keep container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        init_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!(
            "postgresql://postgres:postgres@{}:{}/postgres",
            pg_host, pg_port
        );

        // Create tables once, before tests race on them
        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for schema setup")?;
        PostgresJobQueue::new(pool.clone()).ensure_schema().await?;
        PostgresBillStore::new(pool).ensure_schema().await?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Harness with a fresh pool on the shared Postgres container.
pub struct PostgresHarness {
    pub db_pool: PgPool,
}

impl AsyncTestContext for PostgresHarness {
    async fn setup() -> Self {
        let infra = SharedTestInfra::get().await;
        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .expect("Failed to connect to test database");
        Self { db_pool }
    }

    async fn teardown(self) {
        // Database pool is automatically dropped
    }
}
