use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use steward_core::ambient;
use steward_core::app::{TaskCounts, TaskNode};
use steward_core::domain::{EntitlementContext, TaskId};
use steward_core::ports::{ContextResolver, SubmitProperties};
use steward_core::task::{ImmediateSupplier, ImmediateWork};
use steward_core::{
    ContextError, JobError, Job, Management, ManagementBuilder, OwnerRef, StewardConfig,
    TaskBuilder, TaskTag,
};

#[derive(Debug, Parser)]
#[command(name = "steward", about = "Run a small managed deployment and print its task tree")]
struct Args {
    /// JSON config file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// User the demo effectors run as
    #[arg(long, default_value = "admin")]
    user: String,
}

#[derive(Debug, Serialize)]
struct Report {
    sensor: u32,
    start: TaskNode,
    app: TaskCounts,
    db: TaskCounts,
}

/// Sensor value readable without waiting.
struct Uptime(u32);

impl ImmediateSupplier<u32> for Uptime {
    fn get_immediately(&self) -> Result<u32, JobError> {
        Ok(self.0)
    }
}

/// `start` effector of the app: bring the database up first (a task owned
/// by another entity), then configure itself inline.
fn start_effector(mgmt: Arc<Management>, db: OwnerRef) -> Job<TaskId> {
    Job::new(move || {
        let mgmt = Arc::clone(&mgmt);
        let db = db.clone();
        async move {
            let db_start = mgmt
                .submit_for(&db, Job::from_fn(|| Ok("database started")))
                .map_err(ContextError::into_job_error)?;
            let status = db_start.join().await.map_err(ContextError::into_job_error)?;
            info!(status, "dependency ready");

            ambient::checkpoint()?;
            let configure = TaskBuilder::new()
                .display_name("configure")
                .body(Job::from_fn(|| Ok(())))
                .build();
            let me = ambient::current_task().ok_or_else(|| JobError::failed("not running as a task"))?;
            me.add_child(configure.as_task_ref()).map_err(ContextError::into_job_error)?;
            let context = ambient::current_context()
                .ok_or_else(|| JobError::failed("no execution context"))?;
            context.get(&configure).await.map_err(ContextError::into_job_error)?;

            Ok(db_start.id())
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => StewardConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StewardConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    let app = OwnerRef::new("app-1", "web app");
    let db = OwnerRef::new("db-1", "database");
    let mgmt = ManagementBuilder::new()
        .config(config)
        .owner(app.clone())
        .owner(db.clone())
        .build()?;
    let app_ctx = mgmt
        .context_for(app.id())
        .context("app context missing")?;

    let entitlement = EntitlementContext::for_user(args.user);
    let start = ambient::with_entitlement(entitlement, async {
        let props = SubmitProperties::new()
            .display_name("start")
            .tag(TaskTag::label("effector"));
        app_ctx.submit_with(props, start_effector(Arc::clone(&mgmt), db.clone()))
    })
    .await?;

    let sensor = app_ctx.get_immediately(ImmediateWork::supplier(Uptime(42)))?;
    let wrapper_id = start.join().await?;
    info!(task = %start.id(), "start finished");

    let report = Report {
        sensor,
        start: mgmt.task_tree(start.id()).context("start task not tracked")?,
        app: mgmt.task_counts(app.id()).unwrap_or_default(),
        db: mgmt.task_counts(db.id()).unwrap_or_default(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(tree) = mgmt.task_tree(wrapper_id) {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    }
    Ok(())
}
