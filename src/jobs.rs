use crate::edit::EditSessionStore;
use crate::entities;
use crate::errors::CrmError;
use crate::storage;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

pub const CLEANUP_EXPIRED_SESSIONS: &str = "cleanup_expired_sessions";

/// Initialize and start the job scheduler with all background tasks
pub async fn init_scheduler(
    db: DatabaseConnection,
    sessions: Arc<EditSessionStore>,
) -> Result<JobScheduler, CrmError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| CrmError::Other(format!("Failed to create job scheduler: {}", e)))?;

    // Sweep idle edit sessions and expired logins - runs every 5 minutes
    let cleanup_job = Job::new_async("0 */5 * * * *", move |_uuid, _l| {
        let db = db.clone();
        let sessions = sessions.clone();
        Box::pin(async move {
            if let Err(e) = run_job(&db, &sessions, CLEANUP_EXPIRED_SESSIONS).await {
                error!("Failed to record {} run: {}", CLEANUP_EXPIRED_SESSIONS, e);
            }
        })
    })
    .map_err(|e| CrmError::Other(format!("Failed to create cleanup job: {}", e)))?;

    sched
        .add(cleanup_job)
        .await
        .map_err(|e| CrmError::Other(format!("Failed to add cleanup job: {}", e)))?;

    sched
        .start()
        .await
        .map_err(|e| CrmError::Other(format!("Failed to start job scheduler: {}", e)))?;

    info!("Job scheduler started with {} jobs", 1);

    Ok(sched)
}

async fn cleanup_expired_sessions(
    db: &DatabaseConnection,
    sessions: &EditSessionStore,
) -> Result<u64, CrmError> {
    let edit = sessions.cleanup() as u64;
    let login = storage::cleanup_expired_login_sessions(db).await?;
    info!(edit_sessions = edit, login_sessions = login, "Cleaned up expired sessions");
    Ok(edit + login)
}

/// Run a job by name and record the execution.
pub async fn run_job(
    db: &DatabaseConnection,
    sessions: &EditSessionStore,
    job_name: &str,
) -> Result<(), CrmError> {
    info!("Running job: {}", job_name);

    let result = match job_name {
        CLEANUP_EXPIRED_SESSIONS => {
            let execution_id = start_job_execution(db, job_name).await?;
            (execution_id, cleanup_expired_sessions(db, sessions).await)
        }
        _ => {
            return Err(CrmError::Other(format!("Unknown job name: {}", job_name)));
        }
    };

    match result {
        (execution_id, Ok(count)) => {
            complete_job_execution(db, execution_id, true, None, Some(count as i64)).await?;
        }
        (execution_id, Err(e)) => {
            error!("Job {} failed: {}", job_name, e);
            complete_job_execution(db, execution_id, false, Some(e.to_string()), None).await?;
        }
    }

    Ok(())
}

/// Record the start of a job execution
pub async fn start_job_execution(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<i64, CrmError> {
    use entities::job_execution;

    let execution = job_execution::ActiveModel {
        job_name: Set(job_name.to_string()),
        started_at: Set(Utc::now().timestamp()),
        completed_at: Set(None),
        success: Set(None),
        error_message: Set(None),
        records_processed: Set(None),
        ..Default::default()
    };

    let result = execution.insert(db).await?;
    Ok(result.id)
}

/// Record the completion of a job execution
pub async fn complete_job_execution(
    db: &DatabaseConnection,
    execution_id: i64,
    success: bool,
    error_message: Option<String>,
    records_processed: Option<i64>,
) -> Result<(), CrmError> {
    if let Some(execution) = entities::JobExecution::find_by_id(execution_id).one(db).await? {
        let mut active: entities::job_execution::ActiveModel = execution.into_active_model();
        active.completed_at = Set(Some(Utc::now().timestamp()));
        active.success = Set(Some(if success { 1 } else { 0 }));
        active.error_message = Set(error_message);
        active.records_processed = Set(records_processed);
        active.update(db).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceId, StagedChanges, VariantKind};
    use crate::settings;
    use migration::MigratorTrait;
    use sea_orm::Database;
    use tempfile::NamedTempFile;

    async fn test_db() -> (DatabaseConnection, NamedTempFile) {
        let temp = NamedTempFile::new().expect("Failed to create temp file");
        let url = format!("sqlite://{}?mode=rwc", temp.path().display());
        let db = Database::connect(&url)
            .await
            .expect("Failed to connect to test database");
        migration::Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");
        (db, temp)
    }

    #[tokio::test]
    async fn test_cleanup_run_is_recorded() {
        let (db, _temp) = test_db().await;
        let sessions = EditSessionStore::new(&settings::EditSessions {
            ttl_secs: -1,
            max_per_user: 8,
        });
        sessions.create(
            VariantKind::Account,
            None,
            ResourceId(1),
            StagedChanges::default(),
            None,
        );

        run_job(&db, &sessions, CLEANUP_EXPIRED_SESSIONS).await.unwrap();
        assert!(sessions.is_empty());

        let runs = entities::JobExecution::find().all(&db).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].job_name, CLEANUP_EXPIRED_SESSIONS);
        assert_eq!(runs[0].succeeded(), Some(true));
        assert_eq!(runs[0].records_processed, Some(1));
    }

    #[tokio::test]
    async fn test_unknown_job_is_rejected() {
        let (db, _temp) = test_db().await;
        let sessions = EditSessionStore::new(&settings::EditSessions::default());
        assert!(run_job(&db, &sessions, "rotate_keys").await.is_err());
        assert!(entities::JobExecution::find().all(&db).await.unwrap().is_empty());
    }
}
