use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use kirana_connect::{
    AccountingSyncAdapter, CrmSyncAdapter, HttpAccountingApi, HttpAuthorizationServer, HttpCrmApi,
    TokenManager,
};
use kirana_core::config::AppConfig;
use kirana_core::sync_engine::SyncEngine;
use kirana_db::repositories::{
    SqlCatalogRepository, SqlCredentialRepository, SqlInventoryLogRepository, SqlOrderRepository,
    SqlQuoteRepository, SqlSubmissionRepository, SqlSyncTaskRepository, SqlUserRepository,
};
use kirana_db::{connect_with_config, migrations, DbPool};
use kirana_sync::{SyncDispatcher, SyncQueue};

use crate::routes::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.sync.http_timeout_secs))
        .build()
        .map_err(BootstrapError::HttpClient)?;

    let users = Arc::new(SqlUserRepository::new(db_pool.clone()));
    let orders = Arc::new(SqlOrderRepository::new(db_pool.clone()));
    let quotes = Arc::new(SqlQuoteRepository::new(db_pool.clone()));
    let submissions = Arc::new(SqlSubmissionRepository::new(db_pool.clone()));
    let catalog = Arc::new(SqlCatalogRepository::new(db_pool.clone()));
    let credentials = Arc::new(SqlCredentialRepository::new(db_pool.clone()));
    let inventory_log = Arc::new(SqlInventoryLogRepository::new(db_pool.clone()));
    let tasks = Arc::new(SqlSyncTaskRepository::new(db_pool.clone()));

    let authorization_server = Arc::new(HttpAuthorizationServer::new(
        http_client.clone(),
        config.crm.clone(),
        config.accounting.clone(),
    ));
    let tokens = Arc::new(TokenManager::new(
        credentials,
        authorization_server,
        config.crm.clone(),
        config.accounting.clone(),
    ));

    let crm_api = Arc::new(HttpCrmApi::new(
        http_client.clone(),
        config.crm.api_base_url.clone(),
        tokens.clone(),
    ));
    let accounting_api = Arc::new(HttpAccountingApi::new(
        http_client,
        config.accounting.api_base_url.clone(),
        config.accounting.organization_id.clone(),
        tokens.clone(),
    ));

    let crm = Arc::new(CrmSyncAdapter::new(
        crm_api,
        users.clone(),
        quotes.clone(),
        submissions,
    ));
    let accounting = Arc::new(AccountingSyncAdapter::new(
        accounting_api,
        users,
        orders,
        quotes,
        catalog,
        inventory_log.clone(),
        config.company.clone(),
    ));

    let engine = SyncEngine::new(config.sync.engine_config());
    let queue = Arc::new(SyncQueue::new(engine.clone(), tasks.clone()));
    let dispatcher = Arc::new(SyncDispatcher::new(engine, tasks.clone(), crm, accounting.clone()));

    let state = AppState {
        db_pool: db_pool.clone(),
        tokens,
        queue,
        dispatcher,
        accounting,
        tasks,
        inventory_log,
        dispatch_batch_size: config.sync.dispatch_batch_size,
        inventory_batch_size: config.sync.inventory_batch_size,
    };

    Ok(Application { config, db_pool, state })
}
