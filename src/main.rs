use std::sync::Arc;

use dotenvy::dotenv;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber;

use riverbend::database::schema::run_migrations;
use riverbend::get_conn;
use riverbend::services::{maintenance, worker::JobManager};
use riverbend::utils::state::AppState;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt::fmt()
        .with_writer(std::io::stderr)
        .init();

    let state = match AppState::create_from_env().await {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to create AppState: {:?}", err);
            return;
        }
    };
    let shared_state = Arc::new(state);

    let mut conn = get_conn!(shared_state);
    if let Err(err) = run_migrations(&mut conn).await {
        error!("Migrations failed: {:?}", err);
        return;
    }
    drop(conn);

    let mut manager = JobManager::new(shared_state.clone());
    maintenance::register_handlers(&mut manager);
    if let Err(err) = maintenance::seed_recurring_jobs(&shared_state).await {
        error!("Failed to seed recurring jobs: {:?}", err);
        return;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    manager.run(shutdown_rx).await;
}
