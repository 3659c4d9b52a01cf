//! Database connection and schema management

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod entities;
pub mod migration;

pub use migration::Migrator;

/// Build the SQLite connection URL for a database file under `data_dir`
pub fn sqlite_url(data_dir: &Path) -> String {
	format!(
		"sqlite://{}?mode=rwc",
		data_dir.join("outpost.db").display()
	)
}

/// Connect to the database and bring the schema up to date
pub async fn connect_and_migrate(url: &str) -> Result<DatabaseConnection, DbErr> {
	let mut options = ConnectOptions::new(url.to_string());
	options
		.max_connections(8)
		.acquire_timeout(Duration::from_secs(10))
		.sqlx_logging(false);

	let conn = Database::connect(options).await?;

	info!(url = %url, "Running database migrations");
	Migrator::up(&conn, None).await?;

	Ok(conn)
}
