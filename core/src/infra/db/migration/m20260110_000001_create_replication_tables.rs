use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		// Create registry table
		manager
			.create_table(
				Table::create()
					.table(Registry::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Registry::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Registry::ResourceId).uuid().not_null())
					.col(ColumnDef::new(Registry::ResourceType).string().not_null())
					.col(
						ColumnDef::new(Registry::SyncState)
							.string()
							.not_null()
							.default("pending"),
					)
					.col(
						ColumnDef::new(Registry::RetryCount)
							.integer()
							.not_null()
							.default(0),
					)
					.col(ColumnDef::new(Registry::RetryAt).timestamp_with_time_zone())
					.col(ColumnDef::new(Registry::LastSyncFailure).string())
					.col(ColumnDef::new(Registry::LastSyncedAt).timestamp_with_time_zone())
					.col(
						ColumnDef::new(Registry::VerificationState)
							.string()
							.not_null()
							.default("pending"),
					)
					.col(ColumnDef::new(Registry::VerificationChecksum).string())
					.col(ColumnDef::new(Registry::VerifiedAt).timestamp_with_time_zone())
					.col(ColumnDef::new(Registry::VerificationFailure).string())
					.col(
						ColumnDef::new(Registry::VerificationRetryCount)
							.integer()
							.not_null()
							.default(0),
					)
					.col(ColumnDef::new(Registry::VerificationRetryAt).timestamp_with_time_zone())
					.col(
						ColumnDef::new(Registry::MismatchCount)
							.integer()
							.not_null()
							.default(0),
					)
					.col(ColumnDef::new(Registry::LeaseToken).uuid())
					.col(ColumnDef::new(Registry::LeaseExpiresAt).timestamp_with_time_zone())
					.col(
						ColumnDef::new(Registry::MarkedForDeletion)
							.boolean()
							.not_null()
							.default(false),
					)
					.col(
						ColumnDef::new(Registry::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(
						ColumnDef::new(Registry::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		// One registry row per (resource_type, resource_id)
		manager
			.create_index(
				Index::create()
					.name("idx_registry_type_resource")
					.table(Registry::Table)
					.col(Registry::ResourceType)
					.col(Registry::ResourceId)
					.unique()
					.to_owned(),
			)
			.await?;

		// Due-for-sync scans
		manager
			.create_index(
				Index::create()
					.name("idx_registry_sync_due")
					.table(Registry::Table)
					.col(Registry::ResourceType)
					.col(Registry::SyncState)
					.col(Registry::RetryAt)
					.to_owned(),
			)
			.await?;

		// Due-for-verification scans
		manager
			.create_index(
				Index::create()
					.name("idx_registry_verification_due")
					.table(Registry::Table)
					.col(Registry::ResourceType)
					.col(Registry::VerificationState)
					.col(Registry::VerificationRetryAt)
					.to_owned(),
			)
			.await?;

		// Create event_log table
		manager
			.create_table(
				Table::create()
					.table(EventLog::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(EventLog::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(EventLog::Sequence).big_integer().not_null())
					.col(ColumnDef::new(EventLog::ResourceType).string().not_null())
					.col(ColumnDef::new(EventLog::EventName).string().not_null())
					.col(ColumnDef::new(EventLog::Payload).text().not_null())
					.col(
						ColumnDef::new(EventLog::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		// Sequence is unique per resource type; also serves the read_after scan
		manager
			.create_index(
				Index::create()
					.name("idx_event_log_type_sequence")
					.table(EventLog::Table)
					.col(EventLog::ResourceType)
					.col(EventLog::Sequence)
					.unique()
					.to_owned(),
			)
			.await?;

		// Create event_cursor table
		manager
			.create_table(
				Table::create()
					.table(EventCursor::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(EventCursor::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(EventCursor::Site).string().not_null())
					.col(ColumnDef::new(EventCursor::ResourceType).string().not_null())
					.col(
						ColumnDef::new(EventCursor::LastSequence)
							.big_integer()
							.not_null()
							.default(0),
					)
					.col(
						ColumnDef::new(EventCursor::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_event_cursor_site_type")
					.table(EventCursor::Table)
					.col(EventCursor::Site)
					.col(EventCursor::ResourceType)
					.unique()
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(EventCursor::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(EventLog::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Registry::Table).to_owned())
			.await?;

		Ok(())
	}
}

#[derive(DeriveIden)]
enum Registry {
	Table,
	Id,
	ResourceId,
	ResourceType,
	SyncState,
	RetryCount,
	RetryAt,
	LastSyncFailure,
	LastSyncedAt,
	VerificationState,
	VerificationChecksum,
	VerifiedAt,
	VerificationFailure,
	VerificationRetryCount,
	VerificationRetryAt,
	MismatchCount,
	LeaseToken,
	LeaseExpiresAt,
	MarkedForDeletion,
	CreatedAt,
	UpdatedAt,
}

#[derive(DeriveIden)]
enum EventLog {
	Table,
	Id,
	Sequence,
	ResourceType,
	EventName,
	Payload,
	CreatedAt,
}

#[derive(DeriveIden)]
enum EventCursor {
	Table,
	Id,
	Site,
	ResourceType,
	LastSequence,
	UpdatedAt,
}
