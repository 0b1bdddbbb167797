//! Application migrations
//!
//! Every unit is listed here explicitly; `tidemark make migration` prints the
//! two lines to add for a new one.

use tidemark_migrate::{DatabaseBackendType, MigrateResult, Migration, MigrationRegistry};

mod m20241201_000001_initial_tables;
mod m20241201_000002_add_user_columns;
mod m20241201_000003_add_extra_tables;
mod m20250825_121500_add_access_admin_and_invitations;

/// All application migrations
pub fn all() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(m20241201_000001_initial_tables::InitialTablesMigration),
        Box::new(m20241201_000002_add_user_columns::AddUserColumnsMigration),
        Box::new(m20241201_000003_add_extra_tables::AddExtraTablesMigration),
        Box::new(m20250825_121500_add_access_admin_and_invitations::AddAccessAdminAndInvitationsMigration),
    ]
}

/// Backend the application migrations are written for (plpgsql, `ADD COLUMN IF NOT EXISTS`)
pub const BACKEND: DatabaseBackendType = DatabaseBackendType::PostgreSQL;

/// Validated registry of all application migrations
pub fn registry() -> MigrateResult<MigrationRegistry> {
    MigrationRegistry::new(all())
}
