use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Auto-increment primary key; Postgres gets a 64-bit column.
fn id_col<T: IntoIden>(manager: &SchemaManager, iden: T) -> ColumnDef {
    match manager.get_database_backend() {
        sea_orm::DatabaseBackend::Postgres => ColumnDef::new(iden)
            .big_integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
        _ => ColumnDef::new(iden)
            .integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        // Variant tables. Every one carries created_by/deleted_by next to
        // its field columns; references hold global resource ids.
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(id_col(manager, Accounts::Id))
                    .col(big_integer_null(Accounts::CreatedBy))
                    .col(big_integer_null(Accounts::DeletedBy))
                    .col(string_null(Accounts::Name))
                    .col(string_null(Accounts::Description))
                    .col(string_null(Accounts::Email))
                    .col(string_null(Accounts::Phone))
                    .col(string_null(Accounts::MailAddress))
                    .col(string_null(Accounts::BillingAddress))
                    .col(string_null(Accounts::Logo))
                    .col(string_null(Accounts::LogoFilename))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Opportunities::Table)
                    .if_not_exists()
                    .col(id_col(manager, Opportunities::Id))
                    .col(big_integer_null(Opportunities::CreatedBy))
                    .col(big_integer_null(Opportunities::DeletedBy))
                    .col(string_null(Opportunities::Name))
                    .col(string_null(Opportunities::Description))
                    .col(big_integer_null(Opportunities::Account))
                    .col(string_null(Opportunities::Stage))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_opportunities_account")
                    .table(Opportunities::Table)
                    .col(Opportunities::Account)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SalesOrders::Table)
                    .if_not_exists()
                    .col(id_col(manager, SalesOrders::Id))
                    .col(big_integer_null(SalesOrders::CreatedBy))
                    .col(big_integer_null(SalesOrders::DeletedBy))
                    .col(big_integer_null(SalesOrders::Opportunity))
                    .col(string_null(SalesOrders::Description))
                    .col(string_null(SalesOrders::StartDate))
                    .col(string_null(SalesOrders::EndDate))
                    .col(big_integer_null(SalesOrders::BasePriceAmount))
                    .col(string_null(SalesOrders::BasePriceCurrency))
                    .col(big_integer_null(SalesOrders::HourlyPriceAmount))
                    .col(string_null(SalesOrders::HourlyPriceCurrency))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sales_orders_opportunity")
                    .table(SalesOrders::Table)
                    .col(SalesOrders::Opportunity)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(id_col(manager, Users::Id))
                    .col(big_integer_null(Users::CreatedBy))
                    .col(big_integer_null(Users::DeletedBy))
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .null()
                            .unique_key(),
                    )
                    .col(string_null(Users::Password))
                    .col(string_null(Users::Role))
                    .to_owned(),
            )
            .await?;

        // Polymorphic identity: one nullable FK per variant table, exactly
        // one populated, plus the discriminant.
        manager
            .create_table(
                Table::create()
                    .table(Resources::Table)
                    .if_not_exists()
                    .col(id_col(manager, Resources::Id))
                    .col(string(Resources::Kind))
                    .col(big_integer_null(Resources::AccountId))
                    .col(big_integer_null(Resources::OpportunityId))
                    .col(big_integer_null(Resources::SalesOrderId))
                    .col(big_integer_null(Resources::UserId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_resources_account")
                            .from(Resources::Table, Resources::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_resources_opportunity")
                            .from(Resources::Table, Resources::OpportunityId)
                            .to(Opportunities::Table, Opportunities::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_resources_sales_order")
                            .from(Resources::Table, Resources::SalesOrderId)
                            .to(SalesOrders::Table, SalesOrders::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_resources_user")
                            .from(Resources::Table, Resources::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ResourceAssignments::Table)
                    .if_not_exists()
                    .col(big_integer(ResourceAssignments::ResourceId))
                    .col(big_integer(ResourceAssignments::UserId))
                    .col(big_integer_null(ResourceAssignments::AssignedBy))
                    .col(big_integer(ResourceAssignments::AssignedAt))
                    .primary_key(
                        Index::create()
                            .col(ResourceAssignments::ResourceId)
                            .col(ResourceAssignments::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignments_resource")
                            .from(ResourceAssignments::Table, ResourceAssignments::ResourceId)
                            .to(Resources::Table, Resources::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Files::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Files::Hash)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Files::Content).blob().not_null())
                    .col(big_integer(Files::Size))
                    .col(big_integer_null(Files::UploadedBy))
                    .col(big_integer(Files::UploadedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ResourceLogs::Table)
                    .if_not_exists()
                    .col(id_col(manager, ResourceLogs::Id))
                    .col(big_integer(ResourceLogs::ResourceId))
                    .col(big_integer(ResourceLogs::Subject))
                    .col(big_integer(ResourceLogs::Timestamp))
                    .col(string(ResourceLogs::Message))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_resource_logs_resource")
                    .table(ResourceLogs::Table)
                    .col(ResourceLogs::ResourceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LoginSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LoginSessions::SessionId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(big_integer(LoginSessions::UserId))
                    .col(big_integer(LoginSessions::CreatedAt))
                    .col(big_integer(LoginSessions::ExpiresAt))
                    .col(string_null(LoginSessions::UserAgent))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_login_sessions_expires")
                    .table(LoginSessions::Table)
                    .col(LoginSessions::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JobExecutions::Table)
                    .if_not_exists()
                    .col(id_col(manager, JobExecutions::Id))
                    .col(string(JobExecutions::JobName))
                    .col(big_integer(JobExecutions::StartedAt))
                    .col(big_integer_null(JobExecutions::CompletedAt))
                    .col(big_integer_null(JobExecutions::Success))
                    .col(string_null(JobExecutions::ErrorMessage))
                    .col(big_integer_null(JobExecutions::RecordsProcessed))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobExecutions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LoginSessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ResourceLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Files::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ResourceAssignments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Resources::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SalesOrders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Opportunities::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
    CreatedBy,
    DeletedBy,
    Name,
    Description,
    Email,
    Phone,
    MailAddress,
    BillingAddress,
    Logo,
    LogoFilename,
}

#[derive(DeriveIden)]
enum Opportunities {
    Table,
    Id,
    CreatedBy,
    DeletedBy,
    Name,
    Description,
    Account,
    Stage,
}

#[derive(DeriveIden)]
enum SalesOrders {
    Table,
    Id,
    CreatedBy,
    DeletedBy,
    Opportunity,
    Description,
    StartDate,
    EndDate,
    BasePriceAmount,
    BasePriceCurrency,
    HourlyPriceAmount,
    HourlyPriceCurrency,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    CreatedBy,
    DeletedBy,
    Username,
    Password,
    Role,
}

#[derive(DeriveIden)]
enum Resources {
    Table,
    Id,
    Kind,
    AccountId,
    OpportunityId,
    SalesOrderId,
    UserId,
}

#[derive(DeriveIden)]
enum ResourceAssignments {
    Table,
    ResourceId,
    UserId,
    AssignedBy,
    AssignedAt,
}

#[derive(DeriveIden)]
enum Files {
    Table,
    Hash,
    Content,
    Size,
    UploadedBy,
    UploadedAt,
}

#[derive(DeriveIden)]
enum ResourceLogs {
    Table,
    Id,
    ResourceId,
    Subject,
    Timestamp,
    Message,
}

#[derive(DeriveIden)]
enum LoginSessions {
    Table,
    SessionId,
    UserId,
    CreatedAt,
    ExpiresAt,
    UserAgent,
}

#[derive(DeriveIden)]
enum JobExecutions {
    Table,
    Id,
    JobName,
    StartedAt,
    CompletedAt,
    Success,
    ErrorMessage,
    RecordsProcessed,
}
