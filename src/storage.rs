//! Persistence: a generic mapper that reads and writes variant rows from
//! their static schemas, plus the fixed tables (resources, assignments,
//! files, audit log, login sessions).

use std::collections::BTreeMap;

use base64ct::Encoding;
use chrono::Utc;
use rand::RngCore;
use sea_orm::sea_query::{Alias, Expr, OnConflict, Order, Query, SimpleExpr, Value};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QueryResult, Set, Statement, StatementBuilder,
    TransactionTrait,
};

use crate::access::{AccessPolicy, AccessType, Actor};
use crate::entities;
use crate::errors::CrmError;
use crate::fields::{Argument, Column, ColumnType, Field, StoredRow, StoredValue, Upload};
use crate::mutation::{CommitContext, CommitPlan, Relink};
use crate::resource::{Resource, ResourceId, UserRole, VariantKind};
use crate::settings::Database as DbCfg;

const ID: &str = "id";
const CREATED_BY: &str = "created_by";
const DELETED_BY: &str = "deleted_by";
const RESOURCES: &str = "resources";

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, CrmError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

/// Unguessable URL-safe token.
pub fn random_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

fn col(name: &str) -> Alias {
    Alias::new(name)
}

fn build<C: ConnectionTrait, S: StatementBuilder>(conn: &C, stmt: &S) -> Statement {
    conn.get_database_backend().build(stmt)
}

async fn exec<C: ConnectionTrait, S: StatementBuilder>(conn: &C, stmt: &S) -> Result<u64, CrmError> {
    Ok(conn.execute(build(conn, stmt)).await?.rows_affected())
}

async fn query_one<C: ConnectionTrait, S: StatementBuilder>(
    conn: &C,
    stmt: &S,
) -> Result<Option<QueryResult>, CrmError> {
    Ok(conn.query_one(build(conn, stmt)).await?)
}

async fn query_all<C: ConnectionTrait, S: StatementBuilder>(
    conn: &C,
    stmt: &S,
) -> Result<Vec<QueryResult>, CrmError> {
    Ok(conn.query_all(build(conn, stmt)).await?)
}

fn to_value(value: &StoredValue, column_type: ColumnType) -> Value {
    match (value, column_type) {
        (StoredValue::Integer(i), _) => Value::BigInt(Some(*i)),
        (StoredValue::Text(s), _) => Value::String(Some(Box::new(s.clone()))),
        (StoredValue::Null, ColumnType::Integer) => Value::BigInt(None),
        (StoredValue::Null, ColumnType::Text) => Value::String(None),
    }
}

fn read_column(row: &QueryResult, column: &Column) -> Result<StoredValue, CrmError> {
    let value = match column.column_type {
        ColumnType::Integer => row
            .try_get::<Option<i64>>("", &column.name)?
            .map(StoredValue::Integer),
        ColumnType::Text => row
            .try_get::<Option<String>>("", &column.name)?
            .map(StoredValue::Text),
    };
    Ok(value.unwrap_or(StoredValue::Null))
}

/// Which variant a resource row points at. Rows with zero or several
/// populated variant keys, or a key that disagrees with `kind`, are
/// integrity faults.
fn resolve_variant(model: &entities::resource::Model) -> Result<(VariantKind, i64), CrmError> {
    let populated: Vec<(VariantKind, i64)> = VariantKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let fk = match kind {
                VariantKind::Account => model.account_id,
                VariantKind::Opportunity => model.opportunity_id,
                VariantKind::SalesOrder => model.sales_order_id,
                VariantKind::User => model.user_id,
            };
            fk.map(|id| (kind, id))
        })
        .collect();

    let [(kind, variant_id)] = populated.as_slice() else {
        return Err(CrmError::Integrity(format!(
            "resource {} has {} populated variant keys",
            model.id,
            populated.len()
        )));
    };

    if kind.name() != model.kind {
        return Err(CrmError::Integrity(format!(
            "resource {} is tagged `{}` but points at a {kind} row",
            model.id, model.kind
        )));
    }

    Ok((*kind, *variant_id))
}

/// Kind of a live resource, `None` when the id is unknown or deleted.
pub async fn resource_kind<C: ConnectionTrait>(
    db: &C,
    id: ResourceId,
) -> Result<Option<VariantKind>, CrmError> {
    Ok(load(db, id, false).await?.map(|r| r.kind()))
}

/// Resolve a polymorphic id to its variant instance. Soft-deleted
/// resources are reported as not found.
pub async fn get_resource<C: ConnectionTrait>(db: &C, id: ResourceId) -> Result<Resource, CrmError> {
    load(db, id, false)
        .await?
        .ok_or_else(|| CrmError::not_found(format!("resource {id}")))
}

pub async fn get_resource_including_deleted<C: ConnectionTrait>(
    db: &C,
    id: ResourceId,
) -> Result<Resource, CrmError> {
    load(db, id, true)
        .await?
        .ok_or_else(|| CrmError::not_found(format!("resource {id}")))
}

async fn load<C: ConnectionTrait>(
    db: &C,
    id: ResourceId,
    include_deleted: bool,
) -> Result<Option<Resource>, CrmError> {
    let Some(model) = entities::Resource::find_by_id(id.0).one(db).await? else {
        return Ok(None);
    };
    let resource = load_from_model(db, &model).await?;
    Ok(Some(resource).filter(|r| include_deleted || !r.is_deleted()))
}

async fn load_from_model<C: ConnectionTrait>(
    db: &C,
    model: &entities::resource::Model,
) -> Result<Resource, CrmError> {
    let (kind, variant_id) = resolve_variant(model)?;
    let schema = kind.schema();
    let columns = schema.columns();

    let select = Query::select()
        .from(col(kind.table()))
        .columns([col(CREATED_BY), col(DELETED_BY)])
        .columns(columns.iter().map(|c| col(&c.name)))
        .and_where(Expr::col(col(ID)).eq(variant_id))
        .to_owned();

    let Some(row) = query_one(db, &select).await? else {
        return Err(CrmError::Integrity(format!(
            "resource {} points at missing {kind} row {variant_id}",
            model.id
        )));
    };

    let mut stored = StoredRow::new();
    for column in &columns {
        stored.insert(column.name.clone(), read_column(&row, column)?);
    }

    let id = ResourceId(model.id);
    let mut children = BTreeMap::new();
    for field in schema.fields.iter().filter(|f| f.is_table()) {
        let foreign = field.foreign_field().ok_or_else(|| {
            CrmError::Integrity(format!("{kind}.{} has no foreign field", field.name))
        })?;
        children.insert(field.name, child_ids(db, id, foreign).await?);
    }

    let mut resource = Resource::new(kind);
    resource.id = Some(id);
    resource.variant_id = Some(variant_id);
    resource.created_by = row.try_get::<Option<i64>>("", CREATED_BY)?.map(ResourceId);
    resource.deleted_by = row.try_get::<Option<i64>>("", DELETED_BY)?.map(ResourceId);
    resource.assigned = assigned_users(db, id).await?;
    resource.row = stored;
    resource.children = children;
    Ok(resource)
}

/// Live instances of one kind, ordered by id.
pub async fn list_resources<C: ConnectionTrait>(
    db: &C,
    kind: VariantKind,
) -> Result<Vec<Resource>, CrmError> {
    use entities::resource::{Column, Entity};

    let models = Entity::find()
        .filter(Column::Kind.eq(kind.name()))
        .order_by_asc(Column::Id)
        .all(db)
        .await?;

    let mut resources = Vec::with_capacity(models.len());
    for model in &models {
        let resource = load_from_model(db, model).await?;
        if !resource.is_deleted() {
            resources.push(resource);
        }
    }
    Ok(resources)
}

/// Resource ids of live children whose `foreign` reference points at
/// `parent`.
async fn child_ids<C: ConnectionTrait>(
    db: &C,
    parent: ResourceId,
    foreign: &Field,
) -> Result<Vec<ResourceId>, CrmError> {
    let child = foreign.owner;
    let child_table = col(child.table());

    let select = Query::select()
        .column((col(RESOURCES), col(ID)))
        .from(col(RESOURCES))
        .inner_join(
            child_table.clone(),
            Expr::col((col(RESOURCES), col(child.resource_column())))
                .equals((child_table.clone(), col(ID))),
        )
        .and_where(Expr::col((child_table.clone(), col(foreign.name))).eq(parent.0))
        .and_where(Expr::col((child_table, col(DELETED_BY))).is_null())
        .order_by((col(RESOURCES), col(ID)), Order::Asc)
        .to_owned();

    query_all(db, &select)
        .await?
        .iter()
        .map(|row| Ok(ResourceId(row.try_get::<i64>("", ID)?)))
        .collect()
}

/// Run the context's commit steps and persist the result atomically.
pub async fn commit(
    db: &DatabaseConnection,
    resource: &mut Resource,
    ctx: &mut CommitContext,
    actor: &Actor,
) -> Result<ResourceId, CrmError> {
    let plan = ctx.commit()?;
    persist(db, resource, plan, actor).await
}

/// Apply a commit plan in one transaction: blobs, the variant row (plus
/// its resource row on first save), child relinks and audit lines. The
/// resource is reloaded afterwards with its staged changes cleared.
pub async fn persist(
    db: &DatabaseConnection,
    resource: &mut Resource,
    plan: CommitPlan,
    actor: &Actor,
) -> Result<ResourceId, CrmError> {
    let kind = resource.kind();
    let columns = kind.schema().columns();
    let column_type = |name: &str| {
        columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column_type)
            .ok_or_else(|| CrmError::Integrity(format!("{kind} has no column `{name}`")))
    };

    let txn = db.begin().await?;
    let now = Utc::now().timestamp();

    for blob in &plan.blobs {
        insert_blob(&txn, blob, Some(actor.id), now).await?;
    }

    let id = match (resource.id(), resource.variant_id()) {
        (Some(id), Some(variant_id)) => {
            if !plan.columns.is_empty() {
                let mut values: Vec<(Alias, SimpleExpr)> = Vec::new();
                for (name, value) in &plan.columns {
                    values.push((col(name), to_value(value, column_type(name)?).into()));
                }
                let update = Query::update()
                    .table(col(kind.table()))
                    .values(values)
                    .and_where(Expr::col(col(ID)).eq(variant_id))
                    .to_owned();
                exec(&txn, &update).await?;
            }
            id
        }
        (None, _) => {
            let created_by = resource.created_by.unwrap_or(actor.id);
            let mut names = vec![col(CREATED_BY)];
            let mut values: Vec<SimpleExpr> = vec![created_by.0.into()];
            for (name, value) in &plan.columns {
                names.push(col(name));
                values.push(to_value(value, column_type(name)?).into());
            }
            let insert = Query::insert()
                .into_table(col(kind.table()))
                .columns(names)
                .values(values)
                .map_err(|e| CrmError::Other(e.to_string()))?
                .returning_col(col(ID))
                .to_owned();
            let row = query_one(&txn, &insert)
                .await?
                .ok_or_else(|| CrmError::Other(format!("insert into {} returned no id", kind.table())))?;
            let variant_id: i64 = row.try_get("", ID)?;

            let mut identity = entities::resource::ActiveModel {
                kind: Set(kind.name().to_string()),
                ..Default::default()
            };
            match kind {
                VariantKind::Account => identity.account_id = Set(Some(variant_id)),
                VariantKind::Opportunity => identity.opportunity_id = Set(Some(variant_id)),
                VariantKind::SalesOrder => identity.sales_order_id = Set(Some(variant_id)),
                VariantKind::User => identity.user_id = Set(Some(variant_id)),
            }
            let identity = identity.insert(&txn).await?;
            ResourceId(identity.id)
        }
        (Some(id), None) => {
            return Err(CrmError::Integrity(format!(
                "resource {id} has no variant row"
            )));
        }
    };

    for relink in &plan.relinks {
        apply_relink(&txn, id, relink).await?;
    }

    for message in &plan.log {
        insert_log(&txn, id, actor.id, now, message).await?;
    }

    txn.commit().await?;

    tracing::info!(
        resource_id = %id,
        kind = %kind,
        mutations = plan.log.len(),
        "Committed resource"
    );

    *resource = get_resource(db, id).await?;
    Ok(id)
}

async fn apply_relink<C: ConnectionTrait>(
    conn: &C,
    parent: ResourceId,
    relink: &Relink,
) -> Result<(), CrmError> {
    let (foreign, child, attach) = match relink {
        Relink::Attach { foreign, child } => (*foreign, *child, true),
        Relink::Detach { foreign, child } => (*foreign, *child, false),
    };

    let model = entities::Resource::find_by_id(child.0)
        .one(conn)
        .await?
        .ok_or_else(|| CrmError::not_found(format!("resource {child}")))?;
    let (kind, variant_id) = resolve_variant(&model)?;
    if kind != foreign.owner {
        return Err(CrmError::BadRequest(format!(
            "resource {child} is a {kind}, expected {}",
            foreign.owner
        )));
    }

    let live = Query::select()
        .column(col(ID))
        .from(col(kind.table()))
        .and_where(Expr::col(col(ID)).eq(variant_id))
        .and_where(Expr::col(col(DELETED_BY)).is_null())
        .to_owned();
    if query_one(conn, &live).await?.is_none() {
        return Err(CrmError::not_found(format!("resource {child}")));
    }

    let mut update = Query::update();
    update
        .table(col(kind.table()))
        .and_where(Expr::col(col(ID)).eq(variant_id));

    if attach {
        update.values([(col(foreign.name), parent.0.into())]);
    } else {
        // Only detach a child that still points at this parent
        update
            .values([(col(foreign.name), Value::BigInt(None).into())])
            .and_where(Expr::col(col(foreign.name)).eq(parent.0));
    }

    exec(conn, &update).await?;
    Ok(())
}

async fn insert_blob<C: ConnectionTrait>(
    conn: &C,
    upload: &Upload,
    uploaded_by: Option<ResourceId>,
    now: i64,
) -> Result<(), CrmError> {
    use entities::file::{ActiveModel, Column, Entity};

    let file = ActiveModel {
        hash: Set(upload.hash.clone()),
        content: Set(upload.content.clone()),
        size: Set(upload.content.len() as i64),
        uploaded_by: Set(uploaded_by.map(|u| u.0)),
        uploaded_at: Set(now),
    };

    Entity::insert(file)
        .on_conflict(OnConflict::column(Column::Hash).do_nothing().to_owned())
        .exec_without_returning(conn)
        .await?;

    Ok(())
}

/// Store bytes under their content hash. Storing the same bytes again is a
/// no-op and yields the same hash.
pub async fn store_file(
    db: &DatabaseConnection,
    upload: &Upload,
    uploaded_by: Option<ResourceId>,
) -> Result<String, CrmError> {
    insert_blob(db, upload, uploaded_by, Utc::now().timestamp()).await?;
    Ok(upload.hash.clone())
}

pub async fn retrieve_file(
    db: &DatabaseConnection,
    hash: &str,
) -> Result<Option<entities::file::Model>, CrmError> {
    Ok(entities::File::find_by_id(hash.to_string()).one(db).await?)
}

pub async fn count_files(db: &DatabaseConnection) -> Result<u64, CrmError> {
    Ok(entities::File::find().count(db).await?)
}

async fn insert_log<C: ConnectionTrait>(
    conn: &C,
    resource: ResourceId,
    subject: ResourceId,
    timestamp: i64,
    message: &str,
) -> Result<(), CrmError> {
    let entry = entities::resource_log::ActiveModel {
        resource_id: Set(resource.0),
        subject: Set(subject.0),
        timestamp: Set(timestamp),
        message: Set(message.to_string()),
        ..Default::default()
    };
    entry.insert(conn).await?;
    Ok(())
}

/// Audit entries for a resource, newest first.
pub async fn resource_log(
    db: &DatabaseConnection,
    id: ResourceId,
) -> Result<Vec<entities::resource_log::Model>, CrmError> {
    use entities::resource_log::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::ResourceId.eq(id.0))
        .order_by_desc(Column::Timestamp)
        .order_by_desc(Column::Id)
        .all(db)
        .await?)
}

/// Assigned user ids in assignment order.
pub async fn assigned_users<C: ConnectionTrait>(
    db: &C,
    id: ResourceId,
) -> Result<Vec<ResourceId>, CrmError> {
    use entities::resource_assignment::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::ResourceId.eq(id.0))
        .order_by_asc(Column::AssignedAt)
        .order_by_asc(Column::UserId)
        .all(db)
        .await?
        .into_iter()
        .map(|a| ResourceId(a.user_id))
        .collect())
}

fn persisted_id(resource: &Resource) -> Result<ResourceId, CrmError> {
    resource
        .id()
        .ok_or_else(|| CrmError::BadRequest("resource has not been saved yet".into()))
}

/// Add `user` to the resource's assigned users. Returns false when the
/// user was already assigned.
pub async fn assign_to(
    db: &DatabaseConnection,
    resource: &mut Resource,
    user: ResourceId,
    actor: &Actor,
) -> Result<bool, CrmError> {
    use entities::resource_assignment::{ActiveModel, Column, Entity};

    let id = persisted_id(resource)?;
    let assignee = get_resource(db, user).await?;
    if assignee.kind() != VariantKind::User {
        return Err(CrmError::BadRequest(format!("resource {user} is not a user")));
    }

    let txn = db.begin().await?;
    let now = Utc::now().timestamp();
    let assignment = ActiveModel {
        resource_id: Set(id.0),
        user_id: Set(user.0),
        assigned_by: Set(Some(actor.id.0)),
        assigned_at: Set(now),
    };
    let inserted = Entity::insert(assignment)
        .on_conflict(
            OnConflict::columns([Column::ResourceId, Column::UserId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

    if inserted > 0 {
        insert_log(
            &txn,
            id,
            actor.id,
            now,
            &format!("Assign \"{}\".", assignee.title()),
        )
        .await?;
    }
    txn.commit().await?;

    if inserted > 0 {
        tracing::info!(resource_id = %id, user_id = %user, "Assigned user");
    }
    resource.assigned = assigned_users(db, id).await?;
    Ok(inserted > 0)
}

/// Remove `user` from the resource's assigned users. Returns false when the
/// user was not assigned.
pub async fn unassign_from(
    db: &DatabaseConnection,
    resource: &mut Resource,
    user: ResourceId,
    actor: &Actor,
) -> Result<bool, CrmError> {
    use entities::resource_assignment::{Column, Entity};

    let id = persisted_id(resource)?;
    let txn = db.begin().await?;
    let result = Entity::delete_many()
        .filter(Column::ResourceId.eq(id.0))
        .filter(Column::UserId.eq(user.0))
        .exec(&txn)
        .await?;

    let removed = result.rows_affected > 0;
    if removed {
        let now = Utc::now().timestamp();
        insert_log(&txn, id, actor.id, now, &format!("Unassign user #{user}.")).await?;
    }
    txn.commit().await?;

    if removed {
        tracing::info!(resource_id = %id, user_id = %user, "Unassigned user");
    }
    resource.assigned = assigned_users(db, id).await?;
    Ok(removed)
}

/// Mark the resource deleted. The variant row stays in place.
pub async fn soft_delete(
    db: &DatabaseConnection,
    policy: &AccessPolicy,
    resource: &mut Resource,
    actor: &Actor,
) -> Result<(), CrmError> {
    let id = persisted_id(resource)?;
    if !policy.check_resource(resource, actor, AccessType::Delete) {
        return Err(CrmError::AccessDenied);
    }
    let variant_id = resource
        .variant_id()
        .ok_or_else(|| CrmError::Integrity(format!("resource {id} has no variant row")))?;

    let txn = db.begin().await?;
    let update = Query::update()
        .table(col(resource.kind().table()))
        .values([(col(DELETED_BY), actor.id.0.into())])
        .and_where(Expr::col(col(ID)).eq(variant_id))
        .to_owned();
    exec(&txn, &update).await?;
    insert_log(&txn, id, actor.id, Utc::now().timestamp(), "Delete resource.").await?;
    txn.commit().await?;

    resource.deleted_by = Some(actor.id);
    tracing::info!(resource_id = %id, deleted_by = %actor.id, "Soft deleted resource");
    Ok(())
}

/// Resource id of the user holding `username`.
async fn user_id_by_username<C: ConnectionTrait>(
    db: &C,
    username: &str,
    include_deleted: bool,
) -> Result<Option<ResourceId>, CrmError> {
    let users = col(VariantKind::User.table());
    let mut select = Query::select()
        .column((col(RESOURCES), col(ID)))
        .from(col(RESOURCES))
        .inner_join(
            users.clone(),
            Expr::col((col(RESOURCES), col(VariantKind::User.resource_column())))
                .equals((users.clone(), col(ID))),
        )
        .and_where(Expr::col((users.clone(), col("username"))).eq(username))
        .to_owned();
    if !include_deleted {
        select.and_where(Expr::col((users, col(DELETED_BY))).is_null());
    }

    match query_one(db, &select).await? {
        Some(row) => Ok(Some(ResourceId(row.try_get::<i64>("", ID)?))),
        None => Ok(None),
    }
}

/// Look up a live user by username.
pub async fn find_user_by_username<C: ConnectionTrait>(
    db: &C,
    username: &str,
) -> Result<Option<Resource>, CrmError> {
    match user_id_by_username(db, username, false).await? {
        Some(id) => load(db, id, false).await,
        None => Ok(None),
    }
}

/// Whether another user already holds `username`. Soft-deleted users keep
/// their name reserved, matching the unique index on `users.username`.
pub async fn username_taken<C: ConnectionTrait>(
    db: &C,
    username: &str,
    except: Option<ResourceId>,
) -> Result<bool, CrmError> {
    Ok(user_id_by_username(db, username, true)
        .await?
        .is_some_and(|id| Some(id) != except))
}

/// The acting identity of a User resource.
pub fn actor_from_resource(user: &Resource) -> Option<Actor> {
    if user.kind() != VariantKind::User || user.is_deleted() {
        return None;
    }
    let id = user.id()?;
    let username = user
        .row()
        .get("username")
        .and_then(StoredValue::as_text)?
        .to_string();
    let role = user
        .row()
        .get("role")
        .and_then(StoredValue::as_text)
        .and_then(|r| r.parse::<UserRole>().ok())
        .unwrap_or(UserRole::Sales);
    Some(Actor { id, username, role })
}

pub async fn load_actor(db: &DatabaseConnection, id: ResourceId) -> Result<Option<Actor>, CrmError> {
    Ok(load(db, id, false)
        .await?
        .as_ref()
        .and_then(actor_from_resource))
}

/// Check credentials through the password field's comparison.
pub async fn verify_login(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<Option<Actor>, CrmError> {
    let Some(user) = find_user_by_username(db, username).await? else {
        return Ok(None);
    };
    let Some(field) = user.field("password") else {
        return Ok(None);
    };

    let candidate = Argument::Secret {
        password: password.to_string(),
        confirmation: None,
    };
    if field.compare(user.row(), &candidate) {
        Ok(actor_from_resource(&user))
    } else {
        Ok(None)
    }
}

pub async fn create_login_session(
    db: &DatabaseConnection,
    user: ResourceId,
    ttl_secs: i64,
    user_agent: Option<String>,
) -> Result<entities::login_session::Model, CrmError> {
    let now = Utc::now().timestamp();
    let session = entities::login_session::ActiveModel {
        session_id: Set(random_id()),
        user_id: Set(user.0),
        created_at: Set(now),
        expires_at: Set(now + ttl_secs),
        user_agent: Set(user_agent),
    };
    Ok(session.insert(db).await?)
}

/// Expired sessions read as absent.
pub async fn get_login_session(
    db: &DatabaseConnection,
    session_id: &str,
) -> Result<Option<entities::login_session::Model>, CrmError> {
    let session = entities::LoginSession::find_by_id(session_id.to_string())
        .one(db)
        .await?;
    let now = Utc::now().timestamp();
    Ok(session.filter(|s| s.expires_at >= now))
}

pub async fn delete_login_session(db: &DatabaseConnection, session_id: &str) -> Result<(), CrmError> {
    use entities::login_session::{Column, Entity};

    Entity::delete_many()
        .filter(Column::SessionId.eq(session_id))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn cleanup_expired_login_sessions(db: &DatabaseConnection) -> Result<u64, CrmError> {
    use entities::login_session::{Column, Entity};

    let now = Utc::now().timestamp();
    let result = Entity::delete_many()
        .filter(Column::ExpiresAt.lt(now))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
