use std::sync::Arc;

use crm::access::{AccessPolicy, Actor};
use crm::edit::{EditSessionStore, Editor};
use crm::fields::{Argument, FieldValue};
use crm::mutation::{CommitContext, CommitException, ExceptionPolicy};
use crm::resource::{Resource, ResourceId, UserRole, VariantKind};
use crm::settings;
use crm::storage;
use sea_orm::DatabaseConnection;

/// Bootstrap administrator that exists only as an identity.
pub fn system_actor() -> Actor {
    Actor {
        id: ResourceId(0),
        username: "system".to_string(),
        role: UserRole::Administrator,
    }
}

pub fn editor(db: &DatabaseConnection) -> Editor {
    Editor {
        db: db.clone(),
        policy: Arc::new(AccessPolicy::from_schema()),
        sessions: Arc::new(EditSessionStore::new(&settings::EditSessions::default())),
        default_currency: "EUR".to_string(),
    }
}

/// Validate and commit everything staged on `resource`. Returns the
/// exceptions instead when the commit is refused.
pub async fn save(
    db: &DatabaseConnection,
    resource: &mut Resource,
    actor: &Actor,
) -> Result<ResourceId, Vec<CommitException>> {
    let mut ctx = CommitContext::new(ExceptionPolicy::default());
    for mutation in resource.pending_mutations() {
        ctx.add(mutation);
    }
    resource
        .validate(db, &mut ctx)
        .await
        .expect("Validation query failed");
    ctx.mark_validated();

    if ctx.has_exceptions() {
        return Err(ctx.exceptions().to_vec());
    }
    Ok(storage::commit(db, resource, &mut ctx, actor)
        .await
        .expect("Failed to commit"))
}

fn text(value: &str) -> Argument {
    Argument::Value(FieldValue::Text(value.to_string()))
}

/// Builder for creating test users
pub struct UserBuilder {
    username: String,
    password: String,
    role: UserRole,
}

impl UserBuilder {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            password: "password123".to_string(),
            role: UserRole::Sales,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn admin(mut self) -> Self {
        self.role = UserRole::Administrator;
        self
    }

    /// Returns the stored user and the actor it logs in as.
    pub async fn create(self, db: &DatabaseConnection) -> (Resource, Actor) {
        let mut user = Resource::new(VariantKind::User);
        user.set("username", text(&self.username)).unwrap();
        user.set(
            "password",
            Argument::Secret {
                password: self.password,
                confirmation: None,
            },
        )
        .unwrap();
        user.set(
            "role",
            Argument::Value(FieldValue::Choice(self.role.as_str().to_string())),
        )
        .unwrap();

        save(db, &mut user, &system_actor())
            .await
            .expect("Failed to create test user");
        let actor = storage::actor_from_resource(&user).expect("User has no actor");
        (user, actor)
    }
}

/// Builder for creating test accounts
pub struct AccountBuilder {
    name: String,
}

impl AccountBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub async fn create(self, db: &DatabaseConnection, owner: &Actor) -> Resource {
        let mut account = Resource::new(VariantKind::Account);
        account.set_created_by(owner.id).unwrap();
        account.set("name", text(&self.name)).unwrap();
        save(db, &mut account, owner)
            .await
            .expect("Failed to create test account");
        account
    }
}

/// Builder for creating test opportunities
pub struct OpportunityBuilder {
    name: String,
    account: Option<ResourceId>,
}

impl OpportunityBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            account: None,
        }
    }

    pub fn for_account(mut self, account: ResourceId) -> Self {
        self.account = Some(account);
        self
    }

    pub async fn create(self, db: &DatabaseConnection, owner: &Actor) -> Resource {
        let mut opportunity = Resource::new(VariantKind::Opportunity);
        opportunity.set_created_by(owner.id).unwrap();
        opportunity.set("name", text(&self.name)).unwrap();
        if let Some(account) = self.account {
            opportunity
                .set("account", Argument::Value(FieldValue::Reference(account)))
                .unwrap();
        }
        save(db, &mut opportunity, owner)
            .await
            .expect("Failed to create test opportunity");
        opportunity
    }
}
