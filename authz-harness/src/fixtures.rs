//! Resource fixtures: each one creates a resource during setup, stores it on
//! the [`Context`] and releases it again during teardown.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::app::Application;
use crate::config::HarnessConfig;
use crate::context::{
    Context, ModelInstance, ACCESS_TOKEN_MODEL, ANONYMOUS_TOKEN_ID, PRINCIPAL_TYPE_USER,
    ROLE_MAPPING_MODEL, ROLE_MODEL,
};
use crate::error::{resource_failure, FixtureError, Result};
use crate::hooks::{assign, Action, Fixture, Scope};

/// A model name, or the identity model configured on the context at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelName {
    Named(String),
    Identity,
}

impl ModelName {
    fn resolve(&self, cx: &Context) -> String {
        match self {
            ModelName::Named(name) => name.clone(),
            ModelName::Identity => cx.user_model().to_string(),
        }
    }
}

impl From<&str> for ModelName {
    fn from(name: &str) -> Self {
        ModelName::Named(name.to_string())
    }
}

struct BindApp(Arc<dyn Application>);

#[async_trait]
impl Action for BindApp {
    async fn run(&self, cx: &mut Context) -> Result<()> {
        cx.bind_app(self.0.clone());
        Ok(())
    }
}

/// Binds the application handle and its HTTP client, once per suite and again before every test.
pub fn with_app(app: Arc<dyn Application>) -> Fixture {
    Fixture::new(Scope::PerSuite)
        .setup("bind app", BindApp(app.clone()))
        .then(Fixture::new(Scope::PerTest).setup("bind app", BindApp(app)))
}

struct CleanDatasource(String);

#[async_trait]
impl Action for CleanDatasource {
    async fn run(&self, cx: &mut Context) -> Result<()> {
        let Ok(app) = cx.app() else {
            return Ok(());
        };
        let Some(datasource) = app.datasource(&self.0) else {
            debug!(datasource = %self.0, "no such datasource, skipping reset");
            return Ok(());
        };

        datasource
            .automigrate()
            .await
            .map_err(|e| resource_failure(format!("automigrate {}", self.0), e))?;
        datasource.reset_ids();
        info!(datasource = %self.0, "datasource reset");
        Ok(())
    }
}

/// Resets a datasource's schema and id registry. Setup only.
///
/// `None` resets the datasource named by `AUTHZ_DATASOURCE` (default `db`).
pub fn clean_datasource(name: Option<&str>, scope: Scope) -> Fixture {
    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| HarnessConfig::from_env().datasource);
    Fixture::new(scope).setup(format!("clean datasource {}", name), CleanDatasource(name))
}

pub fn with_args(args: Vec<Value>) -> Fixture {
    Fixture::new(Scope::PerTest).setup(
        "with args",
        assign(move |cx: &mut Context| cx.args = args.clone()),
    )
}

pub fn with_user_model(name: &str) -> Fixture {
    let name = name.to_string();
    Fixture::new(Scope::PerTest).setup(
        format!("use identity model {}", name),
        assign(move |cx: &mut Context| cx.set_user_model(name.clone())),
    )
}

/// The model name a create step resolved, shared with the matching release.
type CreatedName = Arc<Mutex<Option<String>>>;

struct CreateModel {
    model: ModelName,
    attrs: Value,
    created: CreatedName,
}

#[async_trait]
impl Action for CreateModel {
    async fn run(&self, cx: &mut Context) -> Result<()> {
        let name = self.model.resolve(cx);
        let app = cx.app()?;
        let model = app
            .model(&name)
            .ok_or_else(|| FixtureError::MissingModel(name.clone()))?;
        if !model.has_data_source() {
            return Err(FixtureError::MissingDataSource(name));
        }
        if !model.can_create() {
            return Err(FixtureError::MissingCreate(name));
        }

        let record = model
            .create(&self.attrs)
            .await
            .map_err(|e| resource_failure(format!("create {}", name), e))?;
        info!(model = %name, id = ?record.get("id"), "created model instance");
        if let Ok(mut created) = self.created.lock() {
            *created = Some(name.clone());
        }
        cx.insert_model(name, ModelInstance::new(model, record));
        Ok(())
    }
}

/// A context field holding a resource that teardown must release.
#[derive(Debug, Clone)]
enum Slot {
    Model { model: ModelName, created: CreatedName },
    Role,
    RoleMapping,
    Token,
}

impl Slot {
    /// Released under the name setup created it with, which may differ from
    /// the identity model configured now.
    fn model_name(model: &ModelName, created: &CreatedName, cx: &Context) -> String {
        created
            .lock()
            .ok()
            .and_then(|name| name.clone())
            .unwrap_or_else(|| model.resolve(cx))
    }

    fn describe(&self, cx: &Context) -> String {
        match self {
            Slot::Model { model, created } => Self::model_name(model, created, cx),
            Slot::Role => "role".to_string(),
            Slot::RoleMapping => "role mapping".to_string(),
            Slot::Token => "access token".to_string(),
        }
    }

    fn get(&self, cx: &Context) -> Option<ModelInstance> {
        match self {
            Slot::Model { model, created } => {
                cx.model(&Self::model_name(model, created, cx)).cloned()
            }
            Slot::Role => cx.user_role.clone(),
            Slot::RoleMapping => cx.user_role_mapping.clone(),
            Slot::Token => cx.token().cloned(),
        }
    }

    fn clear(&self, cx: &mut Context) {
        match self {
            Slot::Model { model, created } => {
                let name = Self::model_name(model, created, cx);
                cx.remove_model(&name);
                if let Ok(mut name) = created.lock() {
                    *name = None;
                }
            }
            Slot::Role => cx.user_role = None,
            Slot::RoleMapping => cx.user_role_mapping = None,
            Slot::Token => cx.set_token(None),
        }
    }
}

/// Destroys the resource in a slot and clears it. An empty slot is a no-op.
struct Release(Slot);

#[async_trait]
impl Action for Release {
    async fn run(&self, cx: &mut Context) -> Result<()> {
        let what = self.0.describe(cx);
        let Some(instance) = self.0.get(cx) else {
            debug!(resource = %what, "nothing to destroy");
            return Ok(());
        };

        instance
            .destroy()
            .await
            .map_err(|e| resource_failure(format!("destroy {}", what), e))?;
        self.0.clear(cx);
        info!(resource = %what, id = ?instance.id(), "destroyed");
        Ok(())
    }
}

/// Creates an instance of `model` and stores it under the model's name.
pub fn given_model(model: impl Into<ModelName>, attrs: Value, scope: Scope) -> Fixture {
    let model = model.into();
    let label = match &model {
        ModelName::Named(name) => name.clone(),
        ModelName::Identity => "user".to_string(),
    };
    let created = CreatedName::default();
    Fixture::new(scope)
        .setup(
            format!("create {}", label),
            CreateModel {
                model: model.clone(),
                attrs,
                created: created.clone(),
            },
        )
        .teardown(
            format!("destroy {}", label),
            Release(Slot::Model { model, created }),
        )
}

pub fn given_user(attrs: Value, scope: Scope) -> Fixture {
    given_model(ModelName::Identity, attrs, scope)
}

struct AssignRole(String);

#[async_trait]
impl Action for AssignRole {
    async fn run(&self, cx: &mut Context) -> Result<()> {
        let app = cx.app()?;
        let user = cx
            .user()
            .cloned()
            .ok_or_else(|| FixtureError::MissingResource(cx.user_model().to_string()))?;
        let roles = app
            .model(ROLE_MODEL)
            .ok_or_else(|| FixtureError::MissingModel(ROLE_MODEL.to_string()))?;
        let mappings = app
            .model(ROLE_MAPPING_MODEL)
            .ok_or_else(|| FixtureError::MissingModel(ROLE_MAPPING_MODEL.to_string()))?;

        let filter = json!({ "name": self.0 });
        let role = roles
            .find_or_create(&filter, &filter)
            .await
            .map_err(|e| resource_failure(format!("find or create role {}", self.0), e))?;
        let role = ModelInstance::new(roles, role);
        cx.user_role = Some(role.clone());

        let mapping = mappings
            .create(&json!({
                "principalId": user.id(),
                "principalType": PRINCIPAL_TYPE_USER,
                "roleId": role.id(),
            }))
            .await
            .map_err(|e| resource_failure("create role mapping", e))?;
        info!(role = %self.0, user = ?user.id(), "role assigned");
        cx.user_role_mapping = Some(ModelInstance::new(mappings, mapping));
        Ok(())
    }
}

/// Creates a user, finds or creates `role` and maps the user to it.
///
/// Teardown releases the mapping before the role it references, then the user.
pub fn given_user_with_role(attrs: Value, role: &str, scope: Scope) -> Fixture {
    Fixture::new(scope)
        .setup(format!("assign role {}", role), AssignRole(role.to_string()))
        .teardown("destroy role mapping", Release(Slot::RoleMapping))
        .teardown("destroy role", Release(Slot::Role))
        .around(given_user(attrs, scope))
}

struct Login(Value);

#[async_trait]
impl Action for Login {
    async fn run(&self, cx: &mut Context) -> Result<()> {
        let app = cx.app()?;
        let name = cx.user_model().to_string();
        let model = app
            .model(&name)
            .ok_or_else(|| FixtureError::MissingModel(name.clone()))?;

        let token = model
            .login(&self.0)
            .await
            .map_err(|e| resource_failure(format!("login {}", name), e))?;
        info!(model = %name, "logged in");
        cx.set_token(Some(token));
        Ok(())
    }
}

fn login_around(credentials: Value, scope: Scope, identity: Fixture) -> Fixture {
    Fixture::new(scope)
        .setup("login", Login(credentials))
        .teardown("destroy access token", Release(Slot::Token))
        .around(identity)
}

pub fn given_logged_in_user(credentials: Value, scope: Scope) -> Fixture {
    login_around(credentials.clone(), scope, given_user(credentials, scope))
}

pub fn given_logged_in_user_with_role(credentials: Value, role: &str, scope: Scope) -> Fixture {
    login_around(
        credentials.clone(),
        scope,
        given_user_with_role(credentials, role, scope),
    )
}

/// An access token record the store assigns an id to. No login happens.
pub fn given_an_unauthenticated_token(attrs: Value, scope: Scope) -> Fixture {
    given_model(ACCESS_TOKEN_MODEL, attrs, scope)
}

/// An access token record carrying the anonymous sentinel id. No login happens.
pub fn given_an_anonymous_token(scope: Scope) -> Fixture {
    given_model(ACCESS_TOKEN_MODEL, json!({ "id": ANONYMOUS_TOKEN_ID }), scope)
}
