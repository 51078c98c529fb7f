//! Service wiring: store selection, permission cache, token service and the
//! per-entity services shared by all handlers.

use std::sync::Arc;

use anyhow::Context;

use xadmin_auth::{InMemoryPermissionCache, PasswordHasher, PermissionCache, TokenService};
use xadmin_infra::services::{
    ConfigService, DataPermissionService, DeptService, LoginLogService, MenuService, NewUser, RoleService,
    UserService,
};
use xadmin_infra::{AccessControl, DirectoryStore, InMemoryDirectoryStore, PostgresDirectoryStore};

use crate::config::{AdminBootstrap, AppConfig};

pub struct AppServices {
    pub access: Arc<AccessControl>,
    pub users: UserService,
    pub roles: RoleService,
    pub menus: MenuService,
    pub depts: DeptService,
    pub data_permissions: DataPermissionService,
    pub configs: ConfigService,
    pub login_logs: LoginLogService,
    pub allow_registration: bool,
}

impl AppServices {
    pub fn tokens(&self) -> &TokenService {
        self.access.tokens()
    }
}

/// Postgres when `DATABASE_URL` is configured, in-memory otherwise.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn DirectoryStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("using postgres directory store");
            let store = PostgresDirectoryStore::connect(url, config.database_max_connections)
                .await
                .context("failed to connect to postgres")?;
            Arc::new(store)
        }
        None => {
            tracing::info!("DATABASE_URL not set; using in-memory directory store");
            Arc::new(InMemoryDirectoryStore::new())
        }
    };

    let services = build_services_with_store(config, store)?;
    if let Some(admin) = &config.bootstrap_admin {
        bootstrap_superuser(&services, admin).await?;
    }
    Ok(services)
}

pub fn build_services_with_store(config: &AppConfig, store: Arc<dyn DirectoryStore>) -> anyhow::Result<AppServices> {
    let tokens = Arc::new(TokenService::new(config.tokens.clone()).context("invalid token settings")?);
    let cache: Arc<dyn PermissionCache> = Arc::new(InMemoryPermissionCache::new(config.permission_cache_ttl));
    let hasher = PasswordHasher::with_cost(config.bcrypt_cost);

    let access = Arc::new(AccessControl::new(
        Arc::clone(&store),
        tokens,
        Arc::clone(&cache),
        config.access_policy.clone(),
    ));

    Ok(AppServices {
        access,
        users: UserService::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            hasher,
            config.password_policy.clone(),
        ),
        roles: RoleService::new(Arc::clone(&store), Arc::clone(&cache)),
        menus: MenuService::new(Arc::clone(&store), Arc::clone(&cache)),
        depts: DeptService::new(Arc::clone(&store), Arc::clone(&cache)),
        data_permissions: DataPermissionService::new(Arc::clone(&store), cache),
        configs: ConfigService::new(Arc::clone(&store)),
        login_logs: LoginLogService::new(store),
        allow_registration: config.allow_registration,
    })
}

async fn bootstrap_superuser(services: &AppServices, admin: &AdminBootstrap) -> anyhow::Result<()> {
    if services
        .users
        .by_username(&admin.username)
        .await
        .context("looking up bootstrap superuser")?
        .is_some()
    {
        return Ok(());
    }

    let user = services
        .users
        .create(NewUser {
            username: admin.username.clone(),
            password: admin.password.clone(),
            nickname: Some(admin.username.clone()),
            is_staff: true,
            is_superuser: true,
            ..NewUser::default()
        })
        .await
        .context("creating bootstrap superuser")?;
    tracing::info!(user_id = %user.id, username = %user.username, "bootstrap superuser created");
    Ok(())
}
