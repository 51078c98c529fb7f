//! Postgres-backed directory store.
//!
//! Many-to-many links (user roles, role menus, direct grants) are kept as
//! `UUID[]` columns on the owning row, so every save is a single upsert.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Anything else | - | `Storage` |

use std::sync::Arc;

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use xadmin_auth::PermissionEntry;
use xadmin_core::{ConfigId, DataPermissionId, DeptId, LoginLogId, MenuId, RoleId, UserId};

use super::{
    ConfigRecord, DataPermissionRecord, DeptRecord, DirectoryStore, LoginLogRecord, MenuRecord, RoleRecord,
    StoreError, StoreResult, UserRecord,
};

const SCHEMA: &str = include_str!("schema.sql");

const USER_COLUMNS: &str = "id, username, password_hash, email, phone, nickname, is_active, is_staff, \
     is_superuser, dept_id, role_ids, data_permission_ids, last_login, created_at, updated_at, is_deleted";
const ROLE_COLUMNS: &str =
    "id, name, code, is_active, sort, description, menu_ids, data_permission_ids, created_at, updated_at";
const MENU_COLUMNS: &str =
    "id, name, title, path, method, permission, menu_type, parent_id, sort, is_active, created_at, updated_at";
const DEPT_COLUMNS: &str =
    "id, name, code, parent_id, is_active, sort, leader, phone, email, role_ids, created_at, updated_at";
const DATA_PERMISSION_COLUMNS: &str = "id, name, code, path, method, is_active, created_at, updated_at";
const CONFIG_COLUMNS: &str = "id, key, value, name, category, is_active, created_at, updated_at";
const LOGIN_LOG_COLUMNS: &str =
    "id, user_id, username, login_type, succeeded, message, ip_address, user_agent, created_at";

/// Postgres-backed directory store.
///
/// Uses the SQLx connection pool: each query borrows a connection for its own
/// duration only.
#[derive(Debug, Clone)]
pub struct PostgresDirectoryStore {
    pool: Arc<PgPool>,
}

impl PostgresDirectoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn fetch_all(&self, operation: &str, sql: &str) -> StoreResult<Vec<PgRow>> {
        sqlx::query(sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn fetch_by_uuid(&self, operation: &str, sql: &str, id: Uuid) -> StoreResult<Option<PgRow>> {
        sqlx::query(sql)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn delete_by_uuid(&self, operation: &str, sql: &str, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(sql)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(result.rows_affected() > 0)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            if db_err.code().as_deref() == Some("23505") {
                StoreError::Conflict(msg)
            } else {
                StoreError::Storage(msg)
            }
        }
        sqlx::Error::PoolClosed => StoreError::Storage(format!("connection pool closed in {operation}")),
        other => StoreError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}

fn decode<T>(operation: &str, rows: Vec<PgRow>, f: fn(&PgRow) -> Result<T, sqlx::Error>) -> StoreResult<Vec<T>> {
    rows.iter()
        .map(f)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Storage(format!("failed to decode row in {operation}: {e}")))
}

fn decode_one<T>(
    operation: &str,
    row: Option<PgRow>,
    f: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> StoreResult<Option<T>> {
    row.as_ref()
        .map(f)
        .transpose()
        .map_err(|e| StoreError::Storage(format!("failed to decode row in {operation}: {e}")))
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    Ok(UserRecord {
        id: UserId::from_uuid(row.try_get("id")?),
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        nickname: row.try_get("nickname")?,
        is_active: row.try_get("is_active")?,
        is_staff: row.try_get("is_staff")?,
        is_superuser: row.try_get("is_superuser")?,
        dept_id: row.try_get::<Option<Uuid>, _>("dept_id")?.map(DeptId::from_uuid),
        role_ids: row
            .try_get::<Vec<Uuid>, _>("role_ids")?
            .into_iter()
            .map(RoleId::from_uuid)
            .collect(),
        data_permission_ids: row
            .try_get::<Vec<Uuid>, _>("data_permission_ids")?
            .into_iter()
            .map(DataPermissionId::from_uuid)
            .collect(),
        last_login: row.try_get("last_login")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        is_deleted: row.try_get("is_deleted")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<RoleRecord, sqlx::Error> {
    Ok(RoleRecord {
        id: RoleId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        is_active: row.try_get("is_active")?,
        sort: row.try_get("sort")?,
        description: row.try_get("description")?,
        menu_ids: row
            .try_get::<Vec<Uuid>, _>("menu_ids")?
            .into_iter()
            .map(MenuId::from_uuid)
            .collect(),
        data_permission_ids: row
            .try_get::<Vec<Uuid>, _>("data_permission_ids")?
            .into_iter()
            .map(DataPermissionId::from_uuid)
            .collect(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn menu_from_row(row: &PgRow) -> Result<MenuRecord, sqlx::Error> {
    let menu_type: String = row.try_get("menu_type")?;
    Ok(MenuRecord {
        id: MenuId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        title: row.try_get("title")?,
        path: row.try_get("path")?,
        method: row.try_get("method")?,
        permission: row.try_get("permission")?,
        menu_type: menu_type.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        parent_id: row.try_get::<Option<Uuid>, _>("parent_id")?.map(MenuId::from_uuid),
        sort: row.try_get("sort")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn dept_from_row(row: &PgRow) -> Result<DeptRecord, sqlx::Error> {
    Ok(DeptRecord {
        id: DeptId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        parent_id: row.try_get::<Option<Uuid>, _>("parent_id")?.map(DeptId::from_uuid),
        is_active: row.try_get("is_active")?,
        sort: row.try_get("sort")?,
        leader: row.try_get("leader")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        role_ids: row
            .try_get::<Vec<Uuid>, _>("role_ids")?
            .into_iter()
            .map(RoleId::from_uuid)
            .collect(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn data_permission_from_row(row: &PgRow) -> Result<DataPermissionRecord, sqlx::Error> {
    Ok(DataPermissionRecord {
        id: DataPermissionId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        path: row.try_get("path")?,
        method: row.try_get("method")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn config_from_row(row: &PgRow) -> Result<ConfigRecord, sqlx::Error> {
    Ok(ConfigRecord {
        id: ConfigId::from_uuid(row.try_get("id")?),
        key: row.try_get("key")?,
        value: row.try_get("value")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn login_log_from_row(row: &PgRow) -> Result<LoginLogRecord, sqlx::Error> {
    Ok(LoginLogRecord {
        id: LoginLogId::from_uuid(row.try_get("id")?),
        user_id: row.try_get::<Option<Uuid>, _>("user_id")?.map(UserId::from_uuid),
        username: row.try_get("username")?,
        login_type: row.try_get("login_type")?,
        succeeded: row.try_get("succeeded")?,
        message: row.try_get("message")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait::async_trait]
impl DirectoryStore for PostgresDirectoryStore {
    async fn user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND NOT is_deleted");
        let row = self.fetch_by_uuid("user_by_id", &sql, *id.as_uuid()).await?;
        decode_one("user_by_id", row, user_from_row)
    }

    #[instrument(skip(self), err)]
    async fn user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND NOT is_deleted");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_username", e))?;
        decode_one("user_by_username", row, user_from_row)
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE NOT is_deleted ORDER BY created_at, id");
        let rows = self.fetch_all("list_users", &sql).await?;
        decode("list_users", rows, user_from_row)
    }

    async fn save_user(&self, user: &UserRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, password_hash, email, phone, nickname, is_active, is_staff,
                is_superuser, dept_id, role_ids, data_permission_ids, last_login, created_at,
                updated_at, is_deleted
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                password_hash = EXCLUDED.password_hash,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                nickname = EXCLUDED.nickname,
                is_active = EXCLUDED.is_active,
                is_staff = EXCLUDED.is_staff,
                is_superuser = EXCLUDED.is_superuser,
                dept_id = EXCLUDED.dept_id,
                role_ids = EXCLUDED.role_ids,
                data_permission_ids = EXCLUDED.data_permission_ids,
                last_login = EXCLUDED.last_login,
                updated_at = EXCLUDED.updated_at,
                is_deleted = EXCLUDED.is_deleted
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.nickname)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(user.dept_id.map(Uuid::from))
        .bind(uuids(&user.role_ids))
        .bind(uuids(&user.data_permission_ids))
        .bind(user.last_login)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.is_deleted)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_user", e))?;
        Ok(())
    }

    async fn count_users_in_dept(&self, dept_id: DeptId) -> StoreResult<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM users WHERE dept_id = $1 AND NOT is_deleted")
            .bind(dept_id.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_users_in_dept", e))?;
        let total: i64 = row
            .try_get("total")
            .map_err(|e| StoreError::Storage(format!("failed to read count: {e}")))?;
        Ok(usize::try_from(total).unwrap_or(0))
    }

    async fn role_by_id(&self, id: RoleId) -> StoreResult<Option<RoleRecord>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1");
        let row = self.fetch_by_uuid("role_by_id", &sql, *id.as_uuid()).await?;
        decode_one("role_by_id", row, role_from_row)
    }

    async fn roles_by_ids(&self, ids: &[RoleId]) -> StoreResult<Vec<RoleRecord>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ANY($1) ORDER BY sort, id");
        let rows = sqlx::query(&sql)
            .bind(uuids(ids))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("roles_by_ids", e))?;
        decode("roles_by_ids", rows, role_from_row)
    }

    async fn list_roles(&self) -> StoreResult<Vec<RoleRecord>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY sort, id");
        let rows = self.fetch_all("list_roles", &sql).await?;
        decode("list_roles", rows, role_from_row)
    }

    async fn save_role(&self, role: &RoleRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO roles (
                id, name, code, is_active, sort, description, menu_ids, data_permission_ids,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                code = EXCLUDED.code,
                is_active = EXCLUDED.is_active,
                sort = EXCLUDED.sort,
                description = EXCLUDED.description,
                menu_ids = EXCLUDED.menu_ids,
                data_permission_ids = EXCLUDED.data_permission_ids,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.code)
        .bind(role.is_active)
        .bind(role.sort)
        .bind(&role.description)
        .bind(uuids(&role.menu_ids))
        .bind(uuids(&role.data_permission_ids))
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_role", e))?;
        Ok(())
    }

    async fn delete_role(&self, id: RoleId) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("delete_role", e))?;
        sqlx::query("UPDATE users SET role_ids = array_remove(role_ids, $1) WHERE $1 = ANY(role_ids)")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;
        sqlx::query("UPDATE depts SET role_ids = array_remove(role_ids, $1) WHERE $1 = ANY(role_ids)")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("delete_role", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn menu_by_id(&self, id: MenuId) -> StoreResult<Option<MenuRecord>> {
        let sql = format!("SELECT {MENU_COLUMNS} FROM menus WHERE id = $1");
        let row = self.fetch_by_uuid("menu_by_id", &sql, *id.as_uuid()).await?;
        decode_one("menu_by_id", row, menu_from_row)
    }

    async fn list_menus(&self) -> StoreResult<Vec<MenuRecord>> {
        let sql = format!("SELECT {MENU_COLUMNS} FROM menus ORDER BY sort, id");
        let rows = self.fetch_all("list_menus", &sql).await?;
        decode("list_menus", rows, menu_from_row)
    }

    async fn save_menu(&self, menu: &MenuRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO menus (
                id, name, title, path, method, permission, menu_type, parent_id, sort, is_active,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                title = EXCLUDED.title,
                path = EXCLUDED.path,
                method = EXCLUDED.method,
                permission = EXCLUDED.permission,
                menu_type = EXCLUDED.menu_type,
                parent_id = EXCLUDED.parent_id,
                sort = EXCLUDED.sort,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(menu.id.as_uuid())
        .bind(&menu.name)
        .bind(&menu.title)
        .bind(&menu.path)
        .bind(&menu.method)
        .bind(&menu.permission)
        .bind(menu.menu_type.as_str())
        .bind(menu.parent_id.map(Uuid::from))
        .bind(menu.sort)
        .bind(menu.is_active)
        .bind(menu.created_at)
        .bind(menu.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_menu", e))?;
        Ok(())
    }

    async fn delete_menu(&self, id: MenuId) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("delete_menu", e))?;
        sqlx::query("UPDATE roles SET menu_ids = array_remove(menu_ids, $1) WHERE $1 = ANY(menu_ids)")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_menu", e))?;
        let result = sqlx::query("DELETE FROM menus WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_menu", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("delete_menu", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn dept_by_id(&self, id: DeptId) -> StoreResult<Option<DeptRecord>> {
        let sql = format!("SELECT {DEPT_COLUMNS} FROM depts WHERE id = $1");
        let row = self.fetch_by_uuid("dept_by_id", &sql, *id.as_uuid()).await?;
        decode_one("dept_by_id", row, dept_from_row)
    }

    async fn list_depts(&self) -> StoreResult<Vec<DeptRecord>> {
        let sql = format!("SELECT {DEPT_COLUMNS} FROM depts ORDER BY sort, id");
        let rows = self.fetch_all("list_depts", &sql).await?;
        decode("list_depts", rows, dept_from_row)
    }

    async fn save_dept(&self, dept: &DeptRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO depts (
                id, name, code, parent_id, is_active, sort, leader, phone, email, role_ids, created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                code = EXCLUDED.code,
                parent_id = EXCLUDED.parent_id,
                is_active = EXCLUDED.is_active,
                sort = EXCLUDED.sort,
                leader = EXCLUDED.leader,
                phone = EXCLUDED.phone,
                email = EXCLUDED.email,
                role_ids = EXCLUDED.role_ids,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(dept.id.as_uuid())
        .bind(&dept.name)
        .bind(&dept.code)
        .bind(dept.parent_id.map(Uuid::from))
        .bind(dept.is_active)
        .bind(dept.sort)
        .bind(&dept.leader)
        .bind(&dept.phone)
        .bind(&dept.email)
        .bind(uuids(&dept.role_ids))
        .bind(dept.created_at)
        .bind(dept.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_dept", e))?;
        Ok(())
    }

    async fn delete_dept(&self, id: DeptId) -> StoreResult<bool> {
        self.delete_by_uuid("delete_dept", "DELETE FROM depts WHERE id = $1", *id.as_uuid())
            .await
    }

    async fn data_permission_by_id(&self, id: DataPermissionId) -> StoreResult<Option<DataPermissionRecord>> {
        let sql = format!("SELECT {DATA_PERMISSION_COLUMNS} FROM data_permissions WHERE id = $1");
        let row = self.fetch_by_uuid("data_permission_by_id", &sql, *id.as_uuid()).await?;
        decode_one("data_permission_by_id", row, data_permission_from_row)
    }

    async fn list_data_permissions(&self) -> StoreResult<Vec<DataPermissionRecord>> {
        let sql = format!("SELECT {DATA_PERMISSION_COLUMNS} FROM data_permissions ORDER BY created_at, id");
        let rows = self.fetch_all("list_data_permissions", &sql).await?;
        decode("list_data_permissions", rows, data_permission_from_row)
    }

    async fn save_data_permission(&self, permission: &DataPermissionRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO data_permissions (id, name, code, path, method, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                code = EXCLUDED.code,
                path = EXCLUDED.path,
                method = EXCLUDED.method,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(&permission.name)
        .bind(&permission.code)
        .bind(&permission.path)
        .bind(&permission.method)
        .bind(permission.is_active)
        .bind(permission.created_at)
        .bind(permission.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_data_permission", e))?;
        Ok(())
    }

    async fn delete_data_permission(&self, id: DataPermissionId) -> StoreResult<bool> {
        let op = "delete_data_permission";
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(op, e))?;
        sqlx::query(
            "UPDATE users SET data_permission_ids = array_remove(data_permission_ids, $1) \
             WHERE $1 = ANY(data_permission_ids)",
        )
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
        sqlx::query(
            "UPDATE roles SET data_permission_ids = array_remove(data_permission_ids, $1) \
             WHERE $1 = ANY(data_permission_ids)",
        )
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
        let result = sqlx::query("DELETE FROM data_permissions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        tx.commit().await.map_err(|e| map_sqlx_error(op, e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn config_by_key(&self, key: &str) -> StoreResult<Option<ConfigRecord>> {
        let sql = format!("SELECT {CONFIG_COLUMNS} FROM system_configs WHERE key = $1");
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("config_by_key", e))?;
        decode_one("config_by_key", row, config_from_row)
    }

    async fn list_configs(&self) -> StoreResult<Vec<ConfigRecord>> {
        let sql = format!("SELECT {CONFIG_COLUMNS} FROM system_configs ORDER BY key");
        let rows = self.fetch_all("list_configs", &sql).await?;
        decode("list_configs", rows, config_from_row)
    }

    async fn save_config(&self, config: &ConfigRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO system_configs (id, key, value, name, category, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                name = EXCLUDED.name,
                category = EXCLUDED.category,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(config.id.as_uuid())
        .bind(&config.key)
        .bind(&config.value)
        .bind(&config.name)
        .bind(&config.category)
        .bind(config.is_active)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_config", e))?;
        Ok(())
    }

    async fn delete_config(&self, key: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM system_configs WHERE key = $1")
            .bind(key)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_config", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_login_log(&self, entry: &LoginLogRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO login_logs (
                id, user_id, username, login_type, succeeded, message, ip_address, user_agent, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.user_id.map(Uuid::from))
        .bind(&entry.username)
        .bind(&entry.login_type)
        .bind(entry.succeeded)
        .bind(&entry.message)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_login_log", e))?;
        Ok(())
    }

    async fn list_login_logs(&self) -> StoreResult<Vec<LoginLogRecord>> {
        let sql = format!("SELECT {LOGIN_LOG_COLUMNS} FROM login_logs ORDER BY created_at DESC, id DESC");
        let rows = self.fetch_all("list_login_logs", &sql).await?;
        decode("list_login_logs", rows, login_log_from_row)
    }

    #[instrument(skip_all, fields(user_id = %user_id), err)]
    async fn permission_entries_for(&self, user_id: UserId) -> StoreResult<Vec<PermissionEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id AS menu_id, m.path, m.method
            FROM users u
            LEFT JOIN depts d ON d.id = u.dept_id AND d.is_active
            JOIN roles r
                ON (r.id = ANY(u.role_ids) OR r.id = ANY(COALESCE(d.role_ids, '{}')))
                AND r.is_active
            JOIN menus m ON m.id = ANY(r.menu_ids)
            WHERE u.id = $1
                AND NOT u.is_deleted
                AND m.is_active
                AND m.menu_type = 'permission'
                AND m.method IS NOT NULL
            UNION
            SELECT NULL::uuid AS menu_id, p.path, p.method
            FROM users u
            JOIN data_permissions p ON p.id = ANY(u.data_permission_ids) AND p.is_active
            WHERE u.id = $1 AND NOT u.is_deleted
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permission_entries_for", e))?;

        decode("permission_entries_for", rows, |row| {
            let menu_id: Option<Uuid> = row.try_get("menu_id")?;
            let entry = PermissionEntry::new(row.try_get::<String, _>("path")?, row.try_get::<String, _>("method")?);
            Ok(match menu_id {
                Some(id) => entry.with_menu(MenuId::from_uuid(id)),
                None => entry,
            })
        })
    }
}
