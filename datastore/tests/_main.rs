//! Live-database scenarios.
//!
//! Needs a PostgreSQL superuser connection URL in `UN0_TEST_DATABASE_URL`, on a server with
//! the AGE, supa_audit and pgjwt extensions available. Without it every scenario is skipped.

use anyhow::{bail, ensure, Context, Result};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::env;
use std::str::FromStr;
use un0_datastore::compile::Target;
use un0_datastore::{create_database, ConnectTargets, DbSettings, PlanOpts};
use un0_schema::{
    register_builtin, standard_table, AuditMode, DataType, FieldDescriptor, SchemaRegistry,
};

struct Env {
    registry: SchemaRegistry,
    settings: DbSettings,
    targets: ConnectTargets,
}

macro_rules! run_scenarios {
    ($env:expr, $($scenario:ident),* $(,)?) => {$(
        println!("{}", stringify!($scenario));
        $scenario($env).await
            .with_context(|| format!("scenario {} failed", stringify!($scenario)))?;
        println!("OK");
    )*};
}

#[tokio::main]
async fn main() -> Result<()> {
    let url = match env::var("UN0_TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            println!("UN0_TEST_DATABASE_URL is not set, skipping live-database scenarios");
            return Ok(());
        }
    };
    let base = PgConnectOptions::from_str(&url).context("invalid UN0_TEST_DATABASE_URL")?;
    let settings = DbSettings { db_name: "un0_test".into(), ..Default::default() };
    let targets = ConnectTargets::new(base, "postgres", &settings.db_name);
    let env = Env { registry: registry()?, settings, targets };

    let opts = PlanOpts { drop_existing: true, seed: true };
    create_database(&env.registry, &env.settings, &opts, &env.targets)
        .await
        .context("could not create the test database")?;

    run_scenarios!(
        &env,
        bootstrap_superuser,
        rerun_is_harmless,
        owner_tracking,
        missing_session_user,
        soft_delete,
        history_rows,
        tenant_group_and_edges,
        row_level_security,
        authorization,
    );
    Ok(())
}

fn registry() -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    register_builtin(&mut registry)?;
    registry.register(
        standard_table("app", "invoice")
            .field(FieldDescriptor::new("total", DataType::Numeric).not_null())
            .build()?,
    )?;
    registry.register(
        standard_table("app", "ledger")
            .field(FieldDescriptor::new("amount", DataType::Numeric).not_null())
            .audit(AuditMode::History)
            .build()?,
    )?;
    Ok(registry)
}

async fn connect(env: &Env) -> Result<PgConnection> {
    let mut conn = env.targets.connect(Target::Database).await?;
    // the database roles get this search path, the connecting superuser does not
    sqlx::query("SET search_path TO ag_catalog, un0, audit, graph, app, public")
        .execute(&mut conn)
        .await?;
    Ok(conn)
}

/// A connection acting as the reader role with the given session variables.
async fn connect_as_reader(env: &Env, vars: &[(&str, &str)]) -> Result<PgConnection> {
    let mut conn = connect(env).await?;
    sqlx::query(&format!("SET ROLE \"{}\"", env.settings.reader_role()))
        .execute(&mut conn)
        .await?;
    for (name, value) in vars {
        sqlx::query("SELECT set_config($1, $2, false)")
            .bind(format!("{}.{}", env.settings.session_prefix, name))
            .bind(*value)
            .execute(&mut conn)
            .await?;
    }
    Ok(conn)
}

async fn superuser_id(conn: &mut PgConnection, env: &Env) -> Result<String> {
    sqlx::query_scalar("SELECT id FROM un0.\"user\" WHERE email = $1")
        .bind(&env.settings.superuser.email)
        .fetch_one(conn)
        .await
        .context("superuser was not seeded")
}

async fn set_session_user(conn: &mut PgConnection, user_id: &str) -> Result<()> {
    sqlx::query("SELECT set_config('rls_var.user_id', $1, false)")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

const GRANT_ROLE: &str =
    "INSERT INTO un0.user_group_role (user_id, group_id, role_id) VALUES ($1, $2, $3)";

async fn count(conn: &mut PgConnection, sql: &str) -> Result<i64> {

    Ok(sqlx::query_scalar(sql).fetch_one(conn).await?)
}

async fn bootstrap_superuser(env: &Env) -> Result<()> {
    let mut conn = connect(env).await?;
    ensure!(count(&mut conn, "SELECT count(*) FROM un0.\"user\"").await? == 1);
    let id = superuser_id(&mut conn, env).await?;
    ensure!(id.len() == 26, "superuser id {:?} is not a ULID", id);
    // the key is shared with a related object of the user table type
    let related = count(
        &mut conn,
        "SELECT count(*) FROM un0.related_object r, un0.table_type t \
        WHERE r.table_type_id = t.id AND t.db_schema = 'un0' AND t.name = 'user'",
    )
    .await?;
    ensure!(related == 1);
    ensure!(count(&mut conn, "SELECT count(*) FROM graph.\"User\"").await? == 1);
    Ok(())
}

async fn rerun_is_harmless(env: &Env) -> Result<()> {
    create_database(&env.registry, &env.settings, &PlanOpts::default(), &env.targets).await?;
    let mut conn = connect(env).await?;
    ensure!(count(&mut conn, "SELECT count(*) FROM un0.\"user\"").await? == 1);
    let permissions = count(
        &mut conn,
        "SELECT count(*) FROM un0.tablepermission tp, un0.table_type t \
        WHERE tp.table_type_id = t.id AND t.db_schema = 'app' AND t.name = 'invoice'",
    )
    .await?;
    ensure!(permissions == 5, "expected 5 table permissions, found {}", permissions);
    Ok(())
}

async fn owner_tracking(env: &Env) -> Result<()> {
    let mut conn = connect(env).await?;
    let user_id = superuser_id(&mut conn, env).await?;
    set_session_user(&mut conn, &user_id).await?;

    let id: String =
        sqlx::query_scalar("INSERT INTO app.invoice (total) VALUES (10) RETURNING id")
            .fetch_one(&mut conn)
            .await?;
    let (owner, modifier): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT owned_by_id, modified_by_id FROM app.invoice WHERE id = $1")
            .bind(&id)
            .fetch_one(&mut conn)
            .await?;
    ensure!(owner.as_deref() == Some(user_id.as_str()));
    ensure!(modifier.as_deref() == Some(user_id.as_str()));
    ensure!(count(&mut conn, "SELECT count(*) FROM graph.\"Invoice\"").await? == 1);
    Ok(())
}

async fn missing_session_user(env: &Env) -> Result<()> {
    let mut conn = connect(env).await?;
    match sqlx::query("INSERT INTO app.invoice (total) VALUES (1)").execute(&mut conn).await {
        Ok(_) => bail!("insert without a session user succeeded"),
        Err(err) => {
            ensure!(err.to_string().contains("user_id is NULL"), "unexpected error: {}", err)
        }
    }
    Ok(())
}

async fn soft_delete(env: &Env) -> Result<()> {
    let mut conn = connect(env).await?;
    let user_id = superuser_id(&mut conn, env).await?;
    set_session_user(&mut conn, &user_id).await?;

    let id: String =
        sqlx::query_scalar("INSERT INTO app.invoice (total) VALUES (20) RETURNING id")
            .fetch_one(&mut conn)
            .await?;
    let vertices = "SELECT count(*) FROM graph.\"Invoice\"";
    let before = count(&mut conn, vertices).await?;

    sqlx::query("DELETE FROM app.invoice WHERE id = $1").bind(&id).execute(&mut conn).await?;
    let (deleted, deleted_by): (bool, Option<String>) =
        sqlx::query_as("SELECT is_deleted, deleted_by_id FROM app.invoice WHERE id = $1")
            .bind(&id)
            .fetch_one(&mut conn)
            .await
            .context("first delete removed the row")?;
    ensure!(deleted);
    ensure!(deleted_by.as_deref() == Some(user_id.as_str()));
    ensure!(count(&mut conn, vertices).await? == before);

    sqlx::query("DELETE FROM app.invoice WHERE id = $1").bind(&id).execute(&mut conn).await?;
    let left: Option<String> = sqlx::query_scalar("SELECT id FROM app.invoice WHERE id = $1")
        .bind(&id)
        .fetch_optional(&mut conn)
        .await?;
    ensure!(left.is_none(), "second delete kept the row");
    ensure!(count(&mut conn, vertices).await? == before - 1);
    Ok(())
}

async fn history_count(conn: &mut PgConnection, id: &str) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT count(*) FROM audit.app_ledger WHERE id = $1")
        .bind(id)
        .fetch_one(conn)
        .await?)
}

async fn history_rows(env: &Env) -> Result<()> {
    let mut conn = connect(env).await?;
    let user_id = superuser_id(&mut conn, env).await?;
    set_session_user(&mut conn, &user_id).await?;

    let id: String =
        sqlx::query_scalar("INSERT INTO app.ledger (amount) VALUES (1) RETURNING id")
            .fetch_one(&mut conn)
            .await?;
    ensure!(history_count(&mut conn, &id).await? == 1);

    for amount in [2, 3] {
        sqlx::query("UPDATE app.ledger SET amount = $1 WHERE id = $2")
            .bind(amount)
            .bind(&id)
            .execute(&mut conn)
            .await?;
    }
    let rows = history_count(&mut conn, &id).await?;
    ensure!(rows == 3, "expected 3 history rows, found {}", rows);

    let latest: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM audit.app_ledger h, app.ledger l \
        WHERE h.id = l.id AND h.modified_at = l.modified_at AND h.amount = 3 AND l.id = $1",
    )
    .bind(&id)
    .fetch_one(&mut conn)
    .await?;
    ensure!(latest == 1, "the last update was not copied");
    Ok(())
}

async fn tenant_group_and_edges(env: &Env) -> Result<()> {
    let mut conn = connect(env).await?;
    let user_id = superuser_id(&mut conn, env).await?;
    set_session_user(&mut conn, &user_id).await?;

    let groups_before = count(&mut conn, "SELECT count(*) FROM graph.\"Group\"").await?;
    let tenant: String =
        sqlx::query_scalar("INSERT INTO un0.tenant (name) VALUES ('edges') RETURNING id")
            .fetch_one(&mut conn)
            .await?;
    let first: String =
        sqlx::query_scalar("SELECT id FROM un0.\"group\" WHERE tenant_id = $1 AND name = 'edges'")
            .bind(&tenant)
            .fetch_one(&mut conn)
            .await
            .context("the tenant got no group")?;
    let groups = count(&mut conn, "SELECT count(*) FROM graph.\"Group\"").await?;
    ensure!(groups == groups_before + 1, "the tenant's group has no vertex");

    let second: String = sqlx::query_scalar(
        "INSERT INTO un0.\"group\" (tenant_id, name) VALUES ($1, 'edges-2') RETURNING id",
    )
    .bind(&tenant)
    .fetch_one(&mut conn)
    .await?;
    let role: String = sqlx::query_scalar(
        "INSERT INTO un0.role (tenant_id, name) VALUES ($1, 'editor') RETURNING id",
    )
    .bind(&tenant)
    .fetch_one(&mut conn)
    .await?;

    // each row links user and group to the role
    let has_role = "SELECT count(*) FROM graph.\"HAS_ROLE\"";
    let before = count(&mut conn, has_role).await?;
    for group in [&first, &second] {
        sqlx::query(GRANT_ROLE)
            .bind(&user_id)
            .bind(group)
            .bind(&role)
            .execute(&mut conn)
            .await?;
    }
    ensure!(count(&mut conn, has_role).await? == before + 4);

    // the user holds the role through the second group still
    let delete =
        "DELETE FROM un0.user_group_role WHERE user_id = $1 AND group_id = $2 AND role_id = $3";
    sqlx::query(delete).bind(&user_id).bind(&first).bind(&role).execute(&mut conn).await?;
    let left = count(&mut conn, has_role).await?;
    ensure!(left == before + 2, "expected {} HAS_ROLE edges, found {}", before + 2, left);

    sqlx::query(delete).bind(&user_id).bind(&second).bind(&role).execute(&mut conn).await?;
    ensure!(count(&mut conn, has_role).await? == before);
    Ok(())
}

struct Invoices {
    owned: String,
    grouped: String,
    foreign: String,
}

impl Invoices {
    fn ids(&self) -> Vec<String> {
        vec![self.owned.clone(), self.grouped.clone(), self.foreign.clone()]
    }
}

async fn visible_invoices(
    env: &Env,
    invoices: &Invoices,
    vars: &[(&str, &str)],
) -> Result<Vec<String>> {
    let mut conn = connect_as_reader(env, vars).await?;
    let mut ids: Vec<String> = sqlx::query_scalar("SELECT id FROM app.invoice WHERE id = ANY($1)")
        .bind(invoices.ids())
        .fetch_all(&mut conn)
        .await?;
    ids.sort();
    Ok(ids)
}

fn sorted(ids: &[&String]) -> Vec<String> {
    let mut ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    ids.sort();
    ids
}

async fn row_level_security(env: &Env) -> Result<()> {
    let mut conn = connect(env).await?;
    let admin_id = superuser_id(&mut conn, env).await?;
    set_session_user(&mut conn, &admin_id).await?;

    let mut tenants = vec![];
    for name in ["acme", "globex"] {
        let id: String =
            sqlx::query_scalar("INSERT INTO un0.tenant (name) VALUES ($1) RETURNING id")
                .bind(name)
                .fetch_one(&mut conn)
                .await?;
        tenants.push(id);
    }
    let (acme, globex) = (&tenants[0], &tenants[1]);
    let acme_group: String =
        sqlx::query_scalar("SELECT id FROM un0.\"group\" WHERE tenant_id = $1")
            .bind(acme)
            .fetch_one(&mut conn)
            .await?;
    let member: String = sqlx::query_scalar(
        "INSERT INTO un0.\"user\" (email, handle, full_name, tenant_id) \
        VALUES ('member@acme.test', 'member', 'Member', $1) RETURNING id",
    )
    .bind(acme)
    .fetch_one(&mut conn)
    .await?;

    // the member may read invoices of the acme group through the role
    let role: String = sqlx::query_scalar(
        "INSERT INTO un0.role (tenant_id, name) VALUES ($1, 'reader') RETURNING id",
    )
    .bind(acme)
    .fetch_one(&mut conn)
    .await?;
    let permission: i32 = sqlx::query_scalar(
        "SELECT tp.id FROM un0.tablepermission tp, un0.table_type t \
        WHERE tp.table_type_id = t.id AND t.db_schema = 'app' AND t.name = 'invoice' \
        AND tp.actions = ARRAY['SELECT']::un0.permission_name[]",
    )
    .fetch_one(&mut conn)
    .await?;
    sqlx::query(
        "INSERT INTO un0.role_tablepermission (role_id, tablepermission_id) VALUES ($1, $2)",
    )
    .bind(&role)
    .bind(permission)
    .execute(&mut conn)
    .await?;
    sqlx::query(GRANT_ROLE)
        .bind(&member)
        .bind(&acme_group)
        .bind(&role)
        .execute(&mut conn)
        .await?;

    let grouped: String = sqlx::query_scalar(
        "INSERT INTO app.invoice (total, tenant_id, group_id) VALUES (2, $1, $2) RETURNING id",
    )
    .bind(acme)
    .bind(&acme_group)
    .fetch_one(&mut conn)
    .await?;
    let foreign: String = sqlx::query_scalar(
        "INSERT INTO app.invoice (total, tenant_id) VALUES (3, $1) RETURNING id",
    )
    .bind(globex)
    .fetch_one(&mut conn)
    .await?;
    set_session_user(&mut conn, &member).await?;
    let owned: String = sqlx::query_scalar(
        "INSERT INTO app.invoice (total, tenant_id) VALUES (1, $1) RETURNING id",
    )
    .bind(acme)
    .fetch_one(&mut conn)
    .await?;
    let invoices = Invoices { owned, grouped, foreign };

    let all = visible_invoices(env, &invoices, &[("is_superuser", "true")]).await?;
    let everything = sorted(&[&invoices.owned, &invoices.grouped, &invoices.foreign]);
    ensure!(all == everything, "superuser saw {:?}", all);

    let tenant_admin =
        [("is_superuser", "false"), ("is_tenant_admin", "true"), ("tenant_id", acme.as_str())];
    let seen = visible_invoices(env, &invoices, &tenant_admin).await?;
    ensure!(seen == sorted(&[&invoices.owned, &invoices.grouped]), "tenant admin saw {:?}", seen);

    let plain =
        [("is_superuser", "false"), ("is_tenant_admin", "false"), ("user_id", member.as_str())];
    let seen = visible_invoices(env, &invoices, &plain).await?;
    ensure!(seen == sorted(&[&invoices.owned, &invoices.grouped]), "member saw {:?}", seen);

    let stranger = [("is_superuser", "false"), ("user_id", "01ARZ3NDEKTSV4RRFFQ69G5FAV")];
    let seen = visible_invoices(env, &invoices, &stranger).await?;
    ensure!(seen.is_empty(), "a user without grants saw {:?}", seen);

    // tenant admins see only the groups of their tenant, and may not create any
    let mut reader = connect_as_reader(env, &tenant_admin).await?;
    let names: Vec<String> =
        sqlx::query_scalar("SELECT name FROM un0.\"group\" WHERE name IN ('acme', 'globex')")
            .fetch_all(&mut reader)
            .await?;
    ensure!(names == ["acme"], "tenant admin saw groups {:?}", names);

    let mut writer = connect(env).await?;
    sqlx::query(&format!("SET ROLE \"{}\"", env.settings.writer_role()))
        .execute(&mut writer)
        .await?;
    set_session_user(&mut writer, &member).await?;
    sqlx::query("SELECT set_config('rls_var.is_superuser', 'false', false)")
        .execute(&mut writer)
        .await?;
    match sqlx::query("INSERT INTO un0.\"group\" (tenant_id, name) VALUES ($1, 'sneaky')")
        .bind(acme)
        .execute(&mut writer)
        .await
    {
        Ok(_) => bail!("a non-superuser created a group"),
        Err(err) => {
            ensure!(err.to_string().contains("row-level security"), "unexpected error: {}", err)
        }
    }
    Ok(())
}

async fn sign(conn: &mut PgConnection, email: &str, secret: &str) -> Result<String> {
    let token: String = sqlx::query_scalar(
        "SELECT un0.sign(json_build_object('sub', $1::TEXT, \
        'exp', extract(epoch FROM now())::INTEGER + 3600), $2)",
    )
    .bind(email)
    .bind(secret)
    .fetch_one(conn)
    .await?;
    Ok(token)
}

/// Authorizes a transaction with `token` and returns the session user it got.
async fn authorize(env: &Env, token: &str) -> Result<String> {
    let mut conn = connect(env).await?;
    let mut tx = conn.begin().await?;
    sqlx::query("SELECT un0.authorize_user($1)").bind(token).execute(&mut tx).await?;
    let user: String = sqlx::query_scalar("SELECT current_setting('rls_var.user_id')")
        .fetch_one(&mut tx)
        .await?;
    let role: String = sqlx::query_scalar("SELECT current_user::TEXT").fetch_one(&mut tx).await?;
    tx.commit().await?;
    ensure!(role == env.settings.reader_role(), "authorized as {}", role);
    Ok(user)
}

async fn authorization(env: &Env) -> Result<()> {
    let mut conn = connect(env).await?;
    let admin_id = superuser_id(&mut conn, env).await?;
    set_session_user(&mut conn, &admin_id).await?;
    sqlx::query("INSERT INTO un0.token_secret (secret) VALUES ('s3cret')")
        .execute(&mut conn)
        .await?;

    let token = sign(&mut conn, &env.settings.superuser.email, "s3cret").await?;
    ensure!(authorize(env, &token).await? == admin_id);

    sqlx::query(
        "INSERT INTO un0.\"user\" (email, handle, full_name, is_active) \
        VALUES ('idle@example.com', 'idle', 'Idle', false), \
        ('gone@example.com', 'gone', 'Gone', true)",
    )
    .execute(&mut conn)
    .await?;
    sqlx::query("DELETE FROM un0.\"user\" WHERE email = 'gone@example.com'")
        .execute(&mut conn)
        .await?;

    let cases = [
        (sign(&mut conn, &env.settings.superuser.email, "wrong").await?, "invalid token"),
        (sign(&mut conn, "nobody@example.com", "s3cret").await?, "user not found"),
        (sign(&mut conn, "idle@example.com", "s3cret").await?, "user is not active"),
        (sign(&mut conn, "gone@example.com", "s3cret").await?, "user was deleted"),
    ];
    for (token, message) in cases {
        match authorize(env, &token).await {
            Ok(_) => bail!("token for {:?} was accepted", message),
            Err(err) => {
                ensure!(err.to_string().contains(message), "expected {:?}, got {}", message, err)
            }
        }
    }
    Ok(())
}
