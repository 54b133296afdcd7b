//! Database-wide objects: roles, the database itself, schemas, extensions, the graph,
//! privileges, enum types and the functions un0 tables rely on.

use un0_schema::{QualifiedName, SchemaRegistry};
use crate::ast::{
    Declare, Expr, FromItem, Function, FunctionArg, FunctionBody, GrantTarget, Insert, InsertSource,
    OnConflict, PlBlock, PlStmt, Select, Statement, Timing, Trigger, TriggerLevel,
};
use crate::settings::DbSettings;
use crate::sql_writer::SqlWriter;

fn un0(name: &str) -> QualifiedName {
    QualifiedName::new("un0", name)
}

/// Drops the database and the roles. Runs on the maintenance database.
pub fn drop_database(settings: &DbSettings) -> Vec<Statement> {
    let mut statements = vec![Statement::DropDatabase { name: settings.db_name.clone() }];
    for role in settings.roles().into_iter().rev() {
        statements.push(Statement::DropRole { name: role });
    }
    statements
}

/// Roles of the database; each is created only when missing.
pub fn create_roles(settings: &DbSettings) -> Vec<Statement> {
    let base = settings.base_role();
    let mut statements = vec![Statement::CreateRole {
        name: base.clone(),
        inherit: false,
        login_password: None,
        in_roles: vec![],
    }];
    for role in [settings.reader_role(), settings.writer_role(), settings.admin_role()] {
        statements.push(Statement::CreateRole {
            name: role,
            inherit: true,
            login_password: None,
            in_roles: vec![base.clone()],
        });
    }
    statements.push(Statement::CreateRole {
        name: settings.login_role(),
        inherit: false,
        login_password: Some(settings.login_password.clone()),
        in_roles: vec![base],
    });
    // the login role switches to these with SET ROLE
    for role in [settings.reader_role(), settings.writer_role(), settings.admin_role()] {
        statements.push(Statement::GrantRole { role, to: settings.login_role() });
    }
    statements
}

pub fn create_database(settings: &DbSettings) -> Statement {
    Statement::CreateDatabase { name: settings.db_name.clone(), owner: settings.admin_role() }
}

/// Returns a row when the database already exists.
pub fn database_exists(settings: &DbSettings) -> Statement {
    Statement::Select(
        Select::new(vec![])
            .from(FromItem::table(QualifiedName::new("pg_catalog", "pg_database")))
            .filter(Expr::eq(Expr::column("datname"), Expr::text(settings.db_name.as_str()))),
    )
}

/// Schemas, extensions and the AGE graph.
pub fn schemas_and_extensions(settings: &DbSettings) -> Vec<Statement> {
    let admin = settings.admin_role();
    let mut statements = vec![
        Statement::CreateSchema { name: "un0".into(), owner: Some(admin.clone()) },
        Statement::CreateSchema { name: settings.app_schema.clone(), owner: Some(admin.clone()) },
    ];
    for extension in &settings.extensions {
        let (schema, cascade) = match extension.as_str() {
            // AGE lives in ag_catalog and supa_audit in audit, whatever the search path says
            "age" => (None, false),
            "supa_audit" => (None, true),
            _ => (Some("un0".to_string()), true),
        };
        statements.push(Statement::CreateExtension { name: extension.clone(), schema, cascade });
    }
    statements.push(Statement::CreateSchema { name: "audit".into(), owner: None });

    if settings.load_age {
        statements.push(Statement::Load { library: "age".into() });
        statements.push(Statement::AlterDatabaseSet {
            database: settings.db_name.clone(),
            parameter: "session_preload_libraries",
            value: "age".into(),
        });
    }

    let graph_exists = Select::new(vec![])
        .from(FromItem::table(QualifiedName::new("ag_catalog", "ag_graph")))
        .filter(Expr::eq(Expr::column("name"), Expr::text(settings.graph_name.as_str())));
    let create_graph = Expr::call_schema(
        QualifiedName::new("ag_catalog", "create_graph"),
        vec![Expr::text(settings.graph_name.as_str())],
    );
    statements.push(Statement::Do(PlBlock::guarded(
        graph_exists,
        vec![PlStmt::Perform(create_graph)],
    )));
    statements
}

/// Revokes the defaults, then grants what each role needs.
pub fn privileges(settings: &DbSettings) -> Vec<Statement> {
    let schemas = settings.schemas();
    let mut with_catalog = schemas.clone();
    with_catalog.push("ag_catalog".into());
    let roles = settings.roles();
    let mut everyone = vec!["public".to_string()];
    everyone.extend(roles.iter().cloned());
    let users = vec![
        settings.login_role(),
        settings.admin_role(),
        settings.reader_role(),
        settings.writer_role(),
    ];

    let mut statements = vec![
        Statement::Revoke {
            privileges: "ALL",
            on: GrantTarget::Schemas(schemas.clone()),
            from: everyone.clone(),
        },
        Statement::Revoke {
            privileges: "ALL",
            on: GrantTarget::AllTablesIn(schemas.clone()),
            from: everyone.clone(),
        },
        Statement::Revoke {
            privileges: "CONNECT",
            on: GrantTarget::Database(settings.db_name.clone()),
            from: everyone.into_iter().filter(|r| *r != settings.login_role()).collect(),
        },
    ];

    let mut search_path = vec!["ag_catalog".to_string()];
    search_path.extend(schemas.iter().cloned());
    for role in &roles {
        statements.push(Statement::AlterRoleSearchPath {
            role: role.clone(),
            schemas: search_path.clone(),
        });
    }

    for schema in &schemas {
        statements.push(Statement::AlterSchemaOwner {
            schema: schema.clone(),
            owner: settings.admin_role(),
        });
    }
    statements.extend([
        Statement::Grant {
            privileges: "CONNECT",
            on: GrantTarget::Database(settings.db_name.clone()),
            to: vec![settings.login_role()],
        },
        Statement::Grant {
            privileges: "USAGE",
            on: GrantTarget::Schemas(with_catalog.clone()),
            to: users.clone(),
        },
        Statement::Grant {
            privileges: "CREATE",
            on: GrantTarget::Schemas(schemas.clone()),
            to: vec![settings.admin_role()],
        },
        Statement::Grant {
            privileges: "SELECT",
            on: GrantTarget::AllTablesIn(vec!["ag_catalog".into()]),
            to: users.clone(),
        },
        Statement::Grant {
            privileges: "EXECUTE",
            on: GrantTarget::AllFunctionsIn(with_catalog.clone()),
            to: users.clone(),
        },
        Statement::AlterDefaultPrivileges {
            schemas: schemas.clone(),
            privileges: "EXECUTE",
            objects: "FUNCTIONS",
            to: users.clone(),
        },
        // label tables are created by the superuser running the triggers' DDL
        Statement::AlterDefaultPrivileges {
            schemas: vec![settings.graph_name.clone()],
            privileges: "SELECT",
            objects: "TABLES",
            to: vec![settings.reader_role()],
        },
        Statement::AlterDefaultPrivileges {
            schemas: vec![settings.graph_name.clone()],
            privileges: "SELECT, INSERT, UPDATE, DELETE",
            objects: "TABLES",
            to: vec![settings.writer_role(), settings.admin_role()],
        },
        Statement::AlterDefaultPrivileges {
            schemas: vec![settings.graph_name.clone()],
            privileges: "USAGE, SELECT",
            objects: "SEQUENCES",
            to: vec![settings.writer_role(), settings.admin_role()],
        },
    ]);
    statements
}

pub fn enum_types(registry: &SchemaRegistry) -> Vec<Statement> {
    registry.enums().cloned().map(Statement::CreateEnum).collect()
}

const ULID_ENCODING: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// One base32 character of a ULID: bits `5 * i - 2 .. 5 * i + 3` of the 16 byte value,
/// the first character only having the 3 low bits.
fn ulid_char(i: i64) -> Expr {
    let start = (5 * i - 2).max(0);
    let end = 5 * i + 3;
    let mut parts = vec![];
    for byte in start / 8..=(end - 1) / 8 {
        let lo = start.max(byte * 8) - byte * 8;
        let hi = end.min(byte * 8 + 8) - byte * 8;
        let mask = ((1 << (hi - lo)) - 1) << (8 - hi);
        let mut part = Expr::binop(
            "&",
            Expr::call("get_byte", vec![Expr::Var("_ulid"), Expr::int(byte)]),
            Expr::int(mask),
        );
        if hi < 8 {
            part = Expr::binop(">>", part, Expr::int(8 - hi));
        }
        let shift = end - (byte * 8 + hi);
        if shift > 0 {
            part = Expr::binop("<<", part, Expr::int(shift));
        }
        parts.push(part);
    }
    let index = parts
        .into_iter()
        .reduce(|a, b| Expr::binop("|", a, b))
        .unwrap_or_else(|| Expr::int(0));
    Expr::call("chr", vec![Expr::call("get_byte", vec![Expr::Var("_encoding"), index])])
}

/// `un0.generate_ulid()`: 48 bits of milliseconds followed by 80 random bits, in Crockford's
/// base32.
pub fn generate_ulid() -> Statement {
    let assign = |target: &'static str, value: Expr| PlStmt::Assign {
        target: Expr::Var(target),
        value,
    };
    let now = Expr::Raw("(EXTRACT(EPOCH FROM clock_timestamp()) * 1000)::BIGINT");
    let mut body = vec![assign("_unix_time", now)];
    for byte in 0..6 {
        let shift = 40 - 8 * byte;
        let shifted = if shift == 0 {
            Expr::Var("_unix_time")
        } else {
            Expr::binop(">>", Expr::Var("_unix_time"), Expr::int(shift))
        };
        let args =
            vec![Expr::Var("_timestamp"), Expr::int(byte), shifted.cast("BIT(8)").cast("INTEGER")];
        body.push(assign("_timestamp", Expr::call("set_byte", args)));
    }
    let random = Expr::call_schema(un0("gen_random_bytes"), vec![Expr::int(10)]);
    body.push(assign("_ulid", Expr::binop("||", Expr::Var("_timestamp"), random)));
    for i in 0..26 {
        body.push(assign("_output", Expr::binop("||", Expr::Var("_output"), ulid_char(i))));
    }
    body.push(PlStmt::Return(Expr::Var("_output")));

    let block = PlBlock::new(body)
        .declare(Declare::new("_encoding", "BYTEA").init(Expr::text(ULID_ENCODING)))
        .declare(Declare::new("_timestamp", "BYTEA").init(Expr::text("\\x000000000000")))
        .declare(Declare::new("_output", "TEXT").init(Expr::text("")))
        .declare(Declare::new("_unix_time", "BIGINT"))
        .declare(Declare::new("_ulid", "BYTEA"));
    Statement::CreateFunction(Function {
        name: un0("generate_ulid"),
        args: vec![],
        returns: "TEXT".into(),
        volatility: Some("VOLATILE"),
        security_definer: false,
        body: FunctionBody::Pl(block),
    })
}

fn trigger(
    name: &str,
    table: QualifiedName,
    timing: Timing,
    event: &'static str,
    function: QualifiedName,
) -> Statement {
    Statement::CreateTrigger(Trigger {
        name: name.into(),
        table,
        timing,
        events: vec![event],
        level: TriggerLevel::Row,
        function,
    })
}

/// Gives the new row the key of a fresh `un0.related_object` row of its table type.
fn insert_related_object() -> Statement {
    let table_type = Select::new(vec![Expr::column("id")])
        .from(FromItem::table(un0("table_type")))
        .filter(Expr::and(
            Expr::eq(Expr::column("db_schema"), Expr::Raw("TG_TABLE_SCHEMA")),
            Expr::eq(Expr::column("name"), Expr::Raw("TG_TABLE_NAME")),
        ));
    let insert = Insert {
        table: un0("related_object"),
        columns: vec!["id".into(), "table_type_id".into()],
        source: InsertSource::Values(vec![vec![Expr::Var("_id"), Expr::Var("_table_type_id")]]),
        on_conflict: OnConflict::Fail,
    };
    let body = PlBlock::new(vec![
        PlStmt::SelectInto { select: table_type, into: vec!["_table_type_id"] },
        PlStmt::Assign {
            target: Expr::Var("_id"),
            value: Expr::call_schema(un0("generate_ulid"), vec![]),
        },
        PlStmt::sql(Statement::Insert(insert)),
        PlStmt::Assign { target: Expr::new_row("id"), value: Expr::Var("_id") },
        PlStmt::Return(Expr::Raw("NEW")),
    ])
    .declare(Declare::new("_id", "VARCHAR(26)"))
    .declare(Declare::new("_table_type_id", "INTEGER"));
    Statement::CreateFunction(Function::trigger(un0("insert_related_object"), body))
}

/// The action sets every table type can be granted.
const TABLE_PERMISSIONS: [&[&str]; 5] = [
    &["SELECT"],
    &["SELECT", "INSERT"],
    &["SELECT", "UPDATE"],
    &["SELECT", "INSERT", "UPDATE"],
    &["SELECT", "INSERT", "UPDATE", "DELETE"],
];

/// Gives every new table type the five standard permissions.
///
/// `AFTER` triggers fire in name order: `provision_*` sorts after the `insert_vertex` trigger of
/// the graph, so the new rows find the vertex they link to.
fn provision_tablepermissions() -> Vec<Statement> {
    let rows = TABLE_PERMISSIONS
        .iter()
        .map(|actions| {
            let actions = actions.iter().map(|a| Expr::text(*a)).collect();
            vec![Expr::new_row("id"), Expr::Array(actions).cast("un0.permission_name[]")]
        })
        .collect();
    let insert = Insert {
        table: un0("tablepermission"),
        columns: vec!["table_type_id".into(), "actions".into()],
        source: InsertSource::Values(rows),
        on_conflict: OnConflict::DoNothing,
    };
    let function = un0("provision_tablepermissions");
    vec![
        Statement::CreateFunction(Function::trigger(
            function.clone(),
            PlBlock::new(vec![
                PlStmt::sql(Statement::Insert(insert)),
                PlStmt::Return(Expr::Raw("NEW")),
            ]),
        )),
        trigger(
            "table_type_provision_tablepermissions_trigger",
            un0("table_type"),
            Timing::After,
            "INSERT",
            function,
        ),
    ]
}

/// Every new tenant starts with a group of its own name.
fn provision_group() -> Vec<Statement> {
    let insert = Insert {
        table: un0("group"),
        columns: vec!["tenant_id".into(), "name".into()],
        source: InsertSource::Values(vec![vec![Expr::new_row("id"), Expr::new_row("name")]]),
        on_conflict: OnConflict::Fail,
    };
    let function = un0("provision_group");
    vec![
        Statement::CreateFunction(Function::trigger(
            function.clone(),
            PlBlock::new(vec![
                PlStmt::sql(Statement::Insert(insert)),
                PlStmt::Return(Expr::Raw("NEW")),
            ]),
        )),
        trigger("tenant_provision_group_trigger", un0("tenant"), Timing::After, "INSERT", function),
    ]
}

/// Keeps a single row in `un0.token_secret`.
fn set_token_secret() -> Vec<Statement> {
    let function = un0("set_token_secret");
    vec![
        Statement::CreateFunction(Function::trigger(
            function.clone(),
            PlBlock::new(vec![
                PlStmt::sql(Statement::Delete { table: un0("token_secret") }),
                PlStmt::Return(Expr::Raw("NEW")),
            ]),
        )),
        trigger(
            "token_secret_set_token_secret_trigger",
            un0("token_secret"),
            Timing::Before,
            "INSERT",
            function,
        ),
    ]
}

/// Groups through which the session user may run `action` on a table.
fn permissible_groups(settings: &DbSettings) -> Statement {
    let session_user = Expr::SessionVar {
        prefix: settings.session_prefix.clone(),
        name: "user_id",
    };
    let query = Select::new(vec![Expr::qualified("ugr", "group_id")])
        .from(FromItem::aliased(un0("user_group_role"), "ugr"))
        .from(FromItem::aliased(un0("role_tablepermission"), "rtp"))
        .from(FromItem::aliased(un0("tablepermission"), "tp"))
        .from(FromItem::aliased(un0("table_type"), "tt"))
        .filter(Expr::all([
            Expr::eq(Expr::qualified("ugr", "user_id"), session_user),
            Expr::eq(Expr::qualified("rtp", "role_id"), Expr::qualified("ugr", "role_id")),
            Expr::eq(Expr::qualified("tp", "id"), Expr::qualified("rtp", "tablepermission_id")),
            Expr::eq(Expr::qualified("tt", "id"), Expr::qualified("tp", "table_type_id")),
            Expr::eq(Expr::qualified("tt", "db_schema"), Expr::Var("schema_name")),
            Expr::eq(Expr::qualified("tt", "name"), Expr::Var("table_name")),
            Expr::qualified("tp", "is_active"),
            Expr::eq(
                Expr::Var("action").cast("un0.permission_name"),
                Expr::call("ANY", vec![Expr::qualified("tp", "actions")]),
            ),
        ]));
    Statement::CreateFunction(Function {
        name: un0("permissible_groups"),
        args: vec![
            FunctionArg::new("schema_name", "TEXT"),
            FunctionArg::new("table_name", "TEXT"),
            FunctionArg::new("action", "TEXT"),
        ],
        returns: "SETOF VARCHAR(26)".into(),
        volatility: Some("STABLE"),
        security_definer: true,
        body: FunctionBody::Query(query),
    })
}

/// Checks the token against the stored secret and returns its payload.
fn verify_token() -> Statement {
    let secret =
        Select::new(vec![Expr::column("secret")]).from(FromItem::table(un0("token_secret")));
    let verify = Expr::call_schema(un0("verify"), vec![Expr::Var("token"), Expr::Var("_secret")]);
    let verified = Select::new(vec![Expr::column("payload"), Expr::column("valid")])
        .from(FromItem::call(verify));
    let body = PlBlock::new(vec![
        PlStmt::SelectInto { select: secret, into: vec!["_secret"] },
        PlStmt::SelectInto { select: verified, into: vec!["_payload", "_valid"] },
        PlStmt::if_then(
            Expr::call("coalesce", vec![Expr::Var("_valid"), Expr::bool(false)]).not(),
            vec![PlStmt::Raise("invalid token".into())],
        ),
        PlStmt::Return(Expr::Var("_payload")),
    ])
    .declare(Declare::new("_secret", "TEXT"))
    .declare(Declare::new("_payload", "JSON"))
    .declare(Declare::new("_valid", "BOOLEAN"));
    Statement::CreateFunction(Function {
        name: un0("verify_token"),
        args: vec![FunctionArg::new("token", "TEXT")],
        returns: "JSON".into(),
        volatility: None,
        security_definer: true,
        body: FunctionBody::Pl(body),
    })
}

fn user_type(settings: &DbSettings) -> String {
    let mut w = SqlWriter::new();
    w.write_qualified(&settings.user_table);
    w.build()
}

/// The user row for an email, read past the row level security of the user table.
fn token_user(settings: &DbSettings) -> Statement {
    let query = Select::new(vec![Expr::Raw("*")])
        .from(FromItem::table(settings.user_table.clone()))
        .filter(Expr::eq(Expr::column("email"), Expr::Var("user_email")));
    Statement::CreateFunction(Function {
        name: un0("token_user"),
        args: vec![FunctionArg::new("user_email", "TEXT")],
        returns: format!("SETOF {}", user_type(settings)),
        volatility: Some("STABLE"),
        security_definer: true,
        body: FunctionBody::Query(query),
    })
}

/// Verifies the token, sets the session variables the policies read and switches to the
/// requested role.
fn authorize_user(settings: &DbSettings) -> Statement {
    let claim = |name: &str| Expr::binop("->>", Expr::Var("_payload"), Expr::text(name));
    let user = |column: &str| Expr::qualified("_user", column);
    let set = |name: &str, value: Expr| {
        let variable = Expr::text(format!("{}.{}", settings.session_prefix, name));
        PlStmt::Perform(Expr::call("set_config", vec![variable, value, Expr::bool(true)]))
    };

    let lookup = Select::new(vec![Expr::Raw("*")])
        .from(FromItem::call(Expr::call_schema(un0("token_user"), vec![Expr::Var("_sub")])));
    let role = Expr::binop(
        "||",
        Expr::binop("||", Expr::call("current_database", vec![]), Expr::text("_")),
        Expr::Var("role_name"),
    );

    let body = PlBlock::new(vec![
        PlStmt::Assign {
            target: Expr::Var("_payload"),
            value: Expr::call_schema(un0("verify_token"), vec![Expr::Var("token")]),
        },
        PlStmt::Assign { target: Expr::Var("_sub"), value: claim("sub") },
        PlStmt::if_then(Expr::Var("_sub").is_null(), vec![PlStmt::Raise("no sub in token".into())]),
        PlStmt::if_then(claim("exp").is_null(), vec![PlStmt::Raise("no exp in token".into())]),
        PlStmt::SelectInto { select: lookup, into: vec!["_user"] },
        PlStmt::if_then(user("id").is_null(), vec![PlStmt::Raise("user not found".into())]),
        PlStmt::if_then(user("is_active").not(), vec![PlStmt::Raise("user is not active".into())]),
        PlStmt::if_then(user("is_deleted"), vec![PlStmt::Raise("user was deleted".into())]),
        set("email", user("email")),
        set("user_id", user("id")),
        set("is_superuser", user("is_superuser").cast("TEXT")),
        set("is_tenant_admin", user("is_tenant_admin").cast("TEXT")),
        set("tenant_id", Expr::call("coalesce", vec![user("tenant_id"), Expr::text("")])),
        PlStmt::ExecuteFormat { format: "SET ROLE %I".into(), args: vec![role] },
        PlStmt::Return(Expr::bool(true)),
    ])
    .declare(Declare::new("_payload", "JSON"))
    .declare(Declare::new("_sub", "TEXT"))
    .declare(Declare::new("_user", user_type(settings)));
    Statement::CreateFunction(Function {
        name: un0("authorize_user"),
        args: vec![
            FunctionArg::new("token", "TEXT"),
            FunctionArg::new("role_name", "TEXT").default(Expr::text("reader")),
        ],
        returns: "BOOLEAN".into(),
        volatility: None,
        security_definer: false,
        body: FunctionBody::Pl(body),
    })
}

/// Functions and triggers that read or write the builtin tables, created once they exist.
pub fn table_functions(settings: &DbSettings) -> Vec<Statement> {
    let mut statements = vec![insert_related_object()];
    statements.extend(provision_tablepermissions());
    statements.extend(provision_group());
    statements.extend(set_token_secret());
    statements.extend([
        permissible_groups(settings),
        verify_token(),
        token_user(settings),
        authorize_user(settings),
    ]);
    statements
}

/// Privileges on everything created so far. Tables emitted later get theirs from the
/// ownership emitter.
pub fn table_privileges(settings: &DbSettings) -> Vec<Statement> {
    let schemas = settings.schemas();
    let writers = vec![settings.writer_role(), settings.admin_role()];
    vec![
        Statement::Grant {
            privileges: "SELECT",
            on: GrantTarget::AllTablesIn(schemas.clone()),
            to: vec![settings.reader_role(), settings.writer_role()],
        },
        Statement::Grant {
            privileges: "SELECT, INSERT, UPDATE, DELETE, TRUNCATE, TRIGGER",
            on: GrantTarget::AllTablesIn(schemas.clone()),
            to: writers.clone(),
        },
        Statement::Grant {
            privileges: "USAGE, SELECT",
            on: GrantTarget::AllSequencesIn(schemas),
            to: writers,
        },
        Statement::Grant {
            privileges: "ALL",
            on: GrantTarget::AllTablesIn(vec!["audit".into(), settings.graph_name.clone()]),
            to: vec![settings.admin_role()],
        },
    ]
}

/// The first user, a superuser. Does nothing when the email is taken.
pub fn seed_superuser(settings: &DbSettings) -> Statement {
    let seed = &settings.superuser;
    Statement::Insert(Insert {
        table: settings.user_table.clone(),
        columns: vec!["email".into(), "handle".into(), "full_name".into(), "is_superuser".into()],
        source: InsertSource::Values(vec![vec![
            Expr::text(seed.email.as_str()),
            Expr::text(seed.handle.as_str()),
            Expr::text(seed.full_name.as_str()),
            Expr::bool(true),
        ]]),
        on_conflict: OnConflict::DoNothingOn(vec!["email".into()]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::script;

    fn settings() -> DbSettings {
        DbSettings { db_name: "shop".into(), ..Default::default() }
    }

    #[test]
    fn roles_are_guarded() {
        let sql = script(&create_roles(&settings())).unwrap();
        let guards = sql.matches("IF NOT EXISTS (SELECT 1 FROM \"pg_catalog\".\"pg_roles\"");
        assert_eq!(guards.count(), 5);
        assert!(sql.contains("CREATE ROLE \"shop_base_role\" NOINHERIT;"));
        assert!(sql.contains("CREATE ROLE \"shop_reader\" INHERIT IN ROLE \"shop_base_role\";"));
        assert!(sql.contains("CREATE ROLE \"shop_login\" NOINHERIT LOGIN PASSWORD 'un0_login' \
            IN ROLE \"shop_base_role\";"));
        assert!(sql.ends_with("GRANT \"shop_admin\" TO \"shop_login\";\n"));
    }

    #[test]
    fn drop_everything() {
        let sql = script(&drop_database(&settings())).unwrap();
        assert_eq!(sql, "DROP DATABASE IF EXISTS \"shop\" WITH (FORCE);\n\n\
            DROP ROLE IF EXISTS \"shop_login\";\n\n\
            DROP ROLE IF EXISTS \"shop_admin\";\n\n\
            DROP ROLE IF EXISTS \"shop_writer\";\n\n\
            DROP ROLE IF EXISTS \"shop_reader\";\n\n\
            DROP ROLE IF EXISTS \"shop_base_role\";\n");
    }

    #[test]
    fn extensions_and_graph() {
        let sql = script(&schemas_and_extensions(&settings())).unwrap();
        assert!(
            sql.starts_with("CREATE SCHEMA IF NOT EXISTS \"un0\" AUTHORIZATION \"shop_admin\";")
        );
        assert!(
            sql.contains("CREATE EXTENSION IF NOT EXISTS \"pgcrypto\" WITH SCHEMA \"un0\" CASCADE;")
        );
        assert!(sql.contains("CREATE EXTENSION IF NOT EXISTS \"supa_audit\" CASCADE;"));
        assert!(sql.contains("CREATE EXTENSION IF NOT EXISTS \"age\";"));
        assert!(sql.contains("LOAD 'age';"));
        assert!(sql.contains("ALTER DATABASE \"shop\" SET session_preload_libraries TO 'age';"));
        assert!(sql.contains("PERFORM \"ag_catalog\".\"create_graph\"('graph');"));

        let settings = DbSettings { load_age: false, ..settings() };
        assert!(!script(&schemas_and_extensions(&settings)).unwrap().contains("LOAD"));
    }

    #[test]
    fn privileges_cover_every_role() {
        let sql = script(&privileges(&settings())).unwrap();
        assert!(sql.starts_with("REVOKE ALL ON SCHEMA \"un0\", \"audit\", \"graph\", \"app\" \
            FROM \"public\", "));
        assert!(sql.contains("REVOKE CONNECT ON DATABASE \"shop\" \
            FROM \"public\", \"shop_base_role\", \
            \"shop_reader\", \"shop_writer\", \"shop_admin\";"));
        for role in settings().roles() {
            assert!(sql.contains(&format!(
                "ALTER ROLE \"{}\" SET search_path TO \
                \"ag_catalog\", \"un0\", \"audit\", \"graph\", \"app\";",
                role
            )));
        }
        assert!(sql.contains("GRANT CONNECT ON DATABASE \"shop\" TO \"shop_login\";"));
        assert!(sql.contains("ALTER DEFAULT PRIVILEGES IN SCHEMA \"graph\" \
            GRANT SELECT, INSERT, UPDATE, DELETE ON TABLES TO \"shop_writer\", \"shop_admin\";"));
    }

    #[test]
    fn ulid_characters() {
        let render = |i| {
            let mut w = SqlWriter::new();
            w.write(&ulid_char(i));
            w.build()
        };
        assert_eq!(render(0), "chr(get_byte(_encoding, ((get_byte(_ulid, 0) & 224) >> 5)))");
        assert_eq!(render(1), "chr(get_byte(_encoding, (get_byte(_ulid, 0) & 31)))");
        assert_eq!(
            render(3),
            "chr(get_byte(_encoding, \
            (((get_byte(_ulid, 1) & 7) << 2) | ((get_byte(_ulid, 2) & 192) >> 6))))"
        );
        assert_eq!(render(25), "chr(get_byte(_encoding, (get_byte(_ulid, 15) & 31)))");

        let sql = generate_ulid().to_sql().unwrap();
        assert_eq!(sql.matches("_output := (_output || chr(").count(), 26);
        assert!(sql.contains("_timestamp := set_byte(_timestamp, 0, \
            (_unix_time >> 40)::BIT(8)::INTEGER);"));
        assert!(sql.contains("_timestamp := set_byte(_timestamp, 5, \
            _unix_time::BIT(8)::INTEGER);"));
        assert!(sql.contains("_ulid := (_timestamp || \"un0\".\"gen_random_bytes\"(10));"));
        assert!(sql.contains("RETURNS TEXT\nLANGUAGE plpgsql\nVOLATILE\nAS $fn$"));
    }

    #[test]
    fn authorization_functions() {
        let sql = script(&table_functions(&settings())).unwrap();
        assert!(sql.contains("CREATE OR REPLACE FUNCTION \"un0\".\"permissible_groups\"(\
            schema_name TEXT, table_name TEXT, action TEXT)\nRETURNS SETOF VARCHAR(26)\n\
            LANGUAGE sql\nSTABLE\nSECURITY DEFINER\n"));
        assert!(sql.contains("(action::un0.permission_name = ANY(tp.\"actions\"))"));
        assert!(sql.contains("RETURNS SETOF \"un0\".\"user\"\nLANGUAGE sql\nSTABLE\n\
            SECURITY DEFINER\nAS $fn$\n\
            SELECT * FROM \"un0\".\"user\" WHERE (\"email\" = user_email)\n$fn$"));
        assert!(sql.contains("\"un0\".\"authorize_user\"(\
            token TEXT, role_name TEXT DEFAULT 'reader')\n\
            RETURNS BOOLEAN\nLANGUAGE plpgsql\nAS $fn$"));
        for message in [
            "invalid token",
            "no sub in token",
            "no exp in token",
            "user not found",
            "user is not active",
            "user was deleted",
        ] {
            assert!(sql.contains(&format!("RAISE EXCEPTION '{}';", message)));
        }
        assert!(sql.contains("PERFORM set_config('rls_var.tenant_id', \
            coalesce(_user.\"tenant_id\", ''), true);"));
        assert!(sql.contains("EXECUTE format('SET ROLE %I', \
            ((current_database() || '_') || role_name));"));
        assert!(sql.contains("SELECT * INTO _user FROM \"un0\".\"token_user\"(_sub);"));
    }

    #[test]
    fn table_permission_trigger() {
        let sql = script(&table_functions(&settings())).unwrap();
        assert!(sql.contains("(NEW.\"id\", \
            ARRAY['SELECT', 'INSERT', 'UPDATE', 'DELETE']::un0.permission_name[])"));
        assert!(sql.contains("CREATE OR REPLACE TRIGGER \
            \"table_type_provision_tablepermissions_trigger\" \
            AFTER INSERT ON \"un0\".\"table_type\""));
        assert!(sql.contains("CREATE OR REPLACE TRIGGER \"token_secret_set_token_secret_trigger\" \
            BEFORE INSERT"));
        // fires after the vertex trigger of the same table
        assert!(
            "table_type_provision_tablepermissions_trigger" > "table_type_insert_vertex_trigger"
        );
    }

    #[test]
    fn tenant_group_trigger() {
        let sql = script(&table_functions(&settings())).unwrap();
        assert!(sql.contains("CREATE OR REPLACE FUNCTION \"un0\".\"provision_group\"()\n\
            RETURNS TRIGGER"));
        assert!(sql.contains("INSERT INTO \"un0\".\"group\" (\"tenant_id\", \"name\") \
            VALUES (NEW.\"id\", NEW.\"name\");"));
        assert!(sql.contains("CREATE OR REPLACE TRIGGER \"tenant_provision_group_trigger\" \
            AFTER INSERT ON \"un0\".\"tenant\" \
            FOR EACH ROW EXECUTE FUNCTION \"un0\".\"provision_group\"()"));

        assert!("tenant_provision_group_trigger" > "tenant_insert_vertex_trigger");
    }

    #[test]
    fn superuser_seed() {
        assert_eq!(
            seed_superuser(&settings()).to_sql().unwrap(),
            "INSERT INTO \"un0\".\"user\" (\"email\", \"handle\", \"full_name\", \"is_superuser\") \
             VALUES ('admin@example.com', 'admin', 'Administrator', true) \
             ON CONFLICT (\"email\") DO NOTHING"
        );
    }
}
