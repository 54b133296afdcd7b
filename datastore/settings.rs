use serde::{Deserialize, Serialize};
use un0_schema::{is_valid_identifier, ConfigurationError, QualifiedName};

/// The bootstrap superuser inserted by the seed phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperuserSeed {
    pub email: String,
    pub handle: String,
    pub full_name: String,
}

impl Default for SuperuserSeed {
    fn default() -> Self {
        Self {
            email: "admin@example.com".into(),
            handle: "admin".into(),
            full_name: "Administrator".into(),
        }
    }
}

/// Everything the emitters and the compiler need to know about the target database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSettings {
    pub db_name: String,
    /// Schema for application tables, created next to `un0`, `audit` and the graph schema.
    pub app_schema: String,
    /// Name of the AGE graph, which is also the schema holding its label tables.
    pub graph_name: String,
    /// Prefix of the session variables read by policies and triggers.
    pub session_prefix: String,
    pub login_password: String,
    pub superuser: SuperuserSeed,
    /// Extensions created during bootstrap, in this order.
    pub extensions: Vec<String>,
    /// Issue `LOAD 'age'` and preload AGE for every new session. Not needed when the server
    /// already preloads it.
    pub load_age: bool,
    /// The table whose first row may be inserted without a session user.
    pub user_table: QualifiedName,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            db_name: "un0".into(),
            app_schema: "app".into(),
            graph_name: "graph".into(),
            session_prefix: "rls_var".into(),
            login_password: "un0_login".into(),
            superuser: SuperuserSeed::default(),
            extensions: ["btree_gist", "supa_audit", "pgcrypto", "pgjwt", "age"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            load_age: true,
            user_table: QualifiedName::new("un0", "user"),
        }
    }
}

impl DbSettings {
    pub fn admin_role(&self) -> String {
        format!("{}_admin", self.db_name)
    }

    pub fn writer_role(&self) -> String {
        format!("{}_writer", self.db_name)
    }

    pub fn reader_role(&self) -> String {
        format!("{}_reader", self.db_name)
    }

    pub fn login_role(&self) -> String {
        format!("{}_login", self.db_name)
    }

    pub fn base_role(&self) -> String {
        format!("{}_base_role", self.db_name)
    }

    /// Every role of the database, in creation order.
    pub fn roles(&self) -> Vec<String> {
        vec![
            self.base_role(),
            self.reader_role(),
            self.writer_role(),
            self.admin_role(),
            self.login_role(),
        ]
    }

    /// Schemas the roles get access to.
    pub fn schemas(&self) -> Vec<String> {
        vec!["un0".into(), "audit".into(), self.graph_name.clone(), self.app_schema.clone()]
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let names = [
            &self.db_name,
            &self.app_schema,
            &self.graph_name,
            &self.session_prefix,
            &self.user_table.schema,
            &self.user_table.name,
        ];
        for name in names.into_iter().chain(&self.extensions) {
            if !is_valid_identifier(name) {
                return Err(ConfigurationError::InvalidIdentifier(name.clone()));
            }
        }
        // role names must stay identifiers as well
        let longest = self.base_role();
        if !is_valid_identifier(&longest) {
            return Err(ConfigurationError::InvalidIdentifier(longest));
        }
        Ok(())
    }
}
