use surrealdb::Surreal;
use surrealdb::opt::auth::Root;
use surrealdb::engine::any::{self, Any};
use std::env;
use std::sync::Arc;
use tracing::info;
use crate::error::Result;

/// Connection settings of the durable store.
///
/// `address` accepts any SurrealDB engine address, e.g. `mem://` for an embedded
/// in-memory store or `ws://127.0.0.1:4030` for a server. Credentials are only
/// used when `username` is not empty.
#[derive(Debug, Clone)]
pub struct DbConnection {
    pub address: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String
}

impl Default for DbConnection {
    fn default() -> Self {
        Self {
            address: env::var("KAIROS_DB_ADDRESS").unwrap_or("mem://".to_string()),
            username: env::var("KAIROS_DB_USERNAME").unwrap_or_default(),
            password: env::var("KAIROS_DB_PASSWORD").unwrap_or_default(),
            namespace: env::var("KAIROS_DB_NAMESPACE").unwrap_or("kairos".to_string()),
            database: env::var("KAIROS_DB_NAME").unwrap_or("kairos".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Db {
    pub client: Arc<Surreal<Any>>
}

impl Db {
    pub async fn new(config: Option<DbConnection>) -> Result<Self> {
        let config: DbConnection = config.unwrap_or_default();
        let client: Surreal<Any> = any::connect(config.address.as_str()).await?;
        if !config.username.is_empty() {
            client.signin(Root {
                username: config.username.as_str(),
                password: config.password.as_str(),
            }).await?;
        }
        client.use_ns(config.namespace.as_str()).use_db(config.database.as_str()).await?;
        info!(address = %config.address, namespace = %config.namespace, database = %config.database, "connected to job store");
        Ok(Self {
            client: Arc::new(client),
        })
    }
}
