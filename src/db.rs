use std::collections::HashMap;
use std::sync::RwLock;

use log::debug;
use mongodb::{options::ClientOptions, Client, Collection, Database};

use crate::models::Poll;

/// Cap on cached per-client database handles. The map is cleared wholesale
/// when full; handles are cheap to rebuild from the shared client.
const MAX_TENANT_HANDLES: usize = 64;

pub struct MongoDB {
    pub client: Client,
    /// The shared database holding the `Clients` and `Teams` collections.
    pub db: Database,
    tenant_dbs: RwLock<HashMap<String, Database>>,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Self {
        let client_options = ClientOptions::parse(uri)
            .await
            .expect("Failed to parse MongoDB connection string");
        let client = Client::with_options(client_options).expect("Failed to initialize client");
        let db = client.database(db_name);
        MongoDB {
            client,
            db,
            tenant_dbs: RwLock::new(HashMap::new()),
        }
    }

    /// Each client gets an isolated `tp-{clientId}` database; handles are
    /// constructed lazily and cached for the process lifetime.
    fn tenant_db(&self, client_id: &str) -> Database {
        if let Some(db) = self.tenant_dbs.read().unwrap().get(client_id) {
            return db.clone();
        }

        let mut handles = self.tenant_dbs.write().unwrap();
        if handles.len() >= MAX_TENANT_HANDLES {
            debug!("tenant handle cache full, evicting {} entries", handles.len());
            handles.clear();
        }
        handles
            .entry(client_id.to_string())
            .or_insert_with(|| self.client.database(&format!("tp-{}", client_id)))
            .clone()
    }

    /// The poll collection for one team: one collection per team, inside the
    /// owning client's isolated database.
    pub fn poll_collection(&self, client_id: &str, team_id: &str) -> Collection<Poll> {
        self.tenant_db(client_id).collection(team_id)
    }
}
