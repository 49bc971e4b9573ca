use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::models::{Client, ClientChanges, ClientFilter, ClientPhone, NewClient, Phone};

// Arbitrary key for pg_advisory_xact_lock, shared by every process that
// creates the directory schema.
const SCHEMA_LOCK_KEY: i64 = 0x636c_6965_6e74;

/// The directory's single database connection
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the connection described by `config`
    pub async fn new(config: &Config) -> Result<Self> {
        let options = config.connect_options()?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Get a reference to the underlying pool
    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the connection, waiting for it to be released
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Create the `clients` and `phones` tables if they do not exist yet.
    ///
    /// `CREATE TABLE IF NOT EXISTS` can still collide in the catalog when two
    /// sessions run it at once, so creation is serialized on an advisory lock
    /// held until the transaction ends.
    pub async fn create_schema(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clients (
                id SERIAL PRIMARY KEY,
                first_name VARCHAR(40) NOT NULL,
                last_name VARCHAR(40) NOT NULL,
                email VARCHAR(60) UNIQUE
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS phones (
                id SERIAL PRIMARY KEY,
                phone BIGINT UNIQUE NOT NULL,
                client_id INTEGER NOT NULL REFERENCES clients(id)
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!("schema ready");
        Ok(())
    }

    // Client operations

    /// Insert a client together with its phones. Nothing is kept if any
    /// insert fails.
    pub async fn add_client(&self, client: &NewClient) -> Result<i32> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO clients (first_name, last_name, email)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&client.first_name)
        .bind(&client.last_name)
        .bind(&client.email)
        .fetch_one(&mut *tx)
        .await?;

        insert_phones(&mut tx, id, &client.phones).await?;

        tx.commit().await?;

        info!(client_id = id, phones = client.phones.len(), "client added");
        Ok(id)
    }

    /// Apply the non-blank fields of `changes` to a client.
    ///
    /// Returns the number of client records changed. An unknown id is not an
    /// error unless replacement phones are given, in which case the phone
    /// insert fails on the foreign key.
    pub async fn change_client(&self, client_id: i32, changes: &ClientChanges) -> Result<u64> {
        let changes = changes.normalized();
        if changes.is_empty() {
            debug!(client_id, "nothing to change");
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut changed = 0;

        if changes.touches_client_row() {
            let result = sqlx::query(
                r#"
                UPDATE clients
                SET first_name = COALESCE($2, first_name),
                    last_name = COALESCE($3, last_name),
                    email = COALESCE($4, email)
                WHERE id = $1
                "#,
            )
            .bind(client_id)
            .bind(&changes.first_name)
            .bind(&changes.last_name)
            .bind(&changes.email)
            .execute(&mut *tx)
            .await?;

            changed = result.rows_affected();
        }

        if let Some(phones) = &changes.phones {
            sqlx::query("DELETE FROM phones WHERE client_id = $1")
                .bind(client_id)
                .execute(&mut *tx)
                .await?;

            insert_phones(&mut tx, client_id, phones).await?;
            changed = 1;
        }

        tx.commit().await?;

        info!(client_id, changed, "client changed");
        Ok(changed)
    }

    /// Delete a client and all of its phones in one transaction
    pub async fn delete_client(&self, client_id: i32) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let phones = sqlx::query("DELETE FROM phones WHERE client_id = $1")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;

        let clients = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            client_id,
            phones = phones.rows_affected(),
            deleted = clients.rows_affected(),
            "client deleted"
        );
        Ok(clients.rows_affected())
    }

    pub async fn get_client(&self, client_id: i32) -> Result<Option<Client>> {
        let client = sqlx::query_as::<_, Client>(
            "SELECT id, first_name, last_name, email FROM clients WHERE id = $1",
        )
        .bind(client_id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(client)
    }

    pub async fn find_client_by_email(&self, email: &str) -> Result<Option<Client>> {
        let client = sqlx::query_as::<_, Client>(
            "SELECT id, first_name, last_name, email FROM clients WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(client)
    }

    /// Search clients joined with their phones.
    ///
    /// Clients without phones never match: the join is inner.
    pub async fn find_clients(&self, filter: &ClientFilter) -> Result<Vec<ClientPhone>> {
        debug!(?filter, "searching clients");

        let rows = sqlx::query_as::<_, ClientPhone>(
            r#"
            SELECT cl.first_name, cl.last_name, cl.email, ph.phone
            FROM clients AS cl
            JOIN phones AS ph ON cl.id = ph.client_id
            WHERE ($1::TEXT IS NULL OR cl.first_name ILIKE $1)
              AND ($2::TEXT IS NULL OR cl.last_name ILIKE $2)
              AND ($3::TEXT IS NULL OR cl.email ILIKE $3)
              AND ($4::BIGINT IS NULL OR ph.phone = $4)
            ORDER BY cl.id, ph.phone
            "#,
        )
        .bind(filter.first_name_pattern())
        .bind(filter.last_name_pattern())
        .bind(filter.email_pattern())
        .bind(filter.phone)
        .fetch_all(self.get_pool())
        .await?;

        Ok(rows)
    }

    // Phone operations

    pub async fn add_phone(&self, client_id: i32, phone: i64) -> Result<i32> {
        let id = sqlx::query_scalar::<_, i32>(
            "INSERT INTO phones (phone, client_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(phone)
        .bind(client_id)
        .fetch_one(self.get_pool())
        .await?;

        info!(client_id, phone, "phone added");
        Ok(id)
    }

    pub async fn delete_phone(&self, client_id: i32, phone: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM phones WHERE client_id = $1 AND phone = $2")
            .bind(client_id)
            .bind(phone)
            .execute(self.get_pool())
            .await?;

        info!(client_id, phone, deleted = result.rows_affected(), "phone deleted");
        Ok(result.rows_affected())
    }

    pub async fn phones_for_client(&self, client_id: i32) -> Result<Vec<Phone>> {
        let phones = sqlx::query_as::<_, Phone>(
            "SELECT id, phone, client_id FROM phones WHERE client_id = $1 ORDER BY phone ASC",
        )
        .bind(client_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(phones)
    }
}

async fn insert_phones(
    tx: &mut Transaction<'_, Postgres>,
    client_id: i32,
    phones: &[i64],
) -> Result<()> {
    for phone in phones {
        sqlx::query("INSERT INTO phones (phone, client_id) VALUES ($1, $2)")
            .bind(phone)
            .bind(client_id)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

/// Open the database connection and make sure the schema exists
pub async fn init(config: &Config) -> Result<Database> {
    let db = Database::new(config).await?;
    db.create_schema().await?;

    Ok(db)
}
