mod config;
mod db;
mod error;
mod models;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::db::Database;
use crate::error::DirectoryError;
use crate::models::{Client, ClientChanges, ClientFilter, NewClient};

#[derive(Parser, Debug)]
#[command(
    name = "client-directory",
    version,
    about = "Keep a small directory of clients and their phone numbers in PostgreSQL"
)]
struct Cli {
    /// Connection URL, overrides DATABASE_URL and the DB_* variables
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the tables if they are missing
    Init,
    /// Add a client, optionally with phone numbers
    Add {
        first_name: String,
        last_name: String,
        email: String,
        #[arg(long = "phone")]
        phones: Vec<i64>,
    },
    /// Attach a phone number to an existing client
    AddPhone { client_id: i32, phone: i64 },
    /// Change a client; phones given here replace all current ones
    Change {
        client_id: i32,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long = "phone")]
        phones: Vec<i64>,
    },
    /// Remove one phone number from a client
    DeletePhone { client_id: i32, phone: i64 },
    /// Remove a client and all of its phones
    Delete { client_id: i32 },
    /// Search clients; names and email match case-insensitive substrings
    Find {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<i64>,
    },
    /// Show one client with its phones, looked up by id or email
    Show { client: String },
    /// Seed the directory with the sample clients and run two searches
    Demo,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("client_directory=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Load configuration
    let config = config::init()?.with_database_url(cli.database_url);

    let db = db::init(&config)
        .await
        .context("failed to open the client directory")?;
    info!("database connection established");

    let result = run(&db, cli.command.unwrap_or(Command::Demo)).await;
    if let Some(err) = result.as_ref().err().and_then(|e| e.downcast_ref::<DirectoryError>()) {
        if err.is_unique_violation() {
            warn!("an email or phone number given already belongs to a client");
        } else if err.is_foreign_key_violation() {
            warn!("the client id given does not exist");
        }
    }

    db.close().await;
    result
}

async fn run(db: &Database, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            println!("Schema ready");
        }
        Command::Add {
            first_name,
            last_name,
            email,
            phones,
        } => {
            let client = NewClient::new(&first_name, &last_name, &email).with_phones(&phones);
            let id = db.add_client(&client).await?;
            println!("Added client {}", id);
        }
        Command::AddPhone { client_id, phone } => {
            db.add_phone(client_id, phone).await?;
            println!("Added phone {} to client {}", phone, client_id);
        }
        Command::Change {
            client_id,
            first_name,
            last_name,
            email,
            phones,
        } => {
            let changes = ClientChanges {
                first_name,
                last_name,
                email,
                phones: Some(phones),
            };
            let changed = db.change_client(client_id, &changes).await?;
            println!("Changed {} client(s)", changed);
        }
        Command::DeletePhone { client_id, phone } => {
            let deleted = db.delete_phone(client_id, phone).await?;
            println!("Deleted {} phone(s)", deleted);
        }
        Command::Delete { client_id } => {
            let deleted = db.delete_client(client_id).await?;
            println!("Deleted {} client(s)", deleted);
        }
        Command::Find {
            first_name,
            last_name,
            email,
            phone,
        } => {
            let filter = search_filter(first_name, last_name, email, phone);
            print_matches(db, &filter).await?;
        }
        Command::Show { client } => match lookup_client(db, &client).await? {
            Some(client) => {
                println!(
                    "{}: {} {} <{}>",
                    client.id,
                    client.first_name,
                    client.last_name,
                    client.email.as_deref().unwrap_or("-")
                );
                for phone in db.phones_for_client(client.id).await? {
                    println!("  {}", phone.phone);
                }
            }
            None => println!("No client {}", client),
        },
        Command::Demo => demo(db).await?,
    }

    Ok(())
}

fn search_filter(
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<i64>,
) -> ClientFilter {
    let mut filter = ClientFilter::default();
    if let Some(first_name) = first_name {
        filter = filter.first_name(&first_name);
    }
    if let Some(last_name) = last_name {
        filter = filter.last_name(&last_name);
    }
    if let Some(email) = email {
        filter = filter.email(&email);
    }
    if let Some(phone) = phone {
        filter = filter.phone(phone);
    }
    filter
}

// Numeric keys are ids, anything else is an exact email.
async fn lookup_client(db: &Database, key: &str) -> Result<Option<Client>> {
    let client = match key.parse::<i32>() {
        Ok(id) => db.get_client(id).await?,
        Err(_) => db.find_client_by_email(key).await?,
    };
    Ok(client)
}

async fn print_matches(db: &Database, filter: &ClientFilter) -> Result<()> {
    let rows = db.find_clients(filter).await?;
    if rows.is_empty() {
        println!("No matching clients");
    }
    for row in rows {
        println!("{}", row);
    }
    Ok(())
}

async fn demo(db: &Database) -> Result<()> {
    let alex = db
        .add_client(&NewClient::new("Alex", "Petrov", "alex.petrov@mail.ru"))
        .await?;
    let vasiliy = db
        .add_client(
            &NewClient::new("Vasiliy", "Utkin", "vasiliy.utkin@mail.ru")
                .with_phones(&[89991234567]),
        )
        .await?;
    let dmitriy = db
        .add_client(
            &NewClient::new("Dmitriy", "Gusev", "dmitriy.gusev@mail.ru")
                .with_phones(&[89111111111, 89222222222]),
        )
        .await?;

    db.add_phone(dmitriy, 89444444444).await?;

    db.change_client(
        vasiliy,
        &ClientChanges {
            first_name: Some("Vasya".to_string()),
            email: Some("vasya.utkin@mail.ru".to_string()),
            phones: Some(vec![89777777777]),
            ..Default::default()
        },
    )
    .await?;
    db.change_client(
        alex,
        &ClientChanges {
            first_name: Some("Alexander".to_string()),
            email: Some("alexander.petrov@mail.ru".to_string()),
            phones: Some(vec![89121211212, 89343433434]),
            ..Default::default()
        },
    )
    .await?;

    db.delete_phone(dmitriy, 89444444444).await?;
    db.delete_client(alex).await?;

    print_matches(db, &ClientFilter::default().first_name("Vasiliy")).await?;
    print_matches(db, &ClientFilter::default().phone(89222222222)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_demo() {
        let cli = Cli::try_parse_from(["client-directory"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.database_url.is_none());
    }

    #[test]
    fn add_collects_repeated_phones() {
        let cli = Cli::try_parse_from([
            "client-directory",
            "add",
            "Dmitriy",
            "Gusev",
            "dmitriy.gusev@mail.ru",
            "--phone",
            "89111111111",
            "--phone",
            "89222222222",
        ])
        .unwrap();

        match cli.command {
            Some(Command::Add { first_name, phones, .. }) => {
                assert_eq!(first_name, "Dmitriy");
                assert_eq!(phones, vec![89111111111, 89222222222]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn change_without_phones_leaves_them_alone() {
        let cli = Cli::try_parse_from([
            "client-directory",
            "change",
            "5",
            "--email",
            "vasya.utkin@mail.ru",
        ])
        .unwrap();

        match cli.command {
            Some(Command::Change { client_id, email, phones, first_name, .. }) => {
                assert_eq!(client_id, 5);
                assert_eq!(email.as_deref(), Some("vasya.utkin@mail.ru"));
                assert!(first_name.is_none());
                let changes = ClientChanges {
                    email,
                    phones: Some(phones),
                    ..Default::default()
                }
                .normalized();
                assert!(changes.phones.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn find_takes_exact_phone_and_global_url() {
        let cli = Cli::try_parse_from([
            "client-directory",
            "find",
            "--phone",
            "89222222222",
            "--database-url",
            "postgres://localhost/clients_db",
        ])
        .unwrap();

        assert_eq!(cli.database_url.as_deref(), Some("postgres://localhost/clients_db"));
        match cli.command {
            Some(Command::Find { phone, first_name, .. }) => {
                assert_eq!(phone, Some(89222222222));
                assert!(first_name.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn find_flags_become_a_filter() {
        let filter = search_filter(
            Some("Vas".to_string()),
            Some("utkin".to_string()),
            None,
            Some(89777777777),
        );
        assert_eq!(filter.first_name_pattern().as_deref(), Some("%Vas%"));
        assert_eq!(filter.last_name_pattern().as_deref(), Some("%utkin%"));
        assert_eq!(filter.email_pattern(), None);
        assert_eq!(filter.phone, Some(89777777777));
    }

    #[test]
    fn show_accepts_id_or_email() {
        for key in ["5", "vasya.utkin@mail.ru"] {
            match Cli::try_parse_from(["client-directory", "show", key]).unwrap().command {
                Some(Command::Show { client }) => assert_eq!(client, key),
                other => panic!("unexpected command: {:?}", other),
            }
        }
    }

    #[test]
    fn phone_numbers_must_be_numeric() {
        assert!(Cli::try_parse_from(["client-directory", "add-phone", "6", "not-a-number"]).is_err());
    }
}
